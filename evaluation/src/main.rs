use std::fmt;
use std::fs::File;
use std::hash::BuildHasherDefault;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use siphasher::sip::SipHasher13;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use hyperloglog_packed::{
    BuildHasherAdapter, CardinalitySketch, HashFunction, HyperLogLog,
    PackedRegisters, PolynomialHash, RegisterStore, WordRegisters,
};

mod stream;

use crate::stream::{chi_squared, count_unique, split_stream, StreamGenerator};

type SipHash = BuildHasherAdapter<BuildHasherDefault<SipHasher13>>;

#[derive(Parser)]
#[command(name = "evl", about = "run hyperloglog evaluation experiments")]
struct Cli {
    /// Number of threads running experiments.
    #[arg(short, long, global = true, default_value_t = 1)]
    jobs: usize,

    /// Seed of the random stream generator.
    #[arg(short, long, global = true, default_value_t = 1)]
    seed: u64,

    /// Register store backing the sketches.
    #[arg(long, global = true, value_enum, default_value_t = Store::Packed)]
    store: Store,

    /// Hash function applied to the generated strings.
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = HashKind::Polynomial
    )]
    hash: HashKind,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Store {
    /// One 32-bit word per register.
    Word,
    /// 5-bit packed registers.
    Packed,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum HashKind {
    /// `h * 31 + byte` over the string bytes.
    Polynomial,
    /// SipHash-1-3 with zero keys, truncated to 32 bits.
    Sip,
}

#[derive(Subcommand)]
enum Command {
    /// Run a chi-squared test on the distribution of the hash.
    HashTest {
        /// Number of random strings hashed.
        #[arg(short, long, default_value_t = 10_000)]
        count: usize,
        /// Number of buckets hashes are distributed into.
        #[arg(short, long, default_value_t = 100)]
        buckets: usize,
    },
    /// Compare estimates over a range of precisions.
    Precision {
        /// Number of random strings in the stream.
        #[arg(short, long, default_value_t = 50_000)]
        count: usize,
        #[arg(long, default_value_t = 4)]
        min_precision: u8,
        #[arg(long, default_value_t = 12)]
        max_precision: u8,
    },
    /// Estimate growing prefixes of random streams and save them as CSV.
    Experiment(ExperimentArgs),
    /// Compare the memory used by both register stores.
    Memory {
        #[arg(short, long, default_value_t = 8)]
        precision: u8,
    },
}

#[derive(Args)]
struct ExperimentArgs {
    /// Stream sizes to evaluate.
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = [10_000, 50_000, 100_000]
    )]
    sizes: Vec<usize>,

    /// Stream prefixes to estimate, in percent of the stream size.
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = [10, 20, 30, 40, 50, 60, 70, 80, 90, 100]
    )]
    percents: Vec<usize>,

    /// Number of random streams per size.
    #[arg(short, long, default_value_t = 5)]
    runs: usize,

    #[arg(short, long, default_value_t = 8)]
    precision: u8,

    /// CSV file the estimations are written to.
    #[arg(short, long, default_value = "experiment.csv")]
    output: PathBuf,
}

// A CSV row of the prefix experiment.
struct Estimation {
    size:     usize,
    percent:  usize,
    real:     usize,
    estimate: u64,
    error:    f64,
}

impl Estimation {
    const HEADER: &'static str = "stream_size,percent,real,estimate,error";
}

impl fmt::Display for Estimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.size, self.percent, self.real, self.estimate, self.error
        )
    }
}

// Returns the relative error of `estimate` in percent.
fn error_percent(estimate: f64, real: usize) -> f64 {
    (estimate - real as f64).abs() / real as f64 * 100.0
}

// Dispatches `$func::<Store, HashKind>` for the selected store and hash.
macro_rules! dispatch {
    ($cli:expr, $func:ident($($arg:expr),*)) => {
        match ($cli.store, $cli.hash) {
            (Store::Word, HashKind::Polynomial) => {
                $func::<WordRegisters, _>(PolynomialHash, $($arg),*)
            },
            (Store::Word, HashKind::Sip) => {
                $func::<WordRegisters, _>(sip_hash(), $($arg),*)
            },
            (Store::Packed, HashKind::Polynomial) => {
                $func::<PackedRegisters, _>(PolynomialHash, $($arg),*)
            },
            (Store::Packed, HashKind::Sip) => {
                $func::<PackedRegisters, _>(sip_hash(), $($arg),*)
            },
        }
    };
}

fn sip_hash() -> SipHash {
    BuildHasherAdapter::new(BuildHasherDefault::default())
}

// Runs the chi-squared test of the selected hash.
fn hash_test<H>(
    hasher: H,
    seed: u64,
    count: usize,
    buckets: usize,
) -> Result<()>
where
    H: HashFunction,
{
    ensure!(buckets > 1, "at least two buckets are needed");
    ensure!(count > 0, "at least one string must be hashed");

    let stream = StreamGenerator::new(seed).make_stream(count);

    let chi2 = chi_squared(&stream, &hasher, buckets);

    println!("Chi2: {} (degrees of freedom: {})", chi2, buckets - 1);

    Ok(())
}

// Estimates the same stream at every precision in `precisions`.
fn precision_sweep<R, H>(
    hasher: H,
    seed: u64,
    count: usize,
    precisions: (u8, u8),
) -> Result<()>
where
    R: RegisterStore,
    H: HashFunction + Clone,
{
    let (min, max) = precisions;

    ensure!(min <= max, "precision range {}..={} is empty", min, max);
    ensure!(count > 0, "the stream must hold at least one string");

    // Reject the whole range before printing any row.
    CardinalitySketch::<H, R>::new(min, hasher.clone())?;
    CardinalitySketch::<H, R>::new(max, hasher.clone())?;

    let stream = StreamGenerator::new(seed).make_stream(count);
    let real = count_unique(&stream);

    info!(count, real, "generated stream");

    for precision in min..=max {
        let mut hll: CardinalitySketch<H, R> =
            CardinalitySketch::new(precision, hasher.clone())?;

        for item in &stream {
            hll.add(item);
        }

        let estimate = hll.estimate();

        println!(
            "B={} m={} Real={} Est={} Error={}%",
            precision,
            hll.register_count(),
            real,
            estimate.trunc() as u64,
            error_percent(estimate, real)
        );
    }

    Ok(())
}

// Feeds growing prefixes of random streams into a sketch and saves the
// estimate of every prefix.
fn experiment<R, H>(hasher: H, seed: u64, args: &ExperimentArgs) -> Result<()>
where
    R: RegisterStore,
    H: HashFunction + Clone + Sync,
{
    // Fail before creating the output or spawning any run.
    CardinalitySketch::<H, R>::new(args.precision, hasher.clone())?;

    for &size in &args.sizes {
        for &percent in &args.percents {
            ensure!(
                size * percent / 100 > 0,
                "{}% of a stream of {} strings is empty",
                percent,
                size
            );
        }
    }

    let mut writer = BufWriter::new(
        File::create(&args.output)
            .with_context(|| format!("creating {}", args.output.display()))?,
    );

    writeln!(writer, "{}", Estimation::HEADER)?;

    for &size in &args.sizes {
        info!(size, runs = args.runs, "running experiment");

        let runs: Vec<Vec<Estimation>> = (0..args.runs)
            .into_par_iter()
            .map(|run| {
                let seed = seed ^ ((size as u64) << 16) ^ run as u64;

                run_experiment::<R, H>(hasher.clone(), seed, size, args)
            })
            .collect::<Result<_>>()?;

        for estimation in runs.iter().flatten() {
            writeln!(writer, "{}", estimation)?;
        }
    }

    writer.flush()?;

    info!(output = %args.output.display(), "saved estimations");

    Ok(())
}

// A single run of the prefix experiment over one random stream.
fn run_experiment<R, H>(
    hasher: H,
    seed: u64,
    size: usize,
    args: &ExperimentArgs,
) -> Result<Vec<Estimation>>
where
    R: RegisterStore,
    H: HashFunction,
{
    let stream = StreamGenerator::new(seed).make_stream(size);

    let mut hll: CardinalitySketch<H, R> =
        CardinalitySketch::new(args.precision, hasher)?;

    let mut added = 0;

    let estimations = split_stream(&stream, &args.percents)
        .into_iter()
        .zip(&args.percents)
        .map(|(part, &percent)| {
            // Prefixes grow, only the new tail needs adding.
            for item in &part[added.min(part.len())..] {
                hll.add(item);
            }
            added = added.max(part.len());

            let real = count_unique(part);
            let estimate = hll.estimate();

            debug!(size, percent, real, estimate, "estimated prefix");

            Estimation {
                size:     size,
                percent:  percent,
                real:     real,
                estimate: estimate.trunc() as u64,
                error:    error_percent(estimate, real),
            }
        })
        .collect();

    Ok(estimations)
}

// Prints the bytes used by both stores at `precision`.
fn memory(precision: u8) -> Result<()> {
    let word: CardinalitySketch<_, WordRegisters> =
        CardinalitySketch::new(precision, PolynomialHash)?;
    let packed: CardinalitySketch<_, PackedRegisters> =
        CardinalitySketch::new(precision, PolynomialHash)?;

    let (word, packed) =
        (word.memory_usage_bytes(), packed.memory_usage_bytes());

    println!("Word registers: {} bytes", word);
    println!("Packed registers: {} bytes", packed);
    println!(
        "Memory saved: {} bytes ({}%)",
        word - packed,
        (word - packed) * 100 / word
    );

    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    rayon::ThreadPoolBuilder::new()
        .num_threads(cli.jobs)
        .build_global()
        .context("building thread pool")?;

    match &cli.command {
        Command::HashTest { count, buckets } => {
            match cli.hash {
                HashKind::Polynomial => {
                    hash_test(PolynomialHash, cli.seed, *count, *buckets)
                },
                HashKind::Sip => {
                    hash_test(sip_hash(), cli.seed, *count, *buckets)
                },
            }
        },
        Command::Precision {
            count,
            min_precision,
            max_precision,
        } => dispatch!(
            cli,
            precision_sweep(cli.seed, *count, (*min_precision, *max_precision))
        ),
        Command::Experiment(args) => {
            dispatch!(cli, experiment(cli.seed, args))
        },
        Command::Memory { precision } => memory(*precision),
    }
}
