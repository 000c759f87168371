//! spilljoin CLI: merge-join two sorted CSV files under a fixed memory budget.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;

use clap::{Parser, Subcommand};
use spilljoin_core::config::JoinConfig;
use spilljoin_core::frame::Frame;
use spilljoin_io::{build_storage, CsvFrameReader, JsonlWriter};
use spilljoin_operators::join::{JoinCondition, JoinStats, MergeJoinOperator};
use spilljoin_operators::{FrameWriter, OpError};

type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "spilljoin")]
#[command(about = "Memory-bounded sort-merge join with run-file spilling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug, Default)]
struct ConfigArgs {
    /// Window budget in frames (overrides SPILLJOIN_MEMORY_FRAMES)
    #[arg(long)]
    memory_frames: Option<usize>,

    /// Frame size in bytes (overrides SPILLJOIN_FRAME_SIZE)
    #[arg(long)]
    frame_size: Option<usize>,

    /// Partition id used in run-file names
    #[arg(long)]
    partition: Option<u64>,

    /// Run-file directory, or memory://name (overrides SPILLJOIN_SPILL_DIR)
    #[arg(long)]
    spill_dir: Option<String>,

    /// Run-file compression: none, zstd or lz4
    #[arg(long)]
    spill_codec: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Join two CSV files, each sorted ascending on its key column(s)
    Join {
        #[arg(long)]
        left: PathBuf,

        #[arg(long)]
        right: PathBuf,

        /// Left key column(s), comma separated
        #[arg(long)]
        left_key: String,

        /// Right key column(s), comma separated
        #[arg(long)]
        right_key: String,

        /// Band join: match right keys down to left - lower
        #[arg(long)]
        band_lower: Option<f64>,

        /// Band join: match right keys up to left + upper
        #[arg(long)]
        band_upper: Option<f64>,

        /// Output JSONL file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Join {
            left,
            right,
            left_key,
            right_key,
            band_lower,
            band_upper,
            output,
            config,
        } => {
            let cfg = effective_config(&config);
            let condition = join_condition(&left_key, &right_key, band_lower, band_upper);
            match run_join(&cfg, &condition, &left, &right, output.as_deref()) {
                Ok(stats) => match serde_json::to_string(&stats) {
                    Ok(json) => eprintln!("{json}"),
                    Err(e) => eprintln!("Error: {e}"),
                },
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Config { config } => {
            let cfg = effective_config(&config);
            if let Err(e) = cfg.validate() {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
            match serde_json::to_string_pretty(&cfg) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error: {e}");
                    std::process::exit(1);
                }
            }
        }
    }
}

/// Environment first, then command-line flags.
fn effective_config(args: &ConfigArgs) -> JoinConfig {
    let mut cfg = JoinConfig::from_env();
    if let Some(frames) = args.memory_frames {
        cfg.memory_frames = frames;
    }
    if let Some(size) = args.frame_size {
        cfg.frame_size = size;
    }
    if let Some(p) = args.partition {
        cfg.partition = p;
    }
    if let Some(dir) = &args.spill_dir {
        cfg.spill_dir = dir.clone();
    }
    if let Some(codec) = &args.spill_codec {
        cfg.spill_codec = codec.clone();
    }
    cfg
}

fn split_keys(keys: &str) -> Vec<String> {
    keys.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_condition(
    left_key: &str,
    right_key: &str,
    band_lower: Option<f64>,
    band_upper: Option<f64>,
) -> JoinCondition {
    if band_lower.is_some() || band_upper.is_some() {
        JoinCondition::Band {
            left_key: left_key.trim().to_string(),
            right_key: right_key.trim().to_string(),
            lower: band_lower.unwrap_or(0.0),
            upper: band_upper.unwrap_or(0.0),
        }
    } else {
        JoinCondition::Equi {
            left_keys: split_keys(left_key),
            right_keys: split_keys(right_key),
        }
    }
}

struct JsonlSink<W: Write>(JsonlWriter<W>);

impl<W: Write> FrameWriter for JsonlSink<W> {
    fn next_frame(&mut self, frame: &Frame) -> Result<(), OpError> {
        self.0
            .write_frame(frame)
            .map_err(|e| OpError::Exec(format!("writing results: {e}")))
    }
}

fn run_join(
    cfg: &JoinConfig,
    condition: &JoinCondition,
    left_path: &Path,
    right_path: &Path,
    output: Option<&Path>,
) -> CliResult<JoinStats> {
    cfg.validate()?;
    let mut left_reader = CsvFrameReader::open(left_path, cfg.frame_size)?;
    let mut right_reader = CsvFrameReader::open(right_path, cfg.frame_size)?;

    let checker = condition.build(left_reader.schema(), right_reader.schema())?;
    let storage = build_storage(cfg)?;
    let (mut left, mut right) = MergeJoinOperator::new(
        cfg,
        checker,
        left_reader.schema().clone(),
        right_reader.schema().clone(),
        storage,
    )?;

    let out: Box<dyn Write> = match output {
        Some(p) => Box::new(File::create(p)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut sink = JsonlSink(JsonlWriter::to_writer(out, left.result_format()));

    let stats = thread::scope(|s| -> CliResult<JoinStats> {
        let producer = s.spawn(move || -> CliResult<()> {
            loop {
                match right_reader.next_frame() {
                    Ok(Some(frame)) => right.next_frame(frame)?,
                    Ok(None) => break,
                    Err(e) => {
                        right.fail();
                        return Err(e.into());
                    }
                }
            }
            right.close()?;
            tracing::debug!(rows = right_reader.rows_read(), "right input drained");
            Ok(())
        });

        let driven = (|| -> CliResult<JoinStats> {
            while let Some(frame) = left_reader.next_frame()? {
                left.next_frame(frame, &mut sink)?;
            }
            tracing::debug!(rows = left_reader.rows_read(), "left input drained");
            Ok(left.close(&mut sink)?)
        })();

        let produced = producer
            .join()
            .map_err(|_| "right producer thread panicked")?;
        match (driven, produced) {
            (Ok(stats), Ok(())) => Ok(stats),
            (Err(e), Ok(())) | (Ok(_), Err(e)) => Err(e),
            // One side failing aborts the other; report the side that saw the cause.
            (Err(l), Err(r)) if is_abort(&*l) => Err(r),
            (Err(l), Err(_)) => Err(l),
        }
    })?;

    sink.0.flush()?;
    Ok(stats)
}

fn is_abort(e: &(dyn std::error::Error + Send + Sync + 'static)) -> bool {
    matches!(e.downcast_ref::<OpError>(), Some(OpError::Aborted))
}
