use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressDrawTarget};
use itq::config::TrainConfig;
use itq::functor::ItqFunctor;
use itq::pipeline::{self, process};
use itq::source::SourceConfig;
use pretty_duration::pretty_duration;
use std::io::Write;
use std::io::{stdin, stdout, BufWriter};
use std::path::PathBuf;
use ticky::Stopwatch;
use tracing::info;
use tracing_subscriber::EnvFilter;

const ENCODE_BATCH_SIZE: usize = 1000;

#[derive(Parser)]
#[command(version, about, long_about = None, arg_required_else_help(true))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        about = "Extract descriptors, fit an ITQ model over them, and save it.",
        arg_required_else_help(true)
    )]
    Train {
        #[arg(short, long, help = "The training configuration file.")]
        config: PathBuf,
        #[arg(long, help = "Seed the initial rotation, overriding the configuration.")]
        seed: Option<u64>,
        #[arg(long, help = "The number of extraction workers, overriding the configuration.")]
        workers: Option<usize>,
    },
    #[command(about = "Print the default training configuration.")]
    DefaultConfig {
        #[arg(short, long, help = "Write the configuration to this file instead.")]
        output: Option<PathBuf>,
    },
    #[command(
        about = "Hash descriptors with a saved model.",
        arg_required_else_help(true)
    )]
    Hash {
        #[arg(short, long, help = "The saved model.")]
        model: PathBuf,
        #[arg(short, long, help = "A descriptor source configuration file.")]
        source: PathBuf,
        #[arg(long, help = "A file listing the identifiers to hash. Defaults to every descriptor.")]
        ids: Option<PathBuf>,
    },
    #[command(name = process::FETCH_WORKER_COMMAND, hide = true)]
    FetchWorker {
        #[arg(long = "source")]
        source: String,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let mut sw = Stopwatch::start_new();
    match cli.command {
        Some(Commands::Train {
            config,
            seed,
            workers,
        }) => {
            let mut config = TrainConfig::load(&config)?;
            if let Some(seed) = seed {
                config.itq.random_seed = Some(seed);
            }
            if let Some(workers) = workers {
                config.parallel.worker_count = workers;
            }
            config.validate()?;
            let functor = itq::train::train_and_save(&config)?;
            sw.stop();
            info!(
                bits = functor.bit_length(),
                dimension = functor.model().dimension(),
                path = %config.model_path.display(),
                "trained model in {}",
                pretty_duration(&sw.elapsed(), None)
            );
        }
        Some(Commands::DefaultConfig { output }) => {
            let json = TrainConfig::default().to_json_pretty()?;
            match output {
                Some(path) => std::fs::write(&path, json + "\n")
                    .with_context(|| format!("could not write {}", path.display()))?,
                None => {
                    let mut buffer = BufWriter::new(stdout().lock());
                    writeln!(buffer, "{json}")?;
                }
            }
        }
        Some(Commands::Hash { model, source, ids }) => {
            let functor = ItqFunctor::load(&model)?;
            let source_json = std::fs::read_to_string(&source)
                .with_context(|| format!("could not read {}", source.display()))?;
            let source: SourceConfig = serde_json::from_str(&source_json)
                .with_context(|| format!("invalid source configuration in {}", source.display()))?;
            let source = source.open()?;
            let ids = pipeline::resolve_ids(ids.as_deref(), source.as_ref())?;
            let num_ids = ids.len();
            let progress_bar = ProgressBar::with_draw_target(
                Some(num_ids.try_into()?),
                ProgressDrawTarget::hidden(),
            )
            .with_message(format!("Hashing {num_ids} descriptor(s)."));
            let mut buffer = BufWriter::new(stdout().lock());
            for chunk in ids.chunks(ENCODE_BATCH_SIZE) {
                let descriptors = chunk
                    .iter()
                    .map(|id| source.fetch(id))
                    .collect::<itq::Result<Vec<_>>>()?;
                let codes = functor.encode_batch(&descriptors)?;
                for (descriptor, code) in descriptors.iter().zip(codes) {
                    writeln!(buffer, "{}\t{code}", descriptor.id)?;
                }
                progress_bar.inc(chunk.len().try_into()?);
                if progress_bar.is_hidden() {
                    progress_bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(100));
                }
            }
            buffer.flush()?;
            sw.stop();
            progress_bar.finish_and_clear();
            info!(
                "hashed {num_ids} descriptor(s) in {}",
                pretty_duration(&sw.elapsed(), None)
            );
        }
        Some(Commands::FetchWorker { source }) => {
            let config: SourceConfig = serde_json::from_str(&source)
                .context("invalid source configuration for fetch worker")?;
            let source = config.open()?;
            process::serve_fetch_requests(source.as_ref(), stdin().lock(), stdout().lock())?;
        }
        None => unreachable!(),
    }
    Ok(())
}
