use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use tracing::Level;
use tsumiki::{Config, Environment, TsumikiError, logging, pipeline};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    /// Task to run.
    #[arg(index = 1, default_value = pipeline::DEFAULT)]
    task: String,

    /// Project root containing the sources.
    #[arg(long, default_value = ".")]
    root: Utf8PathBuf,

    /// Config file, `tsumiki.toml` in the root by default.
    #[arg(long)]
    config: Option<Utf8PathBuf>,

    /// Port of the dev server.
    #[arg(long)]
    port: Option<u16>,

    /// error, warn, info, debug or trace.
    #[arg(long, default_value = "info", value_parser = parse_log_level)]
    log_level: Level,

    /// Print the registered tasks and exit.
    #[arg(long)]
    list: bool,
}

fn parse_log_level(s: &str) -> Result<Level, String> {
    logging::parse_level(s).ok_or_else(|| format!("unknown log level '{s}'"))
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.log_level);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), TsumikiError> {
    let registry = pipeline::registry()?;

    if args.list {
        for (name, kind) in registry.tasks() {
            println!("{name:<12} {kind}");
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load(&args.root)?,
    };
    if let Some(port) = args.port {
        config.port = port;
    }

    let env = Environment::new(args.root, config)?;
    registry.run(&args.task, &env)?;

    Ok(())
}
