//! steprun - Task to Pod Layout
//!
//! Reads a task manifest, runs the step transform pipeline (resolving image
//! commands against their registries), and prints the ordered containers
//! and volumes of the resulting pod as JSON.
//!
//! ## Usage
//!
//! ```sh
//! steprun task.yaml
//! steprun --config ./steprun.yaml --namespace ci task.yaml
//! cat task.yaml | steprun -
//! ```

use clap::Parser;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use steprun::{
    Config, EntrypointCache, OciImageSource, PodBuilder, SimpleNameGenerator, StaticKeychain,
    TaskSpec,
};
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

/// Environment variable overriding the log level.
const LOG_ENV: &str = "STEPRUN_LOG";

#[derive(Parser, Debug)]
#[command(name = "steprun", version, about = "Build the ordered pod layout of a task")]
struct Cli {
    /// Task manifest (YAML), or `-` for stdin
    manifest: PathBuf,

    /// Config file (default: ~/.steprun/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Namespace to resolve registry credentials in
    #[arg(long)]
    namespace: Option<String>,

    /// Identity to resolve registry credentials as
    #[arg(long)]
    service_account: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => std::env::var(LOG_ENV)
            .ok()
            .and_then(|v| Level::from_str(&v).ok())
            .unwrap_or(Level::INFO),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn read_manifest(path: &Path) -> std::io::Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read(path)
    }
}

async fn run(cli: Cli) -> steprun::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(ns) = cli.namespace {
        config.namespace = ns;
    }
    if let Some(sa) = cli.service_account {
        config.service_account = sa;
    }

    let task = TaskSpec::from_yaml(&read_manifest(&cli.manifest)?)?;
    info!(
        "Loaded task: {} steps, {} sidecars",
        task.steps.len(),
        task.sidecars.len()
    );

    let source = OciImageSource::with_protocol(config.registry.protocol.into())
        .with_timeout(config.registry.lookup_timeout());
    let keychain = StaticKeychain::new(config.registry.credentials.clone());
    let cache = EntrypointCache::with_capacity(
        Arc::new(source),
        Arc::new(keychain),
        config.cache_capacity,
    )?;
    let names = match config.name_seed {
        Some(seed) => SimpleNameGenerator::with_seed(seed),
        None => SimpleNameGenerator::new(),
    };

    let builder = PodBuilder::new(Arc::new(cache), Arc::new(names), config.pod_options());
    let layout = builder.build(&task).await?;

    println!("{}", serde_json::to_string_pretty(&layout)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(cli.verbose))
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set tracing subscriber");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
