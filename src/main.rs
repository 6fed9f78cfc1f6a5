use std::fs::{self, OpenOptions};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rssforward::app::AppContext;
use rssforward::cli::{commands, Cli, Commands};
use rssforward::config::{Config, GeneralConfig};

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_logging(&config.general);

    match &cli.config {
        Some(path) => info!(config = %path.display(), "Configuration loaded"),
        None => warn!("No config file given, running with defaults"),
    }

    let ctx = AppContext::with_config(config, Config::watermark_path()?)?;

    match cli.command.unwrap_or_default() {
        Commands::Run => {
            commands::run(&ctx, cli.no_server, cli.no_loop)?;
        }
        Commands::Generate => {
            if !commands::generate(&ctx)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::List => {
            commands::list_generators(&ctx)?;
        }
        Commands::OpenLog => {
            commands::open_log(&ctx)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Console output plus `<logdir>/log.txt` when the directory is writable.
fn init_logging(general: &GeneralConfig) {
    let file = fs::create_dir_all(&general.log_dir)
        .and_then(|_| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(general.log_file())
        })
        .ok();
    let file_layer = file.map(|f| fmt::layer().with_writer(Mutex::new(f)).with_ansi(false));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(file_layer)
        .init();
}
