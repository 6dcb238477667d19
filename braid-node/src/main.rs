use clap::Parser;
use tracing_subscriber::EnvFilter;

use braid_node::{cli, config};

/// Log filter: `RUST_LOG` if set, else the configured level for `run`.
fn log_filter(cli: &cli::Cli) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match &cli.command {
            cli::Command::Run { config: path, dev: false, .. } => config::NodeConfig::load(path)
                .map(|c| c.logging.level)
                .unwrap_or_else(|_| "info".to_string()),
            _ => "info".to_string(),
        };
        EnvFilter::new(level)
    })
}

fn main() {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&cli))
        .init();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create Tokio runtime");
    rt.block_on(async {
        if let Err(e) = cli::run(cli).await {
            tracing::error!("Fatal error: {}", e);
            std::process::exit(1);
        }
    });
}
