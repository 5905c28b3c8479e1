//! devmatch CLI - inspect resolver configuration and replay scenarios

mod cli;
mod commands;
mod scenario;

use clap::Parser;
use cli::{Cli, Commands};
use devmatch_kernel::ResolverConfig;
use devmatch_kernel::error::IntoKernelReport;
use error_stack::ResultExt;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt().with_env_filter("debug").init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }

    let config = load_config(&cli)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_command_async(cli, config))
}

fn load_config(cli: &Cli) -> anyhow::Result<ResolverConfig> {
    let source = cli
        .config
        .as_ref()
        .map_or_else(|| "defaults".to_string(), |p| p.display().to_string());

    ResolverConfig::load(cli.config.as_deref())
        .into_report()
        .attach(format!("loading resolver config from {source}"))
        .map_err(|report| anyhow::anyhow!("{report:?}"))
}

async fn run_command_async(cli: Cli, config: ResolverConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Config => {
            commands::config::run(&config)?;
        }

        Commands::Simulate {
            scenario,
            settle_ms,
        } => {
            commands::simulate::run(&scenario, config, settle_ms).await?;
        }
    }

    Ok(())
}
