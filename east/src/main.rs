//! East - build-type and release matrix engine for Zephyr/NCS firmware

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{build::BuildRequest, Cli, Commands};

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let default_filter = if cli.global.verbose {
        "east=debug,convenient_eastyml=debug,convenient_west=debug,convenient_git=debug"
    } else {
        "east=info,convenient_eastyml=info,convenient_west=info,convenient_git=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let code = match &cli.command {
        Commands::Release { dry_run } => commands::release::execute(&cli.global, *dry_run).await?,
        Commands::Build {
            board,
            app,
            sample,
            build_type,
            build_dir,
        } => {
            let request = BuildRequest {
                board,
                app: app.as_deref(),
                sample: sample.as_deref(),
                build_type: build_type.as_deref(),
                build_dir,
            };
            commands::build::execute(&cli.global, request).await?
        }
        Commands::Toolchain => commands::toolchain::execute(&cli.global)?,
        Commands::Version { tag, paths } => {
            commands::version::execute(&cli.global, tag.as_deref(), paths).await?
        }
    };

    Ok(ExitCode::from(code))
}
