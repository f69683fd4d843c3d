// src/main.rs

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Match { spec, all, sources } => commands::cmd_match(&spec, all, &sources),
        Commands::Install {
            targets,
            deep,
            with_optional,
            cache_dir,
            sources,
        } => commands::cmd_install(&targets, deep, with_optional, cache_dir.as_deref(), &sources),
        Commands::Remove {
            targets,
            deep,
            cache_dir,
            sources,
        } => commands::cmd_remove(&targets, deep, cache_dir.as_deref(), &sources),
    }
}
