// src/cli.rs
//! CLI definitions for pkgplan
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pkgplan")]
#[command(author = "pkgplan Contributors")]
#[command(version)]
#[command(about = "Match dependency atoms and plan package installs and removals", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Where package metadata and policy come from
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// TOML catalog with repositories and installed packages
    #[arg(short, long)]
    pub catalog: Option<PathBuf>,

    /// SQLite repository store (repeatable, in declaration order)
    #[arg(long = "repo-db")]
    pub repo_db: Vec<PathBuf>,

    /// SQLite installed-packages store
    #[arg(long)]
    pub installed_db: Option<PathBuf>,

    /// Resolver configuration (masks, keywords, licenses)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a specifier to the package it selects
    Match {
        /// Dependency specifier, e.g. ">=app/foo-1.1"
        spec: String,

        /// Show every matching package instead of the best one
        #[arg(long)]
        all: bool,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Plan the installation of one or more specifiers
    Install {
        /// Specifiers to install
        #[arg(required = true)]
        targets: Vec<String>,

        /// Require installed dependencies to be the best available match
        #[arg(long)]
        deep: bool,

        /// Follow optional dependencies
        #[arg(long)]
        with_optional: bool,

        /// Cache plans in this directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        #[command(flatten)]
        sources: SourceArgs,
    },

    /// Plan the removal of installed packages
    Remove {
        /// Specifiers of installed packages to remove
        #[arg(required = true)]
        targets: Vec<String>,

        /// Also remove dependencies nothing else needs
        #[arg(long)]
        deep: bool,

        /// Cache plans in this directory
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        #[command(flatten)]
        sources: SourceArgs,
    },
}
