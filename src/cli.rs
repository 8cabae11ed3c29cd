//! Command-line surface (spec §6).

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mirror")]
#[command(about = "Reproducibly mirror files from upstream repositories into this one")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeatable, up to -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Decrease log verbosity (repeatable, up to -qqq)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub quiet: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a manifest, check out every upstream, and write the initial lock
    Install(InstallArgs),

    /// Report whether every mirrored file is still up to date
    Check(CheckArgs),

    /// Update mirrored files to match their upstream, three-way merging local edits
    Sync,
}

#[derive(Parser)]
pub struct InstallArgs {
    /// Manifest file to install from, relative to this repository (or to
    /// `--config-repo`'s root when given)
    #[arg(long, default_value = ".mirror.yaml")]
    pub config: String,

    /// Fetch the manifest from this remote instead of the local filesystem
    #[arg(long)]
    pub config_repo: Option<String>,
}

#[derive(Parser)]
pub struct CheckArgs {
    /// Print a one-line "run `mirror sync`" reminder when out of date
    #[arg(long)]
    pub pre_commit: bool,
}
