use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pvesync")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative Proxmox VE configuration through pvesh", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// pvesh executable to run
    #[arg(long, value_name = "PATH", env = "PVESYNC_PVESH", global = true)]
    pub pvesh: Option<PathBuf>,

    /// Manifest file (default: ~/.config/pvesync/manifest.toml)
    #[arg(short = 'f', long, value_name = "PATH", env = "PVESYNC_MANIFEST", global = true)]
    pub manifest: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Make the node match the manifest
    Apply(ApplyArgs),

    /// Preview what apply would change
    Plan(PlanArgs),

    /// Print the JSON of one API path
    Query {
        /// API path, e.g. nodes/pve1/status
        path: String,
    },

    /// Check whether the booted kernel is the newest installed one
    Kernel(KernelArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Apply / Plan
// ============================================================================

#[derive(Args)]
pub struct ApplyArgs {
    /// Only this resource type or type.name (e.g. user, storage.local-zfs)
    pub target: Option<String>,

    /// Show what would change without changing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Show before/after state of changed resources
    #[arg(short, long)]
    pub diff: bool,

    /// Apply without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Print outcomes as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Only this resource type or type.name
    pub target: Option<String>,

    /// Show before/after state of changed resources
    #[arg(short, long)]
    pub diff: bool,

    /// Print outcomes as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Kernel
// ============================================================================

#[derive(Args)]
pub struct KernelArgs {
    /// Skip looking up owning packages with dpkg-query
    #[arg(long)]
    pub no_packages: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}
