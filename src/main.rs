mod cli;
mod commands;
mod config;
mod engine;
mod progress;
mod resource;
mod runner;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use commands::apply::ApplyFlags;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// pvesh executable from the command line or environment
    pub pvesh: Option<PathBuf>,
    /// Manifest from the command line or environment
    pub manifest: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        pvesh: cli.pvesh,
        manifest: cli.manifest,
    };

    match cli.command {
        Command::Apply(args) => commands::apply::run(
            &ctx,
            args.target.as_deref(),
            &ApplyFlags {
                dry_run: args.dry_run,
                diff: args.diff,
                yes: args.yes,
                json: args.json,
            },
        ),
        Command::Plan(args) => commands::apply::run(
            &ctx,
            args.target.as_deref(),
            &ApplyFlags {
                dry_run: true,
                diff: args.diff,
                yes: true,
                json: args.json,
            },
        ),
        Command::Query { path } => commands::query::run(&ctx, &path),
        Command::Kernel(args) => commands::kernel::run(&ctx, args.no_packages, args.json),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "pvesync", &mut io::stdout());
            Ok(())
        }
    }
}
