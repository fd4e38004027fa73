//! # CLI Layer
//!
//! The only place that:
//! - Knows about terminal I/O (stdout, stderr)
//! - Installs the tracing subscriber
//! - Handles argument parsing
//! - Turns error-level results into a failing exit code

use super::render;
use super::setup::{Cli, Commands};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vitrine::api::{CmdResult, MessageLevel};
use vitrine::error::{Result, VitrineError};
use vitrine::init::initialize;

const LOG_ENV: &str = "VITRINE_LOG";

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let cwd = std::env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
    let mut ctx = initialize(&cwd, cli.uploads.clone())?;
    debug!(project = %ctx.project_root.display(), "context ready");

    let api = &mut ctx.api;
    let result = match &cli.command {
        Commands::Resolve { owner } => api.resolve(owner)?,
        Commands::Route { path } => api.route(path)?,
        Commands::Guard { path, owner } => api.guard(path, owner.as_deref())?,
        Commands::Doctor => api.doctor()?,
        Commands::Repair { dry_run, dedupe } => api.repair(*dedupe, *dry_run)?,
        Commands::Promote { id } => api.promote(id)?,
        Commands::Cascade { src, owner, origin } => {
            api.cascade(src, owner.as_deref(), origin.as_deref())?
        }
        Commands::Config { template } => api.show_config(*template)?,
    };

    output(&result, cli.json)?;
    if result.has_level(MessageLevel::Error) {
        return Err(VitrineError::Api("finished with errors".to_string()));
    }
    Ok(())
}

/// Logs go to stderr so `--json` output stays parseable.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn output(result: &CmdResult, json: bool) -> Result<()> {
    if json {
        render::print_json(result)
    } else {
        render::print_messages(&result.messages);
        Ok(())
    }
}
