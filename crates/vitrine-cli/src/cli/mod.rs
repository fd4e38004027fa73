//! # CLI Behavior
//!
//! One client of the vitrine library. Every subcommand maps to one API call:
//!
//! - `vitrine resolve store:4`: which file the primary-image endpoint would stream
//! - `vitrine route /api/products/21/primary-image`: full HTTP answer for a route
//! - `vitrine guard /uploads/stores/4/a.jpg`: the guard's verdict on a path
//! - `vitrine doctor`: list inconsistencies, change nothing
//! - `vitrine repair [--dry-run] [--dedupe]`: converge records and files
//! - `vitrine promote s12`: make a record its owner's only primary
//! - `vitrine cascade <src>`: replay the client fallback cascade
//! - `vitrine config [--template]`: effective configuration
//!
//! `--json` prints the command's structured data instead of messages. A command
//! that reports an error-level message (a failed repair action) exits with 1.
//!
//! ## Module Structure
//!
//! - `setup`: argument parsing via clap
//! - `commands`: logging, context init and dispatch
//! - `render`: terminal output

mod commands;
mod render;
pub mod setup;

pub use commands::run;
