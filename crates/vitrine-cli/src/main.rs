//! # Vitrine CLI
//!
//! The binary is thin: `cli::run()` does the work, this file only maps an error
//! to a message on stderr and exit code 1.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  CLI Layer (crates/vitrine-cli/src/cli/)                    │
//! │  - clap argument parsing (setup.rs)                         │
//! │  - logging + context wiring + dispatch (commands.rs)        │
//! │  - colored messages or JSON (render.rs)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  API Layer (crates/vitrine/src/api.rs)                      │
//! │  - Parses owners and record ids, returns `CmdResult`        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything from the API inward never prints. Diagnostics go through
//! `tracing` to stderr, filtered by `VITRINE_LOG` (default `warn`, `-v` for
//! `debug`).

mod cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
