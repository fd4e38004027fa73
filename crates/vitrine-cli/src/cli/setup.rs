use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Returns the version string, including git hash and commit date for non-release builds.
/// Format for releases: "v0.3.2"
/// Format for dev builds: "v0.3.2\ndev: abc1234 2026-01-15"
fn get_version() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("VITRINE_GIT_HASH");
    const COMMIT_DATE: &str = env!("VITRINE_COMMIT_DATE");
    const IS_RELEASE: &str = env!("VITRINE_IS_RELEASE");

    use std::sync::OnceLock;
    static VERSION_STRING: OnceLock<String> = OnceLock::new();

    VERSION_STRING.get_or_init(|| {
        if IS_RELEASE == "true" || GIT_HASH.is_empty() {
            format!("v{}", VERSION)
        } else {
            format!("v{}\ndev: {} {}", VERSION, GIT_HASH, COMMIT_DATE)
        }
    })
}

#[derive(Parser, Debug)]
#[command(
    name = "vitrine",
    bin_name = "vitrine",
    version = get_version(),
    disable_help_subcommand = true
)]
#[command(about = "Resolve, serve and repair marketplace images", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Uploads directory (overrides `uploads_root`)
    #[arg(long, global = true, value_name = "DIR", help_heading = "Options")]
    pub uploads: Option<PathBuf>,

    /// Print structured JSON instead of messages
    #[arg(long, global = true, help_heading = "Options")]
    pub json: bool,

    /// Verbose logging on stderr
    #[arg(short, long, global = true, help_heading = "Options")]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the primary image of an owner (store:<id> or product:<store>:<product>)
    #[command(display_order = 1)]
    Resolve { owner: String },

    /// Answer a primary-image route or an uploads path the way the server would
    #[command(display_order = 2)]
    Route { path: String },

    /// Show the path guard's decision for an uploads path
    #[command(display_order = 3)]
    Guard {
        path: String,

        /// Entity the request is made for, enabling the owner search
        #[arg(long)]
        owner: Option<String>,
    },

    /// Diagnose records against the uploads tree without changing anything
    #[command(display_order = 10)]
    Doctor,

    /// Diagnose and repair records and files
    #[command(display_order = 11)]
    Repair {
        /// Show the plan without applying it
        #[arg(long)]
        dry_run: bool,

        /// Delete demoted duplicate primaries and their files
        #[arg(long)]
        dedupe: bool,
    },

    /// Make a record the only primary image of its owner (e.g. s12, p7)
    #[command(display_order = 12)]
    Promote { id: String },

    /// Replay the client image fallback cascade for a source URL
    #[command(display_order = 20)]
    Cascade {
        src: String,

        /// Entity the image belongs to
        #[arg(long)]
        owner: Option<String>,

        /// Site origin, so absolute URLs on it map onto the uploads tree
        #[arg(long)]
        origin: Option<String>,
    },

    /// Show the effective configuration
    #[command(display_order = 30)]
    Config {
        /// Print a commented template instead
        #[arg(long)]
        template: bool,
    },
}
