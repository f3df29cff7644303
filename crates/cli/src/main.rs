// placefuse CLI - config-driven place entity resolution

mod exit_codes;
mod resolve;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::EXIT_SUCCESS;

#[derive(Parser)]
#[command(name = "placefuse")]
#[command(about = "Resolve place records from several sources into golden records")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Log per-chunk detail (same as RUST_LOG=debug)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Block, score, match, cluster and conflate every configured source
    #[command(after_help = "\
Examples:
  placefuse resolve philly.resolve.toml
  placefuse resolve philly.resolve.toml --output golden.jsonl
  placefuse resolve philly.resolve.toml --json > result.json
  placefuse resolve philly.resolve.toml --checkpoint-dir .chunks")]
    Resolve {
        /// Path to .resolve.toml config file
        config: PathBuf,

        /// Write golden records as JSON lines to this file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Print the full result (summary, clusters, golden records) as JSON
        #[arg(long)]
        json: bool,

        /// Save candidate chunks here and resume from them on rerun
        #[arg(long, env = "PLACEFUSE_CHECKPOINT_DIR")]
        checkpoint_dir: Option<PathBuf>,
    },

    /// Weak-label candidate pairs and build a review queue and training set
    #[command(after_help = "\
Examples:
  placefuse label philly.resolve.toml --review-out review.csv
  placefuse label philly.resolve.toml --overrides reviewed.csv --training-out train.jsonl")]
    Label {
        /// Path to .resolve.toml config file
        config: PathBuf,

        /// Reviewed labels: CSV with left_id,right_id,label (0 or 1)
        #[arg(long)]
        overrides: Option<PathBuf>,

        /// Write still-ambiguous pairs to this CSV for review
        #[arg(long)]
        review_out: Option<PathBuf>,

        /// Write the balanced training set as JSON lines
        #[arg(long)]
        training_out: Option<PathBuf>,
    },

    /// Parse and validate a config without reading any source
    #[command(after_help = "\
Examples:
  placefuse validate philly.resolve.toml")]
    Validate {
        /// Path to .resolve.toml config file
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  placefuse-resolve ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug",
            "\ntarget:  ", env!("TARGET"),
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            " (", env!("GIT_COMMIT_HASH"), ")",
            "\nengine:  placefuse-resolve ", env!("CARGO_PKG_VERSION"),
            "\nbuild:   release",
            "\ntarget:  ", env!("TARGET"),
        )
    }
}

/// RUST_LOG wins over --verbose.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Resolve {
            config,
            output,
            json,
            checkpoint_dir,
        } => resolve::cmd_resolve(config, output, json, checkpoint_dir),
        Commands::Label {
            config,
            overrides,
            review_out,
            training_out,
        } => resolve::cmd_label(config, overrides, review_out, training_out),
        Commands::Validate { config } => resolve::cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
