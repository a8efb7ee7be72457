//! App host bundle CLI tool
//!
//! Inspect, extract, query and build single-file application bundles.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

mod commands;

#[derive(Parser)]
#[command(name = "apphost")]
#[command(about = "Single-file application bundle toolkit", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the header and manifest of a bundle
    Inspect {
        /// Bundle executable
        bundle: PathBuf,
        /// Header offset (read from the bundle marker if omitted)
        #[arg(long)]
        header_offset: Option<i64>,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Extract the files a bundle needs on disk, or verify an existing extraction
    Extract {
        /// Bundle executable
        bundle: PathBuf,
        /// Header offset (read from the bundle marker if omitted)
        #[arg(long)]
        header_offset: Option<i64>,
        /// Extraction base directory (defaults to DOTNET_BUNDLE_EXTRACT_BASE_DIR or ~/.net)
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },

    /// Show where a bundled file is served from
    Locate {
        /// Bundle executable
        bundle: PathBuf,
        /// Relative path inside the bundle
        path: String,
        /// Header offset (read from the bundle marker if omitted)
        #[arg(long)]
        header_offset: Option<i64>,
        /// Extraction base directory
        #[arg(long)]
        base_dir: Option<PathBuf>,
    },

    /// Append files to a host executable
    Pack {
        /// Host executable to bundle into
        #[arg(long)]
        host: PathBuf,
        /// Output bundle path
        #[arg(short, long)]
        output: PathBuf,
        /// Directory that relative paths are computed from
        #[arg(long)]
        root: Option<PathBuf>,
        /// Deflate files when it makes them smaller
        #[arg(long)]
        compress: bool,
        /// Extract every file, including assemblies (legacy layout)
        #[arg(long)]
        extract_all: bool,
        /// Fixed bundle id instead of a content hash
        #[arg(long)]
        bundle_id: Option<String>,
        /// Files to embed
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect {
            bundle,
            header_offset,
            json,
        } => commands::inspect::execute(&bundle, header_offset, json),

        Commands::Extract {
            bundle,
            header_offset,
            base_dir,
        } => commands::extract::execute(&bundle, header_offset, base_dir),

        Commands::Locate {
            bundle,
            path,
            header_offset,
            base_dir,
        } => commands::locate::execute(&bundle, &path, header_offset, base_dir),

        Commands::Pack {
            host,
            output,
            root,
            compress,
            extract_all,
            bundle_id,
            files,
        } => commands::pack::execute(commands::pack::PackOptions {
            host,
            output,
            root,
            compress,
            extract_all,
            bundle_id,
            files,
        }),
    }
}
