//! Oleander CLI: the command-line front end of the library loader.
//!
//! Provides `oleander deps` to inspect a program's resolved dependencies,
//! `oleander paths` to list the artifact paths of modules, `oleander stage`
//! to fetch a program's library into a directory, `oleander unpack` to
//! extract a bulk archive and `oleander run` to execute a program in a
//! sandbox process.

#![warn(missing_docs)]

mod deps;
mod paths;
mod pipeline;
mod run;
mod stage;
mod unpack;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Oleander: dependency resolution and incremental library loading.
#[derive(Parser, Debug)]
#[command(name = "oleander", version, about = "Oleander library loader")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `oleander.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the resolved dependencies of a source file.
    Deps(DepsArgs),
    /// Print the candidate artifact paths of modules.
    Paths(PathsArgs),
    /// Fetch a program's library into a directory.
    Stage(StageArgs),
    /// Extract the valid artifacts of a bulk archive.
    Unpack(UnpackArgs),
    /// Stage a program's library and run it in a sandbox process.
    Run(RunArgs),
}

/// Arguments for the `oleander deps` subcommand.
#[derive(Parser, Debug)]
pub struct DepsArgs {
    /// Source file to analyze.
    pub file: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for the `oleander paths` subcommand.
#[derive(Parser, Debug)]
pub struct PathsArgs {
    /// Dotted module names (e.g., `Init.Data.String`).
    #[arg(required = true, num_args = 1..)]
    pub modules: Vec<String>,
}

/// Arguments for the `oleander stage` subcommand.
#[derive(Parser, Debug)]
pub struct StageArgs {
    /// Source file whose imports select the library.
    #[arg(required_unless_present = "all")]
    pub file: Option<PathBuf>,

    /// Output directory.
    #[arg(short, long)]
    pub out: PathBuf,

    /// Stage every artifact in the server's file listing.
    #[arg(long)]
    pub all: bool,
}

/// Arguments for the `oleander unpack` subcommand.
#[derive(Parser, Debug)]
pub struct UnpackArgs {
    /// Tar archive, optionally gzip-compressed.
    pub archive: PathBuf,

    /// Output directory.
    #[arg(short, long)]
    pub out: PathBuf,
}

/// Arguments for the `oleander run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Source file to run.
    pub file: PathBuf,

    /// Sandbox program to launch.
    #[arg(long)]
    pub sandbox: String,

    /// Override `sandbox.timeout_secs`.
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Arguments passed to the sandbox program.
    #[arg(last = true)]
    pub sandbox_args: Vec<String>,
}

/// Output format for reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };
    pipeline::init_logging(&global);

    let result = match cli.command {
        Command::Deps(ref args) => deps::run(args, &global),
        Command::Paths(ref args) => paths::run(args, &global),
        Command::Stage(ref args) => stage::run(args, &global),
        Command::Unpack(ref args) => unpack::run(args, &global),
        Command::Run(ref args) => run::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
