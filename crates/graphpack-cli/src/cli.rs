use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "graphpack",
    about = "Inspect packed object-graph documents",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Summarize a document: version, root, object and type counts
    Inspect(DocumentArgs),
    /// List the document type table and which types objects use
    Types(DocumentArgs),
    /// Verify every reference reachable from the root has an object entry
    Check(CheckArgs),
}

#[derive(Args)]
pub struct DocumentArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct CheckArgs {
    pub path: PathBuf,
    /// Also fail when some objects are unreachable from the root
    #[arg(long)]
    pub strict: bool,
}
