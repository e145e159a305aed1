use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)] // requires `derive` feature
#[command(name = "hashfs")]
#[command(about = "Index files into a content-addressable catalog", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./Config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Index source directories into the catalog
    Index(IndexArgs),
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Source directories; sub-directories of other sources are folded away
    #[arg(value_name = "DIR")]
    pub dirs: Vec<String>,

    /// Hashing algorithm (md5, sha1, sha224, sha256, sha384, sha512, blake3)
    #[arg(long = "hash", value_name = "ALGO")]
    pub hash_algorithm: Option<String>,

    /// Path of the catalog database
    #[arg(long, value_name = "PATH")]
    pub catalog: Option<String>,

    /// Number of worker threads
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,

    /// Index into an in-memory catalog that is discarded afterwards
    #[arg(long)]
    pub memory: bool,
}
