use std::path::PathBuf;

use clap::Parser;

use crate::Commands;

/// Global options plus the command to run
#[derive(Parser)]
#[clap(
    name = "noto",
    version,
    about = "PARA-organized Markdown notes with optimistic sync"
)]
pub struct Cli {
    /// Config file to use instead of the platform default
    #[clap(short = 'c', long, value_parser)]
    pub config: Option<PathBuf>,

    /// Root directory of the local document store
    #[clap(long, value_parser)]
    pub data_dir: Option<PathBuf>,

    /// Act as this user instead of the configured one
    #[clap(short, long)]
    pub user: Option<String>,

    /// Log at debug level and print extra detail
    #[clap(short, long)]
    pub verbose: bool,

    /// What to do
    #[clap(subcommand)]
    pub command: Commands,
}
