use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "mvdose",
    version,
    about = "Rebuild MV imager beam dose records from treatment-view logs"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    /// Skip sources that cannot be opened instead of aborting the run.
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub skip_unreadable: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the discovered log sources in reconstruction order.
    Sources {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// List plans with their treatment days and beam counts.
    Plans {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Write the beams of one plan on one day as JSON lines.
    Entries {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        plan: String,
        /// Day as YYYY-MM-DD.
        #[arg(long)]
        date: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print QA summaries for a plan, one per treatment day.
    Summary {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        plan: String,
        #[arg(long)]
        date: Option<String>,
    },
    /// Write every accepted beam as JSON lines.
    Dump {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
}
