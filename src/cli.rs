use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "molgnn",
    about = "Train a message-passing network on molecules with extra per-atom features",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Train on a record file and write a checkpoint
    Train(TrainArgs),

    /// Predict labels for a record file from a saved checkpoint
    Predict(PredictArgs),
}

#[derive(Args)]
pub struct TrainArgs {
    /// Record file of (smiles, features, label) tuples: pickle, or JSON with a .json extension
    #[arg(short, long, value_name = "FILE")]
    pub data: PathBuf,

    /// How the extra atom values enter the network: feature or descriptor
    #[arg(short, long, value_name = "MODE", default_value = "feature")]
    pub mode: String,

    /// Training config (TOML); missing keys take defaults
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Overrides the config's epoch count
    #[arg(long, value_name = "N")]
    pub epochs: Option<usize>,

    /// Overrides the config's checkpoint directory
    #[arg(long, value_name = "DIR")]
    pub artifact_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Record file; labels are shown next to the predictions
    #[arg(short, long, value_name = "FILE")]
    pub data: PathBuf,

    /// Checkpoint directory written by `train`
    #[arg(long, value_name = "DIR", default_value = "checkpoints")]
    pub artifact_dir: PathBuf,
}

pub fn parse() -> Cli {
    Cli::parse()
}
