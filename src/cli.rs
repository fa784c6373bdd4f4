use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::storage::DataPaths;

const DEFAULT_DATA_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/data");

#[derive(Parser, Debug)]
#[command(name = "survey-ranker")]
#[command(about = "Ranks doctors by likelihood of completing a survey at a given time", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train on startup, then serve the prediction API.
    Serve(ServeArgs),
    /// Train, rank once for a single time, print JSON to stdout.
    Rank(RankArgs),
}

#[derive(clap::Args, Debug, Clone)]
pub struct DataArgs {
    /// Directory searched for dummy_npi_data.{parquet,csv,xlsx}.
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: String,

    /// Explicit dataset file (CSV, Parquet, JSON or XLSX); overrides --data-dir.
    #[arg(long)]
    pub data_file: Option<String>,

    /// Seed for synthetic data and randomized feature fallbacks.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

impl DataArgs {
    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.data_dir, self.data_file.as_ref().map(PathBuf::from))
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 5000)]
    pub port: u16,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RankArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Query time, 24-hour HH:MM.
    #[arg(long, default_value = "09:00")]
    pub time: String,
}
