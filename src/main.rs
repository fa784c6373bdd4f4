mod cli;
mod features;
mod model;
mod rank;
mod schema;
mod scorer;
mod server;
mod service;
mod source;
mod storage;
mod synthetic;
mod table;

use anyhow::Context;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stderr keeps `rank` output on stdout clean JSON.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    match args.cmd {
        cli::Command::Serve(cmd) => server::run(cmd).await.context("serve failed"),
        cli::Command::Rank(cmd) => rank::run(cmd).context("rank failed"),
    }
}
