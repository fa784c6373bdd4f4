use anyhow::{Context, anyhow};

use crate::cli::RankArgs;
use crate::scorer::QueryTime;
use crate::service::{INVALID_TIME_MESSAGE, Prediction, Service};

pub fn run(opts: RankArgs) -> anyhow::Result<()> {
    let at: QueryTime = opts
        .time
        .parse()
        .map_err(|e| anyhow!("{INVALID_TIME_MESSAGE}: {e}"))?;

    let service = Service::bootstrap(&opts.data.paths(), opts.data.seed)?;
    let doctors = service.rank(at).context("rank doctors")?;
    tracing::info!("Ranked {} of {} doctors for {}", doctors.len(), service.population_size(), at);

    let out = serde_json::to_string_pretty(&Prediction::new(at, doctors))?;
    println!("{out}");
    Ok(())
}
