use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail};
use rand::Rng;
use serde::Serialize;

use crate::features::query_features;
use crate::model::TrainedModel;
use crate::schema::CanonicalField;
use crate::table::Table;

/// Longest ranked list returned for one query.
pub const TOP_N: usize = 20;

/// Validated 24-hour clock time. Parsing accepts unpadded parts (`9:5`) and
/// `Display` always renders zero-padded `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryTime {
    hour: u8,
    minute: u8,
}

impl QueryTime {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }
}

impl FromStr for QueryTime {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("time must be HH:MM"))?;
        let hour: u8 = hour.trim().parse().map_err(|_| anyhow!("bad hour: {hour}"))?;
        let minute: u8 = minute
            .trim()
            .parse()
            .map_err(|_| anyhow!("bad minute: {minute}"))?;
        QueryTime::new(hour, minute).ok_or_else(|| anyhow!("time out of range: {s}"))
    }
}

impl fmt::Display for QueryTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Population scored at query time: the raw table plus the engagement minutes
/// derived for it during training.
#[derive(Debug, Clone)]
pub struct Population {
    table: Table,
    time_spent_minutes: Vec<f64>,
}

impl Population {
    pub fn new(table: Table, time_spent_minutes: Vec<f64>) -> anyhow::Result<Self> {
        if table.len() != time_spent_minutes.len() {
            bail!(
                "population has {} rows but {} time spent values",
                table.len(),
                time_spent_minutes.len()
            );
        }
        Ok(Self {
            table,
            time_spent_minutes,
        })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedDoctor {
    pub npi: String,
    pub specialty: String,
    pub region: String,
    pub likelihood_score: f64,
}

/// Distance between two hours on a 24-hour clock, in `0..=12`.
pub fn circular_hour_distance(a: u8, b: u8) -> u8 {
    let d = a.abs_diff(b) % 24;
    d.min(24 - d)
}

/// `1 / (1 + hour_diff)`: 1.0 at the same hour, never zero.
pub fn time_factor(hour_diff: u8) -> f64 {
    1.0 / (1.0 + f64::from(hour_diff))
}

/// Blends probability and time factor onto a 0-100 scale, one decimal place.
pub fn likelihood_score(probability: f64, time_factor: f64) -> f64 {
    let raw = probability.clamp(0.0, 1.0) * time_factor * 100.0;
    (raw * 10.0).round() / 10.0
}

/// Ranks the population for a query time. Reads the shared table and model
/// without mutating either.
pub fn rank<R: Rng + ?Sized>(
    model: &TrainedModel,
    population: &Population,
    at: QueryTime,
    rng: &mut R,
) -> anyhow::Result<Vec<RankedDoctor>> {
    let mapping = model.mapping();
    let table = &population.table;
    let features = query_features(table, mapping, &population.time_spent_minutes, rng)?;
    let proba = model.completion_probability(&features)?;
    if proba.len() != features.len() {
        bail!(
            "model returned {} probabilities for {} rows",
            proba.len(),
            features.len()
        );
    }

    let npi = identifiers(table, mapping.get(CanonicalField::Npi));
    let mut scored: Vec<(usize, f64)> = features
        .login_hour
        .iter()
        .zip(&proba)
        .map(|(&hour, &p)| {
            let diff = circular_hour_distance(hour, at.hour());
            likelihood_score(p, time_factor(diff))
        })
        .enumerate()
        .collect();
    // Stable: equal scores keep table order.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(TOP_N);

    let mut specialty = features.specialty;
    let mut region = features.region;
    Ok(scored
        .into_iter()
        .map(|(i, score)| RankedDoctor {
            npi: npi[i].clone(),
            specialty: std::mem::take(&mut specialty[i]),
            region: std::mem::take(&mut region[i]),
            likelihood_score: score,
        })
        .collect())
}

// Without an identifier column, rows are identified by 1-based position.
fn identifiers(table: &Table, npi_column: Option<&str>) -> Vec<String> {
    match npi_column.and_then(|name| table.column(name)) {
        Some(col) => col
            .values
            .iter()
            .map(|v| v.as_deref().map(str::trim).unwrap_or_default().to_string())
            .collect(),
        None => (1..=table.len()).map(|i| i.to_string()).collect(),
    }
}
