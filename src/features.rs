use std::ops::Range;

use anyhow::{anyhow, bail};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rand::Rng;

use crate::schema::{CanonicalField, FieldMapping};
use crate::table::{Column, ColumnKind, Table};

pub const DEFAULT_LOGIN_HOUR: u8 = 12;
pub const DEFAULT_LOGIN_MINUTE: u8 = 0;
pub const DEFAULT_SESSION_MINUTES: f64 = 30.0;
pub const UNKNOWN_CATEGORY: &str = "Unknown";

const RANDOM_LOGIN_HOURS: Range<u8> = 8..18;
const RANDOM_SESSION_MINUTES: Range<u32> = 5..60;
const FALLBACK_COMPLETION_RATE: f64 = 0.7;
const MINUTES_PER_DAY: f64 = 24.0 * 60.0;

/// Where a derived column came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// Read from the resolved source column(s).
    Source,
    /// Computed from login and logout timestamps.
    Session,
    /// Column-level fallback to seeded random values.
    Randomized,
}

/// Columnar feature table fed to the preprocessing pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    pub login_hour: Vec<u8>,
    pub login_minute: Vec<u8>,
    pub time_spent_minutes: Vec<f64>,
    pub specialty: Vec<String>,
    pub region: Vec<String>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.login_hour.len()
    }

    pub fn is_empty(&self) -> bool {
        self.login_hour.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginTimes {
    pub hours: Vec<u8>,
    pub minutes: Vec<u8>,
    pub derivation: Derivation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeSpent {
    pub minutes: Vec<f64>,
    pub derivation: Derivation,
}

/// Continuous completion proxy: attempts / max(attempts), or Bernoulli(0.7)
/// when no usable attempt counts exist. Not a true outcome label.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionLabels {
    pub values: Vec<f64>,
    pub derivation: Derivation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub features: FeatureFrame,
    pub target: Vec<f64>,
    pub label_derivation: Derivation,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Derives the full training table. Fails only when specialty or region
/// cannot be resolved; every other gap is filled by a fallback.
pub fn training_set<R: Rng + ?Sized>(
    table: &Table,
    mapping: &FieldMapping,
    rng: &mut R,
) -> anyhow::Result<TrainingSet> {
    let specialty = categorical(table, mapping, CanonicalField::Specialty)?;
    let region = categorical(table, mapping, CanonicalField::Region)?;
    let login = login_times(table, mapping, rng);
    let spent = time_spent(table, mapping, rng);
    let labels = completion_labels(table, mapping, rng);

    tracing::info!(
        "Derived features for {} rows (login={:?}, time_spent={:?}, label={:?})",
        table.len(),
        login.derivation,
        spent.derivation,
        labels.derivation
    );

    Ok(TrainingSet {
        features: FeatureFrame {
            login_hour: login.hours,
            login_minute: login.minutes,
            time_spent_minutes: spent.minutes,
            specialty,
            region,
        },
        target: labels.values,
        label_derivation: labels.derivation,
    })
}

/// Feature table for scoring: login time is re-derived, engagement minutes
/// are carried over from training.
pub fn query_features<R: Rng + ?Sized>(
    table: &Table,
    mapping: &FieldMapping,
    time_spent_minutes: &[f64],
    rng: &mut R,
) -> anyhow::Result<FeatureFrame> {
    if time_spent_minutes.len() != table.len() {
        bail!(
            "time spent has {} rows, population has {}",
            time_spent_minutes.len(),
            table.len()
        );
    }
    let specialty = categorical(table, mapping, CanonicalField::Specialty)?;
    let region = categorical(table, mapping, CanonicalField::Region)?;
    let login = login_times(table, mapping, rng);
    Ok(FeatureFrame {
        login_hour: login.hours,
        login_minute: login.minutes,
        time_spent_minutes: time_spent_minutes.to_vec(),
        specialty,
        region,
    })
}

pub fn categorical(
    table: &Table,
    mapping: &FieldMapping,
    field: CanonicalField,
) -> anyhow::Result<Vec<String>> {
    let col = resolved_column(table, mapping, field)?;
    Ok(col
        .values
        .iter()
        .map(|v| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(UNKNOWN_CATEGORY)
                .to_string()
        })
        .collect())
}

pub fn login_times<R: Rng + ?Sized>(table: &Table, mapping: &FieldMapping, rng: &mut R) -> LoginTimes {
    let col = match clock_column(table, mapping, CanonicalField::LoginTime) {
        Ok(col) => col,
        Err(e) => {
            tracing::warn!("Error processing login time: {e:#}; using random login times");
            let hours: Vec<u8> = (0..table.len())
                .map(|_| rng.random_range(RANDOM_LOGIN_HOURS))
                .collect();
            let minutes: Vec<u8> = (0..table.len()).map(|_| rng.random_range(0..60)).collect();
            return LoginTimes {
                hours,
                minutes,
                derivation: Derivation::Randomized,
            };
        }
    };

    let (hours, minutes): (Vec<u8>, Vec<u8>) = col
        .values
        .iter()
        .map(|v| {
            v.as_deref()
                .and_then(|s| parse_clock(clock_text(s, col.kind)))
                .unwrap_or((DEFAULT_LOGIN_HOUR, DEFAULT_LOGIN_MINUTE))
        })
        .unzip();
    LoginTimes {
        hours,
        minutes,
        derivation: Derivation::Source,
    }
}

/// Splits `HH:MM[:SS]` on the first ':' into hour and minute.
pub fn parse_clock(value: &str) -> Option<(u8, u8)> {
    let (hour, rest) = value.split_once(':')?;
    let minute = rest.split(':').next().unwrap_or(rest);
    let hour: u8 = hour.trim().parse().ok()?;
    let minute: u8 = minute.trim().parse().ok()?;
    (hour < 24 && minute < 60).then_some((hour, minute))
}

// Timestamp columns arrive as "YYYY-MM-DD HH:MM:SS"; only the time part matters.
fn clock_text(value: &str, kind: ColumnKind) -> &str {
    match kind {
        ColumnKind::Timestamp => value.trim().rsplit([' ', 'T']).next().unwrap_or(value),
        _ => value,
    }
}

pub fn time_spent<R: Rng + ?Sized>(table: &Table, mapping: &FieldMapping, rng: &mut R) -> TimeSpent {
    if let Ok(col) = resolved_column(table, mapping, CanonicalField::TimeSpent) {
        let minutes = col
            .numeric_values()
            .into_iter()
            .map(|v| v.map(|m| m.max(0.0)).unwrap_or(DEFAULT_SESSION_MINUTES))
            .collect();
        return TimeSpent {
            minutes,
            derivation: Derivation::Source,
        };
    }

    if mapping.login_time.is_some() && mapping.logout_time.is_some() {
        match session_minutes(table, mapping) {
            Ok(minutes) => {
                return TimeSpent {
                    minutes,
                    derivation: Derivation::Session,
                };
            }
            Err(e) => tracing::warn!("Error calculating time spent: {e:#}"),
        }
    }

    TimeSpent {
        minutes: (0..table.len())
            .map(|_| f64::from(rng.random_range(RANDOM_SESSION_MINUTES)))
            .collect(),
        derivation: Derivation::Randomized,
    }
}

/// Logout minus login, in minutes. A row whose timestamps do not parse gets
/// [`DEFAULT_SESSION_MINUTES`]; a column that cannot hold timestamps at all
/// is an error.
pub fn session_minutes(table: &Table, mapping: &FieldMapping) -> anyhow::Result<Vec<f64>> {
    let login = clock_column(table, mapping, CanonicalField::LoginTime)?;
    let logout = clock_column(table, mapping, CanonicalField::LogoutTime)?;
    Ok(login
        .values
        .iter()
        .zip(&logout.values)
        .map(|(start, end)| {
            let start = start.as_deref().and_then(parse_timestamp);
            let end = end.as_deref().and_then(parse_timestamp);
            match (start, end) {
                (Some(start), Some(end)) => session_length(start, end),
                _ => DEFAULT_SESSION_MINUTES,
            }
        })
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    at: NaiveDateTime,
    clock_only: bool,
}

fn parse_timestamp(value: &str) -> Option<Stamp> {
    const FULL: [&str; 6] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ];
    const CLOCK: [&str; 3] = ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];

    let value = value.trim();
    if let Some(at) = FULL
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
    {
        return Some(Stamp {
            at,
            clock_only: false,
        });
    }
    let time = CLOCK
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(value, f).ok())?;
    let anchor = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    Some(Stamp {
        at: anchor.and_time(time),
        clock_only: true,
    })
}

fn session_length(start: Stamp, end: Stamp) -> f64 {
    let minutes = (end.at - start.at).num_seconds() as f64 / 60.0;
    if minutes >= 0.0 {
        minutes
    } else if start.clock_only && end.clock_only {
        // Session crossed midnight.
        minutes + MINUTES_PER_DAY
    } else {
        DEFAULT_SESSION_MINUTES
    }
}

pub fn completion_labels<R: Rng + ?Sized>(
    table: &Table,
    mapping: &FieldMapping,
    rng: &mut R,
) -> CompletionLabels {
    if let Ok(col) = resolved_column(table, mapping, CanonicalField::Attempts) {
        let attempts = col.numeric_values();
        let max = attempts
            .iter()
            .flatten()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        if max > 0.0 {
            return CompletionLabels {
                values: attempts
                    .into_iter()
                    .map(|a| (a.unwrap_or(0.0) / max).clamp(0.0, 1.0))
                    .collect(),
                derivation: Derivation::Source,
            };
        }
        tracing::warn!("Column {} has no positive attempt counts", col.name);
    }

    CompletionLabels {
        values: (0..table.len())
            .map(|_| {
                if rng.random_bool(FALLBACK_COMPLETION_RATE) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect(),
        derivation: Derivation::Randomized,
    }
}

fn resolved_column<'a>(
    table: &'a Table,
    mapping: &FieldMapping,
    field: CanonicalField,
) -> anyhow::Result<&'a Column> {
    let name = mapping.require(field)?;
    table
        .column(name)
        .ok_or_else(|| anyhow!("column {name} ({field}) is not in the table"))
}

fn clock_column<'a>(
    table: &'a Table,
    mapping: &FieldMapping,
    field: CanonicalField,
) -> anyhow::Result<&'a Column> {
    let col = resolved_column(table, mapping, field)?;
    if !col.kind.holds_clock() {
        bail!(
            "column {} ({field}) has type {:?}, expected clock strings",
            col.name,
            col.kind
        );
    }
    Ok(col)
}
