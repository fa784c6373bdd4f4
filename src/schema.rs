use std::collections::HashSet;
use std::fmt;

use anyhow::anyhow;
use serde::Serialize;

use crate::table::Table;

/// Logical fields the ranking pipeline reads, independent of source naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Npi,
    Specialty,
    Region,
    LoginTime,
    LogoutTime,
    TimeSpent,
    Attempts,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 7] = [
        CanonicalField::Npi,
        CanonicalField::Specialty,
        CanonicalField::Region,
        CanonicalField::LoginTime,
        CanonicalField::LogoutTime,
        CanonicalField::TimeSpent,
        CanonicalField::Attempts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CanonicalField::Npi => "npi",
            CanonicalField::Specialty => "specialty",
            CanonicalField::Region => "region",
            CanonicalField::LoginTime => "login_time",
            CanonicalField::LogoutTime => "logout_time",
            CanonicalField::TimeSpent => "time_spent",
            CanonicalField::Attempts => "attempts",
        }
    }

    /// Accepted column names, highest priority first.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            CanonicalField::Npi => &["NPI", "npi"],
            CanonicalField::Specialty => &["Speciality", "Specialty", "specialty"],
            CanonicalField::Region => &["Region", "region"],
            CanonicalField::LoginTime => &["Login Time", "login_time"],
            CanonicalField::LogoutTime => &["Logout Time", "logout_time"],
            CanonicalField::TimeSpent => &["Time Spent", "time_spent"],
            CanonicalField::Attempts => &["Count of Attempts", "attempts"],
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical field -> actual column name. Unresolved fields stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
    pub npi: Option<String>,
    pub specialty: Option<String>,
    pub region: Option<String>,
    pub login_time: Option<String>,
    pub logout_time: Option<String>,
    pub time_spent: Option<String>,
    pub attempts: Option<String>,
}

impl FieldMapping {
    pub fn resolve<'a>(columns: impl IntoIterator<Item = &'a str>) -> Self {
        let present: HashSet<&str> = columns.into_iter().collect();
        let mut mapping = FieldMapping::default();
        for field in CanonicalField::ALL {
            *mapping.slot_mut(field) = field
                .aliases()
                .iter()
                .find(|alias| present.contains(**alias))
                .map(|alias| alias.to_string());
        }
        mapping
    }

    /// Resolves against a loaded table and logs what was (not) found.
    pub fn for_table(table: &Table) -> Self {
        let mapping = Self::resolve(table.column_names());
        for field in mapping.missing() {
            tracing::warn!("Could not find column for {field}");
        }
        tracing::info!(
            "Using columns: {}",
            CanonicalField::ALL
                .iter()
                .filter_map(|f| mapping.get(*f).map(|c| format!("{f}={c}")))
                .collect::<Vec<_>>()
                .join(", ")
        );
        mapping
    }

    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        match field {
            CanonicalField::Npi => self.npi.as_deref(),
            CanonicalField::Specialty => self.specialty.as_deref(),
            CanonicalField::Region => self.region.as_deref(),
            CanonicalField::LoginTime => self.login_time.as_deref(),
            CanonicalField::LogoutTime => self.logout_time.as_deref(),
            CanonicalField::TimeSpent => self.time_spent.as_deref(),
            CanonicalField::Attempts => self.attempts.as_deref(),
        }
    }

    pub fn require(&self, field: CanonicalField) -> anyhow::Result<&str> {
        self.get(field).ok_or_else(|| {
            anyhow!(
                "no column for {field}; expected one of: {}",
                field.aliases().join(", ")
            )
        })
    }

    pub fn missing(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }

    fn slot_mut(&mut self, field: CanonicalField) -> &mut Option<String> {
        match field {
            CanonicalField::Npi => &mut self.npi,
            CanonicalField::Specialty => &mut self.specialty,
            CanonicalField::Region => &mut self.region,
            CanonicalField::LoginTime => &mut self.login_time,
            CanonicalField::LogoutTime => &mut self.logout_time,
            CanonicalField::TimeSpent => &mut self.time_spent,
            CanonicalField::Attempts => &mut self.attempts,
        }
    }
}
