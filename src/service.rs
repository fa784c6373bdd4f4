use anyhow::Context;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::features::training_set;
use crate::model::{ForestConfig, TrainedModel, train};
use crate::schema::FieldMapping;
use crate::scorer::{Population, QueryTime, RankedDoctor, rank};
use crate::source::{DataOrigin, load_source};
use crate::storage::DataPaths;

pub const INVALID_TIME_MESSAGE: &str = "Invalid time format. Please use HH:MM (24-hour format)";

/// Immutable state shared by every request: the trained model, its column
/// mapping and the population it ranks.
pub struct Service {
    model: TrainedModel,
    population: Population,
    seed: u64,
}

impl Service {
    pub fn new(model: TrainedModel, population: Population, seed: u64) -> Self {
        Self {
            model,
            population,
            seed,
        }
    }

    /// Loads the source table, derives features and trains the model. Any
    /// error here means the service cannot run.
    pub fn bootstrap(paths: &DataPaths, seed: u64) -> anyhow::Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);

        tracing::info!("Loading data...");
        let source = load_source(paths, &mut rng).context("load source table")?;
        match &source.origin {
            DataOrigin::File(path) => tracing::info!("Data source: {}", path.display()),
            DataOrigin::Synthetic => tracing::info!("Data source: synthetic (seed={seed})"),
        }

        let mapping = FieldMapping::for_table(&source.table);
        let training = training_set(&source.table, &mapping, &mut rng).context("derive features")?;

        tracing::info!("Training model on {} records...", training.len());
        let model = train(&training, mapping, &ForestConfig::default()).context("train model")?;
        tracing::info!("Model training complete");

        let population = Population::new(source.table, training.features.time_spent_minutes)?;
        Ok(Self::new(model, population, seed))
    }

    pub fn population_size(&self) -> usize {
        self.population.len()
    }

    /// Ranks for one query time. Every call starts from the same seed, so
    /// equal queries give equal answers.
    pub fn rank(&self, at: QueryTime) -> anyhow::Result<Vec<RankedDoctor>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        rank(&self.model, &self.population, at, &mut rng)
    }
}

#[derive(Debug, Serialize)]
pub struct Prediction {
    pub success: bool,
    pub time: String,
    pub doctors: Vec<RankedDoctor>,
}

impl Prediction {
    pub fn new(at: QueryTime, doctors: Vec<RankedDoctor>) -> Self {
        Self {
            success: true,
            time: at.to_string(),
            doctors,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Failure {
    pub success: bool,
    pub error: String,
}

impl Failure {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstraps_on_synthetic_data() {
        let dir = tempfile::tempdir().unwrap();
        let service = Service::bootstrap(&DataPaths::new(dir.path(), None), 42).unwrap();
        assert_eq!(service.population_size(), 100);

        let at = QueryTime::new(9, 0).unwrap();
        let ranked = service.rank(at).unwrap();
        assert_eq!(ranked.len(), 20);
        assert_eq!(ranked, service.rank(at).unwrap());
    }

    #[test]
    fn bootstraps_from_csv_without_optional_columns() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("doctors.csv");
        std::fs::write(
            &csv,
            "npi,specialty,region\n\
             1001,Oncology,West\n\
             1002,Neurology,South\n\
             1003,Oncology,Midwest\n",
        )
        .unwrap();
        let paths = DataPaths::new(dir.path(), Some(csv));
        let service = Service::bootstrap(&paths, 7).unwrap();
        assert_eq!(service.population_size(), 3);

        let ranked = service.rank(QueryTime::new(12, 0).unwrap()).unwrap();
        let mut ids: Vec<&str> = ranked.iter().map(|r| r.npi.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["1001", "1002", "1003"]);
    }

    #[test]
    fn csv_without_region_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("doctors.csv");
        std::fs::write(&csv, "npi,specialty\n1,Oncology\n").unwrap();
        let paths = DataPaths::new(dir.path(), Some(csv));
        assert!(Service::bootstrap(&paths, 7).is_err());
    }

    #[test]
    fn prediction_serializes_like_the_api() {
        let body = serde_json::to_value(Prediction::new(
            QueryTime::new(9, 5).unwrap(),
            vec![RankedDoctor {
                npi: "NPI1".into(),
                specialty: "Oncology".into(),
                region: "West".into(),
                likelihood_score: 42.5,
            }],
        ))
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "success": true,
                "time": "09:05",
                "doctors": [{
                    "npi": "NPI1",
                    "specialty": "Oncology",
                    "region": "West",
                    "likelihood_score": 42.5
                }]
            })
        );
    }
}
