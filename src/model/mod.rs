pub mod forest;
pub mod preprocess;

use std::sync::Arc;

use anyhow::{Context, bail};

use crate::features::{FeatureFrame, TrainingSet};
use crate::schema::{CanonicalField, FieldMapping};

pub use forest::{ForestConfig, RandomForest};
pub use preprocess::Preprocessor;

/// Anything that can turn a feature table into per-row completion
/// probabilities in `[0, 1]`.
pub trait CompletionModel: Send + Sync {
    fn completion_probability(&self, features: &FeatureFrame) -> anyhow::Result<Vec<f64>>;
}

/// Scaling + one-hot encoding feeding a random forest.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyPipeline {
    preprocessor: Preprocessor,
    forest: RandomForest,
}

impl SurveyPipeline {
    pub fn fit(training: &TrainingSet, config: &ForestConfig) -> anyhow::Result<Self> {
        if training.is_empty() {
            bail!("feature table is empty");
        }
        let preprocessor = Preprocessor::fit(&training.features)?;
        let x = preprocessor.transform(&training.features);
        let forest = RandomForest::fit(&x, &training.target, config).context("fit random forest")?;
        Ok(Self {
            preprocessor,
            forest,
        })
    }
}

impl CompletionModel for SurveyPipeline {
    fn completion_probability(&self, features: &FeatureFrame) -> anyhow::Result<Vec<f64>> {
        let x = self.preprocessor.transform(features);
        self.forest.predict_proba(&x)
    }
}

/// Fitted pipeline plus the column mapping it was trained against. The two
/// travel together: the mapping decides which raw columns feed the pipeline.
#[derive(Clone)]
pub struct TrainedModel {
    pipeline: Arc<dyn CompletionModel>,
    mapping: FieldMapping,
}

impl std::fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedModel")
            .field("mapping", &self.mapping)
            .finish_non_exhaustive()
    }
}

impl TrainedModel {
    pub fn new(pipeline: Arc<dyn CompletionModel>, mapping: FieldMapping) -> Self {
        Self { pipeline, mapping }
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    pub fn completion_probability(&self, features: &FeatureFrame) -> anyhow::Result<Vec<f64>> {
        self.pipeline.completion_probability(features)
    }
}

pub fn train(
    training: &TrainingSet,
    mapping: FieldMapping,
    config: &ForestConfig,
) -> anyhow::Result<TrainedModel> {
    mapping.require(CanonicalField::Specialty)?;
    mapping.require(CanonicalField::Region)?;

    let t0 = std::time::Instant::now();
    let pipeline = SurveyPipeline::fit(training, config)?;
    tracing::info!(
        "Trained {} trees on {} rows in {:.1}s",
        config.n_trees,
        training.len(),
        t0.elapsed().as_secs_f64()
    );
    Ok(TrainedModel::new(Arc::new(pipeline), mapping))
}
