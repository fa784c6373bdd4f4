use std::path::{Path, PathBuf};

/// File stem the service looks for inside the data directory.
pub const DATASET_STEM: &str = "dummy_npi_data";

const DATASET_EXTENSIONS: [&str; 3] = ["parquet", "csv", "xlsx"];

#[derive(Debug, Clone)]
pub struct DataPaths {
    pub data_dir: PathBuf,
    pub data_file: Option<PathBuf>,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>, data_file: Option<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            data_file,
        }
    }

    pub fn dataset_candidates(&self) -> Vec<PathBuf> {
        match &self.data_file {
            Some(file) => vec![file.clone()],
            None => DATASET_EXTENSIONS
                .iter()
                .map(|ext| self.data_dir.join(format!("{DATASET_STEM}.{ext}")))
                .collect(),
        }
    }

    /// First candidate dataset that exists and is non-empty.
    pub fn resolve_dataset(&self) -> Option<PathBuf> {
        self.dataset_candidates()
            .into_iter()
            .find(|p| file_present_nonempty(p))
    }
}

pub fn file_present_nonempty(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(m) => m.is_file() && m.len() > 0,
        Err(_) => false,
    }
}
