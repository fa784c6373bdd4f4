use std::path::PathBuf;

use rand::Rng;

use crate::storage::DataPaths;
use crate::synthetic::{SYNTHETIC_ROWS, synthetic_table};
use crate::table::{Table, load_table};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOrigin {
    File(PathBuf),
    Synthetic,
}

#[derive(Debug, Clone)]
pub struct SourceTable {
    pub table: Table,
    pub origin: DataOrigin,
}

/// Loads the population table, substituting the synthetic table when no
/// dataset file is present or the file cannot be read.
pub fn load_source<R: Rng + ?Sized>(paths: &DataPaths, rng: &mut R) -> anyhow::Result<SourceTable> {
    let Some(path) = paths.resolve_dataset() else {
        tracing::info!(
            "No dataset found (looked for {}); using synthetic data",
            paths
                .dataset_candidates()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        return synthetic(rng);
    };

    match load_table(&path) {
        Ok(table) => {
            tracing::info!(
                "Loaded {} rows from {}; columns: {}",
                table.len(),
                path.display(),
                table.column_names().collect::<Vec<_>>().join(", ")
            );
            if table.is_empty() {
                tracing::warn!("{} has no rows", path.display());
            }
            Ok(SourceTable {
                table,
                origin: DataOrigin::File(path),
            })
        }
        Err(e) => {
            tracing::warn!("Error loading {}: {e:#}; using synthetic data", path.display());
            synthetic(rng)
        }
    }
}

fn synthetic<R: Rng + ?Sized>(rng: &mut R) -> anyhow::Result<SourceTable> {
    Ok(SourceTable {
        table: synthetic_table(SYNTHETIC_ROWS, rng)?,
        origin: DataOrigin::Synthetic,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn missing_file_falls_back_to_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path(), None);
        let src = load_source(&paths, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(src.origin, DataOrigin::Synthetic);
        assert_eq!(src.table.len(), SYNTHETIC_ROWS);
    }

    #[test]
    fn unreadable_file_falls_back_to_synthetic() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("doctors.bin");
        std::fs::write(&bogus, b"not a table").unwrap();
        let paths = DataPaths::new(dir.path(), Some(bogus));
        let src = load_source(&paths, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(src.origin, DataOrigin::Synthetic);
    }

    #[test]
    fn reads_dataset_from_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("dummy_npi_data.csv");
        std::fs::write(&csv, "npi,specialty,region\n1,Oncology,West\n2,Neurology,South\n")
            .unwrap();
        let paths = DataPaths::new(dir.path(), None);
        let src = load_source(&paths, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(src.origin, DataOrigin::File(csv));
        assert_eq!(src.table.len(), 2);
    }
}
