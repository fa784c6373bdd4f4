use anyhow::bail;
use ndarray::Array2;

use crate::features::FeatureFrame;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Standardizer {
    mean: f64,
    scale: f64,
}

impl Standardizer {
    fn fit(values: &[f64]) -> Self {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();
        // Constant columns pass through centred but unscaled.
        let scale = if std > f64::EPSILON { std } else { 1.0 };
        Self { mean, scale }
    }

    fn apply(&self, v: f64) -> f64 {
        (v - self.mean) / self.scale
    }
}

#[derive(Debug, Clone, PartialEq)]
struct OneHot {
    categories: Vec<String>,
}

impl OneHot {
    fn fit(values: &[String]) -> Self {
        let mut categories = values.to_vec();
        categories.sort();
        categories.dedup();
        Self { categories }
    }

    fn width(&self) -> usize {
        self.categories.len()
    }

    /// Column offset of a category; `None` for categories never seen in fit.
    fn position(&self, value: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
    }
}

/// Z-score scaling of login hour, login minute and time spent, followed by
/// one-hot blocks for specialty and region.
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessor {
    numeric: [Standardizer; 3],
    specialty: OneHot,
    region: OneHot,
}

impl Preprocessor {
    pub fn fit(frame: &FeatureFrame) -> anyhow::Result<Self> {
        if frame.is_empty() {
            bail!("cannot fit preprocessing on an empty feature table");
        }
        let [hour, minute, spent] = numeric_columns(frame);
        Ok(Self {
            numeric: [
                Standardizer::fit(&hour),
                Standardizer::fit(&minute),
                Standardizer::fit(&spent),
            ],
            specialty: OneHot::fit(&frame.specialty),
            region: OneHot::fit(&frame.region),
        })
    }

    pub fn n_outputs(&self) -> usize {
        self.numeric.len() + self.specialty.width() + self.region.width()
    }

    pub fn transform(&self, frame: &FeatureFrame) -> Array2<f64> {
        let numeric = numeric_columns(frame);
        let mut out = Array2::zeros((frame.len(), self.n_outputs()));
        let specialty_at = self.numeric.len();
        let region_at = specialty_at + self.specialty.width();

        for (i, mut row) in out.outer_iter_mut().enumerate() {
            for (j, scaler) in self.numeric.iter().enumerate() {
                row[j] = scaler.apply(numeric[j][i]);
            }
            if let Some(k) = self.specialty.position(&frame.specialty[i]) {
                row[specialty_at + k] = 1.0;
            }
            if let Some(k) = self.region.position(&frame.region[i]) {
                row[region_at + k] = 1.0;
            }
        }
        out
    }
}

fn numeric_columns(frame: &FeatureFrame) -> [Vec<f64>; 3] {
    [
        frame.login_hour.iter().map(|&h| f64::from(h)).collect(),
        frame.login_minute.iter().map(|&m| f64::from(m)).collect(),
        frame.time_spent_minutes.clone(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FeatureFrame {
        FeatureFrame {
            login_hour: vec![8, 10, 12],
            login_minute: vec![0, 0, 0],
            time_spent_minutes: vec![10.0, 20.0, 30.0],
            specialty: vec!["Oncology".into(), "Cardiology".into(), "Oncology".into()],
            region: vec!["West".into(), "West".into(), "South".into()],
        }
    }

    #[test]
    fn layout_is_numeric_then_sorted_categories() {
        let pre = Preprocessor::fit(&frame()).unwrap();
        assert_eq!(pre.n_outputs(), 3 + 2 + 2);
        let x = pre.transform(&frame());
        assert_eq!(x.dim(), (3, 7));
        // Cardiology, Oncology | South, West
        assert_eq!(x.row(0).slice(ndarray::s![3..]).to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
        assert_eq!(x.row(1).slice(ndarray::s![3..]).to_vec(), vec![1.0, 0.0, 0.0, 1.0]);
        assert_eq!(x.row(2).slice(ndarray::s![3..]).to_vec(), vec![0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn numeric_columns_are_standardized() {
        let pre = Preprocessor::fit(&frame()).unwrap();
        let x = pre.transform(&frame());
        let hours = x.column(0);
        assert!(hours.sum().abs() < 1e-12);
        let var = hours.mapv(|v| v * v).sum() / 3.0;
        assert!((var - 1.0).abs() < 1e-12);
        // Constant minute column centres to zero instead of dividing by zero.
        assert!(x.column(1).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn unseen_categories_encode_as_zeros() {
        let pre = Preprocessor::fit(&frame()).unwrap();
        let query = FeatureFrame {
            login_hour: vec![9],
            login_minute: vec![30],
            time_spent_minutes: vec![15.0],
            specialty: vec!["Dermatology".into()],
            region: vec!["West".into()],
        };
        let x = pre.transform(&query);
        assert_eq!(x.row(0).slice(ndarray::s![3..]).to_vec(), vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn empty_frame_cannot_be_fitted() {
        assert!(Preprocessor::fit(&FeatureFrame::default()).is_err());
    }
}
