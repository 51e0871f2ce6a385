//! Training and evaluation data.

use ndarray::{Array1, Array2};

use crate::circuit::Circuit;

/// A set of samples: raw variable assignments, the circuit features
/// extracted from them, and regression targets.
#[derive(Debug, Clone)]
pub struct DataSet {
    /// One row per sample, one column per variable. Values are in `[0, 1]`;
    /// negative values mark a missing observation.
    pub images: Array2<f64>,
    /// Feature matrix of the circuit that last processed this set.
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
}

impl DataSet {
    /// Creates a data set with no features extracted yet.
    ///
    /// # Panics
    ///
    /// Panics if `images` and `labels` disagree on the number of samples.
    pub fn new(images: Array2<f64>, labels: Array1<f64>) -> Self {
        assert_eq!(
            images.nrows(),
            labels.len(),
            "Number of images and labels must match"
        );
        let features = Array2::zeros((images.nrows(), 0));
        Self {
            images,
            features,
            labels,
        }
    }

    pub fn num_samples(&self) -> usize {
        self.images.nrows()
    }

    /// Recomputes `features` with the given circuit.
    pub fn refresh_features(&mut self, circuit: &Circuit) {
        self.features = circuit.calculate_features(&self.images);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_new() {
        let data = DataSet::new(array![[0.0, 1.0], [1.0, 1.0]], array![0.5, 1.5]);
        assert_eq!(data.num_samples(), 2);
        assert_eq!(data.features.dim(), (2, 0));
    }

    #[test]
    #[should_panic(expected = "Number of images and labels must match")]
    fn test_mismatched_labels() {
        DataSet::new(array![[0.0, 1.0]], array![0.5, 1.5]);
    }
}
