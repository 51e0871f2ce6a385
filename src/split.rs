//! Split selection.
//!
//! Candidates are ranked by the variance of the per-sample gradient of the
//! regularized squared loss with respect to each element's parameter. For the
//! most promising elements, every splittable variable is tried: the element's
//! feature is divided into the part where the variable holds and the part
//! where it does not, and the split reducing the weighted gradient variance
//! the most is kept.

use log::{debug, info};
use ndarray::{Array1, ArrayView1, Axis, Zip};

use crate::circuit::Circuit;
use crate::dataset::DataSet;
use crate::error::{CircuitError, Result};
use crate::features::is_missing;
use crate::reference::ElementId;

#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Maximum number of splits applied per round.
    pub num_splits: usize,
    /// L2 regularization strength used in the gradient.
    pub alpha: f64,
    /// Number of elements, by gradient variance, that are scored at all.
    pub min_candidate_list: usize,
    /// Elements whose total feature mass is at most this are not scored.
    pub min_support: f64,
    /// Depth below which a split only walks the child containing its variable.
    pub depth: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            num_splits: 10,
            alpha: 0.2,
            min_candidate_list: 5000,
            min_support: 25.0,
            depth: 20,
        }
    }
}

/// A selected split, scored by the change it makes to the gradient variance.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub element: ElementId,
    pub var: u32,
    /// Always negative; more negative is better.
    pub improvement: f64,
}

impl Circuit {
    /// Selects at most `config.num_splits` splits for the current circuit.
    ///
    /// `data.features` must have been computed by this circuit.
    pub fn select_splits(&self, data: &DataSet, config: &SplitConfig) -> Result<Vec<Split>> {
        if config.num_splits == 0 {
            return Ok(Vec::new());
        }
        if data.features.ncols() != self.num_parameters() {
            return Err(CircuitError::FeatureWidth {
                expected: self.num_parameters(),
                found: data.features.ncols(),
            });
        }

        let delta = &data.labels - &self.predict(&data.features);
        let offset = 1 + 2 * self.num_variables as usize;

        let mut candidates: Vec<(usize, f64)> = self
            .elements()
            .iter()
            .enumerate()
            .map(|(j, _)| {
                let feature = data.features.column(offset + j);
                let parameter = self.parameters[offset + j];
                (j, gradient_variance(&delta, feature, config.alpha, parameter))
            })
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        candidates.truncate(config.min_candidate_list);

        let num_samples = data.num_samples().max(1) as f64;
        let mut selected: Vec<Split> = Vec::new();
        for (j, original) in candidates {
            let id = self.elements()[j];
            let Some(element) = self.element(id) else {
                continue;
            };
            if element.splittable_variables.is_empty() {
                continue;
            }
            let feature = data.features.column(offset + j);
            if feature.sum() <= config.min_support {
                continue;
            }
            let parameter = self.parameters[offset + j];

            let mut best: Option<(u32, f64)> = None;
            for &var in &element.splittable_variables {
                let x = data
                    .images
                    .column(var as usize - 1)
                    .mapv(|v| if is_missing(v) { 0.5 } else { v });
                let left = &feature * &x;
                let right = &feature - &left;
                let weight = x.sum() / num_samples;
                let variance = weight * gradient_variance(&delta, left.view(), config.alpha, parameter)
                    + (1.0 - weight) * gradient_variance(&delta, right.view(), config.alpha, parameter);
                if best.map_or(true, |(_, v)| variance < v) {
                    best = Some((var, variance));
                }
            }

            if let Some((var, variance)) = best {
                if variance < original {
                    selected.push(Split {
                        element: id,
                        var,
                        improvement: variance - original,
                    });
                    selected.sort_by(|a, b| a.improvement.total_cmp(&b.improvement));
                    selected.truncate(config.num_splits);
                }
            }
        }

        debug!("selected splits: {:?}", selected);
        info!("selected {} splits out of {} elements", selected.len(), self.num_elements());
        Ok(selected)
    }
}

/// Population variance of `-2·δ·f + 2·α·θ` over the samples.
fn gradient_variance(delta: &Array1<f64>, feature: ArrayView1<f64>, alpha: f64, parameter: f64) -> f64 {
    if delta.is_empty() {
        return 0.0;
    }
    let mut gradient = Array1::<f64>::zeros(delta.len());
    Zip::from(&mut gradient)
        .and(delta)
        .and(feature)
        .for_each(|g, &d, &f| *g = -2.0 * d * f + 2.0 * alpha * parameter);
    gradient.var_axis(Axis(0), 0.0).into_scalar()
}
