//! Parameter learning: one regression fit over the current feature matrix.

use log::{debug, warn};

use crate::circuit::Circuit;
use crate::dataset::DataSet;
use crate::error::{CircuitError, Result};
use crate::solver::{Solver, SolverConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    Converged,
    /// The solver hit its iteration cap; its last coefficients were kept.
    NotConverged { iterations: usize },
}

impl Circuit {
    /// Refits every parameter against `data.features` with the configured solver.
    ///
    /// Bayesian solvers also store the coefficient covariance; an ordinary fit
    /// clears any covariance left over from earlier rounds.
    pub fn learn_parameters(&mut self, data: &DataSet, config: &SolverConfig) -> Result<FitStatus> {
        let solver = config.solver();
        let status = self.learn_parameters_with(data, solver.as_ref())?;
        if config.kind.is_bayesian() && self.covariances.is_empty() {
            warn!("{} solver returned no covariance", config.kind);
        }
        Ok(status)
    }

    /// Like [`Circuit::learn_parameters`], with a caller-provided solver.
    pub fn learn_parameters_with(&mut self, data: &DataSet, solver: &dyn Solver) -> Result<FitStatus> {
        if data.features.ncols() != self.num_parameters() {
            return Err(CircuitError::FeatureWidth {
                expected: self.num_parameters(),
                found: data.features.ncols(),
            });
        }
        let fit = solver.fit(&data.features, &data.labels, &self.parameters)?;
        debug!("fit finished after {} iterations", fit.iterations);

        self.record_learned_parameters(&fit.coefficients)?;
        self.covariances = fit.covariance.into_iter().collect();

        if fit.converged {
            Ok(FitStatus::Converged)
        } else {
            warn!(
                "solver did not converge within {} iterations, keeping its last coefficients",
                fit.iterations
            );
            Ok(FitStatus::NotConverged {
                iterations: fit.iterations,
            })
        }
    }
}
