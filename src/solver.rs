//! Linear regression strategies used to fit circuit parameters.
//!
//! All solvers fit `y ≈ X·w` without an intercept: the bias is the first
//! feature column, a constant 1.
//!
//! - [`OrdinaryRidge`]: closed-form L2-regularized least squares.
//! - [`BayesianRidge`]: evidence maximization over a shared weight precision
//!   and the noise precision; yields the posterior covariance of `w`.
//! - [`ArdRegression`]: one precision per weight; weights whose precision
//!   grows past a threshold are pruned to zero.

use std::fmt;
use std::str::FromStr;

use log::debug;
use ndarray::{Array1, Array2, Axis};

use crate::error::SolverError;
use crate::linalg::{add_diagonal, inverse_spd, solve_spd};

/// Outcome of a fit.
#[derive(Debug, Clone)]
pub struct Fit {
    pub coefficients: Array1<f64>,
    /// Posterior covariance of the coefficients, for Bayesian solvers.
    pub covariance: Option<Array2<f64>>,
    pub converged: bool,
    pub iterations: usize,
}

pub trait Solver {
    /// Fits `labels ≈ features · w`.
    ///
    /// `init` is the current coefficient vector; iterative solvers measure
    /// their first step against it. It is ignored if its length differs from
    /// the feature width.
    fn fit(&self, features: &Array2<f64>, labels: &Array1<f64>, init: &Array1<f64>) -> Result<Fit, SolverError>;

    /// Number of threads the solver may use, if the caller set one.
    fn num_cores(&self) -> Option<usize> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    #[default]
    Ordinary,
    BayesianRidge,
    BayesianArd,
}

impl SolverKind {
    pub fn is_bayesian(self) -> bool {
        !matches!(self, SolverKind::Ordinary)
    }
}

impl FromStr for SolverKind {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ordinary" | "auto" => Ok(SolverKind::Ordinary),
            "bayesian-ridge" => Ok(SolverKind::BayesianRidge),
            "bayesian-ard" => Ok(SolverKind::BayesianArd),
            other => Err(SolverError::UnknownSolver(other.to_string())),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SolverKind::Ordinary => "ordinary",
            SolverKind::BayesianRidge => "bayesian-ridge",
            SolverKind::BayesianArd => "bayesian-ard",
        };
        write!(f, "{}", name)
    }
}

/// Solver selection and hyperparameters.
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub kind: SolverKind,
    /// Ridge penalty of the ordinary solver.
    pub alpha: f64,
    /// Gamma prior (shape, rate) on the noise precision.
    pub alpha_1: f64,
    pub alpha_2: f64,
    /// Gamma prior (shape, rate) on the weight precisions.
    pub lambda_1: f64,
    pub lambda_2: f64,
    pub max_iter: usize,
    pub tol: f64,
    /// ARD prunes weights whose precision exceeds this.
    pub threshold_lambda: f64,
    /// Parallelism hint handed to the solver. The built-in solvers are
    /// single-threaded and only report it back.
    pub num_cores: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: SolverKind::Ordinary,
            alpha: 1.0,
            alpha_1: 1e-6,
            alpha_2: 1e-6,
            lambda_1: 1e-6,
            lambda_2: 1e-6,
            max_iter: 1000,
            tol: 1e-3,
            threshold_lambda: 1e4,
            num_cores: None,
        }
    }
}

impl SolverConfig {
    pub fn solver(&self) -> Box<dyn Solver> {
        match self.kind {
            SolverKind::Ordinary => Box::new(OrdinaryRidge {
                alpha: self.alpha,
                num_cores: self.num_cores,
            }),
            SolverKind::BayesianRidge => Box::new(BayesianRidge {
                alpha_1: self.alpha_1,
                alpha_2: self.alpha_2,
                lambda_1: self.lambda_1,
                lambda_2: self.lambda_2,
                max_iter: self.max_iter,
                tol: self.tol,
                num_cores: self.num_cores,
            }),
            SolverKind::BayesianArd => Box::new(ArdRegression {
                alpha_1: self.alpha_1,
                alpha_2: self.alpha_2,
                lambda_1: self.lambda_1,
                lambda_2: self.lambda_2,
                max_iter: self.max_iter,
                tol: self.tol,
                threshold_lambda: self.threshold_lambda,
                num_cores: self.num_cores,
            }),
        }
    }
}

fn check_dimensions(features: &Array2<f64>, labels: &Array1<f64>) -> Result<(), SolverError> {
    if features.nrows() != labels.len() {
        return Err(SolverError::DimensionMismatch {
            rows: features.nrows(),
            labels: labels.len(),
        });
    }
    Ok(())
}

fn initial_coefficients(init: &Array1<f64>, width: usize) -> Array1<f64> {
    if init.len() == width {
        init.clone()
    } else {
        Array1::zeros(width)
    }
}

fn l1_distance(a: &Array1<f64>, b: &Array1<f64>) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

fn squared_residual(features: &Array2<f64>, labels: &Array1<f64>, coefficients: &Array1<f64>) -> f64 {
    let residual = labels - &features.dot(coefficients);
    residual.dot(&residual)
}

/// Initial noise precision: the inverse label variance.
fn initial_noise_precision(labels: &Array1<f64>) -> f64 {
    let variance = if labels.is_empty() {
        0.0
    } else {
        labels.var_axis(Axis(0), 0.0).into_scalar()
    };
    1.0 / (variance + f64::EPSILON)
}

/// `(XᵀX + αI)·w = Xᵀy`.
#[derive(Debug, Clone)]
pub struct OrdinaryRidge {
    pub alpha: f64,
    pub num_cores: Option<usize>,
}

impl Solver for OrdinaryRidge {
    fn fit(&self, features: &Array2<f64>, labels: &Array1<f64>, _init: &Array1<f64>) -> Result<Fit, SolverError> {
        check_dimensions(features, labels)?;
        let mut gram = features.t().dot(features);
        add_diagonal(&mut gram, self.alpha);
        let coefficients = solve_spd(&gram, &features.t().dot(labels))?;
        Ok(Fit {
            coefficients,
            covariance: None,
            converged: true,
            iterations: 1,
        })
    }

    fn num_cores(&self) -> Option<usize> {
        self.num_cores
    }
}

#[derive(Debug, Clone)]
pub struct BayesianRidge {
    pub alpha_1: f64,
    pub alpha_2: f64,
    pub lambda_1: f64,
    pub lambda_2: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub num_cores: Option<usize>,
}

impl BayesianRidge {
    /// Posterior covariance `(λI + αXᵀX)⁻¹` and mean `α·Σ·Xᵀy`.
    fn posterior(
        gram: &Array2<f64>,
        xty: &Array1<f64>,
        alpha: f64,
        lambda: f64,
    ) -> Result<(Array2<f64>, Array1<f64>), SolverError> {
        let mut precision = gram * alpha;
        add_diagonal(&mut precision, lambda);
        let sigma = inverse_spd(&precision)?;
        let mean = sigma.dot(xty) * alpha;
        Ok((sigma, mean))
    }
}

impl Solver for BayesianRidge {
    fn fit(&self, features: &Array2<f64>, labels: &Array1<f64>, init: &Array1<f64>) -> Result<Fit, SolverError> {
        check_dimensions(features, labels)?;
        let (n, p) = features.dim();
        let gram = features.t().dot(features);
        let xty = features.t().dot(labels);

        let mut alpha = initial_noise_precision(labels);
        let mut lambda = 1.0;
        let mut coefficients = initial_coefficients(init, p);
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.max_iter {
            iterations += 1;
            let (sigma, mean) = Self::posterior(&gram, &xty, alpha, lambda)?;
            let rmse = squared_residual(features, labels, &mean);
            let gamma = p as f64 - lambda * sigma.diag().sum();

            lambda = (gamma + 2.0 * self.lambda_1) / (mean.dot(&mean) + 2.0 * self.lambda_2);
            alpha = (n as f64 - gamma + 2.0 * self.alpha_1) / (rmse + 2.0 * self.alpha_2);

            let change = l1_distance(&coefficients, &mean);
            coefficients = mean;
            debug!("bayesian ridge iteration {}: alpha = {}, lambda = {}, change = {}", iterations, alpha, lambda, change);
            if change < self.tol {
                converged = true;
                break;
            }
        }

        let (sigma, mean) = Self::posterior(&gram, &xty, alpha, lambda)?;
        Ok(Fit {
            coefficients: mean,
            covariance: Some(sigma),
            converged,
            iterations,
        })
    }

    fn num_cores(&self) -> Option<usize> {
        self.num_cores
    }
}

/// Automatic relevance determination.
#[derive(Debug, Clone)]
pub struct ArdRegression {
    pub alpha_1: f64,
    pub alpha_2: f64,
    pub lambda_1: f64,
    pub lambda_2: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub threshold_lambda: f64,
    pub num_cores: Option<usize>,
}

impl ArdRegression {
    /// Posterior over the kept weights only.
    fn posterior(
        features: &Array2<f64>,
        labels: &Array1<f64>,
        keep: &[usize],
        lambda: &Array1<f64>,
        alpha: f64,
    ) -> Result<(Array2<f64>, Array1<f64>), SolverError> {
        let kept = features.select(Axis(1), keep);
        let mut precision = kept.t().dot(&kept) * alpha;
        for (i, &j) in keep.iter().enumerate() {
            precision[[i, i]] += lambda[j];
        }
        let sigma = inverse_spd(&precision)?;
        let mean = sigma.dot(&kept.t().dot(labels)) * alpha;
        Ok((sigma, mean))
    }

    fn scatter(mean: &Array1<f64>, keep: &[usize], width: usize) -> Array1<f64> {
        let mut full = Array1::zeros(width);
        for (i, &j) in keep.iter().enumerate() {
            full[j] = mean[i];
        }
        full
    }
}

impl Solver for ArdRegression {
    fn fit(&self, features: &Array2<f64>, labels: &Array1<f64>, init: &Array1<f64>) -> Result<Fit, SolverError> {
        check_dimensions(features, labels)?;
        let (n, p) = features.dim();

        let mut alpha = initial_noise_precision(labels);
        let mut lambda = Array1::<f64>::ones(p);
        let mut keep: Vec<usize> = (0..p).collect();
        let mut coefficients = initial_coefficients(init, p);
        let mut converged = false;
        let mut iterations = 0;

        while iterations < self.max_iter && !keep.is_empty() {
            iterations += 1;
            let (sigma, mean) = Self::posterior(features, labels, &keep, &lambda, alpha)?;
            let full = Self::scatter(&mean, &keep, p);
            let rmse = squared_residual(features, labels, &full);

            let mut gamma_sum = 0.0;
            for (i, &j) in keep.iter().enumerate() {
                let gamma = 1.0 - lambda[j] * sigma[[i, i]];
                gamma_sum += gamma;
                lambda[j] = (gamma + 2.0 * self.lambda_1) / (full[j] * full[j] + 2.0 * self.lambda_2);
            }
            alpha = (n as f64 - gamma_sum + 2.0 * self.alpha_1) / (rmse + 2.0 * self.alpha_2);

            keep.retain(|&j| lambda[j] < self.threshold_lambda);
            let mut pruned = Array1::zeros(p);
            for &j in &keep {
                pruned[j] = full[j];
            }

            let change = l1_distance(&coefficients, &pruned);
            coefficients = pruned;
            debug!("ARD iteration {}: {} weights kept, change = {}", iterations, keep.len(), change);
            if change < self.tol {
                converged = true;
                break;
            }
        }

        let mut covariance = Array2::<f64>::zeros((p, p));
        if !keep.is_empty() {
            let (sigma, mean) = Self::posterior(features, labels, &keep, &lambda, alpha)?;
            coefficients = Self::scatter(&mean, &keep, p);
            for (a, &i) in keep.iter().enumerate() {
                for (b, &j) in keep.iter().enumerate() {
                    covariance[[i, j]] = sigma[[a, b]];
                }
            }
        }
        Ok(Fit {
            coefficients,
            covariance: Some(covariance),
            converged,
            iterations,
        })
    }

    fn num_cores(&self) -> Option<usize> {
        self.num_cores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use test_log::test;

    /// Exactly linear data: `y = 2·x0 - 3·x1 + 0.5·x2`.
    fn linear_data() -> (Array2<f64>, Array1<f64>, Array1<f64>) {
        let features = array![
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [1.0, 2.0, 0.5],
            [1.0, 0.5, 2.0],
            [1.0, 3.0, 1.5],
            [1.0, 1.5, 3.0],
        ];
        let truth = array![2.0, -3.0, 0.5];
        let labels = features.dot(&truth);
        (features, labels, truth)
    }

    #[test]
    fn test_solver_kind_from_str() {
        assert_eq!("auto".parse::<SolverKind>().unwrap(), SolverKind::Ordinary);
        assert_eq!("ordinary".parse::<SolverKind>().unwrap(), SolverKind::Ordinary);
        assert_eq!("bayesian-ridge".parse::<SolverKind>().unwrap(), SolverKind::BayesianRidge);
        assert_eq!("bayesian-ard".parse::<SolverKind>().unwrap(), SolverKind::BayesianArd);
        assert!(matches!("lasso".parse::<SolverKind>(), Err(SolverError::UnknownSolver(_))));
        assert_eq!(SolverKind::BayesianArd.to_string(), "bayesian-ard");
    }

    #[test]
    fn test_num_cores_reaches_the_solver() {
        for kind in [SolverKind::Ordinary, SolverKind::BayesianRidge, SolverKind::BayesianArd] {
            let config = SolverConfig {
                kind,
                num_cores: Some(4),
                ..SolverConfig::default()
            };
            assert_eq!(config.solver().num_cores(), Some(4));
            assert_eq!(SolverConfig { kind, ..SolverConfig::default() }.solver().num_cores(), None);
        }
        assert!(!SolverKind::Ordinary.is_bayesian());
        assert!(SolverKind::BayesianArd.is_bayesian());
    }

    #[test]
    fn test_ridge_recovers_linear_coefficients() {
        let (features, labels, truth) = linear_data();
        let solver = OrdinaryRidge {
            alpha: 1e-10,
            num_cores: None,
        };
        let fit = solver.fit(&features, &labels, &Array1::zeros(3)).unwrap();
        assert!(fit.converged);
        assert!(fit.covariance.is_none());
        for (w, t) in fit.coefficients.iter().zip(&truth) {
            assert!((w - t).abs() < 1e-6, "{} vs {}", w, t);
        }
    }

    #[test]
    fn test_ridge_shrinks_with_penalty() {
        let (features, labels, _) = linear_data();
        let weak = OrdinaryRidge {
            alpha: 1e-6,
            num_cores: None,
        }
        .fit(&features, &labels, &Array1::zeros(3)).unwrap();
        let strong = OrdinaryRidge {
            alpha: 100.0,
            num_cores: None,
        }
        .fit(&features, &labels, &Array1::zeros(3)).unwrap();
        assert!(strong.coefficients.dot(&strong.coefficients) < weak.coefficients.dot(&weak.coefficients));
    }

    #[test]
    fn test_dimension_mismatch() {
        let (features, _, _) = linear_data();
        let result = OrdinaryRidge {
            alpha: 1.0,
            num_cores: None,
        }
        .fit(&features, &Array1::zeros(3), &Array1::zeros(3));
        assert!(matches!(result, Err(SolverError::DimensionMismatch { rows: 8, labels: 3 })));
    }

    #[test]
    fn test_bayesian_ridge_covariance() {
        let (features, mut labels, truth) = linear_data();
        // Small deterministic noise keeps the noise precision finite.
        for (i, y) in labels.iter_mut().enumerate() {
            *y += if i % 2 == 0 { 0.01 } else { -0.01 };
        }
        let config = SolverConfig {
            kind: SolverKind::BayesianRidge,
            ..SolverConfig::default()
        };
        let fit = config.solver().fit(&features, &labels, &Array1::zeros(3)).unwrap();
        let covariance = fit.covariance.unwrap();
        assert_eq!(covariance.dim(), (3, 3));
        for i in 0..3 {
            assert!(covariance[[i, i]] > 0.0);
            for j in 0..3 {
                assert_eq!(covariance[[i, j]], covariance[[j, i]]);
            }
        }
        for (w, t) in fit.coefficients.iter().zip(&truth) {
            assert!((w - t).abs() < 0.1, "{} vs {}", w, t);
        }
    }

    #[test]
    fn test_ard_prunes_irrelevant_weight() {
        let features = array![
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 0.0],
            [1.0, 2.0, 1.0],
            [1.0, 3.0, 0.0],
            [1.0, 4.0, 1.0],
            [1.0, 5.0, 0.0],
            [1.0, 6.0, 1.0],
            [1.0, 7.0, 0.0],
        ];
        let mut labels = features.column(1).mapv(|x| 1.5 * x + 1.0);
        for (i, y) in labels.iter_mut().enumerate() {
            *y += if i % 4 < 2 { 0.01 } else { -0.01 };
        }
        let config = SolverConfig {
            kind: SolverKind::BayesianArd,
            ..SolverConfig::default()
        };
        let fit = config.solver().fit(&features, &labels, &Array1::zeros(3)).unwrap();
        let covariance = fit.covariance.unwrap();
        assert_eq!(covariance.dim(), (3, 3));
        assert!((fit.coefficients[1] - 1.5).abs() < 0.05);
        assert!(fit.coefficients[2].abs() < 0.05);
    }
}
