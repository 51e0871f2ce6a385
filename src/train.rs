//! Structure and parameter learning loop.
//!
//! Training alternates three phases per round after an initial fit of the
//! full vtree expansion:
//!
//! ```text
//! Init → { Structure → Refit → Eval }* → Done
//! ```
//!
//! - `Structure` selects and applies one round of splits.
//! - `Refit` recomputes the features and refits all parameters.
//! - `Eval` measures the validation error every `validate_every` rounds,
//!   keeps a copy of the best circuit so far and stops once the error has not
//!   improved for more than `patience` validations.
//!
//! [`Trainer`] exposes the loop one phase at a time; [`learn_regression_circuit`]
//! runs it to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::circuit::Circuit;
use crate::dataset::DataSet;
use crate::error::Result;
use crate::solver::SolverConfig;
use crate::split::SplitConfig;
use crate::vtree::Vtree;

#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub solver: SolverConfig,
    pub split: SplitConfig,
    /// Maximum number of structure learning rounds.
    pub max_iter_sl: usize,
    pub validate_every: usize,
    pub patience: usize,
    /// Seed for the initial parameters.
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            split: SplitConfig::default(),
            max_iter_sl: 1000,
            validate_every: 10,
            patience: 2,
            seed: 1337,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Structure,
    Refit,
    Eval,
    Done,
}

#[derive(Debug)]
pub struct TrainResult {
    /// The best circuit on the validation set, or the last one without a
    /// validation set.
    pub circuit: Circuit,
    /// Training error after the initial fit and after every round.
    pub error_history: Vec<f64>,
}

pub struct Trainer {
    config: TrainConfig,
    train: DataSet,
    valid: Option<DataSet>,
    phase: Phase,
    circuit: Circuit,
    best: Option<Circuit>,
    valid_best: f64,
    waited: usize,
    iteration: usize,
    error_history: Vec<f64>,
    cancel: Option<Arc<AtomicBool>>,
    round_start: Instant,
}

impl Trainer {
    /// Builds the starting circuit over `vtree` with parameters drawn from
    /// a generator seeded with `config.seed`.
    pub fn new(vtree: Arc<Vtree>, train: DataSet, valid: Option<DataSet>, config: TrainConfig) -> Result<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let circuit = Circuit::new(vtree, &mut rng)?;
        Ok(Self {
            config,
            train,
            valid,
            phase: Phase::Init,
            circuit,
            best: None,
            valid_best: f64::INFINITY,
            waited: 0,
            iteration: 0,
            error_history: Vec::new(),
            cancel: None,
            round_start: Instant::now(),
        })
    }

    /// Stops the loop at the next round boundary once `flag` is set.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Number of completed rounds.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn error_history(&self) -> &[f64] {
        &self.error_history
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Runs the current phase and moves to the next one.
    pub fn step(&mut self) -> Result<Phase> {
        self.phase = match self.phase {
            Phase::Init => self.init(),
            Phase::Structure => self.structure()?,
            Phase::Refit => self.refit()?,
            Phase::Eval => self.eval(),
            Phase::Done => Phase::Done,
        };
        Ok(self.phase)
    }

    /// Runs until `Done`.
    pub fn run(mut self) -> Result<TrainResult> {
        let start = Instant::now();
        info!("Start structure learning.");
        while self.step()? != Phase::Done {}
        info!("Structure learning done in {:.3} secs", start.elapsed().as_secs_f64());
        Ok(self.into_result())
    }

    pub fn into_result(self) -> TrainResult {
        let circuit = match (self.valid, self.best) {
            (Some(_), Some(best)) => best,
            _ => self.circuit,
        };
        TrainResult {
            circuit,
            error_history: self.error_history,
        }
    }

    fn init(&mut self) -> Phase {
        info!("The starting circuit has {} parameters.", self.circuit.num_parameters());
        self.train.refresh_features(&self.circuit);
        let error = self.circuit.calculate_error(&self.train);
        info!(" error: {:.5}", error);
        self.error_history.push(error);

        if self.config.max_iter_sl == 0 || self.is_cancelled() {
            return Phase::Done;
        }
        Phase::Structure
    }

    fn structure(&mut self) -> Result<Phase> {
        self.round_start = Instant::now();
        let applied = self.circuit.change_structure(&self.train, &self.config.split)?;
        debug!("round {}: {} splits applied", self.iteration + 1, applied.len());
        Ok(Phase::Refit)
    }

    fn refit(&mut self) -> Result<Phase> {
        self.train.refresh_features(&self.circuit);

        let fit_start = Instant::now();
        self.circuit.learn_parameters(&self.train, &self.config.solver)?;
        let fit_time = fit_start.elapsed();
        let error = self.circuit.calculate_error(&self.train);

        info!(
            "done iter {}/{} in {:.3} secs",
            self.iteration + 1,
            self.config.max_iter_sl,
            self.round_start.elapsed().as_secs_f64()
        );
        info!("\tparameters learning done in {:.3} secs", fit_time.as_secs_f64());
        info!("\terror: {:.5} size {}", error, self.circuit.num_parameters());
        self.error_history.push(error);
        Ok(Phase::Eval)
    }

    fn eval(&mut self) -> Phase {
        let round = self.iteration;
        self.iteration += 1;

        let validate_every = self.config.validate_every.max(1);
        if round % validate_every == 0 {
            if let Some(valid) = self.valid.as_mut() {
                info!("evaluate in the validation set");
                valid.refresh_features(&self.circuit);
                let error = self.circuit.calculate_error(valid);
                if error >= self.valid_best {
                    info!("Worsening on valid: {} >= prev best {}", error, self.valid_best);
                    if self.waited >= self.config.patience {
                        info!("Exceeding patience {} >= {}: STOP", self.waited, self.config.patience);
                        return Phase::Done;
                    }
                    self.waited += 1;
                } else {
                    info!("Found new best model {}", error);
                    self.best = Some(self.circuit.clone());
                    self.valid_best = error;
                    self.waited = 0;
                }
            }
        }

        if self.iteration >= self.config.max_iter_sl {
            return Phase::Done;
        }
        if self.is_cancelled() {
            info!("training cancelled after {} rounds", self.iteration);
            return Phase::Done;
        }
        Phase::Structure
    }
}

/// Grows and fits a regression circuit over `vtree`.
///
/// Returns the best circuit on `valid` (the last one if `valid` is `None`)
/// and the training error history.
pub fn learn_regression_circuit(
    vtree: Arc<Vtree>,
    train: DataSet,
    valid: Option<DataSet>,
    config: TrainConfig,
) -> Result<TrainResult> {
    Trainer::new(vtree, train, valid, config)?.run()
}
