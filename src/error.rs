//! Error types.

use std::io;

use thiserror::Error;

use crate::reference::ElementId;

/// Errors raised while reading a circuit or vtree file.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("circuit file has {found} terminal nodes, vtree requires {expected}")]
    MismatchedTerminalCount { expected: usize, found: usize },
    #[error("circuit file contains no decision node to serve as the root")]
    MissingRoot,
    #[error("circuit file does not record the bias parameter")]
    MissingBias,
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("reference to unknown node {index}")]
    UnknownNode { index: u32 },
    #[error("reference to unknown vtree node {index}")]
    UnknownVtree { index: u32 },
    #[error("line {line}: unexpected record")]
    UnexpectedLine { line: usize },
}

/// Errors raised by a regression solver.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error("design matrix has {rows} rows but {labels} labels were given")]
    DimensionMismatch { rows: usize, labels: usize },
    #[error("system matrix is not positive definite")]
    NotPositiveDefinite,
    #[error("unknown solver {0:?}, expected one of: ordinary, auto, bayesian-ridge, bayesian-ard")]
    UnknownSolver(String),
}

#[derive(Error, Debug)]
pub enum CircuitError {
    /// A split collapsed both branches of the element to nothing.
    #[error("splitting {element} on x{var} left no valid element on one side")]
    StructuralInvariantViolation { element: ElementId, var: u32 },
    /// A node reached during a copy walk had no parent left.
    #[error("node {index} has no parent")]
    OrphanNode { index: u32 },
    #[error("x{var} is not splittable on {element}")]
    NotSplittable { element: ElementId, var: u32 },
    #[error("{element} is not part of the circuit")]
    DeadElement { element: ElementId },
    #[error("vtree root must be an internal node")]
    DegenerateVtree,
    #[error("feature matrix has {found} columns, circuit has {expected} parameters")]
    FeatureWidth { expected: usize, found: usize },
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Solver(#[from] SolverError),
}

impl CircuitError {
    /// Whether the error invalidates the whole run rather than a single split.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            CircuitError::StructuralInvariantViolation { .. }
                | CircuitError::NotSplittable { .. }
                | CircuitError::DeadElement { .. }
        )
    }
}

pub type Result<T, E = CircuitError> = std::result::Result<T, E>;
