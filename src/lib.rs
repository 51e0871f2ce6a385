//! # regression-circuit: structure-learned regression circuits
//!
//! A **regression circuit** is a probabilistic sentential decision diagram
//! (PSDD) over a fixed [vtree][crate::vtree::Vtree] whose circuit elements
//! double as the features of a linear model. Every terminal and every element
//! carries one parameter; the prediction for an input is the bias plus the
//! dot product of those parameters with the per-input features.
//!
//! Learning alternates two steps:
//!
//! - **Parameter learning** refits all parameters at once with a ridge or
//!   Bayesian regression solver (see [`solver`]).
//! - **Structure learning** picks the elements whose gradient is most
//!   inconsistent across the data and splits them on a variable, so the
//!   circuit can tell apart inputs it used to treat the same (see [`split`]
//!   and [`mutate`]).
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use ndarray::array;
//! use regression_circuit::dataset::DataSet;
//! use regression_circuit::train::{learn_regression_circuit, TrainConfig};
//! use regression_circuit::vtree::Vtree;
//!
//! let images = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
//! let labels = array![0.0, 1.0, 1.0, 3.0];
//! let train = DataSet::new(images, labels);
//!
//! let config = TrainConfig {
//!     max_iter_sl: 2,
//!     ..TrainConfig::default()
//! };
//! let result = learn_regression_circuit(Arc::new(Vtree::balanced(2)), train, None, config).unwrap();
//! assert_eq!(result.error_history.len(), 3);
//! ```
//!
//! ## Core Components
//!
//! - **[`circuit`]**: The [`Circuit`][crate::circuit::Circuit] arena, its parameter vector and predictions.
//! - **[`features`]**: Bottom-up probabilities and top-down feature flow.
//! - **[`split`]** and **[`mutate`]**: Split selection and the structural edit that applies a split.
//! - **[`solver`]** and **[`learn`]**: Regression solvers and parameter refitting.
//! - **[`train`]**: The structure learning loop.
//! - **[`io`]**: Vtree and circuit file formats.
//! - **[`dot`]**: Graphviz export.

pub mod circuit;
pub mod dataset;
pub mod dot;
pub mod error;
pub mod features;
pub mod io;
pub mod learn;
pub mod linalg;
pub mod mutate;
pub mod node;
pub mod reference;
pub mod solver;
pub mod split;
pub mod storage;
pub mod train;
pub mod types;
pub mod vtree;
