//! # annot-rs: Cell Type Annotation in Rust
//!
//! Inference-and-consensus engine for assigning cell-type labels to
//! single-cell expression profiles with a pretrained linear classifier,
//! refined by cluster-level majority voting.

#![deny(missing_docs)]
#![deny(warnings)]

/// Prediction pipeline orchestration
pub mod annotate;

/// Majority voting over a cell grouping
pub mod consensus;

/// Engine error kinds
pub mod error;

/// Alignment of input genes to a model's feature space
pub mod harmonize;

/// Cell grouping resolution
pub mod grouping;

/// Pretrained model artifact
pub mod model;

/// Expression matrix loading routines
pub mod mtx;

/// Decision scores, probabilities and predicted labels
pub mod score;

pub use error::AnnotError;
