use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Majority-voting output attached to an [`AnnotationResult`] when consensus
/// refinement was requested.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// Group id of each cell, row-aligned to the result's `cells`.
    pub grouping: Vec<String>,
    /// Majority-voted label of each cell.
    pub labels: Vec<String>,
    /// Fraction of the cell's group that agreed with the group mode.
    pub confidence: Vec<f64>,
}

/// The product of one prediction run. Immutable once produced; downstream
/// export and visualization consume it read-only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnnotationResult {
    /// Cell ids in input row order.
    pub cells: Vec<String>,
    /// Class label vocabulary of the model, in model order.
    pub cell_types: Vec<String>,
    /// Per-cell predicted label (argmax over decision scores).
    pub predicted: Vec<String>,
    /// N x C decision scores.
    pub decision: Array2<f64>,
    /// N x C independent per-class logistic probabilities. Rows do not sum
    /// to 1; the classes are one-vs-rest axes.
    pub probability: Array2<f64>,
    /// Present when majority voting ran.
    pub consensus: Option<ConsensusResult>,
}

impl AnnotationResult {
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// The label to report for a cell: the majority-voted one when consensus
    /// ran, the individual prediction otherwise.
    pub fn final_label(&self, cell: usize) -> &str {
        match &self.consensus {
            Some(c) => &c.labels[cell],
            None => &self.predicted[cell],
        }
    }
}
