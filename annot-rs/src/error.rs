use thiserror::Error;

/// Failure modes of the annotation engine. Every kind aborts the current
/// prediction call; none is retried, since all are deterministic functions
/// of the inputs.
#[derive(Debug, Error)]
pub enum AnnotError {
    /// No overlap between the input genes and the model's feature space.
    #[error("input genes share no features with the model; cannot score this matrix")]
    IncompatibleFeatureSpace,

    /// Internal invariant violation between a harmonized matrix and the
    /// model parameters. Unreachable for inputs produced by the harmonizer;
    /// indicates a defect, not a user error.
    #[error("dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which invariant was violated.
        context: &'static str,
        /// Dimension required by the model.
        expected: usize,
        /// Dimension actually seen.
        actual: usize,
    },

    /// A supplied grouping does not cover exactly the scored cell set.
    #[error("grouping covers {grouping_cells} cells but {scored_cells} cells were scored")]
    GroupingCardinalityMismatch {
        /// Number of cells in the grouping.
        grouping_cells: usize,
        /// Number of cells that were scored.
        scored_cells: usize,
    },

    /// A grouping file does not have one line per input cell.
    #[error("grouping file has {lines} lines but the input has {cells} cells")]
    GroupingLengthMismatch {
        /// Lines found in the file.
        lines: usize,
        /// Cells in the input matrix.
        cells: usize,
    },

    /// A group with no member cells. Unreachable for groupings derived from
    /// a partition of the cell set; kept as a defensive check.
    #[error("group '{group}' has no member cells")]
    EmptyGrouping {
        /// The offending group id.
        group: String,
    },
}
