use crate::error::AnnotError;
use annot_types::matrix::{ExpressionMatrix, ExpressionValues};
use log::warn;
use ndarray::Array2;
use std::collections::HashMap;

/// Overlap fraction below which [`harmonize`] emits an advisory warning.
pub const DEFAULT_LOW_OVERLAP_WARNING: f64 = 0.5;

/// Align an input matrix's gene columns to a model's feature vocabulary.
///
/// The output has exactly one column per model feature, in model order.
/// Gene names are matched case-sensitively. Model features missing from the
/// input become all-zero columns ("not expressed"); input genes unknown to
/// the model are dropped. Downstream decision scores depend on the zero-fill
/// convention, so it is part of the contract.
///
/// Fails with [`AnnotError::IncompatibleFeatureSpace`] when no input gene
/// matches any model feature.
pub fn harmonize(input: &ExpressionMatrix, features: &[String]) -> Result<Array2<f64>, AnnotError> {
    harmonize_with_threshold(input, features, DEFAULT_LOW_OVERLAP_WARNING)
}

/// [`harmonize`] with a caller-chosen low-overlap warning threshold.
/// The threshold is advisory only and never affects the output.
pub fn harmonize_with_threshold(
    input: &ExpressionMatrix,
    features: &[String],
    warn_below: f64,
) -> Result<Array2<f64>, AnnotError> {
    let column_of: HashMap<&str, usize> = features
        .iter()
        .enumerate()
        .map(|(i, f)| (f.as_str(), i))
        .collect();

    let n = input.n_cells();
    let mut out = Array2::zeros((n, features.len()));

    // input column -> model column, None for genes unknown to the model
    let kept: Vec<Option<usize>> = input
        .genes
        .iter()
        .map(|g| column_of.get(g.as_str()).copied())
        .collect();
    // count distinct model features so the overlap fraction stays in [0, 1]
    let mut seen = vec![false; features.len()];
    for &k in kept.iter().flatten() {
        seen[k] = true;
    }
    let matched = seen.iter().filter(|&&s| s).count();

    match &input.matrix {
        ExpressionValues::Dense(m) => {
            for (j, k) in kept.iter().enumerate() {
                if let Some(&k) = k.as_ref() {
                    out.column_mut(k).assign(&m.column(j));
                }
            }
        }
        ExpressionValues::Sparse(m) => {
            for (i, row) in m.outer_iterator().enumerate() {
                for (j, &v) in row.iter() {
                    if let Some(k) = kept[j] {
                        out[[i, k]] = v;
                    }
                }
            }
        }
    }

    if matched == 0 {
        return Err(AnnotError::IncompatibleFeatureSpace);
    }
    let overlap = matched as f64 / features.len() as f64;
    if overlap < warn_below {
        warn!(
            "only {} of {} model features found in the input ({:.1}% overlap); predictions may be unreliable",
            matched,
            features.len(),
            100.0 * overlap
        );
    }

    Ok(out)
}
