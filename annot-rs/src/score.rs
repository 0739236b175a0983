use crate::error::AnnotError;
use crate::model::ModelArtifact;
use log::warn;
use ndarray::{Array2, ArrayView1, ArrayView2};

/// Per-cell scores for one prediction run.
#[derive(Clone, Debug)]
pub struct Scores {
    /// N x C raw decision scores.
    pub decision: Array2<f64>,
    /// N x C independent per-class logistic probabilities. One-vs-rest
    /// semantics: rows are not normalized to sum to 1.
    pub probability: Array2<f64>,
    /// Per-cell argmax over decision scores, as indices into the model's
    /// `cell_types`. Ties resolve to the lowest class index.
    pub predicted: Vec<usize>,
}

/// Score a harmonized matrix against a model.
///
/// Standardizes with the model's scaler (features with zero training
/// standard deviation scale to 0 rather than dividing by zero), projects
/// through the classifier, and applies the logistic transform per class.
/// Pure: the model is never mutated, and identical inputs produce identical
/// outputs.
pub fn score(model: &ModelArtifact, harmonized: &ArrayView2<f64>) -> Result<Scores, AnnotError> {
    if harmonized.ncols() != model.n_features() {
        return Err(AnnotError::DimensionMismatch {
            context: "harmonized matrix columns vs model features",
            expected: model.n_features(),
            actual: harmonized.ncols(),
        });
    }

    let scaled = scale(model, harmonized);
    let decision = model.classifier.decision(&scaled.view());
    if decision.dim() != (harmonized.nrows(), model.n_cell_types()) {
        return Err(AnnotError::DimensionMismatch {
            context: "decision matrix classes vs model cell types",
            expected: model.n_cell_types(),
            actual: decision.ncols(),
        });
    }

    let probability = decision.mapv(logistic);
    let predicted = decision.rows().into_iter().map(row_argmax).collect();

    Ok(Scores {
        decision,
        probability,
        predicted,
    })
}

/// Standardize a harmonized matrix with the model's scaler, or pass it
/// through unchanged when the model carries none.
pub fn scale(model: &ModelArtifact, harmonized: &ArrayView2<f64>) -> Array2<f64> {
    let mut scaled = harmonized.to_owned();
    match &model.scaler {
        Some(s) => {
            for (j, mut col) in scaled.columns_mut().into_iter().enumerate() {
                let sd = s.std_dev[j];
                if sd == 0.0 {
                    // constant training feature carries no signal
                    col.fill(0.0);
                } else {
                    let mean = s.mean[j];
                    col.mapv_inplace(|v| (v - mean) / sd);
                }
            }
        }
        None => warn!("model has no scaler; falling back to identity scaling"),
    }
    scaled
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn row_argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}
