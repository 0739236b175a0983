use crate::consensus::majority_vote;
use crate::grouping::{resolve, GroupingSource};
use crate::harmonize::harmonize;
use crate::model::ModelArtifact;
use crate::score::{scale, score};
use annot_types::matrix::ExpressionMatrix;
use annot_types::result::{AnnotationResult, ConsensusResult};
use anyhow::Error;
use log::info;

/// Predict a cell type for every cell of `input`, without consensus
/// refinement: harmonize the gene space, score, and take the per-cell
/// argmax.
pub fn annotate(model: &ModelArtifact, input: &ExpressionMatrix) -> Result<AnnotationResult, Error> {
    let harmonized = harmonize(input, &model.features)?;
    let scores = score(model, &harmonized.view())?;
    info!(
        "annotated {} cells against {} cell types",
        input.n_cells(),
        model.n_cell_types()
    );
    Ok(build_result(model, input, scores, None))
}

/// Predict and then refine by majority voting within the grouping resolved
/// from `source`. The scaled cell-by-feature matrix is handed to the
/// over-clustering collaborator when the heuristic source is selected.
pub fn annotate_with_consensus(
    model: &ModelArtifact,
    input: &ExpressionMatrix,
    source: GroupingSource<'_>,
) -> Result<AnnotationResult, Error> {
    let harmonized = harmonize(input, &model.features)?;
    let scores = score(model, &harmonized.view())?;
    let embedding = scale(model, &harmonized.view());
    let grouping = resolve(source, input, &embedding.view())?;
    let consensus = majority_vote(&scores.predicted, &grouping, model.n_cell_types())?;
    info!(
        "annotated {} cells against {} cell types, majority voting over {} groups",
        input.n_cells(),
        model.n_cell_types(),
        grouping.members().len()
    );

    let refined = ConsensusResult {
        grouping: grouping.labels,
        labels: consensus.labels.iter().map(|&c| model.cell_types[c].clone()).collect(),
        confidence: consensus.confidence,
    };
    Ok(build_result(model, input, scores, Some(refined)))
}

fn build_result(
    model: &ModelArtifact,
    input: &ExpressionMatrix,
    scores: crate::score::Scores,
    consensus: Option<ConsensusResult>,
) -> AnnotationResult {
    AnnotationResult {
        cells: input.cells.clone(),
        cell_types: model.cell_types.clone(),
        predicted: scores
            .predicted
            .iter()
            .map(|&c| model.cell_types[c].clone())
            .collect(),
        decision: scores.decision,
        probability: scores.probability,
        consensus,
    }
}
