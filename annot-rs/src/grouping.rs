use crate::error::AnnotError;
use annot_types::matrix::ExpressionMatrix;
use anyhow::{bail, format_err, Context, Error};
use log::info;
use ndarray::ArrayView2;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Capability interface over the external over-clustering collaborator.
///
/// Implementations receive the matrix the cells are scored in (rows =
/// cells) and must return one group label per row, a total partition of the
/// cell set. Resolution policy (how many groups for how many cells) belongs
/// to the implementation. The call is synchronous; the prediction run
/// blocks until it returns.
pub trait OverClustering {
    /// Produce a per-cell group label for every row of `cells`.
    fn cluster(&self, cells: &ArrayView2<f64>) -> Result<Vec<String>, Error>;
}

/// The closed set of accepted grouping forms, in precedence order.
pub enum GroupingSource<'a> {
    /// An explicit per-cell label list.
    Labels(Vec<String>),
    /// A per-cell annotation column already attached to the input matrix.
    Column(&'a str),
    /// A plain-text file, one group label per line, aligned to input rows.
    File(PathBuf),
    /// Delegate to the external over-clustering collaborator.
    Heuristic(&'a dyn OverClustering),
}

impl<'a> GroupingSource<'a> {
    /// Pick the grouping source when several forms may have been supplied:
    /// explicit labels win over a referenced column, which wins over a
    /// file; the heuristic collaborator is the fallback when nothing was
    /// supplied. There is no fallback between supplied forms.
    pub fn select(
        labels: Option<Vec<String>>,
        column: Option<&'a str>,
        file: Option<PathBuf>,
        fallback: &'a dyn OverClustering,
    ) -> GroupingSource<'a> {
        if let Some(labels) = labels {
            GroupingSource::Labels(labels)
        } else if let Some(column) = column {
            GroupingSource::Column(column)
        } else if let Some(file) = file {
            GroupingSource::File(file)
        } else {
            GroupingSource::Heuristic(fallback)
        }
    }
}

/// A resolved, validated cell grouping: one group label per cell, in input
/// row order, covering every cell exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grouping {
    /// Group label of each cell.
    pub labels: Vec<String>,
}

impl Grouping {
    /// Build a grouping from per-cell labels, checking that it covers
    /// exactly `n_cells` cells.
    pub fn from_labels(labels: Vec<String>, n_cells: usize) -> Result<Grouping, AnnotError> {
        if labels.len() != n_cells {
            return Err(AnnotError::GroupingCardinalityMismatch {
                grouping_cells: labels.len(),
                scored_cells: n_cells,
            });
        }
        Ok(Grouping { labels })
    }

    /// Number of cells covered.
    pub fn n_cells(&self) -> usize {
        self.labels.len()
    }

    /// Member cell indices per group, in deterministic group order.
    pub fn members(&self) -> BTreeMap<&str, Vec<usize>> {
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, label) in self.labels.iter().enumerate() {
            groups.entry(label.as_str()).or_default().push(i);
        }
        groups
    }
}

/// Resolve a grouping source against the input matrix.
///
/// `embedding` is the scaled cell-by-feature matrix handed to the
/// over-clustering collaborator when the heuristic form is selected; the
/// other forms ignore it. Structural mismatches surface as the engine's
/// grouping error kinds.
pub fn resolve(
    source: GroupingSource<'_>,
    input: &ExpressionMatrix,
    embedding: &ArrayView2<f64>,
) -> Result<Grouping, Error> {
    let n = input.n_cells();
    let grouping = match source {
        GroupingSource::Labels(labels) => Grouping::from_labels(labels, n)?,
        GroupingSource::Column(name) => {
            let values = input
                .annotation(name)
                .ok_or_else(|| format_err!("no annotation '{name}' attached to input '{}'", input.name))?;
            Grouping::from_labels(values.to_vec(), n)?
        }
        GroupingSource::File(path) => {
            let file = BufReader::new(File::open(&path).with_context(|| path.display().to_string())?);
            let labels = read_grouping_lines(file).with_context(|| path.display().to_string())?;
            if labels.len() != n {
                return Err(AnnotError::GroupingLengthMismatch {
                    lines: labels.len(),
                    cells: n,
                }
                .into());
            }
            Grouping { labels }
        }
        GroupingSource::Heuristic(collaborator) => {
            info!("no grouping supplied; delegating {n} cells to the over-clustering collaborator");
            let labels = collaborator.cluster(embedding)?;
            Grouping::from_labels(labels, n)?
        }
    };
    Ok(grouping)
}

/// Read a grouping file: one label token per line, no header.
pub fn read_grouping_file(path: impl AsRef<Path>) -> Result<Vec<String>, Error> {
    let path = path.as_ref();
    let file = BufReader::new(File::open(path).with_context(|| path.display().to_string())?);
    read_grouping_lines(file).with_context(|| path.display().to_string())
}

fn read_grouping_lines(reader: impl BufRead) -> Result<Vec<String>, Error> {
    let mut labels = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let token = line?.trim().to_string();
        if token.is_empty() {
            bail!("empty group label on line {}", i + 1);
        }
        labels.push(token);
    }
    Ok(labels)
}
