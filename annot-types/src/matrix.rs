use anyhow::{format_err, Error};
use ndarray::Array2;
use sprs::CsMat;
use std::collections::{BTreeMap, HashSet};

/// Numeric storage for an expression matrix, rows = cells, columns = genes.
#[derive(Clone, Debug)]
pub enum ExpressionValues {
    Dense(Array2<f64>),
    Sparse(CsMat<f64>),
}

impl ExpressionValues {
    pub fn rows(&self) -> usize {
        match self {
            ExpressionValues::Dense(m) => m.nrows(),
            ExpressionValues::Sparse(m) => m.rows(),
        }
    }

    pub fn cols(&self) -> usize {
        match self {
            ExpressionValues::Dense(m) => m.ncols(),
            ExpressionValues::Sparse(m) => m.cols(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GenericExpressionMatrix<M> {
    pub name: String,
    pub cells: Vec<String>,
    pub genes: Vec<String>,
    /// Per-cell annotation columns attached by upstream analysis,
    /// e.g. a cluster assignment. Each vector is row-aligned to `cells`.
    pub annotations: BTreeMap<String, Vec<String>>,
    pub matrix: M,
}

pub type ExpressionMatrix = GenericExpressionMatrix<ExpressionValues>;

impl ExpressionMatrix {
    /// Build an expression matrix, checking that the vocabularies are
    /// unique and match the storage dimensions. Values must hold
    /// log-normalized expression; that is the caller's responsibility and
    /// is not validated here.
    pub fn new(
        name: impl Into<String>,
        cells: Vec<String>,
        genes: Vec<String>,
        matrix: ExpressionValues,
    ) -> Result<ExpressionMatrix, Error> {
        if cells.len() != matrix.rows() {
            return Err(format_err!(
                "cell names ({}) do not match matrix rows ({})",
                cells.len(),
                matrix.rows()
            ));
        }
        if genes.len() != matrix.cols() {
            return Err(format_err!(
                "gene names ({}) do not match matrix columns ({})",
                genes.len(),
                matrix.cols()
            ));
        }
        if let Some(dup) = first_duplicate(&cells) {
            return Err(format_err!("duplicate cell id '{dup}'"));
        }
        if let Some(dup) = first_duplicate(&genes) {
            return Err(format_err!("duplicate gene name '{dup}'"));
        }
        Ok(ExpressionMatrix {
            name: name.into(),
            cells,
            genes,
            annotations: BTreeMap::new(),
            matrix,
        })
    }

    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn n_genes(&self) -> usize {
        self.genes.len()
    }

    /// Attach a per-cell annotation column. Fails if the column length does
    /// not cover the cell set or the name is already taken.
    pub fn attach_annotation(&mut self, name: impl Into<String>, values: Vec<String>) -> Result<(), Error> {
        let name = name.into();
        if values.len() != self.cells.len() {
            return Err(format_err!(
                "annotation '{}' has {} values for {} cells",
                name,
                values.len(),
                self.cells.len()
            ));
        }
        if self.annotations.contains_key(&name) {
            return Err(format_err!("annotation '{name}' already attached"));
        }
        self.annotations.insert(name, values);
        Ok(())
    }

    pub fn annotation(&self, name: &str) -> Option<&[String]> {
        self.annotations.get(name).map(Vec::as_slice)
    }
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(names.len());
    names.iter().find(|n| !seen.insert(n.as_str())).map(String::as_str)
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::arr2;

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn test_dimension_checks() {
        let values = ExpressionValues::Dense(arr2(&[[1.0, 0.0, 2.0], [0.0, 3.0, 0.0]]));
        assert!(ExpressionMatrix::new("m", names("c", 2), names("g", 3), values.clone()).is_ok());
        assert!(ExpressionMatrix::new("m", names("c", 3), names("g", 3), values.clone()).is_err());
        assert!(ExpressionMatrix::new("m", names("c", 2), names("g", 2), values).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let values = ExpressionValues::Dense(arr2(&[[1.0, 2.0], [3.0, 4.0]]));
        let dup_genes = vec!["G1".to_string(), "G1".to_string()];
        let err = ExpressionMatrix::new("m", names("c", 2), dup_genes, values.clone()).unwrap_err();
        assert!(err.to_string().contains("duplicate gene name 'G1'"));

        let dup_cells = vec!["c0".to_string(), "c0".to_string()];
        let err = ExpressionMatrix::new("m", dup_cells, names("g", 2), values).unwrap_err();
        assert!(err.to_string().contains("duplicate cell id 'c0'"));
    }

    #[test]
    fn test_attach_annotation() {
        let values = ExpressionValues::Dense(arr2(&[[1.0], [2.0]]));
        let mut m = ExpressionMatrix::new("m", names("c", 2), names("g", 1), values).unwrap();
        assert!(m.attach_annotation("cluster", vec!["0".into()]).is_err());
        m.attach_annotation("cluster", vec!["0".into(), "1".into()]).unwrap();
        assert!(m.attach_annotation("cluster", vec!["0".into(), "1".into()]).is_err());
        assert_eq!(m.annotation("cluster").unwrap(), ["0".to_string(), "1".to_string()]);
        assert!(m.annotation("missing").is_none());
    }
}
