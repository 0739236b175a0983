use annot_types::matrix::{ExpressionMatrix, ExpressionValues};
use anyhow::{bail, format_err, Context, Error};
use flate2::bufread::MultiGzDecoder;
use log::warn;
use ndarray::Array2;
use sprs::{CsMat, TriMat};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Open a text file, transparently decompressing `.gz` inputs.
fn open_text(path: &Path) -> Result<Box<dyn BufRead>, Error> {
    let file = BufReader::new(File::open(path).with_context(|| path.display().to_string())?);
    if path.extension().is_some_and(|e| e == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(file))
    }
}

/// Parse a sparse-triplet (MatrixMarket-style) stream: `%` comment lines,
/// then a `rows cols nnz` header line, then one `row col value` triplet per
/// line with 1-based indices.
pub fn read_triplets(mut reader: impl BufRead) -> Result<CsMat<f64>, Error> {
    let mut line = String::new();
    let mut lineno = 0usize;
    let mut mat: Option<TriMat<f64>> = None;

    while let Ok(sz) = reader.read_line(&mut line) {
        if sz == 0 {
            break;
        }
        lineno += 1;
        if line.starts_with('%') {
            line.clear();
            continue;
        }
        let mut data = line.split_whitespace();
        if let Some(mat) = mat.as_mut() {
            let row = data
                .next()
                .ok_or_else(|| format_err!("missing ROW"))?
                .parse::<usize>()?
                - 1;
            let col = data
                .next()
                .ok_or_else(|| format_err!("missing COL"))?
                .parse::<usize>()?
                - 1;
            let val = data.next().ok_or_else(|| format_err!("missing VAL"))?.parse::<f64>()?;
            if row >= mat.rows() || col >= mat.cols() {
                bail!(
                    "line {}: triplet ({}, {}) outside the declared {} x {} matrix",
                    lineno,
                    row + 1,
                    col + 1,
                    mat.rows(),
                    mat.cols()
                );
            }
            mat.add_triplet(row, col, val);
        } else {
            let nrow = data.next().ok_or_else(|| format_err!("no NROW"))?.parse::<usize>()?;
            let ncol = data.next().ok_or_else(|| format_err!("no NCOL"))?.parse::<usize>()?;
            let nnz = data.next().ok_or_else(|| format_err!("no NNZ"))?.parse::<usize>()?;
            mat = Some(TriMat::with_capacity((nrow, ncol), nnz));
        }
        line.clear();
    }

    let Some(matrix) = mat else { bail!("no matrix found") };
    Ok(matrix.to_csr())
}

/// Read one name per line. Tab-delimited lines (e.g. 10x feature lists)
/// contribute their first field.
pub fn read_names(reader: impl BufRead) -> Result<Vec<String>, Error> {
    let mut names = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let name = line.split('\t').next().unwrap_or("").trim();
        if name.is_empty() {
            bail!("empty name on line {}", i + 1);
        }
        names.push(name.to_string());
    }
    Ok(names)
}

/// Load a sparse expression matrix from a triplet file plus cell and gene
/// name files. With `transpose`, the triplet file is genes x cells and is
/// flipped to the engine's cells x genes orientation.
pub fn load_sparse(
    mtx_path: impl AsRef<Path>,
    cells_path: impl AsRef<Path>,
    genes_path: impl AsRef<Path>,
    transpose: bool,
) -> Result<ExpressionMatrix, Error> {
    let mtx_path = mtx_path.as_ref();
    let mut matrix = read_triplets(open_text(mtx_path)?).with_context(|| mtx_path.display().to_string())?;
    if transpose {
        matrix = matrix.transpose_into().to_csr();
    }

    let cells_path = cells_path.as_ref();
    let cells = read_names(open_text(cells_path)?).with_context(|| cells_path.display().to_string())?;
    let genes_path = genes_path.as_ref();
    let genes = read_names(open_text(genes_path)?).with_context(|| genes_path.display().to_string())?;

    let name = mtx_path.display().to_string();
    let matrix = ExpressionMatrix::new(name, cells, genes, ExpressionValues::Sparse(matrix))?;
    check_expression(&matrix)?;
    Ok(matrix)
}

/// Load a dense delimited-text matrix: header row of gene names, one row
/// per cell with the cell id in the first column. Comma or tab delimited,
/// detected from the header. With `transpose`, rows are genes and the
/// header holds cell ids.
pub fn load_dense(path: impl AsRef<Path>, transpose: bool) -> Result<ExpressionMatrix, Error> {
    let path = path.as_ref();
    let matrix = read_dense(open_text(path)?, path.display().to_string(), transpose)
        .with_context(|| path.display().to_string())?;
    check_expression(&matrix)?;
    Ok(matrix)
}

/// Parse a dense delimited-text matrix from any reader.
pub fn read_dense(reader: impl BufRead, name: String, transpose: bool) -> Result<ExpressionMatrix, Error> {
    let mut lines = reader.lines();
    let header = lines.next().ok_or_else(|| format_err!("empty matrix file"))??;
    let delim = if header.contains('\t') { '\t' } else { ',' };
    let columns: Vec<String> = header
        .split(delim)
        .skip(1)
        .map(|s| s.trim().to_string())
        .collect();
    if columns.is_empty() {
        bail!("header row has no data columns");
    }

    let mut row_names = Vec::new();
    let mut values = Vec::new();
    for (i, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split(delim);
        let row_name = fields
            .next()
            .ok_or_else(|| format_err!("missing row name on line {}", i + 2))?
            .trim();
        row_names.push(row_name.to_string());
        let start = values.len();
        for field in fields {
            values.push(
                field
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("line {}", i + 2))?,
            );
        }
        if values.len() - start != columns.len() {
            bail!(
                "line {} has {} values, expected {}",
                i + 2,
                values.len() - start,
                columns.len()
            );
        }
    }

    let mut matrix = Array2::from_shape_vec((row_names.len(), columns.len()), values)?;
    let (cells, genes) = if transpose {
        matrix = matrix.reversed_axes().as_standard_layout().to_owned();
        (columns, row_names)
    } else {
        (row_names, columns)
    };
    Ok(ExpressionMatrix::new(
        name,
        cells,
        genes,
        ExpressionValues::Dense(matrix),
    )?)
}

/// Coarse numeric validity checks. Non-finite and negative values are
/// fatal (log-normalized expression is non-negative); data that look like
/// raw counts only draw an advisory, since normalization correctness is
/// the caller's responsibility.
fn check_expression(matrix: &ExpressionMatrix) -> Result<(), Error> {
    let mut max = 0.0f64;
    let mut all_integral = true;
    let mut check = |v: f64| -> Result<(), Error> {
        if !v.is_finite() {
            bail!("non-finite expression value {v}");
        }
        if v < 0.0 {
            bail!("negative expression value {v}");
        }
        max = max.max(v);
        all_integral &= v.fract() == 0.0;
        Ok(())
    };
    match &matrix.matrix {
        ExpressionValues::Dense(m) => {
            for &v in m {
                check(v)?;
            }
        }
        ExpressionValues::Sparse(m) => {
            for &v in m.data() {
                check(v)?;
            }
        }
    }
    if all_integral && max > 20.0 {
        warn!(
            "'{}' looks like raw counts (integral values up to {max}); the model expects log-normalized expression",
            matrix.name
        );
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::arr2;

    const TRIPLETS: &str = "%%MatrixMarket matrix coordinate real general\n\
                            % comment\n\
                            3 2 3\n\
                            1 1 1.5\n\
                            3 2 2.0\n\
                            2 1 4.0\n";

    #[test]
    fn test_read_triplets() {
        let m = read_triplets(TRIPLETS.as_bytes()).unwrap();
        assert_eq!(m.shape(), (3, 2));
        assert_eq!(m.nnz(), 3);
        assert_eq!(m.get(0, 0), Some(&1.5));
        assert_eq!(m.get(2, 1), Some(&2.0));
        assert_eq!(m.get(1, 0), Some(&4.0));
        assert_eq!(m.get(0, 1), None);
    }

    #[test]
    fn test_read_triplets_rejects_garbage() {
        assert!(read_triplets("3 2 1\n1 1\n".as_bytes()).is_err());
        assert!(read_triplets("".as_bytes()).is_err());
    }

    #[test]
    fn test_read_triplets_rejects_out_of_bounds() {
        let row_err = read_triplets("2 2 1\n3 1 1.0\n".as_bytes()).unwrap_err();
        assert!(row_err.to_string().contains("line 2"));
        let col_err = read_triplets("2 2 1\n1 3 1.0\n".as_bytes()).unwrap_err();
        assert!(col_err.to_string().contains("(1, 3)"));
    }

    #[test]
    fn test_read_names() {
        let names = read_names("ENSG1\tGENE1\tGene Expression\nENSG2\n".as_bytes()).unwrap();
        assert_eq!(names, vec!["ENSG1".to_string(), "ENSG2".to_string()]);
        assert!(read_names("ENSG1\n\t\n".as_bytes()).is_err());
    }

    #[test]
    fn test_read_dense_csv() {
        let text = ",G1,G2\nc1,1.0,2.0\nc2,0.0,3.5\n";
        let m = read_dense(text.as_bytes(), "t".to_string(), false).unwrap();
        assert_eq!(m.cells, vec!["c1".to_string(), "c2".to_string()]);
        assert_eq!(m.genes, vec!["G1".to_string(), "G2".to_string()]);
        match &m.matrix {
            ExpressionValues::Dense(d) => assert_eq!(d, &arr2(&[[1.0, 2.0], [0.0, 3.5]])),
            _ => panic!("expected dense"),
        }
    }

    #[test]
    fn test_read_dense_transposed_tsv() {
        let text = "gene\tc1\tc2\nG1\t1.0\t0.0\nG2\t2.0\t3.5\n";
        let m = read_dense(text.as_bytes(), "t".to_string(), true).unwrap();
        assert_eq!(m.cells, vec!["c1".to_string(), "c2".to_string()]);
        assert_eq!(m.genes, vec!["G1".to_string(), "G2".to_string()]);
        match &m.matrix {
            ExpressionValues::Dense(d) => assert_eq!(d, &arr2(&[[1.0, 2.0], [0.0, 3.5]])),
            _ => panic!("expected dense"),
        }
    }

    #[test]
    fn test_read_dense_ragged_row() {
        let text = ",G1,G2\nc1,1.0\n";
        assert!(read_dense(text.as_bytes(), "t".to_string(), false).is_err());
    }

    #[test]
    fn test_negative_values_rejected() {
        let m = read_dense(",G1,G2\nc1,-5.0,-2.5\n".as_bytes(), "t".to_string(), false).unwrap();
        let err = check_expression(&m).unwrap_err();
        assert!(err.to_string().contains("negative"));

        let m = read_dense(",G1,G2\nc1,0.0,2.5\n".as_bytes(), "t".to_string(), false).unwrap();
        assert!(check_expression(&m).is_ok());
    }
}
