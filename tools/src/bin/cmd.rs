// Command line surface for the annot-rs engine

use annot_rs::annotate::{annotate, annotate_with_consensus};
use annot_rs::grouping::{GroupingSource, OverClustering};
use annot_rs::model::ModelArtifact;
use annot_rs::mtx::{load_dense, load_sparse};
use annot_types::result::AnnotationResult;
use anyhow::{bail, Context, Error};
use clap::{value_parser, Arg, ArgAction, Command};
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::prelude::*;
use std::fs::{create_dir, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Stand-in over-clustering collaborator: evenly strided seed cells,
/// nearest-centroid assignment, and a group count that grows with the cell
/// count (sqrt of N) up to a cap. Deterministic; a production pipeline
/// would plug a graph-based over-clustering in through the same trait.
struct StridedCentroids {
    max_groups: usize,
}

impl Default for StridedCentroids {
    fn default() -> Self {
        StridedCentroids { max_groups: 30 }
    }
}

impl OverClustering for StridedCentroids {
    fn cluster(&self, cells: &ArrayView2<f64>) -> Result<Vec<String>, Error> {
        let n = cells.nrows();
        if n == 0 {
            return Ok(vec![]);
        }
        let k = ((n as f64).sqrt().floor() as usize).clamp(1, self.max_groups);
        let seeds: Vec<usize> = (0..k).map(|i| i * n / k).collect();
        let labels = (0..n)
            .map(|i| {
                let mut best = 0;
                for (s, &seed) in seeds.iter().enumerate() {
                    if distance(&cells.row(i), &cells.row(seed)) < distance(&cells.row(i), &cells.row(seeds[best])) {
                        best = s;
                    }
                }
                best.to_string()
            })
            .collect();
        Ok(labels)
    }
}

fn distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (y - x).powi(2)).sum::<f64>().sqrt()
}

pub fn main() -> Result<(), Error> {
    env_logger::init();
    let matches = Command::new("annot-rs-cmd")
        .arg(
            Arg::new("INPUT")
                .help("Expression matrix to annotate (delimited text, or sparse triplets with --cells/--genes)")
                .required(true)
                .index(1)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("MODEL")
                .help("Trained model artifact (JSON)")
                .short('m')
                .long("model")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("OUT_DIR")
                .help("Output directory")
                .short('o')
                .long("out_dir")
                .default_value(".")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("TRANSPOSE")
                .help("Input is genes x cells; flip it")
                .long("transpose")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("CELLS")
                .help("Cell name file for sparse triplet input, one per line")
                .long("cells")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("GENES")
                .help("Gene name file for sparse triplet input, one per line")
                .long("genes")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("MAJORITY_VOTING")
                .help("Refine predictions by majority voting within a cell grouping")
                .long("majority-voting")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("GROUPS")
                .help("Grouping file, one group label per input cell per line")
                .long("groups")
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    let input_path: &PathBuf = matches.get_one("INPUT").unwrap();
    let model_path: &PathBuf = matches.get_one("MODEL").unwrap();
    let out_dir: &PathBuf = matches.get_one("OUT_DIR").unwrap();
    let transpose = matches.get_flag("TRANSPOSE");
    let cells_path: Option<&PathBuf> = matches.get_one("CELLS");
    let genes_path: Option<&PathBuf> = matches.get_one("GENES");
    let majority_voting = matches.get_flag("MAJORITY_VOTING");
    let groups_path: Option<&PathBuf> = matches.get_one("GROUPS");

    let model = ModelArtifact::load(model_path)?;
    let input = match (cells_path, genes_path) {
        (Some(cells), Some(genes)) => load_sparse(input_path, cells, genes, transpose)?,
        (None, None) => load_dense(input_path, transpose)?,
        _ => bail!("sparse triplet input needs both --cells and --genes"),
    };

    let result = if majority_voting || groups_path.is_some() {
        let fallback = StridedCentroids::default();
        let source = GroupingSource::select(None, None, groups_path.cloned(), &fallback);
        annotate_with_consensus(&model, &input, source)?
    } else {
        annotate(&model, &input)?
    };

    if !out_dir.exists() {
        create_dir(out_dir).with_context(|| out_dir.display().to_string())?;
    }
    write_labels(&result, out_dir.join("predicted_labels.csv.gz"))?;
    array_to_csv(result.decision, out_dir.join("decision_matrix.csv.gz"))?;
    array_to_csv(result.probability, out_dir.join("probability_matrix.csv.gz"))?;

    Ok(())
}

fn write_labels(result: &AnnotationResult, path: impl AsRef<Path>) -> Result<(), Error> {
    let mut writer = BufWriter::new(GzEncoder::new(File::create(path)?, Compression::default()));
    match &result.consensus {
        Some(c) => {
            writeln!(writer, "cell,predicted,group,majority_voting,confidence")?;
            for i in 0..result.n_cells() {
                writeln!(
                    writer,
                    "{},{},{},{},{}",
                    result.cells[i], result.predicted[i], c.grouping[i], c.labels[i], c.confidence[i]
                )?;
            }
        }
        None => {
            writeln!(writer, "cell,predicted")?;
            for i in 0..result.n_cells() {
                writeln!(writer, "{},{}", result.cells[i], result.predicted[i])?;
            }
        }
    }
    Ok(())
}

fn array_to_csv(array: Array2<f64>, path: impl AsRef<Path>) -> Result<(), Error> {
    let mut writer = BufWriter::new(GzEncoder::new(File::create(path)?, Compression::default()));
    let num_cols = array.shape()[1];
    for row in array.axis_iter(Axis(0)) {
        for (i, entry) in row.iter().enumerate() {
            write!(writer, "{}", *entry)?;
            if i + 1 < num_cols {
                write!(writer, ",")?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}
