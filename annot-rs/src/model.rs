use anyhow::{bail, Context, Error};
use log::debug;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Per-feature standardization parameters fitted during training.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scaler {
    /// Per-feature mean, length F.
    pub mean: Array1<f64>,
    /// Per-feature standard deviation, length F.
    pub std_dev: Array1<f64>,
}

/// Fitted linear classifier. Binary models collapse their two classes to a
/// single decision axis with the convention positive = second class;
/// multi-class models carry one one-vs-rest axis per class.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    /// Two classes on one signed axis, weights length F.
    Binary {
        /// Feature weights of the collapsed axis.
        weights: Array1<f64>,
        /// Intercept of the collapsed axis.
        bias: f64,
    },
    /// One axis per class, weights C x F, bias length C.
    MultiClass {
        /// Per-class feature weights.
        weights: Array2<f64>,
        /// Per-class intercepts.
        bias: Array1<f64>,
    },
}

impl Classifier {
    /// Number of feature columns the classifier expects.
    pub fn n_features(&self) -> usize {
        match self {
            Classifier::Binary { weights, .. } => weights.len(),
            Classifier::MultiClass { weights, .. } => weights.ncols(),
        }
    }

    /// Raw decision scores for scaled input, always expanded to N x C.
    /// The binary variant exposes its single axis as the signed pair
    /// `(-d, +d)` so both variants honor the same contract.
    pub fn decision(&self, scaled: &ArrayView2<f64>) -> Array2<f64> {
        match self {
            Classifier::Binary { weights, bias } => {
                debug!("binary model: expanding single decision axis into two signed class scores");
                let d = scaled.dot(weights) + *bias;
                let mut out = Array2::zeros((scaled.nrows(), 2));
                out.column_mut(0).assign(&d.mapv(|v| -v));
                out.column_mut(1).assign(&d);
                out
            }
            Classifier::MultiClass { weights, bias } => scaled.dot(&weights.t()) + bias,
        }
    }
}

/// A trained model: classifier, optional scaler, and the feature and label
/// vocabularies. Loaded once per prediction run and immutable thereafter,
/// so a single artifact is safely shared by concurrent predictions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Ordered, unique gene identifiers, length F.
    pub features: Vec<String>,
    /// Ordered, unique class labels, length C.
    pub cell_types: Vec<String>,
    /// Standardization parameters; `None` means identity scaling.
    pub scaler: Option<Scaler>,
    /// The fitted classifier.
    pub classifier: Classifier,
}

impl ModelArtifact {
    /// Load an artifact from a self-contained JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<ModelArtifact, Error> {
        let path = path.as_ref();
        let file = BufReader::new(File::open(path).with_context(|| path.display().to_string())?);
        ModelArtifact::from_reader(file).with_context(|| path.display().to_string())
    }

    /// Load an artifact from any reader and validate its invariants.
    pub fn from_reader(reader: impl Read) -> Result<ModelArtifact, Error> {
        let model: ModelArtifact = serde_json::from_reader(reader)?;
        model.validate()?;
        Ok(model)
    }

    /// Number of features F.
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Number of classes C.
    pub fn n_cell_types(&self) -> usize {
        self.cell_types.len()
    }

    fn validate(&self) -> Result<(), Error> {
        if self.features.is_empty() {
            bail!("model has no features");
        }
        if !unique(&self.features) {
            bail!("model features are not unique");
        }
        if self.cell_types.len() < 2 {
            bail!("model has {} cell types, need at least 2", self.cell_types.len());
        }
        if !unique(&self.cell_types) {
            bail!("model cell types are not unique");
        }
        let f = self.features.len();
        match &self.classifier {
            Classifier::Binary { weights, .. } => {
                if self.cell_types.len() != 2 {
                    bail!(
                        "binary classifier requires exactly 2 cell types, found {}",
                        self.cell_types.len()
                    );
                }
                if weights.len() != f {
                    bail!("classifier has {} feature weights for {} features", weights.len(), f);
                }
            }
            Classifier::MultiClass { weights, bias } => {
                let c = self.cell_types.len();
                if weights.dim() != (c, f) {
                    bail!(
                        "classifier weights are {:?}, expected ({}, {})",
                        weights.dim(),
                        c,
                        f
                    );
                }
                if bias.len() != c {
                    bail!("classifier has {} biases for {} cell types", bias.len(), c);
                }
            }
        }
        if let Some(scaler) = &self.scaler {
            if scaler.mean.len() != f || scaler.std_dev.len() != f {
                bail!(
                    "scaler vectors have lengths {} and {} for {} features",
                    scaler.mean.len(),
                    scaler.std_dev.len(),
                    f
                );
            }
        }
        Ok(())
    }
}

fn unique(names: &[String]) -> bool {
    names.iter().collect::<HashSet<_>>().len() == names.len()
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{arr1, arr2};

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(std::string::ToString::to_string).collect()
    }

    fn multi_class_json() -> String {
        serde_json::json!({
            "features": ["G1", "G2", "G3"],
            "cell_types": ["A", "B", "C"],
            "scaler": {
                "mean": {"v": 1, "dim": [3], "data": [0.0, 0.0, 0.0]},
                "std_dev": {"v": 1, "dim": [3], "data": [1.0, 1.0, 1.0]}
            },
            "classifier": {
                "kind": "multi_class",
                "weights": {"v": 1, "dim": [3, 3], "data": [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]},
                "bias": {"v": 1, "dim": [3], "data": [0.0, 0.0, 0.0]}
            }
        })
        .to_string()
    }

    #[test]
    fn test_load_multi_class() {
        let model = ModelArtifact::from_reader(multi_class_json().as_bytes()).unwrap();
        assert_eq!(model.n_features(), 3);
        assert_eq!(model.n_cell_types(), 3);
        assert!(model.scaler.is_some());
    }

    #[test]
    fn test_round_trip() {
        let model = ModelArtifact::from_reader(multi_class_json().as_bytes()).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        let again = ModelArtifact::from_reader(json.as_bytes()).unwrap();
        assert_eq!(again.features, model.features);
        assert_eq!(again.cell_types, model.cell_types);
    }

    #[test]
    fn test_validation_rejections() {
        let ok = ModelArtifact {
            features: strings(&["G1", "G2"]),
            cell_types: strings(&["A", "B"]),
            scaler: None,
            classifier: Classifier::Binary {
                weights: arr1(&[1.0, -1.0]),
                bias: 0.0,
            },
        };
        assert!(ok.validate().is_ok());

        let mut dup_features = ok.clone();
        dup_features.features = strings(&["G1", "G1"]);
        assert!(dup_features.validate().is_err());

        let mut binary_three_classes = ok.clone();
        binary_three_classes.cell_types = strings(&["A", "B", "C"]);
        assert!(binary_three_classes.validate().is_err());

        let mut short_scaler = ok.clone();
        short_scaler.scaler = Some(Scaler {
            mean: arr1(&[0.0]),
            std_dev: arr1(&[1.0]),
        });
        assert!(short_scaler.validate().is_err());

        let mut bad_shape = ok;
        bad_shape.classifier = Classifier::MultiClass {
            weights: arr2(&[[1.0, 0.0]]),
            bias: arr1(&[0.0]),
        };
        assert!(bad_shape.validate().is_err());
    }

    #[test]
    fn test_binary_decision_expansion() {
        let clf = Classifier::Binary {
            weights: arr1(&[1.0, 0.0, -1.0]),
            bias: 0.0,
        };
        let scaled = arr2(&[[2.0, 0.0, 0.0], [0.0, 0.0, 3.0]]);
        let d = clf.decision(&scaled.view());
        assert_eq!(d.dim(), (2, 2));
        assert_eq!(d[[0, 0]], -2.0);
        assert_eq!(d[[0, 1]], 2.0);
        assert_eq!(d[[1, 0]], 3.0);
        assert_eq!(d[[1, 1]], -3.0);
    }
}
