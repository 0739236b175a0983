use crate::error::AnnotError;
use crate::grouping::Grouping;
use itertools::Itertools;
use std::cmp::Reverse;

/// Majority-voting output: a refined label and a vote confidence per cell.
#[derive(Clone, Debug, PartialEq)]
pub struct Consensus {
    /// Refined per-cell labels, as indices into the model's `cell_types`.
    pub labels: Vec<usize>,
    /// Fraction of the cell's group that voted for the group mode.
    pub confidence: Vec<f64>,
}

/// Refine per-cell predictions by majority vote within each group.
///
/// Every cell receives the most frequent predicted label of its group; ties
/// resolve to the lowest class index, so repeated runs agree. Singleton
/// groups trivially keep their own prediction. The vote confidence is a
/// diagnostic only and never changes the assignment. Voting is idempotent:
/// a second pass over its own output with the same grouping changes
/// nothing, since every group is then unanimous.
pub fn majority_vote(predicted: &[usize], grouping: &Grouping, n_classes: usize) -> Result<Consensus, AnnotError> {
    if grouping.n_cells() != predicted.len() {
        return Err(AnnotError::GroupingCardinalityMismatch {
            grouping_cells: grouping.n_cells(),
            scored_cells: predicted.len(),
        });
    }
    if let Some(&bad) = predicted.iter().find(|&&p| p >= n_classes) {
        return Err(AnnotError::DimensionMismatch {
            context: "predicted label index vs model cell types",
            expected: n_classes,
            actual: bad,
        });
    }

    let mut labels = vec![0usize; predicted.len()];
    let mut confidence = vec![0.0f64; predicted.len()];
    for (group, members) in grouping.members() {
        if members.is_empty() {
            return Err(AnnotError::EmptyGrouping {
                group: group.to_string(),
            });
        }
        let counts = members.iter().map(|&cell| predicted[cell]).counts();
        // ties resolve to the lowest class index
        let (&mode, &votes) = counts
            .iter()
            .max_by_key(|&(&label, &count)| (count, Reverse(label)))
            .expect("group has members");
        let share = votes as f64 / members.len() as f64;
        for &cell in &members {
            labels[cell] = mode;
            confidence[cell] = share;
        }
    }

    Ok(Consensus { labels, confidence })
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn grouping(labels: &[&str]) -> Grouping {
        Grouping::from_labels(labels.iter().map(std::string::ToString::to_string).collect(), labels.len()).unwrap()
    }

    #[test]
    fn test_two_against_one() {
        // predictions [A, A, B] in one group: everyone becomes A at 2/3
        let g = grouping(&["g", "g", "g"]);
        let c = majority_vote(&[0, 0, 1], &g, 2).unwrap();
        assert_eq!(c.labels, vec![0, 0, 0]);
        for &conf in &c.confidence {
            assert_approx_eq!(conf, 2.0 / 3.0);
        }
    }

    #[test]
    fn test_idempotence() {
        let g = grouping(&["x", "x", "y", "y", "y", "x"]);
        let first = majority_vote(&[2, 0, 1, 1, 0, 2], &g, 3).unwrap();
        let second = majority_vote(&first.labels, &g, 3).unwrap();
        assert_eq!(second.labels, first.labels);
        assert!(second.confidence.iter().all(|&c| c == 1.0));
    }

    #[test]
    fn test_singleton_keeps_prediction() {
        let g = grouping(&["a", "b", "b"]);
        let c = majority_vote(&[2, 1, 1], &g, 3).unwrap();
        assert_eq!(c.labels, vec![2, 1, 1]);
        assert_approx_eq!(c.confidence[0], 1.0);
    }

    #[test]
    fn test_tie_takes_lowest_class_index() {
        let g = grouping(&["g", "g", "g", "g"]);
        let c = majority_vote(&[3, 1, 1, 3], &g, 4).unwrap();
        assert_eq!(c.labels, vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_coverage_matches_grouping() {
        let g = grouping(&["u", "v", "u", "w"]);
        let c = majority_vote(&[0, 1, 0, 1], &g, 2).unwrap();
        assert_eq!(c.labels.len(), g.n_cells());
        assert_eq!(c.confidence.len(), g.n_cells());
    }

    #[test]
    fn test_cardinality_mismatch() {
        let g = grouping(&["g", "g"]);
        assert!(matches!(
            majority_vote(&[0, 1, 0], &g, 2),
            Err(AnnotError::GroupingCardinalityMismatch {
                grouping_cells: 2,
                scored_cells: 3
            })
        ));
    }

    #[test]
    fn test_out_of_range_prediction_is_a_defect() {
        let g = grouping(&["g", "g"]);
        assert!(matches!(
            majority_vote(&[0, 5], &g, 2),
            Err(AnnotError::DimensionMismatch { .. })
        ));
    }
}
