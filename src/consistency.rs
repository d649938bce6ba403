//! Agreement between two independently computed track sets.

use crate::error::{Error, Result};
use crate::track_set::TrackSet;

use ndarray::ArrayView1;

pub const DEFAULT_TOLERANCE: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsistencyScorer {
    /// Absolute per-coordinate tolerance in pixels.
    pub tolerance: f32,
}

impl Default for ConsistencyScorer {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl ConsistencyScorer {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    /// Fraction of `reference` boxes that have a candidate box within the
    /// tolerance on each of `x1, y1, x2, y2`.
    ///
    /// The first close candidate counts and the same candidate may satisfy
    /// several reference boxes.
    pub fn score(&self, reference: &TrackSet, candidate: &TrackSet) -> Result<f32> {
        if reference.is_empty() {
            return Err(Error::EmptyReference);
        }

        let candidates = candidate.bboxes();
        let matched = reference
            .bboxes()
            .outer_iter()
            .filter(|r| candidates.outer_iter().any(|c| self.is_close(r, &c)))
            .count();

        Ok(matched as f32 / reference.len() as f32)
    }

    /// Indexes of `candidate` boxes that match no `reference` box.
    pub fn unmatched(&self, reference: &TrackSet, candidate: &TrackSet) -> Vec<usize> {
        let references = reference.bboxes();

        candidate
            .bboxes()
            .outer_iter()
            .enumerate()
            .filter(|(_, c)| !references.outer_iter().any(|r| self.is_close(&r, c)))
            .map(|(idx, _)| idx)
            .collect()
    }

    #[inline]
    fn is_close(&self, a: &ArrayView1<'_, f32>, b: &ArrayView1<'_, f32>) -> bool {
        (0..4).all(|i| (a[i] - b[i]).abs() < self.tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1, Array2};

    fn set(boxes: Array2<f32>) -> TrackSet {
        let n = boxes.nrows();
        TrackSet::new(Array1::zeros(n), boxes, None, None).unwrap()
    }

    #[test]
    fn half_of_reference_is_found() {
        let reference = set(array![[0.0, 0.0, 10.0, 10.0], [100.0, 100.0, 110.0, 110.0]]);
        let candidate = set(array![[5.0, 5.0, 12.0, 12.0]]);

        let score = ConsistencyScorer::default()
            .score(&reference, &candidate)
            .unwrap();
        assert_relative_eq!(score, 0.5);
    }

    #[test]
    fn identical_sets_score_one() {
        let reference = set(array![
            [0.0, 0.0, 10.0, 10.0, 0.9],
            [40.0, 40.0, 80.0, 90.0, 0.3]
        ]);

        let score = ConsistencyScorer::default()
            .score(&reference, &reference)
            .unwrap();
        assert_relative_eq!(score, 1.0);
    }

    #[test]
    fn empty_candidate_scores_zero() {
        let reference = set(array![[0.0, 0.0, 10.0, 10.0]]);
        let candidate = set(Array2::zeros((0, 4)));

        let score = ConsistencyScorer::default()
            .score(&reference, &candidate)
            .unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn empty_reference_is_refused() {
        let reference = set(Array2::zeros((0, 4)));
        let candidate = set(array![[0.0, 0.0, 10.0, 10.0]]);

        assert!(matches!(
            ConsistencyScorer::default().score(&reference, &candidate),
            Err(Error::EmptyReference)
        ));
    }

    #[test]
    fn tolerance_is_strict_and_per_coordinate() {
        let reference = set(array![[0.0, 0.0, 10.0, 10.0]]);
        let scorer = ConsistencyScorer::default();

        let at_bound = set(array![[20.0, 0.0, 10.0, 10.0]]);
        assert_eq!(scorer.score(&reference, &at_bound).unwrap(), 0.0);

        let one_axis_off = set(array![[0.0, 0.0, 10.0, 45.0]]);
        assert_eq!(scorer.score(&reference, &one_axis_off).unwrap(), 0.0);

        let close = set(array![[19.5, -19.5, 29.5, -9.5]]);
        assert_eq!(scorer.score(&reference, &close).unwrap(), 1.0);
    }

    #[test]
    fn one_candidate_may_cover_several_references() {
        let reference = set(array![[0.0, 0.0, 10.0, 10.0], [4.0, 4.0, 14.0, 14.0]]);
        let candidate = set(array![[2.0, 2.0, 12.0, 12.0]]);

        let score = ConsistencyScorer::default()
            .score(&reference, &candidate)
            .unwrap();
        assert_relative_eq!(score, 1.0);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let reference = set(array![
            [0.0, 0.0, 10.0, 10.0],
            [50.0, 50.0, 70.0, 70.0],
            [200.0, 0.0, 220.0, 30.0]
        ]);
        let candidate = set(array![
            [1.0, 1.0, 11.0, 11.0],
            [2.0, 2.0, 12.0, 12.0],
            [3.0, 3.0, 13.0, 13.0],
            [51.0, 49.0, 69.0, 71.0]
        ]);

        let score = ConsistencyScorer::default()
            .score(&reference, &candidate)
            .unwrap();
        assert!((0.0..=1.0).contains(&score));
        assert_relative_eq!(score, 2.0 / 3.0);
    }

    #[test]
    fn unmatched_lists_new_candidates() {
        let reference = set(array![[0.0, 0.0, 10.0, 10.0]]);
        let candidate = set(array![[1.0, 1.0, 11.0, 11.0], [300.0, 300.0, 320.0, 330.0]]);

        assert_eq!(
            ConsistencyScorer::default().unmatched(&reference, &candidate),
            vec![1]
        );
    }
}
