//! Conversion of per-model raw outputs into [`TrackSet`]s.

use crate::error::{Error, Result};
use crate::track_set::TrackSet;

use ndarray::prelude::*;

/// One model's output for a frame.
///
/// `bboxes[c]` holds the rows detected for category `c`, each row either
/// `[x1, y1, x2, y2, score]` or `[id, x1, y1, x2, y2, score]`. `masks[c]`, when
/// present, holds one binary mask per row of `bboxes[c]`.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub bboxes: Vec<Array2<f32>>,
    pub masks: Option<Vec<Vec<Array2<bool>>>>,
}

impl RawOutput {
    pub fn from_bboxes(bboxes: Vec<Array2<f32>>) -> Self {
        Self {
            bboxes,
            masks: None,
        }
    }

    /// Builds per-category blocks from nested rows. All rows must share a
    /// width; empty categories take it from the first non-empty one.
    pub fn from_rows(categories: Vec<Vec<Vec<f32>>>) -> Result<Self> {
        let mut bboxes = Vec::with_capacity(categories.len());
        let width = categories
            .iter()
            .flatten()
            .next()
            .map(Vec::len)
            .unwrap_or(5);

        for rows in categories {
            let n = rows.len();

            if let Some(row) = rows.iter().find(|row| row.len() != width) {
                return Err(Error::UnsupportedBoxShape(row.len()));
            }

            let flat: Vec<f32> = rows.into_iter().flatten().collect();
            let block = Array2::from_shape_vec((n, width), flat)
                .map_err(|err| Error::MalformedRecord(err.to_string()))?;

            bboxes.push(block);
        }

        Ok(Self::from_bboxes(bboxes))
    }
}

pub fn normalize(raw: &RawOutput, mask_shape: Option<(usize, usize)>) -> Result<TrackSet> {
    let labels: Array1<i64> = raw
        .bboxes
        .iter()
        .enumerate()
        .flat_map(|(category, block)| std::iter::repeat(category as i64).take(block.nrows()))
        .collect();

    let width = match raw.bboxes.first() {
        Some(block) => block.ncols(),
        None => 5,
    };

    if let Some(block) = raw.bboxes.iter().find(|block| block.ncols() != width) {
        return Err(Error::UnsupportedBoxShape(block.ncols()));
    }

    let rows = if raw.bboxes.is_empty() {
        Array2::zeros((0, 5))
    } else {
        let views: Vec<_> = raw.bboxes.iter().map(|block| block.view()).collect();
        ndarray::concatenate(Axis(0), &views)
            .map_err(|err| Error::MalformedRecord(err.to_string()))?
    };

    let (bboxes, ids) = match width {
        5 => (rows, None),
        6 => {
            let ids = rows.column(0).mapv(|id| id as i64);
            (rows.slice(s![.., 1..]).to_owned(), Some(ids))
        }
        other => return Err(Error::UnsupportedBoxShape(other)),
    };

    let masks = match &raw.masks {
        Some(per_category) => Some(stack_masks(per_category, mask_shape)?),
        None => None,
    };

    TrackSet::new(labels, bboxes, ids, masks)
}

fn stack_masks(
    per_category: &[Vec<Array2<bool>>],
    mask_shape: Option<(usize, usize)>,
) -> Result<Array3<bool>> {
    let (height, width) = mask_shape.ok_or(Error::MissingMaskShape)?;
    let views: Vec<_> = per_category.iter().flatten().map(|m| m.view()).collect();

    if views.is_empty() {
        return Ok(Array3::from_elem((0, height, width), false));
    }

    ndarray::stack(Axis(0), &views).map_err(|_| {
        let shapes: Vec<_> = views.iter().map(|m| m.dim()).collect();
        Error::UnsupportedMaskShape(format!("{:?}", shapes))
    })
}
