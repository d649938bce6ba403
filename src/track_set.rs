use crate::bbox::{BBox, Ltrb};
use crate::error::{Error, Result};

use ndarray::prelude::*;

/// Canonical per-frame bundle of objects. Index `i` of every present field
/// describes the same object.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSet {
    labels: Array1<i64>,
    bboxes: Array2<f32>,
    ids: Option<Array1<i64>>,
    masks: Option<Array3<bool>>,
}

impl TrackSet {
    pub fn new(
        labels: Array1<i64>,
        bboxes: Array2<f32>,
        ids: Option<Array1<i64>>,
        masks: Option<Array3<bool>>,
    ) -> Result<Self> {
        let n = bboxes.nrows();

        if !matches!(bboxes.ncols(), 4 | 5) {
            return Err(Error::UnsupportedBoxShape(bboxes.ncols()));
        }

        check_len("labels", n, labels.len())?;

        if let Some(ids) = &ids {
            check_len("ids", n, ids.len())?;
        }

        if let Some(masks) = &masks {
            check_len("masks", n, masks.len_of(Axis(0)))?;
        }

        Ok(Self {
            labels,
            bboxes,
            ids,
            masks,
        })
    }

    /// Zero objects, `(x1, y1, x2, y2, score)` layout.
    pub fn empty() -> Self {
        Self {
            labels: Array1::zeros(0),
            bboxes: Array2::zeros((0, 5)),
            ids: None,
            masks: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bboxes.nrows()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn labels(&self) -> ArrayView1<'_, i64> {
        self.labels.view()
    }

    #[inline]
    pub fn bboxes(&self) -> ArrayView2<'_, f32> {
        self.bboxes.view()
    }

    #[inline]
    pub fn ids(&self) -> Option<ArrayView1<'_, i64>> {
        self.ids.as_ref().map(|ids| ids.view())
    }

    #[inline]
    pub fn masks(&self) -> Option<ArrayView3<'_, bool>> {
        self.masks.as_ref().map(|masks| masks.view())
    }

    #[inline]
    pub fn bbox(&self, idx: usize) -> BBox<Ltrb> {
        BBox::from_row(self.bboxes.row(idx))
    }

    pub fn iter_bboxes(&self) -> impl Iterator<Item = BBox<Ltrb>> + '_ {
        self.bboxes.outer_iter().map(BBox::from_row)
    }

    /// Same objects, identities replaced by `ids`.
    pub fn with_ids(&self, ids: Array1<i64>) -> Result<Self> {
        check_len("ids", self.len(), ids.len())?;

        Ok(Self {
            ids: Some(ids),
            ..self.clone()
        })
    }

    /// Same objects with the identity channel dropped.
    pub fn without_ids(&self) -> Self {
        Self {
            ids: None,
            ..self.clone()
        }
    }

    /// Appends the rows of `other` selected by `indexes`. Masks survive only
    /// when both sets carry them with the same shape.
    pub fn extend_from(&self, other: &TrackSet, indexes: &[usize]) -> Result<Self> {
        if indexes.is_empty() {
            return Ok(self.without_ids());
        }

        let width = self.bboxes.ncols().min(other.bboxes.ncols());
        let extra_boxes = other.bboxes.select(Axis(0), indexes);
        let bboxes = ndarray::concatenate(
            Axis(0),
            &[
                self.bboxes.slice(s![.., ..width]),
                extra_boxes.slice(s![.., ..width]),
            ],
        )
        .map_err(|err| Error::MalformedRecord(err.to_string()))?;

        let labels = ndarray::concatenate(
            Axis(0),
            &[self.labels.view(), other.labels.select(Axis(0), indexes).view()],
        )
        .map_err(|err| Error::MalformedRecord(err.to_string()))?;

        let masks = match (&self.masks, &other.masks) {
            (Some(a), Some(b)) if a.shape()[1..] == b.shape()[1..] => Some(
                ndarray::concatenate(Axis(0), &[a.view(), b.select(Axis(0), indexes).view()])
                    .map_err(|err| Error::UnsupportedMaskShape(err.to_string()))?,
            ),
            _ => None,
        };

        TrackSet::new(labels, bboxes, None, masks)
    }
}

fn check_len(field: &'static str, expected: usize, got: usize) -> Result<()> {
    if expected == got {
        Ok(())
    } else {
        Err(Error::LengthMismatch {
            field,
            expected,
            got,
        })
    }
}
