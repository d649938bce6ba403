use nalgebra as na;
use ndarray::ArrayView1;
use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug {}

/// Left-top-right-bottom format, contains left top and right bottom corners
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

/// X-y-width-height format, contains coordinates of the center of bbox and width-height
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Xywh;
impl BBoxFormat for Xywh {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox<F: BBoxFormat>([f32; 4], PhantomData<F>);

impl<F: BBoxFormat> From<BBox<F>> for [f32; 4] {
    fn from(bbox: BBox<F>) -> Self {
        bbox.0
    }
}

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(x1: f32, x2: f32, x3: f32, x4: f32) -> Self {
        BBox([x1, x2, x3, x4], Default::default())
    }

    /// Reads the leading `(x1, y1, x2, y2)` of a track-set row; trailing
    /// columns (score) are ignored.
    #[inline]
    pub fn from_row(row: ArrayView1<'_, f32>) -> Self {
        Self::ltrb(row[0], row[1], row[2], row[3])
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    #[inline]
    pub fn area(&self) -> f32 {
        (self.right() - self.left()).max(0.0) * (self.bottom() - self.top()).max(0.0)
    }

    #[inline]
    pub fn as_xywh(&self) -> BBox<Xywh> {
        self.into()
    }

    #[inline]
    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new(
            (self.left() + self.right()) / 2.0,
            (self.top() + self.bottom()) / 2.0,
        )
    }

    pub fn iou(&self, other: &BBox<Ltrb>) -> f32 {
        let i_l = self.left().max(other.left());
        let i_t = self.top().max(other.top());
        let i_r = self.right().min(other.right());
        let i_b = self.bottom().min(other.bottom());
        let i_area = (i_r - i_l).max(0.) * (i_b - i_t).max(0.);
        let union = self.area() + other.area() - i_area;

        if union <= f32::EPSILON {
            0.0
        } else {
            i_area / union
        }
    }
}

impl BBox<Xywh> {
    #[inline]
    pub fn xywh(x1: f32, x2: f32, x3: f32, x4: f32) -> Self {
        BBox([x1, x2, x3, x4], Default::default())
    }

    #[inline(always)]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }

    #[inline(always)]
    pub fn cx(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn cy(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3]
    }
}

impl<'a> From<&'a BBox<Ltrb>> for BBox<Xywh> {
    #[inline]
    fn from(v: &'a BBox<Ltrb>) -> Self {
        Self(
            [
                v.0[0] + (v.0[2] - v.0[0]) / 2.0,
                v.0[1] + (v.0[3] - v.0[1]) / 2.0,
                v.0[2] - v.0[0],
                v.0[3] - v.0[1],
            ],
            Default::default(),
        )
    }
}

impl<'a> From<&'a BBox<Xywh>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Xywh>) -> Self {
        let (w2, h2) = (v.0[2] / 2.0, v.0[3] / 2.0);

        Self(
            [v.0[0] - w2, v.0[1] - h2, v.0[0] + w2, v.0[1] + h2],
            Default::default(),
        )
    }
}
