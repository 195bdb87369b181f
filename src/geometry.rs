//! Line segment geometry.
//!
//! A `LineSegment` is a vertical building edge: two 3-D endpoints whose z
//! values carry the height. The dataset is flattened elsewhere; here we only
//! need the `(x1, y1, z1, x2, y2, z2)` row shape.

use ndarray::{Array2, ArrayView2};

use crate::error::{Result, SkymaskError};

/// Number of columns in the row representation of a line.
pub const LINE_COLUMNS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineSegment {
    pub a: [f64; 3],
    pub b: [f64; 3],
}

impl LineSegment {
    pub fn new(a: [f64; 3], b: [f64; 3]) -> Self {
        Self { a, b }
    }

    pub fn from_row(row: [f64; 6]) -> Self {
        Self {
            a: [row[0], row[1], row[2]],
            b: [row[3], row[4], row[5]],
        }
    }

    pub fn to_row(&self) -> [f64; 6] {
        [self.a[0], self.a[1], self.a[2], self.b[0], self.b[1], self.b[2]]
    }

    /// Same segment with the endpoints swapped.
    pub fn reversed(&self) -> Self {
        Self {
            a: self.b,
            b: self.a,
        }
    }

    pub fn midpoint_xy(&self) -> [f64; 2] {
        [
            0.5 * (self.a[0] + self.b[0]),
            0.5 * (self.a[1] + self.b[1]),
        ]
    }

    pub fn endpoints_xy(&self) -> [[f64; 2]; 2] {
        [[self.a[0], self.a[1]], [self.b[0], self.b[1]]]
    }

    pub fn is_finite(&self) -> bool {
        self.a.iter().chain(self.b.iter()).all(|v| v.is_finite())
    }

    /// 2-D cross product of the endpoints relative to `origin`,
    /// `x2·y1 − x1·y2`. Zero when the segment is collinear with `origin`.
    #[inline]
    pub fn cross_about(&self, origin: [f64; 2]) -> f64 {
        let (x1, y1) = (self.a[0] - origin[0], self.a[1] - origin[1]);
        let (x2, y2) = (self.b[0] - origin[0], self.b[1] - origin[1]);
        x2 * y1 - x1 * y2
    }
}

impl From<[f64; 6]> for LineSegment {
    fn from(row: [f64; 6]) -> Self {
        LineSegment::from_row(row)
    }
}

#[inline]
pub(crate) fn distance_xy(p: [f64; 2], q: [f64; 2]) -> f64 {
    (p[0] - q[0]).hypot(p[1] - q[1])
}

/// Read an `(n, 6)` array of `x1, y1, z1, x2, y2, z2` rows into segments.
pub fn lines_from_array(rows: ArrayView2<f64>) -> Result<Vec<LineSegment>> {
    if rows.ncols() != LINE_COLUMNS {
        return Err(SkymaskError::InvalidInput(format!(
            "line array must have {} columns, got {}",
            LINE_COLUMNS,
            rows.ncols()
        )));
    }
    Ok(rows
        .outer_iter()
        .map(|r| LineSegment::from_row([r[0], r[1], r[2], r[3], r[4], r[5]]))
        .collect())
}

/// Inverse of [`lines_from_array`].
pub fn lines_to_array(lines: &[LineSegment]) -> Array2<f64> {
    Array2::from_shape_fn((lines.len(), LINE_COLUMNS), |(i, j)| lines[i].to_row()[j])
}

/// Reject geometry that would poison every query touching it.
pub(crate) fn validate_lines(lines: &[LineSegment]) -> Result<()> {
    if let Some(idx) = lines.iter().position(|l| !l.is_finite()) {
        return Err(SkymaskError::InvalidInput(format!(
            "line {} has non-finite coordinates",
            idx
        )));
    }
    Ok(())
}
