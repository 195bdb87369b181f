//! Angular intervals subtended by candidate lines and the selection mask.
//!
//! Every retained line is described in a local frame: sample azimuths are
//! shifted by the line's `offset` and folded onto [0, π), after which the line
//! covers exactly `[0, upper]`. Folding maps a direction and its antipode to
//! the same value, so one mask row serves both hemispheres.

use ndarray::{Array1, Array2, ArrayView1, Zip};
use std::f64::consts::{PI, TAU};

use crate::error::{Result, SkymaskError};
use crate::geometry::{LineSegment, LINE_COLUMNS};

/// Fold an angle onto [0, π) using truncated remainders.
#[inline(always)]
pub fn fold_half_turn(theta: f64) -> f64 {
    ((theta % PI) + PI) % PI
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngularInterval {
    /// Azimuth subtracted from every sample before folding.
    pub offset: f64,
    /// Inclusive upper bound of the interval in the local frame, in [0, π).
    pub upper: f64,
}

impl AngularInterval {
    /// Interval swept by two observer-relative points.
    ///
    /// Returns `None` when the two rays are exactly antipodal; such a line has
    /// no well-defined short side and is left out of the candidate set.
    pub fn from_relative(a: [f64; 2], b: [f64; 2]) -> Option<Self> {
        let mut theta_a = a[1].atan2(a[0]);
        let mut theta_b = b[1].atan2(b[0]);
        if theta_a > theta_b {
            std::mem::swap(&mut theta_a, &mut theta_b);
        }

        let sweep = theta_b - theta_a;
        if sweep < PI {
            Some(Self {
                offset: theta_a,
                upper: sweep,
            })
        } else if sweep > PI {
            // short arc crosses the ±π seam; re-base on the larger angle
            Some(Self {
                offset: theta_b,
                upper: TAU + theta_a - theta_b,
            })
        } else {
            None
        }
    }

    #[inline(always)]
    pub fn local(&self, theta: f64) -> f64 {
        fold_half_turn(theta - self.offset)
    }

    #[inline(always)]
    pub fn contains(&self, theta: f64) -> bool {
        self.local(theta) <= self.upper
    }
}

/// Lines retained for one observer, stored observer-relative.
#[derive(Debug, Clone)]
pub struct CandidateSet {
    /// Rows `x1, y1, z1, x2, y2, z2` with the observer subtracted from x and y.
    pub lines: Array2<f64>,
    pub offset: Array1<f64>,
    pub upper: Array1<f64>,
    /// Index of each row in the source line slice.
    pub source: Vec<usize>,
}

impl CandidateSet {
    pub fn empty() -> Self {
        Self {
            lines: Array2::zeros((0, LINE_COLUMNS)),
            offset: Array1::zeros(0),
            upper: Array1::zeros(0),
            source: Vec::new(),
        }
    }

    /// Translate the lines named by `idxs` to the observer, drop those that
    /// are collinear with it (`|cross| <= degeneracy_epsilon`) or sweep
    /// exactly π, and compute the interval of the rest.
    pub fn build(
        lines: &[LineSegment],
        idxs: &[usize],
        observer: [f64; 2],
        degeneracy_epsilon: f64,
    ) -> Result<Self> {
        let mut rows = Vec::with_capacity(idxs.len() * LINE_COLUMNS);
        let mut offset = Vec::with_capacity(idxs.len());
        let mut upper = Vec::with_capacity(idxs.len());
        let mut source = Vec::with_capacity(idxs.len());
        let mut num_degenerate = 0usize;
        let mut num_ambiguous = 0usize;

        for &idx in idxs {
            let line = lines.get(idx).ok_or_else(|| {
                SkymaskError::IndexUnavailable(format!(
                    "index returned line {} but only {} lines exist",
                    idx,
                    lines.len()
                ))
            })?;
            if line.cross_about(observer).abs() <= degeneracy_epsilon {
                num_degenerate += 1;
                continue;
            }
            let (x1, y1) = (line.a[0] - observer[0], line.a[1] - observer[1]);
            let (x2, y2) = (line.b[0] - observer[0], line.b[1] - observer[1]);
            let Some(interval) = AngularInterval::from_relative([x1, y1], [x2, y2]) else {
                num_ambiguous += 1;
                continue;
            };

            rows.extend_from_slice(&[x1, y1, line.a[2], x2, y2, line.b[2]]);
            offset.push(interval.offset);
            upper.push(interval.upper);
            source.push(idx);
        }

        if num_degenerate > 0 || num_ambiguous > 0 {
            log::debug!(
                "CandidateSet: dropped {} degenerate and {} antipodal lines of {}",
                num_degenerate,
                num_ambiguous,
                idxs.len()
            );
        }

        Ok(Self {
            lines: Array2::from_shape_vec((source.len(), LINE_COLUMNS), rows)?,
            offset: Array1::from(offset),
            upper: Array1::from(upper),
            source,
        })
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    pub fn interval(&self, row: usize) -> AngularInterval {
        AngularInterval {
            offset: self.offset[row],
            upper: self.upper[row],
        }
    }
}

/// Selection mask of shape `(lines, azimuths)`:
/// `mask[i, j] = fold(theta[j] - offset[i]) <= upper[i]`.
pub fn selection_mask(
    offset: ArrayView1<f64>,
    upper: ArrayView1<f64>,
    theta: ArrayView1<f64>,
    parallel: bool,
) -> Array2<bool> {
    let mut mask = Array2::from_elem((offset.len(), theta.len()), false);
    let zip = Zip::indexed(&mut mask);
    let select = |(i, j): (usize, usize), m: &mut bool| {
        *m = fold_half_turn(theta[j] - offset[i]) <= upper[i];
    };
    if parallel {
        zip.par_for_each(select);
    } else {
        zip.for_each(select);
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    #[test]
    fn test_fold_range() {
        for &t in &[-7.0, -PI, -1e-20, 0.0, 1.0, PI, 3.0 * PI + 0.5, 100.0] {
            let f = fold_half_turn(t);
            assert!((0.0..PI).contains(&f), "fold({}) = {}", t, f);
        }
        assert!((fold_half_turn(-FRAC_PI_4) - 3.0 * FRAC_PI_4).abs() < 1e-15);
    }

    #[test]
    fn test_short_arc_interval() {
        // east wall of the unit square
        let iv = AngularInterval::from_relative([1.0, -1.0], [1.0, 1.0]).unwrap();
        assert_eq!(iv.offset, -FRAC_PI_4);
        assert_eq!(iv.upper, FRAC_PI_2);
        assert!(iv.contains(0.0));
        assert!(!iv.contains(FRAC_PI_2 + 0.1));
    }

    #[test]
    fn test_wrapping_interval_rebases_on_larger_angle() {
        // west wall: endpoints at 3π/4 and -3π/4, short arc goes through π
        let iv = AngularInterval::from_relative([-1.0, 1.0], [-1.0, -1.0]).unwrap();
        assert!((iv.offset - 3.0 * FRAC_PI_4).abs() < 1e-15);
        assert!((iv.upper - FRAC_PI_2).abs() < 1e-15);
        // azimuth 0 folds onto the antipode π, which the west wall covers
        assert!(iv.contains(0.0));
        assert!(!iv.contains(FRAC_PI_2));
    }

    #[test]
    fn test_interval_ignores_endpoint_order() {
        let a = [3.0, 1.0];
        let b = [-2.0, 4.0];
        assert_eq!(
            AngularInterval::from_relative(a, b),
            AngularInterval::from_relative(b, a)
        );
    }

    #[test]
    fn test_upper_bound_is_inclusive() {
        let iv = AngularInterval::from_relative([1.0, 0.0], [0.0, 1.0]).unwrap();
        assert_eq!(iv.upper, FRAC_PI_2);
        assert!(iv.contains(FRAC_PI_2));
    }

    #[test]
    fn test_antipodal_sweep_is_excluded() {
        // cross product is non-zero but atan2 rounds the sweep to exactly π
        assert!(AngularInterval::from_relative([-1.0, 1e-17], [1.0, 0.0]).is_none());
        let lines = [LineSegment::new([-1.0, 1e-17, 2.0], [1.0, 0.0, 2.0])];
        let set = CandidateSet::build(&lines, &[0], [0.0, 0.0], 0.0).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_degenerate_lines_are_dropped() {
        let lines = [
            LineSegment::new([1.0, 1.0, 5.0], [3.0, 3.0, 5.0]),
            LineSegment::new([-1.0, 0.0, 5.0], [2.0, 0.0, 5.0]),
            LineSegment::new([1.0, -1.0, 1.0], [1.0, 1.0, 1.0]),
        ];
        let set = CandidateSet::build(&lines, &[0, 1, 2], [0.0, 0.0], 0.0).unwrap();
        assert_eq!(set.source, vec![2]);
        assert_eq!(set.lines.row(0).to_vec(), vec![1.0, -1.0, 1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_degeneracy_epsilon_widens_rejection() {
        let lines = [LineSegment::new([1.0, 0.0, 5.0], [2.0, 1e-9, 5.0])];
        assert_eq!(CandidateSet::build(&lines, &[0], [0.0, 0.0], 0.0).unwrap().len(), 1);
        assert!(CandidateSet::build(&lines, &[0], [0.0, 0.0], 1e-6).unwrap().is_empty());
    }

    #[test]
    fn test_lines_translated_to_observer() {
        let lines = [LineSegment::new([11.0, 9.0, 2.0], [11.0, 11.0, 3.0])];
        let set = CandidateSet::build(&lines, &[0], [10.0, 10.0], 0.0).unwrap();
        assert_eq!(set.lines.row(0).to_vec(), vec![1.0, -1.0, 2.0, 1.0, 1.0, 3.0]);
    }

    #[test]
    fn test_bad_index_reports_unavailable() {
        let lines = [LineSegment::new([1.0, -1.0, 1.0], [1.0, 1.0, 1.0])];
        assert!(matches!(
            CandidateSet::build(&lines, &[3], [0.0, 0.0], 0.0),
            Err(SkymaskError::IndexUnavailable(_))
        ));
    }

    #[test]
    fn test_mask_parallel_matches_sequential() {
        let offset = array![-FRAC_PI_4, 3.0 * FRAC_PI_4, 0.3];
        let upper = array![FRAC_PI_2, FRAC_PI_2, 0.1];
        let theta = Array1::linspace(0.0, PI - PI / 64.0, 64);
        let seq = selection_mask(offset.view(), upper.view(), theta.view(), false);
        let par = selection_mask(offset.view(), upper.view(), theta.view(), true);
        assert_eq!(seq, par);
        for (i, j) in [(0, 0), (1, 10), (2, 7)] {
            let iv = AngularInterval {
                offset: offset[i],
                upper: upper[i],
            };
            assert_eq!(seq[[i, j]], iv.contains(theta[j]));
        }
    }
}
