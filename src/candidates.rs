//! Candidate selection and query input validation.

use ndarray::ArrayView1;
use std::f64::consts::PI;

use crate::error::{Result, SkymaskError};
use crate::index::SpatialIndex;

/// Every sample must be finite and in [0, π).
pub fn validate_azimuths(theta: ArrayView1<f64>) -> Result<()> {
    if let Some((j, &t)) = theta
        .iter()
        .enumerate()
        .find(|(_, t)| !(0.0..PI).contains(*t))
    {
        return Err(SkymaskError::InvalidInput(format!(
            "sample azimuth {} at position {} is outside [0, pi)",
            t, j
        )));
    }
    Ok(())
}

/// Positive and not NaN. `f64::INFINITY` means unbounded.
pub fn validate_max_distance(max_distance: f64) -> Result<()> {
    if max_distance.is_nan() || max_distance <= 0.0 {
        return Err(SkymaskError::InvalidInput(format!(
            "max distance must be positive or +inf, got {}",
            max_distance
        )));
    }
    Ok(())
}

pub fn validate_observer(observer: [f64; 2]) -> Result<()> {
    if !(observer[0].is_finite() && observer[1].is_finite()) {
        return Err(SkymaskError::InvalidInput(format!(
            "observer position {:?} is not finite",
            observer
        )));
    }
    Ok(())
}

/// Indices of the lines within `max_distance` of `observer`.
pub fn select_candidates(
    index: &dyn SpatialIndex,
    observer: [f64; 2],
    max_distance: f64,
) -> Result<Vec<usize>> {
    validate_observer(observer)?;
    validate_max_distance(max_distance)?;
    let idxs = index.query_near(observer, max_distance)?;
    log::debug!(
        "select_candidates: {} of {} lines within {} of {:?}",
        idxs.len(),
        index.len(),
        max_distance,
        observer
    );
    Ok(idxs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LineSegment;
    use crate::index::{DistancePolicy, LinearIndex};
    use ndarray::array;

    struct BrokenIndex;

    impl SpatialIndex for BrokenIndex {
        fn query_near(&self, _point: [f64; 2], _radius: f64) -> Result<Vec<usize>> {
            Err(SkymaskError::IndexUnavailable("backing store offline".to_string()))
        }

        fn len(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_azimuth_domain() {
        assert!(validate_azimuths(array![0.0, 1.0, PI - 1e-12].view()).is_ok());
        assert!(validate_azimuths(array![0.0, PI].view()).is_err());
        assert!(validate_azimuths(array![-0.1].view()).is_err());
        assert!(validate_azimuths(array![f64::NAN].view()).is_err());
        assert!(validate_azimuths(ndarray::Array1::<f64>::zeros(0).view()).is_ok());
    }

    #[test]
    fn test_max_distance_domain() {
        assert!(validate_max_distance(f64::INFINITY).is_ok());
        assert!(validate_max_distance(12.5).is_ok());
        for d in [0.0, -3.0, f64::NAN, f64::NEG_INFINITY] {
            assert!(matches!(
                validate_max_distance(d),
                Err(SkymaskError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_select_candidates_by_distance() {
        let lines = vec![
            LineSegment::new([1.0, -1.0, 1.0], [1.0, 1.0, 1.0]),
            LineSegment::new([50.0, -1.0, 1.0], [50.0, 1.0, 1.0]),
        ];
        let idx = LinearIndex::new(&lines, DistancePolicy::Midpoint);
        assert_eq!(select_candidates(&idx, [0.0, 0.0], 10.0).unwrap(), vec![0]);
        assert_eq!(select_candidates(&idx, [0.0, 0.0], f64::INFINITY).unwrap(), vec![0, 1]);
        assert!(select_candidates(&idx, [0.0, 0.0], 0.5).unwrap().is_empty());
        assert!(select_candidates(&idx, [f64::NAN, 0.0], 10.0).is_err());
    }

    #[test]
    fn test_index_failure_propagates() {
        assert_eq!(
            select_candidates(&BrokenIndex, [0.0, 0.0], 10.0),
            Err(SkymaskError::IndexUnavailable("backing store offline".to_string()))
        );
    }
}
