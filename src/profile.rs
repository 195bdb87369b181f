//! Horizon profiles and their full-circle view.

use ndarray::{Array1, ArrayView1};
use ndarray_stats::QuantileExt;
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::sync::Arc;

use crate::backend::Backend;
use crate::candidates::validate_azimuths;
use crate::error::{Result, SkymaskError};
use crate::interval::CandidateSet;

/// Occlusion elevations for half-circle samples `theta`: `alpha_1` looks toward
/// θ, `alpha_2` toward θ − π. All entries are ≥ 0.
#[derive(Debug, Clone, PartialEq)]
pub struct ElevationProfile {
    pub theta: Array1<f64>,
    pub alpha_1: Array1<f64>,
    pub alpha_2: Array1<f64>,
}

impl ElevationProfile {
    /// Profile of an unobstructed observer.
    pub fn zeros(theta: Array1<f64>) -> Self {
        let m = theta.len();
        Self {
            theta,
            alpha_1: Array1::zeros(m),
            alpha_2: Array1::zeros(m),
        }
    }

    pub fn len(&self) -> usize {
        self.theta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.theta.is_empty()
    }

    /// Full-circle profile: `(azimuths, elevations)` of length `2m`, the
    /// samples θ with `alpha_1` followed by θ + π with `alpha_2`. Azimuths lie
    /// in [0, 2π).
    pub fn polar(&self) -> (Array1<f64>, Array1<f64>) {
        let azimuths = self
            .theta
            .iter()
            .copied()
            .chain(self.theta.iter().map(|t| t + PI))
            .collect();
        let elevations = self
            .alpha_1
            .iter()
            .chain(self.alpha_2.iter())
            .copied()
            .collect();
        (azimuths, elevations)
    }

    /// Zenith angle of the visible sky edge, `π/2 − elevation`, over the
    /// full circle.
    pub fn zenith_complement(&self) -> Array1<f64> {
        self.polar().1.mapv(|a| FRAC_PI_2 - a)
    }

    pub fn max_elevation(&self) -> f64 {
        let (_, elevations) = self.polar();
        elevations.max().copied().unwrap_or(0.0)
    }

    /// Sky view factor `1 − mean(sin² γ)` over every polar direction.
    pub fn sky_view_factor(&self) -> f64 {
        let (_, elevations) = self.polar();
        let mean = elevations.mapv(|a| a.sin().powi(2)).mean();
        1.0 - mean.unwrap_or(0.0)
    }
}

/// Reduce any azimuth to `(folded, toward)` with `folded` in [0, π) and
/// `toward` true when the direction is `folded` itself rather than its antipode.
#[inline]
pub(crate) fn split_hemisphere(azimuth: f64) -> (f64, bool) {
    let mut w = azimuth.rem_euclid(TAU);
    if w >= TAU {
        w = 0.0;
    }
    if w < PI {
        (w, true)
    } else {
        // exact for w in [π, 2π)
        (w - PI, false)
    }
}

/// Occluders around one observer, ready to be sampled at any azimuth.
///
/// The mask keeps the candidate lines rather than a fixed profile; each call
/// to [`profile`](Self::profile) or [`samples`](Self::samples) evaluates them
/// exactly at the requested azimuths.
#[derive(Debug, Clone)]
pub struct SkyMask {
    observer: [f64; 2],
    candidates: CandidateSet,
    backend: Backend,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl SkyMask {
    pub(crate) fn new(observer: [f64; 2], candidates: CandidateSet, backend: Backend) -> Self {
        Self {
            observer,
            candidates,
            backend,
            pool: None,
        }
    }

    /// Run later evaluations on `pool` instead of the global rayon pool.
    pub(crate) fn with_pool(mut self, pool: Option<Arc<rayon::ThreadPool>>) -> Self {
        self.pool = pool;
        self
    }

    pub(crate) fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    pub fn observer(&self) -> [f64; 2] {
        self.observer
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub fn num_candidates(&self) -> usize {
        self.candidates.len()
    }

    /// Two-hemisphere profile at half-circle samples in [0, π).
    pub fn profile(&self, theta: ArrayView1<f64>) -> Result<ElevationProfile> {
        validate_azimuths(theta)?;
        let (alpha_1, alpha_2) = self.install(|| self.backend.evaluate(&self.candidates, theta));
        Ok(ElevationProfile {
            theta: theta.to_owned(),
            alpha_1,
            alpha_2,
        })
    }

    /// Elevation toward each azimuth, which may be any finite angle.
    pub fn samples(&self, azimuths: ArrayView1<f64>) -> Result<Array1<f64>> {
        if let Some(bad) = azimuths.iter().find(|a| !a.is_finite()) {
            return Err(SkymaskError::InvalidInput(format!(
                "sample azimuth {} is not finite",
                bad
            )));
        }
        let (folded, toward): (Vec<f64>, Vec<bool>) =
            azimuths.iter().map(|&a| split_hemisphere(a)).unzip();
        let folded = Array1::from(folded);
        let (alpha_1, alpha_2) =
            self.install(|| self.backend.evaluate(&self.candidates, folded.view()));
        Ok(toward
            .iter()
            .enumerate()
            .map(|(k, &t)| if t { alpha_1[k] } else { alpha_2[k] })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_polar_layout() {
        let p = ElevationProfile {
            theta: array![0.0, 1.0],
            alpha_1: array![0.1, 0.2],
            alpha_2: array![0.3, 0.4],
        };
        let (az, el) = p.polar();
        assert_eq!(az, array![0.0, 1.0, PI, 1.0 + PI]);
        assert_eq!(el, array![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(p.max_elevation(), 0.4);
        let z = p.zenith_complement();
        assert!((z[3] - (FRAC_PI_2 - 0.4)).abs() < 1e-15);
    }

    #[test]
    fn test_open_sky() {
        let p = ElevationProfile::zeros(Array1::linspace(0.0, 3.0, 12));
        assert_eq!(p.sky_view_factor(), 1.0);
        assert_eq!(p.max_elevation(), 0.0);
        let empty = ElevationProfile::zeros(Array1::zeros(0));
        assert!(empty.is_empty());
        assert_eq!(empty.max_elevation(), 0.0);
        assert_eq!(empty.sky_view_factor(), 1.0);
    }

    #[test]
    fn test_sky_view_factor_of_uniform_horizon() {
        let theta = Array1::linspace(0.0, 3.0, 8);
        let p = ElevationProfile {
            alpha_1: Array1::from_elem(8, FRAC_PI_2 / 3.0),
            alpha_2: Array1::from_elem(8, FRAC_PI_2 / 3.0),
            theta,
        };
        // sin²(30°) = 0.25
        assert!((p.sky_view_factor() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_split_hemisphere() {
        assert_eq!(split_hemisphere(0.0), (0.0, true));
        assert_eq!(split_hemisphere(-1e-20), (0.0, true));
        let (t, toward) = split_hemisphere(-FRAC_PI_2);
        assert!(!toward);
        assert!((t - FRAC_PI_2).abs() < 1e-15);
        let (t, toward) = split_hemisphere(PI);
        assert!(!toward);
        assert_eq!(t, 0.0);
        let (t, toward) = split_hemisphere(TAU + 0.5);
        assert!(toward);
        assert!((t - 0.5).abs() < 1e-15);
        for k in -40..40 {
            let (t, _) = split_hemisphere(k as f64 * 0.37);
            assert!((0.0..PI).contains(&t));
        }
    }
}
