//! Geometry dataset with its spatial index, and the query entry points.
//!
//! A [`World`] owns the line segments, an index over them, and the resolved
//! configuration. Single queries return a `Result`; batches evaluate every
//! observer independently and report per-position outcomes in submission
//! order.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::Backend;
use crate::candidates::{
    select_candidates, validate_azimuths, validate_max_distance, validate_observer,
};
use crate::config::SkymaskConfig;
use crate::error::{PositionError, Result, SkymaskError};
use crate::geometry::{lines_from_array, lines_to_array, validate_lines, LineSegment};
use crate::index::{DistancePolicy, LinearIndex, RTreeIndex, SpatialIndex};
use crate::interval::CandidateSet;
use crate::profile::{ElevationProfile, SkyMask};

/// Candidates, intervals, and reduction for one observer.
fn profile_at(
    lines: &[LineSegment],
    index: &dyn SpatialIndex,
    observer: [f64; 2],
    theta: ArrayView1<f64>,
    max_distance: f64,
    degeneracy_epsilon: f64,
    backend: Backend,
) -> Result<ElevationProfile> {
    let mask = skymask_at(lines, index, observer, max_distance, degeneracy_epsilon, backend)?;
    mask.profile(theta)
}

fn skymask_at(
    lines: &[LineSegment],
    index: &dyn SpatialIndex,
    observer: [f64; 2],
    max_distance: f64,
    degeneracy_epsilon: f64,
    backend: Backend,
) -> Result<SkyMask> {
    let idxs = select_candidates(index, observer, max_distance)?;
    let candidates = CandidateSet::build(lines, &idxs, observer, degeneracy_epsilon)?;
    log::debug!(
        "skymask at {:?}: {} candidates, {} retained",
        observer,
        idxs.len(),
        candidates.len()
    );
    Ok(SkyMask::new(observer, candidates, backend))
}

/// Per-position outcomes of a batch, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub results: Vec<Result<ElevationProfile>>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn successes(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failures(&self) -> Vec<PositionError> {
        self.results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.as_ref().err().map(|e| PositionError::new(i, e.clone())))
            .collect()
    }

    pub fn is_cancelled(&self) -> bool {
        self.results
            .iter()
            .any(|r| matches!(r, Err(SkymaskError::Cancelled)))
    }

    /// All profiles, or the lowest-indexed failure that is not a
    /// cancellation (falling back to the first cancelled position).
    pub fn into_profiles(self) -> std::result::Result<Vec<ElevationProfile>, PositionError> {
        let failures = self.failures();
        if let Some(first) = failures
            .iter()
            .find(|f| f.source != SkymaskError::Cancelled)
            .or_else(|| failures.first())
        {
            return Err(first.clone());
        }
        Ok(self.results.into_iter().flatten().collect())
    }
}

pub struct World {
    lines: Vec<LineSegment>,
    index: Box<dyn SpatialIndex>,
    config: SkymaskConfig,
    backend: Backend,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl World {
    /// Build a world over `lines` with an R-tree keyed by the configured
    /// distance policy.
    pub fn new(lines: Vec<LineSegment>, config: SkymaskConfig) -> Result<Self> {
        let index = RTreeIndex::new(&lines, config.distance_policy);
        Self::with_index(lines, Box::new(index), config)
    }

    /// Build a world around an externally constructed index.
    pub fn with_index(
        lines: Vec<LineSegment>,
        index: Box<dyn SpatialIndex>,
        config: SkymaskConfig,
    ) -> Result<Self> {
        if lines.is_empty() {
            return Err(SkymaskError::InvalidInput(
                "a world needs at least one line".to_string(),
            ));
        }
        validate_lines(&lines)?;
        config.validate()?;
        if index.len() != lines.len() {
            return Err(SkymaskError::IndexUnavailable(format!(
                "index covers {} lines but the world has {}",
                index.len(),
                lines.len()
            )));
        }
        let backend = config.backend.resolve()?;
        let pool = config
            .threads
            .map(|n| rayon::ThreadPoolBuilder::new().num_threads(n).build().map(Arc::new))
            .transpose()
            .map_err(|e| SkymaskError::Config(format!("failed to build thread pool: {e}")))?;

        log::info!(
            "World: {} lines, max distance {}, {:?}, {:?}",
            lines.len(),
            config.max_distance(),
            config.distance_policy,
            backend
        );
        Ok(Self {
            lines,
            index,
            config,
            backend,
            pool,
        })
    }

    /// Build from an `(n, 6)` array of `x1, y1, z1, x2, y2, z2` rows.
    pub fn from_array(rows: ArrayView2<f64>, config: SkymaskConfig) -> Result<Self> {
        Self::new(lines_from_array(rows)?, config)
    }

    pub fn lines(&self) -> &[LineSegment] {
        &self.lines
    }

    pub fn lines_array(&self) -> Array2<f64> {
        lines_to_array(&self.lines)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn config(&self) -> &SkymaskConfig {
        &self.config
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Occluders around `observer`, sampled later at any azimuth. The mask
    /// evaluates on this world's thread pool when one is configured.
    pub fn skymask(&self, observer: [f64; 2]) -> Result<SkyMask> {
        let mask = self.install(|| {
            skymask_at(
                &self.lines,
                self.index.as_ref(),
                observer,
                self.config.max_distance(),
                self.config.degeneracy_epsilon,
                self.backend,
            )
        })?;
        Ok(mask.with_pool(self.pool.clone()))
    }

    /// Two-hemisphere profile at half-circle samples `theta` in [0, π).
    pub fn profile(&self, observer: [f64; 2], theta: ArrayView1<f64>) -> Result<ElevationProfile> {
        self.install(|| self.profile_inner(observer, theta))
    }

    fn profile_inner(
        &self,
        observer: [f64; 2],
        theta: ArrayView1<f64>,
    ) -> Result<ElevationProfile> {
        profile_at(
            &self.lines,
            self.index.as_ref(),
            observer,
            theta,
            self.config.max_distance(),
            self.config.degeneracy_epsilon,
            self.backend,
        )
    }

    /// Evaluate `f` for positions `0..n`. Positions are spread over rayon
    /// workers on the vectorized backend and run one after another on the
    /// parallel backend, whose queries already use every worker.
    fn run_positions<T, F>(
        &self,
        n: usize,
        progress: &AtomicUsize,
        cancelled: &AtomicBool,
        fail_fast: bool,
        f: F,
    ) -> Vec<Result<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync + Send,
    {
        let task = |i: usize| -> Result<T> {
            if cancelled.load(Ordering::SeqCst) {
                return Err(SkymaskError::Cancelled);
            }
            let result = f(i);
            if fail_fast && result.is_err() {
                cancelled.store(true, Ordering::SeqCst);
            }
            progress.fetch_add(1, Ordering::SeqCst);
            result
        };
        let parallel_queries = self.backend.is_parallel();
        self.install(|| {
            if parallel_queries {
                (0..n).map(task).collect()
            } else {
                (0..n).into_par_iter().map(task).collect()
            }
        })
    }

    fn run_batch_with(
        &self,
        observers: &[[f64; 2]],
        theta: ArrayView1<f64>,
        progress: &AtomicUsize,
        cancelled: &AtomicBool,
        fail_fast: bool,
    ) -> BatchResult {
        let results = self.run_positions(observers.len(), progress, cancelled, fail_fast, |i| {
            self.profile_inner(observers[i], theta)
        });
        let batch = BatchResult { results };
        for failure in batch.failures() {
            if failure.source != SkymaskError::Cancelled {
                log::warn!("{}", failure);
            }
        }
        if batch.is_cancelled() {
            log::warn!(
                "batch cancelled after {} of {} positions",
                progress.load(Ordering::SeqCst),
                observers.len()
            );
        }
        log::info!(
            "batch: {} of {} positions succeeded",
            batch.successes(),
            batch.len()
        );
        batch
    }

    /// Profiles for many observers; a failing position does not affect the
    /// others.
    pub fn profiles(&self, observers: &[[f64; 2]], theta: ArrayView1<f64>) -> BatchResult {
        let progress = AtomicUsize::new(0);
        let cancelled = AtomicBool::new(false);
        self.run_batch_with(observers, theta, &progress, &cancelled, false)
    }

    /// Profiles for many observers, stopping at the first failure.
    pub fn profiles_fail_fast(
        &self,
        observers: &[[f64; 2]],
        theta: ArrayView1<f64>,
    ) -> std::result::Result<Vec<ElevationProfile>, PositionError> {
        let progress = AtomicUsize::new(0);
        let cancelled = AtomicBool::new(false);
        self.run_batch_with(observers, theta, &progress, &cancelled, true)
            .into_profiles()
    }

    /// Batch with the semantics chosen by `config.fail_fast`.
    pub fn run_batch(&self, observers: &[[f64; 2]], theta: ArrayView1<f64>) -> BatchResult {
        ProfileRunner::new().run(self, observers, theta)
    }

    /// Elevation toward every azimuth in `azimuths` (any real angle) for each
    /// observer: row `i` belongs to `observers[i]`.
    pub fn par_samples(
        &self,
        observers: &[[f64; 2]],
        azimuths: ArrayView1<f64>,
    ) -> std::result::Result<Array2<f64>, PositionError> {
        let progress = AtomicUsize::new(0);
        let cancelled = AtomicBool::new(false);
        let rows = self.run_positions(observers.len(), &progress, &cancelled, true, |i| {
            self.skymask(observers[i])?.samples(azimuths)
        });
        let m = azimuths.len();
        let mut out = Array2::<f64>::zeros((observers.len(), m));
        let mut first_cancel = None;
        for (i, row) in rows.into_iter().enumerate() {
            match row {
                Ok(values) => out.row_mut(i).assign(&values),
                Err(SkymaskError::Cancelled) => {
                    first_cancel.get_or_insert(i);
                }
                Err(e) => return Err(PositionError::new(i, e)),
            }
        }
        match first_cancel {
            Some(i) => Err(PositionError::new(i, SkymaskError::Cancelled)),
            None => Ok(out),
        }
    }
}

/// Batch runner whose progress can be polled and which can be cancelled from
/// another thread.
#[derive(Debug, Clone)]
pub struct ProfileRunner {
    progress: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl Default for ProfileRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProfileRunner {
    pub fn new() -> Self {
        Self {
            progress: Arc::new(AtomicUsize::new(0)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Positions computed so far in the current run.
    pub fn progress(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear progress and the cancel flag before reuse.
    pub fn reset(&self) {
        self.progress.store(0, Ordering::SeqCst);
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Run a batch over `observers`. Positions not started before a
    /// cancellation are reported as [`SkymaskError::Cancelled`].
    pub fn run(
        &self,
        world: &World,
        observers: &[[f64; 2]],
        theta: ArrayView1<f64>,
    ) -> BatchResult {
        self.progress.store(0, Ordering::SeqCst);
        world.run_batch_with(
            observers,
            theta,
            &self.progress,
            &self.cancelled,
            world.config.fail_fast,
        )
    }
}

/// Profile for one observer against `lines`, scanned linearly with the
/// vectorized backend. An empty line set yields an all-zero profile.
pub fn compute_profile(
    lines: &[LineSegment],
    observer: [f64; 2],
    sample_azimuths: &[f64],
    max_distance: f64,
) -> Result<ElevationProfile> {
    let index = LinearIndex::new(lines, DistancePolicy::Midpoint);
    compute_with_index(lines, &index, observer, sample_azimuths, max_distance)
}

fn compute_with_index(
    lines: &[LineSegment],
    index: &LinearIndex,
    observer: [f64; 2],
    sample_azimuths: &[f64],
    max_distance: f64,
) -> Result<ElevationProfile> {
    let theta = ArrayView1::from(sample_azimuths);
    validate_azimuths(theta)?;
    validate_observer(observer)?;
    validate_max_distance(max_distance)?;
    validate_lines(lines)?;
    if lines.is_empty() {
        return Ok(ElevationProfile::zeros(Array1::from(sample_azimuths.to_vec())));
    }
    profile_at(lines, index, observer, theta, max_distance, 0.0, Backend::Vectorized)
}

/// [`compute_profile`] for many observers, in submission order with
/// per-position failures.
pub fn compute_profiles(
    lines: &[LineSegment],
    observers: &[[f64; 2]],
    sample_azimuths: &[f64],
    max_distance: f64,
) -> BatchResult {
    let index = LinearIndex::new(lines, DistancePolicy::Midpoint);
    let results = observers
        .par_iter()
        .map(|&observer| compute_with_index(lines, &index, observer, sample_azimuths, max_distance))
        .collect();
    BatchResult { results }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendConfig;
    use std::f64::consts::{FRAC_PI_4, PI};

    fn unit_square() -> Vec<LineSegment> {
        vec![
            LineSegment::new([1.0, 1.0, 1.0], [-1.0, 1.0, 1.0]),
            LineSegment::new([-1.0, 1.0, 1.0], [-1.0, -1.0, 1.0]),
            LineSegment::new([-1.0, -1.0, 1.0], [1.0, -1.0, 1.0]),
            LineSegment::new([1.0, -1.0, 1.0], [1.0, 1.0, 1.0]),
        ]
    }

    #[test]
    fn test_world_rejects_empty_and_non_finite() {
        assert!(matches!(
            World::new(Vec::new(), SkymaskConfig::default()),
            Err(SkymaskError::InvalidInput(_))
        ));
        let lines = vec![LineSegment::new([0.0, f64::INFINITY, 1.0], [1.0, 1.0, 1.0])];
        assert!(World::new(lines, SkymaskConfig::default()).is_err());
    }

    #[test]
    fn test_mismatched_index_rejected() {
        let lines = unit_square();
        let index = LinearIndex::new(&lines[..2], DistancePolicy::Midpoint);
        assert!(matches!(
            World::with_index(lines, Box::new(index), SkymaskConfig::default()),
            Err(SkymaskError::IndexUnavailable(_))
        ));
    }

    #[test]
    fn test_profile_inside_square() {
        let world = World::new(unit_square(), SkymaskConfig::default()).unwrap();
        let theta = Array1::from(vec![0.0, FRAC_PI_4]);
        let p = world.profile([0.0, 0.0], theta.view()).unwrap();
        assert!((p.alpha_1[0] - FRAC_PI_4).abs() < 1e-12);
        assert!((p.alpha_1[1] - FRAC_PI_4.cos().atan()).abs() < 1e-12);
        assert!((p.alpha_2[0] - p.alpha_1[0]).abs() < 1e-12);
    }

    #[test]
    fn test_profile_rejects_bad_azimuth() {
        let world = World::new(unit_square(), SkymaskConfig::default()).unwrap();
        let theta = Array1::from(vec![0.0, PI]);
        assert!(matches!(
            world.profile([0.0, 0.0], theta.view()),
            Err(SkymaskError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_dedicated_pool() {
        let config = SkymaskConfig {
            threads: Some(2),
            backend: BackendConfig::parallel(),
            ..Default::default()
        };
        let world = World::new(unit_square(), config).unwrap();
        let theta = Array1::linspace(0.0, 3.0, 16);
        let batch = world.profiles(&[[0.0, 0.0], [0.2, 0.1]], theta.view());
        assert_eq!(batch.successes(), 2);
    }

    #[test]
    fn test_skymask_evaluates_on_world_pool() {
        let config = SkymaskConfig {
            threads: Some(3),
            ..Default::default()
        };
        let world = World::new(unit_square(), config).unwrap();
        let mask = world.skymask([0.0, 0.0]).unwrap();
        assert_eq!(mask.install(rayon::current_num_threads), 3);

        let global = World::new(unit_square(), SkymaskConfig::default()).unwrap();
        let mask = global.skymask([0.0, 0.0]).unwrap();
        assert_eq!(mask.install(rayon::current_num_threads), rayon::current_num_threads());
    }

    #[test]
    fn test_profile_checks_azimuths_after_candidates() {
        let world = World::new(unit_square(), SkymaskConfig::default()).unwrap();
        let theta = Array1::from(vec![-0.5]);
        match world.profile([0.0, 0.0], theta.view()) {
            Err(SkymaskError::InvalidInput(msg)) => assert!(msg.contains("sample azimuth")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_batch_into_profiles_prefers_real_failure() {
        let batch = BatchResult {
            results: vec![
                Err(SkymaskError::Cancelled),
                Err(SkymaskError::InvalidInput("bad".to_string())),
            ],
        };
        let err = batch.into_profiles().unwrap_err();
        assert_eq!(err.index, 1);
    }

    #[test]
    fn test_compute_profile_empty_lines() {
        let p = compute_profile(&[], [3.0, 4.0], &[0.0, 1.0, 2.0], f64::INFINITY).unwrap();
        assert_eq!(p.alpha_1, Array1::<f64>::zeros(3));
        assert_eq!(p.alpha_2, Array1::<f64>::zeros(3));
        assert!(compute_profile(&[], [0.0, 0.0], &[4.0], 1.0).is_err());
        assert!(compute_profile(&[], [0.0, 0.0], &[0.0], -1.0).is_err());
    }
}
