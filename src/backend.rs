//! Execution strategies for the per-observer `(lines × azimuths)` work.
//!
//! `Vectorized` evaluates the whole candidate matrix in one sequential
//! ndarray pass. `Parallel` is the data-parallel path: every matrix is
//! evaluated with rayon-backed `par_for_each`, and candidate rows are tiled
//! so that one block of matrices never exceeds the configured memory budget.
//! Both paths perform identical per-cell arithmetic and an order-independent
//! max reduction, so their outputs agree exactly.

use ndarray::{s, Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::elevation::{elevation_matrix, masked_reduce, merge_max};
use crate::error::{Result, SkymaskError};
use crate::interval::{selection_mask, CandidateSet};

/// One f64 elevation and one selection flag per (line, azimuth) cell.
pub const BYTES_PER_CELL: usize = std::mem::size_of::<f64>() + std::mem::size_of::<bool>();

const DEFAULT_MEMORY_FRACTION: f64 = 0.8;
const DEFAULT_DEVICE_MEMORY_BYTES: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Vectorized,
    Parallel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Share of `device_memory_bytes` a single block of matrices may use.
    pub memory_fraction: f64,
    pub device_memory_bytes: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Vectorized,
            memory_fraction: DEFAULT_MEMORY_FRACTION,
            device_memory_bytes: DEFAULT_DEVICE_MEMORY_BYTES,
        }
    }
}

impl BackendConfig {
    pub fn vectorized() -> Self {
        Self::default()
    }

    pub fn parallel() -> Self {
        Self {
            kind: BackendKind::Parallel,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.memory_fraction > 0.0 && self.memory_fraction <= 1.0) {
            return Err(SkymaskError::Config(format!(
                "memory_fraction must be in (0, 1], got {}",
                self.memory_fraction
            )));
        }
        if self.device_memory_bytes == 0 {
            return Err(SkymaskError::Config(
                "device_memory_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve into the execution strategy threaded through queries.
    pub fn resolve(&self) -> Result<Backend> {
        self.validate()?;
        Ok(match self.kind {
            BackendKind::Vectorized => Backend::Vectorized,
            BackendKind::Parallel => Backend::Parallel {
                block_bytes: (self.memory_fraction * self.device_memory_bytes as f64) as usize,
            },
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Vectorized,
    Parallel {
        /// Upper bound on the bytes held by one block's matrices.
        block_bytes: usize,
    },
}

impl Backend {
    pub fn is_parallel(&self) -> bool {
        matches!(self, Backend::Parallel { .. })
    }

    /// Candidate rows evaluated together for `num_azimuths` columns.
    pub fn rows_per_block(&self, num_lines: usize, num_azimuths: usize) -> usize {
        match *self {
            Backend::Vectorized => num_lines.max(1),
            Backend::Parallel { block_bytes } => {
                let row_bytes = num_azimuths.max(1) * BYTES_PER_CELL;
                (block_bytes / row_bytes).max(1)
            }
        }
    }

    /// Hemisphere profiles `(alpha_1, alpha_2)` of `candidates` at `theta`.
    pub fn evaluate(
        &self,
        candidates: &CandidateSet,
        theta: ArrayView1<f64>,
    ) -> (Array1<f64>, Array1<f64>) {
        let num_azimuths = theta.len();
        let num_lines = candidates.len();
        if num_lines == 0 || num_azimuths == 0 {
            return (Array1::zeros(num_azimuths), Array1::zeros(num_azimuths));
        }

        let parallel = self.is_parallel();
        let rows = self.rows_per_block(num_lines, num_azimuths);
        if rows >= num_lines {
            return evaluate_block(
                candidates.lines.view(),
                candidates.offset.view(),
                candidates.upper.view(),
                theta,
                parallel,
            );
        }

        log::debug!(
            "Backend: tiling {} lines x {} azimuths into blocks of {} rows",
            num_lines,
            num_azimuths,
            rows
        );
        let mut alpha_1 = Array1::<f64>::zeros(num_azimuths);
        let mut alpha_2 = Array1::<f64>::zeros(num_azimuths);
        for start in (0..num_lines).step_by(rows) {
            let end = (start + rows).min(num_lines);
            let (block_1, block_2) = evaluate_block(
                candidates.lines.slice(s![start..end, ..]),
                candidates.offset.slice(s![start..end]),
                candidates.upper.slice(s![start..end]),
                theta,
                parallel,
            );
            merge_max(&mut alpha_1, &block_1);
            merge_max(&mut alpha_2, &block_2);
        }
        (alpha_1, alpha_2)
    }
}

/// Mask, elevation, and reduction for one block of candidate rows. The block's
/// matrices are released when this returns.
fn evaluate_block(
    lines: ArrayView2<f64>,
    offset: ArrayView1<f64>,
    upper: ArrayView1<f64>,
    theta: ArrayView1<f64>,
    parallel: bool,
) -> (Array1<f64>, Array1<f64>) {
    let mask = selection_mask(offset, upper, theta, parallel);
    let alpha = elevation_matrix(lines, theta, parallel);
    masked_reduce(alpha.view(), mask.view(), parallel)
}
