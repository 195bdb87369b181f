//! Spatial indexes answering "which lines lie within `radius` of a point".
//!
//! Any structure that satisfies [`SpatialIndex`] can be injected into a
//! [`World`](crate::world::World). Two are provided: an R-tree over line key
//! points and a linear scan used as the reference.

use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::{distance_xy, LineSegment};

/// Which point(s) of a line are measured against the distance threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistancePolicy {
    /// Midpoint of the segment's xy projection.
    #[default]
    Midpoint,
    /// Either endpoint within the threshold selects the line.
    NearestEndpoint,
}

impl DistancePolicy {
    fn key_points(self, line: &LineSegment) -> Vec<[f64; 2]> {
        match self {
            DistancePolicy::Midpoint => vec![line.midpoint_xy()],
            DistancePolicy::NearestEndpoint => line.endpoints_xy().to_vec(),
        }
    }

    /// Planar distance from `point` to the line as measured by this policy.
    pub fn distance(self, line: &LineSegment, point: [f64; 2]) -> f64 {
        self.key_points(line)
            .into_iter()
            .map(|k| distance_xy(k, point))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Inclusive radius test on squared distances. Both indexes decide membership
/// through this one comparison so they agree on lines at the boundary.
#[inline]
fn within_radius(key: [f64; 2], point: [f64; 2], radius_sq: f64) -> bool {
    let dx = key[0] - point[0];
    let dy = key[1] - point[1];
    dx * dx + dy * dy <= radius_sq
}

/// Radius query contract.
///
/// Returned indices refer to positions in the line slice the index was built
/// from. They are sorted ascending and free of duplicates. An infinite radius
/// means "every line".
pub trait SpatialIndex: Send + Sync {
    fn query_near(&self, point: [f64; 2], radius: f64) -> Result<Vec<usize>>;

    /// Number of lines indexed.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type KeyPoint = GeomWithData<[f64; 2], usize>;

/// R-tree over line key points, bulk loaded once.
pub struct RTreeIndex {
    tree: RTree<KeyPoint>,
    num_lines: usize,
    policy: DistancePolicy,
}

impl RTreeIndex {
    pub fn new(lines: &[LineSegment], policy: DistancePolicy) -> Self {
        let points: Vec<KeyPoint> = lines
            .iter()
            .enumerate()
            .flat_map(|(idx, line)| {
                policy
                    .key_points(line)
                    .into_iter()
                    .map(move |p| GeomWithData::new(p, idx))
            })
            .collect();
        log::debug!(
            "RTreeIndex: bulk loading {} key points for {} lines ({:?})",
            points.len(),
            lines.len(),
            policy
        );
        Self {
            tree: RTree::bulk_load(points),
            num_lines: lines.len(),
            policy,
        }
    }

    pub fn policy(&self) -> DistancePolicy {
        self.policy
    }
}

impl SpatialIndex for RTreeIndex {
    fn query_near(&self, point: [f64; 2], radius: f64) -> Result<Vec<usize>> {
        if radius.is_infinite() {
            return Ok((0..self.num_lines).collect());
        }
        let radius_sq = radius * radius;
        // widen the tree search slightly, then decide with the shared test
        let mut idxs: Vec<usize> = self
            .tree
            .locate_within_distance(point, radius_sq * (1.0 + 1e-9))
            .filter(|p| within_radius(*p.geom(), point, radius_sq))
            .map(|p| p.data)
            .collect();
        idxs.sort_unstable();
        idxs.dedup();
        Ok(idxs)
    }

    fn len(&self) -> usize {
        self.num_lines
    }
}

/// Brute-force scan over every line.
pub struct LinearIndex {
    lines: Vec<LineSegment>,
    policy: DistancePolicy,
}

impl LinearIndex {
    pub fn new(lines: &[LineSegment], policy: DistancePolicy) -> Self {
        Self {
            lines: lines.to_vec(),
            policy,
        }
    }

    pub fn policy(&self) -> DistancePolicy {
        self.policy
    }
}

impl SpatialIndex for LinearIndex {
    fn query_near(&self, point: [f64; 2], radius: f64) -> Result<Vec<usize>> {
        if radius.is_infinite() {
            return Ok((0..self.lines.len()).collect());
        }
        let radius_sq = radius * radius;
        Ok(self
            .lines
            .iter()
            .enumerate()
            .filter(|(_, line)| {
                self.policy
                    .key_points(line)
                    .into_iter()
                    .any(|k| within_radius(k, point, radius_sq))
            })
            .map(|(idx, _)| idx)
            .collect())
    }

    fn len(&self) -> usize {
        self.lines.len()
    }
}
