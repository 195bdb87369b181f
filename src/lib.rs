//! Horizon occlusion profiles ("skymasks") from vertical line segments.
//!
//! For an observer on the ground plane, every nearby building edge subtends an
//! azimuth interval and blocks the sky up to a closed-form elevation angle. The
//! per-azimuth maximum over all edges is the horizon profile.

pub mod backend;
pub mod candidates;
pub mod config;
pub mod elevation;
pub mod error;
pub mod geometry;
pub mod index;
pub mod interval;
pub mod profile;
#[cfg(feature = "python")]
mod python;
pub mod world;

pub use backend::{Backend, BackendConfig, BackendKind};
pub use config::{load_config, SkymaskConfig};
pub use error::{PositionError, Result, SkymaskError};
pub use geometry::{lines_from_array, lines_to_array, LineSegment};
pub use index::{DistancePolicy, LinearIndex, RTreeIndex, SpatialIndex};
pub use profile::{ElevationProfile, SkyMask};
pub use world::{compute_profile, compute_profiles, BatchResult, ProfileRunner, World};

#[cfg(feature = "python")]
use pyo3::prelude::*;

#[cfg(feature = "python")]
#[pymodule]
fn skymask(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    register_world_module(py_module)?;
    register_runner_module(py_module)?;

    py_module.add("__doc__", "Horizon occlusion profiles implemented in Rust.")?;

    Ok(())
}

#[cfg(feature = "python")]
fn register_world_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    py_module.add_class::<python::PyWorld>()?;
    py_module.add_class::<python::PySkyMask>()?;
    py_module.add_function(wrap_pyfunction!(python::compute_profile, py_module)?)?;
    Ok(())
}

#[cfg(feature = "python")]
fn register_runner_module(py_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let submodule = PyModule::new(py_module.py(), "runner")?;
    submodule.add("__doc__", "Batch profiles with progress polling and cancellation.")?;
    submodule.add_class::<python::PyProfileRunner>()?;
    py_module.add_submodule(&submodule)?;
    Ok(())
}
