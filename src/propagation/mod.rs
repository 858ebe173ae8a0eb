//! Orbital propagation
//!
//! SGP4 propagation of two-line element sets via satkit, plus the simplified
//! inertial to geodetic conversion shared with the synthetic constellation.
//!
//! # Example
//!
//! ```ignore
//! use orbitwatch::propagation::PropagationService;
//!
//! let service = PropagationService::new();
//! service.load_elements("25544", line1, line2);
//! let state = service.propagate_now("25544")?;
//! println!("{:.1} km", state.altitude_km());
//! ```

pub mod geodetic;
mod propagator;
mod state;

pub use geodetic::{eci_to_geodetic, gmst_degrees, gmst_radians, Geodetic};
pub use propagator::*;
pub use state::*;

/// Mean Earth radius in kilometers (spherical model)
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Earth's gravitational parameter in km³/s²
pub const MU_EARTH_KM3_S2: f64 = 398_600.4418;
