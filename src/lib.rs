//! orbitwatch - orbit propagation, conjunction risk and collision alerting
//!
//! Element sets are propagated with SGP4, scanned pairwise for close
//! approaches and bucketed by altitude and latitude. Conjunction assessments
//! from an external feed run through a hysteresis monitor that turns a noisy
//! probability stream into stable fire and clear transitions. When no live
//! element sets are available a deterministic synthetic constellation stands
//! in for density queries and ground tracks.

pub mod analysis;
pub mod data;
pub mod monitor;
pub mod propagation;
pub mod scheduler;
pub mod synthetic;
