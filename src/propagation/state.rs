//! Propagated state of a single object

use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::geodetic::Geodetic;

/// Position and velocity of one object at one instant
///
/// Position and velocity are in the TEME inertial frame as produced by SGP4.
/// Recomputed per query, never stored by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateVector {
    pub object_id: String,
    pub timestamp: DateTime<Utc>,
    /// Inertial position (km)
    pub position_km: Vector3<f64>,
    /// Inertial velocity (km/s)
    pub velocity_kms: Vector3<f64>,
    pub geodetic: Geodetic,
    /// Magnitude of the velocity (km/s)
    pub speed_kms: f64,
}

impl StateVector {
    pub fn altitude_km(&self) -> f64 {
        self.geodetic.altitude_km
    }

    pub fn distance_to(&self, other: &StateVector) -> f64 {
        (self.position_km - other.position_km).norm()
    }

    pub fn relative_speed(&self, other: &StateVector) -> f64 {
        (self.velocity_kms - other.velocity_kms).norm()
    }

    pub fn geo_point(&self) -> GeoPoint {
        GeoPoint {
            id: self.object_id.clone(),
            latitude: self.geodetic.latitude,
            longitude: self.geodetic.longitude,
            altitude_km: self.geodetic.altitude_km,
        }
    }
}

/// Where an object is over the ground; the input of density analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
}
