//! Inertial to Earth-fixed conversion
//!
//! Uses the linear GMST model and a spherical Earth. Both are deliberate
//! simplifications: geodetic output is for display, density bucketing and
//! coarse altitude filtering, not for precise ground tracks.

use chrono::{DateTime, TimeZone, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::EARTH_RADIUS_KM;

/// Julian date of the J2000.0 epoch (2000-01-01 12:00:00 UTC)
pub const J2000_JD: f64 = 2_451_545.0;

const GMST_AT_J2000_DEG: f64 = 280.460_618_37;
const GMST_RATE_DEG_PER_DAY: f64 = 360.985_647_366_29;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Geographic coordinates over a spherical Earth
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geodetic {
    /// Latitude in degrees, [-90, 90]
    pub latitude: f64,
    /// Longitude in degrees, (-180, 180]
    pub longitude: f64,
    /// Altitude above the mean sphere (km)
    pub altitude_km: f64,
}

fn j2000() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Days elapsed since J2000.0, including the fractional day
pub fn days_since_j2000(at: DateTime<Utc>) -> f64 {
    let delta = at - j2000();
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1e6 / SECONDS_PER_DAY,
        None => delta.num_milliseconds() as f64 / 1e3 / SECONDS_PER_DAY,
    }
}

/// Julian date of an instant
pub fn julian_date(at: DateTime<Utc>) -> f64 {
    J2000_JD + days_since_j2000(at)
}

/// Greenwich Mean Sidereal Time in degrees, normalised to [0, 360)
pub fn gmst_degrees(at: DateTime<Utc>) -> f64 {
    (GMST_AT_J2000_DEG + GMST_RATE_DEG_PER_DAY * days_since_j2000(at)).rem_euclid(360.0)
}

/// Greenwich Mean Sidereal Time in radians
pub fn gmst_radians(at: DateTime<Utc>) -> f64 {
    gmst_degrees(at).to_radians()
}

/// Rotate an inertial position (km) into the Earth-fixed frame
pub fn eci_to_ecef(position_km: &Vector3<f64>, gmst_rad: f64) -> Vector3<f64> {
    let (sin_g, cos_g) = gmst_rad.sin_cos();
    Vector3::new(
        position_km.x * cos_g + position_km.y * sin_g,
        -position_km.x * sin_g + position_km.y * cos_g,
        position_km.z,
    )
}

/// Spherical latitude/longitude/altitude of an Earth-fixed position (km)
pub fn ecef_to_geodetic(ecef_km: &Vector3<f64>) -> Geodetic {
    let r = ecef_km.norm();
    let latitude = if r > 0.0 {
        (ecef_km.z / r).clamp(-1.0, 1.0).asin().to_degrees()
    } else {
        0.0
    };

    Geodetic {
        latitude,
        longitude: ecef_km.y.atan2(ecef_km.x).to_degrees(),
        altitude_km: r - EARTH_RADIUS_KM,
    }
}

/// Convert an inertial position (km) at `at` into geodetic coordinates
pub fn eci_to_geodetic(position_km: &Vector3<f64>, at: DateTime<Utc>) -> Geodetic {
    ecef_to_geodetic(&eci_to_ecef(position_km, gmst_radians(at)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gmst_at_j2000() {
        assert_relative_eq!(gmst_degrees(j2000()), 280.46061837, epsilon = 1e-9);
        assert_relative_eq!(julian_date(j2000()), J2000_JD, epsilon = 1e-9);
    }

    #[test]
    fn test_gmst_includes_fractional_day() {
        let half_day = Utc.with_ymd_and_hms(2000, 1, 2, 0, 0, 0).unwrap();
        assert_relative_eq!(days_since_j2000(half_day), 0.5, epsilon = 1e-12);

        let expected = (280.46061837 + 360.98564736629 * 0.5_f64).rem_euclid(360.0);
        assert_relative_eq!(gmst_degrees(half_day), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_x_axis_longitude_at_j2000() {
        let r = EARTH_RADIUS_KM + 500.0;
        let geo = eci_to_geodetic(&Vector3::new(r, 0.0, 0.0), j2000());

        // Rotating by GMST moves the point to longitude -GMST, wrapped
        assert_relative_eq!(geo.longitude, 360.0 - 280.46061837, epsilon = 1e-6);
        assert_relative_eq!(geo.latitude, 0.0, epsilon = 1e-12);
        assert_relative_eq!(geo.altitude_km, 500.0, epsilon = 1e-9);
    }

    #[test]
    fn test_pole_is_spherical() {
        let geo = ecef_to_geodetic(&Vector3::new(0.0, 0.0, EARTH_RADIUS_KM + 100.0));
        assert_relative_eq!(geo.latitude, 90.0, epsilon = 1e-12);
        assert_relative_eq!(geo.altitude_km, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_origin_does_not_produce_nan() {
        let geo = ecef_to_geodetic(&Vector3::zeros());
        assert!(geo.latitude.is_finite());
        assert!(geo.longitude.is_finite());
    }
}
