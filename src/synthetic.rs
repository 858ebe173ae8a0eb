//! Deterministic synthetic Starlink-like constellation
//!
//! Used when no live element sets are available. Orbits are circular, the
//! only perturbation is a constant-rate nodal precession, and every satellite
//! is propagated at once with elementwise vector operations. Seeded with a
//! fixed value, so the same instant always yields the same positions.

use std::collections::HashMap;
use std::f64::consts::{PI, TAU};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, TimeZone, Utc};
use nalgebra::DVector;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::propagation::{gmst_radians, GeoPoint, EARTH_RADIUS_KM, MU_EARTH_KM3_S2};

/// One orbital shell of the constellation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shell {
    pub altitude_km: f64,
    pub inclination_deg: f64,
    pub count: usize,
}

pub const STARLINK_SHELLS: [Shell; 5] = [
    Shell { altitude_km: 550.0, inclination_deg: 53.0, count: 1584 },
    Shell { altitude_km: 540.0, inclination_deg: 53.2, count: 1584 },
    Shell { altitude_km: 570.0, inclination_deg: 70.0, count: 720 },
    Shell { altitude_km: 560.0, inclination_deg: 97.6, count: 348 },
    Shell { altitude_km: 336.0, inclination_deg: 42.0, count: 2493 },
];

const PLANES_PER_SHELL: usize = 72;

// Element jitter half-widths
const ALTITUDE_JITTER_KM: f64 = 5.0;
const INCLINATION_JITTER_DEG: f64 = 0.5;
const RAAN_JITTER_RAD: f64 = 0.02;
const ANOMALY_JITTER_RAD: f64 = 0.035;

/// Nodal precession coefficient (degrees per day, scaled by cos i)
const PRECESSION_DEG_PER_DAY: f64 = -0.1;
const MINUTES_PER_DAY: f64 = 1440.0;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub max_satellites: usize,
    pub seed: u64,
    /// Lifetime of the cached current-time positions
    pub cache_ttl: std::time::Duration,
    /// Orbit paths cached before the cache is emptied
    pub path_cache_capacity: usize,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            max_satellites: 2000,
            seed: 42,
            cache_ttl: std::time::Duration::from_secs(1),
            path_cache_capacity: 100,
        }
    }
}

impl SyntheticConfig {
    /// Every satellite of every shell
    pub fn full() -> Self {
        Self {
            max_satellites: usize::MAX,
            ..Self::default()
        }
    }
}

/// Element epoch of the synthetic constellation
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn minutes_since_epoch(at: DateTime<Utc>) -> f64 {
    let delta = at - epoch();
    match delta.num_microseconds() {
        Some(us) => us as f64 / 60e6,
        None => delta.num_milliseconds() as f64 / 60e3,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyntheticPosition {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
    /// Circular orbit speed (km/s)
    pub speed_kms: f64,
}

impl SyntheticPosition {
    pub fn geo_point(&self) -> GeoPoint {
        GeoPoint {
            id: self.id.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            altitude_km: self.altitude_km,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathPoint {
    pub t: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
}

/// Per-satellite elements as parallel columns
struct Elements {
    altitudes: DVector<f64>,
    semi_major_axes: DVector<f64>,
    raans: DVector<f64>,
    mean_anomalies: DVector<f64>,
    /// rad/min
    mean_motions: DVector<f64>,
    /// rad/min
    raan_rates: DVector<f64>,
    cos_inc: DVector<f64>,
    sin_inc: DVector<f64>,
    speeds: DVector<f64>,
}

struct CachedPositions {
    computed: Instant,
    positions: Arc<Vec<SyntheticPosition>>,
}

type PathKey = (String, u32, usize);

pub struct SyntheticConstellation {
    config: SyntheticConfig,
    ids: Vec<String>,
    index: HashMap<String, usize>,
    elements: Elements,
    current: Mutex<Option<CachedPositions>>,
    paths: Mutex<HashMap<PathKey, Arc<Vec<PathPoint>>>>,
}

impl SyntheticConstellation {
    pub fn new(config: SyntheticConfig) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

        let mut ids = Vec::new();
        let mut altitudes = Vec::new();
        let mut inclinations = Vec::new();
        let mut raans = Vec::new();
        let mut anomalies = Vec::new();

        'shells: for shell in &STARLINK_SHELLS {
            let per_plane = shell.count / PLANES_PER_SHELL;

            for plane in 0..PLANES_PER_SHELL {
                let base_raan = TAU / PLANES_PER_SHELL as f64 * plane as f64;

                for slot in 0..per_plane {
                    if ids.len() >= config.max_satellites {
                        break 'shells;
                    }
                    let base_anomaly = TAU / per_plane as f64 * slot as f64;

                    ids.push(format!("STARLINK-{}", ids.len()));
                    altitudes.push(
                        shell.altitude_km + rng.gen_range(-ALTITUDE_JITTER_KM..ALTITUDE_JITTER_KM),
                    );
                    inclinations.push(
                        (shell.inclination_deg
                            + rng.gen_range(-INCLINATION_JITTER_DEG..INCLINATION_JITTER_DEG))
                        .to_radians(),
                    );
                    raans.push(base_raan + rng.gen_range(-RAAN_JITTER_RAD..RAAN_JITTER_RAD));
                    anomalies
                        .push(base_anomaly + rng.gen_range(-ANOMALY_JITTER_RAD..ANOMALY_JITTER_RAD));
                }
            }
        }

        let altitudes = DVector::from_vec(altitudes);
        let inclinations = DVector::from_vec(inclinations);
        let semi_major_axes = altitudes.add_scalar(EARTH_RADIUS_KM);

        let elements = Elements {
            // n = 2π / (T / 60) with T = 2π·sqrt(a³/μ) seconds
            mean_motions: semi_major_axes.map(|a| 60.0 * (MU_EARTH_KM3_S2 / a.powi(3)).sqrt()),
            speeds: semi_major_axes.map(|a| (MU_EARTH_KM3_S2 / a).sqrt()),
            raan_rates: inclinations
                .map(|i| PRECESSION_DEG_PER_DAY * i.cos() * (PI / 180.0) / MINUTES_PER_DAY),
            cos_inc: inclinations.map(f64::cos),
            sin_inc: inclinations.map(f64::sin),
            raans: DVector::from_vec(raans),
            mean_anomalies: DVector::from_vec(anomalies),
            semi_major_axes,
            altitudes,
        };

        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        log::info!("Generated synthetic constellation of {} satellites", ids.len());

        Self {
            config,
            ids,
            index,
            elements,
            current: Mutex::new(None),
            paths: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Positions of every satellite at `at`
    pub fn positions_at(&self, at: DateTime<Utc>) -> Vec<SyntheticPosition> {
        let e = &self.elements;
        let t = minutes_since_epoch(at);

        let anomaly = (&e.mean_anomalies + &e.mean_motions * t).map(|m| m.rem_euclid(TAU));
        let raan = (&e.raans + &e.raan_rates * t).map(|o| o.rem_euclid(TAU));
        let (cos_raan, sin_raan) = (raan.map(f64::cos), raan.map(f64::sin));

        let r = &e.semi_major_axes;
        let x_orb = r.component_mul(&anomaly.map(f64::cos));
        let y_orb = r.component_mul(&anomaly.map(f64::sin));

        let y_inc = y_orb.component_mul(&e.cos_inc);
        let x = x_orb.component_mul(&cos_raan) - y_inc.component_mul(&sin_raan);
        let y = x_orb.component_mul(&sin_raan) + y_inc.component_mul(&cos_raan);
        let z = y_orb.component_mul(&e.sin_inc);

        let gmst = gmst_radians(at);
        let (cos_g, sin_g) = (gmst.cos(), gmst.sin());
        let x_ecef = &x * cos_g + &y * sin_g;
        let y_ecef = &y * cos_g - &x * sin_g;

        let longitude = y_ecef.zip_map(&x_ecef, |y, x| y.atan2(x).to_degrees());
        let latitude = z.zip_map(r, |z, r| (z / r).clamp(-1.0, 1.0).asin().to_degrees());

        self.ids
            .iter()
            .enumerate()
            .map(|(i, id)| SyntheticPosition {
                id: id.clone(),
                latitude: latitude[i],
                longitude: longitude[i],
                altitude_km: e.altitudes[i],
                speed_kms: e.speeds[i],
            })
            .collect()
    }

    /// Current positions, recomputed at most once per cache lifetime
    pub fn all_positions(&self) -> Arc<Vec<SyntheticPosition>> {
        if let Some(cached) = self.current.lock().as_ref() {
            if cached.computed.elapsed() < self.config.cache_ttl {
                return cached.positions.clone();
            }
        }

        // Concurrent callers may both recompute; either result is valid
        let positions = Arc::new(self.positions_at(Utc::now()));
        *self.current.lock() = Some(CachedPositions {
            computed: Instant::now(),
            positions: positions.clone(),
        });
        positions
    }

    pub fn position(&self, id: &str) -> Option<SyntheticPosition> {
        let idx = *self.index.get(id)?;
        self.all_positions().get(idx).cloned()
    }

    /// Ground track of one satellite starting now, `steps` points over `hours`
    pub fn orbit_path(&self, id: &str, hours: u32, steps: usize) -> Option<Arc<Vec<PathPoint>>> {
        let key = (id.to_string(), hours, steps);
        if let Some(path) = self.paths.lock().get(&key) {
            return Some(path.clone());
        }

        let path = Arc::new(self.orbit_path_from(id, hours, steps, Utc::now())?);

        let mut paths = self.paths.lock();
        if paths.len() >= self.config.path_cache_capacity {
            log::debug!("Orbit path cache full, clearing {} entries", paths.len());
            paths.clear();
        }
        paths.insert(key, path.clone());
        Some(path)
    }

    /// Uncached ground track from a fixed start
    pub fn orbit_path_from(
        &self,
        id: &str,
        hours: u32,
        steps: usize,
        start: DateTime<Utc>,
    ) -> Option<Vec<PathPoint>> {
        let idx = *self.index.get(id)?;
        let span_ms = i64::from(hours) * 3_600_000;

        let path = (0..steps)
            .map(|i| {
                let t = start + Duration::milliseconds(span_ms * i as i64 / steps as i64);
                let (latitude, longitude) = self.ground_point(idx, t);
                PathPoint {
                    t,
                    latitude,
                    longitude,
                    altitude_km: self.elements.altitudes[idx],
                }
            })
            .collect();
        Some(path)
    }

    /// Latitude and longitude of one satellite, in degrees
    fn ground_point(&self, idx: usize, at: DateTime<Utc>) -> (f64, f64) {
        let e = &self.elements;
        let t = minutes_since_epoch(at);

        let anomaly = (e.mean_anomalies[idx] + e.mean_motions[idx] * t).rem_euclid(TAU);
        let raan = (e.raans[idx] + e.raan_rates[idx] * t).rem_euclid(TAU);
        let r = e.semi_major_axes[idx];

        let x_orb = r * anomaly.cos();
        let y_orb = r * anomaly.sin();
        let y_inc = y_orb * e.cos_inc[idx];
        let x = x_orb * raan.cos() - y_inc * raan.sin();
        let y = x_orb * raan.sin() + y_inc * raan.cos();
        let z = y_orb * e.sin_inc[idx];

        let gmst = gmst_radians(at);
        let x_ecef = x * gmst.cos() + y * gmst.sin();
        let y_ecef = y * gmst.cos() - x * gmst.sin();

        (
            (z / r).clamp(-1.0, 1.0).asin().to_degrees(),
            y_ecef.atan2(x_ecef).to_degrees(),
        )
    }
}

impl Default for SyntheticConstellation {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_default_population() {
        let c = SyntheticConstellation::default();
        assert_eq!(c.len(), 2000);
        assert_eq!(c.ids()[0], "STARLINK-0");
        assert_eq!(c.ids()[1999], "STARLINK-1999");

        // 22 per plane fills the first shell, the rest come from the second
        let positions = c.positions_at(at());
        assert!(positions[..1584]
            .iter()
            .all(|p| (545.0..555.0).contains(&p.altitude_km)));
        assert!(positions[1584..]
            .iter()
            .all(|p| (535.0..545.0).contains(&p.altitude_km)));
    }

    #[test]
    fn test_full_population() {
        let c = SyntheticConstellation::new(SyntheticConfig::full());
        // 22 + 22 + 10 + 4 + 34 satellites per plane over 72 planes
        assert_eq!(c.len(), 92 * 72);
    }

    #[test]
    fn test_positions_are_deterministic() {
        let a = SyntheticConstellation::default().positions_at(at());
        let b = SyntheticConstellation::default().positions_at(at());
        assert_eq!(a, b);

        let other_seed = SyntheticConstellation::new(SyntheticConfig {
            seed: 7,
            ..SyntheticConfig::default()
        })
        .positions_at(at());
        assert_ne!(a, other_seed);
    }

    #[test]
    fn test_positions_are_physical() {
        let c = SyntheticConstellation::default();
        for p in c.positions_at(at()) {
            assert!(p.latitude.abs() <= 54.0, "{} at {}", p.id, p.latitude);
            assert!((-180.0..=180.0).contains(&p.longitude));
            assert!(p.speed_kms > 7.5 && p.speed_kms < 7.7);
        }
    }

    #[test]
    fn test_path_matches_vectorized_positions() {
        let c = SyntheticConstellation::default();
        let start = at();
        let snapshot = c.positions_at(start);

        let path = c.orbit_path_from("STARLINK-1234", 2, 100, start).unwrap();
        assert_eq!(path.len(), 100);
        assert_eq!(path[0].t, start);
        assert_eq!(path[1].t, start + Duration::seconds(72));

        let expected = &snapshot[1234];
        assert_relative_eq!(path[0].latitude, expected.latitude, epsilon = 1e-9);
        assert_relative_eq!(path[0].longitude, expected.longitude, epsilon = 1e-9);
        assert_eq!(path[0].altitude_km, expected.altitude_km);
    }

    #[test]
    fn test_unknown_satellite_has_no_path() {
        let c = SyntheticConstellation::default();
        assert!(c.orbit_path("STARLINK-99999", 2, 100).is_none());
        assert!(c.position("ISS").is_none());
    }

    #[test]
    fn test_path_cache_is_bounded() {
        let c = SyntheticConstellation::new(SyntheticConfig {
            max_satellites: 10,
            path_cache_capacity: 3,
            ..SyntheticConfig::default()
        });

        let first = c.orbit_path("STARLINK-0", 1, 10).unwrap();
        let again = c.orbit_path("STARLINK-0", 1, 10).unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        c.orbit_path("STARLINK-1", 1, 10).unwrap();
        c.orbit_path("STARLINK-2", 1, 10).unwrap();
        c.orbit_path("STARLINK-3", 1, 10).unwrap();
        assert_eq!(c.paths.lock().len(), 1);
    }

    #[test]
    fn test_current_positions_are_cached() {
        let c = SyntheticConstellation::default();
        let first = c.all_positions();
        let second = c.all_positions();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(c.position("STARLINK-5").unwrap().id, "STARLINK-5");
    }
}
