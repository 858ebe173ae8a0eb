//! Ground station visibility and pass prediction
//!
//! Elevation is computed over the same spherical Earth as the geodetic
//! conversion, without refraction or terrain masks.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::AnalysisError;
use crate::propagation::{GeoPoint, PropagationError, PropagationService, EARTH_RADIUS_KM};

/// Passes returned per prediction
const MAX_PASSES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroundStation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Lowest elevation at which the station can track (degrees)
    pub min_elevation_deg: f64,
}

impl GroundStation {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, min_elevation_deg: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            min_elevation_deg,
        }
    }

    /// Polar and mid-latitude tracking sites
    pub fn defaults() -> Vec<GroundStation> {
        vec![
            GroundStation::new("Svalbard (SvalSat)", 78.23, 15.39, 5.0),
            GroundStation::new("Alaska (Fairbanks)", 64.86, -147.85, 5.0),
            GroundStation::new("McMurdo (Antarctica)", -77.85, 166.67, 5.0),
            GroundStation::new("Punta Arenas", -53.16, -70.91, 5.0),
            GroundStation::new("Hawaii (AMOS)", 20.71, -156.26, 10.0),
            GroundStation::new("Guam", 13.44, 144.79, 10.0),
            GroundStation::new("Cape Canaveral", 28.49, -80.58, 10.0),
            GroundStation::new("Vandenberg", 34.74, -120.52, 10.0),
        ]
    }

    pub fn find<'a>(stations: &'a [GroundStation], name: &str) -> Option<&'a GroundStation> {
        stations.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    /// Elevation of a point above this station's horizon (degrees)
    ///
    /// Negative below the horizon; 90 directly overhead.
    pub fn elevation_deg(&self, latitude: f64, longitude: f64, altitude_km: f64) -> f64 {
        let (lat1, lon1) = (self.latitude.to_radians(), self.longitude.to_radians());
        let (lat2, lon2) = (latitude.to_radians(), longitude.to_radians());

        // Central angle between station and sub-satellite point (haversine)
        let a = ((lat2 - lat1) / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * ((lon2 - lon1) / 2.0).sin().powi(2);
        let gamma = 2.0 * a.sqrt().min(1.0).asin();

        let r = EARTH_RADIUS_KM + altitude_km;
        (r * gamma.cos() - EARTH_RADIUS_KM)
            .atan2(r * gamma.sin())
            .to_degrees()
    }

    pub fn sees(&self, point: &GeoPoint) -> Option<f64> {
        let elevation = self.elevation_deg(point.latitude, point.longitude, point.altitude_km);
        (elevation >= self.min_elevation_deg).then_some(elevation)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VisibleStation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation_deg: f64,
}

/// Stations that currently have `point` above their minimum elevation
pub fn visible_stations(point: &GeoPoint, stations: &[GroundStation]) -> Vec<VisibleStation> {
    stations
        .iter()
        .filter_map(|station| {
            station.sees(point).map(|elevation| VisibleStation {
                name: station.name.clone(),
                latitude: station.latitude,
                longitude: station.longitude,
                elevation_deg: (elevation * 100.0).round() / 100.0,
            })
        })
        .collect()
}

/// One contact: acquisition to loss of signal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pass {
    pub aos: DateTime<Utc>,
    pub los: DateTime<Utc>,
    pub duration_minutes: i64,
    pub max_elevation_deg: f64,
}

/// Finds contacts between one object and a ground station
pub struct PassPredictor {
    service: Arc<PropagationService>,
    max_hours_ahead: u32,
}

impl PassPredictor {
    pub fn new(service: Arc<PropagationService>) -> Self {
        Self {
            service,
            max_hours_ahead: 168,
        }
    }

    pub fn next_passes(
        &self,
        id: &str,
        station: &GroundStation,
        hours_ahead: u32,
        step_minutes: u32,
    ) -> Result<Vec<Pass>, AnalysisError> {
        self.next_passes_from(id, station, hours_ahead, step_minutes, Utc::now())
    }

    /// Up to ten passes completed within the window
    ///
    /// A pass still in progress when the window ends is not reported.
    pub fn next_passes_from(
        &self,
        id: &str,
        station: &GroundStation,
        hours_ahead: u32,
        step_minutes: u32,
        start: DateTime<Utc>,
    ) -> Result<Vec<Pass>, AnalysisError> {
        if hours_ahead == 0 || hours_ahead > self.max_hours_ahead || step_minutes == 0 {
            return Err(AnalysisError::InvalidWindow {
                hours_ahead,
                step_seconds: step_minutes.saturating_mul(60),
                max_hours: self.max_hours_ahead,
            });
        }

        let element = self
            .service
            .element(id)
            .ok_or_else(|| PropagationError::UnknownObject(id.to_string()))?;

        let steps = hours_ahead * 60 / step_minutes;
        let mut passes = Vec::new();
        let mut open: Option<(DateTime<Utc>, f64)> = None;

        for i in 0..steps {
            let at = start + Duration::minutes(i64::from(i * step_minutes));
            let Ok(state) = element.state_at(at) else {
                continue;
            };

            let elevation = station.elevation_deg(
                state.geodetic.latitude,
                state.geodetic.longitude,
                state.geodetic.altitude_km,
            );

            match (open, elevation >= station.min_elevation_deg) {
                (None, true) => open = Some((at, elevation)),
                (Some((aos, peak)), true) => open = Some((aos, peak.max(elevation))),
                (Some((aos, peak)), false) => {
                    passes.push(Pass {
                        aos,
                        los: at,
                        duration_minutes: (at - aos).num_minutes(),
                        max_elevation_deg: (peak * 100.0).round() / 100.0,
                    });
                    open = None;
                    if passes.len() == MAX_PASSES {
                        break;
                    }
                }
                (None, false) => {}
            }
        }

        log::debug!("{} passes of {} over {}", passes.len(), id, station.name);
        Ok(passes)
    }
}
