//! Per-shell constellation health over a position snapshot

use serde::Serialize;

use super::density::{round2, DensityGrid};

/// Below this altitude an object is taken to be decaying (km)
pub const DECAY_ALTITUDE_KM: f64 = 300.0;
/// Above this altitude an object is taken to be raising to its shell (km)
pub const RAISING_ALTITUDE_KM: f64 = 700.0;

const MAX_ANOMALIES: usize = 20;

/// A nominal orbital shell: objects within `tolerance_km` of its altitude belong to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShellSpec {
    pub name: String,
    pub altitude_km: f64,
    pub inclination_deg: f64,
    pub tolerance_km: f64,
}

impl ShellSpec {
    pub fn new(name: impl Into<String>, altitude_km: f64, inclination_deg: f64, tolerance_km: f64) -> Self {
        Self {
            name: name.into(),
            altitude_km,
            inclination_deg,
            tolerance_km,
        }
    }

    /// Approximate Starlink shells
    pub fn starlink() -> Vec<ShellSpec> {
        vec![
            ShellSpec::new("Shell 1 (V1.0)", 550.0, 53.0, 30.0),
            ShellSpec::new("Shell 2 (V1.5)", 540.0, 53.2, 20.0),
            ShellSpec::new("Shell 3 (Polar)", 560.0, 97.6, 20.0),
            ShellSpec::new("Shell 4 (V2 Mini)", 525.0, 43.0, 25.0),
            ShellSpec::new("Shell 5 (V2 Mini)", 530.0, 33.0, 25.0),
        ]
    }

    pub fn contains(&self, altitude_km: f64) -> bool {
        (altitude_km - self.altitude_km).abs() <= self.tolerance_km
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShellHealth {
    pub shell: String,
    pub target_altitude_km: f64,
    pub target_inclination_deg: f64,
    pub satellite_count: usize,
    pub avg_altitude_km: f64,
    pub altitude_std_km: f64,
    /// 100 minus twice the altitude spread, clamped to [0, 100]
    pub health_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnomalyStatus {
    Decaying,
    Raising,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    High,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
    pub satellite_id: String,
    pub name: Option<String>,
    pub altitude_km: f64,
    pub status: AnomalyStatus,
    pub urgency: Urgency,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstellationHealth {
    pub total_tracked: usize,
    /// Objects inside at least one shell
    pub total_operational: usize,
    pub operational_percentage: f64,
    pub shells: Vec<ShellHealth>,
    /// Up to twenty, snapshot order
    pub anomalies: Vec<Anomaly>,
    pub anomaly_count: usize,
}

impl ConstellationHealth {
    /// Fill in anomaly names from a catalog lookup
    pub fn with_names(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        for anomaly in &mut self.anomalies {
            anomaly.name = lookup(&anomaly.satellite_id);
        }
        self
    }
}

fn classify(altitude_km: f64) -> Option<(AnomalyStatus, Urgency)> {
    if altitude_km < DECAY_ALTITUDE_KM {
        Some((AnomalyStatus::Decaying, Urgency::High))
    } else if altitude_km > RAISING_ALTITUDE_KM {
        Some((AnomalyStatus::Raising, Urgency::Low))
    } else {
        None
    }
}

impl DensityGrid {
    /// Occupancy and altitude spread of each shell, plus out-of-shell anomalies
    pub fn constellation_health(&self, shells: &[ShellSpec]) -> ConstellationHealth {
        let points = self.points();

        let shell_stats = shells
            .iter()
            .map(|shell| {
                let altitudes: Vec<f64> = points
                    .iter()
                    .map(|p| p.altitude_km)
                    .filter(|&alt| shell.contains(alt))
                    .collect();

                let count = altitudes.len();
                let (mean, std) = if count > 0 {
                    let n = count as f64;
                    let mean = altitudes.iter().sum::<f64>() / n;
                    let variance = altitudes.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
                    (mean, variance.sqrt())
                } else {
                    (0.0, 0.0)
                };

                ShellHealth {
                    shell: shell.name.clone(),
                    target_altitude_km: shell.altitude_km,
                    target_inclination_deg: shell.inclination_deg,
                    satellite_count: count,
                    avg_altitude_km: round2(mean),
                    altitude_std_km: round2(std),
                    health_score: round2((100.0 - std * 2.0).clamp(0.0, 100.0)),
                }
            })
            .collect();

        let total_operational = points
            .iter()
            .filter(|p| shells.iter().any(|s| s.contains(p.altitude_km)))
            .count();

        let mut anomalies: Vec<Anomaly> = points
            .iter()
            .filter_map(|p| {
                classify(p.altitude_km).map(|(status, urgency)| Anomaly {
                    satellite_id: p.id.clone(),
                    name: None,
                    altitude_km: round2(p.altitude_km),
                    status,
                    urgency,
                })
            })
            .collect();
        let anomaly_count = anomalies.len();
        anomalies.truncate(MAX_ANOMALIES);

        let operational_percentage = if points.is_empty() {
            0.0
        } else {
            (total_operational as f64 / points.len() as f64 * 1000.0).round() / 10.0
        };

        ConstellationHealth {
            total_tracked: points.len(),
            total_operational,
            operational_percentage,
            shells: shell_stats,
            anomalies,
            anomaly_count,
        }
    }
}
