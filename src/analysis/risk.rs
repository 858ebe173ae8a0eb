//! Pairwise close-approach search and risk scoring
//!
//! Brute-force fixed-step scans over a bounded window. Neighbor prefiltering
//! by altitude keeps the pairwise work to a handful of candidates.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::data::{ConjunctionAssessment, ObjectRef};
use crate::propagation::{PropagationError, PropagationService};

/// Miss distance at or below which a pair scores 1.0 (km)
pub const COLLISION_THRESHOLD_KM: f64 = 10.0;
/// Upper bound of the warning band (km)
pub const WARNING_THRESHOLD_KM: f64 = 50.0;
/// Upper bound of the monitoring band (km)
pub const MONITOR_THRESHOLD_KM: f64 = 100.0;

/// Pairs closer than this are reported by the proximity sweep (km)
pub const PROXIMITY_ALERT_KM: f64 = 50.0;

/// Objects considered by the proximity sweep, snapshot order
const SWEEP_POOL: usize = 500;
/// Objects of the pool compared against their successors
const SWEEP_TARGETS: usize = 100;
/// Successors each target is compared against
const SWEEP_SPAN: usize = 49;
const MAX_SWEEP_ALERTS: usize = 100;

/// Combined hard-body radius of the probability placeholder (km)
const COMBINED_RADIUS_KM: f64 = 0.01;
const MIN_DISTANCE_FLOOR_KM: f64 = 0.001;

/// Tuning for risk scans
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Altitude band for neighbor prefiltering (km)
    pub altitude_band_km: f64,
    /// Neighbors analyzed per target
    pub max_neighbors: usize,
    /// Horizon cap applied to per-target analysis (hours)
    pub target_horizon_cap_hours: u32,
    /// Risks at or below this score are left out of target reports
    pub min_reported_score: f64,
    /// Risks kept in a target report
    pub max_reported: usize,
    /// Longest scan window accepted (hours)
    pub max_hours_ahead: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            altitude_band_km: 500.0,
            max_neighbors: 20,
            target_horizon_cap_hours: 24,
            min_reported_score: 0.1,
            max_reported: 10,
            max_hours_ahead: 168,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Propagation(#[from] PropagationError),

    #[error("scan of {hours_ahead} h at {step_seconds} s steps is outside 1..={max_hours} h")]
    InvalidWindow {
        hours_ahead: u32,
        step_seconds: u32,
        max_hours: u32,
    },

    #[error("no instant in the window propagated for both {id_a} and {id_b}")]
    NoValidSamples { id_a: String, id_b: String },

    #[error("sweep needs a minimum risk in [0, 1] and a limit in 1..={MAX_SWEEP_ALERTS}, got {min_risk} and {limit}")]
    InvalidSweep { min_risk: f64, limit: usize },
}

/// Piecewise-linear risk score of a miss distance (km), in [0, 1]
pub fn risk_score(distance_km: f64) -> f64 {
    if distance_km <= COLLISION_THRESHOLD_KM {
        1.0
    } else if distance_km <= WARNING_THRESHOLD_KM {
        0.7 + 0.3
            * (1.0
                - (distance_km - COLLISION_THRESHOLD_KM)
                    / (WARNING_THRESHOLD_KM - COLLISION_THRESHOLD_KM))
    } else if distance_km <= MONITOR_THRESHOLD_KM {
        0.3 + 0.4
            * (1.0
                - (distance_km - WARNING_THRESHOLD_KM)
                    / (MONITOR_THRESHOLD_KM - WARNING_THRESHOLD_KM))
    } else {
        (0.3 * (1.0 - (distance_km - MONITOR_THRESHOLD_KM) / 500.0)).max(0.0)
    }
}

/// Crude collision probability from miss distance alone
///
/// Not a physical Pc: there is no covariance. Kept as a placeholder ranking value.
pub fn probability_estimate(min_distance_km: f64) -> f64 {
    (COMBINED_RADIUS_KM / min_distance_km.max(MIN_DISTANCE_FLOOR_KM))
        .powi(2)
        .clamp(0.0, 1.0)
}

/// Closest approach found by a minute-resolution scan, with its score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub id_a: String,
    pub id_b: String,
    pub min_distance_km: f64,
    pub tca: DateTime<Utc>,
    pub risk_score: f64,
}

/// Time of closest approach estimate for a pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TcaEstimate {
    pub object_a: ObjectRef,
    pub object_b: ObjectRef,
    pub tca: DateTime<Utc>,
    pub min_range_km: f64,
    /// Relative speed at the scan start, not at TCA (km/s)
    pub relative_velocity_kms: f64,
    pub probability_estimate: f64,
    pub calculation_method: &'static str,
}

impl TcaEstimate {
    /// Package the estimate as a conjunction assessment
    ///
    /// Emergency when the estimate exceeds 1e-4 or the miss is under 1 km.
    pub fn into_assessment(self) -> ConjunctionAssessment {
        let emergency = self.probability_estimate > 1e-4 || self.min_range_km < 1.0;
        ConjunctionAssessment {
            id: format!(
                "{}-{}-{}",
                self.object_a.id,
                self.object_b.id,
                self.tca.timestamp()
            ),
            created: Some(Utc::now()),
            object_a: self.object_a,
            object_b: self.object_b,
            tca: self.tca,
            miss_distance_km: self.min_range_km,
            probability: self.probability_estimate,
            relative_speed_kms: Some(self.relative_velocity_kms),
            emergency,
        }
    }
}

/// Risk of one object against its altitude neighbors
#[derive(Debug, Clone, Serialize)]
pub struct TargetRiskReport {
    pub target_id: String,
    pub name: Option<String>,
    pub altitude_km: f64,
    pub nearby_count: usize,
    pub analyzed_count: usize,
    pub hours_ahead: u32,
    pub risks: Vec<RiskAssessment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProximitySeverity {
    High,
    Medium,
    Low,
}

impl ProximitySeverity {
    pub fn of(risk_score: f64) -> Self {
        if risk_score > 0.7 {
            ProximitySeverity::High
        } else if risk_score > 0.4 {
            ProximitySeverity::Medium
        } else {
            ProximitySeverity::Low
        }
    }
}

/// A pair found closer than [`PROXIMITY_ALERT_KM`] at one instant
#[derive(Debug, Clone, Serialize)]
pub struct ProximityAlert {
    pub object_a: ObjectRef,
    pub object_b: ObjectRef,
    pub distance_km: f64,
    /// `1 - distance / 50 km`
    pub risk_score: f64,
    pub severity: ProximitySeverity,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProximityReport {
    pub timestamp: DateTime<Utc>,
    pub alert_count: usize,
    pub min_risk_threshold: f64,
    pub alerts: Vec<ProximityAlert>,
}

#[derive(Debug, Clone, Copy)]
struct ClosestApproach {
    distance_km: f64,
    at: DateTime<Utc>,
}

/// Searches time windows for minimum pairwise separation
pub struct RiskAnalyzer {
    service: Arc<PropagationService>,
    config: RiskConfig,
}

impl RiskAnalyzer {
    pub fn new(service: Arc<PropagationService>) -> Self {
        Self::with_config(service, RiskConfig::default())
    }

    pub fn with_config(service: Arc<PropagationService>, config: RiskConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Objects whose current altitude is within `altitude_band_km` of the target
    pub fn find_neighbors(
        &self,
        target_id: &str,
        altitude_band_km: f64,
    ) -> Result<Vec<String>, PropagationError> {
        self.find_neighbors_at(target_id, altitude_band_km, Utc::now())
    }

    /// Neighbors at a given instant, ordered by catalog id
    pub fn find_neighbors_at(
        &self,
        target_id: &str,
        altitude_band_km: f64,
        at: DateTime<Utc>,
    ) -> Result<Vec<String>, PropagationError> {
        let target_alt = self.service.propagate(target_id, at)?.altitude_km();

        Ok(self
            .service
            .snapshot(at)
            .into_iter()
            .filter(|s| s.object_id != target_id)
            .filter(|s| (s.altitude_km() - target_alt).abs() < altitude_band_km)
            .map(|s| s.object_id)
            .collect())
    }

    /// Minimum separation over the next `hours_ahead` hours at one-minute resolution
    pub fn calculate_risk(
        &self,
        id_a: &str,
        id_b: &str,
        hours_ahead: u32,
    ) -> Result<RiskAssessment, AnalysisError> {
        self.calculate_risk_at(id_a, id_b, hours_ahead, Utc::now())
    }

    pub fn calculate_risk_at(
        &self,
        id_a: &str,
        id_b: &str,
        hours_ahead: u32,
        start: DateTime<Utc>,
    ) -> Result<RiskAssessment, AnalysisError> {
        let closest = self.closest_approach(id_a, id_b, start, hours_ahead, 60)?;
        Ok(RiskAssessment {
            id_a: id_a.to_string(),
            id_b: id_b.to_string(),
            min_distance_km: closest.distance_km,
            tca: closest.at,
            risk_score: risk_score(closest.distance_km),
        })
    }

    /// Closest approach at `step_seconds` resolution with a probability estimate
    pub fn calculate_tca(
        &self,
        id_a: &str,
        id_b: &str,
        hours_ahead: u32,
        step_seconds: u32,
    ) -> Result<TcaEstimate, AnalysisError> {
        self.calculate_tca_at(id_a, id_b, hours_ahead, step_seconds, Utc::now())
    }

    pub fn calculate_tca_at(
        &self,
        id_a: &str,
        id_b: &str,
        hours_ahead: u32,
        step_seconds: u32,
        start: DateTime<Utc>,
    ) -> Result<TcaEstimate, AnalysisError> {
        let closest = self.closest_approach(id_a, id_b, start, hours_ahead, step_seconds)?;

        let state_a = self.service.propagate(id_a, start)?;
        let state_b = self.service.propagate(id_b, start)?;

        Ok(TcaEstimate {
            object_a: ObjectRef::new(id_a).with_name(self.service.name(id_a)),
            object_b: ObjectRef::new(id_b).with_name(self.service.name(id_b)),
            tca: closest.at,
            min_range_km: closest.distance_km,
            relative_velocity_kms: state_a.relative_speed(&state_b),
            probability_estimate: probability_estimate(closest.distance_km),
            calculation_method: "sgp4_propagation",
        })
    }

    /// Score a target against its nearest altitude neighbors
    pub fn analyze_target(
        &self,
        target_id: &str,
        hours_ahead: u32,
    ) -> Result<TargetRiskReport, AnalysisError> {
        self.analyze_target_with(target_id, hours_ahead, Utc::now(), |_| {})
    }

    /// [`analyze_target`](Self::analyze_target) at a fixed start, reporting each analyzed neighbor
    pub fn analyze_target_with(
        &self,
        target_id: &str,
        hours_ahead: u32,
        start: DateTime<Utc>,
        mut on_neighbor: impl FnMut(&str),
    ) -> Result<TargetRiskReport, AnalysisError> {
        self.check_window(hours_ahead, 60)?;
        let target = self.service.propagate(target_id, start)?;
        let nearby = self.find_neighbors_at(target_id, self.config.altitude_band_km, start)?;
        let horizon = hours_ahead.min(self.config.target_horizon_cap_hours);

        let analyzed: Vec<&String> = nearby.iter().take(self.config.max_neighbors).collect();

        let mut risks = Vec::new();
        for other_id in &analyzed {
            on_neighbor(other_id);
            match self.calculate_risk_at(target_id, other_id, horizon, start) {
                Ok(risk) if risk.risk_score > self.config.min_reported_score => risks.push(risk),
                Ok(_) => {}
                Err(e) => log::debug!("Skipping pair {}/{}: {}", target_id, other_id, e),
            }
        }

        risks.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
        risks.truncate(self.config.max_reported);

        Ok(TargetRiskReport {
            target_id: target_id.to_string(),
            name: self.service.name(target_id),
            altitude_km: target.altitude_km(),
            nearby_count: nearby.len(),
            analyzed_count: analyzed.len(),
            hours_ahead,
            risks,
        })
    }

    /// Instantaneous close pairs across the catalog
    pub fn proximity_sweep(&self, min_risk: f64, limit: usize) -> Result<ProximityReport, AnalysisError> {
        self.proximity_sweep_at(Utc::now(), min_risk, limit)
    }

    /// Compare each of the first hundred objects (by id) with the next 49
    ///
    /// Stops once `limit` alerts are collected; the result is sorted by
    /// descending risk.
    pub fn proximity_sweep_at(
        &self,
        at: DateTime<Utc>,
        min_risk: f64,
        limit: usize,
    ) -> Result<ProximityReport, AnalysisError> {
        if !(0.0..=1.0).contains(&min_risk) || !(1..=MAX_SWEEP_ALERTS).contains(&limit) {
            return Err(AnalysisError::InvalidSweep { min_risk, limit });
        }

        let mut pool = self.service.snapshot(at);
        pool.truncate(SWEEP_POOL);

        let mut alerts = Vec::new();
        for (i, state) in pool.iter().enumerate().take(SWEEP_TARGETS) {
            for other in pool.iter().skip(i + 1).take(SWEEP_SPAN) {
                let distance_km = state.distance_to(other);
                if distance_km >= PROXIMITY_ALERT_KM {
                    continue;
                }

                let risk_score = (1.0 - distance_km / PROXIMITY_ALERT_KM).clamp(0.0, 1.0);
                if risk_score >= min_risk {
                    alerts.push(ProximityAlert {
                        object_a: ObjectRef::new(state.object_id.as_str())
                            .with_name(self.service.name(&state.object_id)),
                        object_b: ObjectRef::new(other.object_id.as_str())
                            .with_name(self.service.name(&other.object_id)),
                        distance_km,
                        risk_score,
                        severity: ProximitySeverity::of(risk_score),
                    });
                }
            }
            if alerts.len() >= limit {
                break;
            }
        }

        log::debug!("Proximity sweep over {} objects: {} alerts", pool.len(), alerts.len());
        let alert_count = alerts.len();
        alerts.sort_by(|a, b| b.risk_score.total_cmp(&a.risk_score));
        alerts.truncate(limit);

        Ok(ProximityReport {
            timestamp: at,
            alert_count,
            min_risk_threshold: min_risk,
            alerts,
        })
    }

    fn check_window(&self, hours_ahead: u32, step_seconds: u32) -> Result<(), AnalysisError> {
        if hours_ahead == 0 || hours_ahead > self.config.max_hours_ahead || step_seconds == 0 {
            return Err(AnalysisError::InvalidWindow {
                hours_ahead,
                step_seconds,
                max_hours: self.config.max_hours_ahead,
            });
        }
        Ok(())
    }

    fn closest_approach(
        &self,
        id_a: &str,
        id_b: &str,
        start: DateTime<Utc>,
        hours_ahead: u32,
        step_seconds: u32,
    ) -> Result<ClosestApproach, AnalysisError> {
        self.check_window(hours_ahead, step_seconds)?;

        let set_a = self
            .service
            .element(id_a)
            .ok_or_else(|| PropagationError::UnknownObject(id_a.to_string()))?;
        let set_b = self
            .service
            .element(id_b)
            .ok_or_else(|| PropagationError::UnknownObject(id_b.to_string()))?;

        let steps = hours_ahead as i64 * 3600 / step_seconds as i64;
        let mut best: Option<ClosestApproach> = None;

        for i in 0..=steps {
            let at = start + Duration::seconds(i * step_seconds as i64);
            let (Ok((pos_a, _)), Ok((pos_b, _))) = (set_a.inertial_at(at), set_b.inertial_at(at))
            else {
                continue;
            };

            let distance_km = (pos_a - pos_b).norm();
            // Strict comparison: the first instant reaching the minimum wins
            if best.map_or(true, |b| distance_km < b.distance_km) {
                best = Some(ClosestApproach { distance_km, at });
            }
        }

        best.ok_or_else(|| AnalysisError::NoValidSamples {
            id_a: id_a.to_string(),
            id_b: id_b.to_string(),
        })
    }
}
