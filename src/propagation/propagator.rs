//! SGP4 propagation service using satkit

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use nalgebra::Vector3;
use parking_lot::RwLock;
use satkit::sgp4::sgp4;
use serde::Serialize;
use thiserror::Error;

use super::geodetic::eci_to_geodetic;
use super::state::StateVector;
use crate::data::{validate_lines, ElementParseError, ElementRecord, ElementSource, SourceError};
use crate::scheduler::{ScheduleError, ScheduledTask};

/// Failure to produce a state vector
///
/// Both lookup variants are "not found" for callers: the object is unknown, or
/// SGP4 gave no usable state at that instant. Neither invalidates stored data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PropagationError {
    #[error("unknown object {0}")]
    UnknownObject(String),

    #[error("SGP4 gave no state for {id} at {at}: {reason}")]
    NumericalFailure {
        id: String,
        at: DateTime<Utc>,
        reason: String,
    },

    #[error("series step must be positive")]
    InvalidStep,
}

impl PropagationError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::UnknownObject(_) | Self::NumericalFailure { .. }
        )
    }
}

/// Convert a UTC timestamp into a satkit instant
pub fn to_instant(at: DateTime<Utc>) -> Option<satkit::Instant> {
    let seconds = at.second() as f64 + at.nanosecond() as f64 / 1e9;
    satkit::Instant::from_datetime(
        at.year(),
        at.month() as i32,
        at.day() as i32,
        at.hour() as i32,
        at.minute() as i32,
        seconds,
    )
    .ok()
}

/// Convert a satkit instant back into a UTC timestamp (microsecond resolution)
pub fn from_instant(instant: &satkit::Instant) -> Option<DateTime<Utc>> {
    let (year, month, day, hour, minute, second) = instant.as_datetime();
    let midnight = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?
        .and_hms_opt(hour as u32, minute as u32, 0)?;
    let micros = (second as f64 * 1e6).round() as i64;
    Some(midnight.and_utc() + Duration::microseconds(micros))
}

/// A parsed element set owned by the propagation service
#[derive(Clone)]
pub struct ElementSet {
    pub id: String,
    pub name: Option<String>,
    pub epoch: DateTime<Utc>,
    pub line1: String,
    pub line2: String,
    tle: satkit::TLE,
}

impl fmt::Debug for ElementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementSet")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}

impl ElementSet {
    /// Validate and parse a raw record
    pub fn parse(record: &ElementRecord) -> Result<Self, ElementParseError> {
        validate_lines(&record.line1, &record.line2)?;

        let tle = satkit::TLE::load_2line(&record.line1, &record.line2)
            .map_err(|e| ElementParseError::Parser(e.to_string()))?;
        let epoch = from_instant(&tle.epoch)
            .ok_or_else(|| ElementParseError::Parser("epoch out of range".into()))?;

        Ok(Self {
            id: record.id.clone(),
            name: record.name.clone(),
            epoch,
            line1: record.line1.clone(),
            line2: record.line2.clone(),
            tle,
        })
    }

    /// Inertial position (km) and velocity (km/s) at an instant
    pub fn inertial_at(
        &self,
        at: DateTime<Utc>,
    ) -> Result<(Vector3<f64>, Vector3<f64>), PropagationError> {
        let failure = |reason: &str| PropagationError::NumericalFailure {
            id: self.id.clone(),
            at,
            reason: reason.to_string(),
        };

        let instant = to_instant(at).ok_or_else(|| failure("instant out of range"))?;

        // sgp4 caches its initialisation inside the TLE, so work on a copy
        let mut tle = self.tle.clone();
        let result = sgp4(&mut tle, &[instant]).map_err(|_| failure("sgp4 error"))?;

        // pos and vel are in TEME, in meters and m/s
        let pos = result.pos.column(0);
        let vel = result.vel.column(0);
        let position_km = Vector3::new(pos[0], pos[1], pos[2]) / 1000.0;
        let velocity_kms = Vector3::new(vel[0], vel[1], vel[2]) / 1000.0;

        let finite = position_km.iter().chain(velocity_kms.iter()).all(|v| v.is_finite());
        if !finite || position_km.norm() == 0.0 {
            return Err(failure("non-finite state"));
        }

        Ok((position_km, velocity_kms))
    }

    /// Full state vector, including geodetic coordinates, at an instant
    pub fn state_at(&self, at: DateTime<Utc>) -> Result<StateVector, PropagationError> {
        let (position_km, velocity_kms) = self.inertial_at(at)?;
        Ok(StateVector {
            object_id: self.id.clone(),
            timestamp: at,
            geodetic: eci_to_geodetic(&position_km, at),
            speed_kms: velocity_kms.norm(),
            position_km,
            velocity_kms,
        })
    }
}

type ElementTable = HashMap<String, Arc<ElementSet>>;

/// Outcome of a batch load or refresh
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub loaded: usize,
    pub rejected: usize,
}

/// Owns the loaded element sets and answers state queries
///
/// The table sits behind an `Arc` that readers clone; writers either swap in a
/// whole new table or copy-on-write, so a reader never sees a partial update.
#[derive(Default)]
pub struct PropagationService {
    table: RwLock<Arc<ElementTable>>,
}

impl PropagationService {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> Arc<ElementTable> {
        Arc::clone(&self.table.read())
    }

    /// Parse one element set, replacing any existing entry for `id`
    ///
    /// Returns false on malformed input; the existing table is left as is.
    pub fn load_elements(&self, id: &str, line1: &str, line2: &str) -> bool {
        self.load_record(&ElementRecord {
            id: id.to_string(),
            name: None,
            line1: line1.to_string(),
            line2: line2.to_string(),
        })
    }

    /// Like [`load_elements`](Self::load_elements) but keeps the record's name
    pub fn load_record(&self, record: &ElementRecord) -> bool {
        match ElementSet::parse(record) {
            Ok(set) => {
                let mut guard = self.table.write();
                Arc::make_mut(&mut guard).insert(record.id.clone(), Arc::new(set));
                true
            }
            Err(e) => {
                log::warn!("Rejected element set for {}: {}", record.id, e);
                false
            }
        }
    }

    /// Replace the whole table with the parseable subset of `records`
    pub fn replace_all(&self, records: &[ElementRecord]) -> LoadSummary {
        let mut table = ElementTable::with_capacity(records.len());
        let mut summary = LoadSummary::default();

        for record in records {
            match ElementSet::parse(record) {
                Ok(set) => {
                    table.insert(record.id.clone(), Arc::new(set));
                    summary.loaded += 1;
                }
                Err(e) => {
                    log::trace!("Skipping element set {}: {}", record.id, e);
                    summary.rejected += 1;
                }
            }
        }

        if summary.rejected > 0 {
            log::warn!("{} malformed element sets skipped", summary.rejected);
        }

        *self.table.write() = Arc::new(table);
        summary
    }

    /// Fetch a fresh catalog and swap it in; a source error keeps the current table
    pub async fn refresh(&self, source: &dyn ElementSource) -> Result<LoadSummary, SourceError> {
        log::info!("Refreshing element sets from {}", source.name());
        let records = source.fetch().await?;
        let summary = self.replace_all(&records);
        log::info!(
            "Element refresh complete: {} loaded, {} rejected",
            summary.loaded,
            summary.rejected
        );
        Ok(summary)
    }

    /// Refresh from `source` every `period` on a background task
    ///
    /// The first refresh runs immediately. Failed refreshes are logged and the
    /// table kept. A zero period is rejected.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        source: Arc<dyn ElementSource>,
        period: std::time::Duration,
    ) -> Result<ScheduledTask, ScheduleError> {
        let service = Arc::clone(self);
        ScheduledTask::spawn("element-refresh", period, move || {
            let service = Arc::clone(&service);
            let source = Arc::clone(&source);
            async move {
                if let Err(e) = service.refresh(source.as_ref()).await {
                    log::error!(
                        "Refresh from {} failed, keeping {} element sets: {}",
                        source.name(),
                        service.len(),
                        e
                    );
                }
            }
        })
    }

    pub fn element(&self, id: &str) -> Option<Arc<ElementSet>> {
        self.table().get(id).cloned()
    }

    pub fn name(&self, id: &str) -> Option<String> {
        self.element(id).and_then(|e| e.name.clone())
    }

    /// Loaded catalog ids, ascending
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.table().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// State of one object at an instant
    pub fn propagate(&self, id: &str, at: DateTime<Utc>) -> Result<StateVector, PropagationError> {
        self.element(id)
            .ok_or_else(|| PropagationError::UnknownObject(id.to_string()))?
            .state_at(at)
    }

    pub fn propagate_now(&self, id: &str) -> Result<StateVector, PropagationError> {
        self.propagate(id, Utc::now())
    }

    /// Lazy states at `start + k·step` for every `k·step < duration`
    ///
    /// The series holds its own element snapshot, so a concurrent refresh does
    /// not affect it. Clone it to iterate again from the start.
    pub fn propagate_series(
        &self,
        id: &str,
        start: DateTime<Utc>,
        duration: Duration,
        step: Duration,
    ) -> Result<StateSeries, PropagationError> {
        let element = self
            .element(id)
            .ok_or_else(|| PropagationError::UnknownObject(id.to_string()))?;

        let step_ms = step.num_milliseconds();
        if step_ms <= 0 {
            return Err(PropagationError::InvalidStep);
        }
        let count = (duration.num_milliseconds().max(0) / step_ms) as u64;

        Ok(StateSeries {
            element,
            start,
            step_ms,
            index: 0,
            count,
        })
    }

    /// States of every loaded object at one instant, ordered by id
    ///
    /// Objects that fail to propagate at `at` are left out.
    pub fn snapshot(&self, at: DateTime<Utc>) -> Vec<StateVector> {
        let table = self.table();
        let mut sets: Vec<&Arc<ElementSet>> = table.values().collect();
        sets.sort_by(|a, b| a.id.cmp(&b.id));

        sets.into_iter()
            .filter_map(|set| match set.state_at(at) {
                Ok(state) => Some(state),
                Err(e) => {
                    log::trace!("{}", e);
                    None
                }
            })
            .collect()
    }
}

/// Time-ascending states of one object; see [`PropagationService::propagate_series`]
#[derive(Debug, Clone)]
pub struct StateSeries {
    element: Arc<ElementSet>,
    start: DateTime<Utc>,
    step_ms: i64,
    index: u64,
    count: u64,
}

impl Iterator for StateSeries {
    type Item = StateVector;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.count {
            let at = self.start + Duration::milliseconds(self.step_ms * self.index as i64);
            self.index += 1;
            match self.element.state_at(at) {
                Ok(state) => return Some(state),
                Err(e) => log::trace!("Series skipped an instant: {}", e),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some((self.count - self.index) as usize))
    }
}
