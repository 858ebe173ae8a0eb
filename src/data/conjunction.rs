//! Conjunction assessment records
//!
//! The assessment shape is shared by computed close approaches and records
//! ingested from a conjunction data message (CDM) feed.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One side of a conjunction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Catalog id
    pub id: String,
    pub name: Option<String>,
    /// PAYLOAD, DEBRIS, ROCKET BODY, ...
    pub object_type: Option<String>,
}

impl ObjectRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            object_type: None,
        }
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }
}

/// Operational risk classification of an assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

/// A close approach between two objects; immutable once produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConjunctionAssessment {
    /// Assessment id (CDM id for feed records)
    pub id: String,
    pub created: Option<DateTime<Utc>>,
    pub object_a: ObjectRef,
    pub object_b: ObjectRef,
    /// Time of closest approach
    pub tca: DateTime<Utc>,
    pub miss_distance_km: f64,
    /// Probability of collision
    pub probability: f64,
    pub relative_speed_kms: Option<f64>,
    pub emergency: bool,
}

impl ConjunctionAssessment {
    pub fn risk_level(&self) -> RiskLevel {
        if self.emergency || self.probability > 1e-3 {
            RiskLevel::Critical
        } else if self.probability > 1e-4 {
            RiskLevel::High
        } else if self.probability > 1e-5 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// A record as published by the Space-Track `cdm_public` class
///
/// Every field arrives as an optional string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CdmRecord {
    pub cdm_id: Option<String>,
    pub created: Option<String>,
    pub tca: Option<String>,
    pub min_rng: Option<String>,
    pub pc: Option<String>,
    pub sat_1_id: Option<String>,
    pub sat_1_name: Option<String>,
    #[serde(rename = "SAT1_OBJECT_TYPE")]
    pub sat1_object_type: Option<String>,
    pub sat_2_id: Option<String>,
    pub sat_2_name: Option<String>,
    #[serde(rename = "SAT2_OBJECT_TYPE")]
    pub sat2_object_type: Option<String>,
    pub emergency_reportable: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CdmError {
    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("field {field} has unparseable value {value:?}")]
    BadValue { field: &'static str, value: String },
}

/// Parse a CDM timestamp: RFC 3339 or the naive `YYYY-MM-DD[T ]HH:MM:SS[.f]` UTC form
pub fn parse_cdm_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn parse_number(field: &'static str, value: Option<&String>) -> Result<f64, CdmError> {
    match value.map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(0.0),
        Some(v) => v.parse::<f64>().map_err(|_| CdmError::BadValue {
            field,
            value: v.to_string(),
        }),
    }
}

impl TryFrom<CdmRecord> for ConjunctionAssessment {
    type Error = CdmError;

    fn try_from(record: CdmRecord) -> Result<Self, Self::Error> {
        let id = record.cdm_id.ok_or(CdmError::MissingField("CDM_ID"))?;
        let tca_raw = record.tca.ok_or(CdmError::MissingField("TCA"))?;
        let tca = parse_cdm_time(&tca_raw).ok_or(CdmError::BadValue {
            field: "TCA",
            value: tca_raw.clone(),
        })?;

        let probability = parse_number("PC", record.pc.as_ref())?;
        let miss_distance_km = parse_number("MIN_RNG", record.min_rng.as_ref())?;

        Ok(Self {
            id,
            created: record.created.as_deref().and_then(parse_cdm_time),
            object_a: ObjectRef {
                id: record.sat_1_id.unwrap_or_default(),
                name: record.sat_1_name,
                object_type: record.sat1_object_type,
            },
            object_b: ObjectRef {
                id: record.sat_2_id.unwrap_or_default(),
                name: record.sat_2_name,
                object_type: record.sat2_object_type,
            },
            tca,
            miss_distance_km,
            probability,
            relative_speed_kms: None,
            emergency: record.emergency_reportable.as_deref() == Some("Y"),
        })
    }
}
