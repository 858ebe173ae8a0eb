//! Element and conjunction data loading from local files

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;

use super::conjunction::{CdmRecord, ConjunctionAssessment};
use super::tle::{parse_tle_text, ElementRecord};

/// Read a text file, transparently decompressing `.gz` files
pub fn read_text(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let reader = BufReader::new(file);

    let mut text = String::new();
    if path.extension().is_some_and(|ext| ext == "gz") {
        GzDecoder::new(reader)
            .read_to_string(&mut text)
            .with_context(|| format!("Failed to decompress {:?}", path))?;
    } else {
        let mut reader = reader;
        reader
            .read_to_string(&mut text)
            .with_context(|| format!("Failed to read {:?}", path))?;
    }

    Ok(text)
}

/// Load element records from a TLE catalog dump
pub fn load_tle_file(path: impl AsRef<Path>) -> Result<Vec<ElementRecord>> {
    let path = path.as_ref();
    log::info!("Loading element sets from {:?}", path);

    let records = parse_tle_text(&read_text(path)?);
    log::info!("Read {} element records from {:?}", records.len(), path);
    Ok(records)
}

/// Load conjunction assessments from a JSON array of CDM records
///
/// Records that fail to convert are logged and skipped.
pub fn load_cdm_file(path: impl AsRef<Path>) -> Result<Vec<ConjunctionAssessment>> {
    let path = path.as_ref();
    let text = read_text(path)?;
    let records: Vec<CdmRecord> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse CDM records in {:?}", path))?;

    let total = records.len();
    let assessments: Vec<ConjunctionAssessment> = records
        .into_iter()
        .filter_map(|record| {
            let cdm_id = record.cdm_id.clone();
            match ConjunctionAssessment::try_from(record) {
                Ok(a) => Some(a),
                Err(e) => {
                    log::warn!("Skipping CDM record {:?}: {}", cdm_id, e);
                    None
                }
            }
        })
        .collect();

    log::debug!(
        "Converted {}/{} CDM records from {:?}",
        assessments.len(),
        total,
        path
    );
    Ok(assessments)
}
