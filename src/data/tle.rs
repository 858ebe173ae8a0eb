//! Two-line element text handling
//!
//! Validates raw element lines before they reach the SGP4 parser and splits
//! catalog dumps (two- or three-line format) into records.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum column count of a two-line element line (checksum is column 69)
pub const TLE_LINE_LEN: usize = 69;

/// A raw element record as handed over by an element source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    /// Catalog id used as the object's key
    pub id: String,
    /// Object name from the title line, if the dump carried one
    pub name: Option<String>,
    pub line1: String,
    pub line2: String,
}

/// Reasons a pair of element lines is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ElementParseError {
    #[error("line {line} is {len} columns, expected at least {TLE_LINE_LEN}")]
    TooShort { line: u8, len: usize },

    #[error("line {line} contains non-ASCII characters")]
    NonAscii { line: u8 },

    #[error("line {line} does not start with \"{line} \"")]
    BadPrefix { line: u8 },

    #[error("catalog numbers differ between lines ({first} vs {second})")]
    CatalogMismatch { first: String, second: String },

    #[error("line {line} checksum is {found}, computed {computed}")]
    Checksum { line: u8, found: char, computed: u8 },

    #[error("SGP4 element parser rejected the record: {0}")]
    Parser(String),
}

/// Mod-10 checksum over the first 68 columns: digits count their value, '-' counts 1
pub fn checksum(line: &str) -> u8 {
    let sum: u32 = line
        .chars()
        .take(TLE_LINE_LEN - 1)
        .map(|c| match c {
            '-' => 1,
            c => c.to_digit(10).unwrap_or(0),
        })
        .sum();
    (sum % 10) as u8
}

fn validate_line(line: &str, number: u8) -> Result<(), ElementParseError> {
    let len = line.chars().count();
    if len < TLE_LINE_LEN {
        return Err(ElementParseError::TooShort { line: number, len });
    }
    if !line.is_ascii() {
        return Err(ElementParseError::NonAscii { line: number });
    }

    let prefix = format!("{} ", number);
    if !line.starts_with(&prefix) {
        return Err(ElementParseError::BadPrefix { line: number });
    }

    let found = line.as_bytes()[TLE_LINE_LEN - 1] as char;
    let computed = checksum(line);
    if found.to_digit(10) != Some(computed as u32) {
        return Err(ElementParseError::Checksum {
            line: number,
            found,
            computed,
        });
    }

    Ok(())
}

/// Structural validation of a two-line element pair
pub fn validate_lines(line1: &str, line2: &str) -> Result<(), ElementParseError> {
    validate_line(line1, 1)?;
    validate_line(line2, 2)?;

    let first = catalog_number(line1);
    let second = catalog_number(line2);
    if first != second {
        return Err(ElementParseError::CatalogMismatch {
            first: first.to_string(),
            second: second.to_string(),
        });
    }

    Ok(())
}

/// Catalog number field (columns 3-7), trimmed
pub fn catalog_number(line: &str) -> &str {
    line.get(2..7).map(str::trim).unwrap_or("")
}

/// Split a catalog dump into element records
///
/// Accepts the three-line format (title, line 1, line 2) and bare pairs.
/// Lines that do not form a pair are skipped; checksum validation happens
/// later when the record is loaded.
pub fn parse_tle_text(text: &str) -> Vec<ElementRecord> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect();

    let mut records = Vec::new();
    let mut pending_name: Option<&str> = None;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let next = lines.get(i + 1).copied();

        match next {
            Some(line2) if line.starts_with("1 ") && line2.starts_with("2 ") => {
                records.push(ElementRecord {
                    id: catalog_number(line).to_string(),
                    name: pending_name.take().map(|n| {
                        n.trim().trim_start_matches("0 ").trim().to_string()
                    }),
                    line1: line.to_string(),
                    line2: line2.to_string(),
                });
                i += 2;
            }
            _ => {
                pending_name = Some(line);
                i += 1;
            }
        }
    }

    records
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Element sets shared by tests across the crate. 90001 trails the ISS by
    //! half a degree of mean anomaly and 90003 by a fifth of a degree; 90002
    //! sits in a polar orbit.

    pub const ISS_LINE1: &str =
        "1 25544U 98067A   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    pub const ISS_LINE2: &str =
        "2 25544  51.6416 247.4627 0006703 130.5360 325.0288 15.72125391563537";

    pub const TRAILER_LINE1: &str =
        "1 90001U 98067B   08264.51782528 -.00002182  00000-0 -11606-4 0  2927";
    pub const TRAILER_LINE2: &str =
        "2 90001  51.6416 247.4627 0006703 130.5360 325.5288 15.72125391563532";

    pub const CLOSE_LINE1: &str =
        "1 90003U 98067D   08264.51782528 -.00002182  00000-0 -11606-4 0  2929";
    pub const CLOSE_LINE2: &str =
        "2 90003  51.6416 247.4627 0006703 130.5360 325.2288 15.72125391563531";

    pub const POLAR_LINE1: &str =
        "1 90002U 98067C   08264.51782528 -.00002182  00000-0 -11606-4 0  2928";
    pub const POLAR_LINE2: &str =
        "2 90002  97.6000  10.0000 0006703 130.5360 100.0000 14.50000000563533";
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_checksums_of_fixtures() {
        for (l1, l2) in [
            (ISS_LINE1, ISS_LINE2),
            (TRAILER_LINE1, TRAILER_LINE2),
            (CLOSE_LINE1, CLOSE_LINE2),
            (POLAR_LINE1, POLAR_LINE2),
        ] {
            assert_eq!(validate_lines(l1, l2), Ok(()));
        }
    }

    #[test]
    fn test_rejects_bad_checksum() {
        let mut broken = ISS_LINE2.to_string();
        broken.replace_range(68..69, "0");
        let err = validate_lines(ISS_LINE1, &broken).unwrap_err();
        assert!(matches!(err, ElementParseError::Checksum { line: 2, .. }));
    }

    #[test]
    fn test_rejects_short_and_swapped_lines() {
        assert!(matches!(
            validate_lines("1 25544U", ISS_LINE2),
            Err(ElementParseError::TooShort { line: 1, .. })
        ));
        assert!(matches!(
            validate_lines(ISS_LINE2, ISS_LINE1),
            Err(ElementParseError::BadPrefix { line: 1 })
        ));
    }

    #[test]
    fn test_rejects_non_ascii_line() {
        let mangled = ISS_LINE2.replacen("51.6416", "51.64é6", 1);
        assert_eq!(mangled.chars().count(), ISS_LINE2.len());

        assert_eq!(
            validate_lines(ISS_LINE1, &mangled),
            Err(ElementParseError::NonAscii { line: 2 })
        );
    }

    #[test]
    fn test_rejects_catalog_mismatch() {
        let err = validate_lines(ISS_LINE1, TRAILER_LINE2).unwrap_err();
        assert_eq!(
            err,
            ElementParseError::CatalogMismatch {
                first: "25544".into(),
                second: "90001".into()
            }
        );
    }

    #[test]
    fn test_parse_three_and_two_line_dump() {
        let text = format!(
            "ISS (ZARYA)\n{}\n{}\n\n{}\n{}\nstray title\n",
            ISS_LINE1, ISS_LINE2, POLAR_LINE1, POLAR_LINE2
        );
        let records = parse_tle_text(&text);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "25544");
        assert_eq!(records[0].name.as_deref(), Some("ISS (ZARYA)"));
        assert_eq!(records[1].id, "90002");
        assert_eq!(records[1].name, None);
    }
}
