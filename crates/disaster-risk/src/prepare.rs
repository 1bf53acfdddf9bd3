//! Dataset preparation
//!
//! Turns a raw disaster CSV into the two artifacts the records store loads:
//! a cleaned records CSV keyed by state name and the location vocabulary.

use crate::records::{write_records, Columns};
use crate::{DisasterRecord, LoadError, LocationVocabulary, RECORDS_FILE, VOCABULARY_FILE};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// States recognised inside free-form location strings, in match priority
pub const INDIAN_STATES: [&str; 30] = [
    "Tamil Nadu",
    "Andhra Pradesh",
    "Karnataka",
    "Kerala",
    "Maharashtra",
    "Gujarat",
    "Rajasthan",
    "Uttar Pradesh",
    "Madhya Pradesh",
    "Bihar",
    "West Bengal",
    "Orissa",
    "Punjab",
    "Haryana",
    "Delhi",
    "Assam",
    "Jharkhand",
    "Chhattisgarh",
    "Himachal Pradesh",
    "Uttarakhand",
    "Goa",
    "Sikkim",
    "Tripura",
    "Meghalaya",
    "Manipur",
    "Nagaland",
    "Mizoram",
    "Arunachal Pradesh",
    "Jammu and Kashmir",
    "Telangana",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrepareSummary {
    pub rows_read: usize,
    pub records_written: usize,
    pub rows_skipped: usize,
    pub locations: usize,
}

/// Capitalize the first letter of every alphabetic run
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_alpha = false;
    for c in raw.trim().chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// First known state mentioned in the string, else the text before the first comma
pub fn extract_state(location: &str) -> Option<String> {
    let lower = location.to_lowercase();
    if let Some(state) = INDIAN_STATES
        .iter()
        .find(|s| lower.contains(&s.to_lowercase()))
    {
        return Some(state.to_string());
    }
    let head = location.split(',').next().unwrap_or("").trim();
    if head.is_empty() {
        None
    } else {
        Some(head.to_string())
    }
}

/// Clean `input` and write the records CSV and vocabulary into `output_dir`
pub fn prepare_dataset(
    input: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
) -> Result<PrepareSummary, LoadError> {
    let input = input.as_ref();
    let output_dir = output_dir.as_ref();
    info!("Preparing dataset from {:?}", input);

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(input)?;
    let columns = Columns::from_headers(reader.headers()?)?;

    let mut records: Vec<DisasterRecord> = Vec::new();
    let mut rows_read = 0;
    let mut rows_skipped = 0;

    for row in reader.records() {
        rows_read += 1;
        let Ok(row) = row else {
            rows_skipped += 1;
            continue;
        };
        let state = row
            .get(columns.location)
            .map(title_case)
            .and_then(|l| extract_state(&l));
        match state.and_then(|s| columns.record(&row, s)) {
            Some(record) => records.push(record),
            None => rows_skipped += 1,
        }
    }

    let vocabulary = LocationVocabulary::fit(records.iter().map(|r| r.location.clone()));

    fs::create_dir_all(output_dir)?;
    write_records(output_dir.join(RECORDS_FILE), &records)?;
    vocabulary.save(output_dir.join(VOCABULARY_FILE))?;

    let summary = PrepareSummary {
        rows_read,
        records_written: records.len(),
        rows_skipped,
        locations: vocabulary.len(),
    };
    info!(
        "Prepared {} records over {} locations ({} rows skipped)",
        summary.records_written, summary.locations, summary.rows_skipped
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecordStore;
    use tempfile::tempdir;

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("  tamil NADU "), "Tamil Nadu");
        assert_eq!(title_case("chennai, tamil nadu"), "Chennai, Tamil Nadu");
        assert_eq!(title_case("jammu-kashmir"), "Jammu-Kashmir");
    }

    #[test]
    fn test_extract_state() {
        assert_eq!(
            extract_state("Chennai, Cuddalore, Tamil Nadu").as_deref(),
            Some("Tamil Nadu")
        );
        assert_eq!(
            extract_state("Mumbai city (Maharashtra)").as_deref(),
            Some("Maharashtra")
        );
        assert_eq!(extract_state("Port Blair, Andaman").as_deref(), Some("Port Blair"));
        assert_eq!(extract_state(" , x"), None);
    }

    #[test]
    fn test_prepare_round_trip_into_store() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("disasterIND.csv");
        fs::write(
            &raw,
            "\
Location,Disaster Type,Disaster Subtype,Start Year,Total Deaths,Total Damage ('000 US$)
\"chennai, tamil nadu\",Flood,Riverine flood,2015,289,
\"Patna, BIHAR\",Flood,,2008.0,,
\"Patna, Bihar\",Storm,,,5,
,Flood,,2001,1,
Port Blair,Tsunami,,2004,NaN,
",
        )
        .unwrap();

        let out = dir.path().join("models");
        let summary = prepare_dataset(&raw, &out).unwrap();
        assert_eq!(summary.rows_read, 5);
        assert_eq!(summary.records_written, 3);
        assert_eq!(summary.rows_skipped, 2);
        assert_eq!(summary.locations, 3);

        let store = RecordStore::load_dir(&out);
        assert!(store.is_available());
        let names: Vec<&str> = store.vocabulary().unwrap().iter().collect();
        assert_eq!(names, vec!["Bihar", "Port Blair", "Tamil Nadu"]);
        assert_eq!(store.records_for("Bihar")[0].total_deaths, None);
        assert_eq!(store.records_for("Tamil Nadu")[0].total_deaths, Some(289));
        assert_eq!(store.records_for("Port Blair")[0].start_year, 2004);
    }

    #[test]
    fn test_prepare_missing_input_fails() {
        let dir = tempdir().unwrap();
        assert!(prepare_dataset(dir.path().join("nope.csv"), dir.path()).is_err());
    }
}
