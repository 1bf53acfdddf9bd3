//! Historical disaster records store
//!
//! Built once at startup from a prepared CSV plus the vocabulary artifact and
//! never mutated. A missing or malformed dataset yields an empty store that
//! reports itself unavailable instead of failing startup.

use crate::{LoadError, LocationVocabulary, RECORDS_FILE, VOCABULARY_FILE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Location column names, in lookup priority
const LOCATION_COLUMNS: [&str; 4] = ["location", "admin1", "admin 1", "state"];
const TYPE_COLUMN: &str = "disaster type";
const SUBTYPE_COLUMN: &str = "disaster subtype";
const YEAR_COLUMN: &str = "start year";
const DEATHS_COLUMN: &str = "total deaths";

/// One historical disaster event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisasterRecord {
    pub location: String,
    pub disaster_type: String,
    pub disaster_subtype: Option<String>,
    pub start_year: i32,
    /// `None` when the source had no usable count (serialized as `null`)
    pub total_deaths: Option<u32>,
}

/// Per-location summary for listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationSummary {
    pub code: u32,
    pub name: String,
    pub record_count: usize,
}

/// Read-only records table grouped by location code
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    vocabulary: Option<LocationVocabulary>,
    by_code: HashMap<u32, Vec<DisasterRecord>>,
    total: usize,
    unavailable_reason: Option<String>,
}

impl RecordStore {
    /// Group records under the vocabulary; rows whose location is not in the
    /// vocabulary are skipped
    pub fn new(vocabulary: LocationVocabulary, records: Vec<DisasterRecord>) -> Self {
        let mut by_code: HashMap<u32, Vec<DisasterRecord>> = HashMap::new();
        let mut total = 0;
        let mut skipped = 0;

        for mut record in records {
            let Some(code) = vocabulary.code(&record.location) else {
                skipped += 1;
                continue;
            };
            // Normalize to the canonical spelling
            if let Some(name) = vocabulary.name(code) {
                record.location = name.to_string();
            }
            by_code.entry(code).or_default().push(record);
            total += 1;
        }

        if skipped > 0 {
            warn!("{} records skipped (location not in vocabulary)", skipped);
        }

        Self {
            vocabulary: Some(vocabulary),
            by_code,
            total,
            unavailable_reason: None,
        }
    }

    /// Empty store that reports why it has no data
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            unavailable_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Load both artifacts; any failure degrades to an unavailable store
    pub fn load(records_path: impl AsRef<Path>, vocabulary_path: impl AsRef<Path>) -> Self {
        match Self::try_load(records_path.as_ref(), vocabulary_path.as_ref()) {
            Ok(store) => {
                info!(
                    "Records store ready: {} records across {} locations",
                    store.total,
                    store.vocabulary.as_ref().map_or(0, |v| v.len())
                );
                store
            }
            Err(e) => {
                warn!("Historical records unavailable: {}", e);
                Self::unavailable(e.to_string())
            }
        }
    }

    /// Load the default artifact names from a data directory
    pub fn load_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::load(dir.join(RECORDS_FILE), dir.join(VOCABULARY_FILE))
    }

    fn try_load(records_path: &Path, vocabulary_path: &Path) -> Result<Self, LoadError> {
        let vocabulary = LocationVocabulary::load(vocabulary_path)?;
        let records = read_records(records_path)?;
        Ok(Self::new(vocabulary, records))
    }

    pub fn is_available(&self) -> bool {
        self.unavailable_reason.is_none() && self.vocabulary.is_some()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    pub fn vocabulary(&self) -> Option<&LocationVocabulary> {
        self.vocabulary.as_ref()
    }

    /// Records for a canonical location (empty if none)
    pub fn records_for(&self, canonical: &str) -> &[DisasterRecord] {
        self.vocabulary
            .as_ref()
            .and_then(|v| v.code(canonical))
            .and_then(|code| self.by_code.get(&code))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Vocabulary in order with record counts
    pub fn locations(&self) -> Vec<LocationSummary> {
        let Some(vocabulary) = &self.vocabulary else {
            return Vec::new();
        };
        vocabulary
            .iter()
            .enumerate()
            .map(|(code, name)| {
                let code = code as u32;
                LocationSummary {
                    code,
                    name: name.to_string(),
                    record_count: self.by_code.get(&code).map_or(0, Vec::len),
                }
            })
            .collect()
    }
}

/// Parse an integer-valued cell that may be written as a float; empty, NaN,
/// non-finite and negative values are absent
pub fn parse_count(raw: &str) -> Option<u32> {
    let value = parse_finite(raw)?;
    if value < 0.0 || value > u32::MAX as f64 {
        return None;
    }
    Some(value.trunc() as u32)
}

/// Parse a year cell (`"1999"` or `"1999.0"`)
pub fn parse_year(raw: &str) -> Option<i32> {
    let value = parse_finite(raw)?;
    if !(0.0..=9999.0).contains(&value) {
        return None;
    }
    Some(value.trunc() as i32)
}

fn parse_finite(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn optional_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("nan"))
        .map(str::to_string)
}

/// Column positions resolved from a header row
#[derive(Debug, Clone, Copy)]
pub(crate) struct Columns {
    pub location: usize,
    pub disaster_type: usize,
    pub subtype: Option<usize>,
    pub year: usize,
    pub deaths: Option<usize>,
}

impl Columns {
    pub(crate) fn from_headers(headers: &csv::StringRecord) -> Result<Self, LoadError> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |name: &str| names.iter().position(|h| h == name);

        let location = LOCATION_COLUMNS
            .iter()
            .find_map(|c| find(*c))
            .ok_or(LoadError::MissingColumn("Location"))?;

        Ok(Self {
            location,
            disaster_type: find(TYPE_COLUMN).ok_or(LoadError::MissingColumn("Disaster Type"))?,
            subtype: find(SUBTYPE_COLUMN),
            year: find(YEAR_COLUMN).ok_or(LoadError::MissingColumn("Start Year"))?,
            deaths: find(DEATHS_COLUMN),
        })
    }

    /// Build a record from a row; `None` for malformed rows
    pub(crate) fn record(
        &self,
        row: &csv::StringRecord,
        location: String,
    ) -> Option<DisasterRecord> {
        let disaster_type = optional_text(row.get(self.disaster_type))?;
        let start_year = row.get(self.year).and_then(parse_year)?;
        Some(DisasterRecord {
            location,
            disaster_type,
            disaster_subtype: optional_text(self.subtype.and_then(|i| row.get(i))),
            start_year,
            total_deaths: self.deaths.and_then(|i| row.get(i)).and_then(parse_count),
        })
    }
}

/// Read a records CSV; malformed rows are skipped, not fatal
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<DisasterRecord>, LoadError> {
    let path = path.as_ref();
    info!("Loading disaster records from {:?}", path);

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns = Columns::from_headers(reader.headers()?)?;

    let mut records = Vec::new();
    let mut skipped = 0;

    for row in reader.records() {
        let Ok(row) = row else {
            skipped += 1;
            continue;
        };
        let Some(location) = optional_text(row.get(columns.location)) else {
            skipped += 1;
            continue;
        };
        match columns.record(&row, location) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    info!(
        "Loaded {} disaster records ({} malformed rows skipped)",
        records.len(),
        skipped
    );

    Ok(records)
}

/// Write records with the same headers `read_records` expects
pub fn write_records(path: impl AsRef<Path>, records: &[DisasterRecord]) -> Result<(), LoadError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "Location",
        "Disaster Type",
        "Disaster Subtype",
        "Start Year",
        "Total Deaths",
    ])?;
    for r in records {
        writer.write_record([
            r.location.clone(),
            r.disaster_type.clone(),
            r.disaster_subtype.clone().unwrap_or_default(),
            r.start_year.to_string(),
            r.total_deaths.map(|d| d.to_string()).unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
