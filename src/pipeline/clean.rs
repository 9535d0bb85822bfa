//! Row-level data-quality gates.
//!
//! Each gate is a pure function from one batch to the next: it consumes the
//! previous gate's output and returns the surviving rows, in their original
//! order, together with how many it dropped. A row dropped by one gate is
//! never seen by the gates after it.
//!
//! Gate order: completeness, numeric range, text normalization, temporal,
//! location.

use std::ops::RangeInclusive;

use chrono::{DateTime, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::ValidationError;
use crate::models::{fields, CleanedReading, RawReading};

// ---

/// Fields every row must carry for the completeness gate.
pub const DEFAULT_MANDATORY_FIELDS: [&str; 7] = [
    fields::PLANT_NAME,
    fields::SCIENTIFIC_NAME,
    fields::COUNTRY_NAME,
    fields::BOTANIST_EMAIL,
    fields::BOTANIST_FORENAME,
    fields::BOTANIST_SURNAME,
    fields::BOTANIST_PHONE,
];

/// Formats that carry an offset; the offset is discarded, not applied.
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %z",
];

const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Configurable parts of the cleaning contract.
#[derive(Debug, Clone)]
pub struct CleaningRules {
    pub mandatory_fields: Vec<String>,
    pub soil_moisture: RangeInclusive<f64>,
    pub temperature: RangeInclusive<f64>,
}

impl Default for CleaningRules {
    fn default() -> Self {
        Self {
            mandatory_fields: DEFAULT_MANDATORY_FIELDS.iter().map(|f| f.to_string()).collect(),
            soil_moisture: 0.0..=100.0,
            temperature: -10.0..=50.0,
        }
    }
}

/// Rows surviving a single gate.
#[derive(Debug)]
pub struct GateOutcome<T> {
    pub rows: Vec<T>,
    pub dropped: usize,
}

/// Rows dropped by each gate in one cleaning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateDrops {
    pub completeness: usize,
    pub numeric_range: usize,
    pub temporal: usize,
    pub location: usize,
}

impl GateDrops {
    pub fn total(&self) -> usize {
        self.completeness + self.numeric_range + self.temporal + self.location
    }
}

#[derive(Debug)]
pub struct CleanedBatch {
    pub readings: Vec<CleanedReading>,
    pub drops: GateDrops,
}

/// Run every gate, in order, over a raw batch.
pub fn clean_batch(raw: Vec<RawReading>, rules: &CleaningRules) -> CleanedBatch {
    // ---
    info!("Cleaning batch of {} raw rows", raw.len());

    let complete = completeness_gate(raw, &rules.mandatory_fields);
    let in_range = numeric_range_gate(complete.rows, rules);
    let trimmed = normalize_text(in_range.rows);
    let timed = temporal_gate(trimmed);
    let located = location_gate(timed.rows);

    let drops = GateDrops {
        completeness: complete.dropped,
        numeric_range: in_range.dropped,
        temporal: timed.dropped,
        location: located.dropped,
    };
    info!(
        "Cleaning finished: {} rows kept, {} dropped",
        located.rows.len(),
        drops.total()
    );

    CleanedBatch {
        readings: located.rows,
        drops,
    }
}

/// Shared gate driver: keeps rows the check accepts, logs counts and drops.
fn apply_gate<I, O>(
    gate: &str,
    batch: Vec<I>,
    check: impl Fn(I) -> Result<O, ValidationError>,
) -> GateOutcome<O> {
    // ---
    let before = batch.len();
    let mut rows = Vec::with_capacity(before);
    for (index, row) in batch.into_iter().enumerate() {
        match check(row) {
            Ok(kept) => rows.push(kept),
            Err(reason) => debug!("{} gate dropped row {}: {}", gate, index, reason),
        }
    }
    let dropped = before - rows.len();
    info!(
        "{} gate: rows before {}, rows after {}",
        gate,
        before,
        rows.len()
    );
    GateOutcome { rows, dropped }
}

/// Drop rows missing any mandatory field.
pub fn completeness_gate(batch: Vec<RawReading>, mandatory: &[String]) -> GateOutcome<RawReading> {
    // ---
    apply_gate("completeness", batch, |row| {
        match mandatory.iter().find(|f| row.text(f).is_none()) {
            Some(missing) => Err(ValidationError::MissingField(missing.clone())),
            None => Ok(row),
        }
    })
}

/// Drop rows whose plant id is not an integer or whose measurements are
/// outside the accepted ranges.
pub fn numeric_range_gate(batch: Vec<RawReading>, rules: &CleaningRules) -> GateOutcome<RawReading> {
    // ---
    apply_gate("numeric range", batch, |row| {
        if row.integer(fields::PLANT_ID).is_none() {
            return Err(ValidationError::NotNumeric {
                field: fields::PLANT_ID,
            });
        }
        check_range(&row, fields::SOIL_MOISTURE, &rules.soil_moisture)?;
        check_range(&row, fields::TEMPERATURE, &rules.temperature)?;
        Ok(row)
    })
}

fn check_range(
    row: &RawReading,
    field: &'static str,
    range: &RangeInclusive<f64>,
) -> Result<f64, ValidationError> {
    // ---
    let value = row
        .number(field)
        .ok_or(ValidationError::NotNumeric { field })?;
    if !range.contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min: *range.start(),
            max: *range.end(),
        });
    }
    Ok(value)
}

/// Trim every text field. Never drops a row.
pub fn normalize_text(batch: Vec<RawReading>) -> Vec<RawReading> {
    // ---
    let rows: Vec<RawReading> = batch.iter().map(RawReading::trimmed).collect();
    info!("text normalization: trimmed {} rows", rows.len());
    rows
}

/// Parse both timestamps and produce typed readings; rows with an
/// unparseable timestamp are dropped.
pub fn temporal_gate(batch: Vec<RawReading>) -> GateOutcome<CleanedReading> {
    // ---
    apply_gate("temporal", batch, |row| {
        let recording_taken = timestamp_field(&row, fields::RECORDING_TAKEN)?;
        let last_watered = timestamp_field(&row, fields::LAST_WATERED)?;
        typed_reading(&row, recording_taken, last_watered)
    })
}

/// Drop rows with an empty country name.
pub fn location_gate(batch: Vec<CleanedReading>) -> GateOutcome<CleanedReading> {
    // ---
    apply_gate("location", batch, |reading| {
        if reading.country_name.trim().is_empty() {
            Err(ValidationError::EmptyCountry)
        } else {
            Ok(reading)
        }
    })
}

fn timestamp_field(row: &RawReading, field: &'static str) -> Result<NaiveDateTime, ValidationError> {
    // ---
    let value = row.text(field).unwrap_or_default();
    parse_timestamp(&value).ok_or(ValidationError::InvalidTimestamp { field, value })
}

/// Parse a source timestamp into a timezone-naive value.
///
/// When the text carries an offset the wall-clock time is kept as written and
/// the offset is dropped: `2024-11-28 13:37:24+0100` becomes
/// `2024-11-28 13:37:24`, not `12:37:24`.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    // ---
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.naive_local());
    }
    OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
        .map(|dt| dt.naive_local())
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        })
}

/// Text value after normalization. Presence is the completeness gate's job:
/// a field it did not require, or one that trimmed to nothing, becomes "".
fn text_or_empty(row: &RawReading, field: &str) -> String {
    row.text(field).unwrap_or_default()
}

fn typed_reading(
    row: &RawReading,
    recording_taken: NaiveDateTime,
    last_watered: NaiveDateTime,
) -> Result<CleanedReading, ValidationError> {
    // ---
    let plant_id = row.integer(fields::PLANT_ID).ok_or(ValidationError::NotNumeric {
        field: fields::PLANT_ID,
    })?;
    let soil_moisture = row.number(fields::SOIL_MOISTURE).ok_or(ValidationError::NotNumeric {
        field: fields::SOIL_MOISTURE,
    })?;
    let temperature = row.number(fields::TEMPERATURE).ok_or(ValidationError::NotNumeric {
        field: fields::TEMPERATURE,
    })?;

    Ok(CleanedReading {
        plant_id,
        plant_name: text_or_empty(row, fields::PLANT_NAME),
        scientific_name: text_or_empty(row, fields::SCIENTIFIC_NAME),
        soil_moisture,
        temperature,
        last_watered,
        botanist_email: text_or_empty(row, fields::BOTANIST_EMAIL),
        botanist_forename: text_or_empty(row, fields::BOTANIST_FORENAME),
        botanist_surname: text_or_empty(row, fields::BOTANIST_SURNAME),
        botanist_phone: text_or_empty(row, fields::BOTANIST_PHONE),
        // An empty country is left for the location gate.
        country_name: text_or_empty(row, fields::COUNTRY_NAME),
        recording_taken,
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn raw_row(plant_id: i64, moisture: f64, temperature: f64) -> RawReading {
        // ---
        RawReading::new()
            .with(fields::PLANT_ID, plant_id)
            .with(fields::PLANT_NAME, "Venus flytrap")
            .with(fields::SCIENTIFIC_NAME, "Dionaea muscipula")
            .with(fields::SOIL_MOISTURE, moisture)
            .with(fields::TEMPERATURE, temperature)
            .with(fields::LAST_WATERED, "2024-11-28 08:00:00")
            .with(fields::RECORDING_TAKEN, "2024-11-28 13:37:24")
            .with(fields::BOTANIST_EMAIL, "gertrude.jekyll@lnhm.co.uk")
            .with(fields::BOTANIST_FORENAME, "Gertrude")
            .with(fields::BOTANIST_SURNAME, "Jekyll")
            .with(fields::BOTANIST_PHONE, "001-481-273-3691x127")
            .with(fields::COUNTRY_NAME, "BR")
    }

    #[test]
    fn test_valid_row_survives_every_gate() {
        // ---
        let batch = clean_batch(vec![raw_row(1, 50.0, 25.0)], &CleaningRules::default());

        assert_eq!(batch.readings.len(), 1);
        assert_eq!(batch.drops, GateDrops::default());
        let r = &batch.readings[0];
        assert_eq!(r.plant_id, 1);
        assert_eq!(r.recording_taken.to_string(), "2024-11-28 13:37:24");
    }

    #[test]
    fn test_missing_email_is_dropped_by_completeness() {
        // ---
        let mut row = raw_row(1, 50.0, 25.0);
        row.0.remove(fields::BOTANIST_EMAIL);
        let mut empty = raw_row(2, 50.0, 25.0);
        empty.insert(fields::BOTANIST_EMAIL, "");
        let mut null = raw_row(3, 50.0, 25.0);
        null.insert(fields::BOTANIST_EMAIL, json!(null));

        let batch = clean_batch(vec![row, empty, null], &CleaningRules::default());

        assert!(batch.readings.is_empty());
        assert_eq!(batch.drops.completeness, 3);
        assert_eq!(batch.drops.total(), 3);
    }

    #[test]
    fn test_range_boundaries() {
        // ---
        let rows = vec![
            raw_row(1, 0.0, -10.0),
            raw_row(2, 100.0, 50.0),
            raw_row(3, -0.1, 20.0),
            raw_row(4, 100.1, 20.0),
            raw_row(5, 40.0, -10.5),
            raw_row(6, 40.0, 50.5),
        ];
        let batch = clean_batch(rows, &CleaningRules::default());

        let kept: Vec<i32> = batch.readings.iter().map(|r| r.plant_id).collect();
        assert_eq!(kept, vec![1, 2]);
        assert_eq!(batch.drops.numeric_range, 4);
        for r in &batch.readings {
            assert!((0.0..=100.0).contains(&r.soil_moisture));
            assert!((-10.0..=50.0).contains(&r.temperature));
        }
    }

    #[test]
    fn test_non_numeric_values_are_dropped() {
        // ---
        let mut bad_moisture = raw_row(1, 10.0, 10.0);
        bad_moisture.insert(fields::SOIL_MOISTURE, "damp");
        let mut bad_id = raw_row(2, 10.0, 10.0);
        bad_id.insert(fields::PLANT_ID, "two");
        let mut string_numbers = raw_row(3, 10.0, 10.0);
        string_numbers.insert(fields::SOIL_MOISTURE, "42.5");

        let batch = clean_batch(
            vec![bad_moisture, bad_id, string_numbers],
            &CleaningRules::default(),
        );

        assert_eq!(batch.readings.len(), 1);
        assert_eq!(batch.readings[0].soil_moisture, 42.5);
        assert_eq!(batch.drops.numeric_range, 2);
    }

    #[test]
    fn test_text_fields_are_trimmed() {
        // ---
        let mut row = raw_row(1, 10.0, 10.0);
        row.insert(fields::PLANT_NAME, "  Venus flytrap ");
        row.insert(fields::BOTANIST_EMAIL, " gertrude.jekyll@lnhm.co.uk\t");

        let batch = clean_batch(vec![row], &CleaningRules::default());

        assert_eq!(batch.readings[0].plant_name, "Venus flytrap");
        assert_eq!(batch.readings[0].botanist_email, "gertrude.jekyll@lnhm.co.uk");
    }

    #[test]
    fn test_invalid_date_is_dropped() {
        // ---
        let mut row = raw_row(1, 10.0, 10.0);
        row.insert(fields::RECORDING_TAKEN, "invalid_date");
        let mut watered = raw_row(2, 10.0, 10.0);
        watered.insert(fields::LAST_WATERED, "invalid_date");

        let batch = clean_batch(vec![row, watered], &CleaningRules::default());

        assert!(batch.readings.is_empty());
        assert_eq!(batch.drops.temporal, 2);
    }

    #[test]
    fn test_offset_is_discarded_not_converted() {
        // ---
        let ts = parse_timestamp("2024-11-28 13:37:24+0000").map(|t| t.to_string());
        assert_eq!(ts.as_deref(), Some("2024-11-28 13:37:24"));

        let ts = parse_timestamp("2024-11-28 13:37:24+0100").map(|t| t.to_string());
        assert_eq!(ts.as_deref(), Some("2024-11-28 13:37:24"));

        let ts = parse_timestamp("2024-11-28T13:37:24-05:00").map(|t| t.to_string());
        assert_eq!(ts.as_deref(), Some("2024-11-28 13:37:24"));
    }

    #[test]
    fn test_timestamp_formats_from_source() {
        // ---
        let rfc2822 = parse_timestamp("Thu, 28 Nov 2024 13:37:24 GMT").map(|t| t.to_string());
        assert_eq!(rfc2822.as_deref(), Some("2024-11-28 13:37:24"));

        let naive = parse_timestamp("2024-11-28 13:37:24").map(|t| t.to_string());
        assert_eq!(naive.as_deref(), Some("2024-11-28 13:37:24"));

        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("2024-13-45 99:00:00").is_none());
    }

    #[test]
    fn test_whitespace_country_is_dropped_by_location_gate() {
        // ---
        let mut row = raw_row(1, 10.0, 10.0);
        row.insert(fields::COUNTRY_NAME, "   ");

        let batch = clean_batch(vec![row], &CleaningRules::default());

        assert!(batch.readings.is_empty());
        assert_eq!(batch.drops.completeness, 0);
        assert_eq!(batch.drops.location, 1);
    }

    #[test]
    fn test_earlier_gate_wins_and_order_is_stable() {
        // ---
        // Missing email and out of range: counted once, by completeness.
        let mut both = raw_row(9, 500.0, 10.0);
        both.0.remove(fields::BOTANIST_EMAIL);

        let rows = vec![raw_row(3, 1.0, 1.0), both, raw_row(1, 2.0, 2.0), raw_row(2, 3.0, 3.0)];
        let batch = clean_batch(rows, &CleaningRules::default());

        let kept: Vec<i32> = batch.readings.iter().map(|r| r.plant_id).collect();
        assert_eq!(kept, vec![3, 1, 2]);
        assert_eq!(batch.drops.completeness, 1);
        assert_eq!(batch.drops.numeric_range, 0);
    }

    #[test]
    fn test_custom_mandatory_fields() {
        // ---
        let mut row = raw_row(1, 10.0, 10.0);
        row.0.remove(fields::BOTANIST_PHONE);
        let rules = CleaningRules {
            mandatory_fields: vec![fields::BOTANIST_EMAIL.to_string()],
            ..CleaningRules::default()
        };

        let outcome = completeness_gate(vec![row.clone()], &rules.mandatory_fields);
        assert_eq!(outcome.rows.len(), 1);
        assert_eq!(outcome.dropped, 0);

        // No later gate reinstates the default set.
        let batch = clean_batch(vec![row], &rules);
        assert_eq!(batch.readings.len(), 1);
        assert_eq!(batch.drops, GateDrops::default());
        assert_eq!(batch.readings[0].botanist_phone, "");
    }

    #[test]
    fn test_whitespace_only_text_is_kept_trimmed() {
        // ---
        let mut row = raw_row(1, 10.0, 10.0);
        row.insert(fields::BOTANIST_EMAIL, "   ");

        let batch = clean_batch(vec![row], &CleaningRules::default());

        assert_eq!(batch.drops, GateDrops::default());
        assert_eq!(batch.readings.len(), 1);
        assert_eq!(batch.readings[0].botanist_email, "");
    }

    #[test]
    fn test_temporal_gate_only_drops_bad_timestamps() {
        // ---
        let mut row = raw_row(1, 10.0, 10.0);
        row.0.remove(fields::PLANT_NAME);
        row.0.remove(fields::BOTANIST_SURNAME);

        let outcome = temporal_gate(vec![row]);

        assert_eq!(outcome.dropped, 0);
        assert_eq!(outcome.rows[0].plant_name, "");
    }
}
