//! Data models for the plant sensor pipeline.
//!
//! `RawReading` is the loosely typed record as received from the source,
//! `CleanedReading` is what survives the cleaning gates. The remaining types
//! are the rows of the star schema: three dimensions, the plant bridge, the
//! sensor fact and the joined archive row.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---

/// Source field names shared by the cleaner, the extractor and the loaders.
pub mod fields {
    pub const PLANT_ID: &str = "plant_id";
    pub const PLANT_NAME: &str = "plant_name";
    pub const SCIENTIFIC_NAME: &str = "scientific_name";
    pub const SOIL_MOISTURE: &str = "soil_moisture";
    pub const TEMPERATURE: &str = "temperature";
    pub const LAST_WATERED: &str = "last_watered";
    pub const RECORDING_TAKEN: &str = "recording_taken";
    pub const BOTANIST_EMAIL: &str = "botanist_email";
    pub const BOTANIST_FORENAME: &str = "botanist_forename";
    pub const BOTANIST_SURNAME: &str = "botanist_surname";
    pub const BOTANIST_PHONE: &str = "botanist_phone";
    pub const COUNTRY_NAME: &str = "country_name";
}

/// One record per (plant, observation time), field name to loosely typed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawReading(pub Map<String, Value>);

impl RawReading {
    // ---
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Builder-style setter, mostly useful for fixtures.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Text value of a field. Numbers are rendered as text; null, absent and
    /// empty strings count as missing.
    pub fn text(&self, field: &str) -> Option<String> {
        // ---
        match self.0.get(field)? {
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Numeric value of a field; numeric strings are accepted.
    pub fn number(&self, field: &str) -> Option<f64> {
        // ---
        let value = match self.0.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }

    /// Integer value of a field; integral floats and numeric strings are accepted.
    pub fn integer(&self, field: &str) -> Option<i32> {
        // ---
        match self.0.get(field)? {
            Value::Number(n) => match n.as_i64() {
                Some(i) => i32::try_from(i).ok(),
                None => n
                    .as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .and_then(|f| i32::try_from(f as i64).ok()),
            },
            Value::String(s) => s.trim().parse::<i32>().ok(),
            _ => None,
        }
    }

    /// Copy of this row with every string value trimmed.
    pub fn trimmed(&self) -> Self {
        // ---
        let map = self
            .0
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => Value::String(s.trim().to_string()),
                    other => other.clone(),
                };
                (k.clone(), v)
            })
            .collect();
        Self(map)
    }
}

/// A reading that passed every cleaning gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanedReading {
    // ---
    pub plant_id: i32,
    pub plant_name: String,
    pub scientific_name: String,
    pub soil_moisture: f64,
    pub temperature: f64,
    pub last_watered: NaiveDateTime,
    pub botanist_email: String,
    pub botanist_forename: String,
    pub botanist_surname: String,
    pub botanist_phone: String,
    pub country_name: String,
    pub recording_taken: NaiveDateTime,
}

impl CleanedReading {
    // ---
    pub fn species(&self) -> Species {
        Species {
            plant_name: self.plant_name.clone(),
            scientific_name: self.scientific_name.clone(),
        }
    }

    pub fn country(&self) -> Country {
        Country {
            country_name: self.country_name.clone(),
        }
    }

    pub fn botanist(&self) -> Botanist {
        Botanist {
            email: self.botanist_email.clone(),
            forename: self.botanist_forename.clone(),
            surname: self.botanist_surname.clone(),
            phone: self.botanist_phone.clone(),
        }
    }

    pub fn to_fact(&self) -> NewSensorReading {
        NewSensorReading {
            plant_id: self.plant_id,
            recording_taken: self.recording_taken,
            last_watered: self.last_watered,
            soil_moisture: self.soil_moisture,
            temperature: self.temperature,
        }
    }
}

/// Species dimension; natural key is the scientific name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Species {
    pub plant_name: String,
    pub scientific_name: String,
}

/// Country dimension; natural key is the country name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Country {
    pub country_name: String,
}

/// Botanist dimension; natural key is the email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Botanist {
    pub email: String,
    pub forename: String,
    pub surname: String,
    pub phone: String,
}

/// Plant bridge row linking a source plant id to its dimension ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlantLink {
    pub plant_id: i32,
    pub species_id: i32,
    pub country_id: i32,
    pub botanist_id: i32,
}

/// A sensor fact row ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSensorReading {
    pub plant_id: i32,
    pub recording_taken: NaiveDateTime,
    pub last_watered: NaiveDateTime,
    pub soil_moisture: f64,
    pub temperature: f64,
}

/// Fact joined with every dimension, in cold-storage column order.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ArchiveRow {
    // ---
    pub recording_taken: NaiveDateTime,
    pub last_watered: NaiveDateTime,
    pub plant_name: String,
    pub scientific_name: String,
    pub soil_moisture: f64,
    pub temperature: f64,
    pub country_name: String,
    pub botanist_forename: String,
    pub botanist_surname: String,
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_treats_empty_and_null_as_missing() {
        // ---
        let raw = RawReading::new()
            .with("a", "")
            .with("b", Value::Null)
            .with("c", "x")
            .with("d", 42);

        assert_eq!(raw.text("a"), None);
        assert_eq!(raw.text("b"), None);
        assert_eq!(raw.text("c").as_deref(), Some("x"));
        assert_eq!(raw.text("d").as_deref(), Some("42"));
        assert_eq!(raw.text("missing"), None);
    }

    #[test]
    fn test_numeric_accessors() {
        // ---
        let raw = RawReading::new()
            .with("moisture", "33.5")
            .with("temp", json!(12.25))
            .with("id", json!(7.0))
            .with("bad", "wet");

        assert_eq!(raw.number("moisture"), Some(33.5));
        assert_eq!(raw.number("temp"), Some(12.25));
        assert_eq!(raw.integer("id"), Some(7));
        assert_eq!(raw.number("bad"), None);
        assert_eq!(raw.integer("temp"), None);
    }

    #[test]
    fn test_trimmed_leaves_original_untouched() {
        // ---
        let raw = RawReading::new().with("name", "  Fern  ").with("n", 3);
        let trimmed = raw.trimmed();

        assert_eq!(trimmed.text("name").as_deref(), Some("Fern"));
        assert_eq!(raw.text("name").as_deref(), Some("  Fern  "));
        assert_eq!(trimmed.get("n"), Some(&json!(3)));
    }
}
