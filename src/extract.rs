//! Plant API client.
//!
//! Fetches one JSON document per plant id and flattens it into the
//! `RawReading` shape the cleaner expects. Anything the API fails to serve is
//! logged and skipped; validation is the cleaner's job, not this module's.

use std::ops::RangeInclusive;

use anyhow::Result;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::models::{fields, RawReading};

// ---

pub struct PlantApiClient {
    client: Client,
    base_url: String,
}

impl PlantApiClient {
    // ---
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch every plant in `ids`, in order.
    pub async fn fetch_range(&self, ids: RangeInclusive<u32>) -> Vec<RawReading> {
        // ---
        let mut all_data = Vec::new();
        let mut failures = 0usize;

        for plant_id in ids {
            match self.fetch_plant(plant_id).await {
                Ok(Some(reading)) => all_data.push(reading),
                Ok(None) => failures += 1,
                Err(e) => {
                    tracing::warn!("Failed to fetch plant {}: {}", plant_id, e);
                    failures += 1;
                }
            }
        }

        if all_data.is_empty() && failures > 0 {
            tracing::warn!("Plant API at {} returned no usable records", self.base_url);
        }

        tracing::info!(
            "Finished fetching {} plant records ({} unavailable)",
            all_data.len(),
            failures
        );
        all_data
    }

    /// Fetch a single plant. `Ok(None)` for a non-success status.
    pub async fn fetch_plant(&self, plant_id: u32) -> Result<Option<RawReading>> {
        // ---
        let url = format!("{}/{}", self.base_url, plant_id);
        tracing::debug!("Fetching plant {} from: {}", plant_id, url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!("Plant {} unavailable (status {})", plant_id, status);
            return Ok(None);
        }

        let body: Value = response.json().await?;
        tracing::trace!("Plant {} raw response: {}", plant_id, body);
        Ok(Some(flatten_plant(&body)))
    }
}

/// Flatten one API plant document into source field names.
pub fn flatten_plant(body: &Value) -> RawReading {
    // ---
    let mut row = RawReading::new();
    let Some(object) = body.as_object() else {
        return row;
    };

    for (key, value) in object {
        match key.as_str() {
            "name" => row.insert(fields::PLANT_NAME, value.clone()),
            "scientific_name" => {
                let name = match value {
                    Value::Array(names) => names.first().cloned().unwrap_or(Value::Null),
                    other => other.clone(),
                };
                row.insert(fields::SCIENTIFIC_NAME, name);
            }
            "botanist" => flatten_botanist(value, &mut row),
            "origin_location" => {
                if let Some(country) = value.as_array().and_then(|loc| loc.get(3)) {
                    row.insert(fields::COUNTRY_NAME, country.clone());
                }
            }
            _ if !value.is_object() && !value.is_array() => row.insert(key, value.clone()),
            _ => {}
        }
    }
    row
}

fn flatten_botanist(value: &Value, row: &mut RawReading) {
    // ---
    let Some(botanist) = value.as_object() else {
        return;
    };
    let text = |field: &str| {
        botanist
            .get(field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let name = text("name");
    let mut parts = name.split_whitespace();
    row.insert(fields::BOTANIST_EMAIL, text("email"));
    row.insert(fields::BOTANIST_FORENAME, parts.next().unwrap_or_default());
    row.insert(fields::BOTANIST_SURNAME, parts.next().unwrap_or_default());
    row.insert(fields::BOTANIST_PHONE, text("phone"));
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_plant_document() {
        // ---
        let body = json!({
            "botanist": {
                "email": "gertrude.jekyll@lnhm.co.uk",
                "name": "Gertrude Jekyll",
                "phone": "001-481-273-3691x127"
            },
            "last_watered": "Mon, 25 Nov 2024 13:54:32 GMT",
            "name": "Epipremnum Aureum",
            "origin_location": ["-19.32556", "-41.25528", "Resplendor", "BR", "America/Sao_Paulo"],
            "plant_id": 1,
            "recording_taken": "2024-11-26 09:14:19",
            "scientific_name": ["Epipremnum aureum"],
            "soil_moisture": 33.2,
            "temperature": 13.4
        });

        let row = flatten_plant(&body);

        assert_eq!(row.text(fields::PLANT_NAME).as_deref(), Some("Epipremnum Aureum"));
        assert_eq!(row.text(fields::SCIENTIFIC_NAME).as_deref(), Some("Epipremnum aureum"));
        assert_eq!(row.text(fields::COUNTRY_NAME).as_deref(), Some("BR"));
        assert_eq!(row.text(fields::BOTANIST_FORENAME).as_deref(), Some("Gertrude"));
        assert_eq!(row.text(fields::BOTANIST_SURNAME).as_deref(), Some("Jekyll"));
        assert_eq!(row.text(fields::BOTANIST_PHONE).as_deref(), Some("001-481-273-3691x127"));
        assert_eq!(row.integer(fields::PLANT_ID), Some(1));
        assert_eq!(row.number(fields::SOIL_MOISTURE), Some(33.2));
        assert!(row.get("origin_location").is_none());
        assert!(row.get("botanist").is_none());
    }

    #[test]
    fn test_flatten_partial_document() {
        // ---
        let body = json!({
            "plant_id": 7,
            "name": "Cactus",
            "botanist": { "email": "a@b.c", "name": "Prince" },
            "origin_location": ["1", "2"]
        });

        let row = flatten_plant(&body);

        assert_eq!(row.text(fields::BOTANIST_FORENAME).as_deref(), Some("Prince"));
        // Empty surname and phone are "missing" to the completeness gate.
        assert_eq!(row.text(fields::BOTANIST_SURNAME), None);
        assert_eq!(row.text(fields::BOTANIST_PHONE), None);
        assert_eq!(row.text(fields::COUNTRY_NAME), None);
        assert_eq!(row.text(fields::SCIENTIFIC_NAME), None);
    }

    #[tokio::test]
    async fn test_unreachable_api_yields_empty_batch() {
        // ---
        // Nothing listens on the discard port; every request fails to connect.
        let client = PlantApiClient::new("http://127.0.0.1:9/plants/");

        assert!(client.fetch_plant(1).await.is_err());
        assert!(client.fetch_range(1..=3).await.is_empty());
    }

    #[test]
    fn test_non_object_body_yields_empty_row() {
        assert_eq!(flatten_plant(&json!([1, 2, 3])), RawReading::new());
    }
}
