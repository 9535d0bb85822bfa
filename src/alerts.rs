//! Plant health alerts.
//!
//! Flags cleaned readings outside the healthy band and formats a message for
//! the plant's botanist. Delivery is left to whoever consumes the alerts.

use serde::Serialize;

use crate::models::CleanedReading;

// ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    /// Soil moisture above this (percent) needs attention.
    pub max_soil_moisture: f64,
    /// Temperature below this (°C) needs attention.
    pub min_temperature: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_soil_moisture: 50.0,
            min_temperature: 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantAlert {
    pub plant_id: i32,
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl HealthThresholds {
    pub fn is_unhealthy(&self, reading: &CleanedReading) -> bool {
        reading.soil_moisture > self.max_soil_moisture || reading.temperature < self.min_temperature
    }
}

/// One alert per unhealthy reading, in batch order.
pub fn find_unhealthy(readings: &[CleanedReading], thresholds: &HealthThresholds) -> Vec<PlantAlert> {
    // ---
    readings
        .iter()
        .filter(|r| thresholds.is_unhealthy(r))
        .map(|r| {
            tracing::warn!("Plant '{}' ({}) requires attention", r.plant_name, r.plant_id);
            PlantAlert {
                plant_id: r.plant_id,
                recipient: r.botanist_email.clone(),
                subject: format!("Plant Health Alert for {}", r.plant_name),
                body: alert_body(r),
            }
        })
        .collect()
}

fn alert_body(r: &CleanedReading) -> String {
    // ---
    format!(
        "Dear {} {},\n\n\
         We have detected an issue with the health of your plant:\n\
         Plant Name: {} ({})\n\
         Plant ID: {}\n\
         Country of Origin: {}\n\
         \n\
         Current Conditions:\n\
         - Soil Moisture: {}%\n\
         - Temperature: {}°C\n\
         - Last Watered: {}\n\
         \n\
         Recommended Action: Please check the plant's environment and address the issue promptly.\n\n\
         Best regards,\n\
         The Plant Health Monitoring Team",
        r.botanist_forename,
        r.botanist_surname,
        r.plant_name,
        r.scientific_name,
        r.plant_id,
        r.country_name,
        r.soil_moisture,
        r.temperature,
        r.last_watered.format("%Y-%m-%d %H:%M:%S"),
    )
}
