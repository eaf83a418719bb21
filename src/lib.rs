use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod sample_loop;
pub mod sensor;
pub mod shutdown;
pub mod sink;

/// Physical quantities a sensor can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Temperature,
    Humidity,
    Pressure,
    Altitude,
}

impl Quantity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quantity::Temperature => "temperature",
            Quantity::Humidity => "humidity",
            Quantity::Pressure => "pressure",
            Quantity::Altitude => "altitude",
        }
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sampled set of measurements.
///
/// Serializes to the flat JSON object published to the broker, e.g.
/// `{"temperature":24.0,"humidity":48.5}`; quantities the sensor does not
/// measure are omitted and the timestamp never appears in the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    altitude: Option<f64>,
    #[serde(skip)]
    timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self {
            temperature: None,
            humidity: None,
            pressure: None,
            altitude: None,
            timestamp,
        }
    }

    pub fn with_temperature(mut self, value: f64) -> Self {
        self.temperature = Some(value);
        self
    }

    pub fn with_humidity(mut self, value: f64) -> Self {
        self.humidity = Some(value);
        self
    }

    pub fn with_pressure(mut self, value: f64) -> Self {
        self.pressure = Some(value);
        self
    }

    pub fn with_altitude(mut self, value: f64) -> Self {
        self.altitude = Some(value);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn humidity(&self) -> Option<f64> {
        self.humidity
    }

    pub fn pressure(&self) -> Option<f64> {
        self.pressure
    }

    pub fn altitude(&self) -> Option<f64> {
        self.altitude
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Measured quantities in payload order.
    pub fn quantities(&self) -> impl Iterator<Item = (Quantity, f64)> + '_ {
        [
            (Quantity::Temperature, self.temperature),
            (Quantity::Humidity, self.humidity),
            (Quantity::Pressure, self.pressure),
            (Quantity::Altitude, self.altitude),
        ]
        .into_iter()
        .filter_map(|(quantity, value)| value.map(|v| (quantity, v)))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Default for Reading {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.timestamp.to_rfc3339())?;
        for (quantity, value) in self.quantities() {
            write!(f, " {quantity}: {value:.2}")?;
        }
        Ok(())
    }
}
