use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::Reading;

/// A single time-series record with one numeric `value` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    #[serde(serialize_with = "iso8601")]
    pub time: DateTime<Utc>,
    pub fields: BTreeMap<String, f64>,
}

fn iso8601<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// One point per measured quantity, tagged with the room and optional
/// sensor name.
pub fn points(reading: &Reading, room: &str, sensor: Option<&str>) -> Vec<Point> {
    let mut tags = BTreeMap::new();
    tags.insert("room".to_string(), room.to_string());
    if let Some(sensor) = sensor {
        tags.insert("sensor".to_string(), sensor.to_string());
    }

    reading
        .quantities()
        .map(|(quantity, value)| Point {
            measurement: quantity.to_string(),
            tags: tags.clone(),
            time: reading.timestamp(),
            fields: BTreeMap::from([("value".to_string(), value)]),
        })
        .collect()
}

impl Point {
    /// Renders the point in InfluxDB line protocol with millisecond precision.
    pub fn to_line(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            let _ = write!(
                line,
                ",{}={}",
                escape(key, &[',', '=', ' ']),
                escape(value, &[',', '=', ' '])
            );
        }
        let mut separator = ' ';
        for (key, value) in &self.fields {
            let _ = write!(line, "{separator}{}={value}", escape(key, &[',', '=', ' ']));
            separator = ',';
        }
        let _ = write!(line, " {}", self.time.timestamp_millis());
        line
    }
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn reading() -> Reading {
        Reading::at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
            .with_temperature(24.0)
            .with_humidity(48.5)
    }

    #[test]
    fn one_point_per_quantity() {
        let points = points(&reading(), "kitchen", Some("dht22"));
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].measurement, "temperature");
        assert_eq!(points[1].measurement, "humidity");
        assert_eq!(points[1].fields["value"], 48.5);
        assert_eq!(points[0].tags["room"], "kitchen");
        assert_eq!(points[0].tags["sensor"], "dht22");
    }

    #[test]
    fn json_shape_has_iso8601_time() {
        let points = points(&reading(), "kitchen", None);
        assert_eq!(
            serde_json::to_string(&points[0]).unwrap(),
            r#"{"measurement":"temperature","tags":{"room":"kitchen"},"time":"2024-05-01T12:00:00.000Z","fields":{"value":24.0}}"#
        );
    }

    #[test]
    fn line_protocol() {
        let points = points(&reading(), "kitchen", Some("dht22"));
        assert_eq!(
            points[1].to_line(),
            "humidity,room=kitchen,sensor=dht22 value=48.5 1714564800000"
        );
    }

    #[test]
    fn line_protocol_escapes_tag_values() {
        let points = points(&reading(), "living room,1", None);
        assert_eq!(
            points[0].to_line(),
            r"temperature,room=living\ room\,1 value=24 1714564800000"
        );
    }
}
