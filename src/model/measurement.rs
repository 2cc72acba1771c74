//! Measurement records and projected series points.

use crate::model::{format_timestamp, parse_timestamp, Field};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One stored data point. All fields are required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Measurement {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub population: f64,
    #[serde(rename = "GDP")]
    pub gdp: f64,
    #[serde(rename = "lifeExpectancy")]
    pub life_expectancy: f64,
}

/// Timestamps arrive either as plain strings or as extended-JSON `{"$date": ...}` objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    Extended {
        #[serde(rename = "$date")]
        date: String,
    },
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = match RawTimestamp::deserialize(deserializer)? {
        RawTimestamp::Text(s) => s,
        RawTimestamp::Extended { date } => date,
    };
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

/// A measurement projected onto a single field.
///
/// Serializes as `{"timestamp": ..., "<field>": value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub field: Field,
    pub value: f64,
}

impl SeriesPoint {
    /// Project a measurement onto `field`, or `None` if the field is absent.
    pub fn project(measurement: &Measurement, field: Field) -> Option<Self> {
        field.value_of(measurement).map(|value| Self {
            timestamp: measurement.timestamp,
            field,
            value,
        })
    }
}

impl Serialize for SeriesPoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("timestamp", &format_timestamp(&self.timestamp))?;
        map.serialize_entry(self.field.as_str(), &self.value)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_deserialize_plain_record() {
        let json = r#"{
            "timestamp": "2015-01-01",
            "population": 3500000,
            "GDP": 12.5e9,
            "lifeExpectancy": 74.3
        }"#;
        let m: Measurement = serde_json::from_str(json).unwrap();
        assert_eq!(m.timestamp, Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(m.population, 3_500_000.0);
        assert_eq!(m.gdp, 12.5e9);
        assert_eq!(m.life_expectancy, 74.3);
    }

    #[test]
    fn test_deserialize_extended_json_and_ignores_id() {
        let json = r#"{
            "_id": {"$oid": "5f1d7b2e9c1a4b3d2e1f0a9b"},
            "timestamp": {"$date": "1990-01-01T00:00:00Z"},
            "population": 1,
            "GDP": 2,
            "lifeExpectancy": 3
        }"#;
        let m: Measurement = serde_json::from_str(json).unwrap();
        assert_eq!(m.timestamp, Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let json = r#"{"timestamp": "2015-01-01", "population": 1, "GDP": 2}"#;
        assert!(serde_json::from_str::<Measurement>(json).is_err());
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let json = r#"{"timestamp": "yesterday", "population": 1, "GDP": 2, "lifeExpectancy": 3}"#;
        let err = serde_json::from_str::<Measurement>(json).unwrap_err();
        assert!(err.to_string().contains("invalid timestamp"));
    }

    #[test]
    fn test_series_point_serializes_with_field_key() {
        let point = SeriesPoint {
            timestamp: Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap(),
            field: Field::LifeExpectancy,
            value: 68.5,
        };
        let value = serde_json::to_value(&point).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"timestamp": "2001-01-01T00:00:00.000Z", "lifeExpectancy": 68.5})
        );
    }
}
