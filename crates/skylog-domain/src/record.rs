use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{IngestError, IngestResult};

/// A single drone telemetry sample.
///
/// Immutable once accepted into a batch — corrections are new records.
/// Every field except `created_at` is optional; absent fields are stored as
/// SQL NULL, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TelemetryRecord {
    /// Ingestion timestamp; defaults to now when the producer omits it
    #[garde(skip)]
    pub created_at: DateTime<Utc>,

    // Identity
    #[garde(length(min = 1, max = 128))]
    pub drone_id: Option<String>,
    #[garde(length(min = 1, max = 128))]
    pub session_id: Option<String>,
    #[garde(length(min = 1, max = 64))]
    pub data_source: Option<String>,
    #[garde(skip)]
    pub raw_data: Option<String>,
    #[garde(skip)]
    pub parser_version: Option<String>,

    // Attitude (degrees)
    #[garde(range(min = -180.0, max = 180.0))]
    pub roll: Option<f64>,
    #[garde(range(min = -90.0, max = 90.0))]
    pub pitch: Option<f64>,
    #[garde(range(min = -180.0, max = 180.0))]
    pub yaw: Option<f64>,

    // Flight
    #[garde(range(min = -1000.0, max = 100000.0))]
    pub alt: Option<f64>,
    #[garde(range(min = 0.0, max = 1000.0))]
    pub ground_speed: Option<f64>,
    #[garde(range(min = -500.0, max = 500.0))]
    pub climb_rate: Option<f64>,
    #[garde(skip)]
    pub armed: Option<bool>,
    #[garde(length(min = 1, max = 32))]
    pub flight_mode: Option<String>,

    // GPS
    #[garde(range(min = -90.0, max = 90.0))]
    pub gps_lat: Option<f64>,
    #[garde(range(min = -180.0, max = 180.0))]
    pub gps_lon: Option<f64>,
    #[garde(range(min = -1000.0, max = 100000.0))]
    pub gps_alt: Option<f64>,
    #[garde(range(min = 0, max = 6))]
    pub gps_fix: Option<i16>,
    #[garde(range(min = 0, max = 64))]
    pub gps_sats: Option<i16>,

    // Battery
    #[garde(range(min = 0.0, max = 60.0))]
    pub bat_v: Option<f64>,
    #[garde(range(min = 0.0, max = 500.0))]
    pub bat_a: Option<f64>,
    #[garde(range(min = 0.0, max = 100.0))]
    pub bat_pct: Option<f64>,

    // Motor PWM outputs
    #[garde(range(min = 0, max = 2500))]
    pub motor1: Option<i32>,
    #[garde(range(min = 0, max = 2500))]
    pub motor2: Option<i32>,
    #[garde(range(min = 0, max = 2500))]
    pub motor3: Option<i32>,
    #[garde(range(min = 0, max = 2500))]
    pub motor4: Option<i32>,

    // PID gains
    #[garde(range(min = 0.0, max = 1000.0))]
    pub pid_p: Option<f64>,
    #[garde(range(min = 0.0, max = 1000.0))]
    pub pid_i: Option<f64>,
    #[garde(range(min = 0.0, max = 1000.0))]
    pub pid_d: Option<f64>,

    // RC stick inputs (PWM)
    #[garde(range(min = 800, max = 2200))]
    pub rc_throttle: Option<i32>,
    #[garde(range(min = 800, max = 2200))]
    pub rc_roll: Option<i32>,
    #[garde(range(min = 800, max = 2200))]
    pub rc_pitch: Option<i32>,
    #[garde(range(min = 800, max = 2200))]
    pub rc_yaw: Option<i32>,

    // Environmental sensors
    #[garde(range(min = -80.0, max = 150.0))]
    pub temp: Option<f64>,
    #[garde(range(min = 0.0, max = 2000.0))]
    pub baro_press: Option<f64>,
    #[garde(range(min = 0.0, max = 10000.0))]
    pub vibration: Option<f64>,
}

impl TelemetryRecord {
    /// Build and validate a record from already-parsed fields.
    ///
    /// The request layer hands over a map of field name to typed JSON value.
    /// Unknown keys are ignored (the raw line is preserved in `raw_data`);
    /// a wrong-typed or out-of-range value for a known field is a
    /// validation error naming that field.
    pub fn from_fields(fields: &Map<String, Value>) -> IngestResult<TelemetryRecord> {
        let record = TelemetryRecord {
            created_at: take_timestamp(fields, "created_at")?.unwrap_or_else(Utc::now),
            drone_id: take_string(fields, "drone_id")?,
            session_id: take_string(fields, "session_id")?,
            data_source: take_string(fields, "data_source")?,
            raw_data: take_string(fields, "raw_data")?,
            parser_version: take_string(fields, "parser_version")?,
            roll: take_f64(fields, "roll")?,
            pitch: take_f64(fields, "pitch")?,
            yaw: take_f64(fields, "yaw")?,
            alt: take_f64(fields, "alt")?,
            ground_speed: take_f64(fields, "ground_speed")?,
            climb_rate: take_f64(fields, "climb_rate")?,
            armed: take_bool(fields, "armed")?,
            flight_mode: take_string(fields, "flight_mode")?,
            gps_lat: take_f64(fields, "gps_lat")?,
            gps_lon: take_f64(fields, "gps_lon")?,
            gps_alt: take_f64(fields, "gps_alt")?,
            gps_fix: take_int(fields, "gps_fix")?,
            gps_sats: take_int(fields, "gps_sats")?,
            bat_v: take_f64(fields, "bat_v")?,
            bat_a: take_f64(fields, "bat_a")?,
            bat_pct: take_f64(fields, "bat_pct")?,
            motor1: take_int(fields, "motor1")?,
            motor2: take_int(fields, "motor2")?,
            motor3: take_int(fields, "motor3")?,
            motor4: take_int(fields, "motor4")?,
            pid_p: take_f64(fields, "pid_p")?,
            pid_i: take_f64(fields, "pid_i")?,
            pid_d: take_f64(fields, "pid_d")?,
            rc_throttle: take_int(fields, "rc_throttle")?,
            rc_roll: take_int(fields, "rc_roll")?,
            rc_pitch: take_int(fields, "rc_pitch")?,
            rc_yaw: take_int(fields, "rc_yaw")?,
            temp: take_f64(fields, "temp")?,
            baro_press: take_f64(fields, "baro_press")?,
            vibration: take_f64(fields, "vibration")?,
        };

        validate_record(&record)?;
        Ok(record)
    }
}

/// Convert a garde validation report to a domain error naming the field
fn validate_record(record: &TelemetryRecord) -> IngestResult<()> {
    record.validate().map_err(|report| {
        let (path, error) = report
            .iter()
            .next()
            .map(|(path, error)| (path.to_string(), error.message().to_string()))
            .unwrap_or_else(|| ("record".to_string(), "invalid".to_string()));
        IngestError::Validation {
            field: path,
            reason: error,
        }
    })
}

fn take_f64(fields: &Map<String, Value>, key: &str) -> IngestResult<Option<f64>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| IngestError::Validation {
            field: key.to_string(),
            reason: format!("not representable as f64: {n}"),
        }),
        Some(other) => Err(non_numeric(key, other)),
    }
}

fn take_int<T>(fields: &Map<String, Value>, key: &str) -> IngestResult<Option<T>>
where
    T: TryFrom<i64>,
{
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let wide = n.as_i64().ok_or_else(|| IngestError::Validation {
                field: key.to_string(),
                reason: format!("not an integer: {n}"),
            })?;
            T::try_from(wide).map(Some).map_err(|_| IngestError::Validation {
                field: key.to_string(),
                reason: format!("integer out of range: {wide}"),
            })
        }
        Some(other) => Err(non_numeric(key, other)),
    }
}

fn take_bool(fields: &Map<String, Value>, key: &str) -> IngestResult<Option<bool>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        // Parsers commonly emit armed as 0/1
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(IngestError::Validation {
                field: key.to_string(),
                reason: format!("expected boolean or 0/1, got {n}"),
            }),
        },
        Some(other) => Err(IngestError::Validation {
            field: key.to_string(),
            reason: format!("expected boolean, got {other}"),
        }),
    }
}

fn take_string(fields: &Map<String, Value>, key: &str) -> IngestResult<Option<String>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(IngestError::Validation {
            field: key.to_string(),
            reason: format!("expected string, got {other}"),
        }),
    }
}

fn take_timestamp(fields: &Map<String, Value>, key: &str) -> IngestResult<Option<DateTime<Utc>>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|e| IngestError::Validation {
                field: key.to_string(),
                reason: format!("invalid RFC 3339 timestamp: {e}"),
            }),
        Some(other) => Err(IngestError::Validation {
            field: key.to_string(),
            reason: format!("expected RFC 3339 timestamp string, got {other}"),
        }),
    }
}

fn non_numeric(key: &str, value: &Value) -> IngestError {
    IngestError::Validation {
        field: key.to_string(),
        reason: format!("expected numeric value, got {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_from_fields_full_sample() {
        let map = fields(json!({
            "drone_id": "drone-42",
            "created_at": "2026-08-30T12:00:00Z",
            "roll": 15.2,
            "pitch": 8.1,
            "yaw": 45.0,
            "alt": 150.0,
            "gps_lat": 48.2082,
            "gps_lon": 16.3738,
            "bat_v": 12.4,
            "armed": 1,
            "motor1": 1520,
            "raw_data": "roll:15.2,pitch:8.1,yaw:45.0,alt:150,bat_v:12.4,armed:1"
        }));

        let record = TelemetryRecord::from_fields(&map).unwrap();
        assert_eq!(record.drone_id.as_deref(), Some("drone-42"));
        assert_eq!(record.roll, Some(15.2));
        assert_eq!(record.armed, Some(true));
        assert_eq!(record.motor1, Some(1520));
        assert_eq!(record.created_at.to_rfc3339(), "2026-08-30T12:00:00+00:00");
        // Absent optional fields stay unknown, never zero
        assert_eq!(record.gps_sats, None);
        assert_eq!(record.bat_pct, None);
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        let before = Utc::now();
        let record = TelemetryRecord::from_fields(&fields(json!({ "roll": 1.0 }))).unwrap();
        assert!(record.created_at >= before);
        assert!(record.created_at <= Utc::now());
    }

    #[test]
    fn test_non_numeric_field_names_offender() {
        let result = TelemetryRecord::from_fields(&fields(json!({ "bat_v": "plenty" })));
        match result {
            Err(IngestError::Validation { field, .. }) => assert_eq!(field, "bat_v"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_field_names_offender() {
        let result = TelemetryRecord::from_fields(&fields(json!({ "gps_lat": 123.0 })));
        match result {
            Err(IngestError::Validation { field, .. }) => assert_eq!(field, "gps_lat"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_non_integral_pwm_rejected() {
        let result = TelemetryRecord::from_fields(&fields(json!({ "motor2": 1500.5 })));
        match result {
            Err(IngestError::Validation { field, .. }) => assert_eq!(field, "motor2"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let map = fields(json!({ "roll": 2.0, "parse_error": "oops", "extra": 7 }));
        assert!(TelemetryRecord::from_fields(&map).is_ok());
    }
}
