use serde::{Deserialize, Serialize};
use tokio_postgres::types::ToSql;

use skylog_domain::TelemetryRecord;

/// Column order shared by the bulk insert builder and the schema DDL
pub const INSERT_COLUMNS: [&str; 36] = [
    "created_at",
    "drone_id",
    "session_id",
    "data_source",
    "raw_data",
    "parser_version",
    "roll",
    "pitch",
    "yaw",
    "alt",
    "ground_speed",
    "climb_rate",
    "armed",
    "flight_mode",
    "gps_lat",
    "gps_lon",
    "gps_alt",
    "gps_fix",
    "gps_sats",
    "bat_v",
    "bat_a",
    "bat_pct",
    "motor1",
    "motor2",
    "motor3",
    "motor4",
    "pid_p",
    "pid_i",
    "pid_d",
    "rc_throttle",
    "rc_roll",
    "rc_pitch",
    "rc_yaw",
    "temp",
    "baro_press",
    "vibration",
];

/// Bind one record's fields in INSERT_COLUMNS order
pub fn insert_params(r: &TelemetryRecord) -> Vec<&(dyn ToSql + Sync)> {
    vec![
        &r.created_at,
        &r.drone_id,
        &r.session_id,
        &r.data_source,
        &r.raw_data,
        &r.parser_version,
        &r.roll,
        &r.pitch,
        &r.yaw,
        &r.alt,
        &r.ground_speed,
        &r.climb_rate,
        &r.armed,
        &r.flight_mode,
        &r.gps_lat,
        &r.gps_lon,
        &r.gps_alt,
        &r.gps_fix,
        &r.gps_sats,
        &r.bat_v,
        &r.bat_a,
        &r.bat_pct,
        &r.motor1,
        &r.motor2,
        &r.motor3,
        &r.motor4,
        &r.pid_p,
        &r.pid_i,
        &r.pid_d,
        &r.rc_throttle,
        &r.rc_roll,
        &r.rc_pitch,
        &r.rc_yaw,
        &r.temp,
        &r.baro_press,
        &r.vibration,
    ]
}

/// Per-partition size and row statistics for operational diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionStat {
    pub partition: String,
    pub total_bytes: i64,
    pub live_rows: i64,
}

/// Index usage statistics for operational diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexUsage {
    pub index: String,
    pub scans: i64,
    pub size_bytes: i64,
}
