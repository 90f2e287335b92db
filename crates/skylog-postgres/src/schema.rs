//! Bootstrap DDL for the telemetry layout: the partitioned base table and
//! the derived rollup views. Everything here is `IF NOT EXISTS` idempotent;
//! partitions themselves are owned by the partition manager.

use tracing::info;

use skylog_domain::StoreResult;

use crate::classify::classify_pg_error;
use crate::client::PostgresClient;

const CREATE_TELEMETRY_TABLE: &str = "
CREATE TABLE IF NOT EXISTS telemetry (
    id              BIGINT GENERATED ALWAYS AS IDENTITY,
    created_at      TIMESTAMPTZ NOT NULL,
    drone_id        TEXT,
    session_id      TEXT,
    data_source     TEXT,
    raw_data        TEXT,
    parser_version  TEXT,
    roll            DOUBLE PRECISION,
    pitch           DOUBLE PRECISION,
    yaw             DOUBLE PRECISION,
    alt             DOUBLE PRECISION,
    ground_speed    DOUBLE PRECISION,
    climb_rate      DOUBLE PRECISION,
    armed           BOOLEAN,
    flight_mode     TEXT,
    gps_lat         DOUBLE PRECISION,
    gps_lon         DOUBLE PRECISION,
    gps_alt         DOUBLE PRECISION,
    gps_fix         SMALLINT,
    gps_sats        SMALLINT,
    bat_v           DOUBLE PRECISION,
    bat_a           DOUBLE PRECISION,
    bat_pct         DOUBLE PRECISION,
    motor1          INTEGER,
    motor2          INTEGER,
    motor3          INTEGER,
    motor4          INTEGER,
    pid_p           DOUBLE PRECISION,
    pid_i           DOUBLE PRECISION,
    pid_d           DOUBLE PRECISION,
    rc_throttle     INTEGER,
    rc_roll         INTEGER,
    rc_pitch        INTEGER,
    rc_yaw          INTEGER,
    temp            DOUBLE PRECISION,
    baro_press      DOUBLE PRECISION,
    vibration       DOUBLE PRECISION,
    PRIMARY KEY (id, created_at)
) PARTITION BY RANGE (created_at);
";

const CREATE_DAILY_SUMMARY: &str = "
CREATE MATERIALIZED VIEW IF NOT EXISTS telemetry_daily_summary AS
SELECT
    date_trunc('day', created_at)               AS bucket,
    COALESCE(data_source, 'unknown')            AS data_source,
    count(*)                                    AS record_count,
    count(DISTINCT drone_id)                    AS distinct_drones,
    percentile_cont(0.50) WITHIN GROUP (ORDER BY bat_v) AS bat_v_p50,
    percentile_cont(0.95) WITHIN GROUP (ORDER BY bat_v) AS bat_v_p95,
    percentile_cont(0.99) WITHIN GROUP (ORDER BY bat_v) AS bat_v_p99,
    percentile_cont(0.50) WITHIN GROUP (ORDER BY alt)   AS alt_p50,
    percentile_cont(0.95) WITHIN GROUP (ORDER BY alt)   AS alt_p95,
    percentile_cont(0.99) WITHIN GROUP (ORDER BY alt)   AS alt_p99
FROM telemetry
GROUP BY 1, 2
WITH NO DATA;
";

const CREATE_HOURLY_SUMMARY: &str = "
CREATE MATERIALIZED VIEW IF NOT EXISTS telemetry_hourly_summary AS
SELECT
    date_trunc('hour', created_at)              AS bucket,
    COALESCE(data_source, 'unknown')            AS data_source,
    count(*)                                    AS record_count,
    count(DISTINCT drone_id)                    AS distinct_drones,
    percentile_cont(0.50) WITHIN GROUP (ORDER BY bat_v) AS bat_v_p50,
    percentile_cont(0.95) WITHIN GROUP (ORDER BY bat_v) AS bat_v_p95,
    percentile_cont(0.99) WITHIN GROUP (ORDER BY bat_v) AS bat_v_p99,
    percentile_cont(0.50) WITHIN GROUP (ORDER BY alt)   AS alt_p50,
    percentile_cont(0.95) WITHIN GROUP (ORDER BY alt)   AS alt_p95,
    percentile_cont(0.99) WITHIN GROUP (ORDER BY alt)   AS alt_p99
FROM telemetry
GROUP BY 1, 2
WITH NO DATA;
";

// REFRESH ... CONCURRENTLY requires a unique index covering the grouping key
const CREATE_SUMMARY_INDEXES: &str = "
CREATE UNIQUE INDEX IF NOT EXISTS telemetry_daily_summary_bucket_idx
    ON telemetry_daily_summary (bucket, data_source);
CREATE UNIQUE INDEX IF NOT EXISTS telemetry_hourly_summary_bucket_idx
    ON telemetry_hourly_summary (bucket, data_source);
";

/// Create the telemetry table and rollup views if they do not exist yet
pub async fn ensure_schema(client: &PostgresClient) -> StoreResult<()> {
    let conn = client.get_connection().await?;

    for statement in [
        CREATE_TELEMETRY_TABLE,
        CREATE_DAILY_SUMMARY,
        CREATE_HOURLY_SUMMARY,
        CREATE_SUMMARY_INDEXES,
    ] {
        conn.batch_execute(statement)
            .await
            .map_err(|e| classify_pg_error(&e))?;
    }

    info!("telemetry schema ensured");
    Ok(())
}
