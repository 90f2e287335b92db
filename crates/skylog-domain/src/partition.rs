//! Calendar-month partition planning for the telemetry table.
//!
//! All planning here is pure: the layout manager lists what exists, asks
//! this module what is missing or expired, and only then issues DDL. That
//! keeps the idempotence and retention invariants testable without a
//! database.

use chrono::{DateTime, Datelike, TimeZone, Utc};

/// Number of future monthly partitions kept provisioned ahead of now
pub const DEFAULT_HORIZON_MONTHS: u32 = 3;

/// Default maximum age of telemetry before partition retirement
pub const DEFAULT_RETENTION_MONTHS: u32 = 12;

/// One calendar-month slice of the telemetry table, half-open `[lower, upper)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    pub name: String,
    pub lower: DateTime<Utc>,
    pub upper: DateTime<Utc>,
}

/// Truncate a timestamp to the first instant of its calendar month
pub fn month_floor(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(ts.year(), ts.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(ts)
}

/// Shift a month start by a signed number of calendar months
fn shift_months(month_start: DateTime<Utc>, months: i32) -> DateTime<Utc> {
    let zero_based = month_start.year() * 12 + month_start.month() as i32 - 1 + months;
    let year = zero_based.div_euclid(12);
    let month = zero_based.rem_euclid(12) as u32 + 1;
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(month_start)
}

/// The partition covering a given timestamp
pub fn partition_for(ts: DateTime<Utc>) -> PartitionSpec {
    let lower = month_floor(ts);
    let upper = shift_months(lower, 1);
    PartitionSpec {
        name: partition_name(lower),
        lower,
        upper,
    }
}

/// Partition table name for the month starting at `lower`,
/// e.g. `telemetry_y2026m08`
pub fn partition_name(lower: DateTime<Utc>) -> String {
    format!("telemetry_y{:04}m{:02}", lower.year(), lower.month())
}

/// Parse a partition name back into its spec; `None` for foreign tables
pub fn parse_partition_name(name: &str) -> Option<PartitionSpec> {
    let rest = name.strip_prefix("telemetry_y")?;
    let (year, month) = rest.split_once('m')?;
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let lower = Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).single()?;
    Some(PartitionSpec {
        name: name.to_string(),
        lower,
        upper: shift_months(lower, 1),
    })
}

/// Partitions required to cover `[month_floor(as_of), +horizon_months)`
pub fn partitions_covering(as_of: DateTime<Utc>, horizon_months: u32) -> Vec<PartitionSpec> {
    let start = month_floor(as_of);
    (0..horizon_months.max(1) as i32)
        .map(|offset| {
            let lower = shift_months(start, offset);
            PartitionSpec {
                name: partition_name(lower),
                lower,
                upper: shift_months(lower, 1),
            }
        })
        .collect()
}

/// Plan the partitions that must be created so the horizon is covered.
/// Idempotent: already-existing names are excluded.
pub fn missing_partitions(
    existing: &[PartitionSpec],
    as_of: DateTime<Utc>,
    horizon_months: u32,
) -> Vec<PartitionSpec> {
    partitions_covering(as_of, horizon_months)
        .into_iter()
        .filter(|candidate| !existing.iter().any(|p| p.name == candidate.name))
        .collect()
}

/// Plan the partitions eligible for retirement: upper bound strictly older
/// than `now - retention_months`. A partition overlapping the retention
/// window is never selected.
pub fn expired_partitions(
    existing: &[PartitionSpec],
    now: DateTime<Utc>,
    retention_months: u32,
) -> Vec<PartitionSpec> {
    let cutoff = shift_months(month_floor(now), -(retention_months as i32));
    existing
        .iter()
        .filter(|p| p.upper <= cutoff)
        .cloned()
        .collect()
}
