use std::fmt;

/// Derived rollup windows over the base telemetry table.
///
/// Rollups are recomputable, never authoritative: each is a materialized
/// aggregate keyed by (time bucket, data source) that a refresh rebuilds
/// from committed base data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollupWindow {
    Daily,
    Hourly,
}

impl RollupWindow {
    pub const ALL: [RollupWindow; 2] = [RollupWindow::Daily, RollupWindow::Hourly];

    /// Name of the materialized view backing this window
    pub fn view_name(&self) -> &'static str {
        match self {
            RollupWindow::Daily => "telemetry_daily_summary",
            RollupWindow::Hourly => "telemetry_hourly_summary",
        }
    }
}

impl fmt::Display for RollupWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.view_name())
    }
}
