//! Mapping of PostgreSQL failures onto the engine's StoreError taxonomy.
//!
//! The commit engine's retry decisions ride on this mapping, so it lives in
//! one pure, tested place instead of being scattered across repositories.

use skylog_domain::StoreError;

/// Classify a failed statement by SQLSTATE and message.
pub fn classify_sqlstate(code: &str, message: &str) -> StoreError {
    // Partition routing failure reports check_violation, but the message is
    // unambiguous and must not be treated as a per-record constraint problem
    if message.contains("no partition of relation") {
        return StoreError::PartitionGap(message.to_string());
    }

    match code {
        // unique_violation, check_violation, not_null/foreign key violations:
        // content problems, retrying identical content cannot succeed
        "23505" | "23514" | "23502" | "23503" => StoreError::Rejected(message.to_string()),
        // serialization_failure, deadlock_detected
        "40001" | "40P01" => StoreError::Transient(message.to_string()),
        // too_many_connections / configured_limit_exceeded
        "53300" | "53400" => StoreError::PoolExhausted(message.to_string()),
        // any connection exception class
        code if code.starts_with("08") => StoreError::Transient(message.to_string()),
        // admin shutdown / crash shutdown: worth retrying after backoff
        "57P01" | "57P02" | "57P03" => StoreError::Transient(message.to_string()),
        _ => StoreError::Fatal(format!("{code}: {message}")),
    }
}

/// Classify a tokio-postgres error, including transport-level failures that
/// carry no SQLSTATE.
pub fn classify_pg_error(error: &tokio_postgres::Error) -> StoreError {
    if let Some(db_error) = error.as_db_error() {
        return classify_sqlstate(db_error.code().code(), db_error.message());
    }
    if error.is_closed() {
        return StoreError::Transient(format!("connection closed: {error}"));
    }
    // I/O level failure (reset, timeout) without a server response
    StoreError::Transient(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_key_is_rejected_not_retried() {
        let err = classify_sqlstate("23505", "duplicate key value violates unique constraint");
        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_partition_routing_failure_is_partition_gap() {
        let err = classify_sqlstate(
            "23514",
            "no partition of relation \"telemetry\" found for row",
        );
        assert!(matches!(err, StoreError::PartitionGap(_)));
    }

    #[test]
    fn test_serialization_conflict_is_transient() {
        assert!(classify_sqlstate("40001", "could not serialize access").is_retryable());
        assert!(classify_sqlstate("40P01", "deadlock detected").is_retryable());
    }

    #[test]
    fn test_connection_class_is_transient() {
        assert!(classify_sqlstate("08006", "connection failure").is_retryable());
        assert!(classify_sqlstate("08000", "connection exception").is_retryable());
    }

    #[test]
    fn test_pool_limits_surface_as_pool_exhausted() {
        let err = classify_sqlstate("53300", "too many connections");
        assert!(matches!(err, StoreError::PoolExhausted(_)));
    }

    #[test]
    fn test_unknown_code_is_fatal() {
        let err = classify_sqlstate("42P01", "relation \"telemetry\" does not exist");
        assert!(matches!(err, StoreError::Fatal(_)));
    }
}
