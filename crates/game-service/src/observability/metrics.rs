//! Metrics definitions for the game service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `game_` prefix
//! - `_total` suffix for counters
//!
//! # Cardinality
//!
//! Labels are bounded by code:
//! - `reason`: leave reasons (4), join rejections (3), create failures (4),
//!   auth failures (5)
//! - `kind`: room queue message kinds (4)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// # Errors
///
/// Returns error if the recorder or listener cannot be installed.
pub fn init_metrics_exporter(listen: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(listen)
        // Room id allocation attempts, 1..retry_count
        .set_buckets_for_metric(
            Matcher::Full("game_room_id_attempts".to_string()),
            &[1.0, 2.0, 3.0, 5.0, 8.0, 13.0],
        )
        .map_err(|e| format!("Failed to set room id attempt buckets: {e}"))?
        // Database query latency buckets (p99 < 50ms)
        .set_buckets_for_metric(
            Matcher::Prefix("game_db".to_string()),
            &[0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000],
        )
        .map_err(|e| format!("Failed to set database latency buckets: {e}"))?
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))
}

// ============================================================================
// Room Lifecycle
// ============================================================================

/// Record a successful room creation.
///
/// Metric: `game_rooms_created_total`
pub fn record_room_created() {
    counter!("game_rooms_created_total").increment(1);
}

/// Record a failed room creation.
///
/// Metric: `game_room_create_failures_total`
/// Labels: `reason` (begin, exhausted, cancelled, commit)
pub fn record_room_create_failure(reason: &str) {
    counter!("game_room_create_failures_total", "reason" => reason.to_string()).increment(1);
}

/// Record how many ids were drawn before an insert succeeded or gave up.
///
/// Metric: `game_room_id_attempts`
pub fn record_room_id_attempts(attempts: u32) {
    histogram!("game_room_id_attempts").record(f64::from(attempts));
}

/// Record a room actor registered with a repository.
///
/// Metric: `game_rooms_active`
pub fn record_room_opened() {
    gauge!("game_rooms_active").increment(1.0);
}

/// Record a room actor unregistered after it closed.
///
/// Metric: `game_rooms_active`
pub fn record_room_closed() {
    gauge!("game_rooms_active").decrement(1.0);
}

// ============================================================================
// Membership
// ============================================================================

/// Metric: `game_clients_joined_total`
pub fn record_client_joined() {
    counter!("game_clients_joined_total").increment(1);
}

/// Record a member removal.
///
/// Metric: `game_clients_removed_total`
/// Labels: `reason` (timeout, disconnected, delivery_failed, aborted)
pub fn record_client_removed(reason: &str) {
    counter!("game_clients_removed_total", "reason" => reason.to_string()).increment(1);
}

/// Record a rejected join.
///
/// Metric: `game_join_rejections_total`
/// Labels: `reason` (full, conflict, closed)
pub fn record_join_rejected(reason: &str) {
    counter!("game_join_rejections_total", "reason" => reason.to_string()).increment(1);
}

// ============================================================================
// Room Queue
// ============================================================================

/// Metric: `game_room_messages_total`
/// Labels: `kind` (create, join, leave, client)
pub fn record_room_message(kind: &str) {
    counter!("game_room_messages_total", "kind" => kind.to_string()).increment(1);
}

/// Record a message discarded while a room drains.
///
/// Metric: `game_room_messages_discarded_total`
pub fn record_message_discarded() {
    counter!("game_room_messages_discarded_total").increment(1);
}

// ============================================================================
// Database
// ============================================================================

/// Record a store query.
///
/// Metrics: `game_db_queries_total`, `game_db_query_duration_seconds`
/// Labels: `operation` (load_apps, begin, insert_room, update_room, commit,
/// rollback), `status` (success, error)
pub fn record_db_query(operation: &str, status: &str, duration: Duration) {
    counter!("game_db_queries_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!("game_db_query_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

// ============================================================================
// Auth
// ============================================================================

/// Metric: `game_auth_failures_total`
/// Labels: `reason` (invalid_hash, user_mismatch, expired, malformed, entropy)
pub fn record_auth_failure(reason: &str) {
    counter!("game_auth_failures_total", "reason" => reason.to_string()).increment(1);
}
