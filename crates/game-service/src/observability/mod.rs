//! Observability for the game service.
//!
//! All instrumentation uses `#[instrument(skip_all)]` with explicit fields.
//! Room and client ids are the only identifiers logged; application keys
//! and auth hashes never are.
//!
//! # Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `game_rooms_created_total` | Counter | none |
//! | `game_room_create_failures_total` | Counter | `reason` |
//! | `game_room_id_attempts` | Histogram | none |
//! | `game_rooms_active` | Gauge | none |
//! | `game_clients_joined_total` | Counter | none |
//! | `game_clients_removed_total` | Counter | `reason` |
//! | `game_join_rejections_total` | Counter | `reason` |
//! | `game_room_messages_total` | Counter | `kind` |
//! | `game_room_messages_discarded_total` | Counter | none |
//! | `game_db_queries_total` | Counter | `operation`, `status` |
//! | `game_db_query_duration_seconds` | Histogram | `operation` |
//! | `game_auth_failures_total` | Counter | `reason` |

pub mod metrics;

pub use metrics::init_metrics_exporter;
