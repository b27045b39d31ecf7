//! Room and client records.
//!
//! These are the values the room actor owns and hands out as copies. They
//! derive `Clone` so every value leaving the actor is an independent copy.

use chrono::{DateTime, Utc};
use common::secret::SecretString;
use common::types::{AppId, ClientId, RoomId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Property map attached to rooms and clients.
pub type Props = BTreeMap<String, serde_json::Value>;

/// Durable room record.
///
/// `created` travels as integer seconds since the epoch; sub-second precision
/// is dropped on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: RoomId,
    pub app_id: AppId,
    pub host_id: u32,
    pub visible: bool,
    pub watchable: bool,
    pub search_group: u32,
    /// Client inactivity deadline in seconds. Zero selects the service default.
    pub client_deadline: u32,
    pub max_players: u32,
    pub players: u32,
    pub public_props: Props,
    pub private_props: Props,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created: DateTime<Utc>,
    /// Human-friendly room number, present when requested at creation.
    pub number: Option<i32>,
}

/// Per-client attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub id: ClientId,
    #[serde(default)]
    pub props: Props,
    /// Position in the room's join order, assigned on admission. The master is 0.
    #[serde(default)]
    pub join_order: u32,
}

impl ClientInfo {
    /// Client info with no properties.
    #[must_use]
    pub fn new(id: impl Into<ClientId>) -> Self {
        Self {
            id: id.into(),
            props: Props::new(),
            join_order: 0,
        }
    }
}

/// Options supplied by the master when creating a room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomOption {
    pub visible: bool,
    pub watchable: bool,
    pub search_group: u32,
    pub client_deadline: u32,
    pub max_players: u32,
    /// Assign a random room number in `[1, max_room_number]`.
    pub with_number: bool,
    pub public_props: Props,
    pub private_props: Props,
}

/// Tenant application and its shared key.
#[derive(Debug, Clone)]
pub struct App {
    pub id: AppId,
    pub key: SecretString,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn sample_room() -> RoomInfo {
        RoomInfo {
            id: RoomId::from("00112233aabbccdd"),
            app_id: AppId::from("testapp"),
            host_id: 1,
            visible: true,
            watchable: false,
            search_group: 3,
            client_deadline: 10,
            max_players: 4,
            players: 1,
            public_props: Props::from([("mode".to_string(), serde_json::json!("duel"))]),
            private_props: Props::new(),
            created: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
                + TimeDelta::milliseconds(678),
            number: Some(42),
        }
    }

    #[test]
    fn test_created_serializes_as_integer_seconds() {
        let room = sample_room();
        let json = serde_json::to_value(&room).unwrap();

        assert_eq!(json["created"], room.created.timestamp());

        let back: RoomInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back.created.timestamp(), room.created.timestamp());
        assert_eq!(back.created.timestamp_subsec_millis(), 0);
        assert_eq!(back.id, room.id);
        assert_eq!(back.public_props, room.public_props);
    }

    #[test]
    fn test_clone_is_independent() {
        let room = sample_room();
        let mut copy = room.clone();
        copy.players = 3;
        copy.public_props.insert("mode".to_string(), serde_json::json!("ffa"));

        assert_eq!(room.players, 1);
        assert_eq!(room.public_props["mode"], "duel");
    }

    #[test]
    fn test_room_option_defaults_missing_fields() {
        let op: RoomOption = serde_json::from_str(r#"{"max_players": 8}"#).unwrap();
        assert_eq!(op.max_players, 8);
        assert!(!op.with_number);
        assert!(op.public_props.is_empty());
    }

    #[test]
    fn test_app_debug_redacts_key() {
        let app = App {
            id: AppId::from("testapp"),
            key: SecretString::from("testapppkey"),
        };
        let debug = format!("{app:?}");
        assert!(debug.contains("testapp"));
        assert!(!debug.contains("testapppkey"));
    }
}
