//! Pre-configured test data fixtures for game service testing.
//!
//! Provides builders and test data for:
//! - Clients with properties
//! - Room options
//! - Applications, configuration and repositories backed by [`MockRoomStore`]
//! - Auth data signed with the test application key

use crate::mock_store::MockRoomStore;
use chrono::{DateTime, Utc};
use common::secret::SecretString;
use common::types::AppId;
use game_service::auth::{self, AuthData};
use game_service::config::GameConfig;
use game_service::game::{Repository, RoomSettings, RoomStore};
use game_service::models::{App, ClientInfo, Props, RoomOption};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Application id used by [`test_app`].
pub const TEST_APP_ID: &str = "testapp";

/// Application key used by [`test_app`].
pub const TEST_APP_KEY: &str = "testapp-secret-key";

/// Test client fixture.
#[derive(Debug, Clone)]
pub struct TestClient {
    /// Client ID.
    pub id: String,
    /// Client properties.
    pub props: Props,
}

impl TestClient {
    /// Create a test client with the given ID and no properties.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            props: Props::new(),
        }
    }

    /// Create a test client with a random ID.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("client-{}", Uuid::new_v4()))
    }

    /// Add a property.
    #[must_use]
    pub fn with_prop(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn build(self) -> ClientInfo {
        let mut info = ClientInfo::new(self.id);
        info.props = self.props;
        info
    }
}

/// Room option fixture. Visible, watchable, four players, default deadline.
#[derive(Debug, Clone)]
pub struct TestRoomOption {
    option: RoomOption,
}

impl Default for TestRoomOption {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRoomOption {
    #[must_use]
    pub fn new() -> Self {
        Self {
            option: RoomOption {
                visible: true,
                watchable: true,
                max_players: 4,
                ..RoomOption::default()
            },
        }
    }

    /// Set the maximum number of players.
    #[must_use]
    pub fn with_max_players(mut self, max: u32) -> Self {
        self.option.max_players = max;
        self
    }

    /// Set the client inactivity deadline in seconds.
    #[must_use]
    pub fn with_client_deadline(mut self, seconds: u32) -> Self {
        self.option.client_deadline = seconds;
        self
    }

    /// Request a room number.
    #[must_use]
    pub fn with_number(mut self) -> Self {
        self.option.with_number = true;
        self
    }

    #[must_use]
    pub fn with_search_group(mut self, group: u32) -> Self {
        self.option.search_group = group;
        self
    }

    /// Add a public property.
    #[must_use]
    pub fn with_public_prop(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.option.public_props.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn build(self) -> RoomOption {
        self.option
    }
}

/// The test application.
#[must_use]
pub fn test_app() -> App {
    App {
        id: AppId::from(TEST_APP_ID),
        key: SecretString::from(TEST_APP_KEY.to_string()),
    }
}

/// Game configuration with a short default deadline and small retry bound.
#[must_use]
pub fn test_game_config() -> GameConfig {
    GameConfig {
        host_id: 1,
        retry_count: 5,
        max_room_number: 999,
        room: RoomSettings {
            default_client_deadline: Duration::from_secs(5),
            ..RoomSettings::default()
        },
    }
}

/// Repository for [`test_app`] backed by `store`.
#[must_use]
pub fn test_repository(store: &MockRoomStore, config: GameConfig) -> Repository {
    let store: Arc<dyn RoomStore> = Arc::new(store.clone());
    Repository::new(test_app(), config, store)
}

/// Auth data for `user_id` signed with [`TEST_APP_KEY`].
#[must_use]
pub fn test_auth_data(user_id: &str, issued_at: DateTime<Utc>) -> AuthData {
    auth::generate_auth_data(TEST_APP_KEY.as_bytes(), user_id, issued_at)
        .expect("system RNG should be available in tests")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder() {
        let info = TestClient::new("alice")
            .with_prop("level", serde_json::json!(3))
            .build();

        assert_eq!(info.id.as_str(), "alice");
        assert_eq!(info.props.get("level"), Some(&serde_json::json!(3)));
        assert_eq!(info.join_order, 0);
    }

    #[test]
    fn test_random_clients_differ() {
        assert_ne!(TestClient::random().id, TestClient::random().id);
    }

    #[test]
    fn test_room_option_builder() {
        let option = TestRoomOption::new()
            .with_max_players(2)
            .with_number()
            .with_client_deadline(10)
            .build();

        assert_eq!(option.max_players, 2);
        assert!(option.with_number);
        assert_eq!(option.client_deadline, 10);
        assert!(option.visible);
    }
}
