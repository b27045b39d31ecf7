//! In-memory room store.
//!
//! Behaves like the PostgreSQL store as far as the repository can observe:
//! inserts are visible to the store only after commit, and an insert whose
//! id is already stored (or pending in the same transaction) is rejected.
//!
//! Failures can be injected per store:
//! - reject every insert, or only the first N
//! - fail `begin` or `commit`
//! - cancel a token when a given insert attempt is made
//!
//! # Example
//!
//! ```rust,ignore
//! use game_test_utils::MockRoomStore;
//!
//! let store = MockRoomStore::new()
//!     .with_app("testapp", "secret")
//!     .reject_first_inserts(3);
//!
//! // ... create a room through a repository ...
//!
//! assert_eq!(store.insert_attempts(), 4);
//! assert_eq!(store.commits(), 1);
//! ```

use async_trait::async_trait;
use common::secret::SecretString;
use common::types::{AppId, RoomId};
use game_service::errors::GameError;
use game_service::game::{RoomStore, RoomTransaction};
use game_service::models::{App, RoomInfo};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Mock room store for repository tests.
#[derive(Debug, Clone)]
pub struct MockRoomStore {
    inner: Arc<Mutex<MockRoomStoreInner>>,
}

#[derive(Debug, Default)]
struct MockRoomStoreInner {
    /// Registered applications as (id, key)
    apps: Vec<(String, String)>,
    /// Committed room records
    rooms: HashMap<RoomId, RoomInfo>,
    /// Records written through `update_room`
    updates: Vec<RoomInfo>,
    /// Reject every insert
    reject_all: bool,
    /// Reject this many inserts before accepting
    reject_remaining: u32,
    fail_begin: bool,
    fail_commit: bool,
    /// Cancel the token when this attempt number is reached
    cancel_on: Option<(u32, CancellationToken)>,
    insert_attempts: u32,
    commits: u32,
    rollbacks: u32,
}

impl Default for MockRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRoomStore {
    /// Create an empty store that accepts every insert.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockRoomStoreInner::default())),
        }
    }

    /// Register an application.
    #[must_use]
    pub fn with_app(self, id: impl Into<String>, key: impl Into<String>) -> Self {
        self.inner.lock().unwrap().apps.push((id.into(), key.into()));
        self
    }

    /// Pre-populate a committed room record.
    #[must_use]
    pub fn with_room(self, info: RoomInfo) -> Self {
        self.inner
            .lock()
            .unwrap()
            .rooms
            .insert(info.id.clone(), info);
        self
    }

    /// Reject every insert as a duplicate.
    #[must_use]
    pub fn reject_all_inserts(self) -> Self {
        self.inner.lock().unwrap().reject_all = true;
        self
    }

    /// Reject the first `n` inserts as duplicates, then accept.
    #[must_use]
    pub fn reject_first_inserts(self, n: u32) -> Self {
        self.inner.lock().unwrap().reject_remaining = n;
        self
    }

    /// Fail every `begin`.
    #[must_use]
    pub fn fail_begin(self) -> Self {
        self.inner.lock().unwrap().fail_begin = true;
        self
    }

    /// Fail every `commit`.
    #[must_use]
    pub fn fail_commit(self) -> Self {
        self.inner.lock().unwrap().fail_commit = true;
        self
    }

    /// Cancel `token` when insert attempt `attempt` (1-based) is made.
    /// The attempt itself is rejected.
    #[must_use]
    pub fn cancel_on_attempt(self, attempt: u32, token: CancellationToken) -> Self {
        self.inner.lock().unwrap().cancel_on = Some((attempt, token));
        self
    }

    /// Total inserts attempted across all transactions.
    pub fn insert_attempts(&self) -> u32 {
        self.inner.lock().unwrap().insert_attempts
    }

    pub fn commits(&self) -> u32 {
        self.inner.lock().unwrap().commits
    }

    pub fn rollbacks(&self) -> u32 {
        self.inner.lock().unwrap().rollbacks
    }

    /// Committed room record by id.
    pub fn room(&self, id: &RoomId) -> Option<RoomInfo> {
        self.inner.lock().unwrap().rooms.get(id).cloned()
    }

    /// Number of committed rooms.
    pub fn room_count(&self) -> usize {
        self.inner.lock().unwrap().rooms.len()
    }

    /// Records written through `update_room`, oldest first.
    pub fn updates(&self) -> Vec<RoomInfo> {
        self.inner.lock().unwrap().updates.clone()
    }
}

#[async_trait]
impl RoomStore for MockRoomStore {
    async fn load_apps(&self) -> Result<Vec<App>, GameError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .apps
            .iter()
            .map(|(id, key)| App {
                id: AppId::from(id.as_str()),
                key: SecretString::from(key.clone()),
            })
            .collect())
    }

    async fn begin(&self) -> Result<Box<dyn RoomTransaction>, GameError> {
        if self.inner.lock().unwrap().fail_begin {
            return Err(GameError::Database("mock: begin failed".to_string()));
        }
        Ok(Box::new(MockRoomTransaction {
            inner: Arc::clone(&self.inner),
            pending: Vec::new(),
        }))
    }

    async fn update_room(&self, info: &RoomInfo) -> Result<(), GameError> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.rooms.contains_key(&info.id) {
            return Err(GameError::RoomNotFound(info.id.clone()));
        }
        inner.rooms.insert(info.id.clone(), info.clone());
        inner.updates.push(info.clone());
        Ok(())
    }
}

/// Transaction over [`MockRoomStore`]. Inserts stay pending until commit.
#[derive(Debug)]
pub struct MockRoomTransaction {
    inner: Arc<Mutex<MockRoomStoreInner>>,
    pending: Vec<RoomInfo>,
}

fn duplicate_key(id: &RoomId) -> GameError {
    GameError::Database(format!(
        "mock: duplicate key value violates unique constraint \"room_pkey\" ({id})"
    ))
}

#[async_trait]
impl RoomTransaction for MockRoomTransaction {
    async fn insert_room(&mut self, info: &RoomInfo) -> Result<(), GameError> {
        let mut inner = self.inner.lock().unwrap();
        inner.insert_attempts += 1;
        let attempt = inner.insert_attempts;

        if let Some((at, token)) = &inner.cancel_on {
            if *at == attempt {
                token.cancel();
                return Err(duplicate_key(&info.id));
            }
        }

        if inner.reject_all {
            return Err(duplicate_key(&info.id));
        }
        if inner.reject_remaining > 0 {
            inner.reject_remaining -= 1;
            return Err(duplicate_key(&info.id));
        }
        if inner.rooms.contains_key(&info.id) || self.pending.iter().any(|r| r.id == info.id) {
            return Err(duplicate_key(&info.id));
        }

        drop(inner);
        self.pending.push(info.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), GameError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_commit {
            return Err(GameError::Database("mock: commit failed".to_string()));
        }
        for info in self.pending {
            inner.rooms.insert(info.id.clone(), info);
        }
        inner.commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), GameError> {
        self.inner.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use game_service::models::Props;

    fn room(id: &str) -> RoomInfo {
        RoomInfo {
            id: RoomId::from(id),
            app_id: AppId::from("testapp"),
            host_id: 1,
            visible: true,
            watchable: true,
            search_group: 0,
            client_deadline: 0,
            max_players: 4,
            players: 1,
            public_props: Props::new(),
            private_props: Props::new(),
            created: Utc::now(),
            number: None,
        }
    }

    #[tokio::test]
    async fn test_insert_visible_only_after_commit() {
        let store = MockRoomStore::new();
        let mut tx = store.begin().await.unwrap();

        tx.insert_room(&room("aaaa")).await.unwrap();
        assert_eq!(store.room_count(), 0);

        tx.commit().await.unwrap();
        assert!(store.room(&RoomId::from("aaaa")).is_some());
        assert_eq!(store.commits(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = MockRoomStore::new().with_room(room("aaaa"));
        let mut tx = store.begin().await.unwrap();

        assert!(tx.insert_room(&room("aaaa")).await.is_err());
        tx.insert_room(&room("bbbb")).await.unwrap();
        assert!(tx.insert_room(&room("bbbb")).await.is_err());
        assert_eq!(store.insert_attempts(), 3);
    }

    #[tokio::test]
    async fn test_rollback_discards_pending() {
        let store = MockRoomStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_room(&room("aaaa")).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.room_count(), 0);
        assert_eq!(store.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_reject_first_inserts() {
        let store = MockRoomStore::new().reject_first_inserts(2);
        let mut tx = store.begin().await.unwrap();

        assert!(tx.insert_room(&room("a")).await.is_err());
        assert!(tx.insert_room(&room("b")).await.is_err());
        assert!(tx.insert_room(&room("c")).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_requires_existing_room() {
        let store = MockRoomStore::new();
        assert!(matches!(
            store.update_room(&room("aaaa")).await,
            Err(GameError::RoomNotFound(_))
        ));

        let store = store.with_room(room("aaaa"));
        let mut changed = room("aaaa");
        changed.players = 3;
        store.update_room(&changed).await.unwrap();
        assert_eq!(store.room(&changed.id).unwrap().players, 3);
        assert_eq!(store.updates().len(), 1);
    }
}
