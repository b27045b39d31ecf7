//! Per-application room repository.
//!
//! A `Repository` allocates room identities, persists room records through
//! a [`RoomStore`], and keeps the index of live room actors for one
//! application.
//!
//! # Room creation
//!
//! 1. Begin a store transaction
//! 2. Draw a 16-hex-character id (and a room number if requested) and insert;
//!    on rejection draw again, up to `retry_count` times
//! 3. Spawn the room actor and register it
//! 4. Commit. If the commit fails the actor is unregistered and aborted, so
//!    no live room exists without a stored record.
//!
//! Ids come from a `StdRng` seeded once from OS entropy when the repository
//! is built. Draws are fast but not collision-free, which is what the retry
//! loop is for.

use crate::auth::{self, AuthData};
use crate::config::GameConfig;
use crate::errors::GameError;
use crate::game::client::ClientConnection;
use crate::game::messages::JoinResponse;
use crate::game::room::{Room, RoomHandle};
use crate::game::store::{RoomStore, RoomTransaction};
use crate::models::{App, ClientInfo, RoomInfo, RoomOption};
use crate::observability::metrics;

use chrono::{DateTime, Utc};
use common::secret::ExposeSecret;
use common::types::{AppId, RoomId};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Random bytes per room id (hex-encoded to twice as many characters).
pub const ROOM_ID_BYTES: usize = 8;

/// Result of a successful room creation.
#[derive(Debug)]
pub struct CreateRoomResponse {
    /// The persisted room record.
    pub room: RoomInfo,
    /// The master's info as admitted.
    pub master: ClientInfo,
    /// The master's connection.
    pub connection: ClientConnection,
}

/// Rooms of one application.
pub struct Repository {
    host_id: u32,
    app: App,
    config: GameConfig,
    store: Arc<dyn RoomStore>,
    rooms: Arc<tokio::sync::Mutex<HashMap<RoomId, RoomHandle>>>,
    rng: Mutex<StdRng>,
}

impl Repository {
    /// Build a repository for `app`, seeding its id generator from OS entropy.
    #[must_use]
    pub fn new(app: App, config: GameConfig, store: Arc<dyn RoomStore>) -> Self {
        Self {
            host_id: config.host_id,
            app,
            config,
            store,
            rooms: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Build one repository per application registered in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the application table cannot be read.
    pub async fn new_repos(
        store: Arc<dyn RoomStore>,
        config: &GameConfig,
    ) -> Result<HashMap<AppId, Arc<Repository>>, GameError> {
        let apps = store.load_apps().await?;

        let mut repos = HashMap::with_capacity(apps.len());
        for app in apps {
            debug!(target: "game.repo", app_id = %app.id, "New repository");
            let id = app.id.clone();
            let repo = Repository::new(app, config.clone(), Arc::clone(&store));
            repos.insert(id, Arc::new(repo));
        }
        Ok(repos)
    }

    #[must_use]
    pub fn app_id(&self) -> &AppId {
        &self.app.id
    }

    /// Check a client's auth data against this application's key.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Auth` if the data does not validate.
    pub fn authenticate(
        &self,
        data: &AuthData,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), GameError> {
        let key = self.app.key.expose_secret().as_bytes();
        auth::valid_auth_data(data, key, user_id, now)?;
        Ok(())
    }

    /// Create, persist and start a room with `master` as its first member.
    ///
    /// # Errors
    ///
    /// - `Cancelled` if `cancel` fires during id allocation
    /// - `RoomIdExhausted` if every drawn id was rejected
    /// - `Database` if the transaction cannot be opened or committed
    #[instrument(skip_all, name = "game.repo.create_room", fields(app_id = %self.app.id))]
    pub async fn create_room(
        &self,
        cancel: &CancellationToken,
        option: RoomOption,
        master: ClientInfo,
    ) -> Result<CreateRoomResponse, GameError> {
        let mut tx = self.store.begin().await.map_err(|e| {
            metrics::record_room_create_failure("begin");
            e
        })?;

        let info = match self.new_room_info(cancel, tx.as_mut(), &option).await {
            Ok(info) => info,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    warn!(target: "game.repo", error = %rb, "Rollback failed");
                }
                metrics::record_room_create_failure(match e {
                    GameError::Cancelled => "cancelled",
                    _ => "exhausted",
                });
                return Err(e);
            }
        };

        let (handle, task, connection) =
            Room::spawn(info.clone(), master.clone(), &self.config.room);
        self.rooms
            .lock()
            .await
            .insert(handle.id().clone(), handle.clone());

        if let Err(e) = tx.commit().await {
            error!(
                target: "game.repo",
                room_id = %info.id,
                error = %e,
                "Commit failed, discarding room"
            );
            self.rooms.lock().await.remove(handle.id());
            handle.abort().await;
            metrics::record_room_create_failure("commit");
            return Err(e);
        }

        metrics::record_room_created();
        metrics::record_room_opened();
        self.spawn_reaper(handle, task);

        info!(
            target: "game.repo",
            app_id = %self.app.id,
            room_id = %info.id,
            number = ?info.number,
            "Room created"
        );

        let mut master = master;
        master.join_order = 0;
        Ok(CreateRoomResponse {
            room: info,
            master,
            connection,
        })
    }

    async fn new_room_info(
        &self,
        cancel: &CancellationToken,
        tx: &mut dyn RoomTransaction,
        option: &RoomOption,
    ) -> Result<RoomInfo, GameError> {
        let mut info = RoomInfo {
            id: RoomId::new(String::new()),
            app_id: self.app.id.clone(),
            host_id: self.host_id,
            visible: option.visible,
            watchable: option.watchable,
            search_group: option.search_group,
            client_deadline: option.client_deadline,
            max_players: option.max_players,
            players: 1,
            public_props: option.public_props.clone(),
            private_props: option.private_props.clone(),
            created: Utc::now(),
            number: None,
        };

        let retry_count = self.config.retry_count;
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=retry_count {
            if cancel.is_cancelled() {
                return Err(GameError::Cancelled);
            }

            let (id, number) = {
                let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                draw_identity(
                    &mut *rng,
                    option.with_number,
                    self.config.max_room_number,
                )
            };
            info.id = id;
            info.number = number;

            let inserted = tokio::select! {
                () = cancel.cancelled() => return Err(GameError::Cancelled),
                res = tx.insert_room(&info) => res,
            };

            match inserted {
                Ok(()) => {
                    metrics::record_room_id_attempts(attempt);
                    return Ok(info);
                }
                Err(e) => {
                    debug!(
                        target: "game.repo",
                        attempt,
                        room_id = %info.id,
                        error = %e,
                        "Room insert failed, drawing new id"
                    );
                    last_error = e.to_string();
                }
            }
        }

        metrics::record_room_id_attempts(retry_count);
        Err(GameError::RoomIdExhausted {
            attempts: retry_count,
            last_error,
        })
    }

    fn spawn_reaper(&self, handle: RoomHandle, task: JoinHandle<()>) {
        let rooms = Arc::clone(&self.rooms);
        tokio::spawn(async move {
            if let Err(e) = task.await {
                error!(target: "game.repo", room_id = %handle.id(), error = %e, "Room task failed");
            }
            if rooms.lock().await.remove(handle.id()).is_some() {
                metrics::record_room_closed();
            }
            debug!(target: "game.repo", room_id = %handle.id(), "Room unregistered");
        });
    }

    /// Live room by id.
    pub async fn get_room(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.lock().await.get(room_id).cloned()
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.lock().await.len()
    }

    /// Route a join request to a live room.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` if no live room has this id, otherwise whatever the
    /// room's join returns.
    #[instrument(skip_all, name = "game.repo.join_room", fields(room_id = %room_id))]
    pub async fn join_room(
        &self,
        room_id: &RoomId,
        client: ClientInfo,
    ) -> Result<JoinResponse, GameError> {
        let room = self
            .get_room(room_id)
            .await
            .ok_or_else(|| GameError::RoomNotFound(room_id.clone()))?;
        room.join(client).await
    }

    /// Write a live room's current record back to the store.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` if no live room has this id, or a store error.
    #[instrument(skip_all, name = "game.repo.persist_room", fields(room_id = %room_id))]
    pub async fn persist_room(&self, room_id: &RoomId) -> Result<(), GameError> {
        let room = self
            .get_room(room_id)
            .await
            .ok_or_else(|| GameError::RoomNotFound(room_id.clone()))?;
        let info = room.snapshot().await;
        self.store.update_room(&info).await
    }

    /// Abort every live room and wait for them to close.
    pub async fn shutdown(&self) {
        let rooms: Vec<RoomHandle> = self.rooms.lock().await.values().cloned().collect();
        info!(target: "game.repo", app_id = %self.app.id, rooms = rooms.len(), "Shutting down rooms");
        for room in &rooms {
            room.abort().await;
        }
        for room in &rooms {
            room.closed().await;
        }
    }
}

/// Draw a room id and, if requested, a room number in `[1, max_number]`.
fn draw_identity<R: RngCore>(
    rng: &mut R,
    with_number: bool,
    max_number: i32,
) -> (RoomId, Option<i32>) {
    let mut bytes = [0u8; ROOM_ID_BYTES];
    rng.fill_bytes(&mut bytes);
    let id = RoomId::new(hex::encode(bytes));

    let number = with_number.then(|| rng.gen_range(1..=max_number.max(1)));
    (id, number)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_room_id_is_sixteen_lowercase_hex() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let (id, number) = draw_identity(&mut rng, false, 999);
            assert_eq!(id.as_str().len(), ROOM_ID_BYTES * 2);
            assert!(id
                .as_str()
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
            assert_eq!(number, None);
        }
    }

    #[test]
    fn test_room_number_within_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let (_, number) = draw_identity(&mut rng, true, 10);
            let n = number.unwrap();
            assert!((1..=10).contains(&n));
        }

        let (_, number) = draw_identity(&mut rng, true, 1);
        assert_eq!(number, Some(1));
    }

    #[test]
    fn test_successive_ids_differ() {
        let mut rng = StdRng::seed_from_u64(3);
        let (a, _) = draw_identity(&mut rng, false, 1);
        let (b, _) = draw_identity(&mut rng, false, 1);
        assert_ne!(a, b);
    }
}
