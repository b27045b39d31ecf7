//! Room actor.
//!
//! One actor per room owns the room record and its membership. It processes
//! a bounded FIFO queue of [`Msg`]s on a single task; everything outside the
//! actor talks to it through a [`RoomHandle`].
//!
//! # Locking
//!
//! Membership, master, join order and departures sit behind one
//! reader/writer lock per room. Broadcasts take the shared form; join and
//! removal take the exclusive form. Removal never posts to the queue while
//! holding the lock.
//!
//! # Lifecycle
//!
//! `Active` → `Draining` → `Closed`. The room starts with its master as the
//! only member. When the last member is removed the termination token fires,
//! the actor stops dispatching, and it discards queued messages until every
//! client worker has finished. Only then is the room `Closed`.

use crate::errors::GameError;
use crate::game::client::{new_client, Client, ClientConnection};
use crate::game::messages::{
    ClientMsg, ClientMsgType, Event, JoinResponse, LeaveReason, Msg, RoomStatus,
};
use crate::models::{ClientInfo, RoomInfo};
use crate::observability::metrics;

use common::types::{ClientId, RoomId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

/// Default room queue capacity.
pub const DEFAULT_ROOM_MSG_BUFFER: usize = 10;

/// Default per-client event buffer capacity.
pub const DEFAULT_CLIENT_EVENT_BUFFER: usize = 64;

/// Inactivity deadline used when a room's `client_deadline` is zero.
pub const DEFAULT_CLIENT_DEADLINE: Duration = Duration::from_secs(30);

/// Per-room tuning, taken from service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSettings {
    pub default_client_deadline: Duration,
    pub msg_buffer: usize,
    pub event_buffer: usize,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            default_client_deadline: DEFAULT_CLIENT_DEADLINE,
            msg_buffer: DEFAULT_ROOM_MSG_BUFFER,
            event_buffer: DEFAULT_CLIENT_EVENT_BUFFER,
        }
    }
}

struct RoomState {
    info: RoomInfo,
    clients: HashMap<ClientId, Client>,
    master: ClientId,
    order: Vec<ClientId>,
    departed: HashMap<ClientId, LeaveReason>,
    closed: bool,
}

impl RoomState {
    fn sync_players(&mut self) {
        self.info.players = u32::try_from(self.clients.len()).unwrap_or(u32::MAX);
    }

    fn is_full(&self) -> bool {
        u32::try_from(self.clients.len()).unwrap_or(u32::MAX) >= self.info.max_players
    }
}

struct RoomShared {
    id: RoomId,
    state: RwLock<RoomState>,
    sender: mpsc::Sender<Msg>,
    done: CancellationToken,
    workers: TaskTracker,
    status: watch::Sender<RoomStatus>,
    client_deadline: Duration,
    event_buffer: usize,
}

/// Handle to a room actor.
#[derive(Clone)]
pub struct RoomHandle {
    shared: Arc<RoomShared>,
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle")
            .field("id", &self.shared.id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl RoomHandle {
    #[must_use]
    pub fn id(&self) -> &RoomId {
        &self.shared.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> RoomStatus {
        *self.shared.status.borrow()
    }

    /// Wait until the room is `Closed`.
    pub async fn closed(&self) {
        let mut rx = self.shared.status.subscribe();
        // The sender lives in `shared`, which this handle keeps alive.
        let _ = rx.wait_for(|s| *s == RoomStatus::Closed).await;
    }

    /// Post a message to the room queue, waiting for capacity.
    ///
    /// # Errors
    ///
    /// Returns `GameError::RoomClosed` once the actor has stopped.
    pub(crate) async fn post(&self, msg: Msg) -> Result<(), GameError> {
        self.shared
            .sender
            .send(msg)
            .await
            .map_err(|_| GameError::RoomClosed(self.shared.id.clone()))
    }

    /// Ask the room to admit a client.
    ///
    /// # Errors
    ///
    /// - `RoomFull` if membership is at `max_players`
    /// - `ClientConflict` if a member already has this id
    /// - `RoomClosed` if the room has terminated or terminates before replying
    pub async fn join(&self, info: ClientInfo) -> Result<JoinResponse, GameError> {
        if self.status() != RoomStatus::Active {
            return Err(GameError::RoomClosed(self.shared.id.clone()));
        }

        let (tx, rx) = oneshot::channel();
        self.post(Msg::Join {
            info,
            respond_to: tx,
        })
        .await?;

        rx.await
            .map_err(|_| GameError::RoomClosed(self.shared.id.clone()))?
    }

    /// Remove a member after its inactivity deadline passed.
    pub async fn timeout(&self, client_id: &ClientId) {
        self.remove_client(client_id, LeaveReason::Timeout).await;
    }

    /// Remove a member.
    ///
    /// Removing a client that is not a member is a no-op. Removing the last
    /// member terminates the room; otherwise a `Leave` is queued after the
    /// membership lock is released.
    pub async fn remove_client(&self, client_id: &ClientId, reason: LeaveReason) {
        let room_empty = {
            let mut state = self.shared.state.write().await;

            let Some(client) = state.clients.remove(client_id) else {
                debug!(
                    target: "game.room",
                    room_id = %self.shared.id,
                    client_id = %client_id,
                    "Client may already have left"
                );
                return;
            };

            info!(
                target: "game.room",
                room_id = %self.shared.id,
                client_id = %client_id,
                reason = %reason,
                "Client removed"
            );

            client.removed();
            metrics::record_client_removed(reason.as_str());
            state.departed.insert(client_id.clone(), reason.clone());
            state.sync_players();

            if state.clients.is_empty() {
                state.closed = true;
            }
            state.closed
        };

        if room_empty {
            self.shared.done.cancel();
            return;
        }

        let leave = Msg::Leave {
            client_id: client_id.clone(),
            reason,
        };
        if self.post(leave).await.is_err() {
            debug!(
                target: "game.room",
                room_id = %self.shared.id,
                client_id = %client_id,
                "Room stopped before leave notification"
            );
        }
    }

    /// Remove every member at once and terminate the room.
    pub(crate) async fn abort(&self) {
        let mut state = self.shared.state.write().await;
        let removed: Vec<(ClientId, Client)> = state.clients.drain().collect();
        for (client_id, client) in removed {
            client.removed();
            metrics::record_client_removed(LeaveReason::Aborted.as_str());
            state.departed.insert(client_id, LeaveReason::Aborted);
        }
        state.sync_players();
        state.closed = true;
        drop(state);

        warn!(target: "game.room", room_id = %self.shared.id, "Room aborted");
        self.shared.done.cancel();
    }

    /// Copy of the room record.
    pub async fn snapshot(&self) -> RoomInfo {
        self.shared.state.read().await.info.clone()
    }

    /// Every client admitted so far, in admission order, master first.
    pub async fn join_order(&self) -> Vec<ClientId> {
        self.shared.state.read().await.order.clone()
    }

    /// Why a departed client left, if it has.
    pub async fn departure_reason(&self, client_id: &ClientId) -> Option<LeaveReason> {
        self.shared.state.read().await.departed.get(client_id).cloned()
    }

    /// Copies of the current members' info, ordered by join order.
    pub async fn members(&self) -> Vec<ClientInfo> {
        let state = self.shared.state.read().await;
        let mut members: Vec<ClientInfo> = state.clients.values().map(|c| c.info().clone()).collect();
        members.sort_by_key(|c| c.join_order);
        members
    }

    /// The room's master. Kept after the master departs.
    pub async fn master(&self) -> ClientId {
        self.shared.state.read().await.master.clone()
    }

    /// Deliver `event` to every member. Failed deliveries schedule removals
    /// on separate tasks.
    async fn broadcast(&self, event: Event) {
        let state = self.shared.state.read().await;
        for client in state.clients.values() {
            if let Err(e) = client.send(event.clone()) {
                self.schedule_removal(client.info().id.clone(), &e);
            }
        }
    }

    /// Deliver `event` to one member, if present.
    async fn send_to(&self, client_id: &ClientId, event: Event) {
        let state = self.shared.state.read().await;
        let Some(client) = state.clients.get(client_id) else {
            debug!(
                target: "game.room",
                room_id = %self.shared.id,
                client_id = %client_id,
                "Target not in room, message dropped"
            );
            return;
        };
        if let Err(e) = client.send(event) {
            self.schedule_removal(client_id.clone(), &e);
        }
    }

    // Removal needs the exclusive lock the caller holds in shared form.
    fn schedule_removal(&self, client_id: ClientId, err: &GameError) {
        debug!(
            target: "game.room",
            room_id = %self.shared.id,
            client_id = %client_id,
            error = %err,
            "Delivery failed, removing client"
        );
        let room = self.clone();
        let reason = LeaveReason::DeliveryFailed(err.to_string());
        tokio::spawn(async move {
            room.remove_client(&client_id, reason).await;
        });
    }
}

/// The room actor.
pub struct Room {
    handle: RoomHandle,
    receiver: mpsc::Receiver<Msg>,
}

impl Room {
    /// Start a room with `master` as its only member.
    ///
    /// Returns the handle, the actor task, and the master's connection.
    pub fn spawn(
        mut info: RoomInfo,
        mut master: ClientInfo,
        settings: &RoomSettings,
    ) -> (RoomHandle, JoinHandle<()>, ClientConnection) {
        let (sender, receiver) = mpsc::channel(settings.msg_buffer.max(1));
        let (status, _) = watch::channel(RoomStatus::Active);

        let client_deadline = if info.client_deadline == 0 {
            settings.default_client_deadline
        } else {
            Duration::from_secs(u64::from(info.client_deadline))
        };
        let event_buffer = settings.event_buffer.max(1);

        master.join_order = 0;
        let master_id = master.id.clone();
        let (client, connection, worker) = new_client(master, client_deadline, event_buffer);

        info.players = 1;
        let state = RoomState {
            info,
            clients: HashMap::from([(master_id.clone(), client)]),
            master: master_id.clone(),
            order: vec![master_id],
            departed: HashMap::new(),
            closed: false,
        };

        let shared = Arc::new(RoomShared {
            id: state.info.id.clone(),
            state: RwLock::new(state),
            sender,
            done: CancellationToken::new(),
            workers: TaskTracker::new(),
            status,
            client_deadline,
            event_buffer,
        });
        let handle = RoomHandle { shared };

        // Queued ahead of anything a caller or worker can post.
        if handle.shared.sender.try_send(Msg::Create).is_err() {
            warn!(target: "game.room", room_id = %handle.id(), "Failed to queue create message");
        }

        handle.shared.workers.spawn(worker.run(handle.clone()));

        let actor = Room {
            handle: handle.clone(),
            receiver,
        };
        let task = tokio::spawn(actor.run());

        (handle, task, connection)
    }

    #[instrument(skip_all, name = "game.room", fields(room_id = %self.handle.id()))]
    async fn run(mut self) {
        info!(target: "game.room", room_id = %self.handle.id(), "Room started");

        loop {
            tokio::select! {
                biased;

                () = self.handle.shared.done.cancelled() => {
                    info!(target: "game.room", room_id = %self.handle.id(), "Room closed");
                    break;
                }

                Some(msg) = self.receiver.recv() => {
                    let kind = msg.kind();
                    metrics::record_room_message(kind);
                    if let Err(e) = self.dispatch(msg).await {
                        warn!(
                            target: "game.room",
                            room_id = %self.handle.id(),
                            kind,
                            error = %e,
                            "Dispatch failed"
                        );
                    }
                }

                else => break,
            }
        }

        self.handle.shared.status.send_replace(RoomStatus::Draining);
        self.drain().await;
        self.handle.shared.status.send_replace(RoomStatus::Closed);

        info!(target: "game.room", room_id = %self.handle.id(), "Room stopped");
    }

    /// Discard queued messages until all client workers have finished, so
    /// no worker stays blocked posting to a terminated room.
    async fn drain(&mut self) {
        let workers = &self.handle.shared.workers;
        workers.close();
        let all_done = workers.wait();
        tokio::pin!(all_done);

        loop {
            tokio::select! {
                () = &mut all_done => break,

                Some(msg) = self.receiver.recv() => {
                    debug!(
                        target: "game.room",
                        room_id = %self.handle.id(),
                        kind = msg.kind(),
                        "Discard msg"
                    );
                    metrics::record_message_discarded();
                }
            }
        }
    }

    async fn dispatch(&mut self, msg: Msg) -> Result<(), GameError> {
        match msg {
            Msg::Create => {
                self.msg_create().await;
                Ok(())
            }
            Msg::Join { info, respond_to } => {
                self.msg_join(info, respond_to).await;
                Ok(())
            }
            Msg::Leave { client_id, reason } => {
                self.msg_leave(client_id, reason).await;
                Ok(())
            }
            Msg::Client(msg) => self.msg_client(msg).await,
        }
    }

    async fn msg_create(&self) {
        let master = {
            let state = self.handle.shared.state.read().await;
            state.clients.get(&state.master).map(|c| c.info().clone())
        };
        if let Some(client) = master {
            self.handle.broadcast(Event::Joined { client }).await;
        }
    }

    /// Announce a departure. A client that rejoined before its `Leave` was
    /// dequeued is a member again, so the stale notice is dropped.
    async fn msg_leave(&self, client_id: ClientId, reason: LeaveReason) {
        let rejoined = self
            .handle
            .shared
            .state
            .read()
            .await
            .clients
            .contains_key(&client_id);
        if rejoined {
            debug!(
                target: "game.room",
                room_id = %self.handle.id(),
                client_id = %client_id,
                "Client rejoined, stale leave dropped"
            );
            return;
        }
        self.handle
            .broadcast(Event::Left { client_id, reason })
            .await;
    }

    async fn msg_join(
        &self,
        info: ClientInfo,
        respond_to: oneshot::Sender<Result<JoinResponse, GameError>>,
    ) {
        let client_id = info.id.clone();
        match self.admit(info).await {
            Ok((response, joined)) => {
                if respond_to.send(Ok(response)).is_err() {
                    // The dropped connection disconnects the new member.
                    debug!(
                        target: "game.room",
                        room_id = %self.handle.id(),
                        client_id = %client_id,
                        "Join caller went away"
                    );
                }
                self.handle.broadcast(Event::Joined { client: joined }).await;
            }
            Err(e) => {
                warn!(
                    target: "game.room",
                    room_id = %self.handle.id(),
                    client_id = %client_id,
                    error = %e,
                    "Join rejected"
                );
                metrics::record_join_rejected(match &e {
                    GameError::RoomFull { .. } => "full",
                    GameError::ClientConflict(_) => "conflict",
                    _ => "closed",
                });
                if respond_to.send(Err(e)).is_err() {
                    debug!(
                        target: "game.room",
                        room_id = %self.handle.id(),
                        client_id = %client_id,
                        "Join caller went away"
                    );
                }
            }
        }
    }

    async fn admit(&self, mut info: ClientInfo) -> Result<(JoinResponse, ClientInfo), GameError> {
        let shared = &self.handle.shared;
        let mut state = shared.state.write().await;

        if state.closed {
            return Err(GameError::RoomClosed(shared.id.clone()));
        }
        if state.clients.contains_key(&info.id) {
            return Err(GameError::ClientConflict(info.id));
        }
        if state.is_full() {
            return Err(GameError::RoomFull {
                max_players: state.info.max_players,
                client_id: info.id,
            });
        }

        info.join_order = u32::try_from(state.order.len()).unwrap_or(u32::MAX);
        let (client, connection, worker) =
            new_client(info.clone(), shared.client_deadline, shared.event_buffer);

        state.departed.remove(&info.id);
        state.clients.insert(info.id.clone(), client);
        state.order.push(info.id.clone());
        state.sync_players();

        shared.workers.spawn(worker.run(self.handle.clone()));
        metrics::record_client_joined();

        info!(
            target: "game.room",
            room_id = %shared.id,
            client_id = %info.id,
            players = state.info.players,
            "Client joined"
        );

        let response = JoinResponse {
            room: state.info.clone(),
            client: info.clone(),
            connection,
        };
        Ok((response, info))
    }

    async fn msg_client(&self, msg: ClientMsg) -> Result<(), GameError> {
        let kind = ClientMsgType::try_from(msg.kind)?;

        let master = {
            let state = self.handle.shared.state.read().await;
            if !state.clients.contains_key(&msg.sender) {
                debug!(
                    target: "game.room",
                    room_id = %self.handle.id(),
                    client_id = %msg.sender,
                    "Message from departed client dropped"
                );
                return Ok(());
            }
            state.master.clone()
        };

        let event = Event::Message {
            sender: msg.sender,
            payload: msg.payload,
        };
        match kind {
            ClientMsgType::Broadcast => self.handle.broadcast(event).await,
            ClientMsgType::ToMaster => self.handle.send_to(&master, event).await,
        }
        Ok(())
    }
}
