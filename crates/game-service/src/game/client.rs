//! Room members and their connection workers.
//!
//! Each admitted client has three parts:
//! - `Client`: the room's view of the member, held in the membership map
//! - `ClientConnection`: the transport's end, returned to the caller
//! - a worker task forwarding inbound messages to the room and enforcing the
//!   inactivity deadline
//!
//! Removing a client cancels its token, which stops the worker.

use crate::errors::GameError;
use crate::game::messages::{ClientMsg, Event, LeaveReason, Msg, RawMsg};
use crate::game::room::RoomHandle;
use crate::models::ClientInfo;

use bytes::Bytes;
use common::types::ClientId;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// A member as held by the room.
#[derive(Debug)]
pub(crate) struct Client {
    info: ClientInfo,
    events: mpsc::Sender<Event>,
    cancel_token: CancellationToken,
}

impl Client {
    pub(crate) fn info(&self) -> &ClientInfo {
        &self.info
    }

    /// Hand an event to the member's connection without waiting.
    ///
    /// A full or closed event buffer is a delivery failure.
    pub(crate) fn send(&self, event: Event) -> Result<(), GameError> {
        self.events.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                GameError::Delivery(format!("event buffer full: {}", self.info.id))
            }
            mpsc::error::TrySendError::Closed(_) => {
                GameError::Delivery(format!("connection closed: {}", self.info.id))
            }
        })
    }

    /// Teardown hook, called once when the member is removed.
    pub(crate) fn removed(&self) {
        self.cancel_token.cancel();
    }
}

/// The transport's end of a member.
///
/// Events for the client are read with [`recv`](Self::recv); messages from
/// the client are submitted with [`send`](Self::send). Dropping the
/// connection counts as a disconnect.
#[derive(Debug)]
pub struct ClientConnection {
    client_id: ClientId,
    events: mpsc::Receiver<Event>,
    inbound: mpsc::Sender<RawMsg>,
}

impl ClientConnection {
    #[must_use]
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Next event for this client. `None` once the client has been removed
    /// and all buffered events are read.
    pub async fn recv(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Buffered event, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    /// Submit a message from the client.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Delivery` if the client has already been removed.
    pub async fn send(&self, kind: u8, payload: impl Into<Bytes>) -> Result<(), GameError> {
        self.inbound
            .send(RawMsg {
                kind,
                payload: payload.into(),
            })
            .await
            .map_err(|_| GameError::Delivery(format!("client removed: {}", self.client_id)))
    }

    /// Split into the event receiver and inbound sender.
    #[must_use]
    pub fn into_parts(self) -> (mpsc::Receiver<Event>, mpsc::Sender<RawMsg>) {
        (self.events, self.inbound)
    }
}

/// Build the member, its connection and its worker.
pub(crate) fn new_client(
    info: ClientInfo,
    deadline: Duration,
    buffer: usize,
) -> (Client, ClientConnection, ClientWorker) {
    let (event_tx, event_rx) = mpsc::channel(buffer);
    let (inbound_tx, inbound_rx) = mpsc::channel(buffer);
    let cancel_token = CancellationToken::new();

    let connection = ClientConnection {
        client_id: info.id.clone(),
        events: event_rx,
        inbound: inbound_tx,
    };

    let worker = ClientWorker {
        client_id: info.id.clone(),
        inbound: inbound_rx,
        deadline,
        cancel_token: cancel_token.clone(),
    };

    let client = Client {
        info,
        events: event_tx,
        cancel_token,
    };

    (client, connection, worker)
}

/// Forwards one client's inbound messages to its room.
pub(crate) struct ClientWorker {
    client_id: ClientId,
    inbound: mpsc::Receiver<RawMsg>,
    deadline: Duration,
    cancel_token: CancellationToken,
}

impl ClientWorker {
    #[instrument(skip_all, name = "game.client", fields(room_id = %room.id(), client_id = %self.client_id))]
    pub(crate) async fn run(mut self, room: RoomHandle) {
        debug!(target: "game.client", "Client worker started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(target: "game.client", "Client removed, worker exiting");
                    break;
                }

                res = tokio::time::timeout(self.deadline, self.inbound.recv()) => {
                    match res {
                        Ok(Some(raw)) => {
                            let msg = Msg::Client(ClientMsg {
                                sender: self.client_id.clone(),
                                kind: raw.kind,
                                payload: raw.payload,
                            });
                            if room.post(msg).await.is_err() {
                                debug!(target: "game.client", "Room gone, worker exiting");
                                break;
                            }
                        }
                        Ok(None) => {
                            room.remove_client(&self.client_id, LeaveReason::Disconnected)
                                .await;
                            break;
                        }
                        Err(_) => {
                            debug!(
                                target: "game.client",
                                deadline_secs = self.deadline.as_secs(),
                                "Client deadline exceeded"
                            );
                            room.timeout(&self.client_id).await;
                            break;
                        }
                    }
                }
            }
        }

        debug!(target: "game.client", "Client worker stopped");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn bare_client(buffer: usize) -> (Client, mpsc::Receiver<Event>) {
        let (events, rx) = mpsc::channel(buffer);
        let client = Client {
            info: ClientInfo::new("alice"),
            events,
            cancel_token: CancellationToken::new(),
        };
        (client, rx)
    }

    fn joined(id: &str) -> Event {
        Event::Joined {
            client: ClientInfo::new(id),
        }
    }

    #[test]
    fn test_send_delivers_until_buffer_full() {
        let (client, mut rx) = bare_client(1);

        client.send(joined("bob")).unwrap();
        let err = client.send(joined("carol")).unwrap_err();
        assert!(matches!(err, GameError::Delivery(m) if m.contains("full")));

        assert_eq!(rx.try_recv().unwrap(), joined("bob"));
    }

    #[test]
    fn test_send_to_dropped_connection_fails() {
        let (client, rx) = bare_client(4);
        drop(rx);

        let err = client.send(joined("bob")).unwrap_err();
        assert!(matches!(err, GameError::Delivery(m) if m.contains("closed")));
    }

    #[test]
    fn test_removed_cancels_token() {
        let (client, _rx) = bare_client(1);
        let token = client.cancel_token.clone();
        assert!(!token.is_cancelled());

        client.removed();
        assert!(token.is_cancelled());
    }
}
