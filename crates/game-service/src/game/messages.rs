//! Messages processed by the room actor and events it delivers to clients.

use crate::errors::GameError;
use crate::game::client::ClientConnection;
use crate::models::{ClientInfo, RoomInfo};

use bytes::Bytes;
use common::types::ClientId;
use std::fmt;
use tokio::sync::oneshot;

/// Internal room queue message.
#[derive(Debug)]
pub enum Msg {
    /// Announce the master. Posted once when the room starts.
    Create,

    /// Admit a client.
    Join {
        info: ClientInfo,
        respond_to: oneshot::Sender<Result<JoinResponse, GameError>>,
    },

    /// A member was removed; notify the remaining members.
    Leave {
        client_id: ClientId,
        reason: LeaveReason,
    },

    /// Message forwarded from a client connection.
    Client(ClientMsg),
}

impl Msg {
    /// Short label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Create => "create",
            Msg::Join { .. } => "join",
            Msg::Leave { .. } => "leave",
            Msg::Client(_) => "client",
        }
    }
}

/// Raw message read from a client connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMsg {
    pub kind: u8,
    pub payload: Bytes,
}

/// Client message tagged with its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientMsg {
    pub sender: ClientId,
    pub kind: u8,
    pub payload: Bytes,
}

/// Client message types the room understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMsgType {
    /// Deliver the payload to every member.
    Broadcast,
    /// Deliver the payload to the master only.
    ToMaster,
}

impl ClientMsgType {
    pub const BROADCAST: u8 = 1;
    pub const TO_MASTER: u8 = 2;
}

impl TryFrom<u8> for ClientMsgType {
    type Error = GameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            Self::BROADCAST => Ok(ClientMsgType::Broadcast),
            Self::TO_MASTER => Ok(ClientMsgType::ToMaster),
            other => Err(GameError::UnknownMessage(other)),
        }
    }
}

/// Event delivered to a member's connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Joined { client: ClientInfo },
    /// Sent after the member is already gone. Not sent if the client has
    /// rejoined by the time the room gets to it.
    Left { client_id: ClientId, reason: LeaveReason },
    Message { sender: ClientId, payload: Bytes },
}

/// Why a client left the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaveReason {
    /// No message within the client deadline.
    Timeout,
    /// The connection's inbound stream closed.
    Disconnected,
    /// An event could not be delivered.
    DeliveryFailed(String),
    /// Room creation was rolled back.
    Aborted,
}

impl LeaveReason {
    /// Label used for metrics.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveReason::Timeout => "timeout",
            LeaveReason::Disconnected => "disconnected",
            LeaveReason::DeliveryFailed(_) => "delivery_failed",
            LeaveReason::Aborted => "aborted",
        }
    }
}

impl fmt::Display for LeaveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaveReason::Timeout => write!(f, "client timeout"),
            LeaveReason::Disconnected => write!(f, "client disconnected"),
            LeaveReason::DeliveryFailed(e) => write!(f, "delivery failed: {e}"),
            LeaveReason::Aborted => write!(f, "room aborted"),
        }
    }
}

/// Successful join reply.
#[derive(Debug)]
pub struct JoinResponse {
    /// Copy of the room record at admission.
    pub room: RoomInfo,
    /// Copy of the admitted client's info, with its join order.
    pub client: ClientInfo,
    pub connection: ClientConnection,
}

/// Room lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    /// Processing messages.
    Active,
    /// Last member left; discarding messages until client workers finish.
    Draining,
    /// Terminal.
    Closed,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_client_msg_type_conversion() {
        assert_eq!(ClientMsgType::try_from(1).unwrap(), ClientMsgType::Broadcast);
        assert_eq!(ClientMsgType::try_from(2).unwrap(), ClientMsgType::ToMaster);
        assert!(matches!(
            ClientMsgType::try_from(9),
            Err(GameError::UnknownMessage(9))
        ));
        assert!(matches!(
            ClientMsgType::try_from(0),
            Err(GameError::UnknownMessage(0))
        ));
    }

    #[test]
    fn test_leave_reason_display() {
        assert_eq!(LeaveReason::Timeout.to_string(), "client timeout");
        assert_eq!(
            LeaveReason::DeliveryFailed("buffer full".to_string()).to_string(),
            "delivery failed: buffer full"
        );
        assert_eq!(LeaveReason::DeliveryFailed(String::new()).as_str(), "delivery_failed");
    }

    #[test]
    fn test_msg_kind_labels() {
        assert_eq!(Msg::Create.kind(), "create");
        let leave = Msg::Leave {
            client_id: ClientId::from("a"),
            reason: LeaveReason::Timeout,
        };
        assert_eq!(leave.kind(), "leave");
    }
}
