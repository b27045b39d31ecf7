//! Game service error types.
//!
//! Error types map to client-facing error codes. Internal details are
//! logged server-side but not exposed to clients.

use common::types::{ClientId, RoomId};
use thiserror::Error;

/// Game service error type.
///
/// Maps to client error codes:
/// - `Auth`: `UNAUTHORIZED` (2)
/// - `RoomNotFound`, `RoomClosed`: `NOT_FOUND` (4)
/// - `ClientConflict`: `CONFLICT` (5)
/// - Database, Config, Internal, allocation and delivery failures: `INTERNAL_ERROR` (6)
/// - `RoomFull`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Error)]
pub enum GameError {
    /// Durable store operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication data did not verify.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// No live room with this id in the repository.
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    /// Room already holds `max_players` members.
    #[error("Room full: max={max_players}, client={client_id}")]
    RoomFull {
        max_players: u32,
        client_id: ClientId,
    },

    /// Room has terminated and accepts no further messages.
    #[error("Room closed: {0}")]
    RoomClosed(RoomId),

    /// A client with the same id is already a member.
    #[error("Client already in room: {0}")]
    ClientConflict(ClientId),

    /// Every room id drawn during creation was rejected by the store.
    #[error("Room id allocation failed after {attempts} attempts: {last_error}")]
    RoomIdExhausted { attempts: u32, last_error: String },

    /// The caller cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Client message with a type the room does not handle.
    #[error("Unknown message type: {0}")]
    UnknownMessage(u8),

    /// Event could not be handed to a member's connection.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Authentication data validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// HMAC did not verify under the application key.
    #[error("Invalid auth hash")]
    InvalidHash,

    /// Token was issued for a different user.
    #[error("User ID mismatch")]
    UserIdMismatch,

    /// Check time is past the token lifetime.
    #[error("Auth data expired")]
    Expired,

    /// A field could not be decoded.
    #[error("Malformed auth data: {0}")]
    Malformed(String),

    /// The system entropy source failed.
    #[error("Entropy source unavailable")]
    Entropy,
}

impl GameError {
    /// Returns the client error code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            GameError::Auth(_) => 2,                                        // UNAUTHORIZED
            GameError::RoomNotFound(_) | GameError::RoomClosed(_) => 4,    // NOT_FOUND
            GameError::ClientConflict(_) => 5,                              // CONFLICT
            GameError::RoomFull { .. } => 7,                                // CAPACITY_EXCEEDED
            GameError::Database(_)
            | GameError::Config(_)
            | GameError::RoomIdExhausted { .. }
            | GameError::Cancelled
            | GameError::UnknownMessage(_)
            | GameError::Delivery(_)
            | GameError::Internal(_) => 6, // INTERNAL_ERROR
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            GameError::Auth(e) => e.to_string(),
            GameError::RoomNotFound(_) | GameError::RoomClosed(_) => "Room not found".to_string(),
            GameError::RoomFull { .. } => "Room is full".to_string(),
            GameError::ClientConflict(_) => "Client already in room".to_string(),
            GameError::Database(_)
            | GameError::Config(_)
            | GameError::RoomIdExhausted { .. }
            | GameError::Cancelled
            | GameError::UnknownMessage(_)
            | GameError::Delivery(_)
            | GameError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl From<sqlx::Error> for GameError {
    fn from(err: sqlx::Error) -> Self {
        GameError::Database(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(GameError::Auth(AuthError::Expired).error_code(), 2);
        assert_eq!(GameError::RoomNotFound(RoomId::from("r1")).error_code(), 4);
        assert_eq!(GameError::RoomClosed(RoomId::from("r1")).error_code(), 4);
        assert_eq!(GameError::ClientConflict(ClientId::from("c1")).error_code(), 5);
        assert_eq!(
            GameError::RoomFull {
                max_players: 4,
                client_id: ClientId::from("c5"),
            }
            .error_code(),
            7
        );
        assert_eq!(GameError::Database("down".to_string()).error_code(), 6);
        assert_eq!(
            GameError::RoomIdExhausted {
                attempts: 3,
                last_error: "duplicate key".to_string(),
            }
            .error_code(),
            6
        );
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let db_err = GameError::Database("connection refused at 10.0.0.12:5432".to_string());
        assert!(!db_err.client_message().contains("10.0.0.12"));
        assert_eq!(db_err.client_message(), "An internal error occurred");

        let exhausted = GameError::RoomIdExhausted {
            attempts: 5,
            last_error: "duplicate key value violates unique constraint".to_string(),
        };
        assert!(!exhausted.client_message().contains("duplicate"));
    }

    #[test]
    fn test_auth_error_conversion() {
        let err: GameError = AuthError::UserIdMismatch.into();
        assert!(matches!(err, GameError::Auth(AuthError::UserIdMismatch)));
        assert_eq!(err.error_code(), 2);
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            GameError::RoomIdExhausted {
                attempts: 3,
                last_error: "duplicate key".to_string(),
            }
            .to_string(),
            "Room id allocation failed after 3 attempts: duplicate key"
        );
        assert_eq!(
            GameError::RoomFull {
                max_players: 2,
                client_id: ClientId::from("carol"),
            }
            .to_string(),
            "Room full: max=2, client=carol"
        );
        assert_eq!(
            GameError::Auth(AuthError::Expired).to_string(),
            "Authentication error: Auth data expired"
        );
    }
}
