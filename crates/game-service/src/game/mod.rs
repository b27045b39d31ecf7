//! Rooms: actors, their members, and the per-application repository.
//!
//! ```text
//! Repository (one per application)
//! └── RoomHandle ── Room actor (one per room, owns membership)
//!                   └── ClientWorker (one per member, tracked per room)
//! ```

pub mod client;
pub mod messages;
pub mod repository;
pub mod room;
pub mod store;

pub use client::ClientConnection;
pub use messages::{ClientMsgType, Event, JoinResponse, LeaveReason, RoomStatus};
pub use repository::{CreateRoomResponse, Repository};
pub use room::{Room, RoomHandle, RoomSettings};
pub use store::{PgRoomStore, RoomStore, RoomTransaction};
