//! # Game Test Utilities
//!
//! Shared test utilities for the game service.
//!
//! This crate provides an in-memory room store and test fixtures so the
//! repository can be exercised without a database.
//!
//! ## Modules
//!
//! - `mock_store` - In-memory `RoomStore` with injectable failures
//! - `fixtures` - Pre-configured clients, room options and applications
//!
//! ## Usage
//!
//! ```rust,ignore
//! use game_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = MockRoomStore::new().reject_first_inserts(2);
//!     let repo = test_repository(&store, test_game_config());
//!
//!     let created = repo
//!         .create_room(&CancellationToken::new(), TestRoomOption::new().build(), TestClient::new("master").build())
//!         .await
//!         .unwrap();
//!
//!     assert_eq!(store.insert_attempts(), 3);
//! }
//! ```

pub mod fixtures;
pub mod mock_store;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_store::*;
