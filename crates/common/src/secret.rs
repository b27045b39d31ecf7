//! Secret types for protecting sensitive values from accidental logging.
//!
//! Application keys and the database URL are wrapped in these types as soon
//! as they are read. `SecretBox<T>` and `SecretString` implement `Debug` with
//! redaction, so any struct that derives `Debug` around them is safe to log.
//! Secrets are zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct App {
//!     id: String,
//!     key: SecretString,
//! }
//!
//! let app = App {
//!     id: "testapp".to_string(),
//!     key: SecretString::from("testapppkey"),
//! };
//!
//! // The key is redacted in debug output
//! assert!(!format!("{app:?}").contains("testapppkey"));
//!
//! // HMAC code must ask for the bytes explicitly
//! let key: &[u8] = app.key.expose_secret().as_bytes();
//! assert_eq!(key, b"testapppkey");
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
