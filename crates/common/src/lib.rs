//! Common utilities and types shared across the game server crates.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;
