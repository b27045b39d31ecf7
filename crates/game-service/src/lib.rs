//! Game Service Library
//!
//! Server-side room core of a real-time multiplayer game service:
//!
//! - Application-key authentication of clients (HMAC-SHA256 over user id,
//!   issuance second and nonce)
//! - Per-application repositories that allocate unique room ids and persist
//!   room records
//! - One actor per room that serializes membership changes and fans out
//!   events to member connections
//!
//! # Modules
//!
//! - [`auth`] - Auth data generation and validation
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with client error codes
//! - [`game`] - Room actors, client workers, repository and store
//! - [`models`] - Room and client records
//! - [`observability`] - Metrics

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod game;
pub mod models;
pub mod observability;
