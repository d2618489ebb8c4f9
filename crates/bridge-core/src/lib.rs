//! bridge-core - Business logic and state machines for the talkie bridge.
//!
//! This crate implements:
//! - Pairing session state machine (first contact with a host)
//! - Connection manager (reconnect, backoff retry, unpair)
//! - Clock synchronization against the host time base
//! - Signed HTTP client for the host API
//! - Host-side request verification with replay protection
//! - Credential store abstraction with in-memory and file backends

#![forbid(unsafe_code)]

// Core state machines
pub mod connection;
pub mod pairing;

// Services
pub mod clock;
pub mod client;
pub mod verify;

// Infrastructure
pub mod store;

// Supporting modules
pub mod errors;
pub mod types;
