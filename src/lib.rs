//! Callbridge Library Crate
//!
//! This library contains all the core logic for the call-to-agent media
//! relay service: configuration, shared state, the session registry, the
//! routing layer, and the WebSocket relay engine. The `server` binary is
//! a thin wrapper around this library.

pub mod config;
pub mod registry;
pub mod router;
pub mod state;
pub mod ws;
