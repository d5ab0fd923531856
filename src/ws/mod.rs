//! WebSocket Relay Engine
//!
//! This module contains the core logic for bridging one telephony call
//! leg to one hosted-agent leg. It is structured into submodules:
//!
//! - `protocol`: serde types for both wire vocabularies (call provider
//!   framing and the agent service's message set).
//! - `translate`: the stateless mapping between the two vocabularies.
//! - `machine`: the per-session state machine, free of any socket I/O.
//! - `dial`: candidate resolution and the upstream dialing strategy.
//! - `heartbeat`: the process-wide liveness sweep over open sockets.
//! - `session`: the socket driver that wires all of the above together.

pub mod dial;
pub mod heartbeat;
pub mod machine;
pub mod protocol;
pub mod session;
pub mod translate;

pub use session::ws_handler;
