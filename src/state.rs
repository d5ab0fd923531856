//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the shared,
//! process-wide resources: configuration, the session registry, and the
//! heartbeat supervisor's tracked-socket table. Created once at startup
//! and never torn down.

use crate::config::Config;
use crate::registry::Registry;
use crate::ws::heartbeat::Heartbeat;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<Registry>,
    pub heartbeat: Arc<Heartbeat>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(Registry::new()),
            heartbeat: Arc::new(Heartbeat::new()),
        }
    }
}
