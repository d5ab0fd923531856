//! Process-wide liveness supervision for every open socket.
//!
//! Both call legs and agent legs register here. A fixed-period sweep
//! probes each tracked socket; one that is still awaiting a pong from
//! the previous sweep is force-terminated and untracked. Delivery is a
//! per-socket command channel, so termination reaches the owning
//! session loop and flows through its normal teardown path.

use indexmap::IndexMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Commands delivered to the task that owns a tracked socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Send a ping frame and confirm the pong via [`Heartbeat::confirm`].
    Ping,
    /// The peer missed a probe cycle: hard-abort the socket.
    Terminate,
}

struct Entry {
    awaiting_pong: bool,
    commands: mpsc::UnboundedSender<Probe>,
}

/// The tracked-socket table. Created once at startup and shared for the
/// process lifetime; [`Heartbeat::run`] is the sweep loop.
pub struct Heartbeat {
    entries: Mutex<IndexMap<Uuid, Entry>>,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Tracks a new socket. The returned receiver delivers probe
    /// commands to the owning task.
    pub fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<Probe>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.entries.lock().unwrap().insert(
            id,
            Entry {
                awaiting_pong: false,
                commands: tx,
            },
        );
        (id, rx)
    }

    /// Records a pong from the peer, clearing the pending flag.
    pub fn confirm(&self, id: Uuid) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&id) {
            entry.awaiting_pong = false;
        }
    }

    /// Stops tracking a socket that closed normally. Idempotent, so a
    /// concurrent sweep and teardown never double-terminate.
    pub fn deregister(&self, id: Uuid) {
        self.entries.lock().unwrap().shift_remove(&id);
    }

    pub fn tracked(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// One sweep: terminate and untrack every socket still awaiting a
    /// pong, then mark the rest pending and probe them. Entries whose
    /// owning task is already gone are pruned without terminating.
    pub fn sweep(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|id, entry| {
            if entry.awaiting_pong {
                warn!(socket = %id, "Peer unresponsive; terminating socket");
                let _ = entry.commands.send(Probe::Terminate);
                return false;
            }
            entry.awaiting_pong = true;
            if entry.commands.send(Probe::Ping).is_err() {
                debug!(socket = %id, "Pruning tracked socket with no owner");
                return false;
            }
            true
        });
    }

    /// The supervisor loop: sweeps on a fixed period, started once at
    /// startup and never stopped while the process runs.
    pub async fn run(self: Arc<Self>, period: Duration) {
        let mut interval = tokio::time::interval(period);
        // The first tick fires immediately; skip it so freshly-accepted
        // sockets get a full period before their first probe.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.sweep();
        }
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<Probe>) -> Vec<Probe> {
        let mut probes = Vec::new();
        while let Ok(probe) = rx.try_recv() {
            probes.push(probe);
        }
        probes
    }

    #[tokio::test]
    async fn test_responsive_socket_survives_every_sweep() {
        let heartbeat = Heartbeat::new();
        let (id, mut rx) = heartbeat.register();

        for _ in 0..5 {
            heartbeat.sweep();
            assert_eq!(drain(&mut rx), vec![Probe::Ping]);
            heartbeat.confirm(id);
        }
        assert_eq!(heartbeat.tracked(), 1);
    }

    #[tokio::test]
    async fn test_one_missed_cycle_terminates() {
        let heartbeat = Heartbeat::new();
        let (_id, mut rx) = heartbeat.register();

        heartbeat.sweep();
        assert_eq!(drain(&mut rx), vec![Probe::Ping]);

        // No pong before the next sweep.
        heartbeat.sweep();
        assert_eq!(drain(&mut rx), vec![Probe::Terminate]);
        assert_eq!(heartbeat.tracked(), 0);

        // A third sweep sends nothing further.
        heartbeat.sweep();
        assert_eq!(drain(&mut rx), vec![]);
    }

    #[tokio::test]
    async fn test_late_pong_after_termination_is_harmless() {
        let heartbeat = Heartbeat::new();
        let (id, mut rx) = heartbeat.register();

        heartbeat.sweep();
        heartbeat.sweep();
        assert_eq!(drain(&mut rx), vec![Probe::Ping, Probe::Terminate]);

        heartbeat.confirm(id);
        assert_eq!(heartbeat.tracked(), 0);
    }

    #[tokio::test]
    async fn test_deregister_is_idempotent() {
        let heartbeat = Heartbeat::new();
        let (id, _rx) = heartbeat.register();

        heartbeat.deregister(id);
        heartbeat.deregister(id);
        assert_eq!(heartbeat.tracked(), 0);
        heartbeat.sweep();
    }

    #[tokio::test]
    async fn test_orphaned_entry_pruned_without_terminate() {
        let heartbeat = Heartbeat::new();
        let (_id, rx) = heartbeat.register();
        drop(rx);

        heartbeat.sweep();
        assert_eq!(heartbeat.tracked(), 0);
    }

    #[tokio::test]
    async fn test_sweep_order_follows_registration_order() {
        let heartbeat = Heartbeat::new();
        let (_a, mut rx_a) = heartbeat.register();
        let (_b, mut rx_b) = heartbeat.register();
        let (_c, mut rx_c) = heartbeat.register();

        heartbeat.sweep();
        assert_eq!(drain(&mut rx_a), vec![Probe::Ping]);
        assert_eq!(drain(&mut rx_b), vec![Probe::Ping]);
        assert_eq!(drain(&mut rx_c), vec![Probe::Ping]);
        assert_eq!(heartbeat.tracked(), 3);
    }

    #[tokio::test]
    async fn test_mixed_responsive_and_dead_sockets() {
        let heartbeat = Heartbeat::new();
        let (alive, mut rx_alive) = heartbeat.register();
        let (_dead, mut rx_dead) = heartbeat.register();

        heartbeat.sweep();
        heartbeat.confirm(alive);
        heartbeat.sweep();

        assert_eq!(drain(&mut rx_alive), vec![Probe::Ping, Probe::Ping]);
        assert_eq!(drain(&mut rx_dead), vec![Probe::Ping, Probe::Terminate]);
        assert_eq!(heartbeat.tracked(), 1);
    }
}
