//! The per-session state machine.
//!
//! `SessionCore` owns no sockets. The driver in `session.rs` feeds it
//! one [`Event`] at a time and executes the [`Action`]s it returns, so
//! the whole lifecycle is testable with plain values.

use super::protocol::{AgentCommand, AgentEvent, AgentSessionConfig, CallEvent, CallMessage};
use super::translate;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

/// Lifecycle states of one bridged call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Call leg connected; no `start` event yet.
    AwaitingStart,
    /// Upstream dial in flight.
    Dialing,
    /// Both legs open; relaying.
    Active,
    /// Agent leg closing after end-of-call audio.
    Draining,
    /// Terminal. Removed from the registry on entry.
    Closed,
}

/// Everything that can happen to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Call(CallEvent),
    CallClosed,
    Agent(AgentEvent),
    AgentClosed,
    DialSucceeded,
    DialFailed,
}

/// Side effects the driver must carry out, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// The stream identifier arrived; re-key the registry entry.
    AssignId(String),
    /// Start the upstream dial.
    Dial,
    /// Send one message up the agent leg.
    SendAgent(AgentCommand),
    /// Send one frame down the call leg.
    SendCall(CallMessage),
    /// Gracefully close the agent leg.
    CloseAgent,
    /// The session reached `Closed`: deregister and abandon any
    /// in-flight dial. The call socket is left to the driver's policy.
    Teardown,
}

/// State for one bridged call, independent of any transport.
#[derive(Debug)]
pub struct SessionCore {
    id: String,
    agent_id: String,
    state: SessionState,
    stream_sid: Option<String>,
    call_open: bool,
    agent_attached: bool,
    agent_ready: bool,
    frames_forwarded: u64,
    frames_dropped: u64,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl SessionCore {
    pub fn new(provisional_id: String, agent_id: String) -> Self {
        let now = Utc::now();
        Self {
            id: provisional_id,
            agent_id,
            state: SessionState::AwaitingStart,
            stream_sid: None,
            call_open: true,
            agent_attached: false,
            agent_ready: false,
            frames_forwarded: 0,
            frames_dropped: 0,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Dispatches one event against the current state and returns the
    /// side effects to perform, in order.
    pub fn handle(&mut self, event: Event) -> Vec<Action> {
        if self.state == SessionState::Closed {
            return Vec::new();
        }
        self.last_activity_at = Utc::now();

        match event {
            Event::Call(call_event) => self.handle_call_event(call_event),
            Event::CallClosed => self.handle_call_closed(),
            Event::Agent(agent_event) => self.handle_agent_event(agent_event),
            Event::AgentClosed => self.handle_agent_closed(),
            Event::DialSucceeded => self.handle_dial_succeeded(),
            Event::DialFailed => self.handle_dial_failed(),
        }
    }

    fn handle_call_event(&mut self, event: CallEvent) -> Vec<Action> {
        match event {
            CallEvent::Start { start } => {
                if self.stream_sid.is_some() {
                    warn!(id = %self.id, "Ignoring repeated start event");
                    return Vec::new();
                }
                self.id = start.stream_sid.clone();
                self.stream_sid = Some(start.stream_sid);
                self.state = SessionState::Dialing;
                vec![Action::AssignId(self.id.clone()), Action::Dial]
            }
            CallEvent::Media { media } => {
                if self.state == SessionState::Active && self.agent_attached && self.agent_ready {
                    if self.frames_forwarded == 0 && self.frames_dropped > 0 {
                        info!(
                            id = %self.id,
                            dropped = self.frames_dropped,
                            "Agent leg ready; earlier caller audio was dropped"
                        );
                    }
                    self.frames_forwarded += 1;
                    vec![Action::SendAgent(translate::media_to_append(media.payload))]
                } else {
                    // Lossy by design: frames before the agent leg is
                    // ready (or after it is gone) are not buffered.
                    self.frames_dropped += 1;
                    Vec::new()
                }
            }
            CallEvent::Stop => match self.state {
                SessionState::Active if self.agent_attached => {
                    self.state = SessionState::Draining;
                    vec![
                        Action::SendAgent(AgentCommand::AudioCommit),
                        Action::CloseAgent,
                    ]
                }
                // The commit was already sent; a repeated stop must not
                // send another.
                SessionState::Draining => Vec::new(),
                _ => self.close("call stop with no agent leg"),
            },
            CallEvent::Connected | CallEvent::Mark | CallEvent::Dtmf | CallEvent::Unknown => {
                Vec::new()
            }
        }
    }

    fn handle_call_closed(&mut self) -> Vec<Action> {
        self.call_open = false;
        let mut actions = Vec::new();
        if self.agent_attached {
            self.agent_attached = false;
            self.agent_ready = false;
            actions.push(Action::CloseAgent);
        }
        actions.extend(self.close("call leg closed"));
        actions
    }

    fn handle_agent_event(&mut self, event: AgentEvent) -> Vec<Action> {
        match event {
            AgentEvent::SessionReady => {
                self.agent_ready = true;
                Vec::new()
            }
            AgentEvent::AudioDelta { audio } => match (&self.stream_sid, self.call_open) {
                (Some(sid), true) => {
                    vec![Action::SendCall(translate::audio_to_media_frame(sid, audio))]
                }
                _ => Vec::new(),
            },
            AgentEvent::Unknown => Vec::new(),
        }
    }

    fn handle_agent_closed(&mut self) -> Vec<Action> {
        self.agent_attached = false;
        self.agent_ready = false;
        match self.state {
            SessionState::Draining => self.close("agent leg drained"),
            // No automatic re-dial: the session keeps consuming call
            // media (dropped) until the call ends.
            SessionState::Active if self.call_open => {
                warn!(id = %self.id, "Agent leg lost mid-call; no re-dial");
                Vec::new()
            }
            _ => self.close("agent leg closed"),
        }
    }

    fn handle_dial_succeeded(&mut self) -> Vec<Action> {
        if self.state != SessionState::Dialing {
            return Vec::new();
        }
        self.agent_attached = true;
        self.state = SessionState::Active;
        vec![Action::SendAgent(AgentCommand::SessionUpdate {
            session: AgentSessionConfig::telephony(self.agent_id.clone()),
        })]
    }

    fn handle_dial_failed(&mut self) -> Vec<Action> {
        if self.state != SessionState::Dialing {
            return Vec::new();
        }
        // The call leg is deliberately left open: the caller simply
        // never hears agent audio.
        self.close("upstream unavailable")
    }

    fn close(&mut self, reason: &str) -> Vec<Action> {
        info!(
            id = %self.id,
            reason,
            forwarded = self.frames_forwarded,
            dropped = self.frames_dropped,
            "Session closed"
        );
        self.state = SessionState::Closed;
        vec![Action::Teardown]
    }
}
