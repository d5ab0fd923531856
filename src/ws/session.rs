//! The socket driver for one bridged call.
//!
//! Owns the call-leg WebSocket, runs the session's event loop, and
//! executes the actions emitted by the state machine in `machine.rs`.
//! The agent leg, once dialed, is owned by a spawned pump task bridged
//! with bounded channels, so a slow upstream never stalls the call leg
//! and an abandoned dial can be cancelled without orphaning a socket.

use super::{
    dial::{self, AgentStream, ConnectionCandidate, DialError},
    heartbeat::{Heartbeat, Probe},
    machine::{Action, Event, SessionCore},
    protocol::{AgentCommand, AgentEvent},
    translate,
};
use crate::{registry::SessionSummary, state::AppState};
use anyhow::Result;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Axum handler to upgrade an HTTP connection to a call-leg WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_call(socket, state))
}

/// Commands for the agent-leg pump task.
enum AgentLegCommand {
    Send(AgentCommand),
    Close,
}

/// Notifications from the agent-leg pump back to the session loop.
enum AgentSignal {
    Event(AgentEvent),
    Closed,
}

type DialOutcome = Result<(AgentStream, ConnectionCandidate), DialError>;

/// Entry point for one accepted call leg: registers the session under a
/// provisional id and runs the relay loop until the call leg is gone.
#[instrument(name = "call_session", skip_all, fields(session_id))]
async fn handle_call(socket: WebSocket, state: Arc<AppState>) {
    let provisional_id = format!("pending-{}", Uuid::new_v4());
    tracing::Span::current().record("session_id", provisional_id.as_str());
    info!("New call leg connected. Awaiting start event...");

    let mut core = SessionCore::new(provisional_id.clone(), state.config.agent_id.clone());
    state.registry.insert(SessionSummary {
        id: provisional_id,
        state: core.state(),
        created_at: core.created_at(),
        last_activity_at: core.last_activity_at(),
    });

    if let Err(e) = run_relay(socket, &state, &mut core).await {
        error!(error = ?e, "Call session terminated with error.");
    }

    // Normal paths deregister on `Closed`; this covers error exits.
    state.registry.remove(core.id());
    info!("Call session finished.");
}

/// The session event loop: call-leg frames, call-leg liveness probes,
/// the dial result, and agent-leg signals, each feeding the state
/// machine whose actions are executed in order.
async fn run_relay(socket: WebSocket, state: &Arc<AppState>, core: &mut SessionCore) -> Result<()> {
    let (mut call_tx, mut call_rx): (SplitSink<WebSocket, Message>, SplitStream<WebSocket>) =
        socket.split();
    let (call_probe_id, mut call_probe_rx) = state.heartbeat.register();
    let mut registry_key = core.id().to_string();

    let mut dial_task: Option<JoinHandle<DialOutcome>> = None;
    let mut agent_cmd_tx: Option<mpsc::Sender<AgentLegCommand>> = None;
    let mut agent_events_rx: Option<mpsc::Receiver<AgentSignal>> = None;
    let mut agent_task: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            maybe_msg = call_rx.next() => {
                match maybe_msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(event) = translate::parse_call_event(&text) {
                            let actions = core.handle(Event::Call(event));
                            apply_actions(
                                actions, core, state, &mut registry_key,
                                &mut call_tx, &mut agent_cmd_tx, &mut dial_task,
                            )
                            .await;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => state.heartbeat.confirm(call_probe_id),
                    // axum answers pings itself; the provider never
                    // sends binary frames.
                    Some(Ok(Message::Ping(_))) => {}
                    Some(Ok(Message::Binary(_))) => {
                        debug!("Ignoring unexpected binary frame on call leg");
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("Call leg closed by peer.");
                        let actions = core.handle(Event::CallClosed);
                        apply_actions(
                            actions, core, state, &mut registry_key,
                            &mut call_tx, &mut agent_cmd_tx, &mut dial_task,
                        )
                        .await;
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = ?e, "Call leg transport error");
                        let actions = core.handle(Event::CallClosed);
                        apply_actions(
                            actions, core, state, &mut registry_key,
                            &mut call_tx, &mut agent_cmd_tx, &mut dial_task,
                        )
                        .await;
                        break;
                    }
                }
            }

            Some(probe) = call_probe_rx.recv() => {
                match probe {
                    Probe::Ping => {
                        let _ = call_tx.send(Message::Ping(Bytes::new())).await;
                    }
                    Probe::Terminate => {
                        warn!("Call leg unresponsive; aborting session");
                        let actions = core.handle(Event::CallClosed);
                        apply_actions(
                            actions, core, state, &mut registry_key,
                            &mut call_tx, &mut agent_cmd_tx, &mut dial_task,
                        )
                        .await;
                        break;
                    }
                }
            }

            result = async { dial_task.as_mut().unwrap().await }, if dial_task.is_some() => {
                dial_task = None;
                let machine_event = match result {
                    Ok(Ok((stream, _candidate))) => {
                        let (cmd_tx, cmd_rx) = mpsc::channel(128);
                        let (event_tx, event_rx) = mpsc::channel(128);
                        agent_task = Some(tokio::spawn(run_agent_leg(
                            stream,
                            cmd_rx,
                            event_tx,
                            state.heartbeat.clone(),
                        )));
                        agent_cmd_tx = Some(cmd_tx);
                        agent_events_rx = Some(event_rx);
                        Event::DialSucceeded
                    }
                    Ok(Err(dial_err)) => {
                        error!(
                            failures = dial_err.failures.len(),
                            error = %dial_err,
                            "Upstream unavailable"
                        );
                        Event::DialFailed
                    }
                    Err(join_err) => {
                        error!(error = ?join_err, "Dial task failed");
                        Event::DialFailed
                    }
                };
                let actions = core.handle(machine_event);
                apply_actions(
                    actions, core, state, &mut registry_key,
                    &mut call_tx, &mut agent_cmd_tx, &mut dial_task,
                )
                .await;
            }

            maybe_signal = async { agent_events_rx.as_mut().unwrap().recv().await },
                if agent_events_rx.is_some() =>
            {
                let machine_event = match maybe_signal {
                    Some(AgentSignal::Event(event)) => Event::Agent(event),
                    Some(AgentSignal::Closed) | None => {
                        agent_events_rx = None;
                        agent_cmd_tx = None;
                        Event::AgentClosed
                    }
                };
                let actions = core.handle(machine_event);
                apply_actions(
                    actions, core, state, &mut registry_key,
                    &mut call_tx, &mut agent_cmd_tx, &mut dial_task,
                )
                .await;
            }
        }
    }

    // The call leg is gone: nothing may outlive the session. An
    // in-flight dial is cancelled (a late-won socket is dropped, which
    // closes it) and the agent pump is aborted if still running.
    if let Some(handle) = dial_task.take() {
        handle.abort();
    }
    if let Some(tx) = agent_cmd_tx.take() {
        let _ = tx.send(AgentLegCommand::Close).await;
    }
    if let Some(handle) = agent_task.take() {
        handle.abort();
    }
    state.heartbeat.deregister(call_probe_id);
    Ok(())
}

/// Executes the machine's side effects, in order, then mirrors the
/// session's state into the registry for diagnostics.
async fn apply_actions(
    actions: Vec<Action>,
    core: &mut SessionCore,
    state: &Arc<AppState>,
    registry_key: &mut String,
    call_tx: &mut SplitSink<WebSocket, Message>,
    agent_cmd_tx: &mut Option<mpsc::Sender<AgentLegCommand>>,
    dial_task: &mut Option<JoinHandle<DialOutcome>>,
) {
    for action in actions {
        match action {
            Action::AssignId(new_id) => {
                state.registry.rename(registry_key, &new_id);
                *registry_key = new_id;
                tracing::Span::current().record("session_id", registry_key.as_str());
                info!("Stream identified; dialing agent service");
            }
            Action::Dial => {
                let config = state.config.clone();
                *dial_task = Some(tokio::spawn(async move { dial::dial(&config).await }));
            }
            Action::SendAgent(command) => {
                if let Some(tx) = agent_cmd_tx {
                    if tx.send(AgentLegCommand::Send(command)).await.is_err() {
                        warn!("Agent leg gone; message dropped");
                    }
                }
            }
            Action::SendCall(message) => match serde_json::to_string(&message) {
                Ok(json) => {
                    if call_tx.send(Message::Text(json.into())).await.is_err() {
                        warn!("Failed to send frame down the call leg");
                    }
                }
                Err(e) => error!(error = %e, "Failed to serialize call-leg frame"),
            },
            Action::CloseAgent => {
                if let Some(tx) = agent_cmd_tx.take() {
                    let _ = tx.send(AgentLegCommand::Close).await;
                }
            }
            Action::Teardown => {
                state.registry.remove(registry_key);
                if let Some(handle) = dial_task.take() {
                    handle.abort();
                }
                if let Some(tx) = agent_cmd_tx.take() {
                    let _ = tx.send(AgentLegCommand::Close).await;
                }
            }
        }
    }
    state
        .registry
        .update(registry_key, core.state(), core.last_activity_at());
}

/// Pump task owning the agent-leg socket: sends commands up, reports
/// events and closure back, and answers its own liveness probes. A
/// `Close` command starts a graceful close; a `Terminate` probe is a
/// hard abort.
async fn run_agent_leg(
    stream: AgentStream,
    mut commands: mpsc::Receiver<AgentLegCommand>,
    events: mpsc::Sender<AgentSignal>,
    heartbeat: Arc<Heartbeat>,
) {
    let (probe_id, mut probe_rx) = heartbeat.register();
    let (mut agent_tx, mut agent_rx) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Some(AgentLegCommand::Send(cmd)) => match serde_json::to_string(&cmd) {
                        Ok(json) => {
                            if agent_tx.send(WsMessage::Text(json.into())).await.is_err() {
                                warn!("Agent leg send failed");
                                break;
                            }
                        }
                        Err(e) => error!(error = %e, "Failed to serialize agent command"),
                    },
                    Some(AgentLegCommand::Close) => {
                        // Start the close handshake; keep reading until
                        // the peer completes it.
                        let _ = agent_tx.send(WsMessage::Close(None)).await;
                    }
                    None => break,
                }
            }

            maybe_msg = agent_rx.next() => {
                match maybe_msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match translate::parse_agent_event(&text) {
                            Some(AgentEvent::Unknown) => {
                                debug!("Ignoring unrecognized agent message");
                            }
                            Some(event) => {
                                if events.send(AgentSignal::Event(event)).await.is_err() {
                                    break;
                                }
                            }
                            None => {}
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => heartbeat.confirm(probe_id),
                    // tungstenite queues the pong reply itself.
                    Some(Ok(WsMessage::Ping(_))) => {}
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = ?e, "Agent leg transport error");
                        break;
                    }
                }
            }

            Some(probe) = probe_rx.recv() => {
                match probe {
                    Probe::Ping => {
                        let _ = agent_tx.send(WsMessage::Ping(Bytes::new())).await;
                    }
                    Probe::Terminate => {
                        warn!("Agent leg unresponsive; aborting");
                        break;
                    }
                }
            }
        }
    }

    heartbeat.deregister(probe_id);
    let _ = events.send(AgentSignal::Closed).await;
}
