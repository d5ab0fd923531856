//! Candidate resolution and the upstream dialing strategy.
//!
//! Dialing tries an ordered list of (endpoint, auth-mode) candidates
//! sequentially, with a bounded timeout per handshake. The first
//! success wins; total failure yields one aggregate error carrying the
//! full diagnostic trail.

use crate::config::Config;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, client::IntoClientRequest, http::HeaderValue},
};
use tracing::{info, warn};

/// The agent service's global ingress, tried before regional hosts.
const GLOBAL_HOST: &str = "wss://agents.voxlink.io";
/// Regional ingress hosts, in fixed priority order.
const REGIONAL_HOSTS: &[&str] = &["wss://agents.us.voxlink.io", "wss://agents.eu.voxlink.io"];

pub type AgentStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How credentials are presented during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// `X-Api-Key: <key>` header.
    ApiKey,
    /// `Authorization: Bearer <key>` header.
    Bearer,
}

impl AuthMode {
    /// Default trial order within one endpoint.
    pub const ALL: [AuthMode; 2] = [AuthMode::ApiKey, AuthMode::Bearer];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMode::ApiKey => "api-key",
            AuthMode::Bearer => "bearer",
        }
    }
}

impl FromStr for AuthMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "api-key" => Ok(AuthMode::ApiKey),
            "bearer" => Ok(AuthMode::Bearer),
            _ => Err(()),
        }
    }
}

/// One (endpoint, auth-mode) pair to attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionCandidate {
    pub endpoint: String,
    pub auth_mode: AuthMode,
}

/// Why one candidate attempt did not produce a connection.
#[derive(Debug, thiserror::Error)]
pub enum FailureKind {
    #[error("handshake rejected with status {0}")]
    Rejected(u16),
    #[error("unreachable: {0}")]
    Unreachable(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Diagnostic record for one failed candidate.
#[derive(Debug)]
pub struct DialFailure {
    pub candidate: ConnectionCandidate,
    pub kind: FailureKind,
}

/// Every candidate failed. Carries the ordered diagnostic trail.
#[derive(Debug, thiserror::Error)]
#[error("all {count} dial candidates failed", count = failures.len())]
pub struct DialError {
    pub failures: Vec<DialFailure>,
}

/// Builds the ordered candidate list for one dial attempt.
///
/// An explicit override endpoint is tried first, in every auth mode,
/// before any built-in host; hosts follow in fixed priority order
/// (global, then regional), each in every auth mode. A configured auth
/// preference moves that mode to the front of each endpoint's order.
/// The result is fully deterministic.
pub fn resolve_candidates(config: &Config) -> Vec<ConnectionCandidate> {
    let mut modes = AuthMode::ALL.to_vec();
    if let Some(preferred) = config.auth_preference {
        modes.sort_by_key(|m| *m != preferred);
    }

    let mut endpoints = Vec::new();
    if let Some(explicit) = &config.override_endpoint {
        endpoints.push(explicit.clone());
    }
    for host in std::iter::once(GLOBAL_HOST).chain(REGIONAL_HOSTS.iter().copied()) {
        endpoints.push(format!(
            "{}/v1/agents/stream?agent_id={}",
            host, config.agent_id
        ));
    }

    endpoints
        .into_iter()
        .flat_map(|endpoint| {
            modes.iter().map(move |&auth_mode| ConnectionCandidate {
                endpoint: endpoint.clone(),
                auth_mode,
            })
        })
        .collect()
}

/// Tries candidates strictly in order with the given connect function,
/// returning the first success together with the winning candidate.
/// Generic over the connect step so the strategy is testable without a
/// network.
pub async fn dial_with<T, C, Fut>(
    candidates: Vec<ConnectionCandidate>,
    mut connect: C,
) -> Result<(T, ConnectionCandidate), DialError>
where
    C: FnMut(ConnectionCandidate) -> Fut,
    Fut: Future<Output = Result<T, FailureKind>>,
{
    let mut failures = Vec::new();
    for candidate in candidates {
        match connect(candidate.clone()).await {
            Ok(connection) => {
                info!(
                    endpoint = %candidate.endpoint,
                    auth_mode = candidate.auth_mode.as_str(),
                    "Agent leg connected"
                );
                return Ok((connection, candidate));
            }
            Err(kind) => {
                warn!(
                    endpoint = %candidate.endpoint,
                    auth_mode = candidate.auth_mode.as_str(),
                    error = %kind,
                    "Dial candidate failed"
                );
                failures.push(DialFailure { candidate, kind });
            }
        }
    }
    Err(DialError { failures })
}

/// Dials the agent service: resolves candidates from the configuration
/// and attempts each over a real WebSocket handshake with a bounded
/// per-attempt timeout.
pub async fn dial(config: &Config) -> Result<(AgentStream, ConnectionCandidate), DialError> {
    let timeout = config.dial_timeout;
    let api_key = config.api_key.clone();
    dial_with(resolve_candidates(config), move |candidate| {
        let api_key = api_key.clone();
        async move { connect_candidate(candidate, &api_key, timeout).await }
    })
    .await
}

/// One handshake attempt: auth headers per the candidate's mode, a
/// single bounded `connect_async`, and classification of the outcome.
async fn connect_candidate(
    candidate: ConnectionCandidate,
    api_key: &str,
    timeout: Duration,
) -> Result<AgentStream, FailureKind> {
    let mut request = candidate
        .endpoint
        .as_str()
        .into_client_request()
        .map_err(|e| FailureKind::Unreachable(e.to_string()))?;

    let (header, value) = match candidate.auth_mode {
        AuthMode::ApiKey => ("X-Api-Key", api_key.to_string()),
        AuthMode::Bearer => ("Authorization", format!("Bearer {}", api_key)),
    };
    let value =
        HeaderValue::from_str(&value).map_err(|e| FailureKind::Unreachable(e.to_string()))?;
    request.headers_mut().insert(header, value);

    match tokio::time::timeout(timeout, connect_async(request)).await {
        Err(_) => Err(FailureKind::TimedOut(timeout)),
        Ok(Err(tungstenite::Error::Http(response))) => {
            Err(FailureKind::Rejected(response.status().as_u16()))
        }
        Ok(Err(e)) => Err(FailureKind::Unreachable(e.to_string())),
        Ok(Ok((stream, _response))) => Ok(stream),
    }
}
