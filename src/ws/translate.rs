//! The stateless translator between the two wire vocabularies.
//!
//! Parsing and mapping only: readiness gating and ordering decisions
//! belong to the session state machine. Malformed input is dropped here
//! and never reaches the machine.

use super::protocol::{AgentCommand, AgentEvent, CallEvent, CallMessage, OutboundMedia};
use tracing::debug;

/// Parses one text frame from the call leg. Non-parseable frames are
/// dropped silently (logged at debug) per the relay contract.
pub fn parse_call_event(raw: &str) -> Option<CallEvent> {
    match serde_json::from_str::<CallEvent>(raw) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "Dropping malformed call-leg frame");
            None
        }
    }
}

/// Parses one text frame from the agent leg.
pub fn parse_agent_event(raw: &str) -> Option<AgentEvent> {
    match serde_json::from_str::<AgentEvent>(raw) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!(error = %e, "Dropping malformed agent-leg message");
            None
        }
    }
}

/// Maps one frame of caller audio to the agent's append message. The
/// payload stays an opaque base64 string end to end.
pub fn media_to_append(payload: String) -> AgentCommand {
    AgentCommand::AudioAppend { audio: payload }
}

/// Maps one chunk of agent audio to a call-leg media frame addressed to
/// the owning stream.
pub fn audio_to_media_frame(stream_sid: &str, audio: String) -> CallMessage {
    CallMessage::Media {
        stream_sid: stream_sid.to_string(),
        media: OutboundMedia { payload: audio },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_call_frame_dropped() {
        assert_eq!(parse_call_event("not json"), None);
        assert_eq!(parse_call_event(r#"{"no_event_tag":true}"#), None);
        assert_eq!(parse_call_event(""), None);
    }

    #[test]
    fn test_malformed_agent_message_dropped() {
        assert_eq!(parse_agent_event("not json"), None);
        assert_eq!(parse_agent_event(r#"[1,2,3]"#), None);
    }

    #[test]
    fn test_media_to_append_carries_payload_unchanged() {
        let cmd = media_to_append("c29tZSBhdWRpbw==".to_string());
        assert_eq!(
            cmd,
            AgentCommand::AudioAppend {
                audio: "c29tZSBhdWRpbw==".to_string()
            }
        );
    }

    #[test]
    fn test_audio_to_media_frame_addresses_stream() {
        let msg = audio_to_media_frame("MZ42", "cGNt".to_string());
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "media");
        assert_eq!(json["streamSid"], "MZ42");
        assert_eq!(json["media"]["payload"], "cGNt");
    }
}
