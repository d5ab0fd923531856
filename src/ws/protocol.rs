//! Defines the wire formats on both legs of the bridge: the call
//! provider's media-stream framing and the agent service's realtime
//! message set.

use serde::{Deserialize, Serialize};

/// Events received on the call leg. The provider wraps every frame in a
/// JSON object tagged by an `event` field, camelCase throughout.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CallEvent {
    /// Sent once after the socket opens, before any stream metadata.
    Connected,
    /// Marks the beginning of the audio stream and names it.
    Start { start: StreamStart },
    /// One frame of caller audio.
    Media { media: MediaFrame },
    /// End of the audio stream.
    Stop,
    /// Playback marker echo; not relayed.
    Mark,
    /// Touch-tone digit; not relayed.
    Dtmf,
    /// Any event type introduced after this was written.
    #[serde(other)]
    Unknown,
}

/// Metadata carried by the call leg's `start` event.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    /// The provider-assigned stream identifier; names the session.
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub account_sid: Option<String>,
}

/// Audio payload of a call-leg `media` event. The payload is an opaque
/// base64 string in the provider's codec; the bridge never decodes it.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaFrame {
    pub payload: String,
    #[serde(default)]
    pub track: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Messages sent back down the call leg.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CallMessage {
    /// One frame of agent audio, addressed to the stream it belongs to.
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutboundMedia {
    pub payload: String,
}

/// Messages sent to the agent service, snake_case `type`-tagged.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum AgentCommand {
    /// Session configuration, sent once immediately after connecting.
    #[serde(rename = "session.update")]
    SessionUpdate { session: AgentSessionConfig },
    /// Appends one frame of caller audio to the agent's input buffer.
    #[serde(rename = "input_audio.append")]
    AudioAppend { audio: String },
    /// Signals that no further caller audio will arrive.
    #[serde(rename = "input_audio.commit")]
    AudioCommit,
}

/// Parameters announced to the agent service at session setup.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AgentSessionConfig {
    pub agent_id: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
}

impl AgentSessionConfig {
    /// Telephony audio is 8 kHz mu-law in both directions.
    pub fn telephony(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            input_audio_format: "g711_ulaw".to_string(),
            output_audio_format: "g711_ulaw".to_string(),
        }
    }
}

/// Messages received from the agent service. Unknown types are
/// tolerated and ignored by the relay.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum AgentEvent {
    /// The agent session is configured and accepting audio.
    #[serde(rename = "session.ready")]
    SessionReady,
    /// One chunk of synthesized agent audio.
    #[serde(rename = "audio.delta")]
    AudioDelta { audio: String },
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_start_event_parses() {
        let raw = r#"{"event":"start","sequenceNumber":"1","start":{"streamSid":"MZ123","callSid":"CA456","accountSid":"AC789"},"streamSid":"MZ123"}"#;
        let event: CallEvent = serde_json::from_str(raw).unwrap();
        match event {
            CallEvent::Start { start } => {
                assert_eq!(start.stream_sid, "MZ123");
                assert_eq!(start.call_sid.as_deref(), Some("CA456"));
            }
            other => panic!("Expected Start, got {:?}", other),
        }
    }

    #[test]
    fn test_call_media_event_parses() {
        let raw = r#"{"event":"media","media":{"payload":"dGVzdA==","track":"inbound","timestamp":"120"}}"#;
        let event: CallEvent = serde_json::from_str(raw).unwrap();
        match event {
            CallEvent::Media { media } => assert_eq!(media.payload, "dGVzdA=="),
            other => panic!("Expected Media, got {:?}", other),
        }
    }

    #[test]
    fn test_call_control_events_parse_with_extra_fields() {
        let connected: CallEvent =
            serde_json::from_str(r#"{"event":"connected","protocol":"Call","version":"1.0"}"#)
                .unwrap();
        assert_eq!(connected, CallEvent::Connected);

        let mark: CallEvent =
            serde_json::from_str(r#"{"event":"mark","mark":{"name":"greeting"}}"#).unwrap();
        assert_eq!(mark, CallEvent::Mark);

        let stop: CallEvent = serde_json::from_str(r#"{"event":"stop"}"#).unwrap();
        assert_eq!(stop, CallEvent::Stop);
    }

    #[test]
    fn test_unknown_call_event_tolerated() {
        let event: CallEvent = serde_json::from_str(r#"{"event":"resume","foo":1}"#).unwrap();
        assert_eq!(event, CallEvent::Unknown);
    }

    #[test]
    fn test_outbound_media_frame_shape() {
        let msg = CallMessage::Media {
            stream_sid: "MZ123".to_string(),
            media: OutboundMedia {
                payload: "dGVzdA==".to_string(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["event"], "media");
        assert_eq!(json["streamSid"], "MZ123");
        assert_eq!(json["media"]["payload"], "dGVzdA==");
    }

    #[test]
    fn test_agent_command_shapes() {
        let append = AgentCommand::AudioAppend {
            audio: "dGVzdA==".to_string(),
        };
        let json = serde_json::to_value(&append).unwrap();
        assert_eq!(json["type"], "input_audio.append");
        assert_eq!(json["audio"], "dGVzdA==");

        let commit = serde_json::to_value(&AgentCommand::AudioCommit).unwrap();
        assert_eq!(commit["type"], "input_audio.commit");

        let setup = serde_json::to_value(&AgentCommand::SessionUpdate {
            session: AgentSessionConfig::telephony("agent-123"),
        })
        .unwrap();
        assert_eq!(setup["type"], "session.update");
        assert_eq!(setup["session"]["agent_id"], "agent-123");
        assert_eq!(setup["session"]["input_audio_format"], "g711_ulaw");
    }

    #[test]
    fn test_agent_events_parse() {
        let ready: AgentEvent = serde_json::from_str(r#"{"type":"session.ready"}"#).unwrap();
        assert_eq!(ready, AgentEvent::SessionReady);

        let delta: AgentEvent =
            serde_json::from_str(r#"{"type":"audio.delta","audio":"cGNt"}"#).unwrap();
        assert_eq!(
            delta,
            AgentEvent::AudioDelta {
                audio: "cGNt".to_string()
            }
        );

        let unknown: AgentEvent =
            serde_json::from_str(r#"{"type":"transcript.delta","text":"hi"}"#).unwrap();
        assert_eq!(unknown, AgentEvent::Unknown);
    }
}
