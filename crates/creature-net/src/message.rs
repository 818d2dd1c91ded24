// ── Control-server messages ──
//
// Every frame on the duplex channel is a JSON envelope
// `{"command": <tag>, "payload": <tag-dependent>}`. `MessageKind` is the
// single tag registry used by both directions; `Message` is the closed sum
// over known payloads plus an explicit `Unknown` catch-all.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::Error;

// ── Tag registry ─────────────────────────────────────────────────────

/// Known command tags.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum MessageKind {
    Notice,
    Logging,
    ServerCounters,
    StreamFrame,
    StatusLights,
    JobProgress,
    JobComplete,
    PlaylistStatus,
    IdleState,
    CreatureActivity,
}

impl MessageKind {
    /// Look up a tag; `None` for anything outside the known set.
    pub fn from_tag(tag: &str) -> Option<Self> {
        tag.parse().ok()
    }

    pub fn tag(self) -> &'static str {
        self.into()
    }
}

// ── Payloads ─────────────────────────────────────────────────────────

/// A human-readable announcement from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// One log line forwarded from the server's logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerLogItem {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub logger_name: String,
    #[serde(default)]
    pub thread_id: u32,
}

/// Server throughput counters, sent periodically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerCounters {
    pub total_frames: u64,
    pub events_processed: u64,
    pub frames_streamed: u64,
    pub dmx_events_processed: u64,
    pub animation_events_processed: u64,
    pub sounds_played: u64,
    pub playlists_started: u64,
    pub rest_requests_processed: u64,
    pub websocket_messages_received: u64,
    pub websocket_messages_sent: u64,
}

/// One streamed frame of motion data for a creature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFrameData {
    pub creature_id: String,
    pub universe: u16,
    /// Base64-encoded channel data.
    pub data: String,
}

/// The server's front-panel status lights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusLights {
    pub running: bool,
    pub dmx: bool,
    pub streaming: bool,
    pub animation_playing: bool,
}

/// Progress of a long-running server job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: String,
    pub job_type: String,
    /// 0.0 ..= 1.0
    pub progress: f64,
    #[serde(default)]
    pub details: Option<String>,
}

/// Final status of a server job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCompletion {
    pub job_id: String,
    pub job_type: String,
    pub status: String,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
}

/// Playlist playback on a universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistStatus {
    pub universe: u16,
    pub playlist: String,
    pub playing: bool,
    #[serde(default)]
    pub current_animation: Option<String>,
}

/// Whether a creature's idle loop is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleState {
    pub creature_id: String,
    pub idle_enabled: bool,
}

/// What a creature is currently doing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureActivity {
    pub creature_id: String,
    pub state: String,
    #[serde(default)]
    pub animation_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

// ── Message ──────────────────────────────────────────────────────────

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Notice(Notice),
    Logging(ServerLogItem),
    ServerCounters(ServerCounters),
    StreamFrame(StreamFrameData),
    StatusLights(StatusLights),
    JobProgress(JobProgress),
    JobComplete(JobCompletion),
    PlaylistStatus(PlaylistStatus),
    IdleState(IdleState),
    CreatureActivity(CreatureActivity),
    /// A tag outside the known set. Never dispatched.
    Unknown { command: String },
}

/// Wire shape of every frame.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    command: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl Message {
    /// Registry entry for this message; `None` for [`Message::Unknown`].
    pub fn kind(&self) -> Option<MessageKind> {
        Some(match self {
            Self::Notice(_) => MessageKind::Notice,
            Self::Logging(_) => MessageKind::Logging,
            Self::ServerCounters(_) => MessageKind::ServerCounters,
            Self::StreamFrame(_) => MessageKind::StreamFrame,
            Self::StatusLights(_) => MessageKind::StatusLights,
            Self::JobProgress(_) => MessageKind::JobProgress,
            Self::JobComplete(_) => MessageKind::JobComplete,
            Self::PlaylistStatus(_) => MessageKind::PlaylistStatus,
            Self::IdleState(_) => MessageKind::IdleState,
            Self::CreatureActivity(_) => MessageKind::CreatureActivity,
            Self::Unknown { .. } => return None,
        })
    }

    /// The command tag as it appears on the wire.
    pub fn command(&self) -> &str {
        match self {
            Self::Unknown { command } => command,
            known => known.kind().map_or("", MessageKind::tag),
        }
    }

    /// Parse one text frame.
    ///
    /// A well-formed envelope with an unrecognized tag yields
    /// [`Message::Unknown`]; malformed JSON or a payload that does not match
    /// its tag is an error.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let envelope: Envelope = serde_json::from_str(text)?;
        let Some(kind) = MessageKind::from_tag(&envelope.command) else {
            return Ok(Self::Unknown {
                command: envelope.command,
            });
        };

        let payload = envelope.payload;
        Ok(match kind {
            MessageKind::Notice => Self::Notice(typed(payload)?),
            MessageKind::Logging => Self::Logging(typed(payload)?),
            MessageKind::ServerCounters => Self::ServerCounters(typed(payload)?),
            MessageKind::StreamFrame => Self::StreamFrame(typed(payload)?),
            MessageKind::StatusLights => Self::StatusLights(typed(payload)?),
            MessageKind::JobProgress => Self::JobProgress(typed(payload)?),
            MessageKind::JobComplete => Self::JobComplete(typed(payload)?),
            MessageKind::PlaylistStatus => Self::PlaylistStatus(typed(payload)?),
            MessageKind::IdleState => Self::IdleState(typed(payload)?),
            MessageKind::CreatureActivity => Self::CreatureActivity(typed(payload)?),
        })
    }

    /// Serialize into an envelope. Unknown messages cannot be sent.
    pub fn encode(&self) -> Result<String, Error> {
        let payload = match self {
            Self::Notice(p) => serde_json::to_value(p)?,
            Self::Logging(p) => serde_json::to_value(p)?,
            Self::ServerCounters(p) => serde_json::to_value(p)?,
            Self::StreamFrame(p) => serde_json::to_value(p)?,
            Self::StatusLights(p) => serde_json::to_value(p)?,
            Self::JobProgress(p) => serde_json::to_value(p)?,
            Self::JobComplete(p) => serde_json::to_value(p)?,
            Self::PlaylistStatus(p) => serde_json::to_value(p)?,
            Self::IdleState(p) => serde_json::to_value(p)?,
            Self::CreatureActivity(p) => serde_json::to_value(p)?,
            Self::Unknown { command } => return Err(Error::UnknownCommand(command.clone())),
        };

        Ok(serde_json::to_string(&Envelope {
            command: self.command().to_owned(),
            payload,
        })?)
    }
}

fn typed<T: DeserializeOwned>(payload: serde_json::Value) -> Result<T, Error> {
    Ok(serde_json::from_value(payload)?)
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Handler set supplied by the embedding application.
///
/// One method per known command; each defaults to doing nothing. Handlers
/// run on the client's receive task and must return promptly.
#[allow(unused_variables)]
pub trait MessageProcessor: Send + Sync {
    fn process_notice(&self, notice: Notice) {}
    fn process_log(&self, item: ServerLogItem) {}
    fn process_server_counters(&self, counters: ServerCounters) {}
    fn process_stream_frame(&self, frame: StreamFrameData) {}
    fn process_status_lights(&self, lights: StatusLights) {}
    fn process_job_progress(&self, progress: JobProgress) {}
    fn process_job_complete(&self, completion: JobCompletion) {}
    fn process_playlist_status(&self, status: PlaylistStatus) {}
    fn process_idle_state(&self, state: IdleState) {}
    fn process_creature_activity(&self, activity: CreatureActivity) {}
}

/// Route a decoded message to exactly one handler method.
///
/// Returns `false` for [`Message::Unknown`], which is dropped.
pub fn dispatch(processor: &dyn MessageProcessor, message: Message) -> bool {
    match message {
        Message::Notice(p) => processor.process_notice(p),
        Message::Logging(p) => processor.process_log(p),
        Message::ServerCounters(p) => processor.process_server_counters(p),
        Message::StreamFrame(p) => processor.process_stream_frame(p),
        Message::StatusLights(p) => processor.process_status_lights(p),
        Message::JobProgress(p) => processor.process_job_progress(p),
        Message::JobComplete(p) => processor.process_job_complete(p),
        Message::PlaylistStatus(p) => processor.process_playlist_status(p),
        Message::IdleState(p) => processor.process_idle_state(p),
        Message::CreatureActivity(p) => processor.process_creature_activity(p),
        Message::Unknown { .. } => return false,
    }
    true
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;
    use strum::IntoEnumIterator;

    #[test]
    fn registry_round_trips_every_tag() {
        for kind in MessageKind::iter() {
            assert_eq!(MessageKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(MessageKind::ServerCounters.tag(), "server-counters");
        assert_eq!(MessageKind::from_tag("emergency-stop"), None);
    }

    #[test]
    fn decodes_notice_with_iso_timestamp() {
        let text = r#"{"command":"notice","payload":{"message":"Server restarting","timestamp":"2026-10-18T12:00:00Z"}}"#;
        let Message::Notice(notice) = Message::decode(text).unwrap() else {
            panic!("expected notice");
        };
        assert_eq!(notice.message, "Server restarting");
        assert_eq!(notice.timestamp.to_rfc3339(), "2026-10-18T12:00:00+00:00");
    }

    #[test]
    fn unknown_tag_is_explicit() {
        let msg = Message::decode(r#"{"command":"cache-invalidation","payload":{}}"#).unwrap();
        assert_eq!(
            msg,
            Message::Unknown {
                command: "cache-invalidation".into()
            }
        );
        assert_eq!(msg.kind(), None);
        assert!(msg.encode().is_err());
    }

    #[test]
    fn mismatched_payload_is_an_error() {
        let text = r#"{"command":"status-lights","payload":{"running":"yes"}}"#;
        assert!(Message::decode(text).is_err());
        assert!(Message::decode("not json").is_err());
    }

    #[test]
    fn encode_uses_registry_tag() {
        let msg = Message::StatusLights(StatusLights {
            running: true,
            dmx: true,
            streaming: false,
            animation_playing: false,
        });
        let text = msg.encode().unwrap();
        let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(raw["command"], "status-lights");
        assert_eq!(raw["payload"]["running"], true);
        assert_eq!(Message::decode(&text).unwrap(), msg);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<&'static str>>);

    impl MessageProcessor for Recorder {
        fn process_notice(&self, _: Notice) {
            self.0.lock().unwrap().push("notice");
        }
        fn process_server_counters(&self, _: ServerCounters) {
            self.0.lock().unwrap().push("counters");
        }
    }

    #[test]
    fn dispatch_invokes_one_handler() {
        let recorder = Recorder::default();
        let counters = Message::ServerCounters(ServerCounters {
            total_frames: 10,
            ..ServerCounters::default()
        });

        assert!(dispatch(&recorder, counters));
        assert!(!dispatch(&recorder, Message::Unknown { command: "x".into() }));
        assert!(dispatch(
            &recorder,
            Message::IdleState(IdleState {
                creature_id: "beaky".into(),
                idle_enabled: true
            })
        ));

        assert_eq!(*recorder.0.lock().unwrap(), vec!["counters"]);
    }
}
