//! Wire protocol messages
//!
//! Both directions of the stream are discriminated unions over payload
//! variants, serialized as internally-tagged JSON. Audio payloads travel
//! base64-encoded inside the JSON envelope: raw 16 kHz s16le PCM inbound,
//! MP3 outbound.

use serde::{Deserialize, Serialize};

use crate::language::BufferingStrategy;

/// The speaker bound to a session by `session_init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    pub participant_id: String,
    pub nickname: String,
    #[serde(default)]
    pub profile_img: String,
    pub source_language: String,
}

/// A listener in the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: String,
    pub nickname: String,
    #[serde(default)]
    pub profile_img: String,
    pub target_language: String,
    #[serde(default = "default_true")]
    pub translation_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Message from client to server. Exactly one payload per message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    pub session_id: String,
    pub room_id: String,
    pub participant_id: String,
    #[serde(flatten)]
    pub payload: ClientPayload,
}

/// Client payload variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientPayload {
    /// Bind (or re-bind) the speaker and roster for this session.
    SessionInit {
        speaker: Speaker,
        participants: Vec<Participant>,
    },
    /// Raw PCM audio, base64 in `data`.
    AudioChunk { data: String },
    /// Graceful termination; the server drains any remaining speech.
    SessionEnd,
}

/// Message from server to client. Exactly one payload per message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMessage {
    pub session_id: String,
    pub room_id: String,
    #[serde(flatten)]
    pub payload: ServerPayload,
}

/// Server payload variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerPayload {
    Status(SessionStatus),
    Transcript(TranscriptResult),
    Audio(AudioResult),
    Error(ErrorResponse),
}

/// Session lifecycle status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ready,
}

/// Sent once when a session is first initialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub status: StatusCode,
    pub message: String,
    pub buffering: BufferingInfo,
}

/// Buffering decision announced with READY.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferingInfo {
    pub source_language: String,
    /// Arbitrary member of the target set; empty when no targets.
    pub primary_target_language: String,
    pub strategy: BufferingStrategy,
}

/// Speaker identity echoed on every transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerInfo {
    pub participant_id: String,
    pub nickname: String,
    #[serde(default)]
    pub profile_img: String,
    pub source_language: String,
}

impl From<&Speaker> for SpeakerInfo {
    fn from(s: &Speaker) -> Self {
        SpeakerInfo {
            participant_id: s.participant_id.clone(),
            nickname: s.nickname.clone(),
            profile_img: s.profile_img.clone(),
            source_language: s.source_language.clone(),
        }
    }
}

/// One translation of an utterance, with its audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationEntry {
    pub target_language: String,
    pub translated_text: String,
    pub target_participant_ids: Vec<String>,
}

/// Transcript of one utterance with all its translations.
///
/// For a given utterance id this is always emitted before any
/// [`AudioResult`] carrying the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub id: String,
    pub speaker: SpeakerInfo,
    pub original_text: String,
    pub original_language: String,
    pub translations: Vec<TranslationEntry>,
    pub is_partial: bool,
    pub is_final: bool,
    pub timestamp_ms: i64,
    pub confidence: f32,
}

/// Synthesized speech for one translation of one utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioResult {
    pub transcript_id: String,
    pub target_language: String,
    pub target_participant_ids: Vec<String>,
    /// MP3 bytes, base64.
    pub audio_data: String,
    pub format: String,
    pub sample_rate: u32,
    pub duration_ms: u64,
    pub speaker_participant_id: String,
}

/// Stream-level error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub const STREAM_ERROR: &'static str = "STREAM_ERROR";

    pub fn stream_error(message: impl Into<String>) -> Self {
        ErrorResponse {
            code: Self::STREAM_ERROR.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_roundtrip() {
        let json = serde_json::json!({
            "session_id": "s1",
            "room_id": "r1",
            "participant_id": "p1",
            "type": "session_init",
            "speaker": {
                "participant_id": "p1",
                "nickname": "Mina",
                "profile_img": "",
                "source_language": "ko"
            },
            "participants": [{
                "participant_id": "p2",
                "nickname": "Alex",
                "target_language": "en"
            }]
        });
        let msg: ClientMessage = serde_json::from_value(json).unwrap();
        match &msg.payload {
            ClientPayload::SessionInit {
                speaker,
                participants,
            } => {
                assert_eq!(speaker.source_language, "ko");
                assert_eq!(participants.len(), 1);
                // translation_enabled defaults on
                assert!(participants[0].translation_enabled);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_audio_chunk_tag() {
        let msg = ClientMessage {
            session_id: "s1".into(),
            room_id: "r1".into(),
            participant_id: "p1".into(),
            payload: ClientPayload::AudioChunk {
                data: "AAAA".into(),
            },
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "audio_chunk");
        assert_eq!(json["data"], "AAAA");
    }

    #[test]
    fn test_server_payload_tags() {
        let msg = ServerMessage {
            session_id: "s1".into(),
            room_id: "r1".into(),
            payload: ServerPayload::Error(ErrorResponse::stream_error("broken pipe")),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "STREAM_ERROR");
    }

    #[test]
    fn test_status_ready_serialization() {
        let status = SessionStatus {
            status: StatusCode::Ready,
            message: "Session initialized".into(),
            buffering: BufferingInfo {
                source_language: "ko".into(),
                primary_target_language: "en".into(),
                strategy: BufferingStrategy::SentenceBased,
            },
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "READY");
        assert_eq!(json["buffering"]["strategy"], "sentence_based");
    }

    #[test]
    fn test_unknown_payload_type_is_error() {
        let json = serde_json::json!({
            "session_id": "s1",
            "room_id": "r1",
            "participant_id": "p1",
            "type": "bogus"
        });
        assert!(serde_json::from_value::<ClientMessage>(json).is_err());
    }
}
