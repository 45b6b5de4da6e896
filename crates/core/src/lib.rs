//! Core types for the parley interpreter server
//!
//! This crate provides the foundational types used across all other crates:
//! - Audio sample conversion and buffer math (16 kHz mono s16le)
//! - Language word-order topology and buffering strategy selection
//! - Wire protocol messages (tagged unions over payload variants)

pub mod audio;
pub mod language;
pub mod protocol;

pub use audio::{bytes_for_ms, duration_ms, pcm16_to_f32, rms_i16, BYTES_PER_SECOND, SAMPLE_RATE};
pub use language::{max_buffer_ms, BufferingStrategy, WordOrder};
pub use protocol::{
    AudioResult, BufferingInfo, ClientMessage, ClientPayload, ErrorResponse, Participant,
    ServerMessage, ServerPayload, SessionStatus, Speaker, SpeakerInfo, StatusCode,
    TranscriptResult, TranslationEntry,
};
