//! Streaming interpretation pipeline
//!
//! Turns one speaker's PCM stream into per-listener transcripts and
//! synthesized speech:
//!
//! - [`vad`] segments the stream into utterances and discards silence
//! - [`session`] holds per-stream state (speaker, roster, buffer, strategy)
//! - [`cache`] deduplicates STT/MT/TTS work across sessions in a room
//! - [`backends`] are the narrow STT/MT/TTS capability traits and shims
//! - [`orchestrator`] drives each finalized utterance through the stages
//!   and yields the outbound messages in order

pub mod backends;
pub mod cache;
pub mod orchestrator;
pub mod session;
pub mod vad;

pub use backends::{
    build_backends, BackendSet, Synthesis, Synthesize, Transcribe, Transcription, Translate,
};
pub use cache::RoomCache;
pub use orchestrator::Pipeline;
pub use session::SessionState;
pub use vad::VadProcessor;

use thiserror::Error;

/// Pipeline errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Transcription error: {0}")]
    Stt(String),

    #[error("Translation error: {0}")]
    Translate(String),

    #[error("Synthesis error: {0}")]
    Tts(String),
}
