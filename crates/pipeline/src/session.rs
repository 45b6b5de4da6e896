//! Per-stream session state
//!
//! One `SessionState` per bidirectional stream, owned by the stream handler
//! that created it. The speaker may be replaced mid-session by a re-sent
//! session init; the accumulated speech buffer and VAD state survive that.

use std::collections::{BTreeSet, HashMap};

use parley_core::audio::bytes_for_ms;
use parley_core::language::BufferingStrategy;
use parley_core::protocol::{Participant, Speaker};

use crate::vad::VadProcessor;

/// Observability counters, logged at session end.
#[derive(Debug, Default, Clone)]
pub struct SessionCounters {
    pub chunks_processed: u64,
    pub sentences_completed: u64,
    pub silence_skipped: u64,
    pub stt_latency_ms: u64,
    pub translation_latency_ms: u64,
    pub tts_latency_ms: u64,
}

/// State of one streaming session.
pub struct SessionState {
    pub session_id: String,
    pub room_id: String,
    pub speaker: Speaker,
    pub participants: HashMap<String, Participant>,

    /// Speech-only PCM accumulated since the last drain.
    pub audio_buffer: Vec<u8>,
    pub vad: VadProcessor,

    primary_strategy: BufferingStrategy,
    pub counters: SessionCounters,
}

impl SessionState {
    pub fn new(
        session_id: String,
        room_id: String,
        speaker: Speaker,
        participants: Vec<Participant>,
        vad: VadProcessor,
    ) -> Self {
        let participants = participants
            .into_iter()
            .map(|p| (p.participant_id.clone(), p))
            .collect();

        let mut state = Self {
            session_id,
            room_id,
            speaker,
            participants,
            audio_buffer: Vec::new(),
            vad,
            primary_strategy: BufferingStrategy::ChunkBased,
            counters: SessionCounters::default(),
        };
        state.determine_primary_strategy();
        state
    }

    /// Target languages across participants with translation enabled whose
    /// target differs from the speaker's source. Ordered, so iteration is
    /// stable within an utterance.
    pub fn target_languages(&self) -> BTreeSet<String> {
        self.participants
            .values()
            .filter(|p| {
                p.translation_enabled && p.target_language != self.speaker.source_language
            })
            .map(|p| p.target_language.clone())
            .collect()
    }

    /// Participant ids preferring `lang`.
    pub fn participants_by_target(&self, lang: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .participants
            .values()
            .filter(|p| p.translation_enabled && p.target_language == lang)
            .map(|p| p.participant_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Recompute and store the session strategy: sentence-based as soon as
    /// any target pair requires it.
    pub fn determine_primary_strategy(&mut self) -> BufferingStrategy {
        let source = self.speaker.source_language.clone();
        let strategy = self
            .target_languages()
            .iter()
            .map(|target| BufferingStrategy::for_pair(&source, target))
            .find(|s| *s == BufferingStrategy::SentenceBased)
            .unwrap_or(BufferingStrategy::ChunkBased);
        self.primary_strategy = strategy;
        strategy
    }

    pub fn primary_strategy(&self) -> BufferingStrategy {
        self.primary_strategy
    }

    /// Buffer cap in bytes for the current strategy.
    pub fn max_buffer_bytes(&self) -> usize {
        bytes_for_ms(self.primary_strategy.max_buffer_ms() as usize)
    }

    /// Replace the speaker in place, keeping buffer and VAD state, and
    /// recompute the strategy.
    pub fn update_speaker(&mut self, speaker: Speaker) {
        self.speaker = speaker;
        self.determine_primary_strategy();
    }

    /// Update one participant's settings; no-op if the participant is not
    /// in this session. Returns whether anything was touched.
    pub fn update_participant_settings(
        &mut self,
        participant_id: &str,
        target_language: String,
        translation_enabled: bool,
    ) -> bool {
        match self.participants.get_mut(participant_id) {
            Some(p) => {
                p.target_language = target_language;
                p.translation_enabled = translation_enabled;
                self.determine_primary_strategy();
                true
            }
            None => false,
        }
    }

    /// Detach the accumulated speech buffer for one pipeline pass.
    pub fn take_buffer(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.audio_buffer)
    }
}
