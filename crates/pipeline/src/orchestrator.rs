//! Pipeline orchestrator
//!
//! Drives one finalized utterance through STT → (MT × targets) →
//! (TTS × targets) and yields the outbound messages lazily, transcript
//! first. All backend lookups go through the room cache, so concurrent
//! sessions in a room share the expensive calls.

use std::sync::Arc;
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::Stream;
use uuid::Uuid;

use parley_config::constants::is_filler;
use parley_config::Settings;
use parley_core::audio::pcm16_to_f32;
use parley_core::protocol::{
    AudioResult, ServerMessage, ServerPayload, SpeakerInfo, TranscriptResult, TranslationEntry,
};

use crate::backends::BackendSet;
use crate::cache::RoomCache;
use crate::session::SessionState;

/// Stateless driver for finalized utterances; shared by all sessions.
pub struct Pipeline {
    backends: Arc<BackendSet>,
    cache: Arc<RoomCache>,
    min_tts_text_len: usize,
}

/// Fresh short utterance id correlating a transcript with its audio.
fn utterance_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

impl Pipeline {
    pub fn new(backends: Arc<BackendSet>, cache: Arc<RoomCache>, settings: &Settings) -> Self {
        Self {
            backends,
            cache,
            min_tts_text_len: settings.backends.min_tts_text_len,
        }
    }

    /// Process one finalized audio segment.
    ///
    /// Yields, in order: one transcript (unless STT produced nothing), then
    /// one audio result per surviving translation. Per-stage failures are
    /// logged and skipped; nothing here closes the stream.
    pub fn process<'a>(
        &'a self,
        session: &'a mut SessionState,
        audio: Vec<u8>,
        is_final: bool,
    ) -> impl Stream<Item = ServerMessage> + Send + 'a {
        async_stream::stream! {
            session.counters.chunks_processed += 1;
            if is_final {
                session.counters.sentences_completed += 1;
            }

            let session_id = session.session_id.clone();
            let room_id = session.room_id.clone();
            let source_lang = session.speaker.source_language.clone();
            let speaker_id = session.speaker.participant_id.clone();
            let speaker_info = SpeakerInfo::from(&session.speaker);

            // ---- STT ----
            let stt_start = Instant::now();
            let samples = pcm16_to_f32(&audio);
            let backends = self.backends.clone();
            let (transcription, stt_cached) = self
                .cache
                .get_or_create_stt(&room_id, &speaker_id, &audio, || {
                    let source_lang = source_lang.clone();
                    async move { backends.transcribe(&samples, &source_lang).await }
                })
                .await;
            let stt_ms = stt_start.elapsed().as_millis() as u64;
            session.counters.stt_latency_ms += stt_ms;
            metrics::histogram!("parley_stt_latency_ms").record(stt_ms as f64);

            if stt_cached {
                tracing::debug!(session_id = %session_id, "STT served from room cache");
            }

            if transcription.is_empty() {
                tracing::debug!(session_id = %session_id, "Empty transcription, dropping segment");
                return;
            }

            let original_text = transcription.text.trim().to_string();
            let transcript_id = utterance_id();
            let timestamp_ms = chrono::Utc::now().timestamp_millis();

            let transcript_only = |translations: Vec<TranslationEntry>| ServerMessage {
                session_id: session_id.clone(),
                room_id: room_id.clone(),
                payload: ServerPayload::Transcript(TranscriptResult {
                    id: transcript_id.clone(),
                    speaker: speaker_info.clone(),
                    original_text: original_text.clone(),
                    original_language: source_lang.clone(),
                    translations,
                    is_partial: !is_final,
                    is_final,
                    timestamp_ms,
                    confidence: transcription.confidence,
                }),
            };

            // Fillers and single characters carry nothing worth translating.
            if is_filler(&original_text) {
                tracing::debug!(session_id = %session_id, text = %original_text, "Filler utterance");
                yield transcript_only(Vec::new());
                return;
            }
            if original_text.chars().count() <= 1 {
                yield transcript_only(Vec::new());
                return;
            }

            // ---- Translation fan-out ----
            let translate_start = Instant::now();
            let mut translations = Vec::new();
            for target_lang in session.target_languages() {
                let backends = self.backends.clone();
                let (translated, cached) = self
                    .cache
                    .get_or_create_translation(
                        &room_id,
                        &original_text,
                        &source_lang,
                        &target_lang,
                        || {
                            let original_text = original_text.clone();
                            let source_lang = source_lang.clone();
                            let target_lang = target_lang.clone();
                            async move {
                                backends
                                    .translate(&original_text, &source_lang, &target_lang)
                                    .await
                            }
                        },
                    )
                    .await;

                if cached {
                    tracing::debug!(session_id = %session_id, target = %target_lang, "Translation served from room cache");
                }

                if !translated.is_empty() {
                    translations.push(TranslationEntry {
                        target_language: target_lang.clone(),
                        translated_text: translated,
                        target_participant_ids: session.participants_by_target(&target_lang),
                    });
                }
            }
            let translate_ms = translate_start.elapsed().as_millis() as u64;
            session.counters.translation_latency_ms += translate_ms;
            metrics::histogram!("parley_translation_latency_ms").record(translate_ms as f64);

            yield transcript_only(translations.clone());

            // ---- Synthesis fan-out ----
            let tts_start = Instant::now();
            for entry in translations {
                let text = entry.translated_text.trim();
                if text.chars().count() < self.min_tts_text_len || is_filler(text) {
                    continue;
                }

                let backends = self.backends.clone();
                let (synthesis, cached) = self
                    .cache
                    .get_or_create_tts(&room_id, text, &entry.target_language, || {
                        let text = text.to_string();
                        let target = entry.target_language.clone();
                        async move { backends.synthesize(&text, &target).await }
                    })
                    .await;

                if cached {
                    tracing::debug!(session_id = %session_id, target = %entry.target_language, "TTS served from room cache");
                }

                if synthesis.is_empty() {
                    continue;
                }

                yield ServerMessage {
                    session_id: session_id.clone(),
                    room_id: room_id.clone(),
                    payload: ServerPayload::Audio(AudioResult {
                        transcript_id: transcript_id.clone(),
                        target_language: entry.target_language,
                        target_participant_ids: entry.target_participant_ids,
                        audio_data: BASE64.encode(&synthesis.audio),
                        format: "mp3".to_string(),
                        sample_rate: 24_000,
                        duration_ms: synthesis.duration_ms,
                        speaker_participant_id: speaker_id.clone(),
                    }),
                };
            }
            let tts_ms = tts_start.elapsed().as_millis() as u64;
            session.counters.tts_latency_ms += tts_ms;
            metrics::histogram!("parley_tts_latency_ms").record(tts_ms as f64);

            metrics::counter!("parley_utterances_total").increment(1);
        }
    }
}
