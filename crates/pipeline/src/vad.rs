//! Voice activity detection
//!
//! A WebRTC-style classifier (earshot) decides speech vs. silence per 30 ms
//! frame; a small state machine on top of it turns per-chunk decisions into
//! sentence boundaries. If the classifier rejects a frame, an RMS threshold
//! on the int16 scale stands in, so no classifier failure ever escapes this
//! module.

use earshot::{VoiceActivityDetector, VoiceActivityProfile};

use parley_config::constants::{
    VAD_FRAME_BYTES, VAD_FRAME_MS, VAD_MIN_SPEECH_FRAMES, VAD_SPEECH_RATIO,
};
use parley_core::audio::{pcm16_to_i16, rms_i16};

/// Per-frame speech classifier, pluggable for testing.
pub trait FrameClassifier: Send {
    /// Classify one complete 30 ms frame of 16 kHz samples.
    ///
    /// `Err` means the classifier could not judge the frame; the caller
    /// falls back to an RMS decision.
    fn is_speech(&mut self, samples: &[i16]) -> Result<bool, ()>;
}

/// WebRTC-style classifier backed by earshot.
pub struct WebRtcClassifier {
    inner: VoiceActivityDetector,
}

impl WebRtcClassifier {
    /// `aggressiveness` is the WebRTC scale 0-3 (strictest at 3).
    pub fn new(aggressiveness: u8) -> Self {
        let profile = match aggressiveness {
            0 => VoiceActivityProfile::QUALITY,
            1 => VoiceActivityProfile::LBR,
            2 => VoiceActivityProfile::AGGRESSIVE,
            _ => VoiceActivityProfile::VERY_AGGRESSIVE,
        };
        Self {
            inner: VoiceActivityDetector::new(profile),
        }
    }
}

impl FrameClassifier for WebRtcClassifier {
    fn is_speech(&mut self, samples: &[i16]) -> Result<bool, ()> {
        self.inner.predict_16khz(samples).map_err(|_| ())
    }
}

/// Detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VadState {
    /// No confirmed speech; sentence boundaries are never reported here.
    #[default]
    Idle,
    /// Speech confirmed; sustained silence will close the sentence.
    Speaking,
}

/// Per-session voice activity detector and sentence segmenter.
pub struct VadProcessor {
    classifier: Box<dyn FrameClassifier>,
    silence_rms: f64,
    state: VadState,
    speech_chunks: u32,
    silence_chunks: u32,
    min_speech_chunks: u32,
    max_silence_chunks: u32,
}

impl VadProcessor {
    /// Create a detector with the WebRTC-style classifier.
    ///
    /// `silence_rms` is the int16-scale fallback threshold; `silence_ms` is
    /// the sustained-silence duration that closes a sentence.
    pub fn new(aggressiveness: u8, silence_rms: f64, silence_ms: u32) -> Self {
        Self::with_classifier(
            Box::new(WebRtcClassifier::new(aggressiveness)),
            silence_rms,
            silence_ms,
        )
    }

    /// Create a detector with a custom classifier.
    pub fn with_classifier(
        classifier: Box<dyn FrameClassifier>,
        silence_rms: f64,
        silence_ms: u32,
    ) -> Self {
        Self {
            classifier,
            silence_rms,
            state: VadState::Idle,
            speech_chunks: 0,
            silence_chunks: 0,
            min_speech_chunks: VAD_MIN_SPEECH_FRAMES,
            max_silence_chunks: silence_ms.div_ceil(VAD_FRAME_MS as u32),
        }
    }

    fn frame_is_speech(&mut self, frame: &[u8]) -> bool {
        let samples = pcm16_to_i16(frame);
        match self.classifier.is_speech(&samples) {
            Ok(is_speech) => is_speech,
            Err(()) => rms_i16(frame) >= self.silence_rms,
        }
    }

    /// Does this chunk contain speech?
    ///
    /// At least 30% of its complete 30 ms frames must classify as speech.
    /// Inputs shorter than one frame are silence.
    pub fn has_speech(&mut self, audio: &[u8]) -> bool {
        if audio.len() < VAD_FRAME_BYTES {
            return false;
        }

        let mut speech = 0usize;
        let mut total = 0usize;
        for frame in audio.chunks_exact(VAD_FRAME_BYTES) {
            total += 1;
            if self.frame_is_speech(frame) {
                speech += 1;
            }
        }

        total > 0 && speech as f64 / total as f64 >= VAD_SPEECH_RATIO
    }

    /// Keep only the speech frames of a chunk, preserving order.
    ///
    /// Inputs shorter than one frame are returned unchanged.
    pub fn filter_speech(&mut self, audio: &[u8]) -> Vec<u8> {
        if audio.len() < VAD_FRAME_BYTES {
            return audio.to_vec();
        }

        let mut out = Vec::with_capacity(audio.len());
        for frame in audio.chunks_exact(VAD_FRAME_BYTES) {
            if self.frame_is_speech(frame) {
                out.extend_from_slice(frame);
            }
        }
        out
    }

    /// Advance the state machine with one arriving chunk.
    ///
    /// Returns `(has_speech, is_sentence_end)`. Sentence ends are only ever
    /// reported from the Speaking state, so silence before any speech never
    /// produces a boundary.
    pub fn process_chunk(&mut self, audio: &[u8]) -> (bool, bool) {
        let has_speech = self.has_speech(audio);

        if has_speech {
            self.speech_chunks += 1;
            self.silence_chunks = 0;
            if self.state == VadState::Idle && self.speech_chunks >= self.min_speech_chunks {
                self.state = VadState::Speaking;
            }
            return (true, false);
        }

        if self.state == VadState::Speaking {
            self.silence_chunks += 1;
            if self.silence_chunks >= self.max_silence_chunks {
                self.state = VadState::Idle;
                self.speech_chunks = 0;
                self.silence_chunks = 0;
                return (false, true);
            }
        }

        (false, false)
    }

    /// Clear all state.
    pub fn reset(&mut self) {
        self.state = VadState::Idle;
        self.speech_chunks = 0;
        self.silence_chunks = 0;
    }

    /// Current state.
    pub fn state(&self) -> VadState {
        self.state
    }
}

impl std::fmt::Debug for VadProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VadProcessor")
            .field("state", &self.state)
            .field("speech_chunks", &self.speech_chunks)
            .field("silence_chunks", &self.silence_chunks)
            .field("max_silence_chunks", &self.max_silence_chunks)
            .finish()
    }
}
