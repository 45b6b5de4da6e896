//! Backend adapters
//!
//! Three narrow capabilities (transcribe, translate, synthesize), each an
//! object-safe async trait implemented by whatever provider is configured.
//! Every call goes through a deadline; a timeout or provider error yields
//! an empty result and the pipeline decides what to skip.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use parley_config::constants::{stt_locale, voice_for};
use parley_config::{BackendKind, BackendsConfig};
use parley_core::audio::rms_f32;
use parley_core::language::display_name;

use crate::PipelineError;

/// Confidence reported when the provider does not supply one.
pub const DEFAULT_CONFIDENCE: f32 = 0.95;

/// Normalized-scale RMS under which audio is treated as silence without
/// invoking the provider.
const SILENCE_RMS_F32: f32 = 1e-3;

/// Approximate MP3 payload rate used to estimate durations the provider
/// does not report (32 kbps ≈ 4 000 bytes/s).
const MP3_BYTES_PER_SECOND: u64 = 4_000;

/// Result of a transcription call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcription {
    pub text: String,
    pub confidence: f32,
}

impl Transcription {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Result of a synthesis call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Synthesis {
    /// MP3 bytes.
    pub audio: Vec<u8>,
    pub duration_ms: u64,
}

impl Synthesis {
    pub fn is_empty(&self) -> bool {
        self.audio.is_empty()
    }
}

/// Speech-to-text capability.
#[async_trait]
pub trait Transcribe: Send + Sync {
    /// Transcribe normalized f32 samples in the given source language.
    async fn transcribe(
        &self,
        samples: &[f32],
        language: &str,
    ) -> Result<Transcription, PipelineError>;
}

/// Text translation capability.
#[async_trait]
pub trait Translate: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, PipelineError>;
}

/// Text-to-speech capability.
#[async_trait]
pub trait Synthesize: Send + Sync {
    async fn synthesize(&self, text: &str, language: &str)
        -> Result<Synthesis, PipelineError>;
}

/// The configured providers plus their deadlines, shared across sessions.
pub struct BackendSet {
    stt: Arc<dyn Transcribe>,
    translate: Arc<dyn Translate>,
    tts: Arc<dyn Synthesize>,
    stt_deadline: Duration,
    translate_deadline: Duration,
    tts_deadline: Duration,
}

impl BackendSet {
    pub fn new(
        stt: Arc<dyn Transcribe>,
        translate: Arc<dyn Translate>,
        tts: Arc<dyn Synthesize>,
        config: &BackendsConfig,
    ) -> Self {
        Self {
            stt,
            translate,
            tts,
            stt_deadline: Duration::from_secs(config.stt_timeout_secs),
            translate_deadline: Duration::from_secs(config.translate_timeout_secs),
            tts_deadline: Duration::from_secs(config.tts_timeout_secs),
        }
    }

    /// Transcribe with the silence gate and deadline applied.
    ///
    /// Silence (normalized RMS below 1e-3) returns empty text without
    /// touching the provider. Timeouts and provider errors also yield an
    /// empty transcription; the error is logged here and swallowed.
    pub async fn transcribe(&self, samples: &[f32], language: &str) -> Transcription {
        if rms_f32(samples) < SILENCE_RMS_F32 {
            tracing::debug!(lang = language, "Audio below silence floor, skipping STT");
            return Transcription::empty();
        }

        match tokio::time::timeout(self.stt_deadline, self.stt.transcribe(samples, language))
            .await
        {
            Ok(Ok(mut t)) => {
                if t.confidence == 0.0 {
                    t.confidence = DEFAULT_CONFIDENCE;
                }
                t
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, lang = language, "STT backend error");
                Transcription::empty()
            }
            Err(_) => {
                tracing::warn!(deadline = ?self.stt_deadline, "STT backend deadline exceeded");
                Transcription::empty()
            }
        }
    }

    /// Translate with output cleanup and deadline applied.
    ///
    /// Identical source and target return the input unchanged. Failures
    /// yield an empty string.
    pub async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        if source == target {
            return text.to_string();
        }

        match tokio::time::timeout(
            self.translate_deadline,
            self.translate.translate(text, source, target),
        )
        .await
        {
            Ok(Ok(out)) => clean_translation(&out),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, source, target, "Translation backend error");
                String::new()
            }
            Err(_) => {
                tracing::warn!(
                    deadline = ?self.translate_deadline,
                    source,
                    target,
                    "Translation backend deadline exceeded"
                );
                String::new()
            }
        }
    }

    /// Synthesize with deadline applied; estimates the duration when the
    /// provider reports none. Failures yield an empty synthesis.
    pub async fn synthesize(&self, text: &str, language: &str) -> Synthesis {
        match tokio::time::timeout(self.tts_deadline, self.tts.synthesize(text, language)).await
        {
            Ok(Ok(mut s)) => {
                if s.duration_ms == 0 && !s.audio.is_empty() {
                    s.duration_ms = estimate_mp3_duration_ms(s.audio.len());
                }
                s
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, lang = language, "TTS backend error");
                Synthesis::default()
            }
            Err(_) => {
                tracing::warn!(deadline = ?self.tts_deadline, "TTS backend deadline exceeded");
                Synthesis::default()
            }
        }
    }
}

/// Estimate playback duration of an MP3 payload from its size.
pub fn estimate_mp3_duration_ms(bytes: usize) -> u64 {
    bytes as u64 * 1000 / MP3_BYTES_PER_SECOND
}

/// Normalize raw translator output.
///
/// LLM-backed translators tend to wrap the answer in preamble and quotes;
/// keep only the first non-trivial line with those stripped.
pub fn clean_translation(raw: &str) -> String {
    const PREFIXES: &[&str] = &[
        "translation:",
        "translated text:",
        "here is the translation:",
        "here's the translation:",
        "the translation is:",
    ];

    for line in raw.lines() {
        let mut line = line.trim();
        if line.is_empty() {
            continue;
        }

        let lower = line.to_lowercase();
        for prefix in PREFIXES {
            if lower.starts_with(prefix) {
                line = line[prefix.len()..].trim_start();
                break;
            }
        }

        let line = strip_matching_quotes(line);
        if !line.is_empty() {
            return line.to_string();
        }
    }

    String::new()
}

fn strip_matching_quotes(text: &str) -> &str {
    let pairs = [('"', '"'), ('\'', '\''), ('“', '”'), ('「', '」')];
    let mut text = text.trim();
    for (open, close) in pairs {
        if text.len() >= 2 && text.starts_with(open) && text.ends_with(close) {
            text = text[open.len_utf8()..text.len() - close.len_utf8()].trim();
        }
    }
    text
}

// =============================================================================
// HTTP shims
// =============================================================================

/// JSON-over-HTTP speech-to-text shim.
///
/// POSTs `{ audio (base64 s16le), language_code, region }` to
/// `{endpoint}/transcribe` and expects `{ text, confidence? }`.
pub struct HttpSttBackend {
    client: reqwest::Client,
    endpoint: String,
    region: String,
}

#[derive(Serialize)]
struct SttRequest<'a> {
    audio: String,
    language_code: &'a str,
    region: &'a str,
}

#[derive(Deserialize)]
struct SttResponse {
    text: String,
    #[serde(default)]
    confidence: f32,
}

impl HttpSttBackend {
    pub fn new(endpoint: String, region: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            region,
        }
    }
}

#[async_trait]
impl Transcribe for HttpSttBackend {
    async fn transcribe(
        &self,
        samples: &[f32],
        language: &str,
    ) -> Result<Transcription, PipelineError> {
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

        let pcm: Vec<u8> = samples
            .iter()
            .flat_map(|&s| ((s.clamp(-1.0, 1.0) * 32767.0) as i16).to_le_bytes())
            .collect();

        let request = SttRequest {
            audio: BASE64.encode(&pcm),
            language_code: stt_locale(language),
            region: &self.region,
        };

        let response = self
            .client
            .post(format!("{}/transcribe", self.endpoint.trim_end_matches('/')))
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Stt(e.to_string()))?
            .error_for_status()
            .map_err(|e| PipelineError::Stt(e.to_string()))?;

        let body: SttResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Stt(e.to_string()))?;

        Ok(Transcription {
            text: body.text,
            confidence: body.confidence,
        })
    }
}

/// JSON-over-HTTP translation shim.
///
/// POSTs `{ text, source_language, target_language, source_name,
/// target_name }` to `{endpoint}/translate` and expects
/// `{ translated_text }`.
pub struct HttpTranslateBackend {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source_language: &'a str,
    target_language: &'a str,
    source_name: &'a str,
    target_name: &'a str,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translated_text: String,
}

impl HttpTranslateBackend {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait]
impl Translate for HttpTranslateBackend {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, PipelineError> {
        let request = TranslateRequest {
            text,
            source_language: source,
            target_language: target,
            source_name: display_name(source),
            target_name: display_name(target),
        };

        let response = self
            .client
            .post(format!("{}/translate", self.endpoint.trim_end_matches('/')))
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Translate(e.to_string()))?
            .error_for_status()
            .map_err(|e| PipelineError::Translate(e.to_string()))?;

        let body: TranslateResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Translate(e.to_string()))?;

        Ok(body.translated_text)
    }
}

/// JSON-over-HTTP synthesis shim.
///
/// POSTs `{ text, language, voice_id, engine, region }` to
/// `{endpoint}/synthesize` and expects
/// `{ audio (base64 MP3), duration_ms? }`.
pub struct HttpTtsBackend {
    client: reqwest::Client,
    endpoint: String,
    region: String,
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    language: &'a str,
    voice_id: &'a str,
    engine: &'a str,
    region: &'a str,
}

#[derive(Deserialize)]
struct TtsResponse {
    audio: String,
    #[serde(default)]
    duration_ms: u64,
}

impl HttpTtsBackend {
    pub fn new(endpoint: String, region: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            region,
        }
    }
}

#[async_trait]
impl Synthesize for HttpTtsBackend {
    async fn synthesize(
        &self,
        text: &str,
        language: &str,
    ) -> Result<Synthesis, PipelineError> {
        use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

        let (voice_id, neural) = voice_for(language);
        let request = TtsRequest {
            text,
            language,
            voice_id,
            engine: if neural { "neural" } else { "standard" },
            region: &self.region,
        };

        let response = self
            .client
            .post(format!("{}/synthesize", self.endpoint.trim_end_matches('/')))
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Tts(e.to_string()))?
            .error_for_status()
            .map_err(|e| PipelineError::Tts(e.to_string()))?;

        let body: TtsResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Tts(e.to_string()))?;

        let audio = BASE64
            .decode(&body.audio)
            .map_err(|e| PipelineError::Tts(e.to_string()))?;

        Ok(Synthesis {
            audio,
            duration_ms: body.duration_ms,
        })
    }
}

// =============================================================================
// Disabled backends
// =============================================================================

/// Backend that always returns empty results. Lets the server run without
/// provisioned model services.
pub struct DisabledBackend;

#[async_trait]
impl Transcribe for DisabledBackend {
    async fn transcribe(
        &self,
        _samples: &[f32],
        _language: &str,
    ) -> Result<Transcription, PipelineError> {
        Ok(Transcription::empty())
    }
}

#[async_trait]
impl Translate for DisabledBackend {
    async fn translate(
        &self,
        _text: &str,
        _source: &str,
        _target: &str,
    ) -> Result<String, PipelineError> {
        Ok(String::new())
    }
}

#[async_trait]
impl Synthesize for DisabledBackend {
    async fn synthesize(
        &self,
        _text: &str,
        _language: &str,
    ) -> Result<Synthesis, PipelineError> {
        Ok(Synthesis::default())
    }
}

/// Build the backend set selected by configuration.
pub fn build_backends(config: &BackendsConfig) -> BackendSet {
    let stt: Arc<dyn Transcribe> = match config.stt {
        BackendKind::Http => Arc::new(HttpSttBackend::new(
            config.stt_endpoint.clone(),
            config.region.clone(),
        )),
        BackendKind::Disabled => Arc::new(DisabledBackend),
    };

    let translate: Arc<dyn Translate> = match config.translate {
        BackendKind::Http => {
            Arc::new(HttpTranslateBackend::new(config.translate_endpoint.clone()))
        }
        BackendKind::Disabled => Arc::new(DisabledBackend),
    };

    let tts: Arc<dyn Synthesize> = match config.tts {
        BackendKind::Http => Arc::new(HttpTtsBackend::new(
            config.tts_endpoint.clone(),
            config.region.clone(),
        )),
        BackendKind::Disabled => Arc::new(DisabledBackend),
    };

    BackendSet::new(stt, translate, tts, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disabled_set() -> BackendSet {
        let config = BackendsConfig::default();
        BackendSet::new(
            Arc::new(DisabledBackend),
            Arc::new(DisabledBackend),
            Arc::new(DisabledBackend),
            &config,
        )
    }

    #[test]
    fn test_clean_translation_prefixes() {
        assert_eq!(clean_translation("Translation: Hello"), "Hello");
        assert_eq!(
            clean_translation("Here is the translation: Hello there"),
            "Hello there"
        );
        assert_eq!(clean_translation("Hello"), "Hello");
    }

    #[test]
    fn test_clean_translation_quotes() {
        assert_eq!(clean_translation("\"Hello\""), "Hello");
        assert_eq!(clean_translation("Translation: \"Hello\""), "Hello");
        assert_eq!(clean_translation("「こんにちは」"), "こんにちは");
        // unmatched quotes are preserved
        assert_eq!(clean_translation("\"Hello"), "\"Hello");
    }

    #[test]
    fn test_clean_translation_first_nontrivial_line() {
        assert_eq!(clean_translation("\n\nHello\nsecond line"), "Hello");
        assert_eq!(clean_translation("Translation:\nHello"), "Hello");
        assert_eq!(clean_translation(""), "");
        assert_eq!(clean_translation("   \n  "), "");
    }

    #[test]
    fn test_duration_estimate() {
        assert_eq!(estimate_mp3_duration_ms(4_000), 1000);
        assert_eq!(estimate_mp3_duration_ms(0), 0);
    }

    #[tokio::test]
    async fn test_silence_gate_skips_backend() {
        struct PanickingStt;

        #[async_trait]
        impl Transcribe for PanickingStt {
            async fn transcribe(
                &self,
                _samples: &[f32],
                _language: &str,
            ) -> Result<Transcription, PipelineError> {
                panic!("backend must not be called for silence");
            }
        }

        let config = BackendsConfig::default();
        let set = BackendSet::new(
            Arc::new(PanickingStt),
            Arc::new(DisabledBackend),
            Arc::new(DisabledBackend),
            &config,
        );

        let silence = vec![0.0f32; 16_000];
        let result = set.transcribe(&silence, "ko").await;
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_same_language_translation_is_identity() {
        let set = disabled_set();
        assert_eq!(set.translate("안녕", "ko", "ko").await, "안녕");
    }

    #[tokio::test]
    async fn test_backend_error_yields_empty() {
        struct FailingBackend;

        #[async_trait]
        impl Transcribe for FailingBackend {
            async fn transcribe(
                &self,
                _samples: &[f32],
                _language: &str,
            ) -> Result<Transcription, PipelineError> {
                Err(PipelineError::Stt("connection refused".into()))
            }
        }

        let config = BackendsConfig::default();
        let set = BackendSet::new(
            Arc::new(FailingBackend),
            Arc::new(DisabledBackend),
            Arc::new(DisabledBackend),
            &config,
        );

        let loud = vec![0.5f32; 16_000];
        assert!(set.transcribe(&loud, "ko").await.is_empty());
    }

    #[tokio::test]
    async fn test_default_confidence_applied() {
        struct NoConfidenceStt;

        #[async_trait]
        impl Transcribe for NoConfidenceStt {
            async fn transcribe(
                &self,
                _samples: &[f32],
                _language: &str,
            ) -> Result<Transcription, PipelineError> {
                Ok(Transcription {
                    text: "hello".into(),
                    confidence: 0.0,
                })
            }
        }

        let config = BackendsConfig::default();
        let set = BackendSet::new(
            Arc::new(NoConfidenceStt),
            Arc::new(DisabledBackend),
            Arc::new(DisabledBackend),
            &config,
        );

        let loud = vec![0.5f32; 16_000];
        let t = set.transcribe(&loud, "en").await;
        assert_eq!(t.confidence, DEFAULT_CONFIDENCE);
    }

    #[tokio::test]
    async fn test_duration_estimated_when_unreported() {
        struct SilentDurationTts;

        #[async_trait]
        impl Synthesize for SilentDurationTts {
            async fn synthesize(
                &self,
                _text: &str,
                _language: &str,
            ) -> Result<Synthesis, PipelineError> {
                Ok(Synthesis {
                    audio: vec![0u8; 8_000],
                    duration_ms: 0,
                })
            }
        }

        let config = BackendsConfig::default();
        let set = BackendSet::new(
            Arc::new(DisabledBackend),
            Arc::new(DisabledBackend),
            Arc::new(SilentDurationTts),
            &config,
        );

        let s = set.synthesize("hello there", "en").await;
        assert_eq!(s.duration_ms, 2000);
    }
}
