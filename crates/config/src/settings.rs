//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Main application settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub backends: BackendsConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen port for the streaming endpoint.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Cap on concurrently served streams.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Grace period for draining streams on shutdown, in seconds.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_port() -> u16 {
    50051
}

fn default_max_workers() -> usize {
    32
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            max_workers: default_max_workers(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Audio segmentation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Ingress PCM sample rate. Only 16 000 is supported.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Chunk-based buffer cap in milliseconds.
    #[serde(default = "default_chunk_ms")]
    pub chunk_ms: u32,

    /// Sentence-based buffer cap in milliseconds.
    #[serde(default = "default_sentence_max_ms")]
    pub sentence_max_ms: u32,

    /// RMS threshold (int16 scale) under which a frame counts as silence
    /// when the classifier fails.
    #[serde(default = "default_silence_rms")]
    pub silence_rms: f64,

    /// Sustained silence that ends a sentence, in milliseconds.
    #[serde(default = "default_silence_ms")]
    pub silence_ms: u32,

    /// Voice-activity classifier aggressiveness, 0 (lenient) to 3 (strict).
    #[serde(default = "default_vad_aggressiveness")]
    pub vad_aggressiveness: u8,
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_chunk_ms() -> u32 {
    1500
}

fn default_sentence_max_ms() -> u32 {
    2500
}

fn default_silence_rms() -> f64 {
    30.0
}

fn default_silence_ms() -> u32 {
    350
}

fn default_vad_aggressiveness() -> u8 {
    2
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            chunk_ms: default_chunk_ms(),
            sentence_max_ms: default_sentence_max_ms(),
            silence_rms: default_silence_rms(),
            silence_ms: default_silence_ms(),
            vad_aggressiveness: default_vad_aggressiveness(),
        }
    }
}

/// Which provider implements a backend capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// JSON-over-HTTP sidecar service.
    #[default]
    Http,
    /// No-op backend: empty results. Useful for soak tests without
    /// provisioned models.
    Disabled,
}

/// External STT/MT/TTS service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub stt: BackendKind,
    #[serde(default)]
    pub translate: BackendKind,
    #[serde(default)]
    pub tts: BackendKind,

    /// Base URL of the STT service.
    #[serde(default = "default_stt_endpoint")]
    pub stt_endpoint: String,

    /// Base URL of the translation service.
    #[serde(default = "default_translate_endpoint")]
    pub translate_endpoint: String,

    /// Base URL of the synthesis service.
    #[serde(default = "default_tts_endpoint")]
    pub tts_endpoint: String,

    /// Provider region, passed through to the services.
    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_stt_timeout_secs")]
    pub stt_timeout_secs: u64,

    #[serde(default = "default_translate_timeout_secs")]
    pub translate_timeout_secs: u64,

    #[serde(default = "default_tts_timeout_secs")]
    pub tts_timeout_secs: u64,

    /// Translations shorter than this are not synthesized.
    #[serde(default = "default_min_tts_text_len")]
    pub min_tts_text_len: usize,
}

fn default_stt_endpoint() -> String {
    "http://127.0.0.1:8101".to_string()
}

fn default_translate_endpoint() -> String {
    "http://127.0.0.1:8102".to_string()
}

fn default_tts_endpoint() -> String {
    "http://127.0.0.1:8103".to_string()
}

fn default_region() -> String {
    "ap-northeast-2".to_string()
}

fn default_stt_timeout_secs() -> u64 {
    15
}

fn default_translate_timeout_secs() -> u64 {
    10
}

fn default_tts_timeout_secs() -> u64 {
    8
}

fn default_min_tts_text_len() -> usize {
    2
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            stt: BackendKind::default(),
            translate: BackendKind::default(),
            tts: BackendKind::default(),
            stt_endpoint: default_stt_endpoint(),
            translate_endpoint: default_translate_endpoint(),
            tts_endpoint: default_tts_endpoint(),
            region: default_region(),
            stt_timeout_secs: default_stt_timeout_secs(),
            translate_timeout_secs: default_translate_timeout_secs(),
            tts_timeout_secs: default_tts_timeout_secs(),
            min_tts_text_len: default_min_tts_text_len(),
        }
    }
}

/// Room cache bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// LRU capacity per result kind (STT/MT/TTS) per room.
    #[serde(default = "default_entries_per_kind")]
    pub entries_per_kind: usize,
}

fn default_entries_per_kind() -> usize {
    256
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            entries_per_kind: default_entries_per_kind(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit JSON-structured logs instead of human-readable.
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

impl Settings {
    /// Validate settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.port".to_string(),
                message: "Port cannot be 0".to_string(),
            });
        }

        if self.server.max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_workers".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if self.audio.sample_rate != 16_000 {
            return Err(ConfigError::InvalidValue {
                field: "audio.sample_rate".to_string(),
                message: format!("Only 16000 Hz ingress is supported, got {}", self.audio.sample_rate),
            });
        }

        if self.audio.vad_aggressiveness > 3 {
            return Err(ConfigError::InvalidValue {
                field: "audio.vad_aggressiveness".to_string(),
                message: format!("Must be 0-3, got {}", self.audio.vad_aggressiveness),
            });
        }

        if self.audio.chunk_ms == 0 || self.audio.sentence_max_ms < self.audio.chunk_ms {
            return Err(ConfigError::InvalidValue {
                field: "audio.sentence_max_ms".to_string(),
                message: format!(
                    "Sentence cap ({}) must be at least the chunk cap ({})",
                    self.audio.sentence_max_ms, self.audio.chunk_ms
                ),
            });
        }

        if self.cache.entries_per_kind == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache.entries_per_kind".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Load settings from files and environment.
///
/// Priority: env vars > `config/{env}` > `config/default` > defaults.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("PARLEY")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
