//! Configuration for the parley interpreter server
//!
//! Process-wide settings are loaded from `config/default`, an optional
//! environment-specific file, and `PARLEY__`-prefixed environment
//! variables. Pure data that never changes at runtime (filler words,
//! synthesis voices, STT locale codes) is compiled in via [`constants`].

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, AudioConfig, BackendKind, BackendsConfig, CacheConfig, ConfigError,
    ObservabilityConfig, ServerConfig, Settings,
};
