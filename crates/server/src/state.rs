//! Application state
//!
//! Shared state across all handlers: settings, the session registry, the
//! room cache, and the pipeline. All heavy collaborators are constructed
//! once at boot and injected here; nothing is a global.

use std::collections::HashMap;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;

use parley_config::Settings;
use parley_core::protocol::{Participant, Speaker};
use parley_pipeline::{build_backends, Pipeline, RoomCache, SessionState, VadProcessor};

/// A registered session: room id is duplicated here so the registry can be
/// scanned by room without taking each session's lock.
#[derive(Clone)]
pub struct SessionHandle {
    pub room_id: String,
    pub session: Arc<tokio::sync::Mutex<SessionState>>,
}

/// Map of live sessions behind one mutex, taken only for insert, remove,
/// and the participant-settings scan.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session_id: String, handle: SessionHandle) {
        self.sessions.lock().insert(session_id, handle);
    }

    pub fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().get(session_id).cloned()
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.lock().remove(session_id)
    }

    /// All sessions in a room.
    pub fn scan_room(&self, room_id: &str) -> Vec<SessionHandle> {
        self.sessions
            .lock()
            .values()
            .filter(|h| h.room_id == room_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

type VadFactory = dyn Fn() -> VadProcessor + Send + Sync;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<SessionRegistry>,
    pub cache: Arc<RoomCache>,
    pub pipeline: Arc<Pipeline>,
    /// Prometheus render handle; absent in tests.
    pub metrics: Option<PrometheusHandle>,
    vad_factory: Arc<VadFactory>,
}

impl AppState {
    /// Build state from settings with the configured backends.
    pub fn new(settings: Settings) -> Self {
        let backends = Arc::new(build_backends(&settings.backends));
        let cache = Arc::new(RoomCache::new(settings.cache.entries_per_kind));
        let pipeline = Arc::new(Pipeline::new(backends, cache.clone(), &settings));
        Self::with_pipeline(settings, pipeline, cache)
    }

    /// Build state around an existing pipeline and cache. Used by tests to
    /// inject scripted backends.
    pub fn with_pipeline(
        settings: Settings,
        pipeline: Arc<Pipeline>,
        cache: Arc<RoomCache>,
    ) -> Self {
        let audio = settings.audio.clone();
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(SessionRegistry::new()),
            cache,
            pipeline,
            metrics: None,
            vad_factory: Arc::new(move || {
                VadProcessor::new(audio.vad_aggressiveness, audio.silence_rms, audio.silence_ms)
            }),
        }
    }

    /// Replace the per-session VAD constructor. Used by tests to inject a
    /// deterministic frame classifier.
    pub fn with_vad_factory(
        mut self,
        factory: impl Fn() -> VadProcessor + Send + Sync + 'static,
    ) -> Self {
        self.vad_factory = Arc::new(factory);
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Create a fresh session and register it with the registry and the
    /// room cache.
    pub fn create_session(
        &self,
        session_id: String,
        room_id: String,
        speaker: Speaker,
        participants: Vec<Participant>,
    ) -> SessionHandle {
        let session = SessionState::new(
            session_id.clone(),
            room_id.clone(),
            speaker,
            participants,
            (self.vad_factory)(),
        );
        let handle = SessionHandle {
            room_id: room_id.clone(),
            session: Arc::new(tokio::sync::Mutex::new(session)),
        };
        self.registry.insert(session_id, handle.clone());
        self.cache.register_session(&room_id);
        metrics::gauge!("parley_sessions_active").set(self.registry.len() as f64);
        handle
    }

    /// Unregister a session and release its room-cache slot.
    pub fn remove_session(&self, session_id: &str) {
        if let Some(handle) = self.registry.remove(session_id) {
            self.cache.unregister_session(&handle.room_id);
        }
        metrics::gauge!("parley_sessions_active").set(self.registry.len() as f64);
    }

    /// Update a participant's target language and translation flag across
    /// every session in the room, recomputing each session's strategy.
    ///
    /// Returns whether any session carried the participant. Idempotent.
    pub async fn update_participant_settings(
        &self,
        room_id: &str,
        participant_id: &str,
        target_language: &str,
        translation_enabled: bool,
    ) -> bool {
        let mut updated = false;
        for handle in self.registry.scan_room(room_id) {
            let mut session = handle.session.lock().await;
            if session.update_participant_settings(
                participant_id,
                target_language.to_string(),
                translation_enabled,
            ) {
                updated = true;
            }
        }
        updated
    }
}
