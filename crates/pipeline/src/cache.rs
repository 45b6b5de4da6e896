//! Room-scoped result cache
//!
//! Several sessions in one room routinely request the same work: the same
//! speaker's audio transcribed, the same sentence translated to the same
//! language, the same translation synthesized. The cache collapses those
//! into one backend call with single-flight semantics: concurrent requests
//! for a key serialize on a per-key lock, the first caller produces, the
//! rest observe its result. A failed produce is never cached, so the next
//! caller retries.
//!
//! Entries are LRU-bounded per result kind per room; the whole room is
//! dropped when its last session unregisters.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::backends::{Synthesis, Transcription};

type AudioDigest = [u8; 32];

/// STT key: speaker identity matters because voice-adapted models may
/// diverge per speaker; audio is keyed by content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SttKey {
    speaker_id: String,
    audio: AudioDigest,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MtKey {
    text: String,
    source: String,
    target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TtsKey {
    text: String,
    target: String,
}

/// Per-key in-flight locks, keyed uniformly across kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FlightKey {
    Stt(SttKey),
    Mt(MtKey),
    Tts(TtsKey),
}

struct RoomEntry {
    stt: Mutex<LruCache<SttKey, Transcription>>,
    translations: Mutex<LruCache<MtKey, String>>,
    tts: Mutex<LruCache<TtsKey, Synthesis>>,
    inflight: DashMap<FlightKey, Arc<tokio::sync::Mutex<()>>>,
    sessions: AtomicUsize,
}

impl RoomEntry {
    fn new(capacity: NonZeroUsize) -> Self {
        Self {
            stt: Mutex::new(LruCache::new(capacity)),
            translations: Mutex::new(LruCache::new(capacity)),
            tts: Mutex::new(LruCache::new(capacity)),
            inflight: DashMap::new(),
            sessions: AtomicUsize::new(0),
        }
    }

    fn flight_lock(&self, key: FlightKey) -> Arc<tokio::sync::Mutex<()>> {
        self.inflight
            .entry(key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// Process-wide cache of backend results, scoped by room id.
pub struct RoomCache {
    rooms: DashMap<String, Arc<RoomEntry>>,
    capacity: NonZeroUsize,
}

impl RoomCache {
    /// `entries_per_kind` bounds each of the STT/MT/TTS caches per room.
    pub fn new(entries_per_kind: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            capacity: NonZeroUsize::new(entries_per_kind).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Count a session into a room, creating the room entry if needed.
    pub fn register_session(&self, room_id: &str) {
        let entry = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(RoomEntry::new(self.capacity)));
        entry.sessions.fetch_add(1, Ordering::SeqCst);
    }

    /// Count a session out of a room; the last session out drops the
    /// room's cached entries.
    pub fn unregister_session(&self, room_id: &str) {
        self.rooms
            .remove_if(room_id, |_, entry| {
                entry.sessions.fetch_sub(1, Ordering::SeqCst) == 1
            });
    }

    fn room(&self, room_id: &str) -> Arc<RoomEntry> {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(RoomEntry::new(self.capacity)))
            .clone()
    }

    /// STT lookup. Returns `(transcription, cached)`.
    ///
    /// `produce` runs at most once concurrently per (room, speaker, audio);
    /// an empty produce result is not cached.
    pub async fn get_or_create_stt<F, Fut>(
        &self,
        room_id: &str,
        speaker_id: &str,
        audio: &[u8],
        produce: F,
    ) -> (Transcription, bool)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Transcription>,
    {
        let key = SttKey {
            speaker_id: speaker_id.to_string(),
            audio: Sha256::digest(audio).into(),
        };
        let room = self.room(room_id);

        if let Some(hit) = room.stt.lock().get(&key).cloned() {
            metrics::counter!("parley_cache_hits_total", "kind" => "stt").increment(1);
            return (hit, true);
        }

        let lock = room.flight_lock(FlightKey::Stt(key.clone()));
        let _guard = lock.lock().await;

        // another flight may have landed while we waited
        if let Some(hit) = room.stt.lock().get(&key).cloned() {
            metrics::counter!("parley_cache_hits_total", "kind" => "stt").increment(1);
            return (hit, true);
        }

        metrics::counter!("parley_cache_misses_total", "kind" => "stt").increment(1);
        let value = produce().await;
        if !value.is_empty() {
            room.stt.lock().put(key.clone(), value.clone());
            room.inflight.remove(&FlightKey::Stt(key));
        }
        (value, false)
    }

    /// Translation lookup. Returns `(text, cached)`.
    pub async fn get_or_create_translation<F, Fut>(
        &self,
        room_id: &str,
        text: &str,
        source: &str,
        target: &str,
        produce: F,
    ) -> (String, bool)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = String>,
    {
        let key = MtKey {
            text: text.to_string(),
            source: source.to_string(),
            target: target.to_string(),
        };
        let room = self.room(room_id);

        if let Some(hit) = room.translations.lock().get(&key).cloned() {
            metrics::counter!("parley_cache_hits_total", "kind" => "translation").increment(1);
            return (hit, true);
        }

        let lock = room.flight_lock(FlightKey::Mt(key.clone()));
        let _guard = lock.lock().await;

        if let Some(hit) = room.translations.lock().get(&key).cloned() {
            metrics::counter!("parley_cache_hits_total", "kind" => "translation").increment(1);
            return (hit, true);
        }

        metrics::counter!("parley_cache_misses_total", "kind" => "translation").increment(1);
        let value = produce().await;
        if !value.trim().is_empty() {
            room.translations.lock().put(key.clone(), value.clone());
            room.inflight.remove(&FlightKey::Mt(key));
        }
        (value, false)
    }

    /// TTS lookup. Returns `(synthesis, cached)`.
    pub async fn get_or_create_tts<F, Fut>(
        &self,
        room_id: &str,
        text: &str,
        target: &str,
        produce: F,
    ) -> (Synthesis, bool)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Synthesis>,
    {
        let key = TtsKey {
            text: text.to_string(),
            target: target.to_string(),
        };
        let room = self.room(room_id);

        if let Some(hit) = room.tts.lock().get(&key).cloned() {
            metrics::counter!("parley_cache_hits_total", "kind" => "tts").increment(1);
            return (hit, true);
        }

        let lock = room.flight_lock(FlightKey::Tts(key.clone()));
        let _guard = lock.lock().await;

        if let Some(hit) = room.tts.lock().get(&key).cloned() {
            metrics::counter!("parley_cache_hits_total", "kind" => "tts").increment(1);
            return (hit, true);
        }

        metrics::counter!("parley_cache_misses_total", "kind" => "tts").increment(1);
        let value = produce().await;
        if !value.is_empty() {
            room.tts.lock().put(key.clone(), value.clone());
            room.inflight.remove(&FlightKey::Tts(key));
        }
        (value, false)
    }

    /// Number of rooms currently holding cached entries.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn transcription(text: &str) -> Transcription {
        Transcription {
            text: text.to_string(),
            confidence: 0.95,
        }
    }

    #[tokio::test]
    async fn test_stt_hit_after_miss() {
        let cache = RoomCache::new(16);
        let audio = vec![1u8; 960];

        let (first, cached) = cache
            .get_or_create_stt("r1", "sp1", &audio, || async { transcription("hello") })
            .await;
        assert!(!cached);
        assert_eq!(first.text, "hello");

        let (second, cached) = cache
            .get_or_create_stt("r1", "sp1", &audio, || async {
                panic!("must be served from cache")
            })
            .await;
        assert!(cached);
        assert_eq!(second.text, "hello");
    }

    #[tokio::test]
    async fn test_stt_key_includes_speaker() {
        let cache = RoomCache::new(16);
        let audio = vec![1u8; 960];

        cache
            .get_or_create_stt("r1", "sp1", &audio, || async { transcription("a") })
            .await;
        let (result, cached) = cache
            .get_or_create_stt("r1", "sp2", &audio, || async { transcription("b") })
            .await;
        assert!(!cached);
        assert_eq!(result.text, "b");
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let cache = RoomCache::new(16);
        let audio = vec![1u8; 960];

        cache
            .get_or_create_stt("r1", "sp1", &audio, || async { transcription("a") })
            .await;
        let (_, cached) = cache
            .get_or_create_stt("r2", "sp1", &audio, || async { transcription("a") })
            .await;
        assert!(!cached);
    }

    #[tokio::test]
    async fn test_single_flight_concurrent_producers() {
        let cache = Arc::new(RoomCache::new(16));
        let calls = Arc::new(AtomicU32::new(0));
        let audio = Arc::new(vec![7u8; 4800]);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            let audio = audio.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_create_stt("room", "sp", &audio, || {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            // hold the flight long enough for all tasks to pile up
                            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                            transcription("once")
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            let (result, _) = handle.await.unwrap();
            assert_eq!(result.text, "once");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "produce ran more than once");
    }

    #[tokio::test]
    async fn test_failed_produce_not_cached() {
        let cache = RoomCache::new(16);
        let audio = vec![1u8; 960];

        let (empty, cached) = cache
            .get_or_create_stt("r1", "sp1", &audio, || async { Transcription::empty() })
            .await;
        assert!(!cached);
        assert!(empty.is_empty());

        // next caller retries the producer
        let (retry, cached) = cache
            .get_or_create_stt("r1", "sp1", &audio, || async { transcription("ok") })
            .await;
        assert!(!cached);
        assert_eq!(retry.text, "ok");
    }

    #[tokio::test]
    async fn test_translation_and_tts_caching() {
        let cache = RoomCache::new(16);

        let (text, cached) = cache
            .get_or_create_translation("r1", "안녕하세요", "ko", "en", || async {
                "Hello".to_string()
            })
            .await;
        assert!(!cached);
        assert_eq!(text, "Hello");

        let (text, cached) = cache
            .get_or_create_translation("r1", "안녕하세요", "ko", "en", || async {
                unreachable!()
            })
            .await;
        assert!(cached);
        assert_eq!(text, "Hello");

        let synthesis = Synthesis {
            audio: vec![3u8; 100],
            duration_ms: 400,
        };
        let expected = synthesis.clone();
        let (s, cached) = cache
            .get_or_create_tts("r1", "Hello", "en", || async { synthesis })
            .await;
        assert!(!cached);
        assert_eq!(s, expected);

        let (s, cached) = cache
            .get_or_create_tts("r1", "Hello", "en", || async { unreachable!() })
            .await;
        assert!(cached);
        assert_eq!(s, expected);
    }

    #[tokio::test]
    async fn test_room_eviction_on_last_unregister() {
        let cache = RoomCache::new(16);
        let audio = vec![1u8; 960];

        cache.register_session("r1");
        cache.register_session("r1");
        cache
            .get_or_create_stt("r1", "sp1", &audio, || async { transcription("a") })
            .await;

        cache.unregister_session("r1");
        assert_eq!(cache.room_count(), 1, "room dropped too early");

        cache.unregister_session("r1");
        assert_eq!(cache.room_count(), 0);

        // re-created room starts cold
        let (_, cached) = cache
            .get_or_create_stt("r1", "sp1", &audio, || async { transcription("a") })
            .await;
        assert!(!cached);
    }

    #[tokio::test]
    async fn test_lru_bound_evicts_oldest() {
        let cache = RoomCache::new(2);

        for text in ["a", "b", "c"] {
            cache
                .get_or_create_translation("r1", text, "ko", "en", || async {
                    text.to_uppercase()
                })
                .await;
        }

        // "a" was evicted by the bound of 2
        let (_, cached) = cache
            .get_or_create_translation("r1", "a", "ko", "en", || async { "A".to_string() })
            .await;
        assert!(!cached);

        // "c" is still warm
        let (_, cached) = cache
            .get_or_create_translation("r1", "c", "ko", "en", || async { unreachable!() })
            .await;
        assert!(cached);
    }
}
