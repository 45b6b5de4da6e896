//! Compiled-in tables
//!
//! Filler interjections, synthesis voices, and STT locale codes are pure
//! data keyed by language code. Adding a language means editing the tables
//! here only.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// VAD frame duration. WebRTC-style classifiers accept 10/20/30 ms frames;
/// we use 30 ms throughout.
pub const VAD_FRAME_MS: usize = 30;

/// VAD frame size in PCM bytes (30 ms at 16 kHz s16le).
pub const VAD_FRAME_BYTES: usize = parley_core::audio::bytes_for_ms(VAD_FRAME_MS);

/// Minimum consecutive speech chunks before the detector commits to
/// Speaking; filters one-off noise transients.
pub const VAD_MIN_SPEECH_FRAMES: u32 = 3;

/// Fraction of speech frames in a chunk for the chunk to count as speech.
pub const VAD_SPEECH_RATIO: f64 = 0.3;

/// Minimum buffered speech to drain on a sentence boundary.
pub const MIN_DRAIN_MS: usize = 500;

/// Minimum buffered speech worth a final drain at session end.
pub const END_DRAIN_MS: usize = 300;

/// Short interjections that carry no translatable content. An utterance
/// whose transcript matches (trimmed, and also case-folded) is delivered as
/// transcript only: no translation, no synthesis.
pub static FILLER_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        // Korean
        "네", "예", "응", "음", "어", "아", "으", "흠", "뭐", "그", "저", "아아", "어어",
        "음음", "네네", "예예", "그래", "응응",
        // English
        "uh", "um", "ah", "oh", "hmm", "yeah", "yes", "no", "ok", "okay", "well", "so",
        "like", "you know", "i mean",
        // Japanese
        "あ", "え", "う", "ん", "はい", "うん", "ええ", "まあ",
        // Mandarin
        "嗯", "啊", "哦", "呃", "好", "是",
    ])
});

/// True if `text` is a filler interjection.
pub fn is_filler(text: &str) -> bool {
    let trimmed = text.trim();
    FILLER_WORDS.contains(trimmed) || FILLER_WORDS.contains(trimmed.to_lowercase().as_str())
}

/// Synthesis voice for a language: (voice id, neural engine supported).
///
/// One voice per language; neural engine where the provider offers it,
/// standard otherwise.
pub fn voice_for(lang: &str) -> (&'static str, bool) {
    match lang {
        "ko" => ("Seoyeon", true),
        "en" => ("Joanna", true),
        "ja" => ("Takumi", true),
        "zh" => ("Zhiyu", true),
        "es" => ("Lupe", true),
        "fr" => ("Lea", true),
        "de" => ("Vicki", true),
        "pt" => ("Camila", true),
        "hi" => ("Kajal", true),
        "it" => ("Bianca", true),
        "ru" => ("Tatyana", false),
        "ar" => ("Zeina", false),
        "tr" => ("Filiz", false),
        _ => ("Joanna", true),
    }
}

/// Widen a short language code to the locale the STT provider expects.
/// Unrecognized codes pass through verbatim.
pub fn stt_locale(lang: &str) -> &str {
    match lang {
        "ko" => "ko-KR",
        "en" => "en-US",
        "ja" => "ja-JP",
        "zh" => "zh-CN",
        "es" => "es-US",
        "fr" => "fr-FR",
        "de" => "de-DE",
        "pt" => "pt-BR",
        "ru" => "ru-RU",
        "ar" => "ar-SA",
        "hi" => "hi-IN",
        "tr" => "tr-TR",
        other => other,
    }
}
