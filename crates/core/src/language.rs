//! Language word-order topology
//!
//! Buffering strategy is chosen from the word-order distance between the
//! speaker's language and each listener's target language. Languages that
//! share a word-order family can be translated incrementally; a pair that
//! differs (e.g. ko → en) needs a complete clause before the verb position
//! is known, so the buffer cap is raised.

use serde::{Deserialize, Serialize};

/// Word-order family of a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WordOrder {
    /// Subject-Object-Verb (ko, ja, tr, hi, bn)
    Sov,
    /// Subject-Verb-Object (en, zh, es, fr, de, pt, ru, it)
    Svo,
    /// Verb-Subject-Object (ar, he)
    Vso,
}

impl WordOrder {
    /// Classify a language code. Unknown codes default to SVO.
    pub fn of(lang: &str) -> WordOrder {
        match lang {
            "ko" | "ja" | "tr" | "hi" | "bn" => WordOrder::Sov,
            "ar" | "he" => WordOrder::Vso,
            _ => WordOrder::Svo,
        }
    }
}

/// How much audio to buffer before handing a segment to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferingStrategy {
    /// Source and target share a word-order family: drain on fixed-size
    /// chunks (1 500 ms cap) for minimum latency.
    #[default]
    ChunkBased,
    /// Word orders diverge: wait for a plausible sentence (2 500 ms cap).
    SentenceBased,
}

/// Chunk-based buffer cap in milliseconds.
pub const CHUNK_DURATION_MS: u32 = 1500;

/// Sentence-based buffer cap in milliseconds.
pub const SENTENCE_MAX_DURATION_MS: u32 = 2500;

impl BufferingStrategy {
    /// Strategy for a source/target language pair.
    pub fn for_pair(source: &str, target: &str) -> BufferingStrategy {
        if WordOrder::of(source) == WordOrder::of(target) {
            BufferingStrategy::ChunkBased
        } else {
            BufferingStrategy::SentenceBased
        }
    }

    /// Maximum buffered audio for this strategy, in milliseconds.
    pub fn max_buffer_ms(&self) -> u32 {
        match self {
            BufferingStrategy::ChunkBased => CHUNK_DURATION_MS,
            BufferingStrategy::SentenceBased => SENTENCE_MAX_DURATION_MS,
        }
    }
}

/// Maximum buffered audio for a source/target pair, in milliseconds.
pub fn max_buffer_ms(source: &str, target: &str) -> u32 {
    BufferingStrategy::for_pair(source, target).max_buffer_ms()
}

/// English display name for a language code, used in translation prompts
/// sent to LLM-backed translators.
pub fn display_name(lang: &str) -> &str {
    match lang {
        "ko" => "Korean",
        "en" => "English",
        "ja" => "Japanese",
        "zh" => "Chinese",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "ar" => "Arabic",
        "hi" => "Hindi",
        "tr" => "Turkish",
        "it" => "Italian",
        "he" => "Hebrew",
        "bn" => "Bengali",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_order_families() {
        assert_eq!(WordOrder::of("ko"), WordOrder::Sov);
        assert_eq!(WordOrder::of("ja"), WordOrder::Sov);
        assert_eq!(WordOrder::of("en"), WordOrder::Svo);
        assert_eq!(WordOrder::of("zh"), WordOrder::Svo);
        assert_eq!(WordOrder::of("ar"), WordOrder::Vso);
        assert_eq!(WordOrder::of("he"), WordOrder::Vso);
    }

    #[test]
    fn test_unknown_code_defaults_to_svo() {
        assert_eq!(WordOrder::of("xx"), WordOrder::Svo);
        assert_eq!(WordOrder::of(""), WordOrder::Svo);
        // and therefore pairs with SVO languages as chunk-based
        assert_eq!(
            BufferingStrategy::for_pair("xx", "en"),
            BufferingStrategy::ChunkBased
        );
    }

    #[test]
    fn test_strategy_same_family() {
        assert_eq!(
            BufferingStrategy::for_pair("ko", "ja"),
            BufferingStrategy::ChunkBased
        );
        assert_eq!(max_buffer_ms("ko", "ja"), 1500);
    }

    #[test]
    fn test_strategy_cross_family() {
        assert_eq!(
            BufferingStrategy::for_pair("ko", "en"),
            BufferingStrategy::SentenceBased
        );
        assert_eq!(
            BufferingStrategy::for_pair("ar", "en"),
            BufferingStrategy::SentenceBased
        );
        assert_eq!(max_buffer_ms("ko", "en"), 2500);
    }

    #[test]
    fn test_strategy_is_symmetric() {
        for (a, b) in [("ko", "en"), ("ja", "zh"), ("ar", "he"), ("ko", "tr")] {
            assert_eq!(
                BufferingStrategy::for_pair(a, b),
                BufferingStrategy::for_pair(b, a)
            );
        }
    }

    #[test]
    fn test_chunk_based_iff_same_family() {
        let langs = ["ko", "ja", "tr", "en", "zh", "fr", "ar", "he", "xx"];
        for a in langs {
            for b in langs {
                let same = WordOrder::of(a) == WordOrder::of(b);
                let chunked =
                    BufferingStrategy::for_pair(a, b) == BufferingStrategy::ChunkBased;
                assert_eq!(same, chunked, "pair ({a}, {b})");
            }
        }
    }
}
