//! Local fallback matcher.
//!
//! When the NLU collaborator is unreachable, a small fixed table of
//! keyword patterns resolves the handful of utterances we can match with
//! high confidence. Anything outside the table stays unresolved — the
//! matcher never guesses.

use std::collections::HashMap;

use maru_core::intent::Intent;
use regex::Regex;
use serde_json::json;

/// Confidence assigned to local matches. Below a real NLU hit so the
/// degradation is visible downstream.
const LOCAL_CONFIDENCE: f64 = 0.85;

struct Pattern {
    regex: Regex,
    intent: &'static str,
}

/// Regex fallback matcher over a fixed pattern table.
pub struct LocalMatcher {
    patterns: Vec<Pattern>,
}

impl LocalMatcher {
    /// Build the matcher with its built-in pattern table (Korean and
    /// English surface forms).
    #[must_use]
    pub fn new() -> Self {
        let table: &[(&str, &str)] = &[
            (r"(?i)날씨|weather", "weather.query"),
            (r"(?i)몇\s*시|시간|what\s+time|current\s+time", "time.query"),
            (r"(?i)안녕|hello|\bhi\b|good\s+(morning|evening)", "greeting.hello"),
            (r"(?i)음악|노래|\bmusic\b|play\s+some", "music.play"),
        ];
        let patterns = table
            .iter()
            .filter_map(|(pattern, intent)| {
                Regex::new(pattern).ok().map(|regex| Pattern { regex, intent })
            })
            .collect();
        Self { patterns }
    }

    /// Try to resolve an utterance. Returns `None` when nothing in the
    /// fixed table matches.
    #[must_use]
    pub fn resolve(&self, text: &str) -> Option<Intent> {
        let pattern = self.patterns.iter().find(|p| p.regex.is_match(text))?;
        let mut intent = Intent::new(pattern.intent, LOCAL_CONFIDENCE, text);

        // The only entity extraction worth doing locally: relative dates
        // on weather queries.
        if pattern.intent == "weather.query" {
            let date = if text.contains("내일") || text.to_lowercase().contains("tomorrow") {
                "tomorrow"
            } else {
                "today"
            };
            intent = intent.with_parameters(HashMap::from([("date".to_string(), json!(date))]));
        }
        Some(intent)
    }
}

impl Default for LocalMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn korean_weather_query_matches() {
        let matcher = LocalMatcher::new();
        let intent = matcher.resolve("오늘 날씨 어때?").unwrap();
        assert_eq!(intent.name, "weather.query");
        assert_eq!(intent.confidence, LOCAL_CONFIDENCE);
        assert_eq!(intent.parameters["date"], json!("today"));
    }

    #[test]
    fn tomorrow_weather_extracts_date() {
        let matcher = LocalMatcher::new();
        let intent = matcher.resolve("내일 날씨 알려줘").unwrap();
        assert_eq!(intent.parameters["date"], json!("tomorrow"));

        let intent = matcher.resolve("What's the weather tomorrow?").unwrap();
        assert_eq!(intent.parameters["date"], json!("tomorrow"));
    }

    #[test]
    fn greeting_and_time_match() {
        let matcher = LocalMatcher::new();
        assert_eq!(matcher.resolve("안녕하세요").unwrap().name, "greeting.hello");
        assert_eq!(matcher.resolve("지금 몇 시야?").unwrap().name, "time.query");
        assert_eq!(matcher.resolve("what time is it").unwrap().name, "time.query");
    }

    #[test]
    fn unmatched_text_returns_none() {
        let matcher = LocalMatcher::new();
        assert!(matcher.resolve("냉장고에 뭐가 있지?").is_none());
        assert!(matcher.resolve("").is_none());
    }

    #[test]
    fn hi_requires_word_boundary() {
        let matcher = LocalMatcher::new();
        // "chill" must not match the greeting's \bhi\b.
        assert!(matcher.resolve("chill playlist please").map(|i| i.name.clone())
            != Some("greeting.hello".to_string()));
    }
}
