//! Language normalization and prompt-based detection.
//!
//! Detection only distinguishes Portuguese, Spanish and English. It never
//! guesses: a tie or an all-zero score yields no language.

use regex::Regex;
use std::sync::OnceLock;

/// Characters inspected by [`detect_language`].
const SAMPLE_CHARS: usize = 512;

const LANGUAGES: [&str; 3] = ["pt", "es", "en"];

/// Pattern and the points it awards to each language (pt, es, en).
const RULES: &[(&str, [u32; 3])] = &[
    (r"[ãõçáéíóúâêôà]", [2, 0, 0]),
    (r"[ñáéíóúü¿¡]", [0, 2, 0]),
    (r"\b(the|and|you|with|for|this|that)\b", [0, 0, 2]),
    (r"\bque\b", [1, 1, 0]),
    (r"\b(não|pois|assim)\b", [1, 0, 0]),
    (r"\b(usted|para|cuando)\b", [0, 1, 0]),
    (r"\b(will|should|can)\b", [0, 0, 1]),
];

fn rules() -> &'static [(Regex, [u32; 3])] {
    static COMPILED: OnceLock<Vec<(Regex, [u32; 3])>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|(pattern, points)| {
                let regex = Regex::new(pattern).expect("language patterns are valid");
                (regex, *points)
            })
            .collect()
    })
}

/// Normalize a caller-declared language code.
///
/// Codes starting with `pt`, `en` or `es` collapse to that prefix; any other
/// code passes through trimmed and lowercased. Blank input means no language.
pub fn normalize_language(language: Option<&str>) -> Option<String> {
    let normalized = language?.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    for code in ["pt", "en", "es"] {
        if normalized.starts_with(code) {
            return Some(code.to_string());
        }
    }
    Some(normalized)
}

/// Score the start of `text` and return the unique best language, if any.
pub fn detect_language(text: &str) -> Option<&'static str> {
    let sample: String = text.chars().take(SAMPLE_CHARS).collect::<String>().to_lowercase();
    if sample.is_empty() {
        return None;
    }

    let mut scores = [0u32; 3];
    for (regex, points) in rules() {
        if regex.is_match(&sample) {
            for (score, add) in scores.iter_mut().zip(points) {
                *score += add;
            }
        }
    }

    let best = *scores.iter().max()?;
    if best == 0 || scores.iter().filter(|score| **score == best).count() > 1 {
        return None;
    }
    scores
        .iter()
        .position(|score| *score == best)
        .map(|idx| LANGUAGES[idx])
}
