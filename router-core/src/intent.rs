//! # Intent Classifier (C3)
//!
//! A keyword-based heuristic classifier giving the fallback router a
//! coarse routing hint (§4.3). Deliberately simple: no model inference,
//! just pre-compiled case-insensitive word-boundary keyword matching plus
//! a couple of structural nudges (a code fence, a reasoning marker
//! phrase).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

const REASONING_MARKERS: &[&str] = &["step by step", "first,", "therefore", "hypothesis"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Code,
    Reasoning,
    General,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::Code => "code",
            Intent::Reasoning => "reasoning",
            Intent::General => "general",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            low: 0.0,
            medium: 0.4,
            high: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub code_keywords: Vec<String>,
    pub reasoning_keywords: Vec<String>,
    pub thresholds: ClassifierThresholds,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            code_keywords: vec![
                "python", "function", "code", "debug", "class", "import", "variable", "script",
                "algorithm", "compile", "syntax", "refactor",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            reasoning_keywords: vec![
                "explain", "why", "reasoning", "analyze", "compare", "logic", "prove", "because",
                "conclude",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            thresholds: ClassifierThresholds::default(),
        }
    }
}

/// Pre-compiled, case-insensitive, word-boundary keyword matchers plus the
/// thresholds used to turn raw scores into an (intent, confidence) pair.
///
/// Each keyword set compiles to a single alternation `Regex` (mirroring
/// `original_source/agent_router.py`'s combined `code_pattern`/
/// `reasoning_pattern`), so `find_iter` counts every occurrence across all
/// keywords — not merely how many distinct keywords appeared at least once,
/// which is all a `RegexSet` can report.
pub struct IntentClassifier {
    code_keywords: Regex,
    reasoning_keywords: Regex,
    thresholds: ClassifierThresholds,
}

fn word_boundary_alternation(words: &[String]) -> Regex {
    let alternation = words.iter().map(|w| regex::escape(w)).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("keyword patterns must compile")
}

impl IntentClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            code_keywords: word_boundary_alternation(&config.code_keywords),
            reasoning_keywords: word_boundary_alternation(&config.reasoning_keywords),
            thresholds: config.thresholds.clone(),
        }
    }

    /// Classify raw text into `(intent, confidence)` per §4.3's
    /// eight-step algorithm. Pure: identical input always yields identical
    /// output (invariant 10).
    pub fn classify(&self, text: &str) -> (Intent, f64) {
        let token_count = text.split_whitespace().count();
        if token_count == 0 {
            return (Intent::General, 1.0);
        }

        let mut code_count = self.code_keywords.find_iter(text).count() as f64;
        let mut reason_count = self.reasoning_keywords.find_iter(text).count() as f64;

        if text.contains("```") {
            code_count += 2.0;
        }
        let lower = text.to_lowercase();
        if REASONING_MARKERS.iter().any(|marker| lower.contains(marker)) {
            reason_count += 1.0;
        }

        let n = (token_count as f64 * 0.1).max(1.0);
        let code_score = (code_count / n).min(1.0);
        let reason_score = (reason_count / n).min(1.0);

        if code_score >= self.thresholds.medium && code_score >= reason_score {
            (Intent::Code, code_score)
        } else if reason_score >= self.thresholds.medium {
            (Intent::Reasoning, reason_score)
        } else {
            (Intent::General, 1.0 - code_score.max(reason_score))
        }
    }
}
