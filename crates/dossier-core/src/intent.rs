//! Keyword-based query intent classification.
//!
//! A pure, deterministic pass over the raw query string. The ordered
//! pattern sets are evaluated first-match-wins, and the result is used only
//! to bias ranking, never to filter results out.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::SourceType;

/// The kind of information a query is likely after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// How people felt or acted: opinions, sentiment, attitude.
    Behavioral,
    /// Concrete facts, figures, and examples.
    Factual,
    /// What the company can do or offer.
    Capability,
    /// No recognizable intent keywords.
    None,
}

impl Intent {
    /// The source type this intent prefers, used for the ranking bonus.
    pub fn preferred_source(self) -> Option<SourceType> {
        match self {
            Intent::Behavioral => Some(SourceType::Transcript),
            Intent::Factual => Some(SourceType::Document),
            Intent::Capability => Some(SourceType::KnowledgeBaseItem),
            Intent::None => None,
        }
    }
}

fn patterns() -> &'static [(Regex, Intent); 3] {
    static PATTERNS: OnceLock<[(Regex, Intent); 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                Regex::new(r"(?i)\b(how|why|sentiment|feeling|think|opinion|behavior|attitude)\b")
                    .unwrap(),
                Intent::Behavioral,
            ),
            (
                Regex::new(r"(?i)\b(what|when|where|which|fact|data|number|case study|example)\b")
                    .unwrap(),
                Intent::Factual,
            ),
            (
                Regex::new(
                    r"(?i)\b(can you|do you|service|offering|capability|technology|solution)\b",
                )
                .unwrap(),
                Intent::Capability,
            ),
        ]
    })
}

/// Classify a query's likely information need. First matching pattern set
/// wins; queries matching nothing classify as [`Intent::None`].
pub fn classify(query: &str) -> Intent {
    for (re, intent) in patterns() {
        if re.is_match(query) {
            return *intent;
        }
    }
    Intent::None
}
