//! Multi-signal re-ranking of retrieved chunks.
//!
//! All chunks returned by any namespace are merged into one list and scored
//! with a fixed composite formula:
//!
//! ```text
//! final_score = 0.7 x similarity + 0.15 x recency + source_type_bonus
//! ```
//!
//! Recency is a step function of content age; the source-type bonus is 0.15
//! when the chunk's source type matches the classified intent's preferred
//! source, else a small 0.05 default so every chunk gets a non-zero
//! structural contribution. The formula is a fixed heuristic, not a learned
//! model; global relevance optimality is not a goal.

use chrono::{DateTime, Utc};

use crate::index::{IndexMatch, VectorMetadata};
use crate::intent::Intent;
use crate::models::SourceType;

/// Weights of the composite scoring formula. The defaults are the
/// production values; tests may override.
#[derive(Debug, Clone)]
pub struct RankWeights {
    pub similarity: f64,
    pub recency: f64,
    /// Bonus when the chunk's source type matches the intent's preference.
    pub intent_match_bonus: f64,
    /// Bonus applied to every other chunk.
    pub default_source_bonus: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            similarity: 0.7,
            recency: 0.15,
            intent_match_bonus: 0.15,
            default_source_bonus: 0.05,
        }
    }
}

/// Age thresholds (days) and scores of the recency step function.
pub const RECENCY_STEPS: [(i64, f64); 4] = [(7, 1.0), (30, 0.8), (90, 0.5), (180, 0.3)];
/// Recency score for content older than every threshold.
pub const RECENCY_FLOOR: f64 = 0.1;

/// Step-function recency score for a content timestamp.
///
/// Age is measured in whole days against the supplied `now`, keeping the
/// function pure. A missing timestamp scores 0: content with unknown age
/// gets no recency contribution at all, which is below the oldest known
/// content.
pub fn recency_score(content_ts: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(ts) = content_ts else {
        return 0.0;
    };
    let age_days = (now - ts).num_days();
    for (threshold, score) in RECENCY_STEPS {
        if age_days < threshold {
            return score;
        }
    }
    RECENCY_FLOOR
}

/// A chunk as it comes back from a namespace query, before scoring.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub source_type: SourceType,
    pub text: String,
    pub similarity: f64,
    pub metadata: VectorMetadata,
}

impl From<IndexMatch> for RetrievedChunk {
    fn from(m: IndexMatch) -> Self {
        RetrievedChunk {
            chunk_id: m.id,
            source_type: m.metadata.source_type,
            text: m.metadata.text.clone(),
            similarity: m.score as f64,
            metadata: m.metadata,
        }
    }
}

/// A chunk with its full scoring breakdown.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub source_type: SourceType,
    pub text: String,
    pub similarity_score: f64,
    pub recency_score: f64,
    pub final_score: f64,
    pub metadata: VectorMetadata,
}

/// Merge and re-rank chunks from all namespaces into one list, sorted by
/// `final_score` descending with ties broken by `similarity_score`
/// descending.
pub fn rerank(
    chunks: Vec<RetrievedChunk>,
    intent: Intent,
    weights: &RankWeights,
    now: DateTime<Utc>,
) -> Vec<ScoredChunk> {
    let preferred = intent.preferred_source();

    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| {
            let recency = recency_score(chunk.metadata.recency_timestamp(), now);
            let bonus = if preferred == Some(chunk.source_type) {
                weights.intent_match_bonus
            } else {
                weights.default_source_bonus
            };
            let final_score =
                weights.similarity * chunk.similarity + weights.recency * recency + bonus;
            ScoredChunk {
                chunk_id: chunk.chunk_id,
                source_type: chunk.source_type,
                text: chunk.text,
                similarity_score: chunk.similarity,
                recency_score: recency,
                final_score,
                metadata: chunk.metadata,
            }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.similarity_score
                    .partial_cmp(&a.similarity_score)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn metadata(source_type: SourceType, ts: Option<DateTime<Utc>>) -> VectorMetadata {
        VectorMetadata {
            chunk_id: "c".to_string(),
            document_id: "d".to_string(),
            owner_id: "o".to_string(),
            client_id: None,
            source_type,
            text: String::new(),
            chunk_index: 0,
            created_at: ts,
            title: None,
            url: None,
            page_number: None,
            meeting_date: None,
            speaker: None,
            start_seconds: None,
            end_seconds: None,
            playback_url: None,
        }
    }

    fn chunk(
        id: &str,
        source_type: SourceType,
        similarity: f64,
        age_days: i64,
        now: DateTime<Utc>,
    ) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: id.to_string(),
            source_type,
            text: String::new(),
            similarity,
            metadata: metadata(source_type, Some(now - Duration::days(age_days))),
        }
    }

    #[test]
    fn recency_steps() {
        let now = Utc::now();
        let at = |days: i64| Some(now - Duration::days(days));
        assert_eq!(recency_score(at(0), now), 1.0);
        assert_eq!(recency_score(at(6), now), 1.0);
        assert_eq!(recency_score(at(7), now), 0.8);
        assert_eq!(recency_score(at(29), now), 0.8);
        assert_eq!(recency_score(at(30), now), 0.5);
        assert_eq!(recency_score(at(89), now), 0.5);
        assert_eq!(recency_score(at(90), now), 0.3);
        assert_eq!(recency_score(at(179), now), 0.3);
        assert_eq!(recency_score(at(180), now), RECENCY_FLOOR);
        assert_eq!(recency_score(at(5000), now), RECENCY_FLOOR);
        assert_eq!(recency_score(None, now), 0.0);
    }

    #[test]
    fn formula_matches_weights() {
        let now = Utc::now();
        let scored = rerank(
            vec![chunk("c1", SourceType::Document, 0.9, 2, now)],
            Intent::Factual,
            &RankWeights::default(),
            now,
        );
        // 0.7 * 0.9 + 0.15 * 1.0 + 0.15 (factual prefers documents)
        assert!((scored[0].final_score - (0.63 + 0.15 + 0.15)).abs() < 1e-9);
    }

    #[test]
    fn fresher_content_never_ranks_below_stale_at_equal_similarity() {
        let now = Utc::now();
        let scored = rerank(
            vec![
                chunk("old", SourceType::Document, 0.8, 120, now),
                chunk("fresh", SourceType::Document, 0.8, 3, now),
            ],
            Intent::None,
            &RankWeights::default(),
            now,
        );
        assert_eq!(scored[0].chunk_id, "fresh");
        assert!(scored[0].final_score >= scored[1].final_score);
    }

    #[test]
    fn behavioral_intent_prefers_transcripts() {
        let now = Utc::now();
        let scored = rerank(
            vec![
                chunk("doc", SourceType::Document, 0.8, 10, now),
                chunk("meeting", SourceType::Transcript, 0.8, 10, now),
            ],
            Intent::Behavioral,
            &RankWeights::default(),
            now,
        );
        assert_eq!(scored[0].chunk_id, "meeting");
        assert!(scored[0].final_score > scored[1].final_score);
    }

    #[test]
    fn no_intent_gives_every_chunk_the_default_bonus() {
        let now = Utc::now();
        let scored = rerank(
            vec![
                chunk("a", SourceType::Document, 0.5, 10, now),
                chunk("b", SourceType::Transcript, 0.5, 10, now),
            ],
            Intent::None,
            &RankWeights::default(),
            now,
        );
        assert!((scored[0].final_score - scored[1].final_score).abs() < 1e-9);
        for s in &scored {
            assert!(s.final_score > 0.0);
        }
    }

    #[test]
    fn ties_on_final_score_break_by_similarity() {
        let now = Utc::now();
        // Lower similarity compensated by intent bonus: equal final scores
        // are impossible here, so construct a genuine tie instead: equal
        // everything except similarity, with zeroed weights on the rest.
        let weights = RankWeights {
            similarity: 0.0,
            recency: 0.0,
            intent_match_bonus: 0.0,
            default_source_bonus: 0.0,
        };
        let scored = rerank(
            vec![
                chunk("weaker", SourceType::Document, 0.2, 10, now),
                chunk("stronger", SourceType::Document, 0.9, 10, now),
            ],
            Intent::None,
            &weights,
            now,
        );
        assert_eq!(scored[0].chunk_id, "stronger");
    }

    #[test]
    fn merges_all_namespaces_into_one_ordered_list() {
        let now = Utc::now();
        let scored = rerank(
            vec![
                chunk("m1", SourceType::Transcript, 0.9, 10, now),
                chunk("d1", SourceType::Document, 0.95, 10, now),
                chunk("k1", SourceType::KnowledgeBaseItem, 0.2, 10, now),
            ],
            Intent::None,
            &RankWeights::default(),
            now,
        );
        assert_eq!(scored.len(), 3);
        for pair in scored.windows(2) {
            assert!(pair[0].final_score >= pair[1].final_score);
        }
        assert_eq!(scored[0].chunk_id, "d1");
        assert_eq!(scored[2].chunk_id, "k1");
    }
}
