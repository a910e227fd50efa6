//! Speaker-aware transcript segmentation and chunk building.
//!
//! Raw meeting transcripts arrive as `Speaker Name: utterance ...` runs with
//! no reliable timing. This module normalizes the text, parses it into
//! ordered [`TranscriptSegment`]s with estimated start times, and packs whole
//! segments into chunks against a character budget. A segment is never split
//! across chunk boundaries unless it alone exceeds the budget, and each new
//! chunk is seeded with the tail segments of the previous one so the
//! conversation stays readable across boundaries.
//!
//! All functions here are pure; the ingestion pipeline owns I/O.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};
use crate::models::TranscriptSegment;

/// Rough characters-per-token ratio used to convert token budgets into
/// character budgets.
pub const CHARS_PER_TOKEN: usize = 4;

/// Estimated speaking time: two words per second.
const SECONDS_PER_TWO_WORDS: u64 = 1;

/// Budgets controlling transcript chunk packing, in tokens.
#[derive(Debug, Clone)]
pub struct TranscriptBudget {
    /// Target chunk size in tokens.
    pub token_budget: usize,
    /// Overlap carried into the next chunk, in tokens.
    pub overlap_tokens: usize,
    /// Characters per token used to derive the character budgets.
    pub chars_per_token: usize,
}

impl Default for TranscriptBudget {
    fn default() -> Self {
        Self {
            token_budget: 1500,
            overlap_tokens: 200,
            chars_per_token: CHARS_PER_TOKEN,
        }
    }
}

impl TranscriptBudget {
    fn chunk_chars(&self) -> usize {
        self.token_budget * self.chars_per_token
    }

    fn overlap_chars(&self) -> usize {
        self.overlap_tokens * self.chars_per_token
    }

    fn validate(&self) -> Result<()> {
        if self.token_budget == 0 || self.chars_per_token == 0 {
            return Err(Error::Validation(
                "transcript token budget and chars-per-token must be > 0".into(),
            ));
        }
        if self.overlap_tokens >= self.token_budget {
            return Err(Error::Validation(format!(
                "transcript overlap ({}) must be smaller than the token budget ({})",
                self.overlap_tokens, self.token_budget
            )));
        }
        Ok(())
    }
}

/// A packed transcript chunk with its time range and opening speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptChunk {
    pub text: String,
    pub start_seconds: u64,
    pub end_seconds: u64,
    pub opening_speaker: String,
}

/// Matches the start of a speaker run: `Jane Doe: ` or `Jane: `.
fn speaker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*:\s").unwrap())
}

fn filler_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:um+|uh+|er+|ah+)\b").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

fn colon_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*:\s*").unwrap())
}

/// Normalize a raw transcript before segmentation: collapse whitespace,
/// normalize `Speaker:` spacing, and strip verbal tics.
pub fn normalize_transcript(raw: &str) -> String {
    let cleaned = whitespace_re().replace_all(raw, " ");
    let cleaned = colon_re().replace_all(&cleaned, ": ");
    let cleaned = filler_re().replace_all(&cleaned, "");
    whitespace_re().replace_all(cleaned.trim(), " ").into_owned()
}

/// Split a normalized transcript at the start of each speaker run.
fn split_speaker_runs(transcript: &str) -> Vec<&str> {
    let starts: Vec<usize> = speaker_re().find_iter(transcript).map(|m| m.start()).collect();
    if starts.is_empty() {
        return Vec::new();
    }
    let mut runs = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(transcript.len());
        runs.push(&transcript[start..end]);
    }
    runs
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimated speaking time for an utterance, in whole seconds.
fn speaking_seconds(text: &str) -> u64 {
    (word_count(text) as u64).div_ceil(2) * SECONDS_PER_TWO_WORDS
}

/// Parse a normalized transcript into ordered speaker segments.
///
/// Consecutive utterances from the same speaker are merged into one
/// segment. Start times are estimated cumulatively from word count when no
/// explicit timing exists. Utterances shorter than two words and ten
/// characters are dropped as transcription noise.
pub fn parse_segments(transcript: &str) -> Vec<TranscriptSegment> {
    let mut segments: Vec<TranscriptSegment> = Vec::new();
    let mut clock: u64 = 0;

    for run in split_speaker_runs(transcript) {
        let Some(colon) = run.find(':') else { continue };
        let speaker = run[..colon].trim();
        let text = run[colon + 1..].trim();
        if speaker.is_empty() || text.is_empty() {
            continue;
        }
        if word_count(text) < 2 && text.len() < 10 {
            continue;
        }

        let same_speaker = segments.last().is_some_and(|last| last.speaker == speaker);
        if same_speaker {
            let last = segments.last_mut().unwrap();
            last.text.push(' ');
            last.text.push_str(text);
        } else {
            if let Some(prev) = segments.last() {
                clock += speaking_seconds(&prev.text);
            }
            segments.push(TranscriptSegment {
                speaker: speaker.to_string(),
                text: text.to_string(),
                start_seconds: clock,
            });
        }
    }

    segments
}

fn segment_line(segment: &TranscriptSegment) -> String {
    format!("{}: {}", segment.speaker, segment.text)
}

/// Pack segments into chunks against the character budget.
///
/// Whole segments accumulate until the next one would overflow the budget;
/// the chunk then closes (recording its time range and opening speaker) and
/// the next chunk is seeded by walking backward through the closed chunk's
/// segments until the overlap budget is reached. A segment that alone
/// exceeds the budget becomes its own chunk.
pub fn build_chunks(
    segments: &[TranscriptSegment],
    budget: &TranscriptBudget,
) -> Result<Vec<TranscriptChunk>> {
    budget.validate()?;

    let chunk_chars = budget.chunk_chars();
    let overlap_chars = budget.overlap_chars();

    let mut chunks = Vec::new();
    let mut current = String::new();
    // Indices into `segments` making up the current chunk, in order.
    let mut members: Vec<usize> = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        let line = segment_line(segment);
        let would_be = if current.is_empty() {
            line.len()
        } else {
            current.len() + 2 + line.len()
        };

        if !current.is_empty() && would_be > chunk_chars {
            chunks.push(close_chunk(&current, &members, segments));

            // Seed the next chunk with the contiguous tail of the closed
            // chunk, newest-first, until the overlap budget is spent.
            let mut seeded: Vec<usize> = Vec::new();
            let mut seeded_chars = 0usize;
            for &idx in members.iter().rev() {
                let seg_len = segment_line(&segments[idx]).len();
                if seeded_chars + seg_len > overlap_chars {
                    break;
                }
                seeded.push(idx);
                seeded_chars += seg_len + 2;
            }
            seeded.reverse();

            members = seeded;
            current = members
                .iter()
                .map(|&idx| segment_line(&segments[idx]))
                .collect::<Vec<_>>()
                .join("\n\n");
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(&line);
        members.push(i);
    }

    if !current.is_empty() {
        chunks.push(close_chunk(&current, &members, segments));
    }

    Ok(chunks)
}

fn close_chunk(text: &str, members: &[usize], segments: &[TranscriptSegment]) -> TranscriptChunk {
    let first = &segments[members[0]];
    let last = &segments[*members.last().unwrap()];
    TranscriptChunk {
        text: text.to_string(),
        start_seconds: first.start_seconds,
        end_seconds: last.start_seconds + speaking_seconds(&last.text),
        opening_speaker: first.speaker.clone(),
    }
}
