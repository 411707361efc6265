//! Citation binding for generated answers
//!
//! Answers arrive with numeric markers like `[1]` before their sources
//! are known (the generator streams text first). The binder synthesizes
//! placeholder entries from the markers, then swaps them wholesale for
//! the real ranked sources in a single one-shot bind. Readers always see
//! either all placeholders or all real sources, never a mix.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::retrieval::RankedSource;

/// Cap on placeholders synthesized from markers; a stray `[999]` in
/// generated text must not fabricate hundreds of entries.
pub const MAX_PLACEHOLDER_SOURCES: usize = 10;

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d+)\]").unwrap())
}

/// Citation lifecycle for one answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerState {
    /// No markers were seen and nothing is bound
    NoSources,
    /// Markers were seen; placeholders stand in for sources
    Pending,
    /// Real sources are bound
    Bound,
}

/// A source slot attached to an answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundSource {
    /// 1-based citation position matching the `[n]` marker
    pub position: usize,

    /// True while this slot is a placeholder awaiting the real source
    pub placeholder: bool,

    pub content: String,
    pub similarity: f32,
    pub message_id: Option<Uuid>,
    pub channel_id: Option<String>,
    pub author_name: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl BoundSource {
    fn placeholder(position: usize) -> Self {
        Self {
            position,
            placeholder: true,
            content: String::new(),
            similarity: 0.0,
            message_id: None,
            channel_id: None,
            author_name: None,
            posted_at: None,
        }
    }

    fn from_ranked(position: usize, source: &RankedSource) -> Self {
        Self {
            position,
            placeholder: false,
            content: source.content.clone(),
            similarity: source.similarity,
            message_id: Some(source.message_id),
            channel_id: source.channel_id.clone(),
            author_name: source.author_name.clone(),
            posted_at: source.posted_at,
        }
    }
}

struct AnswerSources {
    state: AnswerState,
    sources: Vec<BoundSource>,
}

/// Tracks citation slots for in-flight answers
#[derive(Default)]
pub struct CitationBinder {
    answers: Mutex<HashMap<String, AnswerSources>>,
}

impl CitationBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan answer text for `[n]` markers and synthesize placeholders.
    ///
    /// The highest marker decides how many slots exist, capped at
    /// [`MAX_PLACEHOLDER_SOURCES`]. Calling again with more text extends
    /// the placeholder set; a bound answer is left untouched.
    pub fn note_markers(&self, answer_id: &str, answer_text: &str) {
        let highest = marker_re()
            .captures_iter(answer_text)
            .filter_map(|c| c.get(1)?.as_str().parse::<usize>().ok())
            .max()
            .unwrap_or(0)
            .min(MAX_PLACEHOLDER_SOURCES);

        let mut answers = self.answers.lock().unwrap();
        let entry = answers
            .entry(answer_id.to_string())
            .or_insert_with(|| AnswerSources {
                state: AnswerState::NoSources,
                sources: Vec::new(),
            });

        if entry.state == AnswerState::Bound {
            return;
        }

        if highest == 0 {
            return;
        }

        if highest > entry.sources.len() {
            entry.sources = (1..=highest).map(BoundSource::placeholder).collect();
        }
        entry.state = AnswerState::Pending;
    }

    /// Bind real sources to an answer, replacing placeholders wholesale.
    ///
    /// One-shot: the first non-empty bind wins; later arrivals for the
    /// same answer are silently ignored.
    pub fn bind(&self, answer_id: &str, sources: &[RankedSource]) {
        let mut answers = self.answers.lock().unwrap();
        let entry = answers
            .entry(answer_id.to_string())
            .or_insert_with(|| AnswerSources {
                state: AnswerState::NoSources,
                sources: Vec::new(),
            });

        if entry.state == AnswerState::Bound {
            return;
        }

        entry.sources = sources
            .iter()
            .enumerate()
            .map(|(i, source)| BoundSource::from_ranked(i + 1, source))
            .collect();
        entry.state = if entry.sources.is_empty() {
            AnswerState::NoSources
        } else {
            AnswerState::Bound
        };
    }

    /// Current citation state for an answer
    pub fn state(&self, answer_id: &str) -> AnswerState {
        self.answers
            .lock()
            .unwrap()
            .get(answer_id)
            .map(|entry| entry.state)
            .unwrap_or(AnswerState::NoSources)
    }

    /// Current source slots for an answer
    pub fn sources(&self, answer_id: &str) -> Vec<BoundSource> {
        self.answers
            .lock()
            .unwrap()
            .get(answer_id)
            .map(|entry| entry.sources.clone())
            .unwrap_or_default()
    }

    /// Drop a finished answer
    pub fn forget(&self, answer_id: &str) {
        self.answers.lock().unwrap().remove(answer_id);
    }
}
