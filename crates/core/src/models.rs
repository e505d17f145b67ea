use crate::chunking::normalize_whitespace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Vector = Vec<f32>;

/// A slice of document text. Offsets and lengths count characters, not bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub id: u64,
    pub text: String,
    pub source_offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub segment: Segment,
    pub vector: Vector,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredSegment {
    pub segment: Segment,
    pub score: f32,
}

/// Descending by score, ties broken by ascending segment id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredSegment>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn segment_ids(&self) -> Vec<u64> {
        self.hits.iter().map(|hit| hit.segment.id).collect()
    }

    pub fn sources(&self, limit: usize, preview_chars: usize) -> Vec<SourceRef> {
        self.hits
            .iter()
            .take(limit)
            .map(|hit| SourceRef {
                segment_id: hit.segment.id,
                score: hit.score,
                preview: normalize_whitespace(&hit.segment.text)
                    .chars()
                    .take(preview_chars)
                    .collect(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub segment_id: u64,
    pub score: f32,
    pub preview: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub query: String,
    pub answer: String,
    pub provider_name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
}

impl ChatTurn {
    pub fn new(
        query: impl Into<String>,
        answer: impl Into<String>,
        provider_name: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
            provider_name: provider_name.into(),
            timestamp: Utc::now(),
            sources: Vec::new(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<SourceRef>) -> Self {
        self.sources = sources;
        self
    }
}

/// Generated answer plus the context it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub provider_name: String,
    pub context: RetrievalResult,
}
