use crate::config::validate_top_k;
use crate::error::{RagError, Result};
use crate::models::{IndexEntry, RetrievalResult, ScoredSegment, Segment, Vector};
use std::cmp::Ordering;

/// Immutable exact-search index over segment vectors.
///
/// Vectors are L2-normalized at build time so cosine similarity reduces to a
/// dot product. Zero vectors stay zero and score 0 against everything.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Fails when entries disagree on dimension. An empty index has the
    /// dimension `empty_dimensions`.
    pub fn build(entries: Vec<(Segment, Vector)>, empty_dimensions: usize) -> Result<Self> {
        let dimensions = entries
            .first()
            .map(|(_, vector)| vector.len())
            .unwrap_or(empty_dimensions);

        let mut indexed = Vec::with_capacity(entries.len());
        for (segment, vector) in entries {
            if vector.len() != dimensions {
                return Err(RagError::Configuration(format!(
                    "segment {} has dimension {}, index expects {dimensions}",
                    segment.id,
                    vector.len()
                )));
            }
            indexed.push(IndexEntry {
                segment,
                vector: normalized(vector),
            });
        }

        Ok(Self {
            dimensions,
            entries: indexed,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.entries.iter().map(|entry| &entry.segment)
    }

    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<RetrievalResult> {
        validate_top_k(k)?;
        if query_vector.len() != self.dimensions {
            return Err(RagError::Configuration(format!(
                "query vector dimension {} does not match index dimension {}",
                query_vector.len(),
                self.dimensions
            )));
        }
        if self.entries.is_empty() {
            return Ok(RetrievalResult::default());
        }

        let query = normalized(query_vector.to_vec());
        let mut scored: Vec<ScoredSegment> = self
            .entries
            .iter()
            .map(|entry| ScoredSegment {
                segment: entry.segment.clone(),
                score: dot(&entry.vector, &query),
            })
            .collect();

        scored.sort_by(|left, right| {
            right
                .score
                .partial_cmp(&left.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| left.segment.id.cmp(&right.segment.id))
        });
        scored.truncate(k);

        Ok(RetrievalResult { hits: scored })
    }
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

fn normalized(mut vector: Vector) -> Vector {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 && magnitude.is_finite() {
        for value in &mut vector {
            *value /= magnitude;
        }
    }
    vector
}
