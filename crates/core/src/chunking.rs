use crate::config::{ChunkConfig, ChunkUnit};
use crate::error::{RagError, Result};
use crate::models::Segment;
use regex::Regex;
use std::ops::Range;

const TOKEN_PATTERN: &str = r"\s*\S+\s*";

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Splits `text` into overlapping windows of `chunk_size` units, advancing by
/// `chunk_size - overlap` units per step. The last window may be shorter.
pub fn chunk(text: &str, config: &ChunkConfig) -> Result<Vec<Segment>> {
    config.validate()?;

    if text.is_empty() {
        return Ok(Vec::new());
    }

    let units = match config.unit {
        ChunkUnit::Characters => character_units(text),
        ChunkUnit::Tokens => token_units(text)?,
    };
    let char_starts = char_offsets(text, &units);

    let mut segments = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + config.chunk_size).min(units.len());
        let bytes = units[start].start..units[end - 1].end;
        let piece = &text[bytes];

        segments.push(Segment {
            id: segments.len() as u64,
            text: piece.to_string(),
            source_offset: char_starts[start],
            length: piece.chars().count(),
        });

        if end == units.len() {
            break;
        }
        start += config.stride();
    }

    Ok(segments)
}

fn character_units(text: &str) -> Vec<Range<usize>> {
    text.char_indices()
        .map(|(offset, ch)| offset..offset + ch.len_utf8())
        .collect()
}

fn token_units(text: &str) -> Result<Vec<Range<usize>>> {
    let token = Regex::new(TOKEN_PATTERN)
        .map_err(|error| RagError::Configuration(format!("token pattern: {error}")))?;

    let units: Vec<Range<usize>> = token.find_iter(text).map(|m| m.range()).collect();
    if units.is_empty() {
        // whitespace-only input still has to round-trip
        return Ok(vec![0..text.len()]);
    }
    Ok(units)
}

fn char_offsets(text: &str, units: &[Range<usize>]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(units.len());
    let mut chars_before = 0;
    let mut byte_cursor = 0;
    for unit in units {
        chars_before += text[byte_cursor..unit.start].chars().count();
        offsets.push(chars_before);
        byte_cursor = unit.start;
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reconstruct(segments: &[Segment]) -> String {
        let mut text = String::new();
        let mut covered: usize = 0;
        for segment in segments {
            let skip = covered.saturating_sub(segment.source_offset);
            text.extend(segment.text.chars().skip(skip));
            covered = segment.source_offset + segment.length;
        }
        text
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
    }

    #[test]
    fn empty_text_yields_no_segments() {
        let segments = chunk("", &ChunkConfig::new(20, 5)).expect("valid config");
        assert!(segments.is_empty());
    }

    #[test]
    fn short_text_yields_single_segment() {
        let segments = chunk("tiny", &ChunkConfig::new(20, 5)).expect("valid config");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "tiny");
        assert_eq!(segments[0].source_offset, 0);
        assert_eq!(segments[0].length, 4);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = chunk("some text", &ChunkConfig::new(5, 5));
        assert!(matches!(result, Err(RagError::Configuration(_))));
        let result = chunk("some text", &ChunkConfig::new(0, 0));
        assert!(matches!(result, Err(RagError::Configuration(_))));
    }

    #[test]
    fn sky_and_grass_split_into_two_overlapping_segments() {
        let text = "The sky is blue. Grass is green.";
        let segments = chunk(text, &ChunkConfig::new(20, 5)).expect("valid config");

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "The sky is blue. Gra");
        assert_eq!(segments[1].source_offset, 15);
        assert_eq!(segments[1].text, ". Grass is green.");
        assert_eq!(reconstruct(&segments), text);
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        let text = "héllo wörld ünïcode";
        let segments = chunk(text, &ChunkConfig::new(6, 2)).expect("valid config");
        assert_eq!(segments[1].source_offset, 4);
        assert_eq!(segments[1].text, "o wörl");
        assert_eq!(reconstruct(&segments), text);
    }

    #[test]
    fn token_windows_keep_trailing_whitespace() {
        let config = ChunkConfig {
            chunk_size: 3,
            overlap: 1,
            unit: ChunkUnit::Tokens,
        };
        let text = "  one two  three four\nfive";
        let segments = chunk(text, &config).expect("valid config");

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "  one two  three ");
        assert_eq!(segments[1].text, "three four\nfive");
        assert_eq!(reconstruct(&segments), text);
    }

    #[test]
    fn whitespace_only_text_survives_token_mode() {
        let config = ChunkConfig {
            chunk_size: 4,
            overlap: 0,
            unit: ChunkUnit::Tokens,
        };
        let segments = chunk(" \n\t ", &config).expect("valid config");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, " \n\t ");
    }

    proptest! {
        #[test]
        fn segment_count_and_reconstruction_hold(
            text in "[a-zA-Z .,\n]{0,300}",
            chunk_size in 1usize..40,
            overlap_seed in 0usize..40,
        ) {
            let overlap = overlap_seed % chunk_size;
            let segments = chunk(&text, &ChunkConfig::new(chunk_size, overlap)).unwrap();
            let length = text.chars().count();

            if length > overlap {
                let stride = chunk_size - overlap;
                let expected = (length - overlap).div_ceil(stride);
                prop_assert_eq!(segments.len(), expected);
            }
            prop_assert!(segments.iter().all(|segment| segment.length <= chunk_size));
            prop_assert_eq!(reconstruct(&segments), text);
        }

        #[test]
        fn token_mode_reconstructs_text(
            text in "[a-z \n]{0,200}",
            chunk_size in 1usize..12,
            overlap_seed in 0usize..12,
        ) {
            let config = ChunkConfig {
                chunk_size,
                overlap: overlap_seed % chunk_size,
                unit: ChunkUnit::Tokens,
            };
            let segments = chunk(&text, &config).unwrap();
            prop_assert_eq!(reconstruct(&segments), text);
        }
    }
}
