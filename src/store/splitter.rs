//! Recursive character splitting with a sentence window.
//!
//! Text is cut at paragraph, line, then word boundaries (falling back to raw
//! characters) into chunks of at most `chunk_size` characters, consecutive
//! chunks sharing up to `chunk_overlap` characters. Each chunk also records a
//! wider window of the source text under `wider_text`, used when writing the
//! final report.

use std::ops::Range;

use super::types::{Document, Metadata, WIDER_TEXT_KEY};

pub const DEFAULT_CHUNK_SIZE: usize = 1500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;
/// Characters added on each side of a chunk for its `wider_text`.
pub const WINDOW_CHARS: usize = 300;

const SEPARATORS: &[&str] = &["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextChunk {
    pub text: String,
    pub reference: String,
    pub metadata: Metadata,
}

pub fn split_documents(docs: &[Document], settings: SplitSettings) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    for doc in docs {
        for range in split_text(&doc.text, settings) {
            let mut metadata = Metadata::new();
            metadata.insert(
                WIDER_TEXT_KEY.to_string(),
                widen(&doc.text, &range, WINDOW_CHARS).into(),
            );
            chunks.push(TextChunk {
                text: doc.text[range].to_string(),
                reference: doc.reference.clone(),
                metadata,
            });
        }
    }
    chunks
}

/// Byte ranges of the chunks of `text`, trimmed of surrounding whitespace.
pub fn split_text(text: &str, settings: SplitSettings) -> Vec<Range<usize>> {
    let chunk_size = settings.chunk_size.max(1);
    let overlap = settings.chunk_overlap.min(chunk_size.saturating_sub(1));

    let mut atoms = Vec::new();
    atomize(text, 0, SEPARATORS, chunk_size, &mut atoms);
    let lens: Vec<usize> = atoms.iter().map(|r| text[r.clone()].chars().count()).collect();

    let mut ranges = Vec::new();
    let mut i = 0;
    while i < atoms.len() {
        let mut len = 0;
        let mut j = i;
        while j < atoms.len() && (j == i || len + lens[j] <= chunk_size) {
            len += lens[j];
            j += 1;
        }
        if let Some(range) = trim_range(text, atoms[i].start..atoms[j - 1].end) {
            ranges.push(range);
        }
        if j >= atoms.len() {
            break;
        }

        // Step back over trailing atoms that fit in the overlap budget.
        let mut k = j;
        let mut carried = 0;
        while k > i + 1 && carried + lens[k - 1] <= overlap {
            k -= 1;
            carried += lens[k];
        }
        i = k;
    }
    ranges
}

/// Break `text` into contiguous pieces no longer than `chunk_size` characters,
/// keeping each separator attached to the piece before it.
fn atomize(
    text: &str,
    offset: usize,
    separators: &[&str],
    chunk_size: usize,
    out: &mut Vec<Range<usize>>,
) {
    if text.is_empty() {
        return;
    }
    if text.chars().count() <= chunk_size {
        out.push(offset..offset + text.len());
        return;
    }
    match separators.split_first() {
        Some((sep, rest)) => {
            let mut pos = offset;
            for piece in text.split_inclusive(sep) {
                atomize(piece, pos, rest, chunk_size, out);
                pos += piece.len();
            }
        }
        None => {
            let mut start = 0;
            let mut count = 0;
            for (idx, _) in text.char_indices() {
                if count == chunk_size {
                    out.push(offset + start..offset + idx);
                    start = idx;
                    count = 0;
                }
                count += 1;
            }
            out.push(offset + start..offset + text.len());
        }
    }
}

fn trim_range(text: &str, range: Range<usize>) -> Option<Range<usize>> {
    let slice = &text[range.clone()];
    let lead = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let start = range.start + lead;
    Some(start..start + trimmed.len())
}

/// `range` extended by `window` characters on both sides, clamped to the text.
fn widen<'a>(text: &'a str, range: &Range<usize>, window: usize) -> &'a str {
    if window == 0 {
        return &text[range.clone()];
    }
    let start = text[..range.start]
        .char_indices()
        .rev()
        .nth(window - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let end = text[range.end..]
        .char_indices()
        .nth(window)
        .map(|(i, _)| range.end + i)
        .unwrap_or(text.len());
    &text[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(chunk_size: usize, chunk_overlap: usize) -> SplitSettings {
        SplitSettings {
            chunk_size,
            chunk_overlap,
        }
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let docs = vec![Document {
            text: "  Milvus is a vector database.  ".to_string(),
            reference: "intro.md".to_string(),
        }];
        let chunks = split_documents(&docs, SplitSettings::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Milvus is a vector database.");
        assert_eq!(chunks[0].reference, "intro.md");
        assert_eq!(
            chunks[0].metadata[WIDER_TEXT_KEY].as_str().unwrap(),
            "  Milvus is a vector database.  "
        );
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        let text = (0..60)
            .map(|i| format!("word{:02}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let ranges = split_text(&text, settings(50, 14));
        assert!(ranges.len() > 1);
        for r in &ranges {
            assert!(text[r.clone()].chars().count() <= 50);
        }
        // Consecutive chunks overlap and together cover the text.
        for pair in ranges.windows(2) {
            assert!(pair[1].start < pair[0].end);
            assert!(pair[1].start > pair[0].start);
        }
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges.last().unwrap().end, text.len());
    }

    #[test]
    fn test_paragraphs_split_before_words() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));
        let ranges = split_text(&text, settings(40, 0));
        let pieces: Vec<&str> = ranges.iter().map(|r| &text[r.clone()]).collect();
        assert_eq!(pieces, vec!["a".repeat(30), "b".repeat(30)]);
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let text = "é".repeat(25);
        let ranges = split_text(&text, settings(10, 0));
        let lens: Vec<usize> = ranges.iter().map(|r| text[r.clone()].chars().count()).collect();
        assert_eq!(lens, vec![10, 10, 5]);
    }

    #[test]
    fn test_wider_text_window() {
        let text = format!("{}TARGET{}", "x".repeat(400), "y".repeat(400));
        let start = 400;
        let wider = widen(&text, &(start..start + 6), 300);
        assert_eq!(wider.chars().count(), 606);
        assert!(wider.contains("TARGET"));
    }
}
