//! Sentence-aware text chunking

use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::ingestion::pdf::ParsedPdf;
use crate::types::document::Chunk;

/// One split piece: its text plus the byte span of the source text it
/// was drawn from (overlap carried from the previous piece included).
#[derive(Debug, Clone, PartialEq)]
pub struct TextPiece {
    pub content: String,
    pub start: usize,
    pub end: usize,
}

/// Splits page text into overlapping chunks on sentence boundaries.
///
/// Chunks never cross page boundaries so every chunk carries a single
/// page number for source attribution.
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    min_chunk_size: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize, min_chunk_size: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            min_chunk_size,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap, config.min_chunk_size)
    }

    /// Chunk a parsed document. Chunk ids are deterministic per
    /// (document, page, sequence) so re-processing produces identical ids.
    pub fn chunk_document(&self, document_id: &str, parsed: &ParsedPdf) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in &parsed.pages {
            for (seq, piece) in self.split_text(&page.content).into_iter().enumerate() {
                chunks.push(Chunk::with_span(
                    document_id,
                    page.number,
                    seq,
                    piece.content,
                    piece.start,
                    piece.end,
                ));
            }
        }
        chunks
    }

    /// Split one block of text into overlapping pieces
    pub fn split_text(&self, text: &str) -> Vec<TextPiece> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        if trimmed.len() <= self.chunk_size {
            let start = text.len() - text.trim_start().len();
            return vec![TextPiece {
                content: trimmed.to_string(),
                start,
                end: start + trimmed.len(),
            }];
        }

        let mut pieces: Vec<TextPiece> = Vec::new();
        let mut current = String::new();
        let mut span_start = 0;
        let mut span_end = 0;

        let segments = text
            .split_sentence_bound_indices()
            .flat_map(|(offset, sentence)| self.split_oversize(offset, sentence));
        for (offset, sentence) in segments {
            if current.len() + sentence.len() > self.chunk_size && !current.is_empty() {
                pieces.push(TextPiece {
                    content: current.trim().to_string(),
                    start: span_start,
                    end: span_end,
                });
                let overlap = self.overlap_tail(&current);
                span_start = span_end.saturating_sub(overlap.len());
                current = overlap;
            }
            if current.is_empty() {
                span_start = offset;
            } else if !current.ends_with(char::is_whitespace)
                && !sentence.starts_with(char::is_whitespace)
            {
                current.push(' ');
            }
            current.push_str(sentence);
            span_end = offset + sentence.len();
        }

        let tail = current.trim().to_string();
        if !tail.is_empty() {
            // a tiny tail is folded into the previous chunk rather than
            // emitted as a fragment
            match pieces.last_mut() {
                Some(last) if tail.len() < self.min_chunk_size => {
                    last.content = format!("{} {tail}", last.content);
                    last.end = span_end;
                }
                _ => pieces.push(TextPiece {
                    content: tail,
                    start: span_start,
                    end: span_end,
                }),
            }
        }

        pieces
    }

    /// Break a sentence longer than `chunk_size` into word-bounded
    /// fragments so no piece exceeds the size the embedder is
    /// provisioned for. Unbroken runs without spaces are hard-split at
    /// char boundaries.
    fn split_oversize<'a>(&self, offset: usize, sentence: &'a str) -> Vec<(usize, &'a str)> {
        if sentence.len() <= self.chunk_size {
            return vec![(offset, sentence)];
        }
        let mut segments = Vec::new();
        let mut start = 0;
        while sentence.len() - start > self.chunk_size {
            let window = &sentence[start..];
            let mut cut = 0;
            for (i, _) in window.match_indices(' ') {
                if i > 0 && i <= self.chunk_size {
                    cut = i;
                } else if i > self.chunk_size {
                    break;
                }
            }
            if cut == 0 {
                let mut hard = self.chunk_size;
                while hard > 0 && !window.is_char_boundary(hard) {
                    hard -= 1;
                }
                if hard == 0 {
                    hard = self.chunk_size;
                    while hard < window.len() && !window.is_char_boundary(hard) {
                        hard += 1;
                    }
                }
                segments.push((offset + start, &window[..hard]));
                start += hard;
            } else {
                segments.push((offset + start, &window[..cut]));
                start += cut + 1;
            }
        }
        if start < sentence.len() {
            segments.push((offset + start, &sentence[start..]));
        }
        segments
    }

    /// Last `chunk_overlap` characters of a chunk, aligned to a word
    /// boundary, carried into the next chunk for context continuity.
    fn overlap_tail(&self, text: &str) -> String {
        if self.chunk_overlap == 0 || text.len() <= self.chunk_overlap {
            return String::new();
        }
        let mut start = text.len() - self.chunk_overlap;
        while !text.is_char_boundary(start) {
            start += 1;
        }
        match text[start..].find(' ') {
            Some(offset) => text[start + offset + 1..].to_string(),
            None => text[start..].to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::pdf::PageText;

    fn chunker() -> TextChunker {
        TextChunker::new(100, 20, 10)
    }

    #[test]
    fn test_short_text_single_chunk() {
        let pieces = chunker().split_text("One short sentence.");
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].content, "One short sentence.");
        assert_eq!(pieces[0].start, 0);
        assert_eq!(pieces[0].end, "One short sentence.".len());
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunker().split_text("   ").is_empty());
    }

    #[test]
    fn test_long_text_splits_on_sentences() {
        let text = "First sentence about apples and orchards. \
                    Second sentence about pears and harvest time. \
                    Third sentence about plums and autumn weather. \
                    Fourth sentence about cherries in spring.";
        let pieces = chunker().split_text(text);
        assert!(pieces.len() > 1);
        for piece in &pieces {
            // overlap may push a piece slightly past the target
            assert!(
                piece.content.len() <= 100 + 20 + 1,
                "piece too long: {:?}",
                piece.content
            );
        }
        assert!(pieces[0].content.starts_with("First sentence"));
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = "Alpha beta gamma delta epsilon zeta eta theta. \
                    Iota kappa lambda mu nu xi omicron pi rho sigma. \
                    Tau upsilon phi chi psi omega and then some more words.";
        let pieces = TextChunker::new(60, 25, 10).split_text(text);
        assert!(pieces.len() >= 2);
        // the start of each later chunk repeats words from its predecessor
        let first_words: Vec<&str> = pieces[0].content.split_whitespace().collect();
        let second_start = pieces[1].content.split_whitespace().next().unwrap();
        assert!(first_words.contains(&second_start));
    }

    #[test]
    fn test_oversize_sentence_split_on_words() {
        // one sentence, no sentence boundaries, far over the chunk size
        let words = vec!["word"; 80].join(" ");
        let chunker = TextChunker::new(100, 20, 10);
        let pieces = chunker.split_text(&words);
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(
                piece.content.len() <= 100 + 20 + 1,
                "piece too long: {}",
                piece.content.len()
            );
            // word boundaries respected
            assert!(!piece.content.starts_with(' '));
            assert!(!piece.content.ends_with(' '));
        }
        // no words lost
        let total: usize = pieces
            .iter()
            .map(|p| p.content.split_whitespace().count())
            .sum();
        assert!(total >= 80);
    }

    #[test]
    fn test_unbroken_run_hard_split() {
        let run = "x".repeat(350);
        let pieces = TextChunker::new(100, 0, 10).split_text(&run);
        assert!(pieces.len() >= 4);
        for piece in &pieces {
            assert!(piece.content.len() <= 100);
        }
        let total: usize = pieces.iter().map(|p| p.content.len()).sum();
        assert_eq!(total, 350);
    }

    #[test]
    fn test_spans_cover_source_in_order() {
        let text = "First sentence about apples and orchards. \
                    Second sentence about pears and harvest time. \
                    Third sentence about plums and autumn weather. \
                    Fourth sentence about cherries in spring.";
        let pieces = chunker().split_text(text);
        assert_eq!(pieces[0].start, 0);
        assert_eq!(pieces.last().unwrap().end, text.len());
        for pair in pieces.windows(2) {
            // spans advance, with at most the overlap shared
            assert!(pair[1].start >= pair[0].start);
            assert!(pair[1].end > pair[0].end);
        }
    }

    #[test]
    fn test_chunks_stay_within_pages() {
        let parsed = ParsedPdf {
            page_count: 2,
            pages: vec![
                PageText {
                    number: 1,
                    content: "Page one content.".to_string(),
                },
                PageText {
                    number: 2,
                    content: "Page two content.".to_string(),
                },
            ],
        };
        let chunks = chunker().chunk_document("doc1", &parsed);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[1].page, 2);
        assert_eq!(chunks[0].id, "doc1:1:0");
        assert_eq!(chunks[1].id, "doc1:2:0");
    }

    #[test]
    fn test_chunk_ids_deterministic() {
        let parsed = ParsedPdf {
            page_count: 1,
            pages: vec![PageText {
                number: 1,
                content: "Stable content for stable ids.".to_string(),
            }],
        };
        let a = chunker().chunk_document("doc1", &parsed);
        let b = chunker().chunk_document("doc1", &parsed);
        assert_eq!(a, b);
    }
}
