use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::chunk::Chunk;
use crate::document::Document;

/// Window sizes are counted in whitespace-delimited words.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        // overlap must leave room for progress
        let chunk_size = config.chunk_size.max(1);
        let chunk_overlap = config.chunk_overlap.min(chunk_size - 1);
        Self {
            config: ChunkerConfig {
                chunk_size,
                chunk_overlap,
            },
        }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split a document into overlapping chunks, in document order.
    ///
    /// The returned iterator is lazy; calling `split` again on the same
    /// document yields the same sequence.
    pub fn split<'a>(&self, document: &'a Document) -> Chunks<'a> {
        let words = word_spans(&document.text);
        let ends_sentence = sentence_ends(&document.text, &words);

        Chunks {
            document,
            config: self.config,
            words,
            ends_sentence,
            next_word: 0,
            next_index: 0,
        }
    }
}

/// Iterator over the chunks of one document. See [`Chunker::split`].
pub struct Chunks<'a> {
    document: &'a Document,
    config: ChunkerConfig,
    words: Vec<(usize, usize)>,
    ends_sentence: Vec<bool>,
    next_word: usize,
    next_index: usize,
}

impl Chunks<'_> {
    /// Exclusive word index where the window starting at `start` is cut
    fn cut_point(&self, start: usize) -> usize {
        let size = self.config.chunk_size;
        let limit = (start + size).min(self.words.len());
        if limit == self.words.len() {
            return limit;
        }

        // Prefer a sentence boundary in the second half of the window
        let floor = start + size / 2;
        (floor..limit)
            .rev()
            .find(|&i| self.ends_sentence[i])
            .map(|i| i + 1)
            .unwrap_or(limit)
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let start = self.next_word;
        if start >= self.words.len() {
            return None;
        }

        let end = self.cut_point(start);
        let span = (self.words[start].0, self.words[end - 1].1);

        self.next_word = if end >= self.words.len() {
            end
        } else {
            end.saturating_sub(self.config.chunk_overlap).max(start + 1)
        };

        let chunk = Chunk::new(
            self.next_index,
            self.document.id.clone(),
            self.document.text[span.0..span.1].to_string(),
            self.document.source.clone(),
            span,
        );
        self.next_index += 1;
        Some(chunk)
    }
}

/// Byte spans of whitespace-delimited words
fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut current: Option<usize> = None;

    for (idx, ch) in text.char_indices() {
        match (ch.is_whitespace(), current) {
            (true, Some(begin)) => {
                spans.push((begin, idx));
                current = None;
            }
            (false, None) => current = Some(idx),
            _ => {}
        }
    }
    if let Some(begin) = current {
        spans.push((begin, text.len()));
    }

    spans
}

/// For each word, whether a sentence ends with it
fn sentence_ends(text: &str, words: &[(usize, usize)]) -> Vec<bool> {
    let mut boundaries: Vec<usize> = text
        .split_sentence_bound_indices()
        .map(|(offset, sentence)| offset + sentence.trim_end().len())
        .collect();
    boundaries.sort_unstable();

    words
        .iter()
        .map(|&(_, end)| boundaries.binary_search(&end).is_ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("test.txt", text)
    }

    fn small(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            chunk_size: size,
            chunk_overlap: overlap,
        })
    }

    #[test]
    fn test_basic_chunking() {
        let chunker = Chunker::new(ChunkerConfig::default());
        let document = doc("This is a test paragraph.\n\nThis is another paragraph.");
        let chunks: Vec<_> = chunker.split(&document).collect();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].doc_id, document.id);
        assert_eq!(chunks[0].text, document.text);
        assert_eq!(chunks[0].char_span, (0, document.text.len()));
    }

    #[test]
    fn empty_document_yields_nothing() {
        let chunker = Chunker::new(ChunkerConfig::default());
        assert_eq!(chunker.split(&doc("")).count(), 0);
        assert_eq!(chunker.split(&doc("  \n\t ")).count(), 0);
    }

    #[test]
    fn windows_overlap_by_whole_words() {
        let text = (1..=10).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let document = doc(&text);
        let chunks: Vec<_> = small(4, 1).split(&document).collect();

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["w1 w2 w3 w4", "w4 w5 w6 w7", "w7 w8 w9 w10"]);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(&document.text[chunk.char_span.0..chunk.char_span.1], chunk.text);
        }
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let document = doc("Alpha beta gamma. Delta epsilon zeta eta theta.");
        let chunks: Vec<_> = small(5, 0).split(&document).collect();

        assert_eq!(chunks[0].text, "Alpha beta gamma.");
        assert_eq!(chunks[1].text, "Delta epsilon zeta eta theta.");
    }

    #[test]
    fn split_is_restartable_and_deterministic() {
        let text = "One two three. Four five six. Seven eight nine ten eleven.";
        let document = doc(text);
        let chunker = small(3, 1);

        let first: Vec<_> = chunker.split(&document).collect();
        let second: Vec<_> = chunker.split(&document).collect();
        assert_eq!(first, second);
        assert!(first.len() > 1);
    }

    #[test]
    fn overlap_is_clamped_below_chunk_size() {
        let chunker = small(2, 5);
        assert_eq!(chunker.config().chunk_overlap, 1);

        let document = doc("a b c d");
        let chunks: Vec<_> = chunker.split(&document).collect();
        assert_eq!(chunks.last().map(|c| c.text.as_str()), Some("c d"));
    }

    #[test]
    fn handles_multibyte_text() {
        let document = doc("Curie découvrit le radium à Paris.");
        let chunks: Vec<_> = small(3, 1).split(&document).collect();

        for chunk in &chunks {
            assert_eq!(&document.text[chunk.char_span.0..chunk.char_span.1], chunk.text);
        }
        assert!(chunks.last().is_some_and(|c| c.text.ends_with("Paris.")));
    }
}
