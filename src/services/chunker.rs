//! Word-window chunking with overlap.

use crate::error::ConfigError;
use crate::models::ChunkingConfig;
use crate::utils::has_content;

/// Splits raw text into overlapping windows of whitespace-delimited words.
///
/// Successive windows advance by `chunk_size - overlap` words; the final
/// window may be shorter. Chunking is pure: the same input and parameters
/// always yield the same sequence.
#[derive(Debug, Clone)]
pub struct WordChunker {
    chunk_size: usize,
    stride: usize,
}

impl WordChunker {
    /// Create a chunker, rejecting parameter combinations that cannot make
    /// progress (`overlap >= chunk_size`).
    pub fn new(config: &ChunkingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            chunk_size: config.chunk_size,
            stride: config.chunk_size - config.overlap,
        })
    }

    pub fn from_params(chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        Self::new(&ChunkingConfig {
            chunk_size,
            overlap,
        })
    }

    /// Split `text` into chunk strings. Empty and whitespace-only windows
    /// are dropped; empty input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut chunks = Vec::new();

        let mut start = 0;
        while start < words.len() {
            let end = (start + self.chunk_size).min(words.len());
            let chunk = words[start..end].join(" ");
            if has_content(&chunk) {
                chunks.push(chunk);
            }
            start += self.stride;
        }

        chunks
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_chunks() {
        let chunker = WordChunker::from_params(1000, 200).unwrap();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\t  ").is_empty());
    }

    #[test]
    fn test_small_input_single_chunk() {
        let chunker = WordChunker::from_params(1000, 200).unwrap();
        let chunks = chunker.chunk("hello world");
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn test_overlap_equal_to_chunk_size_rejected() {
        assert!(matches!(
            WordChunker::from_params(100, 100),
            Err(ConfigError::InvalidChunking { .. })
        ));
        assert!(matches!(
            WordChunker::from_params(100, 150),
            Err(ConfigError::InvalidChunking { .. })
        ));
    }

    #[test]
    fn test_thousand_and_one_words_two_chunks() {
        let chunker = WordChunker::from_params(1000, 200).unwrap();
        assert_eq!(chunker.stride(), 800);

        let text = "word ".repeat(1001);
        let chunks = chunker.chunk(&text);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].split_whitespace().count(), 1000);
        assert_eq!(chunks[1].split_whitespace().count(), 201);
    }

    #[test]
    fn test_every_word_is_covered() {
        let chunker = WordChunker::from_params(10, 3).unwrap();
        let words: Vec<String> = (0..57).map(|i| format!("w{i}")).collect();
        let text = words.join(" ");

        let chunks = chunker.chunk(&text);
        let mut seen: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.split_whitespace().map(str::to_string))
            .collect();
        seen.sort();
        seen.dedup();

        let mut expected = words.clone();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_windows_advance_by_stride() {
        let chunker = WordChunker::from_params(4, 2).unwrap();
        let text = "a b c d e f g h";
        let chunks = chunker.chunk(&text);
        assert_eq!(
            chunks,
            vec![
                "a b c d".to_string(),
                "c d e f".to_string(),
                "e f g h".to_string(),
                "g h".to_string(),
            ]
        );
    }

    #[test]
    fn test_chunking_is_pure() {
        let chunker = WordChunker::from_params(5, 1).unwrap();
        let text = "the quick brown fox jumps over the lazy dog";
        assert_eq!(chunker.chunk(text), chunker.chunk(text));
    }
}
