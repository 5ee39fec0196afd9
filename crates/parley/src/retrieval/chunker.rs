/// Splits raw document text into retrieval units.
///
/// Implementations must be deterministic and must never drop non-empty content.
pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str) -> Vec<String>;
}

pub const DEFAULT_DELIMITER: char = '\n';

/// Splits on a single delimiter character, trims each part, drops the
/// parts left empty and lowercases the rest.
#[derive(Debug, Clone)]
pub struct DelimiterChunker {
    delimiter: char,
}

impl DelimiterChunker {
    pub fn new(delimiter: char) -> Self {
        Self { delimiter }
    }
}

impl Default for DelimiterChunker {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl Chunker for DelimiterChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        text.split(self.delimiter)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_drops_empty_and_lowercases() {
        let chunker = DelimiterChunker::default();
        let chunks = chunker.chunk("Rust Is Fast\n\n  \nTokio Runs Tasks\r\nlast line");
        assert_eq!(chunks, vec!["rust is fast", "tokio runs tasks", "last line"]);
    }

    #[test]
    fn test_custom_delimiter_is_deterministic() {
        let chunker = DelimiterChunker::new('.');
        let text = "First sentence. Second one.. Third";
        assert_eq!(chunker.chunk(text), chunker.chunk(text));
        assert_eq!(
            chunker.chunk(text),
            vec!["first sentence", "second one", "third"]
        );
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(DelimiterChunker::default().chunk("").is_empty());
        assert!(DelimiterChunker::default().chunk("\n \n").is_empty());
    }
}
