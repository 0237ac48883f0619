//! Whitespace tokenizer producing the full, indexable token sequence that the
//! workers partition.

use simple_error::try_with;
use std::borrow::Borrow;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use crate::config::MAX_TOKEN_LEN;
use crate::result::Result;

/// An immutable token of at most [`MAX_TOKEN_LEN`] bytes, compared byte by byte.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(Arc<[u8]>);

impl Token {
    pub fn new(bytes: &[u8]) -> Token {
        let len = bytes.len().min(MAX_TOKEN_LEN);
        Token(Arc::from(&bytes[..len]))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Token {
        Token::new(s.as_bytes())
    }
}

impl Deref for Token {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl Borrow<[u8]> for Token {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(&self.0))
    }
}

// same set as C isspace() in the "C" locale
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// The tokenized input. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    tokens: Vec<Token>,
}

impl Corpus {
    pub fn read(path: &Path) -> Result<Corpus> {
        let f = try_with!(File::open(path), "failed to open {}", path.display());
        let corpus = try_with!(
            Corpus::from_reader(BufReader::new(f)),
            "failed to read {}",
            path.display()
        );
        Ok(corpus)
    }

    pub fn from_reader<R: Read>(mut reader: R) -> std::io::Result<Corpus> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Corpus::from_bytes(&data))
    }

    pub fn from_bytes(data: &[u8]) -> Corpus {
        let tokens = data
            .split(|b| is_space(*b))
            .filter(|word| !word.is_empty())
            .map(Token::new)
            .collect();
        Corpus { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

impl<T: Into<Token>> std::iter::FromIterator<T> for Corpus {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Corpus {
        Corpus {
            tokens: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn splits_on_c_whitespace() {
        let corpus = Corpus::from_bytes(b"  the\tcat\x0bsat\x0con\r\nthe  mat \n");
        let words: Vec<String> = corpus.tokens().iter().map(|t| t.to_string()).collect();
        assert_eq!(words, vec!["the", "cat", "sat", "on", "the", "mat"]);
    }

    #[test]
    fn empty_input() {
        assert!(Corpus::from_bytes(b"").is_empty());
        assert!(Corpus::from_bytes(b" \n\t ").is_empty());
    }

    #[test]
    fn long_tokens_are_truncated() {
        let long = "x".repeat(100);
        let corpus = Corpus::from_bytes(long.as_bytes());
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.tokens()[0].len(), MAX_TOKEN_LEN);

        // two long tokens sharing the first 59 bytes collapse into one
        let a = Token::new(format!("{}a", "y".repeat(MAX_TOKEN_LEN)).as_bytes());
        let b = Token::new(format!("{}b", "y".repeat(MAX_TOKEN_LEN)).as_bytes());
        assert_eq!(a, b);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_ne!(Token::from("The"), Token::from("the"));
    }

    #[test]
    fn read_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "alpha beta\ngamma").unwrap();
        let corpus = Corpus::read(file.path()).unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.tokens()[2], Token::from("gamma"));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Corpus::read(&dir.path().join("missing.txt")).is_err());
    }
}
