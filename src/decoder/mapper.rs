//! Label-to-text mapping.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::{DecodeError, ErrorContext, Result};
use crate::types::{Label, LabelBatch};

/// Class alphabet: character `i` is the text of class `i`.
///
/// The blank is not part of the alphabet; its label is `len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    symbols: Vec<char>,
}

impl Alphabet {
    /// Build an alphabet from the characters of `chars`, in order.
    pub fn new(chars: &str) -> Result<Self> {
        let symbols: Vec<char> = chars.chars().collect();
        if symbols.is_empty() {
            return Err(DecodeError::InvalidInput(
                "alphabet must contain at least one class".to_string(),
            ));
        }
        Ok(Self { symbols })
    }

    /// Load an alphabet from a file holding the characters on one line.
    ///
    /// A single trailing newline is dropped; every other character, spaces
    /// included, is a class.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("reading alphabet {:?}", path))?;
        let line = content
            .strip_suffix("\r\n")
            .or_else(|| content.strip_suffix('\n'))
            .unwrap_or(content.as_str());

        let alphabet = Self::new(line)?;
        debug!("Loaded alphabet with {} classes", alphabet.len());
        Ok(alphabet)
    }

    /// Number of classes, excluding the blank.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false; an alphabet has at least one class.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The blank label for this alphabet.
    pub fn blank(&self) -> Label {
        self.symbols.len() as Label
    }

    /// Character of a non-blank label.
    pub fn symbol(&self, label: Label) -> Option<char> {
        usize::try_from(label)
            .ok()
            .and_then(|i| self.symbols.get(i))
            .copied()
    }

    /// Map one blank-terminated row to text.
    pub fn decode_row(&self, row: &[Label]) -> Result<String> {
        let blank = self.blank();
        let mut text = String::with_capacity(row.len());

        for &label in row {
            if label == blank {
                break;
            }
            let symbol = self.symbol(label).ok_or_else(|| {
                DecodeError::InvalidInput(format!(
                    "label {} outside alphabet of {} classes",
                    label,
                    self.len()
                ))
            })?;
            text.push(symbol);
        }

        Ok(text)
    }
}

impl FromStr for Alphabet {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Map every row of `labels` to text, in batch order.
///
/// The alphabet must have exactly as many classes as the decoder that
/// produced `labels`, so both agree on the blank.
pub fn decode_to_text(labels: &LabelBatch<'_>, alphabet: &Alphabet) -> Result<Vec<String>> {
    if labels.blank() != alphabet.blank() {
        return Err(DecodeError::InvalidInput(format!(
            "alphabet has {} classes but labels use blank {}",
            alphabet.len(),
            labels.blank()
        )));
    }

    labels.rows().map(|row| alphabet.decode_row(row)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_decode_row_stops_at_blank() {
        let alphabet = Alphabet::new("ab").unwrap();
        assert_eq!(alphabet.blank(), 2);
        assert_eq!(alphabet.decode_row(&[0, 1, 2, 0]).unwrap(), "ab");
        assert_eq!(alphabet.decode_row(&[2, 0, 1]).unwrap(), "");
        assert_eq!(alphabet.decode_row(&[1, 0]).unwrap(), "ba");
    }

    #[test]
    fn test_decode_row_rejects_out_of_range() {
        let alphabet = Alphabet::new("ab").unwrap();
        assert!(alphabet.decode_row(&[0, 3, 2]).is_err());
        assert!(alphabet.decode_row(&[-1]).is_err());
        // Garbage after the blank is padding and never inspected.
        assert_eq!(alphabet.decode_row(&[1, 2, 7]).unwrap(), "b");
    }

    #[test]
    fn test_multibyte_symbols() {
        let alphabet: Alphabet = "äö ".parse().unwrap();
        assert_eq!(alphabet.len(), 3);
        assert_eq!(alphabet.decode_row(&[1, 2, 0, 3]).unwrap(), "ö ä");
    }

    #[test]
    fn test_empty_alphabet_rejected() {
        assert!(Alphabet::new("").is_err());
    }

    #[test]
    fn test_decode_to_text_batch_order() {
        let labels = vec![0, 1, 2, 2, 0, 2, 2, 2];
        let batch = LabelBatch::new(&labels, 4, 2).unwrap();
        let alphabet = Alphabet::new("ab").unwrap();

        let text = decode_to_text(&batch, &alphabet).unwrap();
        assert_eq!(text, vec!["ab".to_string(), "a".to_string()]);

        // Each string is no longer than the labels before the first blank.
        for (b, s) in text.iter().enumerate() {
            assert!(s.chars().count() <= batch.labeling(b).unwrap().len());
        }
    }

    #[test]
    fn test_decode_to_text_requires_matching_alphabet() {
        let labels = vec![0, 1, 2];
        let batch = LabelBatch::new(&labels, 3, 2).unwrap();
        let alphabet = Alphabet::new("abc").unwrap();
        assert!(matches!(
            decode_to_text(&batch, &alphabet),
            Err(DecodeError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, " !abc").unwrap();

        let alphabet = Alphabet::load_from_file(file.path()).unwrap();
        assert_eq!(alphabet.len(), 5);
        assert_eq!(alphabet.symbol(0), Some(' '));
        assert_eq!(alphabet.symbol(4), Some('c'));
        assert_eq!(alphabet.symbol(5), None);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Alphabet::load_from_file(dir.path().join("missing.txt")).unwrap_err();
        assert!(err.to_string().contains("reading alphabet"));
    }
}
