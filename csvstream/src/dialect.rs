// SPDX-License-Identifier: Apache-2.0

use crate::defaults::DEFAULT_CHUNK_SIZE;
use crate::{CsvError, Result};

/// Lexical settings shared by every cell scanner of a document.
///
/// Built with consuming setters and validated when a reader is constructed:
///
/// ```rust
/// use csvstream::{CellReader, Dialect};
///
/// let dialect = Dialect::default().separator(';').quote('\'');
/// let mut cells = CellReader::from_slice(b"'a;b';c", dialect).unwrap();
/// assert_eq!(cells.read_cell().unwrap().as_deref(), Some("a;b"));
/// assert_eq!(cells.read_cell().unwrap().as_deref(), Some("c"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    separator: char,
    quote: char,
    newline: Option<String>,
    chunk_size: usize,
    trim: bool,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            separator: ',',
            quote: '"',
            newline: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            trim: false,
        }
    }
}

impl Dialect {
    /// Field separator. Must be a single ASCII character.
    pub fn separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Quote character, which also escapes itself when doubled.
    pub fn quote(mut self, quote: char) -> Self {
        self.quote = quote;
        self
    }

    /// Literal line terminator. Without one, any run of CR and LF ends a row.
    pub fn newline(mut self, newline: impl Into<String>) -> Self {
        self.newline = Some(newline.into());
        self
    }

    /// Upper bound (give or take a UTF-8 sequence) on streamed cell pieces.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Strip surrounding whitespace from materialized cell values.
    pub fn trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    pub(crate) fn compile(&self) -> Result<Syntax> {
        let separator = single_byte(self.separator)
            .ok_or(CsvError::Config("separator must be a single ASCII character"))?;
        let quote = single_byte(self.quote)
            .ok_or(CsvError::Config("quote must be a single ASCII character"))?;
        if separator == quote {
            return Err(CsvError::Config("separator and quote must differ"));
        }
        if self.chunk_size == 0 {
            return Err(CsvError::Config("chunk size must be greater than zero"));
        }

        let newline = match self.newline.as_deref() {
            None => None,
            Some("") => return Err(CsvError::Config("newline must not be empty")),
            Some(text) if text.as_bytes().contains(&separator) => {
                return Err(CsvError::Config("newline must not contain the separator"));
            }
            Some(text) if text.as_bytes().contains(&quote) => {
                return Err(CsvError::Config("newline must not contain the quote"));
            }
            Some(text) => Some(text.as_bytes().into()),
        };

        Ok(Syntax {
            separator,
            quote,
            newline,
            chunk_size: self.chunk_size,
            trim: self.trim,
        })
    }
}

fn single_byte(c: char) -> Option<u8> {
    u8::try_from(c).ok().filter(u8::is_ascii)
}

/// Validated byte-level form of a [`Dialect`].
#[derive(Debug, Clone)]
pub(crate) struct Syntax {
    pub separator: u8,
    pub quote: u8,
    /// `None` selects the CR/LF run terminator
    pub newline: Option<Box<[u8]>>,
    pub chunk_size: usize,
    pub trim: bool,
}

impl Syntax {
    /// Decode materialized cell bytes, trimming when configured.
    pub fn decode(&self, bytes: Vec<u8>) -> Result<String> {
        let text = String::from_utf8(bytes)?;
        if self.trim {
            Ok(text.trim().to_owned())
        } else {
            Ok(text)
        }
    }
}
