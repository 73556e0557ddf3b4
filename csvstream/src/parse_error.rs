// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Errors that can occur while tokenizing or encoding CSV.
///
/// Running out of buffered bytes is not an error: scanners report it as
/// [`Step::NeedMoreInput`](crate::Step::NeedMoreInput) and the retry driver
/// absorbs it. Everything here is reported exactly once, at the point of
/// detection.
#[derive(Debug, Error)]
pub enum CsvError {
    /// A token was requested but the source is exhausted and nothing is buffered.
    #[error("no more data to read")]
    EndOfInput,
    /// Retaining the current attempt would grow the buffer beyond its cap.
    #[error("buffer size {size} exceeds the maximum of {max} bytes")]
    BufferSizeExceeded { size: usize, max: usize },
    /// A row has more cells than headers while strict columns are enforced.
    #[error("extra cells found{} but strict columns are enforced", in_row(*.row))]
    TooManyColumns { row: Option<usize> },
    /// A row has fewer cells than headers while strict columns are enforced.
    #[error("not enough cells{} to match headers with strict columns enforced", in_row(*.row))]
    TooFewColumns { row: Option<usize> },
    /// Conflicting or invalid configuration, detected before any byte is read.
    #[error("invalid configuration: {0}")]
    Config(&'static str),
    /// The scanner reached a state it should never be in.
    #[error("invariant violation: {0}")]
    Invariant(&'static str),
    /// Decoded cell bytes are not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(#[from] core::str::Utf8Error),
    /// The upstream chunk source failed (not end of stream).
    #[error("reader error: {0}")]
    Reader(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// `read()` was called on a token already consumed by streaming or skipping.
    #[error("token already consumed")]
    TokenConsumed,
    /// Writing encoded output failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn in_row(row: Option<usize>) -> String {
    match row {
        Some(row) => format!(" in row {row}"),
        None => String::new(),
    }
}

impl From<std::string::FromUtf8Error> for CsvError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        CsvError::InvalidUtf8(err.utf8_error())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, CsvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_errors_name_the_row() {
        let err = CsvError::TooManyColumns { row: Some(2) };
        assert_eq!(
            err.to_string(),
            "extra cells found in row 2 but strict columns are enforced"
        );

        let err = CsvError::TooFewColumns { row: Some(7) };
        assert_eq!(
            err.to_string(),
            "not enough cells in row 7 to match headers with strict columns enforced"
        );
    }

    #[test]
    fn test_column_errors_without_row() {
        let err = CsvError::TooFewColumns { row: None };
        assert_eq!(
            err.to_string(),
            "not enough cells to match headers with strict columns enforced"
        );
    }

    #[test]
    fn test_utf8_error_conversion() {
        // Lone continuation byte, built at runtime to avoid a literal warning
        let mut invalid = [0u8; 1];
        invalid[0] = 0b1000_0000;

        match String::from_utf8(invalid.to_vec()) {
            Err(utf8_error) => {
                let err: CsvError = utf8_error.into();
                assert!(matches!(err, CsvError::InvalidUtf8(_)));
            }
            Ok(_) => panic!("Expected UTF-8 validation to fail"),
        }
    }
}
