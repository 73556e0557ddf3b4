// SPDX-License-Identifier: Apache-2.0

//! Chunk sources feeding the tokenizer.
//!
//! The tokenizer pulls input through the [`Reader`] trait, one [`Chunk`] at a
//! time, and only when the bytes already buffered are not enough to finish
//! the current token. This module provides the readers that cover common
//! cases:
//!
//! - [`ChunkReader`]: an in-memory slice, delivered whole or in fixed-size
//!   chunks (handy to simulate network packets in tests).
//! - [`IterReader`]: any iterator of chunk-like items (`&str`, `String`,
//!   `u8`, `Vec<u8>`, `&[u8]`), delivered in iteration order.
//! - [`IoReader`]: any [`std::io::Read`], such as a file or socket.
//!
//! # Examples
//!
//! ```rust
//! use csvstream::{ChunkReader, CsvReader, ReaderOptions};
//!
//! let csv = b"name,age\nAlice,30\nBob,25";
//! // Simulate reading only 4 bytes at a time
//! let reader = ChunkReader::new(csv, 4);
//! let mut parser = CsvReader::new(reader, ReaderOptions::default()).unwrap();
//!
//! while let Some(record) = parser.next_record().unwrap() {
//!     println!("{record:?}");
//! }
//! ```

use std::borrow::Cow;
use std::marker::PhantomData;

/// Trait for input sources that deliver data to the tokenizer in chunks.
pub trait Reader {
    /// The error type returned by pull operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Pull the next chunk of input.
    ///
    /// # Contract
    /// - `Ok(None)` **MUST** indicate true end of stream
    /// - Implementations **MUST NOT** return `Ok(None)` unless no more data
    ///   will ever be available
    /// - Empty chunks are allowed and simply cause another pull
    fn next_chunk(&mut self) -> Result<Option<Chunk<'_>>, Self::Error>;
}

/// One delivery from a [`Reader`].
///
/// Text and byte arrays are appended to the buffer byte for byte; a single
/// byte is appended as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk<'a> {
    Text(Cow<'a, str>),
    Byte(u8),
    Bytes(Cow<'a, [u8]>),
}

impl Chunk<'_> {
    /// The raw bytes of this chunk.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Chunk::Text(text) => text.as_bytes(),
            Chunk::Byte(byte) => core::slice::from_ref(byte),
            Chunk::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> From<&'a str> for Chunk<'a> {
    fn from(text: &'a str) -> Self {
        Chunk::Text(Cow::Borrowed(text))
    }
}

impl From<String> for Chunk<'_> {
    fn from(text: String) -> Self {
        Chunk::Text(Cow::Owned(text))
    }
}

impl From<u8> for Chunk<'_> {
    fn from(byte: u8) -> Self {
        Chunk::Byte(byte)
    }
}

impl<'a> From<&'a [u8]> for Chunk<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Chunk::Bytes(Cow::Borrowed(bytes))
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Chunk<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Chunk::Bytes(Cow::Borrowed(bytes.as_slice()))
    }
}

impl From<Vec<u8>> for Chunk<'_> {
    fn from(bytes: Vec<u8>) -> Self {
        Chunk::Bytes(Cow::Owned(bytes))
    }
}

/// A [`Reader`] that delivers a byte slice, optionally in fixed-size chunks.
///
/// 1.  **Full slice**: [`ChunkReader::full_slice()`] hands over the whole slice
///     in a single chunk.
/// 2.  **Chunked**: [`ChunkReader::new()`] limits each chunk to `chunk_size`
///     bytes. This is useful to simulate streaming and to stress the
///     tokenizer's checkpoint and retry logic.
#[derive(Debug)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
    chunk_size: usize,
}

impl<'a> ChunkReader<'a> {
    /// Create a reader that returns at most `chunk_size` bytes per pull
    /// (minimum 1).
    pub fn new(data: &'a [u8], chunk_size: usize) -> Self {
        Self {
            data,
            pos: 0,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Create a reader that delivers the entire slice in one chunk.
    pub fn full_slice(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            chunk_size: usize::MAX,
        }
    }
}

impl Reader for ChunkReader<'_> {
    type Error = core::convert::Infallible;

    fn next_chunk(&mut self) -> Result<Option<Chunk<'_>>, Self::Error> {
        let remaining = self.data.get(self.pos..).unwrap_or_default();
        if remaining.is_empty() {
            return Ok(None);
        }

        let to_copy = remaining.len().min(self.chunk_size);
        let chunk = remaining.get(..to_copy).unwrap_or_default();
        self.pos = self.pos.saturating_add(to_copy);
        Ok(Some(Chunk::Bytes(Cow::Borrowed(chunk))))
    }
}

/// A [`Reader`] over an iterator of chunk-like items.
///
/// ```rust
/// use csvstream::{CsvReader, IterReader, ReaderOptions};
///
/// let parts = ["name,age<E", "OL>Alice,3", "0<EOL>Bob,", "25"];
/// let options = ReaderOptions::default().newline("<EOL>");
/// let mut parser = CsvReader::new(IterReader::new(parts), options).unwrap();
/// assert_eq!(parser.records().count(), 2);
/// ```
#[derive(Debug)]
pub struct IterReader<'a, I> {
    iter: I,
    _chunks: PhantomData<Chunk<'a>>,
}

impl<'a, I> IterReader<'a, I>
where
    I: Iterator,
    I::Item: Into<Chunk<'a>>,
{
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter(),
            _chunks: PhantomData,
        }
    }
}

impl<'a, I> Reader for IterReader<'a, I>
where
    I: Iterator,
    I::Item: Into<Chunk<'a>>,
{
    type Error = core::convert::Infallible;

    fn next_chunk(&mut self) -> Result<Option<Chunk<'_>>, Self::Error> {
        Ok(self.iter.next().map(Into::into))
    }
}

/// A [`Reader`] over any [`std::io::Read`], pulling up to `read_size` bytes at
/// a time.
#[derive(Debug)]
pub struct IoReader<R> {
    inner: R,
    scratch: Vec<u8>,
}

impl<R: std::io::Read> IoReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_read_size(inner, crate::defaults::DEFAULT_READ_SIZE)
    }

    pub fn with_read_size(inner: R, read_size: usize) -> Self {
        Self {
            inner,
            scratch: vec![0; read_size.max(1)],
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: std::io::Read> Reader for IoReader<R> {
    type Error = std::io::Error;

    fn next_chunk(&mut self) -> Result<Option<Chunk<'_>>, Self::Error> {
        let bytes_read = loop {
            match self.inner.read(&mut self.scratch) {
                Ok(n) => break n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if bytes_read == 0 {
            return Ok(None);
        }
        let chunk = self.scratch.get(..bytes_read).unwrap_or_default();
        Ok(Some(Chunk::Bytes(Cow::Borrowed(chunk))))
    }
}

/// A [`Reader`] that is exhausted from the start. Backs pre-loaded buffers.
#[derive(Debug, Default, Clone, Copy)]
pub struct Exhausted;

impl Reader for Exhausted {
    type Error = core::convert::Infallible;

    fn next_chunk(&mut self) -> Result<Option<Chunk<'_>>, Self::Error> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<R: Reader>(reader: &mut R) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = reader.next_chunk().unwrap() {
            chunks.push(chunk.as_bytes().to_vec());
        }
        chunks
    }

    #[test]
    fn test_full_slice_reader_basic() {
        let mut reader = ChunkReader::full_slice(b"hello world");
        assert_eq!(drain(&mut reader), vec![b"hello world".to_vec()]);
        // EOF stays EOF
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_full_slice_reader_empty() {
        let mut reader = ChunkReader::full_slice(b"");
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn test_chunk_reader_basic() {
        let mut reader = ChunkReader::new(b"hello world", 3);
        assert_eq!(
            drain(&mut reader),
            vec![
                b"hel".to_vec(),
                b"lo ".to_vec(),
                b"wor".to_vec(),
                b"ld".to_vec()
            ]
        );
    }

    #[test]
    fn test_chunk_reader_zero_chunk_size() {
        // Should be clamped to 1
        let mut reader = ChunkReader::new(b"hello", 0);
        let chunk = reader.next_chunk().unwrap().unwrap();
        assert_eq!(chunk.as_bytes(), b"h");
    }

    #[test]
    fn test_iter_reader_mixed_items() {
        let items: Vec<Chunk<'static>> = vec![
            "ab".into(),
            Chunk::Byte(b','),
            vec![b'c', b'd'].into(),
            String::from("\n").into(),
        ];
        let mut reader = IterReader::new(items);
        assert_eq!(drain(&mut reader).concat(), b"ab,cd\n".to_vec());
    }

    #[test]
    fn test_io_reader_respects_read_size() {
        let data: &[u8] = b"abcdefg";
        let mut reader = IoReader::with_read_size(data, 3);
        assert_eq!(
            drain(&mut reader),
            vec![b"abc".to_vec(), b"def".to_vec(), b"g".to_vec()]
        );
    }

    #[test]
    fn test_exhausted_reader() {
        assert!(Exhausted.next_chunk().unwrap().is_none());
    }
}
