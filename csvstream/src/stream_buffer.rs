// SPDX-License-Identifier: Apache-2.0

use log::{debug, trace};

use crate::chunk_reader::{Exhausted, Reader};
use crate::defaults::DEFAULT_MAX_BUFFER_SIZE;
use crate::{CsvError, Peek, Result, Step};

/// StreamBuffer holds the bytes pulled from a [`Reader`] that have not been
/// consumed yet.
///
/// Key design principles:
/// - Scanners read through `peek`/`next`/`expect` as if the whole input were
///   in memory, and report `NeedMoreInput` when it is not
/// - Every scan attempt runs under a checkpoint; an attempt that runs dry is
///   rewound to its checkpoint and replayed after the next pull
/// - Bytes before the checkpoint (or the cursor, outside an attempt) are
///   discarded on every pull, so retained memory is bounded by the largest
///   in-progress attempt
/// - The retained size is capped unless exceeding the cap is allowed
pub struct StreamBuffer<R> {
    /// Bytes not yet discarded; `buffer[tokenize_pos..]` is unconsumed
    buffer: Vec<u8>,
    /// Current position where scanners are reading
    tokenize_pos: usize,
    /// Start of the in-progress attempt, if any
    checkpoint: Option<usize>,
    /// The reader reported end of stream
    eof: bool,
    max_buffer_size: usize,
    allow_buffer_to_be_exceeded: bool,
    reader: R,
    /// Bytes discarded by compaction so far, for absolute offsets
    discarded: usize,
}

impl StreamBuffer<Exhausted> {
    /// Create a buffer holding the entire input up front.
    ///
    /// The buffer never pulls, so the size cap does not apply to it.
    pub fn preloaded(data: impl Into<Vec<u8>>) -> Self {
        let mut buffer = Self::new(Exhausted);
        buffer.buffer = data.into();
        buffer.eof = true;
        buffer
    }
}

impl<R> StreamBuffer<R> {
    /// Create an empty buffer bound to `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            buffer: Vec::new(),
            tokenize_pos: 0,
            checkpoint: None,
            eof: false,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            allow_buffer_to_be_exceeded: false,
            reader,
            discarded: 0,
        }
    }

    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// The cap applies to the retained bytes plus the newly pulled chunk, so
    /// a source with larger chunks fails even when everything before was
    /// consumed.
    pub fn set_max_buffer_size(&mut self, size: usize) {
        self.max_buffer_size = size;
    }

    pub fn allow_buffer_to_be_exceeded(&self) -> bool {
        self.allow_buffer_to_be_exceeded
    }

    pub fn set_allow_buffer_to_be_exceeded(&mut self, allow: bool) {
        self.allow_buffer_to_be_exceeded = allow;
    }

    /// Look at the byte `offset` positions past the cursor without consuming it.
    pub fn peek(&self, offset: usize) -> Peek {
        let byte = self
            .tokenize_pos
            .checked_add(offset)
            .and_then(|pos| self.buffer.get(pos));
        match byte {
            Some(&byte) => Peek::Byte(byte),
            None if self.eof => Peek::End,
            None => Peek::Pending,
        }
    }

    /// Consume and return the byte at the cursor.
    pub fn next(&mut self) -> Result<Step<u8>> {
        match self.buffer.get(self.tokenize_pos) {
            Some(&byte) => {
                self.tokenize_pos = self.tokenize_pos.saturating_add(1);
                Ok(Step::Ready(byte))
            }
            None if self.eof => Err(CsvError::EndOfInput),
            None => Ok(Step::NeedMoreInput),
        }
    }

    /// Consume the byte at the cursor, which the caller has already verified
    /// with [`peek`](Self::peek).
    pub fn expect(&mut self, expected: u8) -> Result<()> {
        match self.peek(0) {
            Peek::Byte(byte) if byte == expected => {
                self.tokenize_pos = self.tokenize_pos.saturating_add(1);
                Ok(())
            }
            _ => Err(CsvError::Invariant("expected byte is not at the cursor")),
        }
    }

    /// Run `attempt` from the current cursor. If it reports `NeedMoreInput`
    /// the cursor is rewound to where the attempt started.
    ///
    /// Errors pass through without rewinding.
    pub fn checkpoint_and_retry<T>(
        &mut self,
        attempt: impl FnOnce(&mut Self) -> Result<Step<T>>,
    ) -> Result<Step<T>> {
        let start = self.tokenize_pos;
        let outer = self.checkpoint;
        self.checkpoint = Some(outer.map_or(start, |outer| outer.min(start)));

        let result = attempt(self);
        self.checkpoint = outer;

        if let Ok(Step::NeedMoreInput) = result {
            trace!(
                "rewinding {} bytes to offset {}",
                self.tokenize_pos.saturating_sub(start),
                self.discarded.saturating_add(start)
            );
            self.tokenize_pos = start;
        }
        result
    }

    /// Compact buffer by discarding everything before `start_offset`.
    ///
    /// Returns the number of bytes discarded.
    pub fn compact_from(&mut self, start_offset: usize) -> usize {
        let offset = start_offset.min(self.buffer.len());
        if offset == 0 {
            return 0;
        }

        self.buffer.drain(..offset);
        self.tokenize_pos = self.tokenize_pos.saturating_sub(offset);
        self.checkpoint = self.checkpoint.map(|pos| pos.saturating_sub(offset));
        self.discarded = self.discarded.saturating_add(offset);
        debug!("compacted {} bytes, {} retained", offset, self.buffer.len());
        offset
    }

    /// Bytes buffered past the cursor
    pub fn remaining_bytes(&self) -> usize {
        self.buffer.len().saturating_sub(self.tokenize_pos)
    }

    /// Bytes currently held in memory, consumed or not
    pub fn retained_bytes(&self) -> usize {
        self.buffer.len()
    }

    /// Absolute offset of the cursor in the input
    pub fn position(&self) -> usize {
        self.discarded.saturating_add(self.tokenize_pos)
    }

    /// The source reported end of stream
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// The source is exhausted and every byte has been consumed
    pub fn is_exhausted(&self) -> bool {
        self.eof && self.remaining_bytes() == 0
    }
}

impl<R: Reader> StreamBuffer<R> {
    /// Pull one chunk from the reader and append it.
    ///
    /// Bytes before the active checkpoint (or the cursor) are discarded first.
    /// Fails when the retained size then exceeds the cap and exceeding it is
    /// not allowed.
    pub fn pull_next_chunk(&mut self) -> Result<()> {
        if self.eof {
            return Ok(());
        }

        let keep_from = self.checkpoint.unwrap_or(self.tokenize_pos);
        self.compact_from(keep_from);

        match self
            .reader
            .next_chunk()
            .map_err(|e| CsvError::Reader(Box::new(e)))?
        {
            Some(chunk) => {
                trace!("pulled chunk of {} bytes", chunk.len());
                self.buffer.extend_from_slice(chunk.as_bytes());
            }
            None => {
                debug!("end of stream after {} bytes", self.discarded + self.buffer.len());
                self.eof = true;
            }
        }

        if self.buffer.len() > self.max_buffer_size && !self.allow_buffer_to_be_exceeded {
            return Err(CsvError::BufferSizeExceeded {
                size: self.buffer.len(),
                max: self.max_buffer_size,
            });
        }
        Ok(())
    }

    /// Run `attempt` until it completes, pulling a chunk and replaying the
    /// attempt from its checkpoint every time it reports `NeedMoreInput`.
    pub fn drive<T>(&mut self, mut attempt: impl FnMut(&mut Self) -> Result<Step<T>>) -> Result<T> {
        loop {
            match self.checkpoint_and_retry(&mut attempt)? {
                Step::Ready(value) => return Ok(value),
                Step::NeedMoreInput if self.eof => {
                    return Err(CsvError::Invariant(
                        "scanner requested input after end of stream",
                    ));
                }
                Step::NeedMoreInput => self.pull_next_chunk()?,
            }
        }
    }
}

impl<R> core::fmt::Debug for StreamBuffer<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("retained", &self.buffer.len())
            .field("tokenize_pos", &self.tokenize_pos)
            .field("checkpoint", &self.checkpoint)
            .field("eof", &self.eof)
            .field("max_buffer_size", &self.max_buffer_size)
            .finish()
    }
}
