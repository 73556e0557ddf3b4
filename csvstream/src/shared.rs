// SPDX-License-Identifier: Apache-2.0

//! Shared components for the cell, row and document tokenizers.

use crate::Result;

/// Outcome of one scan attempt against the bytes currently buffered.
///
/// Sequence producers return `Step<Option<T>>`, where `Ready(None)` marks the
/// end of the sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    /// The attempt completed with this value.
    Ready(T),
    /// The buffer ran dry before the attempt could complete, but the source is
    /// still open. The cursor has been rewound to where the attempt started.
    NeedMoreInput,
}

impl<T> Step<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Step::Ready(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Step<U> {
        match self {
            Step::Ready(value) => Step::Ready(f(value)),
            Step::NeedMoreInput => Step::NeedMoreInput,
        }
    }
}

/// Unwraps a `Step::Ready`, or returns `Ok(Step::NeedMoreInput)` from the
/// enclosing function.
macro_rules! ready {
    ($step:expr) => {
        match $step {
            $crate::Step::Ready(value) => value,
            $crate::Step::NeedMoreInput => return Ok($crate::Step::NeedMoreInput),
        }
    };
}

/// Result of looking ahead in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Peek {
    /// The byte at the requested offset.
    Byte(u8),
    /// Not buffered yet; the source may still deliver it.
    Pending,
    /// The source is exhausted; there will never be a byte here.
    End,
}

impl Peek {
    /// Lifts a peek into a step, treating `Pending` as `NeedMoreInput`.
    /// `End` becomes `Ready(None)`.
    pub fn into_step(self) -> Step<Option<u8>> {
        match self {
            Peek::Byte(byte) => Step::Ready(Some(byte)),
            Peek::Pending => Step::NeedMoreInput,
            Peek::End => Step::Ready(None),
        }
    }
}

/// Capability shared by every token kind: cells, rows, and documents.
///
/// A token is either materialized in one go with [`read`](Token::read), or
/// walked lazily with [`next_item`](Token::next_item). Both pull more input
/// from the source whenever the buffered bytes run out.
pub trait Token {
    /// Fully assembled value of the token.
    type Value;
    /// Sub-unit produced by the lazy sequence.
    type Item<'t>
    where
        Self: 't;

    /// Consumes the token to completion and returns its value.
    ///
    /// Repeated calls return the cached value without moving the cursor. A
    /// token consumed by streaming or skipping has no cached value and returns
    /// [`CsvError::TokenConsumed`](crate::CsvError::TokenConsumed).
    fn read(&mut self) -> Result<Self::Value>;

    /// Returns the next sub-unit, or `None` when the token is exhausted.
    fn next_item(&mut self) -> Result<Option<Self::Item<'_>>>;

    /// Consumes and discards the token unless it is already consumed.
    fn skip(&mut self) -> Result<()>;

    fn is_consumed(&self) -> bool;
}
