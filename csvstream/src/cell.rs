// SPDX-License-Identifier: Apache-2.0

//! Cell scanner: lexes one field out of the stream buffer.
//!
//! The scan functions here only look at bytes already buffered. They return
//! [`Step::NeedMoreInput`] when they run dry and are replayed by
//! [`StreamBuffer::drive`] after the next pull, so every attempt works on a
//! copy of the scan state that is committed only once the attempt is ready.

use log::trace;

use crate::chunk_reader::{Exhausted, Reader};
use crate::dialect::{Dialect, Syntax};
use crate::record::{Coercion, Value};
use crate::stream_buffer::StreamBuffer;
use crate::{CsvError, Peek, Result, Step, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Phase {
    #[default]
    Start,
    Unquoted,
    Quoted,
    Finished,
}

/// Progress of one cell through the scanner.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CellScan {
    phase: Phase,
    /// At least one piece has been emitted
    emitted: bool,
    /// A line terminator was consumed after the content
    line_end: bool,
}

impl CellScan {
    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }

    pub fn line_end(&self) -> bool {
        self.line_end
    }
}

/// Scan the next piece of a cell.
///
/// Returns `Ready(Some(piece))` once `limit` bytes of content are collected
/// (or the content ends), and `Ready(None)` once the cell is finished and all
/// of it has been emitted. An empty cell emits exactly one empty piece.
pub(crate) fn scan_piece<R>(
    buf: &mut StreamBuffer<R>,
    syntax: &Syntax,
    scan: &mut CellScan,
    limit: usize,
) -> Result<Step<Option<Vec<u8>>>> {
    if scan.phase == Phase::Finished {
        return Ok(Step::Ready(None));
    }
    if scan.phase == Phase::Start {
        scan.phase = match buf.peek(0) {
            Peek::Pending => return Ok(Step::NeedMoreInput),
            Peek::End => return Err(CsvError::EndOfInput),
            Peek::Byte(byte) if byte == syntax.quote => {
                buf.expect(byte)?;
                Phase::Quoted
            }
            Peek::Byte(_) => Phase::Unquoted,
        };
    }

    let mut out = Vec::new();
    loop {
        let content_ended = match scan.phase {
            Phase::Quoted => ready!(quoted_byte(buf, syntax, &mut out)?),
            _ => ready!(unquoted_byte(buf, syntax, &mut out)?),
        };
        if content_ended {
            break;
        }
        if out.len() >= limit && !splits_utf8_sequence(&out, limit) {
            scan.emitted = true;
            return Ok(Step::Ready(Some(out)));
        }
    }

    // Closing quote is already consumed; now one separator, then a terminator
    match buf.peek(0) {
        Peek::Pending => return Ok(Step::NeedMoreInput),
        Peek::Byte(byte) if byte == syntax.separator => buf.expect(byte)?,
        _ => {}
    }
    scan.line_end = ready!(consume_terminator(buf, syntax)?);
    scan.phase = Phase::Finished;

    if !scan.emitted || !out.is_empty() {
        scan.emitted = true;
        Ok(Step::Ready(Some(out)))
    } else {
        Ok(Step::Ready(None))
    }
}

/// Consume one content byte of a quoted field. `Ready(true)` once the field
/// is closed.
fn quoted_byte<R>(
    buf: &mut StreamBuffer<R>,
    syntax: &Syntax,
    out: &mut Vec<u8>,
) -> Result<Step<bool>> {
    let quote = syntax.quote;
    match buf.peek(0) {
        Peek::Pending => Ok(Step::NeedMoreInput),
        // Left open at end of input: what was read is the value
        Peek::End => Ok(Step::Ready(true)),
        Peek::Byte(byte) if byte == quote => match buf.peek(1) {
            Peek::Pending => Ok(Step::NeedMoreInput),
            Peek::Byte(next) if next == quote => {
                buf.expect(quote)?;
                buf.expect(quote)?;
                out.push(quote);
                Ok(Step::Ready(false))
            }
            _ => {
                buf.expect(quote)?;
                Ok(Step::Ready(true))
            }
        },
        Peek::Byte(byte) => {
            buf.expect(byte)?;
            out.push(byte);
            Ok(Step::Ready(false))
        }
    }
}

/// Consume one content byte of an unquoted field. `Ready(true)` when the next
/// byte ends the field; the separator or terminator is left in place.
fn unquoted_byte<R>(
    buf: &mut StreamBuffer<R>,
    syntax: &Syntax,
    out: &mut Vec<u8>,
) -> Result<Step<bool>> {
    match buf.peek(0) {
        Peek::Pending => Ok(Step::NeedMoreInput),
        Peek::End => Ok(Step::Ready(true)),
        Peek::Byte(byte) if byte == syntax.separator => Ok(Step::Ready(true)),
        Peek::Byte(byte) => {
            if ready!(terminator_at(buf, syntax)) {
                return Ok(Step::Ready(true));
            }
            buf.expect(byte)?;
            out.push(byte);
            Ok(Step::Ready(false))
        }
    }
}

/// Whether a line terminator starts at the cursor.
///
/// A literal terminator that matches as far as the buffered bytes go is
/// `NeedMoreInput`, not a mismatch.
fn terminator_at<R>(buf: &StreamBuffer<R>, syntax: &Syntax) -> Step<bool> {
    match syntax.newline.as_deref() {
        None => match buf.peek(0) {
            Peek::Pending => Step::NeedMoreInput,
            Peek::Byte(b'\r' | b'\n') => Step::Ready(true),
            _ => Step::Ready(false),
        },
        Some(newline) => {
            for (offset, &expected) in newline.iter().enumerate() {
                match buf.peek(offset) {
                    Peek::Byte(byte) if byte == expected => {}
                    Peek::Pending => return Step::NeedMoreInput,
                    _ => return Step::Ready(false),
                }
            }
            Step::Ready(true)
        }
    }
}

/// Consume a line terminator if one starts at the cursor.
///
/// Without a literal terminator the whole run of CR and LF bytes counts as
/// one, which also swallows blank lines.
fn consume_terminator<R>(buf: &mut StreamBuffer<R>, syntax: &Syntax) -> Result<Step<bool>> {
    match syntax.newline.as_deref() {
        Some(newline) => {
            if !ready!(terminator_at(buf, syntax)) {
                return Ok(Step::Ready(false));
            }
            for &byte in newline {
                buf.expect(byte)?;
            }
            Ok(Step::Ready(true))
        }
        None => {
            let mut seen = false;
            loop {
                match buf.peek(0) {
                    Peek::Pending => return Ok(Step::NeedMoreInput),
                    Peek::Byte(byte @ (b'\r' | b'\n')) => {
                        buf.expect(byte)?;
                        seen = true;
                    }
                    _ => return Ok(Step::Ready(seen)),
                }
            }
        }
    }
}

/// Whether cutting after `bytes` would split a UTF-8 sequence.
///
/// Pieces are extended by at most three bytes past `limit`, so malformed input
/// cannot grow a piece without bound.
fn splits_utf8_sequence(bytes: &[u8], limit: usize) -> bool {
    if bytes.len() >= limit.saturating_add(3) {
        return false;
    }
    let continuation = bytes
        .iter()
        .rev()
        .take(3)
        .take_while(|&&b| b & 0xc0 == 0x80)
        .count();
    let lead = bytes
        .len()
        .checked_sub(continuation + 1)
        .and_then(|pos| bytes.get(pos));
    let width = match lead {
        Some(0xc0..=0xdf) => 2,
        Some(0xe0..=0xef) => 3,
        Some(0xf0..=0xf7) => 4,
        _ => 1,
    };
    continuation + 1 < width
}

/// The buffer together with the lexical settings, shared by every token
/// handle of one input.
#[derive(Debug)]
pub(crate) struct ScanContext<R> {
    pub buffer: StreamBuffer<R>,
    pub syntax: Syntax,
}

impl<R: Reader> ScanContext<R> {
    pub fn new(buffer: StreamBuffer<R>, syntax: Syntax) -> Self {
        Self { buffer, syntax }
    }

    /// Whether the input is exhausted at the cursor, pulling if needed to tell.
    pub fn at_end(&mut self) -> Result<bool> {
        self.buffer
            .drive(|b| Ok(b.peek(0).into_step().map(|byte| byte.is_none())))
    }

    /// Stream the next piece of a cell, committing the scan state per piece.
    pub fn next_piece(&mut self, scan: &mut CellScan) -> Result<Option<Vec<u8>>> {
        let syntax = &self.syntax;
        let limit = syntax.chunk_size;
        self.buffer.drive(|b| {
            let mut attempt = *scan;
            let piece = ready!(scan_piece(b, syntax, &mut attempt, limit)?);
            *scan = attempt;
            Ok(Step::Ready(piece))
        })
    }

    /// Read the rest of a cell in one atomic attempt.
    pub fn read_cell_bytes(&mut self, scan: &mut CellScan) -> Result<Vec<u8>> {
        let syntax = &self.syntax;
        let piece = self.buffer.drive(|b| {
            let mut attempt = *scan;
            let piece = ready!(scan_piece(b, syntax, &mut attempt, usize::MAX)?);
            *scan = attempt;
            Ok(Step::Ready(piece))
        })?;
        Ok(piece.unwrap_or_default())
    }

    /// Discard the rest of a cell piece by piece.
    pub fn skip_cell(&mut self, scan: &mut CellScan) -> Result<()> {
        while self.next_piece(scan)?.is_some() {}
        Ok(())
    }
}

/// Per-cell bookkeeping owned by the row (or cell reader) that hands out the
/// [`Cell`] handle.
#[derive(Debug, Default)]
pub(crate) struct CellState {
    pub scan: CellScan,
    value: Option<String>,
    streamed: bool,
}

/// Handle to one field of the input.
///
/// The cell is materialized with [`Token::read`] or streamed piece by piece
/// with [`Token::next_item`]. Dropping an unconsumed handle is fine: the
/// owner skips the rest of the cell before moving on.
#[derive(Debug)]
pub struct Cell<'a, R> {
    ctx: &'a mut ScanContext<R>,
    state: &'a mut CellState,
}

impl<'a, R: Reader> Cell<'a, R> {
    pub(crate) fn new(ctx: &'a mut ScanContext<R>, state: &'a mut CellState) -> Self {
        Self { ctx, state }
    }

    /// Read the cell and coerce it.
    pub fn read_as(&mut self, coercion: &Coercion) -> Result<Value> {
        let text = self.read()?;
        Ok(coercion.apply(&text))
    }

    /// Whether a line terminator followed the cell. Only meaningful once the
    /// cell is consumed.
    pub fn ends_line(&self) -> bool {
        self.state.scan.line_end()
    }
}

impl<R: Reader> Token for Cell<'_, R> {
    type Value = String;
    type Item<'t>
        = String
    where
        Self: 't;

    fn read(&mut self) -> Result<String> {
        if let Some(value) = &self.state.value {
            return Ok(value.clone());
        }
        if self.state.streamed || self.state.scan.is_finished() {
            return Err(CsvError::TokenConsumed);
        }
        let bytes = self.ctx.read_cell_bytes(&mut self.state.scan)?;
        let value = self.ctx.syntax.decode(bytes)?;
        self.state.value = Some(value.clone());
        Ok(value)
    }

    fn next_item(&mut self) -> Result<Option<String>> {
        if self.state.scan.is_finished() {
            return Ok(None);
        }
        self.state.streamed = true;
        match self.ctx.next_piece(&mut self.state.scan)? {
            Some(piece) => Ok(Some(String::from_utf8(piece)?)),
            None => Ok(None),
        }
    }

    fn skip(&mut self) -> Result<()> {
        if self.state.scan.is_finished() {
            return Ok(());
        }
        self.state.streamed = true;
        self.ctx.skip_cell(&mut self.state.scan)
    }

    fn is_consumed(&self) -> bool {
        self.state.scan.is_finished()
    }
}

/// Standalone scanner yielding successive cells, ignoring row structure.
///
/// ```rust
/// use csvstream::{CellReader, ChunkReader, Dialect};
///
/// let mut cells = CellReader::new(ChunkReader::new(b"a,\"b\"\"c\"\nd", 2), Dialect::default()).unwrap();
/// let mut all = Vec::new();
/// while let Some(text) = cells.read_cell().unwrap() {
///     all.push(text);
/// }
/// assert_eq!(all, ["a", "b\"c", "d"]);
/// ```
#[derive(Debug)]
pub struct CellReader<R> {
    ctx: ScanContext<R>,
    current: Option<CellState>,
}

impl CellReader<Exhausted> {
    /// Scan cells out of an in-memory slice.
    pub fn from_slice(data: &[u8], dialect: Dialect) -> Result<Self> {
        let syntax = dialect.compile()?;
        Ok(Self {
            ctx: ScanContext::new(StreamBuffer::preloaded(data), syntax),
            current: None,
        })
    }
}

impl<R: Reader> CellReader<R> {
    pub fn new(reader: R, dialect: Dialect) -> Result<Self> {
        let syntax = dialect.compile()?;
        Ok(Self {
            ctx: ScanContext::new(StreamBuffer::new(reader), syntax),
            current: None,
        })
    }

    /// Cap on bytes retained while a cell is read atomically. It must be at
    /// least the reader's chunk size.
    pub fn with_max_buffer_size(mut self, size: usize, allow_exceeding: bool) -> Self {
        self.ctx.buffer.set_max_buffer_size(size);
        self.ctx.buffer.set_allow_buffer_to_be_exceeded(allow_exceeding);
        self
    }

    /// Hand out the next cell, skipping whatever is left of the previous one.
    pub fn next_cell(&mut self) -> Result<Option<Cell<'_, R>>> {
        if let Some(previous) = self.current.as_mut() {
            if !previous.scan.is_finished() {
                trace!("skipping unconsumed cell");
                self.ctx.skip_cell(&mut previous.scan)?;
            }
        }
        self.current = None;
        if self.ctx.at_end()? {
            return Ok(None);
        }
        let state = self.current.insert(CellState::default());
        Ok(Some(Cell::new(&mut self.ctx, state)))
    }

    pub fn read_cell(&mut self) -> Result<Option<String>> {
        match self.next_cell()? {
            Some(mut cell) => cell.read().map(Some),
            None => Ok(None),
        }
    }

    pub fn read_cell_as(&mut self, coercion: &Coercion) -> Result<Option<Value>> {
        match self.next_cell()? {
            Some(mut cell) => cell.read_as(coercion).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChunkReader;
    use test_log::test;

    fn syntax() -> Syntax {
        Dialect::default().compile().unwrap()
    }

    /// Scan every piece of one cell from a preloaded buffer
    fn pieces(input: &[u8], syntax: &Syntax, limit: usize) -> (Vec<Vec<u8>>, CellScan, usize) {
        let mut buf = StreamBuffer::preloaded(input);
        let mut scan = CellScan::default();
        let mut out = Vec::new();
        while let Step::Ready(Some(piece)) = scan_piece(&mut buf, syntax, &mut scan, limit).unwrap()
        {
            out.push(piece);
        }
        (out, scan, buf.position())
    }

    #[test]
    fn test_unquoted_cell_stops_at_separator() {
        let (out, scan, pos) = pieces(b"abc,def", &syntax(), usize::MAX);
        assert_eq!(out, vec![b"abc".to_vec()]);
        assert!(!scan.line_end());
        assert_eq!(pos, 4);
    }

    #[test]
    fn test_escaped_quote_decodes_to_one_quote() {
        let (out, _, _) = pieces(b"\"a\"\"b\"", &syntax(), usize::MAX);
        assert_eq!(out, vec![b"a\"b".to_vec()]);
    }

    #[test]
    fn test_quoted_cell_keeps_separators_and_newlines() {
        let (out, scan, pos) = pieces(b"\"x,\ny\"\nnext", &syntax(), usize::MAX);
        assert_eq!(out, vec![b"x,\ny".to_vec()]);
        assert!(scan.line_end());
        assert_eq!(pos, 7);
    }

    #[test]
    fn test_empty_cell_emits_one_empty_piece() {
        let (out, _, pos) = pieces(b",x", &syntax(), 4);
        assert_eq!(out, vec![Vec::new()]);
        assert_eq!(pos, 1);

        let (out, _, _) = pieces(b"\"\"", &syntax(), 4);
        assert_eq!(out, vec![Vec::new()]);
    }

    #[test]
    fn test_terminator_run_is_one_line_end() {
        let (out, scan, pos) = pieces(b"a\r\n\r\n\nb", &syntax(), usize::MAX);
        assert_eq!(out, vec![b"a".to_vec()]);
        assert!(scan.line_end());
        assert_eq!(pos, 6);
    }

    #[test]
    fn test_separator_then_terminator_both_consumed() {
        let (out, scan, pos) = pieces(b"a,\nb", &syntax(), usize::MAX);
        assert_eq!(out, vec![b"a".to_vec()]);
        assert!(scan.line_end());
        assert_eq!(pos, 3);
    }

    #[test]
    fn test_custom_newline() {
        let syntax = Dialect::default().newline("<EOL>").compile().unwrap();
        let (out, scan, pos) = pieces(b"a<b<EOL>c", &syntax, usize::MAX);
        assert_eq!(out, vec![b"a<b".to_vec()]);
        assert!(scan.line_end());
        assert_eq!(pos, 8);

        // A plain LF is content under a literal terminator
        let (out, _, _) = pieces(b"a\nb", &syntax, usize::MAX);
        assert_eq!(out, vec![b"a\nb".to_vec()]);
    }

    #[test]
    fn test_unterminated_quote_ends_at_input_end() {
        let (out, scan, _) = pieces(b"\"open", &syntax(), usize::MAX);
        assert_eq!(out, vec![b"open".to_vec()]);
        assert!(scan.is_finished());
    }

    #[test]
    fn test_exhausted_input_is_end_of_input() {
        let mut buf = StreamBuffer::preloaded(Vec::<u8>::new());
        let mut scan = CellScan::default();
        let result = scan_piece(&mut buf, &syntax(), &mut scan, 8);
        assert!(matches!(result, Err(CsvError::EndOfInput)));
    }

    #[test]
    fn test_pieces_respect_limit() {
        let (out, _, _) = pieces(b"abcdefg,", &syntax(), 3);
        assert_eq!(out, vec![b"abc".to_vec(), b"def".to_vec(), b"g".to_vec()]);

        // Exact multiple: no trailing empty piece
        let (out, _, _) = pieces(b"abcdef", &syntax(), 3);
        assert_eq!(out, vec![b"abc".to_vec(), b"def".to_vec()]);
    }

    #[test]
    fn test_pieces_never_split_utf8() {
        let text = "aé€😀z";
        let (out, _, _) = pieces(text.as_bytes(), &syntax(), 2);
        for piece in &out {
            assert!(core::str::from_utf8(piece).is_ok(), "split piece {piece:?}");
            assert!(piece.len() <= 2 + 3);
        }
        assert_eq!(out.concat(), text.as_bytes());
    }

    #[test]
    fn test_partial_literal_terminator_needs_more_input() {
        let syntax = Dialect::default().newline("<EOL>").compile().unwrap();
        let mut buf = StreamBuffer::new(ChunkReader::new(b"ab<EOL>", 4));
        let mut scan = CellScan::default();
        buf.pull_next_chunk().unwrap();

        // "ab<E" is buffered: the tail could still become a terminator
        let step = buf
            .checkpoint_and_retry(|b| {
                let mut attempt = scan;
                let piece = ready!(scan_piece(b, &syntax, &mut attempt, usize::MAX)?);
                scan = attempt;
                Ok(Step::Ready(piece))
            })
            .unwrap();
        assert_eq!(step, Step::NeedMoreInput);
        assert_eq!(scan.phase, Phase::Start);
        assert_eq!(buf.position(), 0);

        let piece = buf
            .drive(|b| {
                let mut attempt = scan;
                let piece = ready!(scan_piece(b, &syntax, &mut attempt, usize::MAX)?);
                scan = attempt;
                Ok(Step::Ready(piece))
            })
            .unwrap();
        assert_eq!(piece, Some(b"ab".to_vec()));
        assert!(scan.line_end());
    }

    #[test]
    fn test_cell_reader_over_chunks() {
        let input = b"one,\"t\"\"wo\"\r\nthree,,four";
        for chunk_size in 1..=input.len() {
            let mut cells =
                CellReader::new(ChunkReader::new(input, chunk_size), Dialect::default()).unwrap();
            let mut all = Vec::new();
            while let Some(text) = cells.read_cell().unwrap() {
                all.push(text);
            }
            assert_eq!(all, ["one", "t\"wo", "three", "", "four"], "chunk {chunk_size}");
        }
    }

    #[test]
    fn test_cell_read_is_idempotent() {
        let mut cells = CellReader::from_slice(b"a,b", Dialect::default()).unwrap();
        let mut cell = cells.next_cell().unwrap().unwrap();
        assert_eq!(cell.read().unwrap(), "a");
        assert_eq!(cell.read().unwrap(), "a");
        assert!(cell.is_consumed());
        cell.skip().unwrap();
        assert_eq!(cells.read_cell().unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn test_streamed_cell_has_no_cached_value() {
        let dialect = Dialect::default().chunk_size(2);
        let mut cells = CellReader::from_slice(b"abcde,f", dialect).unwrap();
        let mut cell = cells.next_cell().unwrap().unwrap();

        let mut streamed = Vec::new();
        while let Some(piece) = cell.next_item().unwrap() {
            streamed.push(piece);
        }
        assert_eq!(streamed, ["ab", "cd", "e"]);
        assert!(matches!(cell.read(), Err(CsvError::TokenConsumed)));
    }

    #[test]
    fn test_unconsumed_cell_is_skipped() {
        let mut cells = CellReader::from_slice(b"\"skip,me\",kept", Dialect::default()).unwrap();
        let cell = cells.next_cell().unwrap();
        assert!(cell.is_some());
        assert_eq!(cells.read_cell().unwrap().as_deref(), Some("kept"));
        assert!(cells.read_cell().unwrap().is_none());
    }

    #[test]
    fn test_read_cell_as() {
        let mut cells = CellReader::from_slice(b" 42 ,TRUE,x", Dialect::default()).unwrap();
        assert_eq!(
            cells.read_cell_as(&Coercion::Number).unwrap(),
            Some(Value::Number(42.0))
        );
        assert_eq!(
            cells.read_cell_as(&Coercion::boolean()).unwrap(),
            Some(Value::Bool(true))
        );
        let malformed = cells.read_cell_as(&Coercion::Number).unwrap();
        assert!(malformed.and_then(|v| v.as_f64()).is_some_and(f64::is_nan));
    }

    #[test]
    fn test_trim_applies_to_reads_only() {
        let dialect = Dialect::default().trim(true);
        let mut cells = CellReader::from_slice(b"  padded  ,  streamed  ", dialect).unwrap();
        assert_eq!(cells.read_cell().unwrap().as_deref(), Some("padded"));

        let mut cell = cells.next_cell().unwrap().unwrap();
        assert_eq!(cell.next_item().unwrap().as_deref(), Some("  streamed  "));
    }
}
