// SPDX-License-Identifier: Apache-2.0

use log::trace;

use crate::cell::{scan_piece, Cell, CellScan, CellState, ScanContext};
use crate::chunk_reader::Reader;
use crate::dialect::Syntax;
use crate::record::{Record, RecordLayout};
use crate::stream_buffer::StreamBuffer;
use crate::{CsvError, Peek, Result, Step, Token};

/// Scan every cell up to the end of the row in one attempt.
fn scan_row<R>(buf: &mut StreamBuffer<R>, syntax: &Syntax) -> Result<Step<Vec<Vec<u8>>>> {
    let mut cells = Vec::new();
    loop {
        let mut scan = CellScan::default();
        let content = ready!(scan_piece(buf, syntax, &mut scan, usize::MAX)?);
        cells.push(content.unwrap_or_default());
        if scan.line_end() {
            break;
        }
        match buf.peek(0) {
            Peek::Pending => return Ok(Step::NeedMoreInput),
            Peek::End => break,
            Peek::Byte(_) => {}
        }
    }
    Ok(Step::Ready(cells))
}

impl<R: Reader> ScanContext<R> {
    /// Read the whole row at the cursor, retaining it until it completes.
    pub(crate) fn read_row(&mut self) -> Result<Vec<String>> {
        let syntax = &self.syntax;
        let cells = self.buffer.drive(|b| scan_row(b, syntax))?;
        cells
            .into_iter()
            .map(|bytes| self.syntax.decode(bytes))
            .collect()
    }
}

/// Per-row bookkeeping owned by the document.
#[derive(Debug)]
pub(crate) struct RowState {
    /// 1-based position in the input, header row included
    index: usize,
    cell: Option<CellState>,
    started: bool,
    finished: bool,
    values: Option<Vec<String>>,
}

impl RowState {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            cell: None,
            started: false,
            finished: false,
            values: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Handle to one row of the input.
///
/// Cells are streamed with [`Token::next_item`]; [`Token::read`] and
/// [`Row::read_object`] read the whole row at once.
#[derive(Debug)]
pub struct Row<'a, R> {
    ctx: &'a mut ScanContext<R>,
    state: &'a mut RowState,
    layout: &'a RecordLayout,
}

impl<'a, R: Reader> Row<'a, R> {
    pub(crate) fn new(
        ctx: &'a mut ScanContext<R>,
        state: &'a mut RowState,
        layout: &'a RecordLayout,
    ) -> Self {
        Self { ctx, state, layout }
    }

    /// 1-based row index, counting the header row.
    pub fn index(&self) -> usize {
        self.state.index
    }

    /// Read the row and zip it against the document's headers.
    ///
    /// The row is consumed in full before a column-count error is reported.
    pub fn read_object(&mut self) -> Result<Record> {
        let values = self.read()?;
        self.layout.project(values, Some(self.state.index))
    }

    fn finish(&mut self) {
        self.state.finished = true;
        self.state.cell = None;
    }
}

impl<R: Reader> Token for Row<'_, R> {
    type Value = Vec<String>;
    type Item<'t>
        = Cell<'t, R>
    where
        Self: 't;

    fn read(&mut self) -> Result<Vec<String>> {
        if let Some(values) = &self.state.values {
            return Ok(values.clone());
        }
        if self.state.started || self.state.finished {
            return Err(CsvError::TokenConsumed);
        }
        let values = self.ctx.read_row()?;
        self.finish();
        self.state.values = Some(values.clone());
        Ok(values)
    }

    fn next_item(&mut self) -> Result<Option<Cell<'_, R>>> {
        if self.state.finished {
            return Ok(None);
        }
        if let Some(previous) = self.state.cell.as_mut() {
            if !previous.scan.is_finished() {
                trace!("skipping unconsumed cell in row {}", self.state.index);
                self.ctx.skip_cell(&mut previous.scan)?;
            }
            let line_end = previous.scan.line_end();
            if line_end || self.ctx.at_end()? {
                self.finish();
                return Ok(None);
            }
        }

        self.state.started = true;
        let state = self.state.cell.insert(CellState::default());
        Ok(Some(Cell::new(self.ctx, state)))
    }

    fn skip(&mut self) -> Result<()> {
        if self.state.finished {
            return Ok(());
        }
        while self.next_item()?.is_some() {}
        Ok(())
    }

    fn is_consumed(&self) -> bool {
        self.state.finished
    }
}
