// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use log::debug;

use crate::cell::ScanContext;
use crate::chunk_reader::{Exhausted, Reader};
use crate::defaults::{DEFAULT_MAX_BUFFER_SIZE, UTF8_BOM};
use crate::dialect::Dialect;
use crate::record::{Record, RecordLayout, RecordTransform, Shape};
use crate::row::{Row, RowState};
use crate::stream_buffer::StreamBuffer;
use crate::{CsvError, Peek, Result, Step, Token};

/// Configuration for a [`CsvReader`].
///
/// ```rust
/// use csvstream::{Coercion, CsvReader, ReaderOptions, Shape, Value};
///
/// let options = ReaderOptions::default()
///     .separator(';')
///     .shape(Shape::new().column("n", Coercion::Number));
/// let mut parser = CsvReader::from_str("n;label\n7;seven", options).unwrap();
/// let record = parser.next_record().unwrap().unwrap();
/// assert_eq!(record.get("n"), Some(&Value::Number(7.0)));
/// ```
#[derive(Clone)]
pub struct ReaderOptions {
    dialect: Dialect,
    max_buffer_size: usize,
    allow_buffer_to_be_exceeded: bool,
    headers: Option<Vec<String>>,
    shape: Option<Shape>,
    read_headers: bool,
    strict_columns: bool,
    include_extra_cells: bool,
    skip_bom: bool,
    transform: Option<RecordTransform>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            allow_buffer_to_be_exceeded: false,
            headers: None,
            shape: None,
            read_headers: true,
            strict_columns: false,
            include_extra_cells: false,
            skip_bom: true,
            transform: None,
        }
    }
}

impl ReaderOptions {
    pub fn separator(mut self, separator: char) -> Self {
        self.dialect = self.dialect.separator(separator);
        self
    }

    pub fn quote(mut self, quote: char) -> Self {
        self.dialect = self.dialect.quote(quote);
        self
    }

    pub fn newline(mut self, newline: impl Into<String>) -> Self {
        self.dialect = self.dialect.newline(newline);
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.dialect = self.dialect.chunk_size(chunk_size);
        self
    }

    pub fn trim(mut self, trim: bool) -> Self {
        self.dialect = self.dialect.trim(trim);
        self
    }

    /// Replace all lexical settings at once.
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Cap on bytes retained while a row is scanned. Checked after each chunk
    /// is appended, so it must be at least the source's chunk size.
    pub fn max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    pub fn allow_buffer_to_be_exceeded(mut self, allow: bool) -> Self {
        self.allow_buffer_to_be_exceeded = allow;
        self
    }

    /// Column names to use instead of the header row.
    pub fn headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = Some(headers.into_iter().map(Into::into).collect());
        self
    }

    pub fn shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Treat the first row as the header row. On by default.
    pub fn read_headers(mut self, read: bool) -> Self {
        self.read_headers = read;
        self
    }

    /// Fail rows whose cell count differs from the headers. Extra cells kept
    /// by [`include_extra_cells`](Self::include_extra_cells) are not an error.
    pub fn strict_columns(mut self, strict: bool) -> Self {
        self.strict_columns = strict;
        self
    }

    pub fn include_extra_cells(mut self, include: bool) -> Self {
        self.include_extra_cells = include;
        self
    }

    /// Strip leading UTF-8 byte-order markers. On by default.
    pub fn skip_bom(mut self, skip: bool) -> Self {
        self.skip_bom = skip;
        self
    }

    /// Function applied to every record after per-field coercion.
    pub fn transform(mut self, transform: impl Fn(Record) -> Record + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }
}

impl core::fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("dialect", &self.dialect)
            .field("max_buffer_size", &self.max_buffer_size)
            .field("allow_buffer_to_be_exceeded", &self.allow_buffer_to_be_exceeded)
            .field("headers", &self.headers)
            .field("shape", &self.shape)
            .field("read_headers", &self.read_headers)
            .field("strict_columns", &self.strict_columns)
            .field("include_extra_cells", &self.include_extra_cells)
            .field("skip_bom", &self.skip_bom)
            .finish_non_exhaustive()
    }
}

/// Where the document is with respect to its header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
    /// Nothing scanned yet, byte-order marker included
    Pending,
    Resolved,
}

/// Pull-based CSV document reader.
///
/// Rows are scanned on demand; input is pulled from the [`Reader`] only when
/// the buffered bytes cannot complete the current row or cell.
///
/// ```rust
/// use csvstream::{ChunkReader, CsvReader, ReaderOptions, Value};
///
/// let csv = b"name,age\nAlice,30\nBob,25";
/// let mut parser = CsvReader::new(ChunkReader::new(csv, 3), ReaderOptions::default()).unwrap();
///
/// let names: Vec<_> = parser
///     .records()
///     .map(|record| record.unwrap().get("name").cloned())
///     .collect();
/// assert_eq!(names, [Some(Value::from("Alice")), Some(Value::from("Bob"))]);
/// ```
#[derive(Debug)]
pub struct CsvReader<R> {
    ctx: ScanContext<R>,
    layout: RecordLayout,
    explicit_headers: Option<Vec<String>>,
    read_headers: bool,
    skip_bom: bool,
    header_state: HeaderState,
    current: Option<RowState>,
    next_index: usize,
    /// A data row has been handed out
    yielded: bool,
    finished: bool,
    cached: Option<Vec<Record>>,
}

impl CsvReader<Exhausted> {
    /// Parse an in-memory slice. The size cap does not apply.
    pub fn from_slice(data: &[u8], options: ReaderOptions) -> Result<Self> {
        Self::with_buffer(StreamBuffer::preloaded(data), options)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(data: &str, options: ReaderOptions) -> Result<Self> {
        Self::from_slice(data.as_bytes(), options)
    }
}

impl<R: Reader> CsvReader<R> {
    /// Parse a chunked source.
    ///
    /// Fails with [`CsvError::Config`] on invalid lexical settings, or when
    /// both explicit headers and a shape are supplied.
    pub fn new(reader: R, options: ReaderOptions) -> Result<Self> {
        let mut buffer = StreamBuffer::new(reader);
        buffer.set_max_buffer_size(options.max_buffer_size);
        buffer.set_allow_buffer_to_be_exceeded(options.allow_buffer_to_be_exceeded);
        Self::with_buffer(buffer, options)
    }

    fn with_buffer(buffer: StreamBuffer<R>, options: ReaderOptions) -> Result<Self> {
        if options.headers.is_some() && options.shape.is_some() {
            return Err(CsvError::Config("headers and shape cannot both be supplied"));
        }
        let syntax = options.dialect.compile()?;
        let layout = RecordLayout::default()
            .with_shape(options.shape)
            .include_extra_cells(options.include_extra_cells)
            .strict_columns(options.strict_columns)
            .with_transform(options.transform);

        Ok(Self {
            ctx: ScanContext::new(buffer, syntax),
            layout,
            explicit_headers: options.headers,
            read_headers: options.read_headers,
            skip_bom: options.skip_bom,
            header_state: HeaderState::Pending,
            current: None,
            next_index: 1,
            yielded: false,
            finished: false,
            cached: None,
        })
    }

    /// The header list, reading the header row first if needed.
    pub fn headers(&mut self) -> Result<&[String]> {
        self.resolve_headers()?;
        Ok(self.layout.headers())
    }

    /// The projection applied to each data row.
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Bytes currently held by the buffer.
    pub fn buffered_bytes(&self) -> usize {
        self.ctx.buffer.retained_bytes()
    }

    fn resolve_headers(&mut self) -> Result<()> {
        if self.header_state == HeaderState::Resolved {
            return Ok(());
        }
        if self.skip_bom {
            self.strip_bom()?;
        }

        let header_row = if self.read_headers && !self.ctx.at_end()? {
            self.next_index += 1;
            Some(self.ctx.read_row()?)
        } else {
            None
        };

        let headers = match (self.explicit_headers.take(), header_row) {
            (Some(explicit), _) => explicit,
            (None, Some(row)) => row,
            (None, None) => self
                .layout
                .shape()
                .map(|shape| shape.keys().map(str::to_owned).collect())
                .unwrap_or_default(),
        };
        self.layout.set_headers(headers);
        self.header_state = HeaderState::Resolved;
        Ok(())
    }

    /// Consume every byte-order marker at the very start of the input.
    fn strip_bom(&mut self) -> Result<()> {
        let stripped = self.ctx.buffer.drive(|b| {
            let mut count = 0usize;
            loop {
                for (offset, &expected) in UTF8_BOM.iter().enumerate() {
                    match b.peek(offset) {
                        Peek::Byte(byte) if byte == expected => {}
                        Peek::Pending => return Ok(Step::NeedMoreInput),
                        _ => return Ok(Step::Ready(count)),
                    }
                }
                for &byte in &UTF8_BOM {
                    b.expect(byte)?;
                }
                count += 1;
            }
        })?;
        if stripped > 0 {
            debug!("stripped {stripped} byte-order marker(s)");
        }
        Ok(())
    }

    /// Skip whatever the consumer left of the previous row.
    fn settle_row(&mut self) -> Result<()> {
        if let Some(state) = self.current.as_mut() {
            if !state.is_finished() {
                Row::new(&mut self.ctx, state, &self.layout).skip()?;
            }
        }
        self.current = None;
        Ok(())
    }

    /// Position at the next data row. `None` once the input is exhausted.
    fn advance(&mut self) -> Result<Option<usize>> {
        self.resolve_headers()?;
        self.settle_row()?;
        if self.finished {
            return Ok(None);
        }
        if self.ctx.at_end()? {
            debug!("document finished after {} rows", self.next_index - 1);
            self.finished = true;
            return Ok(None);
        }
        let index = self.next_index;
        self.next_index += 1;
        self.yielded = true;
        Ok(Some(index))
    }

    /// Hand out the next data row. Whatever is left of the previous row is
    /// skipped first.
    pub fn next_row(&mut self) -> Result<Option<Row<'_, R>>> {
        let Some(index) = self.advance()? else {
            return Ok(None);
        };
        let state = self.current.insert(RowState::new(index));
        Ok(Some(Row::new(&mut self.ctx, state, &self.layout)))
    }

    /// Read and project the next data row.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let Some(index) = self.advance()? else {
            return Ok(None);
        };
        let values = self.ctx.read_row()?;
        self.layout.project(values, Some(index)).map(Some)
    }

    /// Iterator over the remaining records. Stops after the first error.
    pub fn records(&mut self) -> Records<'_, R> {
        Records {
            reader: self,
            failed: false,
        }
    }

    /// Iterator over the remaining data rows as raw cell values.
    pub fn rows(&mut self) -> Rows<'_, R> {
        Rows {
            reader: self,
            failed: false,
        }
    }
}

impl<R: Reader> Token for CsvReader<R> {
    type Value = Vec<Record>;
    type Item<'t>
        = Row<'t, R>
    where
        Self: 't;

    /// Read every record of the document.
    fn read(&mut self) -> Result<Vec<Record>> {
        if let Some(records) = &self.cached {
            return Ok(records.clone());
        }
        if self.yielded || self.finished {
            return Err(CsvError::TokenConsumed);
        }
        let records = self.records().collect::<Result<Vec<_>>>()?;
        self.cached = Some(records.clone());
        Ok(records)
    }

    fn next_item(&mut self) -> Result<Option<Row<'_, R>>> {
        self.next_row()
    }

    fn skip(&mut self) -> Result<()> {
        while let Some(mut row) = self.next_row()? {
            row.skip()?;
        }
        Ok(())
    }

    fn is_consumed(&self) -> bool {
        self.finished
    }
}

/// Iterator returned by [`CsvReader::records`].
#[derive(Debug)]
pub struct Records<'r, R> {
    reader: &'r mut CsvReader<R>,
    failed: bool,
}

impl<R: Reader> Iterator for Records<'_, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = self.reader.next_record().transpose();
        self.failed = matches!(result, Some(Err(_)));
        result
    }
}

/// Iterator returned by [`CsvReader::rows`].
#[derive(Debug)]
pub struct Rows<'r, R> {
    reader: &'r mut CsvReader<R>,
    failed: bool,
}

impl<R: Reader> Iterator for Rows<'_, R> {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let result = match self.reader.next_row() {
            Ok(Some(mut row)) => Some(row.read()),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        };
        self.failed = matches!(result, Some(Err(_)));
        result
    }
}
