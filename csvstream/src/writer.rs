// SPDX-License-Identifier: Apache-2.0

//! Encoder from records back to CSV text.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use log::debug;

use crate::record::{Record, RecordTransform};
use crate::Result;

const BOM: &str = "\u{feff}";

/// Configuration for a [`CsvWriter`].
#[derive(Clone)]
pub struct WriterOptions {
    headers: Option<Vec<String>>,
    delimiter: char,
    escape_char: char,
    quote_char: char,
    newline: String,
    write_bom: bool,
    always_write_headers: bool,
    transform: Option<RecordTransform>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            headers: None,
            delimiter: ',',
            escape_char: '"',
            quote_char: '"',
            newline: "\n".to_owned(),
            write_bom: false,
            always_write_headers: false,
            transform: None,
        }
    }
}

impl WriterOptions {
    /// Columns to write, in order. Defaults to the keys of the first record.
    pub fn headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.headers = Some(headers.into_iter().map(Into::into).collect());
        self
    }

    pub fn delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn escape_char(mut self, escape_char: char) -> Self {
        self.escape_char = escape_char;
        self
    }

    pub fn quote_char(mut self, quote_char: char) -> Self {
        self.quote_char = quote_char;
        self
    }

    pub fn newline(mut self, newline: impl Into<String>) -> Self {
        self.newline = newline.into();
        self
    }

    pub fn write_bom(mut self, write_bom: bool) -> Self {
        self.write_bom = write_bom;
        self
    }

    /// Write the header line even when there are no records. Needs explicit
    /// headers.
    pub fn always_write_headers(mut self, always: bool) -> Self {
        self.always_write_headers = always;
        self
    }

    /// Function applied to every record before it is written.
    pub fn transform(mut self, transform: impl Fn(Record) -> Record + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }
}

impl core::fmt::Debug for WriterOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WriterOptions")
            .field("headers", &self.headers)
            .field("delimiter", &self.delimiter)
            .field("escape_char", &self.escape_char)
            .field("quote_char", &self.quote_char)
            .field("newline", &self.newline)
            .field("write_bom", &self.write_bom)
            .field("always_write_headers", &self.always_write_headers)
            .finish_non_exhaustive()
    }
}

/// Writes records as CSV.
///
/// ```rust
/// use csvstream::{CsvWriter, Record, WriterOptions};
///
/// let records = vec![
///     Record::from_iter([("name", "Alice"), ("comment", "Hello, world!")]),
///     Record::from_iter([("name", "Bob"), ("comment", "He said \"Hi\"")]),
/// ];
/// let csv = CsvWriter::new(WriterOptions::default()).to_csv_string(records);
/// assert_eq!(
///     csv,
///     "name,comment\nAlice,\"Hello, world!\"\nBob,\"He said \"\"Hi\"\"\"\n"
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct CsvWriter {
    options: WriterOptions,
}

impl CsvWriter {
    pub fn new(options: WriterOptions) -> Self {
        Self { options }
    }

    /// Encode lazily, one piece of text at a time.
    pub fn stringify<I>(&self, records: I) -> Stringify<'_, I::IntoIter>
    where
        I: IntoIterator<Item = Record>,
    {
        Stringify {
            options: &self.options,
            records: records.into_iter(),
            headers: self.options.headers.clone(),
            pending: VecDeque::new(),
            started: false,
            written: 0,
            done: false,
        }
    }

    pub fn to_csv_string<I>(&self, records: I) -> String
    where
        I: IntoIterator<Item = Record>,
    {
        self.stringify(records).collect()
    }

    pub fn write_to<I, W>(&self, records: I, mut out: W) -> Result<()>
    where
        I: IntoIterator<Item = Record>,
        W: io::Write,
    {
        for piece in self.stringify(records) {
            out.write_all(piece.as_bytes())?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Iterator returned by [`CsvWriter::stringify`].
#[derive(Debug)]
pub struct Stringify<'w, I> {
    options: &'w WriterOptions,
    records: I,
    headers: Option<Vec<String>>,
    pending: VecDeque<String>,
    started: bool,
    written: usize,
    done: bool,
}

impl<I: Iterator<Item = Record>> Stringify<'_, I> {
    fn format_field<'f>(&self, field: &'f str) -> Cow<'f, str> {
        let quote = self.options.quote_char;
        let needs_quoting = field.contains(self.options.delimiter)
            || field.contains(quote)
            || field.contains(&['\n', '\r'][..]);
        if !needs_quoting {
            return Cow::Borrowed(field);
        }

        let mut quoted = String::with_capacity(field.len() + 2);
        quoted.push(quote);
        for c in field.chars() {
            if c == quote {
                quoted.push(self.options.escape_char);
            }
            quoted.push(c);
        }
        quoted.push(quote);
        Cow::Owned(quoted)
    }

    fn line<'f>(&self, fields: impl Iterator<Item = Cow<'f, str>>) -> String {
        let mut line = String::new();
        for (n, field) in fields.enumerate() {
            if n > 0 {
                line.push(self.options.delimiter);
            }
            line.push_str(&self.format_field(&field));
        }
        line
    }

    fn header_line(&self, headers: &[String]) -> String {
        self.line(headers.iter().map(|h| Cow::Borrowed(h.as_str())))
    }

    fn queue_record(&mut self, record: Record) {
        let record = match &self.options.transform {
            Some(transform) => transform(record),
            None => record,
        };
        let headers = self
            .headers
            .get_or_insert_with(|| record.keys().map(str::to_owned).collect())
            .clone();

        if self.written == 0 {
            let header = self.header_line(&headers);
            self.pending.push_back(header);
            self.pending.push_back(self.options.newline.clone());
        }
        let line = self.line(headers.iter().map(|name| {
            Cow::Owned(record.get(name).map(ToString::to_string).unwrap_or_default())
        }));
        self.pending.push_back(line);
        self.pending.push_back(self.options.newline.clone());
        self.written += 1;
    }
}

impl<I: Iterator<Item = Record>> Iterator for Stringify<'_, I> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        loop {
            if let Some(piece) = self.pending.pop_front() {
                return Some(piece);
            }
            if self.done {
                return None;
            }
            if !self.started {
                self.started = true;
                if self.options.write_bom {
                    self.pending.push_back(BOM.to_owned());
                }
                continue;
            }
            match self.records.next() {
                Some(record) => self.queue_record(record),
                None => {
                    self.done = true;
                    debug!("encoded {} records", self.written);
                    if self.written == 0 && self.options.always_write_headers {
                        if let Some(headers) = &self.options.headers {
                            // Header only, no trailing newline
                            let header = self.header_line(headers);
                            self.pending.push_back(header);
                        }
                    }
                }
            }
        }
    }
}
