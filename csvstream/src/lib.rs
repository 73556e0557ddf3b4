// SPDX-License-Identifier: Apache-2.0

//! Incremental, chunk-resumable CSV tokenizer.
//!
//! Input arrives through a [`Reader`] one chunk at a time. Cells, rows and
//! records are scanned on demand, and a token split across two chunks is
//! rescanned from its checkpoint once the next chunk is in, so the output is
//! identical however the input happens to be cut.
//!
//! ```rust
//! use csvstream::{CsvReader, IterReader, ReaderOptions, Value};
//!
//! let parts = ["name,age\nAl", "ice,30\n\"Bob", " \"\"B\"\"\",25"];
//! let mut parser = CsvReader::new(IterReader::new(parts), ReaderOptions::default()).unwrap();
//!
//! let first = parser.next_record().unwrap().unwrap();
//! assert_eq!(first.get("name"), Some(&Value::from("Alice")));
//! let second = parser.next_record().unwrap().unwrap();
//! assert_eq!(second.get("name"), Some(&Value::from("Bob \"B\"")));
//! assert!(parser.next_record().unwrap().is_none());
//! ```

#[macro_use]
mod shared;
pub use shared::{Peek, Step, Token};

mod parse_error;
pub use parse_error::{CsvError, Result};

pub mod defaults;

mod chunk_reader;
pub use chunk_reader::{Chunk, ChunkReader, Exhausted, IoReader, IterReader, Reader};

mod stream_buffer;
pub use stream_buffer::StreamBuffer;

mod dialect;
pub use dialect::Dialect;

mod record;
pub use record::{Coercion, Record, RecordLayout, RecordTransform, Shape, Value};

mod cell;
pub use cell::{Cell, CellReader};

mod row;
pub use row::Row;

mod document;
pub use document::{CsvReader, ReaderOptions, Records, Rows};

mod writer;
pub use writer::{CsvWriter, Stringify, WriterOptions};
