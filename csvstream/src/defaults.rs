// SPDX-License-Identifier: Apache-2.0

/// Default cap on bytes retained by the buffer (100 KiB).
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 100;

/// Default size of the text pieces a streamed cell is emitted in (10 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 10;

/// Default number of bytes an [`IoReader`](crate::IoReader) requests per pull.
pub const DEFAULT_READ_SIZE: usize = 1024 * 8;

/// UTF-8 byte-order marker.
pub const UTF8_BOM: [u8; 3] = [0xef, 0xbb, 0xbf];
