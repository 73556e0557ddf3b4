// SPDX-License-Identifier: Apache-2.0

// Example demonstrating the low-level cell and row handles

use csvstream::{CellReader, CsvError, CsvReader, Dialect, IterReader, ReaderOptions, Token};

fn main() -> Result<(), CsvError> {
    env_logger::init();

    // Cells without row structure, separated by ';' and a literal terminator
    let dialect = Dialect::default().separator(';').newline("<EOL>");
    let parts = ["alpha;be", "ta<E", "OL>gam", "ma"];
    let mut cells = CellReader::new(IterReader::new(parts), dialect)?;
    println!("📋 Cells:");
    while let Some(text) = cells.read_cell()? {
        println!("  {text:?}");
    }
    println!();

    // A large field streamed piece by piece, keeping memory near the piece size
    let mut big = String::from("id,payload\n1,\"");
    big.push_str(&"lorem ipsum ".repeat(64));
    big.push_str("\"\n2,small\n");

    let options = ReaderOptions::default().chunk_size(128);
    let mut parser = CsvReader::from_str(&big, options)?;
    println!("📝 Rows:");
    while let Some(mut row) = parser.next_row()? {
        let index = row.index();
        let mut column = 0;
        while let Some(mut cell) = row.next_item()? {
            let mut pieces = 0;
            let mut bytes = 0;
            while let Some(piece) = cell.next_item()? {
                pieces += 1;
                bytes += piece.len();
            }
            println!("  row {index} cell {column}: {bytes} bytes in {pieces} piece(s)");
            column += 1;
        }
    }

    println!();
    println!("✅ Done!");
    Ok(())
}
