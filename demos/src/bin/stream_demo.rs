// SPDX-License-Identifier: Apache-2.0

// Example demonstrating CsvReader over a source that delivers tiny chunks

use csvstream::{ChunkReader, Coercion, CsvError, CsvReader, ReaderOptions, Shape};

fn main() -> Result<(), CsvError> {
    env_logger::init();

    println!("🚀 CsvReader Demo with ChunkReader");
    println!("==================================");

    let csv = b"\xef\xbb\xbfname,age,member\r\n\
Alice,30,true\r\n\
\"Bob \"\"The Builder\"\"\",25,false\r\n\
\"Carol, PhD\",41,TRUE\r\n";

    println!("📏 Total size: {} bytes", csv.len());
    println!("   Chunk size: 5 bytes (simulates small network packets)");
    println!();

    let shape = Shape::new()
        .column("name", Coercion::Text)
        .column("age", Coercion::Number)
        .column("member", Coercion::boolean());
    let options = ReaderOptions::default().shape(shape).strict_columns(true);
    let mut parser = CsvReader::new(ChunkReader::new(csv, 5), options)?;

    println!("🔑 Headers: {:?}", parser.headers()?);
    let mut count = 0;
    for record in parser.records() {
        let record = record?;
        count += 1;
        for (name, value) in record.iter() {
            println!("  {name}: {value:?}");
        }
        println!();
    }

    log::info!("{} bytes still buffered", parser.buffered_bytes());
    println!("✅ Successfully parsed {count} records!");
    Ok(())
}
