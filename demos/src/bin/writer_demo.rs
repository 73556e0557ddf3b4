// SPDX-License-Identifier: Apache-2.0

// Example demonstrating a parse, transform and write round trip

use csvstream::{CsvError, CsvReader, CsvWriter, ReaderOptions, Value, WriterOptions};

fn main() -> Result<(), CsvError> {
    env_logger::init();

    let input = "first,last,age\nAlice,Smith,30\nBob,\"O'Brien, Jr.\",25\n";
    let mut parser = CsvReader::from_str(input, ReaderOptions::default())?;
    let records = parser.records().collect::<Result<Vec<_>, _>>()?;

    let options = WriterOptions::default()
        .delimiter(';')
        .newline("\r\n")
        .transform(|mut record| {
            let full = format!(
                "{} {}",
                record.remove("first").unwrap_or(Value::Absent),
                record.remove("last").unwrap_or(Value::Absent)
            );
            record.insert("full_name", full);
            record
        });
    let writer = CsvWriter::new(options);

    println!("📄 Pieces:");
    for piece in writer.stringify(records.clone()) {
        println!("  {piece:?}");
    }
    println!();

    let stdout = std::io::stdout();
    writer.write_to(records, stdout.lock())?;
    Ok(())
}
