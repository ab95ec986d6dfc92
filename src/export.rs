// 📤 CSV Export - History as a downloadable spreadsheet

use crate::db::OperationRecord;
use anyhow::{Context, Result};
use std::io::Write;

pub const CSV_HEADER: [&str; 4] = ["id", "expression", "result", "created_at"];

/// Write `records` in the order given (callers pass newest first)
pub fn write_history_csv<W: Write>(records: &[OperationRecord], writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(CSV_HEADER)?;
    for op in records {
        wtr.write_record([
            op.id.to_string(),
            op.expression.clone(),
            op.result.to_string(),
            op.created_at.to_rfc3339(),
        ])
        .with_context(|| format!("Failed to write CSV row for operation {}", op.id))?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn history_csv_bytes(records: &[OperationRecord]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_history_csv(records, &mut buf)?;
    Ok(buf)
}
