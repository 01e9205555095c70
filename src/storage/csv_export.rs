use std::path::Path;

use crate::error::{Context, Result};
use crate::quote::Snapshot;

const HEADERS: [&str; 8] = [
    "symbol",
    "name",
    "currentPrice",
    "previousReference",
    "changeAbsolute",
    "changePercent",
    "volume",
    "capturedAt",
];

/// Write a snapshot to CSV, one row per quote in snapshot order.
pub fn export_csv<P: AsRef<Path>>(snapshot: &Snapshot, file_path: P) -> Result<()> {
    let path = file_path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV writer for {}", path.display()))?;

    writer.write_record(HEADERS)?;

    let captured_at = snapshot.captured_at().to_rfc3339();
    for quote in snapshot.entries() {
        writer.write_record(&[
            quote.symbol.clone(),
            quote.name.clone().unwrap_or_default(),
            quote.current_price.to_string(),
            optional(quote.previous_reference),
            quote.change_absolute.to_string(),
            quote.change_percent.to_string(),
            optional(quote.volume),
            captured_at.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
