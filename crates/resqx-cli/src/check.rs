//! Offline validation of a captured feed payload.

use std::path::Path;

use anyhow::Context;
use resqx_feed::{parse_snapshot, Batch};
use serde_json::Value;

/// Parses `file` with the live feed's validation rules and prints the result.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not JSON, or does not
/// have the snapshot shape.
pub(crate) fn run_check_payload(file: &Path) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let batch = check_payload(&text)?;

    for record in &batch.records {
        println!(
            "{:<24} {:<16} {:>10.5} {:>11.5} {}",
            record.id,
            record.professional_type.to_string(),
            record.coordinates.latitude(),
            record.coordinates.longitude(),
            if record.is_online { "online" } else { "offline" },
        );
    }
    println!(
        "accepted: {}  hidden: {} (invalid coordinates: {}, malformed: {}, unrecognized category: {})",
        batch.records.len(),
        batch.hidden.total(),
        batch.hidden.invalid_coordinates,
        batch.hidden.malformed,
        batch.hidden.unrecognized_category,
    );
    Ok(())
}

/// Accepts either the snapshot object or a whole `[event, payload]` array
/// as captured off the wire.
fn check_payload(text: &str) -> anyhow::Result<Batch> {
    let value: Value = serde_json::from_str(text).context("payload is not valid JSON")?;
    let payload = match &value {
        Value::Array(items) if items.first().is_some_and(Value::is_string) => items
            .get(1)
            .context("event array carries no payload")?,
        other => other,
    };
    parse_snapshot(payload).context("payload does not have the snapshot shape")
}
