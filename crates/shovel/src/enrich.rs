//! 🏷️ Event enrichment: give every event a name tag, a destination, and a time of arrival.
//!
//! 🎬 COLD OPEN. INT. BULK ENDPOINT, HIGH NOON
//!
//! The bulk API has rules. Two lines per document. Action metadata, then source.
//! Newline-delimited. The trailing newline on the whole body MATTERS.
//! This module takes raw lines, parses them, stamps them, and formats them into
//! exactly what `_bulk` wants to eat.
//!
//! ## Knowledge Graph 🧠
//! - Input: one `EventBatch` of raw lines + the target index name
//! - Output: one `Result<EnrichedEvent, MalformedEvent>` per line, same order
//! - `_id`: the event's own `id` when it has a usable one (so re-ingesting overwrites,
//!   not duplicates), otherwise a fresh UUID v4
//! - `_index`: the configured index, in the action line
//! - `@timestamp`: ONE UTC timestamp per batch, RFC 3339, microseconds, literal `Z`
//! - A line that is not a JSON object is a `MalformedEvent`. It does not take its
//!   199 batch-mates down with it.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::common::EventBatch;

/// 🏷️ The field the ingestion timestamp is written to.
pub const TIMESTAMP_FIELD: &str = "@timestamp";

// -- 🆔 the source field we trust as a document id
const SOURCE_ID_FIELD: &str = "id";

// -- 🚫 bulk metadata fields. the cluster refuses them inside `_source`, so they
// -- only ever travel in the action line.
const METADATA_FIELDS: [&str; 2] = ["_id", "_index"];

/// 📦 A parsed event with its indexing metadata attached.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedEvent {
    pub id: String,
    pub index: String,
    pub timestamp: String,
    /// 📄 The original object plus `@timestamp`, minus `_id` / `_index`.
    pub source: Map<String, Value>,
}

impl EnrichedEvent {
    /// 🔄 Render this event as a `_bulk` pair: `{"index":{...}}\n{...source...}`.
    ///
    /// No trailing newline. The sink assembles the full body and adds the `\n`s.
    pub fn to_bulk_entry(&self) -> Result<String, serde_json::Error> {
        let the_action_line = json!({
            "index": {
                "_index": self.index,
                "_id": self.id,
            }
        });
        let the_action = serde_json::to_string(&the_action_line)?;
        let the_source = serde_json::to_string(&self.source)?;
        Ok(format!("{the_action}\n{the_source}"))
    }
}

/// 💀 A line that could not become an event. Counted, logged, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEvent {
    pub line_number: usize,
    pub reason: String,
}

impl std::fmt::Display for MalformedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line_number, self.reason)
    }
}

/// ⏰ Now, in UTC, the way the index likes it: `2024-05-01T12:34:56.789012Z`.
pub fn ingestion_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// 🏭 Enrich every line of a batch. One timestamp for the whole batch.
pub fn enrich_batch(batch: EventBatch, index: &str) -> Vec<Result<EnrichedEvent, MalformedEvent>> {
    let timestamp = ingestion_timestamp();
    batch
        .lines
        .into_iter()
        .zip(batch.line_numbers)
        .map(|(line, line_number)| enrich_line(&line, line_number, index, &timestamp))
        .collect()
}

/// 🔬 Parse and stamp a single line.
pub fn enrich_line(
    line: &[u8],
    line_number: usize,
    index: &str,
    timestamp: &str,
) -> Result<EnrichedEvent, MalformedEvent> {
    let malformed = |reason: String| MalformedEvent { line_number, reason };

    let mut source = match serde_json::from_slice::<Value>(line) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            return Err(malformed(format!(
                "expected a JSON object, found {}",
                json_type_name(&other)
            )));
        }
        Err(err) => return Err(malformed(err.to_string())),
    };

    let id = source
        .get(SOURCE_ID_FIELD)
        .and_then(usable_id)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    for field in METADATA_FIELDS {
        source.remove(field);
    }
    source.insert(TIMESTAMP_FIELD.to_string(), Value::String(timestamp.to_string()));

    Ok(EnrichedEvent {
        id,
        index: index.to_string(),
        timestamp: timestamp.to_string(),
        source,
    })
}

/// 🆔 Strings that are not empty, and numbers (as written). Everything else gets a UUID.
fn usable_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
