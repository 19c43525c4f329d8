//! 📦 Common data structures, the buckets the shovel fills.
//!
//! 🎬 COLD OPEN. INT. ARCHIVE BUCKET, 3:47 AM
//!
//! Ten thousand compressed log files sit in a directory. Nobody has looked at
//! them since the incident. Then an `EventBatch` arrives, carrying exactly two
//! hundred lines like a responsible adult carrying groceries in one trip.
//! It does not know what is inside the lines. It does not ask. It carries.
//!
//! This module defines the humble, load-bearing structs that ferry event lines
//! from the decoder to the cluster, and the tallies that tell you how it went. 🦆

use serde::Serialize;

/// 🧾 One line of decoded bytes. Probably JSON. Hopefully an object.
/// Trailing `\n` / `\r\n` already stripped.
pub type EventLine = Vec<u8>;

/// 📦 An `EventBatch`, because one event per request is how you get a post-mortem.
///
/// Built by the [`LineBatcher`](crate::batcher::LineBatcher). Never empty.
/// Every batch of a file is full except maybe the last one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    pub lines: Vec<EventLine>,
    /// 🔢 1-based line number (in the decompressed stream) of each entry in `lines`.
    /// These match `zcat file | sed -n Np`.
    pub line_numbers: Vec<usize>,
}

impl EventBatch {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn first_line(&self) -> Option<usize> {
        self.line_numbers.first().copied()
    }

    /// 📊 Total bytes across all lines. One iterator. One map. One sum.
    pub fn total_bytes(&self) -> usize {
        self.lines.iter().map(Vec::len).sum()
    }
}

/// ⚖️ What a single bulk submission amounted to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BulkResult {
    pub succeeded: usize,
    pub failed: usize,
}

impl BulkResult {
    pub fn new(succeeded: usize, failed: usize) -> Self {
        Self { succeeded, failed }
    }
}

impl std::ops::AddAssign for BulkResult {
    fn add_assign(&mut self, rhs: Self) {
        self.succeeded += rhs.succeeded;
        self.failed += rhs.failed;
    }
}

/// 📂 How one file went, assuming it made it to the end.
#[derive(Debug, Default)]
pub struct FileReport {
    pub batches: usize,
    pub documents: BulkResult,
}

impl FileReport {
    /// 💀 A file is failed if ANY of its documents failed. One bad apple, whole barrel.
    pub fn is_failed(&self) -> bool {
        self.documents.failed > 0
    }
}

/// 🏁 The run in numbers. Only `failed_files` decides the exit status;
/// the document counts are for the humans reading the logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub files_seen: usize,
    pub failed_files: usize,
    pub documents: BulkResult,
}

impl RunSummary {
    /// 📥 Fold one file's outcome in. `failed` is true when the file either reported
    /// failed documents or raised. Either way it contributes exactly 1.
    pub(crate) fn record(&mut self, documents: BulkResult, failed: bool) {
        self.files_seen += 1;
        self.documents += documents;
        if failed {
            self.failed_files += 1;
        }
    }
}
