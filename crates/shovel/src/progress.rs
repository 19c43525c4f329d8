//! 📊 progress.rs: "Are we there yet?" Every run, every time, forever.
//!
//! 🚀 One bar over the discovered files, a running tally in its message, and a table
//! so comfy it has lumbar support when the run is over.
//!
//! ⚠️ Watching this progress bar will not make it go faster. We've tried. Science says no.
//!
//! 🧠 Knowledge graph:
//! - Draws to stderr through indicatif, which goes quiet on its own when stderr is not a
//!   terminal. CI logs stay clean. Cron stays clean. The `tracing` output is the record.
//! - Only the supervisor's fold touches this. One writer, no locks, no drama.

use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

use crate::common::{BulkResult, RunSummary};

const BAR_TEMPLATE: &str = "{spinner} [{bar:40.cyan/blue}] {pos}/{len} files {msg}";

/// 🔢 Thousands separators, grouped from the right: 1234567 → "1,234,567".
fn format_count(n: usize) -> String {
    let digits = n.to_string();
    digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|group| std::str::from_utf8(group).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(",")
}

/// ⏱️ "7s", "2m 05s", "1h 02m 05s". Units only show up once they are earned.
fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    match (secs / 3600, secs % 3600 / 60, secs % 60) {
        (0, 0, s) => format!("{s}s"),
        (0, m, s) => format!("{m}m {s:02}s"),
        (h, m, s) => format!("{h}h {m:02}m {s:02}s"),
    }
}

/// 🏎️ Indexed documents per second, whole numbers only. Sub-second runs report the raw count.
fn documents_per_second(indexed: usize, elapsed: Duration) -> usize {
    let secs = elapsed.as_secs_f64();
    if secs < 1.0 {
        return indexed;
    }
    (indexed as f64 / secs).round() as usize
}

/// 📊 The file-level progress display for one run.
pub(crate) struct RunProgress {
    bar: ProgressBar,
    documents: BulkResult,
    failed_files: usize,
    started: Instant,
}

impl std::fmt::Debug for RunProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("RunProgress")
            .field("documents", &self.documents)
            .field("failed_files", &self.failed_files)
            .finish()
    }
}

impl RunProgress {
    pub(crate) fn new(total_files: usize) -> Self {
        let bar = ProgressBar::new(total_files as u64);
        // -- 🎨 the template is a constant, but we still refuse to unwrap on a user's terminal
        let style = ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        Self {
            bar,
            documents: BulkResult::default(),
            failed_files: 0,
            started: Instant::now(),
        }
    }

    /// 🔄 One more file done, for better or worse.
    pub(crate) fn file_finished(&mut self, documents: BulkResult, failed: bool) {
        self.documents += documents;
        if failed {
            self.failed_files += 1;
        }
        self.bar.set_message(format!(
            "{} docs, {} failed, {} failed file(s)",
            format_count(self.documents.succeeded),
            format_count(self.documents.failed),
            self.failed_files
        ));
        self.bar.inc(1);
    }

    /// ✅ Put the bar away and leave the summary table in its place.
    pub(crate) fn finish(&self, summary: &RunSummary) {
        self.bar
            .println(summary_table(summary, self.started.elapsed()).to_string());
        self.bar.finish_and_clear();
    }
}

/// 🍽️ The end-of-run table. Two columns, right-aligned, no borders. Minimalism.
pub(crate) fn summary_table(summary: &RunSummary, elapsed: Duration) -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    let rows = [
        ("files", format_count(summary.files_seen)),
        ("failed files", format_count(summary.failed_files)),
        ("documents indexed", format_count(summary.documents.succeeded)),
        ("documents failed", format_count(summary.documents.failed)),
        ("elapsed", format_elapsed(elapsed)),
        (
            "documents/s",
            format_count(documents_per_second(summary.documents.succeeded, elapsed)),
        ),
    ];
    for (label, value) in rows {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
