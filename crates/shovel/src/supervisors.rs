//! 🎬 *[camera pans across a directory of ten thousand compressed logs]*
//! 🎬 *[dramatic orchestral music swells]*
//! 🎬 "In a world where files fail for no reason at all..."
//! 🎬 "One supervisor dared to keep going anyway."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor: part middle manager, part helicopter parent. It runs the run.
//!
//! 🧠 Knowledge graph, per file:
//! `tokio::fs::read` → `open_stream` (magic bytes) → `LineBatcher` → `enrich_batch` → `BulkSink::submit`
//! - Batches inside a file go strictly one after the other.
//! - Decoding is blocking `Read` work, so every batch is pulled on tokio's blocking pool.
//!   With `file_parallelism > 1`, one file inflating a fat zstd frame does not stall the
//!   others waiting on their bulk replies.
//! - Anything a single file raises (unreadable, unsupported, corrupt, cluster said no) is
//!   logged, counted as ONE failed file, and the run moves on to the next file.
//! - A file with even one failed document is also one failed file. Never more than one.
//! - Files are fanned out with `buffer_unordered(file_parallelism)`. The fold over the results
//!   is the only thing that writes the summary. One writer, no locks.
//! - Any failed file at all → `ShovelError::FailedFiles`. Zero files → success, with a shrug.

use std::error::Error as _;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use futures::{StreamExt, future, stream};
use tracing::{debug, error, info, warn};

use crate::app_config::AppConfig;
use crate::backends::{BackendHandle, BulkBackend};
use crate::batcher::LineBatcher;
use crate::common::{EventBatch, FileReport, RunSummary};
use crate::decompress::open_stream;
use crate::enrich::enrich_batch;
use crate::error::ShovelError;
use crate::progress::RunProgress;
use crate::sink::BulkSink;
use crate::walker::discover_files;

/// 📦 Owns the config, the one backend of the run, and the sink that feeds it.
#[derive(Debug)]
pub struct Supervisor {
    config: AppConfig,
    backend: BackendHandle,
    sink: BulkSink,
}

impl Supervisor {
    /// 🚀 The backend is chosen once, before we get here, and shared by every file.
    pub fn new(config: AppConfig, backend: BackendHandle) -> Self {
        let sink = BulkSink::new(config.runtime.retry_policy());
        Self {
            config,
            backend,
            sink,
        }
    }

    /// 🏁 Shovel every discovered file into the index.
    pub async fn run(&self) -> Result<RunSummary, ShovelError> {
        let files = discover_files(&self.config.files).await?;
        info!(
            "🪏 {} file(s) to shovel into '{}' via {} ({})",
            files.len(),
            self.config.index,
            self.backend.endpoint(),
            self.backend.kind()
        );

        let mut progress = RunProgress::new(files.len());
        let summary = stream::iter(files)
            .map(|path| async move {
                let outcome = self.process_file(&path).await;
                (path, outcome)
            })
            .buffer_unordered(self.config.runtime.file_parallelism.max(1))
            .fold(RunSummary::default(), |mut summary, (path, outcome)| {
                let (documents, failed) = match outcome {
                    Ok(report) => {
                        log_report(&path, &report);
                        (report.documents, report.is_failed())
                    }
                    Err(err) => {
                        error!("💀 {} failed: {}", path.display(), describe(&err));
                        if let Some(hint) = err.hint() {
                            warn!("🔧 hint: {hint}");
                        }
                        (Default::default(), true)
                    }
                };
                progress.file_finished(documents, failed);
                summary.record(documents, failed);
                future::ready(summary)
            })
            .await;
        progress.finish(&summary);

        info!(
            "🏁 run finished: {} file(s), {} failed, {} document(s) indexed, {} document(s) failed",
            summary.files_seen,
            summary.failed_files,
            summary.documents.succeeded,
            summary.documents.failed
        );

        if summary.failed_files > 0 {
            return Err(ShovelError::FailedFiles {
                failed: summary.failed_files,
                total: summary.files_seen,
            });
        }
        Ok(summary)
    }

    /// 📂 One file, start to finish. Errors bubble up to `run`, which counts them.
    async fn process_file(&self, path: &Path) -> Result<FileReport, ShovelError> {
        let raw = tokio::fs::read(path)
            .await
            .map_err(|source| ShovelError::FileRead {
                path: PathBuf::from(path),
                source,
            })?;
        let compressed_bytes = raw.len();
        let (kind, reader) = open_stream(raw)?;
        debug!("🗜️ {} is {kind} ({compressed_bytes} bytes compressed)", path.display());

        let mut report = FileReport::default();
        let mut batcher = LineBatcher::new(reader, self.config.runtime.batch_size);
        loop {
            let (returned, next) = pull_batch(batcher).await?;
            batcher = returned;
            let Some(batch) = next else { break };
            let batch = batch.map_err(|source| ShovelError::Decompression { source })?;
            debug!(
                "📦 {} batch {}: {} event(s) from line {}",
                path.display(),
                report.batches + 1,
                batch.len(),
                batch.first_line().unwrap_or_default()
            );
            let events = enrich_batch(batch, &self.config.index);
            let result = self.sink.submit(&self.backend, events).await?;
            report.batches += 1;
            report.documents += result;
        }
        Ok(report)
    }
}

type FileBatcher = LineBatcher<Box<dyn BufRead + Send>>;

/// 🧵 Pull the next batch on the blocking pool and hand the batcher back for the next round.
async fn pull_batch(
    mut batcher: FileBatcher,
) -> Result<(FileBatcher, Option<io::Result<EventBatch>>), ShovelError> {
    tokio::task::spawn_blocking(move || {
        let next = batcher.next();
        (batcher, next)
    })
    .await
    .map_err(|join_error| ShovelError::Decompression {
        source: io::Error::other(join_error),
    })
}

fn log_report(path: &Path, report: &FileReport) {
    if report.is_failed() {
        error!(
            "💀 {} failed: {} of {} document(s) were not indexed",
            path.display(),
            report.documents.failed,
            report.documents.succeeded + report.documents.failed
        );
    } else {
        info!(
            "✅ {}: {} document(s) in {} batch(es)",
            path.display(),
            report.documents.succeeded,
            report.batches
        );
    }
}

/// 🧅 The error plus every cause underneath it, on one line.
fn describe(err: &ShovelError) -> String {
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BackendConfig, LocalOpenSearch};
    use crate::decompress::fixtures;
    use crate::enrich::TIMESTAMP_FIELD;
    use serde_json::{Value, json};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// 🤝 A cluster that says yes to every document it is sent.
    struct AckEverything;

    impl Respond for AckEverything {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let documents = String::from_utf8_lossy(&request.body).lines().count() / 2;
            let items: Vec<_> = (0..documents)
                .map(|_| json!({"index": {"status": 201}}))
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({"errors": false, "items": items}))
        }
    }

    async fn acking_cluster() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(AckEverything)
            .mount(&server)
            .await;
        server
    }

    fn supervisor_for(server: &MockServer, files: &str) -> Supervisor {
        let backend_config = BackendConfig::new("127.0.0.1", server.address().port());
        let mut config = AppConfig::new(backend_config.clone(), "events", files);
        config.runtime.initial_backoff_ms = 1;
        config.runtime.max_backoff_ms = 2;
        let backend = BackendHandle::Local(LocalOpenSearch::new(&backend_config).unwrap());
        Supervisor::new(config, backend)
    }

    /// 📄 Every (action, source) pair the cluster received, across all requests.
    async fn posted_documents(server: &MockServer) -> Vec<(Value, Value)> {
        let mut documents = Vec::new();
        for request in server.received_requests().await.unwrap() {
            let body = String::from_utf8(request.body).unwrap();
            let lines: Vec<&str> = body.lines().collect();
            for pair in lines.chunks(2) {
                documents.push((
                    serde_json::from_str(pair[0]).unwrap(),
                    serde_json::from_str(pair[1]).unwrap(),
                ));
            }
        }
        documents
    }

    #[tokio::test]
    async fn the_one_where_one_good_file_and_one_garbage_file_make_one_failure() {
        let server = acking_cluster().await;
        let dir = tempfile::tempdir().unwrap();
        let event = json!({"id": "evt-1", "msg": "hello", "level": "info"});
        std::fs::write(
            dir.path().join("good.json.zst"),
            fixtures::zstd(format!("{event}\n").as_bytes()),
        )
        .unwrap();
        std::fs::write(dir.path().join("garbage.json.gz"), b"this is not compressed at all").unwrap();

        let err = supervisor_for(&server, dir.path().to_str().unwrap())
            .run()
            .await
            .unwrap_err();
        assert!(
            matches!(err, ShovelError::FailedFiles { failed: 1, total: 2 }),
            "{err:?}"
        );

        let documents = posted_documents(&server).await;
        assert_eq!(documents.len(), 1, "exactly one document made it");
        let (action, mut source) = documents.into_iter().next().unwrap();
        assert_eq!(action["index"]["_index"], "events");
        assert_eq!(action["index"]["_id"], "evt-1");
        assert!(source[TIMESTAMP_FIELD].as_str().unwrap().ends_with('Z'));
        source.as_object_mut().unwrap().remove(TIMESTAMP_FIELD);
        assert_eq!(source, event, "original fields survive untouched");
    }

    #[tokio::test]
    async fn the_one_where_a_thousand_identical_events_share_one_id() {
        let server = acking_cluster().await;
        let dir = tempfile::tempdir().unwrap();
        let event = json!({"id": "same-every-time", "n": 7});
        let contents = format!("{event}\n").repeat(1000);
        let file = dir.path().join("dupes.json.gz");
        std::fs::write(&file, fixtures::gzip(contents.as_bytes())).unwrap();

        let summary = supervisor_for(&server, file.to_str().unwrap())
            .run()
            .await
            .unwrap();
        assert_eq!(summary.files_seen, 1);
        assert_eq!(summary.failed_files, 0);
        assert_eq!(summary.documents.succeeded, 1000);

        assert_eq!(server.received_requests().await.unwrap().len(), 5, "1000 / 200 = 5 bulk requests");
        let documents = posted_documents(&server).await;
        assert_eq!(documents.len(), 1000);
        for (action, mut source) in documents {
            assert_eq!(action["index"]["_id"], "same-every-time");
            source.as_object_mut().unwrap().remove(TIMESTAMP_FIELD);
            assert_eq!(source, event);
        }
    }

    #[tokio::test]
    async fn the_one_where_a_missing_file_is_counted_and_the_run_keeps_digging() {
        let server = acking_cluster().await;
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.gz");
        std::fs::write(&present, fixtures::gzip(b"{\"a\":1}\n{\"a\":2}\n")).unwrap();
        let missing = dir.path().join("gone.gz");
        let files = format!("{}, {}", missing.display(), present.display());

        let err = supervisor_for(&server, &files).run().await.unwrap_err();
        assert!(
            matches!(err, ShovelError::FailedFiles { failed: 1, total: 2 }),
            "{err:?}"
        );
        assert_eq!(posted_documents(&server).await.len(), 2, "the file after the missing one still went in");
    }

    #[tokio::test]
    async fn the_one_where_a_corrupt_gzip_fails_alone_and_the_next_file_still_lands() {
        let server = acking_cluster().await;
        let dir = tempfile::tempdir().unwrap();
        let body: String = (0..150)
            .map(|n| format!("{}\n", json!({"n": n, "note": format!("line number {n} of a doomed file")})))
            .collect();
        let mut corrupt = fixtures::gzip(body.as_bytes());
        corrupt.truncate(corrupt.len() / 2);
        std::fs::write(dir.path().join("a-corrupt.gz"), corrupt).unwrap();
        std::fs::write(
            dir.path().join("b-fine.gz"),
            fixtures::gzip(b"{\"id\":\"ok-1\"}\n{\"id\":\"ok-2\"}\n"),
        )
        .unwrap();

        let err = supervisor_for(&server, dir.path().to_str().unwrap())
            .run()
            .await
            .unwrap_err();
        assert!(
            matches!(err, ShovelError::FailedFiles { failed: 1, total: 2 }),
            "{err:?}"
        );

        let ids: Vec<_> = posted_documents(&server)
            .await
            .into_iter()
            .map(|(action, _)| action["index"]["_id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("ok-1"), json!("ok-2")], "only the healthy file was indexed");
    }

    #[tokio::test]
    async fn the_one_where_stray_blank_lines_fail_the_file() {
        let server = acking_cluster().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("holey.gz");
        std::fs::write(&file, fixtures::gzip(b"{\"a\":1}\n\n   \n{\"b\":2}\n")).unwrap();

        let err = supervisor_for(&server, file.to_str().unwrap())
            .run()
            .await
            .unwrap_err();
        assert!(
            matches!(err, ShovelError::FailedFiles { failed: 1, total: 1 }),
            "{err:?}"
        );
        assert_eq!(posted_documents(&server).await.len(), 2, "the real events still went in");
    }

    #[tokio::test]
    async fn the_one_where_batches_come_back_from_the_blocking_pool_in_order() {
        let raw = fixtures::zstd(format!("{}\n", json!({"k": "v"})).repeat(450).as_bytes());
        let (_, reader) = open_stream(raw).unwrap();
        let mut batcher = LineBatcher::new(reader, 200);
        let mut sizes = Vec::new();
        loop {
            let (returned, next) = pull_batch(batcher).await.unwrap();
            batcher = returned;
            match next {
                Some(batch) => sizes.push(batch.unwrap().len()),
                None => break,
            }
        }
        assert_eq!(sizes, vec![200, 200, 50]);
    }

    #[tokio::test]
    async fn the_one_where_zero_files_is_still_a_success() {
        let server = acking_cluster().await;
        let dir = tempfile::tempdir().unwrap();

        let summary = supervisor_for(&server, dir.path().to_str().unwrap())
            .run()
            .await
            .unwrap();
        assert_eq!(summary, RunSummary::default());
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn the_one_where_a_malformed_line_fails_its_file_but_not_its_neighbors() {
        let server = acking_cluster().await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.zst"),
            fixtures::zstd(b"{\"ok\":1}\nnot json at all\n{\"ok\":2}\n"),
        )
        .unwrap();

        let err = supervisor_for(&server, dir.path().to_str().unwrap())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ShovelError::FailedFiles { failed: 1, total: 1 }));
        assert_eq!(posted_documents(&server).await.len(), 2, "the good lines were still indexed");
    }

    #[tokio::test]
    async fn the_one_where_a_cluster_that_says_no_fails_every_file_but_the_run_finishes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("index is read-only"))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.gz"), fixtures::gzip(b"{\"a\":1}\n")).unwrap();
        std::fs::write(dir.path().join("b.gz"), fixtures::gzip(b"{\"b\":1}\n")).unwrap();

        let err = supervisor_for(&server, dir.path().to_str().unwrap())
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, ShovelError::FailedFiles { failed: 2, total: 2 }), "{err:?}");
        assert_eq!(server.received_requests().await.unwrap().len(), 2, "one attempt per file");
    }

    #[tokio::test]
    async fn the_one_where_files_go_in_side_by_side() {
        let server = acking_cluster().await;
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c", "d"] {
            let lines = format!("{}\n", json!({"file": name})).repeat(3);
            std::fs::write(dir.path().join(format!("{name}.gz")), fixtures::gzip(lines.as_bytes())).unwrap();
        }

        let mut supervisor = supervisor_for(&server, dir.path().to_str().unwrap());
        supervisor.config.runtime.file_parallelism = 3;
        let summary = supervisor.run().await.unwrap();
        assert_eq!(summary.files_seen, 4);
        assert_eq!(summary.documents.succeeded, 12);
    }

    #[test]
    fn the_one_where_the_error_onion_is_peeled_into_one_line() {
        let err = ShovelError::FileRead {
            path: PathBuf::from("/nope.gz"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let described = describe(&err);
        assert!(described.contains("/nope.gz"), "{described}");
        assert!(described.ends_with("no such file"), "{described}");
    }
}
