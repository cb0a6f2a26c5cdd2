//! Run orchestration: subdomain × object assignments on a worker pool

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use deskline_core::{JsonlSink, SharedProgress, cleanup_tmp_files, fmt_num, is_shutdown_requested};
use indicatif::ProgressBar;

use crate::config::{FetchConfig, SourceConfig, ValidationErrors};
use crate::object::ObjectKind;
use crate::reader::RecordReader;
use crate::schema::RecordSchema;

/// Everything a run needs
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: SourceConfig,
    pub output_dir: PathBuf,
    pub workers: usize,
}

/// One subdomain × object kind unit of work
#[derive(Debug, Clone)]
pub struct Assignment {
    pub subdomain: String,
    pub kind: ObjectKind,
    pub schema: Arc<RecordSchema>,
}

impl Assignment {
    pub fn label(&self) -> String {
        format!("{}/{}", self.subdomain, self.kind.snake_name())
    }

    /// `<output_dir>/<object>/<subdomain>.jsonl`
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir
            .join(self.kind.snake_name())
            .join(format!("{}.jsonl", self.subdomain))
    }
}

/// Validate the source config and expand it into assignments.
pub fn plan(source: &SourceConfig) -> Result<(FetchConfig, Vec<Assignment>), ValidationErrors> {
    let fetch = source.resolve()?;
    let kinds = source.object_kinds()?;
    let mut assignments = Vec::new();
    for subdomain in source.subdomains() {
        for &kind in &kinds {
            assignments.push(Assignment {
                subdomain: subdomain.clone(),
                kind,
                schema: source.output_schema(kind)?,
            });
        }
    }
    Ok((fetch, assignments))
}

/// Result of one finished assignment
#[derive(Debug, Clone)]
pub struct AssignmentStats {
    pub label: String,
    pub records: usize,
    pub elapsed: Duration,
}

impl AssignmentStats {
    pub fn log(&self) {
        log::info!(
            "{}: {} records in {:.1}s",
            self.label,
            fmt_num(self.records),
            self.elapsed.as_secs_f64()
        );
    }
}

/// Run every assignment, writing one JSONL file each.
pub fn run(config: &RunConfig, progress: &SharedProgress) -> anyhow::Result<RunSummary> {
    let start = Instant::now();
    let (fetch, assignments) = plan(&config.source)?;

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("Cannot create {}", config.output_dir.display()))?;
    cleanup_tmp_files(&config.output_dir)?;

    if assignments.is_empty() {
        log::warn!("Nothing to fetch");
        return Ok(RunSummary::empty());
    }

    let workers = config.workers.clamp(1, assignments.len());
    log::info!(
        "Fetching {} assignments with {} workers into {}",
        assignments.len(),
        workers,
        config.output_dir.display()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("deskline-worker-{i}"))
        .build()
        .context("Cannot build worker pool")?;

    let overall_pb = progress.overall_bar("assignments", assignments.len() as u64);
    let next_idx = AtomicUsize::new(0);
    let stats: Mutex<Vec<AssignmentStats>> = Mutex::new(Vec::new());
    let failures: Mutex<Vec<(String, String)>> = Mutex::new(Vec::new());

    pool.scope(|s| {
        for _ in 0..workers {
            s.spawn(|_| {
                loop {
                    // Atomically claim the next assignment
                    let idx = next_idx.fetch_add(1, Ordering::SeqCst);
                    if idx >= assignments.len() || is_shutdown_requested() {
                        break;
                    }
                    let assignment = &assignments[idx];
                    let pb = progress.record_bar(&assignment.label());

                    match process_assignment(&fetch, assignment, &config.output_dir, &pb) {
                        Ok(s) => {
                            s.log();
                            stats.lock().unwrap_or_else(|e| e.into_inner()).push(s);
                        }
                        Err(e) => {
                            log::error!("{}: {e:#}", assignment.label());
                            failures
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .push((assignment.label(), format!("{e:#}")));
                        }
                    }
                    pb.finish_and_clear();
                    overall_pb.inc(1);
                }
            });
        }
    });

    overall_pb.finish_and_clear();

    let stats = stats.into_inner().unwrap_or_else(|e| e.into_inner());
    let failures = failures.into_inner().unwrap_or_else(|e| e.into_inner());
    let summary = RunSummary {
        total: assignments.len(),
        completed: stats.len(),
        failed: failures.len(),
        records: stats.iter().map(|s| s.records).sum(),
        elapsed: start.elapsed(),
        assignments: stats,
        failures,
    };
    summary.log();
    Ok(summary)
}

/// Fetch one assignment into its output file.
pub fn process_assignment(
    fetch: &FetchConfig,
    assignment: &Assignment,
    output_dir: &Path,
    pb: &ProgressBar,
) -> anyhow::Result<AssignmentStats> {
    let reader = RecordReader::new(
        fetch,
        assignment.kind,
        &assignment.subdomain,
        Arc::clone(&assignment.schema),
    )
    .with_context(|| format!("Cannot open {}", assignment.label()))?;
    export(reader, assignment, output_dir, pb, is_shutdown_requested)
}

/// Drain `reader` into the assignment's JSONL file.
///
/// `should_stop` is polled before each record; stopping discards the partial
/// file. Any error also discards it, so a file exists only for a complete
/// export.
pub fn export(
    mut reader: RecordReader,
    assignment: &Assignment,
    output_dir: &Path,
    pb: &ProgressBar,
    should_stop: impl Fn() -> bool,
) -> anyhow::Result<AssignmentStats> {
    let start = Instant::now();
    let path = assignment.output_path(output_dir);
    let dir = path.parent().unwrap_or(output_dir);
    let mut sink = JsonlSink::new(dir, &assignment.subdomain)
        .with_context(|| format!("Cannot create {}", path.display()))?;

    let result = drain(&mut reader, &mut sink, pb, should_stop);
    reader.close();

    match result {
        Ok(()) => {
            let records = sink
                .finalize()
                .with_context(|| format!("Cannot finalize {}", path.display()))?;
            Ok(AssignmentStats {
                label: assignment.label(),
                records,
                elapsed: start.elapsed(),
            })
        }
        Err(e) => {
            if let Err(abort_err) = sink.abort() {
                log::warn!("Cannot remove partial output for {}: {abort_err}", path.display());
            }
            Err(e)
        }
    }
}

fn drain(
    reader: &mut RecordReader,
    sink: &mut JsonlSink,
    pb: &ProgressBar,
    should_stop: impl Fn() -> bool,
) -> anyhow::Result<()> {
    loop {
        if should_stop() {
            anyhow::bail!("interrupted");
        }
        if !reader.has_next()? {
            return Ok(());
        }
        let record = reader.next_record()?;
        sink.write_record(&record)?;
        pb.inc(1);
    }
}

/// Summary of a run
#[derive(Debug)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub records: usize,
    pub elapsed: Duration,
    pub assignments: Vec<AssignmentStats>,
    /// (assignment label, error)
    pub failures: Vec<(String, String)>,
}

impl RunSummary {
    pub fn empty() -> Self {
        Self {
            total: 0,
            completed: 0,
            failed: 0,
            records: 0,
            elapsed: Duration::ZERO,
            assignments: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn log(&self) {
        log::info!("=== Fetch Summary ===");
        log::info!(
            "Assignments: {}/{} completed ({} failed)",
            self.completed,
            self.total,
            self.failed
        );
        log::info!("Records: {}", fmt_num(self.records));
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if self.records > 0 && !self.elapsed.is_zero() {
            let per_sec = self.records as f64 / self.elapsed.as_secs_f64();
            log::info!("Throughput: {per_sec:.0} records/sec");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pager::tests::{ScriptedSource, fetcher};
    use deskline_core::{FetchError, ProgressContext};
    use serde_json::json;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn source() -> SourceConfig {
        SourceConfig {
            admin_email: "email@test.com".to_string(),
            api_token: "token".to_string(),
            subdomains: "acme, globex".to_string(),
            objects_to_pull: "Groups,Tags".to_string(),
            ..SourceConfig::default()
        }
    }

    fn tags_assignment() -> Assignment {
        Assignment {
            subdomain: "acme".to_string(),
            kind: ObjectKind::Tags,
            schema: Arc::clone(ObjectKind::Tags.schema()),
        }
    }

    fn tags_reader(source: ScriptedSource) -> RecordReader {
        RecordReader::from_stream(
            ObjectKind::Tags,
            Arc::clone(ObjectKind::Tags.schema()),
            Box::new(fetcher(ObjectKind::Tags, source, "t1")),
        )
    }

    #[test]
    fn plan_is_subdomain_by_object() {
        let (fetch, assignments) = plan(&source()).unwrap();
        let labels: Vec<_> = assignments.iter().map(Assignment::label).collect();
        assert_eq!(
            labels,
            ["acme/groups", "acme/tags", "globex/groups", "globex/tags"]
        );
        assert_eq!(fetch.credentials().username, "email@test.com/token");
    }

    #[test]
    fn plan_rejects_invalid_config() {
        let config = SourceConfig {
            objects_to_pull: "Nope".to_string(),
            ..source()
        };
        assert!(plan(&config).is_err());
    }

    #[test]
    fn output_path_layout() {
        let path = tags_assignment().output_path(Path::new("/out"));
        assert_eq!(path, Path::new("/out/tags/acme.jsonl"));
    }

    #[test]
    fn export_writes_projected_jsonl() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource::default()
            .page("t1", Ok(json!({"tags": [{"name": "a", "count": 1, "x": 0}], "next_page": "t2"})))
            .page("t2", Ok(json!({"tags": [{"name": "b"}]})));
        let stats = export(
            tags_reader(source),
            &tags_assignment(),
            dir.path(),
            &ProgressBar::hidden(),
            || false,
        )
        .unwrap();
        assert_eq!(stats.records, 2);
        assert_eq!(stats.label, "acme/tags");

        let content = std::fs::read_to_string(dir.path().join("tags/acme.jsonl")).unwrap();
        assert_eq!(
            content,
            "{\"name\":\"a\",\"count\":1}\n{\"name\":\"b\",\"count\":null}\n"
        );
    }

    #[test]
    fn export_failure_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource::default()
            .page("t1", Ok(json!({"tags": [{"name": "a"}], "next_page": "t2"})))
            .page("t2", Err(FetchError::http(500, "down")));
        let closed = Arc::clone(&source.closed);
        let err = export(
            tags_reader(source),
            &tags_assignment(),
            dir.path(),
            &ProgressBar::hidden(),
            || false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("500"));
        assert!(!dir.path().join("tags/acme.jsonl").exists());
        assert!(!dir.path().join("tags/acme.jsonl.tmp").exists());
        assert!(*closed.lock().unwrap() >= 1);
    }

    #[test]
    fn export_stops_when_asked() {
        let dir = TempDir::new().unwrap();
        let source = ScriptedSource::default().page(
            "t1",
            Ok(json!({"tags": [{"name": "a"}, {"name": "b"}, {"name": "c"}]})),
        );
        let polls = Cell::new(0);
        let err = export(
            tags_reader(source),
            &tags_assignment(),
            dir.path(),
            &ProgressBar::hidden(),
            || {
                polls.set(polls.get() + 1);
                polls.get() > 2
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "interrupted");
        assert!(!dir.path().join("tags/acme.jsonl").exists());
    }

    #[test]
    fn run_counts_failed_assignments() {
        let dir = TempDir::new().unwrap();
        let config = RunConfig {
            source: SourceConfig {
                subdomains: "acme".to_string(),
                objects_to_pull: "Groups".to_string(),
                zendesk_base_url: Some("http://127.0.0.1:9/%s/%s".to_string()),
                connect_timeout: 2,
                read_timeout: 2,
                max_retry_count: 1,
                ..source()
            },
            output_dir: dir.path().join("out"),
            workers: 4,
        };
        let progress = Arc::new(ProgressContext::hidden());
        let summary = run(&config, &progress).unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].0, "acme/groups");
        assert!(!dir.path().join("out/groups/acme.jsonl").exists());
    }

    #[test]
    fn run_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let config = RunConfig {
            source: SourceConfig {
                admin_email: "bad".to_string(),
                ..source()
            },
            output_dir: dir.path().to_path_buf(),
            workers: 1,
        };
        let err = run(&config, &Arc::new(ProgressContext::hidden())).unwrap_err();
        assert!(err.to_string().contains("configuration error"));
    }

    #[test]
    fn summary_log_does_not_panic() {
        RunSummary::empty().log();
        let summary = RunSummary {
            total: 2,
            completed: 1,
            failed: 1,
            records: 1500,
            elapsed: Duration::from_secs(3),
            assignments: Vec::new(),
            failures: vec![("acme/tags".to_string(), "HTTP 500".to_string())],
        };
        summary.log();
    }
}
