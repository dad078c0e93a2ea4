//! Sequential job execution
//!
//! Jobs run one after another so build tool output stays readable and the
//! build cache of one job is not raced by the next. A failing job never stops
//! the matrix; cancellation does, after recording the interrupted job.

use convenient_west::{CommandLine, ExecutionContext};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::artifacts::ArtifactCollector;
use crate::conf::{ConfError, ConfFragments};
use crate::layout::SubjectKind;
use crate::matrix::{BuildJob, MatrixPlan};
use crate::report::MatrixReport;

/// Lines of build output kept on a failed job
const OUTPUT_TAIL_LINES: usize = 30;

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Build tool executable
    pub west: String,
    /// Print commands instead of running them
    pub dry_run: bool,
    /// Stream build output to the terminal instead of capturing it
    pub verbose: bool,
    /// Directory commands are started in
    pub working_dir: PathBuf,
    /// Copy outputs of successful jobs into the release tree
    pub collect_artifacts: bool,
    /// Wipe a job's output directory before building; only for directories the matrix owns
    pub pristine: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            west: "west".to_string(),
            dry_run: false,
            verbose: false,
            working_dir: PathBuf::from("."),
            collect_artifacts: true,
            pristine: false,
        }
    }
}

/// Receiving end of a cancellation request, e.g. Ctrl-C
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Signal plus the sender that triggers it with `send(true)`
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    /// Signal that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation was requested
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Sender gone without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Success,
    /// Build succeeded but expected outputs were not produced
    ArtifactMissing,
    BuildFailure,
    /// Conf fragments could not be resolved; nothing was run
    ConfError(ConfError),
    /// The build tool could not be started
    LaunchFailed(String),
    /// Outputs could not be copied into the release tree
    CollectFailed(String),
    Cancelled,
    /// Command printed only
    DryRun,
}

impl JobStatus {
    /// Whether the job counts as succeeded in the summary
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::ArtifactMissing | Self::DryRun)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "✅ SUCCESS"),
            Self::ArtifactMissing => write!(f, "⚠️  ARTIFACT MISSING"),
            Self::BuildFailure => write!(f, "❌ FAILED"),
            Self::ConfError(_) => write!(f, "🧩 CONF ERROR"),
            Self::LaunchFailed(_) => write!(f, "🚫 LAUNCH FAILED"),
            Self::CollectFailed(_) => write!(f, "📦 COLLECT FAILED"),
            Self::Cancelled => write!(f, "💀 CANCELLED"),
            Self::DryRun => write!(f, "📝 DRY RUN"),
        }
    }
}

/// Outcome of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub kind: SubjectKind,
    pub subject: String,
    pub revision: String,
    pub build_type: String,
    pub status: JobStatus,
    pub exit_code: Option<i32>,
    /// Command line as it was (or would have been) launched
    pub command: Option<String>,
    /// Released files
    pub artifacts: Vec<PathBuf>,
    pub warnings: Vec<String>,
    /// Last lines of captured build output, failed builds only
    pub output_tail: Option<String>,
    pub duration_ms: u64,
}

impl JobResult {
    fn pending(job: &BuildJob) -> Self {
        Self {
            kind: job.kind,
            subject: job.subject.clone(),
            revision: job.revision.to_string(),
            build_type: job.build_type.to_string(),
            status: JobStatus::Cancelled,
            exit_code: None,
            command: None,
            artifacts: Vec::new(),
            warnings: Vec::new(),
            output_tail: None,
            duration_ms: 0,
        }
    }

    fn finish(mut self, status: JobStatus, started: Instant) -> Self {
        self.status = status;
        self.duration_ms = started.elapsed().as_millis() as u64;
        self
    }
}

pub struct JobRunner {
    context: ExecutionContext,
    options: RunnerOptions,
    collector: ArtifactCollector,
}

impl JobRunner {
    pub fn new(context: &ExecutionContext, options: RunnerOptions, collector: ArtifactCollector) -> Self {
        Self {
            context: context.clone(),
            options,
            collector,
        }
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Build command of `job`, already routed through the execution context
    pub fn build_command(&self, job: &BuildJob, fragments: &ConfFragments) -> CommandLine {
        let mut command = CommandLine::new(&self.options.west)
            .arg("build")
            .arg("-b")
            .arg(job.revision.to_string())
            .arg("-d")
            .arg(job.output_dir.display().to_string())
            .arg(job.source_dir.display().to_string());
        let cmake_args = fragments.cmake_args();
        if !cmake_args.is_empty() {
            command = command.arg("--").args(cmake_args);
        }
        self.context.wrap(command)
    }

    /// Run a single job to completion, failure or cancellation
    pub async fn run(&self, job: &BuildJob, cancel: &mut CancelSignal) -> JobResult {
        let started = Instant::now();
        let mut result = JobResult::pending(job);

        let fragments = match &job.conf {
            Ok(fragments) => fragments,
            Err(e) => {
                error!("{}: {}", job, e);
                return result.finish(JobStatus::ConfError(e.clone()), started);
            }
        };

        let command = self.build_command(job, fragments);
        result.command = Some(command.to_string());

        if self.options.dry_run {
            info!("[dry run] {}", command);
            return result.finish(JobStatus::DryRun, started);
        }
        if cancel.is_cancelled() {
            return result.finish(JobStatus::Cancelled, started);
        }

        if let Err(e) = prepare_output_dir(&job.output_dir, self.options.pristine).await {
            return result.finish(JobStatus::LaunchFailed(e), started);
        }

        info!("🔨 Building {}", job);
        debug!("Running: {}", command);
        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .current_dir(&self.options.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if self.options.verbose {
            process.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            process.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let child = match process.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to start {}: {}", command.program, e);
                return result.finish(
                    JobStatus::LaunchFailed(format!("{}: {}", command.program, e)),
                    started,
                );
            }
        };

        let output = tokio::select! {
            output = child.wait_with_output() => output,
            _ = cancel.cancelled() => {
                warn!("Cancelled while building {}", job);
                return result.finish(JobStatus::Cancelled, started);
            }
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return result.finish(JobStatus::LaunchFailed(e.to_string()), started);
            }
        };
        result.exit_code = output.status.code();

        if !output.status.success() {
            warn!("Build of {} failed with {:?}", job, result.exit_code);
            result.output_tail = tail(&output.stdout, &output.stderr);
            return result.finish(JobStatus::BuildFailure, started);
        }

        if !self.options.collect_artifacts {
            info!("✅ Built {} in {}", job, job.output_dir.display());
            return result.finish(JobStatus::Success, started);
        }

        match self.collector.collect(job, &job.output_dir).await {
            Ok(collection) => {
                result.artifacts = collection.copied;
                result.warnings = collection
                    .missing
                    .iter()
                    .map(|path| format!("missing artifact {}", path.display()))
                    .collect();
                let status = if result.warnings.is_empty() {
                    JobStatus::Success
                } else {
                    JobStatus::ArtifactMissing
                };
                result.finish(status, started)
            }
            Err(e) => {
                error!("{}: {}", job, e);
                result.finish(JobStatus::CollectFailed(e.to_string()), started)
            }
        }
    }

    /// Run every job of `plan` in order, reporting each result to `on_result`
    pub async fn run_matrix<F>(&self, plan: &MatrixPlan, cancel: &mut CancelSignal, mut on_result: F) -> MatrixReport
    where
        F: FnMut(&JobResult),
    {
        let mut report = MatrixReport::new(plan.len(), &self.context, self.collector.version().clone());

        for job in plan.jobs() {
            if cancel.is_cancelled() {
                break;
            }
            let result = self.run(job, cancel).await;
            let stop = result.status == JobStatus::Cancelled;
            on_result(&result);
            report.push(result);
            if stop {
                break;
            }
        }

        report.finish(cancel.is_cancelled());
        report
    }
}

async fn prepare_output_dir(dir: &Path, pristine: bool) -> Result<(), String> {
    if pristine && tokio::fs::try_exists(dir).await.unwrap_or(false) {
        debug!("Removing previous build in {}", dir.display());
        tokio::fs::remove_dir_all(dir)
            .await
            .map_err(|e| format!("cannot remove {}: {}", dir.display(), e))?;
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| format!("cannot create {}: {}", dir.display(), e))
}

fn tail(stdout: &[u8], stderr: &[u8]) -> Option<String> {
    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(stdout),
        String::from_utf8_lossy(stderr)
    );
    let lines: Vec<&str> = combined.lines().collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
    Some(lines[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::ConfFragments;
    use crate::matrix::BuildTypeLabel;
    use crate::revisions::HardwareRevision;
    use convenient_git::ReleaseVersion;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn job(conf: Result<ConfFragments, ConfError>) -> BuildJob {
        BuildJob {
            kind: SubjectKind::App,
            subject: "nrf52_app".into(),
            board: "boardA".into(),
            revision: HardwareRevision::bare("boardA"),
            build_type: BuildTypeLabel::Named("debug".into()),
            conf,
            source_dir: PathBuf::from("/project/app/nrf52_app"),
            output_dir: PathBuf::from("/project/build/release/apps/nrf52_app/debug/boardA"),
        }
    }

    fn runner(release: &Path, dry_run: bool) -> JobRunner {
        let options = RunnerOptions {
            dry_run,
            ..RunnerOptions::default()
        };
        JobRunner::new(
            &ExecutionContext::direct(),
            options,
            ArtifactCollector::new(release, ReleaseVersion::unversioned()),
        )
    }

    #[test]
    fn test_build_command_layout() {
        let temp = TempDir::new().unwrap();
        let fragments = ConfFragments {
            files: vec![PathBuf::from("conf/common.conf"), PathBuf::from("conf/debug.conf")],
            build_type: Some("debug".into()),
        };
        let command = runner(temp.path(), false).build_command(&job(Ok(fragments.clone())), &fragments);

        assert_eq!(
            command.to_string(),
            "west build -b boardA -d /project/build/release/apps/nrf52_app/debug/boardA /project/app/nrf52_app -- -DCONF_FILE=conf/common.conf -DOVERLAY_CONFIG=conf/debug.conf -DEAST_BUILD_TYPE=debug"
        );
    }

    #[test]
    fn test_build_command_without_fragments() {
        let temp = TempDir::new().unwrap();
        let fragments = ConfFragments::default();
        let command = runner(temp.path(), false).build_command(&job(Ok(fragments.clone())), &fragments);

        assert!(!command.args.contains(&"--".to_string()));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_dry_run_launches_nothing() {
        let temp = TempDir::new().unwrap();
        let result = runner(temp.path(), true)
            .run(&job(Ok(ConfFragments::default())), &mut CancelSignal::never())
            .await;

        assert_eq!(result.status, JobStatus::DryRun);
        assert!(result.status.is_success());
        assert!(result.command.unwrap().starts_with("west build -b boardA"));
        assert!(logs_contain("[dry run] west build"));
    }

    #[tokio::test]
    async fn test_conf_error_is_recorded_without_running() {
        let temp = TempDir::new().unwrap();
        let error = ConfError::UnknownBuildType {
            subject: "nrf52_app".into(),
            build_type: "debug".into(),
        };
        let result = runner(temp.path(), false)
            .run(&job(Err(error.clone())), &mut CancelSignal::never())
            .await;

        assert_eq!(result.status, JobStatus::ConfError(error));
        assert!(result.command.is_none());
        assert!(!result.status.is_success());
    }

    #[tokio::test]
    async fn test_cancel_signal_fires() {
        let (tx, mut signal) = CancelSignal::new();
        assert!(!signal.is_cancelled());
        tx.send(true).unwrap();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_output_tail_keeps_last_lines() {
        let stdout: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let tail = tail(stdout.as_bytes(), b"error: boom\n").unwrap();

        assert_eq!(tail.lines().count(), OUTPUT_TAIL_LINES);
        assert!(tail.ends_with("error: boom"));
        assert_eq!(super::tail(b"", b""), None);
    }
}
