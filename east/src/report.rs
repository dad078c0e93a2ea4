//! Summary of a matrix run

use chrono::{DateTime, Utc};
use colored::Colorize;
use convenient_git::ReleaseVersion;
use convenient_west::ExecutionContext;
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::layout::SubjectKind;
use crate::runner::{JobResult, JobStatus};

/// Exit code of an interrupted run, as after SIGINT
pub const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Clone, Serialize)]
pub struct MatrixReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Execution mode the run used
    pub execution: String,
    pub sdk_version: Option<String>,
    pub manifest_checksum: Option<String>,
    pub version: ReleaseVersion,
    /// Jobs in the expanded matrix
    pub planned: usize,
    pub results: Vec<JobResult>,
    pub cancelled: bool,
}

impl MatrixReport {
    pub fn new(planned: usize, context: &ExecutionContext, version: ReleaseVersion) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            execution: context.mode().to_string(),
            sdk_version: context.sdk_version().map(str::to_string),
            manifest_checksum: None,
            version,
            planned,
            results: Vec::new(),
            cancelled: false,
        }
    }

    pub fn with_manifest_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.manifest_checksum = Some(checksum.into());
        self
    }

    pub fn push(&mut self, result: JobResult) {
        self.results.push(result);
    }

    pub fn finish(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
        self.finished_at = Some(Utc::now());
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    /// Jobs never started because the run was cancelled
    pub fn skipped(&self) -> usize {
        self.planned.saturating_sub(self.results.len())
    }

    pub fn is_success(&self) -> bool {
        !self.cancelled && self.failed() == 0
    }

    /// 0 when every job succeeded, 1 on any failure, 130 when cancelled
    pub fn exit_code(&self) -> u8 {
        if self.cancelled {
            EXIT_CANCELLED
        } else if self.failed() > 0 {
            1
        } else {
            0
        }
    }

    /// Human readable table, apps first then samples
    pub fn render(&self) -> String {
        let mut out = String::new();
        for kind in [SubjectKind::App, SubjectKind::Sample] {
            let rows: Vec<&JobResult> = self.results.iter().filter(|r| r.kind == kind).collect();
            if rows.is_empty() {
                continue;
            }

            let subject_width = column_width(&rows, |r| &r.subject, 7);
            let board_width = column_width(&rows, |r| &r.revision, 5);
            let type_width = column_width(&rows, |r| &r.build_type, 10);

            out.push_str(&format!("\n{}\n", format!("=== {} ===", kind.partition()).bold().cyan()));
            out.push_str(&format!(
                "{:<subject_width$}  {:<board_width$}  {:<type_width$}  {}\n",
                "subject", "board", "build-type", "status"
            ));
            for row in rows {
                let status = match &row.status {
                    status if status.is_success() && row.warnings.is_empty() => status.to_string().green(),
                    status if status.is_success() => status.to_string().yellow(),
                    status => status.to_string().red(),
                };
                out.push_str(&format!(
                    "{:<subject_width$}  {:<board_width$}  {:<type_width$}  {}\n",
                    row.subject, row.revision, row.build_type, status
                ));
                for detail in details(row) {
                    out.push_str(&format!("    {}\n", detail));
                }
            }
        }

        out.push_str(&format!(
            "\n{} succeeded, {} failed",
            self.succeeded(),
            self.failed()
        ));
        if self.cancelled {
            out.push_str(&format!(", {} skipped ({})", self.skipped(), "cancelled".red()));
        }
        out.push('\n');
        out
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Report saved to {}", path.display());
        Ok(())
    }
}

fn column_width(rows: &[&JobResult], field: impl Fn(&JobResult) -> &String, min: usize) -> usize {
    rows.iter().map(|r| field(r).len()).max().unwrap_or(0).max(min)
}

fn details(row: &JobResult) -> Vec<String> {
    let mut details = match &row.status {
        JobStatus::ConfError(e) => vec![e.to_string()],
        JobStatus::LaunchFailed(e) | JobStatus::CollectFailed(e) => vec![e.clone()],
        JobStatus::BuildFailure => row
            .exit_code
            .map(|code| vec![format!("exit code {}", code)])
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    details.extend(row.warnings.iter().cloned());
    details
}
