//! Release command: the whole matrix of east.yml

use colored::Colorize;
use east::{check_sources, expand, ArtifactCollector, CancelSignal, JobRunner, JobStatus, RunnerOptions};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use super::{execution_context, CommandResult, GlobalArgs, Project};

/// Build every job of the matrix; returns the process exit code
pub async fn execute(global: &GlobalArgs, dry_run: bool) -> CommandResult<u8> {
    let Some(project) = Project::open(global).await? else {
        println!(
            "ℹ️  No east.yml in {}, nothing to release",
            global.project_dir.display()
        );
        return Ok(0);
    };

    let context = execution_context(global)?;
    let version = project.version();
    let layout = &project.layout;

    println!("{}", "=== East Release ===".bold().green());
    println!("📋 Configuration:");
    println!("  Project:   {}", layout.root().display());
    println!("  Version:   {}", version);
    println!("  Execution: {}", context.mode());
    println!();

    check_sources(&project.manifest, layout)?;
    let plan = expand(&project.manifest, layout, &layout.boards_dir());
    if plan.is_empty() {
        println!("ℹ️  east.yml lists no boards, nothing to build");
        return Ok(0);
    }
    println!(
        "🔨 {} jobs ({} apps, {} samples)",
        plan.len(),
        plan.apps.len(),
        plan.samples.len()
    );

    let collector = ArtifactCollector::new(layout.release_dir(), version)
        .with_pack(project.manifest.pack.clone());
    let options = RunnerOptions {
        west: global.west.clone(),
        dry_run,
        verbose: global.verbose,
        working_dir: layout.root().to_path_buf(),
        collect_artifacts: true,
        pristine: true,
    };
    if !dry_run {
        collector.reset().await?;
    }
    let runner = JobRunner::new(&context, options, collector.clone());

    let (cancel_tx, mut cancel) = CancelSignal::new();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current job");
            let _ = cancel_tx.send(true);
        }
    });

    let progress = if global.verbose || dry_run {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(plan.len() as u64)
    };
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let report = runner
        .run_matrix(&plan, &mut cancel, |result| {
            match (&result.status, &result.command) {
                (JobStatus::DryRun, Some(command)) => println!("{}", command),
                _ => progress.println(format!(
                    "{} {} {} [{}]",
                    result.status, result.subject, result.revision, result.build_type
                )),
            }
            if let Some(tail) = &result.output_tail {
                progress.println(tail.dimmed().to_string());
            }
            progress.set_message(result.subject.clone());
            progress.inc(1);
        })
        .await;
    progress.finish_and_clear();
    ctrl_c.abort();

    let report = report.with_manifest_checksum(project.manifest.checksum.clone());
    if !dry_run {
        if !report.cancelled {
            let extras = collector.collect_extras(layout.root()).await?;
            for missing in &extras.missing {
                println!("⚠️  pack extra {} not found", missing.display());
            }
        }
        report.write_json(&layout.release_dir().join("report.json"))?;
    }
    println!("{}", report.render());

    if report.is_success() {
        println!("{} {}", "Artifacts in".green(), layout.release_dir().display());
    }
    Ok(report.exit_code())
}
