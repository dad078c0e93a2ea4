//! Single build command

use convenient_eastyml::RELEASE_BUILD_TYPE;
use east::{
    BuildJob, BuildTypeLabel, CancelSignal, ConfResolver, HardwareRevision, JobRunner, JobStatus,
    RunnerOptions, SubjectKind,
};
use std::path::Path;

use super::{execution_context, CommandResult, GlobalArgs, Project};

pub struct BuildRequest<'a> {
    pub board: &'a str,
    pub app: Option<&'a str>,
    pub sample: Option<&'a str>,
    pub build_type: Option<&'a str>,
    pub build_dir: &'a Path,
}

/// Build one subject on one board; conf errors abort the invocation
pub async fn execute(global: &GlobalArgs, request: BuildRequest<'_>) -> CommandResult<u8> {
    let Some(project) = Project::open(global).await? else {
        eprintln!("❌ No east.yml in {}", global.project_dir.display());
        return Err("east build needs an east.yml".into());
    };
    let layout = &project.layout;

    let (kind, subject) = match (request.app, request.sample) {
        (Some(app), _) => (SubjectKind::App, app),
        (None, Some(sample)) => (SubjectKind::Sample, sample),
        (None, None) => return Err("either --app or --sample is required".into()),
    };

    let context = execution_context(global)?;
    let resolver = ConfResolver::new(&project.manifest, layout);
    let fragments = resolver.resolve(kind, subject, request.board, request.build_type)?;

    let build_type = match (kind, request.build_type) {
        (SubjectKind::App, Some(name)) if name != RELEASE_BUILD_TYPE => BuildTypeLabel::Named(name.to_string()),
        (SubjectKind::Sample, _) => match project.manifest.sample(subject).and_then(|s| s.inherit.as_ref()) {
            Some(inherit) => BuildTypeLabel::Inherited {
                app: inherit.app.clone(),
                build_type: inherit.build_type.clone(),
            },
            None => BuildTypeLabel::Implicit,
        },
        _ => BuildTypeLabel::Implicit,
    };
    let revision = match request.board.split_once('@') {
        Some((board, revision)) => HardwareRevision::qualified(board, revision),
        None => HardwareRevision::bare(request.board),
    };
    let build_dir = if request.build_dir.is_absolute() {
        request.build_dir.to_path_buf()
    } else {
        layout.root().join(request.build_dir)
    };

    let job = BuildJob {
        kind,
        subject: subject.to_string(),
        board: revision.board.clone(),
        revision,
        build_type,
        conf: Ok(fragments),
        source_dir: layout.source_dir(kind, subject),
        output_dir: build_dir,
    };

    // The user's build directory is reused incrementally, never wiped
    let options = RunnerOptions {
        west: global.west.clone(),
        dry_run: false,
        verbose: true,
        working_dir: layout.root().to_path_buf(),
        collect_artifacts: false,
        pristine: false,
    };
    let runner = JobRunner::new(
        &context,
        options,
        east::ArtifactCollector::new(layout.release_dir(), project.version()),
    );

    println!("🔨 {}", job);
    let (cancel_tx, mut cancel) = CancelSignal::new();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });
    let result = runner.run(&job, &mut cancel).await;
    ctrl_c.abort();

    println!("{} {}", result.status, job);
    Ok(match result.status {
        JobStatus::Cancelled => east::report::EXIT_CANCELLED,
        status if status.is_success() => 0,
        _ => 1,
    })
}
