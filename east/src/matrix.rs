//! Matrix expansion
//!
//! Expands a manifest into the cross product subject x board x revision x
//! build-type. Apps and samples are kept in separate partitions because
//! they are released into separate trees.

use convenient_eastyml::{Manifest, RELEASE_BUILD_TYPE};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::conf::{ConfError, ConfFragments, ConfResolver};
use crate::layout::{ProjectLayout, SubjectKind};
use crate::revisions::{HardwareRevision, RevisionDiscoverer};

/// Build-type cell of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BuildTypeLabel {
    /// No build-type: common and board fragments only, or the tool default for samples
    Implicit,
    Named(String),
    /// Sample reusing an app's build-type
    Inherited { app: String, build_type: String },
}

impl BuildTypeLabel {
    /// Name used in release paths and artifact names; `None` for the implicit build
    pub fn qualifier(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name),
            Self::Implicit | Self::Inherited { .. } => None,
        }
    }
}

impl fmt::Display for BuildTypeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Implicit => write!(f, "/"),
            Self::Named(name) => write!(f, "{}", name),
            Self::Inherited { app, build_type } => write!(f, "{} ({})", build_type, app),
        }
    }
}

/// One cell of the matrix, consumed once by the job runner
#[derive(Debug, Clone, Serialize)]
pub struct BuildJob {
    pub kind: SubjectKind,
    pub subject: String,
    pub board: String,
    pub revision: HardwareRevision,
    pub build_type: BuildTypeLabel,
    /// Resolution failures are kept on the job and reported when it runs
    pub conf: Result<ConfFragments, ConfError>,
    pub source_dir: PathBuf,
    /// Unique per job within a matrix run
    pub output_dir: PathBuf,
}

impl BuildJob {
    /// Destination of this job's artifacts below the release root
    pub fn release_dir(&self, release_root: &Path) -> PathBuf {
        let mut dir = release_root.join(self.kind.partition()).join(&self.subject);
        if let Some(build_type) = self.build_type.qualifier() {
            dir.push(build_type);
        }
        dir.join(self.revision.to_string().replace('/', "_"))
    }
}

impl fmt::Display for BuildJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} on {} [{}]",
            self.kind, self.subject, self.revision, self.build_type
        )
    }
}

/// Ordered jobs of a release, apps before samples
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatrixPlan {
    pub apps: Vec<BuildJob>,
    pub samples: Vec<BuildJob>,
}

impl MatrixPlan {
    pub fn jobs(&self) -> impl Iterator<Item = &BuildJob> {
        self.apps.iter().chain(&self.samples)
    }

    pub fn len(&self) -> usize {
        self.apps.len() + self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Manifest entries whose sources are not on disk
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("east.yml names sources that do not exist: {}", describe_missing(.missing))]
pub struct MissingSources {
    pub missing: Vec<(SubjectKind, String, PathBuf)>,
}

fn describe_missing(missing: &[(SubjectKind, String, PathBuf)]) -> String {
    missing
        .iter()
        .map(|(kind, name, dir)| format!("{} {} ({})", kind, name, dir.display()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every app needs its conf directory and every sample its source directory
pub fn check_sources(manifest: &Manifest, layout: &ProjectLayout) -> Result<(), MissingSources> {
    let apps = manifest
        .apps
        .iter()
        .map(|app| (SubjectKind::App, app.name.clone(), layout.conf_dir(&app.name)));
    let samples = manifest
        .samples
        .iter()
        .map(|sample| (SubjectKind::Sample, sample.name.clone(), layout.sample_dir(&sample.name)));
    let missing: Vec<_> = apps.chain(samples).filter(|(_, _, dir)| !dir.is_dir()).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MissingSources { missing })
    }
}

/// Expand `manifest` into build jobs, discovering revisions under `boards_dir`
pub fn expand(manifest: &Manifest, layout: &ProjectLayout, boards_dir: &Path) -> MatrixPlan {
    let resolver = ConfResolver::new(manifest, layout);
    let discoverer = RevisionDiscoverer::new(boards_dir);
    let mut revisions: HashMap<String, Vec<HardwareRevision>> = HashMap::new();
    let mut revisions_of = |board: &str| -> Vec<HardwareRevision> {
        revisions
            .entry(board.to_string())
            .or_insert_with(|| discoverer.discover(board))
            .clone()
    };
    let mut plan = MatrixPlan::default();

    for app in &manifest.apps {
        let source_dir = layout.app_dir(&app.name);
        let build_types: Vec<Option<&str>> = if app.build_types.is_empty() {
            vec![None]
        } else {
            app.build_types.iter().map(|bt| Some(bt.name.as_str())).collect()
        };

        for board in &app.boards {
            for revision in revisions_of(board) {
                for build_type in &build_types {
                    let label = match build_type {
                        Some(name) => BuildTypeLabel::Named(name.to_string()),
                        None => BuildTypeLabel::Implicit,
                    };
                    plan.apps.push(BuildJob {
                        kind: SubjectKind::App,
                        subject: app.name.clone(),
                        board: board.clone(),
                        conf: resolver.resolve_app(app, &revision.to_string(), *build_type),
                        output_dir: output_dir(layout, SubjectKind::App, &app.name, &label, &revision),
                        source_dir: source_dir.clone(),
                        revision: revision.clone(),
                        build_type: label,
                    });
                }
            }
        }
    }

    for (index, sample) in manifest.samples.iter().enumerate() {
        let source_dir = layout.sample_dir(&sample.name);
        let label = match &sample.inherit {
            Some(inherit) if manifest.inherited(index).is_some() => BuildTypeLabel::Inherited {
                app: inherit.app.clone(),
                build_type: inherit.build_type.clone(),
            },
            _ => BuildTypeLabel::Implicit,
        };

        for board in &sample.boards {
            for revision in revisions_of(board) {
                plan.samples.push(BuildJob {
                    kind: SubjectKind::Sample,
                    subject: sample.name.clone(),
                    board: board.clone(),
                    conf: resolver.resolve_sample(index, &revision.to_string()),
                    output_dir: output_dir(layout, SubjectKind::Sample, &sample.name, &label, &revision),
                    source_dir: source_dir.clone(),
                    revision,
                    build_type: label.clone(),
                });
            }
        }
    }

    info!(
        "Expanded matrix: {} app jobs, {} sample jobs",
        plan.apps.len(),
        plan.samples.len()
    );
    plan
}

fn output_dir(
    layout: &ProjectLayout,
    kind: SubjectKind,
    subject: &str,
    label: &BuildTypeLabel,
    revision: &HardwareRevision,
) -> PathBuf {
    let cell = match label {
        BuildTypeLabel::Implicit => "none".to_string(),
        BuildTypeLabel::Named(name) => name.clone(),
        BuildTypeLabel::Inherited { build_type, .. } if build_type == RELEASE_BUILD_TYPE => {
            RELEASE_BUILD_TYPE.to_string()
        }
        BuildTypeLabel::Inherited { app, build_type } => format!("{}-{}", app, build_type),
    };
    layout
        .build_root()
        .join(kind.partition())
        .join(subject)
        .join(cell)
        .join(revision.to_string().replace('/', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_label_display() {
        assert_eq!(BuildTypeLabel::Implicit.to_string(), "/");
        assert_eq!(BuildTypeLabel::Named("debug".into()).to_string(), "debug");
        assert_eq!(
            BuildTypeLabel::Inherited {
                app: "nrf52_app".into(),
                build_type: "uart".into()
            }
            .to_string(),
            "uart (nrf52_app)"
        );
    }

    #[test]
    fn test_check_sources_reports_missing_directories() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("app/nrf52_app/conf")).unwrap();
        fs::create_dir_all(temp.path().join("samples/blinky")).unwrap();
        let layout = ProjectLayout::new(temp.path());

        let ok = Manifest::parse(
            "east.yml",
            "apps:\n  - name: nrf52_app\n    west-boards: [boardA]\nsamples:\n  - name: blinky\n    west-boards: [boardA]\n",
        )
        .unwrap();
        assert_eq!(check_sources(&ok, &layout), Ok(()));

        let typo = Manifest::parse(
            "east.yml",
            "apps:\n  - name: typo_app\n    west-boards: [boardA]\nsamples:\n  - name: typo_sample\n    west-boards: [boardA]\n",
        )
        .unwrap();
        let error = check_sources(&typo, &layout).unwrap_err();
        assert_eq!(
            error.missing,
            vec![
                (SubjectKind::App, "typo_app".to_string(), temp.path().join("app/typo_app/conf")),
                (SubjectKind::Sample, "typo_sample".to_string(), temp.path().join("samples/typo_sample")),
            ]
        );
        assert!(error.to_string().contains("app typo_app"));
    }

    #[test]
    fn test_release_dir() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("app/a/conf")).unwrap();
        let manifest = Manifest::parse(
            "east.yml",
            "apps:\n  - name: a\n    west-boards: [hw/soc]\n    build-types:\n      - type: debug\n        conf-files: []\nsamples:\n  - name: basic/blinky\n    west-boards: [boardB]\n",
        )
        .unwrap();
        let layout = ProjectLayout::new(temp.path());

        let plan = expand(&manifest, &layout, &layout.boards_dir());
        let release = Path::new("release");
        assert_eq!(
            plan.apps[0].release_dir(release),
            Path::new("release/apps/a/debug/hw_soc")
        );
        assert_eq!(
            plan.samples[0].release_dir(release),
            Path::new("release/samples/basic/blinky/boardB")
        );
    }
}
