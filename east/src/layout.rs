//! Project directory conventions

use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which manifest partition a build subject comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SubjectKind {
    App,
    Sample,
}

impl SubjectKind {
    /// Directory name used for this partition in build and release trees
    pub fn partition(self) -> &'static str {
        match self {
            Self::App => "apps",
            Self::Sample => "samples",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::App => write!(f, "app"),
            Self::Sample => write!(f, "sample"),
        }
    }
}

/// Where sources, conf fragments, builds and releases live in a project
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
    single_app: bool,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let single_app = is_single_app(&root);
        debug!(
            "Project at {} ({})",
            root.display(),
            if single_app { "single app" } else { "multi app" }
        );
        Self { root, single_app }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A single-app project keeps its app directly in `app/`
    pub fn is_single_app(&self) -> bool {
        self.single_app
    }

    pub fn app_dir(&self, name: &str) -> PathBuf {
        if self.single_app {
            self.root.join("app")
        } else {
            self.root.join("app").join(name)
        }
    }

    pub fn sample_dir(&self, name: &str) -> PathBuf {
        self.root.join("samples").join(name)
    }

    pub fn source_dir(&self, kind: SubjectKind, name: &str) -> PathBuf {
        match kind {
            SubjectKind::App => self.app_dir(name),
            SubjectKind::Sample => self.sample_dir(name),
        }
    }

    /// Conf fragments of an app
    pub fn conf_dir(&self, app: &str) -> PathBuf {
        self.app_dir(app).join("conf")
    }

    pub fn boards_dir(&self) -> PathBuf {
        self.root.join("boards")
    }

    /// Root of the per-job build directories of a release
    pub fn build_root(&self) -> PathBuf {
        self.root.join("build").join("release")
    }

    pub fn release_dir(&self) -> PathBuf {
        self.root.join("release")
    }
}

// Only a `project(...)` call marks app/CMakeLists.txt as an application of its own.
fn is_single_app(root: &Path) -> bool {
    fs::read_to_string(root.join("app").join("CMakeLists.txt"))
        .map(|content| {
            content
                .lines()
                .any(|line| line.starts_with("project(") && line.contains(')'))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_multi_app_layout() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("app/nrf52_app")).unwrap();

        let layout = ProjectLayout::new(temp.path());
        assert!(!layout.is_single_app());
        assert_eq!(layout.conf_dir("nrf52_app"), temp.path().join("app/nrf52_app/conf"));
        assert_eq!(
            layout.source_dir(SubjectKind::Sample, "basic/blinky"),
            temp.path().join("samples/basic/blinky")
        );
    }

    #[test]
    fn test_single_app_layout() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("app")).unwrap();
        fs::write(
            temp.path().join("app/CMakeLists.txt"),
            "cmake_minimum_required(VERSION 3.20.0)\nfind_package(Zephyr)\nproject(firmware)\n",
        )
        .unwrap();

        let layout = ProjectLayout::new(temp.path());
        assert!(layout.is_single_app());
        assert_eq!(layout.conf_dir("anything"), temp.path().join("app/conf"));
    }

    #[test]
    fn test_cmakelists_without_project_is_not_single_app() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("app")).unwrap();
        fs::write(temp.path().join("app/CMakeLists.txt"), "add_subdirectory(nrf52_app)\n").unwrap();

        assert!(!ProjectLayout::new(temp.path()).is_single_app());
    }
}
