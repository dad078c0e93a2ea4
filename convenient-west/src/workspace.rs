//! West workspace discovery and SDK version detection

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory marking the top of a west workspace
pub const WEST_DIR: &str = ".west";

/// `repo-path` of the nRF Connect SDK project in a west manifest
pub const SDK_REPO_PATH: &str = "sdk-nrf";

const DEFAULT_MANIFEST_FILE: &str = "west.yml";

/// A west workspace, identified by its top directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WestWorkspace {
    topdir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct WestYml {
    manifest: WestManifest,
}

#[derive(Debug, Deserialize)]
struct WestManifest {
    #[serde(default)]
    projects: Vec<WestProject>,
}

#[derive(Debug, Deserialize)]
struct WestProject {
    #[serde(rename = "repo-path")]
    repo_path: Option<String>,
    revision: Option<String>,
}

impl WestWorkspace {
    /// Workspace rooted at `topdir`, without checking for `.west`
    pub fn new(topdir: impl Into<PathBuf>) -> Self {
        Self {
            topdir: topdir.into(),
        }
    }

    /// Walk up from `start` until a directory containing `.west` is found
    pub fn find(start: &Path) -> Option<Self> {
        let found = start
            .ancestors()
            .find(|dir| dir.join(WEST_DIR).is_dir())
            .map(Self::new);
        match &found {
            Some(ws) => debug!("West workspace found at {}", ws.topdir.display()),
            None => debug!("No west workspace above {}", start.display()),
        }
        found
    }

    /// Top directory of the workspace (parent of `.west`)
    pub fn topdir(&self) -> &Path {
        &self.topdir
    }

    /// Path of the workspace manifest, read from `.west/config`
    pub fn manifest_path(&self) -> Result<PathBuf, WestError> {
        let config_path = self.topdir.join(WEST_DIR).join("config");
        let content = match fs::read_to_string(&config_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WestError::ConfigNotFound(config_path));
            }
            Err(e) => return Err(WestError::Io(config_path, e.to_string())),
        };

        let manifest_dir = ini_value(&content, "manifest", "path").ok_or_else(|| {
            WestError::MissingConfigKey {
                path: config_path.clone(),
                key: "manifest.path".into(),
            }
        })?;
        let manifest_file = ini_value(&content, "manifest", "file")
            .unwrap_or_else(|| DEFAULT_MANIFEST_FILE.to_string());

        Ok(self.topdir.join(manifest_dir).join(manifest_file))
    }

    /// Revision of the SDK project imported by the workspace manifest
    ///
    /// `Ok(None)` means a vanilla Zephyr workspace: the manifest does not
    /// import the SDK, or does so without pinning a revision.
    pub fn detect_sdk_version(&self) -> Result<Option<String>, WestError> {
        let manifest_path = self.manifest_path()?;
        let content = match fs::read_to_string(&manifest_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(WestError::ManifestNotFound(manifest_path));
            }
            Err(e) => return Err(WestError::Io(manifest_path, e.to_string())),
        };

        let west_yml: WestYml = serde_yaml::from_str(&content)
            .map_err(|e| WestError::Parse(manifest_path.clone(), e.to_string()))?;

        let version = west_yml
            .manifest
            .projects
            .into_iter()
            .find(|p| p.repo_path.as_deref() == Some(SDK_REPO_PATH))
            .and_then(|p| p.revision);
        debug!(
            "SDK version in {}: {}",
            manifest_path.display(),
            version.as_deref().unwrap_or("none")
        );
        Ok(version)
    }
}

/// Value of `key` in `[section]` of an INI document such as `.west/config`
fn ini_value(content: &str, section: &str, key: &str) -> Option<String> {
    let mut current = None;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = Some(name.trim());
            continue;
        }
        if current != Some(section) {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if k.trim() == key {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}

/// Errors raised while inspecting a west workspace
#[derive(Debug, thiserror::Error)]
pub enum WestError {
    /// `.west/config` does not exist
    #[error("west configuration {0} not found")]
    ConfigNotFound(PathBuf),
    /// A required key is missing from `.west/config`
    #[error("{path} has no `{key}` entry")]
    MissingConfigKey {
        /// Config file
        path: PathBuf,
        /// Dotted key name
        key: String,
    },
    /// The manifest named by `.west/config` does not exist
    #[error("west manifest {0} not found")]
    ManifestNotFound(PathBuf),
    /// Reading a file failed
    #[error("IO error reading {0}: {1}")]
    Io(PathBuf, String),
    /// The west manifest is not valid YAML of the expected shape
    #[error("Parse error in {0}: {1}")]
    Parse(PathBuf, String),
    /// The toolchain manager could not be queried
    #[error("`{command}` failed: {message}")]
    ManagerQuery {
        /// Command line that was run
        command: String,
        /// Exit status or spawn error
        message: String,
    },
}
