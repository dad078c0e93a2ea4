//! Artifact collection and naming
//!
//! Naming grammar of every released file:
//!
//! ```text
//! <subject>-<board>-<tag>[-<build-type>][-<hash>].<ext>
//! ```
//!
//! `<subject>` is the last path segment of the app or sample name, `<board>`
//! has `@` replaced by `-hv` and `/` by `_`. The build-type is omitted for the
//! implicit build and the hash for clean tagged commits. Extra files from the
//! manifest's `pack` section keep their stem: `<same base>-<stem>.<ext>`.

use convenient_eastyml::{PackSpec, APP_DIR_PLACEHOLDER};
use convenient_git::ReleaseVersion;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::matrix::BuildJob;

/// Files of a build without a bootloader
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlainOutputs {
    pub image: PathBuf,
    pub hex: PathBuf,
    pub elf: PathBuf,
}

/// Files of an MCUboot build, recognised by its merged image plus update image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootloaderOutputs {
    pub merged_hex: PathBuf,
    pub update_image: PathBuf,
    pub dfu_package: PathBuf,
    pub elf: PathBuf,
}

/// Files of a TF-M or SPM build: a merged image without an update image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecureOutputs {
    pub merged_hex: PathBuf,
    pub elf: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutputSet {
    Plain(PlainOutputs),
    Bootloader(BootloaderOutputs),
    Secure(SecureOutputs),
}

impl OutputSet {
    pub fn files(&self) -> Vec<&Path> {
        match self {
            Self::Plain(p) => vec![&p.image, &p.hex, &p.elf],
            Self::Bootloader(b) => vec![&b.dfu_package, &b.update_image, &b.merged_hex, &b.elf],
            Self::Secure(s) => vec![&s.merged_hex, &s.elf],
        }
    }
}

#[derive(Debug, Deserialize)]
struct Domains {
    default: String,
}

/// Directory holding the application image; differs from `build_dir` for sysbuild
pub fn app_build_dir(build_dir: &Path) -> PathBuf {
    let domains = fs::read_to_string(build_dir.join("domains.yaml"))
        .ok()
        .and_then(|content| serde_yaml::from_str::<Domains>(&content).ok());
    match domains {
        Some(domains) => build_dir.join(domains.default),
        None => build_dir.to_path_buf(),
    }
}

/// Select the output set by which well-known files exist in `build_dir`
pub fn inspect(build_dir: &Path) -> OutputSet {
    let app_dir = app_build_dir(build_dir);
    let zephyr = app_dir.join("zephyr");
    let sysbuild = app_dir != build_dir;

    let (merged_hex, dfu_package) = if sysbuild {
        (build_dir.join("merged.hex"), build_dir.join("dfu_application.zip"))
    } else {
        (zephyr.join("merged.hex"), zephyr.join("dfu_application.zip"))
    };

    if !merged_hex.is_file() {
        return OutputSet::Plain(PlainOutputs {
            image: zephyr.join("zephyr.bin"),
            hex: zephyr.join("zephyr.hex"),
            elf: zephyr.join("zephyr.elf"),
        });
    }

    let update_image = if sysbuild {
        zephyr.join("zephyr.signed.bin")
    } else {
        zephyr.join("app_update.bin")
    };
    if !update_image.is_file() {
        return OutputSet::Secure(SecureOutputs {
            merged_hex,
            elf: zephyr.join("zephyr.elf"),
        });
    }
    OutputSet::Bootloader(BootloaderOutputs {
        merged_hex,
        update_image,
        dfu_package,
        elf: zephyr.join("zephyr.elf"),
    })
}

/// Base artifact name, without extension
pub fn artifact_name(
    subject: &str,
    board: &str,
    version: &ReleaseVersion,
    build_type: Option<&str>,
) -> String {
    let subject = subject.rsplit('/').next().unwrap_or(subject);
    let board = board.replace('@', "-hv").replace('/', "_");
    let build_type = match build_type {
        Some(bt) if bt != convenient_eastyml::RELEASE_BUILD_TYPE => format!("-{}", bt),
        _ => String::new(),
    };
    let hash = if version.hash.is_empty() {
        String::new()
    } else {
        format!("-{}", version.hash)
    };
    format!("{}-{}-{}{}{}", subject, board, version.tag, build_type, hash)
}

/// What one collection copied and what it expected but did not find
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Collection {
    pub copied: Vec<PathBuf>,
    pub missing: Vec<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("cannot copy {} to {}: {message}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        message: String,
    },
    #[error("cannot create {}: {message}", .path.display())]
    CreateDir { path: PathBuf, message: String },
    #[error("cannot remove {}: {message}", .path.display())]
    Remove { path: PathBuf, message: String },
}

/// Copies and renames job outputs into the release tree
#[derive(Debug, Clone)]
pub struct ArtifactCollector {
    release_root: PathBuf,
    version: ReleaseVersion,
    pack: Option<PackSpec>,
}

impl ArtifactCollector {
    pub fn new(release_root: impl Into<PathBuf>, version: ReleaseVersion) -> Self {
        Self {
            release_root: release_root.into(),
            version,
            pack: None,
        }
    }

    /// Also release the manifest's `pack` artifacts of every job
    pub fn with_pack(mut self, pack: Option<PackSpec>) -> Self {
        self.pack = pack;
        self
    }

    pub fn release_root(&self) -> &Path {
        &self.release_root
    }

    pub fn version(&self) -> &ReleaseVersion {
        &self.version
    }

    /// Remove everything a previous release left in the release root
    pub async fn reset(&self) -> Result<(), CollectError> {
        if !tokio::fs::try_exists(&self.release_root).await.unwrap_or(false) {
            return Ok(());
        }
        debug!("Clearing previous release in {}", self.release_root.display());
        tokio::fs::remove_dir_all(&self.release_root)
            .await
            .map_err(|e| CollectError::Remove {
                path: self.release_root.clone(),
                message: e.to_string(),
            })
    }

    /// Copy the outputs of a finished `job` from `build_dir`
    pub async fn collect(&self, job: &BuildJob, build_dir: &Path) -> Result<Collection, CollectError> {
        let destination = job.release_dir(&self.release_root);
        tokio::fs::create_dir_all(&destination)
            .await
            .map_err(|e| CollectError::CreateDir {
                path: destination.clone(),
                message: e.to_string(),
            })?;

        let build_type = job.build_type.qualifier();
        let base = artifact_name(&job.subject, &job.revision.to_string(), &self.version, build_type);
        let mut collection = Collection::default();

        for file in inspect(build_dir).files() {
            let name = match file.extension() {
                Some(ext) => format!("{}.{}", base, ext.to_string_lossy()),
                None => base.clone(),
            };
            self.copy(file, &destination.join(name), &mut collection).await?;
        }

        for extra in self.pack_artifacts(job, build_dir) {
            let stem = extra
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let name = match extra.extension() {
                Some(ext) => format!("{}-{}.{}", base, stem, ext.to_string_lossy()),
                None => format!("{}-{}", base, stem),
            };
            self.copy(&extra, &destination.join(name), &mut collection).await?;
        }

        Ok(collection)
    }

    /// Copy the project files listed under `pack.extra` into the release root
    pub async fn collect_extras(&self, project_root: &Path) -> Result<Collection, CollectError> {
        let mut collection = Collection::default();
        let Some(pack) = &self.pack else {
            return Ok(collection);
        };
        if pack.extra.is_empty() {
            return Ok(collection);
        }
        tokio::fs::create_dir_all(&self.release_root)
            .await
            .map_err(|e| CollectError::CreateDir {
                path: self.release_root.clone(),
                message: e.to_string(),
            })?;
        for extra in &pack.extra {
            let from = project_root.join(extra);
            let Some(name) = from.file_name() else {
                continue;
            };
            let to = self.release_root.join(name);
            self.copy(&from, &to, &mut collection).await?;
        }
        Ok(collection)
    }

    fn pack_artifacts(&self, job: &BuildJob, build_dir: &Path) -> Vec<PathBuf> {
        let Some(pack) = &self.pack else {
            return Vec::new();
        };
        let app_dir = app_build_dir(build_dir);
        pack.artifacts_for(&job.subject, job.build_type.qualifier())
            .iter()
            .map(|artifact| match artifact.strip_prefix(APP_DIR_PLACEHOLDER) {
                Some(rest) => app_dir.join(rest),
                None => build_dir.join(artifact),
            })
            .collect()
    }

    async fn copy(&self, from: &Path, to: &Path, collection: &mut Collection) -> Result<(), CollectError> {
        if !from.is_file() {
            warn!("Expected artifact {} was not produced", from.display());
            collection.missing.push(from.to_path_buf());
            return Ok(());
        }
        tokio::fs::copy(from, to)
            .await
            .map_err(|e| CollectError::Copy {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                message: e.to_string(),
            })?;
        debug!("Released {} as {}", from.display(), to.display());
        collection.copied.push(to.to_path_buf());
        Ok(())
    }
}
