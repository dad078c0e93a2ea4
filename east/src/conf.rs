//! Conf-file resolution
//!
//! Every resolved list has the same shape: `common.conf`, then the board
//! fragment if the app has one, then the build-type's own fragments in
//! declaration order. Samples without `inherit-build-type` get an empty list
//! and fall back to the build tool's default `prj.conf`.

use convenient_eastyml::{AppSpec, BuildType, Manifest, COMMON_CONF, RELEASE_BUILD_TYPE};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use crate::layout::{ProjectLayout, SubjectKind};

/// Ordered conf fragments of one build
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfFragments {
    pub files: Vec<PathBuf>,
    /// Build-type the fragments belong to, `release` for the implicit build
    pub build_type: Option<String>,
}

impl ConfFragments {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// CMake defines handed to the build tool after `--`
    pub fn cmake_args(&self) -> Vec<String> {
        let Some((conf_file, overlays)) = self.files.split_first() else {
            return Vec::new();
        };

        let mut args = vec![format!("-DCONF_FILE={}", conf_file.display())];
        if !overlays.is_empty() {
            let joined: Vec<String> = overlays.iter().map(|p| p.display().to_string()).collect();
            args.push(format!("-DOVERLAY_CONFIG={}", joined.join(";")));
        }
        if let Some(build_type) = &self.build_type {
            args.push(format!("-DEAST_BUILD_TYPE={}", build_type));
        }
        args
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
pub enum ConfError {
    #[error("{subject}: {} is missing", .path.display())]
    MissingCommonConf { subject: String, path: PathBuf },

    #[error("{subject}: build-type `{build_type}` is not declared")]
    UnknownBuildType { subject: String, build_type: String },

    #[error("{subject}: fragment {} of build-type `{build_type}` is missing", .path.display())]
    MissingFragment {
        subject: String,
        build_type: String,
        path: PathBuf,
    },

    #[error("{subject}: samples take their build-type from inherit-build-type")]
    BuildTypeOnSample { subject: String },

    #[error("{kind} `{name}` is not listed in east.yml")]
    UnknownSubject { kind: SubjectKind, name: String },
}

/// Resolves conf fragments against a validated manifest and the project layout
pub struct ConfResolver<'a> {
    manifest: &'a Manifest,
    layout: &'a ProjectLayout,
}

impl<'a> ConfResolver<'a> {
    pub fn new(manifest: &'a Manifest, layout: &'a ProjectLayout) -> Self {
        Self { manifest, layout }
    }

    /// Resolve by subject name, as a direct single build does
    pub fn resolve(
        &self,
        kind: SubjectKind,
        name: &str,
        board: &str,
        build_type: Option<&str>,
    ) -> Result<ConfFragments, ConfError> {
        let unknown = || ConfError::UnknownSubject {
            kind,
            name: name.to_string(),
        };
        match kind {
            SubjectKind::App => {
                let app = self.manifest.app(name).ok_or_else(unknown)?;
                self.resolve_app(app, board, build_type)
            }
            SubjectKind::Sample => {
                if build_type.is_some() {
                    return Err(ConfError::BuildTypeOnSample {
                        subject: name.to_string(),
                    });
                }
                let index = self
                    .manifest
                    .samples
                    .iter()
                    .position(|s| s.name == name)
                    .ok_or_else(unknown)?;
                self.resolve_sample(index, board)
            }
        }
    }

    /// Fragments of `app` on `board`; no build-type means the implicit build
    pub fn resolve_app(
        &self,
        app: &AppSpec,
        board: &str,
        build_type: Option<&str>,
    ) -> Result<ConfFragments, ConfError> {
        let build_type = match build_type {
            None | Some(RELEASE_BUILD_TYPE) => None,
            Some(name) => Some(app.build_type(name).ok_or_else(|| ConfError::UnknownBuildType {
                subject: app.name.clone(),
                build_type: name.to_string(),
            })?),
        };
        self.fragments(&app.name, app, board, build_type)
    }

    /// Fragments of the sample at `index` in the manifest
    pub fn resolve_sample(&self, index: usize, board: &str) -> Result<ConfFragments, ConfError> {
        let Some(sample) = self.manifest.samples.get(index) else {
            return Err(ConfError::UnknownSubject {
                kind: SubjectKind::Sample,
                name: format!("#{}", index),
            });
        };
        let Some(reference) = self.manifest.inherited(index) else {
            debug!("{}: no inherit-build-type, using the build tool default", sample.name);
            return Ok(ConfFragments::default());
        };
        match self.manifest.build_type_of(reference) {
            Some((app, build_type)) => self.fragments(&sample.name, app, board, build_type),
            None => Err(ConfError::UnknownSubject {
                kind: SubjectKind::App,
                name: format!("#{}", reference.app),
            }),
        }
    }

    fn fragments(
        &self,
        subject: &str,
        app: &AppSpec,
        board: &str,
        build_type: Option<&BuildType>,
    ) -> Result<ConfFragments, ConfError> {
        let conf_dir = self.layout.conf_dir(&app.name);
        let common = conf_dir.join(COMMON_CONF);

        if !common.is_file() {
            if app.build_types.is_empty() {
                debug!("{}: no {}, using the build tool default", subject, COMMON_CONF);
                return Ok(ConfFragments::default());
            }
            return Err(ConfError::MissingCommonConf {
                subject: subject.to_string(),
                path: common,
            });
        }

        let mut files = vec![common];

        let board_conf = conf_dir.join(format!("{}.conf", board_fragment_stem(board)));
        if board_conf.is_file() {
            files.push(board_conf);
        }

        if let Some(build_type) = build_type {
            for name in &build_type.conf_files {
                let path = conf_dir.join(name);
                if !path.is_file() {
                    return Err(ConfError::MissingFragment {
                        subject: subject.to_string(),
                        build_type: build_type.name.clone(),
                        path,
                    });
                }
                files.push(path);
            }
        }

        let build_type = build_type
            .map(|bt| bt.name.clone())
            .unwrap_or_else(|| RELEASE_BUILD_TYPE.to_string());
        debug!("{} on {} ({}): {:?}", subject, board, build_type, files);
        Ok(ConfFragments {
            files,
            build_type: Some(build_type),
        })
    }
}

/// Board fragment file stem: revision dropped, hardware model v2 qualifiers flattened
pub fn board_fragment_stem(board: &str) -> String {
    let base = board.split('@').next().unwrap_or(board);
    base.replace('/', "_")
}
