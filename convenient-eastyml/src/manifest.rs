//! east.yml parsing with eager validation
//!
//! The manifest is read once per invocation and is immutable afterwards.
//! Every cross reference (sample inheritance, pack rules) is checked while
//! loading, so configuration mistakes surface before any build runs.

use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::pack::PackSpec;

/// Manifest file name, relative to the project root
pub const MANIFEST_FILE: &str = "east.yml";

/// Build-type name of the implicit build (common and board fragments only)
pub const RELEASE_BUILD_TYPE: &str = "release";

/// Fragment every app configuration is layered on top of
pub const COMMON_CONF: &str = "common.conf";

/// Application entry of the manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AppSpec {
    /// Unique application name, also its directory under `app/`
    pub name: String,
    /// Board identifiers the app is released for
    #[serde(rename = "west-boards")]
    pub boards: Vec<String>,
    /// Named build variants, in declaration order
    #[serde(rename = "build-types", default, skip_serializing_if = "Vec::is_empty")]
    pub build_types: Vec<BuildType>,
}

impl AppSpec {
    /// Look up a declared build-type by name
    pub fn build_type(&self, name: &str) -> Option<&BuildType> {
        self.build_types.iter().find(|bt| bt.name == name)
    }
}

/// Named, ordered set of conf fragments layered on top of `common.conf`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildType {
    #[serde(rename = "type")]
    pub name: String,
    /// Fragment file names relative to the app's conf directory
    #[serde(rename = "conf-files", default)]
    pub conf_files: Vec<String>,
}

/// `inherit-build-type` reference of a sample, as written in the manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InheritBuildType {
    pub app: String,
    #[serde(rename = "build-type")]
    pub build_type: String,
}

/// Sample entry of the manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SampleSpec {
    /// Unique sample name, may contain `/` for nested sample directories
    pub name: String,
    #[serde(rename = "west-boards")]
    pub boards: Vec<String>,
    #[serde(
        rename = "inherit-build-type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub inherit: Option<InheritBuildType>,
}

/// Which build-type of an app a reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BuildTypeSlot {
    /// The implicit `release` build every app has
    Release,
    /// Index into [`AppSpec::build_types`]
    Declared(usize),
}

/// Sample inheritance resolved into indices of the app table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BuildTypeRef {
    /// Index into [`Manifest::apps`]
    pub app: usize,
    pub build_type: BuildTypeSlot,
}

/// Optional `version` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct VersionSpec {
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    // Outer None: key absent. Inner None: key present without a value.
    #[serde(default, deserialize_with = "present")]
    apps: Option<Option<Vec<AppSpec>>>,
    #[serde(default)]
    samples: Option<Vec<SampleSpec>>,
    #[serde(default)]
    pack: Option<PackSpec>,
    #[serde(default)]
    version: Option<VersionSpec>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Validated east.yml
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Path the manifest was loaded from
    pub path: PathBuf,
    /// SHA256 of the manifest bytes
    pub checksum: String,
    pub apps: Vec<AppSpec>,
    pub samples: Vec<SampleSpec>,
    pub pack: Option<PackSpec>,
    pub version: Option<VersionSpec>,
    inherited: Vec<Option<BuildTypeRef>>,
}

impl Manifest {
    /// Load and validate a manifest file
    ///
    /// A missing file yields [`ManifestError::NotFound`] and an empty one
    /// [`ManifestError::Empty`]; use [`Manifest::load_optional`] when the
    /// manifest is optional.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ManifestError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ManifestError::IoError(path.to_path_buf(), e.to_string())),
        };

        let manifest = Self::parse(path, &content)?;
        info!(
            "Loaded {} ({} apps, {} samples)",
            path.display(),
            manifest.apps.len(),
            manifest.samples.len()
        );
        Ok(manifest)
    }

    /// Load `east.yml` from a project root, treating an absent or empty
    /// file as "no manifest"
    pub async fn load_optional(project_dir: impl AsRef<Path>) -> Result<Option<Self>, ManifestError> {
        match Self::load(project_dir.as_ref().join(MANIFEST_FILE)).await {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) if e.is_absent() => {
                debug!("{}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Parse and validate manifest content; `path` is used for diagnostics
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Result<Self, ManifestError> {
        let path = path.into();

        if content.trim().is_empty() {
            return Err(ManifestError::Empty(path));
        }
        let document: serde_yaml::Value = serde_yaml::from_str(content)
            .map_err(|e| ManifestError::ParseError(path.clone(), e.to_string()))?;
        if document.is_null() {
            return Err(ManifestError::Empty(path));
        }

        let raw: RawManifest =
            serde_yaml::from_str(content).map_err(|e| ManifestError::from_serde(&path, e))?;

        let apps = match raw.apps {
            None => Vec::new(),
            Some(None) => {
                return Err(ManifestError::schema(&path, "apps", "no apps listed under it"));
            }
            Some(Some(apps)) => apps,
        };
        let samples = raw.samples.unwrap_or_default();

        validate_apps(&path, &apps)?;
        let inherited = resolve_samples(&path, &apps, &samples)?;
        if let Some(pack) = &raw.pack {
            pack.validate()
                .map_err(|(key, message)| ManifestError::schema(&path, &key, &message))?;
        }
        if let Some(version) = &raw.version {
            if let Some(dup) = first_duplicate(version.paths.iter()) {
                return Err(ManifestError::schema(
                    &path,
                    "version.paths",
                    &format!("`{}` is listed more than once", dup),
                ));
            }
        }

        Ok(Self {
            checksum: calculate_checksum(content),
            path,
            apps,
            samples,
            pack: raw.pack,
            version: raw.version,
            inherited,
        })
    }

    /// Find an app by name
    pub fn app(&self, name: &str) -> Option<&AppSpec> {
        self.apps.iter().find(|a| a.name == name)
    }

    /// Find a sample by name
    pub fn sample(&self, name: &str) -> Option<&SampleSpec> {
        self.samples.iter().find(|s| s.name == name)
    }

    /// Resolved inheritance of the sample at `index`, if it declares one
    pub fn inherited(&self, index: usize) -> Option<BuildTypeRef> {
        self.inherited.get(index).copied().flatten()
    }

    /// Resolved inheritance of the sample named `name`
    pub fn inherited_by_name(&self, name: &str) -> Option<BuildTypeRef> {
        let index = self.samples.iter().position(|s| s.name == name)?;
        self.inherited(index)
    }

    /// Follow a resolved reference; `None` build-type means the implicit release build
    pub fn build_type_of(&self, reference: BuildTypeRef) -> Option<(&AppSpec, Option<&BuildType>)> {
        let app = self.apps.get(reference.app)?;
        match reference.build_type {
            BuildTypeSlot::Release => Some((app, None)),
            BuildTypeSlot::Declared(i) => app.build_types.get(i).map(|bt| (app, Some(bt))),
        }
    }
}

fn calculate_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn first_duplicate<'a>(items: impl Iterator<Item = &'a String>) -> Option<&'a String> {
    let mut seen = HashSet::new();
    items.into_iter().find(|item| !seen.insert(item.as_str()))
}

fn validate_apps(path: &Path, apps: &[AppSpec]) -> Result<(), ManifestError> {
    let mut names = HashSet::new();
    for (i, app) in apps.iter().enumerate() {
        if !names.insert(app.name.as_str()) {
            return Err(ManifestError::schema(
                path,
                &format!("apps[{}].name", i),
                &format!("duplicated app `{}`", app.name),
            ));
        }

        let mut types = HashSet::new();
        for (j, bt) in app.build_types.iter().enumerate() {
            let key = format!("apps[{}].build-types[{}]", i, j);
            if bt.name == RELEASE_BUILD_TYPE {
                return Err(ManifestError::schema(
                    path,
                    &format!("{}.type", key),
                    "`release` is reserved for the implicit build",
                ));
            }
            if !types.insert(bt.name.as_str()) {
                return Err(ManifestError::schema(
                    path,
                    &format!("{}.type", key),
                    &format!("duplicated build-type `{}` in app `{}`", bt.name, app.name),
                ));
            }
            if bt.conf_files.iter().any(|f| f == COMMON_CONF) {
                return Err(ManifestError::schema(
                    path,
                    &format!("{}.conf-files", key),
                    "common.conf is always applied and must not be listed",
                ));
            }
        }
    }
    Ok(())
}

fn resolve_samples(
    path: &Path,
    apps: &[AppSpec],
    samples: &[SampleSpec],
) -> Result<Vec<Option<BuildTypeRef>>, ManifestError> {
    let mut names = HashSet::new();
    let mut resolved = Vec::with_capacity(samples.len());

    for (i, sample) in samples.iter().enumerate() {
        if !names.insert(sample.name.as_str()) {
            return Err(ManifestError::schema(
                path,
                &format!("samples[{}].name", i),
                &format!("duplicated sample `{}`", sample.name),
            ));
        }

        let Some(inherit) = &sample.inherit else {
            resolved.push(None);
            continue;
        };
        let key = format!("samples[{}].inherit-build-type", i);

        if apps.is_empty() {
            return Err(ManifestError::schema(
                path,
                &key,
                &format!("sample `{}` inherits, but there are no apps", sample.name),
            ));
        }
        let app_index = apps
            .iter()
            .position(|a| a.name == inherit.app)
            .ok_or_else(|| {
                ManifestError::schema(
                    path,
                    &format!("{}.app", key),
                    &format!("sample `{}` inherits from unknown app `{}`", sample.name, inherit.app),
                )
            })?;

        let slot = if inherit.build_type == RELEASE_BUILD_TYPE {
            BuildTypeSlot::Release
        } else {
            let index = apps[app_index]
                .build_types
                .iter()
                .position(|bt| bt.name == inherit.build_type)
                .ok_or_else(|| {
                    ManifestError::schema(
                        path,
                        &format!("{}.build-type", key),
                        &format!(
                            "sample `{}` inherits from unknown build-type `{}` of app `{}`",
                            sample.name, inherit.build_type, inherit.app
                        ),
                    )
                })?;
            BuildTypeSlot::Declared(index)
        };

        debug!("Sample {} inherits {}:{}", sample.name, inherit.app, inherit.build_type);
        resolved.push(Some(BuildTypeRef {
            app: app_index,
            build_type: slot,
        }));
    }
    Ok(resolved)
}

/// Errors raised while loading east.yml
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("IO error reading {0}: {1}")]
    IoError(PathBuf, String),
    #[error("{0} not found")]
    NotFound(PathBuf),
    #[error("{0} is empty")]
    Empty(PathBuf),
    #[error("Parse error in {0}: {1}")]
    ParseError(PathBuf, String),
    #[error("Schema error in {path} at `{key}`: {message}")]
    SchemaError {
        path: PathBuf,
        key: String,
        message: String,
    },
}

impl ManifestError {
    /// True when the error means "there is no manifest" rather than "the manifest is wrong"
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Empty(_))
    }

    fn schema(path: &Path, key: &str, message: &str) -> Self {
        Self::SchemaError {
            path: path.to_path_buf(),
            key: key.to_string(),
            message: message.to_string(),
        }
    }

    // serde_yaml prefixes nested errors with their path, e.g. "apps[0]: missing field `name`"
    fn from_serde(path: &Path, error: serde_yaml::Error) -> Self {
        let text = error.to_string();
        match text.split_once(": ") {
            Some((key, message)) if !key.contains(' ') => Self::schema(path, key, message),
            _ => Self::schema(path, "<root>", &text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NRF52_APP: &str = r#"
apps:
  - name: nrf52_app
    west-boards:
      - boardA
      - boardB
    build-types:
      - type: debug
        conf-files:
          - debug.conf
      - type: uart
        conf-files:
          - debug.conf
          - uart.conf
samples:
  - name: settings
    west-boards:
      - boardA
    inherit-build-type:
      app: nrf52_app
      build-type: uart
  - name: basic/blinky
    west-boards:
      - boardB
"#;

    fn parse(content: &str) -> Result<Manifest, ManifestError> {
        Manifest::parse("east.yml", content)
    }

    fn schema_key(err: ManifestError) -> String {
        match err {
            ManifestError::SchemaError { key, .. } => key,
            other => panic!("Expected SchemaError, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_apps_and_samples() {
        let manifest = parse(NRF52_APP).unwrap();

        assert_eq!(manifest.apps.len(), 1);
        let app = &manifest.apps[0];
        assert_eq!(app.boards, vec!["boardA", "boardB"]);
        assert_eq!(app.build_types[1].conf_files, vec!["debug.conf", "uart.conf"]);
        assert_eq!(manifest.samples[1].name, "basic/blinky");
        assert_eq!(manifest.checksum.len(), 64);
    }

    #[test]
    fn test_inheritance_resolved_to_indices() {
        let manifest = parse(NRF52_APP).unwrap();

        let reference = manifest.inherited(0).unwrap();
        assert_eq!(reference.app, 0);
        assert_eq!(reference.build_type, BuildTypeSlot::Declared(1));
        assert!(manifest.inherited(1).is_none());

        let (app, bt) = manifest.build_type_of(reference).unwrap();
        assert_eq!(app.name, "nrf52_app");
        assert_eq!(bt.unwrap().name, "uart");
    }

    #[test]
    fn test_inherit_release_is_always_allowed() {
        let manifest = parse(
            r#"
apps:
  - name: plain
    west-boards: [boardA]
samples:
  - name: s
    west-boards: [boardA]
    inherit-build-type: {app: plain, build-type: release}
"#,
        )
        .unwrap();

        let reference = manifest.inherited_by_name("s").unwrap();
        assert_eq!(reference.build_type, BuildTypeSlot::Release);
        assert!(manifest.build_type_of(reference).unwrap().1.is_none());
    }

    #[test]
    fn test_duplicate_app_name() {
        let err = parse(
            r#"
apps:
  - name: a
    west-boards: [x]
  - name: a
    west-boards: [y]
"#,
        )
        .unwrap_err();
        assert_eq!(schema_key(err), "apps[1].name");
    }

    #[test]
    fn test_duplicate_build_type() {
        let err = parse(
            r#"
apps:
  - name: a
    west-boards: [x]
    build-types:
      - type: debug
        conf-files: [debug.conf]
      - type: debug
        conf-files: [other.conf]
"#,
        )
        .unwrap_err();
        assert_eq!(schema_key(err), "apps[0].build-types[1].type");
    }

    #[test]
    fn test_declaring_release_is_rejected() {
        let err = parse(
            r#"
apps:
  - name: a
    west-boards: [x]
    build-types:
      - type: release
        conf-files: [r.conf]
"#,
        )
        .unwrap_err();
        assert_eq!(schema_key(err), "apps[0].build-types[0].type");
    }

    #[test]
    fn test_common_conf_listed_in_build_type() {
        let err = parse(
            r#"
apps:
  - name: a
    west-boards: [x]
    build-types:
      - type: debug
        conf-files: [common.conf, debug.conf]
"#,
        )
        .unwrap_err();
        assert_eq!(schema_key(err), "apps[0].build-types[0].conf-files");
    }

    #[test]
    fn test_duplicate_sample_name() {
        let err = parse(
            r#"
samples:
  - name: s
    west-boards: [x]
  - name: s
    west-boards: [x]
"#,
        )
        .unwrap_err();
        assert_eq!(schema_key(err), "samples[1].name");
    }

    #[test]
    fn test_dangling_inheritance() {
        let unknown_app = parse(&NRF52_APP.replace("app: nrf52_app", "app: missing")).unwrap_err();
        assert_eq!(schema_key(unknown_app), "samples[0].inherit-build-type.app");

        let unknown_type = parse(&NRF52_APP.replace("build-type: uart", "build-type: rtt")).unwrap_err();
        assert_eq!(
            schema_key(unknown_type),
            "samples[0].inherit-build-type.build-type"
        );
    }

    #[test]
    fn test_inherit_without_apps() {
        let err = parse(
            r#"
samples:
  - name: s
    west-boards: [x]
    inherit-build-type: {app: a, build-type: release}
"#,
        )
        .unwrap_err();
        assert_eq!(schema_key(err), "samples[0].inherit-build-type");
    }

    #[test]
    fn test_apps_key_without_value() {
        let err = parse("apps:\nsamples:\n  - name: s\n    west-boards: [x]\n").unwrap_err();
        assert_eq!(schema_key(err), "apps");
    }

    #[test]
    fn test_missing_partitions_are_empty() {
        let manifest = parse("samples:\n  - name: s\n    west-boards: [x]\n").unwrap();
        assert!(manifest.apps.is_empty());
        assert_eq!(manifest.samples.len(), 1);
    }

    #[test]
    fn test_missing_required_key_is_schema_error() {
        let err = parse("apps:\n  - name: a\n").unwrap_err();
        assert!(matches!(err, ManifestError::SchemaError { .. }));
    }

    #[test]
    fn test_unknown_key_is_schema_error() {
        let err = parse("apps:\n  - name: a\n    west-boards: [x]\n    boards: [y]\n").unwrap_err();
        assert!(matches!(err, ManifestError::SchemaError { .. }));
    }

    #[test]
    fn test_empty_and_comment_only_content() {
        assert!(parse("").unwrap_err().is_absent());
        assert!(parse("# nothing here yet\n").unwrap_err().is_absent());
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = parse("apps: [unterminated\n").unwrap_err();
        assert!(matches!(err, ManifestError::ParseError(_, _)));
    }

    #[test]
    fn test_duplicate_version_paths() {
        let err = parse(
            "apps:\n  - name: a\n    west-boards: [x]\nversion:\n  paths: [app, app]\n",
        )
        .unwrap_err();
        assert_eq!(schema_key(err), "version.paths");
    }
}
