//! Typed east.yml manifest model
//!
//! Provides:
//! - Parsing of the `apps`, `samples`, `pack` and `version` sections
//! - Eager validation of names and sample inheritance
//! - Pack rules describing the extra artifacts released per subject
//! - File checksum of the loaded manifest for release reports

pub mod manifest;
pub mod pack;

pub use manifest::{
    AppSpec, BuildType, BuildTypeRef, BuildTypeSlot, InheritBuildType, Manifest, ManifestError,
    SampleSpec, VersionSpec, COMMON_CONF, MANIFEST_FILE, RELEASE_BUILD_TYPE,
};
pub use pack::{BuildConfiguration, PackSpec, APP_DIR_PLACEHOLDER};
