//! Zephyr `VERSION` files
//!
//! Tags follow `vMAJOR.MINOR.PATCH[-EXTRA][+TWEAK]`. When the version comes
//! from `git describe`, the tweak is the number of commits since the tag, or
//! 255 for a dirty tree sitting exactly on the tag.

use std::path::Path;

use crate::{describe, GitError, DIRTY_SUFFIX};

/// Tweak marking a dirty work tree on a tagged commit
pub const DIRTY_ON_TAG_TWEAK: u32 = 255;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZephyrVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub extra: String,
    pub tweak: u32,
}

impl ZephyrVersion {
    /// Version of the repository containing `path`
    pub fn detect(path: &Path) -> Result<Self, GitError> {
        Self::from_describe(&describe(path)?)
    }

    /// Version of a tag given by the user, assumed clean and checked out
    pub fn from_tag(tag: &str) -> Result<Self, GitError> {
        parse_tag(tag)
    }

    /// Parse `git describe --tags --always --long --dirty=+` output
    pub fn from_describe(description: &str) -> Result<Self, GitError> {
        let description = description.trim();
        let dirty = description.ends_with(DIRTY_SUFFIX);
        let parts: Vec<&str> = description.split('-').collect();

        match parts.as_slice() {
            [hash] if !hash.is_empty() => Ok(Self::default()),
            [tag @ .., distance, _hash] if !tag.is_empty() => {
                let distance: u32 = distance
                    .parse()
                    .map_err(|_| GitError::Unparsable(description.to_string()))?;
                let mut version = parse_tag(&tag.join("-"))?;
                if distance > 0 {
                    version.tweak = distance;
                } else if dirty {
                    version.tweak = DIRTY_ON_TAG_TWEAK;
                }
                Ok(version)
            }
            _ => Err(GitError::Unparsable(description.to_string())),
        }
    }

    /// Content of a Zephyr `VERSION` file
    pub fn to_version_file(&self) -> String {
        let mut lines = vec![
            format!("VERSION_MAJOR = {}", self.major),
            format!("VERSION_MINOR = {}", self.minor),
            format!("PATCHLEVEL = {}", self.patch),
            format!("VERSION_TWEAK = {}", self.tweak),
        ];
        if !self.extra.is_empty() {
            lines.push(format!("EXTRAVERSION = {}", self.extra));
        }
        lines.join("\n")
    }
}

fn parse_tag(tag: &str) -> Result<ZephyrVersion, GitError> {
    let invalid = |reason: &str| GitError::InvalidTag {
        tag: tag.to_string(),
        reason: reason.to_string(),
    };

    let rest = tag.strip_prefix('v').ok_or_else(|| invalid("must start with `v`"))?;
    let (rest, tweak) = match rest.rsplit_once('+') {
        Some((rest, tweak)) => (
            rest,
            tweak.parse().map_err(|_| invalid("tweak must be an integer"))?,
        ),
        None => (rest, 0),
    };
    let (core, extra) = rest.split_once('-').unwrap_or((rest, ""));

    let numbers: Vec<&str> = core.split('.').collect();
    let [major, minor, patch] = numbers.as_slice() else {
        return Err(invalid("expected vMAJOR.MINOR.PATCH[-EXTRA][+TWEAK]"));
    };
    let number = |part: &str, name: &str| -> Result<u32, GitError> {
        part.parse()
            .map_err(|_| invalid(&format!("{} version must be an integer", name)))
    };

    Ok(ZephyrVersion {
        major: number(*major, "major")?,
        minor: number(*minor, "minor")?,
        patch: number(*patch, "patch")?,
        extra: extra.to_string(),
        tweak,
    })
}
