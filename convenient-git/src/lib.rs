//! Release versioning on top of `git describe`
//!
//! The version of a release is taken from the closest tag reachable from
//! `HEAD`, in the long form `<tag>-<distance>-g<hash>` with a `+` suffix for
//! a dirty work tree. Artifacts built exactly on a clean tag carry no hash.

use std::fmt;
use std::path::Path;

use git2::{DescribeFormatOptions, DescribeOptions, Repository};
use serde::Serialize;
use tracing::debug;

pub mod version_file;

pub use version_file::ZephyrVersion;

/// Tag used when the repository has no tags at all
pub const UNTAGGED: &str = "v0.0.0";

/// Suffix `git describe` appends for a dirty work tree
pub const DIRTY_SUFFIX: &str = "+";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseVersion {
    /// Closest tag, or [`UNTAGGED`]
    pub tag: String,
    /// Abbreviated commit id; empty when built on a clean tagged commit
    pub hash: String,
}

impl ReleaseVersion {
    /// Version used for projects outside of any git repository
    pub fn unversioned() -> Self {
        Self {
            tag: UNTAGGED.to_string(),
            hash: String::new(),
        }
    }

    /// Describe the repository containing `path`
    pub fn detect(path: &Path) -> Result<Self, GitError> {
        let description = describe(path)?;
        debug!("git describe in {}: {}", path.display(), description);
        Self::parse(&description)
    }

    /// Parse `git describe --tags --always --long --dirty=+` output
    pub fn parse(description: &str) -> Result<Self, GitError> {
        let description = description.trim();
        let parts: Vec<&str> = description.split('-').collect();

        match parts.as_slice() {
            [hash] if !hash.is_empty() => Ok(Self {
                tag: UNTAGGED.to_string(),
                hash: hash.to_string(),
            }),
            [tag @ .., distance, hash] if !tag.is_empty() => {
                let dirty = description.ends_with(DIRTY_SUFFIX);
                let hash = if *distance == "0" && !dirty {
                    String::new()
                } else {
                    hash.strip_prefix('g').unwrap_or(*hash).to_string()
                };
                Ok(Self {
                    tag: tag.join("-"),
                    hash,
                })
            }
            _ => Err(GitError::Unparsable(description.to_string())),
        }
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hash.is_empty() {
            write!(f, "{}", self.tag)
        } else {
            write!(f, "{}-{}", self.tag, self.hash)
        }
    }
}

/// Equivalent of `git describe --tags --always --long --dirty=+`
pub fn describe(path: &Path) -> Result<String, GitError> {
    let repo = Repository::discover(path)?;

    let mut options = DescribeOptions::new();
    options.describe_tags().show_commit_oid_as_fallback(true);
    let description = repo.describe(&options)?;

    let mut format = DescribeFormatOptions::new();
    format.always_use_long_format(true).dirty_suffix(DIRTY_SUFFIX);
    Ok(description.format(Some(&format))?)
}

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error("cannot parse git describe output `{0}`")]
    Unparsable(String),
    #[error("invalid tag `{tag}`: {reason}")]
    InvalidTag { tag: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Commit, Oid, Signature};
    use tempfile::TempDir;

    fn commit_file(repo: &Repository, name: &str, content: &str) -> Oid {
        let root = repo.workdir().unwrap();
        std::fs::write(root.join(name), content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

        let signature = Signature::now("East", "east@example.com").unwrap();
        let parents: Vec<Commit> = repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parents: Vec<&Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &signature, &signature, name, &tree, &parents)
            .unwrap()
    }

    #[test]
    fn test_parse_exact_tag() {
        let version = ReleaseVersion::parse("v1.2.0-0-g1a2b3c4").unwrap();
        assert_eq!(version.tag, "v1.2.0");
        assert_eq!(version.hash, "");
        assert_eq!(version.to_string(), "v1.2.0");
    }

    #[test]
    fn test_parse_commits_after_tag() {
        let version = ReleaseVersion::parse("v1.2.0-3-g1a2b3c4\n").unwrap();
        assert_eq!(version.hash, "1a2b3c4");
        assert_eq!(version.to_string(), "v1.2.0-1a2b3c4");
    }

    #[test]
    fn test_parse_dirty_tag() {
        let version = ReleaseVersion::parse("v1.2.0-0-g1a2b3c4+").unwrap();
        assert_eq!(version.hash, "1a2b3c4+");
    }

    #[test]
    fn test_parse_tag_with_dashes() {
        let version = ReleaseVersion::parse("v2.0.0-rc1-4-gdeadbee").unwrap();
        assert_eq!(version.tag, "v2.0.0-rc1");
        assert_eq!(version.hash, "deadbee");
    }

    #[test]
    fn test_parse_untagged() {
        let version = ReleaseVersion::parse("1a2b3c4").unwrap();
        assert_eq!(version.tag, UNTAGGED);
        assert_eq!(version.hash, "1a2b3c4");
    }

    #[test]
    fn test_parse_garbage() {
        assert!(ReleaseVersion::parse("").is_err());
        assert!(ReleaseVersion::parse("a-b").is_err());
    }

    #[test]
    fn test_detect_from_repository() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path()).unwrap();

        let first = commit_file(&repo, "README.md", "east");
        let untagged = ReleaseVersion::detect(temp.path()).unwrap();
        assert_eq!(untagged.tag, UNTAGGED);
        assert!(first.to_string().starts_with(&untagged.hash));

        let object = repo.find_object(first, None).unwrap();
        repo.tag_lightweight("v1.0.0", &object, false).unwrap();
        assert_eq!(
            ReleaseVersion::detect(temp.path()).unwrap(),
            ReleaseVersion {
                tag: "v1.0.0".into(),
                hash: String::new()
            }
        );

        let second = commit_file(&repo, "README.md", "east v2");
        let after = ReleaseVersion::detect(temp.path()).unwrap();
        assert_eq!(after.tag, "v1.0.0");
        assert!(second.to_string().starts_with(&after.hash));

        std::fs::write(temp.path().join("README.md"), "local change").unwrap();
        let dirty = ReleaseVersion::detect(temp.path()).unwrap();
        assert!(dirty.hash.ends_with(DIRTY_SUFFIX));
    }

    #[test]
    fn test_detect_outside_repository() {
        let temp = TempDir::new().unwrap();
        assert!(ReleaseVersion::detect(temp.path()).is_err());
    }
}
