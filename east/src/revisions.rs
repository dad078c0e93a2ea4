//! Hardware revision discovery
//!
//! Revisions are derived from `<board>_<X>_<Y>_<Z>.conf` files next to the
//! board definition (`board.yml` for hardware model v2, `<board>_defconfig`
//! before that). A board without such files, or not defined in the project at
//! all, is built once under its own identifier.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const BOARD_YML: &str = "board.yml";

/// One concrete target of a board identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct HardwareRevision {
    /// Board identifier as declared in the manifest
    pub board: String,
    /// `X.Y.Z` revision, `None` when the board has no revisions
    pub revision: Option<String>,
}

impl HardwareRevision {
    pub fn bare(board: impl Into<String>) -> Self {
        Self {
            board: board.into(),
            revision: None,
        }
    }

    pub fn qualified(board: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            board: board.into(),
            revision: Some(revision.into()),
        }
    }
}

/// `board@X.Y.Z`, the form the build tool expects after `-b`
impl fmt::Display for HardwareRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.revision {
            Some(revision) => write!(f, "{}@{}", self.board, revision),
            None => write!(f, "{}", self.board),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BoardYml {
    board: Option<BoardEntry>,
}

#[derive(Debug, Deserialize)]
struct BoardEntry {
    name: String,
}

/// Scans a boards directory; never writes to it
#[derive(Debug, Clone)]
pub struct RevisionDiscoverer {
    boards_dir: PathBuf,
}

impl RevisionDiscoverer {
    pub fn new(boards_dir: impl Into<PathBuf>) -> Self {
        Self {
            boards_dir: boards_dir.into(),
        }
    }

    /// Revisions of `board`, sorted lexically; at least one entry
    pub fn discover(&self, board: &str) -> Vec<HardwareRevision> {
        let normalized = board.replace('/', "_");

        let Some(board_dir) = self.find_board_dir(&normalized) else {
            debug!("{} is not defined under {}", board, self.boards_dir.display());
            return vec![HardwareRevision::bare(board)];
        };

        let pattern = format!(
            r"^{}_(\d{{1,2}})_(\d{{1,2}})_(\d{{1,2}})\.conf$",
            regex::escape(&normalized)
        );
        let revision_file = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!("Cannot scan revisions of {}: {}", board, e);
                return vec![HardwareRevision::bare(board)];
            }
        };

        let mut revisions: Vec<String> = fs::read_dir(&board_dir)
            .into_iter()
            .flatten()
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let file_name = entry.file_name();
                let captures = revision_file.captures(file_name.to_str()?)?;
                Some(format!("{}.{}.{}", &captures[1], &captures[2], &captures[3]))
            })
            .collect();
        revisions.sort();
        revisions.dedup();

        if revisions.is_empty() {
            debug!("{} has no revision files in {}", board, board_dir.display());
            return vec![HardwareRevision::bare(board)];
        }
        debug!("{} revisions: {:?}", board, revisions);
        revisions
            .into_iter()
            .map(|revision| HardwareRevision::qualified(board, revision))
            .collect()
    }

    fn find_board_dir(&self, normalized: &str) -> Option<PathBuf> {
        WalkDir::new(&self.boards_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .find(|entry| defines_board(entry.path(), normalized))
            .map(|entry| entry.into_path())
    }
}

fn matches_board(defined: &str, normalized: &str) -> bool {
    normalized == defined
        || normalized
            .strip_prefix(defined)
            .is_some_and(|rest| rest.starts_with('_'))
}

fn defines_board(dir: &Path, normalized: &str) -> bool {
    let board_yml = dir.join(BOARD_YML);
    if board_yml.is_file() {
        let name = fs::read_to_string(&board_yml)
            .ok()
            .and_then(|content| serde_yaml::from_str::<BoardYml>(&content).ok())
            .and_then(|yml| yml.board)
            .map(|entry| entry.name);
        if name.is_some_and(|name| matches_board(&name, normalized)) {
            return true;
        }
    }

    fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(Result::ok)
        .any(|entry| {
            entry
                .file_name()
                .to_str()
                .and_then(|name| name.strip_suffix("_defconfig"))
                .is_some_and(|defined| matches_board(defined, normalized))
        })
}
