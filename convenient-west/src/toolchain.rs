//! Toolchain manager contract and the nrfutil implementation

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::router::CommandLine;
use crate::workspace::WestError;

/// External collaborator providing SDK-pinned toolchain environments
pub trait ToolchainManager {
    /// Whether the manager itself is installed
    fn is_available(&self) -> bool;

    /// SDK versions the manager can provide a toolchain for
    fn supported_versions(&self) -> Result<Vec<String>, WestError>;

    /// SDK versions whose toolchain is installed
    fn installed_versions(&self) -> Result<Vec<String>, WestError>;

    /// Prefix that runs the command following it inside the toolchain of `sdk_version`
    fn launch_prefix(&self, sdk_version: &str) -> CommandLine;

    /// Command that installs the toolchain of `sdk_version`
    fn install_command(&self, sdk_version: &str) -> CommandLine;
}

/// `nrfutil toolchain-manager`
#[derive(Debug, Clone)]
pub struct NrfutilToolchainManager {
    executable: PathBuf,
}

impl NrfutilToolchainManager {
    /// Manager driven through the `nrfutil` executable at `executable`
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Path of the `nrfutil` executable
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn subcommand(&self, args: &[&str]) -> CommandLine {
        CommandLine::new(self.executable.to_string_lossy())
            .arg("toolchain-manager")
            .args(args.iter().copied())
    }

    fn query(&self, args: &[&str]) -> Result<Vec<String>, WestError> {
        let command = self.subcommand(args);
        debug!("Querying toolchain manager: {}", command);

        let output = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| WestError::ManagerQuery {
                command: command.to_string(),
                message: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(WestError::ManagerQuery {
                command: command.to_string(),
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(parse_versions(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl ToolchainManager for NrfutilToolchainManager {
    fn is_available(&self) -> bool {
        self.executable.is_file()
    }

    fn supported_versions(&self) -> Result<Vec<String>, WestError> {
        self.query(&["search"])
    }

    fn installed_versions(&self) -> Result<Vec<String>, WestError> {
        self.query(&["list"])
    }

    fn launch_prefix(&self, sdk_version: &str) -> CommandLine {
        self.subcommand(&["launch", "--ncs-version", sdk_version, "--"])
    }

    fn install_command(&self, sdk_version: &str) -> CommandLine {
        self.subcommand(&["install", "--ncs-version", sdk_version])
    }
}

/// First version-looking token of every line, e.g. `* v2.5.0   /opt/ncs` -> `v2.5.0`
pub fn parse_versions(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            line.split_whitespace()
                .map(|token| token.trim_start_matches('*'))
                .find(|token| looks_like_version(token))
                .map(str::to_string)
        })
        .collect()
}

fn looks_like_version(token: &str) -> bool {
    let digits = token.strip_prefix('v').unwrap_or(token);
    digits.starts_with(|c: char| c.is_ascii_digit()) && digits.contains('.')
}
