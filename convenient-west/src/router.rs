//! Execution routing: sandboxed toolchain or host tools
//!
//! The decision is made once per invocation by [`ExecutionContext::determine`]
//! and the resulting context is read-only afterwards. Jobs never re-run
//! detection, they only [`ExecutionContext::wrap`] their command lines.

use serde::Serialize;
use std::fmt;
use tracing::{debug, info, warn};

use crate::toolchain::ToolchainManager;
use crate::workspace::{WestError, WestWorkspace};

/// Program plus arguments, not passed through a shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandLine {
    /// Executable name or path
    pub program: String,
    /// Arguments, in order
    pub args: Vec<String>,
}

impl CommandLine {
    /// Command line without arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Input of the routing decision that does not come from the workspace
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Override signal: always run host tools directly
    pub force_direct: bool,
}

/// How every command of this invocation is launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExecutionMode {
    /// Host tools, environment unchanged
    Direct,
    /// Through the toolchain manager of a pinned SDK version
    Sandboxed {
        /// SDK version the toolchain is pinned to
        sdk_version: String,
        /// Prefix placed in front of every command
        launcher: CommandLine,
    },
}

/// Routing decision, computed once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionContext {
    mode: ExecutionMode,
    sdk_version: Option<String>,
    sdk_supported: bool,
    forced_direct: bool,
}

impl ExecutionContext {
    /// Context running everything on the host without any detection
    pub fn direct() -> Self {
        Self {
            mode: ExecutionMode::Direct,
            sdk_version: None,
            sdk_supported: false,
            forced_direct: false,
        }
    }

    /// Decide the execution mode for this invocation
    pub fn determine(
        config: &RouterConfig,
        workspace: Option<&WestWorkspace>,
        manager: &dyn ToolchainManager,
    ) -> Result<Self, RouterError> {
        if config.force_direct {
            info!("Toolchain manager disabled by override, running host tools directly");
            return Ok(Self {
                forced_direct: true,
                ..Self::direct()
            });
        }

        let Some(workspace) = workspace else {
            debug!("Not inside a west workspace, running host tools directly");
            return Ok(Self::direct());
        };
        let sdk_version = match workspace.detect_sdk_version() {
            Ok(Some(version)) => version,
            Ok(None) => {
                debug!("No SDK version detected, treating workspace as vanilla Zephyr");
                return Ok(Self::direct());
            }
            Err(e) => {
                warn!("SDK version detection failed, running host tools directly: {}", e);
                return Ok(Self::direct());
            }
        };

        if !manager.is_available() {
            return Err(RouterError::ToolchainManagerMissing {
                sdk_version,
            });
        }

        let supported = manager.supported_versions()?;
        if !supported.contains(&sdk_version) {
            warn!(
                "SDK {} is not supported by the toolchain manager (supported: {}); \
                 the toolchain must be installed manually",
                sdk_version,
                supported.join(", ")
            );
            return Ok(Self {
                sdk_version: Some(sdk_version),
                ..Self::direct()
            });
        }

        let installed = manager.installed_versions()?;
        if !installed.contains(&sdk_version) {
            return Err(RouterError::ToolchainNotInstalled {
                install: manager.install_command(&sdk_version).to_string(),
                sdk_version,
            });
        }

        info!("Using sandboxed toolchain for SDK {}", sdk_version);
        Ok(Self {
            mode: ExecutionMode::Sandboxed {
                launcher: manager.launch_prefix(&sdk_version),
                sdk_version: sdk_version.clone(),
            },
            sdk_version: Some(sdk_version),
            sdk_supported: true,
            forced_direct: false,
        })
    }

    /// Resolved mode
    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    /// Detected SDK version, if detection ran and found one
    pub fn sdk_version(&self) -> Option<&str> {
        self.sdk_version.as_deref()
    }

    /// Whether the detected SDK version is supported by the toolchain manager
    pub fn sdk_supported(&self) -> bool {
        self.sdk_supported
    }

    /// Whether direct execution was requested by the override signal
    pub fn forced_direct(&self) -> bool {
        self.forced_direct
    }

    /// Whether commands run through the toolchain manager
    pub fn is_sandboxed(&self) -> bool {
        matches!(self.mode, ExecutionMode::Sandboxed { .. })
    }

    /// Route a command line according to the resolved mode
    pub fn wrap(&self, command: CommandLine) -> CommandLine {
        match &self.mode {
            ExecutionMode::Direct => command,
            ExecutionMode::Sandboxed { launcher, .. } => launcher
                .clone()
                .arg(command.program)
                .args(command.args),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Sandboxed { sdk_version, .. } => write!(f, "sandboxed (SDK {})", sdk_version),
        }
    }
}

/// Failures that leave the execution mode undetermined
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Supported SDK version whose toolchain is missing
    #[error("SDK {sdk_version} is supported but its toolchain is not installed, run `{install}`")]
    ToolchainNotInstalled {
        /// Detected SDK version
        sdk_version: String,
        /// Command installing the toolchain
        install: String,
    },
    /// An SDK workspace was detected but the toolchain manager is not installed
    #[error("SDK {sdk_version} detected but the toolchain manager is not installed")]
    ToolchainManagerMissing {
        /// Detected SDK version
        sdk_version: String,
    },
    /// The toolchain manager could not be queried
    #[error(transparent)]
    Query(#[from] WestError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    #[test]
    fn test_direct_wrap_is_identity() {
        let command = CommandLine::new("west").args(["build", "-b", "boardA"]);
        assert_eq!(ExecutionContext::direct().wrap(command.clone()), command);
    }

    #[test]
    fn test_sandboxed_wrap_prefixes_launcher() {
        let context = ExecutionContext {
            mode: ExecutionMode::Sandboxed {
                sdk_version: "v2.5.0".into(),
                launcher: CommandLine::new("nrfutil").args(["toolchain-manager", "launch", "--"]),
            },
            sdk_version: Some("v2.5.0".into()),
            sdk_supported: true,
            forced_direct: false,
        };

        let wrapped = context.wrap(CommandLine::new("west").arg("build"));
        assert_eq!(wrapped.program, "nrfutil");
        assert_eq!(wrapped.to_string(), "nrfutil toolchain-manager launch -- west build");
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(ExecutionMode::Direct.to_string(), "direct");
    }

    struct CatalogManager {
        supported: Vec<String>,
    }

    impl ToolchainManager for CatalogManager {
        fn is_available(&self) -> bool {
            true
        }
        fn supported_versions(&self) -> Result<Vec<String>, WestError> {
            Ok(self.supported.clone())
        }
        fn installed_versions(&self) -> Result<Vec<String>, WestError> {
            Ok(Vec::new())
        }
        fn launch_prefix(&self, _sdk_version: &str) -> CommandLine {
            CommandLine::new("launch")
        }
        fn install_command(&self, sdk_version: &str) -> CommandLine {
            CommandLine::new("install").arg(sdk_version)
        }
    }

    #[test]
    #[traced_test]
    fn test_unsupported_sdk_warns_once() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(".west")).unwrap();
        fs::write(temp.path().join(".west/config"), "[manifest]\npath = .\n").unwrap();
        fs::write(
            temp.path().join("west.yml"),
            "manifest:\n  projects:\n    - name: nrf\n      repo-path: sdk-nrf\n      revision: v1.9.1\n",
        )
        .unwrap();
        let workspace = WestWorkspace::new(temp.path());
        let manager = CatalogManager {
            supported: vec!["v2.5.0".into()],
        };

        let context =
            ExecutionContext::determine(&RouterConfig::default(), Some(&workspace), &manager).unwrap();
        for _ in 0..3 {
            let _ = context.wrap(CommandLine::new("west").arg("build"));
        }

        assert_eq!(context.mode(), &ExecutionMode::Direct);
        assert_eq!(context.sdk_version(), Some("v1.9.1"));
        assert!(!context.sdk_supported());
        logs_assert(|lines: &[&str]| {
            match lines.iter().filter(|l| l.contains("is not supported")).count() {
                1 => Ok(()),
                n => Err(format!("expected one warning, found {}", n)),
            }
        });
    }
}
