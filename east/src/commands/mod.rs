//! East command-line interface
//!
//! - `release`: build the whole matrix of east.yml and collect the artifacts
//! - `build`: build one app or sample for one board
//! - `toolchain`: show how commands would be executed
//! - `version`: write Zephyr VERSION files

use clap::builder::FalseyValueParser;
use clap::{Args, Parser, Subcommand};
use convenient_eastyml::Manifest;
use convenient_git::ReleaseVersion;
use convenient_west::{ExecutionContext, NrfutilToolchainManager, RouterConfig, WestWorkspace};
use east::ProjectLayout;
use std::path::PathBuf;
use tracing::{info, warn};

pub mod build;
pub mod release;
pub mod toolchain;
pub mod version;

pub type CommandResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// East - build-type and release matrix engine for Zephyr/NCS firmware
#[derive(Parser)]
#[command(name = "east")]
#[command(about = "Build-type and release matrix engine for Zephyr and nRF Connect SDK projects")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Project root containing east.yml
    #[arg(long, global = true, env = "EAST_PROJECT_DIR", default_value = ".")]
    pub project_dir: PathBuf,

    /// Run host tools directly, never through the toolchain manager
    #[arg(long, global = true, env = "EAST_DONT_USE_TOOLCHAIN_MANAGER", value_parser = FalseyValueParser::new())]
    pub direct: bool,

    /// nrfutil executable providing the toolchain manager
    #[arg(long, global = true, env = "EAST_TOOLCHAIN_MANAGER")]
    pub toolchain_manager: Option<PathBuf>,

    /// Build tool executable
    #[arg(long, global = true, env = "EAST_WEST", default_value = "west")]
    pub west: String,

    /// Debug logging and streamed build output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build every app and sample of east.yml and collect release artifacts
    Release {
        /// Print the build commands without running them
        #[arg(long)]
        dry_run: bool,
    },

    /// Build one app or sample for one board
    Build {
        /// Board, optionally with a revision (board@X.Y.Z)
        #[arg(short, long)]
        board: String,

        /// App listed in east.yml
        #[arg(long, conflicts_with = "sample", required_unless_present = "sample")]
        app: Option<String>,

        /// Sample listed in east.yml
        #[arg(long)]
        sample: Option<String>,

        /// Build-type of the app
        #[arg(short = 'u', long)]
        build_type: Option<String>,

        /// Build directory
        #[arg(short = 'd', long, default_value = "build")]
        build_dir: PathBuf,
    },

    /// Show the detected SDK and how commands are executed
    Toolchain,

    /// Write Zephyr VERSION files from git describe or a given tag
    Version {
        /// Tag in the form vMAJOR.MINOR.PATCH[-EXTRA][+TWEAK], instead of git describe
        #[arg(short, long)]
        tag: Option<String>,

        /// Directories relative to the project; defaults to east.yml's version.paths
        paths: Vec<PathBuf>,
    },
}

impl GlobalArgs {
    /// Toolchain manager executable, `$HOME/.local/share/east/tooling/nrfutil/nrfutil` by default
    pub fn toolchain_manager_path(&self) -> PathBuf {
        match &self.toolchain_manager {
            Some(path) => path.clone(),
            None => std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_default()
                .join(".local/share/east/tooling/nrfutil/nrfutil"),
        }
    }
}

/// East project opened from the command line
pub struct Project {
    pub layout: ProjectLayout,
    pub manifest: Manifest,
}

impl Project {
    /// `None` when the project has no (or an empty) east.yml
    pub async fn open(global: &GlobalArgs) -> CommandResult<Option<Self>> {
        let root = std::path::absolute(&global.project_dir)?;
        let Some(manifest) = Manifest::load_optional(&root).await? else {
            return Ok(None);
        };
        info!("Loaded {} ({})", manifest.path.display(), manifest.checksum);
        Ok(Some(Self {
            layout: ProjectLayout::new(root),
            manifest,
        }))
    }

    /// Release version of the project, `v0.0.0` outside of git
    pub fn version(&self) -> ReleaseVersion {
        match ReleaseVersion::detect(self.layout.root()) {
            Ok(version) => version,
            Err(e) => {
                warn!("Cannot determine release version: {}", e);
                ReleaseVersion::unversioned()
            }
        }
    }
}

/// Routing decision for this invocation
pub fn execution_context(global: &GlobalArgs) -> CommandResult<ExecutionContext> {
    let root = std::path::absolute(&global.project_dir)?;
    let workspace = WestWorkspace::find(&root);
    let manager = NrfutilToolchainManager::new(global.toolchain_manager_path());
    let config = RouterConfig {
        force_direct: global.direct,
    };
    Ok(ExecutionContext::determine(&config, workspace.as_ref(), &manager)?)
}
