//! West workspace inspection and execution routing.
//!
//! Before any build runs, East decides once whether the underlying tools are
//! launched inside the SDK toolchain sandbox or directly on the host:
//!
//! 1. An explicit override always selects direct execution
//! 2. A workspace without a detectable SDK version runs directly
//! 3. An SDK version the toolchain manager does not support runs directly, with a warning
//! 4. A supported but not installed toolchain is an error
//! 5. Otherwise every command is launched through the toolchain manager
//!
//! # Example
//!
//! ```
//! use convenient_west::{CommandLine, ExecutionContext};
//!
//! let context = ExecutionContext::direct();
//! let command = context.wrap(CommandLine::new("west").arg("build"));
//! assert_eq!(command.to_string(), "west build");
//! ```

#![warn(missing_docs)]

pub mod router;
pub mod toolchain;
pub mod workspace;

pub use router::{CommandLine, ExecutionContext, ExecutionMode, RouterConfig, RouterError};
pub use toolchain::{NrfutilToolchainManager, ToolchainManager};
pub use workspace::{WestError, WestWorkspace};
