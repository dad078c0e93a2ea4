//! East - build-type and release matrix engine
//!
//! Orchestrates:
//! 1. Conf-file resolution for apps and samples (`conf`)
//! 2. Hardware revision discovery from the project's boards directory (`revisions`)
//! 3. Matrix expansion into ordered build jobs (`matrix`)
//! 4. Sequential job execution through the execution router (`runner`)
//! 5. Artifact collection and naming into the release layout (`artifacts`)
//! 6. The final summary of a matrix run (`report`)

pub mod artifacts;
pub mod conf;
pub mod layout;
pub mod matrix;
pub mod report;
pub mod revisions;
pub mod runner;

pub use artifacts::{ArtifactCollector, Collection, CollectError, OutputSet};
pub use conf::{ConfError, ConfFragments, ConfResolver};
pub use layout::{ProjectLayout, SubjectKind};
pub use matrix::{check_sources, expand, BuildJob, BuildTypeLabel, MatrixPlan, MissingSources};
pub use report::MatrixReport;
pub use revisions::{HardwareRevision, RevisionDiscoverer};
pub use runner::{CancelSignal, JobResult, JobRunner, JobStatus, RunnerOptions};
