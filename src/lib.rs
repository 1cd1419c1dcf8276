//! Foghorn - structured problem reporting for build tools
//!
//! This crate provides the problem-reporting subsystem of a build engine:
//! immutable diagnostic records ("problems") constructed through a staged
//! builder, classified into named groups, and delivered to an
//! event-observation pipeline without coupling problem producers to
//! problem consumers.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use foghorn::builder::{
//!     DefineCategory, DefineDetails, DefineDocumentation, DefineGroup, DefineLocation,
//!     DefineMessage,
//! };
//! use foghorn::events::NoopSink;
//! use foghorn::{ProblemReporter, Severity};
//!
//! let reporter = ProblemReporter::new(Arc::new(NoopSink));
//! let problem = reporter
//!     .create_builder()
//!     .message("output directory does not exist")?
//!     .undocumented()
//!     .location("build.conf", 12)
//!     .category("validation")?
//!     .group_id(foghorn::group::GENERIC_ID)?
//!     .solution("create the directory before running the task")
//!     .severity(Severity::Warning)
//!     .build()?;
//!
//! assert_eq!(problem.id(), "generic:validation");
//! problem.report();
//! # Ok::<(), foghorn::builder::ProblemDefinitionError>(())
//! ```

pub mod builder;
pub mod events;
pub mod group;
pub mod problem;
pub mod report;

pub use builder::{Delegating, ProblemBuilder, ProblemDefinitionError, StageObserver};
pub use events::{EventSink, NoopSink, Operation, ProblemEvent};
pub use group::{DuplicateGroupError, GroupRegistry, ProblemGroup};
pub use problem::{Documentation, Location, Problem, ReportableProblem, Severity, SharedFailure};
pub use report::{ProblemError, ProblemReporter};
