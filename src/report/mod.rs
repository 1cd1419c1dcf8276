//! The problem reporting service.
//!
//! [`ProblemReporter`] is the single entry point bridging the builder
//! protocol with delivery: it hands out fresh builders, collects
//! already-built problems, and implements the "report and fail"
//! semantics where a structured problem is delivered strictly before the
//! corresponding error propagates.
//!
//! One reporter instance is created per session and threaded through the
//! execution context explicitly; there is no ambient global.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::builder::{
    stage, DefineCategory, DefineDetails, DefineDocumentation, DefineGroup, DefineLocation,
    DefineMessage, ProblemBuilder, ProblemDefinitionError,
};
use crate::events::{EventSink, NoopSink};
use crate::group::{self, DuplicateGroupError, GroupRegistry, ProblemGroup};
use crate::problem::{Problem, SharedFailure};

/// Category used for failures collected without any classification.
const UNCLASSIFIED_CATEGORY: &str = "unclassified";

/// The error returned by the throwing paths.
///
/// Always an error by design: `throwing`/`rethrowing` exist to convert a
/// failure into a structured problem and still fail. Delivery of the
/// problem happens strictly before this value is returned, so listeners
/// observe the problem before unwinding begins.
#[derive(Debug)]
pub enum ProblemError {
    /// A problem was built and delivered; this is the error to raise.
    ///
    /// On the rethrow path `cause` is the original failure, shared
    /// pointer-identically with `problem.cause()`, and `Display` renders
    /// it verbatim. On the throw path there is no separate cause and
    /// `Display` renders the problem message.
    Reported {
        problem: Arc<Problem>,
        cause: Option<SharedFailure>,
    },

    /// The problem spec itself was invalid; no problem was delivered.
    ///
    /// This is a programming error in the calling code, surfaced to the
    /// immediate caller instead of being reported as a problem.
    Definition(ProblemDefinitionError),
}

impl ProblemError {
    /// The delivered problem, if one was built.
    pub fn problem(&self) -> Option<&Arc<Problem>> {
        match self {
            ProblemError::Reported { problem, .. } => Some(problem),
            ProblemError::Definition(_) => None,
        }
    }

    /// The original failure on the rethrow path.
    pub fn cause(&self) -> Option<&SharedFailure> {
        match self {
            ProblemError::Reported { cause, .. } => cause.as_ref(),
            ProblemError::Definition(_) => None,
        }
    }
}

impl fmt::Display for ProblemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemError::Reported {
                cause: Some(cause), ..
            } => write!(f, "{cause}"),
            ProblemError::Reported { problem, .. } => f.write_str(problem.message()),
            ProblemError::Definition(error) => write!(f, "{error}"),
        }
    }
}

/// View a shared failure as a plain error trait object.
fn as_dyn_error(failure: &SharedFailure) -> &(dyn StdError + 'static) {
    AsRef::<dyn StdError + 'static>::as_ref(&**failure)
}

impl StdError for ProblemError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ProblemError::Reported {
                cause: Some(cause), ..
            } => Some(as_dyn_error(cause)),
            ProblemError::Reported { problem, .. } => problem.cause().map(as_dyn_error),
            ProblemError::Definition(error) => error.source(),
        }
    }
}

impl From<ProblemDefinitionError> for ProblemError {
    fn from(error: ProblemDefinitionError) -> Self {
        ProblemError::Definition(error)
    }
}

/// Process-wide problem reporting service.
///
/// Holds the group registry and the event sink; both are shared state
/// with session lifetime. Builders created here are bound to this
/// reporter's registry and sink.
pub struct ProblemReporter {
    registry: Arc<GroupRegistry>,
    sink: Arc<dyn EventSink>,
}

impl ProblemReporter {
    /// Create a reporter delivering through `sink`.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        ProblemReporter {
            registry: Arc::new(GroupRegistry::new()),
            sink,
        }
    }

    /// A fresh builder at its initial stage. No side effects.
    pub fn create_builder(&self) -> ProblemBuilder<stage::Message> {
        ProblemBuilder::new(Arc::clone(&self.registry), Arc::clone(&self.sink))
    }

    /// Deliver an already-built problem. Never fails.
    ///
    /// A sink failure is logged and swallowed: diagnostic delivery must
    /// not mask or replace the primary failure path.
    pub fn collect(&self, problem: &Problem) {
        self.deliver(problem);
    }

    /// Deliver a batch of already-built problems. Never fails.
    pub fn collect_all<'a>(&self, problems: impl IntoIterator<Item = &'a Problem>) {
        for problem in problems {
            self.deliver(problem);
        }
    }

    /// Deliver an already-raised failure as a generic, error-severity
    /// problem. Never fails.
    ///
    /// Convenience for call sites that only have a failure in hand and
    /// want it to also appear as a structured diagnostic.
    pub fn collect_failure(&self, failure: &anyhow::Error) {
        let mut message = failure.to_string();
        if message.trim().is_empty() {
            message = "unclassified failure".to_owned();
        }

        let built = self
            .create_builder()
            .message(message)
            .map(|builder| builder.undocumented().no_location())
            .and_then(|builder| builder.category(UNCLASSIFIED_CATEGORY))
            .and_then(|builder| builder.group_id(group::GENERIC_ID))
            .and_then(DefineDetails::build);

        match built {
            Ok(problem) => self.deliver(&problem),
            // Unreachable: every field above is statically non-blank.
            Err(error) => tracing::warn!(%error, "failed to wrap failure as problem"),
        }
    }

    /// Build a problem with `spec`, deliver it, and return the error to
    /// raise for it.
    ///
    /// The returned error is derived from the problem. Delivery happens
    /// before this function returns, even though the caller has not
    /// started unwinding yet.
    pub fn throwing<F, B>(&self, spec: F) -> ProblemError
    where
        F: FnOnce(ProblemBuilder<stage::Message>) -> Result<B, ProblemDefinitionError>,
        B: DefineDetails,
    {
        match spec(self.create_builder()).and_then(DefineDetails::build) {
            Ok(problem) => {
                self.deliver(&problem);
                ProblemError::Reported {
                    problem: problem.into_problem(),
                    cause: None,
                }
            }
            Err(error) => ProblemError::Definition(error),
        }
    }

    /// Like [`throwing`](Self::throwing), but attach `failure` as the
    /// built problem's cause and return an error that renders and
    /// sources `failure` verbatim.
    ///
    /// The returned error's cause and the problem's cause are the same
    /// allocation, preserving the original failure's identity.
    pub fn rethrowing<F, B>(&self, failure: anyhow::Error, spec: F) -> ProblemError
    where
        F: FnOnce(ProblemBuilder<stage::Message>) -> Result<B, ProblemDefinitionError>,
        B: DefineDetails,
    {
        let shared: SharedFailure = Arc::new(failure);
        let built = spec(self.create_builder())
            .map(|builder| builder.cause(Arc::clone(&shared)))
            .and_then(DefineDetails::build);

        match built {
            Ok(problem) => {
                self.deliver(&problem);
                ProblemError::Reported {
                    problem: problem.into_problem(),
                    cause: Some(shared),
                }
            }
            Err(error) => {
                tracing::warn!(
                    failure = %shared,
                    "dropping original failure: problem spec was invalid"
                );
                ProblemError::Definition(error)
            }
        }
    }

    /// Register a new problem group under `id`.
    pub fn register_group(
        &self,
        id: impl AsRef<str>,
    ) -> Result<ProblemGroup, DuplicateGroupError> {
        self.registry.register(id)
    }

    /// Register an already-constructed group, revalidating uniqueness.
    pub fn register_group_value(
        &self,
        group: ProblemGroup,
    ) -> Result<ProblemGroup, DuplicateGroupError> {
        self.registry.register_group(group)
    }

    /// Look up a registered group by id.
    pub fn lookup_group(&self, id: &str) -> Option<ProblemGroup> {
        self.registry.lookup(id)
    }

    /// The registry backing this reporter.
    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    fn deliver(&self, problem: &Problem) {
        if let Err(error) = self.sink.emit_if_active(problem.to_event()) {
            tracing::warn!(
                problem_id = %problem.id(),
                %error,
                "failed to deliver problem event"
            );
        }
    }
}

impl Default for ProblemReporter {
    fn default() -> Self {
        Self::new(Arc::new(NoopSink))
    }
}
