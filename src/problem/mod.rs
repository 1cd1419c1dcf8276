//! The immutable problem value model.
//!
//! A [`Problem`] is a structured diagnostic record. It is produced only
//! by the staged builder's finalize step and never mutated afterwards;
//! the builder's draft is the sole mutable entity in this subsystem.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::events::{EventSink, ProblemEvent};
use crate::group::ProblemGroup;

/// An underlying failure shared between a problem and the error raised
/// for it. Pointer identity is meaningful: the rethrow path guarantees
/// the problem's cause and the raised error share one allocation.
pub type SharedFailure = Arc<anyhow::Error>;

/// Severity of a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; no action required
    Advice,
    /// Should be addressed but does not fail the build
    Warning,
    /// Fails the unit of work that reported it
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Advice => write!(f, "advice"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// Source location a problem points at.
///
/// Either a problem has no location at all, or it has a path and line
/// with an optional column. "Path and no line" is not representable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File the problem was found in
    pub path: String,
    /// 1-based line number
    pub line: u32,
    /// 1-based column, when known
    pub column: Option<u32>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.column {
            Some(column) => write!(f, "{}:{}:{}", self.path, self.line, column),
            None => write!(f, "{}:{}", self.path, self.line),
        }
    }
}

/// The documented-or-not decision, made explicitly for every problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Documentation {
    /// Link to documentation describing the problem
    Link(String),
    /// Explicitly marked as having no documentation
    Undocumented,
}

impl Documentation {
    /// The documentation link, if one exists.
    pub fn link(&self) -> Option<&str> {
        match self {
            Documentation::Link(url) => Some(url),
            Documentation::Undocumented => None,
        }
    }
}

/// An immutable structured diagnostic record.
///
/// Field-by-field construction is deliberately impossible: problems are
/// produced by walking the staged builder (see [`crate::builder`]), which
/// enforces that every required field was supplied in order.
#[derive(Debug)]
pub struct Problem {
    pub(crate) id: String,
    pub(crate) message: String,
    pub(crate) severity: Severity,
    pub(crate) location: Option<Location>,
    pub(crate) documentation: Documentation,
    pub(crate) category: String,
    pub(crate) group: ProblemGroup,
    pub(crate) description: Option<String>,
    pub(crate) solutions: Vec<String>,
    pub(crate) additional_data: HashMap<String, String>,
    pub(crate) cause: Option<SharedFailure>,
}

impl Problem {
    /// Stable identifier for this kind of problem
    /// (`"<group-id>:<category>"`). Reports of the same kind of issue
    /// share an id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Short human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Severity, after any override applied at the final builder stage.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Source location, if the problem has one.
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    /// The documentation decision made for this problem.
    pub fn documentation(&self) -> &Documentation {
        &self.documentation
    }

    /// Classification string within the group (e.g. `"validation"`).
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Group the problem is classified under.
    pub fn group(&self) -> &ProblemGroup {
        &self.group
    }

    /// Longer description, if supplied.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Suggested fixes, in the order they were supplied.
    pub fn solutions(&self) -> &[String] {
        &self.solutions
    }

    /// Free-form key/value payload.
    pub fn additional_data(&self) -> &HashMap<String, String> {
        &self.additional_data
    }

    /// Underlying failure, if one was attached.
    pub fn cause(&self) -> Option<&SharedFailure> {
        self.cause.as_ref()
    }

    /// The wire-shaped event delivered for this problem.
    pub fn to_event(&self) -> ProblemEvent {
        ProblemEvent {
            problem_id: self.id.clone(),
            message: self.message.clone(),
            severity: self.severity.to_string(),
            group: self.group.id().to_owned(),
            path: self.location.as_ref().map(|loc| loc.path.clone()),
            line: self.location.as_ref().map(|loc| loc.line),
            column: self.location.as_ref().and_then(|loc| loc.column),
            doc_link: self.documentation.link().map(str::to_owned),
            description: self.description.clone(),
            solutions: self.solutions.clone(),
            additional_data: self.additional_data.clone(),
            cause: self.cause.as_ref().map(|failure| failure.to_string()),
            operation_id: None,
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(location) = &self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

/// A finalized problem bundled with the capability to deliver itself.
///
/// Some call sites receive an already-built problem and must still be
/// able to trigger delivery without holding the reporting service; the
/// sink reference bound here outlives any individual problem.
#[derive(Clone)]
pub struct ReportableProblem {
    problem: Arc<Problem>,
    sink: Arc<dyn EventSink>,
}

impl ReportableProblem {
    pub(crate) fn new(problem: Arc<Problem>, sink: Arc<dyn EventSink>) -> Self {
        ReportableProblem { problem, sink }
    }

    /// Deliver this problem through the bound sink.
    ///
    /// Never fails: a sink failure is logged and swallowed, since
    /// diagnostic delivery must not mask the primary failure path.
    pub fn report(&self) {
        if let Err(error) = self.sink.emit_if_active(self.problem.to_event()) {
            tracing::warn!(
                problem_id = %self.problem.id(),
                %error,
                "failed to deliver problem event"
            );
        }
    }

    /// Shared handle to the underlying problem.
    pub fn problem(&self) -> &Arc<Problem> {
        &self.problem
    }

    /// Unwrap into the underlying problem handle.
    pub fn into_problem(self) -> Arc<Problem> {
        self.problem
    }
}

impl Deref for ReportableProblem {
    type Target = Problem;

    fn deref(&self) -> &Problem {
        &self.problem
    }
}

impl fmt::Debug for ReportableProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportableProblem")
            .field("problem", &self.problem)
            .finish_non_exhaustive()
    }
}
