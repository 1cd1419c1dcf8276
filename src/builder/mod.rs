//! The staged problem builder.
//!
//! Problems are produced across many call sites, so the builder forces a
//! fixed field order by construction rather than by convention:
//!
//! ```text
//! message -> (documented_at | undocumented) -> (location | no_location)
//!         -> category -> group -> optional details -> build()
//! ```
//!
//! Each stage is a distinct capability view ([`ProblemBuilder<S>`] with a
//! zero-sized stage marker), so skipping or reordering required steps is
//! a compile error. Every view is a mask over the *same* underlying
//! draft: stage transitions preserve draft identity, observable through
//! [`BuilderView::handle`]. The delegating wrapper in [`delegating`]
//! relies on that invariant.
//!
//! A builder lives and dies on one execution context; it is deliberately
//! not `Send`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::events::EventSink;
use crate::group::{GroupRegistry, ProblemGroup};
use crate::problem::{Documentation, Location, Problem, ReportableProblem, Severity, SharedFailure};

pub mod delegating;

pub use delegating::{Delegating, StageObserver};

/// Zero-sized stage markers for [`ProblemBuilder`].
pub mod stage {
    /// Initial stage: the message must be supplied first.
    #[derive(Debug)]
    pub struct Message;

    /// The documented-or-not decision.
    #[derive(Debug)]
    pub struct Documentation;

    /// The located-or-not decision.
    #[derive(Debug)]
    pub struct Location;

    /// Classification string within the group.
    #[derive(Debug)]
    pub struct Category;

    /// Group selection.
    #[derive(Debug)]
    pub struct Group;

    /// Optional details and finalization.
    #[derive(Debug)]
    pub struct Details;
}

/// Runtime stage tag carried by the draft.
///
/// Unreachable through the typed views, but it keeps `build()`'s
/// completeness guard honest and protects the delegation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Message,
    Documentation,
    Location,
    Category,
    Group,
    Details,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Message => "message",
            Stage::Documentation => "documentation",
            Stage::Location => "location",
            Stage::Category => "category",
            Stage::Group => "group",
            Stage::Details => "details",
        };
        write!(f, "{name}")
    }
}

/// A stage call was invalid at the point it was made.
///
/// These are programming errors in the calling code, raised immediately
/// at the offending call and never deferred to `build()`.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum ProblemDefinitionError {
    /// A required field was supplied blank.
    #[error("problem {field} must not be blank")]
    #[diagnostic(code(foghorn::builder::empty_field))]
    EmptyField {
        /// Name of the offending field
        field: &'static str,
    },

    /// `group_id` named a group the registry does not know.
    #[error("no problem group registered with id `{id}`")]
    #[diagnostic(
        code(foghorn::builder::unknown_group),
        help("Register the group first via `ProblemReporter::register_group`")
    )]
    UnknownGroup {
        /// The unresolved group id
        id: String,
    },

    /// A recording call arrived at the wrong stage.
    #[error("problem builder is at stage `{found}`, expected `{expected}`")]
    #[diagnostic(code(foghorn::builder::stage_mismatch))]
    StageMismatch { expected: Stage, found: Stage },

    /// `build()` was invoked before all required stages were satisfied.
    #[error("cannot build problem: `{missing}` was never supplied")]
    #[diagnostic(code(foghorn::builder::incomplete))]
    Incomplete {
        /// The first required field still missing
        missing: &'static str,
    },
}

/// Opaque identity of a builder's underlying draft.
///
/// Two handles compare equal exactly when the views share one draft.
/// Drafts with identical field values still have distinct handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftHandle(pub(crate) usize);

/// Anything that exposes the identity of its underlying draft.
pub trait BuilderView {
    /// Opaque handle to the underlying draft.
    fn handle(&self) -> DraftHandle;
}

/// Stage 1: supply the required message.
pub trait DefineMessage: BuilderView + Sized {
    type Documented: DefineDocumentation;

    /// Record the short human-readable message. Must not be blank.
    fn message(self, text: impl Into<String>) -> Result<Self::Documented, ProblemDefinitionError>;
}

/// Stage 2: decide whether the problem is documented.
pub trait DefineDocumentation: BuilderView + Sized {
    type Located: DefineLocation;

    /// Link to documentation describing the problem.
    fn documented_at(self, link: impl Into<String>) -> Self::Located;

    /// Explicitly mark the problem as undocumented.
    fn undocumented(self) -> Self::Located;
}

/// Stage 3: decide whether the problem has a source location.
pub trait DefineLocation: BuilderView + Sized {
    type Categorized: DefineCategory;

    /// Record a path and line.
    fn location(self, path: impl Into<String>, line: u32) -> Self::Categorized;

    /// Record a path, line and column.
    fn location_at(self, path: impl Into<String>, line: u32, column: u32) -> Self::Categorized;

    /// Explicitly mark the problem as having no location.
    fn no_location(self) -> Self::Categorized;
}

/// Stage 4: supply the required classification string.
pub trait DefineCategory: BuilderView + Sized {
    type Grouped: DefineGroup;

    /// Record the problem category (e.g. `"validation"`). Must not be
    /// blank.
    fn category(self, category: impl Into<String>)
        -> Result<Self::Grouped, ProblemDefinitionError>;
}

/// Stage 5: choose the problem group.
pub trait DefineGroup: BuilderView + Sized {
    type Detailed: DefineDetails;

    /// Classify under an already-resolved group.
    fn group(self, group: ProblemGroup) -> Self::Detailed;

    /// Classify under the registered group named `id`.
    fn group_id(self, id: &str) -> Result<Self::Detailed, ProblemDefinitionError>;
}

/// Final stage: optional details, severity override, and finalization.
pub trait DefineDetails: BuilderView + Sized {
    /// Longer description of the problem.
    fn description(self, text: impl Into<String>) -> Self;

    /// Append a suggested fix. Order of calls is preserved.
    fn solution(self, solution: impl Into<String>) -> Self;

    /// Attach a key/value pair. Last write wins per key.
    fn additional_data(self, key: impl Into<String>, value: impl Into<String>) -> Self;

    /// Attach the underlying failure.
    fn cause(self, failure: impl Into<SharedFailure>) -> Self;

    /// Override the severity. Passing `None` keeps the current value, so
    /// callers can thread an optional override straight through.
    fn severity(self, severity: impl Into<Option<Severity>>) -> Self;

    /// Finalize into an immutable problem.
    fn build(self) -> Result<ReportableProblem, ProblemDefinitionError>;
}

/// The working draft shared by all stage views of one builder.
pub(crate) struct Draft {
    stage: Stage,
    message: Option<String>,
    severity: Severity,
    documentation: Option<Documentation>,
    location: Option<Location>,
    category: Option<String>,
    group: Option<ProblemGroup>,
    description: Option<String>,
    solutions: Vec<String>,
    additional_data: HashMap<String, String>,
    cause: Option<SharedFailure>,
    registry: Arc<GroupRegistry>,
    sink: Arc<dyn EventSink>,
}

impl Draft {
    fn new(registry: Arc<GroupRegistry>, sink: Arc<dyn EventSink>) -> Self {
        Draft {
            stage: Stage::Message,
            message: None,
            // Problems fail their unit of work unless overridden.
            severity: Severity::Error,
            documentation: None,
            location: None,
            category: None,
            group: None,
            description: None,
            solutions: Vec::new(),
            additional_data: HashMap::new(),
            cause: None,
            registry,
            sink,
        }
    }

    fn expect_stage(&self, expected: Stage) -> Result<(), ProblemDefinitionError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(ProblemDefinitionError::StageMismatch {
                expected,
                found: self.stage,
            })
        }
    }

    fn record_message(&mut self, text: String) -> Result<(), ProblemDefinitionError> {
        self.expect_stage(Stage::Message)?;
        if text.trim().is_empty() {
            return Err(ProblemDefinitionError::EmptyField { field: "message" });
        }
        self.message = Some(text);
        self.stage = Stage::Documentation;
        Ok(())
    }

    fn record_documentation(&mut self, documentation: Documentation) {
        debug_assert_eq!(self.stage, Stage::Documentation);
        self.documentation = Some(documentation);
        self.stage = Stage::Location;
    }

    fn record_location(&mut self, location: Option<Location>) {
        debug_assert_eq!(self.stage, Stage::Location);
        self.location = location;
        self.stage = Stage::Category;
    }

    fn record_category(&mut self, category: String) -> Result<(), ProblemDefinitionError> {
        self.expect_stage(Stage::Category)?;
        if category.trim().is_empty() {
            return Err(ProblemDefinitionError::EmptyField { field: "category" });
        }
        self.category = Some(category);
        self.stage = Stage::Group;
        Ok(())
    }

    fn record_group(&mut self, group: ProblemGroup) {
        debug_assert_eq!(self.stage, Stage::Group);
        self.group = Some(group);
        self.stage = Stage::Details;
    }

    fn resolve_group(&self, id: &str) -> Result<ProblemGroup, ProblemDefinitionError> {
        self.registry
            .lookup(id)
            .ok_or_else(|| ProblemDefinitionError::UnknownGroup { id: id.to_owned() })
    }

    fn finish(&self) -> Result<Problem, ProblemDefinitionError> {
        // Unreachable through the typed views; kept as an explicit guard
        // because the draft is shared state behind the capability masks.
        let missing = |field| ProblemDefinitionError::Incomplete { missing: field };
        self.expect_stage(Stage::Details).map_err(|_| {
            missing(match self.stage {
                Stage::Message => "message",
                Stage::Documentation => "documentation",
                Stage::Location => "location",
                Stage::Category => "category",
                _ => "group",
            })
        })?;

        let message = self.message.clone().ok_or_else(|| missing("message"))?;
        let documentation = self
            .documentation
            .clone()
            .ok_or_else(|| missing("documentation"))?;
        let category = self.category.clone().ok_or_else(|| missing("category"))?;
        let group = self.group.clone().ok_or_else(|| missing("group"))?;

        Ok(Problem {
            id: format!("{}:{}", group.id(), category),
            message,
            severity: self.severity,
            location: self.location.clone(),
            documentation,
            category,
            group,
            description: self.description.clone(),
            solutions: self.solutions.clone(),
            additional_data: self.additional_data.clone(),
            cause: self.cause.clone(),
        })
    }
}

/// A capability view over the shared draft, at stage `S`.
///
/// Obtained from [`crate::report::ProblemReporter::create_builder`];
/// consumed stage by stage until [`DefineDetails::build`].
pub struct ProblemBuilder<S> {
    draft: Rc<RefCell<Draft>>,
    _stage: PhantomData<S>,
}

impl<S> fmt::Debug for ProblemBuilder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProblemBuilder").finish_non_exhaustive()
    }
}

impl ProblemBuilder<stage::Message> {
    pub(crate) fn new(registry: Arc<GroupRegistry>, sink: Arc<dyn EventSink>) -> Self {
        ProblemBuilder {
            draft: Rc::new(RefCell::new(Draft::new(registry, sink))),
            _stage: PhantomData,
        }
    }
}

impl<S> ProblemBuilder<S> {
    /// Re-mask the same draft at the next stage.
    fn advance<T>(self) -> ProblemBuilder<T> {
        ProblemBuilder {
            draft: self.draft,
            _stage: PhantomData,
        }
    }
}

impl<S> BuilderView for ProblemBuilder<S> {
    fn handle(&self) -> DraftHandle {
        DraftHandle(Rc::as_ptr(&self.draft) as usize)
    }
}

impl DefineMessage for ProblemBuilder<stage::Message> {
    type Documented = ProblemBuilder<stage::Documentation>;

    fn message(self, text: impl Into<String>) -> Result<Self::Documented, ProblemDefinitionError> {
        self.draft.borrow_mut().record_message(text.into())?;
        Ok(self.advance())
    }
}

impl DefineDocumentation for ProblemBuilder<stage::Documentation> {
    type Located = ProblemBuilder<stage::Location>;

    fn documented_at(self, link: impl Into<String>) -> Self::Located {
        self.draft
            .borrow_mut()
            .record_documentation(Documentation::Link(link.into()));
        self.advance()
    }

    fn undocumented(self) -> Self::Located {
        self.draft
            .borrow_mut()
            .record_documentation(Documentation::Undocumented);
        self.advance()
    }
}

impl DefineLocation for ProblemBuilder<stage::Location> {
    type Categorized = ProblemBuilder<stage::Category>;

    fn location(self, path: impl Into<String>, line: u32) -> Self::Categorized {
        self.draft.borrow_mut().record_location(Some(Location {
            path: path.into(),
            line,
            column: None,
        }));
        self.advance()
    }

    fn location_at(self, path: impl Into<String>, line: u32, column: u32) -> Self::Categorized {
        self.draft.borrow_mut().record_location(Some(Location {
            path: path.into(),
            line,
            column: Some(column),
        }));
        self.advance()
    }

    fn no_location(self) -> Self::Categorized {
        self.draft.borrow_mut().record_location(None);
        self.advance()
    }
}

impl DefineCategory for ProblemBuilder<stage::Category> {
    type Grouped = ProblemBuilder<stage::Group>;

    fn category(
        self,
        category: impl Into<String>,
    ) -> Result<Self::Grouped, ProblemDefinitionError> {
        self.draft.borrow_mut().record_category(category.into())?;
        Ok(self.advance())
    }
}

impl DefineGroup for ProblemBuilder<stage::Group> {
    type Detailed = ProblemBuilder<stage::Details>;

    fn group(self, group: ProblemGroup) -> Self::Detailed {
        self.draft.borrow_mut().record_group(group);
        self.advance()
    }

    fn group_id(self, id: &str) -> Result<Self::Detailed, ProblemDefinitionError> {
        let group = self.draft.borrow().resolve_group(id)?;
        self.draft.borrow_mut().record_group(group);
        Ok(self.advance())
    }
}

impl DefineDetails for ProblemBuilder<stage::Details> {
    fn description(self, text: impl Into<String>) -> Self {
        self.draft.borrow_mut().description = Some(text.into());
        self
    }

    fn solution(self, solution: impl Into<String>) -> Self {
        self.draft.borrow_mut().solutions.push(solution.into());
        self
    }

    fn additional_data(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.draft
            .borrow_mut()
            .additional_data
            .insert(key.into(), value.into());
        self
    }

    fn cause(self, failure: impl Into<SharedFailure>) -> Self {
        self.draft.borrow_mut().cause = Some(failure.into());
        self
    }

    fn severity(self, severity: impl Into<Option<Severity>>) -> Self {
        if let Some(severity) = severity.into() {
            self.draft.borrow_mut().severity = severity;
        }
        self
    }

    fn build(self) -> Result<ReportableProblem, ProblemDefinitionError> {
        let draft = self.draft.borrow();
        let problem = draft.finish()?;
        Ok(ReportableProblem::new(Arc::new(problem), draft.sink.clone()))
    }
}
