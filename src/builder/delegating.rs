//! Identity-checked builder delegation.
//!
//! Infrastructure code sometimes needs to relay a builder chain through a
//! wrapper, e.g. to record telemetry per stage or to inject defaults,
//! without re-implementing every stage. [`Delegating`] forwards each
//! stage call to the wrapped builder, re-binds itself to the call's
//! result, and asserts that the result is backed by the same draft the
//! call went into.
//!
//! A violated identity assertion means the wrapped builder
//! implementation is broken in a way that would silently corrupt later
//! stages (the wrapper would keep relaying to a stale draft), so it
//! aborts with a panic rather than returning a suppressible error.

use std::fmt;

use crate::builder::{
    BuilderView, DefineCategory, DefineDetails, DefineDocumentation, DefineGroup, DefineLocation,
    DefineMessage, DraftHandle, ProblemDefinitionError,
};
use crate::group::ProblemGroup;
use crate::problem::{ReportableProblem, Severity, SharedFailure};

/// The builder operation being forwarded, as seen by a [`StageObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOp {
    Message,
    DocumentedAt,
    Undocumented,
    Location,
    LocationAt,
    NoLocation,
    Category,
    Group,
    GroupId,
    Description,
    Solution,
    AdditionalData,
    Cause,
    Severity,
    Build,
}

impl fmt::Display for StageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageOp::Message => "message",
            StageOp::DocumentedAt => "documented_at",
            StageOp::Undocumented => "undocumented",
            StageOp::Location => "location",
            StageOp::LocationAt => "location_at",
            StageOp::NoLocation => "no_location",
            StageOp::Category => "category",
            StageOp::Group => "group",
            StageOp::GroupId => "group_id",
            StageOp::Description => "description",
            StageOp::Solution => "solution",
            StageOp::AdditionalData => "additional_data",
            StageOp::Cause => "cause",
            StageOp::Severity => "severity",
            StageOp::Build => "build",
        };
        write!(f, "{name}")
    }
}

/// Per-stage side-effect hook for [`Delegating`].
///
/// Observers see every successfully forwarded operation; they never
/// alter the value flow.
pub trait StageObserver {
    /// Called after `op` was forwarded and the identity check passed.
    fn on_stage(&mut self, op: StageOp) {
        let _ = op;
    }
}

impl StageObserver for () {}

/// An identity-checking wrapper around a builder stage view.
///
/// Implements every stage capability by forwarding to the wrapped view
/// and re-binding to the forwarded call's result after asserting it is
/// backed by the same draft.
pub struct Delegating<S, O = ()> {
    inner: S,
    observer: O,
}

impl<S, O> fmt::Debug for Delegating<S, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegating").finish_non_exhaustive()
    }
}

impl<S: BuilderView> Delegating<S> {
    /// Wrap a builder view without an observer.
    pub fn new(inner: S) -> Self {
        Delegating {
            inner,
            observer: (),
        }
    }
}

impl<S: BuilderView, O: StageObserver> Delegating<S, O> {
    /// Wrap a builder view with a per-stage observer.
    pub fn with_observer(inner: S, observer: O) -> Self {
        Delegating { inner, observer }
    }

    /// The observer attached to this wrapper.
    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Unwrap into the inner view and observer.
    pub fn into_parts(self) -> (S, O) {
        (self.inner, self.observer)
    }

    fn rebind<T: BuilderView>(before: DraftHandle, inner: T, mut observer: O, op: StageOp) -> Delegating<T, O> {
        if inner.handle() != before {
            panic!("delegated problem builder did not preserve draft identity at `{op}`");
        }
        observer.on_stage(op);
        Delegating { inner, observer }
    }
}

impl<S: BuilderView, O> BuilderView for Delegating<S, O> {
    fn handle(&self) -> DraftHandle {
        self.inner.handle()
    }
}

impl<S: DefineMessage, O: StageObserver> DefineMessage for Delegating<S, O> {
    type Documented = Delegating<S::Documented, O>;

    fn message(self, text: impl Into<String>) -> Result<Self::Documented, ProblemDefinitionError> {
        let before = self.inner.handle();
        let next = self.inner.message(text)?;
        Ok(Self::rebind(before, next, self.observer, StageOp::Message))
    }
}

impl<S: DefineDocumentation, O: StageObserver> DefineDocumentation for Delegating<S, O> {
    type Located = Delegating<S::Located, O>;

    fn documented_at(self, link: impl Into<String>) -> Self::Located {
        let before = self.inner.handle();
        let next = self.inner.documented_at(link);
        Self::rebind(before, next, self.observer, StageOp::DocumentedAt)
    }

    fn undocumented(self) -> Self::Located {
        let before = self.inner.handle();
        let next = self.inner.undocumented();
        Self::rebind(before, next, self.observer, StageOp::Undocumented)
    }
}

impl<S: DefineLocation, O: StageObserver> DefineLocation for Delegating<S, O> {
    type Categorized = Delegating<S::Categorized, O>;

    fn location(self, path: impl Into<String>, line: u32) -> Self::Categorized {
        let before = self.inner.handle();
        let next = self.inner.location(path, line);
        Self::rebind(before, next, self.observer, StageOp::Location)
    }

    fn location_at(self, path: impl Into<String>, line: u32, column: u32) -> Self::Categorized {
        let before = self.inner.handle();
        let next = self.inner.location_at(path, line, column);
        Self::rebind(before, next, self.observer, StageOp::LocationAt)
    }

    fn no_location(self) -> Self::Categorized {
        let before = self.inner.handle();
        let next = self.inner.no_location();
        Self::rebind(before, next, self.observer, StageOp::NoLocation)
    }
}

impl<S: DefineCategory, O: StageObserver> DefineCategory for Delegating<S, O> {
    type Grouped = Delegating<S::Grouped, O>;

    fn category(
        self,
        category: impl Into<String>,
    ) -> Result<Self::Grouped, ProblemDefinitionError> {
        let before = self.inner.handle();
        let next = self.inner.category(category)?;
        Ok(Self::rebind(before, next, self.observer, StageOp::Category))
    }
}

impl<S: DefineGroup, O: StageObserver> DefineGroup for Delegating<S, O> {
    type Detailed = Delegating<S::Detailed, O>;

    fn group(self, group: ProblemGroup) -> Self::Detailed {
        let before = self.inner.handle();
        let next = self.inner.group(group);
        Self::rebind(before, next, self.observer, StageOp::Group)
    }

    fn group_id(self, id: &str) -> Result<Self::Detailed, ProblemDefinitionError> {
        let before = self.inner.handle();
        let next = self.inner.group_id(id)?;
        Ok(Self::rebind(before, next, self.observer, StageOp::GroupId))
    }
}

impl<S: DefineDetails, O: StageObserver> DefineDetails for Delegating<S, O> {
    fn description(self, text: impl Into<String>) -> Self {
        let before = self.inner.handle();
        let next = self.inner.description(text);
        Self::rebind(before, next, self.observer, StageOp::Description)
    }

    fn solution(self, solution: impl Into<String>) -> Self {
        let before = self.inner.handle();
        let next = self.inner.solution(solution);
        Self::rebind(before, next, self.observer, StageOp::Solution)
    }

    fn additional_data(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let before = self.inner.handle();
        let next = self.inner.additional_data(key, value);
        Self::rebind(before, next, self.observer, StageOp::AdditionalData)
    }

    fn cause(self, failure: impl Into<SharedFailure>) -> Self {
        let before = self.inner.handle();
        let next = self.inner.cause(failure);
        Self::rebind(before, next, self.observer, StageOp::Cause)
    }

    fn severity(self, severity: impl Into<Option<Severity>>) -> Self {
        let before = self.inner.handle();
        let next = self.inner.severity(severity);
        Self::rebind(before, next, self.observer, StageOp::Severity)
    }

    fn build(mut self) -> Result<ReportableProblem, ProblemDefinitionError> {
        self.observer.on_stage(StageOp::Build);
        self.inner.build()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::builder::{stage, ProblemBuilder};
    use crate::events::NoopSink;
    use crate::group::{self, GroupRegistry};
    use crate::problem::Severity;

    fn builder() -> ProblemBuilder<stage::Message> {
        ProblemBuilder::new(Arc::new(GroupRegistry::new()), Arc::new(NoopSink))
    }

    #[derive(Default)]
    struct Recorder {
        ops: Vec<StageOp>,
    }

    impl StageObserver for Recorder {
        fn on_stage(&mut self, op: StageOp) {
            self.ops.push(op);
        }
    }

    #[test]
    fn conforming_builder_never_trips_identity_check() {
        let problem = Delegating::new(builder())
            .message("delegated")
            .unwrap()
            .undocumented()
            .location("src/lib.c", 7)
            .category("validation")
            .unwrap()
            .group_id(group::GENERIC_ID)
            .unwrap()
            .solution("stop doing that")
            .severity(Severity::Warning)
            .build()
            .unwrap();

        assert_eq!(problem.message(), "delegated");
        assert_eq!(problem.severity(), Severity::Warning);
        assert_eq!(problem.location().unwrap().path, "src/lib.c");
    }

    #[test]
    fn wrapper_exposes_inner_handle() {
        let inner = builder();
        let handle = inner.handle();
        let wrapped = Delegating::new(inner);
        assert_eq!(wrapped.handle(), handle);
    }

    #[test]
    fn observer_sees_each_forwarded_stage() {
        let detailed = Delegating::with_observer(builder(), Recorder::default())
            .message("observed")
            .unwrap()
            .undocumented()
            .no_location()
            .category("validation")
            .unwrap()
            .group_id(group::DEPRECATION_ID)
            .unwrap()
            .description("watched closely");

        assert_eq!(
            detailed.observer().ops,
            [
                StageOp::Message,
                StageOp::Undocumented,
                StageOp::NoLocation,
                StageOp::Category,
                StageOp::GroupId,
                StageOp::Description,
            ]
        );

        detailed.build().unwrap();
    }

    #[test]
    fn definition_errors_pass_through_unchanged() {
        let err = Delegating::new(builder()).message("  ").unwrap_err();
        assert!(matches!(
            err,
            ProblemDefinitionError::EmptyField { field: "message" }
        ));
    }

    /// A broken builder that returns a fresh draft on every stage call.
    struct Rogue(DraftHandle);

    impl Rogue {
        fn fresh() -> Self {
            static NEXT: AtomicUsize = AtomicUsize::new(1);
            Rogue(DraftHandle(NEXT.fetch_add(1, Ordering::Relaxed)))
        }
    }

    impl BuilderView for Rogue {
        fn handle(&self) -> DraftHandle {
            self.0
        }
    }

    impl DefineMessage for Rogue {
        type Documented = Rogue;

        fn message(
            self,
            _text: impl Into<String>,
        ) -> Result<Self::Documented, ProblemDefinitionError> {
            Ok(Rogue::fresh())
        }
    }

    impl DefineDocumentation for Rogue {
        type Located = Rogue;

        fn documented_at(self, _link: impl Into<String>) -> Self::Located {
            Rogue::fresh()
        }

        fn undocumented(self) -> Self::Located {
            Rogue::fresh()
        }
    }

    impl DefineLocation for Rogue {
        type Categorized = Rogue;

        fn location(self, _path: impl Into<String>, _line: u32) -> Self::Categorized {
            Rogue::fresh()
        }

        fn location_at(
            self,
            _path: impl Into<String>,
            _line: u32,
            _column: u32,
        ) -> Self::Categorized {
            Rogue::fresh()
        }

        fn no_location(self) -> Self::Categorized {
            Rogue::fresh()
        }
    }

    impl DefineCategory for Rogue {
        type Grouped = Rogue;

        fn category(
            self,
            _category: impl Into<String>,
        ) -> Result<Self::Grouped, ProblemDefinitionError> {
            Ok(Rogue::fresh())
        }
    }

    impl DefineGroup for Rogue {
        type Detailed = Rogue;

        fn group(self, _group: ProblemGroup) -> Self::Detailed {
            Rogue::fresh()
        }

        fn group_id(self, _id: &str) -> Result<Self::Detailed, ProblemDefinitionError> {
            Ok(Rogue::fresh())
        }
    }

    impl DefineDetails for Rogue {
        fn description(self, _text: impl Into<String>) -> Self {
            Rogue::fresh()
        }

        fn solution(self, _solution: impl Into<String>) -> Self {
            Rogue::fresh()
        }

        fn additional_data(self, _key: impl Into<String>, _value: impl Into<String>) -> Self {
            Rogue::fresh()
        }

        fn cause(self, _failure: impl Into<SharedFailure>) -> Self {
            Rogue::fresh()
        }

        fn severity(self, _severity: impl Into<Option<Severity>>) -> Self {
            Rogue::fresh()
        }

        fn build(self) -> Result<ReportableProblem, ProblemDefinitionError> {
            Err(ProblemDefinitionError::Incomplete { missing: "message" })
        }
    }

    /// A minimal conforming stub: every stage call returns the same
    /// handle it was called on.
    struct Loyal(DraftHandle);

    impl BuilderView for Loyal {
        fn handle(&self) -> DraftHandle {
            self.0
        }
    }

    impl DefineMessage for Loyal {
        type Documented = Loyal;

        fn message(
            self,
            _text: impl Into<String>,
        ) -> Result<Self::Documented, ProblemDefinitionError> {
            Ok(Loyal(self.0))
        }
    }

    impl DefineDocumentation for Loyal {
        type Located = Loyal;

        fn documented_at(self, _link: impl Into<String>) -> Self::Located {
            Loyal(self.0)
        }

        fn undocumented(self) -> Self::Located {
            Loyal(self.0)
        }
    }

    impl DefineLocation for Loyal {
        type Categorized = Loyal;

        fn location(self, _path: impl Into<String>, _line: u32) -> Self::Categorized {
            Loyal(self.0)
        }

        fn location_at(
            self,
            _path: impl Into<String>,
            _line: u32,
            _column: u32,
        ) -> Self::Categorized {
            Loyal(self.0)
        }

        fn no_location(self) -> Self::Categorized {
            Loyal(self.0)
        }
    }

    impl DefineCategory for Loyal {
        type Grouped = Loyal;

        fn category(
            self,
            _category: impl Into<String>,
        ) -> Result<Self::Grouped, ProblemDefinitionError> {
            Ok(Loyal(self.0))
        }
    }

    impl DefineGroup for Loyal {
        type Detailed = Loyal;

        fn group(self, _group: ProblemGroup) -> Self::Detailed {
            Loyal(self.0)
        }

        fn group_id(self, _id: &str) -> Result<Self::Detailed, ProblemDefinitionError> {
            Ok(Loyal(self.0))
        }
    }

    impl DefineDetails for Loyal {
        fn description(self, _text: impl Into<String>) -> Self {
            Loyal(self.0)
        }

        fn solution(self, _solution: impl Into<String>) -> Self {
            Loyal(self.0)
        }

        fn additional_data(self, _key: impl Into<String>, _value: impl Into<String>) -> Self {
            Loyal(self.0)
        }

        fn cause(self, _failure: impl Into<SharedFailure>) -> Self {
            Loyal(self.0)
        }

        fn severity(self, _severity: impl Into<Option<Severity>>) -> Self {
            Loyal(self.0)
        }

        fn build(self) -> Result<ReportableProblem, ProblemDefinitionError> {
            Err(ProblemDefinitionError::Incomplete { missing: "message" })
        }
    }

    #[test]
    #[should_panic(expected = "did not preserve draft identity at `message`")]
    fn rogue_builder_panics_on_first_stage_call() {
        let _ = Delegating::new(Rogue::fresh()).message("boom");
    }

    #[test]
    #[should_panic(expected = "did not preserve draft identity at `undocumented`")]
    fn rogue_builder_panics_at_later_stages_too() {
        // Hand the wrapper a rogue view already past the message stage.
        let _ = Delegating::new(Rogue::fresh()).undocumented();
    }

    #[test]
    fn conforming_stub_is_accepted() {
        let wrapped = Delegating::new(Loyal(DraftHandle(99)))
            .message("stub")
            .unwrap()
            .undocumented()
            .no_location();
        assert_eq!(wrapped.handle(), DraftHandle(99));
    }
}
