//! Tracked units of work.
//!
//! A minimal model of the engine's operation tracking: each execution
//! context carries a stack of active operations, and problem events are
//! attached to the innermost one. Sinks consult [`current`] to decide
//! whether an event has somewhere to go.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide monotonic operation id source.
static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static OPERATION_STACK: RefCell<Vec<OperationId>> = const { RefCell::new(Vec::new()) };
}

/// Identifier of a tracked unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(u64);

impl OperationId {
    /// The raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// The innermost active operation on this execution context, if any.
pub fn current() -> Option<OperationId> {
    OPERATION_STACK.with(|stack| stack.borrow().last().copied())
}

/// RAII guard for a tracked unit of work.
///
/// Starting an operation makes it the current one for this execution
/// context; dropping it restores the enclosing operation. Operations
/// nest but never cross threads.
pub struct Operation {
    id: OperationId,
    name: String,
}

impl Operation {
    /// Start a new operation and make it current.
    pub fn start(name: impl Into<String>) -> Self {
        let id = OperationId(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed));
        let name = name.into();
        OPERATION_STACK.with(|stack| stack.borrow_mut().push(id));
        tracing::debug!(operation = %name, id = id.get(), "operation started");
        Operation { id, name }
    }

    /// This operation's id.
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Display name of the operation.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        OPERATION_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            // Guards are dropped in reverse start order by construction.
            debug_assert_eq!(popped, Some(self.id));
        });
        tracing::debug!(operation = %self.name, id = self.id.get(), "operation finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_operation_by_default() {
        assert!(current().is_none());
    }

    #[test]
    fn start_and_drop_restores_enclosing() {
        let outer = Operation::start("configure");
        assert_eq!(current(), Some(outer.id()));

        {
            let inner = Operation::start("resolve");
            assert_eq!(current(), Some(inner.id()));
            assert_ne!(inner.id(), outer.id());
        }

        assert_eq!(current(), Some(outer.id()));
        drop(outer);
        assert!(current().is_none());
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| Operation::start("work").id().get()))
            .collect();
        let mut ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn operations_are_per_thread() {
        let _op = Operation::start("main thread work");
        let seen = std::thread::spawn(current).join().unwrap();
        assert!(seen.is_none());
    }
}
