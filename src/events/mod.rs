//! Problem event types and the event-sink boundary.
//!
//! This module defines the stable JSON shape for machine-readable problem
//! output and the [`EventSink`] contract through which the build engine's
//! operation-tracking infrastructure receives problems.
//!
//! # Stability
//!
//! The JSON schema is versioned and should remain backwards compatible.
//! New fields may be added, but existing fields should not be removed or
//! renamed.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::Serialize;

pub mod operations;

pub use operations::{Operation, OperationId};

/// A problem delivered as an event.
///
/// Each event is serialized as a single JSON object per line. Optional
/// fields are omitted entirely rather than emitted as null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemEvent {
    /// Stable identifier for this kind of problem
    pub problem_id: String,
    /// Short human-readable message
    pub message: String,
    /// Severity level ("advice", "warning", "error")
    pub severity: String,
    /// Group id the problem is classified under
    pub group: String,
    /// Source file (if the problem has a location)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Line number (if the problem has a location)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Column number (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Documentation link (absent for undocumented problems)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_link: Option<String>,
    /// Longer description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Suggested fixes, in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub solutions: Vec<String>,
    /// Free-form key/value payload
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub additional_data: HashMap<String, String>,
    /// Rendered underlying failure (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Tracked operation the problem was attached to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<u64>,
}

impl ProblemEvent {
    /// Serialize this event to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Sink for delivered problems.
///
/// Supplied by the surrounding engine's operation-tracking
/// infrastructure. Delivery is synchronous: the event is handled before
/// `emit_if_active` returns, or the call is a no-op.
pub trait EventSink: Send + Sync {
    /// Emit `event` against the currently active tracked unit of work on
    /// the calling execution context, or do nothing if there is none.
    ///
    /// Problems reported outside any tracked operation are dropped at
    /// this layer; callers must not rely on delivery for control flow.
    fn emit_if_active(&self, event: ProblemEvent) -> Result<()>;
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit_if_active(&self, event: ProblemEvent) -> Result<()> {
        tracing::trace!(problem_id = %event.problem_id, "discarding problem event (noop sink)");
        Ok(())
    }
}

/// Sink that writes one JSON object per line for each event emitted
/// under an active operation.
pub struct JsonLineSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLineSink<W> {
    /// Create a sink writing to `out`.
    pub fn new(out: W) -> Self {
        JsonLineSink {
            out: Mutex::new(out),
        }
    }

    /// Consume the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap()
    }
}

impl<W: Write + Send> EventSink for JsonLineSink<W> {
    fn emit_if_active(&self, mut event: ProblemEvent) -> Result<()> {
        let Some(operation) = operations::current() else {
            tracing::debug!(
                problem_id = %event.problem_id,
                "dropping problem event: no active operation"
            );
            return Ok(());
        };
        event.operation_id = Some(operation.get());

        let mut out = self.out.lock().unwrap();
        writeln!(out, "{}", event.to_json()).context("failed to write problem event")?;
        Ok(())
    }
}

/// Sink that buffers events in memory.
///
/// Useful for tests and for callers that forward problems to another
/// system at the end of an operation. Events emitted outside any active
/// operation are dropped, matching the sink contract.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<ProblemEvent>>,
}

impl CollectingSink {
    /// Create an empty collecting sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events collected so far.
    pub fn events(&self) -> Vec<ProblemEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Drain and return the collected events.
    pub fn take(&self) -> Vec<ProblemEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }
}

impl EventSink for CollectingSink {
    fn emit_if_active(&self, mut event: ProblemEvent) -> Result<()> {
        let Some(operation) = operations::current() else {
            tracing::debug!(
                problem_id = %event.problem_id,
                "dropping problem event: no active operation"
            );
            return Ok(());
        };
        event.operation_id = Some(operation.get());
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}
