//! Host-pluggable evaluation tracing.
//!
//! The engine itself performs no I/O; hosts that want to observe evaluation
//! (debuggers, coverage, step budgets in tests) pass a tracer to
//! [`crate::Program::evaluate_with_tracer`]. The default paths use
//! [`NoopTracer`], which compiles down to nothing.

use crate::ast::CodeRange;

/// Callbacks invoked by the evaluator.
pub trait EvalTracer {
    /// Called on entry to every AST node, with the node's operator tag and
    /// source range.
    fn on_node(&mut self, tag: &'static str, range: CodeRange) {
        let _ = (tag, range);
    }
}

/// A tracer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl EvalTracer for NoopTracer {}

/// One recorded evaluation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent {
    pub tag: &'static str,
    pub range: CodeRange,
}

/// A tracer that records every visited node, for tests and debugging hosts.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The recorded operator tags, in visit order.
    #[must_use]
    pub fn tags(&self) -> Vec<&'static str> {
        self.events.iter().map(|e| e.tag).collect()
    }
}

impl EvalTracer for RecordingTracer {
    fn on_node(&mut self, tag: &'static str, range: CodeRange) {
        self.events.push(TraceEvent { tag, range });
    }
}
