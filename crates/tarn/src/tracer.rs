//! Tracing hooks for the VM and compiler.
//!
//! The crate has no logging dependency; hosts that want observability
//! implement [`VmTracer`] and pass it in. [`NoopTracer`] compiles away.

use crate::bytecode::Opcode;

/// Events observed by a tracer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// An instruction is about to execute.
    Instruction { opcode: Opcode, ip: usize, depth: usize },
    /// A frame was pushed (function call or module init).
    Call { name: String, depth: usize },
    /// A frame returned.
    Return { depth: usize },
    /// An error is unwinding.
    Unwind { name: String },
    /// Free-form compiler note (emitted when `trace_compiler` is set).
    Compiler(String),
}

/// Receives [`TraceEvent`]s during compilation and execution.
pub trait VmTracer {
    fn trace(&mut self, event: TraceEvent);

    /// Cheap pre-check so hot paths can skip building events.
    fn enabled(&self) -> bool {
        true
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {
    fn trace(&mut self, _event: TraceEvent) {}

    fn enabled(&self) -> bool {
        false
    }
}

/// Writes events to stderr, one line each.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn trace(&mut self, event: TraceEvent) {
        eprintln!("[tarn] {event:?}");
    }
}

/// Collects events in memory, mainly for tests.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl VmTracer for RecordingTracer {
    fn trace(&mut self, event: TraceEvent) {
        self.events.push(event);
    }
}
