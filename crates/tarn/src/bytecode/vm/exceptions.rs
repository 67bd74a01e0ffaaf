//! Throwing, unwinding, and handler dispatch.
//!
//! `throw` builds a [`RunError`] from the thrown value; the unwinder walks
//! the handler stack innermost first, popping frames (and running their
//! defers) down to each handler's base. A handler's catch runs once; a
//! second error from inside it routes to the finally block or onward. Errors
//! are parked while finally blocks run and rethrown by `FinallyEnd`.

use super::{FrameKind, PendingFinally, Vm};
use crate::{
    errors::{RunError, RunResult, ThrownError, TraceFrame},
    heap::HeapData,
    tracer::TraceEvent,
    types::ErrorObj,
    value::{Value, to_display},
};

impl Vm<'_> {
    /// Builds the error a `throw` raises. Error objects travel as-is (the
    /// catch variable rebinds the identical object); other values are
    /// stringified into a plain `error`.
    pub(super) fn make_thrown(&mut self, value: Value) -> RunError {
        if let Value::Ref(id) = value
            && let HeapData::Error(err) = self.heap.get(id)
        {
            return RunError::Thrown(Box::new(ThrownError {
                name: err.name.to_string(),
                message: err.message.to_string(),
                value: Some(value),
                pos: None,
                trace: Vec::new(),
            }));
        }
        let message = to_display(&self.heap, value, false).unwrap_or_else(|_| "<unprintable>".to_owned());
        RunError::Thrown(Box::new(ThrownError {
            name: "error".to_owned(),
            message,
            value: None,
            pos: None,
            trace: Vec::new(),
        }))
    }

    /// The value bound by a catch handler.
    fn error_value(&mut self, err: &RunError) -> Value {
        match err {
            RunError::Thrown(thrown) => match thrown.value {
                Some(value) => value,
                None => self
                    .heap
                    .alloc_error(ErrorObj::new(thrown.name.as_str(), thrown.message.as_str())),
            },
            RunError::Internal(message) => self.heap.alloc_error(ErrorObj::new("InternalError", message.as_str())),
        }
    }

    fn record_trace(&self, err: &mut RunError) {
        let frame = self.frame();
        let pos = frame.code.location_at(frame.ip.saturating_sub(1));
        err.push_frame(TraceFrame {
            name: frame.func.name.to_string(),
            file: frame.func.file.to_string(),
            line: pos.map_or(0, |p| p.line),
            column: pos.map_or(0, |p| p.column),
        });
    }

    /// Pops frames down to `floor`, running defers and recording the trace.
    fn unwind_to(&mut self, floor: usize, err: &mut RunError) {
        while self.frames.len() > floor {
            self.record_trace(err);
            while !self.frame().defers.is_empty() {
                if let Err(defer_err) = self.run_frame_defers() {
                    *err = defer_err;
                }
            }
            let frame = self.frames.pop().expect("unwind without frame");
            if !matches!(frame.kind, FrameKind::Fragment) {
                self.stack.truncate(frame.base);
            }
        }
        let depth = self.frames.len();
        while self.handlers.last().is_some_and(|h| h.frame_depth > depth) {
            self.handlers.pop();
        }
        let handler_depth = self.handlers.len();
        self.pending_finally.retain(|p| p.handler_depth <= handler_depth);
    }

    /// Routes an error to the innermost applicable handler, or unwinds out
    /// of this dispatch loop. `Ok(())` means execution resumes (in a catch or
    /// finally block); `Err` propagates to the loop's caller with frames
    /// already popped to its floor.
    pub(super) fn handle_error(&mut self, err: RunError, floor: usize) -> RunResult<()> {
        let mut err = err;
        if matches!(err, RunError::Internal(_)) {
            self.unwind_to(floor, &mut err);
            return Err(err);
        }
        if self.tracer.enabled() {
            let name = match &err {
                RunError::Thrown(t) => t.name.clone(),
                RunError::Internal(_) => "InternalError".to_owned(),
            };
            self.tracer.trace(TraceEvent::Unwind { name });
        }
        loop {
            let handler = match self.handlers.last() {
                Some(h) if h.frame_depth > floor => *h,
                _ => {
                    self.unwind_to(floor, &mut err);
                    return Err(err);
                }
            };

            // Pop frames above the handler's, running their defers.
            while self.frames.len() > handler.frame_depth {
                self.record_trace(&mut err);
                while !self.frame().defers.is_empty() {
                    if let Err(defer_err) = self.run_frame_defers() {
                        err = defer_err;
                    }
                }
                let frame = self.frames.pop().expect("unwind without frame");
                if !matches!(frame.kind, FrameKind::Fragment) {
                    self.stack.truncate(frame.base);
                }
            }
            self.stack.truncate(handler.stack_len);

            if !handler.in_catch && handler.catch.is_some() {
                let catch = handler.catch.expect("checked above");
                if let Some(active) = self.handlers.last_mut() {
                    active.in_catch = true;
                }
                let value = self.error_value(&err);
                self.push(value);
                self.frame_mut().ip = catch as usize;
                return Ok(());
            }

            // This handler is spent: the error came from its catch block or
            // it never had one. Run its finally (parking the error) or keep
            // walking outward.
            self.handlers.pop();
            let handler_depth = self.handlers.len();
            self.pending_finally.retain(|p| p.handler_depth <= handler_depth);
            if let Some(finally) = handler.finally {
                self.pending_finally.push(PendingFinally {
                    handler_depth,
                    error: err,
                });
                self.frame_mut().ip = finally as usize;
                return Ok(());
            }
        }
    }
}
