//! Script output: the writer trait, the object-to-writer strategy chain, and
//! the `obstart`/`obend` capture stack.

use std::{
    fmt,
    io::{self, Write as _},
};

use crate::{
    errors::{ErrKind, RunResult},
    heap::Heap,
    value::{Value, to_display},
};

/// Receives everything the script writes to stdout.
pub trait ScriptWriter {
    fn write_text(&mut self, text: &str) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Default writer: buffered stdout.
#[derive(Debug, Default)]
pub struct StdWriter;

impl ScriptWriter for StdWriter {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        io::stdout().write_all(text.as_bytes())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

/// Collects all output into a string; mainly for tests and embedding.
#[derive(Debug, Default)]
pub struct CollectStringWriter(String);

impl CollectStringWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn output(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl ScriptWriter for CollectStringWriter {
    fn write_text(&mut self, text: &str) -> io::Result<()> {
        self.0.push_str(text);
        Ok(())
    }
}

/// One link of the object-to-writer chain.
///
/// A strategy inspects the value and either renders it (`Some`) or declines
/// (`None`), passing it down the chain. The default strategy at the end of
/// the chain prints strings raw and composites canonically.
pub trait WriteStrategy: fmt::Debug {
    fn render(&self, heap: &Heap, value: Value) -> Option<String>;
}

// The crate-internal Value is not host-visible, so host-provided strategies
// work on the rendered default instead: they get a chance to replace the
// canonical text.
impl<F> WriteStrategy for RenderHook<F>
where
    F: Fn(&str, &str) -> Option<String>,
{
    fn render(&self, heap: &Heap, value: Value) -> Option<String> {
        let canonical = to_display(heap, value, false).ok()?;
        (self.hook)(crate::value::type_name(value, heap), &canonical)
    }
}

/// Adapts a `(type_name, canonical_text) -> Option<replacement>` function
/// into a [`WriteStrategy`].
pub struct RenderHook<F> {
    hook: F,
}

impl<F> RenderHook<F>
where
    F: Fn(&str, &str) -> Option<String>,
{
    pub fn new(hook: F) -> Self {
        Self { hook }
    }
}

impl<F> fmt::Debug for RenderHook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderHook").finish_non_exhaustive()
    }
}

/// The VM's output state: a writer, the strategy chain, and the capture
/// stack driven by `obstart`/`obend`.
pub(crate) struct Output<'a> {
    writer: &'a mut dyn ScriptWriter,
    strategies: &'a [Box<dyn WriteStrategy>],
    /// Capture buffers, innermost last; writes land in the top buffer.
    buffers: Vec<String>,
}

impl<'a> Output<'a> {
    pub fn new(writer: &'a mut dyn ScriptWriter, strategies: &'a [Box<dyn WriteStrategy>]) -> Self {
        Self {
            writer,
            strategies,
            buffers: Vec::new(),
        }
    }

    /// Renders a value through the strategy chain and writes it.
    pub fn write_value(&mut self, heap: &Heap, value: Value) -> RunResult<()> {
        for strategy in self.strategies {
            if let Some(text) = strategy.render(heap, value) {
                return self.write_text(&text);
            }
        }
        let text = to_display(heap, value, false)?;
        self.write_text(&text)
    }

    pub fn write_text(&mut self, text: &str) -> RunResult<()> {
        match self.buffers.last_mut() {
            Some(buffer) => {
                buffer.push_str(text);
                Ok(())
            }
            None => self
                .writer
                .write_text(text)
                .map_err(|err| ErrKind::TypeError.err(format!("write failed: {err}"))),
        }
    }

    pub fn flush(&mut self) -> RunResult<()> {
        self.writer
            .flush()
            .map_err(|err| ErrKind::TypeError.err(format!("flush failed: {err}")))
    }

    /// `obstart`: subsequent writes collect into a new buffer.
    pub fn push_buffer(&mut self) {
        self.buffers.push(String::new());
    }

    /// `obend`: ends the innermost capture and returns its contents.
    pub fn pop_buffer(&mut self) -> Option<String> {
        self.buffers.pop()
    }
}
