//! Diagnostic sink
//!
//! Every failed condition in the container layer ends up here as a
//! [`Diagnostic`]: the condition text, an optional message, the error code and
//! where it happened. The core never formats user-facing text beyond that.
//!
//! # Sinks
//!
//! Diagnostics go to the sink installed for the current thread with
//! [`with_sink`], or to [`TracingSink`] when none is installed. There is no
//! process-wide logger object; callers that want to capture diagnostics (tests,
//! an editor console) scope a sink around the work they run.
//!
//! # Last diagnostic
//!
//! Operations that fail recoverably only hand back an [`ErrorCode`]. The full
//! report of the most recent failure on this thread stays available through
//! [`last_diagnostic`] / [`take_last_diagnostic`] until the next report.
//!
//! # Fatal conditions
//!
//! [`fatal`] reports and then panics, or aborts the process when
//! `HEARTH_FATAL=abort` (see [`crate::config`]).

use crate::config::{CoreConfig, FatalAction, core_config};
use crate::error::ErrorCode;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// How bad a reported condition is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

/// One reported condition with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// The failed condition, as written in the source
    pub condition: &'static str,
    /// Extra context supplied at the report site (may be empty)
    pub message: String,
    pub code: ErrorCode,
    /// `(index, len)` for bounds failures
    pub index: Option<(usize, usize)>,
    pub file: &'static str,
    pub line: u32,
    /// Module path of the reporting function
    pub function: &'static str,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        condition: &'static str,
        message: String,
        code: ErrorCode,
        file: &'static str,
        line: u32,
        function: &'static str,
    ) -> Self {
        Self {
            severity,
            condition,
            message,
            code,
            index: None,
            file,
            line,
            function,
        }
    }

    pub fn with_index(mut self, index: usize, len: usize) -> Self {
        self.index = Some((index, len));
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "In file {} <function {}, line {}>: ",
            self.file, self.function, self.line
        )?;
        if let Some((index, len)) = self.index {
            write!(f, "Index error (index = {} when size = {}): ", index, len)?;
        }
        write!(f, "{}", self.condition)?;
        if !self.message.is_empty() {
            write!(f, " {}", self.message)?;
        }
        write!(f, " [{}]", self.code)
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Receiver of diagnostics.
pub trait DiagnosticSink {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Forwards diagnostics to `tracing` as structured events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, d: &Diagnostic) {
        match d.severity {
            Severity::Warning => tracing::warn!(
                file = d.file,
                line = d.line,
                function = d.function,
                condition = d.condition,
                code = %d.code,
                "{}",
                d.message
            ),
            Severity::Error | Severity::Fatal => tracing::error!(
                file = d.file,
                line = d.line,
                function = d.function,
                condition = d.condition,
                code = %d.code,
                fatal = d.severity == Severity::Fatal,
                index = ?d.index,
                "{}",
                d.message
            ),
        }
    }
}

/// Keeps every diagnostic it receives. Handy for tests and tool consoles.
#[derive(Debug, Default)]
pub struct CollectingSink {
    collected: RefCell<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.collected.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.borrow().is_empty()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.collected.borrow().clone()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.collected.borrow_mut())
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        self.collected.borrow_mut().push(diagnostic.clone());
    }
}

thread_local! {
    /// Sink installed by `with_sink` for the current thread
    static SINK: RefCell<Option<Rc<dyn DiagnosticSink>>> = const { RefCell::new(None) };

    /// Most recent diagnostic reported on this thread
    static LAST_DIAGNOSTIC: RefCell<Option<Diagnostic>> = const { RefCell::new(None) };
}

/// Restores the previously installed sink, also on unwind.
struct SinkGuard {
    previous: Option<Rc<dyn DiagnosticSink>>,
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        SINK.with(|s| *s.borrow_mut() = previous);
    }
}

/// Run `f` with `sink` receiving every diagnostic reported on this thread.
pub fn with_sink<R>(sink: Rc<dyn DiagnosticSink>, f: impl FnOnce() -> R) -> R {
    let previous = SINK.with(|s| s.borrow_mut().replace(sink));
    let _guard = SinkGuard { previous };
    f()
}

/// Hand a diagnostic to the current sink and remember it as the last one.
pub fn report(diagnostic: Diagnostic) {
    // Clone the Rc out so a sink may report recursively
    let sink = SINK.with(|s| s.borrow().clone());
    match sink {
        Some(sink) => sink.report(&diagnostic),
        None => TracingSink.report(&diagnostic),
    }
    LAST_DIAGNOSTIC.with(|d| *d.borrow_mut() = Some(diagnostic));
}

/// Report a fatal diagnostic and stop.
///
/// Panics with the formatted diagnostic, or aborts the process when the
/// configured [`FatalAction`] is `Abort`.
#[cold]
#[track_caller]
pub fn fatal(mut diagnostic: Diagnostic) -> ! {
    diagnostic.severity = Severity::Fatal;
    let text = diagnostic.to_string();
    report(diagnostic);
    match core_config().fatal_action {
        FatalAction::Panic => panic!("{}", text),
        FatalAction::Abort => std::process::abort(),
    }
}

pub fn last_diagnostic() -> Option<Diagnostic> {
    LAST_DIAGNOSTIC.with(|d| d.borrow().clone())
}

pub fn take_last_diagnostic() -> Option<Diagnostic> {
    LAST_DIAGNOSTIC.with(|d| d.borrow_mut().take())
}

pub fn has_diagnostic() -> bool {
    LAST_DIAGNOSTIC.with(|d| d.borrow().is_some())
}

pub fn clear_last_diagnostic() {
    LAST_DIAGNOSTIC.with(|d| *d.borrow_mut() = None);
}

/// Text of the diagnostic carried by a panic raised through [`fatal`].
///
/// `None` for any other panic payload.
pub fn fatal_text(payload: &(dyn std::any::Any + Send)) -> Option<&str> {
    let text = match payload.downcast_ref::<String>() {
        Some(s) => s.as_str(),
        None => *payload.downcast_ref::<&'static str>()?,
    };
    text.starts_with("In file ").then_some(text)
}

/// Install a stderr `tracing` subscriber filtered by `config.log_filter`.
///
/// Returns false if a global subscriber was already set.
pub fn init_logging(config: &CoreConfig) -> bool {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}
