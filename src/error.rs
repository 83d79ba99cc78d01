//! Error types.
//!
//! Fragment-level failures are [`FragmentError`]s: an [`Exception`] plus the
//! trail of [`Frame`]s it passed through on its way out of the pipeline. Every
//! layer of the engine (fragment loop, decorator wrapper, body call, compiled
//! fragment, internal stages) appends its frame while the error propagates, so
//! the trail reads innermost first. [`crate::catcher`] walks it outermost
//! first to rebuild a pipeline-aware traceback.

use std::fmt;

use thiserror::Error;

use crate::catcher::Caught;
use crate::core::DebugInfo;
use crate::value::Value;

/// Category of an [`Exception`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Exception,
    NameError,
    TypeError,
    ValueError,
    AttributeError,
    KeyError,
    IndexError,
    ZeroDivisionError,
    OverflowError,
    MemoryError,
    ImportError,
    OSError,
    /// Cancellation signal. Never swallowed by the `try` decorator.
    KeyboardInterrupt,
}

impl ExceptionKind {
    pub fn name(self) -> &'static str {
        match self {
            ExceptionKind::Exception => "Exception",
            ExceptionKind::NameError => "NameError",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::AttributeError => "AttributeError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
            ExceptionKind::OverflowError => "OverflowError",
            ExceptionKind::MemoryError => "MemoryError",
            ExceptionKind::ImportError => "ImportError",
            ExceptionKind::OSError => "OSError",
            ExceptionKind::KeyboardInterrupt => "KeyboardInterrupt",
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An exception raised by a fragment body, a decorator or the runtime.
#[derive(Debug, Clone, Error)]
pub struct Exception {
    pub kind: ExceptionKind,
    pub message: String,
    /// The exception this one was raised over, if any.
    pub cause: Option<Box<Exception>>,
    /// When set, reports show `cause` instead of this exception.
    pub forced: bool,
}

impl Exception {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            forced: false,
        }
    }

    /// Raise `self` over `cause`.
    pub fn caused_by(mut self, cause: Exception) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Mark this exception as a proxy whose cause should be reported instead.
    pub fn forced(mut self) -> Self {
        self.forced = true;
        self
    }

    /// The exception a report should show: the cause of a forced exception,
    /// otherwise the exception itself.
    pub fn reported(&self) -> &Exception {
        match (&self.cause, self.forced) {
            (Some(cause), true) => cause,
            _ => self,
        }
    }

    /// `Kind: message`, or just `Kind` when there is no message.
    pub fn summary(&self) -> String {
        if self.message.is_empty() {
            self.kind.name().to_string()
        } else {
            format!("{}: {}", self.kind, self.message)
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Source position of an ordinary (non-marker) frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub function: String,
    pub snippet: Option<String>,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            function: function.into(),
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// One step of an error's trail.
#[derive(Debug, Clone)]
pub enum Frame {
    /// The chain evaluator's apply/drain plumbing.
    Chain,
    /// A fragment stage processing `value` (absent while pulling upstream).
    Fragment {
        index: i64,
        value: Option<Value>,
        debug: Option<DebugInfo>,
    },
    /// A decorator wrapping a fragment body.
    Decorator {
        name: String,
        value: Value,
        debug: Option<DebugInfo>,
    },
    /// A decorator calling into the body it wraps.
    Body,
    /// A body compiled from fragment source text.
    Synthetic { debug: DebugInfo },
    /// Anything else: user code or internal plumbing.
    Plain(Location),
}

/// An [`Exception`] together with the frames it propagated through.
#[derive(Debug, Clone, Error)]
#[error("{exception}")]
pub struct FragmentError {
    pub exception: Exception,
    /// Innermost first, in push order.
    trail: Vec<Frame>,
}

impl FragmentError {
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Exception::new(kind, message).into()
    }

    pub fn kind(&self) -> ExceptionKind {
        self.exception.kind
    }

    /// Append the frame of the layer the error is leaving.
    pub fn within(mut self, frame: Frame) -> Self {
        self.trail.push(frame);
        self
    }

    /// Frames from outermost (closest to the pipeline driver) to innermost
    /// (closest to the raise site).
    pub fn frames(&self) -> impl DoubleEndedIterator<Item = &Frame> + ExactSizeIterator {
        self.trail.iter().rev()
    }

    pub fn is_interrupt(&self) -> bool {
        self.exception.kind == ExceptionKind::KeyboardInterrupt
    }
}

impl From<Exception> for FragmentError {
    fn from(exception: Exception) -> Self {
        Self {
            exception,
            trail: Vec::new(),
        }
    }
}

/// Shorthands for the common exception kinds.
pub(crate) fn type_error(message: impl Into<String>) -> FragmentError {
    FragmentError::new(ExceptionKind::TypeError, message)
}

pub(crate) fn value_error(message: impl Into<String>) -> FragmentError {
    FragmentError::new(ExceptionKind::ValueError, message)
}

pub(crate) fn index_error(message: impl Into<String>) -> FragmentError {
    FragmentError::new(ExceptionKind::IndexError, message)
}

pub(crate) fn key_error(key: &str) -> FragmentError {
    FragmentError::new(ExceptionKind::KeyError, Value::from(key).repr())
}

/// A fragment whose source text does not parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct SyntaxError {
    /// Fragment name, e.g. `Fragment 2`.
    pub fragment: String,
    /// 1-based line within the fragment source.
    pub line: usize,
    /// 0-based character column within that line.
    pub col: usize,
    /// The offending source line.
    pub text: String,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  File \"{}\", line {}", self.fragment, self.line)?;
        writeln!(f, "    {}", self.text)?;
        writeln!(f, "    {}^", " ".repeat(self.col))?;
        write!(f, "SyntaxError: {}", self.message)
    }
}

/// Crate-level error returned by the command line driver.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed command line steps.
    #[error("{0}")]
    Usage(String),

    #[error("{0}")]
    Syntax(#[from] SyntaxError),

    /// A decorator refused to bind to its fragment.
    #[error("{fragment}: {source}")]
    Bind {
        fragment: String,
        #[source]
        source: FragmentError,
    },

    #[error(transparent)]
    Fragment(#[from] FragmentError),

    /// A fragment error with its traceback already reconstructed.
    #[error(transparent)]
    Traceback(#[from] Caught),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
