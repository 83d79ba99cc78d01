//! Pipeline-aware tracebacks.
//!
//! [`format_exc`] turns the frame trail of a [`FragmentError`] into a report
//! that names the failing fragment, its source and the value it was given,
//! and hides the evaluator and decorator plumbing in between.

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::core::DebugInfo;
use crate::error::{Frame, FragmentError, Location};
use crate::value::Value;

const HEADER: &str = "Traceback (most recent call last):";

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// Drop every entry above the innermost fragment, not only the
    /// evaluator's own frames.
    pub collapse_outer: bool,
}

/// A rendered traceback: groups of lines, one group per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    entries: Vec<Vec<String>>,
}

impl Report {
    pub fn entries(&self) -> &[Vec<String>] {
        &self.entries
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().flatten().map(String::as_str)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}

fn label(index: i64, debug: Option<&DebugInfo>) -> String {
    match debug {
        Some(debug) => format!("  {}", debug.name),
        None => format!("  Fragment {index}"),
    }
}

fn value_line(value: &Value) -> String {
    format!("    input to fragment was {}", value.repr())
}

fn location_lines(location: &Location) -> Vec<String> {
    let mut lines = vec![format!(
        "  File \"{}\", line {}, in {}",
        location.file, location.line, location.function
    )];
    if let Some(snippet) = &location.snippet {
        lines.push(format!("    {}", snippet.trim()));
    }
    lines
}

/// Reconstruct the traceback of `err`.
pub fn format_exc(err: &FragmentError, options: &ReportOptions) -> Report {
    debug!(frames = err.frames().len(), "reconstructing traceback");
    let mut entries: Vec<Vec<String>> = Vec::new();
    // Entries past `cut` are plumbing, dropped once the next fragment level
    // is reached.
    let mut cut: Option<usize> = None;
    // Set inside decorator internals: entries past it are hidden unless the
    // walk gets back to user code.
    let mut hide: Option<usize> = None;
    let mut index: i64 = 0;
    let mut value: Option<Value> = None;

    for frame in err.frames() {
        match frame {
            Frame::Chain => cut = Some(entries.len()),
            Frame::Fragment {
                index: i,
                value: v,
                debug,
            } => {
                if options.collapse_outer {
                    entries.clear();
                } else if let Some(cut) = cut {
                    entries.truncate(cut);
                }
                index = *i;
                value = v.clone();
                cut = Some(entries.len());
                let mut lines = vec![label(index, debug.as_ref())];
                lines.extend(value.as_ref().map(value_line));
                entries.push(lines);
            }
            Frame::Decorator {
                name,
                value: v,
                debug,
            } => {
                if let Some(cut) = cut {
                    entries.truncate(cut);
                }
                cut = Some(entries.len());
                let mut lines = vec![format!("  Fragment {index}, in decorator {name}")];
                if let Some(debug) = debug {
                    lines.push(format!("    {}", debug.source));
                }
                lines.push(value_line(v));
                entries.push(lines);
                hide = Some(entries.len());
            }
            Frame::Body => {
                if let Some(cut) = cut {
                    entries.truncate(cut);
                }
                cut = Some(entries.len());
                let mut lines = vec![format!("  Fragment {index}")];
                lines.extend(value.as_ref().map(value_line));
                entries.push(lines);
                hide = None;
            }
            Frame::Synthetic { debug } => {
                if let Some(cut) = cut {
                    entries.truncate(cut);
                }
                cut = Some(entries.len());
                let mut lines = vec![label(index, Some(debug)), format!("    {}", debug.source)];
                lines.extend(value.as_ref().map(value_line));
                entries.push(lines);
                hide = None;
            }
            Frame::Plain(location) => {
                entries.push(location_lines(location));
                // Only frames in fragment source carry a snippet.
                if location.snippet.is_some() {
                    hide = None;
                }
            }
        }
    }
    if let Some(hide) = hide {
        entries.truncate(hide);
    }

    entries.insert(0, vec![HEADER.to_string()]);
    entries.push(vec![err.exception.reported().summary()]);
    Report { entries }
}

/// Every frame of `err`, unfiltered.
pub fn format_raw(err: &FragmentError) -> Report {
    let mut entries = vec![vec![HEADER.to_string()]];
    for frame in err.frames() {
        let lines = match frame {
            Frame::Chain => vec!["  <chain>".to_string()],
            Frame::Fragment { index, value, .. } => {
                let mut lines = vec![format!("  Fragment {index}")];
                lines.extend(value.as_ref().map(value_line));
                lines
            }
            Frame::Decorator { name, value, .. } => {
                vec![format!("  <decorator {name}>"), value_line(value)]
            }
            Frame::Body => vec!["  <body>".to_string()],
            Frame::Synthetic { debug } => {
                vec![format!("  {}", debug.name), format!("    {}", debug.source)]
            }
            Frame::Plain(location) => location_lines(location),
        };
        entries.push(lines);
    }
    entries.push(vec![err.exception.summary()]);
    Report { entries }
}

/// A fragment error together with its reconstructed traceback.
#[derive(Debug, Error)]
#[error("{report}")]
pub struct Caught {
    pub report: Report,
    #[source]
    pub error: FragmentError,
}

impl Caught {
    pub fn print_traceback(&self) {
        eprint!("{}", self.report);
    }
}

/// Attach a traceback to the error of `result`, if any.
pub fn catch<T>(result: Result<T, FragmentError>, options: &ReportOptions) -> Result<T, Caught> {
    result.map_err(|error| Caught {
        report: format_exc(&error, options),
        error,
    })
}
