//! Stages the command line wraps around the user's fragments.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use tracing::trace;

use crate::core::Stage;
use crate::error::{ExceptionKind, Frame, FragmentError, Location};
use crate::value::{Item, Stream, Value};

fn internal(err: FragmentError, function: &str, line: u32) -> FragmentError {
    err.within(Frame::Plain(Location::new(file!(), line, function)))
}

/// Emit every element of every upstream value.
///
/// Used with `--each-line`, where the input is a single stream of lines.
pub struct Flatten;

impl Stage for Flatten {
    fn apply(&self, upstream: Stream, _index: i64) -> Stream {
        Stream::new(FlattenIter {
            upstream,
            current: None,
            done: false,
        })
    }

    fn describe(&self) -> Option<String> {
        Some("<internal> spy::fragments::many".to_string())
    }
}

struct FlattenIter {
    upstream: Stream,
    current: Option<Stream>,
    done: bool,
}

impl FlattenIter {
    fn fail(&mut self, err: FragmentError) -> Option<Item> {
        self.done = true;
        Some(Err(internal(err, "many", line!())))
    }
}

impl Iterator for FlattenIter {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some(current) = &mut self.current {
                match current.next() {
                    Some(Ok(value)) => return Some(Ok(value)),
                    Some(Err(err)) => return self.fail(err),
                    None => self.current = None,
                }
            }
            match self.upstream.next()? {
                Ok(value) => match value.iter() {
                    Ok(stream) => self.current = Some(stream),
                    Err(err) => return self.fail(err),
                },
                Err(err) => return self.fail(err),
            }
        }
    }
}

/// Pass through results `start..end`, counting from zero.
///
/// Once `end` results have been seen the stage emits `...` and stops pulling,
/// so nothing further upstream is evaluated.
#[derive(Debug, Clone, Copy, Default)]
pub struct Limit {
    pub start: usize,
    pub end: Option<usize>,
}

impl Limit {
    pub fn new(start: usize, end: Option<usize>) -> Self {
        Self { start, end }
    }
}

impl Stage for Limit {
    fn apply(&self, upstream: Stream, _index: i64) -> Stream {
        Stream::new(LimitIter {
            limit: *self,
            upstream,
            seen: 0,
            done: false,
        })
    }

    fn describe(&self) -> Option<String> {
        Some("<internal> spy::fragments::limit".to_string())
    }
}

struct LimitIter {
    limit: Limit,
    upstream: Stream,
    seen: usize,
    done: bool,
}

impl Iterator for LimitIter {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        if self.done {
            return None;
        }
        loop {
            let value = match self.upstream.next()? {
                Ok(value) => value,
                Err(err) => {
                    self.done = true;
                    return Some(Err(internal(err, "limit", line!())));
                }
            };
            let n = self.seen;
            self.seen += 1;
            match self.limit.end {
                Some(end) if n >= end => {
                    trace!(end, "limit reached");
                    self.done = true;
                    return Some(Ok(Value::from("...")));
                }
                _ if n >= self.limit.start => return Some(Ok(value)),
                _ => continue,
            }
        }
    }
}

/// Write every value to an output, one per line, and pass it on.
///
/// Strings are written as-is and everything else as its repr. Streams are
/// shown as `<iterator>` and left unconsumed for later stages.
#[derive(Clone)]
pub struct Print {
    out: Rc<RefCell<dyn Write>>,
}

impl Print {
    pub fn new(out: Rc<RefCell<dyn Write>>) -> Self {
        Self { out }
    }

}

impl Stage for Print {
    fn apply(&self, upstream: Stream, _index: i64) -> Stream {
        let out = Rc::clone(&self.out);
        let mut failed = false;
        Stream::new(upstream.map_while(move |item| {
            if failed {
                return None;
            }
            let printed = item.and_then(|value| {
                writeln!(out.borrow_mut(), "{value}")
                    .map_err(|err| FragmentError::new(ExceptionKind::OSError, err.to_string()))?;
                Ok(value)
            });
            if printed.is_err() {
                failed = true;
            }
            Some(printed.map_err(|err| internal(err, "print", line!())))
        }))
    }

    fn describe(&self) -> Option<String> {
        Some("<internal> spy::fragments::print".to_string())
    }
}
