//! Fragment wrapper and chain evaluator.
//!
//! A [`Stage`] turns an upstream [`Stream`] into a downstream one. The common
//! stage is a [`Fragment`]: it calls a [`Body`] once per upstream element and
//! interprets the [`Value::Drop`] and [`Value::Many`] markers in the result.
//! A [`Chain`] composes stages left to right, lazily.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use tracing::debug;

use crate::error::{Frame, FragmentError, Location, value_error};
use crate::fragments::Print;
use crate::value::{Item, Stream, Value};

/// Display name and source text attached to a fragment body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugInfo {
    pub name: String,
    pub source: String,
}

impl DebugInfo {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// The element being processed plus the unconsumed rest of the upstream.
///
/// A context is created per element and handed to bodies that asked for it.
/// Its `rest` shares position with the stage's upstream, so anything drained
/// through it is never seen by the stage.
pub struct IterContext {
    head: Rc<RefCell<Option<Value>>>,
    value: Value,
    rest: Stream,
}

impl IterContext {
    pub fn new(value: Value, rest: Stream) -> Self {
        Self {
            head: Rc::new(RefCell::new(Some(value.clone()))),
            value,
            rest,
        }
    }

    /// The element being processed.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// The upstream elements not yet pulled.
    pub fn rest(&self) -> &Stream {
        &self.rest
    }
}

/// The current element followed by the rest of the upstream.
///
/// Collecting twice against one context does not repeat the current element:
/// the head is handed out once and the rest is shared.
pub fn collect(ctx: Option<&IterContext>) -> Result<Stream, FragmentError> {
    let ctx = ctx.ok_or_else(|| value_error("Can't collect without a valid context (got None)"))?;
    let head = Rc::clone(&ctx.head);
    let head = std::iter::from_fn(move || head.borrow_mut().take().map(Ok));
    Ok(Stream::new(head.chain(ctx.rest.clone())))
}

/// Hook for bodies that evaluate against a namespace which can be swapped
/// for the entries of a dict value (the `keywords` decorator).
pub trait Rescope {
    /// Make the entries of `scope` visible as names, or restore the plain
    /// namespace when `scope` is `None`.
    fn rescope(&self, scope: Option<&Value>) -> Result<(), FragmentError>;
}

/// The per-element function of a fragment.
pub trait Body {
    fn call(&self, value: Value, ctx: Option<&IterContext>) -> Result<Value, FragmentError>;

    fn debug_info(&self) -> Option<&DebugInfo> {
        None
    }

    /// The namespace rebind hook, for bodies that have one.
    fn scope(&self) -> Option<Rc<dyn Rescope>> {
        None
    }

    /// Type name used when no debug info is attached.
    fn name(&self) -> Option<&str> {
        None
    }
}

type PlainFn = dyn Fn(Value) -> Result<Value, FragmentError>;
type ContextFn = dyn Fn(Value, Option<&IterContext>) -> Result<Value, FragmentError>;

/// Whether a body receives the iteration context, fixed at construction.
pub enum Callee {
    Plain(Box<PlainFn>),
    WantsContext(Box<ContextFn>),
}

/// A [`Body`] backed by a Rust closure or function.
pub struct FnBody {
    callee: Callee,
    name: &'static str,
    debug: Option<DebugInfo>,
}

impl FnBody {
    pub fn plain<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, FragmentError> + 'static,
    {
        Self {
            callee: Callee::Plain(Box::new(f)),
            name: std::any::type_name::<F>(),
            debug: None,
        }
    }

    pub fn with_context<F>(f: F) -> Self
    where
        F: Fn(Value, Option<&IterContext>) -> Result<Value, FragmentError> + 'static,
    {
        Self {
            callee: Callee::WantsContext(Box::new(f)),
            name: std::any::type_name::<F>(),
            debug: None,
        }
    }

    pub fn with_debug(mut self, debug: DebugInfo) -> Self {
        self.debug = Some(debug);
        self
    }
}

impl Body for FnBody {
    fn call(&self, value: Value, ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
        match &self.callee {
            Callee::Plain(f) => f(value),
            Callee::WantsContext(f) => f(value, ctx),
        }
    }

    fn debug_info(&self) -> Option<&DebugInfo> {
        self.debug.as_ref()
    }

    fn name(&self) -> Option<&str> {
        Some(self.name)
    }
}

/// One step of a [`Chain`].
pub trait Stage {
    /// Wrap `upstream`. `index` is the user-facing position of the stage.
    fn apply(&self, upstream: Stream, index: i64) -> Stream;

    /// Description for [`Chain::format`]; `None` renders as `UNKNOWN`.
    fn describe(&self) -> Option<String> {
        None
    }
}

impl<F> Stage for F
where
    F: Fn(Stream, i64) -> Stream,
{
    fn apply(&self, upstream: Stream, index: i64) -> Stream {
        self(upstream, index)
    }
}

/// A stage calling a [`Body`] once per upstream element.
#[derive(Clone)]
pub struct Fragment {
    body: Rc<dyn Body>,
}

/// Wrap a body into a fragment stage.
pub fn fragment(body: impl Body + 'static) -> Fragment {
    Fragment::new(Rc::new(body))
}

impl Fragment {
    pub fn new(body: Rc<dyn Body>) -> Self {
        Self { body }
    }

    /// A fragment over a plain per-element function.
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, FragmentError> + 'static,
    {
        fragment(FnBody::plain(f))
    }

    /// A fragment whose function also receives the iteration context.
    pub fn with_context<F>(f: F) -> Self
    where
        F: Fn(Value, Option<&IterContext>) -> Result<Value, FragmentError> + 'static,
    {
        fragment(FnBody::with_context(f))
    }

    pub fn body(&self) -> &Rc<dyn Body> {
        &self.body
    }
}

impl Stage for Fragment {
    fn apply(&self, upstream: Stream, index: i64) -> Stream {
        Stream::new(FragmentIter {
            body: Rc::clone(&self.body),
            upstream,
            index,
            expanding: None,
            done: false,
        })
    }

    fn describe(&self) -> Option<String> {
        match self.body.debug_info() {
            Some(debug) => Some(debug.source.clone()),
            None => self.body.name().map(|name| format!("<internal> {name}")),
        }
    }
}

struct FragmentIter {
    body: Rc<dyn Body>,
    upstream: Stream,
    index: i64,
    /// A `Many` result being emitted, with the element that produced it.
    expanding: Option<(Stream, Value)>,
    done: bool,
}

impl FragmentIter {
    fn fail(&mut self, err: FragmentError, value: Option<Value>) -> Item {
        self.done = true;
        Err(err.within(Frame::Fragment {
            index: self.index,
            value,
            debug: self.body.debug_info().cloned(),
        }))
    }
}

impl Iterator for FragmentIter {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some((expanding, value)) = &mut self.expanding {
                match expanding.next() {
                    Some(Ok(v)) if v.is_drop() => continue,
                    Some(Ok(v)) => return Some(Ok(v)),
                    Some(Err(err)) => {
                        let value = value.clone();
                        return Some(self.fail(err, Some(value)));
                    }
                    None => {
                        self.expanding = None;
                        continue;
                    }
                }
            }

            let value = match self.upstream.next()? {
                Ok(value) => value,
                Err(err) => return Some(self.fail(err, None)),
            };
            let ctx = IterContext::new(value.clone(), self.upstream.clone());
            match self.body.call(value.clone(), Some(&ctx)) {
                Ok(Value::Drop) => continue,
                Ok(Value::Many(inner)) => match inner.iter() {
                    Ok(stream) => self.expanding = Some((stream, value)),
                    Err(err) => return Some(self.fail(err, Some(value))),
                },
                Ok(result) => return Some(Ok(result)),
                Err(err) => return Some(self.fail(err, Some(value))),
            }
        }
    }
}

/// An ordered sequence of stages.
pub struct Chain {
    stages: Vec<Box<dyn Stage>>,
    index_offset: i64,
}

impl Chain {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self::with_offset(stages, 0)
    }

    /// A chain whose stage indices are shifted by `index_offset`, so stages
    /// injected ahead of the user's can report an index of zero or less.
    pub fn with_offset(stages: Vec<Box<dyn Stage>>, index_offset: i64) -> Self {
        debug!(stages = stages.len(), index_offset, "building chain");
        Self {
            stages,
            index_offset,
        }
    }

    /// `stages` followed by a stage printing every result to `out`.
    pub fn with_defaults(
        mut stages: Vec<Box<dyn Stage>>,
        index_offset: i64,
        out: Rc<RefCell<dyn Write>>,
    ) -> Self {
        stages.push(Box::new(Print::new(out)));
        Self::with_offset(stages, index_offset)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn index_offset(&self) -> i64 {
        self.index_offset
    }

    fn index_of(&self, position: usize) -> i64 {
        position as i64 + 1 + self.index_offset
    }

    /// Lazily run `input` through every stage.
    pub fn apply<I>(&self, input: I) -> Stream
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: 'static,
    {
        self.apply_stream(Stream::from_values(input))
    }

    pub fn apply_stream(&self, input: Stream) -> Stream {
        let composed = self
            .stages
            .iter()
            .enumerate()
            .fold(input, |upstream, (n, stage)| stage.apply(upstream, self.index_of(n)));
        Stream::new(composed.map(|item| {
            item.map_err(|err| {
                err.within(Frame::Plain(Location::new(file!(), line!(), "apply")))
                    .within(Frame::Chain)
            })
        }))
    }

    /// Drain the chain for its side effects, stopping at the first error.
    pub fn run_to_exhaustion<I>(&self, input: I) -> Result<(), FragmentError>
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: 'static,
    {
        self.drain(self.apply(input))
    }

    fn drain(&self, output: Stream) -> Result<(), FragmentError> {
        for item in output {
            item?;
        }
        Ok(())
    }

    /// One line per stage: `index | description`.
    pub fn format(&self) -> String {
        let lines: Vec<String> = self
            .stages
            .iter()
            .enumerate()
            .map(|(n, stage)| {
                let index = self.index_of(n);
                let index = if index < 1 {
                    String::new()
                } else {
                    index.to_string()
                };
                let description = stage.describe().unwrap_or_else(|| "UNKNOWN".to_string());
                format!("{index:>3} | {description}")
            })
            .collect();
        lines.join("\n")
    }
}
