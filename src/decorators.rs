//! Decorators: adapters that change how a fragment body is applied.
//!
//! A [`Decorator`] wraps a body with extra behavior (use as predicate, expand
//! the result, swallow errors, ...). Decorators are type erased into a
//! [`DecoratorDef`] carrying the command line aliases, the number of
//! declaration-time arguments, and a binder that prepares the decorator once
//! and wraps the body. [`decorate`] stacks several bindings around one body,
//! first declared outermost.

use std::cell::RefCell;
use std::rc::Rc;

use regex::Regex;
use tracing::debug;

use crate::core::{Body, DebugInfo, IterContext, Rescope, collect};
use crate::error::{ExceptionKind, Frame, FragmentError, index_error, key_error, value_error};
use crate::value::Value;

/// Qualified names are reported as `spy::decorators::<name>`.
const QUALIFIER: &str = "spy::decorators";

/// The body a decorator wraps, as seen from inside the decorator.
///
/// Errors raised by the body are marked so reports show them as user code
/// rather than decorator internals.
pub struct CallBody<'a> {
    inner: &'a dyn Body,
}

impl CallBody<'_> {
    pub fn call(&self, value: Value, ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
        self.inner
            .call(value, ctx)
            .map_err(|err| err.within(Frame::Body))
    }

    pub fn debug_info(&self) -> Option<&DebugInfo> {
        self.inner.debug_info()
    }
}

/// Behavior wrapped around a fragment body.
pub trait Decorator: 'static {
    /// Computed once at bind time and handed to every call.
    type Prepared: 'static;

    /// Validate the body and the declaration arguments. Failing here fails
    /// the binding, before any element is processed.
    fn prepare(&self, body: &dyn Body, args: &[String]) -> Result<Self::Prepared, FragmentError>;

    fn call(
        &self,
        body: &CallBody<'_>,
        value: Value,
        ctx: Option<&IterContext>,
        prepared: &Self::Prepared,
    ) -> Result<Value, FragmentError>;
}

struct Decorated<D: Decorator> {
    name: String,
    decorator: Rc<D>,
    prepared: D::Prepared,
    inner: Rc<dyn Body>,
}

impl<D: Decorator> Body for Decorated<D> {
    fn call(&self, value: Value, ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
        let marker = value.clone();
        let body = CallBody {
            inner: self.inner.as_ref(),
        };
        self.decorator
            .call(&body, value, ctx, &self.prepared)
            .map_err(|err| {
                err.within(Frame::Decorator {
                    name: self.name.clone(),
                    value: marker,
                    debug: self.inner.debug_info().cloned(),
                })
            })
    }

    fn debug_info(&self) -> Option<&DebugInfo> {
        self.inner.debug_info()
    }

    fn scope(&self) -> Option<Rc<dyn Rescope>> {
        self.inner.scope()
    }

    fn name(&self) -> Option<&str> {
        self.inner.name()
    }
}

type SimpleFn = fn(&CallBody<'_>, Value, Option<&IterContext>) -> Result<Value, FragmentError>;

/// A decorator with no preparation, given as a plain function.
struct Simple(SimpleFn);

impl Decorator for Simple {
    type Prepared = ();

    fn prepare(&self, _body: &dyn Body, _args: &[String]) -> Result<(), FragmentError> {
        Ok(())
    }

    fn call(
        &self,
        body: &CallBody<'_>,
        value: Value,
        ctx: Option<&IterContext>,
        _prepared: &(),
    ) -> Result<Value, FragmentError> {
        (self.0)(body, value, ctx)
    }
}

type Binder = dyn Fn(Rc<dyn Body>, &[String]) -> Result<Rc<dyn Body>, FragmentError>;

/// A decorator together with its command line surface.
pub struct DecoratorDef {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub help: &'static str,
    /// Number of declaration-time arguments following the flag.
    pub arity: usize,
    /// The fragment source is a literal template rather than code.
    pub literal: bool,
    binder: Rc<Binder>,
}

impl DecoratorDef {
    pub fn new<D: Decorator>(
        name: &'static str,
        aliases: &'static [&'static str],
        help: &'static str,
        arity: usize,
        decorator: D,
    ) -> Self {
        let decorator = Rc::new(decorator);
        let qualified = format!("{QUALIFIER}::{name}");
        let binder = move |inner: Rc<dyn Body>,
                           args: &[String]|
              -> Result<Rc<dyn Body>, FragmentError> {
            let prepared = decorator.prepare(inner.as_ref(), args)?;
            Ok(Rc::new(Decorated {
                name: qualified.clone(),
                decorator: Rc::clone(&decorator),
                prepared,
                inner,
            }))
        };
        Self {
            name,
            aliases,
            help,
            arity,
            literal: false,
            binder: Rc::new(binder),
        }
    }

    /// A decorator without arguments or preparation.
    pub fn simple(
        name: &'static str,
        aliases: &'static [&'static str],
        help: &'static str,
        call: SimpleFn,
    ) -> Self {
        Self::new(name, aliases, help, 0, Simple(call))
    }

    /// Mark the decorator as taking its fragment source literally.
    pub fn literal(mut self) -> Self {
        self.literal = true;
        self
    }

    pub fn qualified_name(&self) -> String {
        format!("{QUALIFIER}::{}", self.name)
    }

    /// Wrap `body`, checking the arguments and running preparation now.
    pub fn bind(&self, body: Rc<dyn Body>, args: &[String]) -> Result<Rc<dyn Body>, FragmentError> {
        if args.len() != self.arity {
            return Err(value_error(format!(
                "{} takes {} argument(s), got {}",
                self.qualified_name(),
                self.arity,
                args.len()
            )));
        }
        debug!(decorator = self.name, ?args, "binding decorator");
        (self.binder)(body, args)
    }
}

/// A decorator declared on a fragment, with its arguments.
#[derive(Clone)]
pub struct Binding {
    pub decorator: Rc<DecoratorDef>,
    pub args: Vec<String>,
}

impl Binding {
    pub fn new(decorator: Rc<DecoratorDef>, args: Vec<String>) -> Self {
        Self { decorator, args }
    }
}

/// Wrap `body` in `bindings`, the first declared ending up outermost.
pub fn decorate(body: Rc<dyn Body>, bindings: &[Binding]) -> Result<Rc<dyn Body>, FragmentError> {
    bindings
        .iter()
        .rev()
        .try_fold(body, |inner, binding| binding.decorator.bind(inner, &binding.args))
}

/// The decorators known to the command line, looked up by alias.
#[derive(Clone, Default)]
pub struct Registry {
    decorators: Vec<Rc<DecoratorDef>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for def in builtins() {
            registry.register(def);
        }
        registry
    }

    pub fn register(&mut self, def: DecoratorDef) {
        self.decorators.push(Rc::new(def));
    }

    pub fn lookup(&self, alias: &str) -> Option<Rc<DecoratorDef>> {
        self.decorators
            .iter()
            .find(|def| def.aliases.contains(&alias))
            .cloned()
    }

    /// One line per decorator: its aliases and help text.
    pub fn help(&self) -> String {
        let rows: Vec<(String, &str)> = self
            .decorators
            .iter()
            .map(|def| {
                let mut aliases = def.aliases.join(", ");
                for n in 0..def.arity {
                    aliases.push_str(&format!(" ARG{}", n + 1));
                }
                (aliases, def.help)
            })
            .collect();
        let width = rows.iter().map(|(a, _)| a.len()).max().unwrap_or(0);
        rows.iter()
            .map(|(aliases, help)| format!("  {aliases:<width$}  {help}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn builtins() -> Vec<DecoratorDef> {
    vec![
        DecoratorDef::simple(
            "accumulate",
            &["--accumulate", "-a"],
            "Pass an iterator of yielded values to this fragment",
            accumulate,
        ),
        DecoratorDef::simple(
            "callable",
            &["--callable", "-c"],
            "Call the result of this fragment",
            callable,
        ),
        DecoratorDef::simple(
            "filter",
            &["--filter", "-f"],
            "Treat this fragment as a predicate to filter data",
            filter,
        ),
        DecoratorDef::simple("many", &["--many", "-m"], "Iterate over this fragment", many),
        DecoratorDef::simple(
            "once",
            &["--once"],
            "Run this fragment once, then pass the rest of the input through",
            once,
        ),
        DecoratorDef::simple(
            "format",
            &["--interpolate", "-i"],
            "Interpolate argument as a format string",
            format,
        )
        .literal(),
        DecoratorDef::new(
            "regex",
            &["--regex", "-R"],
            "Match argument as a regular expression",
            0,
            RegexMatch,
        )
        .literal(),
        DecoratorDef::new(
            "keywords",
            &["--keywords", "-k"],
            "Use the input (a dict) as the fragment's namespace",
            0,
            Keywords,
        ),
        DecoratorDef::new(
            "focus",
            &["--focus", "-o"],
            "Operate on an item of the input in-place",
            1,
            Focus { magnify: false },
        ),
        DecoratorDef::new(
            "magnify",
            &["--magnify", "-O"],
            "Operate on and return an item of the input",
            1,
            Focus { magnify: true },
        ),
        DecoratorDef::simple(
            "try",
            &["--try", "-t"],
            "Filter out input that causes errors",
            try_,
        ),
    ]
}

fn accumulate(
    body: &CallBody<'_>,
    _value: Value,
    ctx: Option<&IterContext>,
) -> Result<Value, FragmentError> {
    body.call(Value::Stream(collect(ctx)?), ctx)
}

fn callable(
    body: &CallBody<'_>,
    value: Value,
    ctx: Option<&IterContext>,
) -> Result<Value, FragmentError> {
    let result = body.call(value.clone(), ctx)?;
    result.call(vec![value], ctx)
}

fn filter(body: &CallBody<'_>, value: Value, ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
    if body.call(value.clone(), ctx)?.truthy() {
        Ok(value)
    } else {
        Ok(Value::Drop)
    }
}

fn many(body: &CallBody<'_>, value: Value, ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
    Ok(Value::many(body.call(value, ctx)?))
}

fn once(body: &CallBody<'_>, value: Value, ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
    body.call(value, ctx)?;
    Ok(Value::many(Value::Stream(collect(ctx)?)))
}

fn try_(body: &CallBody<'_>, value: Value, ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
    match body.call(value, ctx) {
        Err(err) if !err.is_interrupt() => {
            debug!(error = %err.exception, "dropping input that raised");
            Ok(Value::Drop)
        }
        result => result,
    }
}

/// Split the result of a literal-mode body into its scope and text.
fn literal_parts(result: &Value) -> Result<(Option<Value>, Rc<str>), FragmentError> {
    match result {
        Value::Str(text) => Ok((None, Rc::clone(text))),
        Value::List(parts) => match parts.as_slice() {
            [scope @ Value::Dict(_), Value::Str(text)] => Ok((Some(scope.clone()), Rc::clone(text))),
            _ => Err(literal_mismatch(result)),
        },
        other => Err(literal_mismatch(other)),
    }
}

fn literal_mismatch(found: &Value) -> FragmentError {
    FragmentError::new(
        ExceptionKind::TypeError,
        format!("expected a literal fragment, got '{}'", found.type_name()),
    )
}

fn format(body: &CallBody<'_>, value: Value, ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
    let (scope, template) = literal_parts(&body.call(value.clone(), ctx)?)?;
    let positional = match &value {
        Value::List(items) => items.as_ref().clone(),
        other => vec![other.clone()],
    };
    let named = |name: &str| match &scope {
        Some(Value::Dict(entries)) => entries.get(name).cloned(),
        _ => None,
    };
    Ok(Value::from(interpolate(&template, &positional, &named)?))
}

/// `str.format`-style interpolation: `{}` and `{0}` take positional
/// arguments, `{name}` looks up a name, `{{` and `}}` are literal braces.
pub(crate) fn interpolate(
    template: &str,
    positional: &[Value],
    named: &dyn Fn(&str) -> Option<Value>,
) -> Result<String, FragmentError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_auto = 0;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err(value_error("expected '}' before end of string")),
                    }
                }
                let value = if field.is_empty() {
                    next_auto += 1;
                    positional_arg(positional, next_auto - 1)?
                } else if let Ok(i) = field.parse::<usize>() {
                    positional_arg(positional, i)?
                } else if field.contains(':') || field.contains('!') {
                    return Err(value_error(format!("unsupported format field '{field}'")));
                } else {
                    named(&field).ok_or_else(|| key_error(&field))?
                };
                out.push_str(&value.to_string());
            }
            '}' => return Err(value_error("Single '}' encountered in format string")),
            c => out.push(c),
        }
    }
    Ok(out)
}

fn positional_arg(args: &[Value], i: usize) -> Result<Value, FragmentError> {
    args.get(i).cloned().ok_or_else(|| {
        index_error(format!(
            "Replacement index {i} out of range for positional args tuple"
        ))
    })
}

/// Anchored match of the element against a pattern given literally.
struct RegexMatch;

impl Decorator for RegexMatch {
    /// The last compiled pattern.
    type Prepared = RefCell<Option<(Rc<str>, Regex)>>;

    fn prepare(&self, _body: &dyn Body, _args: &[String]) -> Result<Self::Prepared, FragmentError> {
        Ok(RefCell::new(None))
    }

    fn call(
        &self,
        body: &CallBody<'_>,
        value: Value,
        ctx: Option<&IterContext>,
        cache: &Self::Prepared,
    ) -> Result<Value, FragmentError> {
        let (_, pattern) = literal_parts(&body.call(value.clone(), ctx)?)?;
        let regex = {
            let mut cache = cache.borrow_mut();
            match cache.as_ref() {
                Some((cached, regex)) if *cached == pattern => regex.clone(),
                _ => {
                    let regex = Regex::new(&format!(r"\A(?:{pattern})")).map_err(|err| {
                        value_error(format!("invalid regular expression: {err}"))
                    })?;
                    *cache = Some((pattern, regex.clone()));
                    regex
                }
            }
        };
        let haystack = value.to_string();
        let Some(captures) = regex.captures(&haystack) else {
            return Ok(Value::None);
        };
        if captures.len() == 1 {
            return Ok(Value::list(vec![Value::from(&captures[0])]));
        }
        Ok(Value::list(captures.iter().skip(1).map(|group| match group {
            Some(m) => Value::from(m.as_str()),
            None => Value::None,
        })))
    }
}

/// Evaluate the body with the element's entries as its names.
struct Keywords;

impl Decorator for Keywords {
    type Prepared = Rc<dyn Rescope>;

    fn prepare(&self, body: &dyn Body, _args: &[String]) -> Result<Self::Prepared, FragmentError> {
        body.scope().ok_or_else(|| {
            value_error("keywords can only decorate fragments that evaluate in a namespace")
        })
    }

    fn call(
        &self,
        body: &CallBody<'_>,
        value: Value,
        ctx: Option<&IterContext>,
        scope: &Self::Prepared,
    ) -> Result<Value, FragmentError> {
        scope.rescope(Some(&value))?;
        let result = body.call(value, ctx);
        scope.rescope(None)?;
        result
    }
}

/// Which part of a value `focus` and `magnify` operate on.
#[derive(Debug, Clone, PartialEq)]
pub enum FocusPath {
    Index(i64),
    Key(String),
    Slice(Option<i64>, Option<i64>, Option<i64>),
}

impl FocusPath {
    /// An integer is an index, `.name` or any other text is a key, and
    /// `start:stop[:step]` is a slice.
    pub fn parse(text: &str) -> Result<Self, FragmentError> {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(FocusPath::Index(i));
        }
        if let Some(key) = text.strip_prefix('.') {
            return Ok(FocusPath::Key(key.to_string()));
        }
        if text.contains(':') {
            let parts: Vec<&str> = text.split(':').collect();
            if parts.len() > 3 {
                return Err(value_error(format!("invalid slice '{text}'")));
            }
            let bound = |part: Option<&&str>| -> Result<Option<i64>, FragmentError> {
                match part.map(|p| p.trim()) {
                    None | Some("") => Ok(None),
                    Some(p) => p
                        .parse()
                        .map(Some)
                        .map_err(|_| value_error(format!("invalid slice '{text}'"))),
                }
            };
            return Ok(FocusPath::Slice(
                bound(parts.first())?,
                bound(parts.get(1))?,
                bound(parts.get(2))?,
            ));
        }
        Ok(FocusPath::Key(text.to_string()))
    }

    pub fn get(&self, value: &Value) -> Result<Value, FragmentError> {
        match self {
            FocusPath::Index(i) => value.get_item(&Value::Int(*i)),
            FocusPath::Key(key) => value.get_item(&Value::from(key.as_str())),
            FocusPath::Slice(start, stop, step) => value.get_slice(*start, *stop, *step),
        }
    }

    pub fn set(&self, value: &Value, new: Value) -> Result<Value, FragmentError> {
        match self {
            FocusPath::Index(i) => value.with_item(&Value::Int(*i), new),
            FocusPath::Key(key) => value.with_item(&Value::from(key.as_str()), new),
            FocusPath::Slice(start, stop, step) => value.with_slice(*start, *stop, *step, new),
        }
    }
}

struct Focus {
    magnify: bool,
}

impl Decorator for Focus {
    type Prepared = FocusPath;

    fn prepare(&self, _body: &dyn Body, args: &[String]) -> Result<FocusPath, FragmentError> {
        match args {
            [path] => FocusPath::parse(path),
            _ => Err(value_error("focus takes exactly one path")),
        }
    }

    fn call(
        &self,
        body: &CallBody<'_>,
        value: Value,
        ctx: Option<&IterContext>,
        path: &FocusPath,
    ) -> Result<Value, FragmentError> {
        let item = path.get(&value)?;
        let result = body.call(item, ctx)?;
        if self.magnify {
            Ok(result)
        } else {
            path.set(&value, result)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Chain, FnBody};
    use pretty_assertions::assert_eq;

    fn body<F>(f: F) -> Rc<dyn Body>
    where
        F: Fn(Value) -> Result<Value, FragmentError> + 'static,
    {
        Rc::new(FnBody::plain(f))
    }

    fn bind(alias: &str, args: &[&str], inner: Rc<dyn Body>) -> Rc<dyn Body> {
        let registry = Registry::builtin();
        let def = registry.lookup(alias).unwrap();
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        def.bind(inner, &args).unwrap()
    }

    fn run(body: Rc<dyn Body>, input: Vec<Value>) -> Result<Vec<Value>, FragmentError> {
        let chain = Chain::new(vec![Box::new(crate::core::Fragment::new(body))]);
        chain.apply(input).collect()
    }

    fn ints(range: std::ops::Range<i64>) -> Vec<Value> {
        range.map(Value::Int).collect()
    }

    #[test]
    fn test_filter() {
        let even = bind("-f", &[], body(|v| Ok(Value::Bool(v.as_int().unwrap() % 2 == 0))));
        assert_eq!(run(even, ints(0..6)).unwrap(), vec![Value::Int(0), Value::Int(2), Value::Int(4)]);
    }

    #[test]
    fn test_many() {
        let dup = bind("--many", &[], body(|v| Ok(Value::list(vec![v.clone(), v]))));
        assert_eq!(
            run(dup, ints(1..4)).unwrap(),
            vec![1, 1, 2, 2, 3, 3].into_iter().map(Value::Int).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_accumulate() {
        let total = bind(
            "-a",
            &[],
            body(|v| {
                let sum: i64 = v.to_vec()?.iter().filter_map(Value::as_int).sum();
                Ok(Value::Int(sum))
            }),
        );
        assert_eq!(run(total, ints(1..5)).unwrap(), vec![Value::Int(10)]);
    }

    #[test]
    fn test_callable() {
        let double = crate::value::Function::new("double", |args, _| {
            Ok(Value::Int(args[0].as_int().unwrap() * 2))
        });
        let call = bind("-c", &[], body(move |_| Ok(Value::Func(double.clone()))));
        assert_eq!(run(call, ints(1..3)).unwrap(), vec![Value::Int(2), Value::Int(4)]);
    }

    #[test]
    fn test_callable_not_callable() {
        let call = bind("-c", &[], body(|_| Ok(Value::None)));
        let err = run(call, vec![Value::None]).unwrap_err();
        assert_eq!(err.exception.message, "'NoneType' object is not callable");
        assert!(err.frames().any(|f| matches!(
            f,
            Frame::Decorator { name, .. } if name == "spy::decorators::callable"
        )));
    }

    #[test]
    fn test_once_runs_body_once() {
        let calls = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&calls);
        let once = bind(
            "--once",
            &[],
            body(move |v| {
                *counter.borrow_mut() += 1;
                Ok(v)
            }),
        );
        assert_eq!(run(once, ints(0..4)).unwrap(), ints(0..4));
        assert_eq!(*calls.borrow(), 1);
    }

    #[test]
    fn test_try_swallows_errors() {
        let checked = bind(
            "-t",
            &[],
            body(|v| match v.as_int() {
                Some(1) => Err(FragmentError::new(ExceptionKind::ValueError, "one")),
                _ => Ok(v),
            }),
        );
        assert_eq!(run(checked, ints(0..3)).unwrap(), vec![Value::Int(0), Value::Int(2)]);
    }

    #[test]
    fn test_try_never_swallows_interrupt() {
        let checked = bind(
            "-t",
            &[],
            body(|_| Err(FragmentError::new(ExceptionKind::KeyboardInterrupt, ""))),
        );
        let err = run(checked, ints(0..3)).unwrap_err();
        assert!(err.is_interrupt());
    }

    #[test]
    fn test_format_named_and_positional() {
        let scope = Value::dict(vec![("name".to_string(), Value::from("world"))]);
        let template = Value::list(vec![scope, Value::from("{name}: {0}-{1} {{ok}}")]);
        let fmt = bind("-i", &[], body(move |_| Ok(template.clone())));
        let input = vec![Value::list(vec![Value::Int(1), Value::Int(2)])];
        assert_eq!(run(fmt, input).unwrap(), vec![Value::from("world: 1-2 {ok}")]);
    }

    #[test]
    fn test_format_missing_name() {
        let fmt = bind("-i", &[], body(|_| Ok(Value::from("{missing}"))));
        let err = run(fmt, vec![Value::None]).unwrap_err();
        assert_eq!(err.kind(), ExceptionKind::KeyError);
        assert_eq!(err.exception.message, "'missing'");
    }

    #[test]
    fn test_regex_groups() {
        let re = bind("-R", &[], body(|_| Ok(Value::from(r"(\w+)=(\d+)?"))));
        let out = run(
            re,
            vec![Value::from("a=1"), Value::from("b="), Value::from("=x")],
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                Value::list(vec![Value::from("a"), Value::from("1")]),
                Value::list(vec![Value::from("b"), Value::None]),
                Value::None,
            ]
        );
    }

    #[test]
    fn test_regex_is_anchored() {
        let re = bind("-R", &[], body(|_| Ok(Value::from("b"))));
        let out = run(re, vec![Value::from("abc"), Value::from("bcd")]).unwrap();
        assert_eq!(out, vec![Value::None, Value::list(vec![Value::from("b")])]);
    }

    #[test]
    fn test_keywords_requires_rescope() {
        let def = Registry::builtin().lookup("-k").unwrap();
        let err = def.bind(body(Ok), &[]).err().unwrap();
        assert_eq!(err.kind(), ExceptionKind::ValueError);
    }

    #[test]
    fn test_focus_and_magnify() {
        let upper = || body(|v| Ok(Value::from(v.to_string().to_uppercase())));
        let input = || vec![Value::list(vec![Value::from("a"), Value::from("b")])];

        let focus = bind("-o", &["1"], upper());
        assert_eq!(
            run(focus, input()).unwrap(),
            vec![Value::list(vec![Value::from("a"), Value::from("B")])]
        );

        let magnify = bind("-O", &["-1"], upper());
        assert_eq!(run(magnify, input()).unwrap(), vec![Value::from("B")]);

        let sliced = bind("-o", &["1:"], body(|_| Ok(Value::from("XYZ"))));
        assert_eq!(
            run(sliced, vec![Value::from("abc")]).unwrap(),
            vec![Value::from("aXYZ")]
        );
    }

    #[test]
    fn test_focus_path_parse() {
        assert_eq!(FocusPath::parse("-2").unwrap(), FocusPath::Index(-2));
        assert_eq!(FocusPath::parse(".foo").unwrap(), FocusPath::Key("foo".into()));
        assert_eq!(FocusPath::parse("foo").unwrap(), FocusPath::Key("foo".into()));
        assert_eq!(
            FocusPath::parse("1::2").unwrap(),
            FocusPath::Slice(Some(1), None, Some(2))
        );
        assert!(FocusPath::parse("a:b").is_err());
    }

    #[test]
    fn test_bind_checks_arity() {
        let def = Registry::builtin().lookup("--focus").unwrap();
        let err = def.bind(body(Ok), &[]).err().unwrap();
        assert_eq!(err.kind(), ExceptionKind::ValueError);
        assert!(err.exception.message.contains("spy::decorators::focus"));
    }

    fn wrapper(label: &'static str) -> DecoratorDef {
        struct Wrap(&'static str);
        impl Decorator for Wrap {
            type Prepared = ();
            fn prepare(&self, _: &dyn Body, _: &[String]) -> Result<(), FragmentError> {
                Ok(())
            }
            fn call(
                &self,
                body: &CallBody<'_>,
                value: Value,
                ctx: Option<&IterContext>,
                _: &(),
            ) -> Result<Value, FragmentError> {
                Ok(Value::from(format!("{}({})", self.0, body.call(value, ctx)?)))
            }
        }
        DecoratorDef::new(label, &[], "", 0, Wrap(label))
    }

    #[test]
    fn test_first_declared_is_outermost() {
        let bindings = vec![
            Binding::new(Rc::new(wrapper("a")), vec![]),
            Binding::new(Rc::new(wrapper("b")), vec![]),
        ];
        let decorated = decorate(body(Ok), &bindings).unwrap();
        let chain = Chain::new(vec![Box::new(crate::core::Fragment::new(decorated))]);
        let out: Vec<Value> = chain.apply(vec![Value::from("x")]).collect::<Result<_, _>>().unwrap();
        assert_eq!(out, vec![Value::from("a(b(x))")]);
    }

    #[test]
    fn test_decorated_body_keeps_debug_info() {
        let inner = FnBody::plain(Ok).with_debug(DebugInfo::new("Fragment 1", "pipe"));
        let decorated = bind("-f", &[], Rc::new(inner));
        assert_eq!(decorated.debug_info().unwrap().source, "pipe");
    }

    #[test]
    fn test_help_lists_aliases() {
        let help = Registry::builtin().help();
        assert!(help.contains("--accumulate, -a"));
        assert!(help.contains("--focus, -o ARG1"));
    }
}
