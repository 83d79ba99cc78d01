//! Pipeline values.
//!
//! A [`Value`] is what flows between fragments. Besides ordinary data it
//! carries the two control markers of the pipeline: [`Value::Drop`] (emit
//! nothing for this element) and [`Value::Many`] (emit each element of the
//! wrapped iterable instead of one value).

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::core::IterContext;
use crate::error::{
    Exception, ExceptionKind, FragmentError, index_error, key_error, type_error, value_error,
};

/// One item of a lazy [`Stream`].
pub type Item = Result<Value, FragmentError>;

/// A dynamically typed pipeline value.
///
/// Strings, lists and dicts are reference counted, so cloning a value is
/// cheap. Dicts have string keys and iterate in key order.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<Vec<Value>>),
    Dict(Rc<BTreeMap<String, Value>>),
    Stream(Stream),
    Func(Function),
    Module(Rc<Module>),
    /// Emit nothing for the current element.
    Drop,
    /// Emit every element of the wrapped iterable.
    Many(Box<Value>),
}

impl Value {
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Rc::new(items.into_iter().collect()))
    }

    pub fn dict(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Value::Dict(Rc::new(entries.into_iter().collect()))
    }

    pub fn many(inner: Value) -> Self {
        Value::Many(Box::new(inner))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Stream(_) => "iterator",
            Value::Func(_) => "function",
            Value::Module(_) => "module",
            Value::Drop => "Drop",
            Value::Many(_) => "many",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Dict(entries) => !entries.is_empty(),
            _ => true,
        }
    }

    pub fn is_drop(&self) -> bool {
        matches!(self, Value::Drop)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub(crate) fn as_number(&self) -> Option<Number> {
        match self {
            Value::Bool(b) => Some(Number::Int(i64::from(*b))),
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// A lazy stream over the elements of an iterable value.
    ///
    /// Streams are returned as-is (sharing their position), strings iterate
    /// by character and dicts by key.
    pub fn iter(&self) -> Result<Stream, FragmentError> {
        match self {
            Value::List(items) => {
                let items = Rc::clone(items);
                Ok(Stream::new((0..items.len()).map(move |i| Ok(items[i].clone()))))
            }
            Value::Str(s) => Ok(Stream::from_values(
                s.chars().map(Value::from).collect::<Vec<_>>(),
            )),
            Value::Dict(entries) => Ok(Stream::from_values(
                entries
                    .keys()
                    .map(|k| Value::from(k.as_str()))
                    .collect::<Vec<_>>(),
            )),
            Value::Stream(stream) => Ok(stream.clone()),
            Value::Many(inner) => inner.iter(),
            other => Err(type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Drain an iterable value into a vector.
    pub fn to_vec(&self) -> Result<Vec<Value>, FragmentError> {
        match self {
            Value::List(items) => Ok(items.as_ref().clone()),
            other => other.iter()?.collect(),
        }
    }

    /// Call a function value.
    pub fn call(&self, args: Vec<Value>, ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
        match self {
            Value::Func(f) => f.call(args, ctx),
            other => Err(type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Python-style ordering. Mixed types that have no natural order fail.
    pub fn compare(&self, other: &Value) -> Result<Ordering, FragmentError> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    if x != y {
                        return x.compare(y);
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => Ok(a.partial_cmp(&b).unwrap_or(Ordering::Equal)),
                _ => Err(type_error(format!(
                    "'<' not supported between instances of '{}' and '{}'",
                    self.type_name(),
                    other.type_name()
                ))),
            },
        }
    }

    /// The `repr()` of a value: strings quoted, containers recursive.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => float_repr(*f),
            Value::Str(s) => str_repr(s),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Dict(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", str_repr(k), v.repr()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Stream(_) => "<iterator>".to_string(),
            Value::Func(f) => format!("<function {}>", f.name()),
            Value::Module(m) => format!("<module '{}'>", m.name()),
            Value::Drop => "spy.DROP".to_string(),
            Value::Many(inner) => format!("spy.many({})", inner.repr()),
        }
    }

    /// `value[key]` for lists, strings (integer keys) and dicts (string keys).
    pub fn get_item(&self, key: &Value) -> Result<Value, FragmentError> {
        match (self, key) {
            (Value::Dict(entries), Value::Str(k)) => {
                entries.get(k.as_ref()).cloned().ok_or_else(|| key_error(k))
            }
            (Value::List(items), _) => {
                let i = int_key(self, key)?;
                normalize_index(items.len(), i)
                    .map(|i| items[i].clone())
                    .ok_or_else(|| index_error("list index out of range"))
            }
            (Value::Str(s), _) => {
                let i = int_key(self, key)?;
                let chars: Vec<char> = s.chars().collect();
                normalize_index(chars.len(), i)
                    .map(|i| Value::from(chars[i]))
                    .ok_or_else(|| index_error("string index out of range"))
            }
            (Value::Dict(_), other) => Err(FragmentError::new(ExceptionKind::KeyError, other.repr())),
            (other, _) => Err(type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    /// `value[start:stop:step]` for lists and strings.
    pub fn get_slice(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> Result<Value, FragmentError> {
        match self {
            Value::List(items) => {
                let picked = slice_indices(items.len(), start, stop, step)?;
                Ok(Value::list(picked.into_iter().map(|i| items[i].clone())))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked = slice_indices(chars.len(), start, stop, step)?;
                Ok(Value::from(picked.into_iter().map(|i| chars[i]).collect::<String>()))
            }
            other => Err(type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    /// A copy of `self` with `self[key]` replaced by `new`.
    pub fn with_item(&self, key: &Value, new: Value) -> Result<Value, FragmentError> {
        match (self, key) {
            (Value::Dict(entries), Value::Str(k)) => {
                let mut entries = entries.as_ref().clone();
                entries.insert(k.to_string(), new);
                Ok(Value::Dict(Rc::new(entries)))
            }
            (Value::List(items), _) => {
                let i = int_key(self, key)?;
                let i = normalize_index(items.len(), i)
                    .ok_or_else(|| index_error("list assignment index out of range"))?;
                let mut items = items.as_ref().clone();
                items[i] = new;
                Ok(Value::List(Rc::new(items)))
            }
            (Value::Str(s), _) => {
                let i = int_key(self, key)?;
                let replacement = new.as_str().ok_or_else(|| {
                    type_error(format!(
                        "can only replace a character with a str, not '{}'",
                        new.type_name()
                    ))
                })?;
                let chars: Vec<char> = s.chars().collect();
                let i = normalize_index(chars.len(), i)
                    .ok_or_else(|| index_error("string index out of range"))?;
                let mut out: String = chars[..i].iter().collect();
                out.push_str(replacement);
                out.extend(&chars[i + 1..]);
                Ok(Value::from(out))
            }
            (other, _) => Err(type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    /// A copy of `self` with the slice `[start:stop:step]` replaced by `new`.
    pub fn with_slice(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
        new: Value,
    ) -> Result<Value, FragmentError> {
        match self {
            Value::List(items) => {
                let replacement = new.to_vec()?;
                let spliced = splice(items.as_ref().clone(), (start, stop, step), replacement)?;
                Ok(Value::list(spliced))
            }
            Value::Str(s) => {
                let replacement = new.as_str().ok_or_else(|| {
                    type_error(format!(
                        "can only assign a str to a str slice, not '{}'",
                        new.type_name()
                    ))
                })?;
                let chars: Vec<char> = s.chars().collect();
                let spliced = splice(chars, (start, stop, step), replacement.chars().collect())?;
                Ok(Value::from(spliced.into_iter().collect::<String>()))
            }
            other => Err(type_error(format!(
                "'{}' object does not support slice assignment",
                other.type_name()
            ))),
        }
    }
}

fn int_key(container: &Value, key: &Value) -> Result<i64, FragmentError> {
    key.as_int().ok_or_else(|| {
        type_error(format!(
            "{} indices must be integers, not {}",
            container.type_name(),
            key.type_name()
        ))
    })
}

/// Resolve a possibly negative index against `len`.
pub(crate) fn normalize_index(len: usize, index: i64) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { index.saturating_add(len) } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

/// Resolved `(start, stop, step)` of `[start:stop:step]` over a sequence of
/// `len`, with Python's clamping rules.
fn slice_bounds(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<(i64, i64, i64), FragmentError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(value_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let (lo, hi) = if step > 0 { (0, len) } else { (-1, len - 1) };
    let bound = |v: Option<i64>, default: i64| match v {
        None => default,
        Some(v) if v < 0 => v.saturating_add(len).clamp(lo, hi),
        Some(v) => v.clamp(lo, hi),
    };
    Ok(if step > 0 {
        (bound(start, 0), bound(stop, len), step)
    } else {
        (bound(start, len - 1), bound(stop, -1), step)
    })
}

/// The positions selected by `[start:stop:step]` over a sequence of `len`.
pub(crate) fn slice_indices(
    len: usize,
    start: Option<i64>,
    stop: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, FragmentError> {
    let (start, stop, step) = slice_bounds(len, start, stop, step)?;
    let mut picked = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        picked.push(i as usize);
        match i.checked_add(step) {
            Some(next) => i = next,
            None => break,
        }
    }
    Ok(picked)
}

/// Replace the slice `[start:stop:step]` of `items` with `replacement`.
///
/// Contiguous slices may change length; extended slices must be replaced
/// element for element.
fn splice<T: Clone>(
    mut items: Vec<T>,
    (start, stop, step): (Option<i64>, Option<i64>, Option<i64>),
    replacement: Vec<T>,
) -> Result<Vec<T>, FragmentError> {
    if step.unwrap_or(1) == 1 {
        let (start, stop, _) = slice_bounds(items.len(), start, stop, step)?;
        let (start, stop) = (start as usize, stop.max(start) as usize);
        items.splice(start..stop, replacement);
        return Ok(items);
    }
    let picked = slice_indices(items.len(), start, stop, step)?;
    if picked.len() != replacement.len() {
        return Err(value_error(format!(
            "attempt to assign sequence of size {} to extended slice of size {}",
            replacement.len(),
            picked.len()
        )));
    }
    for (i, v) in picked.into_iter().zip(replacement) {
        items[i] = v;
    }
    Ok(items)
}

fn float_repr(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{f:.1}")
    } else {
        format!("{f}")
    }
}

fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// `str()` of a value: strings unquoted, everything else as [`Value::repr`].
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => f.write_str(&other.repr()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) | (Value::Drop, Value::Drop) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Stream(a), Value::Stream(b)) => a.ptr_eq(b),
            (Value::Func(a), Value::Func(b)) => a.ptr_eq(b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Many(a), Value::Many(b)) => a == b,
            _ => match (self.as_number(), other.as_number()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::from(c.to_string())
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Rc::new(items))
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Value::list(iter)
    }
}

/// Numeric view of a value, used for mixed int/float arithmetic.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            _ => self.as_f64() == other.as_f64(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(b)),
            _ => self.as_f64().partial_cmp(&other.as_f64()),
        }
    }
}

/// A shared lazy sequence of values.
///
/// Clones share one position, so a stream handed to two consumers is drained
/// by whichever pulls first. Pulling a stream from inside its own production
/// fails with `generator already executing` rather than panicking.
#[derive(Clone)]
pub struct Stream(Rc<RefCell<Box<dyn Iterator<Item = Item>>>>);

impl Stream {
    pub fn new(iter: impl Iterator<Item = Item> + 'static) -> Self {
        Stream(Rc::new(RefCell::new(Box::new(iter))))
    }

    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: 'static,
    {
        Stream::new(values.into_iter().map(Ok))
    }

    pub fn empty() -> Self {
        Stream::new(std::iter::empty())
    }

    pub fn ptr_eq(&self, other: &Stream) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Iterator for Stream {
    type Item = Item;

    fn next(&mut self) -> Option<Item> {
        match self.0.try_borrow_mut() {
            Ok(mut inner) => inner.next(),
            Err(_) => Some(Err(value_error("generator already executing"))),
        }
    }
}

/// Signature of a callable value. The iteration context of the fragment
/// making the call is passed along explicitly.
pub type NativeFn = dyn Fn(Vec<Value>, Option<&IterContext>) -> Result<Value, FragmentError>;

/// A callable value: a builtin, a bound method or a lambda.
#[derive(Clone)]
pub struct Function {
    name: Rc<str>,
    call: Rc<NativeFn>,
}

impl Function {
    pub fn new(
        name: impl Into<Rc<str>>,
        call: impl Fn(Vec<Value>, Option<&IterContext>) -> Result<Value, FragmentError> + 'static,
    ) -> Self {
        Function {
            name: name.into(),
            call: Rc::new(call),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, args: Vec<Value>, ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
        (self.call)(args, ctx)
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Rc::ptr_eq(&self.call, &other.call)
    }
}

/// A named bag of values reachable with attribute syntax (`spy.many`).
pub struct Module {
    name: String,
    members: BTreeMap<String, Value>,
}

impl Module {
    pub fn new(name: impl Into<String>, members: impl IntoIterator<Item = (String, Value)>) -> Self {
        Module {
            name: name.into(),
            members: members.into_iter().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a member.
    ///
    /// A missing member is reported as a forced `ImportError` (no submodule of
    /// that name either) whose cause, the `AttributeError`, is what users see.
    pub fn attr(&self, attr: &str) -> Result<Value, FragmentError> {
        self.members.get(attr).cloned().ok_or_else(|| {
            let missing = Exception::new(
                ExceptionKind::AttributeError,
                format!("module '{}' has no attribute '{attr}'", self.name),
            );
            Exception::new(
                ExceptionKind::ImportError,
                format!("No module named '{}.{attr}'", self.name),
            )
            .caused_by(missing)
            .forced()
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr_strings() {
        assert_eq!(Value::from("abc").repr(), "'abc'");
        assert_eq!(Value::from("it's").repr(), "\"it's\"");
        assert_eq!(Value::from("a\nb").repr(), "'a\\nb'");
        assert_eq!(Value::from("abc").to_string(), "abc");
    }

    #[test]
    fn test_repr_containers() {
        let v = Value::list(vec![Value::Int(1), Value::from("x"), Value::None]);
        assert_eq!(v.repr(), "[1, 'x', None]");
        assert_eq!(v.to_string(), "[1, 'x', None]");

        let d = Value::dict(vec![("foo".to_string(), Value::from("bar"))]);
        assert_eq!(d.repr(), "{'foo': 'bar'}");
        assert_eq!(Value::Float(2.0).repr(), "2.0");
        assert_eq!(Value::Float(0.5).repr(), "0.5");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::from("").truthy());
        assert!(!Value::list(vec![]).truthy());
        assert!(Value::from("x").truthy());
        assert!(Value::Stream(Stream::empty()).truthy());
    }

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::Int(1), Value::from("1"));
    }

    #[test]
    fn test_slice_indices() {
        assert_eq!(slice_indices(5, Some(1), Some(-1), None).unwrap(), vec![1, 2, 3]);
        assert_eq!(slice_indices(5, None, None, Some(-1)).unwrap(), vec![4, 3, 2, 1, 0]);
        assert_eq!(slice_indices(5, Some(1), None, Some(2)).unwrap(), vec![1, 3]);
        assert_eq!(slice_indices(3, Some(10), None, None).unwrap(), Vec::<usize>::new());
        assert!(slice_indices(3, None, None, Some(0)).is_err());
    }

    #[test]
    fn test_slice_extreme_bounds() {
        assert_eq!(slice_indices(3, Some(1), None, Some(i64::MAX)).unwrap(), vec![1]);
        assert_eq!(slice_indices(3, None, None, Some(i64::MIN)).unwrap(), vec![2]);
        assert_eq!(
            Value::from("abc").get_slice(Some(i64::MIN), None, None).unwrap(),
            Value::from("abc")
        );
        assert!(Value::from("abc").get_item(&Value::Int(i64::MIN)).is_err());
    }

    #[test]
    fn test_get_item_and_slice() {
        let v = Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(v.get_item(&Value::Int(-1)).unwrap(), Value::Int(3));
        assert!(v.get_item(&Value::Int(3)).is_err());
        assert_eq!(
            Value::from("hello").get_slice(None, None, Some(-1)).unwrap(),
            Value::from("olleh")
        );
    }

    #[test]
    fn test_with_item_copies() {
        let v = Value::list(vec![Value::Int(1), Value::Int(2)]);
        let w = v.with_item(&Value::Int(0), Value::Int(9)).unwrap();
        assert_eq!(w, Value::list(vec![Value::Int(9), Value::Int(2)]));
        assert_eq!(v, Value::list(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn test_with_slice() {
        let v = Value::from("abcde");
        let w = v
            .with_slice(Some(1), Some(-1), None, Value::from("XY"))
            .unwrap();
        assert_eq!(w, Value::from("aXYe"));

        let l = Value::list((0..6).map(Value::Int));
        let stepped = l
            .with_slice(None, None, Some(2), Value::list(vec![Value::None; 3]))
            .unwrap();
        assert_eq!(
            stepped.repr(),
            "[None, 1, None, 3, None, 5]"
        );
        assert!(l.with_slice(None, None, Some(2), Value::list(vec![])).is_err());
    }

    #[test]
    fn test_iter_shares_stream_position() {
        let stream = Stream::from_values(vec![Value::Int(1), Value::Int(2)]);
        let value = Value::Stream(stream.clone());
        let mut first = value.iter().unwrap();
        assert_eq!(first.next().unwrap().unwrap(), Value::Int(1));
        let rest: Vec<Value> = stream.map(Result::unwrap).collect();
        assert_eq!(rest, vec![Value::Int(2)]);
    }

    #[test]
    fn test_module_attr_is_forced() {
        let module = Module::new("spy", vec![("x".to_string(), Value::Int(1))]);
        assert_eq!(module.attr("x").unwrap(), Value::Int(1));
        let err = module.attr("nope").unwrap_err();
        assert!(err.exception.forced);
        assert_eq!(err.exception.reported().kind, ExceptionKind::AttributeError);
    }

    #[test]
    fn test_compare_mixed_types_fails() {
        assert!(Value::Int(1).compare(&Value::from("a")).is_err());
        assert_eq!(
            Value::Int(1).compare(&Value::Float(1.5)).unwrap(),
            Ordering::Less
        );
    }
}
