//! Builtin functions, methods and modules of the fragment language.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::rc::Rc;

use super::ops;
use super::parser::BinOp;
use crate::core::{IterContext, collect};
use crate::decorators::interpolate;
use crate::error::{ExceptionKind, FragmentError, type_error, value_error};
use crate::value::{Function, Module, Number, Stream, Value};

type BuiltinFn = fn(Vec<Value>, Option<&IterContext>) -> Result<Value, FragmentError>;

fn check_args(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), FragmentError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("exactly {min}")
    } else if max == usize::MAX {
        format!("at least {min}")
    } else {
        format!("from {min} to {max}")
    };
    Err(type_error(format!(
        "{name}() takes {expected} argument(s) ({} given)",
        args.len()
    )))
}

fn int_arg(name: &str, value: &Value) -> Result<i64, FragmentError> {
    value.as_int().ok_or_else(|| {
        type_error(format!(
            "{name}() expected an integer, got '{}'",
            value.type_name()
        ))
    })
}

fn str_arg<'a>(name: &str, value: &'a Value) -> Result<&'a str, FragmentError> {
    value.as_str().ok_or_else(|| {
        type_error(format!(
            "{name}() argument must be str, not {}",
            value.type_name()
        ))
    })
}

/// The builtin function called `name`, if there is one.
pub(crate) fn lookup(name: &str) -> Option<Value> {
    let f: BuiltinFn = match name {
        "len" => len,
        "str" => str,
        "repr" => repr,
        "int" => int,
        "float" => float,
        "bool" => bool,
        "list" => list,
        "reversed" => reversed,
        "sorted" => sorted,
        "sum" => sum,
        "min" => min,
        "max" => max,
        "abs" => abs,
        "range" => range,
        "enumerate" => enumerate,
        "map" => map,
        "filter" => filter,
        "any" => any,
        "all" => all,
        "print" => print,
        _ => return None,
    };
    Some(Value::Func(Function::new(name.to_string(), f)))
}

fn len(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("len", &args, 1, 1)?;
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Dict(entries) => entries.len(),
        other => {
            return Err(type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(n as i64))
}

fn str(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("str", &args, 0, 1)?;
    Ok(Value::from(
        args.first().map(ToString::to_string).unwrap_or_default(),
    ))
}

fn repr(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("repr", &args, 1, 1)?;
    Ok(Value::from(args[0].repr()))
}

fn int(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("int", &args, 0, 2)?;
    let Some(value) = args.first() else {
        return Ok(Value::Int(0));
    };
    let base = args.get(1).map(|b| int_arg("int", b)).transpose()?;
    match (value, base) {
        (Value::Str(s), base) => {
            let base = base.unwrap_or(10);
            if !(2..=36).contains(&base) {
                return Err(value_error("int() base must be >= 2 and <= 36"));
            }
            i64::from_str_radix(&s.trim().replace('_', ""), base as u32)
                .map(Value::Int)
                .map_err(|_| {
                    value_error(format!(
                        "invalid literal for int() with base {base}: {}",
                        value.repr()
                    ))
                })
        }
        (_, Some(_)) => Err(type_error(
            "int() can't convert non-string with explicit base",
        )),
        (Value::Float(f), None) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        (Value::Float(_), None) => Err(FragmentError::new(
            ExceptionKind::OverflowError,
            "cannot convert float infinity to integer",
        )),
        (other, None) => other.as_int().map(Value::Int).ok_or_else(|| {
            type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn float(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("float", &args, 0, 1)?;
    let Some(value) = args.first() else {
        return Ok(Value::Float(0.0));
    };
    match value {
        Value::Str(s) => s.trim().parse().map(Value::Float).map_err(|_| {
            value_error(format!(
                "could not convert string to float: {}",
                value.repr()
            ))
        }),
        other => other
            .as_number()
            .map(|n| Value::Float(n.as_f64()))
            .ok_or_else(|| {
                type_error(format!(
                    "float() argument must be a string or a number, not '{}'",
                    other.type_name()
                ))
            }),
    }
}

fn bool(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("bool", &args, 0, 1)?;
    Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
}

fn list(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("list", &args, 0, 1)?;
    match args.first() {
        Some(value) => Ok(Value::from(value.to_vec()?)),
        None => Ok(Value::list(Vec::new())),
    }
}

fn reversed(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("reversed", &args, 1, 1)?;
    let mut items = args[0].to_vec()?;
    items.reverse();
    Ok(Value::Stream(Stream::from_values(items)))
}

/// Sort with Python ordering, failing on incomparable elements.
pub(crate) fn sort_values(items: &mut [Value]) -> Result<(), FragmentError> {
    let mut failure = None;
    items.sort_by(|a, b| {
        a.compare(b).unwrap_or_else(|err| {
            failure.get_or_insert(err);
            Ordering::Equal
        })
    });
    failure.map_or(Ok(()), Err)
}

fn sorted(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("sorted", &args, 1, 1)?;
    let mut items = args[0].to_vec()?;
    sort_values(&mut items)?;
    Ok(Value::from(items))
}

fn sum(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("sum", &args, 1, 2)?;
    let start = args.get(1).cloned().unwrap_or(Value::Int(0));
    args[0]
        .iter()?
        .try_fold(start, |total, item| ops::binary(BinOp::Add, &total, &item?))
}

fn extreme(name: &str, args: Vec<Value>, wanted: Ordering) -> Result<Value, FragmentError> {
    check_args(name, &args, 1, usize::MAX)?;
    let items = if args.len() == 1 {
        args[0].to_vec()?
    } else {
        args
    };
    let mut items = items.into_iter();
    let Some(mut best) = items.next() else {
        return Err(value_error(format!("{name}() arg is an empty sequence")));
    };
    for item in items {
        if item.compare(&best)? == wanted {
            best = item;
        }
    }
    Ok(best)
}

fn min(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    extreme("min", args, Ordering::Less)
}

fn max(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    extreme("max", args, Ordering::Greater)
}

fn abs(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("abs", &args, 1, 1)?;
    match args[0].as_number() {
        Some(Number::Int(i)) => i.checked_abs().map(Value::Int).ok_or_else(|| {
            FragmentError::new(ExceptionKind::OverflowError, "integer overflow")
        }),
        Some(Number::Float(f)) => Ok(Value::Float(f.abs())),
        None => Err(type_error(format!(
            "bad operand type for abs(): '{}'",
            args[0].type_name()
        ))),
    }
}

fn range(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("range", &args, 1, 3)?;
    let bounds: Vec<i64> = args
        .iter()
        .map(|v| int_arg("range", v))
        .collect::<Result<_, _>>()?;
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step, ..] => (*start, *stop, *step),
        [] => (0, 0, 1),
    };
    if step == 0 {
        return Err(value_error("range() arg 3 must not be zero"));
    }
    let mut i = start;
    Ok(Value::Stream(Stream::new(std::iter::from_fn(move || {
        if (step > 0 && i < stop) || (step < 0 && i > stop) {
            let current = i;
            i = i.saturating_add(step);
            Some(Ok(Value::Int(current)))
        } else {
            None
        }
    }))))
}

fn enumerate(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("enumerate", &args, 1, 2)?;
    let start = args.get(1).map(|v| int_arg("enumerate", v)).transpose()?;
    let items = args[0].iter()?;
    Ok(Value::Stream(Stream::new(items.zip(start.unwrap_or(0)..).map(
        |(item, i)| item.map(|v| Value::list(vec![Value::Int(i), v])),
    ))))
}

fn map(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("map", &args, 2, 2)?;
    let f = args[0].clone();
    let items = args[1].iter()?;
    Ok(Value::Stream(Stream::new(
        items.map(move |item| f.call(vec![item?], None)),
    )))
}

fn filter(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("filter", &args, 2, 2)?;
    let f = args[0].clone();
    let items = args[1].iter()?;
    Ok(Value::Stream(Stream::new(items.filter_map(move |item| {
        let keep = item.and_then(|item| {
            let keep = match &f {
                Value::None => item.truthy(),
                f => f.call(vec![item.clone()], None)?.truthy(),
            };
            Ok(keep.then_some(item))
        });
        keep.transpose()
    }))))
}

fn any(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("any", &args, 1, 1)?;
    for item in args[0].iter()? {
        if item?.truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn all(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("all", &args, 1, 1)?;
    for item in args[0].iter()? {
        if !item?.truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn print(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    let line: Vec<String> = args.iter().map(ToString::to_string).collect();
    writeln!(io::stdout(), "{}", line.join(" "))
        .map_err(|err| FragmentError::new(ExceptionKind::OSError, err.to_string()))?;
    Ok(Value::None)
}

fn member(module: &str, name: &str, f: BuiltinFn) -> (String, Value) {
    (
        name.to_string(),
        Value::Func(Function::new(format!("{module}.{name}"), f)),
    )
}

/// Modules importable by name in every namespace.
pub(crate) fn modules() -> Vec<Rc<Module>> {
    let spy = Module::new(
        "spy",
        vec![
            member("spy", "many", spy_many),
            member("spy", "collect", spy_collect),
            ("DROP".to_string(), Value::Drop),
        ],
    );
    let itertools = Module::new(
        "itertools",
        vec![
            member("itertools", "islice", islice),
            member("itertools", "chain", chain),
        ],
    );
    vec![Rc::new(spy), Rc::new(itertools)]
}

fn spy_many(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("many", &args, 1, 1)?;
    Ok(Value::many(args.into_iter().next().unwrap_or(Value::None)))
}

fn spy_collect(args: Vec<Value>, ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("collect", &args, 0, 0)?;
    Ok(Value::Stream(collect(ctx)?))
}

fn islice(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    check_args("islice", &args, 2, 4)?;
    let bound = |v: &Value| -> Result<Option<usize>, FragmentError> {
        match v {
            Value::None => Ok(None),
            other => other
                .as_int()
                .and_then(|i| usize::try_from(i).ok())
                .map(Some)
                .ok_or_else(|| {
                    value_error(
                        "Indices for islice() must be None or an integer: 0 <= x <= sys.maxsize.",
                    )
                }),
        }
    };
    let (start, stop, step) = match args.len() {
        2 => (0, bound(&args[1])?, 1),
        _ => (
            bound(&args[1])?.unwrap_or(0),
            bound(&args[2])?,
            args.get(3).map(bound).transpose()?.flatten().unwrap_or(1),
        ),
    };
    if step == 0 {
        return Err(value_error(
            "Step for islice() must be a positive integer or None.",
        ));
    }
    let mut stream = args[0].iter()?;
    let mut seen = 0;
    let mut wanted = start;
    Ok(Value::Stream(Stream::new(std::iter::from_fn(move || {
        loop {
            // Never pull past `stop`: the rest stays with the source.
            if stop.is_some_and(|stop| wanted >= stop) {
                return None;
            }
            let item = stream.next()?;
            let index = seen;
            seen += 1;
            if index == wanted {
                wanted += step;
                return Some(item);
            }
            if let Err(err) = item {
                return Some(Err(err));
            }
        }
    }))))
}

fn chain(args: Vec<Value>, _: Option<&IterContext>) -> Result<Value, FragmentError> {
    let streams = args
        .iter()
        .map(Value::iter)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::Stream(Stream::new(streams.into_iter().flatten())))
}

type StrMethod = fn(&str, &[Value]) -> Result<Value, FragmentError>;
type ListMethod = fn(&[Value], &[Value]) -> Result<Value, FragmentError>;
type DictMethod = fn(&BTreeMap<String, Value>, &[Value]) -> Result<Value, FragmentError>;
type Bound = Box<dyn Fn(&[Value]) -> Result<Value, FragmentError>>;

/// `receiver.name`, as a function bound to the receiver.
pub(crate) fn method(receiver: &Value, name: &str) -> Result<Value, FragmentError> {
    let bound: Option<Bound> = match receiver {
        Value::Str(s) => str_method(name).map(|f| {
            let s = Rc::clone(s);
            Box::new(move |args: &[Value]| f(&s, args)) as Bound
        }),
        Value::List(items) => list_method(name).map(|f| {
            let items = Rc::clone(items);
            Box::new(move |args: &[Value]| f(&items, args)) as Bound
        }),
        Value::Dict(entries) => dict_method(name).map(|f| {
            let entries = Rc::clone(entries);
            Box::new(move |args: &[Value]| f(&entries, args)) as Bound
        }),
        _ => None,
    };
    let bound = bound.ok_or_else(|| {
        FragmentError::new(
            ExceptionKind::AttributeError,
            format!(
                "'{}' object has no attribute '{name}'",
                receiver.type_name()
            ),
        )
    })?;
    Ok(Value::Func(Function::new(
        format!("{}.{name}", receiver.type_name()),
        move |args, _| bound(&args),
    )))
}

fn str_method(name: &str) -> Option<StrMethod> {
    let f: StrMethod = match name {
        "upper" => |s, args| {
            check_args("upper", args, 0, 0)?;
            Ok(Value::from(s.to_uppercase()))
        },
        "lower" => |s, args| {
            check_args("lower", args, 0, 0)?;
            Ok(Value::from(s.to_lowercase()))
        },
        "strip" => |s, args| strip("strip", s, args, Side::Both),
        "lstrip" => |s, args| strip("lstrip", s, args, Side::Start),
        "rstrip" => |s, args| strip("rstrip", s, args, Side::End),
        "split" => split,
        "splitlines" => |s, args| {
            check_args("splitlines", args, 0, 0)?;
            Ok(Value::list(s.lines().map(Value::from)))
        },
        "join" => join,
        "replace" => replace,
        "startswith" => |s, args| affix("startswith", s, args, |s, p| s.starts_with(p)),
        "endswith" => |s, args| affix("endswith", s, args, |s, p| s.ends_with(p)),
        "find" => |s, args| {
            check_args("find", args, 1, 1)?;
            let sub = str_arg("find", &args[0])?;
            let index = s.find(sub).map(|b| s[..b].chars().count() as i64);
            Ok(Value::Int(index.unwrap_or(-1)))
        },
        "count" => |s, args| {
            check_args("count", args, 1, 1)?;
            let sub = str_arg("count", &args[0])?;
            let n = if sub.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(sub).count()
            };
            Ok(Value::Int(n as i64))
        },
        "title" => |s, args| {
            check_args("title", args, 0, 0)?;
            Ok(Value::from(title(s)))
        },
        "format" => |s, args| Ok(Value::from(interpolate(s, args, &|_| None)?)),
        "isdigit" => |s, args| {
            check_args("isdigit", args, 0, 0)?;
            Ok(Value::Bool(
                !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
            ))
        },
        _ => return None,
    };
    Some(f)
}

#[derive(Clone, Copy)]
enum Side {
    Both,
    Start,
    End,
}

fn strip(name: &str, s: &str, args: &[Value], side: Side) -> Result<Value, FragmentError> {
    check_args(name, args, 0, 1)?;
    let chars: Option<Vec<char>> = match args.first() {
        None | Some(Value::None) => None,
        Some(v) => Some(str_arg(name, v)?.chars().collect()),
    };
    let strippable = |c: char| match &chars {
        Some(chars) => chars.contains(&c),
        None => c.is_whitespace(),
    };
    let stripped = match side {
        Side::Both => s.trim_matches(strippable),
        Side::Start => s.trim_start_matches(strippable),
        Side::End => s.trim_end_matches(strippable),
    };
    Ok(Value::from(stripped))
}

fn split(s: &str, args: &[Value]) -> Result<Value, FragmentError> {
    check_args("split", args, 0, 2)?;
    let max = match args.get(1) {
        Some(v) => usize::try_from(int_arg("split", v)?).ok(),
        None => None,
    };
    let parts: Vec<Value> = match args.first() {
        None | Some(Value::None) => split_whitespace(s, max).into_iter().map(Value::from).collect(),
        Some(sep) => {
            let sep = str_arg("split", sep)?;
            if sep.is_empty() {
                return Err(value_error("empty separator"));
            }
            match max {
                Some(max) => s.splitn(max + 1, sep).map(Value::from).collect(),
                None => s.split(sep).map(Value::from).collect(),
            }
        }
    };
    Ok(Value::from(parts))
}

fn split_whitespace(s: &str, max: Option<usize>) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if max.is_some_and(|max| parts.len() >= max) {
            parts.push(rest);
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(rest);
                break;
            }
        }
    }
    parts
}

fn join(s: &str, args: &[Value]) -> Result<Value, FragmentError> {
    check_args("join", args, 1, 1)?;
    let mut parts = Vec::new();
    for (i, item) in args[0].iter()?.enumerate() {
        match item? {
            Value::Str(part) => parts.push(part),
            other => {
                return Err(type_error(format!(
                    "sequence item {i}: expected str instance, {} found",
                    other.type_name()
                )));
            }
        }
    }
    let parts: Vec<&str> = parts.iter().map(|p| p.as_ref()).collect();
    Ok(Value::from(parts.join(s)))
}

fn replace(s: &str, args: &[Value]) -> Result<Value, FragmentError> {
    check_args("replace", args, 2, 3)?;
    let old = str_arg("replace", &args[0])?;
    let new = str_arg("replace", &args[1])?;
    let replaced = match args.get(2).map(|v| int_arg("replace", v)).transpose()? {
        Some(count) if count >= 0 => s.replacen(old, new, count as usize),
        _ => s.replace(old, new),
    };
    Ok(Value::from(replaced))
}

fn affix(
    name: &str,
    s: &str,
    args: &[Value],
    test: fn(&str, &str) -> bool,
) -> Result<Value, FragmentError> {
    check_args(name, args, 1, 1)?;
    let found = match &args[0] {
        Value::List(options) => {
            let mut found = false;
            for option in options.iter() {
                found |= test(s, str_arg(name, option)?);
            }
            found
        }
        other => test(s, str_arg(name, other)?),
    };
    Ok(Value::Bool(found))
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_cased = false;
    for c in s.chars() {
        if previous_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_cased = c.is_alphabetic();
    }
    out
}

fn list_method(name: &str) -> Option<ListMethod> {
    let f: ListMethod = match name {
        "index" => |items, args| {
            check_args("index", args, 1, 1)?;
            items
                .iter()
                .position(|v| *v == args[0])
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| value_error(format!("{} is not in list", args[0].repr())))
        },
        "count" => |items, args| {
            check_args("count", args, 1, 1)?;
            Ok(Value::Int(
                items.iter().filter(|v| **v == args[0]).count() as i64,
            ))
        },
        "copy" => |items, args| {
            check_args("copy", args, 0, 0)?;
            Ok(Value::list(items.iter().cloned()))
        },
        _ => return None,
    };
    Some(f)
}

fn dict_method(name: &str) -> Option<DictMethod> {
    let f: DictMethod = match name {
        "keys" => |entries, args| {
            check_args("keys", args, 0, 0)?;
            Ok(Value::list(entries.keys().map(|k| Value::from(k.as_str()))))
        },
        "values" => |entries, args| {
            check_args("values", args, 0, 0)?;
            Ok(Value::list(entries.values().cloned()))
        },
        "items" => |entries, args| {
            check_args("items", args, 0, 0)?;
            Ok(Value::list(entries.iter().map(|(k, v)| {
                Value::list(vec![Value::from(k.as_str()), v.clone()])
            })))
        },
        "get" => |entries, args| {
            check_args("get", args, 1, 2)?;
            let found = args[0].as_str().and_then(|k| entries.get(k)).cloned();
            Ok(found.unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        },
        _ => return None,
    };
    Some(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, FragmentError> {
        lookup(name).unwrap().call(args, None)
    }

    fn call_method(receiver: Value, name: &str, args: Vec<Value>) -> Result<Value, FragmentError> {
        method(&receiver, name)?.call(args, None)
    }

    fn strs(items: &[&str]) -> Value {
        Value::list(items.iter().map(|s| Value::from(*s)))
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", vec![Value::from(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(call("int", vec![Value::from("ff"), Value::Int(16)]).unwrap(), Value::Int(255));
        assert_eq!(call("int", vec![Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        assert_eq!(
            call("int", vec![Value::from("x")]).unwrap_err().exception.message,
            "invalid literal for int() with base 10: 'x'"
        );
        assert_eq!(call("float", vec![Value::from("1.5")]).unwrap(), Value::Float(1.5));
        assert_eq!(call("str", vec![Value::Int(3)]).unwrap(), Value::from("3"));
        assert_eq!(call("repr", vec![Value::from("a")]).unwrap(), Value::from("'a'"));
    }

    #[test]
    fn test_len_checks_arguments() {
        assert_eq!(call("len", vec![Value::from("héllo")]).unwrap(), Value::Int(5));
        let err = call("len", vec![]).unwrap_err();
        assert_eq!(err.kind(), ExceptionKind::TypeError);
        assert!(call("len", vec![Value::Int(1)]).is_err());
    }

    #[test]
    fn test_aggregates() {
        let nums = Value::list(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(call("sum", vec![nums.clone()]).unwrap(), Value::Int(6));
        assert_eq!(call("min", vec![nums.clone()]).unwrap(), Value::Int(1));
        assert_eq!(call("max", vec![Value::Int(4), Value::Int(9)]).unwrap(), Value::Int(9));
        assert_eq!(
            call("sorted", vec![nums.clone()]).unwrap(),
            Value::list(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
        assert!(call("min", vec![Value::list(vec![])]).is_err());
        assert!(call("sorted", vec![Value::list(vec![Value::Int(1), Value::from("a")])]).is_err());
        assert_eq!(call("any", vec![nums.clone()]).unwrap(), Value::Bool(true));
        assert_eq!(
            call("all", vec![Value::list(vec![Value::Int(1), Value::Int(0)])]).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_range_and_enumerate() {
        let r = call("range", vec![Value::Int(5), Value::Int(0), Value::Int(-2)]).unwrap();
        assert_eq!(r.to_vec().unwrap(), vec![Value::Int(5), Value::Int(3), Value::Int(1)]);
        let e = call("enumerate", vec![strs(&["a", "b"]), Value::Int(1)]).unwrap();
        assert_eq!(
            e.to_vec().unwrap(),
            vec![
                Value::list(vec![Value::Int(1), Value::from("a")]),
                Value::list(vec![Value::Int(2), Value::from("b")]),
            ]
        );
    }

    #[test]
    fn test_map_filter_are_lazy() {
        let double = Value::Func(Function::new("double", |args, _| {
            ops::binary(BinOp::Mul, &args[0], &Value::Int(2))
        }));
        let mapped = call("map", vec![double, call("range", vec![Value::Int(3)]).unwrap()]).unwrap();
        assert!(matches!(mapped, Value::Stream(_)));
        let kept = call("filter", vec![Value::None, mapped]).unwrap();
        assert_eq!(kept.to_vec().unwrap(), vec![Value::Int(2), Value::Int(4)]);
    }

    #[test]
    fn test_reversed_join() {
        let words = strs(&["this", "is"]);
        let reversed = call("reversed", vec![words]).unwrap();
        let joined = call_method(Value::from(" "), "join", vec![reversed]).unwrap();
        assert_eq!(joined, Value::from("is this"));
        let err = call_method(Value::from(","), "join", vec![Value::list(vec![Value::Int(1)])])
            .unwrap_err();
        assert_eq!(
            err.exception.message,
            "sequence item 0: expected str instance, int found"
        );
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(
            call_method(Value::from("  a b  c "), "split", vec![]).unwrap(),
            strs(&["a", "b", "c"])
        );
        assert_eq!(
            call_method(Value::from("a,b,c"), "split", vec![Value::from(","), Value::Int(1)])
                .unwrap(),
            strs(&["a", "b,c"])
        );
        assert_eq!(
            call_method(Value::from("xxhixx"), "strip", vec![Value::from("x")]).unwrap(),
            Value::from("hi")
        );
        assert_eq!(
            call_method(Value::from("hello world"), "title", vec![]).unwrap(),
            Value::from("Hello World")
        );
        assert_eq!(
            call_method(Value::from("héllo"), "find", vec![Value::from("l")]).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            call_method(Value::from("{}-{}"), "format", vec![Value::Int(1), Value::Int(2)])
                .unwrap(),
            Value::from("1-2")
        );
        assert_eq!(
            call_method(Value::from("abc"), "startswith", vec![strs(&["x", "a"])]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_missing_method() {
        let err = method(&Value::Int(1), "upper").unwrap_err();
        assert_eq!(err.kind(), ExceptionKind::AttributeError);
        assert_eq!(err.exception.message, "'int' object has no attribute 'upper'");
    }

    #[test]
    fn test_dict_methods() {
        let d = Value::dict(vec![("a".to_string(), Value::Int(1))]);
        assert_eq!(call_method(d.clone(), "keys", vec![]).unwrap(), strs(&["a"]));
        assert_eq!(
            call_method(d.clone(), "get", vec![Value::from("b"), Value::Int(0)]).unwrap(),
            Value::Int(0)
        );
    }

    #[test]
    fn test_islice_stops_pulling_at_stop() {
        let source = Stream::from_values((0..10).map(Value::Int));
        let sliced = islice(vec![Value::Stream(source.clone()), Value::Int(3)], None).unwrap();
        assert_eq!(sliced.to_vec().unwrap().len(), 3);
        assert_eq!(source.clone().next().unwrap().unwrap(), Value::Int(3));

        let stepped = islice(
            vec![
                Value::list((0..10).map(Value::Int)),
                Value::Int(1),
                Value::None,
                Value::Int(4),
            ],
            None,
        )
        .unwrap();
        assert_eq!(
            stepped.to_vec().unwrap(),
            vec![Value::Int(1), Value::Int(5), Value::Int(9)]
        );
    }

    #[test]
    fn test_spy_module() {
        let modules = modules();
        let spy = &modules[0];
        assert_eq!(spy.attr("DROP").unwrap(), Value::Drop);
        let many = spy.attr("many").unwrap();
        assert!(matches!(many.call(vec![Value::Int(1)], None).unwrap(), Value::Many(_)));
        assert!(spy.attr("collect").unwrap().call(vec![], None).is_err());
        assert!(spy.attr("nope").unwrap_err().exception.forced);
    }
}
