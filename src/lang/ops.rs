//! Operator semantics for fragment values.

use std::cmp::Ordering;
use std::rc::Rc;

use super::parser::{BinOp, CmpOp};
use crate::error::{ExceptionKind, FragmentError, type_error};
use crate::value::{Number, Value};

fn overflow() -> FragmentError {
    FragmentError::new(ExceptionKind::OverflowError, "integer overflow")
}

fn unsupported(op: BinOp, a: &Value, b: &Value) -> FragmentError {
    type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

/// Length of `len` items repeated `times` times, or the error raised when
/// that cannot be allocated.
fn repeated_len(len: usize, times: i64) -> Result<(usize, usize), FragmentError> {
    let times = usize::try_from(times).unwrap_or(0);
    if len == 0 || times == 0 {
        return Ok((0, 0));
    }
    let total = len.checked_mul(times).ok_or_else(|| {
        FragmentError::new(ExceptionKind::OverflowError, "repeated sequence is too long")
    })?;
    Ok((total, times))
}

fn out_of_memory() -> FragmentError {
    FragmentError::new(ExceptionKind::MemoryError, "")
}

fn repeat<T: Clone>(items: &[T], times: i64) -> Result<Vec<T>, FragmentError> {
    let (total, times) = repeated_len(items.len(), times)?;
    let mut out = Vec::new();
    out.try_reserve_exact(total).map_err(|_| out_of_memory())?;
    for _ in 0..times {
        out.extend_from_slice(items);
    }
    Ok(out)
}

fn repeat_str(s: &str, times: i64) -> Result<String, FragmentError> {
    let (total, times) = repeated_len(s.len(), times)?;
    let mut out = String::new();
    out.try_reserve_exact(total).map_err(|_| out_of_memory())?;
    for _ in 0..times {
        out.push_str(s);
    }
    Ok(out)
}

pub(crate) fn binary(op: BinOp, a: &Value, b: &Value) -> Result<Value, FragmentError> {
    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => Ok(Value::from(format!("{x}{y}"))),
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            Ok(Value::list(x.iter().chain(y.iter()).cloned()))
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_int().is_some() => {
            Ok(Value::from(repeat_str(s, n.as_int().unwrap_or(0))?))
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if n.as_int().is_some() =>
        {
            Ok(Value::List(Rc::new(repeat(items, n.as_int().unwrap_or(0))?)))
        }
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => arithmetic(op, x, y),
            _ => Err(unsupported(op, a, b)),
        },
    }
}

fn zero_division(message: &str) -> FragmentError {
    FragmentError::new(ExceptionKind::ZeroDivisionError, message)
}

fn arithmetic(op: BinOp, a: Number, b: Number) -> Result<Value, FragmentError> {
    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        return match op {
            BinOp::Add => x.checked_add(y).map(Value::Int).ok_or_else(overflow),
            BinOp::Sub => x.checked_sub(y).map(Value::Int).ok_or_else(overflow),
            BinOp::Mul => x.checked_mul(y).map(Value::Int).ok_or_else(overflow),
            BinOp::Div if y == 0 => Err(zero_division("division by zero")),
            BinOp::Div => Ok(Value::Float(x as f64 / y as f64)),
            BinOp::FloorDiv | BinOp::Mod if y == 0 => {
                Err(zero_division("integer division or modulo by zero"))
            }
            BinOp::FloorDiv => {
                let q = x.checked_div(y).ok_or_else(overflow)?;
                Ok(Value::Int(if x % y != 0 && (x < 0) != (y < 0) { q - 1 } else { q }))
            }
            BinOp::Mod => {
                let r = x.checked_rem(y).ok_or_else(overflow)?;
                Ok(Value::Int(if r != 0 && (r < 0) != (y < 0) { r + y } else { r }))
            }
            BinOp::Pow if y < 0 => Ok(Value::Float((x as f64).powf(y as f64))),
            BinOp::Pow => u32::try_from(y)
                .ok()
                .and_then(|y| x.checked_pow(y))
                .map(Value::Int)
                .ok_or_else(overflow),
        };
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    match op {
        BinOp::Add => Ok(Value::Float(x + y)),
        BinOp::Sub => Ok(Value::Float(x - y)),
        BinOp::Mul => Ok(Value::Float(x * y)),
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if y == 0.0 => {
            Err(zero_division("float division by zero"))
        }
        BinOp::Div => Ok(Value::Float(x / y)),
        BinOp::FloorDiv => Ok(Value::Float((x / y).floor())),
        BinOp::Mod => Ok(Value::Float(x - y * (x / y).floor())),
        BinOp::Pow => Ok(Value::Float(x.powf(y))),
    }
}

pub(crate) fn negate(value: &Value) -> Result<Value, FragmentError> {
    match value.as_number() {
        Some(Number::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(overflow),
        Some(Number::Float(f)) => Ok(Value::Float(-f)),
        None => Err(type_error(format!(
            "bad operand type for unary -: '{}'",
            value.type_name()
        ))),
    }
}

pub(crate) fn positive(value: &Value) -> Result<Value, FragmentError> {
    match value.as_number() {
        Some(Number::Int(i)) => Ok(Value::Int(i)),
        Some(Number::Float(f)) => Ok(Value::Float(f)),
        None => Err(type_error(format!(
            "bad operand type for unary +: '{}'",
            value.type_name()
        ))),
    }
}

/// Object identity, as far as values have one.
fn is(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) | (Value::Drop, Value::Drop) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y),
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
        (Value::Stream(_), Value::Stream(_))
        | (Value::Func(_), Value::Func(_))
        | (Value::Module(_), Value::Module(_)) => a == b,
        _ => false,
    }
}

/// `item in container`.
pub(crate) fn contains(container: &Value, item: &Value) -> Result<bool, FragmentError> {
    match container {
        Value::Str(s) => match item {
            Value::Str(sub) => Ok(s.contains(sub.as_ref())),
            other => Err(type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.iter().any(|v| v == item)),
        Value::Dict(entries) => Ok(item.as_str().is_some_and(|k| entries.contains_key(k))),
        Value::Stream(stream) => {
            for v in stream.clone() {
                if v? == *item {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub(crate) fn compare(op: CmpOp, a: &Value, b: &Value) -> Result<bool, FragmentError> {
    Ok(match op {
        CmpOp::Eq => a == b,
        CmpOp::Ne => a != b,
        CmpOp::Lt => a.compare(b)? == Ordering::Less,
        CmpOp::Le => a.compare(b)? != Ordering::Greater,
        CmpOp::Gt => a.compare(b)? == Ordering::Greater,
        CmpOp::Ge => a.compare(b)? != Ordering::Less,
        CmpOp::In => contains(b, a)?,
        CmpOp::NotIn => !contains(b, a)?,
        CmpOp::Is => is(a, b),
        CmpOp::IsNot => !is(a, b),
    })
}
