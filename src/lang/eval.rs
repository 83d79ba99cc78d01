//! Tree-walking evaluator for parsed fragments.

use std::collections::BTreeMap;
use std::rc::Rc;

use super::builtins;
use super::ops;
use super::parser::{Comprehension, Expr, Lambda, Program, Stmt, UnaryOp};
use super::scope::View;
use crate::core::IterContext;
use crate::error::{ExceptionKind, Frame, FragmentError, Location, type_error, value_error};
use crate::value::{Function, Value};

struct Env<'a> {
    view: &'a Rc<View>,
    ctx: Option<&'a IterContext>,
    /// Fragment name, used as the file of lambda frames.
    fragment: &'a str,
    /// Lambda parameters and comprehension targets.
    locals: BTreeMap<String, Value>,
}

impl Env<'_> {
    fn lookup(&self, name: &str) -> Result<Value, FragmentError> {
        self.locals
            .get(name)
            .cloned()
            .or_else(|| self.view.get(name))
            .or_else(|| builtins::lookup(name))
            .ok_or_else(|| {
                FragmentError::new(
                    ExceptionKind::NameError,
                    format!("name '{name}' is not defined"),
                )
            })
    }

    fn child(&self) -> Env<'_> {
        Env {
            view: self.view,
            ctx: self.ctx,
            fragment: self.fragment,
            locals: self.locals.clone(),
        }
    }
}

/// Evaluate `program` against `view`, for the element currently in its pipe.
///
/// An expression program yields its value; a statement program yields the
/// pipe variable once every statement has run.
pub(crate) fn run(
    program: &Program,
    view: &Rc<View>,
    ctx: Option<&IterContext>,
    fragment: &str,
) -> Result<Value, FragmentError> {
    let env = Env {
        view,
        ctx,
        fragment,
        locals: BTreeMap::new(),
    };
    match program {
        Program::Expr(expr) => eval(expr, &env),
        Program::Suite(stmts) => {
            for stmt in stmts {
                exec(stmt, &env)?;
            }
            Ok(view.pipe())
        }
    }
}

fn exec(stmt: &Stmt, env: &Env) -> Result<(), FragmentError> {
    match stmt {
        Stmt::Expr(expr) => {
            eval(expr, env)?;
        }
        Stmt::Assign(targets, expr) => {
            let value = eval(expr, env)?;
            for (name, value) in unpack(targets, value)? {
                env.view.set(&name, value);
            }
        }
        Stmt::AugAssign(name, op, expr) => {
            let current = env.lookup(name)?;
            let operand = eval(expr, env)?;
            env.view.set(name, ops::binary(*op, &current, &operand)?);
        }
        Stmt::Del(names) => {
            for name in names {
                env.view.delete(name)?;
            }
        }
        Stmt::Pass => {}
    }
    Ok(())
}

/// Pair assignment targets with the values they receive.
fn unpack(targets: &[String], value: Value) -> Result<Vec<(String, Value)>, FragmentError> {
    if let [name] = targets {
        return Ok(vec![(name.clone(), value)]);
    }
    let items = value.to_vec()?;
    if items.len() > targets.len() {
        return Err(value_error(format!(
            "too many values to unpack (expected {})",
            targets.len()
        )));
    }
    if items.len() < targets.len() {
        return Err(value_error(format!(
            "not enough values to unpack (expected {}, got {})",
            targets.len(),
            items.len()
        )));
    }
    Ok(targets.iter().cloned().zip(items).collect())
}

fn slice_bound(expr: Option<&Expr>, env: &Env) -> Result<Option<i64>, FragmentError> {
    let Some(expr) = expr else {
        return Ok(None);
    };
    match eval(expr, env)? {
        Value::None => Ok(None),
        value => value.as_int().map(Some).ok_or_else(|| {
            type_error("slice indices must be integers or None or have an __index__ method")
        }),
    }
}

fn eval(expr: &Expr, env: &Env) -> Result<Value, FragmentError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Name(name) => env.lookup(name),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::from),
        Expr::Dict(entries) => {
            let mut dict = BTreeMap::new();
            for (key, value) in entries {
                let key = match eval(key, env)? {
                    Value::Str(s) => s.to_string(),
                    other => {
                        return Err(type_error(format!(
                            "dict keys must be str, not '{}'",
                            other.type_name()
                        )));
                    }
                };
                dict.insert(key, eval(value, env)?);
            }
            Ok(Value::Dict(Rc::new(dict)))
        }
        Expr::Attr(target, name) => match eval(target, env)? {
            Value::Module(module) => module.attr(name),
            other => builtins::method(&other, name),
        },
        Expr::Call(callee, args) => {
            let callee = eval(callee, env)?;
            let args = args
                .iter()
                .map(|arg| eval(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            callee.call(args, env.ctx)
        }
        Expr::Index(target, key) => {
            let target = eval(target, env)?;
            target.get_item(&eval(key, env)?)
        }
        Expr::Slice(target, [start, stop, step]) => {
            let target = eval(target, env)?;
            target.get_slice(
                slice_bound(start.as_deref(), env)?,
                slice_bound(stop.as_deref(), env)?,
                slice_bound(step.as_deref(), env)?,
            )
        }
        Expr::Unary(op, operand) => {
            let operand = eval(operand, env)?;
            match op {
                UnaryOp::Neg => ops::negate(&operand),
                UnaryOp::Pos => ops::positive(&operand),
                UnaryOp::Not => Ok(Value::Bool(!operand.truthy())),
            }
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, env)?;
            ops::binary(*op, &left, &eval(right, env)?)
        }
        Expr::Compare(first, rest) => {
            let mut left = eval(first, env)?;
            for (op, right) in rest {
                let right = eval(right, env)?;
                if !ops::compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }
        Expr::And(left, right) => {
            let left = eval(left, env)?;
            if left.truthy() { eval(right, env) } else { Ok(left) }
        }
        Expr::Or(left, right) => {
            let left = eval(left, env)?;
            if left.truthy() { Ok(left) } else { eval(right, env) }
        }
        Expr::IfElse(condition, value, other) => {
            if eval(condition, env)?.truthy() {
                eval(value, env)
            } else {
                eval(other, env)
            }
        }
        Expr::Lambda(lambda) => Ok(make_lambda(lambda, env)),
        Expr::Comprehension(comprehension) => comprehend(comprehension, env),
    }
}

fn make_lambda(lambda: &Rc<Lambda>, env: &Env) -> Value {
    let lambda = Rc::clone(lambda);
    let view = Rc::clone(env.view);
    let captured = env.locals.clone();
    let fragment = env.fragment.to_string();
    Value::Func(Function::new("<lambda>", move |args, ctx| {
        if args.len() != lambda.params.len() {
            return Err(type_error(format!(
                "<lambda>() takes {} positional argument(s) but {} were given",
                lambda.params.len(),
                args.len()
            )));
        }
        let mut locals = captured.clone();
        locals.extend(lambda.params.iter().cloned().zip(args));
        let env = Env {
            view: &view,
            ctx,
            fragment: &fragment,
            locals,
        };
        eval(&lambda.body, &env).map_err(|err| {
            let location = Location::new(fragment.as_str(), lambda.line as u32, "<lambda>")
                .with_snippet(lambda.snippet.as_str());
            err.within(Frame::Plain(location))
        })
    }))
}

/// Comprehensions and generator expressions both evaluate eagerly to a list.
fn comprehend(comprehension: &Comprehension, env: &Env) -> Result<Value, FragmentError> {
    let iterable = eval(&comprehension.iterable, env)?;
    let mut inner = env.child();
    let mut out = Vec::new();
    for item in iterable.iter()? {
        inner.locals.extend(unpack(&comprehension.targets, item?)?);
        if let Some(condition) = &comprehension.condition
            && !eval(condition, &inner)?.truthy()
        {
            continue;
        }
        out.push(eval(&comprehension.element, &inner)?);
    }
    Ok(Value::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::lexer::tokenize;
    use crate::lang::parser::Parser;
    use crate::lang::scope::{Namespace, PIPE_NAME};

    fn eval_with(source: &str, pipe: Value) -> Result<Value, FragmentError> {
        let tokens = tokenize(source).unwrap();
        let program = Parser::new(tokens, source).program().unwrap();
        let view = View::new(Namespace::new(), PIPE_NAME);
        view.set_pipe(pipe);
        run(&program, &view, None, "Fragment 1")
    }

    fn eval_str(source: &str) -> Value {
        eval_with(source, Value::None).unwrap()
    }

    #[test]
    fn test_expressions() {
        assert_eq!(eval_with("pipe.upper()", Value::from("ab")).unwrap(), Value::from("AB"));
        assert_eq!(eval_str("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval_str("1 < 2 < 3"), Value::Bool(true));
        assert_eq!(eval_str("1 < 3 < 2"), Value::Bool(false));
        assert_eq!(eval_str("0 or 'x'"), Value::from("x"));
        assert_eq!(eval_str("'' and 1"), Value::from(""));
        assert_eq!(eval_str("'a' if None else 'b'"), Value::from("b"));
        assert_eq!(eval_str("'hello'[::-1]"), Value::from("olleh"));
        assert_eq!(eval_str("{'a': 1}['a']"), Value::Int(1));
    }

    #[test]
    fn test_statements_return_pipe() {
        assert_eq!(
            eval_with("x = 2; pipe = pipe * x", Value::Int(21)).unwrap(),
            Value::Int(42)
        );
        assert_eq!(eval_with("a, b = pipe; pipe = b", Value::from("xy")).unwrap(), Value::from("y"));
        let err = eval_with("a, b = pipe", Value::from("xyz")).unwrap_err();
        assert_eq!(err.exception.message, "too many values to unpack (expected 2)");
    }

    #[test]
    fn test_comprehension_and_lambda() {
        assert_eq!(
            eval_str("[x * 2 for x in range(4) if x % 2]"),
            Value::list(vec![Value::Int(2), Value::Int(6)])
        );
        assert_eq!(eval_str("sum(x for x in [1, 2, 3])"), Value::Int(6));
        assert_eq!(eval_str("(lambda a, b: a - b)(5, 3)"), Value::Int(2));
        assert_eq!(
            eval_str("[k + v for k, v in {'a': 'b'}.items()]"),
            Value::list(vec![Value::from("ab")])
        );
    }

    #[test]
    fn test_name_errors() {
        let err = eval_with("nope", Value::None).unwrap_err();
        assert_eq!(err.kind(), ExceptionKind::NameError);
        assert_eq!(err.exception.message, "name 'nope' is not defined");
    }

    #[test]
    fn test_module_attributes() {
        assert_eq!(eval_str("spy.DROP"), Value::Drop);
        let err = eval_with("spy.nope", Value::None).unwrap_err();
        assert_eq!(err.exception.reported().kind, ExceptionKind::AttributeError);
        let err = eval_with("spy.collect()", Value::None).unwrap_err();
        assert_eq!(
            err.exception.message,
            "Can't collect without a valid context (got None)"
        );
    }

    #[test]
    fn test_lambda_errors_carry_location() {
        let err = eval_with("f = lambda x: x / 0\nf(1)", Value::None).unwrap_err();
        assert_eq!(err.kind(), ExceptionKind::ZeroDivisionError);
        let Some(Frame::Plain(location)) = err.frames().last() else {
            panic!("expected a lambda frame");
        };
        assert_eq!(location.file, "Fragment 1");
        assert_eq!(location.line, 1);
        assert_eq!(location.function, "<lambda>");
        assert_eq!(location.snippet.as_deref(), Some("f = lambda x: x / 0"));
    }
}
