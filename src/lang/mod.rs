//! The fragment language.
//!
//! Fragment source text is compiled once into a [`Code`] and wrapped in an
//! [`ExprBody`], which evaluates it per element with the element bound to the
//! pipe variable of its [`View`]. Literal-mode decorators get a
//! [`LiteralBody`] instead, which hands back the text unevaluated together
//! with the visible names.

mod builtins;
mod eval;
mod lexer;
mod ops;
mod parser;
mod scope;

use std::rc::Rc;

use tracing::debug;

pub use scope::{Namespace, PIPE_NAME, View};

use crate::core::{Body, DebugInfo, IterContext, Rescope};
use crate::error::{Frame, FragmentError, SyntaxError};
use crate::value::Value;
use parser::{Parser, Program};

/// Compiled fragment source.
#[derive(Debug, Clone)]
pub struct Code {
    name: String,
    program: Rc<Program>,
}

impl Code {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate once against `view`, with no iteration context.
    pub fn run(&self, view: &Rc<View>) -> Result<Value, FragmentError> {
        eval::run(&self.program, view, None, &self.name)
    }
}

/// Compile `source`; `name` is used in error positions (`Fragment 2`).
pub fn compile(source: &str, name: &str) -> Result<Code, SyntaxError> {
    let error = |line: usize, col: usize, message: String| SyntaxError {
        fragment: name.to_string(),
        line,
        col,
        text: source
            .lines()
            .nth(line.saturating_sub(1))
            .unwrap_or_default()
            .to_string(),
        message,
    };
    let tokens = lexer::tokenize(source).map_err(|e| error(e.line, e.col, e.message))?;
    let program = Parser::new(tokens, source)
        .program()
        .map_err(|e| error(e.line, e.col, e.message))?;
    debug!(fragment = name, "compiled fragment");
    Ok(Code {
        name: name.to_string(),
        program: Rc::new(program),
    })
}

/// A fragment body evaluating compiled source.
pub struct ExprBody {
    code: Code,
    view: Rc<View>,
    debug: DebugInfo,
}

impl ExprBody {
    pub fn new(code: Code, view: Rc<View>, debug: DebugInfo) -> Self {
        Self { code, view, debug }
    }
}

impl Body for ExprBody {
    fn call(&self, value: Value, ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
        self.view.set_pipe(value);
        eval::run(&self.code.program, &self.view, ctx, &self.code.name).map_err(|err| {
            err.within(Frame::Synthetic {
                debug: self.debug.clone(),
            })
        })
    }

    fn debug_info(&self) -> Option<&DebugInfo> {
        Some(&self.debug)
    }

    fn scope(&self) -> Option<Rc<dyn Rescope>> {
        Some(Rc::clone(&self.view) as Rc<dyn Rescope>)
    }
}

/// A fragment body returning its source text as-is, paired with a snapshot
/// of the names visible to it: `[names, text]`.
pub struct LiteralBody {
    text: Rc<str>,
    view: Rc<View>,
    debug: DebugInfo,
}

impl LiteralBody {
    pub fn new(text: &str, view: Rc<View>, debug: DebugInfo) -> Self {
        Self {
            text: Rc::from(text),
            view,
            debug,
        }
    }
}

impl Body for LiteralBody {
    fn call(&self, value: Value, _ctx: Option<&IterContext>) -> Result<Value, FragmentError> {
        self.view.set_pipe(value);
        Ok(Value::list(vec![
            self.view.snapshot(),
            Value::Str(Rc::clone(&self.text)),
        ]))
    }

    fn debug_info(&self) -> Option<&DebugInfo> {
        Some(&self.debug)
    }

    fn scope(&self) -> Option<Rc<dyn Rescope>> {
        Some(Rc::clone(&self.view) as Rc<dyn Rescope>)
    }
}
