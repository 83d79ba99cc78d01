//! Turning command line steps into a runnable chain.
//!
//! Each step is a fragment source, optionally preceded by decorator flags:
//!
//! ```text
//! spy -l 'spy.many(pipe.split())' -f 'len(pipe) > 2' 'pipe.upper()'
//! ```
//!
//! Flags are long aliases (`--filter`) or clusters of short ones (`-fc`).
//! A decorator taking arguments consumes them right after its flag.

use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::mem;
use std::rc::Rc;

use tracing::debug;

use crate::catcher::{ReportOptions, catch};
use crate::core::{Body, Chain, DebugInfo, Fragment, Stage};
use crate::decorators::{Binding, Registry, decorate};
use crate::error::Error;
use crate::fragments::{Flatten, Limit};
use crate::lang::{self, ExprBody, LiteralBody, Namespace, PIPE_NAME, View};
use crate::value::Value;

/// One fragment of the command line with the decorators declared on it.
#[derive(Clone)]
pub struct Step {
    pub source: String,
    /// Outermost first.
    pub bindings: Vec<Binding>,
    /// Flags as written in labels: primary alias plus arguments.
    flags: Vec<String>,
}

impl Step {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            bindings: Vec::new(),
            flags: Vec::new(),
        }
    }

    /// The source text, prefixed by its decorator flags when decorated:
    /// `--filter 'len(pipe) > 2'`.
    pub fn label(&self) -> String {
        if self.flags.is_empty() {
            self.source.clone()
        } else {
            format!(
                "{} {}",
                self.flags.join(" "),
                Value::from(self.source.as_str()).repr()
            )
        }
    }

    fn is_literal(&self) -> bool {
        self.bindings.iter().any(|b| b.decorator.literal)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("source", &self.source)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Whether `token` is a decorator flag rather than fragment source.
fn is_flag(token: &str) -> bool {
    match token.strip_prefix('-') {
        Some(rest) => rest
            .chars()
            .next()
            .is_some_and(|c| !c.is_ascii_digit() && c != '.' && !c.is_whitespace()),
        None => false,
    }
}

/// Split `token` into the aliases it names.
fn aliases(token: &str) -> Vec<String> {
    if token.starts_with("--") {
        vec![token.to_string()]
    } else {
        token.chars().skip(1).map(|c| format!("-{c}")).collect()
    }
}

/// Group command line tokens into steps.
pub fn parse_steps(tokens: &[String], registry: &Registry) -> Result<Vec<Step>, Error> {
    let mut steps = Vec::new();
    let mut pending = Step::new("");
    let mut tokens = tokens.iter();
    while let Some(token) = tokens.next() {
        if !is_flag(token) {
            pending.source = token.clone();
            steps.push(mem::replace(&mut pending, Step::new("")));
            continue;
        }
        for alias in aliases(token) {
            let decorator = registry
                .lookup(&alias)
                .ok_or_else(|| Error::Usage(format!("Unknown option '{alias}'")))?;
            let primary = decorator.aliases.first().copied().unwrap_or(decorator.name);
            let mut args = Vec::with_capacity(decorator.arity);
            for _ in 0..decorator.arity {
                let arg = tokens
                    .next()
                    .ok_or_else(|| Error::Usage(format!("No value found after {primary}")))?;
                args.push(arg.clone());
            }
            let mut flag = primary.to_string();
            for arg in &args {
                flag.push(' ');
                flag.push_str(arg);
            }
            pending.flags.push(flag);
            pending.bindings.push(Binding::new(decorator, args));
        }
    }
    if let Some(first) = pending.bindings.first() {
        let primary = first.decorator.aliases.first().copied().unwrap_or(first.decorator.name);
        return Err(Error::Usage(format!("No value found after {primary}")));
    }
    debug!(steps = steps.len(), "parsed command line steps");
    Ok(steps)
}

/// How the chain around the user's fragments is assembled.
#[derive(Debug, Clone)]
pub struct Options {
    /// Feed the input line by line instead of as one string.
    pub each_line: bool,
    /// First result to print, counting from zero.
    pub start: usize,
    /// Stop after this many results.
    pub end: Option<usize>,
    pub pipe_name: String,
    pub no_default_fragments: bool,
    /// Report fragment errors with every frame instead of a traceback.
    pub no_exception_handling: bool,
    /// Code run once in the shared namespace before the pipeline starts.
    pub prelude: Vec<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            each_line: false,
            start: 0,
            end: None,
            pipe_name: PIPE_NAME.to_string(),
            no_default_fragments: false,
            no_exception_handling: false,
            prelude: Vec::new(),
        }
    }
}

/// Compile every step and assemble the chain, printing results to `out`.
pub fn build_chain(
    options: &Options,
    steps: &[Step],
    out: Rc<RefCell<dyn Write>>,
) -> Result<Chain, Error> {
    let mut codes = Vec::with_capacity(steps.len());
    for (i, step) in steps.iter().enumerate() {
        let name = format!("Fragment {}", i + 1);
        let code = if step.is_literal() {
            None
        } else {
            Some(lang::compile(&step.source, &name)?)
        };
        codes.push((name, code));
    }

    let namespace = Namespace::new();
    for source in &options.prelude {
        let view = View::new(Rc::clone(&namespace), options.pipe_name.as_str());
        lang::compile(source, "prelude")?.run(&view)?;
    }

    let mut stages: Vec<Box<dyn Stage>> = Vec::new();
    for (step, (name, code)) in steps.iter().zip(codes) {
        let debug = DebugInfo::new(name.as_str(), step.label());
        let view = View::new(Rc::clone(&namespace), options.pipe_name.as_str());
        let body: Rc<dyn Body> = match code {
            Some(code) => Rc::new(ExprBody::new(code, view, debug)),
            None => Rc::new(LiteralBody::new(&step.source, view, debug)),
        };
        let body = decorate(body, &step.bindings).map_err(|source| Error::Bind {
            fragment: name,
            source,
        })?;
        stages.push(Box::new(Fragment::new(body)));
    }

    if options.no_default_fragments {
        return Ok(Chain::new(stages));
    }
    let mut index_offset = 0;
    if options.each_line {
        stages.insert(0, Box::new(Flatten));
        index_offset = -1;
    }
    stages.push(Box::new(Limit::new(options.start, options.end)));
    Ok(Chain::with_defaults(stages, index_offset, out))
}

/// Build the chain and drain it over `input`.
///
/// A failing fragment comes back as [`Error::Traceback`], or as the bare
/// [`Error::Fragment`] with `no_exception_handling`.
pub fn run(
    options: &Options,
    steps: &[Step],
    input: Value,
    out: Rc<RefCell<dyn Write>>,
) -> Result<(), Error> {
    let chain = build_chain(options, steps, out)?;
    let result = chain.run_to_exhaustion([input]);
    if options.no_exception_handling {
        return Ok(result?);
    }
    catch(result, &ReportOptions { collapse_outer: true })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExceptionKind;
    use crate::value::Stream;
    use pretty_assertions::assert_eq;

    fn args(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    fn parse(tokens: &[&str]) -> Result<Vec<Step>, Error> {
        parse_steps(&args(tokens), &Registry::builtin())
    }

    fn captured() -> (Rc<RefCell<Vec<u8>>>, Rc<RefCell<dyn Write>>) {
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let out: Rc<RefCell<dyn Write>> = buffer.clone();
        (buffer, out)
    }

    fn run_lines(options: &Options, tokens: &[&str], lines: &[&str]) -> Result<String, Error> {
        let steps = parse(tokens)?;
        let (buffer, out) = captured();
        let input = Value::Stream(Stream::from_values(
            lines.iter().map(|l| Value::from(*l)).collect::<Vec<_>>(),
        ));
        run(options, &steps, input, out)?;
        let text = String::from_utf8(buffer.borrow().clone()).unwrap();
        Ok(text)
    }

    fn each_line() -> Options {
        Options {
            each_line: true,
            ..Options::default()
        }
    }

    #[test]
    fn test_parse_steps_groups_flags() {
        let steps = parse(&["pipe", "-fc", "x", "--many", "y"]).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].label(), "pipe");
        assert_eq!(steps[1].bindings.len(), 2);
        assert_eq!(steps[1].label(), "--filter --callable 'x'");
        assert_eq!(steps[2].label(), "--many 'y'");
    }

    #[test]
    fn test_parse_steps_consumes_arguments() {
        let steps = parse(&["--focus", "0", "pipe.upper()"]).unwrap();
        assert_eq!(steps[0].bindings[0].args, vec!["0".to_string()]);
        assert_eq!(
            format!("{:?}", steps[0]),
            r#"Step { source: "pipe.upper()", flags: ["--focus 0"] }"#
        );
        assert_eq!(steps[0].label(), "--focus 0 'pipe.upper()'");
    }

    #[test]
    fn test_negative_numbers_are_sources() {
        let steps = parse(&["-1"]).unwrap();
        assert_eq!(steps[0].source, "-1");
    }

    #[test]
    fn test_parse_errors() {
        let err = parse(&["-fx", "pipe"]).unwrap_err();
        assert_eq!(err.to_string(), "Unknown option '-x'");
        let err = parse(&["pipe", "-a"]).unwrap_err();
        assert_eq!(err.to_string(), "No value found after --accumulate");
        let err = parse(&["--focus"]).unwrap_err();
        assert_eq!(err.to_string(), "No value found after --focus");
    }

    #[test]
    fn test_end_to_end() {
        let out = run_lines(
            &each_line(),
            &[
                "spy.many(pipe.split())",
                "-f",
                "len(pipe) > 2",
                "pipe.upper()",
                "list(itertools.islice(spy.collect(), 3))",
                "\" \".join(reversed(pipe))",
            ],
            &["this is", "a piece of sample input", "used to test a complete run"],
        )
        .unwrap();
        assert_eq!(out, "SAMPLE PIECE THIS\nTEST USED INPUT\nRUN COMPLETE\n");
    }

    #[test]
    fn test_start_and_end() {
        let options = Options {
            start: 1,
            end: Some(3),
            ..each_line()
        };
        let out = run_lines(&options, &["pipe"], &["a", "b", "c", "d", "e"]).unwrap();
        assert_eq!(out, "b\nc\n...\n");
    }

    #[test]
    fn test_statements_and_prelude() {
        let options = Options {
            prelude: vec!["total = 0".to_string()],
            ..each_line()
        };
        let out = run_lines(&options, &["total += int(pipe); pipe = total"], &["1", "2", "3"])
            .unwrap();
        assert_eq!(out, "1\n3\n6\n");
    }

    #[test]
    fn test_literal_decorators() {
        let out = run_lines(&each_line(), &["-i", "<{pipe}>"], &["a", "b"]).unwrap();
        assert_eq!(out, "<a>\n<b>\n");
    }

    #[test]
    fn test_custom_pipe_name() {
        let options = Options {
            pipe_name: "line".to_string(),
            ..each_line()
        };
        let out = run_lines(&options, &["line * 2"], &["ab"]).unwrap();
        assert_eq!(out, "abab\n");
    }

    #[test]
    fn test_fragment_errors_carry_traceback() {
        let err = run_lines(&each_line(), &["pipe", "int(pipe)"], &["1", "x"]).unwrap_err();
        let Error::Traceback(caught) = err else {
            panic!("expected a traceback");
        };
        assert_eq!(caught.error.kind(), ExceptionKind::ValueError);
        let lines: Vec<&str> = caught.report.lines().collect();
        assert_eq!(lines[1], "  Fragment 2");
        assert_eq!(lines[3], "    input to fragment was 'x'");
    }

    #[test]
    fn test_fragment_errors_unhandled() {
        let options = Options {
            no_exception_handling: true,
            ..each_line()
        };
        let err = run_lines(&options, &["int(pipe)"], &["x"]).unwrap_err();
        let Error::Fragment(err) = err else {
            panic!("expected a fragment error");
        };
        assert_eq!(err.kind(), ExceptionKind::ValueError);
    }

    #[test]
    fn test_syntax_errors_before_running() {
        let err = run_lines(&each_line(), &["pipe", "pipe +"], &["1"]).unwrap_err();
        let Error::Syntax(err) = err else {
            panic!("expected a syntax error");
        };
        assert_eq!(err.fragment, "Fragment 2");
    }

    #[test]
    fn test_format_with_defaults() {
        let steps = parse(&["-f", "pipe"]).unwrap();
        let (_, out) = captured();
        let chain = build_chain(&each_line(), &steps, out).unwrap();
        assert_eq!(
            chain.format(),
            [
                "    | <internal> spy::fragments::many",
                "  1 | --filter 'pipe'",
                "  2 | <internal> spy::fragments::limit",
                "  3 | <internal> spy::fragments::print",
            ]
            .join("\n")
        );
    }

    #[test]
    fn test_no_default_fragments() {
        let options = Options {
            no_default_fragments: true,
            ..each_line()
        };
        let (_, out) = captured();
        let chain = build_chain(&options, &parse(&["pipe"]).unwrap(), out).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.index_offset(), 0);
    }
}
