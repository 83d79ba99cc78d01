//! Recursive descent parser producing the fragment syntax tree.

use std::rc::Rc;

use super::lexer::{Tok, Token};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone)]
pub(crate) enum Expr {
    Literal(Value),
    Name(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Attr(Box<Expr>, String),
    Call(Box<Expr>, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Slice(Box<Expr>, [Option<Box<Expr>>; 3]),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    IfElse(Box<Expr>, Box<Expr>, Box<Expr>),
    Lambda(Rc<Lambda>),
    Comprehension(Rc<Comprehension>),
}

#[derive(Debug)]
pub(crate) struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
    /// Line of the `lambda` keyword and the source text of that line.
    pub line: usize,
    pub snippet: String,
}

/// `[element for targets in iterable if condition]`.
#[derive(Debug)]
pub(crate) struct Comprehension {
    pub element: Expr,
    pub targets: Vec<String>,
    pub iterable: Expr,
    pub condition: Option<Expr>,
}

#[derive(Debug, Clone)]
pub(crate) enum Stmt {
    Expr(Expr),
    Assign(Vec<String>, Expr),
    AugAssign(String, BinOp, Expr),
    Del(Vec<String>),
    Pass,
}

#[derive(Debug, Clone)]
pub(crate) enum Program {
    /// A lone expression, evaluated for its value.
    Expr(Expr),
    /// Statements run for effect; the result is the pipe variable.
    Suite(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParseError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

type Parsed<T> = Result<T, ParseError>;

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "for", "lambda", "del", "pass", "None", "True",
    "False",
];

pub(crate) struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    lines: Vec<&'a str>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(tokens: Vec<Token>, source: &'a str) -> Self {
        Self {
            tokens,
            pos: 0,
            lines: source.lines().collect(),
        }
    }

    fn peek(&self) -> &Tok {
        &self.token().tok
    }

    fn token(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.token().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let token = self.token();
        ParseError {
            line: token.line,
            col: token.col,
            message: message.into(),
        }
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == keyword)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.at_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Parsed<()> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{op}'")))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Parsed<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{keyword}'")))
        }
    }

    fn identifier(&mut self) -> Parsed<String> {
        match self.peek() {
            Tok::Name(name) if !KEYWORDS.contains(&name.as_str()) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here("invalid syntax")),
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Tok::Newline) || self.at_op(";") {
            self.advance();
        }
    }

    pub(crate) fn program(&mut self) -> Parsed<Program> {
        let mut stmts = Vec::new();
        self.skip_separators();
        while !matches!(self.peek(), Tok::End) {
            stmts.push(self.statement()?);
            match self.peek() {
                Tok::End => break,
                Tok::Newline => self.skip_separators(),
                Tok::Op(";") => self.skip_separators(),
                _ => return Err(self.error_here("invalid syntax")),
            }
        }
        if let [Stmt::Expr(expr)] = stmts.as_slice() {
            return Ok(Program::Expr(expr.clone()));
        }
        Ok(Program::Suite(stmts))
    }

    fn statement(&mut self) -> Parsed<Stmt> {
        if self.eat_keyword("pass") {
            return Ok(Stmt::Pass);
        }
        if self.eat_keyword("del") {
            let mut names = vec![self.identifier()?];
            while self.eat_op(",") {
                names.push(self.identifier()?);
            }
            return Ok(Stmt::Del(names));
        }

        let start = self.token().clone();
        let target = self.expression_list()?;
        if self.at_op("=") {
            let targets = assign_targets(&target).ok_or_else(|| ParseError {
                line: start.line,
                col: start.col,
                message: "cannot assign to expression".to_string(),
            })?;
            self.advance();
            let value = self.expression_list()?;
            return Ok(Stmt::Assign(targets, value));
        }
        for (op, bin) in [("+=", BinOp::Add), ("-=", BinOp::Sub), ("*=", BinOp::Mul)] {
            if self.at_op(op) {
                let Expr::Name(name) = target else {
                    return Err(ParseError {
                        line: start.line,
                        col: start.col,
                        message: "illegal expression for augmented assignment".to_string(),
                    });
                };
                self.advance();
                let value = self.expression_list()?;
                return Ok(Stmt::AugAssign(name, bin, value));
            }
        }
        Ok(Stmt::Expr(target))
    }

    /// One expression, or several separated by commas (a tuple).
    fn expression_list(&mut self) -> Parsed<Expr> {
        let first = self.expression()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_expression_end() {
                break;
            }
            items.push(self.expression()?);
        }
        Ok(Expr::List(items))
    }

    fn at_expression_end(&self) -> bool {
        matches!(self.peek(), Tok::End | Tok::Newline)
            || [";", "=", ")", "]", "}"].iter().any(|op| self.at_op(op))
    }

    pub(crate) fn expression(&mut self) -> Parsed<Expr> {
        if self.at_keyword("lambda") {
            return self.lambda();
        }
        let value = self.or_expr()?;
        if self.eat_keyword("if") {
            let condition = self.or_expr()?;
            self.expect_keyword("else")?;
            let other = self.expression()?;
            return Ok(Expr::IfElse(
                Box::new(condition),
                Box::new(value),
                Box::new(other),
            ));
        }
        Ok(value)
    }

    fn lambda(&mut self) -> Parsed<Expr> {
        let line = self.advance().line;
        let mut params = Vec::new();
        if !self.at_op(":") {
            params.push(self.identifier()?);
            while self.eat_op(",") {
                params.push(self.identifier()?);
            }
        }
        self.expect_op(":")?;
        let body = self.expression()?;
        let snippet = self
            .lines
            .get(line.saturating_sub(1))
            .map(|l| l.trim().to_string())
            .unwrap_or_default();
        Ok(Expr::Lambda(Rc::new(Lambda {
            params,
            body,
            line,
            snippet,
        })))
    }

    fn or_expr(&mut self) -> Parsed<Expr> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Parsed<Expr> {
        let mut left = self.not_expr()?;
        while self.eat_keyword("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Parsed<Expr> {
        if self.eat_keyword("not") {
            let operand = self.not_expr()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            Tok::Op("==") => CmpOp::Eq,
            Tok::Op("!=") => CmpOp::Ne,
            Tok::Op("<") => CmpOp::Lt,
            Tok::Op("<=") => CmpOp::Le,
            Tok::Op(">") => CmpOp::Gt,
            Tok::Op(">=") => CmpOp::Ge,
            Tok::Name(n) if n == "in" => CmpOp::In,
            Tok::Name(n) if n == "is" => {
                self.advance();
                return Some(if self.eat_keyword("not") {
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                });
            }
            Tok::Name(n) if n == "not" => {
                let next = self.tokens.get(self.pos + 1).map(|t| &t.tok);
                if !matches!(next, Some(Tok::Name(n)) if n == "in") {
                    return None;
                }
                self.advance();
                CmpOp::NotIn
            }
            _ => return None,
        };
        self.advance();
        Some(op)
    }

    fn comparison(&mut self) -> Parsed<Expr> {
        let first = self.arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.comparison_op() {
            rest.push((op, self.arith()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn arith(&mut self) -> Parsed<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Op("+") => BinOp::Add,
                Tok::Op("-") => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Parsed<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Tok::Op("*") => BinOp::Mul,
                Tok::Op("/") => BinOp::Div,
                Tok::Op("//") => BinOp::FloorDiv,
                Tok::Op("%") => BinOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn factor(&mut self) -> Parsed<Expr> {
        let op = match self.peek() {
            Tok::Op("-") => UnaryOp::Neg,
            Tok::Op("+") => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.factor()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn power(&mut self) -> Parsed<Expr> {
        let base = self.postfix()?;
        if self.eat_op("**") {
            let exponent = self.factor()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Parsed<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op("(") {
                let args = self.call_args()?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat_op("[") {
                expr = self.subscript(expr)?;
            } else if self.eat_op(".") {
                let attr = self.identifier()?;
                expr = Expr::Attr(Box::new(expr), attr);
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_args(&mut self) -> Parsed<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.eat_op(")") {
            let arg = self.expression()?;
            if self.at_keyword("for") {
                // A bare generator expression as the only argument.
                args.push(self.comprehension(arg)?);
                self.expect_op(")")?;
                return Ok(args);
            }
            args.push(arg);
            if !self.eat_op(",") {
                self.expect_op(")")?;
                break;
            }
        }
        Ok(args)
    }

    fn subscript(&mut self, target: Expr) -> Parsed<Expr> {
        let mut parts: [Option<Box<Expr>>; 3] = [None, None, None];
        let mut sliced = false;
        for (i, part) in parts.iter_mut().enumerate() {
            if !self.at_op(":") && !self.at_op("]") {
                *part = Some(Box::new(self.expression()?));
            }
            if i < 2 && self.eat_op(":") {
                sliced = true;
            } else {
                break;
            }
        }
        self.expect_op("]")?;
        if sliced {
            return Ok(Expr::Slice(Box::new(target), parts));
        }
        match parts {
            [Some(index), None, None] => Ok(Expr::Index(Box::new(target), index)),
            _ => Err(self.error_here("invalid syntax")),
        }
    }

    fn comprehension(&mut self, element: Expr) -> Parsed<Expr> {
        self.expect_keyword("for")?;
        let mut targets = vec![self.identifier()?];
        while self.eat_op(",") {
            targets.push(self.identifier()?);
        }
        self.expect_keyword("in")?;
        let iterable = self.or_expr()?;
        let condition = if self.eat_keyword("if") {
            Some(self.or_expr()?)
        } else {
            None
        };
        Ok(Expr::Comprehension(Rc::new(Comprehension {
            element,
            targets,
            iterable,
            condition,
        })))
    }

    fn atom(&mut self) -> Parsed<Expr> {
        let token = self.token().clone();
        match token.tok {
            Tok::Int(i) => {
                self.advance();
                Ok(Expr::Literal(Value::Int(i)))
            }
            Tok::Float(f) => {
                self.advance();
                Ok(Expr::Literal(Value::Float(f)))
            }
            Tok::Str(first) => {
                self.advance();
                let mut text = first;
                while let Tok::Str(more) = self.peek() {
                    text.push_str(more);
                    self.advance();
                }
                Ok(Expr::Literal(Value::from(text)))
            }
            Tok::Name(name) => match name.as_str() {
                "None" => {
                    self.advance();
                    Ok(Expr::Literal(Value::None))
                }
                "True" | "False" => {
                    self.advance();
                    Ok(Expr::Literal(Value::Bool(name == "True")))
                }
                _ => Ok(Expr::Name(self.identifier()?)),
            },
            Tok::Op("(") => {
                self.advance();
                if self.eat_op(")") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expression()?;
                if self.at_keyword("for") {
                    let comprehension = self.comprehension(first)?;
                    self.expect_op(")")?;
                    return Ok(comprehension);
                }
                if self.eat_op(")") {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op(")") {
                        break;
                    }
                    items.push(self.expression()?);
                }
                self.expect_op(")")?;
                Ok(Expr::List(items))
            }
            Tok::Op("[") => {
                self.advance();
                if self.eat_op("]") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.expression()?;
                if self.at_keyword("for") {
                    let comprehension = self.comprehension(first)?;
                    self.expect_op("]")?;
                    return Ok(comprehension);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.at_op("]") {
                        break;
                    }
                    items.push(self.expression()?);
                }
                self.expect_op("]")?;
                Ok(Expr::List(items))
            }
            Tok::Op("{") => {
                self.advance();
                let mut entries = Vec::new();
                while !self.eat_op("}") {
                    let key = self.expression()?;
                    self.expect_op(":")?;
                    let value = self.expression()?;
                    entries.push((key, value));
                    if !self.eat_op(",") {
                        self.expect_op("}")?;
                        break;
                    }
                }
                Ok(Expr::Dict(entries))
            }
            Tok::End | Tok::Newline => Err(self.error_here("unexpected end of fragment")),
            _ => Err(self.error_here("invalid syntax")),
        }
    }
}

/// Names assigned by `target = ...`: a single name or a flat tuple of names.
fn assign_targets(target: &Expr) -> Option<Vec<String>> {
    match target {
        Expr::Name(name) => Some(vec![name.clone()]),
        Expr::List(items) => items
            .iter()
            .map(|item| match item {
                Expr::Name(name) => Some(name.clone()),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::lexer::tokenize;

    fn parse(source: &str) -> Program {
        let tokens = tokenize(source).unwrap();
        Parser::new(tokens, source).program().unwrap()
    }

    fn parse_err(source: &str) -> ParseError {
        let tokens = tokenize(source).unwrap();
        Parser::new(tokens, source).program().unwrap_err()
    }

    #[test]
    fn test_single_expression() {
        assert!(matches!(parse("pipe.upper()"), Program::Expr(Expr::Call(..))));
    }

    #[test]
    fn test_statements() {
        let Program::Suite(stmts) = parse("x = 1; pipe += x\ndel x") else {
            panic!("expected statements");
        };
        assert_eq!(stmts.len(), 3);
        assert!(matches!(&stmts[0], Stmt::Assign(names, _) if names == &["x"]));
        assert!(matches!(&stmts[1], Stmt::AugAssign(name, BinOp::Add, _) if name == "pipe"));
        assert!(matches!(&stmts[2], Stmt::Del(names) if names == &["x"]));
    }

    #[test]
    fn test_precedence() {
        let Program::Expr(Expr::Binary(BinOp::Add, _, right)) = parse("1 + 2 * 3") else {
            panic!("expected addition at the top");
        };
        assert!(matches!(*right, Expr::Binary(BinOp::Mul, ..)));

        let Program::Expr(Expr::Unary(UnaryOp::Neg, operand)) = parse("-2 ** 2") else {
            panic!("expected negation at the top");
        };
        assert!(matches!(*operand, Expr::Binary(BinOp::Pow, ..)));
    }

    #[test]
    fn test_comparisons() {
        let Program::Expr(Expr::Compare(_, ops)) = parse("1 < x <= 3 not in y is not None")
        else {
            panic!("expected comparison");
        };
        let ops: Vec<CmpOp> = ops.into_iter().map(|(op, _)| op).collect();
        assert_eq!(ops, vec![CmpOp::Lt, CmpOp::Le, CmpOp::NotIn, CmpOp::IsNot]);
    }

    #[test]
    fn test_slices() {
        assert!(matches!(
            parse("pipe[::-1]"),
            Program::Expr(Expr::Slice(_, [None, None, Some(_)]))
        ));
        assert!(matches!(
            parse("pipe[1:]"),
            Program::Expr(Expr::Slice(_, [Some(_), None, None]))
        ));
        assert!(matches!(parse("pipe[0]"), Program::Expr(Expr::Index(..))));
    }

    #[test]
    fn test_comprehensions_and_lambdas() {
        assert!(matches!(
            parse("[x * 2 for x in pipe if x]"),
            Program::Expr(Expr::Comprehension(_))
        ));
        assert!(matches!(
            parse("sum(x for x in pipe)"),
            Program::Expr(Expr::Call(_, args)) if matches!(args[0], Expr::Comprehension(_))
        ));
        let Program::Expr(Expr::Lambda(lambda)) = parse("lambda a, b: a + b") else {
            panic!("expected lambda");
        };
        assert_eq!(lambda.params, vec!["a", "b"]);
        assert_eq!(lambda.snippet, "lambda a, b: a + b");
    }

    #[test]
    fn test_string_concatenation() {
        assert!(matches!(
            parse("'a' 'b'"),
            Program::Expr(Expr::Literal(Value::Str(s))) if &*s == "ab"
        ));
    }

    #[test]
    fn test_conditional() {
        assert!(matches!(
            parse("1 if pipe else 2"),
            Program::Expr(Expr::IfElse(..))
        ));
    }

    #[test]
    fn test_errors() {
        let err = parse_err("x = * 1");
        assert_eq!((err.line, err.col), (1, 4));
        assert_eq!(parse_err("1 = x").message, "cannot assign to expression");
        assert_eq!(parse_err("len(").message, "unexpected end of fragment");
    }
}
