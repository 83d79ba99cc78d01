//! Tokenizer for fragment source text.

use std::fmt;

/// Operators and punctuation, longest first so prefixes lose.
const OPERATORS: &[&str] = &[
    "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "+", "-", "*", "/", "%", "<", ">", "=",
    "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Name(String),
    Op(&'static str),
    Newline,
    End,
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tok::Int(i) => write!(f, "{i}"),
            Tok::Float(x) => write!(f, "{x}"),
            Tok::Str(s) => write!(f, "{s:?}"),
            Tok::Name(name) => f.write_str(name),
            Tok::Op(op) => f.write_str(op),
            Tok::Newline => f.write_str("newline"),
            Tok::End => f.write_str("end of input"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub tok: Tok,
    /// 1-based line.
    pub line: usize,
    /// 0-based character column.
    pub col: usize,
}

/// A tokenizing failure at a position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LexError {
    pub line: usize,
    pub col: usize,
    pub message: String,
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    depth: usize,
    tokens: Vec<Token>,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        col: 0,
        depth: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn error(&self, line: usize, col: usize, message: impl Into<String>) -> LexError {
        LexError {
            line,
            col,
            message: message.into(),
        }
    }

    fn push(&mut self, tok: Tok, line: usize, col: usize) {
        self.tokens.push(Token { tok, line, col });
    }

    fn run(&mut self) -> Result<(), LexError> {
        while let Some(c) = self.peek() {
            let (line, col) = (self.line, self.col);
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\\' if self.peek_at(1) == Some('\n') => {
                    self.bump();
                    self.bump();
                }
                '\n' => {
                    self.bump();
                    if self.depth == 0 {
                        self.push(Tok::Newline, line, col);
                    }
                }
                '#' => {
                    while self.peek().is_some_and(|c| c != '\n') {
                        self.bump();
                    }
                }
                '\'' | '"' => {
                    let text = self.string(false)?;
                    self.push(Tok::Str(text), line, col);
                }
                'r' | 'R' if matches!(self.peek_at(1), Some('\'' | '"')) => {
                    self.bump();
                    let text = self.string(true)?;
                    self.push(Tok::Str(text), line, col);
                }
                c if c.is_ascii_digit() => self.number()?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number()?,
                c if c.is_alphabetic() || c == '_' => {
                    let mut name = String::new();
                    while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
                        name.push(c);
                        self.bump();
                    }
                    self.push(Tok::Name(name), line, col);
                }
                _ => self.operator(line, col)?,
            }
        }
        let (line, col) = (self.line, self.col);
        self.push(Tok::End, line, col);
        Ok(())
    }

    fn operator(&mut self, line: usize, col: usize) -> Result<(), LexError> {
        let rest: String = self.chars[self.pos..].iter().take(2).collect();
        let Some(op) = OPERATORS.iter().find(|op| rest.starts_with(**op)) else {
            return Err(self.error(line, col, "invalid character in fragment"));
        };
        for _ in 0..op.chars().count() {
            self.bump();
        }
        match *op {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => {
                if self.depth == 0 {
                    return Err(self.error(line, col, format!("unmatched '{op}'")));
                }
                self.depth -= 1;
            }
            _ => {}
        }
        self.push(Tok::Op(*op), line, col);
        Ok(())
    }

    fn number(&mut self) -> Result<(), LexError> {
        let (line, col) = (self.line, self.col);
        let mut text = String::new();
        let mut float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' | '_' => {}
                '.' if !float => float = true,
                'e' | 'E' if matches!(self.peek_at(1), Some('0'..='9' | '+' | '-')) => {
                    float = true;
                    text.push(c);
                    self.bump();
                    if let Some(sign @ ('+' | '-')) = self.peek() {
                        text.push(sign);
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            if c != '_' {
                text.push(c);
            }
            self.bump();
        }
        let tok = if float {
            text.parse().map(Tok::Float).ok()
        } else {
            text.parse().map(Tok::Int).ok()
        };
        let tok = tok.ok_or_else(|| self.error(line, col, format!("invalid number '{text}'")))?;
        self.push(tok, line, col);
        Ok(())
    }

    /// A quoted string starting at the opening quote.
    fn string(&mut self, raw: bool) -> Result<String, LexError> {
        let (line, col) = (self.line, self.col);
        let quote = self.bump().unwrap_or('\'');
        let mut text = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(self.error(line, col, "unterminated string literal"));
                }
                Some(c) if c == quote => return Ok(text),
                Some('\\') if raw => {
                    text.push('\\');
                    if let Some(c) = self.bump() {
                        text.push(c);
                    }
                }
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('0') => text.push('\0'),
                    Some('\\') => text.push('\\'),
                    Some('\'') => text.push('\''),
                    Some('"') => text.push('"'),
                    Some('\n') => {}
                    Some('x') => {
                        let hex: String = (0..2).filter_map(|_| self.bump()).collect();
                        let c = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| self.error(line, col, "invalid \\x escape"))?;
                        text.push(c);
                    }
                    Some(other) => {
                        text.push('\\');
                        text.push(other);
                    }
                    None => return Err(self.error(line, col, "unterminated string literal")),
                },
                Some(c) => text.push(c),
            }
        }
    }
}
