//! Conditional compilation pre-pass.
//!
//! Runs over the raw token stream before parsing. Tokens inside inactive
//! `$IFDEF`/`$IF` branches are dropped, comments are split off as trivia,
//! and `$DEFINE`/`$UNDEF` update the symbol set as they are reached.

use crate::diagnostics::{error_codes, Diagnostic, DiagnosticHandler};
use crate::errors::DirectiveError;
use crate::span::Span;
use crate::syntax::token::{Token, TokenKind};
use rustc_hash::FxHashSet;

/// Inputs to directive evaluation.
#[derive(Debug, Clone)]
pub struct DirectiveOptions {
    pub defines: Vec<String>,
    pub compiler_version: f64,
    pub rtl_version: f64,
}

impl Default for DirectiveOptions {
    fn default() -> Self {
        Self {
            defines: Vec::new(),
            compiler_version: 36.0,
            rtl_version: 36.0,
        }
    }
}

/// Token stream after the pre-pass.
#[derive(Debug, Default)]
pub struct Preprocessed {
    /// Active non-trivia tokens, terminated by `Eof`.
    pub tokens: Vec<Token>,
    /// Comments (not directives) from active regions.
    pub comments: Vec<Token>,
}

#[derive(Debug)]
struct Frame {
    parent_active: bool,
    active: bool,
    branch_taken: bool,
    opener: String,
    span: Span,
}

struct Conditionals<'a> {
    defines: FxHashSet<String>,
    options: &'a DirectiveOptions,
    stack: Vec<Frame>,
}

impl<'a> Conditionals<'a> {
    fn new(options: &'a DirectiveOptions) -> Self {
        Self {
            defines: options.defines.iter().map(|d| d.to_uppercase()).collect(),
            options,
            stack: Vec::new(),
        }
    }

    fn is_active(&self) -> bool {
        self.stack.last().map_or(true, |frame| frame.active)
    }

    fn is_defined(&self, name: &str) -> bool {
        self.defines.contains(&name.trim().to_uppercase())
    }

    fn open(&mut self, opener: &str, condition: bool, span: Span) {
        let parent_active = self.is_active();
        self.stack.push(Frame {
            parent_active,
            active: parent_active && condition,
            branch_taken: condition,
            opener: opener.to_string(),
            span,
        });
    }

    fn apply(
        &mut self,
        body: &str,
        span: Span,
        handler: &dyn DiagnosticHandler,
    ) -> Result<(), DirectiveError> {
        let body = body.trim();
        let (name, argument) = match body.find(|c: char| c.is_whitespace()) {
            Some(pos) => (&body[..pos], body[pos..].trim()),
            None => (body, ""),
        };
        let name = name.to_uppercase();

        match name.as_str() {
            "IFDEF" => {
                let defined = self.is_defined(first_word(argument));
                self.open("$IFDEF", defined, span);
            }
            "IFNDEF" => {
                let defined = self.is_defined(first_word(argument));
                self.open("$IFNDEF", !defined, span);
            }
            "IF" => {
                let condition = if self.is_active() {
                    self.evaluate_or_report(argument, span, handler)
                } else {
                    false
                };
                self.open("$IF", condition, span);
            }
            "IFOPT" => self.open("$IFOPT", false, span),
            "ELSEIF" => {
                let evaluate = matches!(
                    self.stack.last(),
                    Some(frame) if frame.parent_active && !frame.branch_taken
                );
                let condition = evaluate && self.evaluate_or_report(argument, span, handler);
                let frame = self
                    .stack
                    .last_mut()
                    .ok_or_else(|| DirectiveError::Unbalanced("$ELSEIF".to_string()))?;
                frame.active = frame.parent_active && !frame.branch_taken && condition;
                frame.branch_taken |= condition;
            }
            "ELSE" => {
                let frame = self
                    .stack
                    .last_mut()
                    .ok_or_else(|| DirectiveError::Unbalanced("$ELSE".to_string()))?;
                frame.active = frame.parent_active && !frame.branch_taken;
                frame.branch_taken = true;
            }
            "ENDIF" | "IFEND" => {
                self.stack
                    .pop()
                    .ok_or_else(|| DirectiveError::Unbalanced(format!("${}", name)))?;
            }
            "DEFINE" if self.is_active() => {
                self.defines.insert(first_word(argument).to_uppercase());
            }
            "UNDEF" if self.is_active() => {
                self.defines.remove(&first_word(argument).to_uppercase());
            }
            // Include files, resources, switches and messages carry no
            // conditional state.
            _ => {}
        }
        Ok(())
    }

    fn evaluate_or_report(
        &self,
        expression: &str,
        span: Span,
        handler: &dyn DiagnosticHandler,
    ) -> bool {
        match evaluate_condition(expression, self) {
            Ok(value) => value,
            Err(err) => {
                handler.report(Diagnostic::error_with_code(
                    span,
                    error_codes::INVALID_DIRECTIVE_EXPRESSION,
                    err.to_string(),
                ));
                false
            }
        }
    }
}

fn first_word(text: &str) -> &str {
    text.split_whitespace().next().unwrap_or("")
}

/// Apply conditional compilation to a raw token stream.
pub fn preprocess(
    tokens: Vec<Token>,
    options: &DirectiveOptions,
    handler: &dyn DiagnosticHandler,
) -> Preprocessed {
    let mut state = Conditionals::new(options);
    let mut out = Preprocessed {
        tokens: Vec::with_capacity(tokens.len()),
        comments: Vec::new(),
    };

    for token in tokens {
        if token.kind == TokenKind::Eof {
            out.tokens.push(token);
            break;
        }
        if let Some(body) = token.directive_body() {
            if let Err(err) = state.apply(body, token.span, handler) {
                handler.report(Diagnostic::error_with_code(
                    token.span,
                    error_codes::UNBALANCED_DIRECTIVE,
                    err.to_string(),
                ));
            }
            continue;
        }
        if !state.is_active() {
            continue;
        }
        if token.kind.is_trivia() {
            out.comments.push(token);
        } else {
            out.tokens.push(token);
        }
    }

    for frame in state.stack.iter().rev() {
        handler.report(Diagnostic::error_with_code(
            frame.span,
            error_codes::UNBALANCED_DIRECTIVE,
            DirectiveError::Unterminated(frame.opener.clone()).to_string(),
        ));
    }

    out
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Number(f64),
    Unknown,
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Unknown => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum CondToken {
    Ident(String),
    Number(f64),
    LParen,
    RParen,
    Comma,
    Op(&'static str),
}

fn lex_condition(text: &str) -> Result<Vec<CondToken>, DirectiveError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(CondToken::Ident(chars[start..i].iter().collect()));
        } else if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal
                .parse::<f64>()
                .map_err(|_| DirectiveError::InvalidExpression(literal.clone()))?;
            tokens.push(CondToken::Number(value));
        } else {
            let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
            let op = match two.as_str() {
                "<>" => Some("<>"),
                "<=" => Some("<="),
                ">=" => Some(">="),
                _ => None,
            };
            if let Some(op) = op {
                tokens.push(CondToken::Op(op));
                i += 2;
                continue;
            }
            tokens.push(match c {
                '(' => CondToken::LParen,
                ')' => CondToken::RParen,
                ',' => CondToken::Comma,
                '=' => CondToken::Op("="),
                '<' => CondToken::Op("<"),
                '>' => CondToken::Op(">"),
                _ => return Err(DirectiveError::InvalidExpression(text.to_string())),
            });
            i += 1;
        }
    }
    Ok(tokens)
}

struct ConditionParser<'c, 'o> {
    tokens: Vec<CondToken>,
    pos: usize,
    state: &'c Conditionals<'o>,
    source: &'c str,
}

impl ConditionParser<'_, '_> {
    fn peek(&self) -> Option<&CondToken> {
        self.tokens.get(self.pos)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(CondToken::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn error(&self) -> DirectiveError {
        DirectiveError::InvalidExpression(self.source.to_string())
    }

    fn expect(&mut self, expected: CondToken) -> Result<(), DirectiveError> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error())
        }
    }

    fn parse_or(&mut self) -> Result<Value, DirectiveError> {
        let mut lhs = self.parse_and()?;
        while self.peek_keyword("or") {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Value::Bool(lhs.truthy() || rhs.truthy());
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Value, DirectiveError> {
        let mut lhs = self.parse_comparison()?;
        while self.peek_keyword("and") {
            self.pos += 1;
            let rhs = self.parse_comparison()?;
            lhs = Value::Bool(lhs.truthy() && rhs.truthy());
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Value, DirectiveError> {
        let lhs = self.parse_unary()?;
        let op = match self.peek() {
            Some(CondToken::Op(op)) => *op,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.parse_unary()?;
        let result = match (&lhs, &rhs) {
            (Value::Number(a), Value::Number(b)) => match op {
                "=" => a == b,
                "<>" => a != b,
                "<" => a < b,
                "<=" => a <= b,
                ">" => a > b,
                _ => a >= b,
            },
            (Value::Bool(a), Value::Bool(b)) => match op {
                "=" => a == b,
                "<>" => a != b,
                _ => false,
            },
            _ => false,
        };
        Ok(Value::Bool(result))
    }

    fn parse_unary(&mut self) -> Result<Value, DirectiveError> {
        if self.peek_keyword("not") {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(match operand {
                Value::Unknown => Value::Unknown,
                other => Value::Bool(!other.truthy()),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Value, DirectiveError> {
        let token = self.peek().cloned().ok_or_else(|| self.error())?;
        self.pos += 1;
        match token {
            CondToken::Number(n) => Ok(Value::Number(n)),
            CondToken::LParen => {
                let value = self.parse_or()?;
                self.expect(CondToken::RParen)?;
                Ok(value)
            }
            CondToken::Ident(name) => {
                if self.peek() == Some(&CondToken::LParen) {
                    self.pos += 1;
                    let mut args = Vec::new();
                    while let Some(token) = self.peek().cloned() {
                        self.pos += 1;
                        match token {
                            CondToken::RParen => break,
                            CondToken::Ident(arg) => args.push(arg),
                            CondToken::Comma => {}
                            _ => return Err(self.error()),
                        }
                    }
                    let upper = name.to_uppercase();
                    return Ok(match upper.as_str() {
                        "DEFINED" => Value::Bool(
                            args.first().map_or(false, |arg| self.state.is_defined(arg)),
                        ),
                        "DECLARED" => Value::Bool(false),
                        _ => Value::Unknown,
                    });
                }
                let upper = name.to_uppercase();
                Ok(match upper.as_str() {
                    "TRUE" => Value::Bool(true),
                    "FALSE" => Value::Bool(false),
                    "COMPILERVERSION" => Value::Number(self.state.options.compiler_version),
                    "RTLVERSION" => Value::Number(self.state.options.rtl_version),
                    _ => Value::Unknown,
                })
            }
            _ => Err(self.error()),
        }
    }
}

fn evaluate_condition(text: &str, state: &Conditionals<'_>) -> Result<bool, DirectiveError> {
    let tokens = lex_condition(text)?;
    if tokens.is_empty() {
        return Err(DirectiveError::InvalidExpression(text.to_string()));
    }
    let mut parser = ConditionParser {
        tokens,
        pos: 0,
        state,
        source: text,
    };
    let value = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error());
    }
    Ok(value.truthy())
}
