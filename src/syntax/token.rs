//! Lexical analysis for Delphi source.
//!
//! Tokenization is derived with logos. Reserved words match without regard
//! to ASCII case; the lexeme keeps the original spelling. Comments and
//! compiler directives are produced as trivia tokens so the directive
//! pre-pass can see them; the parser never does.

use crate::diagnostics::{error_codes, Diagnostic, DiagnosticHandler};
use crate::errors::LexerError;
use crate::span::{LineIndex, Span};
use logos::Logos;
use std::fmt;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum TokenKind {
    // === Reserved words ===
    #[token("and", ignore(ascii_case))]
    And,
    #[token("array", ignore(ascii_case))]
    Array,
    #[token("as", ignore(ascii_case))]
    As,
    #[token("asm", ignore(ascii_case))]
    Asm,
    #[token("begin", ignore(ascii_case))]
    Begin,
    #[token("case", ignore(ascii_case))]
    Case,
    #[token("class", ignore(ascii_case))]
    Class,
    #[token("const", ignore(ascii_case))]
    Const,
    #[token("constructor", ignore(ascii_case))]
    Constructor,
    #[token("destructor", ignore(ascii_case))]
    Destructor,
    #[token("dispinterface", ignore(ascii_case))]
    DispInterface,
    #[token("div", ignore(ascii_case))]
    Div,
    #[token("do", ignore(ascii_case))]
    Do,
    #[token("downto", ignore(ascii_case))]
    DownTo,
    #[token("else", ignore(ascii_case))]
    Else,
    #[token("end", ignore(ascii_case))]
    End,
    #[token("except", ignore(ascii_case))]
    Except,
    #[token("exports", ignore(ascii_case))]
    Exports,
    #[token("file", ignore(ascii_case))]
    File,
    #[token("finalization", ignore(ascii_case))]
    Finalization,
    #[token("finally", ignore(ascii_case))]
    Finally,
    #[token("for", ignore(ascii_case))]
    For,
    #[token("function", ignore(ascii_case))]
    Function,
    #[token("goto", ignore(ascii_case))]
    Goto,
    #[token("if", ignore(ascii_case))]
    If,
    #[token("implementation", ignore(ascii_case))]
    Implementation,
    #[token("in", ignore(ascii_case))]
    In,
    #[token("inherited", ignore(ascii_case))]
    Inherited,
    #[token("initialization", ignore(ascii_case))]
    Initialization,
    #[token("inline", ignore(ascii_case))]
    Inline,
    #[token("interface", ignore(ascii_case))]
    Interface,
    #[token("is", ignore(ascii_case))]
    Is,
    #[token("label", ignore(ascii_case))]
    Label,
    #[token("library", ignore(ascii_case))]
    Library,
    #[token("mod", ignore(ascii_case))]
    Mod,
    #[token("nil", ignore(ascii_case))]
    Nil,
    #[token("not", ignore(ascii_case))]
    Not,
    #[token("object", ignore(ascii_case))]
    Object,
    #[token("of", ignore(ascii_case))]
    Of,
    #[token("or", ignore(ascii_case))]
    Or,
    #[token("packed", ignore(ascii_case))]
    Packed,
    #[token("procedure", ignore(ascii_case))]
    Procedure,
    #[token("program", ignore(ascii_case))]
    Program,
    #[token("property", ignore(ascii_case))]
    Property,
    #[token("raise", ignore(ascii_case))]
    Raise,
    #[token("record", ignore(ascii_case))]
    Record,
    #[token("repeat", ignore(ascii_case))]
    Repeat,
    #[token("resourcestring", ignore(ascii_case))]
    ResourceString,
    #[token("set", ignore(ascii_case))]
    Set,
    #[token("shl", ignore(ascii_case))]
    Shl,
    #[token("shr", ignore(ascii_case))]
    Shr,
    #[token("string", ignore(ascii_case))]
    String,
    #[token("then", ignore(ascii_case))]
    Then,
    #[token("threadvar", ignore(ascii_case))]
    ThreadVar,
    #[token("to", ignore(ascii_case))]
    To,
    #[token("try", ignore(ascii_case))]
    Try,
    #[token("type", ignore(ascii_case))]
    Type,
    #[token("unit", ignore(ascii_case))]
    Unit,
    #[token("until", ignore(ascii_case))]
    Until,
    #[token("uses", ignore(ascii_case))]
    Uses,
    #[token("var", ignore(ascii_case))]
    Var,
    #[token("while", ignore(ascii_case))]
    While,
    #[token("with", ignore(ascii_case))]
    With,
    #[token("xor", ignore(ascii_case))]
    Xor,

    // === Identifiers and literals ===
    #[regex(r"[\p{L}_][\p{L}\p{N}_]*")]
    Identifier,
    /// `&begin` - a reserved word used as an identifier
    #[regex(r"&[\p{L}_][\p{L}\p{N}_]*")]
    EscapedIdentifier,
    #[regex(r"[0-9][0-9_]*")]
    IntegerLiteral,
    #[regex(r"\$[0-9A-Fa-f][0-9A-Fa-f_]*")]
    HexLiteral,
    #[regex(r"%[01][01_]*")]
    BinaryLiteral,
    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?")]
    #[regex(r"[0-9][0-9_]*[eE][+-]?[0-9]+")]
    RealLiteral,
    #[regex(r"'([^'\r\n]|'')*'")]
    QuotedString,
    /// `#13`, `#$0A`
    #[regex(r"#[0-9]+")]
    #[regex(r"#\$[0-9A-Fa-f]+")]
    ControlString,

    // === Trivia ===
    #[regex(r"\{[^}]*\}")]
    BraceComment,
    #[token("(*", paren_comment)]
    ParenComment,
    #[regex(r"//[^\r\n]*")]
    LineComment,

    // === Operators and delimiters ===
    #[token(":=")]
    Assign,
    #[token(":")]
    Colon,
    #[token(";")]
    Semicolon,
    #[token(",")]
    Comma,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("^")]
    Caret,
    #[token("@@")]
    AtAt,
    #[token("@")]
    At,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("=")]
    Eq,
    #[token("<>")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    /// Synthetic end-of-file marker appended by [`tokenize`].
    Eof,
}

impl TokenKind {
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::BraceComment | TokenKind::ParenComment | TokenKind::LineComment
        )
    }

    pub fn is_identifier(self) -> bool {
        matches!(self, TokenKind::Identifier | TokenKind::EscapedIdentifier)
    }

    pub fn is_reserved_word(self) -> bool {
        (self as u16) <= (TokenKind::Xor as u16)
    }

    fn punctuation(self) -> Option<&'static str> {
        Some(match self {
            TokenKind::Assign => ":=",
            TokenKind::Colon => ":",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::DotDot => "..",
            TokenKind::Dot => ".",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Caret => "^",
            TokenKind::AtAt => "@@",
            TokenKind::At => "@",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Eq => "=",
            TokenKind::NotEq => "<>",
            TokenKind::LtEq => "<=",
            TokenKind::GtEq => ">=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            _ => return None,
        })
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self.punctuation() {
            return write!(f, "'{}'", text);
        }
        match self {
            TokenKind::Identifier | TokenKind::EscapedIdentifier => write!(f, "identifier"),
            TokenKind::IntegerLiteral
            | TokenKind::HexLiteral
            | TokenKind::BinaryLiteral
            | TokenKind::RealLiteral => write!(f, "number"),
            TokenKind::QuotedString | TokenKind::ControlString => write!(f, "string"),
            TokenKind::Eof => write!(f, "end of file"),
            TokenKind::BraceComment | TokenKind::ParenComment | TokenKind::LineComment => {
                write!(f, "comment")
            }
            other => write!(f, "'{}'", format!("{:?}", other).to_lowercase()),
        }
    }
}

/// A lexed token with its original spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    /// Case-insensitive comparison against a contextual keyword such as
    /// `override` or `strict`.
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text.eq_ignore_ascii_case(word)
    }

    /// Identifier name with a leading `&` removed.
    pub fn identifier_name(&self) -> &str {
        self.text.strip_prefix('&').unwrap_or(&self.text)
    }

    /// Compiler directive body for `{$...}` / `(*$...*)` comments.
    pub fn directive_body(&self) -> Option<&str> {
        match self.kind {
            TokenKind::BraceComment => self
                .text
                .strip_prefix("{$")
                .and_then(|rest| rest.strip_suffix('}')),
            TokenKind::ParenComment => self
                .text
                .strip_prefix("(*$")
                .and_then(|rest| rest.strip_suffix("*)")),
            _ => None,
        }
    }
}

/// Consumes the body of a `(* ... *)` comment up to the first `*)`.
fn paren_comment(lex: &mut logos::Lexer<TokenKind>) -> bool {
    match lex.remainder().find("*)") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => false,
    }
}

/// Tokenize `source`, reporting lexical errors to `handler` and carrying on.
///
/// The returned vector always ends with a single [`TokenKind::Eof`] token.
pub fn tokenize(source: &str, handler: &dyn DiagnosticHandler) -> Vec<Token> {
    let source = source.strip_prefix('\u{FEFF}').unwrap_or(source);
    let index = LineIndex::new(source);
    let mut tokens = Vec::with_capacity(source.len() / 4);
    let mut lexer = TokenKind::lexer(source);

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = index.span(range.start, range.end);
        match result {
            Ok(kind) => tokens.push(Token::new(kind, lexer.slice(), span)),
            Err(()) => {
                let rest = &source[range.start..];
                if rest.starts_with('{') || rest.starts_with("(*") {
                    handler.report(Diagnostic::error_with_code(
                        span,
                        error_codes::UNTERMINATED_COMMENT,
                        LexerError::UnterminatedComment.to_string(),
                    ));
                    break;
                } else if rest.starts_with('\'') {
                    handler.report(Diagnostic::error_with_code(
                        span,
                        error_codes::UNTERMINATED_STRING,
                        LexerError::UnterminatedString.to_string(),
                    ));
                    let line_end = rest.find('\n').map_or(source.len(), |n| range.start + n);
                    let text = &source[range.start..line_end];
                    tokens.push(Token::new(
                        TokenKind::QuotedString,
                        format!("{}'", text.trim_end_matches('\r')),
                        index.span(range.start, line_end),
                    ));
                    if line_end >= source.len() {
                        break;
                    }
                    lexer.bump(line_end - range.end);
                } else {
                    handler.report(Diagnostic::error_with_code(
                        span,
                        error_codes::UNEXPECTED_CHAR,
                        LexerError::UnexpectedCharacter(lexer.slice().to_string()).to_string(),
                    ));
                }
            }
        }
    }

    let end = source.len();
    tokens.push(Token::new(TokenKind::Eof, "", index.span(end, end)));
    tokens
}
