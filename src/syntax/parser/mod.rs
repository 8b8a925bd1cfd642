//! Recursive-descent parser for Delphi units, programs and libraries.
//!
//! The parser works on the directive-filtered token stream. It never
//! aborts a file: a failed construct is reported to the diagnostic handler,
//! the cursor is moved to the next synchronisation point and parsing
//! continues, so later phases always receive a (possibly partial) tree.

mod decl;
mod expr;
mod stmt;
mod types;

use crate::diagnostics::{error_codes, Diagnostic, DiagnosticHandler};
use crate::errors::ParserError;
use crate::span::Span;
use crate::syntax::ast::*;
use crate::syntax::directives::{preprocess, DirectiveOptions};
use crate::syntax::token::{tokenize, Token, TokenKind};

/// Errors reported before the parser stops recording further diagnostics
/// for a file and abandons the remainder.
const MAX_ERRORS: usize = 100;

/// Nesting limit for expressions and statements.
const MAX_DEPTH: usize = 256;

pub(crate) type ParseResult<T> = Result<T, ParserError>;

/// Result of parsing one file.
#[derive(Debug)]
pub struct ParsedFile {
    pub file: SourceFile,
    /// Comments from active regions, in source order.
    pub comments: Vec<Token>,
}

/// Tokenize, preprocess and parse `source`.
pub fn parse_source(
    source: &str,
    options: &DirectiveOptions,
    handler: &dyn DiagnosticHandler,
) -> ParsedFile {
    let raw = tokenize(source, handler);
    let pre = preprocess(raw, options, handler);
    let mut parser = Parser::new(pre.tokens, handler);
    let file = parser.parse_file();
    ParsedFile {
        file,
        comments: pre.comments,
    }
}

pub struct Parser<'h> {
    tokens: Vec<Token>,
    pos: usize,
    handler: &'h dyn DiagnosticHandler,
    next_id: u32,
    error_count: usize,
    gave_up: bool,
    depth: usize,
}

impl<'h> Parser<'h> {
    pub fn new(mut tokens: Vec<Token>, handler: &'h dyn DiagnosticHandler) -> Self {
        if tokens.last().map_or(true, |t| t.kind != TokenKind::Eof) {
            let end = tokens.last().map(|t| t.span).unwrap_or_default();
            let eof = Span::new(end.end, end.end, end.end_line.max(1), 1);
            tokens.push(Token::new(TokenKind::Eof, "", eof));
        }
        Self {
            tokens,
            pos: 0,
            handler,
            next_id: 0,
            error_count: 0,
            gave_up: false,
            depth: 0,
        }
    }

    // ----- cursor -------------------------------------------------------

    pub(crate) fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.pos.min(last)]
    }

    pub(crate) fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    pub(crate) fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    pub(crate) fn at_word(&self, word: &str) -> bool {
        self.peek().is_word(word)
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.gave_up || self.at(TokenKind::Eof)
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().span
    }

    /// Span of the most recently consumed token.
    pub(crate) fn previous_span(&self) -> Span {
        if self.pos == 0 {
            return self.current_span();
        }
        self.tokens[(self.pos - 1).min(self.tokens.len() - 1)].span
    }

    pub(crate) fn span_from(&self, start: Span) -> Span {
        start.merge(&self.previous_span())
    }

    pub(crate) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_word(&mut self, word: &str) -> bool {
        if self.at_word(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.at(kind) {
            return Ok(self.advance());
        }
        Err(self.unexpected(&kind.to_string()))
    }

    pub(crate) fn expect_word(&mut self, word: &str) -> ParseResult<Token> {
        if self.at_word(word) {
            return Ok(self.advance());
        }
        Err(self.unexpected(&format!("'{}'", word)))
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParserError {
        if self.at(TokenKind::Eof) {
            ParserError::UnexpectedEof(expected.to_string())
        } else {
            ParserError::UnexpectedToken {
                expected: expected.to_string(),
                found: format!("'{}'", self.peek().text),
            }
        }
    }

    pub(crate) fn at_ident(&self) -> bool {
        self.peek_kind().is_identifier()
    }

    pub(crate) fn expect_ident(&mut self) -> ParseResult<Ident> {
        if self.at_ident() {
            let token = self.advance();
            return Ok(Ident::new(token.identifier_name(), token.span));
        }
        Err(self.unexpected("identifier"))
    }

    /// Identifier after `.`: reserved words are accepted as member names
    /// (`TStream.Create`, `Foo.&Type`, `Self.Type`).
    pub(crate) fn expect_member_name(&mut self) -> ParseResult<Ident> {
        let token = self.peek();
        if token.kind.is_identifier() || token.kind.is_reserved_word() {
            let token = self.advance();
            return Ok(Ident::new(token.identifier_name(), token.span));
        }
        Err(self.unexpected("identifier"))
    }

    pub(crate) fn ident_list(&mut self) -> ParseResult<Vec<Ident>> {
        let mut names = vec![self.expect_ident()?];
        while self.eat(TokenKind::Comma) {
            names.push(self.expect_ident()?);
        }
        Ok(names)
    }

    pub(crate) fn qualified_name(&mut self) -> ParseResult<QualifiedName> {
        let first = self.expect_ident()?;
        let start = first.span;
        let mut parts = vec![first];
        while self.at(TokenKind::Dot) && self.peek_nth(1).kind.is_identifier() {
            self.advance();
            parts.push(self.expect_ident()?);
        }
        Ok(QualifiedName {
            span: self.span_from(start),
            parts,
        })
    }

    pub(crate) fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    // ----- error reporting and recovery ---------------------------------

    pub(crate) fn report(&mut self, error: ParserError) {
        if self.gave_up {
            return;
        }
        self.error_count += 1;
        let span = self.current_span();
        let code = match &error {
            ParserError::UnexpectedEof(_) => error_codes::UNEXPECTED_EOF,
            ParserError::UnexpectedToken { expected, .. } if expected == "identifier" => {
                error_codes::EXPECTED_IDENTIFIER
            }
            ParserError::UnexpectedToken { expected, .. } if expected == "expression" => {
                error_codes::EXPECTED_EXPRESSION
            }
            ParserError::UnexpectedToken { expected, .. } if expected == "type" => {
                error_codes::EXPECTED_TYPE
            }
            ParserError::UnexpectedToken { .. } => error_codes::EXPECTED_TOKEN,
            ParserError::InvalidSyntax(_) => error_codes::UNEXPECTED_TOKEN,
        };
        self.handler
            .report(Diagnostic::error_with_code(span, code, error.to_string()));
        if self.error_count >= MAX_ERRORS {
            self.handler.report(Diagnostic::error_with_code(
                span,
                error_codes::TOO_MANY_ERRORS,
                "Too many syntax errors, remainder of file skipped",
            ));
            self.gave_up = true;
        }
    }

    /// Skip to just after the next `;`, or to the next token that can start
    /// a declaration or close a block, whichever comes first.
    pub(crate) fn synchronize(&mut self) {
        let start = self.pos;
        while !self.at_eof() {
            match self.peek_kind() {
                TokenKind::Semicolon => {
                    self.advance();
                    return;
                }
                TokenKind::End
                | TokenKind::Begin
                | TokenKind::Type
                | TokenKind::Var
                | TokenKind::Const
                | TokenKind::Procedure
                | TokenKind::Function
                | TokenKind::Constructor
                | TokenKind::Destructor
                | TokenKind::Implementation
                | TokenKind::Initialization
                | TokenKind::Finalization
                | TokenKind::Except
                | TokenKind::Finally
                | TokenKind::Until
                    if self.pos > start =>
                {
                    return
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    pub(crate) fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            self.depth -= 1;
            return Err(ParserError::InvalidSyntax(
                "nesting too deep".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Skip a `[...]` attribute list.
    pub(crate) fn skip_attributes(&mut self) {
        while self.at(TokenKind::LBracket) {
            let mut depth = 0usize;
            while !self.at_eof() {
                match self.advance().kind {
                    TokenKind::LBracket => depth += 1,
                    TokenKind::RBracket => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    // ----- file structure -----------------------------------------------

    pub fn parse_file(&mut self) -> SourceFile {
        let start = self.current_span();
        let kind = match self.peek_kind() {
            TokenKind::Unit => FileKind::Unit,
            TokenKind::Program => FileKind::Program,
            TokenKind::Library => FileKind::Library,
            _ if self.at_word("package") => FileKind::Package,
            _ => {
                let err = self.unexpected("'unit', 'program', 'library' or 'package'");
                self.report(err);
                FileKind::Program
            }
        };

        let name = self.parse_file_header(kind);
        let mut file = SourceFile {
            kind,
            name,
            interface: None,
            implementation: None,
            initialization: None,
            finalization: None,
            main_block: None,
            span: start,
            node_count: 0,
        };

        match kind {
            FileKind::Unit => self.parse_unit_body(&mut file),
            FileKind::Package => self.parse_package_body(&mut file),
            FileKind::Program | FileKind::Library => self.parse_program_body(&mut file),
        }

        file.span = self.span_from(start);
        file.node_count = self.next_id;
        file
    }

    fn parse_file_header(&mut self, kind: FileKind) -> QualifiedName {
        let start = self.current_span();
        let empty = QualifiedName {
            parts: Vec::new(),
            span: start,
        };
        let has_header = matches!(
            self.peek_kind(),
            TokenKind::Unit | TokenKind::Program | TokenKind::Library
        ) || (kind == FileKind::Package && self.at_word("package"));
        if !has_header {
            return empty;
        }
        self.advance();
        let name = match self.qualified_name() {
            Ok(name) => name,
            Err(err) => {
                self.report(err);
                self.synchronize();
                return empty;
            }
        };
        // `program Foo(Input, Output);`
        if self.at(TokenKind::LParen) {
            while !self.at_eof() && !self.eat(TokenKind::RParen) {
                self.advance();
            }
        }
        self.skip_hint_directives();
        if let Err(err) = self.expect(TokenKind::Semicolon) {
            self.report(err);
            self.synchronize();
        }
        name
    }

    /// `platform`, `deprecated 'msg'`, `library`, `experimental`.
    pub(crate) fn skip_hint_directives(&mut self) -> bool {
        let mut any = false;
        loop {
            if self.at_word("platform") || self.at_word("experimental") || self.at(TokenKind::Library)
            {
                self.advance();
            } else if self.at_word("deprecated") {
                self.advance();
                if self.at(TokenKind::QuotedString) {
                    self.advance();
                }
            } else {
                return any;
            }
            any = true;
        }
    }

    fn parse_unit_body(&mut self, file: &mut SourceFile) {
        if self.at(TokenKind::Interface) {
            let start = self.advance().span;
            let uses = self.parse_uses_clause();
            let decls = self.parse_decl_section(SectionKind::Interface);
            file.interface = Some(Section {
                kind: SectionKind::Interface,
                uses,
                decls,
                span: self.span_from(start),
            });
        } else {
            let err = self.unexpected("'interface'");
            self.report(err);
        }

        if self.at(TokenKind::Implementation) {
            let start = self.advance().span;
            let uses = self.parse_uses_clause();
            let decls = self.parse_decl_section(SectionKind::Implementation);
            file.implementation = Some(Section {
                kind: SectionKind::Implementation,
                uses,
                decls,
                span: self.span_from(start),
            });
        } else if !self.at_eof() {
            let err = self.unexpected("'implementation'");
            self.report(err);
        }

        match self.peek_kind() {
            TokenKind::Initialization => {
                self.advance();
                file.initialization = Some(self.parse_stmt_block_until_terminators(&[
                    TokenKind::Finalization,
                    TokenKind::End,
                ]));
                if self.eat(TokenKind::Finalization) {
                    file.finalization =
                        Some(self.parse_stmt_block_until_terminators(&[TokenKind::End]));
                }
                self.expect_end_dot();
            }
            TokenKind::Begin => {
                self.advance();
                file.initialization =
                    Some(self.parse_stmt_block_until_terminators(&[TokenKind::End]));
                self.expect_end_dot();
            }
            _ => self.expect_end_dot(),
        }
    }

    fn parse_program_body(&mut self, file: &mut SourceFile) {
        let start = self.current_span();
        let uses = self.parse_uses_clause();
        let decls = self.parse_decl_section(SectionKind::Main);
        file.implementation = Some(Section {
            kind: SectionKind::Main,
            uses,
            decls,
            span: self.span_from(start),
        });
        if self.eat(TokenKind::Begin) {
            file.main_block = Some(self.parse_stmt_block_until_terminators(&[TokenKind::End]));
        }
        self.expect_end_dot();
    }

    /// `requires` and `contains` clauses are treated as uses clauses.
    fn parse_package_body(&mut self, file: &mut SourceFile) {
        let start = self.current_span();
        let mut units = Vec::new();
        while self.at_word("requires") || self.at_word("contains") {
            self.advance();
            loop {
                match self.parse_used_unit() {
                    Ok(unit) => units.push(unit),
                    Err(err) => {
                        self.report(err);
                        self.synchronize();
                        break;
                    }
                }
                if !self.eat(TokenKind::Comma) {
                    if let Err(err) = self.expect(TokenKind::Semicolon) {
                        self.report(err);
                        self.synchronize();
                    }
                    break;
                }
            }
        }
        let span = self.span_from(start);
        file.implementation = Some(Section {
            kind: SectionKind::Main,
            uses: Some(UsesClause { units, span }),
            decls: Vec::new(),
            span,
        });
        self.expect_end_dot();
    }

    fn expect_end_dot(&mut self) {
        if self.at_eof() {
            if !self.gave_up {
                let err = self.unexpected("'end.'");
                self.report(err);
            }
            return;
        }
        if let Err(err) = self.expect(TokenKind::End) {
            self.report(err);
            return;
        }
        if let Err(err) = self.expect(TokenKind::Dot) {
            self.report(err);
        }
    }

    fn parse_used_unit(&mut self) -> ParseResult<UsedUnit> {
        let name = self.qualified_name()?;
        let start = name.span;
        let path = if self.eat(TokenKind::In) {
            let token = self.expect(TokenKind::QuotedString)?;
            Some(decode_quoted(&token.text))
        } else {
            None
        };
        Ok(UsedUnit {
            name,
            path,
            span: self.span_from(start),
        })
    }

    pub(crate) fn parse_uses_clause(&mut self) -> Option<UsesClause> {
        if !self.at(TokenKind::Uses) {
            return None;
        }
        let start = self.advance().span;
        let mut units = Vec::new();
        loop {
            match self.parse_used_unit() {
                Ok(unit) => units.push(unit),
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                    break;
                }
            }
            if self.eat(TokenKind::Comma) {
                continue;
            }
            if let Err(err) = self.expect(TokenKind::Semicolon) {
                self.report(err);
                self.synchronize();
            }
            break;
        }
        Some(UsesClause {
            units,
            span: self.span_from(start),
        })
    }
}

/// Decode the text of a single `'...'` token.
pub(crate) fn decode_quoted(text: &str) -> String {
    let inner = text
        .strip_prefix('\'')
        .map(|rest| rest.strip_suffix('\'').unwrap_or(rest))
        .unwrap_or(text);
    inner.replace("''", "'")
}

/// Decode a `#13` / `#$0D` control character token.
pub(crate) fn decode_control(text: &str) -> Option<char> {
    let digits = text.strip_prefix('#')?;
    let value = match digits.strip_prefix('$') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnosticHandler;

    pub(crate) fn parse(source: &str) -> (SourceFile, CollectingDiagnosticHandler) {
        let handler = CollectingDiagnosticHandler::new();
        let parsed = parse_source(source, &DirectiveOptions::default(), &handler);
        (parsed.file, handler)
    }

    #[test]
    fn test_minimal_unit() {
        let (file, handler) = parse("unit Foo.Bar;\ninterface\nimplementation\nend.");
        assert_eq!(handler.error_count(), 0, "{:?}", handler.get_diagnostics());
        assert_eq!(file.kind, FileKind::Unit);
        assert_eq!(file.name.dotted(), "Foo.Bar");
        assert!(file.interface.is_some());
        assert!(file.implementation.is_some());
    }

    #[test]
    fn test_uses_clauses() {
        let (file, handler) = parse(
            "unit A; interface uses System.SysUtils, Classes; implementation uses B; end.",
        );
        assert_eq!(handler.error_count(), 0);
        let interface_uses = file.interface.as_ref().and_then(|s| s.uses.as_ref());
        assert_eq!(interface_uses.map(|u| u.units.len()), Some(2));
        let implementation_uses = file.implementation.as_ref().and_then(|s| s.uses.as_ref());
        assert_eq!(
            implementation_uses.map(|u| u.units[0].name.dotted()),
            Some("B".to_string())
        );
    }

    #[test]
    fn test_program_with_main_block() {
        let (file, handler) = parse(
            "program P;\nuses A in 'a.pas';\nvar X: Integer;\nbegin\n  X := 1;\nend.",
        );
        assert_eq!(handler.error_count(), 0, "{:?}", handler.get_diagnostics());
        assert_eq!(file.kind, FileKind::Program);
        let main = file.main_block.as_ref().map(|b| b.stmts.len());
        assert_eq!(main, Some(1));
        let uses = file.implementation.as_ref().and_then(|s| s.uses.as_ref());
        assert_eq!(
            uses.and_then(|u| u.units[0].path.clone()),
            Some("a.pas".to_string())
        );
    }

    #[test]
    fn test_initialization_and_finalization() {
        let (file, handler) = parse(
            "unit A; interface implementation initialization X := 1; finalization X := 2; end.",
        );
        assert_eq!(handler.error_count(), 0);
        assert!(file.initialization.is_some());
        assert!(file.finalization.is_some());
    }

    #[test]
    fn test_recovers_after_syntax_error() {
        let (file, handler) = parse(
            "unit A; interface implementation\nprocedure P;\nbegin\n  X := ;\n  Y := 2;\nend;\nend.",
        );
        assert!(handler.error_count() >= 1);
        let section = file.implementation.as_ref().map(|s| s.decls.len());
        assert_eq!(section, Some(1));
    }

    #[test]
    fn test_node_ids_are_unique() {
        let (file, _) = parse("program P; begin A(B, C.D); E := F[1]; end.");
        assert!(file.node_count >= 8);
    }

    #[test]
    fn test_decode_helpers() {
        assert_eq!(decode_quoted("'it''s'"), "it's");
        assert_eq!(decode_control("#13"), Some('\r'));
        assert_eq!(decode_control("#$41"), Some('A'));
    }
}
