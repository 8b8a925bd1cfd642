use super::{ParseResult, Parser};
use crate::span::Span;
use crate::syntax::ast::*;
use crate::syntax::token::TokenKind;

fn is_list_terminator(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::End
            | TokenKind::Until
            | TokenKind::Except
            | TokenKind::Finally
            | TokenKind::Else
            | TokenKind::Finalization
            | TokenKind::Eof
    )
}

impl<'h> Parser<'h> {
    /// Statement list ending at (not consuming) one of `terminators`.
    pub(crate) fn parse_stmt_block_until_terminators(&mut self, terminators: &[TokenKind]) -> Block {
        let start = self.current_span();
        let stmts = self.parse_stmt_list(terminators);
        Block {
            id: self.next_id(),
            stmts,
            span: self.span_from(start),
        }
    }

    pub(crate) fn parse_stmt_list(&mut self, terminators: &[TokenKind]) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        loop {
            if self.at_eof() || terminators.contains(&self.peek_kind()) {
                break;
            }
            let before = self.pos;
            let stmt = self.parse_stmt_recovering();
            if !matches!(stmt.kind, StmtKind::Empty) {
                stmts.push(stmt);
            }
            if self.eat(TokenKind::Semicolon) {
                continue;
            }
            if self.at_eof() || terminators.contains(&self.peek_kind()) {
                break;
            }
            let err = self.unexpected("';'");
            self.report(err);
            if self.pos == before || is_list_terminator(self.peek_kind()) {
                // A terminator that does not close this list, e.g. a stray
                // `until` inside `begin ... end`.
                self.advance();
            }
        }
        stmts
    }

    fn parse_stmt_recovering(&mut self) -> Stmt {
        let start = self.current_span();
        match self.parse_stmt() {
            Ok(stmt) => stmt,
            Err(err) => {
                self.report(err);
                while !self.at_eof()
                    && !self.at(TokenKind::Semicolon)
                    && !is_list_terminator(self.peek_kind())
                {
                    self.advance();
                }
                Stmt {
                    kind: StmtKind::Empty,
                    span: start,
                }
            }
        }
    }

    fn make_stmt(&self, kind: StmtKind, start: Span) -> Stmt {
        Stmt {
            kind,
            span: self.span_from(start),
        }
    }

    pub(crate) fn parse_stmt(&mut self) -> ParseResult<Stmt> {
        self.enter()?;
        let result = self.parse_stmt_inner();
        self.leave();
        result
    }

    /// Optional statement: empty when the next token cannot start one.
    fn parse_optional_stmt(&mut self) -> ParseResult<Option<Box<Stmt>>> {
        if self.at(TokenKind::Semicolon) || is_list_terminator(self.peek_kind()) {
            return Ok(None);
        }
        Ok(Some(Box::new(self.parse_stmt()?)))
    }

    fn parse_stmt_inner(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();
        match self.peek_kind() {
            TokenKind::Semicolon => Ok(Stmt {
                kind: StmtKind::Empty,
                span: start,
            }),
            kind if is_list_terminator(kind) => Ok(Stmt {
                kind: StmtKind::Empty,
                span: start,
            }),
            TokenKind::Begin => {
                self.advance();
                let block = self.parse_stmt_block_until_terminators(&[TokenKind::End]);
                self.expect(TokenKind::End)?;
                Ok(self.make_stmt(StmtKind::Compound(block), start))
            }
            TokenKind::If => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(TokenKind::Then)?;
                let then_branch = self.parse_optional_stmt()?;
                let else_branch = if self.eat(TokenKind::Else) {
                    self.parse_optional_stmt()?
                } else {
                    None
                };
                Ok(self.make_stmt(
                    StmtKind::If {
                        cond,
                        then_branch,
                        else_branch,
                    },
                    start,
                ))
            }
            TokenKind::Case => self.parse_case(start),
            TokenKind::While => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(TokenKind::Do)?;
                let body = self.parse_body_stmt()?;
                Ok(self.make_stmt(StmtKind::While { cond, body }, start))
            }
            TokenKind::Repeat => {
                self.advance();
                let body = self.parse_stmt_list(&[TokenKind::Until]);
                self.expect(TokenKind::Until)?;
                let cond = self.parse_expr()?;
                Ok(self.make_stmt(StmtKind::Repeat { body, cond }, start))
            }
            TokenKind::For => self.parse_for(start),
            TokenKind::With => {
                self.advance();
                let mut objects = vec![self.parse_expr()?];
                while self.eat(TokenKind::Comma) {
                    objects.push(self.parse_expr()?);
                }
                self.expect(TokenKind::Do)?;
                let body = self.parse_body_stmt()?;
                Ok(self.make_stmt(StmtKind::With { objects, body }, start))
            }
            TokenKind::Try => self.parse_try(start),
            TokenKind::Raise => {
                self.advance();
                let exception = if self.at(TokenKind::Semicolon)
                    || is_list_terminator(self.peek_kind())
                {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                let at = if self.eat_word("at") {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                Ok(self.make_stmt(StmtKind::Raise { exception, at }, start))
            }
            TokenKind::Goto => {
                self.advance();
                let label = if self.at(TokenKind::IntegerLiteral) {
                    let token = self.advance();
                    Ident::new(token.text, token.span)
                } else {
                    self.expect_ident()?
                };
                Ok(self.make_stmt(StmtKind::Goto(label), start))
            }
            TokenKind::Asm => {
                self.skip_asm_block()?;
                self.expect(TokenKind::End)?;
                Ok(self.make_stmt(StmtKind::Asm, start))
            }
            TokenKind::Var => {
                self.advance();
                let decl = self.parse_inline_var(false, start)?;
                Ok(self.make_stmt(StmtKind::InlineVar(decl), start))
            }
            TokenKind::Const => {
                self.advance();
                let decl = self.parse_inline_var(true, start)?;
                Ok(self.make_stmt(StmtKind::InlineVar(decl), start))
            }
            _ => self.parse_simple_stmt(start),
        }
    }

    /// Loop or `with` body; an empty body is allowed.
    fn parse_body_stmt(&mut self) -> ParseResult<Box<Stmt>> {
        let start = self.current_span();
        Ok(self.parse_optional_stmt()?.unwrap_or_else(|| {
            Box::new(Stmt {
                kind: StmtKind::Empty,
                span: start,
            })
        }))
    }

    fn parse_simple_stmt(&mut self, start: Span) -> ParseResult<Stmt> {
        // Numeric label: `10: X := 1;`
        if self.at(TokenKind::IntegerLiteral) && self.peek_nth(1).kind == TokenKind::Colon {
            let token = self.advance();
            self.advance();
            let stmt = self.parse_stmt()?;
            return Ok(self.make_stmt(
                StmtKind::Labeled {
                    label: Ident::new(token.text, token.span),
                    stmt: Box::new(stmt),
                },
                start,
            ));
        }
        if self.at_ident() && self.peek_nth(1).kind == TokenKind::Colon {
            let label = self.expect_ident()?;
            self.advance();
            let stmt = self.parse_stmt()?;
            return Ok(self.make_stmt(
                StmtKind::Labeled {
                    label,
                    stmt: Box::new(stmt),
                },
                start,
            ));
        }

        let target = self.parse_expr()?;
        if self.eat(TokenKind::Assign) {
            let value = self.parse_expr()?;
            return Ok(self.make_stmt(StmtKind::Assign { target, value }, start));
        }
        Ok(self.make_stmt(StmtKind::Expr(target), start))
    }

    fn parse_inline_var(&mut self, is_const: bool, start: Span) -> ParseResult<InlineVar> {
        let names = self.ident_list()?;
        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let init = if self.eat(TokenKind::Assign) || (is_const && self.eat(TokenKind::Eq)) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(InlineVar {
            names,
            ty,
            init,
            is_const,
            span: self.span_from(start),
        })
    }

    fn parse_case(&mut self, start: Span) -> ParseResult<Stmt> {
        self.expect(TokenKind::Case)?;
        let selector = self.parse_expr()?;
        self.expect(TokenKind::Of)?;
        let mut arms = Vec::new();
        while !self.at_eof() && !self.at(TokenKind::End) && !self.at(TokenKind::Else) {
            let arm_start = self.current_span();
            let mut labels = vec![self.parse_set_element()?];
            while self.eat(TokenKind::Comma) {
                labels.push(self.parse_set_element()?);
            }
            self.expect(TokenKind::Colon)?;
            let body = self.parse_body_stmt()?;
            arms.push(CaseArm {
                labels,
                body,
                span: self.span_from(arm_start),
            });
            if !self.eat(TokenKind::Semicolon) {
                break;
            }
        }
        let else_branch = if self.eat(TokenKind::Else) {
            Some(self.parse_stmt_list(&[TokenKind::End]))
        } else {
            None
        };
        self.expect(TokenKind::End)?;
        Ok(self.make_stmt(
            StmtKind::Case {
                selector,
                arms,
                else_branch,
            },
            start,
        ))
    }

    fn parse_for(&mut self, start: Span) -> ParseResult<Stmt> {
        self.expect(TokenKind::For)?;
        let target = if self.at(TokenKind::Var) {
            let var_start = self.advance().span;
            let name = self.expect_ident()?;
            let ty = if self.eat(TokenKind::Colon) {
                Some(self.parse_type_expr()?)
            } else {
                None
            };
            ForTarget::Inline(InlineVar {
                names: vec![name],
                ty,
                init: None,
                is_const: false,
                span: self.span_from(var_start),
            })
        } else {
            ForTarget::Existing(self.parse_postfix_expr()?)
        };

        if self.eat(TokenKind::In) {
            let collection = self.parse_expr()?;
            self.expect(TokenKind::Do)?;
            let body = self.parse_body_stmt()?;
            return Ok(self.make_stmt(
                StmtKind::ForIn {
                    target,
                    collection,
                    body,
                },
                start,
            ));
        }

        self.expect(TokenKind::Assign)?;
        let from = self.parse_expr()?;
        let downto = match self.peek_kind() {
            TokenKind::To => false,
            TokenKind::DownTo => true,
            _ => return Err(self.unexpected("'to' or 'downto'")),
        };
        self.advance();
        let to = self.parse_expr()?;
        self.expect(TokenKind::Do)?;
        let body = self.parse_body_stmt()?;
        Ok(self.make_stmt(
            StmtKind::For {
                target,
                from,
                to,
                downto,
                body,
            },
            start,
        ))
    }

    fn parse_try(&mut self, start: Span) -> ParseResult<Stmt> {
        self.expect(TokenKind::Try)?;
        let body = self.parse_stmt_list(&[TokenKind::Except, TokenKind::Finally]);
        let handler = if self.eat(TokenKind::Finally) {
            TryHandler::Finally(self.parse_stmt_list(&[TokenKind::End]))
        } else {
            self.expect(TokenKind::Except)?;
            let mut handlers = Vec::new();
            let mut statements = Vec::new();
            if self.at_word("on") {
                while self.at_word("on") {
                    handlers.push(self.parse_except_handler()?);
                    self.eat(TokenKind::Semicolon);
                }
            } else {
                statements = self.parse_stmt_list(&[TokenKind::End]);
            }
            let else_branch = if self.eat(TokenKind::Else) {
                Some(self.parse_stmt_list(&[TokenKind::End]))
            } else {
                None
            };
            TryHandler::Except {
                handlers,
                else_branch,
                statements,
            }
        };
        self.expect(TokenKind::End)?;
        Ok(self.make_stmt(StmtKind::Try { body, handler }, start))
    }

    fn parse_except_handler(&mut self) -> ParseResult<ExceptHandler> {
        let start = self.expect_word("on")?.span;
        let name = if self.at_ident() && self.peek_nth(1).kind == TokenKind::Colon {
            let name = self.expect_ident()?;
            self.advance();
            Some(name)
        } else {
            None
        };
        let ty = self.parse_type_expr()?;
        self.expect(TokenKind::Do)?;
        let body = self.parse_optional_stmt()?;
        Ok(ExceptHandler {
            id: self.next_id(),
            name,
            ty,
            body,
            span: self.span_from(start),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::syntax::ast::*;
    use crate::diagnostics::DiagnosticHandler;
    use crate::syntax::parser::tests::parse;

    fn body(stmts: &str) -> Vec<Stmt> {
        let source = format!("program P;\nbegin\n{}\nend.", stmts);
        let (file, handler) = parse(&source);
        assert_eq!(handler.error_count(), 0, "{:?}", handler.get_diagnostics());
        file.main_block.map(|b| b.stmts).unwrap_or_default()
    }

    #[test]
    fn test_if_else_and_assignment() {
        let stmts = body("if Assigned(X) then X.Free else Y := (Y);");
        match &stmts[0].kind {
            StmtKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                assert!(matches!(
                    then_branch.as_deref().map(|s| &s.kind),
                    Some(StmtKind::Expr(_))
                ));
                assert!(matches!(
                    else_branch.as_deref().map(|s| &s.kind),
                    Some(StmtKind::Assign { .. })
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_loops() {
        let stmts = body(
            "for I := 0 to 9 do Inc(X);\nfor var S in List do Writeln(S);\nwhile X > 0 do Dec(X);\nrepeat Inc(X) until X = 10;",
        );
        assert!(matches!(stmts[0].kind, StmtKind::For { downto: false, .. }));
        assert!(matches!(
            stmts[1].kind,
            StmtKind::ForIn {
                target: ForTarget::Inline(_),
                ..
            }
        ));
        assert!(matches!(stmts[2].kind, StmtKind::While { .. }));
        assert!(matches!(stmts[3].kind, StmtKind::Repeat { .. }));
    }

    #[test]
    fn test_case_with_ranges_and_else() {
        let stmts = body("case X of\n  1, 2: A;\n  3..5: begin B; end;\nelse\n  C;\nend;");
        match &stmts[0].kind {
            StmtKind::Case {
                arms, else_branch, ..
            } => {
                assert_eq!(arms.len(), 2);
                assert!(matches!(arms[1].labels[0].kind, ExprKind::Range { .. }));
                assert_eq!(else_branch.as_ref().map(|e| e.len()), Some(1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_try_blocks() {
        let stmts = body(
            "try A; finally B; end;\ntry A; except on E: Exception do Log(E); on EAbort do ; else C; end;\ntry A; except B; end;",
        );
        assert!(matches!(stmts[0].kind, StmtKind::Try { handler: TryHandler::Finally(_), .. }));
        match &stmts[1].kind {
            StmtKind::Try {
                handler:
                    TryHandler::Except {
                        handlers,
                        else_branch,
                        ..
                    },
                ..
            } => {
                assert_eq!(handlers.len(), 2);
                assert!(handlers[0].name.is_some());
                assert!(else_branch.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_inline_declarations_and_with() {
        let stmts = body("var X: Integer := 1;\nvar Y := X;\nconst C = 3;\nwith Obj do Run;");
        assert!(matches!(
            &stmts[0].kind,
            StmtKind::InlineVar(v) if v.ty.is_some() && v.init.is_some()
        ));
        assert!(matches!(&stmts[2].kind, StmtKind::InlineVar(v) if v.is_const));
        assert!(matches!(stmts[3].kind, StmtKind::With { .. }));
    }

    #[test]
    fn test_raise_and_anonymous_method() {
        let stmts = body(
            "raise Exception.Create('x');\nRun(procedure begin Inc(X); end);",
        );
        assert!(matches!(stmts[0].kind, StmtKind::Raise { exception: Some(_), .. }));
        match &stmts[1].kind {
            StmtKind::Expr(Expr {
                kind: ExprKind::Call { args, .. },
                ..
            }) => assert!(matches!(args[0].kind, ExprKind::AnonymousMethod(_))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_statement_spans_track_lines() {
        let stmts = body("A := 1;\n\nB := 2;");
        assert_eq!(stmts[0].span.line, 3);
        assert_eq!(stmts[1].span.line, 5);
    }
}
