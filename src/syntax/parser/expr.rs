use super::{decode_control, decode_quoted, ParseResult, Parser};
use crate::span::Span;
use crate::syntax::ast::*;
use crate::syntax::token::TokenKind;

/// Look-ahead bound for deciding whether `<` opens type arguments.
const GENERIC_LOOKAHEAD: usize = 32;

impl<'h> Parser<'h> {
    fn make_expr(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr {
            id: self.next_id(),
            kind,
            span,
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        let span = lhs.span.merge(&rhs.span);
        self.make_expr(
            ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        )
    }

    /// Full expression including relational operators.
    pub(crate) fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.enter()?;
        let result = self.parse_relational();
        self.leave();
        result
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_simple_expr()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Eq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::NotEq,
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                TokenKind::In => BinaryOp::In,
                TokenKind::Is => BinaryOp::Is,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_simple_expr()?;
            lhs = self.binary(op, lhs, rhs);
        }
    }

    /// Additive level; also the operand grammar of subranges.
    pub(crate) fn parse_simple_expr(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                TokenKind::Or => BinaryOp::Or,
                TokenKind::Xor => BinaryOp::Xor,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = self.binary(op, lhs, rhs);
        }
    }

    fn parse_term(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Divide,
                TokenKind::Div => BinaryOp::IntDiv,
                TokenKind::Mod => BinaryOp::Mod,
                TokenKind::And => BinaryOp::And,
                TokenKind::Shl => BinaryOp::Shl,
                TokenKind::Shr => BinaryOp::Shr,
                TokenKind::As => BinaryOp::As,
                _ => return Ok(lhs),
            };
            self.advance();
            let rhs = self.parse_factor()?;
            lhs = self.binary(op, lhs, rhs);
        }
    }

    fn parse_factor(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        let unary = match self.peek_kind() {
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = unary {
            self.advance();
            self.enter()?;
            let operand = self.parse_factor();
            self.leave();
            let operand = operand?;
            let span = start.merge(&operand.span);
            return Ok(self.make_expr(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        if self.at(TokenKind::At) || self.at(TokenKind::AtAt) {
            self.advance();
            self.enter()?;
            let operand = self.parse_factor();
            self.leave();
            let operand = operand?;
            let span = start.merge(&operand.span);
            return Ok(self.make_expr(ExprKind::AddressOf(Box::new(operand)), span));
        }
        self.parse_postfix_expr()
    }

    /// Primary expression followed by member access, calls, indexing,
    /// dereference and explicit type arguments.
    pub(crate) fn parse_postfix_expr(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let member = self.expect_member_name()?;
                    let span = self.span_from(start);
                    expr = self.make_expr(
                        ExprKind::Member {
                            object: Box::new(expr),
                            member,
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    let args = self.parse_call_args()?;
                    let span = self.span_from(start);
                    expr = self.make_expr(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let mut indices = vec![self.parse_expr()?];
                    while self.eat(TokenKind::Comma) {
                        indices.push(self.parse_expr()?);
                    }
                    self.expect(TokenKind::RBracket)?;
                    let span = self.span_from(start);
                    expr = self.make_expr(
                        ExprKind::Index {
                            object: Box::new(expr),
                            indices,
                        },
                        span,
                    );
                }
                TokenKind::Caret => {
                    self.advance();
                    let span = self.span_from(start);
                    expr = self.make_expr(ExprKind::Deref(Box::new(expr)), span);
                }
                TokenKind::Lt
                    if matches!(
                        expr.kind,
                        ExprKind::Name(_) | ExprKind::Member { .. }
                    ) && self.generic_args_ahead() =>
                {
                    let args = self.parse_type_args()?;
                    let span = self.span_from(start);
                    expr = self.make_expr(
                        ExprKind::Generic {
                            base: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    /// At `<`: true when the tokens up to the matching `>` can only be type
    /// arguments and the token after it continues a designator.
    fn generic_args_ahead(&self) -> bool {
        let mut depth = 0usize;
        for n in 0..GENERIC_LOOKAHEAD {
            match self.peek_nth(n).kind {
                TokenKind::Lt => depth += 1,
                TokenKind::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(
                            self.peek_nth(n + 1).kind,
                            TokenKind::LParen
                                | TokenKind::Dot
                                | TokenKind::RParen
                                | TokenKind::Semicolon
                                | TokenKind::Comma
                                | TokenKind::RBracket
                        );
                    }
                }
                TokenKind::Identifier
                | TokenKind::EscapedIdentifier
                | TokenKind::Dot
                | TokenKind::Comma
                | TokenKind::String => {}
                _ => return false,
            }
        }
        false
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.at(TokenKind::RParen) && !self.at_eof() {
            args.push(self.parse_expr()?);
            // `Write(X:8:2)` width and precision
            while self.eat(TokenKind::Colon) {
                self.parse_expr()?;
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        match self.peek_kind() {
            TokenKind::Identifier | TokenKind::EscapedIdentifier => {
                let ident = self.expect_ident()?;
                Ok(self.make_expr(ExprKind::Name(ident), start))
            }
            // `string(P)` casts
            TokenKind::String => {
                let token = self.advance();
                Ok(self.make_expr(ExprKind::Name(Ident::new(token.text, token.span)), start))
            }
            TokenKind::IntegerLiteral | TokenKind::HexLiteral | TokenKind::BinaryLiteral => {
                let token = self.advance();
                let value = parse_integer(token.kind, &token.text);
                Ok(self.make_expr(ExprKind::Literal(Literal::Integer(value)), start))
            }
            TokenKind::RealLiteral => {
                let token = self.advance();
                let value = token.text.replace('_', "").parse::<f64>().unwrap_or(0.0);
                Ok(self.make_expr(ExprKind::Literal(Literal::Real(value)), start))
            }
            TokenKind::QuotedString | TokenKind::ControlString => {
                let mut value = String::new();
                while matches!(
                    self.peek_kind(),
                    TokenKind::QuotedString | TokenKind::ControlString
                ) {
                    let token = self.advance();
                    if token.kind == TokenKind::QuotedString {
                        value.push_str(&decode_quoted(&token.text));
                    } else if let Some(c) = decode_control(&token.text) {
                        value.push(c);
                    }
                }
                let span = self.span_from(start);
                Ok(self.make_expr(ExprKind::Literal(Literal::String(value)), span))
            }
            TokenKind::Nil => {
                self.advance();
                Ok(self.make_expr(ExprKind::Nil, start))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                let span = self.span_from(start);
                Ok(self.make_expr(ExprKind::Paren(Box::new(inner)), span))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.at(TokenKind::RBracket) && !self.at_eof() {
                    elements.push(self.parse_set_element()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket)?;
                let span = self.span_from(start);
                Ok(self.make_expr(ExprKind::SetConstructor(elements), span))
            }
            TokenKind::Inherited => {
                self.advance();
                let member = if self.at_ident() {
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                let span = self.span_from(start);
                Ok(self.make_expr(ExprKind::Inherited(member), span))
            }
            TokenKind::Procedure | TokenKind::Function => self.parse_anonymous_method(),
            _ => Err(self.unexpected("expression")),
        }
    }

    /// Set constructor element or case label: `A` or `A..B`.
    pub(crate) fn parse_set_element(&mut self) -> ParseResult<Expr> {
        let low = self.parse_expr()?;
        if !self.eat(TokenKind::DotDot) {
            return Ok(low);
        }
        let high = self.parse_expr()?;
        let span = low.span.merge(&high.span);
        Ok(self.make_expr(
            ExprKind::Range {
                low: Box::new(low),
                high: Box::new(high),
            },
            span,
        ))
    }

    fn parse_anonymous_method(&mut self) -> ParseResult<Expr> {
        let start = self.current_span();
        let kind = if self.advance().kind == TokenKind::Function {
            RoutineKind::Function
        } else {
            RoutineKind::Procedure
        };
        let params = if self.at(TokenKind::LParen) {
            self.parse_param_list(TokenKind::LParen, TokenKind::RParen)?
        } else {
            Vec::new()
        };
        let return_type = if kind == RoutineKind::Function {
            self.expect(TokenKind::Colon)?;
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let decls = self.parse_local_decls();
        self.expect(TokenKind::Begin)?;
        let block = self.parse_stmt_block_until_terminators(&[TokenKind::End]);
        self.expect(TokenKind::End)?;
        let method = AnonymousMethod {
            id: self.next_id(),
            kind,
            params,
            return_type,
            decls,
            block,
        };
        let span = self.span_from(start);
        Ok(self.make_expr(ExprKind::AnonymousMethod(Box::new(method)), span))
    }

    /// Initializer of a typed constant or initialized variable; allows
    /// `(1, 2)` array and `(X: 1; Y: 2)` record constants.
    pub(crate) fn parse_typed_const_value(&mut self) -> ParseResult<Expr> {
        if !self.at(TokenKind::LParen) {
            return self.parse_expr();
        }
        let start = self.current_span();
        if self.peek_nth(1).kind.is_identifier() && self.peek_nth(2).kind == TokenKind::Colon {
            self.advance();
            let mut fields = Vec::new();
            while !self.at(TokenKind::RParen) && !self.at_eof() {
                let name = self.expect_ident()?;
                self.expect(TokenKind::Colon)?;
                let value = self.parse_typed_const_value()?;
                fields.push((name, value));
                if !self.eat(TokenKind::Semicolon) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            let span = self.span_from(start);
            return Ok(self.make_expr(ExprKind::RecordLiteral(fields), span));
        }

        self.advance();
        let mut elements = vec![self.parse_typed_const_value()?];
        while self.eat(TokenKind::Comma) {
            elements.push(self.parse_typed_const_value()?);
        }
        self.expect(TokenKind::RParen)?;
        let span = self.span_from(start);
        if elements.len() == 1 {
            let inner = elements.remove(0);
            let paren = self.make_expr(ExprKind::Paren(Box::new(inner)), span);
            return self.continue_binary(paren);
        }
        Ok(self.make_expr(ExprKind::Tuple(elements), span))
    }

    /// Continue an already parsed parenthesized operand: `(A + B) * C`.
    fn continue_binary(&mut self, lhs: Expr) -> ParseResult<Expr> {
        let op = match self.peek_kind() {
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Divide,
            TokenKind::Div => BinaryOp::IntDiv,
            TokenKind::Mod => BinaryOp::Mod,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Shl => BinaryOp::Shl,
            TokenKind::Shr => BinaryOp::Shr,
            TokenKind::Or => BinaryOp::Or,
            TokenKind::And => BinaryOp::And,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_expr()?;
        Ok(self.binary(op, lhs, rhs))
    }
}

fn parse_integer(kind: TokenKind, text: &str) -> i128 {
    let digits = text.replace('_', "");
    let parsed = match kind {
        TokenKind::HexLiteral => i128::from_str_radix(digits.trim_start_matches('$'), 16),
        TokenKind::BinaryLiteral => i128::from_str_radix(digits.trim_start_matches('%'), 2),
        _ => digits.parse::<i128>(),
    };
    parsed.unwrap_or(i128::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{CollectingDiagnosticHandler, DiagnosticHandler};
    use crate::syntax::token::tokenize;

    fn expr(source: &str) -> Expr {
        let handler = CollectingDiagnosticHandler::new();
        let mut tokens = tokenize(source, &handler);
        tokens.retain(|t| !t.kind.is_trivia());
        let mut parser = Parser::new(tokens, &handler);
        let expr = parser.parse_expr();
        assert_eq!(handler.error_count(), 0);
        match expr {
            Ok(expr) => expr,
            Err(err) => panic!("parse failed: {}", err),
        }
    }

    #[test]
    fn test_precedence() {
        match expr("A + B * C = D").kind {
            ExprKind::Binary { op, lhs, .. } => {
                assert_eq!(op, BinaryOp::Eq);
                assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
        match expr("not A and B").kind {
            ExprKind::Binary { op, lhs, .. } => {
                assert_eq!(op, BinaryOp::And);
                assert!(matches!(lhs.kind, ExprKind::Unary { op: UnaryOp::Not, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_designators() {
        match expr("Self.FItems[I]^.Name(1, 'x')").kind {
            ExprKind::Call { callee, args } => {
                assert_eq!(args.len(), 2);
                assert!(matches!(callee.kind, ExprKind::Member { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_generic_versus_comparison() {
        assert!(matches!(
            expr("TList<Integer>.Create").kind,
            ExprKind::Member { .. }
        ));
        assert!(matches!(
            expr("A < B").kind,
            ExprKind::Binary { op: BinaryOp::Lt, .. }
        ));
        assert!(matches!(
            expr("(A < B) and (C > D)").kind,
            ExprKind::Binary { op: BinaryOp::And, .. }
        ));
    }

    #[test]
    fn test_literals() {
        assert!(matches!(expr("$FF").kind, ExprKind::Literal(Literal::Integer(255))));
        assert!(matches!(expr("%101").kind, ExprKind::Literal(Literal::Integer(5))));
        match expr("'a'#13#10'b'").kind {
            ExprKind::Literal(Literal::String(s)) => assert_eq!(s, "a\r\nb"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_set_constructor_and_address_of() {
        match expr("[1, 3..5]").kind {
            ExprKind::SetConstructor(elements) => {
                assert!(matches!(elements[1].kind, ExprKind::Range { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(expr("@X").kind, ExprKind::AddressOf(_)));
    }

    #[test]
    fn test_inherited_and_cast_shape() {
        assert!(matches!(expr("inherited").kind, ExprKind::Inherited(None)));
        match expr("inherited Create(A)").kind {
            ExprKind::Call { callee, .. } => {
                assert!(matches!(callee.kind, ExprKind::Inherited(Some(_))));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(expr("NativeInt(P)").kind, ExprKind::Call { .. }));
    }
}
