use super::{ParseResult, Parser};
use crate::syntax::ast::*;
use crate::syntax::token::TokenKind;

/// Look-ahead bound when deciding whether a type starts a subrange.
const SUBRANGE_LOOKAHEAD: usize = 64;

impl<'h> Parser<'h> {
    pub(crate) fn parse_type_expr(&mut self) -> ParseResult<TypeExpr> {
        let start = self.current_span();
        let kind = self.parse_type_expr_kind()?;
        Ok(TypeExpr {
            id: self.next_id(),
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_type_expr_kind(&mut self) -> ParseResult<TypeExprKind> {
        if self.looks_like_subrange() {
            let low = self.parse_simple_expr()?;
            self.expect(TokenKind::DotDot)?;
            let high = self.parse_simple_expr()?;
            return Ok(TypeExprKind::Subrange {
                low: Box::new(low),
                high: Box::new(high),
            });
        }

        match self.peek_kind() {
            TokenKind::Packed => {
                self.advance();
                let mut kind = self.parse_type_expr_kind()?;
                if let TypeExprKind::Struct(s) = &mut kind {
                    s.is_packed = true;
                }
                Ok(kind)
            }
            TokenKind::Class => {
                self.advance();
                self.parse_struct_type(StructKind::Class)
            }
            TokenKind::Interface => {
                self.advance();
                self.parse_struct_type(StructKind::Interface)
            }
            TokenKind::DispInterface => {
                self.advance();
                self.parse_struct_type(StructKind::DispInterface)
            }
            TokenKind::Record => {
                self.advance();
                self.parse_struct_type(StructKind::Record)
            }
            TokenKind::Object => {
                self.advance();
                self.parse_struct_type(StructKind::Object)
            }
            TokenKind::Caret => {
                self.advance();
                Ok(TypeExprKind::Pointer(Box::new(self.parse_type_expr()?)))
            }
            TokenKind::Set => {
                self.advance();
                self.expect(TokenKind::Of)?;
                Ok(TypeExprKind::Set(Box::new(self.parse_type_expr()?)))
            }
            TokenKind::File => {
                self.advance();
                if self.eat(TokenKind::Of) {
                    Ok(TypeExprKind::File(Some(Box::new(self.parse_type_expr()?))))
                } else {
                    Ok(TypeExprKind::File(None))
                }
            }
            TokenKind::Array => self.parse_array_type(),
            TokenKind::String => {
                self.advance();
                let length = if self.eat(TokenKind::LBracket) {
                    let length = self.parse_expr()?;
                    self.expect(TokenKind::RBracket)?;
                    Some(Box::new(length))
                } else {
                    None
                };
                Ok(TypeExprKind::String { length })
            }
            TokenKind::LParen => self.parse_enum_type(),
            TokenKind::Procedure | TokenKind::Function => self.parse_procedural_type(false),
            _ if self.at_word("reference") && self.peek_nth(1).kind == TokenKind::To => {
                self.advance();
                self.advance();
                self.parse_procedural_type(true)
            }
            _ if self.at_ident() => self.parse_named_type(),
            _ => Err(self.unexpected("type")),
        }
    }

    /// `Low..High`, `'a'..'z'`, `-1..1`, `TEnum.A..TEnum.C`: scan to the
    /// end of the type looking for `..` outside brackets.
    fn looks_like_subrange(&self) -> bool {
        let mut depth = 0usize;
        for n in 0..SUBRANGE_LOOKAHEAD {
            match self.peek_nth(n).kind {
                TokenKind::DotDot if depth == 0 => return true,
                TokenKind::LParen | TokenKind::LBracket => {
                    if n == 0 && self.peek_kind() == TokenKind::LParen {
                        // `(A, B)` is an enum, `(A)..B` is not worth supporting
                        return false;
                    }
                    depth += 1;
                }
                TokenKind::RParen | TokenKind::RBracket => {
                    if depth == 0 {
                        return false;
                    }
                    depth -= 1;
                }
                TokenKind::Semicolon
                | TokenKind::Eq
                | TokenKind::Of
                | TokenKind::Comma
                | TokenKind::Eof
                | TokenKind::Class
                | TokenKind::Record
                | TokenKind::Interface
                | TokenKind::Procedure
                | TokenKind::Function
                | TokenKind::Assign
                | TokenKind::End
                | TokenKind::Lt
                | TokenKind::Gt
                    if depth == 0 =>
                {
                    return false
                }
                _ => {}
            }
        }
        false
    }

    pub(crate) fn parse_named_type(&mut self) -> ParseResult<TypeExprKind> {
        let mut path = vec![self.expect_ident()?];
        let mut args = self.parse_type_args()?;
        while self.at(TokenKind::Dot) {
            self.advance();
            path.push(self.expect_member_name()?);
            // Generic arguments on an inner segment (`TOuter<T>.TInner`) are
            // dropped; only the last segment's arguments are kept.
            args = self.parse_type_args()?;
        }
        Ok(TypeExprKind::Named { path, args })
    }

    /// `<Integer, TList<string>>` in type position.
    pub(crate) fn parse_type_args(&mut self) -> ParseResult<Vec<TypeExpr>> {
        if !self.at(TokenKind::Lt) {
            return Ok(Vec::new());
        }
        self.advance();
        let mut args = vec![self.parse_type_expr()?];
        while self.eat(TokenKind::Comma) {
            args.push(self.parse_type_expr()?);
        }
        self.expect(TokenKind::Gt)?;
        Ok(args)
    }

    fn parse_array_type(&mut self) -> ParseResult<TypeExprKind> {
        self.expect(TokenKind::Array)?;
        let mut dims = Vec::new();
        if self.eat(TokenKind::LBracket) {
            loop {
                dims.push(self.parse_type_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBracket)?;
        }
        self.expect(TokenKind::Of)?;
        if dims.is_empty() && self.eat(TokenKind::Const) {
            return Ok(TypeExprKind::ArrayOfConst);
        }
        let element = self.parse_type_expr()?;
        Ok(TypeExprKind::Array {
            dims,
            element: Box::new(element),
        })
    }

    fn parse_enum_type(&mut self) -> ParseResult<TypeExprKind> {
        self.expect(TokenKind::LParen)?;
        let mut members = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let value = if self.eat(TokenKind::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            members.push(EnumMember { name, value });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(TypeExprKind::Enum(members))
    }

    fn parse_procedural_type(&mut self, is_reference: bool) -> ParseResult<TypeExprKind> {
        let is_function = self.at(TokenKind::Function);
        if !is_function {
            self.expect(TokenKind::Procedure)?;
        } else {
            self.advance();
        }
        let params = if self.at(TokenKind::LParen) {
            self.parse_param_list(TokenKind::LParen, TokenKind::RParen)?
        } else {
            Vec::new()
        };
        let return_type = if is_function {
            self.expect(TokenKind::Colon)?;
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        let of_object = if self.at(TokenKind::Of) && self.peek_nth(1).kind == TokenKind::Object {
            self.advance();
            self.advance();
            true
        } else {
            false
        };
        Ok(TypeExprKind::Procedural(Box::new(ProceduralType {
            params,
            return_type,
            of_object,
            is_reference,
        })))
    }
}

#[cfg(test)]
mod tests {
    use crate::syntax::ast::*;
    use crate::diagnostics::DiagnosticHandler;
    use crate::syntax::parser::tests::parse;

    fn type_of(decl: &str) -> TypeExprKind {
        let source = format!("unit A; interface type {} implementation end.", decl);
        let (file, handler) = parse(&source);
        assert_eq!(handler.error_count(), 0, "{:?}", handler.get_diagnostics());
        let decls = file.interface.map(|s| s.decls).unwrap_or_default();
        match decls.into_iter().next() {
            Some(Decl::Types(mut types)) => types.remove(0).ty.kind,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_subrange_and_enum() {
        assert!(matches!(type_of("T = 1..10;"), TypeExprKind::Subrange { .. }));
        assert!(matches!(type_of("T = 'a'..'z';"), TypeExprKind::Subrange { .. }));
        assert!(matches!(type_of("T = Low(Byte)..High(Byte);"), TypeExprKind::Subrange { .. }));
        match type_of("T = (A, B = 5, C);") {
            TypeExprKind::Enum(members) => assert_eq!(members.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_arrays_sets_and_pointers() {
        match type_of("T = array[0..9, Boolean] of Integer;") {
            TypeExprKind::Array { dims, .. } => assert_eq!(dims.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(type_of("T = set of Char;"), TypeExprKind::Set(_)));
        assert!(matches!(type_of("T = ^Integer;"), TypeExprKind::Pointer(_)));
        assert!(matches!(type_of("T = class of TObject;"), TypeExprKind::ClassOf(_)));
        assert!(matches!(type_of("T = string[20];"), TypeExprKind::String { length: Some(_) }));
    }

    #[test]
    fn test_generic_named_type() {
        match type_of("T = TDictionary<string, TList<Integer>>;") {
            TypeExprKind::Named { path, args } => {
                assert_eq!(path[0].name, "TDictionary");
                assert_eq!(args.len(), 2);
                assert!(matches!(&args[1].kind, TypeExprKind::Named { args, .. } if args.len() == 1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_procedural_types() {
        match type_of("T = function(A: Integer): Boolean of object;") {
            TypeExprKind::Procedural(p) => {
                assert!(p.of_object);
                assert!(p.return_type.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
        match type_of("T = reference to procedure;") {
            TypeExprKind::Procedural(p) => assert!(p.is_reference),
            other => panic!("unexpected {:?}", other),
        }
    }
}
