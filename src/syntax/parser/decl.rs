use super::{ParseResult, Parser};
use crate::errors::ParserError;
use crate::syntax::ast::*;
use crate::syntax::token::TokenKind;

/// Calling conventions and other routine directives that carry no
/// information for analysis.
const IGNORED_DIRECTIVES: &[&str] = &[
    "cdecl",
    "stdcall",
    "register",
    "pascal",
    "safecall",
    "winapi",
    "assembler",
    "far",
    "near",
    "export",
    "final",
    "varargs",
    "unsafe",
    "local",
];

impl<'h> Parser<'h> {
    /// Declarations up to the end of the current section.
    pub(crate) fn parse_decl_section(&mut self, section: SectionKind) -> Vec<Decl> {
        let mut decls = Vec::new();
        while !self.at_eof() {
            match self.peek_kind() {
                TokenKind::Implementation
                | TokenKind::Initialization
                | TokenKind::Finalization
                | TokenKind::Begin
                | TokenKind::End => break,
                _ => {}
            }
            let before = self.pos;
            match self.parse_decl(section != SectionKind::Interface) {
                Ok(Some(decl)) => decls.push(decl),
                Ok(None) => {}
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                }
            }
            if self.pos == before {
                self.advance();
            }
        }
        decls
    }

    /// Local declarations of a routine body, up to `begin`/`asm`.
    pub(crate) fn parse_local_decls(&mut self) -> Vec<Decl> {
        let mut decls = Vec::new();
        while !self.at_eof() && !self.at(TokenKind::Begin) && !self.at(TokenKind::Asm) {
            if self.at(TokenKind::End) {
                break;
            }
            let before = self.pos;
            match self.parse_decl(true) {
                Ok(Some(decl)) => decls.push(decl),
                Ok(None) => {}
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                }
            }
            if self.pos == before {
                self.advance();
            }
        }
        decls
    }

    fn parse_decl(&mut self, with_bodies: bool) -> ParseResult<Option<Decl>> {
        self.skip_attributes();
        match self.peek_kind() {
            TokenKind::Type => {
                self.advance();
                Ok(Some(Decl::Types(self.parse_type_section()?)))
            }
            TokenKind::Const => {
                self.advance();
                Ok(Some(Decl::Consts(self.parse_const_section(false)?)))
            }
            TokenKind::ResourceString => {
                self.advance();
                Ok(Some(Decl::Consts(self.parse_const_section(true)?)))
            }
            TokenKind::Var | TokenKind::ThreadVar => {
                let thread = self.advance().kind == TokenKind::ThreadVar;
                Ok(Some(Decl::Vars(self.parse_var_section(thread)?)))
            }
            TokenKind::Label => {
                self.advance();
                let mut labels = Vec::new();
                loop {
                    if self.at(TokenKind::IntegerLiteral) {
                        let token = self.advance();
                        labels.push(Ident::new(token.text, token.span));
                    } else {
                        labels.push(self.expect_ident()?);
                    }
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::Semicolon)?;
                Ok(Some(Decl::Labels(labels)))
            }
            TokenKind::Exports => {
                while !self.at_eof() && !self.eat(TokenKind::Semicolon) {
                    self.advance();
                }
                Ok(None)
            }
            TokenKind::Procedure
            | TokenKind::Function
            | TokenKind::Constructor
            | TokenKind::Destructor
            | TokenKind::Class => {
                let routine = self.parse_routine(with_bodies)?;
                Ok(Some(Decl::Routine(Box::new(routine))))
            }
            _ if self.at_word("operator") => {
                let routine = self.parse_routine(with_bodies)?;
                Ok(Some(Decl::Routine(Box::new(routine))))
            }
            _ => Err(self.unexpected("declaration")),
        }
    }

    // ----- types --------------------------------------------------------

    fn at_type_decl_start(&self) -> bool {
        self.at_ident()
            && matches!(self.peek_nth(1).kind, TokenKind::Eq | TokenKind::Lt)
    }

    pub(crate) fn parse_type_section(&mut self) -> ParseResult<Vec<TypeDecl>> {
        let mut decls = Vec::new();
        loop {
            self.skip_attributes();
            if !self.at_type_decl_start() {
                break;
            }
            match self.parse_type_decl() {
                Ok(decl) => decls.push(decl),
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                }
            }
        }
        Ok(decls)
    }

    fn parse_type_decl(&mut self) -> ParseResult<TypeDecl> {
        let name = self.expect_ident()?;
        let start = name.span;
        let type_params = self.parse_type_params()?;
        self.expect(TokenKind::Eq)?;
        let strong_alias = self.eat(TokenKind::Type);
        let ty = self.parse_type_expr()?;
        self.skip_hint_directives();
        self.expect(TokenKind::Semicolon)?;
        // `TCallback = procedure(X: Integer); stdcall;`
        if matches!(ty.kind, TypeExprKind::Procedural(_)) {
            while IGNORED_DIRECTIVES.iter().any(|d| self.at_word(d)) {
                self.advance();
                self.eat(TokenKind::Semicolon);
            }
        }
        Ok(TypeDecl {
            id: self.next_id(),
            name,
            type_params,
            ty,
            strong_alias,
            span: self.span_from(start),
        })
    }

    /// `<T, U: class; V: IFoo, constructor>`
    pub(crate) fn parse_type_params(&mut self) -> ParseResult<Vec<TypeParam>> {
        if !self.eat(TokenKind::Lt) {
            return Ok(Vec::new());
        }
        let mut params = Vec::new();
        loop {
            let names = self.ident_list()?;
            let mut constraints = Vec::new();
            if self.eat(TokenKind::Colon) {
                loop {
                    match self.peek_kind() {
                        TokenKind::Class | TokenKind::Record | TokenKind::Constructor => {
                            self.advance();
                        }
                        _ => constraints.push(self.parse_type_expr()?),
                    }
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            for name in names {
                params.push(TypeParam {
                    name,
                    constraints: constraints.clone(),
                });
            }
            if !self.eat(TokenKind::Semicolon) && !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Gt)?;
        Ok(params)
    }

    /// Body of `class`, `interface`, `record` or `object` after the keyword.
    pub(crate) fn parse_struct_type(&mut self, kind: StructKind) -> ParseResult<TypeExprKind> {
        let mut is_abstract = false;
        let mut is_sealed = false;

        if kind == StructKind::Class {
            if self.eat(TokenKind::Of) {
                let target = self.parse_type_expr()?;
                return Ok(TypeExprKind::ClassOf(Box::new(target)));
            }
            if self.eat_word("abstract") {
                is_abstract = true;
            } else if self.eat_word("sealed") {
                is_sealed = true;
            }
        }
        if matches!(kind, StructKind::Class | StructKind::Interface | StructKind::DispInterface)
            && self.at(TokenKind::Semicolon)
        {
            return Ok(TypeExprKind::Forward(kind));
        }

        let helper_for = if self.at_word("helper") {
            self.advance();
            let mut heritage = Vec::new();
            if self.eat(TokenKind::LParen) {
                heritage.push(self.parse_type_expr()?);
                self.expect(TokenKind::RParen)?;
            }
            self.expect(TokenKind::For)?;
            Some(self.parse_type_expr()?)
        } else {
            None
        };

        let mut heritage = Vec::new();
        if helper_for.is_none() && self.eat(TokenKind::LParen) {
            loop {
                heritage.push(self.parse_type_expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
        }

        if kind == StructKind::Class && helper_for.is_none() && self.at(TokenKind::Semicolon) {
            return Ok(TypeExprKind::Struct(Box::new(StructType {
                kind,
                heritage,
                helper_for,
                sections: Vec::new(),
                variant: None,
                has_body: false,
                is_abstract,
                is_sealed,
                is_packed: false,
            })));
        }

        // Interface GUID: ['{...}']
        if matches!(kind, StructKind::Interface | StructKind::DispInterface)
            && self.at(TokenKind::LBracket)
            && self.peek_nth(1).kind == TokenKind::QuotedString
        {
            self.skip_attributes();
        }

        let (sections, variant) = self.parse_struct_members(kind, Visibility::Public)?;
        self.expect(TokenKind::End)?;
        Ok(TypeExprKind::Struct(Box::new(StructType {
            kind,
            heritage,
            helper_for,
            sections,
            variant,
            has_body: true,
            is_abstract,
            is_sealed,
            is_packed: false,
        })))
    }

    fn parse_visibility(&mut self) -> Option<Visibility> {
        if self.at_word("strict") {
            let next = self.peek_nth(1);
            let visibility = if next.is_word("private") {
                Visibility::StrictPrivate
            } else if next.is_word("protected") {
                Visibility::StrictProtected
            } else {
                return None;
            };
            self.advance();
            self.advance();
            return Some(visibility);
        }
        let visibility = if self.at_word("private") {
            Visibility::Private
        } else if self.at_word("protected") {
            Visibility::Protected
        } else if self.at_word("public") {
            Visibility::Public
        } else if self.at_word("published") || self.at_word("automated") {
            Visibility::Published
        } else {
            return None;
        };
        self.advance();
        Some(visibility)
    }

    fn parse_struct_members(
        &mut self,
        kind: StructKind,
        default_visibility: Visibility,
    ) -> ParseResult<(Vec<VisibilitySection>, Option<VariantPart>)> {
        let mut sections = vec![VisibilitySection {
            visibility: default_visibility,
            explicit: false,
            members: Vec::new(),
            span: self.current_span(),
        }];
        let mut variant = None;
        // Whether bare identifiers currently declare fields or class vars.
        let mut in_class_var = false;

        while !self.at_eof() && !self.at(TokenKind::End) {
            self.skip_attributes();
            if let Some(visibility) = self.parse_visibility() {
                let span = self.previous_span();
                sections.push(VisibilitySection {
                    visibility,
                    explicit: true,
                    members: Vec::new(),
                    span,
                });
                in_class_var = false;
                continue;
            }
            let before = self.pos;
            let result = self.parse_member(kind, &mut in_class_var, &mut variant);
            match result {
                Ok(members) => {
                    if let Some(section) = sections.last_mut() {
                        section.members.extend(members);
                        section.span = section.span.merge(&self.previous_span());
                    }
                }
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                }
            }
            if self.pos == before {
                self.advance();
            }
        }
        Ok((sections, variant))
    }

    fn parse_member(
        &mut self,
        kind: StructKind,
        in_class_var: &mut bool,
        variant: &mut Option<VariantPart>,
    ) -> ParseResult<Vec<Member>> {
        match self.peek_kind() {
            TokenKind::Class => match self.peek_nth(1).kind {
                TokenKind::Var => {
                    self.advance();
                    self.advance();
                    *in_class_var = true;
                    Ok(Vec::new())
                }
                TokenKind::Property => {
                    self.advance();
                    let mut property = self.parse_property()?;
                    property.is_class = true;
                    Ok(vec![Member::Property(property)])
                }
                _ => {
                    let routine = self.parse_routine(false)?;
                    Ok(vec![Member::Method(Box::new(routine))])
                }
            },
            TokenKind::Var => {
                self.advance();
                *in_class_var = false;
                Ok(Vec::new())
            }
            TokenKind::ThreadVar => {
                self.advance();
                *in_class_var = true;
                Ok(Vec::new())
            }
            TokenKind::Const => {
                self.advance();
                Ok(vec![Member::Consts(self.parse_const_section(false)?)])
            }
            TokenKind::Type => {
                self.advance();
                Ok(vec![Member::Types(self.parse_type_section()?)])
            }
            TokenKind::Procedure
            | TokenKind::Function
            | TokenKind::Constructor
            | TokenKind::Destructor => {
                let routine = self.parse_routine(false)?;
                Ok(vec![Member::Method(Box::new(routine))])
            }
            _ if self.at_word("operator") => {
                let routine = self.parse_routine(false)?;
                Ok(vec![Member::Method(Box::new(routine))])
            }
            TokenKind::Property => Ok(vec![Member::Property(self.parse_property()?)]),
            TokenKind::Case if matches!(kind, StructKind::Record | StructKind::Object) => {
                *variant = Some(self.parse_variant_part()?);
                Ok(Vec::new())
            }
            _ if self.at_ident() => {
                let mut field = self.parse_field_decl()?;
                field.is_class_var = *in_class_var;
                Ok(vec![Member::Field(field)])
            }
            _ => Err(self.unexpected("member declaration")),
        }
    }

    fn parse_field_decl(&mut self) -> ParseResult<FieldDecl> {
        let start = self.current_span();
        let names = self.ident_list()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type_expr()?;
        self.skip_hint_directives();
        if !self.at(TokenKind::End) && !self.at(TokenKind::RParen) {
            self.expect(TokenKind::Semicolon)?;
        }
        Ok(FieldDecl {
            names,
            ty,
            is_class_var: false,
            span: self.span_from(start),
        })
    }

    /// `case Tag: T of 0: (A: Integer); 1: (B: Double);`
    fn parse_variant_part(&mut self) -> ParseResult<VariantPart> {
        let start = self.expect(TokenKind::Case)?.span;
        let (tag, tag_type) = if self.at_ident() && self.peek_nth(1).kind == TokenKind::Colon {
            let tag = self.expect_ident()?;
            self.advance();
            (Some(tag), self.parse_type_expr()?)
        } else {
            (None, self.parse_type_expr()?)
        };
        self.expect(TokenKind::Of)?;

        let mut cases = Vec::new();
        while !self.at_eof() && !self.at(TokenKind::End) && !self.at(TokenKind::RParen) {
            let mut labels = vec![self.parse_expr()?];
            while self.eat(TokenKind::Comma) {
                labels.push(self.parse_expr()?);
            }
            self.expect(TokenKind::Colon)?;
            self.expect(TokenKind::LParen)?;
            let mut fields = Vec::new();
            let mut nested = None;
            while !self.at_eof() && !self.at(TokenKind::RParen) {
                if self.at(TokenKind::Case) {
                    nested = Some(Box::new(self.parse_variant_part()?));
                } else {
                    fields.push(self.parse_field_decl()?);
                }
            }
            self.expect(TokenKind::RParen)?;
            self.eat(TokenKind::Semicolon);
            cases.push(VariantCase {
                labels,
                fields,
                nested,
            });
        }
        Ok(VariantPart {
            tag,
            tag_type,
            cases,
            span: self.span_from(start),
        })
    }

    fn parse_property(&mut self) -> ParseResult<PropertyDecl> {
        let start = self.expect(TokenKind::Property)?.span;
        let name = self.expect_ident()?;
        let params = if self.at(TokenKind::LBracket) {
            self.parse_param_list(TokenKind::LBracket, TokenKind::RBracket)?
        } else {
            Vec::new()
        };
        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };

        let mut read = None;
        let mut write = None;
        let mut is_default = false;
        loop {
            if self.eat_word("read") {
                read = Some(self.parse_expr()?);
            } else if self.eat_word("write") {
                write = Some(self.parse_expr()?);
            } else if self.at_word("index")
                || self.at_word("stored")
                || self.at_word("default")
                || self.at_word("implements")
                || self.at_word("dispid")
            {
                self.advance();
                if !self.at(TokenKind::Semicolon) {
                    self.parse_expr()?;
                }
            } else if self.at_word("nodefault")
                || self.at_word("readonly")
                || self.at_word("writeonly")
            {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::Semicolon)?;
        if self.at_word("default") && self.peek_nth(1).kind == TokenKind::Semicolon {
            self.advance();
            self.advance();
            is_default = true;
        }
        Ok(PropertyDecl {
            name,
            params,
            ty,
            read,
            write,
            is_class: false,
            is_default,
            span: self.span_from(start),
        })
    }

    // ----- constants and variables --------------------------------------

    fn parse_const_section(&mut self, resource: bool) -> ParseResult<Vec<ConstDecl>> {
        let mut decls = Vec::new();
        loop {
            self.skip_attributes();
            if !(self.at_ident()
                && matches!(self.peek_nth(1).kind, TokenKind::Eq | TokenKind::Colon))
            {
                break;
            }
            match self.parse_const_decl(resource) {
                Ok(decl) => decls.push(decl),
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                }
            }
        }
        Ok(decls)
    }

    fn parse_const_decl(&mut self, resource: bool) -> ParseResult<ConstDecl> {
        let name = self.expect_ident()?;
        let start = name.span;
        let ty = if self.eat(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        self.expect(TokenKind::Eq)?;
        let value = if ty.is_some() {
            self.parse_typed_const_value()?
        } else {
            self.parse_expr()?
        };
        self.skip_hint_directives();
        self.expect(TokenKind::Semicolon)?;
        Ok(ConstDecl {
            name,
            ty,
            value,
            is_resource_string: resource,
            span: self.span_from(start),
        })
    }

    fn parse_var_section(&mut self, thread: bool) -> ParseResult<Vec<VarDecl>> {
        let mut decls = Vec::new();
        loop {
            self.skip_attributes();
            if !(self.at_ident()
                && matches!(self.peek_nth(1).kind, TokenKind::Comma | TokenKind::Colon))
            {
                break;
            }
            match self.parse_var_decl(thread) {
                Ok(decl) => decls.push(decl),
                Err(err) => {
                    self.report(err);
                    self.synchronize();
                }
            }
        }
        Ok(decls)
    }

    fn parse_var_decl(&mut self, thread: bool) -> ParseResult<VarDecl> {
        let start = self.current_span();
        let names = self.ident_list()?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type_expr()?;
        let init = if self.eat_word("absolute") {
            self.parse_expr()?;
            None
        } else if self.eat(TokenKind::Eq) {
            Some(self.parse_typed_const_value()?)
        } else {
            None
        };
        self.skip_hint_directives();
        self.expect(TokenKind::Semicolon)?;
        Ok(VarDecl {
            names,
            ty,
            init,
            is_thread_var: thread,
            span: self.span_from(start),
        })
    }

    // ----- routines -----------------------------------------------------

    pub(crate) fn parse_param_list(
        &mut self,
        open: TokenKind,
        close: TokenKind,
    ) -> ParseResult<Vec<ParamGroup>> {
        self.expect(open)?;
        let mut groups = Vec::new();
        while !self.at(close) && !self.at_eof() {
            self.skip_attributes();
            let start = self.current_span();
            let mode = match self.peek_kind() {
                TokenKind::Const => {
                    self.advance();
                    self.skip_attributes();
                    ParamMode::Const
                }
                TokenKind::Var => {
                    self.advance();
                    ParamMode::Var
                }
                _ if self.at_word("out") && self.peek_nth(1).kind.is_identifier() => {
                    self.advance();
                    ParamMode::Out
                }
                _ => ParamMode::Value,
            };
            let names = self.ident_list()?;
            let ty = if self.eat(TokenKind::Colon) {
                Some(self.parse_type_expr()?)
            } else {
                None
            };
            let default = if self.eat(TokenKind::Eq) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            groups.push(ParamGroup {
                mode,
                names,
                ty,
                default,
                span: self.span_from(start),
            });
            if !self.eat(TokenKind::Semicolon) {
                break;
            }
        }
        self.expect(close)?;
        Ok(groups)
    }

    fn parse_routine_kind(&mut self) -> ParseResult<(RoutineKind, bool)> {
        let is_class = self.eat(TokenKind::Class);
        let kind = match self.peek_kind() {
            TokenKind::Procedure => RoutineKind::Procedure,
            TokenKind::Function => RoutineKind::Function,
            TokenKind::Constructor => RoutineKind::Constructor,
            TokenKind::Destructor => RoutineKind::Destructor,
            _ if self.at_word("operator") => RoutineKind::Operator,
            _ => return Err(self.unexpected("'procedure' or 'function'")),
        };
        self.advance();
        Ok((kind, is_class))
    }

    /// Routine heading including trailing directives.
    pub(crate) fn parse_routine_heading(&mut self) -> ParseResult<RoutineHeading> {
        let start = self.current_span();
        let (kind, is_class_method) = self.parse_routine_kind()?;

        let mut name = vec![self.expect_ident()?];
        let mut type_params = self.parse_type_params()?;
        while self.eat(TokenKind::Dot) {
            name.push(self.expect_member_name()?);
            // Type parameters on the owner (`TFoo<T>.Bar`) are restated
            // generics of the owner, not of the routine.
            type_params = self.parse_type_params()?;
        }

        let has_param_list = self.at(TokenKind::LParen);
        let params = if has_param_list {
            self.parse_param_list(TokenKind::LParen, TokenKind::RParen)?
        } else {
            Vec::new()
        };
        let return_type = if self.eat(TokenKind::Colon) {
            Some(self.parse_type_expr()?)
        } else {
            None
        };
        // `procedure IFoo.Bar = Baz;` method resolution clause
        if self.eat(TokenKind::Eq) {
            self.expect_ident()?;
        }
        // A directive may follow the heading without a separating `;`.
        if !self.eat(TokenKind::Semicolon) && !self.at_directive() {
            return Err(self.unexpected("';'"));
        }
        let directives = self.parse_routine_directives()?;

        Ok(RoutineHeading {
            kind,
            is_class_method,
            name,
            type_params,
            params,
            has_param_list,
            return_type,
            directives,
            span: self.span_from(start),
        })
    }

    fn at_directive(&self) -> bool {
        const KNOWN: &[&str] = &[
            "overload",
            "virtual",
            "dynamic",
            "override",
            "abstract",
            "reintroduce",
            "static",
            "forward",
            "external",
            "message",
            "deprecated",
            "platform",
            "experimental",
            "dispid",
        ];
        self.at(TokenKind::Inline)
            || KNOWN.iter().any(|d| self.at_word(d))
            || IGNORED_DIRECTIVES.iter().any(|d| self.at_word(d))
    }

    fn parse_routine_directives(&mut self) -> ParseResult<RoutineDirectives> {
        let mut directives = RoutineDirectives::default();
        while self.at_directive() {
            let token = self.advance();
            let word = token.text.to_ascii_lowercase();
            match word.as_str() {
                "overload" => directives.overload = true,
                "virtual" => directives.is_virtual = true,
                "dynamic" => directives.is_dynamic = true,
                "override" => directives.is_override = true,
                "abstract" => directives.is_abstract = true,
                "reintroduce" => directives.reintroduce = true,
                "static" => directives.is_static = true,
                "forward" => directives.forward = true,
                "inline" => directives.inline = true,
                "external" => {
                    directives.external = true;
                    // external 'lib.dll' name 'Foo' index 3 delayed
                    while !self.at(TokenKind::Semicolon) && !self.at_eof() {
                        self.advance();
                    }
                }
                "message" | "dispid" => {
                    self.parse_expr()?;
                }
                "deprecated" => {
                    if self.at(TokenKind::QuotedString) {
                        self.advance();
                    }
                }
                _ => {}
            }
            if !self.eat(TokenKind::Semicolon) && !self.at_directive() {
                break;
            }
        }
        Ok(directives)
    }

    /// A routine heading, followed by a body when `with_bodies` is set and
    /// the heading is not `forward`/`external`.
    pub(crate) fn parse_routine(&mut self, with_bodies: bool) -> ParseResult<RoutineDecl> {
        let start = self.current_span();
        let heading = self.parse_routine_heading()?;
        let wants_body = with_bodies
            && !heading.directives.forward
            && !heading.directives.external
            && !heading.directives.is_abstract;
        let body = if wants_body {
            Some(self.parse_routine_body()?)
        } else {
            None
        };
        Ok(RoutineDecl {
            id: self.next_id(),
            heading,
            body,
            span: self.span_from(start),
        })
    }

    fn parse_routine_body(&mut self) -> ParseResult<RoutineBody> {
        let decls = self.parse_local_decls();
        let (block, is_asm) = if self.at(TokenKind::Asm) {
            (self.skip_asm_block()?, true)
        } else {
            self.expect(TokenKind::Begin)?;
            let block = self.parse_stmt_block_until_terminators(&[TokenKind::End]);
            (block, false)
        };
        self.expect(TokenKind::End)?;
        self.expect(TokenKind::Semicolon)?;
        Ok(RoutineBody {
            decls,
            block,
            is_asm,
        })
    }

    /// Consume `asm ... ` up to (not including) the closing `end`.
    pub(crate) fn skip_asm_block(&mut self) -> ParseResult<Block> {
        let start = self.expect(TokenKind::Asm)?.span;
        while !self.at_eof() && !self.at(TokenKind::End) {
            self.advance();
        }
        if self.at_eof() {
            return Err(ParserError::UnexpectedEof("'end'".to_string()));
        }
        Ok(Block {
            id: self.next_id(),
            stmts: Vec::new(),
            span: self.span_from(start),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::syntax::ast::*;
    use crate::diagnostics::DiagnosticHandler;
    use crate::syntax::parser::tests::parse;

    fn interface_types(source: &str) -> Vec<TypeDecl> {
        let (file, handler) = parse(source);
        assert_eq!(handler.error_count(), 0, "{:?}", handler.get_diagnostics());
        file.interface
            .map(|s| {
                s.decls
                    .into_iter()
                    .flat_map(|d| match d {
                        Decl::Types(types) => types,
                        _ => Vec::new(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn test_forward_stub_and_full_class() {
        let types = interface_types(
            "unit A; interface type\n  TFoo = class;\n  TBar = class(TObject);\n  TFoo = class(TBar)\n  private\n    FX: Integer;\n  public\n    procedure Run; virtual; abstract;\n    property X: Integer read FX write FX;\n  end;\nimplementation end.",
        );
        assert_eq!(types.len(), 3);
        assert!(matches!(types[0].ty.kind, TypeExprKind::Forward(StructKind::Class)));
        match &types[1].ty.kind {
            TypeExprKind::Struct(s) => assert!(!s.has_body),
            other => panic!("unexpected {:?}", other),
        }
        match &types[2].ty.kind {
            TypeExprKind::Struct(s) => {
                assert!(s.has_body);
                assert_eq!(s.heritage.len(), 1);
                let visibilities: Vec<_> = s.members().map(|(_, v)| v).collect();
                assert_eq!(
                    visibilities,
                    vec![Visibility::Private, Visibility::Public, Visibility::Public]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_interface_with_guid_and_bodyless_interface() {
        let types = interface_types(
            "unit A; interface type\n  IFoo = interface\n    ['{00000000-0000-0000-0000-000000000000}']\n    procedure Bar;\n  end;\n  IEmpty = interface;\nimplementation end.",
        );
        assert_eq!(types.len(), 2);
        assert!(matches!(types[1].ty.kind, TypeExprKind::Forward(StructKind::Interface)));
    }

    #[test]
    fn test_record_with_variant_part() {
        let types = interface_types(
            "unit A; interface type\n  TRec = packed record\n    Kind: Byte;\n    case Integer of\n      0: (I: Integer);\n      1: (D: Double; E: Byte);\n  end;\nimplementation end.",
        );
        match &types[0].ty.kind {
            TypeExprKind::Struct(s) => {
                assert!(s.is_packed);
                let variant = s.variant.as_ref().map(|v| v.cases.len());
                assert_eq!(variant, Some(2));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_generic_type_and_method() {
        let types = interface_types(
            "unit A; interface type\n  TBox<T: class> = class\n    function Get<U>(const A: T): U; overload;\n  end;\nimplementation end.",
        );
        assert_eq!(types[0].type_params.len(), 1);
        match &types[0].ty.kind {
            TypeExprKind::Struct(s) => match s.members().next() {
                Some((Member::Method(m), _)) => {
                    assert_eq!(m.heading.type_params.len(), 1);
                    assert!(m.heading.directives.overload);
                    assert_eq!(m.heading.params[0].mode, ParamMode::Const);
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_method_implementation_and_locals() {
        let (file, handler) = parse(
            "unit A; interface implementation\nfunction TFoo.Bar(X: Integer): Integer;\nvar\n  Y: Integer;\n\n  procedure Nested;\n  begin\n  end;\n\nbegin\n  Result := X;\nend;\nend.",
        );
        assert_eq!(handler.error_count(), 0, "{:?}", handler.get_diagnostics());
        let decls = file.implementation.map(|s| s.decls).unwrap_or_default();
        match &decls[0] {
            Decl::Routine(r) => {
                assert_eq!(r.heading.name.len(), 2);
                let body = r.body.as_ref().map(|b| (b.decls.len(), b.block.stmts.len()));
                assert_eq!(body, Some((2, 1)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_consts_vars_and_procedural_types() {
        let (file, handler) = parse(
            "unit A; interface\nconst\n  Max = 10;\n  Names: array[0..1] of string = ('a', 'b');\nresourcestring\n  SMsg = 'hello';\ntype\n  TProc = procedure(X: Integer) of object;\n  TFunc = reference to function: Boolean;\nvar\n  G, H: Integer;\nthreadvar\n  T: Pointer;\nimplementation end.",
        );
        assert_eq!(handler.error_count(), 0, "{:?}", handler.get_diagnostics());
        let decls = file.interface.map(|s| s.decls).unwrap_or_default();
        assert_eq!(decls.len(), 5);
    }

    #[test]
    fn test_external_and_forward_routines_have_no_body() {
        let (file, handler) = parse(
            "unit A; interface implementation\nprocedure Ext; external 'k.dll' name 'E';\nprocedure Fwd; forward;\nprocedure Fwd;\nbegin\nend;\nend.",
        );
        assert_eq!(handler.error_count(), 0, "{:?}", handler.get_diagnostics());
        let decls = file.implementation.map(|s| s.decls).unwrap_or_default();
        let bodies: Vec<bool> = decls
            .iter()
            .filter_map(|d| match d {
                Decl::Routine(r) => Some(r.body.is_some()),
                _ => None,
            })
            .collect();
        assert_eq!(bodies, vec![false, false, true]);
    }
}
