//! Recursive-descent parser for path queries.
//!
//! ```text
//! expr     := and ("or" and)*
//! and      := compare ("and" compare)*
//! compare  := union (op union)?
//! union    := primary ("|" primary)*
//! primary  := string | number | "(" expr ")" | name "(" args ")" | path
//! path     := ("/" | "//")? step (("/" | "//") step)*
//! step     := "." | ".." | "@" name | (axis "::")? (name | "*") predicate*
//! ```

use super::functions::Function;
use super::lexer::{tokenize, Lexeme, QueryToken};
use crate::errors::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    SelfNode,
}

impl Axis {
    fn from_name(name: &str) -> Option<Axis> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "self" => Axis::SelfNode,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    Any,
    Kind(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<QueryExpr>,
}

impl Step {
    fn any(axis: Axis) -> Self {
        Step {
            axis,
            test: NodeTest::Any,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    /// Starts at the document root instead of the context node.
    pub absolute: bool,
    pub steps: Vec<Step>,
    /// Trailing `@name`.
    pub attribute: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpr {
    Path(LocationPath),
    Union(Vec<QueryExpr>),
    Or(Box<QueryExpr>, Box<QueryExpr>),
    And(Box<QueryExpr>, Box<QueryExpr>),
    Compare(CompareOp, Box<QueryExpr>, Box<QueryExpr>),
    Literal(String),
    Number(f64),
    Call(Function, Vec<QueryExpr>),
}

pub fn parse(query: &str) -> Result<QueryExpr, QueryError> {
    let lexemes = tokenize(query)?;
    let mut parser = Parser { lexemes, pos: 0 };
    let expr = parser.expr()?;
    parser.expect(QueryToken::Eof)?;
    Ok(expr)
}

struct Parser<'q> {
    lexemes: Vec<Lexeme<'q>>,
    pos: usize,
}

impl<'q> Parser<'q> {
    fn current(&self) -> &Lexeme<'q> {
        // The lexeme list always ends with Eof, which is never consumed.
        &self.lexemes[self.pos.min(self.lexemes.len() - 1)]
    }

    fn peek(&self) -> QueryToken {
        self.current().token
    }

    fn peek_at(&self, ahead: usize) -> QueryToken {
        self.lexemes
            .get(self.pos + ahead)
            .map_or(QueryToken::Eof, |l| l.token)
    }

    fn advance(&mut self) -> Lexeme<'q> {
        let lexeme = self.current().clone();
        if lexeme.token != QueryToken::Eof {
            self.pos += 1;
        }
        lexeme
    }

    fn eat(&mut self, token: QueryToken) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek() == QueryToken::Name && self.current().text == keyword {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> QueryError {
        let current = self.current();
        QueryError::UnexpectedToken {
            expected: expected.to_string(),
            found: match current.token {
                QueryToken::Eof => current.token.to_string(),
                _ => format!("'{}'", current.text),
            },
            offset: current.offset,
        }
    }

    fn expect(&mut self, token: QueryToken) -> Result<Lexeme<'q>, QueryError> {
        if self.peek() == token {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn expr(&mut self) -> Result<QueryExpr, QueryError> {
        let mut lhs = self.and()?;
        while self.eat_keyword("or") {
            let rhs = self.and()?;
            lhs = QueryExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<QueryExpr, QueryError> {
        let mut lhs = self.compare()?;
        while self.eat_keyword("and") {
            let rhs = self.compare()?;
            lhs = QueryExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn compare(&mut self) -> Result<QueryExpr, QueryError> {
        let lhs = self.union()?;
        let op = match self.peek() {
            QueryToken::Eq => CompareOp::Eq,
            QueryToken::NotEq => CompareOp::NotEq,
            QueryToken::Lt => CompareOp::Lt,
            QueryToken::LtEq => CompareOp::LtEq,
            QueryToken::Gt => CompareOp::Gt,
            QueryToken::GtEq => CompareOp::GtEq,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.union()?;
        Ok(QueryExpr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn union(&mut self) -> Result<QueryExpr, QueryError> {
        let first = self.primary()?;
        if self.peek() != QueryToken::Pipe {
            return Ok(first);
        }
        let mut members = vec![first];
        while self.eat(QueryToken::Pipe) {
            members.push(self.primary()?);
        }
        Ok(QueryExpr::Union(members))
    }

    fn primary(&mut self) -> Result<QueryExpr, QueryError> {
        match self.peek() {
            QueryToken::String => {
                let text = self.advance().text;
                Ok(QueryExpr::Literal(text[1..text.len() - 1].to_string()))
            }
            QueryToken::Number => {
                let lexeme = self.advance();
                lexeme
                    .text
                    .parse()
                    .map(QueryExpr::Number)
                    .map_err(|_| QueryError::UnexpectedToken {
                        expected: "number".to_string(),
                        found: lexeme.text.to_string(),
                        offset: lexeme.offset,
                    })
            }
            QueryToken::LParen => {
                self.advance();
                let expr = self.expr()?;
                self.expect(QueryToken::RParen)?;
                Ok(expr)
            }
            QueryToken::Name if self.peek_at(1) == QueryToken::LParen => self.call(),
            _ => self.path().map(QueryExpr::Path),
        }
    }

    fn call(&mut self) -> Result<QueryExpr, QueryError> {
        let name = self.advance().text;
        let function = Function::lookup(name).ok_or_else(|| QueryError::UnknownFunction(name.to_string()))?;
        self.expect(QueryToken::LParen)?;
        let mut args = Vec::new();
        if self.peek() != QueryToken::RParen {
            args.push(self.expr()?);
            while self.eat(QueryToken::Comma) {
                args.push(self.expr()?);
            }
        }
        self.expect(QueryToken::RParen)?;
        function.check_arity(args.len())?;
        Ok(QueryExpr::Call(function, args))
    }

    fn path(&mut self) -> Result<LocationPath, QueryError> {
        let mut path = LocationPath {
            absolute: false,
            steps: Vec::new(),
            attribute: None,
        };
        match self.peek() {
            QueryToken::Slash => {
                self.advance();
                path.absolute = true;
                if !self.starts_step() {
                    return Ok(path);
                }
            }
            QueryToken::DoubleSlash => {
                self.advance();
                path.absolute = true;
                path.steps.push(Step::any(Axis::DescendantOrSelf));
            }
            _ => {}
        }
        loop {
            if self.eat(QueryToken::At) {
                let name = self.expect(QueryToken::Name)?;
                path.attribute = Some(name.text.to_string());
                return Ok(path);
            }
            path.steps.push(self.step()?);
            if self.eat(QueryToken::DoubleSlash) {
                path.steps.push(Step::any(Axis::DescendantOrSelf));
            } else if !self.eat(QueryToken::Slash) {
                return Ok(path);
            }
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            QueryToken::Name | QueryToken::Star | QueryToken::Dot | QueryToken::DotDot | QueryToken::At
        )
    }

    fn step(&mut self) -> Result<Step, QueryError> {
        if self.eat(QueryToken::Dot) {
            return Ok(Step::any(Axis::SelfNode));
        }
        if self.eat(QueryToken::DotDot) {
            return Ok(Step::any(Axis::Parent));
        }
        let mut axis = Axis::Child;
        if self.peek() == QueryToken::Name && self.peek_at(1) == QueryToken::Axis {
            let name = self.advance().text;
            axis = Axis::from_name(name).ok_or_else(|| QueryError::UnknownAxis(name.to_string()))?;
            self.advance();
        }
        let test = match self.peek() {
            QueryToken::Star => {
                self.advance();
                NodeTest::Any
            }
            QueryToken::Name => NodeTest::Kind(self.advance().text.to_string()),
            _ => return Err(self.unexpected("node test")),
        };
        let mut predicates = Vec::new();
        while self.eat(QueryToken::LBracket) {
            predicates.push(self.expr()?);
            self.expect(QueryToken::RBracket)?;
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }
}
