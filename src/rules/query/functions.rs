//! Functions callable from queries.
//!
//! The function table is closed: names are bound when the query is
//! compiled, so an unknown name is a configuration error rather than a
//! runtime miss. The type predicates consult the type arena of the file
//! being checked through explicit handles and never inspect node
//! attributes.

use super::eval::Value;
use crate::core::type_compat::TypeCompatibility;
use crate::errors::QueryError;
use crate::symbols::SymbolIndex;
use crate::types::{TypeArena, TypeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Count,
    Contains,
    StartsWith,
    EndsWith,
    LowerCase,
    StringLength,
    True,
    False,
    Not,
    Type(TypePredicate),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypePredicate {
    /// The type itself, one of its ancestors or an implemented interface.
    Is,
    IsExactly,
    /// A strict ancestor or an implemented interface.
    InheritsFrom,
}

const FUNCTIONS: &[(&str, Function)] = &[
    ("count", Function::Count),
    ("contains", Function::Contains),
    ("starts-with", Function::StartsWith),
    ("ends-with", Function::EndsWith),
    ("lower-case", Function::LowerCase),
    ("string-length", Function::StringLength),
    ("true", Function::True),
    ("false", Function::False),
    ("not", Function::Not),
    ("typeIs", Function::Type(TypePredicate::Is)),
    ("typeIsExactly", Function::Type(TypePredicate::IsExactly)),
    ("typeInheritsFrom", Function::Type(TypePredicate::InheritsFrom)),
];

impl Function {
    pub fn lookup(name: &str) -> Option<Function> {
        FUNCTIONS.iter().find(|(n, _)| *n == name).map(|(_, f)| *f)
    }

    pub fn name(&self) -> &'static str {
        FUNCTIONS
            .iter()
            .find(|(_, f)| f == self)
            .map_or("?", |(n, _)| *n)
    }

    /// Accepted argument counts, checked at compile time for every function
    /// except the type predicates whose misuse only fails the evaluation.
    fn arity(&self) -> (usize, usize) {
        match self {
            Function::True | Function::False => (0, 0),
            Function::StringLength => (0, 1),
            Function::Count | Function::LowerCase | Function::Not | Function::Type(_) => (1, 1),
            Function::Contains | Function::StartsWith | Function::EndsWith => (2, 2),
        }
    }

    pub fn check_arity(&self, actual: usize) -> Result<(), QueryError> {
        let (min, max) = self.arity();
        if matches!(self, Function::Type(_)) || (min..=max).contains(&actual) {
            return Ok(());
        }
        Err(QueryError::Arity {
            name: self.name().to_string(),
            expected: max,
            actual,
        })
    }
}

/// Core functions over already evaluated arguments. `context` is the string
/// value of the context node.
pub fn call_core(function: Function, args: Vec<Value>, context: &str) -> Value {
    let count = args.len();
    let mut args = args.into_iter();
    let mut next = || args.next().unwrap_or(Value::Bool(false));
    match function {
        Function::Count => Value::Num(next().len() as f64),
        Function::Contains => {
            let (haystack, needle) = (next().string(), next().string());
            Value::Bool(haystack.contains(&needle))
        }
        Function::StartsWith => {
            let (text, prefix) = (next().string(), next().string());
            Value::Bool(text.starts_with(&prefix))
        }
        Function::EndsWith => {
            let (text, suffix) = (next().string(), next().string());
            Value::Bool(text.ends_with(&suffix))
        }
        Function::LowerCase => Value::Str(next().string().to_lowercase()),
        Function::StringLength => {
            let text = match count {
                0 => context.to_string(),
                _ => next().string(),
            };
            Value::Num(text.chars().count() as f64)
        }
        Function::True => Value::Bool(true),
        Function::False => Value::Bool(false),
        Function::Not => Value::Bool(!next().boolean()),
        Function::Type(_) => Value::Bool(false),
    }
}

/// Type predicate on the context node's type. Errors fail only this
/// evaluation.
pub fn call_type_predicate(
    predicate: TypePredicate,
    args: &[Value],
    ty: Option<TypeId>,
    arena: &TypeArena,
    index: &SymbolIndex,
) -> Result<bool, QueryError> {
    let name = Function::Type(predicate).name();
    let [argument] = args else {
        return Err(QueryError::Arity {
            name: name.to_string(),
            expected: 1,
            actual: args.len(),
        });
    };
    let Value::Str(wanted) = argument else {
        return Err(QueryError::ArgumentKind {
            name: name.to_string(),
            index: 1,
            expected: "a string literal",
        });
    };
    let ty = ty.ok_or_else(|| QueryError::UntypedNode(name.to_string()))?;
    if arena.is_unknown(ty) {
        return Ok(false);
    }
    Ok(match predicate {
        TypePredicate::IsExactly => arena.has_name(ty, wanted, index),
        TypePredicate::Is => {
            arena.has_name(ty, wanted, index)
                || arena.has_name(arena.underlying(ty), wanted, index)
                || inherits_from(arena, index, ty, wanted)
        }
        TypePredicate::InheritsFrom => inherits_from(arena, index, ty, wanted),
    })
}

fn inherits_from(arena: &TypeArena, index: &SymbolIndex, ty: TypeId, wanted: &str) -> bool {
    index
        .find_type(wanted)
        .is_some_and(|ancestor| TypeCompatibility::inherits_from(arena, ty, ancestor))
}
