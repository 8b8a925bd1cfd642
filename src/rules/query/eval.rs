//! Evaluation of compiled queries over a query tree.

use super::functions::{call_core, call_type_predicate, Function};
use super::parser::{Axis, CompareOp, LocationPath, NodeTest, QueryExpr, Step};
use super::tree::{QueryNodeId, QueryTree, DOCUMENT};
use crate::symbols::SymbolIndex;
use crate::types::TypeArena;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Node set in document order.
    Nodes(Vec<QueryNodeId>),
    /// Attribute values selected by a trailing `@name`.
    Strings(Vec<String>),
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Value {
    /// Size of a node or attribute set; scalars count as empty.
    pub fn len(&self) -> usize {
        match self {
            Value::Nodes(nodes) => nodes.len(),
            Value::Strings(values) => values.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn boolean(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Strings(values) => !values.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    /// String value; sets take their first member. Node sets must be
    /// atomized by the evaluator first.
    pub fn string(&self) -> String {
        match self {
            Value::Nodes(_) => String::new(),
            Value::Strings(values) => values.first().cloned().unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) if n.fract() == 0.0 && n.is_finite() => format!("{}", *n as i64),
            Value::Num(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Atom {
    Str(String),
    Num(f64),
}

impl Atom {
    fn number(&self) -> f64 {
        match self {
            Atom::Num(n) => *n,
            Atom::Str(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }
}

pub struct Evaluator<'t> {
    tree: &'t QueryTree,
    arena: &'t TypeArena,
    index: &'t SymbolIndex,
}

impl<'t> Evaluator<'t> {
    pub fn new(tree: &'t QueryTree, arena: &'t TypeArena, index: &'t SymbolIndex) -> Self {
        Self { tree, arena, index }
    }

    /// Nodes selected by a query evaluated from the document root.
    pub fn select(&self, expr: &QueryExpr) -> Vec<QueryNodeId> {
        match self.eval(expr, DOCUMENT) {
            Value::Nodes(nodes) => nodes,
            _ => Vec::new(),
        }
    }

    fn eval(&self, expr: &QueryExpr, context: QueryNodeId) -> Value {
        match expr {
            QueryExpr::Path(path) => self.path(path, context),
            QueryExpr::Union(members) => {
                let mut nodes = Vec::new();
                for member in members {
                    if let Value::Nodes(selected) = self.eval(member, context) {
                        nodes.extend(selected);
                    }
                }
                nodes.sort_unstable();
                nodes.dedup();
                Value::Nodes(nodes)
            }
            QueryExpr::Or(lhs, rhs) => {
                Value::Bool(self.eval(lhs, context).boolean() || self.eval(rhs, context).boolean())
            }
            QueryExpr::And(lhs, rhs) => {
                Value::Bool(self.eval(lhs, context).boolean() && self.eval(rhs, context).boolean())
            }
            QueryExpr::Compare(op, lhs, rhs) => {
                let lhs = self.eval(lhs, context);
                let rhs = self.eval(rhs, context);
                Value::Bool(self.compare(*op, &lhs, &rhs))
            }
            QueryExpr::Literal(s) => Value::Str(s.clone()),
            QueryExpr::Number(n) => Value::Num(*n),
            QueryExpr::Call(function, args) => self.call(*function, args, context),
        }
    }

    fn call(&self, function: Function, args: &[QueryExpr], context: QueryNodeId) -> Value {
        let values: Vec<Value> = args.iter().map(|arg| self.eval(arg, context)).collect();
        match function {
            Function::Type(predicate) => {
                let ty = self.tree.node(context).ty;
                match call_type_predicate(predicate, &values, ty, self.arena, self.index) {
                    Ok(matched) => Value::Bool(matched),
                    Err(error) => {
                        debug!(node = context, %error, "type predicate evaluated to false");
                        Value::Bool(false)
                    }
                }
            }
            Function::Count | Function::Not => call_core(function, values, ""),
            _ => {
                let values = values.into_iter().map(|v| self.atomize(v)).collect();
                call_core(function, values, self.tree.string_value(context))
            }
        }
    }

    fn atomize(&self, value: Value) -> Value {
        match value {
            Value::Nodes(nodes) => Value::Strings(
                nodes
                    .into_iter()
                    .map(|n| self.tree.string_value(n).to_string())
                    .collect(),
            ),
            other => other,
        }
    }

    fn path(&self, path: &LocationPath, context: QueryNodeId) -> Value {
        let start = if path.absolute { DOCUMENT } else { context };
        let mut nodes = vec![start];
        for step in &path.steps {
            nodes = self.step(step, &nodes);
        }
        match &path.attribute {
            Some(name) => Value::Strings(
                nodes
                    .iter()
                    .filter_map(|n| self.tree.attribute(*n, name))
                    .map(str::to_string)
                    .collect(),
            ),
            None => Value::Nodes(nodes),
        }
    }

    fn step(&self, step: &Step, input: &[QueryNodeId]) -> Vec<QueryNodeId> {
        let mut output = Vec::new();
        for &node in input {
            let mut candidates: Vec<_> = self
                .axis(step.axis, node)
                .into_iter()
                .filter(|candidate| self.matches(&step.test, *candidate))
                .collect();
            for predicate in &step.predicates {
                candidates = candidates
                    .into_iter()
                    .enumerate()
                    .filter(|(position, candidate)| match self.eval(predicate, *candidate) {
                        Value::Num(n) => n == (*position + 1) as f64,
                        value => value.boolean(),
                    })
                    .map(|(_, candidate)| candidate)
                    .collect();
            }
            output.extend(candidates);
        }
        output.sort_unstable();
        output.dedup();
        output
    }

    fn axis(&self, axis: Axis, node: QueryNodeId) -> Vec<QueryNodeId> {
        let tree = self.tree;
        match axis {
            Axis::Child => tree.node(node).children.clone(),
            Axis::Descendant => {
                let mut out = Vec::new();
                tree.descendants(node, &mut out);
                out
            }
            Axis::DescendantOrSelf => {
                let mut out = vec![node];
                tree.descendants(node, &mut out);
                out
            }
            Axis::Parent => tree.node(node).parent.into_iter().collect(),
            Axis::Ancestor => {
                // Nearest first, so positions count outwards.
                let mut out = Vec::new();
                let mut current = tree.node(node).parent;
                while let Some(parent) = current {
                    out.push(parent);
                    current = tree.node(parent).parent;
                }
                out
            }
            Axis::SelfNode => vec![node],
        }
    }

    fn matches(&self, test: &NodeTest, node: QueryNodeId) -> bool {
        match test {
            NodeTest::Any => node != DOCUMENT,
            NodeTest::Kind(kind) => self.tree.node(node).kind == kind.as_str(),
        }
    }

    fn atoms(&self, value: &Value) -> Vec<Atom> {
        match value {
            Value::Nodes(nodes) => nodes
                .iter()
                .map(|n| Atom::Str(self.tree.string_value(*n).to_string()))
                .collect(),
            Value::Strings(values) => values.iter().cloned().map(Atom::Str).collect(),
            Value::Str(s) => vec![Atom::Str(s.clone())],
            Value::Num(n) => vec![Atom::Num(*n)],
            Value::Bool(b) => vec![Atom::Num(if *b { 1.0 } else { 0.0 })],
        }
    }

    /// Existential comparison: true when some pair of members satisfies it.
    fn compare(&self, op: CompareOp, lhs: &Value, rhs: &Value) -> bool {
        if let (Value::Bool(_), _) | (_, Value::Bool(_)) = (lhs, rhs) {
            let (a, b) = (lhs.boolean(), rhs.boolean());
            return match op {
                CompareOp::Eq => a == b,
                CompareOp::NotEq => a != b,
                _ => compare_numbers(op, a as u8 as f64, b as u8 as f64),
            };
        }
        let (lhs, rhs) = (self.atoms(lhs), self.atoms(rhs));
        lhs.iter().any(|a| {
            rhs.iter().any(|b| match (op, a, b) {
                (CompareOp::Eq | CompareOp::NotEq, Atom::Str(x), Atom::Str(y)) => {
                    (x == y) == (op == CompareOp::Eq)
                }
                _ => compare_numbers(op, a.number(), b.number()),
            })
        })
    }
}

fn compare_numbers(op: CompareOp, a: f64, b: f64) -> bool {
    match op {
        CompareOp::Eq => a == b,
        CompareOp::NotEq => a != b,
        CompareOp::Lt => a < b,
        CompareOp::LtEq => a <= b,
        CompareOp::Gt => a > b,
        CompareOp::GtEq => a >= b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::Num(3.0).string(), "3");
        assert_eq!(Value::Num(2.5).string(), "2.5");
        assert!(!Value::Strings(vec![]).boolean());
        assert!(Value::Str("x".into()).boolean());
        assert!(!Value::Num(f64::NAN).boolean());
        assert_eq!(Value::Str("x".into()).len(), 0);
    }

    #[test]
    fn test_atom_numbers() {
        assert_eq!(Atom::Str(" 12 ".into()).number(), 12.0);
        assert!(Atom::Str("Twelve".into()).number().is_nan());
        assert!(compare_numbers(CompareOp::LtEq, 2.0, 2.0));
        assert!(!compare_numbers(CompareOp::Gt, f64::NAN, 1.0));
    }
}
