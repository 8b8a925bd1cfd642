//! Path queries over resolved syntax trees.
//!
//! A [`Query`] is compiled once when the rule configuration is loaded and
//! evaluated against a [`QueryTree`] built per file. Syntax errors and
//! unknown functions surface at compile time; the type predicates
//! (`typeIs`, `typeIsExactly`, `typeInheritsFrom`) turn any misuse into a
//! non-match of that one predicate.

pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod tree;

pub use eval::{Evaluator, Value};
pub use parser::QueryExpr;
pub use tree::{QueryNode, QueryNodeId, QueryTree, DOCUMENT};

use crate::errors::QueryError;
use crate::symbols::SymbolIndex;
use crate::types::TypeArena;

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    text: String,
    expr: QueryExpr,
}

impl Query {
    pub fn compile(text: &str) -> Result<Self, QueryError> {
        Ok(Query {
            text: text.to_string(),
            expr: parser::parse(text)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> &QueryExpr {
        &self.expr
    }

    /// Nodes the query selects, in document order.
    pub fn select(&self, tree: &QueryTree, arena: &TypeArena, index: &SymbolIndex) -> Vec<QueryNodeId> {
        Evaluator::new(tree, arena, index).select(&self.expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phases::resolution_phase::tests::Project;
    use crate::rules::FileModel;
    use crate::stdlib::BUILTIN_UNITS;
    use crate::symbols::UnitId;
    use std::path::Path;

    const SOURCE: &str = "unit A;\n\
        interface\n\
        uses System.SysUtils;\n\
        type\n\
          TBase = class end;\n\
          TDerived = class(TBase)\n\
          public\n\
            Count: Integer;\n\
          end;\n\
        implementation\n\
        procedure Run;\n\
        var\n\
          D: TDerived;\n\
          B: TBase;\n\
          Text: string;\n\
        begin\n\
          D := TDerived.Create;\n\
          B := D;\n\
          Text := 'abc';\n\
          if Text = '' then\n\
            D.Free;\n\
          FreeAndNil(B);\n\
        end;\n\
        end.";

    /// Lines of the nodes selected by `query` in `SOURCE`.
    fn lines(query: &str) -> Vec<u32> {
        let project = Project::new(&[SOURCE]);
        let resolution = project.resolve(0);
        let model = FileModel {
            path: Path::new("src/unit0.pas"),
            unit: UnitId(BUILTIN_UNITS.len() as u32),
            file: project.file(0),
            index: &project.index,
            resolution: &resolution,
        };
        let tree = QueryTree::build(&model);
        let query = Query::compile(query).unwrap();
        query
            .select(&tree, model.arena(), model.index)
            .into_iter()
            .map(|n| tree.node(n).line)
            .collect()
    }

    #[test]
    fn test_attribute_predicates() {
        assert_eq!(lines("//Call[@name = 'FreeAndNil']"), vec![22]);
        assert_eq!(lines("//Field[@visibility = 'public']"), vec![8]);
        assert_eq!(lines("//Member[@name = 'Free' and @declKind = 'routine']"), vec![21]);
        assert_eq!(lines("//Literal[@value = 'abc']"), vec![19]);
    }

    #[test]
    fn test_relative_paths_axes_and_unions() {
        assert_eq!(lines("//If[Binary/Literal]/ExprStmt | //Call[count(Name) = 2]"), vec![21, 22]);
        assert_eq!(lines("//Member/ancestor::Routine"), vec![11]);
        assert_eq!(lines("//Routine[Block/Assign[3]]/@name"), Vec::<u32>::new());
        assert_eq!(lines("//Routine/Block/Assign[3]"), vec![19]);
        assert_eq!(lines("//VarDecl[starts-with(lower-case(@name), 'te')]"), vec![15]);
        assert_eq!(lines("//VarDecl[not(string-length(@name) > 1)]"), vec![13, 14]);
    }

    #[test]
    fn test_type_predicates() {
        assert_eq!(lines("//Assign/Name[1][typeIs('A.TBase')]"), vec![17, 18]);
        assert_eq!(lines("//Assign/Name[1][typeIsExactly('A.TBase')]"), vec![18]);
        assert_eq!(lines("//Assign/Name[1][typeInheritsFrom('A.TBase')]"), vec![17]);
        assert_eq!(lines("//Assign/Name[1][typeIs('System.TObject')]"), vec![17, 18]);
        assert_eq!(lines("//Assign/Name[1][typeIs('System.string')]"), vec![19]);
    }

    #[test]
    fn test_type_predicate_misuse_is_a_non_match() {
        // Untyped node, wrong arity and wrong argument kind.
        assert!(lines("//Routine[typeIs('A.TBase')]").is_empty());
        assert!(lines("//Assign/Name[1][typeIs('A.TBase', 'x')]").is_empty());
        assert!(lines("//Assign/Name[1][typeIs(1)]").is_empty());
        assert_eq!(lines("//Assign/Name[1][typeIs(1) or typeIs('A.TBase')]"), vec![17, 18]);
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(
            Query::compile("//Call[regex(@name)]"),
            Err(QueryError::UnknownFunction("regex".to_string()))
        );
        assert!(Query::compile("//Call[@name = ]").is_err());
    }
}
