use crate::config::RuleProperties;
use crate::errors::ConfigError;
use crate::rules::query::{Query, QueryTree, DOCUMENT};
use crate::rules::{Rule, RuleContext, RuleFactory};
use std::sync::Arc;
use tracing::debug;

/// Reports every node a configured path query selects.
#[derive(Debug, Clone)]
pub struct XPathRule {
    query: Arc<Query>,
    message: Arc<str>,
}

impl XPathRule {
    pub fn build(props: &RuleProperties) -> Result<RuleFactory, ConfigError> {
        let query = Query::compile(props.required("xpath")?).map_err(|source| ConfigError::InvalidQuery {
            property: "xpath".to_string(),
            source,
        })?;
        let rule = XPathRule {
            query: Arc::new(query),
            message: Arc::from(props.required("message")?),
        };
        Ok(Arc::new(move || Box::new(rule.clone())))
    }
}

impl Rule for XPathRule {
    fn end_file(&mut self, ctx: &mut RuleContext) {
        let model = ctx.model;
        let tree = QueryTree::build(model);
        let selected = self.query.select(&tree, model.arena(), model.index);
        debug!(
            rule = ctx.rule_key(),
            query = self.query.as_str(),
            nodes = selected.len(),
            "path query evaluated"
        );
        for node in selected {
            if node == DOCUMENT {
                ctx.report_file(self.message.as_ref());
            } else {
                ctx.report_line(tree.node(node).line, self.message.as_ref());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{check_with, lines};
    use crate::config::{RuleProperties, RuleSettings};
    use crate::errors::{ConfigError, QueryError};
    use crate::rules::builtin::XPathRule;
    use indexmap::IndexMap;

    const SOURCE: &str = "unit A; interface implementation\n\
        uses System.SysUtils;\n\
        procedure Run;\n\
        var E: Exception;\n\
        begin\n\
          E := Exception.Create('x');\n\
          try\n\
            raise E;\n\
          except\n\
          end;\n\
        end;\n\
        end.";

    fn template(xpath: &str) -> RuleSettings {
        RuleSettings::new()
            .template("XPathTemplate")
            .property("xpath", xpath)
            .property("message", "Swallowed exception")
    }

    #[test]
    fn test_reports_each_selected_node() {
        let issues = check_with("EmptyExcept", template("//Try/Except[not(*)]"), &[SOURCE]);
        assert_eq!(lines(&issues), vec![Some(7)]);
        assert_eq!(issues[0].rule_key, "EmptyExcept");
        assert_eq!(issues[0].message, "Swallowed exception");
    }

    #[test]
    fn test_typed_query() {
        let settings = template("//Raise/Name[typeInheritsFrom('System.TObject')]");
        assert_eq!(lines(&check_with("RaiseVariable", settings, &[SOURCE])), vec![Some(8)]);
    }

    #[test]
    fn test_invalid_query_is_a_config_error() {
        let mut values = IndexMap::new();
        values.insert("xpath".to_string(), "//Call[".to_string());
        values.insert("message".to_string(), "m".to_string());
        let error = XPathRule::build(&RuleProperties::new(&values)).err().unwrap();
        assert!(matches!(
            error,
            ConfigError::InvalidQuery {
                source: QueryError::UnexpectedToken { .. },
                ..
            }
        ));

        values.remove("message");
        values.insert("xpath".to_string(), "//Call".to_string());
        let error = XPathRule::build(&RuleProperties::new(&values)).err().unwrap();
        assert_eq!(error, ConfigError::MissingProperty("message".to_string()));
    }
}
