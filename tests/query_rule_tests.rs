mod common;

use common::{lines, ProjectHarness};
use delphi_lint::{Query, QueryError, RuleSettings};

const ERRORS: &str = r#"unit Errors;
interface
uses System.SysUtils;
type
  EDomain = class(Exception);
  ENotFound = class(EDomain);
implementation
end."#;

const SERVICE: &str = r#"unit Service;
interface
implementation
uses System.SysUtils, Errors;
procedure Find(Key: Integer);
begin
  if Key < 0 then
    raise ENotFound.Create('missing');
  if Key = 0 then
    raise Exception.Create('zero');
  try
    Find(Key - 1);
  except
  end;
end;
end."#;

fn query_rule(xpath: &str, message: &str) -> RuleSettings {
    RuleSettings::new()
        .template("XPathTemplate")
        .property("xpath", xpath)
        .property("message", message)
}

fn service_issues(key: &str, xpath: &str) -> Vec<Option<u32>> {
    let mut project = ProjectHarness::new();
    project
        .configure(key, query_rule(xpath, "matched"))
        .add_unit("Errors", ERRORS)
        .add_unit("Service", SERVICE);
    let issues: Vec<_> = project
        .issues()
        .into_iter()
        .filter(|issue| issue.file.ends_with("Service.pas"))
        .collect();
    lines(&issues)
}

#[test]
fn test_type_predicates_across_units() {
    assert_eq!(
        service_issues("DomainRaise", "//Raise/Call[typeInheritsFrom('Errors.EDomain')]"),
        vec![Some(8)]
    );
    assert_eq!(
        service_issues("AnyRaise", "//Raise/Call[typeIs('System.SysUtils.Exception')]"),
        vec![Some(8), Some(10)]
    );
    assert_eq!(
        service_issues("GenericRaise", "//Raise/Call[typeIsExactly('System.SysUtils.Exception')]"),
        vec![Some(10)]
    );
}

#[test]
fn test_structural_queries() {
    assert_eq!(service_issues("EmptyExcept", "//Try/Except[not(*)]"), vec![Some(11)]);
    assert_eq!(
        service_issues("Recursion", "//Routine[@name = 'Find']//Call[@name = 'Find']"),
        vec![Some(12)]
    );
    assert_eq!(
        service_issues("MessageLiterals", "//Call/Literal[@kind = 'string' and string-length(@value) > 4]"),
        vec![Some(8)]
    );
}

#[test]
fn test_misused_type_predicate_only_fails_that_node() {
    assert!(service_issues("Untyped", "//Routine[typeIs('Errors.EDomain')]").is_empty());
    assert!(service_issues("Arity", "//Raise/Call[typeIs()]").is_empty());
    assert!(service_issues("Unresolved", "//Raise/Call[typeIs('Nowhere.EMissing')]").is_empty());
}

#[test]
fn test_invalid_queries_are_config_diagnostics() {
    let mut project = ProjectHarness::new();
    project
        .configure("Broken", query_rule("//Raise[", "m"))
        .configure("UnknownFunction", query_rule("//Raise[matches(@name, 'x')]", "m"))
        .configure("NoMessage", RuleSettings::new().template("XPathTemplate").property("xpath", "//Raise"))
        .enable("EmptyUnit")
        .add_unit("Empty", "unit Empty; interface implementation end.");
    let output = project.analyze();
    let keys: Vec<&str> = output
        .config_diagnostics
        .iter()
        .map(|d| d.rule_key.as_str())
        .collect();
    assert_eq!(keys, vec!["Broken", "UnknownFunction", "NoMessage"]);
    assert_eq!(output.issues.len(), 1);
    assert_eq!(output.issues[0].rule_key, "EmptyUnit");
}

#[test]
fn test_query_compilation() {
    assert!(Query::compile("//Class[count(Field) > 3] | //Record/Field").is_ok());
    assert!(Query::compile("//Member/ancestor::Routine[1]/@name").is_ok());
    assert_eq!(
        Query::compile("//Call[upper-case(@name)]"),
        Err(QueryError::UnknownFunction("upper-case".to_string()))
    );
}
