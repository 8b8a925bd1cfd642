mod common;

use common::ProjectHarness;
use delphi_lint::Issue;

const RULES: &[&str] = &[
    "AssignedAndFree",
    "ClassPerFile",
    "EmptyUnit",
    "MixedNames",
    "PublicField",
    "RedundantAssignment",
    "UnusedImport",
    "UnusedLocalVariable",
    "VariableInitialization",
];

fn synthetic_unit(i: usize) -> String {
    format!(
        r#"unit Gen{i};
interface
uses System.SysUtils;
type
  TItem{i} = class
  public
    Value: Integer;
  end;
  THolder{i} = class
  end;
implementation
procedure Work{i}(Item: TItem{i});
var
  Unused, Count: integer;
begin
  count := Count;
  if Assigned(Item) then Item.Free;
end;
end."#
    )
}

fn project(order: impl Iterator<Item = usize>, parallel: bool) -> ProjectHarness {
    let mut project = ProjectHarness::new();
    for rule in RULES {
        project.enable(rule);
    }
    project.options(|options| options.parallel = parallel);
    for i in order {
        project.add_unit(&format!("Gen{}", i), &synthetic_unit(i));
    }
    project
}

#[test]
fn test_repeated_runs_are_identical() {
    let project = project(0..12, true);
    let first = project.analyze();
    let second = project.analyze();
    assert!(!first.issues.is_empty());
    assert_eq!(first.issues, second.issues);
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(first.stats, second.stats);
}

#[test]
fn test_input_order_and_scheduling_do_not_matter() {
    let forward = project(0..12, true).issues();
    let backward = project((0..12).rev(), true).issues();
    let sequential = project(0..12, false).issues();
    assert_eq!(forward, backward);
    assert_eq!(forward, sequential);
}

#[test]
fn test_issues_are_sorted_and_unique() {
    let issues = project(0..4, true).issues();
    let mut sorted: Vec<Issue> = issues.clone();
    sorted.sort_by(|a, b| {
        (&a.file, a.start_line, &a.rule_key, &a.message).cmp(&(&b.file, b.start_line, &b.rule_key, &b.message))
    });
    sorted.dedup();
    assert_eq!(issues, sorted);

    // File-scoped issues sort before line issues of the same file.
    let first = &issues[0];
    assert_eq!(first.file.to_string_lossy(), "src/Gen0.pas");
    assert_eq!(first.start_line, None);
    assert_eq!(first.rule_key, "ClassPerFile");
}

#[test]
fn test_every_unit_reports_the_same_findings() {
    let issues = project(0..6, true).issues();
    let per_file = |n: usize| -> Vec<(Option<u32>, String)> {
        let path = format!("src/Gen{}.pas", n);
        issues
            .iter()
            .filter(|issue| issue.file.to_string_lossy() == path)
            .map(|issue| (issue.start_line, issue.rule_key.clone()))
            .collect()
    };
    let expected = per_file(0);
    assert_eq!(
        expected,
        vec![
            (None, "ClassPerFile".to_string()),
            (Some(3), "UnusedImport".to_string()),
            (Some(7), "PublicField".to_string()),
            (Some(14), "MixedNames".to_string()),
            (Some(14), "UnusedLocalVariable".to_string()),
            (Some(16), "MixedNames".to_string()),
            (Some(16), "RedundantAssignment".to_string()),
            (Some(16), "VariableInitialization".to_string()),
            (Some(17), "AssignedAndFree".to_string()),
        ]
    );
    for n in 1..6 {
        assert_eq!(per_file(n), expected, "Gen{}", n);
    }
}
