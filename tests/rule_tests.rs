mod common;

use common::{lines, of_rule, ProjectHarness};
use delphi_lint::{AnalyzerConfig, RuleSettings};

#[test]
fn test_assigned_then_free() {
    let mut project = ProjectHarness::new();
    project.enable("AssignedAndFree").add_unit(
        "Cleanup",
        r#"unit Cleanup;
interface
implementation
uses System.SysUtils;
procedure Release(X: TObject);
begin
  if Assigned(X) then X.Free;
end;
end."#,
    );
    let issues = project.issues();
    assert_eq!(lines(&issues), vec![Some(7)]);
    assert_eq!(issues[0].rule_key, "AssignedAndFree");
    assert_eq!(issues[0].file.to_string_lossy(), "src/Cleanup.pas");
}

#[test]
fn test_class_per_file_reports_once() {
    let two = r#"unit Shapes;
interface
type
  TCircle = class
  end;
  TSquare = class
  end;
implementation
end."#;
    let three = r#"unit Shapes;
interface
type
  TCircle = class
  end;
  TSquare = class
  end;
  TTriangle = class
  end;
implementation
end."#;
    for source in [two, three] {
        let mut project = ProjectHarness::new();
        project.enable("ClassPerFile").add_unit("Shapes", source);
        let issues = project.issues();
        assert_eq!(issues.len(), 1, "{:?}", issues);
        assert_eq!(issues[0].start_line, None);
        assert_eq!(issues[0].end_line, None);
    }
}

#[test]
fn test_forward_and_stub_classes_do_not_count() {
    let mut project = ProjectHarness::new();
    project.enable("ClassPerFile").add_unit(
        "Nodes",
        r#"unit Nodes;
interface
type
  TNode = class;
  TMarker = class(TObject);
  TNode = class
    Next: TNode;
  end;
implementation
end."#,
    );
    assert!(project.issues().is_empty());
}

#[test]
fn test_redundant_self_assignment_in_method() {
    let mut project = ProjectHarness::new();
    project.enable("RedundantAssignment").add_unit(
        "Counter",
        r#"unit Counter;
interface
type
  TCounter = class
    procedure Run;
  end;
implementation
procedure TCounter.Run;
var
  X: Integer;
begin
  X := 1;
  X := X;
  X := (X);
  X := X + 1;
end;
end."#,
    );
    let issues = project.issues();
    assert_eq!(lines(&issues), vec![Some(13), Some(14)]);
}

#[test]
fn test_unused_local_versus_passed_by_value() {
    let mut project = ProjectHarness::new();
    project.enable("UnusedLocalVariable").add_unit(
        "Locals",
        r#"unit Locals;
interface
implementation
procedure Consume(Value: Integer);
begin
end;
procedure Unused;
var
  X: Integer;
begin
  X := 1;
end;
procedure PassedOn;
var
  X: Integer;
begin
  X := 1;
  Consume(X);
end;
end."#,
    );
    let issues = project.issues();
    assert_eq!(lines(&issues), vec![Some(9)]);
    assert_eq!(issues[0].message, "Local variable 'X' is never read");
}

#[test]
fn test_platform_dependent_casts() {
    let mut project = ProjectHarness::new();
    project.enable("PlatformDependentCast").add_unit(
        "Casts",
        r#"unit Casts;
interface
implementation
procedure Run(I: Integer; N: NativeInt; P: Pointer);
begin
  I := Integer(N);
  N := NativeInt(I);
  P := Pointer(N);
  N := NativeInt(P);
end;
end."#,
    );
    assert_eq!(lines(&project.issues()), vec![Some(6), Some(7)]);
}

#[test]
fn test_variable_initialization() {
    let mut project = ProjectHarness::new();
    project.enable("VariableInitialization").add_unit(
        "Flow",
        r#"unit Flow;
interface
implementation
function Pick(Flag: Boolean): Integer;
var
  A, B: Integer;
begin
  if Flag then
    A := 1;
  B := 2;
  Result := A + B;
end;
end."#,
    );
    let issues = project.issues();
    assert_eq!(lines(&issues), vec![Some(11)]);
    assert_eq!(issues[0].message, "Variable 'A' might not have been initialized");
}

#[test]
fn test_rules_across_units() {
    let mut project = ProjectHarness::new();
    project
        .enable("UnusedImport")
        .enable("ImportSpecificity")
        .add_unit(
            "Shapes",
            r#"unit Shapes;
interface
type
  TShape = class
  end;
implementation
end."#,
        )
        .add_unit(
            "Canvas",
            r#"unit Canvas;
interface
uses Shapes, System.SysUtils;
implementation
procedure Draw;
var
  S: TShape;
begin
  S := TShape.Create;
end;
end."#,
        );
    let issues = project.issues();
    let unused = of_rule(&issues, "UnusedImport");
    assert_eq!(unused.len(), 1);
    assert_eq!(unused[0].message, "Unit 'System.SysUtils' is imported but never used");
    let specificity = of_rule(&issues, "ImportSpecificity");
    assert_eq!(specificity.len(), 1);
    assert!(specificity[0].message.starts_with("Unit 'Shapes'"));
    assert_eq!(specificity[0].start_line, Some(3));
}

#[test]
fn test_exclusions_skip_matching_files() {
    let mut project = ProjectHarness::new();
    project
        .configure(
            "EmptyUnit",
            RuleSettings::new().property("exclusions", "**/Generated*.pas"),
        )
        .add_unit("GeneratedStubs", "unit GeneratedStubs; interface implementation end.")
        .add_unit("Handwritten", "unit Handwritten; interface implementation end.");
    let issues = project.issues();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].file.to_string_lossy(), "src/Handwritten.pas");
}

#[test]
fn test_yaml_configuration() {
    let config = AnalyzerConfig::from_yaml(
        r#"
options:
  conditionalDefines: [DEBUG]
rules:
  RedundantAssignment: {}
  CyclomaticComplexity:
    properties:
      threshold: "not a number"
"#,
    )
    .unwrap();
    let AnalyzerConfig { options, rules } = config;
    let mut project = ProjectHarness::new();
    for (key, settings) in rules {
        project.configure(&key, settings);
    }
    project
        .options(|current| *current = options)
        .add_unit(
            "Debug",
            r#"unit Debug;
interface
implementation
procedure Run;
var
  X: Integer;
begin
  X := 1;
{$IFDEF DEBUG}
  X := X;
{$ELSE}
  X := (X);
{$ENDIF}
end;
end."#,
        );
    let output = project.analyze();
    assert_eq!(lines(&output.issues), vec![Some(10)]);
    assert_eq!(output.config_diagnostics.len(), 1);
    assert_eq!(output.config_diagnostics[0].rule_key, "CyclomaticComplexity");
}

#[test]
fn test_xpath_template_rule() {
    let mut project = ProjectHarness::new();
    project
        .configure(
            "NoWithStatement",
            RuleSettings::new()
                .template("XPathTemplate")
                .property("xpath", "//With")
                .property("message", "Avoid 'with' statements"),
        )
        .add_unit(
            "Legacy",
            r#"unit Legacy;
interface
type
  TPoint = record
    X, Y: Integer;
  end;
implementation
procedure Reset(var P: TPoint);
begin
  with P do
  begin
    X := 0;
    Y := 0;
  end;
end;
end."#,
        );
    let issues = project.issues();
    assert_eq!(lines(&issues), vec![Some(10)]);
    assert_eq!(issues[0].rule_key, "NoWithStatement");
    assert_eq!(issues[0].message, "Avoid 'with' statements");
}

#[test]
fn test_paren_comments_and_directives() {
    let mut project = ProjectHarness::new();
    project
        .enable("RedundantAssignment")
        .options(|options| options.conditional_defines = vec!["DEBUG".to_string()])
        .add_unit(
            "Legacy",
            r#"unit Legacy;
interface
implementation
(* helper
   routines *)
procedure Run;
var
  X: Integer;
begin
  X := 1; (* set *)
(*$IFDEF DEBUG*)
  X := X;
(*$ELSE*)
  X := (X);
(*$ENDIF*)
end;
end."#,
        );
    let output = project.analyze();
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(lines(&output.issues), vec![Some(12)]);
}
