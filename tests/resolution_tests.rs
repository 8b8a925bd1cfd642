mod common;

use common::{lines, ProjectHarness};
use delphi_lint::{Issue, RuleSettings};
use std::path::Path;

fn in_file<'a>(issues: &'a [Issue], path: &str) -> Vec<&'a Issue> {
    issues
        .iter()
        .filter(|issue| issue.file == Path::new(path))
        .collect()
}

fn blacklist(names: &str) -> RuleSettings {
    RuleSettings::new().property("blacklist", names)
}

#[test]
fn test_member_lookup_prefers_ancestors_over_interfaces() {
    let mut project = ProjectHarness::new();
    project
        .configure(
            "ForbiddenMethod",
            blacklist("Shapes.TBase.Draw, Shapes.IDrawable.Draw, Shapes.TCircle.Resize"),
        )
        .add_unit(
            "Shapes",
            r#"unit Shapes;
interface
type
  IDrawable = interface
    procedure Draw;
    procedure Resize;
  end;
  TBase = class(TInterfacedObject)
    procedure Draw;
  end;
  TCircle = class(TBase, IDrawable)
    procedure Resize;
  end;
implementation
procedure TBase.Draw; begin end;
procedure TCircle.Resize; begin end;
end."#,
        )
        .add_unit(
            "Canvas",
            r#"unit Canvas;
interface
implementation
uses Shapes;
procedure Paint(C: TCircle);
begin
  C.Draw;
  C.Resize;
end;
end."#,
        );
    let issues = project.issues();
    let canvas = in_file(&issues, "src/Canvas.pas");
    assert_eq!(canvas.len(), 2, "{:?}", canvas);
    assert_eq!(canvas[0].start_line, Some(7));
    assert_eq!(canvas[0].message, "Use of forbidden method 'Shapes.TBase.Draw'");
    assert_eq!(canvas[1].start_line, Some(8));
    assert_eq!(canvas[1].message, "Use of forbidden method 'Shapes.TCircle.Resize'");
}

#[test]
fn test_unit_qualified_reference_beats_local_alias() {
    let mut project = ProjectHarness::new();
    project
        .configure("ForbiddenType", blacklist("Shapes.TShape"))
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
            "Main",
            r#"unit Main;
interface
uses Shapes;
type TShape = Integer;
implementation
procedure Run;
var S: Shapes.TShape;
  N: TShape;
begin
  S := Shapes.TShape.Create;
  N := 1;
end;
end."#,
        );
    let issues = project.issues();
    let main: Vec<Issue> = in_file(&issues, "src/Main.pas").into_iter().cloned().collect();
    assert_eq!(lines(&main), vec![Some(7), Some(10)]);
}

#[test]
fn test_overloads_bind_best_match_or_nothing() {
    let mut project = ProjectHarness::new();
    project.enable("PlatformDependentTruncation").add_unit(
        "Convert",
        r#"unit Convert;
interface
function Widen(V: Integer): NativeInt; overload;
function Widen(const S: string): Integer; overload;
implementation
function Widen(V: Integer): NativeInt; begin Result := V; end;
function Widen(const S: string): Integer; begin Result := 0; end;
procedure Run;
var I: Integer;
begin
  I := Widen(1);
  I := Widen('text');
  I := Widen(Missing);
end;
end."#,
    );
    assert_eq!(lines(&project.issues()), vec![Some(11)]);
}

#[test]
fn test_unit_scope_names() {
    let mut project = ProjectHarness::new();
    project
        .configure("ForbiddenMethod", blacklist("System.SysUtils.FreeAndNil"))
        .add_unit(
            "Cleanup",
            r#"unit Cleanup; interface implementation
uses SysUtils;
procedure Run(O: TObject);
begin
  FreeAndNil(O);
end;
end."#,
        );
    let output = project.analyze();
    assert_eq!(lines(&output.issues), vec![Some(5)]);
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
}

#[test]
fn test_unresolved_units_degrade_to_unknown() {
    let mut project = ProjectHarness::new();
    project
        .enable("FreeAndNilTObject")
        .enable("PlatformDependentTruncation")
        .add_unit(
            "Forms",
            r#"unit Forms; interface implementation
uses System.SysUtils, Vcl.Forms;
procedure Close(F: TForm; var I: Integer);
begin
  FreeAndNil(F);
  I := F.Handle;
end;
end."#,
        );
    let output = project.analyze();
    assert!(output.issues.is_empty(), "{:?}", output.issues);
    let codes: Vec<String> = output
        .diagnostics
        .iter()
        .filter_map(|d| d.diagnostic.code.map(|c| c.as_str()))
        .collect();
    assert_eq!(codes, vec!["W3001"]);
    assert_eq!(output.diagnostics[0].diagnostic.span.line, 2);
    assert!(output.stats.references_unknown > 0);
}

#[test]
fn test_circular_interface_uses_is_a_diagnostic() {
    let mut project = ProjectHarness::new();
    project
        .add_unit("Left", "unit Left;\ninterface\nuses Right;\nimplementation\nend.")
        .add_unit("Right", "unit Right;\ninterface\nuses Left;\nimplementation\nend.")
        .add_unit("Up", "unit Up;\ninterface\nimplementation\nuses Down;\nend.")
        .add_unit("Down", "unit Down;\ninterface\nimplementation\nuses Up;\nend.");
    let output = project.analyze();
    assert_eq!(output.diagnostics.len(), 1, "{:?}", output.diagnostics);
    let diagnostic = &output.diagnostics[0];
    assert_eq!(diagnostic.file, Path::new("src/Left.pas"));
    assert_eq!(diagnostic.diagnostic.message, "Circular unit reference: Left -> Right -> Left");
    assert_eq!(diagnostic.diagnostic.code.map(|c| c.as_str()).as_deref(), Some("E3011"));
}

#[test]
fn test_syntax_errors_do_not_stop_other_files() {
    let mut project = ProjectHarness::new();
    project
        .enable("RedundantAssignment")
        .add_unit(
            "Broken",
            r#"unit Broken;
interface
implementation
procedure Run;
var X: Integer;
begin
  X := ;
  X := X;
end;
end."#,
        )
        .add_unit(
            "Fine",
            r#"unit Fine;
interface
implementation
procedure Run;
var Y: Integer;
begin
  Y := Y;
end;
end."#,
        );
    let output = project.analyze();
    assert!(output.stats.syntax_errors > 0);
    assert!(output
        .diagnostics
        .iter()
        .all(|d| d.file == Path::new("src/Broken.pas")));
    let fine = in_file(&output.issues, "src/Fine.pas");
    assert_eq!(fine.len(), 1);
    assert_eq!(fine[0].start_line, Some(7));
    assert_eq!(output.stats.files, 2);
    assert_eq!(output.stats.files_aborted, 0);
}
