use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use delphi_lint::{Analyzer, AnalyzerConfig, RuleSettings, SourceInput, UnitMap};

const RULES: &[&str] = &[
    "AssignedAndFree",
    "CyclomaticComplexity",
    "MixedNames",
    "RedundantAssignment",
    "UnusedImport",
    "UnusedLocalVariable",
    "VariableInitialization",
];

fn analyzer(parallel: bool) -> Analyzer {
    let mut config = AnalyzerConfig::default();
    config.options.parallel = parallel;
    for rule in RULES {
        config.rules.insert(rule.to_string(), RuleSettings::new());
    }
    Analyzer::new(config)
}

fn generate_routines(unit: usize, count: usize) -> String {
    let mut code = format!("unit Gen{};\ninterface\nuses System.SysUtils;\n", unit);
    code.push_str("type\n  TWorker = class\n  private\n    FCount: Integer;\n  public\n");
    for i in 0..count {
        code.push_str(&format!("    function Step{}(Value: Integer): Integer;\n", i));
    }
    code.push_str("  end;\nimplementation\n");
    for i in 0..count {
        code.push_str(&format!(
            "function TWorker.Step{i}(Value: Integer): Integer;\nvar\n  Total, Index: Integer;\nbegin\n  Total := 0;\n  for Index := 0 to Value do\n    if Index mod 2 = 0 then\n      Total := Total + Index\n    else\n      FCount := FCount + 1;\n  Result := Total;\nend;\n"
        ));
    }
    code.push_str("end.\n");
    code
}

fn generate_project(units: usize, routines: usize) -> (Vec<SourceInput>, UnitMap) {
    let mut map = UnitMap::new();
    let inputs = (0..units)
        .map(|i| {
            let path = format!("src/Gen{}.pas", i);
            map.insert(format!("Gen{}", i), path.as_str());
            SourceInput::unit(path, format!("Gen{}", i), generate_routines(i, routines))
        })
        .collect();
    (inputs, map)
}

fn benchmark_single_unit(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_unit");
    let analyzer = analyzer(false);

    for count in [10, 50, 200] {
        group.bench_with_input(BenchmarkId::new("routines", count), &count, |b, &count| {
            let (inputs, map) = generate_project(1, count);
            b.iter(|| black_box(analyzer.analyze(inputs.clone(), &map)))
        });
    }

    group.finish();
}

fn benchmark_project(c: &mut Criterion) {
    let mut group = c.benchmark_group("project");

    for units in [8, 32] {
        let (inputs, map) = generate_project(units, 20);
        for parallel in [false, true] {
            let analyzer = analyzer(parallel);
            let label = if parallel { "parallel" } else { "sequential" };
            group.bench_with_input(BenchmarkId::new(label, units), &units, |b, _| {
                b.iter(|| black_box(analyzer.analyze(inputs.clone(), &map)))
            });
        }
    }

    group.finish();
}

fn benchmark_query_rule(c: &mut Criterion) {
    let mut config = AnalyzerConfig::default();
    config.rules.insert(
        "OddBranches".to_string(),
        RuleSettings::new()
            .template("XPathTemplate")
            .property("xpath", "//For//If[Binary[@op = '=']]/Assign[Name[typeIs('System.Integer')]]")
            .property("message", "Branch assigns an integer"),
    );
    let analyzer = Analyzer::new(config);
    let (inputs, map) = generate_project(4, 50);

    c.bench_function("query_rule", |b| {
        b.iter(|| black_box(analyzer.analyze(inputs.clone(), &map)))
    });
}

criterion_group!(
    benches,
    benchmark_single_unit,
    benchmark_project,
    benchmark_query_rule
);
criterion_main!(benches);
