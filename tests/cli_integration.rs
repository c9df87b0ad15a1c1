mod support;

use support::TestWorkspace;

fn chain() -> TestWorkspace {
    TestWorkspace::builder()
        .with_file("src/a.ts", "import { b } from './b';\nexport const a = () => b();\n")
        .with_file("src/b.ts", "import { c } from './c';\nexport function b() { return c(); }\n")
        .with_file("src/c.ts", "export function c() { return 1; }\n")
        .with_file("src/c.test.ts", "import { c } from './c';\ntest('c', () => c());\n")
        .without_auto_index()
        .build()
        .unwrap()
}

#[test]
fn index_then_status() {
    let ws = chain();
    let out = ws.cli().index().arg("--no-git").json().run().unwrap();
    out.assert_success();
    let summary = out.json_value().unwrap();
    assert_eq!(summary["indexed"], 4);
    assert_eq!(summary["skipped"], 0);
    assert_eq!(summary["discovery"], "full");

    ws.cli()
        .status()
        .run()
        .unwrap()
        .assert_success()
        .assert_stdout_contains("Files: 4 (4 indexed)")
        .assert_stdout_contains("typescript: 4");

    let again = ws.cli().index().arg("--no-git").json().run().unwrap();
    assert_eq!(again.json_value().unwrap()["skipped"], 4);
}

#[test]
fn queries_before_indexing_fail() {
    let ws = chain();
    ws.cli()
        .symbols()
        .run()
        .unwrap()
        .assert_code(2)
        .assert_stderr_contains("repo-intel index");
}

#[test]
fn symbols_command_filters_and_exit_codes() {
    let ws = chain();
    ws.cli().index().arg("--no-git").arg("--quiet").run().unwrap().assert_success();

    let out = ws.cli().symbols().kind("function").json().run().unwrap();
    out.assert_success();
    let rows = out.json_value().unwrap();
    let names: Vec<&str> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(rows[0]["file"], "src/a.ts");

    ws.cli()
        .symbols()
        .name("nothing_here")
        .run()
        .unwrap()
        .assert_code(1)
        .assert_stdout_contains("No symbols found.");

    let csv = ws.cli().symbols().name("c").arg("--format").arg("csv").run().unwrap();
    csv.assert_success()
        .assert_stdout_contains("name,kind,location,export,signature")
        .assert_stdout_contains("c,function,src/c.ts:1,named,");
}

#[test]
fn deps_and_impact_commands() {
    let ws = chain();
    ws.cli().index().arg("--no-git").arg("--quiet").run().unwrap().assert_success();

    ws.cli()
        .deps("src/c.ts")
        .arg("--direction")
        .arg("incoming")
        .run()
        .unwrap()
        .assert_success()
        .assert_stdout_contains("<- src/b.ts (import: c)")
        .assert_stdout_contains("<- src/c.test.ts");

    ws.cli().deps("src/nope.ts").run().unwrap().assert_code(1);

    let out = ws.cli().impact(&["src/c.ts"]).arg("--depth").arg("2").json().run().unwrap();
    out.assert_success();
    let impact = out.json_value().unwrap();
    assert_eq!(impact["direct_dependents"], serde_json::json!(["src/b.ts"]));
    assert_eq!(impact["transitive_dependents"], serde_json::json!(["src/a.ts"]));
    assert_eq!(impact["risk_score"], 10);

    let with_tests = ws
        .cli()
        .impact(&["src/c.ts"])
        .arg("--include-tests")
        .json()
        .run()
        .unwrap();
    assert_eq!(
        with_tests.json_value().unwrap()["direct_dependents"],
        serde_json::json!(["src/b.ts", "src/c.test.ts"])
    );
}

#[test]
fn hotspots_and_graph_commands() {
    let ws = chain();
    ws.cli().index().arg("--no-git").arg("--quiet").run().unwrap().assert_success();

    let out = ws.cli().hotspots().arg("--no-git").limit(1).json().run().unwrap();
    out.assert_success();
    let ranked = out.json_value().unwrap();
    assert_eq!(ranked[0]["path"], "src/c.ts");
    assert_eq!(ranked[0]["score"], 2);

    ws.cli()
        .graph()
        .arg("--graph-format")
        .arg("mermaid")
        .run()
        .unwrap()
        .assert_success()
        .assert_stdout_contains("graph LR")
        .assert_stdout_contains("-->");

    let adjacency = ws.cli().graph().run().unwrap();
    adjacency.assert_success();
    let parsed: serde_json::Value = serde_json::from_str(&adjacency.stdout).unwrap();
    assert_eq!(parsed["src/a.ts"], serde_json::json!(["src/b.ts"]));
}

#[test]
fn corrupt_index_exits_with_error() {
    let ws = chain();
    std::fs::create_dir_all(ws.db_path().parent().unwrap()).unwrap();
    std::fs::write(ws.db_path(), "garbage ".repeat(1000)).unwrap();

    ws.cli()
        .index()
        .arg("--no-git")
        .run()
        .unwrap()
        .assert_code(2)
        .assert_stderr_contains("--rebuild");

    ws.cli()
        .index()
        .arg("--no-git")
        .arg("--rebuild")
        .arg("--quiet")
        .run()
        .unwrap()
        .assert_success();
}

#[test]
fn config_file_excludes_paths() {
    let ws = chain();
    ws.write_file(".repo-intel/config.toml", "exclude = [\"**/*.test.ts\"]\n")
        .unwrap();
    let out = ws.cli().index().arg("--no-git").json().run().unwrap();
    out.assert_success();
    assert_eq!(out.json_value().unwrap()["indexed"], 3);
}
