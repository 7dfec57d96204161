use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

const TASKS: &str = r#"[
    {"task_id": "A", "size": "S", "expected_runtime_min": 20, "depends_on": [], "tags": [], "enabler": false},
    {"task_id": "B", "size": "M", "expected_runtime_min": 40, "depends_on": ["A"], "tags": [], "enabler": false},
    {"task_id": "C", "size": "S", "expected_runtime_min": 10, "depends_on": [], "tags": [], "enabler": false}
]"#;

const FILES: &str = r#"[
    {"task_id": "A", "files": [{"pattern": "src/app.ts", "type": "exact"}, {"pattern": "src/lib.ts", "type": "exact"}]},
    {"task_id": "B", "files": [{"pattern": "tests/b.ts", "type": "exact"}]},
    {"task_id": "C", "files": [{"pattern": "src/.*", "type": "regex"}]}
]"#;

fn waveplan(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("waveplan").unwrap();
    cmd.current_dir(dir).env("RUST_LOG", "warn");
    cmd
}

fn setup() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("tasks.json"), TASKS).unwrap();
    fs::write(dir.path().join("files.json"), FILES).unwrap();
    dir
}

fn plan(dir: &Path) {
    waveplan(dir)
        .args([
            "plan",
            "--tasks",
            "tasks.json",
            "--files",
            "files.json",
            "--conflict-graph-out",
            "conflicts.json",
            "--plan",
            "plan.json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Wave 1"));
}

#[test]
fn test_plan_writes_outputs() {
    let dir = setup();
    plan(dir.path());

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("plan.json")).unwrap()).unwrap();
    let summary = &raw["execution_plan"]["summary"];
    assert_eq!(summary["total_tasks"], 3);
    assert_eq!(summary["efficiency_metrics"]["sequential_time_min"], 70);

    let conflicts: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("conflicts.json")).unwrap())
            .unwrap();
    assert_eq!(conflicts["metadata"]["total_conflict_pairs"], 1);
}

#[test]
fn test_missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    waveplan(dir.path())
        .args(["plan", "--tasks", "nope.json", "--files", "nope.json", "--plan", "plan.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nope.json"));
    assert!(!dir.path().join("plan.json").exists());
}

#[test]
fn test_cycle_fails_without_plan() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("tasks.json"),
        r#"[{"task_id": "x", "depends_on": ["y"]}, {"task_id": "y", "depends_on": ["x"]}]"#,
    )
    .unwrap();
    fs::write(dir.path().join("files.json"), "[]").unwrap();

    waveplan(dir.path())
        .args(["plan", "--tasks", "tasks.json", "--files", "files.json", "--plan", "plan.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("circular dependency"));
    assert!(!dir.path().join("plan.json").exists());
}

#[test]
fn test_failed_plan_write_publishes_nothing() {
    let dir = setup();
    // A directory where the plan file should go makes the final rename fail
    fs::create_dir(dir.path().join("plan.json")).unwrap();

    waveplan(dir.path())
        .args([
            "plan",
            "--tasks",
            "tasks.json",
            "--files",
            "files.json",
            "--conflict-graph-out",
            "conflicts.json",
            "--plan",
            "plan.json",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("plan.json"));

    assert!(!dir.path().join("conflicts.json").exists());
    assert!(!dir.path().join("conflicts.json.tmp").exists());
    assert!(!dir.path().join("plan.json.tmp").exists());
}

#[test]
fn test_mark_complete_and_report() {
    let dir = setup();
    plan(dir.path());

    waveplan(dir.path())
        .args([
            "mark-complete",
            "A",
            "--pr",
            "12",
            "--url",
            "https://example.invalid/12",
            "--runtime",
            "25",
            "--plan",
            "plan.json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("A marked complete"));

    waveplan(dir.path())
        .args([
            "mark-complete",
            "A",
            "--pr",
            "13",
            "--url",
            "https://example.invalid/13",
            "--plan",
            "plan.json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("already completed"));

    waveplan(dir.path())
        .args(["report", "--plan", "plan.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1/3 tasks complete"))
        .stdout(predicate::str::contains("PR #12"));

    let output = waveplan(dir.path())
        .args(["report", "--json", "--plan", "plan.json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["completed_direct"], 1);
    assert_eq!(report["pending"], 2);
}

#[test]
fn test_unknown_task_fails() {
    let dir = setup();
    plan(dir.path());

    waveplan(dir.path())
        .args(["mark-complete", "ZZ", "--pr", "1", "--url", "u", "--plan", "plan.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("task not found in plan: ZZ"));
}

#[test]
fn test_check_incidental() {
    let dir = setup();
    plan(dir.path());

    waveplan(dir.path())
        .args([
            "check-incidental",
            "C",
            "--pr",
            "7",
            "--url",
            "https://example.invalid/7",
            "--files",
            "src/app.ts",
            "src/other.ts",
            "--plan",
            "plan.json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Incidentally completed: A"));

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("plan.json")).unwrap()).unwrap();
    let tasks: Vec<&serde_json::Value> = raw["execution_plan"]["waves"]
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|w| w["tasks"].as_array().unwrap())
        .collect();
    let a = tasks.iter().find(|t| t["task_id"] == "A").unwrap();
    assert_eq!(a["status"], "completed");
    assert_eq!(a["completion_type"], "incidental");
    assert_eq!(a["completed_by"], "C");
}

#[test]
fn test_verify_detects_tampering() {
    let dir = setup();
    plan(dir.path());

    waveplan(dir.path())
        .args(["verify", "--plan", "plan.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan OK"));

    let path = dir.path().join("plan.json");
    let mut raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    raw["execution_plan"]["waves"][0]["estimated_wave_time_min"] = serde_json::json!(999);
    fs::write(&path, serde_json::to_string(&raw).unwrap()).unwrap();

    waveplan(dir.path())
        .args(["verify", "--plan", "plan.json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("999"));
}

#[test]
fn test_config_file_supplies_paths() {
    let dir = setup();
    fs::write(
        dir.path().join("waveplan.yml"),
        "tasks: tasks.json\nfiles: files.json\nconflict_graph: out/conflicts.json\nplan: out/plan.json\n",
    )
    .unwrap();

    waveplan(dir.path()).arg("plan").assert().success();
    assert!(dir.path().join("out/plan.json").exists());
    assert!(dir.path().join("out/conflicts.json").exists());

    waveplan(dir.path())
        .arg("report")
        .assert()
        .success()
        .stdout(predicate::str::contains("0/3 tasks complete"));
}
