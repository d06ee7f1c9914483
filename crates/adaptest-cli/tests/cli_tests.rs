//! CLI integration tests using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn adaptest() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("adaptest").unwrap()
}

/// Run `adaptest init` in a fresh directory.
fn initialized_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    adaptest().current_dir(dir.path()).arg("init").assert().success();
    dir
}

fn write_bank(dir: &Path, name: &str, items: &[String]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!(r#"{{"items": [{}]}}"#, items.join(","))).unwrap();
    path
}

fn item_json(id: &str, domain: &str, extra: &str) -> String {
    format!(
        r#"{{"id": "{id}", "domain": "{domain}", "stem": "Stem {id}", "choices": ["A", "B", "C"], "correctIndex": 1{extra}}}"#
    )
}

#[test]
fn help_output() {
    adaptest()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Computerized adaptive testing engine"));
}

#[test]
fn version_output() {
    adaptest()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("adaptest"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    adaptest()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created adaptest.toml"))
        .stdout(predicate::str::contains("Created banks/sample.json"));

    assert!(dir.path().join("adaptest.toml").exists());
    assert!(dir.path().join("banks/sample.json").exists());
}

#[test]
fn init_skips_existing() {
    let dir = initialized_dir();

    adaptest()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn validate_sample_bank() {
    let dir = initialized_dir();

    adaptest()
        .current_dir(dir.path())
        .args(["validate", "--bank", "banks/sample.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("240 items"))
        .stdout(predicate::str::contains("2. Asset Security: 30"))
        .stdout(predicate::str::contains("Bank valid."));
}

#[test]
fn validate_nonexistent_file() {
    adaptest()
        .args(["validate", "--bank", "nonexistent.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn validate_too_small_bank_fails() {
    let dir = TempDir::new().unwrap();
    let items: Vec<String> = (0..5).map(|i| item_json(&format!("q{i}"), "1", "")).collect();
    let bank = write_bank(dir.path(), "small.json", &items);

    adaptest()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--bank")
        .arg(&bank)
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 8 items"));
}

#[test]
fn validate_duplicate_id_fails() {
    let dir = TempDir::new().unwrap();
    let items: Vec<String> = (0..9)
        .map(|i| item_json(&format!("q{}", i.min(7)), "2", ""))
        .collect();
    let bank = write_bank(dir.path(), "dup.json", &items);

    adaptest()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--bank")
        .arg(&bank)
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate item id: q7"));
}

#[test]
fn validate_reports_degraded_items() {
    let dir = TempDir::new().unwrap();
    let mut items: Vec<String> = (0..8).map(|i| item_json(&format!("q{i}"), "3", "")).collect();
    items.push(item_json("hard", "3", r#", "difficulty": 4.2"#));
    items.push(item_json("odd", "Cloud Security", r#", "type": "essay""#));
    let bank = write_bank(dir.path(), "bank.json", &items);

    adaptest()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--bank")
        .arg(&bank)
        .assert()
        .success()
        .stdout(predicate::str::contains("10 items"))
        .stdout(predicate::str::contains("[hard] WARNING: difficulty 4.2"))
        .stdout(predicate::str::contains("[odd] WARNING: unknown item type"))
        .stdout(predicate::str::contains("not in the blueprint"))
        .stdout(predicate::str::contains("warning(s) found"));
}

#[test]
fn simulate_adaptive_json() {
    let dir = initialized_dir();

    let output = adaptest()
        .current_dir(dir.path())
        .args([
            "simulate",
            "--bank",
            "banks/sample.json",
            "--true-theta",
            "1.8",
            "--replications",
            "2",
            "--seed",
            "11",
            "--format",
            "json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let runs = report["runs"].as_array().unwrap();
    assert_eq!(runs.len(), 2);
    for run in runs {
        let administered = run["administered"].as_u64().unwrap();
        assert!((100..=150).contains(&administered), "administered {administered}");
        assert!(run["stop_reason"].is_string());
    }
    assert_eq!(report["mode"], "adaptive");
}

#[test]
fn simulate_fixed_text() {
    let dir = initialized_dir();

    adaptest()
        .current_dir(dir.path())
        .args([
            "simulate",
            "--bank",
            "banks/sample.json",
            "--true-theta",
            "-0.5",
            "--mode",
            "fixed",
            "--count",
            "20",
            "--domains",
            "1,4",
            "--seed",
            "3",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("fixed length reached"))
        .stdout(predicate::str::contains("mean length: 20.0"));
}

#[test]
fn simulate_is_reproducible_with_seed() {
    let dir = initialized_dir();
    let run = || {
        let output = adaptest()
            .current_dir(dir.path())
            .args([
                "simulate",
                "--bank",
                "banks/sample.json",
                "--true-theta",
                "0.9",
                "--mode",
                "fixed",
                "--count",
                "30",
                "--seed",
                "99",
                "--format",
                "json",
            ])
            .output()
            .unwrap();
        assert!(output.status.success());
        let mut report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        for run in report["runs"].as_array_mut().unwrap() {
            run.as_object_mut().unwrap().remove("session_id");
        }
        report
    };
    assert_eq!(run(), run());
}

#[test]
fn simulate_fixed_with_too_few_items_fails() {
    let dir = initialized_dir();

    adaptest()
        .current_dir(dir.path())
        .args([
            "simulate",
            "--bank",
            "banks/sample.json",
            "--true-theta",
            "0",
            "--mode",
            "fixed",
            "--count",
            "40",
            "--domains",
            "2",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("selected domains contain 30 items, 40 requested"));
}

#[test]
fn simulate_rejects_unknown_mode() {
    let dir = initialized_dir();

    adaptest()
        .current_dir(dir.path())
        .args([
            "simulate",
            "--bank",
            "banks/sample.json",
            "--true-theta",
            "0",
            "--mode",
            "random",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown mode"));
}
