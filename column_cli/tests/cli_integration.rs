use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::{TempDir, tempdir};

const HEADER: &str = "t_ms,cube,column_bottom,column_top,tsa,water_in,water_out,reflux,pressure,abv,voltage";

fn write_config(dir: &TempDir, toml: &str) -> PathBuf {
    let path = dir.path().join("column.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn write_trace(dir: &TempDir, rows: &[String]) -> PathBuf {
    let mut csv = String::from(HEADER);
    csv.push('\n');
    for r in rows {
        csv.push_str(r);
        csv.push('\n');
    }
    let path = dir.path().join("trace.csv");
    fs::write(&path, csv).unwrap();
    path
}

fn row(t_ms: u64, cube: f32, bottom: f32, tsa: f32) -> String {
    format!("{t_ms},{cube},{bottom},20,{tsa},15,25,,5,42,230")
}

fn column(cfg: &PathBuf) -> Command {
    let mut cmd = Command::cargo_bin("column").unwrap();
    cmd.env_remove("RUST_LOG").arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "OK", "stdout")]
#[case(&["thresholds"], 0, "22.5 mmHg", "stdout")]
#[case(&["replay"], 2, "--trace", "stderr")]
#[case(&["replay", "--trace", "x.csv", "--power-override", "150"], 2, "power-override", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let assert = column(&cfg).args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn thresholds_json_reports_flood_pressure() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[equipment]\ncalibrated_flood_pressure = 40.0\n");

    let out = column(&cfg).args(["--json", "thresholds"]).output().unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["flood_mmhg"], 40.0);
    assert_eq!(v["work_mmhg"], 30.0);
}

#[rstest]
fn missing_config_file_is_reported() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    column(&missing)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config file could not be loaded"));
}

#[rstest]
fn out_of_range_config_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[equipment]\nmax_power_percent = 0\n");

    column(&cfg)
        .arg("self-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("max_power_percent"));
}

#[rstest]
fn replay_reports_bad_trace_header() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let bad = dir.path().join("bad.csv");
    fs::write(&bad, "time,cube\n0,20\n").unwrap();

    column(&cfg)
        .arg("replay")
        .arg("--trace")
        .arg(&bad)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn replay_prints_phase_changes() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let trace = write_trace(
        &dir,
        &[
            row(0, 30.0, 20.0, 20.0),
            row(1_000, 60.0, 40.0, 20.0),
            row(2_000, 70.0, 79.0, 20.0),
        ],
    );

    column(&cfg)
        .arg("replay")
        .arg("--trace")
        .arg(&trace)
        .assert()
        .success()
        .stdout(predicate::str::contains("heating"))
        .stdout(predicate::str::contains("stabilization"))
        .stdout(predicate::str::contains("Replay complete"));
}

#[rstest]
#[case("--json", true)]
#[case("--log-level=warn", false)]
fn vapor_breakthrough_exits_with_code_two(#[case] flag: &str, #[case] json: bool) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let trace = write_trace(
        &dir,
        &[row(0, 70.0, 60.0, 20.0), row(1_000, 80.0, 79.0, 60.0)],
    );

    let out = column(&cfg)
        .arg(flag)
        .arg("replay")
        .arg("--trace")
        .arg(&trace)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    if json {
        let last = stderr.lines().last().unwrap();
        let v: serde_json::Value = serde_json::from_str(last).unwrap();
        assert_eq!(v["reason"], "VaporBreakthrough");
        assert_eq!(v["details"]["t_ms"], 1_000);
    } else {
        assert!(stderr.contains("Vapor broke through"), "{stderr}");
    }
}

#[rstest]
fn trace_gap_trips_sensor_failure() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");
    let trace = write_trace(
        &dir,
        &[row(0, 30.0, 20.0, 20.0), row(20_000, 30.0, 20.0, 20.0)],
    );

    column(&cfg)
        .arg("replay")
        .arg("--trace")
        .arg(&trace)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("t=6000 ms"));
}

#[rstest]
fn hold_program_runs_to_completion_with_json_summary() {
    let dir = tempdir().unwrap();
    let cfg = write_config(
        &dir,
        "[program]\nhold = [{ target_c = 65.0, duration_min = 1 }]\n",
    );
    let rows: Vec<String> = (0..=62)
        .map(|s| {
            let mut r = String::new();
            write!(r, "{},65,40,20,20,15,25,,,,", s * 1_000).unwrap();
            r
        })
        .collect();
    let trace = write_trace(&dir, &rows);

    let out = column(&cfg)
        .args(["--json", "replay", "--mode", "hold", "--trace"])
        .arg(&trace)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let last = stdout.lines().last().unwrap();
    let v: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(v["summary"]["status"], "Finished");
    assert_eq!(v["summary"]["mode"], "Idle");
    // Dwell starts on the second row, one minute later the program completes.
    assert_eq!(v["summary"]["t_ms"], 61_000);
}

#[rstest]
fn empty_hold_program_is_refused() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[program]\nhold = []\n");
    let trace = write_trace(&dir, &[row(0, 30.0, 20.0, 20.0)]);

    column(&cfg)
        .args(["replay", "--mode", "hold", "--trace"])
        .arg(&trace)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no steps"));
}
