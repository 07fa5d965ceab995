mod common;

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use common::TestWorkspace;
use predicates::{prelude::PredicateBooleanExt, str::contains};

fn count_rows(database: &std::path::Path) -> i64 {
    let conn = rusqlite::Connection::open(database).expect("open database");
    conn.query_row("SELECT COUNT(*) FROM \"qrc\"", [], |row| row.get(0))
        .expect("count rows")
}

#[test]
fn run_loads_csv_and_spreadsheet_into_sqlite() {
    let ws = TestWorkspace::new();
    ws.write_qrc_csv("b.csv", 12);
    ws.copy_fixture("jan.xlsx");
    let database = ws.path().join("out.sqlite3");

    cargo_bin_cmd!("qrc-loader")
        .args([
            "run",
            "--source-dir",
            ws.path().to_str().unwrap(),
            "--database",
            database.to_str().unwrap(),
            "--create-table",
            "--batch-size",
            "5",
        ])
        .assert()
        .success()
        .stdout(contains("jan.xlsx").and(contains("archived")));

    assert_eq!(count_rows(&database), 15);
    assert!(ws.exists("processed/b.csv"));
    assert!(ws.exists("processed/jan.xlsx"));
    assert!(ws.exists("converted/jan.csv"));

    let conn = rusqlite::Connection::open(&database).unwrap();
    let mobile: String = conn
        .query_row(
            "SELECT \"MobileNo\" FROM \"qrc\" WHERE \"AgentNameID\" = 'A002 Bob'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(mobile, "0722000111");
}

#[test]
fn run_reads_settings_from_yaml_config() {
    let ws = TestWorkspace::new();
    ws.write_qrc_csv("calls.csv", 3);
    let database = ws.path().join("db.sqlite3");
    let archive = ws.path().join("done");
    let config = ws.write(
        "loader.yml",
        &format!(
            "source_dir: {}\narchive_dir: {}\ntable: qrc\nbad_lines: warn\nsink:\n  database: {}\n  create_table: true\n",
            ws.path().display(),
            archive.display(),
            database.display()
        ),
    );

    cargo_bin_cmd!("qrc-loader")
        .args(["run", "--config", config.to_str().unwrap()])
        .assert()
        .success();

    assert_eq!(count_rows(&database), 3);
    assert!(archive.join("calls.csv").exists());
    assert!(ws.exists("loader.yml"));
}

#[test]
fn run_with_missing_table_reports_failure_and_keeps_file() {
    let ws = TestWorkspace::new();
    ws.write_qrc_csv("calls.csv", 3);
    let database = ws.path().join("db.sqlite3");

    cargo_bin_cmd!("qrc-loader")
        .args([
            "run",
            "--source-dir",
            ws.path().to_str().unwrap(),
            "--database",
            database.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("failed"));

    assert!(ws.exists("calls.csv"));
    assert!(!ws.exists("processed/calls.csv"));
}

#[test]
fn run_with_unavailable_driver_exits_with_error() {
    let ws = TestWorkspace::new();
    ws.write_qrc_csv("calls.csv", 1);

    cargo_bin_cmd!("qrc-loader")
        .args([
            "run",
            "--source-dir",
            ws.path().to_str().unwrap(),
            "--driver",
            "odbc-18",
        ])
        .assert()
        .failure()
        .stderr(contains("no suitable driver"));

    assert!(ws.exists("calls.csv"));
}

#[test]
fn run_rejects_zero_batch_size() {
    let ws = TestWorkspace::new();
    cargo_bin_cmd!("qrc-loader")
        .args([
            "run",
            "--source-dir",
            ws.path().to_str().unwrap(),
            "--batch-size",
            "0",
        ])
        .assert()
        .failure()
        .stderr(contains("batch size"));
}

#[test]
fn run_on_empty_directory_succeeds() {
    let ws = TestWorkspace::new();
    cargo_bin_cmd!("qrc-loader")
        .args(["run", "--source-dir", ws.path().to_str().unwrap()])
        .assert()
        .success();
    assert!(ws.exists("processed"));
}

#[test]
fn discover_lists_files_in_processing_order() {
    let ws = TestWorkspace::new();
    for name in ["b.csv", "A.xlsx", "c.CSV", "skip.txt"] {
        ws.write(name, "x");
    }

    let output = cargo_bin_cmd!("qrc-loader")
        .args(["discover", "--source-dir", ws.path().to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).expect("utf-8 stdout");

    let a = stdout.find("A.xlsx").expect("A.xlsx listed");
    let b = stdout.find("b.csv").expect("b.csv listed");
    let c = stdout.find("c.CSV").expect("c.CSV listed");
    assert!(a < b && b < c);
    assert!(!stdout.contains("skip.txt"));
    assert!(stdout.contains("windows-1252"));
}

#[test]
fn convert_writes_bom_prefixed_csv() {
    let ws = TestWorkspace::new();
    let input = ws.copy_fixture("jan.xlsx");
    let out_dir = ws.path().join("out");

    cargo_bin_cmd!("qrc-loader")
        .args([
            "convert",
            "-i",
            input.to_str().unwrap(),
            "-o",
            out_dir.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("jan.csv"));

    let bytes = fs::read(out_dir.join("jan.csv")).expect("converted file");
    assert!(bytes.starts_with(b"\xEF\xBB\xBF"));
    let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
    assert!(text.starts_with("date,Mobile No,agent_name_id"));
    assert!(text.contains("0788123456"));
    assert!(input.exists());
}

#[test]
fn convert_reports_corrupt_workbook() {
    let ws = TestWorkspace::new();
    let input = ws.write("broken.xls", "definitely not a workbook");

    cargo_bin_cmd!("qrc-loader")
        .args(["convert", "-i", input.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("failed to convert"));
}
