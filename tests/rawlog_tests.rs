// tests/rawlog_tests.rs
//
// library and driver program tests over rawlog files on disk

#![allow(non_snake_case)]

extern crate rawloglib;

use rawloglib::common::Completion;
use rawloglib::config::{RawlogConfig, RECORD_LEN_MAX};
use rawloglib::data::framing::write_record;
use rawloglib::data::record::{format_record_line, Fields};
use rawloglib::query::QueryStatus;
use rawloglib::readers::logview::LogView;

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use ::flate2::write::GzEncoder;
use ::flate2::Compression;
use ::serde_json::{json, Value};
use ::tempfile::TempDir;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("not a JSON object: {}", other),
    }
}

fn fields_abc() -> Vec<Fields> {
    vec![
        fields(json!({"msg": "a", "level": 1})),
        fields(json!({"msg": "b", "level": 2})),
        fields(json!({"msg": "c", "level": 1})),
    ]
}

/// Write `fieldss` as a rawlog file `name` in `dir`.
fn write_rawlog(
    dir: &TempDir,
    name: &str,
    fieldss: &[Fields],
    compressed: bool,
) -> PathBuf {
    let path = dir.path().join(name);
    let file = File::create(&path).unwrap();
    if compressed {
        let mut encoder = GzEncoder::new(file, Compression::default());
        for fields_ in fieldss.iter() {
            write_record(&mut encoder, fields_, RECORD_LEN_MAX).unwrap();
        }
        encoder.finish().unwrap().flush().unwrap();
    } else {
        let mut file = file;
        for fields_ in fieldss.iter() {
            write_record(&mut file, fields_, RECORD_LEN_MAX).unwrap();
        }
        file.flush().unwrap();
    }

    path
}

fn load(path: &Path) -> LogView {
    let mut view = LogView::new(RawlogConfig::default().into_arc());
    assert_eq!(view.load_path(path, None, None).unwrap(), Completion::Done);

    view
}

fn lines(view: &LogView) -> Vec<String> {
    view.store()
        .iter()
        .map(|record| format_record_line(record))
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// library
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[test]
fn test_load_filter_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rawlog(&dir, "abc.rawlog", &fields_abc(), false);
    let mut view = load(&path);
    assert_eq!(view.apply_filter("level == 1"), &QueryStatus::Ok);
    assert_eq!(view.visible_row_count(), 2);
    assert_eq!(view.row_to_sequence_index(0), Some(0));
    assert_eq!(view.row_to_sequence_index(1), Some(2));
}

#[test]
fn test_gzip_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rawlog(&dir, "abc.rawlog.gz", &fields_abc(), true);
    let view = load(&path);
    assert!(view.store().summary().gz);
    assert_eq!(lines(&view), vec!["msg=a level=1", "msg=b level=2", "msg=c level=1"]);

    let path2 = dir.path().join("stored.rawlog.gz");
    let file = File::create(&path2).unwrap();
    assert_eq!(
        view.store_visible_to_stream(file, true, None, None).unwrap(),
        Completion::Done
    );
    let view2 = load(&path2);
    assert!(view2.store().summary().gz);
    assert_eq!(lines(&view2), lines(&view));
}

#[test]
fn test_store_filtered_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rawlog(&dir, "abc.rawlog", &fields_abc(), false);
    let mut view = load(&path);
    view.apply_filter("level == 2");
    let path2 = dir.path().join("b.rawlog");
    view.store_visible_to_stream(File::create(&path2).unwrap(), false, None, None)
        .unwrap();
    assert_eq!(lines(&load(&path2)), vec!["msg=b level=2"]);
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// driver program
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn rawlog(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rawlog"))
        .arg("--color=never")
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[test]
fn test_rawlog_print_all() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rawlog(&dir, "abc.rawlog", &fields_abc(), true);
    let output = rawlog(&[path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "msg=a level=1\nmsg=b level=2\nmsg=c level=1\n");
}

#[test]
fn test_rawlog_filter_prepend_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rawlog(&dir, "abc.rawlog", &fields_abc(), false);
    let output = rawlog(&["-i", "-f", "level == 1", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        "     0      0 msg=a level=1\n     1      2 msg=c level=1\n"
    );
}

#[test]
fn test_rawlog_search_wraps_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rawlog(&dir, "abc.rawlog", &fields_abc(), false);
    let output = rawlog(&["-s", "level == 1", "--start", "0", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "msg=c level=1\nmsg=a level=1\n");
}

#[test]
fn test_rawlog_search_start_not_a_match_prints_each_once() {
    let dir = tempfile::tempdir().unwrap();
    let fieldss: Vec<Fields> = (0..5)
        .map(|i| fields(json!({"msg": format!("m{}", i), "level": i % 2})))
        .collect();
    let path = write_rawlog(&dir, "five.rawlog", &fieldss, false);
    let output = rawlog(&["-s", "level == 1", "--start", "2", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "msg=m3 level=1\nmsg=m1 level=1\n");
    let output = rawlog(&["-s", "level == 1", "--start", "2", "-p", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "msg=m1 level=1\nmsg=m3 level=1\n");
}

#[test]
fn test_rawlog_completions() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rawlog(&dir, "abc.rawlog", &fields_abc(), false);
    let output = rawlog(&["--completions", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "msg\nlevel\n");
}

#[test]
fn test_rawlog_bad_filter_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rawlog(&dir, "abc.rawlog", &fields_abc(), false);
    let output = rawlog(&["-f", "foo ++ bar", path.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("ERROR: "), "{}", stderr);
    assert!(stderr.contains("QUERY_ERROR: syntax error at column 5"), "{}", stderr);
}

#[test]
fn test_rawlog_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = rawlog(&[dir.path().join("nope.rawlog").to_str().unwrap()]);
    assert!(!output.status.success());
}
