// src/tests/logview_tests.rs

use crate::common::Completion;
use crate::config::RawlogConfig;
use crate::data::record::{format_record_line, LogRecord};
use crate::query::{QueryError, QueryStatus};
use crate::readers::logview::LogView;
use crate::readers::rawlogstore::{RecordTransform, RequiredTransform, Transformed};
use crate::tests::common::{config, fields, fields_numbered, msgs, rawlog_bytes, record, FIELDS_ABC};

use std::io::{Cursor, ErrorKind};
use std::sync::Arc;

use ::serde_json::{json, Value};
use ::test_case::test_case;

fn view_with_config(
    config_: Arc<RawlogConfig>,
    bytes: Vec<u8>,
) -> LogView {
    let mut view = LogView::new(config_);
    let completion = view.load_from_stream(Cursor::new(bytes), None, None).unwrap();
    assert_eq!(completion, Completion::Done);

    view
}

fn view_abc() -> LogView {
    view_with_config(config(), rawlog_bytes(&FIELDS_ABC))
}

/// `count` live records, `level` is `i % 3`.
fn live_records(count: usize) -> Vec<LogRecord> {
    (0..count)
        .map(|i| record(json!({"msg": format!("live {}", i), "level": i % 3})))
        .collect()
}

fn visible_seqs(view: &mut LogView) -> Vec<usize> {
    (0..view.visible_row_count())
        .map(|row| view.row_to_sequence_index(row).unwrap())
        .collect()
}

#[test]
fn test_new_is_empty() {
    let mut view = LogView::new(config());
    assert_eq!(view.visible_row_count(), 0);
    assert_eq!(view.row_to_sequence_index(0), None);
    assert_eq!(view.filter_text(), None);
    assert_eq!(view.filter_status(), &QueryStatus::Ok);
}

#[test]
fn test_load_all_visible() {
    let mut view = view_abc();
    assert_eq!(view.visible_row_count(), 3);
    assert_eq!(visible_seqs(&mut view), vec![0, 1, 2]);
    assert_eq!(view.record_at_row(1).unwrap().get("msg"), Some(&Value::from("b")));
}

#[test]
fn test_filter() {
    let mut view = view_abc();
    assert_eq!(view.apply_filter("level == 1"), &QueryStatus::Ok);
    assert_eq!(view.visible_row_count(), 2);
    assert_eq!(view.row_to_sequence_index(0), Some(0));
    assert_eq!(view.row_to_sequence_index(1), Some(2));
    assert_eq!(view.row_to_sequence_index(2), None);
    assert_eq!(view.sequence_index_to_row(2), Some(1));
    assert_eq!(view.sequence_index_to_row(1), Some(0));
    assert!(!view.is_visible(1));
    assert_eq!(view.record_at_row(1).unwrap().get("msg"), Some(&Value::from("c")));
    assert_eq!(view.filter_text(), Some("level == 1"));
}

#[test]
fn test_filter_error_leaves_visibility() {
    let mut view = view_abc();
    view.apply_filter("level == 1");
    let status = view.apply_filter("foo ++ bar").clone();
    assert!(matches!(status, QueryStatus::Error(QueryError::Syntax { column: 5, .. })));
    assert!(status.to_string().starts_with("QUERY_ERROR: "));
    assert_eq!(view.visible_row_count(), 2);
    assert_eq!(visible_seqs(&mut view), vec![0, 2]);
    assert_eq!(view.filter_text(), Some("level == 1"));
}

#[test]
fn test_filter_evaluation_error_leaves_visibility() {
    let mut view = view_abc();
    let status = view.apply_filter("level == 2 or missing").clone();
    assert_eq!(status, QueryStatus::Error(QueryError::UnknownName(String::from("missing"))));
    assert_eq!(view.visible_row_count(), 3);
}

#[test]
fn test_filter_empty_hides_all() {
    let mut view = view_abc();
    assert_eq!(view.apply_filter("level == 9"), &QueryStatus::Empty);
    assert_eq!(view.visible_row_count(), 0);
    assert_eq!(view.row_to_sequence_index(0), None);
    assert_eq!(view.sequence_index_to_row(2), None);
}

#[test_case(""; "empty")]
#[test_case("   "; "blank")]
fn test_filter_blank_clears(text: &str) {
    let mut view = view_abc();
    view.apply_filter("level == 9");
    assert_eq!(view.apply_filter(text), &QueryStatus::Ok);
    assert_eq!(view.visible_row_count(), 3);
    assert_eq!(view.filter_text(), None);
}

#[test]
fn test_clear_filter() {
    let mut view = view_abc();
    view.apply_filter("level == 1");
    view.clear_filter();
    assert_eq!(visible_seqs(&mut view), vec![0, 1, 2]);
}

#[test]
fn test_load_reapplies_filter() {
    let mut view = view_abc();
    view.apply_filter("level == 1");
    view.load_from_stream(Cursor::new(rawlog_bytes(&fields_numbered(6))), None, None)
        .unwrap();
    assert_eq!(view.filter_text(), Some("level == 1"));
    assert_eq!(visible_seqs(&mut view), vec![1, 4]);
}

#[test]
fn test_load_reapply_error_keeps_filter() {
    let mut view = view_abc();
    view.apply_filter("level == 1");
    let no_level = vec![fields(json!({"msg": "x"})), fields(json!({"msg": "y"}))];
    view.load_from_stream(Cursor::new(rawlog_bytes(&no_level)), None, None)
        .unwrap();
    assert_eq!(view.filter_text(), Some("level == 1"));
    assert_eq!(
        view.filter_status(),
        &QueryStatus::Error(QueryError::UnknownName(String::from("level")))
    );
    assert_eq!(visible_seqs(&mut view), vec![0, 1]);
    // the kept filter applies to the next load
    view.load_from_stream(Cursor::new(rawlog_bytes(&FIELDS_ABC)), None, None)
        .unwrap();
    assert_eq!(view.filter_status(), &QueryStatus::Ok);
    assert_eq!(visible_seqs(&mut view), vec![0, 2]);
}

#[test]
fn test_clear() {
    let mut view = view_abc();
    view.clear();
    assert_eq!(view.visible_row_count(), 0);
    assert!(view.store().is_empty());
}

#[test]
fn test_append_live_no_filter() {
    let mut view = view_abc();
    let range = view.append_live(live_records(4), None);
    assert_eq!(range, Some(3..7));
    assert_eq!(view.visible_row_count(), 7);
    assert_eq!(view.row_to_sequence_index(6), Some(6));
}

#[test]
fn test_append_live_under_filter_hidden() {
    let mut view = view_with_config(config(), rawlog_bytes(&fields_numbered(9)));
    view.apply_filter("level == 0");
    assert_eq!(visible_seqs(&mut view), vec![0, 3, 6]);
    let range = view.append_live(live_records(10), None);
    assert_eq!(range, Some(9..19));
    assert_eq!(view.visible_row_count(), 3);
    assert_eq!(visible_seqs(&mut view), vec![0, 3, 6]);
    assert_eq!(view.sequence_index_to_row(18), Some(2));
    assert!(!view.is_visible(9));
    // re-applying picks up the new rows
    view.apply_filter("level == 0");
    assert_eq!(view.visible_row_count(), 7);
}

#[test]
fn test_append_live_under_filter_tested() {
    let config_ = RawlogConfig {
        filter_live_rows: true,
        ..RawlogConfig::default()
    }
    .into_arc();
    let mut view = view_with_config(config_, rawlog_bytes(&fields_numbered(9)));
    view.apply_filter("level == 0");
    view.append_live(live_records(10), None);
    assert_eq!(visible_seqs(&mut view), vec![0, 3, 6, 9, 12, 15, 18]);
}

#[test]
fn test_search() {
    let mut view = view_with_config(config(), rawlog_bytes(&fields_numbered(9)));
    let cursor = view.search("level == 2", 3);
    assert_eq!(cursor.results(), &[2, 5, 8]);
    assert_eq!(view.search_next(), Some(5));
    assert_eq!(view.search_next(), Some(8));
    // same text, nothing changed; the cursor keeps its position
    assert_eq!(view.search("level == 2", 0).current(), Some(8));
    assert_eq!(view.search_previous(), Some(5));
    // different text makes a new cursor
    assert_eq!(view.search("level == 1", 0).current(), None);
    assert_eq!(view.search_next(), Some(1));
}

#[test]
fn test_search_without_cursor() {
    let mut view = view_abc();
    assert_eq!(view.search_next(), None);
    assert_eq!(view.search_previous(), None);
    assert!(view.cursor().is_none());
}

#[test]
fn test_search_respects_filter() {
    let mut view = view_with_config(config(), rawlog_bytes(&fields_numbered(9)));
    view.apply_filter("i < 6");
    assert!(view.cursor().is_none());
    assert_eq!(view.search("level == 2", 0).results(), &[2, 5]);
    view.apply_filter("i >= 3");
    assert!(view.cursor().is_none(), "a filter change drops the search");
    assert_eq!(view.search("level == 2", 0).results(), &[5, 8]);
}

#[test]
fn test_search_extended_by_append() {
    let mut view = view_with_config(config(), rawlog_bytes(&fields_numbered(9)));
    view.search("level == 2", 0);
    assert_eq!(view.search_next(), Some(2));
    view.append_live(live_records(3), None);
    let cursor = view.cursor().unwrap();
    assert_eq!(cursor.results(), &[2, 5, 8, 11]);
    assert_eq!(cursor.current(), Some(2));
    assert_eq!(view.search("level == 2", 0).current(), Some(2), "cursor is reused");
}

#[test]
fn test_search_error() {
    let mut view = view_abc();
    let cursor = view.search("foo ++ bar", 0);
    assert!(cursor.status().is_error());
    assert_eq!(view.search_next(), None);
}

#[test]
fn test_store_visible() {
    let mut view = view_abc();
    view.apply_filter("level == 1");
    let mut buffer: Vec<u8> = Vec::new();
    let completion = view.store_visible_to_stream(&mut buffer, false, None, None).unwrap();
    assert_eq!(completion, Completion::Done);
    let mut view2 = LogView::new(config());
    view2.load_from_stream(Cursor::new(buffer), None, None).unwrap();
    assert_eq!(msgs(view2.store()), vec!["a", "c"]);
}

#[test]
fn test_store_visible_transform_sees_visible_only() {
    let mut view = view_abc();
    view.apply_filter("level == 1");
    let mut seen: Vec<usize> = Vec::new();
    let mut record_seq = |record: LogRecord| {
        seen.push(record.seq());
        Transformed::Keep(record)
    };
    let mut buffer: Vec<u8> = Vec::new();
    view.store_visible_to_stream(&mut buffer, true, None, Some(&mut record_seq as &mut dyn RecordTransform))
        .unwrap();
    assert_eq!(seen, vec![0, 2]);
}

#[test]
fn test_export_visible() {
    let mut view = view_abc();
    view.apply_filter("level == 2");
    let mut buffer: Vec<u8> = Vec::new();
    view.export_visible_to_stream(&mut buffer, false, format_record_line, None, None)
        .unwrap();
    assert_eq!(String::from_utf8(buffer).unwrap(), "msg=b level=2\n");
}

#[test]
fn test_required_transform() {
    let mut view = LogView::new(config());
    let mut identity = RequiredTransform(Transformed::Keep);
    view.load_from_stream(
        Cursor::new(rawlog_bytes(&FIELDS_ABC)),
        None,
        Some(&mut identity as &mut dyn RecordTransform),
    )
    .unwrap();
    let mut buffer: Vec<u8> = Vec::new();
    let err = view.store_visible_to_stream(&mut buffer, false, None, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let err = view
        .export_visible_to_stream(&mut buffer, false, format_record_line, None, None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let completion = view
        .store_visible_to_stream(&mut buffer, false, None, Some(&mut identity as &mut dyn RecordTransform))
        .unwrap();
    assert_eq!(completion, Completion::Done);
    assert_eq!(buffer, rawlog_bytes(&FIELDS_ABC));
}

#[test]
fn test_completion_candidates() {
    let view = view_abc();
    assert_eq!(view.completion_candidates(), vec!["msg", "level"]);
}
