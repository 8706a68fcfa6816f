// src/tests/common.rs

//! Common data and helper functions for tests.

use crate::config::{RawlogConfig, RECORD_LEN_MAX};
use crate::data::framing::encode_record;
use crate::data::record::{Fields, LogRecord};
use crate::readers::rawlogstore::RawlogStore;

use std::io::{Cursor, Write};
use std::sync::Arc;

use ::flate2::write::GzEncoder;
use ::flate2::Compression;
use ::lazy_static::lazy_static;
use ::serde_json::{json, Value};

lazy_static! {
    /// The 3 records `a`, `b`, `c` with levels `1`, `2`, `1`.
    pub static ref FIELDS_ABC: Vec<Fields> = vec![
        fields(json!({"msg": "a", "level": 1})),
        fields(json!({"msg": "b", "level": 2})),
        fields(json!({"msg": "c", "level": 1})),
    ];
}

pub fn config() -> Arc<RawlogConfig> {
    RawlogConfig::default().into_arc()
}

/// Convert a `json!` object into [`Fields`]. Panics if not an object.
pub fn fields(value: Value) -> Fields {
    match value {
        Value::Object(map) => map,
        other => panic!("not a JSON object: {}", other),
    }
}

pub fn record(value: Value) -> LogRecord {
    LogRecord::new(fields(value))
}

/// Encode every `fields` as a frame, concatenated.
pub fn rawlog_bytes(fieldss: &[Fields]) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::new();
    for fields_ in fieldss.iter() {
        let frame = match encode_record(fields_, RECORD_LEN_MAX) {
            Ok(frame) => frame,
            Err(err) => panic!("encode_record failed {}", err),
        };
        buffer.extend_from_slice(&frame);
    }

    buffer
}

pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();

    encoder.finish().unwrap()
}

/// `msg` and `level` of `count` records, `level` is `i % 3`.
pub fn fields_numbered(count: usize) -> Vec<Fields> {
    (0..count)
        .map(|i| fields(json!({"msg": format!("line {}", i), "level": i % 3, "i": i})))
        .collect()
}

/// A store loaded from `fieldss`.
pub fn store_with(fieldss: &[Fields]) -> RawlogStore {
    let mut store = RawlogStore::new(config());
    let bytes = rawlog_bytes(fieldss);
    match store.load_from_stream(Cursor::new(bytes), None, None) {
        Ok(_) => {}
        Err(err) => panic!("load_from_stream failed {}", err),
    }

    store
}

/// The `msg` field of every record in `store`.
pub fn msgs(store: &RawlogStore) -> Vec<String> {
    store
        .iter()
        .map(|record| match record.get("msg") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        })
        .collect()
}
