// src/data/record.rs

//! Implements [`LogRecord`], one structured log entry.
//!
//! A `LogRecord` is an ordered mapping of field name to JSON value, plus two
//! runtime-only properties assigned by the [`RawlogStore`]: the
//! [`SeqIndex`] and the "virtual" flag. The runtime-only properties are held
//! outside of the field map so they can never be written to a rawlog.
//!
//! [`RawlogStore`]: crate::readers::rawlogstore::RawlogStore
//! [`SeqIndex`]: crate::common::SeqIndex

use crate::common::{FileOffset, SeqIndex};

use std::fmt;

use ::itertools::Itertools;
use ::serde_json::{Map, Value};

/// Ordered field map of a [`LogRecord`].
pub type Fields = Map<String, Value>;

/// Field name holding the human-readable message of synthesized records.
pub const FIELD_MSG: &str = "msg";
/// Field name holding the numeric level of synthesized records.
pub const FIELD_LEVEL: &str = "level";
/// Field name holding the kind of a synthesized record.
pub const FIELD_VIRTUAL_KIND: &str = "virtual_kind";

/// Legacy writers stored the sequence index in the record. Stripped when
/// decoding and never written.
pub const RESERVED_FIELD_SEQ: &str = "__seq__";
/// Legacy writers stored the virtual flag in the record. Stripped when
/// decoding and never written.
pub const RESERVED_FIELD_VIRTUAL: &str = "__virtual__";

/// Kinds of synthesized diagnostic records.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VirtualKind {
    /// A damaged region of a rawlog was skipped.
    Corruption,
    /// A network packet failed to decrypt or decode.
    PacketError,
    /// The remote stream counter skipped ahead or went backwards.
    StreamGap,
    /// The remote process identity changed.
    StreamRestart,
}

impl VirtualKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            VirtualKind::Corruption => "corruption",
            VirtualKind::PacketError => "packet_error",
            VirtualKind::StreamGap => "stream_gap",
            VirtualKind::StreamRestart => "stream_restart",
        }
    }
}

/// One structured log entry.
#[derive(Clone, PartialEq)]
pub struct LogRecord {
    seq: SeqIndex,
    virtual_: bool,
    fields: Fields,
}

impl fmt::Debug for LogRecord {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("LogRecord")
            .field("seq", &self.seq)
            .field("virtual", &self.virtual_)
            .field("fields", &self.fields.len())
            .finish()
    }
}

impl LogRecord {
    /// Create a real (non-virtual) record. The sequence index is assigned
    /// later by the store.
    pub fn new(mut fields: Fields) -> LogRecord {
        fields.retain(|name, _| name != RESERVED_FIELD_SEQ && name != RESERVED_FIELD_VIRTUAL);

        LogRecord {
            seq: 0,
            virtual_: false,
            fields,
        }
    }

    /// Create a synthesized diagnostic record with fields
    /// `msg`, `level`, `virtual_kind`, followed by `extra`.
    pub fn new_virtual(
        kind: VirtualKind,
        level: i64,
        msg: String,
        extra: Fields,
    ) -> LogRecord {
        let mut fields = Fields::with_capacity(3 + extra.len());
        fields.insert(String::from(FIELD_MSG), Value::String(msg));
        fields.insert(String::from(FIELD_LEVEL), Value::from(level));
        fields.insert(String::from(FIELD_VIRTUAL_KIND), Value::from(kind.as_str()));
        for (k, v) in extra.into_iter() {
            fields.insert(k, v);
        }

        LogRecord {
            seq: 0,
            virtual_: true,
            fields,
        }
    }

    /// Create the diagnostic record emitted after a resync.
    pub fn new_corruption(
        level: i64,
        skipped: u64,
        offset: FileOffset,
    ) -> LogRecord {
        let mut extra = Fields::new();
        extra.insert(String::from("skipped_bytes"), Value::from(skipped));
        extra.insert(String::from("offset"), Value::from(offset));

        LogRecord::new_virtual(
            VirtualKind::Corruption,
            level,
            format!("corrupted data: skipped {} bytes at offset {}", skipped, offset),
            extra,
        )
    }

    #[inline(always)]
    pub fn seq(&self) -> SeqIndex {
        self.seq
    }

    #[inline(always)]
    pub(crate) fn set_seq(&mut self, seq: SeqIndex) {
        self.seq = seq;
    }

    /// `true` if this record was synthesized and is never persisted.
    #[inline(always)]
    pub fn is_virtual(&self) -> bool {
        self.virtual_
    }

    #[inline(always)]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    #[inline(always)]
    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Every field path of this record, depth first, in field order.
    ///
    /// Nested maps are rendered as `name["child"]["grandchild"]`; the path of
    /// a map itself is listed before the paths of its members.
    pub fn field_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::with_capacity(self.fields.len());
        for (name, value) in self.fields.iter() {
            paths.push(name.clone());
            if let Value::Object(map) = value {
                field_paths_nested(name, map, &mut paths);
            }
        }

        paths
    }
}

fn field_paths_nested(
    prefix: &str,
    map: &Map<String, Value>,
    paths: &mut Vec<String>,
) {
    for (name, value) in map.iter() {
        // serde_json escapes quotes and backslashes like the query lexer expects
        let path = format!("{}[{}]", prefix, Value::String(name.clone()));
        if let Value::Object(map_) = value {
            paths.push(path.clone());
            field_paths_nested(&path, map_, paths);
        } else {
            paths.push(path);
        }
    }
}

/// Render a JSON value for a text line. Strings are not quoted.
fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Default formatter for [`RawlogStore::export_to_stream`]:
/// `key=value` pairs separated by a space.
///
/// [`RawlogStore::export_to_stream`]: crate::readers::rawlogstore::RawlogStore::export_to_stream
pub fn format_record_line(record: &LogRecord) -> String {
    record
        .fields()
        .iter()
        .map(|(k, v)| format!("{}={}", k, value_to_text(v)))
        .join(" ")
}
