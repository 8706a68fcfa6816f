// src/lib.rs

//! _rawloglib_ is the library of the _rawlog_ log inspector.
//!
//! It stores, decodes, filters and searches structured log records kept in
//! the _rawlog_ format: a sequence of 4-byte big-endian length prefixes each
//! followed by a JSON object, optionally gzip compressed.
//!
//! ## Overview
//!
//! * [`data`] holds the record type and the framing codec.
//! * [`readers`] holds the [`RawlogStore`] that owns records, the
//!   [`VisibilityIndex`] that maps visible rows to records, the
//!   [`SearchCursor`], the [`StreamIngestor`] for live records, and the
//!   [`LogView`] that ties them together.
//! * [`query`] holds the filter and search expression language.
//! * [`config`] holds the [`RawlogConfig`] passed to every component.
//! * [`printer`] prints records and the run summary.
//!
//! [`RawlogStore`]: crate::readers::rawlogstore::RawlogStore
//! [`VisibilityIndex`]: crate::readers::visibilityindex::VisibilityIndex
//! [`SearchCursor`]: crate::readers::searchcursor::SearchCursor
//! [`StreamIngestor`]: crate::readers::streamingestor::StreamIngestor
//! [`LogView`]: crate::readers::logview::LogView
//! [`RawlogConfig`]: crate::config::RawlogConfig

pub mod common;
pub mod config;
pub mod data;
pub mod debug;
pub mod printer;
pub mod query;
pub mod readers;
#[cfg(test)]
pub mod tests;
