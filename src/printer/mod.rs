// src/printer/mod.rs

//! The `printer` module is for printing user-facing [`LogRecord`s]
//! with color by level, and for printing the end-of-run summary.
//!
//! [`LogRecord`s]: crate::data::record::LogRecord

pub mod printers;
pub mod summary;
