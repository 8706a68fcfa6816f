// src/debug/mod.rs

//! The `debug` module is printer macros and functions for warnings, errors,
//! and test builds.

#[cfg(test)]
pub mod helpers;

pub mod printers;
