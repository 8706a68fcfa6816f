// src/common.rs
//
// common imports, type aliases, and other globals (avoids circular imports)

//! Common type aliases, result enums, and constants shared by the
//! _rawloglib_ modules.

pub use std::fs::File;
pub use std::path::Path;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// file-handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `F`ake `Path` or `F`ile `Path`
pub type FPath = String;

/// File Size in bytes
pub type FileSz = u64;

/// Offset into a (decompressed) byte stream in bytes
pub type FileOffset = u64;

/// Sequence of Bytes
pub type Bytes = Vec<u8>;

/// A general-purpose counter
pub type Count = u64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// records and rows
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Position of a [`LogRecord`] within a [`RawlogStore`], assigned at append
/// time. Zero based, dense, never reused.
///
/// [`LogRecord`]: crate::data::record::LogRecord
/// [`RawlogStore`]: crate::readers::rawlogstore::RawlogStore
pub type SeqIndex = usize;

/// Range of [`SeqIndex`], half-open `[start, end)`.
pub type SeqRange = std::ops::Range<SeqIndex>;

/// Position of a record among the currently visible records.
/// Zero based, dense.
pub type RowIndex = usize;

/// Monotonic mutation counter. Derived caches compare against it.
pub type Generation = u64;

/// Gzip magic bytes, RFC 1952.
pub const GZ_MAGIC: [u8; 2] = [0x1F, 0x8B];

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// custom Results enums
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `Result` Extended
/// for decoding functions
#[derive(Debug, PartialEq)]
pub enum ResultS3<T, E> {
    /// Contains the success data
    Found(T),
    /// Stream is empty, or other condition that means "Done", nothing to return, but no bad errors happened
    Done,
    /// Contains the error value, something bad happened
    Err(E),
}

impl<T, E> ResultS3<T, E> {
    /// Returns `true` if the result is [`Found`].
    ///
    /// [`Found`]: ResultS3::Found
    #[inline(always)]
    pub const fn is_found(&self) -> bool {
        matches!(*self, ResultS3::Found(_))
    }
}

/// How a bulk operation ended when it did not fail.
///
/// User cancellation is not an error; it is reported as
/// [`Completion::Aborted`] so callers can tell it apart from success and from
/// an `Err`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Completion {
    /// Every record was processed.
    Done,
    /// The progress callback or a transform asked to stop.
    Aborted,
}

/// Return value of a progress callback, polled after every record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Progress {
    Continue,
    Abort,
}

/// Progress callback `(done, total) -> Progress`.
///
/// For loading, `done` and `total` are (decompressed) bytes; `total` is an
/// estimate. For storing and exporting they are record counts.
pub type ProgressFn<'a> = dyn FnMut(u64, u64) -> Progress + 'a;
