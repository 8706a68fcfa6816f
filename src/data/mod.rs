// src/data/mod.rs

//! The `data` module is specialized data containers for [`LogRecord`]s and
//! the rawlog framing that stores them.
//!
//! ## Definitions of data
//!
//! ### Record
//!
//! A "record" is one structured log entry: an ordered mapping of field name
//! to JSON value. A record stored in a [`RawlogStore`] has an immutable
//! sequence index equal to its position at append time.
//!
//! A "virtual record" is a diagnostic record synthesized by _rawloglib_,
//! e.g. a notice about a skipped corrupted region or a gap in a live
//! stream. Virtual records are never written to a rawlog.
//!
//! A record is represented by a [`LogRecord`].
//!
//! ### Rawlog
//!
//! A "rawlog" is a byte stream, optionally gzip compressed, of repeating
//! frames. Each frame is a big-endian `u32` length followed by that many
//! bytes of a UTF-8 JSON object.
//!
//! Frames are written by [`write_record`] and read by a [`FrameDecoder`].
//!
//! [`LogRecord`]: crate::data::record::LogRecord
//! [`RawlogStore`]: crate::readers::rawlogstore::RawlogStore
//! [`write_record`]: crate::data::framing::write_record
//! [`FrameDecoder`]: crate::data::framing::FrameDecoder

pub mod framing;
pub mod record;
