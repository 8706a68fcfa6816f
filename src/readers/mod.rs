// src/readers/mod.rs

//! "Readers" for _rawloglib_.
//!
//! ## Overview of readers
//!
//! * A [`RawlogStore`] drives a [`FrameDecoder`] to derive [`LogRecord`s].
//! * A [`StreamIngestor`] receives [`LogRecord`s] from the network on a
//!   background thread and queues them for a `RawlogStore`.
//! * A [`VisibilityIndex`] maps the records of a `RawlogStore` to the rows
//!   that are visible under a filter.
//! * A [`SearchCursor`] walks the visible records that match a query.
//! * A [`LogView`] owns one of each of the above, except the
//!   `StreamIngestor`, and keeps them consistent.
//!
//! <br/>
//!
//! Everything but the `StreamIngestor` listener thread runs on one
//! interactive thread; no locks are involved.
//!
//! _These are not rust "Readers"; these structs do not implement the trait
//! [`Read`]. These are "readers" in an informal sense._
//!
//! [`Read`]: std::io::Read
//! [`LogRecord`s]: crate::data::record::LogRecord
//! [`FrameDecoder`]: crate::data::framing::FrameDecoder
//! [`RawlogStore`]: crate::readers::rawlogstore::RawlogStore
//! [`StreamIngestor`]: crate::readers::streamingestor::StreamIngestor
//! [`VisibilityIndex`]: crate::readers::visibilityindex::VisibilityIndex
//! [`SearchCursor`]: crate::readers::searchcursor::SearchCursor
//! [`LogView`]: crate::readers::logview::LogView

pub mod logview;
pub mod rawlogstore;
pub mod searchcursor;
pub mod streamingestor;
pub mod visibilityindex;
