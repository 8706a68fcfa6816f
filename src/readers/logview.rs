// src/readers/logview.rs

//! Implements a [`LogView`], the interactive-thread owner of a
//! [`RawlogStore`], its [`VisibilityIndex`], the active filter and the
//! active [`SearchCursor`].
//!
//! All mutation happens through a `LogView` on one thread. A filter hides
//! the records it does not match; a search navigates the visible records
//! that match. Rows appended live are folded into the index and the search
//! results incrementally.
//!
//! Rows appended while a filter is active are inserted hidden, so the
//! visible row numbering does not change under the user, unless
//! [`RawlogConfig::filter_live_rows`] is set, in which case each new row is
//! tested against the filter.
//!
//! [`RawlogConfig::filter_live_rows`]: crate::config::RawlogConfig::filter_live_rows

use crate::common::{Completion, Generation, Path, ProgressFn, RowIndex, SeqIndex, SeqRange};
use crate::config::RawlogConfig;
use crate::data::record::LogRecord;
use crate::query::{Query, QueryError, QueryEvaluator, QueryStatus};
use crate::readers::rawlogstore::{RawlogStore, RecordTransform, Transformed};
use crate::readers::searchcursor::SearchCursor;
use crate::readers::streamingestor::StreamIngestor;
use crate::readers::visibilityindex::VisibilityIndex;

use std::fmt;
use std::io::{Error, ErrorKind, Read, Result, Seek, Write};
use std::sync::Arc;

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// A store, its visibility and its active filter and search.
pub struct LogView {
    config: Arc<RawlogConfig>,
    store: RawlogStore,
    index: VisibilityIndex,
    evaluator: QueryEvaluator,
    filter: Option<Arc<Query>>,
    filter_status: QueryStatus,
    cursor: Option<SearchCursor>,
    /// store generation the index and cursor were last brought up to date with
    synced_store_generation: Generation,
}

impl fmt::Debug for LogView {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("LogView")
            .field("store", &self.store)
            .field("index", &self.index)
            .field("filter", &self.filter.as_ref().map(|query| query.text()))
            .field("filter_status", &self.filter_status)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl LogView {
    pub fn new(config: Arc<RawlogConfig>) -> LogView {
        let index = VisibilityIndex::new(0, true, &config);
        let evaluator = QueryEvaluator::new(config.clone());
        let store = RawlogStore::new(config.clone());
        let synced_store_generation = store.generation();

        LogView {
            config,
            store,
            index,
            evaluator,
            filter: None,
            filter_status: QueryStatus::Ok,
            cursor: None,
            synced_store_generation,
        }
    }

    pub fn config(&self) -> &Arc<RawlogConfig> {
        &self.config
    }

    pub fn store(&self) -> &RawlogStore {
        &self.store
    }

    pub fn index(&self) -> &VisibilityIndex {
        &self.index
    }

    pub fn evaluator_mut(&mut self) -> &mut QueryEvaluator {
        &mut self.evaluator
    }

    /// Text of the active filter.
    pub fn filter_text(&self) -> Option<&str> {
        self.filter.as_ref().map(|query| query.text())
    }

    /// Status of the most recent [`apply_filter`].
    ///
    /// [`apply_filter`]: LogView::apply_filter
    pub fn filter_status(&self) -> &QueryStatus {
        &self.filter_status
    }

    pub fn cursor(&self) -> Option<&SearchCursor> {
        self.cursor.as_ref()
    }

    pub fn visible_row_count(&self) -> usize {
        self.index.visible_row_count()
    }

    pub fn is_visible(
        &self,
        seq: SeqIndex,
    ) -> bool {
        self.index.is_visible(seq)
    }

    pub fn row_to_sequence_index(
        &mut self,
        row: RowIndex,
    ) -> Option<SeqIndex> {
        self.index.row_to_sequence_index(row)
    }

    pub fn sequence_index_to_row(
        &mut self,
        seq: SeqIndex,
    ) -> Option<RowIndex> {
        self.index.sequence_index_to_row(seq)
    }

    /// The record shown at visible `row`.
    pub fn record_at_row(
        &mut self,
        row: RowIndex,
    ) -> Option<&LogRecord> {
        let seq = self.index.row_to_sequence_index(row)?;

        self.store.get(seq)
    }

    /// Bring the index up to date after the store was replaced.
    fn after_load(&mut self) {
        self.index.reset(self.store.len(), true);
        self.cursor = None;
        self.synced_store_generation = self.store.generation();
        if let Some(filter) = self.filter.take() {
            let text = String::from(filter.text());
            if self.apply_filter(&text).is_error() {
                // keep the filter; the loaded records are all shown
                self.filter = Some(filter);
            }
        }
    }

    /// Load a rawlog stream; see [`RawlogStore::load_from_stream`].
    /// An active filter is re-applied to the loaded records.
    pub fn load_from_stream<R: Read + Seek>(
        &mut self,
        stream: R,
        on_progress: Option<&mut ProgressFn>,
        transform: Option<&mut dyn RecordTransform>,
    ) -> Result<Completion> {
        let result = self.store.load_from_stream(stream, on_progress, transform);
        self.after_load();

        result
    }

    /// Load a rawlog file; see [`RawlogStore::load_path`].
    pub fn load_path(
        &mut self,
        path: &Path,
        on_progress: Option<&mut ProgressFn>,
        transform: Option<&mut dyn RecordTransform>,
    ) -> Result<Completion> {
        let result = self.store.load_path(path, on_progress, transform);
        self.after_load();

        result
    }

    /// Remove every record.
    pub fn clear(&mut self) {
        self.store.clear();
        self.after_load();
    }

    /// Evaluate `query` for every record; stops at the first error.
    fn evaluate_all(
        &self,
        query: &Query,
    ) -> std::result::Result<Vec<bool>, QueryError> {
        let mut matched: Vec<bool> = Vec::with_capacity(self.store.len());
        for record in self.store.iter() {
            matched.push(self.evaluator.matches(query, record)?);
        }

        Ok(matched)
    }

    /// Show only the records matching `text`; a blank `text` clears the
    /// filter.
    ///
    /// If `text` does not compile, or fails to evaluate for any record, the
    /// status is [`QueryStatus::Error`] and visibility is left unchanged.
    /// If nothing matches the status is [`QueryStatus::Empty`] and every
    /// record is hidden.
    pub fn apply_filter(
        &mut self,
        text: &str,
    ) -> &QueryStatus {
        defn!("({:?})", text);
        if text.trim().is_empty() {
            self.clear_filter();
            defx!("blank filter");
            return &self.filter_status;
        }
        let query = match self.evaluator.compile(text) {
            Ok(query) => query,
            Err(err) => {
                self.filter_status = QueryStatus::Error(err);
                defx!("{}", self.filter_status);
                return &self.filter_status;
            }
        };
        let matched = match self.evaluate_all(&query) {
            Ok(matched) => matched,
            Err(err) => {
                self.filter_status = QueryStatus::Error(err);
                defx!("{}", self.filter_status);
                return &self.filter_status;
            }
        };
        self.index.reset(matched.len(), false);
        // set runs of matches as ranges
        let mut run_start: Option<SeqIndex> = None;
        for (seq, is_match) in matched.iter().enumerate() {
            match (*is_match, run_start) {
                (true, None) => run_start = Some(seq),
                (false, Some(start)) => {
                    self.index.set_visible(start..seq);
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            self.index.set_visible(start..matched.len());
        }
        self.filter = Some(query);
        self.cursor = None;
        self.synced_store_generation = self.store.generation();
        self.filter_status = if self.index.visible_row_count() == 0 {
            QueryStatus::Empty
        } else {
            QueryStatus::Ok
        };
        defx!("{} visible, {}", self.index.visible_row_count(), self.filter_status);

        &self.filter_status
    }

    /// Show every record.
    pub fn clear_filter(&mut self) {
        defñ!();
        self.index.reset(self.store.len(), true);
        self.filter = None;
        self.filter_status = QueryStatus::Ok;
        self.cursor = None;
        self.synced_store_generation = self.store.generation();
    }

    /// Start a search for `text` from `start_index`, or reuse the current
    /// search if it is for the same text and nothing changed since.
    pub fn search(
        &mut self,
        text: &str,
        start_index: SeqIndex,
    ) -> &mut SearchCursor {
        let reusable: bool = match self.cursor.as_ref() {
            Some(cursor) => cursor.is_reusable(text, self.store.generation(), self.index.generation()),
            None => false,
        };
        if !reusable {
            defo!("new cursor for {:?}", text);
            self.cursor = None;
        }
        let evaluator = &mut self.evaluator;
        let store = &self.store;
        let index = &mut self.index;

        self.cursor
            .get_or_insert_with(|| SearchCursor::new(evaluator, store, index, text, start_index))
    }

    /// Next match of the current search.
    pub fn search_next(&mut self) -> Option<SeqIndex> {
        self.cursor.as_mut().and_then(|cursor| cursor.next())
    }

    /// Previous match of the current search.
    pub fn search_previous(&mut self) -> Option<SeqIndex> {
        self.cursor.as_mut().and_then(|cursor| cursor.previous())
    }

    /// Fold rows `range`, just appended to the store, into the visibility
    /// index and the current search.
    pub fn on_rows_inserted(
        &mut self,
        range: SeqRange,
    ) {
        defn!("({:?})", range);
        if range.is_empty() {
            defx!("empty range");
            return;
        }
        let cursor_current: bool = match self.cursor.as_ref() {
            Some(cursor) => {
                cursor.is_reusable(cursor.query_text(), self.synced_store_generation, self.index.generation())
            }
            None => false,
        };
        let count = range.end - range.start;
        match self.filter.as_ref() {
            None => self.index.insert_rows(range.start, count, true),
            Some(filter) => {
                self.index.insert_rows(range.start, count, false);
                if self.config.filter_live_rows {
                    for seq in range.clone() {
                        let record = match self.store.get(seq) {
                            Some(record) => record,
                            None => continue,
                        };
                        // an evaluation error hides the row
                        if let Ok(true) = self.evaluator.matches(filter, record) {
                            self.index.set_at(seq, true);
                        }
                    }
                }
            }
        }
        if cursor_current {
            if let Some(cursor) = self.cursor.as_mut() {
                cursor.extend(&mut self.evaluator, &self.store, &self.index, range);
            }
        } else if self.cursor.is_some() {
            defo!("cursor is stale; dropped");
            self.cursor = None;
        }
        self.synced_store_generation = self.store.generation();
        defx!("{} visible", self.index.visible_row_count());
    }

    /// Append live `records` to the store and fold them in.
    pub fn append_live(
        &mut self,
        records: Vec<LogRecord>,
        transform: Option<&mut dyn RecordTransform>,
    ) -> Option<SeqRange> {
        let range = self.store.append_live(records, transform)?;
        self.on_rows_inserted(range.clone());

        Some(range)
    }

    /// Append every record queued by `ingestor`.
    pub fn drain_ingestor(
        &mut self,
        ingestor: &StreamIngestor,
        transform: Option<&mut dyn RecordTransform>,
    ) -> Option<SeqRange> {
        let range = ingestor.drain_into(&mut self.store, transform)?;
        self.on_rows_inserted(range.clone());

        Some(range)
    }

    /// Refuse to write without a transform if the store requires one.
    fn check_transform(
        &self,
        transform: &Option<&mut dyn RecordTransform>,
    ) -> Result<()> {
        if self.store.requires_transform() && transform.is_none() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "data was loaded with a required transform; a transform is required to write it",
            ));
        }

        Ok(())
    }

    /// Write the visible records as a rawlog. Hidden records are skipped
    /// before `transform` sees them.
    pub fn store_visible_to_stream<W: Write>(
        &self,
        writer: W,
        compressed: bool,
        on_progress: Option<&mut ProgressFn>,
        mut transform: Option<&mut dyn RecordTransform>,
    ) -> Result<Completion> {
        self.check_transform(&transform)?;
        let index = &self.index;
        let mut visible_only = |record: LogRecord| -> Transformed {
            if !index.is_visible(record.seq()) {
                return Transformed::Drop;
            }
            match transform.as_mut() {
                Some(transform_) => transform_.transform(record),
                None => Transformed::Keep(record),
            }
        };

        self.store
            .store_to_stream(writer, compressed, on_progress, Some(&mut visible_only))
    }

    /// Write the visible records as text lines made by `formatter`.
    pub fn export_visible_to_stream<W, F>(
        &self,
        writer: W,
        compressed: bool,
        formatter: F,
        on_progress: Option<&mut ProgressFn>,
        mut transform: Option<&mut dyn RecordTransform>,
    ) -> Result<Completion>
    where
        W: Write,
        F: FnMut(&LogRecord) -> String,
    {
        self.check_transform(&transform)?;
        let index = &self.index;
        let mut visible_only = |record: LogRecord| -> Transformed {
            if !index.is_visible(record.seq()) {
                return Transformed::Drop;
            }
            match transform.as_mut() {
                Some(transform_) => transform_.transform(record),
                None => Transformed::Keep(record),
            }
        };

        self.store
            .export_to_stream(writer, compressed, formatter, on_progress, Some(&mut visible_only))
    }

    /// Field paths for query autocompletion.
    pub fn completion_candidates(&self) -> Vec<String> {
        self.store.completion_candidates(None)
    }
}
