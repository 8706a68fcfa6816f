// src/readers/searchcursor.rs

//! Implements a [`SearchCursor`], a wrapping forward/backward navigator over
//! the visible records matching a query.
//!
//! The result list is computed once, at construction, from the records
//! visible in a [`VisibilityIndex`]. A cursor is bound to the query text,
//! the [`RawlogStore`] generation and the `VisibilityIndex` generation it was
//! built against; when any of those change the caller builds a new cursor
//! (see [`SearchCursor::is_reusable`]). Appended rows may be folded in with
//! [`SearchCursor::extend`].
//!
//! Traversal from a start index:
//!
//! - the first [`next`] returns the first match after the start index,
//!   wrapping to the first match overall,
//! - the first [`previous`] returns the first match before the start index,
//!   wrapping to the last match overall,
//! - the _anchor_ is the first match at-or-after (for `next`) or
//!   at-or-before (for `previous`) the start index. Landing on the anchor a
//!   second time means the traversal completed a full loop and the status
//!   becomes [`QueryStatus::EofReached`]. A start index that is itself a
//!   match counts as the first landing.
//!
//! For matches `[2, 5, 9]` and start index `5`, calling `next` repeatedly
//! returns `9, 2, 5 (EofReached), 9, 2, 5 (EofReached), …`.
//!
//! [`RawlogStore`]: crate::readers::rawlogstore::RawlogStore
//! [`next`]: SearchCursor::next
//! [`previous`]: SearchCursor::previous

use crate::common::{Generation, SeqIndex, SeqRange};
use crate::query::{QueryError, QueryEvaluator, QueryStatus};
use crate::readers::rawlogstore::RawlogStore;
use crate::readers::visibilityindex::VisibilityIndex;

use std::fmt;

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// Traversal direction of a [`SearchCursor`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Coarse state of a [`SearchCursor`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CursorState {
    /// The query text is blank.
    NoQuery,
    /// There are results to traverse.
    Searching,
    /// No results, an error, or a full loop was just completed.
    Exhausted,
}

/// Wrapping navigator over matching visible records.
pub struct SearchCursor {
    query_text: String,
    status: QueryStatus,
    /// matching sequence indices in ascending order
    results: Vec<SeqIndex>,
    start_index: SeqIndex,
    /// offset into `results` of the current element
    position: Option<usize>,
    direction: Option<Direction>,
    /// offset into `results` of the traversal anchor
    anchor: usize,
    /// the anchor has been landed on during this traversal
    anchor_landed: bool,
    store_generation: Generation,
    index_generation: Generation,
}

impl fmt::Debug for SearchCursor {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("SearchCursor")
            .field("query_text", &self.query_text)
            .field("status", &self.status)
            .field("results", &self.results.len())
            .field("start_index", &self.start_index)
            .field("position", &self.position)
            .field("direction", &self.direction)
            .field("anchor", &self.anchor)
            .field("store_generation", &self.store_generation)
            .field("index_generation", &self.index_generation)
            .finish()
    }
}

impl SearchCursor {
    /// Compile `query_text` and collect every record visible in `index`
    /// that matches. Any compile or evaluation error stops the scan and
    /// leaves the cursor with no results and status
    /// [`QueryStatus::Error`].
    pub fn new(
        evaluator: &mut QueryEvaluator,
        store: &RawlogStore,
        index: &mut VisibilityIndex,
        query_text: &str,
        start_index: SeqIndex,
    ) -> SearchCursor {
        defn!("({:?}, {})", query_text, start_index);
        let mut cursor = SearchCursor {
            query_text: String::from(query_text),
            status: QueryStatus::Empty,
            results: Vec::new(),
            start_index,
            position: None,
            direction: None,
            anchor: 0,
            anchor_landed: false,
            store_generation: store.generation(),
            index_generation: index.generation(),
        };
        if query_text.trim().is_empty() {
            defx!("no query");
            return cursor;
        }
        let query = match evaluator.compile(query_text) {
            Ok(query) => query,
            Err(err) => {
                defx!("compile error {}", err);
                cursor.status = QueryStatus::Error(err);
                return cursor;
            }
        };
        let mut results: Vec<SeqIndex> = Vec::new();
        let mut error: Option<QueryError> = None;
        for seq in index.visible_sequence_indices().iter() {
            let record = match store.get(*seq) {
                Some(record) => record,
                None => continue,
            };
            match evaluator.matches(&query, record) {
                Ok(true) => results.push(*seq),
                Ok(false) => {}
                Err(err) => {
                    defo!("evaluation error at {}: {}", seq, err);
                    error = Some(err);
                    break;
                }
            }
        }
        match error {
            Some(err) => {
                cursor.status = QueryStatus::Error(err);
            }
            None => {
                cursor.results = results;
                cursor.status = if cursor.results.is_empty() {
                    QueryStatus::Empty
                } else {
                    QueryStatus::Ok
                };
            }
        }
        defx!("{} results, status {}", cursor.results.len(), cursor.status);

        cursor
    }

    pub fn query_text(&self) -> &str {
        self.query_text.as_str()
    }

    pub fn status(&self) -> &QueryStatus {
        &self.status
    }

    pub fn state(&self) -> CursorState {
        if self.query_text.trim().is_empty() {
            return CursorState::NoQuery;
        }
        match self.status {
            QueryStatus::Ok => CursorState::Searching,
            QueryStatus::Empty | QueryStatus::Error(_) | QueryStatus::EofReached => CursorState::Exhausted,
        }
    }

    /// Matching sequence indices in ascending order.
    pub fn results(&self) -> &[SeqIndex] {
        self.results.as_slice()
    }

    pub fn count(&self) -> usize {
        self.results.len()
    }

    pub fn start_index(&self) -> SeqIndex {
        self.start_index
    }

    /// The sequence index most recently returned by `next` or `previous`.
    pub fn current(&self) -> Option<SeqIndex> {
        self.position.and_then(|at| self.results.get(at).copied())
    }

    /// `true` if this cursor was built for `query_text` against the same
    /// store and visibility generations.
    pub fn is_reusable(
        &self,
        query_text: &str,
        store_generation: Generation,
        index_generation: Generation,
    ) -> bool {
        self.query_text == query_text
            && self.store_generation == store_generation
            && self.index_generation == index_generation
    }

    /// Restart traversal from `start_index`.
    pub fn reset_start(
        &mut self,
        start_index: SeqIndex,
    ) {
        defñ!("({})", start_index);
        self.start_index = start_index;
        self.position = None;
        self.direction = None;
        self.anchor_landed = false;
        if self.status == QueryStatus::EofReached {
            self.status = QueryStatus::Ok;
        }
    }

    /// Fold appended rows `range` into the results. `range` must lie after
    /// every record already scanned, as with rows appended to the store.
    pub fn extend(
        &mut self,
        evaluator: &mut QueryEvaluator,
        store: &RawlogStore,
        index: &VisibilityIndex,
        range: SeqRange,
    ) {
        defn!("({:?})", range);
        self.store_generation = store.generation();
        self.index_generation = index.generation();
        if self.status.is_error() || self.query_text.trim().is_empty() {
            defx!("nothing to extend");
            return;
        }
        let query = match evaluator.compile(&self.query_text) {
            Ok(query) => query,
            Err(err) => {
                self.status = QueryStatus::Error(err);
                defx!("compile error");
                return;
            }
        };
        for seq in range {
            if !index.is_visible(seq) {
                continue;
            }
            let record = match store.get(seq) {
                Some(record) => record,
                None => continue,
            };
            match evaluator.matches(&query, record) {
                Ok(true) => self.results.push(seq),
                Ok(false) => {}
                Err(err) => {
                    self.results.clear();
                    self.position = None;
                    self.status = QueryStatus::Error(err);
                    defx!("evaluation error at {}", seq);
                    return;
                }
            }
        }
        if self.status == QueryStatus::Empty && !self.results.is_empty() {
            self.status = QueryStatus::Ok;
        }
        defx!("{} results", self.results.len());
    }

    /// Offset of the first result matching `pred`, searching from the front.
    fn first_where<F>(
        &self,
        pred: F,
    ) -> Option<usize>
    where
        F: Fn(SeqIndex) -> bool,
    {
        self.results.iter().position(|seq| pred(*seq))
    }

    /// Offset of the last result matching `pred`, searching from the back.
    fn last_where<F>(
        &self,
        pred: F,
    ) -> Option<usize>
    where
        F: Fn(SeqIndex) -> bool,
    {
        self.results.iter().rposition(|seq| pred(*seq))
    }

    /// Move one result in `direction` and return it.
    fn step(
        &mut self,
        direction: Direction,
    ) -> Option<SeqIndex> {
        defn!("({:?})", direction);
        if self.results.is_empty() {
            defx!("no results, status {}", self.status);
            return None;
        }
        let last = self.results.len() - 1;
        let start = self.start_index;
        let at: usize = match (self.position, self.direction) {
            (None, _) => {
                let (at, anchor) = match direction {
                    Direction::Forward => (
                        self.first_where(|seq| seq > start).unwrap_or(0),
                        self.first_where(|seq| seq >= start).unwrap_or(0),
                    ),
                    Direction::Backward => (
                        self.last_where(|seq| seq < start).unwrap_or(last),
                        self.last_where(|seq| seq <= start).unwrap_or(last),
                    ),
                };
                self.anchor = anchor;
                self.anchor_landed = self.results[anchor] == start;
                at
            }
            (Some(position), Some(direction_)) if direction_ != direction => {
                // turning around; the traversal starts over from here
                self.anchor = position;
                self.anchor_landed = true;
                self.step_from(position, direction)
            }
            (Some(position), _) => self.step_from(position, direction),
        };
        self.position = Some(at);
        self.direction = Some(direction);
        if at == self.anchor {
            if self.anchor_landed {
                self.status = QueryStatus::EofReached;
            } else {
                self.anchor_landed = true;
                self.status = QueryStatus::Ok;
            }
        } else {
            self.status = QueryStatus::Ok;
        }
        let seq = self.results[at];
        defx!("return {}, status {}", seq, self.status);

        Some(seq)
    }

    fn step_from(
        &self,
        position: usize,
        direction: Direction,
    ) -> usize {
        let last = self.results.len() - 1;
        match direction {
            Direction::Forward if position >= last => 0,
            Direction::Forward => position + 1,
            Direction::Backward if position == 0 => last,
            Direction::Backward => position - 1,
        }
    }

    /// The next match, wrapping around. `None` if there are no results.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<SeqIndex> {
        self.step(Direction::Forward)
    }

    /// The previous match, wrapping around. `None` if there are no results.
    pub fn previous(&mut self) -> Option<SeqIndex> {
        self.step(Direction::Backward)
    }
}
