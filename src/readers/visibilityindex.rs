// src/readers/visibilityindex.rs

//! Implements a [`VisibilityIndex`], the translation between the dense
//! "visible row" space seen by a user and the [`SeqIndex`] space of a
//! [`RawlogStore`].
//!
//! Visibility is stored sparsely: a [`RangeMap`] holds only the ranges whose
//! visibility differs from the default value. A filter that hides nearly
//! everything or nearly nothing costs a handful of ranges.
//!
//! Both translation directions are memoized:
//!
//! - row → sequence index uses a `Vec` of the visible sequence indices, built
//!   lazily and tagged with the [`Generation`] it was built at.
//! - sequence index → row uses a binary search over that `Vec`, fronted by
//!   an [`LruCache`] that is also tagged with a `Generation`.
//!
//! Every mutation increments the generation first, so no reader can observe
//! a translation computed before the mutation.
//!
//! A hidden sequence index maps to the nearest preceding visible row (or
//! `None` if no visible row precedes it). The plain count of visible rows
//! before an index is available from [`count_visible_before`].
//!
//! [`RangeMap`]: rangemap::RangeMap
//! [`LruCache`]: lru::LruCache
//! [`RawlogStore`]: crate::readers::rawlogstore::RawlogStore
//! [`SeqIndex`]: crate::common::SeqIndex
//! [`Generation`]: crate::common::Generation
//! [`count_visible_before`]: VisibilityIndex::count_visible_before

use crate::common::{Generation, RowIndex, SeqIndex, SeqRange};
use crate::config::RawlogConfig;
#[allow(unused_imports)]
use crate::debug::printers::{de_err, de_wrn};

use std::fmt;
use std::num::NonZeroUsize;

use ::lru::LruCache;
use ::more_asserts::debug_assert_le;
use ::rangemap::RangeMap;
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

type SeqToRowLRUCache = LruCache<SeqIndex, Option<RowIndex>>;

/// Maps sequence indices `0..len` to a visibility flag and translates
/// between sequence indices and visible rows.
pub struct VisibilityIndex {
    /// ranges whose value differs from `default_visible`
    explicit: RangeMap<SeqIndex, bool>,
    default_visible: bool,
    /// size of the sequence index domain
    len: usize,
    /// count of visible indices in `0..len`, kept current on every mutation
    visible_count: usize,
    /// incremented on every mutation
    generation: Generation,
    /// sorted visible sequence indices; valid if `rows_generation == Some(generation)`
    rows: Vec<SeqIndex>,
    rows_generation: Option<Generation>,
    seq_to_row_lru: SeqToRowLRUCache,
    seq_to_row_lru_generation: Generation,
    pub(crate) _rows_rebuild: usize,
    pub(crate) _seq_to_row_lru_hit: usize,
    pub(crate) _seq_to_row_lru_miss: usize,
}

impl fmt::Debug for VisibilityIndex {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("VisibilityIndex")
            .field("len", &self.len)
            .field("default_visible", &self.default_visible)
            .field("visible_count", &self.visible_count)
            .field("explicit ranges", &self.explicit.iter().count())
            .field("generation", &self.generation)
            .field("rows_generation", &self.rows_generation)
            .field("rows rebuild", &self._rows_rebuild)
            .field("seq→row LRU hit", &self._seq_to_row_lru_hit)
            .field("miss", &self._seq_to_row_lru_miss)
            .finish()
    }
}

impl VisibilityIndex {
    /// Create an index over `len` sequence indices, all of them visible if
    /// `default_visible`, else all hidden.
    pub fn new(
        len: usize,
        default_visible: bool,
        config: &RawlogConfig,
    ) -> VisibilityIndex {
        defñ!("({}, {})", len, default_visible);
        let cap = NonZeroUsize::new(config.visibility_cache_sz).unwrap_or(NonZeroUsize::MIN);

        VisibilityIndex {
            explicit: RangeMap::new(),
            default_visible,
            len,
            visible_count: if default_visible { len } else { 0 },
            generation: 0,
            rows: Vec::new(),
            rows_generation: None,
            seq_to_row_lru: SeqToRowLRUCache::new(cap),
            seq_to_row_lru_generation: 0,
            _rows_rebuild: 0,
            _seq_to_row_lru_hit: 0,
            _seq_to_row_lru_miss: 0,
        }
    }

    /// Size of the sequence index domain.
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline(always)]
    pub const fn default_visible(&self) -> bool {
        self.default_visible
    }

    /// Incremented by every mutation.
    #[inline(always)]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Count of visible sequence indices.
    #[inline(always)]
    pub const fn visible_row_count(&self) -> usize {
        self.visible_count
    }

    /// Invalidate every memoized translation.
    fn bump_generation(&mut self) {
        self.generation += 1;
        defo!("generation {}", self.generation);
    }

    pub fn is_visible(
        &self,
        index: SeqIndex,
    ) -> bool {
        if index >= self.len {
            return false;
        }
        match self.explicit.get(&index) {
            Some(value) => *value,
            None => self.default_visible,
        }
    }

    /// Count of visible indices within `range`, which must lie in `0..len`.
    fn count_visible_in(
        &self,
        range: &SeqRange,
    ) -> usize {
        if range.start >= range.end {
            return 0;
        }
        let mut explicit_len: usize = 0;
        let mut explicit_true: usize = 0;
        for (r, value) in self.explicit.overlapping(range) {
            let start = std::cmp::max(r.start, range.start);
            let end = std::cmp::min(r.end, range.end);
            explicit_len += end - start;
            if *value {
                explicit_true += end - start;
            }
        }
        let gaps = (range.end - range.start) - explicit_len;

        explicit_true + if self.default_visible { gaps } else { 0 }
    }

    /// Count of visible indices strictly before `index`.
    pub fn count_visible_before(
        &self,
        index: SeqIndex,
    ) -> usize {
        let end = std::cmp::min(index, self.len);

        self.count_visible_in(&(0..end))
    }

    fn clamp(
        &self,
        range: SeqRange,
    ) -> SeqRange {
        let end = std::cmp::min(range.end, self.len);
        let start = std::cmp::min(range.start, end);

        start..end
    }

    /// Set the visibility of every index in `range`.
    /// The part of `range` beyond `len` is ignored.
    pub fn set_range(
        &mut self,
        range: SeqRange,
        value: bool,
    ) {
        defn!("({:?}, {})", range, value);
        if range.end > self.len {
            de_wrn!("range {:?} exceeds len {}; clamped", range, self.len);
        }
        let range = self.clamp(range);
        if range.is_empty() {
            defx!("empty range");
            return;
        }
        self.bump_generation();
        let before = self.count_visible_in(&range);
        let after = if value { range.end - range.start } else { 0 };
        if value == self.default_visible {
            self.explicit.remove(range);
        } else {
            self.explicit.insert(range, value);
        }
        self.visible_count = self.visible_count - before + after;
        debug_assert_le!(self.visible_count, self.len);
        defx!("visible_count {}", self.visible_count);
    }

    pub fn set_visible(
        &mut self,
        range: SeqRange,
    ) {
        self.set_range(range, true)
    }

    pub fn set_hidden(
        &mut self,
        range: SeqRange,
    ) {
        self.set_range(range, false)
    }

    pub fn set_at(
        &mut self,
        index: SeqIndex,
        value: bool,
    ) {
        self.set_range(index..index.saturating_add(1), value)
    }

    /// Forget every explicit value; all indices take `default_visible`.
    pub fn clear(
        &mut self,
        default_visible: bool,
    ) {
        defñ!("({})", default_visible);
        self.bump_generation();
        self.explicit = RangeMap::new();
        self.default_visible = default_visible;
        self.visible_count = if default_visible { self.len } else { 0 };
    }

    /// Like [`clear`] but also resize the domain to `len`.
    ///
    /// [`clear`]: VisibilityIndex::clear
    pub fn reset(
        &mut self,
        len: usize,
        default_visible: bool,
    ) {
        defñ!("({}, {})", len, default_visible);
        self.len = len;
        self.clear(default_visible);
    }

    /// Insert `count` indices at `start` with visibility `value`; indices at
    /// or after `start` shift up by `count` keeping their visibility.
    /// A `start` beyond `len` is treated as `len`.
    pub fn insert_rows(
        &mut self,
        start: SeqIndex,
        count: usize,
        value: bool,
    ) {
        defn!("({}, {}, {})", start, count, value);
        if count == 0 {
            defx!("nothing to insert");
            return;
        }
        let start = std::cmp::min(start, self.len);
        let appending = start == self.len;
        let rows_valid = self.rows_generation == Some(self.generation);
        self.bump_generation();

        if !appending {
            let mut shifted: RangeMap<SeqIndex, bool> = RangeMap::new();
            for (r, v) in self.explicit.iter() {
                if r.end <= start {
                    shifted.insert(r.clone(), *v);
                } else if r.start >= start {
                    shifted.insert(r.start + count..r.end + count, *v);
                } else {
                    shifted.insert(r.start..start, *v);
                    shifted.insert(start + count..r.end + count, *v);
                }
            }
            self.explicit = shifted;
        }
        if value != self.default_visible {
            self.explicit.insert(start..start + count, value);
        }
        self.len += count;
        if value {
            self.visible_count += count;
        }

        // appending leaves every existing row in place, extend the cached rows
        if appending && rows_valid {
            if value {
                self.rows.extend(start..start + count);
            }
            self.rows_generation = Some(self.generation);
            defo!("extended cached rows to {}", self.rows.len());
        }
        defx!("len {}, visible_count {}", self.len, self.visible_count);
    }

    /// Remove indices `start..end`; indices at or after `end` shift down.
    pub fn remove_rows(
        &mut self,
        start: SeqIndex,
        end: SeqIndex,
    ) {
        defn!("({}, {})", start, end);
        let range = self.clamp(start..end);
        if range.is_empty() {
            defx!("nothing to remove");
            return;
        }
        self.bump_generation();
        let count = range.end - range.start;
        let removed_visible = self.count_visible_in(&range);
        let mut shifted: RangeMap<SeqIndex, bool> = RangeMap::new();
        for (r, v) in self.explicit.iter() {
            if r.end <= range.start {
                shifted.insert(r.clone(), *v);
            } else if r.start >= range.end {
                shifted.insert(r.start - count..r.end - count, *v);
            } else {
                // overlaps the removed range; keep the parts outside of it
                if r.start < range.start {
                    shifted.insert(r.start..range.start, *v);
                }
                if r.end > range.end {
                    shifted.insert(range.start..r.end - count, *v);
                }
            }
        }
        self.explicit = shifted;
        self.len -= count;
        self.visible_count -= removed_visible;
        defx!("len {}, visible_count {}", self.len, self.visible_count);
    }

    /// Rebuild `rows` if a mutation happened since it was built.
    fn ensure_rows(&mut self) {
        if self.rows_generation == Some(self.generation) {
            return;
        }
        defn!("rebuild at generation {}", self.generation);
        self._rows_rebuild += 1;
        let mut rows: Vec<SeqIndex> = Vec::with_capacity(self.visible_count);
        let mut at: SeqIndex = 0;
        for (r, value) in self.explicit.overlapping(&(0..self.len)) {
            let start = std::cmp::max(r.start, at);
            let end = std::cmp::min(r.end, self.len);
            if self.default_visible {
                rows.extend(at..start);
            }
            if *value {
                rows.extend(start..end);
            }
            at = end;
        }
        if self.default_visible {
            rows.extend(at..self.len);
        }
        debug_assert_eq!(rows.len(), self.visible_count, "visible rows disagree with visible_count");
        self.rows = rows;
        self.rows_generation = Some(self.generation);
        defx!("{} rows", self.rows.len());
    }

    /// The visible sequence indices, in order.
    pub fn visible_sequence_indices(&mut self) -> &[SeqIndex] {
        self.ensure_rows();

        self.rows.as_slice()
    }

    /// Sequence index of the `row`-th visible record, or `None` if
    /// `row >= visible_row_count()`.
    pub fn row_to_sequence_index(
        &mut self,
        row: RowIndex,
    ) -> Option<SeqIndex> {
        if row >= self.visible_count {
            return None;
        }
        self.ensure_rows();

        self.rows.get(row).copied()
    }

    /// Row of `index` if visible, else the nearest preceding visible row.
    /// `None` if no visible row is at or before `index`, or if `index` is
    /// not less than `len`.
    pub fn sequence_index_to_row(
        &mut self,
        index: SeqIndex,
    ) -> Option<RowIndex> {
        if index >= self.len {
            return None;
        }
        if self.seq_to_row_lru_generation != self.generation {
            self.seq_to_row_lru.clear();
            self.seq_to_row_lru_generation = self.generation;
        }
        if let Some(row) = self.seq_to_row_lru.get(&index) {
            self._seq_to_row_lru_hit += 1;
            return *row;
        }
        self._seq_to_row_lru_miss += 1;
        self.ensure_rows();
        let before: usize = self.rows.partition_point(|seq| *seq < index);
        let row: Option<RowIndex> = match self.rows.get(before) {
            Some(seq) if *seq == index => Some(before),
            _ => before.checked_sub(1),
        };
        self.seq_to_row_lru.put(index, row);

        row
    }
}
