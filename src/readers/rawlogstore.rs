// src/readers/rawlogstore.rs

//! Implements a [`RawlogStore`], the owner of every [`LogRecord`] of one
//! open rawlog.
//!
//! A `RawlogStore` loads records from a rawlog byte stream (optionally gzip
//! compressed), writes them back out as a rawlog or as text lines, and
//! accepts live-appended records from a [`StreamIngestor`].
//!
//! Records are appended in order and their [`SeqIndex`] is their position
//! at append time. Records are only ever removed all at once, by
//! [`clear`] or by a new load.
//!
//! Bulk operations poll an optional progress callback after every record
//! and pass every record through an optional [`RecordTransform`]. Either may
//! ask to stop, which is reported as [`Completion::Aborted`]; an aborted or
//! failed load leaves the store empty.
//!
//! [`StreamIngestor`]: crate::readers::streamingestor::StreamIngestor
//! [`SeqIndex`]: crate::common::SeqIndex
//! [`clear`]: RawlogStore::clear

use crate::common::{
    Completion,
    Count,
    File,
    FileOffset,
    FileSz,
    Generation,
    Path,
    Progress,
    ProgressFn,
    ResultS3,
    SeqIndex,
    SeqRange,
    GZ_MAGIC,
};
use crate::config::RawlogConfig;
use crate::data::framing::{write_record, Decoded, FrameDecoder};
use crate::data::record::LogRecord;
#[allow(unused_imports)]
use crate::{de_err, de_wrn, e_err, e_wrn};

use std::fmt;
use std::io::{BufReader, BufWriter, Error, ErrorKind, Read, Result, Seek, SeekFrom, Write};
use std::sync::Arc;

use ::flate2::read::GzDecoder;
use ::flate2::write::GzEncoder;
use ::flate2::Compression;
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// transforms
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of a [`RecordTransform`].
#[derive(Debug, PartialEq)]
pub enum Transformed {
    /// Use this record, possibly modified.
    Keep(LogRecord),
    /// Skip this record.
    Drop,
    /// Stop the whole operation.
    Abort,
}

/// Per-record hook of bulk store operations.
///
/// Any `FnMut(LogRecord) -> Transformed` is a `RecordTransform`.
pub trait RecordTransform {
    fn transform(
        &mut self,
        record: LogRecord,
    ) -> Transformed;

    /// `true` if data loaded through this transform must not be stored or
    /// exported without a transform, e.g. a decryption on load that must be
    /// paired with an encryption on store.
    fn requires_symmetric(&self) -> bool {
        false
    }
}

impl<F> RecordTransform for F
where
    F: FnMut(LogRecord) -> Transformed,
{
    fn transform(
        &mut self,
        record: LogRecord,
    ) -> Transformed {
        self(record)
    }
}

/// Wraps a transform function and marks it as requiring a symmetric
/// transform on store and export.
pub struct RequiredTransform<F>(pub F);

impl<F> RecordTransform for RequiredTransform<F>
where
    F: FnMut(LogRecord) -> Transformed,
{
    fn transform(
        &mut self,
        record: LogRecord,
    ) -> Transformed {
        (self.0)(record)
    }

    fn requires_symmetric(&self) -> bool {
        true
    }
}

fn apply_transform(
    transform: &mut Option<&mut dyn RecordTransform>,
    record: LogRecord,
) -> Transformed {
    match transform {
        Some(transform_) => transform_.transform(record),
        None => Transformed::Keep(record),
    }
}

fn poll_progress(
    on_progress: &mut Option<&mut ProgressFn>,
    done: u64,
    total: u64,
) -> Progress {
    match on_progress {
        Some(on_progress_) => on_progress_(done, total),
        None => Progress::Continue,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RawlogStore
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of appending one record through a transform.
enum Pushed {
    Kept,
    Dropped,
    Aborted,
}

/// Observer of appended rows, called with the half-open range of new
/// sequence indices.
pub type RowsInsertedFn = Box<dyn FnMut(&SeqRange)>;

/// Statistics about a [`RawlogStore`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SummaryRawlogStore {
    /// real records appended by the most recent load
    pub records_loaded: Count,
    /// synthesized diagnostic records appended by the most recent load
    pub virtual_records: Count,
    /// legacy zero-length markers skipped
    pub zero_len_markers: Count,
    /// frames whose payload was not a JSON object
    pub lost: Count,
    /// corrupted regions skipped
    pub resyncs: Count,
    pub bytes_skipped: Count,
    /// records a transform dropped
    pub dropped: Count,
    /// records appended by `append_live`
    pub live_appended: Count,
    /// the stream was gzip compressed
    pub gz: bool,
    /// uncompressed size of the most recent load; an estimate if `gz`
    pub bytes_total: FileSz,
}

/// Owns the records of one rawlog.
pub struct RawlogStore {
    config: Arc<RawlogConfig>,
    records: Vec<LogRecord>,
    /// incremented on every clear, load and append
    generation: Generation,
    /// data was loaded through a transform that requires a symmetric one
    requires_transform: bool,
    summary: SummaryRawlogStore,
    rows_inserted: Option<RowsInsertedFn>,
}

impl fmt::Debug for RawlogStore {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("RawlogStore")
            .field("records", &self.records.len())
            .field("generation", &self.generation)
            .field("requires_transform", &self.requires_transform)
            .field("summary", &self.summary)
            .finish()
    }
}

impl RawlogStore {
    pub fn new(config: Arc<RawlogConfig>) -> RawlogStore {
        defñ!();

        RawlogStore {
            config,
            records: Vec::new(),
            generation: 0,
            requires_transform: false,
            summary: SummaryRawlogStore::default(),
            rows_inserted: None,
        }
    }

    pub fn config(&self) -> &Arc<RawlogConfig> {
        &self.config
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(
        &self,
        seq: SeqIndex,
    ) -> Option<&LogRecord> {
        self.records.get(seq)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[LogRecord] {
        self.records.as_slice()
    }

    /// Incremented on every clear, load and append.
    #[inline(always)]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn summary(&self) -> SummaryRawlogStore {
        self.summary
    }

    /// `true` if the data was loaded through a transform that requires a
    /// transform for [`store_to_stream`] and [`export_to_stream`].
    ///
    /// [`store_to_stream`]: RawlogStore::store_to_stream
    /// [`export_to_stream`]: RawlogStore::export_to_stream
    pub fn requires_transform(&self) -> bool {
        self.requires_transform
    }

    /// Set the observer called after every batch append or load with the
    /// range of new sequence indices.
    pub fn set_rows_inserted_callback(
        &mut self,
        callback: Option<RowsInsertedFn>,
    ) {
        self.rows_inserted = callback;
    }

    fn fire_rows_inserted(
        &mut self,
        range: &SeqRange,
    ) {
        if let Some(callback) = self.rows_inserted.as_mut() {
            defo!("rows inserted {:?}", range);
            callback(range);
        }
    }

    /// Remove every record.
    pub fn clear(&mut self) {
        defñ!("clear {} records", self.records.len());
        self.records.clear();
        self.records.shrink_to_fit();
        self.requires_transform = false;
        self.summary = SummaryRawlogStore::default();
        self.generation += 1;
    }

    /// Append `record` with the next sequence index, through `transform`.
    fn push_transformed(
        &mut self,
        mut record: LogRecord,
        transform: &mut Option<&mut dyn RecordTransform>,
    ) -> Pushed {
        let seq: SeqIndex = self.records.len();
        record.set_seq(seq);
        match apply_transform(transform, record) {
            Transformed::Keep(mut record_) => {
                record_.set_seq(seq);
                self.records.push(record_);
                Pushed::Kept
            }
            Transformed::Drop => {
                self.summary.dropped += 1;
                Pushed::Dropped
            }
            Transformed::Abort => Pushed::Aborted,
        }
    }

    /// Read the 2 magic bytes at the current position, then seek back.
    fn peek_gz_magic<R: Read + Seek>(stream: &mut R) -> Result<bool> {
        let pos = stream.stream_position()?;
        let mut magic: [u8; 2] = [0; 2];
        let mut read: usize = 0;
        while read < magic.len() {
            match stream.read(&mut magic[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        stream.seek(SeekFrom::Start(pos))?;

        Ok(read == magic.len() && magic == GZ_MAGIC)
    }

    /// Size estimate of the stream from the current position, for progress.
    /// For gzip, the ISIZE field of the trailer (uncompressed size modulo
    /// `2^32`); else the remaining raw size.
    fn size_estimate<R: Read + Seek>(
        stream: &mut R,
        gz: bool,
    ) -> Result<FileSz> {
        let pos = stream.stream_position()?;
        let end = stream.seek(SeekFrom::End(0))?;
        let mut size: FileSz = end.saturating_sub(pos);
        if gz && size >= 18 {
            stream.seek(SeekFrom::End(-4))?;
            let mut buffer_size: [u8; 4] = [0; 4];
            stream.read_exact(&mut buffer_size)?;
            size = u32::from_le_bytes(buffer_size) as FileSz;
            defo!("gzip ISIZE {0} (0x{0:08X})", size);
        }
        stream.seek(SeekFrom::Start(pos))?;

        Ok(size)
    }

    /// Replace the contents of the store with the records of the rawlog
    /// `stream`, read from its current position. Gzip compression is
    /// detected.
    ///
    /// `on_progress(bytes_read, bytes_total)` is polled after every record.
    /// Every record, with its sequence index set, passes through
    /// `transform` before being appended.
    ///
    /// On `Aborted` or `Err` the store is left empty.
    pub fn load_from_stream<R: Read + Seek>(
        &mut self,
        mut stream: R,
        mut on_progress: Option<&mut ProgressFn>,
        mut transform: Option<&mut dyn RecordTransform>,
    ) -> Result<Completion> {
        defn!();
        self.clear();
        let gz: bool = Self::peek_gz_magic(&mut stream)?;
        let total: FileSz = Self::size_estimate(&mut stream, gz)?;
        defo!("gz {}, total {}", gz, total);
        let reader: Box<dyn Read + '_> = match gz {
            true => Box::new(GzDecoder::new(stream)),
            false => Box::new(stream),
        };
        let mut decoder = FrameDecoder::new(reader, self.config.max_record_len);
        let level_corruption: i64 = self.config.level_or_zero(&["WARNING", "WARN"]);
        let mut records_loaded: Count = 0;
        let mut virtual_records: Count = 0;

        loop {
            let record: Option<LogRecord> = match decoder.decode() {
                ResultS3::Found(Decoded::Record(fields)) => Some(LogRecord::new(fields)),
                ResultS3::Found(Decoded::Corruption { skipped, offset }) => {
                    Some(LogRecord::new_corruption(level_corruption, skipped, offset))
                }
                ResultS3::Found(Decoded::Lost { offset: _offset, len: _len }) => {
                    defo!("lost record of {} bytes at offset {}", _len, _offset);
                    None
                }
                ResultS3::Done => break,
                ResultS3::Err(err) => {
                    e_err!("{}", err);
                    self.clear();
                    defx!("return Err({})", err);
                    return Err(err);
                }
            };
            if let Some(record) = record {
                let is_virtual = record.is_virtual();
                match self.push_transformed(record, &mut transform) {
                    Pushed::Aborted => {
                        self.clear();
                        defx!("transform aborted");
                        return Ok(Completion::Aborted);
                    }
                    Pushed::Kept if is_virtual => virtual_records += 1,
                    Pushed::Kept => records_loaded += 1,
                    Pushed::Dropped => {}
                }
            }
            let done: FileOffset = decoder.offset();
            if poll_progress(&mut on_progress, done, std::cmp::max(done, total)) == Progress::Abort {
                self.clear();
                defx!("progress aborted");
                return Ok(Completion::Aborted);
            }
        }

        let summary_decoder = decoder.summary();
        self.summary.records_loaded = records_loaded;
        self.summary.virtual_records = virtual_records;
        self.summary.zero_len_markers = summary_decoder.zero_len_markers;
        self.summary.lost = summary_decoder.lost;
        self.summary.resyncs = summary_decoder.resyncs;
        self.summary.bytes_skipped = summary_decoder.bytes_skipped;
        self.summary.gz = gz;
        self.summary.bytes_total = total;
        self.requires_transform = match transform.as_ref() {
            Some(transform_) => transform_.requires_symmetric(),
            None => false,
        };
        self.generation += 1;
        let range: SeqRange = 0..self.records.len();
        if !range.is_empty() {
            self.fire_rows_inserted(&range);
        }
        defx!("loaded {} records; {:?}", self.records.len(), self.summary);

        Ok(Completion::Done)
    }

    /// Load the rawlog file at `path`. Anything but a regular file is
    /// refused with `InvalidInput`.
    pub fn load_path(
        &mut self,
        path: &Path,
        on_progress: Option<&mut ProgressFn>,
        transform: Option<&mut dyn RecordTransform>,
    ) -> Result<Completion> {
        defn!("({:?})", path);
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            self.clear();
            defx!("not a regular file");
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("unsupported input {:?}: not a regular file", path),
            ));
        }
        let file = File::open(path)?;
        let result = self.load_from_stream(BufReader::new(file), on_progress, transform);
        defx!("{:?}", result);

        result
    }

    /// Refuse a store or export without a transform if the data was loaded
    /// with one that requires it.
    fn check_symmetric(
        &self,
        transform: &Option<&mut dyn RecordTransform>,
    ) -> Result<()> {
        if self.requires_transform && transform.is_none() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "data was loaded with a required transform; a transform is required to write it",
            ));
        }

        Ok(())
    }

    /// Pass every record through `transform` and `emit` the kept ones.
    /// Virtual records are skipped unless `with_virtual`.
    fn write_each<W, F>(
        &self,
        writer: &mut W,
        with_virtual: bool,
        on_progress: &mut Option<&mut ProgressFn>,
        transform: &mut Option<&mut dyn RecordTransform>,
        mut emit: F,
    ) -> Result<Completion>
    where
        W: Write + ?Sized,
        F: FnMut(&mut W, &LogRecord) -> Result<()>,
    {
        let total: u64 = self.records.len() as u64;
        for (i, record) in self.records.iter().enumerate() {
            if with_virtual || !record.is_virtual() {
                match apply_transform(transform, record.clone()) {
                    Transformed::Keep(record_) => emit(&mut *writer, &record_)?,
                    Transformed::Drop => {}
                    Transformed::Abort => {
                        defo!("transform aborted at {}", i);
                        return Ok(Completion::Aborted);
                    }
                }
            }
            if poll_progress(on_progress, i as u64 + 1, total) == Progress::Abort {
                defo!("progress aborted at {}", i);
                return Ok(Completion::Aborted);
            }
        }
        writer.flush()?;

        Ok(Completion::Done)
    }

    /// Write `writer` through an optional gzip encoder.
    fn write_maybe_gz<W, F>(
        writer: W,
        compressed: bool,
        mut write: F,
    ) -> Result<Completion>
    where
        W: Write,
        F: FnMut(&mut dyn Write) -> Result<Completion>,
    {
        let mut writer = BufWriter::new(writer);
        if compressed {
            let mut encoder = GzEncoder::new(&mut writer, Compression::default());
            let encoder_: &mut dyn Write = &mut encoder;
            let completion = write(encoder_)?;
            encoder.finish()?;
            writer.flush()?;
            return Ok(completion);
        }
        let writer_: &mut dyn Write = &mut writer;
        let completion = write(writer_)?;
        writer.flush()?;

        Ok(completion)
    }

    /// Write every real record as a rawlog frame, gzip compressed if
    /// `compressed`. Records `transform` drops are skipped.
    ///
    /// On `Aborted` the output is incomplete.
    pub fn store_to_stream<W: Write>(
        &self,
        writer: W,
        compressed: bool,
        mut on_progress: Option<&mut ProgressFn>,
        mut transform: Option<&mut dyn RecordTransform>,
    ) -> Result<Completion> {
        defn!("(compressed {})", compressed);
        self.check_symmetric(&transform)?;
        let max_len = self.config.max_record_len;
        let result = Self::write_maybe_gz(writer, compressed, |w| {
            self.write_each(w, false, &mut on_progress, &mut transform, |w_, record| {
                write_record(w_, record.fields(), max_len)?;
                Ok(())
            })
        });
        defx!("{:?}", result);

        result
    }

    /// Write every record as one line of text made by `formatter`, gzip
    /// compressed if `compressed`. Virtual records are included.
    pub fn export_to_stream<W, F>(
        &self,
        writer: W,
        compressed: bool,
        mut formatter: F,
        mut on_progress: Option<&mut ProgressFn>,
        mut transform: Option<&mut dyn RecordTransform>,
    ) -> Result<Completion>
    where
        W: Write,
        F: FnMut(&LogRecord) -> String,
    {
        defn!("(compressed {})", compressed);
        self.check_symmetric(&transform)?;
        let result = Self::write_maybe_gz(writer, compressed, |w| {
            self.write_each(w, true, &mut on_progress, &mut transform, |w_, record| {
                let line = formatter(record);
                w_.write_all(line.as_bytes())?;
                w_.write_all(b"\n")?;
                Ok(())
            })
        });
        defx!("{:?}", result);

        result
    }

    /// Append `records` as they arrive from a live source. Each record is
    /// given the next sequence index and passed through `transform`.
    /// A transform `Abort` drops the rest of the batch.
    ///
    /// Returns the range of appended sequence indices, `None` if nothing was
    /// appended.
    pub fn append_live(
        &mut self,
        records: Vec<LogRecord>,
        mut transform: Option<&mut dyn RecordTransform>,
    ) -> Option<SeqRange> {
        defn!("({} records)", records.len());
        let start: SeqIndex = self.records.len();
        for record in records.into_iter() {
            if let Pushed::Aborted = self.push_transformed(record, &mut transform) {
                defo!("transform aborted; rest of batch dropped");
                break;
            }
        }
        let end: SeqIndex = self.records.len();
        if start == end {
            defx!("nothing appended");
            return None;
        }
        self.summary.live_appended += (end - start) as Count;
        self.generation += 1;
        let range: SeqRange = start..end;
        self.fire_rows_inserted(&range);
        defx!("appended {:?}", range);

        Some(range)
    }

    /// Every field path of the first record, after `transform`, for query
    /// autocompletion.
    pub fn completion_candidates(
        &self,
        mut transform: Option<&mut dyn RecordTransform>,
    ) -> Vec<String> {
        let record = match self.records.first() {
            Some(record) => record.clone(),
            None => return Vec::new(),
        };
        match apply_transform(&mut transform, record) {
            Transformed::Keep(record_) => record_.field_paths(),
            Transformed::Drop | Transformed::Abort => Vec::new(),
        }
    }
}
