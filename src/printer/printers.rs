// src/printer/printers.rs

//! Specialized printer struct [`PrinterRecord`] for printing
//! [`LogRecord`s] as text lines, colored by level.
//!
//! [`LogRecord`s]: crate::data::record::LogRecord

use crate::config::RawlogConfig;
use crate::data::record::{LogRecord, FIELD_LEVEL};
use crate::debug::printers::de_err;
use crate::common::{RowIndex, SeqIndex};

use std::io::Result;

#[doc(hidden)]
pub use ::termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use ::serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// globals and constants
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// [`Color`] for printing prepended data like row numbers.
///
/// [`Color`]: https://docs.rs/termcolor/1.1.3/termcolor/enum.Color.html
pub const COLOR_DEFAULT: Color = Color::White;

/// [`Color`] for printing some user-facing error messages.
pub const COLOR_ERROR: Color = Color::Red;

/// [`Color`] of records at or above level `ERROR`.
pub const COLOR_LEVEL_ERROR: Color = Color::Red;

/// [`Color`] of records at or above level `WARNING`.
pub const COLOR_LEVEL_WARNING: Color = Color::Yellow;

/// [`Color`] of records at or below level `DEBUG`.
pub const COLOR_LEVEL_DEBUG: Color = Color::Rgb(127, 127, 127);

/// [`Color`] of synthesized diagnostic records.
pub const COLOR_VIRTUAL: Color = Color::Magenta;

/// Returned by the printing functions; the count of bytes printed.
pub type PrinterRecordResult = Result<usize>;

/// Macro that sets output color, only changed if needed.
///
/// Unnecessary changes to `set_color` may cause errant formatting bytes to
/// print to the terminal.
macro_rules! setcolor_or_return {
    ($writer:expr, $color_spec:expr, $color_spec_last:expr) => {
        if $color_spec != $color_spec_last {
            if let Err(err) = $writer.set_color(&$color_spec) {
                de_err!("{}.set_color({:?}) returned error {}", stringify!($writer), $color_spec, err);
                return PrinterRecordResult::Err(err);
            };
            $color_spec_last = $color_spec.clone();
        }
    };
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PrinterRecord
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A printer specialized for [`LogRecord`s].
///
/// [`LogRecord`s]: crate::data::record::LogRecord
pub struct PrinterRecord<W: WriteColor> {
    writer: W,
    /// should printing be in color?
    do_color: bool,
    /// color settings for prepended text
    color_spec_default: ColorSpec,
    color_spec_error: ColorSpec,
    color_spec_warning: ColorSpec,
    color_spec_debug: ColorSpec,
    color_spec_virtual: ColorSpec,
    /// records at or above this level use `color_spec_error`
    level_error: i64,
    level_warning: i64,
    level_debug: i64,
    /// should the row and sequence index be printed before each line?
    do_prepend_index: bool,
    /// last value passed to `self.writer.set_color()`
    ///
    /// used by macro `setcolor_or_return`
    color_spec_last: ColorSpec,
}

fn color_spec(color: Color) -> ColorSpec {
    let mut color_spec: ColorSpec = ColorSpec::new();
    color_spec.set_fg(Some(color));

    color_spec
}

impl PrinterRecord<StandardStream> {
    /// Create a new `PrinterRecord` for stdout.
    pub fn stdout(
        color_choice: ColorChoice,
        config: &RawlogConfig,
        do_prepend_index: bool,
    ) -> PrinterRecord<StandardStream> {
        let do_color: bool = match color_choice {
            ColorChoice::Never => false,
            ColorChoice::Always | ColorChoice::AlwaysAnsi | ColorChoice::Auto => true,
        };

        PrinterRecord::new(StandardStream::stdout(color_choice), do_color, config, do_prepend_index)
    }
}

impl<W: WriteColor> PrinterRecord<W> {
    /// Create a new `PrinterRecord` writing to `writer`.
    ///
    /// Level thresholds are looked up by name in `config`; a name that is
    /// not present disables that color.
    pub fn new(
        writer: W,
        do_color: bool,
        config: &RawlogConfig,
        do_prepend_index: bool,
    ) -> PrinterRecord<W> {
        let color_spec_default = color_spec(COLOR_DEFAULT);
        let color_spec_last = color_spec_default.clone();

        PrinterRecord {
            writer,
            do_color,
            color_spec_default,
            color_spec_error: color_spec(COLOR_LEVEL_ERROR),
            color_spec_warning: color_spec(COLOR_LEVEL_WARNING),
            color_spec_debug: color_spec(COLOR_LEVEL_DEBUG),
            color_spec_virtual: color_spec(COLOR_VIRTUAL),
            level_error: config.level("ERROR").unwrap_or(i64::MAX),
            level_warning: config.level("WARNING").unwrap_or(i64::MAX),
            level_debug: config.level("DEBUG").unwrap_or(i64::MIN),
            do_prepend_index,
            color_spec_last,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    /// The [`ColorSpec`] for `record`.
    fn color_spec_record(
        &self,
        record: &LogRecord,
    ) -> &ColorSpec {
        if record.is_virtual() {
            return &self.color_spec_virtual;
        }
        let level: i64 = match record.get(FIELD_LEVEL) {
            Some(Value::Number(number)) => match number.as_i64() {
                Some(level) => level,
                None => return &self.color_spec_default,
            },
            _ => return &self.color_spec_default,
        };
        if level >= self.level_error {
            &self.color_spec_error
        } else if level >= self.level_warning {
            &self.color_spec_warning
        } else if level <= self.level_debug {
            &self.color_spec_debug
        } else {
            &self.color_spec_default
        }
    }

    /// Print `line`, the text form of `record` shown at visible `row`.
    pub fn print_record(
        &mut self,
        row: RowIndex,
        record: &LogRecord,
        line: &str,
    ) -> PrinterRecordResult {
        let mut printed: usize = 0;
        if self.do_prepend_index {
            let seq: SeqIndex = record.seq();
            let prefix: String = format!("{:>6} {:>6} ", row, seq);
            if self.do_color {
                let color_spec_ = self.color_spec_default.clone();
                setcolor_or_return!(self.writer, color_spec_, self.color_spec_last);
            }
            self.writer.write_all(prefix.as_bytes())?;
            printed += prefix.len();
        }
        if self.do_color {
            let color_spec_ = self.color_spec_record(record).clone();
            setcolor_or_return!(self.writer, color_spec_, self.color_spec_last);
        }
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        printed += line.len() + 1;

        PrinterRecordResult::Ok(printed)
    }

    /// Reset the color and flush.
    pub fn finish(&mut self) -> Result<()> {
        if self.do_color {
            self.writer.reset()?;
            self.color_spec_last = self.color_spec_default.clone();
        }

        self.writer.flush()
    }
}
