// src/printer/summary.rs

//! Prints the end-of-run summary of a [`LogView`] to stderr.
//!
//! [`LogView`]: crate::readers::logview::LogView

use crate::common::{Count, FPath};
use crate::printer::printers::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor, COLOR_DEFAULT};
use crate::readers::logview::LogView;
use crate::readers::rawlogstore::SummaryRawlogStore;

use std::io::Write;
use std::time::Instant;

/// Counts of what the driver program printed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SummaryPrinted {
    /// count of bytes printed
    pub bytes: Count,
    /// count of records printed
    pub records: Count,
    /// count of search results printed
    pub search_results: Count,
    /// count of records received from the stream listener
    pub live_records: Count,
}

impl SummaryPrinted {
    /// Update after printing one record of `printed` bytes.
    pub fn summaryprint_update(
        &mut self,
        printed: usize,
    ) {
        self.bytes += printed as Count;
        self.records += 1;
    }
}

/// Print `message` to stderr in `color`.
pub fn print_colored_stderr(
    color: Color,
    color_choice: ColorChoice,
    message: &str,
) {
    let mut stderr = StandardStream::stderr(color_choice);
    let mut color_spec = ColorSpec::new();
    color_spec.set_fg(Some(color));
    // errors printing to stderr have nowhere to go
    let _ = stderr.set_color(&color_spec);
    let _ = stderr.write_all(message.as_bytes());
    let _ = stderr.reset();
    let _ = stderr.flush();
}

/// Print the [`SummaryRawlogStore`] lines, indented.
fn print_store_summary(summary: &SummaryRawlogStore) {
    eprintln!("  records loaded       : {}", summary.records_loaded);
    eprintln!("  diagnostic records   : {}", summary.virtual_records);
    eprintln!("  zero-length markers  : {}", summary.zero_len_markers);
    eprintln!("  lost records         : {}", summary.lost);
    eprintln!("  corrupt regions      : {}", summary.resyncs);
    eprintln!("  bytes skipped        : {}", summary.bytes_skipped);
    eprintln!("  records dropped      : {}", summary.dropped);
    eprintln!("  live records appended: {}", summary.live_appended);
    eprintln!("  gzip compressed      : {}", summary.gz);
    eprintln!("  uncompressed bytes   : {}", summary.bytes_total);
}

/// Print the summary of one run over `path`.
pub fn print_summary(
    path: Option<&FPath>,
    view: &LogView,
    summaryprinted: &SummaryPrinted,
    color_choice: ColorChoice,
    start_time: Instant,
) {
    let finish_time = Instant::now();
    print_colored_stderr(COLOR_DEFAULT, color_choice, "");

    eprintln!("Summary:\n");
    match path {
        Some(path) => eprintln!("File                   : {}", path),
        None => eprintln!("File                   : (none)"),
    }
    eprintln!("Store:");
    print_store_summary(&view.store().summary());
    eprintln!("Records in store       : {}", view.store().len());
    eprintln!("Visible rows           : {}", view.visible_row_count());
    match view.filter_text() {
        Some(text) => eprintln!("Filter                 : {:?} ({})", text, view.filter_status()),
        None => eprintln!("Filter                 : (none) ({})", view.filter_status()),
    }
    if let Some(cursor) = view.cursor() {
        eprintln!("Search                 : {:?} ({})", cursor.query_text(), cursor.status());
        eprintln!("Search results         : {}", cursor.count());
    }
    eprintln!("Printed records        : {}", summaryprinted.records);
    eprintln!("Printed search results : {}", summaryprinted.search_results);
    eprintln!("Printed bytes          : {}", summaryprinted.bytes);
    eprintln!("Live records received  : {}", summaryprinted.live_records);
    eprintln!("Elapsed                : {:?}", finish_time.duration_since(start_time));
}
