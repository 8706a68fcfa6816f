// src/bin/rawlog.rs

//! Driver program _rawlog_ drives the [_rawloglib_].
//!
//! Processes user-passed command-line arguments, then:
//!
//! 1. loads the rawlog file, if one was passed, into a [`LogView`],
//! 2. applies the `--filter` expression,
//! 3. prints the visible records, or with `--search` only the records found
//!    by a [`SearchCursor`] traversal from `--start`,
//! 4. with `--listen`, starts a [`StreamIngestor`] and prints each newly
//!    visible live record until interrupted by the user,
//! 5. writes the visible records with `--store` and `--export`.
//!
//! If passed CLI option `--summary`, a [`print_summary`] is printed to stderr.
//!
//! `rawlog.rs` should be the main thread and the only thread that prints to STDOUT.
//!
//! [_rawloglib_]: rawloglib
//! [`LogView`]: rawloglib::readers::logview::LogView
//! [`SearchCursor`]: rawloglib::readers::searchcursor::SearchCursor
//! [`StreamIngestor`]: rawloglib::readers::streamingestor::StreamIngestor
//! [`print_summary`]: rawloglib::printer::summary::print_summary

#![allow(non_camel_case_types)]

use std::fs::File;
use std::io::{BufWriter, ErrorKind};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ::clap::{
    Parser,
    ValueEnum,
};
use ::const_format::concatcp;

use ::rawloglib::common::{Completion, FPath, Path, SeqIndex};
use ::rawloglib::config::RawlogConfig;
use ::rawloglib::data::record::format_record_line;
use ::rawloglib::printer::printers::{ColorChoice, PrinterRecord, StandardStream, COLOR_ERROR};
use ::rawloglib::printer::summary::{print_colored_stderr, print_summary, SummaryPrinted};
use ::rawloglib::query::QueryStatus;
use ::rawloglib::readers::logview::LogView;
use ::rawloglib::readers::streamingestor::StreamIngestor;
#[allow(unused_imports)]
use ::rawloglib::{de_err, de_wrn, e_err, e_wrn};
use ::si_trace_print::stack::stack_offset_set;
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

use ::anyhow::{self, Context};

// --------------------
// command-line parsing

/// CLI enum that maps to [`termcolor::ColorChoice`].
///
/// [`termcolor::ColorChoice`]: https://docs.rs/termcolor/1.1.3/termcolor/enum.ColorChoice.html
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    ValueEnum, // from `clap`
)]
enum CLI_Color_Choice {
    always,
    auto,
    never,
}

const CLI_HELP_AFTER: &str = "\
Query expressions compare record fields and level constants, e.g.
    level >= WARNING and \"timeout\" in msg
    args[\"user\"] == \"root\" or not (code in [0, 1])

Operators: == != < <= > >= in, not in, and, or, not, unary -.
Chained comparisons like 1 <= level < 40 are allowed.
Level constants: NOTSET TRACE DEBUG INFO WARNING WARN ERROR CRITICAL FATAL.

Search prints matches from --start, wrapping around, and stops after one full
loop over the matches or after --count matches.

With --listen, live records are printed until Ctrl+C is pressed.
A packet is AES-256-GCM encrypted with the SHA-256 of --secret as the key.";

// `about` is taken from `Cargo.toml:[package]:description`.
#[derive(Parser, Debug)]
#[clap(
    about = env!("CARGO_PKG_DESCRIPTION"),
    author = env!("CARGO_PKG_AUTHORS"),
    name = "rawlog",
    // write expanded information for the `--version` output
    version = concatcp!(
        "(Rawlog Inspector)\n",
        "Version: ",
        env!("CARGO_PKG_VERSION_MAJOR"), ".",
        env!("CARGO_PKG_VERSION_MINOR"), ".",
        env!("CARGO_PKG_VERSION_PATCH"), "\n",
        "MSRV: ", env!("CARGO_PKG_RUST_VERSION"), "\n",
        "License: ", env!("CARGO_PKG_LICENSE"), "\n",
        "Author: ", env!("CARGO_PKG_AUTHORS"), "\n",
    ),
    after_help = CLI_HELP_AFTER,
    verbatim_doc_comment,
)]
struct CLI_Args {
    /// Path of a rawlog file, optionally gzip compressed.
    #[clap(verbatim_doc_comment)]
    path: Option<String>,

    /// Show only records matching this query expression.
    #[clap(short = 'f', long, verbatim_doc_comment)]
    filter: Option<String>,

    /// Print only the visible records matching this query expression,
    /// in search order.
    #[clap(short = 's', long, verbatim_doc_comment)]
    search: Option<String>,

    /// Sequence index to start the search from.
    #[clap(long, default_value_t = 0, verbatim_doc_comment)]
    start: SeqIndex,

    /// Search backwards.
    #[clap(short = 'p', long, verbatim_doc_comment)]
    previous: bool,

    /// Print at most this many search results.
    #[clap(short = 'n', long, verbatim_doc_comment)]
    count: Option<usize>,

    /// Write the visible records to this path as a rawlog.
    #[clap(long, verbatim_doc_comment)]
    store: Option<String>,

    /// Write the visible records to this path as text lines.
    #[clap(long, verbatim_doc_comment)]
    export: Option<String>,

    /// Gzip compress the output of --store and --export.
    #[clap(short = 'z', long, verbatim_doc_comment)]
    compress: bool,

    /// Print the field paths usable in query expressions, then exit.
    #[clap(long, verbatim_doc_comment)]
    completions: bool,

    /// Listen for live records on this UDP address, e.g. "127.0.0.1:9020".
    #[clap(short = 'l', long, requires = "secret", verbatim_doc_comment)]
    listen: Option<String>,

    /// Shared secret of the live record stream.
    #[clap(long, verbatim_doc_comment)]
    secret: Option<String>,

    /// Test live records against the filter. By default live records are
    /// hidden while a filter is active.
    #[clap(long, verbatim_doc_comment)]
    filter_live: bool,

    /// Prepend the row and sequence index to each printed record.
    #[clap(short = 'i', long, verbatim_doc_comment)]
    prepend_index: bool,

    /// Choose to print to terminal using colors.
    #[clap(
        required = false,
        short = 'c',
        long = "color",
        verbatim_doc_comment,
        value_enum,
        default_value_t=CLI_Color_Choice::auto,
    )]
    color_choice: CLI_Color_Choice,

    /// Print a summary of the run to stderr.
    #[clap(long, verbatim_doc_comment)]
    summary: bool,
}

impl CLI_Args {
    fn color_choice(&self) -> ColorChoice {
        match self.color_choice {
            CLI_Color_Choice::always => ColorChoice::Always,
            CLI_Color_Choice::auto => ColorChoice::Auto,
            CLI_Color_Choice::never => ColorChoice::Never,
        }
    }
}

// --------------------
// signal handling

/// Set by the signal handler; the listening loop returns when set.
fn set_signal_handler(exit_early: Arc<AtomicBool>) -> anyhow::Result<(), ctrlc::Error> {
    defn!();
    ctrlc::set_handler(move || {
        defñ!("signal received");
        exit_early.store(true, Ordering::SeqCst);
    })?;
    defx!();

    Ok(())
}

// --------------------
// processing

type Printer = PrinterRecord<StandardStream>;

/// Print the record at `seq` if it is visible.
/// Returns `false` if stdout was closed.
fn print_seq(
    view: &mut LogView,
    printer: &mut Printer,
    summaryprinted: &mut SummaryPrinted,
    seq: SeqIndex,
) -> anyhow::Result<bool> {
    let row = match view.sequence_index_to_row(seq) {
        Some(row) if view.is_visible(seq) => row,
        _ => return Ok(true),
    };
    let record = match view.store().get(seq) {
        Some(record) => record,
        None => return Ok(true),
    };
    let line = format_record_line(record);
    match printer.print_record(row, record, &line) {
        Ok(printed) => {
            summaryprinted.summaryprint_update(printed);
            Ok(true)
        }
        // e.g. `rawlog file.rawlog | head`
        Err(err) if err.kind() == ErrorKind::BrokenPipe => {
            de_wrn!("stdout closed: {}", err);
            Ok(false)
        }
        Err(err) => Err(err).context("printing to stdout"),
    }
}

/// Print every visible row in order.
fn print_visible(
    view: &mut LogView,
    printer: &mut Printer,
    summaryprinted: &mut SummaryPrinted,
) -> anyhow::Result<()> {
    let seqs: Vec<SeqIndex> = (0..view.visible_row_count())
        .filter_map(|row| view.row_to_sequence_index(row))
        .collect();
    for seq in seqs.into_iter() {
        if !print_seq(view, printer, summaryprinted, seq)? {
            break;
        }
    }

    Ok(())
}

/// Print the search results in traversal order until a full loop was made
/// or `count` results were printed.
fn print_search(
    view: &mut LogView,
    printer: &mut Printer,
    summaryprinted: &mut SummaryPrinted,
    args: &CLI_Args,
    text: &str,
) -> anyhow::Result<()> {
    defn!("({:?})", text);
    let status: QueryStatus = view.search(text, args.start).status().clone();
    if status.is_error() {
        anyhow::bail!("search {:?}: {}", text, status);
    }
    let limit: usize = args.count.unwrap_or(usize::MAX);
    let mut printed: usize = 0;
    let mut first: Option<SeqIndex> = None;
    while printed < limit {
        let seq = match args.previous {
            true => view.search_previous(),
            false => view.search_next(),
        };
        let seq = match seq {
            Some(seq) => seq,
            None => break,
        };
        let eof: bool = matches!(view.cursor().map(|cursor| cursor.status()), Some(QueryStatus::EofReached));
        // a `--start` that is not a match makes the first result the anchor
        if eof && first == Some(seq) {
            defo!("search wrapped around to {}", seq);
            break;
        }
        if !print_seq(view, printer, summaryprinted, seq)? {
            break;
        }
        first.get_or_insert(seq);
        printed += 1;
        summaryprinted.search_results += 1;
        if eof {
            defo!("search wrapped around");
            break;
        }
    }
    defx!("printed {} results", printed);

    Ok(())
}

/// Receive live records until `exit_early` is set, printing each visible one.
fn listen(
    view: &mut LogView,
    printer: &mut Printer,
    summaryprinted: &mut SummaryPrinted,
    addr: &str,
    secret: &str,
) -> anyhow::Result<()> {
    defn!("({:?})", addr);
    let exit_early = Arc::new(AtomicBool::new(false));
    set_signal_handler(exit_early.clone()).context("setting the signal handler")?;
    let config = view.config().clone();
    let poll_interval = config.listener_poll_interval;
    let mut ingestor = StreamIngestor::start(config, secret.as_bytes(), addr)
        .with_context(|| format!("listening on {:?}", addr))?;
    eprintln!("listening on {}; press Ctrl+C to stop", ingestor.local_addr());

    while !exit_early.load(Ordering::SeqCst) {
        let first = match ingestor.recv_timeout(poll_interval) {
            Some(record) => record,
            None => continue,
        };
        let mut records = vec![first];
        records.extend(ingestor.try_drain(usize::MAX));
        summaryprinted.live_records += records.len() as u64;
        let range = match view.append_live(records, None) {
            Some(range) => range,
            None => continue,
        };
        let mut open: bool = true;
        for seq in range {
            if !print_seq(view, printer, summaryprinted, seq)? {
                open = false;
                break;
            }
        }
        if !open {
            break;
        }
        printer.finish()?;
    }
    ingestor.stop();
    defx!();

    Ok(())
}

fn create_output(path: &str) -> anyhow::Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;

    Ok(BufWriter::new(file))
}

fn run(
    args: &CLI_Args,
    start_time: Instant,
) -> anyhow::Result<()> {
    let config = RawlogConfig {
        filter_live_rows: args.filter_live,
        ..RawlogConfig::default()
    }
    .into_arc();
    let mut view = LogView::new(config.clone());
    let path: Option<FPath> = args.path.clone();

    if let Some(path) = path.as_ref() {
        match view.load_path(Path::new(path), None, None) {
            Ok(Completion::Done) => {}
            Ok(Completion::Aborted) => anyhow::bail!("loading {:?} was aborted", path),
            Err(err) => return Err(err).with_context(|| format!("loading {:?}", path)),
        }
    }

    if args.completions {
        for candidate in view.completion_candidates().iter() {
            println!("{}", candidate);
        }
        return Ok(());
    }

    if let Some(filter) = args.filter.as_ref() {
        let status = view.apply_filter(filter);
        if status.is_error() {
            anyhow::bail!("filter {:?}: {}", filter, status);
        }
        defo!("filter {:?}: {}", filter, status);
    }

    let mut printer: Printer = PrinterRecord::stdout(args.color_choice(), &config, args.prepend_index);
    let mut summaryprinted = SummaryPrinted::default();
    match args.search.as_ref() {
        Some(text) => print_search(&mut view, &mut printer, &mut summaryprinted, args, text)?,
        None => print_visible(&mut view, &mut printer, &mut summaryprinted)?,
    }
    printer.finish()?;

    if let Some(addr) = args.listen.as_ref() {
        let secret: &str = args.secret.as_deref().unwrap_or_default();
        listen(&mut view, &mut printer, &mut summaryprinted, addr, secret)?;
        printer.finish()?;
    }

    if let Some(store) = args.store.as_ref() {
        let writer = create_output(store)?;
        view.store_visible_to_stream(writer, args.compress, None, None)
            .with_context(|| format!("storing to {:?}", store))?;
    }
    if let Some(export) = args.export.as_ref() {
        let writer = create_output(export)?;
        view.export_visible_to_stream(writer, args.compress, format_record_line, None, None)
            .with_context(|| format!("exporting to {:?}", export))?;
    }

    if args.summary {
        print_summary(path.as_ref(), &view, &summaryprinted, args.color_choice(), start_time);
    }

    Ok(())
}

pub fn main() -> ExitCode {
    let start_time = Instant::now();
    if cfg!(debug_assertions) {
        stack_offset_set(Some(0));
    }
    defn!();

    let args = CLI_Args::parse();
    defo!("{:?}", args);

    let exitcode = match run(&args, start_time) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            print_colored_stderr(COLOR_ERROR, args.color_choice(), &format!("ERROR: {:#}\n", err));
            ExitCode::FAILURE
        }
    };
    defx!("exitcode {:?}", exitcode);

    exitcode
}
