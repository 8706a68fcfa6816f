// src/query/mod.rs

//! The query language used for filtering and searching [`LogRecord`]s.
//!
//! A query is a pure boolean predicate over one record. It is tokenized by
//! [`lexer`], parsed into an [`Expr`] tree by [`parser`] and evaluated by
//! [`eval`]. There is no embedded scripting engine; names resolve only to
//! record fields and to the configured level constants.
//!
//! ```text
//! level >= WARNING and "timeout" in msg
//! ctx["user"]["id"] == 42 or not (tags[-1] in ["a", "b"])
//! ```
//!
//! The [`QueryEvaluator`] keeps a small LRU cache of compiled [`Query`]s so
//! repeated evaluation of the same text skips lexing and parsing.
//!
//! [`Expr`]: crate::query::parser::Expr
//! [`LogRecord`]: crate::data::record::LogRecord

pub mod eval;
pub mod levelrules;
pub mod lexer;
pub mod parser;

use crate::config::{LevelTable, RawlogConfig};
use crate::data::record::LogRecord;
use crate::query::parser::Expr;

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use ::lru::LruCache;
#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};
use ::thiserror::Error;

/// Failure to compile or evaluate a query.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum QueryError {
    #[error("syntax error at column {column}: {message}")]
    Syntax { column: usize, message: String },
    #[error("unknown name {0:?}")]
    UnknownName(String),
    #[error("key {0:?} not found")]
    KeyNotFound(String),
    #[error("index {0} out of range")]
    IndexOutOfRange(i64),
    #[error("type error: {0}")]
    Type(String),
}

/// Outcome of a filter pass or of a [`SearchCursor`].
///
/// `Error` and `Empty` are recoverable by the caller; they never abort the
/// calling program.
///
/// [`SearchCursor`]: crate::readers::searchcursor::SearchCursor
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryStatus {
    Ok,
    /// Nothing matched.
    Empty,
    /// The query failed to compile, or failed to evaluate for some record.
    Error(QueryError),
    /// The search cursor wrapped around and is back where it began.
    EofReached,
}

impl QueryStatus {
    pub const fn is_error(&self) -> bool {
        matches!(self, QueryStatus::Error(_))
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        match self {
            QueryStatus::Ok => write!(f, "OK"),
            QueryStatus::Empty => write!(f, "QUERY_EMPTY"),
            QueryStatus::Error(err) => write!(f, "QUERY_ERROR: {}", err),
            QueryStatus::EofReached => write!(f, "EOF_REACHED"),
        }
    }
}

/// A compiled query.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    text: String,
    expr: Expr,
}

impl Query {
    /// Tokenize and parse `text`.
    pub fn compile(text: &str) -> Result<Query, QueryError> {
        defn!("({:?})", text);
        let lexemes = lexer::tokenize(text)?;
        let expr = parser::parse(&lexemes)?;
        defx!("{:?}", expr);

        Ok(Query {
            text: String::from(text),
            expr,
        })
    }

    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// `true` if the query's result is truthy for `record`.
    pub fn matches(
        &self,
        record: &LogRecord,
        levels: &LevelTable,
    ) -> Result<bool, QueryError> {
        let value = eval::eval(&self.expr, record, levels)?;

        Ok(eval::truthy(&value))
    }
}

/// Compiles and evaluates query text against records, remembering recently
/// compiled queries.
pub struct QueryEvaluator {
    config: Arc<RawlogConfig>,
    cache: LruCache<String, Arc<Query>>,
    /// cache hits, for testing
    pub(crate) _compile_cache_lru_hit: u64,
    /// cache misses, for testing
    pub(crate) _compile_cache_lru_miss: u64,
}

impl fmt::Debug for QueryEvaluator {
    fn fmt(
        &self,
        f: &mut fmt::Formatter,
    ) -> fmt::Result {
        f.debug_struct("QueryEvaluator")
            .field("cache LRU len", &self.cache.len())
            .field("_compile_cache_lru_hit", &self._compile_cache_lru_hit)
            .field("_compile_cache_lru_miss", &self._compile_cache_lru_miss)
            .finish()
    }
}

impl QueryEvaluator {
    pub fn new(config: Arc<RawlogConfig>) -> QueryEvaluator {
        let cap = NonZeroUsize::new(config.query_cache_sz).unwrap_or(NonZeroUsize::MIN);

        QueryEvaluator {
            config,
            cache: LruCache::new(cap),
            _compile_cache_lru_hit: 0,
            _compile_cache_lru_miss: 0,
        }
    }

    pub fn config(&self) -> &Arc<RawlogConfig> {
        &self.config
    }

    /// Compile `text`, or return the cached compilation.
    /// Compilation failures are not cached.
    pub fn compile(
        &mut self,
        text: &str,
    ) -> Result<Arc<Query>, QueryError> {
        if let Some(query) = self.cache.get(text) {
            self._compile_cache_lru_hit += 1;
            return Ok(query.clone());
        }
        self._compile_cache_lru_miss += 1;
        let query = Arc::new(Query::compile(text)?);
        self.cache.put(String::from(text), query.clone());

        Ok(query)
    }

    /// `true` if `text` matches `record`.
    pub fn evaluate(
        &mut self,
        text: &str,
        record: &LogRecord,
    ) -> Result<bool, QueryError> {
        let query = self.compile(text)?;

        self.matches(&query, record)
    }

    /// `true` if the compiled `query` matches `record`.
    pub fn matches(
        &self,
        query: &Query,
        record: &LogRecord,
    ) -> Result<bool, QueryError> {
        query.matches(record, &self.config.levels)
    }
}
