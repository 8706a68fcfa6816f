// src/query/levelrules.rs

//! Classify records by user-defined level rules.
//!
//! A settings provider names a set of levels (e.g. `"error"`, `"warning"`)
//! and, for each, a query expression. The display layer colors a record by
//! the first level whose rule matches.

use crate::data::record::LogRecord;
use crate::query::QueryEvaluator;

#[allow(unused_imports)]
use ::si_trace_print::{defn, defo, defx, defñ};

/// Supplies level names and their rule expressions.
pub trait LevelRuleProvider {
    /// Level names in priority order.
    fn level_names(&self) -> Vec<String>;
    /// The query expression of level `name`, if there is one.
    fn level_rule(
        &self,
        name: &str,
    ) -> Option<String>;
}

/// Name of the first level whose rule matches `record`.
///
/// A rule that fails to compile or evaluate is treated as not matching.
pub fn classify_level(
    evaluator: &mut QueryEvaluator,
    provider: &dyn LevelRuleProvider,
    record: &LogRecord,
) -> Option<String> {
    for name in provider.level_names().into_iter() {
        let rule = match provider.level_rule(&name) {
            Some(rule) => rule,
            None => continue,
        };
        match evaluator.evaluate(&rule, record) {
            Ok(true) => {
                defñ!("{:?} matched rule {:?}", name, rule);
                return Some(name);
            }
            Ok(false) => {}
            Err(_err) => {
                defo!("rule {:?} of {:?} failed: {}", rule, name, _err);
            }
        }
    }

    None
}
