// src/tests/levelrules_tests.rs

use crate::query::levelrules::{classify_level, LevelRuleProvider};
use crate::query::QueryEvaluator;
use crate::tests::common::{config, record};

use std::collections::BTreeMap;

use ::serde_json::{json, Value};
use ::test_case::test_case;

/// Rules held in memory, in priority order.
struct RulesMap {
    names: Vec<String>,
    rules: BTreeMap<String, String>,
}

impl RulesMap {
    fn new(rules: &[(&str, &str)]) -> RulesMap {
        RulesMap {
            names: rules.iter().map(|(name, _)| String::from(*name)).collect(),
            rules: rules
                .iter()
                .map(|(name, rule)| (String::from(*name), String::from(*rule)))
                .collect(),
        }
    }
}

impl LevelRuleProvider for RulesMap {
    fn level_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn level_rule(
        &self,
        name: &str,
    ) -> Option<String> {
        self.rules.get(name).cloned()
    }
}

const RULES: &[(&str, &str)] = &[
    ("error", "level >= ERROR"),
    ("broken", "foo ++ bar"),
    ("warning", "level >= WARNING or 'warn' in msg"),
    ("info", "level >= INFO"),
];

#[test_case(json!({"level": 50, "msg": "x"}), Some("error"))]
#[test_case(json!({"level": 30, "msg": "x"}), Some("warning"))]
#[test_case(json!({"level": 10, "msg": "warn: disk"}), Some("warning"); "rule with substring")]
#[test_case(json!({"level": 20, "msg": "x"}), Some("info"))]
#[test_case(json!({"level": 10, "msg": "x"}), None)]
#[test_case(json!({"msg": "x"}), None; "missing field errors are non-matches")]
fn test_classify_level(value: Value, expect: Option<&str>) {
    let provider = RulesMap::new(RULES);
    let mut evaluator = QueryEvaluator::new(config());
    let level = classify_level(&mut evaluator, &provider, &record(value));
    assert_eq!(level.as_deref(), expect);
}

#[test]
fn test_classify_level_rule_missing() {
    let mut provider = RulesMap::new(RULES);
    provider.names.insert(0, String::from("no rule"));
    let mut evaluator = QueryEvaluator::new(config());
    let level = classify_level(&mut evaluator, &provider, &record(json!({"level": 50})));
    assert_eq!(level.as_deref(), Some("error"));
}
