// src/query/eval.rs

//! Evaluates an [`Expr`] against one [`LogRecord`].
//!
//! The environment is exactly the record's fields plus the
//! [`LevelTable`] constants. Values are borrowed from the record wherever
//! possible.
//!
//! [`LevelTable`]: crate::config::LevelTable

use crate::config::LevelTable;
use crate::data::record::LogRecord;
use crate::query::parser::{CmpOp, Expr};
use crate::query::QueryError;

use std::borrow::Cow;
use std::cmp::Ordering;

use ::serde_json::Value;

/// Numeric view of a JSON number. Integers compare exactly, anything else
/// compares as `f64`.
#[derive(Clone, Copy, Debug)]
enum Num {
    I(i128),
    F(f64),
}

impl Num {
    fn from_value(value: &Value) -> Option<Num> {
        let n = match value {
            Value::Number(n) => n,
            _ => return None,
        };
        if let Some(i) = n.as_i64() {
            return Some(Num::I(i as i128));
        }
        if let Some(u) = n.as_u64() {
            return Some(Num::I(u as i128));
        }

        n.as_f64().map(Num::F)
    }

    fn as_f64(&self) -> f64 {
        match self {
            Num::I(i) => *i as f64,
            Num::F(f) => *f,
        }
    }

    fn partial_cmp(
        &self,
        other: &Num,
    ) -> Option<Ordering> {
        match (self, other) {
            (Num::I(a), Num::I(b)) => Some(a.cmp(b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

/// Python-like truthiness of a JSON value.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => match Num::from_value(value) {
            Some(Num::I(i)) => i != 0,
            Some(Num::F(f)) => f != 0.0,
            None => false,
        },
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// Evaluate `expr` for `record`.
pub fn eval<'a>(
    expr: &Expr,
    record: &'a LogRecord,
    levels: &LevelTable,
) -> Result<Cow<'a, Value>, QueryError> {
    match expr {
        Expr::Literal(value) => Ok(Cow::Owned(value.clone())),
        Expr::List(items) => {
            let mut values: Vec<Value> = Vec::with_capacity(items.len());
            for item in items.iter() {
                values.push(eval(item, record, levels)?.into_owned());
            }
            Ok(Cow::Owned(Value::Array(values)))
        }
        Expr::Name(name) => {
            // record fields take precedence over level constants
            if let Some(value) = record.get(name) {
                return Ok(Cow::Borrowed(value));
            }
            match levels.get(name) {
                Some(level) => Ok(Cow::Owned(Value::from(*level))),
                None => Err(QueryError::UnknownName(name.clone())),
            }
        }
        Expr::Index(base, key) => {
            let base = eval(base, record, levels)?;
            let key = eval(key, record, levels)?;
            match base {
                Cow::Borrowed(value) => Ok(Cow::Borrowed(index(value, &key)?)),
                Cow::Owned(value) => Ok(Cow::Owned(index(&value, &key)?.clone())),
            }
        }
        Expr::Neg(operand) => {
            let value = eval(operand, record, levels)?;
            let negated = match Num::from_value(&value) {
                Some(Num::I(i)) => match i64::try_from(-i) {
                    Ok(i_) => Value::from(i_),
                    Err(_) => Value::from(-(i as f64)),
                },
                Some(Num::F(f)) => Value::from(-f),
                None => {
                    return Err(QueryError::Type(format!("cannot negate a {}", type_name(&value))));
                }
            };
            Ok(Cow::Owned(negated))
        }
        Expr::Not(operand) => {
            let value = eval(operand, record, levels)?;
            Ok(Cow::Owned(Value::Bool(!truthy(&value))))
        }
        Expr::And(left, right) => {
            let value = eval(left, record, levels)?;
            if !truthy(&value) {
                return Ok(Cow::Owned(Value::Bool(false)));
            }
            let value = eval(right, record, levels)?;
            Ok(Cow::Owned(Value::Bool(truthy(&value))))
        }
        Expr::Or(left, right) => {
            let value = eval(left, record, levels)?;
            if truthy(&value) {
                return Ok(Cow::Owned(Value::Bool(true)));
            }
            let value = eval(right, record, levels)?;
            Ok(Cow::Owned(Value::Bool(truthy(&value))))
        }
        Expr::Compare(first, rest) => {
            let mut left = eval(first, record, levels)?;
            for (op, operand) in rest.iter() {
                let right = eval(operand, record, levels)?;
                if !compare(&left, *op, &right)? {
                    return Ok(Cow::Owned(Value::Bool(false)));
                }
                left = right;
            }
            Ok(Cow::Owned(Value::Bool(true)))
        }
    }
}

/// `base[key]`
fn index<'v>(
    base: &'v Value,
    key: &Value,
) -> Result<&'v Value, QueryError> {
    match (base, key) {
        (Value::Object(map), Value::String(k)) => match map.get(k) {
            Some(value) => Ok(value),
            None => Err(QueryError::KeyNotFound(k.clone())),
        },
        (Value::Array(list), Value::Number(_)) => {
            let i: i64 = match Num::from_value(key) {
                Some(Num::I(i)) => match i64::try_from(i) {
                    Ok(i_) => i_,
                    Err(_) => return Err(QueryError::IndexOutOfRange(i64::MAX)),
                },
                _ => return Err(QueryError::Type(String::from("list index must be an integer"))),
            };
            let at: Option<usize> = if i < 0 {
                let back = i.unsigned_abs() as usize;
                list.len().checked_sub(back)
            } else {
                Some(i as usize)
            };
            match at.and_then(|at| list.get(at)) {
                Some(value) => Ok(value),
                None => Err(QueryError::IndexOutOfRange(i)),
            }
        }
        (base, key) => Err(QueryError::Type(format!(
            "cannot index a {} with a {}",
            type_name(base),
            type_name(key)
        ))),
    }
}

fn values_equal(
    left: &Value,
    right: &Value,
) -> bool {
    match (Num::from_value(left), Num::from_value(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b) == Some(Ordering::Equal),
        _ => left == right,
    }
}

fn ordering(
    left: &Value,
    right: &Value,
) -> Result<Option<Ordering>, QueryError> {
    if let (Some(a), Some(b)) = (Num::from_value(left), Num::from_value(right)) {
        return Ok(a.partial_cmp(&b));
    }
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        (Value::Bool(a), Value::Bool(b)) => Ok(Some(a.cmp(b))),
        _ => Err(QueryError::Type(format!(
            "cannot order a {} and a {}",
            type_name(left),
            type_name(right)
        ))),
    }
}

fn contains(
    container: &Value,
    item: &Value,
) -> Result<bool, QueryError> {
    match (container, item) {
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        (Value::Array(list), item) => Ok(list.iter().any(|value| values_equal(value, item))),
        (container, item) => Err(QueryError::Type(format!(
            "cannot test membership of a {} in a {}",
            type_name(item),
            type_name(container)
        ))),
    }
}

fn compare(
    left: &Value,
    op: CmpOp,
    right: &Value,
) -> Result<bool, QueryError> {
    let result = match op {
        CmpOp::Eq => values_equal(left, right),
        CmpOp::Ne => !values_equal(left, right),
        CmpOp::Lt => ordering(left, right)? == Some(Ordering::Less),
        CmpOp::Le => matches!(ordering(left, right)?, Some(Ordering::Less | Ordering::Equal)),
        CmpOp::Gt => ordering(left, right)? == Some(Ordering::Greater),
        CmpOp::Ge => matches!(ordering(left, right)?, Some(Ordering::Greater | Ordering::Equal)),
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
    };

    Ok(result)
}
