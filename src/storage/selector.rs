//! Predicate language understood by [`MemoryStateStore`](super::memory::MemoryStateStore).
//!
//! A query string is a JSON document in the CouchDB selector style:
//!
//! ```json
//! {"selector": {"club": "FC Barcelona", "kit_no": {"$lte": 5}}, "limit": 10}
//! ```
//!
//! Field conditions support implicit equality, `$eq`, `$ne`, `$gt`, `$gte`,
//! `$lt`, `$lte`, `$in`, `$nin` and `$exists`; dotted field names walk into
//! nested objects. `$and`, `$or` and `$nor` take arrays of selectors and
//! `$not` takes a single selector. Every operator other than `$exists`
//! requires the field to be present.

use crate::error::LedgerError;
use serde_json::{Map, Number, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectorQuery {
    pub condition: Condition,
    pub skip: usize,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Field { path: Vec<String>, op: FieldOp },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Nor(Vec<Condition>),
    Not(Box<Condition>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
}

impl SelectorQuery {
    pub fn parse(query: &str) -> Result<Self, LedgerError> {
        let doc: Value = serde_json::from_str(query)
            .map_err(|e| LedgerError::Query(format!("query is not valid JSON: {e}")))?;
        let Value::Object(doc) = doc else {
            return Err(LedgerError::Query("query must be a JSON object".into()));
        };

        let mut condition = None;
        let mut skip = 0usize;
        let mut limit = None;
        for (name, value) in &doc {
            match name.as_str() {
                "selector" => match value {
                    Value::Object(selector) => condition = Some(parse_selector(selector)?),
                    _ => return Err(LedgerError::Query("selector must be an object".into())),
                },
                "skip" => skip = parse_count(name, value)?,
                "limit" => limit = Some(parse_count(name, value)?),
                // Index hints are meaningful only to indexed backends.
                "use_index" => {}
                other => {
                    return Err(LedgerError::Query(format!(
                        "unsupported query field '{other}'"
                    )));
                }
            }
        }

        let condition =
            condition.ok_or_else(|| LedgerError::Query("query has no selector".into()))?;
        Ok(Self {
            condition,
            skip,
            limit,
        })
    }

    pub fn matches(&self, doc: &Value) -> bool {
        doc.is_object() && self.condition.matches(doc)
    }

    /// Convenience for raw stored bytes; anything that is not a JSON object
    /// never matches.
    pub fn matches_bytes(&self, bytes: &[u8]) -> bool {
        match serde_json::from_slice::<Value>(bytes) {
            Ok(doc) => self.matches(&doc),
            Err(_) => false,
        }
    }
}

impl Condition {
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Condition::Field { path, op } => op.matches(lookup(doc, path)),
            Condition::And(all) => all.iter().all(|c| c.matches(doc)),
            Condition::Or(any) => any.iter().any(|c| c.matches(doc)),
            Condition::Nor(none) => !none.iter().any(|c| c.matches(doc)),
            Condition::Not(inner) => !inner.matches(doc),
        }
    }
}

impl FieldOp {
    fn matches(&self, field: Option<&Value>) -> bool {
        let Some(field) = field else {
            return matches!(self, FieldOp::Exists(false));
        };
        match self {
            FieldOp::Eq(v) => json_eq(field, v),
            FieldOp::Ne(v) => !json_eq(field, v),
            FieldOp::Gt(v) => json_cmp(field, v) == Some(Ordering::Greater),
            FieldOp::Gte(v) => matches!(
                json_cmp(field, v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            FieldOp::Lt(v) => json_cmp(field, v) == Some(Ordering::Less),
            FieldOp::Lte(v) => {
                matches!(json_cmp(field, v), Some(Ordering::Less | Ordering::Equal))
            }
            FieldOp::In(values) => values.iter().any(|v| json_eq(field, v)),
            FieldOp::Nin(values) => !values.iter().any(|v| json_eq(field, v)),
            FieldOp::Exists(expected) => *expected,
        }
    }
}

fn parse_selector(selector: &Map<String, Value>) -> Result<Condition, LedgerError> {
    let mut conditions = Vec::with_capacity(selector.len());
    for (name, value) in selector {
        if let Some(op) = name.strip_prefix('$') {
            conditions.push(parse_combinator(op, value)?);
        } else {
            conditions.push(parse_field(name, value)?);
        }
    }
    if conditions.len() == 1 {
        if let Some(only) = conditions.pop() {
            return Ok(only);
        }
    }
    Ok(Condition::And(conditions))
}

fn parse_combinator(op: &str, value: &Value) -> Result<Condition, LedgerError> {
    match op {
        "and" | "or" | "nor" => {
            let Value::Array(items) = value else {
                return Err(LedgerError::Query(format!("${op} expects an array")));
            };
            if items.is_empty() {
                return Err(LedgerError::Query(format!("${op} expects at least one selector")));
            }
            let parsed = items
                .iter()
                .map(|item| match item {
                    Value::Object(sel) => parse_selector(sel),
                    _ => Err(LedgerError::Query(format!(
                        "${op} members must be objects"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match op {
                "and" => Condition::And(parsed),
                "or" => Condition::Or(parsed),
                _ => Condition::Nor(parsed),
            })
        }
        "not" => match value {
            Value::Object(sel) => Ok(Condition::Not(Box::new(parse_selector(sel)?))),
            _ => Err(LedgerError::Query("$not expects an object".into())),
        },
        other => Err(LedgerError::Query(format!(
            "unknown combinator '${other}'"
        ))),
    }
}

fn parse_field(name: &str, value: &Value) -> Result<Condition, LedgerError> {
    let path: Vec<String> = name.split('.').map(str::to_string).collect();
    if path.iter().any(String::is_empty) {
        return Err(LedgerError::Query(format!("invalid field name '{name}'")));
    }

    let operators = match value {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => map,
        literal => {
            return Ok(Condition::Field {
                path,
                op: FieldOp::Eq(literal.clone()),
            });
        }
    };

    let mut conditions = Vec::with_capacity(operators.len());
    for (op, arg) in operators {
        let op = match op.as_str() {
            "$eq" => FieldOp::Eq(arg.clone()),
            "$ne" => FieldOp::Ne(arg.clone()),
            "$gt" => FieldOp::Gt(arg.clone()),
            "$gte" => FieldOp::Gte(arg.clone()),
            "$lt" => FieldOp::Lt(arg.clone()),
            "$lte" => FieldOp::Lte(arg.clone()),
            "$in" => FieldOp::In(expect_array(op, arg)?),
            "$nin" => FieldOp::Nin(expect_array(op, arg)?),
            "$exists" => match arg {
                Value::Bool(b) => FieldOp::Exists(*b),
                _ => return Err(LedgerError::Query("$exists expects a boolean".into())),
            },
            other => {
                return Err(LedgerError::Query(format!(
                    "unknown operator '{other}' on field '{name}'"
                )));
            }
        };
        conditions.push(Condition::Field {
            path: path.clone(),
            op,
        });
    }
    if conditions.len() == 1 {
        if let Some(only) = conditions.pop() {
            return Ok(only);
        }
    }
    Ok(Condition::And(conditions))
}

fn expect_array(op: &str, value: &Value) -> Result<Vec<Value>, LedgerError> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(LedgerError::Query(format!("{op} expects an array"))),
    }
}

fn parse_count(name: &str, value: &Value) -> Result<usize, LedgerError> {
    value
        .as_u64()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| LedgerError::Query(format!("{name} must be a non-negative integer")))
}

fn lookup<'a>(doc: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_cmp(x, y) == Some(Ordering::Equal),
        _ => a == b,
    }
}

fn json_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => number_cmp(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Integers compare exactly; f64 only when either side is a float.
fn number_cmp(x: &Number, y: &Number) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (x.as_u64(), y.as_u64()) {
        return Some(a.cmp(&b));
    }
    if let (Some(a), Some(b)) = (x.as_i64(), y.as_i64()) {
        return Some(a.cmp(&b));
    }
    x.as_f64()?.partial_cmp(&y.as_f64()?)
}
