//! Row scopes and condition evaluation.
//!
//! Conditions use SQL's three-valued logic: `None` is UNKNOWN, produced by
//! any comparison involving NULL. A WHERE or ON clause keeps a row only
//! when its tree evaluates to `Some(true)`.

use crate::config::MemoryConfig;
use regex::Regex;
use sqlweave_core::{Error, Result, Row, Value};
use sqlweave_query::{
    Bounds, ConditionKind, ConditionTree, DatePart, Operand, Operator, QuerySpec, Relation,
    Subject, ValueSet,
};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Binding {
    qualifier: String,
    column: String,
    value: Value,
}

/// The columns visible while evaluating one candidate row.
///
/// Joined rows contribute their bindings in join order; an enclosing
/// query's scope is appended last so inner names shadow outer ones.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    bindings: Vec<Binding>,
}

impl Scope {
    pub(crate) fn from_row(qualifier: &str, row: &Row) -> Self {
        Self {
            bindings: row
                .iter()
                .map(|(column, value)| Binding {
                    qualifier: qualifier.to_string(),
                    column: column.to_string(),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    /// A scope of NULLs for the given `(qualifier, column)` pairs.
    pub(crate) fn nulls(columns: &[(String, String)]) -> Self {
        Self {
            bindings: columns
                .iter()
                .map(|(qualifier, column)| Binding {
                    qualifier: qualifier.clone(),
                    column: column.clone(),
                    value: Value::Null,
                })
                .collect(),
        }
    }

    pub(crate) fn columns(&self) -> Vec<(String, String)> {
        self.bindings
            .iter()
            .map(|b| (b.qualifier.clone(), b.column.clone()))
            .collect()
    }

    pub(crate) fn join(&self, other: &Scope) -> Scope {
        let mut bindings = self.bindings.clone();
        bindings.extend(other.bindings.iter().cloned());
        Scope { bindings }
    }

    /// Resolve `column` or `qualifier.column`.
    pub(crate) fn lookup(&self, name: &str) -> Option<&Value> {
        let name = name.trim();
        let found = match name.rsplit_once('.') {
            Some((qualifier, column)) => self
                .bindings
                .iter()
                .find(|b| b.qualifier == qualifier && b.column == column),
            None => self.bindings.iter().find(|b| b.column == name),
        };
        found.map(|b| &b.value)
    }

    /// Bindings selected by `*` (all) or `qualifier.*`.
    pub(crate) fn star<'a>(
        &'a self,
        qualifier: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        self.bindings
            .iter()
            .filter(move |b| qualifier.is_none_or(|q| b.qualifier == q))
            .map(|b| (b.column.as_str(), &b.value))
    }
}

/// Attach an enclosing scope, if any.
pub(crate) fn with_outer<'s>(scope: &'s Scope, outer: Option<&Scope>) -> Cow<'s, Scope> {
    match outer {
        Some(outer) => Cow::Owned(scope.join(outer)),
        None => Cow::Borrowed(scope),
    }
}

fn and(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn not(v: Option<bool>, negated: bool) -> Option<bool> {
    if negated { v.map(|b| !b) } else { v }
}

/// Evaluates specifications against a snapshot of the tables.
pub(crate) struct Engine<'a> {
    pub(crate) tables: &'a HashMap<String, Vec<Row>>,
    pub(crate) config: &'a MemoryConfig,
}

impl Engine<'_> {
    /// Evaluate a tree with `AND` binding tighter than `OR`.
    pub(crate) fn eval_tree(&self, tree: &ConditionTree, scope: &Scope) -> Result<Option<bool>> {
        if tree.is_empty() {
            return Ok(Some(true));
        }
        let mut any = Some(false);
        let mut chain = Some(true);
        for (i, condition) in tree.iter().enumerate() {
            if i > 0 && condition.relation == Relation::Or {
                any = or(any, chain);
                chain = Some(true);
            }
            if chain == Some(false) {
                continue;
            }
            chain = and(chain, self.eval_condition(&condition.kind, scope)?);
        }
        Ok(or(any, chain))
    }

    pub(crate) fn matches(&self, tree: &ConditionTree, scope: &Scope) -> Result<bool> {
        Ok(self.eval_tree(tree, scope)? == Some(true))
    }

    fn eval_condition(&self, kind: &ConditionKind, scope: &Scope) -> Result<Option<bool>> {
        match kind {
            ConditionKind::Value { subject, op, rhs } => {
                let left = self.subject(subject, scope)?;
                let right = self.operand(rhs, scope)?;
                Ok(compare(*op, &left, &right))
            }
            ConditionKind::Column { first, op, second } => {
                let left = scope.lookup(first).cloned().unwrap_or(Value::Null);
                let right = scope.lookup(second).cloned().unwrap_or(Value::Null);
                Ok(match op {
                    Operator::Eq => same_key(&left, &right),
                    Operator::Ne => same_key(&left, &right).map(|same| !same),
                    _ => compare(*op, &left, &right),
                })
            }
            ConditionKind::Null { subject, negated } => {
                let value = self.subject(subject, scope)?;
                Ok(Some(value.is_null() != *negated))
            }
            ConditionKind::Between {
                subject,
                bounds,
                negated,
            } => {
                let value = self.subject(subject, scope)?;
                let (low, high) = self.bounds(bounds, scope)?;
                let inside = and(
                    compare(Operator::Ge, &value, &low),
                    compare(Operator::Le, &value, &high),
                );
                Ok(not(inside, *negated))
            }
            ConditionKind::Like {
                subject,
                pattern,
                negated,
            } => {
                let value = self.subject(subject, scope)?;
                let Some(text) = text_of(&value) else {
                    return Ok(None);
                };
                let regex = like_regex(pattern, self.config.case_insensitive_like)?;
                Ok(not(Some(regex.is_match(&text)), *negated))
            }
            ConditionKind::In {
                subject,
                set,
                negated,
            } => {
                let value = self.subject(subject, scope)?;
                let candidates = match set {
                    ValueSet::Values(values) => Cow::Borrowed(values.as_slice()),
                    ValueSet::Query(spec) => Cow::Owned(self.column_values(spec, scope)?),
                };
                let mut found = Some(false);
                for candidate in candidates.iter() {
                    found = or(found, compare(Operator::Eq, &value, candidate));
                }
                Ok(not(found, *negated))
            }
            ConditionKind::DatePart {
                part,
                subject,
                op,
                rhs,
            } => {
                let value = self.subject(subject, scope)?;
                let right = self.operand(rhs, scope)?;
                let extracted = date_part(*part, &value);
                Ok(compare(*op, &extracted, &right))
            }
            ConditionKind::Raw { sql, .. } => Err(Error::driver(format!(
                "raw condition '{sql}' is not supported by the in-memory driver"
            ))),
            ConditionKind::Group(tree) => self.eval_tree(tree, scope),
        }
    }

    fn subject(&self, subject: &Subject, scope: &Scope) -> Result<Value> {
        match subject {
            Subject::Column(name) => Ok(scope.lookup(name).cloned().unwrap_or(Value::Null)),
            Subject::Query(spec) => self.scalar(spec, scope),
        }
    }

    fn operand(&self, operand: &Operand, scope: &Scope) -> Result<Value> {
        match operand {
            Operand::Value(value) => Ok(value.clone()),
            Operand::Column(name) => Ok(scope.lookup(name).cloned().unwrap_or(Value::Null)),
            Operand::Query(spec) => self.scalar(spec, scope),
        }
    }

    fn bounds(&self, bounds: &Bounds, scope: &Scope) -> Result<(Value, Value)> {
        match bounds {
            Bounds::Values(low, high) => Ok((low.clone(), high.clone())),
            Bounds::Query(spec) => {
                let rows = self.select(spec, Some(scope))?;
                let first: Vec<Value> = rows
                    .first()
                    .map(|r| r.values().cloned().collect())
                    .unwrap_or_default();
                if first.len() >= 2 {
                    return Ok((first[0].clone(), first[1].clone()));
                }
                let column: Vec<Value> = rows
                    .iter()
                    .filter_map(|r| r.values().next().cloned())
                    .collect();
                match column.as_slice() {
                    [low, high, ..] => Ok((low.clone(), high.clone())),
                    _ => Err(Error::driver(
                        "between sub-query must yield two bounds",
                    )),
                }
            }
        }
    }

    /// First value of the first row, or NULL.
    pub(crate) fn scalar(&self, spec: &QuerySpec, scope: &Scope) -> Result<Value> {
        let rows = self.select(spec, Some(scope))?;
        Ok(rows
            .first()
            .and_then(|r| r.values().next().cloned())
            .unwrap_or(Value::Null))
    }

    /// First value of every row.
    fn column_values(&self, spec: &QuerySpec, scope: &Scope) -> Result<Vec<Value>> {
        let rows = self.select(spec, Some(scope))?;
        Ok(rows
            .iter()
            .filter_map(|r| r.values().next().cloned())
            .collect())
    }
}

/// Apply a comparison operator; UNKNOWN when either side is NULL.
pub(crate) fn compare(op: Operator, left: &Value, right: &Value) -> Option<bool> {
    if left.is_null() || right.is_null() {
        return None;
    }
    let Some(ordering) = compare_values(left, right) else {
        return Some(op == Operator::Ne);
    };
    Some(match op {
        Operator::Eq => ordering == Ordering::Equal,
        Operator::Ne => ordering != Ordering::Equal,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Ge => ordering != Ordering::Less,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Le => ordering != Ordering::Greater,
    })
}

fn is_numeric(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(_) | Value::Int(_) | Value::BigInt(_) | Value::Double(_) | Value::Decimal(_)
    )
}

fn is_integral(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Int(_) | Value::BigInt(_))
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Text(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => other.as_f64(),
    }
}

/// Column-to-column equality. It follows key identity instead of the
/// coercing comparison, so rows a join pairs up are the rows relation
/// hydration groups together.
pub(crate) fn same_key(left: &Value, right: &Value) -> Option<bool> {
    if left.is_null() || right.is_null() {
        return None;
    }
    Some(left.join_key()? == right.join_key()?)
}

/// Order two non-null values, coercing numbers, numeric text and temporals.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (a, b) if is_integral(a) && is_integral(b) => Some(a.as_i64()?.cmp(&b.as_i64()?)),
        (a, b) if is_numeric(a) && is_numeric(b) => number_of(a)?.partial_cmp(&number_of(b)?),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Text(_), b) if is_numeric(b) => number_of(left)?.partial_cmp(&number_of(b)?),
        (a, Value::Text(_)) if is_numeric(a) => number_of(a)?.partial_cmp(&number_of(right)?),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Timestamp(b)) => Some((i64::from(*a) * MICROS_PER_DAY).cmp(b)),
        (Value::Timestamp(a), Value::Date(b)) => Some(a.cmp(&(i64::from(*b) * MICROS_PER_DAY))),
        (Value::Date(_) | Value::Timestamp(_), Value::Text(b)) => {
            Some(text_of(left)?.as_str().cmp(b.as_str()))
        }
        (Value::Text(a), Value::Date(_) | Value::Timestamp(_)) => {
            Some(a.as_str().cmp(text_of(right)?.as_str()))
        }
        (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
        (Value::Json(a), Value::Json(b)) => (a == b).then_some(Ordering::Equal),
        _ => None,
    }
}

/// Total order used by ORDER BY: NULLs first, incomparable values equal.
pub(crate) fn sort_order(left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_values(left, right).unwrap_or(Ordering::Equal),
    }
}

/// Text rendering used by LIKE and temporal/text comparisons.
pub(crate) fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Array(_) => None,
        Value::Text(s) | Value::Decimal(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Int(v) => Some(v.to_string()),
        Value::BigInt(v) => Some(v.to_string()),
        Value::Double(v) => Some(v.to_string()),
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::Date(_) => temporal(value).map(|t| t.date_text()),
        Value::Timestamp(_) => {
            temporal(value).map(|t| format!("{} {}", t.date_text(), t.time_text()))
        }
        Value::Json(j) => Some(j.to_string()),
    }
}

/// Compile a LIKE pattern: `%` matches any run, `_` any single character.
pub(crate) fn like_regex(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str(if case_insensitive { "(?is)^" } else { "(?s)^" });
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => source.push_str(&regex::escape(&escaped.to_string())),
                None => source.push_str(&regex::escape("\\")),
            },
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| Error::driver(format!("invalid LIKE pattern '{pattern}': {e}")))
}

const MICROS_PER_DAY: i64 = 86_400_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Temporal {
    year: i64,
    month: u32,
    day: u32,
    seconds: u32,
}

impl Temporal {
    fn date_text(&self) -> String {
        format!("{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }

    fn time_text(&self) -> String {
        format!(
            "{:02}:{:02}:{:02}",
            self.seconds / 3600,
            (self.seconds / 60) % 60,
            self.seconds % 60
        )
    }
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

fn parse_temporal_text(text: &str) -> Option<Temporal> {
    let text = text.trim();
    let date = text.get(..10)?;
    let mut parts = date.split('-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    let mut seconds = 0;
    if let Some(rest) = text.get(11..).filter(|rest| !rest.is_empty()) {
        let mut hms = rest.get(..8).unwrap_or(rest).split(':');
        let h: u32 = hms.next()?.parse().ok()?;
        let m: u32 = hms.next().map_or(Some(0), |m| m.parse().ok())?;
        let s: u32 = hms.next().map_or(Some(0), |s| s.parse().ok())?;
        if h >= 24 || m >= 60 || s >= 60 {
            return None;
        }
        seconds = h * 3600 + m * 60 + s;
    }
    Some(Temporal {
        year,
        month,
        day,
        seconds,
    })
}

fn temporal(value: &Value) -> Option<Temporal> {
    match value {
        Value::Date(days) => {
            let (year, month, day) = civil_from_days(i64::from(*days));
            Some(Temporal {
                year,
                month,
                day,
                seconds: 0,
            })
        }
        Value::Timestamp(micros) => {
            let days = micros.div_euclid(MICROS_PER_DAY);
            let seconds = (micros.rem_euclid(MICROS_PER_DAY) / 1_000_000) as u32;
            let (year, month, day) = civil_from_days(days);
            Some(Temporal {
                year,
                month,
                day,
                seconds,
            })
        }
        Value::Text(text) => parse_temporal_text(text),
        _ => None,
    }
}

/// Extract a date part; NULL when the value is not temporal.
pub(crate) fn date_part(part: DatePart, value: &Value) -> Value {
    let Some(t) = temporal(value) else {
        return Value::Null;
    };
    match part {
        DatePart::Date => Value::Text(t.date_text()),
        DatePart::Year => Value::BigInt(t.year),
        DatePart::Month => Value::Int(t.month as i32),
        DatePart::Day => Value::Int(t.day as i32),
        DatePart::Time => Value::Text(t.time_text()),
    }
}
