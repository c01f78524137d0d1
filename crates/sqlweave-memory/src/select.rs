//! The read pipeline: sources, joins, filtering, grouping, projection,
//! unions, ordering and paging, in that order.

use crate::eval::{Engine, Scope, compare, sort_order, with_outer};
use sqlweave_core::{Error, Result, Row, Value};
use sqlweave_query::{
    AggregateFn, Direction, GroupItem, Join, JoinKind, Operator, OrderItem, QuerySpec, SelectItem,
    TableRef, UnionSource,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A result row and the scope it was projected from.
///
/// ORDER BY resolves names against the projected row first (so aliases
/// work) and falls back to the source scope.
struct Output {
    row: Row,
    scope: Scope,
}

enum SortKey {
    Value(Value, Direction),
    Shuffle(u64),
}

fn unsupported(what: &str, sql: &str) -> Error {
    Error::driver(format!(
        "raw {what} '{sql}' is not supported by the in-memory driver"
    ))
}

/// Split `expr AS alias`.
fn split_alias(expr: &str) -> (&str, Option<&str>) {
    let lower = expr.to_ascii_lowercase();
    match lower.find(" as ") {
        Some(i) => (expr[..i].trim(), Some(expr[i + 4..].trim())),
        None => (expr.trim(), None),
    }
}

/// Output name of a plain column reference.
fn output_name(expr: &str) -> &str {
    expr.rsplit_once('.').map_or(expr, |(_, column)| column)
}

fn push_star(row: &mut Row, scope: &Scope, qualifier: Option<&str>) {
    for (column, value) in scope.star(qualifier) {
        if !row.contains(column) {
            row.set(column, value.clone());
        }
    }
}

fn dedup(outputs: &mut Vec<Output>) {
    let mut seen: Vec<Row> = Vec::with_capacity(outputs.len());
    outputs.retain(|output| {
        if seen.contains(&output.row) {
            false
        } else {
            seen.push(output.row.clone());
            true
        }
    });
}

fn is_aggregate(spec: &QuerySpec) -> bool {
    !spec.groups.is_empty()
        || spec
            .selects
            .iter()
            .any(|item| matches!(item, SelectItem::Aggregate { .. }))
}

impl Engine<'_> {
    /// Evaluate a read. `outer` is the enclosing row for correlated
    /// sub-queries.
    pub(crate) fn select(&self, spec: &QuerySpec, outer: Option<&Scope>) -> Result<Vec<Row>> {
        Ok(self
            .select_outputs(spec, outer)?
            .into_iter()
            .map(|output| output.row)
            .collect())
    }

    fn select_outputs(&self, spec: &QuerySpec, outer: Option<&Scope>) -> Result<Vec<Output>> {
        let scopes = self.filtered(spec, outer)?;

        let mut outputs = if is_aggregate(spec) {
            self.grouped(spec, scopes, outer)?
        } else {
            scopes
                .into_iter()
                .map(|scope| {
                    let row = self.project(&spec.selects, &scope, outer)?;
                    Ok(Output { row, scope })
                })
                .collect::<Result<Vec<_>>>()?
        };
        if spec.distinct {
            dedup(&mut outputs);
        }

        for union in &spec.unions {
            match &union.source {
                UnionSource::Query(member) => {
                    let rows = self.select(member, outer)?;
                    outputs.extend(rows.into_iter().map(|row| Output {
                        scope: Scope::from_row("", &row),
                        row,
                    }));
                }
                UnionSource::Raw { sql, .. } => return Err(unsupported("union", sql)),
            }
            if !union.all {
                dedup(&mut outputs);
            }
        }

        self.order(&spec.orders, &mut outputs, outer)?;

        let offset = spec.offset.map_or(0, |n| n as usize);
        let limit = spec.limit.map_or(usize::MAX, |n| n as usize);
        Ok(outputs.into_iter().skip(offset).take(limit).collect())
    }

    /// Source rows after joins and WHERE.
    pub(crate) fn filtered(&self, spec: &QuerySpec, outer: Option<&Scope>) -> Result<Vec<Scope>> {
        let mut scopes = self.source(&spec.source, outer)?;
        for join in &spec.joins {
            scopes = self.join(scopes, join, outer)?;
        }
        let mut kept = Vec::with_capacity(scopes.len());
        for scope in scopes {
            if self.matches(&spec.wheres, &with_outer(&scope, outer))? {
                kept.push(scope);
            }
        }
        Ok(kept)
    }

    fn source(&self, source: &TableRef, outer: Option<&Scope>) -> Result<Vec<Scope>> {
        match source {
            TableRef::Table { name, alias } => {
                let qualifier = alias.as_deref().unwrap_or(name);
                Ok(self
                    .tables
                    .get(name)
                    .map(|rows| {
                        rows.iter()
                            .map(|row| Scope::from_row(qualifier, row))
                            .collect()
                    })
                    .unwrap_or_default())
            }
            TableRef::Query { spec, alias } => Ok(self
                .select(spec, outer)?
                .iter()
                .map(|row| Scope::from_row(alias, row))
                .collect()),
        }
    }

    pub(crate) fn join(
        &self,
        left: Vec<Scope>,
        join: &Join,
        outer: Option<&Scope>,
    ) -> Result<Vec<Scope>> {
        let right = self.source(&join.target, outer)?;
        let left_columns = left.first().map(Scope::columns).unwrap_or_default();
        let right_columns = right.first().map(Scope::columns).unwrap_or_default();
        let keep_left = matches!(join.kind, JoinKind::Left | JoinKind::Outer);
        let keep_right = matches!(join.kind, JoinKind::Right | JoinKind::Outer);

        let mut joined = Vec::new();
        let mut right_matched = vec![false; right.len()];
        for l in &left {
            let mut matched = false;
            for (i, r) in right.iter().enumerate() {
                let combined = l.join(r);
                if self.matches(&join.on, &with_outer(&combined, outer))? {
                    matched = true;
                    right_matched[i] = true;
                    joined.push(combined);
                }
            }
            if !matched && keep_left {
                joined.push(l.join(&Scope::nulls(&right_columns)));
            }
        }
        if keep_right {
            for (r, matched) in right.iter().zip(right_matched) {
                if !matched {
                    joined.push(Scope::nulls(&left_columns).join(r));
                }
            }
        }
        Ok(joined)
    }

    fn project(&self, items: &[SelectItem], scope: &Scope, outer: Option<&Scope>) -> Result<Row> {
        let mut row = Row::new();
        if items.is_empty() {
            push_star(&mut row, scope, None);
            return Ok(row);
        }
        for item in items {
            match item {
                SelectItem::Column(expr) => {
                    let (expr, alias) = split_alias(expr);
                    if expr == "*" {
                        push_star(&mut row, scope, None);
                    } else if let Some(qualifier) = expr.strip_suffix(".*") {
                        push_star(&mut row, scope, Some(qualifier));
                    } else {
                        let value = with_outer(scope, outer)
                            .lookup(expr)
                            .cloned()
                            .unwrap_or(Value::Null);
                        row.set(alias.unwrap_or_else(|| output_name(expr)), value);
                    }
                }
                SelectItem::Sub { spec, alias } => {
                    let value = self.scalar(spec, &with_outer(scope, outer))?;
                    row.set(alias.as_str(), value);
                }
                SelectItem::Raw { sql, .. } => return Err(unsupported("select", sql)),
                SelectItem::Aggregate { alias, .. } => {
                    return Err(Error::driver(format!(
                        "aggregate '{alias}' evaluated outside a group"
                    )));
                }
            }
        }
        Ok(row)
    }

    fn grouped(
        &self,
        spec: &QuerySpec,
        scopes: Vec<Scope>,
        outer: Option<&Scope>,
    ) -> Result<Vec<Output>> {
        let mut groups: Vec<(Vec<Value>, Vec<Scope>)> = Vec::new();
        if spec.groups.is_empty() {
            groups.push((Vec::new(), scopes));
        } else {
            for scope in scopes {
                let visible = with_outer(&scope, outer);
                let key = spec
                    .groups
                    .iter()
                    .map(|group| match group {
                        GroupItem::Column(column) => {
                            Ok(visible.lookup(column).cloned().unwrap_or(Value::Null))
                        }
                        GroupItem::Raw { sql, .. } => Err(unsupported("group by", sql)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                match groups.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, members)) => members.push(scope),
                    None => groups.push((key, vec![scope])),
                }
            }
        }

        let mut outputs = Vec::with_capacity(groups.len());
        for (_, members) in groups {
            let first = members.first().cloned().unwrap_or_default();
            let mut row = Row::new();
            for item in &spec.selects {
                match item {
                    SelectItem::Aggregate {
                        func,
                        column,
                        alias,
                    } => {
                        let value = aggregate(*func, column.as_deref(), &members, outer);
                        row.set(alias.as_str(), value);
                    }
                    other => {
                        let projected = self.project(std::slice::from_ref(other), &first, outer)?;
                        for (column, value) in projected.iter() {
                            row.set(column, value.clone());
                        }
                    }
                }
            }
            let scope = Scope::from_row("", &row).join(&first);
            if self.matches(&spec.havings, &with_outer(&scope, outer))? {
                outputs.push(Output { row, scope });
            }
        }
        Ok(outputs)
    }

    fn order(
        &self,
        orders: &[OrderItem],
        outputs: &mut Vec<Output>,
        outer: Option<&Scope>,
    ) -> Result<()> {
        if orders.is_empty() {
            return Ok(());
        }
        let mut keyed = Vec::with_capacity(outputs.len());
        for output in outputs.drain(..) {
            let visible = Scope::from_row("", &output.row).join(&output.scope);
            let visible = with_outer(&visible, outer);
            let mut keys = Vec::with_capacity(orders.len());
            for order in orders {
                keys.push(match order {
                    OrderItem::Column { column, direction } => SortKey::Value(
                        visible.lookup(column).cloned().unwrap_or(Value::Null),
                        *direction,
                    ),
                    OrderItem::Query { spec, direction } => {
                        SortKey::Value(self.scalar(spec, &visible)?, *direction)
                    }
                    OrderItem::Shuffle { seed } => {
                        let content = serde_json::to_string(&output.row).map_err(|e| {
                            Error::driver(format!("failed to hash row for shuffle: {e}"))
                        })?;
                        let mut hasher = DefaultHasher::new();
                        seed.hash(&mut hasher);
                        content.hash(&mut hasher);
                        SortKey::Shuffle(hasher.finish())
                    }
                    OrderItem::Raw { sql, .. } => return Err(unsupported("order by", sql)),
                });
            }
            keyed.push((keys, output));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            for (x, y) in a.iter().zip(b) {
                let ordering = match (x, y) {
                    (SortKey::Value(x, direction), SortKey::Value(y, _)) => {
                        let ordering = sort_order(x, y);
                        match direction {
                            Direction::Asc => ordering,
                            Direction::Desc => ordering.reverse(),
                        }
                    }
                    (SortKey::Shuffle(x), SortKey::Shuffle(y)) => x.cmp(y),
                    _ => std::cmp::Ordering::Equal,
                };
                if ordering.is_ne() {
                    return ordering;
                }
            }
            std::cmp::Ordering::Equal
        });
        outputs.extend(keyed.into_iter().map(|(_, output)| output));
        Ok(())
    }
}

fn aggregate(
    func: AggregateFn,
    column: Option<&str>,
    members: &[Scope],
    outer: Option<&Scope>,
) -> Value {
    let column = column.filter(|c| *c != "*");
    let Some(column) = column else {
        return match func {
            AggregateFn::Count => Value::BigInt(members.len() as i64),
            _ => Value::Null,
        };
    };
    let values: Vec<Value> = members
        .iter()
        .filter_map(|scope| with_outer(scope, outer).lookup(column).cloned())
        .filter(|v| !v.is_null())
        .collect();

    match func {
        AggregateFn::Count => Value::BigInt(values.len() as i64),
        AggregateFn::Sum | AggregateFn::Average if values.is_empty() => Value::Null,
        AggregateFn::Sum => {
            if values.iter().all(|v| v.as_i64().is_some() && !matches!(v, Value::Double(_))) {
                Value::BigInt(values.iter().filter_map(Value::as_i64).sum())
            } else {
                Value::Double(values.iter().filter_map(number).sum())
            }
        }
        AggregateFn::Average => {
            let numbers: Vec<f64> = values.iter().filter_map(number).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        AggregateFn::Min => values
            .into_iter()
            .min_by(sort_order)
            .unwrap_or(Value::Null),
        AggregateFn::Max => values
            .into_iter()
            .max_by(sort_order)
            .unwrap_or(Value::Null),
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Text(s) => s.trim().parse().ok(),
        other => other.as_f64(),
    }
}

/// Whether two key tuples are equal under SQL comparison.
pub(crate) fn keys_equal(a: &[Option<&Value>], b: &[Option<&Value>]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => compare(Operator::Eq, x, y) == Some(true),
            _ => false,
        })
}
