//! Terminal operations: reads, aggregates and mutations.
//!
//! Every operation works on a resolved copy of the specification, so the
//! stored builder state (soft-delete mode, WHERE tree, options) is never
//! changed by executing it.

use crate::clause::{AggregateFn, SelectItem, TableRef};
use crate::driver::{Driver, InsertResult};
use crate::eager::{self, Expansion};
use crate::spec::{QuerySpec, SpecOptions};
use asupersync::{Cx, Outcome};
use indexmap::IndexMap;
use sqlweave_core::{Error, JoinKey, Row, Value, try_outcome};

/// Insertion-ordered map produced by [`QuerySpec::pluck`].
pub type PluckMap<T = Value> = IndexMap<JoinKey, T>;

const AGGREGATE_ALIAS: &str = "aggregate";

impl QuerySpec {
    /// Fetch the rows of this spec followed by one result set per along query.
    ///
    /// Relations are hydrated onto the first set and the row hook runs on
    /// it. Everything is submitted as one batch.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, driver),
        fields(table = self.source.qualifier())
    )]
    pub async fn get_all_sets<D: Driver>(
        &self,
        cx: &Cx,
        driver: &D,
    ) -> Outcome<Vec<Vec<Row>>, Error> {
        self.fetch_sets(cx, driver, false).await
    }

    async fn fetch_sets<D: Driver>(
        &self,
        cx: &Cx,
        driver: &D,
        skip_hook: bool,
    ) -> Outcome<Vec<Vec<Row>>, Error> {
        let relations = self.options.relations.as_ref();
        let Expansion { root, children } = match relations {
            Some(plan) => eager::expand(self, plan),
            None => {
                let mut root = self.resolved();
                root.options = SpecOptions::default();
                Expansion {
                    root,
                    children: Vec::new(),
                }
            }
        };
        let child_count = children.len();

        let mut batch = Vec::with_capacity(1 + child_count + self.options.along.len());
        batch.push(root);
        batch.extend(children);
        batch.extend(self.options.along.iter().map(|along| {
            let mut along = along.resolved();
            along.options = SpecOptions::default();
            along
        }));
        let expected = batch.len();

        tracing::debug!(
            relations = child_count,
            along = self.options.along.len(),
            "Submitting read batch"
        );
        let sets = if expected == 1 {
            vec![try_outcome!(driver.select(cx, &batch[0]).await)]
        } else {
            try_outcome!(driver.select_batch(cx, &batch).await)
        };
        if sets.len() != expected {
            tracing::warn!(
                expected,
                actual = sets.len(),
                "Driver returned the wrong number of result sets"
            );
            return Outcome::Err(Error::driver(format!(
                "batch of {expected} specifications returned {} result sets",
                sets.len()
            )));
        }

        let mut sets = sets.into_iter();
        let mut root_rows = sets.next().unwrap_or_default();
        let child_sets: Vec<Vec<Row>> = sets.by_ref().take(child_count).collect();
        if let Some(plan) = relations {
            root_rows = eager::reconstruct(plan, root_rows, child_sets);
        }
        if !skip_hook {
            if let Some(hook) = &self.options.row_hook {
                root_rows = try_outcome!(@result hook.apply(root_rows));
            }
        }
        tracing::debug!(rows = root_rows.len(), "Read complete");

        let mut out = Vec::with_capacity(1 + sets.len());
        out.push(root_rows);
        out.extend(sets);
        Outcome::Ok(out)
    }

    /// Fetch every matching row.
    pub async fn get<D: Driver>(&self, cx: &Cx, driver: &D) -> Outcome<Vec<Row>, Error> {
        self.get_all_sets(cx, driver)
            .await
            .and_then(|sets| Outcome::Ok(sets.into_iter().next().unwrap_or_default()))
    }

    /// Fetch the first matching row.
    pub async fn first<D: Driver>(&self, cx: &Cx, driver: &D) -> Outcome<Option<Row>, Error> {
        let spec = self.clone().limit(1);
        spec.get(cx, driver)
            .await
            .and_then(|rows| Outcome::Ok(rows.into_iter().next()))
    }

    /// Whether at least one row matches.
    pub async fn exists<D: Driver>(&self, cx: &Cx, driver: &D) -> Outcome<bool, Error> {
        let mut spec = self.resolved();
        spec.options = SpecOptions::default();
        driver.exists(cx, &spec).await
    }

    /// The spec reduced to a single aggregate over its matching rows.
    ///
    /// Ordering and paging are dropped. Grouped, distinct or unioned specs
    /// are wrapped so the aggregate runs over their result rows.
    pub fn aggregate_spec(&self, func: AggregateFn, column: Option<&str>) -> QuerySpec {
        let mut inner = self.resolved();
        inner.options = SpecOptions::default();
        inner.orders.clear();
        inner.limit = None;
        inner.offset = None;

        let wrap = inner.distinct || !inner.groups.is_empty() || !inner.unions.is_empty();
        let mut spec = if wrap {
            QuerySpec {
                source: TableRef::query(inner, "aggregate_table"),
                ..QuerySpec::table("aggregate_table")
            }
        } else {
            inner
        };
        spec.selects = vec![SelectItem::Aggregate {
            func,
            column: column.map(str::to_string),
            alias: AGGREGATE_ALIAS.to_string(),
        }];
        spec
    }

    async fn aggregate<D: Driver>(
        &self,
        cx: &Cx,
        driver: &D,
        func: AggregateFn,
        column: Option<&str>,
    ) -> Outcome<Value, Error> {
        let spec = self.aggregate_spec(func, column);
        tracing::debug!(func = func.as_str(), column = ?column, "Running aggregate");
        driver.aggregate(cx, &spec).await
    }

    /// Number of matching rows.
    pub async fn count<D: Driver>(&self, cx: &Cx, driver: &D) -> Outcome<u64, Error> {
        self.aggregate(cx, driver, AggregateFn::Count, None)
            .await
            .and_then(|value| match value {
                Value::Null => Outcome::Ok(0),
                other => match other.as_i64() {
                    Some(n) => Outcome::Ok(u64::try_from(n).unwrap_or(0)),
                    None => Outcome::Err(Error::driver(format!(
                        "count returned a non-integer {}",
                        other.type_name()
                    ))),
                },
            })
    }

    pub async fn sum<D: Driver>(&self, cx: &Cx, driver: &D, column: &str) -> Outcome<Value, Error> {
        self.aggregate(cx, driver, AggregateFn::Sum, Some(column))
            .await
    }

    pub async fn average<D: Driver>(
        &self,
        cx: &Cx,
        driver: &D,
        column: &str,
    ) -> Outcome<Value, Error> {
        self.aggregate(cx, driver, AggregateFn::Average, Some(column))
            .await
    }

    pub async fn min<D: Driver>(&self, cx: &Cx, driver: &D, column: &str) -> Outcome<Value, Error> {
        self.aggregate(cx, driver, AggregateFn::Min, Some(column))
            .await
    }

    pub async fn max<D: Driver>(&self, cx: &Cx, driver: &D, column: &str) -> Outcome<Value, Error> {
        self.aggregate(cx, driver, AggregateFn::Max, Some(column))
            .await
    }

    /// Map `key` to `value` over every matching row.
    ///
    /// Rows whose key is NULL or missing are skipped; a repeated key keeps
    /// its first position and its last value. With `skip_hook` the stored
    /// row hook does not run.
    pub async fn pluck<D: Driver>(
        &self,
        cx: &Cx,
        driver: &D,
        key: &str,
        value: &str,
        skip_hook: bool,
    ) -> Outcome<PluckMap<Value>, Error> {
        let rows = try_outcome!(self.pluck_source(cx, driver, skip_hook).await);
        let mut map = PluckMap::with_capacity(rows.len());
        for row in rows {
            if let Some(k) = row.get(key).and_then(Value::join_key) {
                map.insert(k, row.get(value).cloned().unwrap_or(Value::Null));
            }
        }
        Outcome::Ok(map)
    }

    /// Map `key` to the whole row over every matching row.
    pub async fn pluck_rows<D: Driver>(
        &self,
        cx: &Cx,
        driver: &D,
        key: &str,
        skip_hook: bool,
    ) -> Outcome<PluckMap<Row>, Error> {
        let rows = try_outcome!(self.pluck_source(cx, driver, skip_hook).await);
        let mut map = PluckMap::with_capacity(rows.len());
        for row in rows {
            if let Some(k) = row.get(key).and_then(Value::join_key) {
                map.insert(k, row);
            }
        }
        Outcome::Ok(map)
    }

    async fn pluck_source<D: Driver>(
        &self,
        cx: &Cx,
        driver: &D,
        skip_hook: bool,
    ) -> Outcome<Vec<Row>, Error> {
        self.fetch_sets(cx, driver, skip_hook)
            .await
            .and_then(|sets| Outcome::Ok(sets.into_iter().next().unwrap_or_default()))
    }

    // ==================== Mutations ====================

    /// Insert rows into the source table.
    ///
    /// With timestamps enabled, missing created/updated columns are set to
    /// the current time.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, driver, rows),
        fields(table = self.source.qualifier(), rows = rows.len())
    )]
    pub async fn insert<D: Driver>(
        &self,
        cx: &Cx,
        driver: &D,
        mut rows: Vec<Row>,
        ignore: bool,
    ) -> Outcome<InsertResult, Error> {
        if let Some(ts) = self.policy.timestamps {
            let now = Value::now();
            for row in &mut rows {
                row.set_default(ts.created, now.clone());
                row.set_default(ts.updated, now.clone());
            }
        }
        driver.insert(cx, self, &rows, ignore).await
    }

    /// Apply `changes` to every matching row.
    ///
    /// Unless `silent`, the updated-at column is set when timestamps are
    /// enabled and `changes` does not set it.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, driver, changes),
        fields(table = self.source.qualifier())
    )]
    pub async fn update<D: Driver>(
        &self,
        cx: &Cx,
        driver: &D,
        mut changes: Row,
        silent: bool,
    ) -> Outcome<u64, Error> {
        if !silent {
            if let Some(ts) = self.policy.timestamps {
                changes.set_default(ts.updated, Value::now());
            }
        }
        driver.update(cx, &self.resolved(), &changes).await
    }

    /// Update many rows at once, matching each entry of `rows` by `keys`.
    pub async fn bulk_update<D: Driver>(
        &self,
        cx: &Cx,
        driver: &D,
        mut rows: Vec<Row>,
        keys: &[&str],
        silent: bool,
    ) -> Outcome<u64, Error> {
        if !silent {
            if let Some(ts) = self.policy.timestamps {
                let now = Value::now();
                for row in &mut rows {
                    row.set_default(ts.updated, now.clone());
                }
            }
        }
        tracing::debug!(
            table = self.source.qualifier(),
            rows = rows.len(),
            keys = ?keys,
            "Bulk update"
        );
        driver
            .bulk_update(cx, &self.resolved(), &rows, keys)
            .await
    }

    /// Delete every matching row.
    ///
    /// With `soft`, the soft-delete column is set instead; that fails with
    /// [`Error::SoftDeleteUnsupported`] when the table has none.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, driver),
        fields(table = self.source.qualifier())
    )]
    pub async fn delete<D: Driver>(&self, cx: &Cx, driver: &D, soft: bool) -> Outcome<u64, Error> {
        let spec = self.resolved();
        if !soft {
            return driver.delete(cx, &spec).await;
        }
        let Some(column) = self.policy.soft_delete else {
            return Outcome::Err(Error::SoftDeleteUnsupported {
                model: self.model_name(),
            });
        };
        driver.soft_delete(cx, &spec, column, &Value::now()).await
    }

    /// Clear the soft-delete column of every matching trashed row.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, driver),
        fields(table = self.source.qualifier())
    )]
    pub async fn restore<D: Driver>(&self, cx: &Cx, driver: &D) -> Outcome<u64, Error> {
        let spec = try_outcome!(@result self.clone().only_trashed());
        let Some(column) = spec.policy.soft_delete else {
            return Outcome::Err(Error::SoftDeleteUnsupported {
                model: self.model_name(),
            });
        };
        driver.restore(cx, &spec.resolved(), column).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clause::Direction;

    #[test]
    fn aggregate_spec_drops_paging() {
        let spec = QuerySpec::table("posts")
            .soft_deletes("deleted_at")
            .order_by("id", Direction::Desc)
            .limit(3)
            .offset(1);
        let agg = spec.aggregate_spec(AggregateFn::Count, None);
        assert!(agg.orders.is_empty());
        assert_eq!(agg.limit, None);
        assert_eq!(agg.offset, None);
        assert_eq!(agg.wheres.len(), 1);
        assert_eq!(
            agg.selects,
            vec![SelectItem::Aggregate {
                func: AggregateFn::Count,
                column: None,
                alias: "aggregate".to_string()
            }]
        );
    }

    #[test]
    fn grouped_aggregate_wraps_inner_spec() {
        let spec = QuerySpec::table("orders").group_by(["customer_id"]);
        let agg = spec.aggregate_spec(AggregateFn::Max, Some("total"));
        let TableRef::Query { spec: inner, alias } = &agg.source else {
            panic!("expected wrapped source");
        };
        assert_eq!(alias, "aggregate_table");
        assert_eq!(inner.groups.len(), 1);
        assert!(agg.groups.is_empty());
    }
}
