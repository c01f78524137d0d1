//! The driver boundary.
//!
//! A [`Driver`] turns [`QuerySpec`]s into effects against some storage.
//! The query layer never renders SQL itself; drivers own rendering,
//! evaluation, cancellation and retries.

use crate::spec::QuerySpec;
use asupersync::{Cx, Outcome};
use sqlweave_core::{Error, Row, Value};
use std::future::Future;

/// Result of an insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertResult {
    /// Generated key of the last inserted row, `Value::Null` when none.
    pub last_insert_id: Value,
    pub affected: u64,
}

/// Executes query specifications.
///
/// Specifications reaching a driver are already resolved: soft-delete
/// visibility has been turned into a WHERE condition, and relation
/// metadata has been expanded away. Drivers may ignore
/// [`QuerySpec::trashed`] and [`QuerySpec::options`].
pub trait Driver: Send + Sync {
    /// Run a read and return its rows.
    fn select(
        &self,
        cx: &Cx,
        spec: &QuerySpec,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Run several reads as one logical batch.
    ///
    /// Result sets come back in the order of `specs`.
    fn select_batch(
        &self,
        cx: &Cx,
        specs: &[QuerySpec],
    ) -> impl Future<Output = Outcome<Vec<Vec<Row>>, Error>> + Send {
        async move {
            let mut sets = Vec::with_capacity(specs.len());
            for spec in specs {
                match self.select(cx, spec).await {
                    Outcome::Ok(rows) => sets.push(rows),
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                }
            }
            Outcome::Ok(sets)
        }
    }

    /// Run a spec whose selection is a single aggregate and return its value.
    fn aggregate(
        &self,
        cx: &Cx,
        spec: &QuerySpec,
    ) -> impl Future<Output = Outcome<Value, Error>> + Send;

    /// Whether the read matches at least one row.
    fn exists(
        &self,
        cx: &Cx,
        spec: &QuerySpec,
    ) -> impl Future<Output = Outcome<bool, Error>> + Send {
        async move {
            self.select(cx, spec)
                .await
                .and_then(|rows| Outcome::Ok(!rows.is_empty()))
        }
    }

    /// Insert rows into the spec's source table.
    ///
    /// With `ignore`, rows that collide with an existing primary key are
    /// skipped instead of failing.
    fn insert(
        &self,
        cx: &Cx,
        spec: &QuerySpec,
        rows: &[Row],
        ignore: bool,
    ) -> impl Future<Output = Outcome<InsertResult, Error>> + Send;

    /// Apply `changes` to every matching row.
    fn update(
        &self,
        cx: &Cx,
        spec: &QuerySpec,
        changes: &Row,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Update each matching row with the entry of `rows` whose `keys`
    /// columns equal its own.
    fn bulk_update(
        &self,
        cx: &Cx,
        spec: &QuerySpec,
        rows: &[Row],
        keys: &[&str],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Physically delete every matching row.
    fn delete(&self, cx: &Cx, spec: &QuerySpec)
    -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Set `column` to `at` on every matching row.
    fn soft_delete(
        &self,
        cx: &Cx,
        spec: &QuerySpec,
        column: &str,
        at: &Value,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;

    /// Clear `column` on every matching row.
    fn restore(
        &self,
        cx: &Cx,
        spec: &QuerySpec,
        column: &str,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;
}
