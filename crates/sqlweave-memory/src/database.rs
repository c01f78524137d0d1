//! The in-memory database and its `Driver` implementation.

use crate::config::MemoryConfig;
use crate::eval::{Engine, Scope};
use crate::select::keys_equal;
use asupersync::{Cx, Outcome};
use sqlweave_core::{Error, Result, Row, Value};
use sqlweave_query::{Driver, InsertResult, QuerySpec, TableRef};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

type Tables = HashMap<String, Vec<Row>>;

/// A schemaless set of tables held in memory.
///
/// Rows are stored exactly as inserted; a column a row does not carry
/// reads as NULL. All access goes through one mutex, so a database can be
/// shared across tasks and each operation (including a whole read batch)
/// sees a consistent snapshot.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    config: MemoryConfig,
    tables: Mutex<Tables>,
}

impl MemoryDatabase {
    /// Create an empty database with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            config,
            tables: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append rows to a table verbatim, creating it if needed.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        self.lock()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Snapshot of a table's rows; empty when the table does not exist.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock().get(table).cloned().unwrap_or_default()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop every table.
    pub fn clear(&self) {
        self.lock().clear();
    }

    // ==================== Synchronous operations ====================

    pub fn select_sync(&self, spec: &QuerySpec) -> Result<Vec<Row>> {
        let tables = self.lock();
        let rows = self.engine(&tables).select(spec, None)?;
        tracing::trace!(
            table = spec.source.qualifier(),
            rows = rows.len(),
            "Memory select"
        );
        Ok(rows)
    }

    pub fn select_batch_sync(&self, specs: &[QuerySpec]) -> Result<Vec<Vec<Row>>> {
        let tables = self.lock();
        let engine = self.engine(&tables);
        specs.iter().map(|spec| engine.select(spec, None)).collect()
    }

    pub fn aggregate_sync(&self, spec: &QuerySpec) -> Result<Value> {
        let rows = self.select_sync(spec)?;
        Ok(rows
            .first()
            .and_then(|row| row.values().next().cloned())
            .unwrap_or(Value::Null))
    }

    pub fn insert_sync(
        &self,
        spec: &QuerySpec,
        rows: &[Row],
        ignore: bool,
    ) -> Result<InsertResult> {
        let table = mutation_table(spec)?;
        let key = self.config.auto_increment_column.as_str();
        let mut tables = self.lock();
        let stored = tables.entry(table.to_string()).or_default();

        let mut next_id = stored
            .iter()
            .filter_map(|row| row.get(key).and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1;
        let mut last_insert_id = Value::Null;
        let mut affected = 0;

        for row in rows {
            let mut row = row.clone();
            let given = row.get(key).filter(|v| !v.is_null()).cloned();
            match given {
                None => {
                    row.set(key, Value::BigInt(next_id));
                    next_id += 1;
                }
                Some(id) => {
                    let duplicate = stored
                        .iter()
                        .any(|existing| keys_equal(&[existing.get(key)], &[Some(&id)]));
                    if duplicate {
                        if ignore {
                            continue;
                        }
                        return Err(Error::driver(format!(
                            "duplicate value {id:?} for '{table}.{key}'"
                        )));
                    }
                    if let Some(n) = id.as_i64() {
                        next_id = next_id.max(n + 1);
                    }
                }
            }
            last_insert_id = row.get(key).cloned().unwrap_or(Value::Null);
            stored.push(row);
            affected += 1;
        }
        tracing::debug!(table, affected, "Memory insert");
        Ok(InsertResult {
            last_insert_id,
            affected,
        })
    }

    /// Indices of the rows of the source table matched by `spec`.
    fn matching(&self, tables: &Tables, spec: &QuerySpec) -> Result<Vec<usize>> {
        let table = mutation_table(spec)?;
        let qualifier = spec.source.qualifier();
        let engine = self.engine(tables);
        let rows = tables.get(table).map(Vec::as_slice).unwrap_or_default();

        let mut indices = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            let mut scopes = vec![Scope::from_row(qualifier, row)];
            for join in &spec.joins {
                scopes = engine.join(scopes, join, None)?;
            }
            let mut hit = false;
            for scope in &scopes {
                if engine.matches(&spec.wheres, scope)? {
                    hit = true;
                    break;
                }
            }
            if hit {
                indices.push(index);
            }
        }
        if let Some(limit) = spec.limit {
            indices.truncate(limit as usize);
        }
        Ok(indices)
    }

    fn modify(
        &self,
        spec: &QuerySpec,
        mut apply: impl FnMut(&mut Row) -> bool,
    ) -> Result<u64> {
        let mut tables = self.lock();
        let indices = self.matching(&tables, spec)?;
        let table = mutation_table(spec)?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let mut affected = 0;
        for index in indices {
            if apply(&mut rows[index]) {
                affected += 1;
            }
        }
        Ok(affected)
    }

    pub fn update_sync(&self, spec: &QuerySpec, changes: &Row) -> Result<u64> {
        let affected = self.modify(spec, |row| {
            for (column, value) in changes.iter() {
                row.set(column, value.clone());
            }
            true
        })?;
        tracing::debug!(table = spec.source.qualifier(), affected, "Memory update");
        Ok(affected)
    }

    pub fn bulk_update_sync(&self, spec: &QuerySpec, rows: &[Row], keys: &[&str]) -> Result<u64> {
        if keys.is_empty() {
            return Err(Error::driver("bulk update requires at least one key column"));
        }
        let affected = self.modify(spec, |row| {
            let own: Vec<Option<&Value>> = keys.iter().map(|k| row.get(k)).collect();
            let Some(entry) = rows.iter().find(|entry| {
                let theirs: Vec<Option<&Value>> = keys.iter().map(|k| entry.get(k)).collect();
                keys_equal(&own, &theirs)
            }) else {
                return false;
            };
            for (column, value) in entry.iter() {
                if !keys.contains(&column) {
                    row.set(column, value.clone());
                }
            }
            true
        })?;
        tracing::debug!(table = spec.source.qualifier(), affected, "Memory bulk update");
        Ok(affected)
    }

    pub fn delete_sync(&self, spec: &QuerySpec) -> Result<u64> {
        let mut tables = self.lock();
        let indices: HashSet<usize> = self.matching(&tables, spec)?.into_iter().collect();
        let table = mutation_table(spec)?;
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };
        let mut index = 0;
        rows.retain(|_| {
            let keep = !indices.contains(&index);
            index += 1;
            keep
        });
        tracing::debug!(table, affected = indices.len(), "Memory delete");
        Ok(indices.len() as u64)
    }

    pub fn soft_delete_sync(&self, spec: &QuerySpec, column: &str, at: &Value) -> Result<u64> {
        self.modify(spec, |row| {
            row.set(column, at.clone());
            true
        })
    }

    pub fn restore_sync(&self, spec: &QuerySpec, column: &str) -> Result<u64> {
        self.modify(spec, |row| {
            row.set(column, Value::Null);
            true
        })
    }

    fn engine<'a>(&'a self, tables: &'a Tables) -> Engine<'a> {
        Engine {
            tables,
            config: &self.config,
        }
    }
}

/// Mutations target a plain table.
fn mutation_table(spec: &QuerySpec) -> Result<&str> {
    match &spec.source {
        TableRef::Table { name, .. } => Ok(name),
        TableRef::Query { alias, .. } => Err(Error::driver(format!(
            "cannot mutate the derived table '{alias}'"
        ))),
    }
}

impl Driver for MemoryDatabase {
    fn select(
        &self,
        _cx: &Cx,
        spec: &QuerySpec,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
        let result = self.select_sync(spec);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn select_batch(
        &self,
        _cx: &Cx,
        specs: &[QuerySpec],
    ) -> impl Future<Output = Outcome<Vec<Vec<Row>>, Error>> + Send {
        let result = self.select_batch_sync(specs);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn aggregate(
        &self,
        _cx: &Cx,
        spec: &QuerySpec,
    ) -> impl Future<Output = Outcome<Value, Error>> + Send {
        let result = self.aggregate_sync(spec);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn insert(
        &self,
        _cx: &Cx,
        spec: &QuerySpec,
        rows: &[Row],
        ignore: bool,
    ) -> impl Future<Output = Outcome<InsertResult, Error>> + Send {
        let result = self.insert_sync(spec, rows, ignore);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn update(
        &self,
        _cx: &Cx,
        spec: &QuerySpec,
        changes: &Row,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.update_sync(spec, changes);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn bulk_update(
        &self,
        _cx: &Cx,
        spec: &QuerySpec,
        rows: &[Row],
        keys: &[&str],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.bulk_update_sync(spec, rows, keys);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn delete(
        &self,
        _cx: &Cx,
        spec: &QuerySpec,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.delete_sync(spec);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn soft_delete(
        &self,
        _cx: &Cx,
        spec: &QuerySpec,
        column: &str,
        at: &Value,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.soft_delete_sync(spec, column, at);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }

    fn restore(
        &self,
        _cx: &Cx,
        spec: &QuerySpec,
        column: &str,
    ) -> impl Future<Output = Outcome<u64, Error>> + Send {
        let result = self.restore_sync(spec, column);
        async move { result.map_or_else(Outcome::Err, Outcome::Ok) }
    }
}
