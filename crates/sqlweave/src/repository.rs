//! Model layer: typed queries and lifecycle-aware mutations.
//!
//! [`ModelQuery`] wraps a [`QuerySpec`] bound to one [`Model`] and casts
//! result rows through [`Model::from_row`]. [`Repository`] binds a driver
//! and an optional [`HookRegistry`] and offers the usual record operations
//! (`find`, `create`, `update`, `delete`, `restore`, ...), firing the
//! registered hooks around every mutation.
//!
//! # Example
//!
//! ```rust,ignore
//! let repo = Repository::new(&db).with_hooks(&hooks);
//!
//! let author: Author = repo.create(&cx, row! {"name" => "Ann"}).await?;
//! let with_posts = ModelQuery::<Author>::new()
//!     .with(["posts.comments"])?
//!     .map_spec(|q| q.order_by_asc("name"))
//!     .all(&cx, &db)
//!     .await;
//! ```

use std::fmt;
use std::marker::PhantomData;

use asupersync::{Cx, Outcome};
use sqlweave_core::{
    Error, HookEvent, HookRegistry, Model, ModelDescriptor, ModelHook, Result, Row, Value,
    try_outcome,
};
use sqlweave_query::{Driver, InsertResult, PluckMap, QuerySpec, RelationPlan};

/// A spec over `M`'s table carrying its timestamp and soft-delete policy.
pub fn base_spec<M: Model>() -> QuerySpec {
    QuerySpec::for_model(M::descriptor())
}

/// Restrict `spec` to the rows identified by `instance` or by `ids`.
///
/// With an instance row, every primary-key column must equal the row's
/// value. Otherwise a single-column key becomes `key IN (ids)`, and a
/// composite key becomes an OR of AND-groups, one per id, where each id is
/// a [`Value::Array`] of key parts in descriptor order.
#[allow(clippy::result_large_err)]
pub fn primary_key_condition(
    spec: QuerySpec,
    descriptor: &ModelDescriptor,
    instance: Option<&Row>,
    ids: &[Value],
) -> Result<QuerySpec> {
    let qualifier = spec.source.qualifier().to_string();
    let keys: Vec<String> = descriptor
        .primary_key
        .iter()
        .map(|key| format!("{qualifier}.{key}"))
        .collect();

    if let Some(row) = instance {
        return Ok(descriptor
            .primary_key
            .iter()
            .zip(&keys)
            .fold(spec, |spec, (column, key)| {
                spec.filter(key, row.get(column).cloned().unwrap_or(Value::Null))
            }));
    }

    if let [key] = keys.as_slice() {
        return spec.filter_in(key, ids.to_vec());
    }

    let mut tuples = Vec::with_capacity(ids.len());
    for id in ids {
        match id.as_array() {
            Some(parts) if parts.len() == keys.len() => tuples.push(parts),
            _ => {
                return Err(Error::shape(
                    "primary_key",
                    format!(
                        "{} has a {}-column key, got {}",
                        descriptor.name,
                        keys.len(),
                        id.type_name()
                    ),
                ));
            }
        }
    }
    if tuples.is_empty() {
        return spec.filter_in(&keys[0], Vec::<Value>::new());
    }
    spec.filter_group(|group| {
        for parts in &tuples {
            group.or_filter_group(|g| {
                for (key, value) in keys.iter().zip(parts.iter()) {
                    g.filter(key, value.clone());
                }
            });
        }
    })
}

#[allow(clippy::result_large_err)]
fn cast_all<M: Model>(rows: &[Row]) -> Result<Vec<M>> {
    rows.iter().map(M::from_row).collect()
}

// ============================================================================
// ModelQuery
// ============================================================================

/// A query whose rows are read back as `M`.
pub struct ModelQuery<M> {
    spec: QuerySpec,
    marker: PhantomData<fn() -> M>,
}

impl<M> Clone for ModelQuery<M> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            marker: PhantomData,
        }
    }
}

impl<M> fmt::Debug for ModelQuery<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelQuery")
            .field("model", &std::any::type_name::<M>())
            .field("spec", &self.spec)
            .finish()
    }
}

impl<M: Model> Default for ModelQuery<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> ModelQuery<M> {
    /// Start from the model's base spec.
    pub fn new() -> Self {
        Self::from_spec(base_spec::<M>())
    }

    pub fn from_spec(spec: QuerySpec) -> Self {
        Self {
            spec,
            marker: PhantomData,
        }
    }

    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    pub fn into_spec(self) -> QuerySpec {
        self.spec
    }

    /// Hydrate the named relations (dotted for nesting) on every read.
    ///
    /// Names are validated here, so an unknown relation fails before any
    /// query runs. Repeated calls accumulate.
    #[allow(clippy::result_large_err)]
    pub fn with<I, S>(self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let plan = RelationPlan::parse(M::descriptor(), names)?;
        let plan = match self.spec.options.relations.clone() {
            Some(existing) => existing.merge(plan),
            None => plan,
        };
        Ok(self.map_spec(|spec| spec.with_relations(plan)))
    }

    /// Apply builder calls to the underlying spec.
    pub fn map_spec(self, f: impl FnOnce(QuerySpec) -> QuerySpec) -> Self {
        Self::from_spec(f(self.spec))
    }

    /// Like [`map_spec`](Self::map_spec) for builder calls that validate.
    #[allow(clippy::result_large_err)]
    pub fn try_map_spec(self, f: impl FnOnce(QuerySpec) -> Result<QuerySpec>) -> Result<Self> {
        f(self.spec).map(Self::from_spec)
    }

    #[allow(clippy::result_large_err)]
    pub fn with_trashed(self) -> Result<Self> {
        self.try_map_spec(QuerySpec::with_trashed)
    }

    #[allow(clippy::result_large_err)]
    pub fn only_trashed(self) -> Result<Self> {
        self.try_map_spec(QuerySpec::only_trashed)
    }

    #[allow(clippy::result_large_err)]
    pub fn without_trashed(self) -> Result<Self> {
        self.try_map_spec(QuerySpec::without_trashed)
    }

    /// Matching rows with relations attached, before casting.
    pub async fn rows<D: Driver>(&self, cx: &Cx, driver: &D) -> Outcome<Vec<Row>, Error> {
        self.spec.get(cx, driver).await
    }

    pub async fn all<D: Driver>(&self, cx: &Cx, driver: &D) -> Outcome<Vec<M>, Error> {
        let rows = try_outcome!(self.spec.get(cx, driver).await);
        Outcome::Ok(try_outcome!(@result cast_all::<M>(&rows)))
    }

    pub async fn first<D: Driver>(&self, cx: &Cx, driver: &D) -> Outcome<Option<M>, Error> {
        match try_outcome!(self.spec.first(cx, driver).await) {
            Some(row) => Outcome::Ok(Some(try_outcome!(@result M::from_row(&row)))),
            None => Outcome::Ok(None),
        }
    }

    pub async fn count<D: Driver>(&self, cx: &Cx, driver: &D) -> Outcome<u64, Error> {
        self.spec.count(cx, driver).await
    }
}

// ============================================================================
// Repository
// ============================================================================

/// Record operations for any [`Model`] over one driver.
///
/// Mutations fire the hooks of the attached [`HookRegistry`]: the `before`
/// hook runs first and its error aborts the operation; the `after` hook runs
/// once the driver has finished, and its error is returned in place of the
/// result. Deletes are soft when the model enables soft deletes.
pub struct Repository<'d, D> {
    driver: &'d D,
    hooks: Option<&'d HookRegistry>,
}

impl<D> fmt::Debug for Repository<'_, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("driver", &std::any::type_name::<D>())
            .field("hooks", &self.hooks)
            .finish()
    }
}

impl<'d, D: Driver> Repository<'d, D> {
    pub fn new(driver: &'d D) -> Self {
        Self {
            driver,
            hooks: None,
        }
    }

    /// Fire the callbacks of `hooks` around every mutation.
    pub fn with_hooks(mut self, hooks: &'d HookRegistry) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn driver(&self) -> &'d D {
        self.driver
    }

    /// A typed query over `M`'s table.
    pub fn query<M: Model>(&self) -> ModelQuery<M> {
        ModelQuery::new()
    }

    #[allow(clippy::result_large_err)]
    fn fire(
        &self,
        hook: ModelHook,
        model: &ModelDescriptor,
        method: &'static str,
        rows: &[Row],
        ids: &[Value],
    ) -> Result<()> {
        let Some(registry) = self.hooks else {
            return Ok(());
        };
        let result = registry.fire(&HookEvent {
            hook,
            model: model.name,
            method,
            rows,
            ids,
        });
        if let Err(error) = &result {
            if hook.is_before() {
                tracing::debug!(
                    model = model.name,
                    method,
                    ?hook,
                    %error,
                    "Hook aborted the write"
                );
            } else {
                tracing::warn!(
                    model = model.name,
                    method,
                    ?hook,
                    %error,
                    "Hook failed after the write was applied"
                );
            }
        }
        result
    }

    #[allow(clippy::result_large_err)]
    fn by_ids<M: Model>(ids: &[Value]) -> Result<QuerySpec> {
        primary_key_condition(base_spec::<M>(), M::descriptor(), None, ids)
    }

    #[allow(clippy::result_large_err)]
    fn by_instance<M: Model>(instance: &M) -> Result<QuerySpec> {
        primary_key_condition(
            base_spec::<M>(),
            M::descriptor(),
            Some(&instance.to_row()),
            &[],
        )
    }

    // ==================== Reads ====================

    pub async fn all<M: Model>(&self, cx: &Cx) -> Outcome<Vec<M>, Error> {
        ModelQuery::<M>::new().all(cx, self.driver).await
    }

    /// The row with primary key `id`; composite keys take a [`Value::Array`].
    pub async fn find<M: Model>(&self, cx: &Cx, id: impl Into<Value>) -> Outcome<Option<M>, Error> {
        let spec = try_outcome!(@result Self::by_ids::<M>(&[id.into()]));
        ModelQuery::<M>::from_spec(spec).first(cx, self.driver).await
    }

    pub async fn find_all<M: Model>(&self, cx: &Cx, ids: &[Value]) -> Outcome<Vec<M>, Error> {
        let spec = try_outcome!(@result Self::by_ids::<M>(ids));
        ModelQuery::<M>::from_spec(spec).all(cx, self.driver).await
    }

    /// Re-read `instance` from the database.
    pub async fn fresh<M: Model>(&self, cx: &Cx, instance: &M) -> Outcome<Option<M>, Error> {
        let spec = try_outcome!(@result Self::by_instance(instance));
        ModelQuery::<M>::from_spec(spec).first(cx, self.driver).await
    }

    /// Overwrite `instance` with its current database state.
    pub async fn refresh<M: Model>(&self, cx: &Cx, instance: &mut M) -> Outcome<(), Error> {
        match try_outcome!(self.fresh(cx, instance).await) {
            Some(current) => {
                *instance = current;
                Outcome::Ok(())
            }
            None => Outcome::Err(Error::NotFound {
                model: M::descriptor().name.to_string(),
            }),
        }
    }

    pub async fn count<M: Model>(&self, cx: &Cx) -> Outcome<u64, Error> {
        base_spec::<M>().count(cx, self.driver).await
    }

    /// Map `key` to `value` over every live row of `M`'s table.
    pub async fn pluck<M: Model>(
        &self,
        cx: &Cx,
        key: &str,
        value: &str,
    ) -> Outcome<PluckMap<Value>, Error> {
        base_spec::<M>()
            .pluck(cx, self.driver, key, value, false)
            .await
    }

    // ==================== Writes ====================

    /// Insert one row and read the created record back.
    ///
    /// The record is looked up by the row's own key values when the model
    /// has a composite key or the row sets the key, and by the driver's
    /// generated id otherwise.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, data),
        fields(model = M::descriptor().name)
    )]
    pub async fn create<M: Model>(&self, cx: &Cx, data: Row) -> Outcome<M, Error> {
        let descriptor = M::descriptor();
        let rows = std::slice::from_ref(&data);
        try_outcome!(@result self.fire(ModelHook::BeforeCreate, descriptor, "create", rows, &[]));
        let inserted = try_outcome!(
            base_spec::<M>()
                .insert(cx, self.driver, vec![data.clone()], false)
                .await
        );
        try_outcome!(@result self.fire(ModelHook::AfterCreate, descriptor, "create", rows, &[]));

        let id = match descriptor.primary_key {
            [key] => data
                .get(key)
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or(inserted.last_insert_id),
            keys => Value::Array(
                keys.iter()
                    .map(|key| data.get(key).cloned().unwrap_or(Value::Null))
                    .collect(),
            ),
        };
        match try_outcome!(self.find::<M>(cx, id).await) {
            Some(created) => Outcome::Ok(created),
            None => Outcome::Err(Error::NotFound {
                model: descriptor.name.to_string(),
            }),
        }
    }

    pub async fn insert<M: Model>(
        &self,
        cx: &Cx,
        rows: Vec<Row>,
        ignore: bool,
    ) -> Outcome<InsertResult, Error> {
        let descriptor = M::descriptor();
        try_outcome!(@result self.fire(ModelHook::BeforeCreate, descriptor, "insert", &rows, &[]));
        let result = try_outcome!(
            base_spec::<M>()
                .insert(cx, self.driver, rows.clone(), ignore)
                .await
        );
        try_outcome!(@result self.fire(ModelHook::AfterCreate, descriptor, "insert", &rows, &[]));
        Outcome::Ok(result)
    }

    /// Apply `changes` to the row of `instance`.
    ///
    /// When a row was affected, `instance` is rebuilt with the changes
    /// applied.
    #[tracing::instrument(
        level = "debug",
        skip(self, cx, instance, changes),
        fields(model = M::descriptor().name)
    )]
    pub async fn update<M: Model>(
        &self,
        cx: &Cx,
        instance: &mut M,
        changes: Row,
        silent: bool,
    ) -> Outcome<u64, Error> {
        let descriptor = M::descriptor();
        let spec = try_outcome!(@result Self::by_instance(instance));
        let ids = instance.primary_key_value();
        let rows = std::slice::from_ref(&changes);
        try_outcome!(@result self.fire(ModelHook::BeforeUpdate, descriptor, "update", rows, &ids));
        let affected = try_outcome!(
            spec.update(cx, self.driver, changes.clone(), silent)
                .await
        );
        try_outcome!(@result self.fire(ModelHook::AfterUpdate, descriptor, "update", rows, &ids));

        if affected > 0 {
            let mut merged = instance.to_row();
            for (column, value) in changes.into_fields() {
                merged.set(column, value);
            }
            *instance = try_outcome!(@result M::from_row(&merged));
        }
        Outcome::Ok(affected)
    }

    /// Write every column of `instance` back to its row.
    ///
    /// Unless `silent`, the updated-at column is refreshed rather than
    /// written back.
    pub async fn save<M: Model>(
        &self,
        cx: &Cx,
        instance: &mut M,
        silent: bool,
    ) -> Outcome<u64, Error> {
        let descriptor = M::descriptor();
        let mut changes = instance.to_row();
        for key in descriptor.primary_key {
            changes.remove(key);
        }
        if !silent {
            if let Some(ts) = descriptor.timestamps {
                changes.remove(ts.updated);
            }
        }
        let ids = instance.primary_key_value();
        try_outcome!(@result self.fire(
            ModelHook::BeforeUpdate,
            descriptor,
            "save",
            std::slice::from_ref(&changes),
            &ids
        ));

        let affected = try_outcome!(self.update(cx, instance, changes.clone(), silent).await);
        try_outcome!(@result self.fire(
            ModelHook::AfterUpdate,
            descriptor,
            "save",
            std::slice::from_ref(&changes),
            &ids
        ));
        Outcome::Ok(affected)
    }

    /// Update many rows, matching each by `keys` (the primary key when empty).
    pub async fn bulk_update<M: Model>(
        &self,
        cx: &Cx,
        rows: Vec<Row>,
        keys: &[&str],
        silent: bool,
    ) -> Outcome<u64, Error> {
        let descriptor = M::descriptor();
        let keys = if keys.is_empty() {
            descriptor.primary_key
        } else {
            keys
        };
        try_outcome!(@result self.fire(
            ModelHook::BeforeUpdate,
            descriptor,
            "bulk_update",
            &rows,
            &[]
        ));
        let affected = try_outcome!(
            base_spec::<M>()
                .bulk_update(cx, self.driver, rows.clone(), keys, silent)
                .await
        );
        try_outcome!(@result self.fire(
            ModelHook::AfterUpdate,
            descriptor,
            "bulk_update",
            &rows,
            &[]
        ));
        Outcome::Ok(affected)
    }

    async fn remove<M: Model>(
        &self,
        cx: &Cx,
        spec: QuerySpec,
        force: bool,
        method: &'static str,
        ids: &[Value],
    ) -> Outcome<u64, Error> {
        let descriptor = M::descriptor();
        let soft = !force && descriptor.soft_delete.is_some();
        let spec = if force && descriptor.soft_delete.is_some() {
            try_outcome!(@result spec.with_trashed())
        } else {
            spec
        };
        try_outcome!(@result self.fire(ModelHook::BeforeDelete, descriptor, method, &[], ids));
        let affected = try_outcome!(spec.delete(cx, self.driver, soft).await);
        tracing::debug!(model = descriptor.name, method, soft, affected, "Deleted rows");
        try_outcome!(@result self.fire(ModelHook::AfterDelete, descriptor, method, &[], ids));
        Outcome::Ok(affected)
    }

    /// Delete the row with primary key `id`.
    pub async fn delete<M: Model>(&self, cx: &Cx, id: impl Into<Value>) -> Outcome<u64, Error> {
        let ids = [id.into()];
        let spec = try_outcome!(@result Self::by_ids::<M>(&ids));
        self.remove::<M>(cx, spec, false, "delete", &ids).await
    }

    pub async fn delete_all<M: Model>(&self, cx: &Cx, ids: &[Value]) -> Outcome<u64, Error> {
        let spec = try_outcome!(@result Self::by_ids::<M>(ids));
        self.remove::<M>(cx, spec, false, "delete_all", ids).await
    }

    /// Permanently delete the row with primary key `id`, trashed or not.
    pub async fn force_delete<M: Model>(
        &self,
        cx: &Cx,
        id: impl Into<Value>,
    ) -> Outcome<u64, Error> {
        let ids = [id.into()];
        let spec = try_outcome!(@result Self::by_ids::<M>(&ids));
        self.remove::<M>(cx, spec, true, "force_delete", &ids).await
    }

    pub async fn force_delete_all<M: Model>(&self, cx: &Cx, ids: &[Value]) -> Outcome<u64, Error> {
        let spec = try_outcome!(@result Self::by_ids::<M>(ids));
        self.remove::<M>(cx, spec, true, "force_delete_all", ids).await
    }

    pub async fn delete_instance<M: Model>(&self, cx: &Cx, instance: &M) -> Outcome<u64, Error> {
        let spec = try_outcome!(@result Self::by_instance(instance));
        let ids = instance.primary_key_value();
        self.remove::<M>(cx, spec, false, "delete", &ids).await
    }

    pub async fn force_delete_instance<M: Model>(
        &self,
        cx: &Cx,
        instance: &M,
    ) -> Outcome<u64, Error> {
        let spec = try_outcome!(@result Self::by_instance(instance));
        let ids = instance.primary_key_value();
        self.remove::<M>(cx, spec, true, "force_delete", &ids).await
    }

    async fn restore_spec<M: Model>(
        &self,
        cx: &Cx,
        spec: QuerySpec,
        method: &'static str,
        ids: &[Value],
    ) -> Outcome<u64, Error> {
        let descriptor = M::descriptor();
        try_outcome!(@result self.fire(ModelHook::BeforeRestore, descriptor, method, &[], ids));
        let affected = try_outcome!(spec.restore(cx, self.driver).await);
        try_outcome!(@result self.fire(ModelHook::AfterRestore, descriptor, method, &[], ids));
        Outcome::Ok(affected)
    }

    /// Bring back the trashed row with primary key `id`.
    pub async fn restore<M: Model>(&self, cx: &Cx, id: impl Into<Value>) -> Outcome<u64, Error> {
        let ids = [id.into()];
        let spec = try_outcome!(@result Self::by_ids::<M>(&ids));
        self.restore_spec::<M>(cx, spec, "restore", &ids).await
    }

    pub async fn restore_all<M: Model>(&self, cx: &Cx, ids: &[Value]) -> Outcome<u64, Error> {
        let spec = try_outcome!(@result Self::by_ids::<M>(ids));
        self.restore_spec::<M>(cx, spec, "restore_all", ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlweave_query::{ConditionKind, Operator, Relation, ValueSet};

    static USER: ModelDescriptor = ModelDescriptor::new("User").soft_deletes();
    static MEMBERSHIP: ModelDescriptor = ModelDescriptor::new("Membership")
        .primary_key(&["team_id", "user_id"])
        .without_timestamps();

    #[test]
    fn single_key_uses_in() {
        let spec = primary_key_condition(
            QuerySpec::for_model(&USER),
            &USER,
            None,
            &[Value::from(1), Value::from(2)],
        )
        .unwrap();
        assert_eq!(spec.wheres.len(), 1);
        let condition = &spec.wheres.conditions()[0];
        let ConditionKind::In { set, negated, .. } = &condition.kind else {
            panic!("expected IN, got {:?}", condition.kind);
        };
        assert!(!negated);
        assert_eq!(
            set,
            &ValueSet::Values(vec![Value::from(1), Value::from(2)])
        );
    }

    #[test]
    fn instance_uses_equality_per_key() {
        let row = Row::new().with("team_id", 3).with("user_id", 9);
        let spec = primary_key_condition(
            QuerySpec::for_model(&MEMBERSHIP),
            &MEMBERSHIP,
            Some(&row),
            &[],
        )
        .unwrap();
        assert_eq!(spec.wheres.len(), 2);
        for condition in spec.wheres.iter() {
            assert_eq!(condition.relation, Relation::And);
            assert!(matches!(
                &condition.kind,
                ConditionKind::Value { op: Operator::Eq, .. }
            ));
        }
    }

    #[test]
    fn composite_ids_become_or_groups() {
        let ids = [
            Value::from(vec![1, 10]),
            Value::from(vec![2, 20]),
        ];
        let spec = primary_key_condition(
            QuerySpec::for_model(&MEMBERSHIP),
            &MEMBERSHIP,
            None,
            &ids,
        )
        .unwrap();
        assert_eq!(spec.wheres.len(), 1);
        let ConditionKind::Group(outer) = &spec.wheres.conditions()[0].kind else {
            panic!("expected a group");
        };
        assert_eq!(outer.len(), 2);
        assert_eq!(outer.conditions()[1].relation, Relation::Or);
        for member in outer.iter() {
            let ConditionKind::Group(inner) = &member.kind else {
                panic!("expected an AND group per id");
            };
            assert_eq!(inner.len(), 2);
        }
    }

    #[test]
    fn composite_id_arity_is_checked() {
        let err = primary_key_condition(
            QuerySpec::for_model(&MEMBERSHIP),
            &MEMBERSHIP,
            None,
            &[Value::from(1)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConditionShape(ref e) if e.condition == "primary_key"));
    }
}
