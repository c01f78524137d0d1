//! The query specification builder.
//!
//! A [`QuerySpec`] is an owned, structural description of one read or
//! mutation. Builder methods take `self` by value and return it, so every
//! chain owns its specification; embedding a spec anywhere (sub-queries,
//! joins, unions, along queries) moves or clones it, never shares it.

use crate::clause::{
    AggregateFn, Direction, GroupItem, LockMode, OrderItem, SelectItem, TableRef, TrashedMode,
    Union, UnionSource,
};
use crate::condition::{
    ConditionBuilder, ConditionKind, ConditionTree, DatePart, Operand, Operator, Relation, Subject,
};
use crate::eager::{FetchConfig, RelationPlan};
use crate::join::{Join, JoinKind, JoinTarget};
use sqlweave_core::{Error, ModelDescriptor, Result, Row, TimestampColumns, Value};
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::BuildHasher;
use std::sync::Arc;

/// Timestamp and soft-delete configuration of the queried table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TablePolicy {
    /// Model name used in error messages; falls back to the table.
    pub model: Option<&'static str>,
    pub timestamps: Option<TimestampColumns>,
    pub soft_delete: Option<&'static str>,
}

impl TablePolicy {
    /// The policy a model descriptor declares.
    pub fn for_model(descriptor: &ModelDescriptor) -> Self {
        Self {
            model: Some(descriptor.name),
            timestamps: descriptor.timestamps,
            soft_delete: descriptor.soft_delete,
        }
    }
}

/// Post-processing applied to the rows of a read.
#[derive(Clone)]
pub struct RowHook(Arc<dyn Fn(Vec<Row>) -> Result<Vec<Row>> + Send + Sync>);

impl RowHook {
    pub fn new(f: impl Fn(Vec<Row>) -> Result<Vec<Row>> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    #[allow(clippy::result_large_err)]
    pub fn apply(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        (self.0)(rows)
    }
}

impl fmt::Debug for RowHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RowHook(..)")
    }
}

impl PartialEq for RowHook {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Execution-time metadata that is not part of the SQL shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecOptions {
    /// Relations to hydrate onto the result rows.
    pub relations: Option<RelationPlan>,
    /// Extra specifications submitted in the same batch.
    pub along: Vec<QuerySpec>,
    pub row_hook: Option<RowHook>,
    pub fetch: FetchConfig,
}

/// A structural description of a query.
///
/// # Example
///
/// ```ignore
/// let spec = QuerySpec::table("posts")
///     .select(["id", "title"])
///     .filter("status", "published")
///     .filter_between("score", [10, 20])?
///     .order_by_desc("created_at")
///     .limit(20);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub source: TableRef,
    /// Empty means every column.
    pub selects: Vec<SelectItem>,
    pub distinct: bool,
    pub joins: Vec<Join>,
    pub wheres: ConditionTree,
    pub groups: Vec<GroupItem>,
    pub havings: ConditionTree,
    pub orders: Vec<OrderItem>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub unions: Vec<Union>,
    pub lock: LockMode,
    /// Opaque target variable for `SELECT ... INTO`.
    pub into: Option<String>,
    pub trashed: TrashedMode,
    pub policy: TablePolicy,
    pub options: SpecOptions,
}

impl QuerySpec {
    /// Start a specification over a table.
    pub fn table(name: impl Into<String>) -> Self {
        Self::from_ref(TableRef::table(name))
    }

    /// Start a specification over an aliased nested query.
    pub fn from_query(spec: QuerySpec, alias: impl Into<String>) -> Self {
        Self::from_ref(TableRef::query(spec, alias))
    }

    /// Start a specification carrying a model's table and policies.
    pub fn for_model(descriptor: &ModelDescriptor) -> Self {
        let mut spec = Self::table(descriptor.table_name());
        spec.policy = TablePolicy::for_model(descriptor);
        spec
    }

    fn from_ref(source: TableRef) -> Self {
        Self {
            source,
            selects: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            wheres: ConditionTree::new(),
            groups: Vec::new(),
            havings: ConditionTree::new(),
            orders: Vec::new(),
            offset: None,
            limit: None,
            unions: Vec::new(),
            lock: LockMode::None,
            into: None,
            trashed: TrashedMode::Exclude,
            policy: TablePolicy::default(),
            options: SpecOptions::default(),
        }
    }

    /// Name used when reporting errors about this specification.
    pub fn model_name(&self) -> String {
        match self.policy.model {
            Some(model) => model.to_string(),
            None => self.source.qualifier().to_string(),
        }
    }

    // ==================== Source & policy ====================

    /// Alias the source.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.source.set_alias(alias.into());
        self
    }

    pub fn with_policy(mut self, policy: TablePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn soft_deletes(mut self, column: &'static str) -> Self {
        self.policy.soft_delete = Some(column);
        self
    }

    pub fn timestamps(mut self, columns: TimestampColumns) -> Self {
        self.policy.timestamps = Some(columns);
        self
    }

    pub fn without_timestamps(mut self) -> Self {
        self.policy.timestamps = None;
        self
    }

    // ==================== Selection ====================

    /// Replace the selection with the given columns.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selects = columns
            .into_iter()
            .map(|c| SelectItem::Column(c.into()))
            .collect();
        self
    }

    pub fn add_select(mut self, column: impl Into<String>) -> Self {
        self.selects.push(SelectItem::Column(column.into()));
        self
    }

    pub fn select_raw(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.selects.push(SelectItem::Raw {
            sql: sql.into(),
            params,
        });
        self
    }

    /// Select a nested query's scalar result under `alias`.
    pub fn select_sub(mut self, spec: QuerySpec, alias: impl Into<String>) -> Self {
        self.selects.push(SelectItem::Sub {
            spec: Box::new(spec),
            alias: alias.into(),
        });
        self
    }

    fn select_aggregate(
        mut self,
        func: AggregateFn,
        column: Option<String>,
        alias: String,
    ) -> Self {
        self.selects.push(SelectItem::Aggregate {
            func,
            column,
            alias,
        });
        self
    }

    pub fn select_count(self, alias: impl Into<String>) -> Self {
        self.select_aggregate(AggregateFn::Count, None, alias.into())
    }

    pub fn select_sum(self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.select_aggregate(AggregateFn::Sum, Some(column.into()), alias.into())
    }

    pub fn select_average(self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.select_aggregate(AggregateFn::Average, Some(column.into()), alias.into())
    }

    pub fn select_min(self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.select_aggregate(AggregateFn::Min, Some(column.into()), alias.into())
    }

    pub fn select_max(self, column: impl Into<String>, alias: impl Into<String>) -> Self {
        self.select_aggregate(AggregateFn::Max, Some(column.into()), alias.into())
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    // ==================== Joins ====================

    pub fn add_join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// `INNER JOIN target ON first op second`
    pub fn join(
        self,
        target: impl Into<JoinTarget>,
        first: impl Into<String>,
        op: Operator,
        second: impl Into<String>,
    ) -> Self {
        self.add_join(Join::on_columns(JoinKind::Inner, target, None, first, op, second))
    }

    pub fn left_join(
        self,
        target: impl Into<JoinTarget>,
        first: impl Into<String>,
        op: Operator,
        second: impl Into<String>,
    ) -> Self {
        self.add_join(Join::on_columns(JoinKind::Left, target, None, first, op, second))
    }

    pub fn right_join(
        self,
        target: impl Into<JoinTarget>,
        first: impl Into<String>,
        op: Operator,
        second: impl Into<String>,
    ) -> Self {
        self.add_join(Join::on_columns(JoinKind::Right, target, None, first, op, second))
    }

    pub fn outer_join(
        self,
        target: impl Into<JoinTarget>,
        first: impl Into<String>,
        op: Operator,
        second: impl Into<String>,
    ) -> Self {
        self.add_join(Join::on_columns(JoinKind::Outer, target, None, first, op, second))
    }

    pub fn cross_join(self, target: impl Into<JoinTarget>) -> Self {
        self.add_join(Join::cross(target, None))
    }

    /// `INNER JOIN (spec) AS alias ON first op second`
    pub fn join_sub(
        self,
        spec: QuerySpec,
        alias: impl Into<String>,
        first: impl Into<String>,
        op: Operator,
        second: impl Into<String>,
    ) -> Self {
        self.add_join(Join::on_columns(
            JoinKind::Inner,
            spec,
            Some(alias.into()),
            first,
            op,
            second,
        ))
    }

    /// Join with an ON tree built by `f`.
    pub fn join_on(
        self,
        kind: JoinKind,
        target: impl Into<JoinTarget>,
        alias: Option<&str>,
        f: impl FnOnce(&mut ConditionBuilder),
    ) -> Result<Self> {
        let join = Join::on_builder(kind, target, alias.map(str::to_string), f)?;
        Ok(self.add_join(join))
    }

    // ==================== WHERE ====================

    /// Append a prepared condition to the WHERE tree.
    pub fn where_condition(mut self, relation: Relation, kind: ConditionKind) -> Self {
        self.wheres.add(relation, kind);
        self
    }

    /// `subject = value`
    pub fn filter(self, subject: impl Into<Subject>, value: impl Into<Operand>) -> Self {
        self.where_condition(Relation::And, ConditionKind::compare(subject, Operator::Eq, value))
    }

    pub fn or_filter(self, subject: impl Into<Subject>, value: impl Into<Operand>) -> Self {
        self.where_condition(Relation::Or, ConditionKind::compare(subject, Operator::Eq, value))
    }

    pub fn filter_op(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.where_condition(Relation::And, ConditionKind::compare(subject, op, value))
    }

    pub fn or_filter_op(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.where_condition(Relation::Or, ConditionKind::compare(subject, op, value))
    }

    pub fn filter_null(self, subject: impl Into<Subject>) -> Self {
        self.where_condition(Relation::And, ConditionKind::null(subject, false))
    }

    pub fn or_filter_null(self, subject: impl Into<Subject>) -> Self {
        self.where_condition(Relation::Or, ConditionKind::null(subject, false))
    }

    pub fn filter_not_null(self, subject: impl Into<Subject>) -> Self {
        self.where_condition(Relation::And, ConditionKind::null(subject, true))
    }

    pub fn or_filter_not_null(self, subject: impl Into<Subject>) -> Self {
        self.where_condition(Relation::Or, ConditionKind::null(subject, true))
    }

    pub fn filter_between(
        self,
        subject: impl Into<Subject>,
        bounds: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::between(subject, bounds, false)?;
        Ok(self.where_condition(Relation::And, kind))
    }

    pub fn or_filter_between(
        self,
        subject: impl Into<Subject>,
        bounds: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::between(subject, bounds, false)?;
        Ok(self.where_condition(Relation::Or, kind))
    }

    pub fn filter_not_between(
        self,
        subject: impl Into<Subject>,
        bounds: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::between(subject, bounds, true)?;
        Ok(self.where_condition(Relation::And, kind))
    }

    pub fn or_filter_not_between(
        self,
        subject: impl Into<Subject>,
        bounds: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::between(subject, bounds, true)?;
        Ok(self.where_condition(Relation::Or, kind))
    }

    pub fn filter_in(self, subject: impl Into<Subject>, set: impl Into<Operand>) -> Result<Self> {
        let kind = ConditionKind::is_in(subject, set, false)?;
        Ok(self.where_condition(Relation::And, kind))
    }

    pub fn or_filter_in(
        self,
        subject: impl Into<Subject>,
        set: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::is_in(subject, set, false)?;
        Ok(self.where_condition(Relation::Or, kind))
    }

    pub fn filter_not_in(
        self,
        subject: impl Into<Subject>,
        set: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::is_in(subject, set, true)?;
        Ok(self.where_condition(Relation::And, kind))
    }

    pub fn or_filter_not_in(
        self,
        subject: impl Into<Subject>,
        set: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::is_in(subject, set, true)?;
        Ok(self.where_condition(Relation::Or, kind))
    }

    pub fn filter_like(
        self,
        subject: impl Into<Subject>,
        pattern: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::like(subject, pattern, false)?;
        Ok(self.where_condition(Relation::And, kind))
    }

    pub fn or_filter_like(
        self,
        subject: impl Into<Subject>,
        pattern: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::like(subject, pattern, false)?;
        Ok(self.where_condition(Relation::Or, kind))
    }

    pub fn filter_not_like(
        self,
        subject: impl Into<Subject>,
        pattern: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::like(subject, pattern, true)?;
        Ok(self.where_condition(Relation::And, kind))
    }

    pub fn or_filter_not_like(
        self,
        subject: impl Into<Subject>,
        pattern: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::like(subject, pattern, true)?;
        Ok(self.where_condition(Relation::Or, kind))
    }

    /// `first op second` where both sides are columns.
    pub fn filter_column(
        self,
        first: impl Into<String>,
        op: Operator,
        second: impl Into<String>,
    ) -> Self {
        self.where_condition(Relation::And, ConditionKind::columns(first, op, second))
    }

    pub fn or_filter_column(
        self,
        first: impl Into<String>,
        op: Operator,
        second: impl Into<String>,
    ) -> Self {
        self.where_condition(Relation::Or, ConditionKind::columns(first, op, second))
    }

    pub fn filter_date_part(
        self,
        part: DatePart,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.where_condition(Relation::And, ConditionKind::date_part(part, subject, op, value))
    }

    pub fn or_filter_date_part(
        self,
        part: DatePart,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.where_condition(Relation::Or, ConditionKind::date_part(part, subject, op, value))
    }

    pub fn filter_date(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.filter_date_part(DatePart::Date, subject, op, value)
    }

    pub fn or_filter_date(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.or_filter_date_part(DatePart::Date, subject, op, value)
    }

    pub fn filter_year(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.filter_date_part(DatePart::Year, subject, op, value)
    }

    pub fn or_filter_year(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.or_filter_date_part(DatePart::Year, subject, op, value)
    }

    pub fn filter_month(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.filter_date_part(DatePart::Month, subject, op, value)
    }

    pub fn or_filter_month(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.or_filter_date_part(DatePart::Month, subject, op, value)
    }

    pub fn filter_day(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.filter_date_part(DatePart::Day, subject, op, value)
    }

    pub fn or_filter_day(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.or_filter_date_part(DatePart::Day, subject, op, value)
    }

    pub fn filter_time(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.filter_date_part(DatePart::Time, subject, op, value)
    }

    pub fn or_filter_time(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.or_filter_date_part(DatePart::Time, subject, op, value)
    }

    pub fn filter_raw(self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.where_condition(Relation::And, ConditionKind::raw(sql, params))
    }

    pub fn or_filter_raw(self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.where_condition(Relation::Or, ConditionKind::raw(sql, params))
    }

    /// Append an `AND`-joined group built by `f`.
    ///
    /// Fails with the first shape error recorded inside the group.
    pub fn filter_group(self, f: impl FnOnce(&mut ConditionBuilder)) -> Result<Self> {
        let kind = ConditionKind::group(f)?;
        Ok(self.where_condition(Relation::And, kind))
    }

    /// Append an `OR`-joined group built by `f`.
    pub fn or_filter_group(self, f: impl FnOnce(&mut ConditionBuilder)) -> Result<Self> {
        let kind = ConditionKind::group(f)?;
        Ok(self.where_condition(Relation::Or, kind))
    }

    // ==================== GROUP BY / HAVING ====================

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .extend(columns.into_iter().map(|c| GroupItem::Column(c.into())));
        self
    }

    pub fn group_by_raw(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.groups.push(GroupItem::Raw {
            sql: sql.into(),
            params,
        });
        self
    }

    /// Append a prepared condition to the HAVING tree.
    pub fn having_condition(mut self, relation: Relation, kind: ConditionKind) -> Self {
        self.havings.add(relation, kind);
        self
    }

    pub fn having(self, subject: impl Into<Subject>, value: impl Into<Operand>) -> Self {
        self.having_condition(Relation::And, ConditionKind::compare(subject, Operator::Eq, value))
    }

    pub fn or_having(self, subject: impl Into<Subject>, value: impl Into<Operand>) -> Self {
        self.having_condition(Relation::Or, ConditionKind::compare(subject, Operator::Eq, value))
    }

    pub fn having_op(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.having_condition(Relation::And, ConditionKind::compare(subject, op, value))
    }

    pub fn or_having_op(
        self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> Self {
        self.having_condition(Relation::Or, ConditionKind::compare(subject, op, value))
    }

    pub fn having_null(self, subject: impl Into<Subject>) -> Self {
        self.having_condition(Relation::And, ConditionKind::null(subject, false))
    }

    pub fn or_having_null(self, subject: impl Into<Subject>) -> Self {
        self.having_condition(Relation::Or, ConditionKind::null(subject, false))
    }

    pub fn having_not_null(self, subject: impl Into<Subject>) -> Self {
        self.having_condition(Relation::And, ConditionKind::null(subject, true))
    }

    pub fn or_having_not_null(self, subject: impl Into<Subject>) -> Self {
        self.having_condition(Relation::Or, ConditionKind::null(subject, true))
    }

    pub fn having_between(
        self,
        subject: impl Into<Subject>,
        bounds: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::between(subject, bounds, false)?;
        Ok(self.having_condition(Relation::And, kind))
    }

    pub fn or_having_between(
        self,
        subject: impl Into<Subject>,
        bounds: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::between(subject, bounds, false)?;
        Ok(self.having_condition(Relation::Or, kind))
    }

    pub fn having_in(self, subject: impl Into<Subject>, set: impl Into<Operand>) -> Result<Self> {
        let kind = ConditionKind::is_in(subject, set, false)?;
        Ok(self.having_condition(Relation::And, kind))
    }

    pub fn or_having_in(
        self,
        subject: impl Into<Subject>,
        set: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::is_in(subject, set, false)?;
        Ok(self.having_condition(Relation::Or, kind))
    }

    pub fn having_like(
        self,
        subject: impl Into<Subject>,
        pattern: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::like(subject, pattern, false)?;
        Ok(self.having_condition(Relation::And, kind))
    }

    pub fn or_having_like(
        self,
        subject: impl Into<Subject>,
        pattern: impl Into<Operand>,
    ) -> Result<Self> {
        let kind = ConditionKind::like(subject, pattern, false)?;
        Ok(self.having_condition(Relation::Or, kind))
    }

    pub fn having_column(
        self,
        first: impl Into<String>,
        op: Operator,
        second: impl Into<String>,
    ) -> Self {
        self.having_condition(Relation::And, ConditionKind::columns(first, op, second))
    }

    pub fn or_having_column(
        self,
        first: impl Into<String>,
        op: Operator,
        second: impl Into<String>,
    ) -> Self {
        self.having_condition(Relation::Or, ConditionKind::columns(first, op, second))
    }

    pub fn having_raw(self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.having_condition(Relation::And, ConditionKind::raw(sql, params))
    }

    pub fn or_having_raw(self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.having_condition(Relation::Or, ConditionKind::raw(sql, params))
    }

    pub fn having_group(self, f: impl FnOnce(&mut ConditionBuilder)) -> Result<Self> {
        let kind = ConditionKind::group(f)?;
        Ok(self.having_condition(Relation::And, kind))
    }

    pub fn or_having_group(self, f: impl FnOnce(&mut ConditionBuilder)) -> Result<Self> {
        let kind = ConditionKind::group(f)?;
        Ok(self.having_condition(Relation::Or, kind))
    }

    // ==================== Ordering & paging ====================

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.orders.push(OrderItem::Column {
            column: column.into(),
            direction,
        });
        self
    }

    pub fn order_by_asc(self, column: impl Into<String>) -> Self {
        self.order_by(column, Direction::Asc)
    }

    pub fn order_by_desc(self, column: impl Into<String>) -> Self {
        self.order_by(column, Direction::Desc)
    }

    /// Order by the scalar result of a nested query.
    pub fn order_by_sub(mut self, spec: QuerySpec, direction: Direction) -> Self {
        self.orders.push(OrderItem::Query {
            spec: Box::new(spec),
            direction,
        });
        self
    }

    pub fn order_by_raw(mut self, sql: impl Into<String>, params: Vec<Value>) -> Self {
        self.orders.push(OrderItem::Raw {
            sql: sql.into(),
            params,
        });
        self
    }

    /// Drop every ordering.
    pub fn reorder(mut self) -> Self {
        self.orders.clear();
        self
    }

    /// Replace every ordering with a single column.
    pub fn reorder_by(self, column: impl Into<String>, direction: Direction) -> Self {
        self.reorder().order_by(column, direction)
    }

    /// Order pseudo-randomly; the same seed yields the same order.
    pub fn shuffle(mut self, seed: impl Into<String>) -> Self {
        self.orders.push(OrderItem::Shuffle { seed: seed.into() });
        self
    }

    /// Order pseudo-randomly with a seed drawn now. Running the same spec
    /// twice gives the same order; building it again gives a new one.
    pub fn shuffle_unseeded(self) -> Self {
        let seed = RandomState::new().hash_one(std::process::id());
        self.shuffle(format!("{seed:016x}"))
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    /// Alias for [`QuerySpec::offset`].
    pub fn skip(self, n: u64) -> Self {
        self.offset(n)
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Alias for [`QuerySpec::limit`].
    pub fn take(self, n: u64) -> Self {
        self.limit(n)
    }

    // ==================== Unions, locks, INTO ====================

    pub fn union(mut self, spec: QuerySpec) -> Self {
        self.unions.push(Union {
            source: UnionSource::Query(Box::new(spec)),
            all: false,
        });
        self
    }

    pub fn union_all(mut self, spec: QuerySpec) -> Self {
        self.unions.push(Union {
            source: UnionSource::Query(Box::new(spec)),
            all: true,
        });
        self
    }

    pub fn union_raw(mut self, sql: impl Into<String>, params: Vec<Value>, all: bool) -> Self {
        self.unions.push(Union {
            source: UnionSource::Raw {
                sql: sql.into(),
                params,
            },
            all,
        });
        self
    }

    pub fn shared_lock(mut self) -> Self {
        self.lock = LockMode::Shared;
        self
    }

    pub fn lock_for_update(mut self) -> Self {
        self.lock = LockMode::Exclusive;
        self
    }

    pub fn clear_lock(mut self) -> Self {
        self.lock = LockMode::None;
        self
    }

    /// `SELECT ... INTO variable`; stored for the driver as given.
    pub fn select_into(mut self, variable: impl Into<String>) -> Self {
        self.into = Some(variable.into());
        self
    }

    // ==================== Soft deletes ====================

    fn require_soft_delete(&self) -> Result<&'static str> {
        self.policy
            .soft_delete
            .ok_or_else(|| Error::SoftDeleteUnsupported {
                model: self.model_name(),
            })
    }

    /// Include soft-deleted rows.
    pub fn with_trashed(mut self) -> Result<Self> {
        self.require_soft_delete()?;
        self.trashed = TrashedMode::Include;
        Ok(self)
    }

    /// Only soft-deleted rows.
    pub fn only_trashed(mut self) -> Result<Self> {
        self.require_soft_delete()?;
        self.trashed = TrashedMode::Only;
        Ok(self)
    }

    /// Back to the default: hide soft-deleted rows.
    pub fn without_trashed(mut self) -> Result<Self> {
        self.require_soft_delete()?;
        self.trashed = TrashedMode::Exclude;
        Ok(self)
    }

    /// The soft-delete column qualified by the source name.
    pub fn qualified_soft_delete_column(&self) -> Option<String> {
        self.policy
            .soft_delete
            .map(|column| format!("{}.{}", self.source.qualifier(), column))
    }

    /// A copy with soft-delete visibility turned into a WHERE condition.
    ///
    /// The stored tree is left untouched. An existing tree that contains
    /// `OR` is nested first so the visibility condition applies to all of
    /// it. The returned copy is marked [`TrashedMode::Include`] so a second
    /// call adds nothing.
    pub fn resolved(&self) -> QuerySpec {
        let mut spec = self.clone();
        let Some(column) = self.qualified_soft_delete_column() else {
            return spec;
        };
        let negated = match self.trashed {
            TrashedMode::Include => return spec,
            TrashedMode::Exclude => false,
            TrashedMode::Only => true,
        };
        let has_or = spec.wheres.iter().any(|c| c.relation == Relation::Or);
        let mut wheres = std::mem::take(&mut spec.wheres);
        if has_or {
            wheres = wheres.nest();
        }
        wheres.add(Relation::And, ConditionKind::null(column, negated));
        spec.wheres = wheres;
        spec.trashed = TrashedMode::Include;
        spec
    }

    // ==================== Options ====================

    /// Run `f` over the rows of every read.
    pub fn map_rows(
        mut self,
        f: impl Fn(Vec<Row>) -> Result<Vec<Row>> + Send + Sync + 'static,
    ) -> Self {
        self.options.row_hook = Some(RowHook::new(f));
        self
    }

    pub fn clear_row_hook(mut self) -> Self {
        self.options.row_hook = None;
        self
    }

    /// Submit `spec` in the same batch as this one.
    pub fn along_with(mut self, spec: QuerySpec) -> Self {
        self.options.along.push(spec);
        self
    }

    /// Hydrate the relations of `plan` onto every read.
    pub fn with_relations(mut self, plan: RelationPlan) -> Self {
        self.options.relations = if plan.is_empty() { None } else { Some(plan) };
        self
    }

    pub fn fetch_config(mut self, config: FetchConfig) -> Self {
        self.options.fetch = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::col;

    fn soft() -> QuerySpec {
        QuerySpec::table("posts").soft_deletes("deleted_at")
    }

    #[test]
    fn clone_is_isolated() {
        let original = QuerySpec::table("posts")
            .filter("status", "draft")
            .order_by_asc("id")
            .along_with(QuerySpec::table("tags"));
        let copy = original
            .clone()
            .filter("author_id", 1)
            .reorder()
            .limit(3)
            .along_with(QuerySpec::table("users"));
        assert_eq!(original.wheres.len(), 1);
        assert_eq!(original.orders.len(), 1);
        assert_eq!(original.limit, None);
        assert_eq!(original.options.along.len(), 1);
        assert_eq!(copy.wheres.len(), 2);
        assert_eq!(copy.options.along.len(), 2);
    }

    #[test]
    fn embedded_specs_are_snapshots() {
        let inner = QuerySpec::table("authors").filter("active", true);
        let outer = QuerySpec::table("posts")
            .filter_in("author_id", inner.clone().select(["id"]))
            .unwrap();
        let inner = inner.filter("banned", false);
        let ConditionKind::In { set, .. } = &outer.wheres.conditions()[0].kind else {
            panic!("expected IN");
        };
        let crate::condition::ValueSet::Query(embedded) = set else {
            panic!("expected sub-query");
        };
        assert_eq!(embedded.wheres.len(), 1);
        assert_eq!(inner.wheres.len(), 2);
    }

    #[test]
    fn between_with_three_bounds_fails() {
        let err = QuerySpec::table("t")
            .filter_between("x", [1, 2, 3])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConditionShape(_)));
    }

    #[test]
    fn group_callback_errors_surface() {
        let err = QuerySpec::table("t")
            .filter_group(|g| {
                g.filter("a", 1).or_filter_in("b", 2);
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConditionShape(ref e) if e.condition == "in"));
    }

    #[test]
    fn trashed_scopes_require_soft_deletes() {
        let err = QuerySpec::table("users").with_trashed().unwrap_err();
        assert!(matches!(err, Error::SoftDeleteUnsupported { ref model } if model == "users"));
        let err = QuerySpec::for_model(&ModelDescriptor::new("User"))
            .only_trashed()
            .unwrap_err();
        assert!(matches!(err, Error::SoftDeleteUnsupported { ref model } if model == "User"));
        assert!(soft().with_trashed().is_ok());
    }

    #[test]
    fn resolved_injects_without_mutating() {
        let spec = soft().filter("a", 1).or_filter("b", 2);
        let resolved = spec.resolved();
        assert_eq!(spec.wheres.len(), 2);
        assert_eq!(spec.trashed, TrashedMode::Exclude);
        // (a = 1 OR b = 2) AND posts.deleted_at IS NULL
        assert_eq!(resolved.wheres.len(), 2);
        assert!(matches!(resolved.wheres.conditions()[0].kind, ConditionKind::Group(_)));
        assert_eq!(
            resolved.wheres.conditions()[1].kind,
            ConditionKind::null("posts.deleted_at", false)
        );
        assert_eq!(resolved.resolved(), resolved);
    }

    #[test]
    fn resolved_respects_mode() {
        let only = soft().only_trashed().unwrap().resolved();
        assert_eq!(
            only.wheres.conditions()[0].kind,
            ConditionKind::null("posts.deleted_at", true)
        );
        let all = soft().with_trashed().unwrap().resolved();
        assert!(all.wheres.is_empty());
        let plain = QuerySpec::table("users").resolved();
        assert!(plain.wheres.is_empty());
    }

    #[test]
    fn selection_and_paging_helpers() {
        let spec = QuerySpec::table("orders")
            .select(["customer_id"])
            .select_sum("total", "revenue")
            .select_count("n")
            .group_by(["customer_id"])
            .having_op("revenue", Operator::Gt, 100)
            .skip(10)
            .take(5)
            .lock_for_update()
            .select_into("@report");
        assert_eq!(spec.selects.len(), 3);
        assert_eq!(spec.offset, Some(10));
        assert_eq!(spec.limit, Some(5));
        assert_eq!(spec.lock, LockMode::Exclusive);
        assert_eq!(spec.clear_lock().lock, LockMode::None);
    }

    #[test]
    fn column_operands() {
        let spec = QuerySpec::table("t").filter_op("a", Operator::Gt, col("b"));
        assert_eq!(
            spec.wheres.conditions()[0].kind,
            ConditionKind::compare("a", Operator::Gt, Operand::Column("b".to_string()))
        );
    }
}
