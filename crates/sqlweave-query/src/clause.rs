//! Clause types (selection, ordering, grouping, unions, locking).

use crate::spec::QuerySpec;
use sqlweave_core::Value;

/// Source of a query: a named table or an aliased nested query.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Table { name: String, alias: Option<String> },
    Query { spec: Box<QuerySpec>, alias: String },
}

impl TableRef {
    pub fn table(name: impl Into<String>) -> Self {
        TableRef::Table {
            name: name.into(),
            alias: None,
        }
    }

    pub fn query(spec: QuerySpec, alias: impl Into<String>) -> Self {
        TableRef::Query {
            spec: Box::new(spec),
            alias: alias.into(),
        }
    }

    /// The name other clauses use to qualify this source's columns.
    pub fn qualifier(&self) -> &str {
        match self {
            TableRef::Table { name, alias } => alias.as_deref().unwrap_or(name),
            TableRef::Query { alias, .. } => alias,
        }
    }

    /// The underlying table name, if this is not a nested query.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            TableRef::Table { name, .. } => Some(name),
            TableRef::Query { .. } => None,
        }
    }

    pub(crate) fn set_alias(&mut self, new_alias: String) {
        match self {
            TableRef::Table { alias, .. } => *alias = Some(new_alias),
            TableRef::Query { alias, .. } => *alias = new_alias,
        }
    }
}

/// Aggregate functions usable in selections and terminal reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    Sum,
    Average,
    Min,
    Max,
}

impl AggregateFn {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Average => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

/// One entry of the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// A column, `table.column`, `*` or `table.*`.
    Column(String),
    Raw {
        sql: String,
        params: Vec<Value>,
    },
    /// `func(column) AS alias`; a `None` column means `*`.
    Aggregate {
        func: AggregateFn,
        column: Option<String>,
        alias: String,
    },
    /// `(spec) AS alias`
    Sub {
        spec: Box<QuerySpec>,
        alias: String,
    },
}

/// One entry of the GROUP BY list.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupItem {
    Column(String),
    Raw { sql: String, params: Vec<Value> },
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// One entry of the ORDER BY list.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderItem {
    Column {
        column: String,
        direction: Direction,
    },
    Raw {
        sql: String,
        params: Vec<Value>,
    },
    Query {
        spec: Box<QuerySpec>,
        direction: Direction,
    },
    /// Pseudo-random order, reproducible for the same seed. The ordering
    /// function itself belongs to the driver.
    Shuffle { seed: String },
}

/// Source of a UNION member.
#[derive(Debug, Clone, PartialEq)]
pub enum UnionSource {
    Query(Box<QuerySpec>),
    Raw { sql: String, params: Vec<Value> },
}

/// A UNION member.
#[derive(Debug, Clone, PartialEq)]
pub struct Union {
    pub source: UnionSource,
    /// `UNION ALL` keeps duplicates.
    pub all: bool,
}

/// Row lock requested for a read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LockMode {
    #[default]
    None,
    /// `FOR SHARE` / `LOCK IN SHARE MODE`
    Shared,
    /// `FOR UPDATE`
    Exclusive,
}

/// Soft-delete visibility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TrashedMode {
    /// Only rows whose soft-delete column is NULL.
    #[default]
    Exclude,
    /// Every row.
    Include,
    /// Only rows whose soft-delete column is set.
    Only,
}
