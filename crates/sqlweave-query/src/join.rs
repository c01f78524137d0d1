//! JOIN clause types.

use crate::clause::TableRef;
use crate::condition::{ConditionBuilder, ConditionKind, ConditionTree, Operator, Relation};
use crate::spec::QuerySpec;
use sqlweave_core::ShapeError;

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    /// Joined table or aliased nested query
    pub target: TableRef,
    /// ON condition; empty for cross joins
    pub on: ConditionTree,
}

/// Types of joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
    /// Full outer join
    Outer,
}

impl JoinKind {
    /// Get the SQL keyword for this join kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
            JoinKind::Outer => "FULL OUTER JOIN",
        }
    }
}

/// What a join attaches: a table name or a nested query.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinTarget {
    Table(String),
    Query(Box<QuerySpec>),
}

impl From<&str> for JoinTarget {
    fn from(table: &str) -> Self {
        JoinTarget::Table(table.to_string())
    }
}

impl From<String> for JoinTarget {
    fn from(table: String) -> Self {
        JoinTarget::Table(table)
    }
}

impl From<QuerySpec> for JoinTarget {
    fn from(spec: QuerySpec) -> Self {
        JoinTarget::Query(Box::new(spec))
    }
}

impl Join {
    /// Join on a single `first op second` column comparison.
    ///
    /// A nested query without an alias is aliased `t`.
    pub fn on_columns(
        kind: JoinKind,
        target: impl Into<JoinTarget>,
        alias: Option<String>,
        first: impl Into<String>,
        op: Operator,
        second: impl Into<String>,
    ) -> Self {
        let mut on = ConditionTree::new();
        on.add(Relation::And, ConditionKind::columns(first, op, second));
        Self {
            kind,
            target: target_ref(target.into(), alias),
            on,
        }
    }

    /// Join with an ON tree populated by a builder callback.
    pub fn on_builder(
        kind: JoinKind,
        target: impl Into<JoinTarget>,
        alias: Option<String>,
        f: impl FnOnce(&mut ConditionBuilder),
    ) -> Result<Self, ShapeError> {
        let mut builder = ConditionBuilder::new();
        f(&mut builder);
        Ok(Self {
            kind,
            target: target_ref(target.into(), alias),
            on: builder.build()?,
        })
    }

    /// A cross join has no ON condition.
    pub fn cross(target: impl Into<JoinTarget>, alias: Option<String>) -> Self {
        Self {
            kind: JoinKind::Cross,
            target: target_ref(target.into(), alias),
            on: ConditionTree::new(),
        }
    }
}

fn target_ref(target: JoinTarget, alias: Option<String>) -> TableRef {
    match target {
        JoinTarget::Table(name) => TableRef::Table { name, alias },
        JoinTarget::Query(spec) => TableRef::Query {
            spec,
            alias: alias.unwrap_or_else(|| "t".to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subquery_join_defaults_alias() {
        let join = Join::on_columns(
            JoinKind::Inner,
            QuerySpec::table("authors"),
            None,
            "posts.author_id",
            Operator::Eq,
            "t.id",
        );
        assert_eq!(join.target.qualifier(), "t");
        assert_eq!(join.on.len(), 1);
    }

    #[test]
    fn builder_join_collects_conditions() {
        let join = Join::on_builder(JoinKind::Left, "profiles", Some("p".into()), |on| {
            on.filter_column("p.user_id", Operator::Eq, "users.id")
                .filter_not_null("p.active");
        })
        .unwrap();
        assert_eq!(join.kind, JoinKind::Left);
        assert_eq!(join.target.qualifier(), "p");
        assert_eq!(join.on.len(), 2);
    }

    #[test]
    fn cross_join_has_no_condition() {
        let join = Join::cross("colors", None);
        assert!(join.on.is_empty());
        assert_eq!(join.kind.as_str(), "CROSS JOIN");
    }
}
