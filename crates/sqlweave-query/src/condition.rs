//! Condition trees for WHERE, HAVING and JOIN ... ON clauses.
//!
//! A [`ConditionTree`] is an ordered list of [`Condition`]s. Every condition
//! carries the [`Relation`] (`AND`/`OR`) joining it to its predecessor; the
//! first entry's relation is always normalized to `AND`. Groups nest a whole
//! tree behind a single relation tag, exactly like parentheses in SQL.
//!
//! Trees are purely structural. Drivers decide how to render or evaluate
//! them; the reference semantics are SQL's (`AND` binds tighter than `OR`).

use crate::spec::QuerySpec;
use sqlweave_core::{ShapeError, Value};

/// How a condition joins its predecessor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Relation {
    #[default]
    And,
    Or,
}

impl Relation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Relation::And => "AND",
            Relation::Or => "OR",
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Operator {
    #[default]
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Operator {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
        }
    }

    /// Parse the textual form of an operator.
    pub fn parse(op: &str) -> Option<Self> {
        match op {
            "=" | "==" => Some(Operator::Eq),
            "!=" | "<>" => Some(Operator::Ne),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Ge),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Le),
            _ => None,
        }
    }
}

/// Part of a temporal value a date condition compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatePart {
    Date,
    Year,
    Month,
    Day,
    Time,
}

/// Left-hand side of a condition: a column or a nested query.
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    Column(String),
    Query(Box<QuerySpec>),
}

impl From<&str> for Subject {
    fn from(column: &str) -> Self {
        Subject::Column(column.to_string())
    }
}

impl From<String> for Subject {
    fn from(column: String) -> Self {
        Subject::Column(column)
    }
}

impl From<&String> for Subject {
    fn from(column: &String) -> Self {
        Subject::Column(column.clone())
    }
}

impl From<QuerySpec> for Subject {
    fn from(spec: QuerySpec) -> Self {
        Subject::Query(Box::new(spec))
    }
}

/// Right-hand side of a condition: a literal, a column, or a nested query.
///
/// Plain Rust values convert into literals; use [`col`] for column
/// references.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Value(Value),
    Column(String),
    Query(Box<QuerySpec>),
}

/// A column reference usable as an [`Operand`].
pub fn col(name: impl Into<String>) -> Operand {
    Operand::Column(name.into())
}

macro_rules! operand_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Operand {
                fn from(v: $ty) -> Self {
                    Operand::Value(v.into())
                }
            }
        )*
    };
}

operand_from_value!(Value, bool, i32, i64, u32, f64, &str, String, &String);

impl<T: Into<Value>> From<Option<T>> for Operand {
    fn from(v: Option<T>) -> Self {
        Operand::Value(v.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(v: Vec<T>) -> Self {
        Operand::Value(v.into())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Operand {
    fn from(v: [T; N]) -> Self {
        Operand::Value(v.into())
    }
}

impl From<QuerySpec> for Operand {
    fn from(spec: QuerySpec) -> Self {
        Operand::Query(Box::new(spec))
    }
}

/// Bounds of a BETWEEN condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Bounds {
    Values(Value, Value),
    Query(Box<QuerySpec>),
}

/// Candidate set of an IN condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSet {
    Values(Vec<Value>),
    Query(Box<QuerySpec>),
}

/// The closed set of condition shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionKind {
    /// `subject op rhs`
    Value {
        subject: Subject,
        op: Operator,
        rhs: Operand,
    },
    /// `first op second`, both columns
    Column {
        first: String,
        op: Operator,
        second: String,
    },
    /// `subject IS [NOT] NULL`
    Null { subject: Subject, negated: bool },
    /// `subject [NOT] BETWEEN low AND high`
    Between {
        subject: Subject,
        bounds: Bounds,
        negated: bool,
    },
    /// `subject [NOT] LIKE pattern`
    Like {
        subject: Subject,
        pattern: String,
        negated: bool,
    },
    /// `subject [NOT] IN (set)`
    In {
        subject: Subject,
        set: ValueSet,
        negated: bool,
    },
    /// `PART(subject) op rhs`
    DatePart {
        part: DatePart,
        subject: Subject,
        op: Operator,
        rhs: Operand,
    },
    /// Verbatim fragment with bound parameters
    Raw { sql: String, params: Vec<Value> },
    /// Parenthesized sub-tree
    Group(ConditionTree),
}

impl ConditionKind {
    pub fn compare(subject: impl Into<Subject>, op: Operator, rhs: impl Into<Operand>) -> Self {
        ConditionKind::Value {
            subject: subject.into(),
            op,
            rhs: rhs.into(),
        }
    }

    pub fn columns(first: impl Into<String>, op: Operator, second: impl Into<String>) -> Self {
        ConditionKind::Column {
            first: first.into(),
            op,
            second: second.into(),
        }
    }

    pub fn null(subject: impl Into<Subject>, negated: bool) -> Self {
        ConditionKind::Null {
            subject: subject.into(),
            negated,
        }
    }

    /// Build a BETWEEN condition from a two-element list or a sub-query.
    pub fn between(
        subject: impl Into<Subject>,
        bounds: impl Into<Operand>,
        negated: bool,
    ) -> Result<Self, ShapeError> {
        let bounds = match bounds.into() {
            Operand::Value(Value::Array(items)) => {
                let count = items.len();
                let mut items = items.into_iter();
                match (items.next(), items.next(), count) {
                    (Some(low), Some(high), 2) => Bounds::Values(low, high),
                    _ => {
                        return Err(ShapeError::new(
                            "between",
                            format!("expected exactly two bounds, got {count}"),
                        ));
                    }
                }
            }
            Operand::Query(spec) => Bounds::Query(spec),
            Operand::Value(other) => {
                return Err(ShapeError::new(
                    "between",
                    format!("expected two bounds, got a single {}", other.type_name()),
                ));
            }
            Operand::Column(name) => {
                return Err(ShapeError::new(
                    "between",
                    format!("expected two bounds, got column '{name}'"),
                ));
            }
        };
        Ok(ConditionKind::Between {
            subject: subject.into(),
            bounds,
            negated,
        })
    }

    /// Build an IN condition from a list or a sub-query.
    pub fn is_in(
        subject: impl Into<Subject>,
        set: impl Into<Operand>,
        negated: bool,
    ) -> Result<Self, ShapeError> {
        let set = match set.into() {
            Operand::Value(Value::Array(items)) => ValueSet::Values(items),
            Operand::Query(spec) => ValueSet::Query(spec),
            Operand::Value(other) => {
                return Err(ShapeError::new(
                    "in",
                    format!("expected a list or sub-query, got {}", other.type_name()),
                ));
            }
            Operand::Column(name) => {
                return Err(ShapeError::new(
                    "in",
                    format!("expected a list or sub-query, got column '{name}'"),
                ));
            }
        };
        Ok(ConditionKind::In {
            subject: subject.into(),
            set,
            negated,
        })
    }

    /// Build a LIKE condition; the pattern must be text.
    pub fn like(
        subject: impl Into<Subject>,
        pattern: impl Into<Operand>,
        negated: bool,
    ) -> Result<Self, ShapeError> {
        match pattern.into() {
            Operand::Value(Value::Text(pattern)) => Ok(ConditionKind::Like {
                subject: subject.into(),
                pattern,
                negated,
            }),
            Operand::Value(other) => Err(ShapeError::new(
                "like",
                format!("expected a text pattern, got {}", other.type_name()),
            )),
            Operand::Column(_) | Operand::Query(_) => Err(ShapeError::new(
                "like",
                "expected a text pattern",
            )),
        }
    }

    pub fn date_part(
        part: DatePart,
        subject: impl Into<Subject>,
        op: Operator,
        rhs: impl Into<Operand>,
    ) -> Self {
        ConditionKind::DatePart {
            part,
            subject: subject.into(),
            op,
            rhs: rhs.into(),
        }
    }

    pub fn raw(sql: impl Into<String>, params: Vec<Value>) -> Self {
        ConditionKind::Raw {
            sql: sql.into(),
            params,
        }
    }

    /// Run `f` against a fresh builder and wrap the result in a group.
    pub fn group(f: impl FnOnce(&mut ConditionBuilder)) -> Result<Self, ShapeError> {
        let mut builder = ConditionBuilder::new();
        f(&mut builder);
        builder.build().map(ConditionKind::Group)
    }
}

/// A condition and the relation joining it to its predecessor.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub relation: Relation,
    pub kind: ConditionKind,
}

/// An ordered list of conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionTree {
    conditions: Vec<Condition>,
}

impl ConditionTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a condition. The first entry is always joined with `AND`.
    pub fn add(&mut self, relation: Relation, kind: ConditionKind) {
        let relation = if self.conditions.is_empty() {
            Relation::And
        } else {
            relation
        };
        self.conditions.push(Condition { relation, kind });
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.conditions.iter()
    }

    pub fn clear(&mut self) {
        self.conditions.clear();
    }

    /// Wrap the whole tree in one group.
    pub fn nest(self) -> ConditionTree {
        if self.is_empty() {
            return self;
        }
        let mut nested = ConditionTree::new();
        nested.add(Relation::And, ConditionKind::Group(self));
        nested
    }

    /// Remove groups that do not change how the tree evaluates.
    ///
    /// A group is inlined when it has a single child, when it is the only
    /// entry of its parent, or when all of its children are `AND`-joined.
    /// Empty groups are dropped. Groups that mix `OR` into a longer chain
    /// are kept.
    pub fn flatten(self) -> ConditionTree {
        let only_child = self.conditions.len() == 1;
        let mut flat = ConditionTree::new();
        for condition in self.conditions {
            let Condition { relation, kind } = condition;
            match kind {
                ConditionKind::Group(inner) => {
                    let inner = inner.flatten();
                    let all_and = inner.iter().all(|c| c.relation == Relation::And);
                    if inner.is_empty() {
                        continue;
                    }
                    if only_child || inner.len() == 1 || all_and {
                        for (i, child) in inner.conditions.into_iter().enumerate() {
                            let rel = if i == 0 { relation } else { child.relation };
                            flat.add(rel, child.kind);
                        }
                    } else {
                        flat.add(relation, ConditionKind::Group(inner));
                    }
                }
                kind => flat.add(relation, kind),
            }
        }
        flat
    }

    /// Maximum group depth; a flat tree has depth 1, an empty tree 0.
    pub fn depth(&self) -> usize {
        self.conditions
            .iter()
            .map(|c| match &c.kind {
                ConditionKind::Group(inner) => 1 + inner.depth(),
                _ => 1,
            })
            .max()
            .unwrap_or(0)
    }
}

impl<'a> IntoIterator for &'a ConditionTree {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.conditions.iter()
    }
}

/// Mutable handle passed to group callbacks.
///
/// Methods chain on `&mut Self`. Shape errors (for example a BETWEEN with
/// three bounds) are recorded instead of returned; the first one is
/// surfaced when the group is closed.
///
/// # Example
///
/// ```ignore
/// let spec = QuerySpec::table("posts").filter_group(|g| {
///     g.filter("status", "draft").or_filter_null("published_at");
/// })?;
/// ```
#[derive(Debug, Default)]
pub struct ConditionBuilder {
    tree: ConditionTree,
    error: Option<ShapeError>,
}

impl ConditionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish the builder, failing with the first recorded shape error.
    pub fn build(self) -> Result<ConditionTree, ShapeError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.tree),
        }
    }

    /// Append an already-built condition.
    pub fn add(&mut self, relation: Relation, kind: ConditionKind) -> &mut Self {
        self.tree.add(relation, kind);
        self
    }

    fn add_checked(
        &mut self,
        relation: Relation,
        kind: Result<ConditionKind, ShapeError>,
    ) -> &mut Self {
        match kind {
            Ok(kind) => self.add(relation, kind),
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
                self
            }
        }
    }

    /// `subject = value`
    pub fn filter(&mut self, subject: impl Into<Subject>, value: impl Into<Operand>) -> &mut Self {
        self.add(Relation::And, ConditionKind::compare(subject, Operator::Eq, value))
    }

    pub fn or_filter(
        &mut self,
        subject: impl Into<Subject>,
        value: impl Into<Operand>,
    ) -> &mut Self {
        self.add(Relation::Or, ConditionKind::compare(subject, Operator::Eq, value))
    }

    pub fn filter_op(
        &mut self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> &mut Self {
        self.add(Relation::And, ConditionKind::compare(subject, op, value))
    }

    pub fn or_filter_op(
        &mut self,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> &mut Self {
        self.add(Relation::Or, ConditionKind::compare(subject, op, value))
    }

    pub fn filter_null(&mut self, subject: impl Into<Subject>) -> &mut Self {
        self.add(Relation::And, ConditionKind::null(subject, false))
    }

    pub fn or_filter_null(&mut self, subject: impl Into<Subject>) -> &mut Self {
        self.add(Relation::Or, ConditionKind::null(subject, false))
    }

    pub fn filter_not_null(&mut self, subject: impl Into<Subject>) -> &mut Self {
        self.add(Relation::And, ConditionKind::null(subject, true))
    }

    pub fn or_filter_not_null(&mut self, subject: impl Into<Subject>) -> &mut Self {
        self.add(Relation::Or, ConditionKind::null(subject, true))
    }

    pub fn filter_between(
        &mut self,
        subject: impl Into<Subject>,
        bounds: impl Into<Operand>,
    ) -> &mut Self {
        self.add_checked(Relation::And, ConditionKind::between(subject, bounds, false))
    }

    pub fn or_filter_between(
        &mut self,
        subject: impl Into<Subject>,
        bounds: impl Into<Operand>,
    ) -> &mut Self {
        self.add_checked(Relation::Or, ConditionKind::between(subject, bounds, false))
    }

    pub fn filter_not_between(
        &mut self,
        subject: impl Into<Subject>,
        bounds: impl Into<Operand>,
    ) -> &mut Self {
        self.add_checked(Relation::And, ConditionKind::between(subject, bounds, true))
    }

    pub fn or_filter_not_between(
        &mut self,
        subject: impl Into<Subject>,
        bounds: impl Into<Operand>,
    ) -> &mut Self {
        self.add_checked(Relation::Or, ConditionKind::between(subject, bounds, true))
    }

    pub fn filter_in(&mut self, subject: impl Into<Subject>, set: impl Into<Operand>) -> &mut Self {
        self.add_checked(Relation::And, ConditionKind::is_in(subject, set, false))
    }

    pub fn or_filter_in(
        &mut self,
        subject: impl Into<Subject>,
        set: impl Into<Operand>,
    ) -> &mut Self {
        self.add_checked(Relation::Or, ConditionKind::is_in(subject, set, false))
    }

    pub fn filter_not_in(
        &mut self,
        subject: impl Into<Subject>,
        set: impl Into<Operand>,
    ) -> &mut Self {
        self.add_checked(Relation::And, ConditionKind::is_in(subject, set, true))
    }

    pub fn or_filter_not_in(
        &mut self,
        subject: impl Into<Subject>,
        set: impl Into<Operand>,
    ) -> &mut Self {
        self.add_checked(Relation::Or, ConditionKind::is_in(subject, set, true))
    }

    pub fn filter_like(
        &mut self,
        subject: impl Into<Subject>,
        pattern: impl Into<Operand>,
    ) -> &mut Self {
        self.add_checked(Relation::And, ConditionKind::like(subject, pattern, false))
    }

    pub fn or_filter_like(
        &mut self,
        subject: impl Into<Subject>,
        pattern: impl Into<Operand>,
    ) -> &mut Self {
        self.add_checked(Relation::Or, ConditionKind::like(subject, pattern, false))
    }

    pub fn filter_not_like(
        &mut self,
        subject: impl Into<Subject>,
        pattern: impl Into<Operand>,
    ) -> &mut Self {
        self.add_checked(Relation::And, ConditionKind::like(subject, pattern, true))
    }

    pub fn or_filter_not_like(
        &mut self,
        subject: impl Into<Subject>,
        pattern: impl Into<Operand>,
    ) -> &mut Self {
        self.add_checked(Relation::Or, ConditionKind::like(subject, pattern, true))
    }

    pub fn filter_column(
        &mut self,
        first: impl Into<String>,
        op: Operator,
        second: impl Into<String>,
    ) -> &mut Self {
        self.add(Relation::And, ConditionKind::columns(first, op, second))
    }

    pub fn or_filter_column(
        &mut self,
        first: impl Into<String>,
        op: Operator,
        second: impl Into<String>,
    ) -> &mut Self {
        self.add(Relation::Or, ConditionKind::columns(first, op, second))
    }

    pub fn filter_date_part(
        &mut self,
        part: DatePart,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> &mut Self {
        self.add(Relation::And, ConditionKind::date_part(part, subject, op, value))
    }

    pub fn or_filter_date_part(
        &mut self,
        part: DatePart,
        subject: impl Into<Subject>,
        op: Operator,
        value: impl Into<Operand>,
    ) -> &mut Self {
        self.add(Relation::Or, ConditionKind::date_part(part, subject, op, value))
    }

    pub fn filter_raw(&mut self, sql: impl Into<String>, params: Vec<Value>) -> &mut Self {
        self.add(Relation::And, ConditionKind::raw(sql, params))
    }

    pub fn or_filter_raw(&mut self, sql: impl Into<String>, params: Vec<Value>) -> &mut Self {
        self.add(Relation::Or, ConditionKind::raw(sql, params))
    }

    /// Open an `AND`-joined group populated by `f`.
    pub fn filter_group(&mut self, f: impl FnOnce(&mut ConditionBuilder)) -> &mut Self {
        self.add_checked(Relation::And, ConditionKind::group(f))
    }

    /// Open an `OR`-joined group populated by `f`.
    pub fn or_filter_group(&mut self, f: impl FnOnce(&mut ConditionBuilder)) -> &mut Self {
        self.add_checked(Relation::Or, ConditionKind::group(f))
    }
}
