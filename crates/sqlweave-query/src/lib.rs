//! Query specifications for sqlweave.
//!
//! `sqlweave-query` is the **query construction layer**. It provides the
//! fluent [`QuerySpec`] builder, condition trees, the relation hydration
//! engine and the [`Driver`] boundary through which specifications are
//! executed.
//!
//! # Role In The Architecture
//!
//! - **Builder**: `QuerySpec` describes reads and mutations structurally;
//!   nothing here renders SQL.
//! - **Relations**: `with`-style dotted paths become a [`RelationPlan`],
//!   fetched as one batch and stitched onto parent rows.
//! - **Execution**: terminal operations (`get`, `count`, `insert`, ...)
//!   resolve soft-delete visibility and hand the result to a `Driver`.
//!
//! Most users access these types via the `sqlweave` facade crate.

pub mod clause;
pub mod condition;
pub mod driver;
pub mod eager;
pub mod exec;
pub mod join;
pub mod spec;

pub use clause::{
    AggregateFn, Direction, GroupItem, LockMode, OrderItem, SelectItem, TableRef, TrashedMode,
    Union, UnionSource,
};
pub use condition::{
    Bounds, Condition, ConditionBuilder, ConditionKind, ConditionTree, DatePart, Operand,
    Operator, Relation, Subject, ValueSet, col,
};
pub use driver::{Driver, InsertResult};
pub use eager::{Expansion, FetchConfig, PlanNode, RelationPlan, expand, reconstruct};
pub use exec::PluckMap;
pub use join::{Join, JoinKind, JoinTarget};
pub use spec::{QuerySpec, RowHook, SpecOptions, TablePolicy};
