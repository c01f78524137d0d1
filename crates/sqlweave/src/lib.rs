//! sqlweave - fluent query specifications and relation hydration for Rust.
//!
//! sqlweave sits between application model code and a database driver:
//!
//! - Build reads and mutations with the fluent [`QuerySpec`] builder
//! - Declare models and their relations as static [`ModelDescriptor`]s
//! - Load nested relations (`with(["author.publisher"])`) in one batch and
//!   get them back attached to each row
//! - Soft deletes, automatic timestamps and lifecycle hooks
//! - Cancel-correct async execution on asupersync through any [`Driver`]
//!
//! The library never renders SQL. A [`Driver`] receives the structured
//! specification and returns rows; `sqlweave-memory` provides one that
//! evaluates specifications in process.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlweave::prelude::*;
//!
//! static AUTHOR: ModelDescriptor = ModelDescriptor::new("Author")
//!     .relations(&[RelationshipInfo::has_many("posts", post, &["author_id"])]);
//! static POST: ModelDescriptor = ModelDescriptor::new("Post").soft_deletes();
//!
//! fn post() -> &'static ModelDescriptor {
//!     &POST
//! }
//!
//! async fn example(cx: &Cx, db: &impl Driver) -> Outcome<(), Error> {
//!     let recent = QuerySpec::for_model(&POST)
//!         .filter_op("created_at", Operator::Ge, "2024-01-01")
//!         .order_by_desc("created_at")
//!         .limit(10);
//!     let rows = try_outcome!(recent.get(cx, db).await);
//!
//!     let plan = try_outcome!(@result RelationPlan::parse(&AUTHOR, ["posts"]));
//!     let authors = try_outcome!(
//!         QuerySpec::for_model(&AUTHOR)
//!             .with_relations(plan)
//!             .get(cx, db)
//!             .await
//!     );
//!     // authors[i].many("posts") holds that author's live posts
//!     Outcome::Ok(())
//! }
//! ```

// Re-export all public types from sub-crates
pub use sqlweave_core::{
    Cardinality,
    // asupersync re-exports
    Cx,
    // Errors
    DriverError,
    Error,
    FromValue,
    // Hooks
    HookEvent,
    HookFn,
    HookRegistry,
    JoinKey,
    // Models
    Model,
    ModelDescriptor,
    ModelHook,
    Outcome,
    Related,
    RelationshipInfo,
    RelationshipKind,
    Result,
    // Data
    Row,
    ShapeError,
    TimestampColumns,
    TypeError,
    Value,
    derive_table_name,
    row,
    try_outcome,
};

pub use sqlweave_query::{
    AggregateFn, Bounds, Condition, ConditionBuilder, ConditionKind, ConditionTree, DatePart,
    Direction, Driver, Expansion, FetchConfig, GroupItem, InsertResult, Join, JoinKind,
    JoinTarget, LockMode, Operand, Operator, OrderItem, PlanNode, PluckMap, QuerySpec, Relation,
    RelationPlan, RowHook, SelectItem, SpecOptions, Subject, TablePolicy, TableRef, TrashedMode,
    Union, UnionSource, ValueSet, col, expand, reconstruct,
};

pub mod repository;
pub use repository::{ModelQuery, Repository, base_spec, primary_key_condition};

/// Common imports for working with sqlweave.
///
/// ```ignore
/// use sqlweave::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // asupersync
        Cx,
        Direction,
        Driver,
        Error,
        FetchConfig,
        HookEvent,
        HookRegistry,
        JoinKind,
        Model,
        ModelDescriptor,
        ModelHook,
        ModelQuery,
        Operator,
        Outcome,
        QuerySpec,
        RelationPlan,
        RelationshipInfo,
        Repository,
        Result,
        Row,
        Value,
        base_spec,
        col,
        primary_key_condition,
        row,
        try_outcome,
    };
}
