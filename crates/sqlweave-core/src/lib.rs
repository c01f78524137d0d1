//! Core types for sqlweave.
//!
//! This crate provides the foundational pieces shared by the query layer,
//! drivers and the model layer:
//!
//! - [`Value`] and [`Row`] for dynamically typed data and hydrated row graphs
//! - [`Error`] for every failure the engine can report
//! - [`ModelDescriptor`] and [`RelationshipInfo`] for static model metadata
//! - [`HookRegistry`] for model lifecycle callbacks
//! - `Outcome` and `Cx` re-exported from asupersync for cancel-correct I/O

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod error;
pub mod hooks;
pub mod model;
pub mod relationship;
pub mod row;
pub mod value;

pub use error::{DriverError, Error, Result, ShapeError, TypeError};
pub use hooks::{HookEvent, HookFn, HookRegistry, ModelHook};
pub use model::{Model, ModelDescriptor, TimestampColumns, derive_table_name};
pub use relationship::{Cardinality, RelationshipInfo, RelationshipKind};
pub use row::{FromValue, Related, Row};
pub use value::{JoinKey, Value};

/// Unwrap an `Outcome::Ok`, or return any other outcome from the enclosing
/// function. With `@result`, lifts a `Result` error into `Outcome::Err`.
#[macro_export]
macro_rules! try_outcome {
    (@result $expr:expr) => {
        match $expr {
            ::core::result::Result::Ok(value) => value,
            ::core::result::Result::Err(e) => return $crate::Outcome::Err(e.into()),
        }
    };
    ($expr:expr) => {
        match $expr {
            $crate::Outcome::Ok(value) => value,
            $crate::Outcome::Err(e) => return $crate::Outcome::Err(e),
            $crate::Outcome::Cancelled(r) => return $crate::Outcome::Cancelled(r),
            $crate::Outcome::Panicked(p) => return $crate::Outcome::Panicked(p),
        }
    };
}
