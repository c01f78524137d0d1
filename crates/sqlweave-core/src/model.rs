//! Model descriptors and the `Model` trait.
//!
//! A [`ModelDescriptor`] is the static, const-constructible description of
//! a table-backed model: its table, primary key, timestamp and soft-delete
//! columns, and its relations. The [`Model`] trait links a Rust type to its
//! descriptor and converts between instances and rows.

use crate::Result;
use crate::relationship::RelationshipInfo;
use crate::row::Row;
use crate::value::Value;
use std::borrow::Cow;

/// Column names used for automatic timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampColumns {
    pub created: &'static str,
    pub updated: &'static str,
}

impl TimestampColumns {
    pub const DEFAULT: TimestampColumns = TimestampColumns {
        created: "created_at",
        updated: "updated_at",
    };
}

/// Static metadata for a model.
///
/// # Example
///
/// ```ignore
/// static POST: ModelDescriptor = ModelDescriptor::new("Post")
///     .soft_deletes()
///     .relations(&[RelationshipInfo::belongs_to("author", Author::descriptor, &["author_id"])]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ModelDescriptor {
    /// Model name, used in errors and hook registrations.
    pub name: &'static str,
    /// Explicit table name; derived from `name` when absent.
    pub table: Option<&'static str>,
    pub primary_key: &'static [&'static str],
    /// `None` disables automatic timestamps.
    pub timestamps: Option<TimestampColumns>,
    /// Soft-delete column; `None` disables soft deletes.
    pub soft_delete: Option<&'static str>,
    pub relations: &'static [RelationshipInfo],
}

impl ModelDescriptor {
    /// Create a descriptor with the default configuration: primary key
    /// `id`, timestamps on `created_at`/`updated_at`, no soft deletes.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            table: None,
            primary_key: &["id"],
            timestamps: Some(TimestampColumns::DEFAULT),
            soft_delete: None,
            relations: &[],
        }
    }

    pub const fn table(self, table: &'static str) -> Self {
        Self {
            table: Some(table),
            ..self
        }
    }

    pub const fn primary_key(self, columns: &'static [&'static str]) -> Self {
        Self {
            primary_key: columns,
            ..self
        }
    }

    pub const fn timestamps(self, created: &'static str, updated: &'static str) -> Self {
        Self {
            timestamps: Some(TimestampColumns { created, updated }),
            ..self
        }
    }

    pub const fn without_timestamps(self) -> Self {
        Self {
            timestamps: None,
            ..self
        }
    }

    /// Enable soft deletes on `deleted_at`.
    pub const fn soft_deletes(self) -> Self {
        self.soft_delete_column("deleted_at")
    }

    pub const fn soft_delete_column(self, column: &'static str) -> Self {
        Self {
            soft_delete: Some(column),
            ..self
        }
    }

    pub const fn relations(self, relations: &'static [RelationshipInfo]) -> Self {
        Self { relations, ..self }
    }

    /// The table name, explicit or derived from the model name.
    pub fn table_name(&self) -> Cow<'static, str> {
        match self.table {
            Some(table) => Cow::Borrowed(table),
            None => Cow::Owned(derive_table_name(self.name)),
        }
    }

    /// Look up a relation by name.
    pub fn relation(&self, name: &str) -> Option<&'static RelationshipInfo> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn has_composite_key(&self) -> bool {
        self.primary_key.len() > 1
    }
}

impl PartialEq for ModelDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.table_name() == other.table_name()
    }
}

/// Derive a table name from a model name: snake case, then pluralized.
///
/// `BlogPost` becomes `blog_posts`, `Category` becomes `categories`.
pub fn derive_table_name(model: &str) -> String {
    let mut snake = String::with_capacity(model.len() + 4);
    let mut prev_lower = false;
    for ch in model.chars() {
        if ch.is_uppercase() {
            if prev_lower {
                snake.push('_');
            }
            snake.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            snake.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    pluralize(&snake)
}

fn pluralize(word: &str) -> String {
    let ends_with_consonant_y = word.ends_with('y')
        && !word
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'));
    if ends_with_consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

/// Trait for types that map to a table described by a [`ModelDescriptor`].
///
/// # Example
///
/// ```ignore
/// struct Post { id: i64, title: String }
///
/// impl Model for Post {
///     fn descriptor() -> &'static ModelDescriptor { &POST }
///     fn from_row(row: &Row) -> Result<Self> {
///         Ok(Self { id: row.get_named("id")?, title: row.get_named("title")? })
///     }
///     fn to_row(&self) -> Row { row! { "id" => self.id, "title" => self.title.clone() } }
/// }
/// ```
pub trait Model: Sized + Send + Sync {
    fn descriptor() -> &'static ModelDescriptor;

    /// Construct a model instance from a database row.
    #[allow(clippy::result_large_err)]
    fn from_row(row: &Row) -> Result<Self>;

    /// Convert this model instance to a row of values.
    fn to_row(&self) -> Row;

    /// Get the value of the primary key field(s), in descriptor order.
    fn primary_key_value(&self) -> Vec<Value> {
        let row = self.to_row();
        Self::descriptor()
            .primary_key
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Check if this is a new record (any primary key part is NULL).
    fn is_new(&self) -> bool {
        self.primary_key_value().iter().any(Value::is_null)
    }
}
