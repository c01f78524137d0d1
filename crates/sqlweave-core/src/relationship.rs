//! Relationship metadata.
//!
//! Relations are declared as static metadata on each [`ModelDescriptor`]:
//! a name, a kind, the target model and the key columns linking the two
//! tables. The relation engine in `sqlweave-query` walks this metadata to
//! plan and hydrate nested fetches without runtime reflection.
//!
//! Key orientation follows one rule: the **local** key lives on the target
//! (child) table and the **remote** key lives on the parent table, so the
//! join predicate is always `target.local = parent.remote`.

use crate::model::ModelDescriptor;
use std::fmt;

/// The kind of relationship between two models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// `Author` has one `Profile` (foreign key on the target).
    HasOne,
    /// `Author` has many `Post`s (foreign key on the target).
    HasMany,
    /// `Post` belongs to one `Author` (foreign key on the parent).
    BelongsTo,
    /// Like `BelongsTo`, but every match is kept.
    BelongsToMany,
}

impl RelationshipKind {
    /// The default cardinality for this kind.
    pub const fn cardinality(self) -> Cardinality {
        match self {
            RelationshipKind::HasOne | RelationshipKind::BelongsTo => Cardinality::One,
            RelationshipKind::HasMany | RelationshipKind::BelongsToMany => Cardinality::Many,
        }
    }

    /// Whether the foreign key lives on the parent table.
    pub const fn is_owning_side(self) -> bool {
        matches!(
            self,
            RelationshipKind::BelongsTo | RelationshipKind::BelongsToMany
        )
    }
}

/// How many related rows a parent row receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// Static description of a relation from one model to another.
///
/// # Example
///
/// ```ignore
/// static AUTHOR: ModelDescriptor = ModelDescriptor::new("Author").relations(&[
///     RelationshipInfo::has_many("posts", Post::descriptor, &["author_id"]),
/// ]);
/// ```
#[derive(Clone, Copy)]
pub struct RelationshipInfo {
    /// Name used in relation paths and as the attachment key.
    pub name: &'static str,
    pub kind: RelationshipKind,
    pub cardinality: Cardinality,
    /// Lazily resolved target so models can refer to each other.
    pub target: fn() -> &'static ModelDescriptor,
    /// Columns on the target table. Empty means the target's primary key.
    pub local_key: &'static [&'static str],
    /// Columns on the parent table. Empty means the parent's primary key.
    pub remote_key: &'static [&'static str],
}

impl RelationshipInfo {
    /// Create a relation with explicit keys.
    pub const fn new(
        name: &'static str,
        kind: RelationshipKind,
        target: fn() -> &'static ModelDescriptor,
        local_key: &'static [&'static str],
        remote_key: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            kind,
            cardinality: kind.cardinality(),
            target,
            local_key,
            remote_key,
        }
    }

    /// The target holds `foreign_key` pointing at the parent's primary key.
    pub const fn has_one(
        name: &'static str,
        target: fn() -> &'static ModelDescriptor,
        foreign_key: &'static [&'static str],
    ) -> Self {
        Self::new(name, RelationshipKind::HasOne, target, foreign_key, &[])
    }

    /// The target holds `foreign_key` pointing at the parent's primary key.
    pub const fn has_many(
        name: &'static str,
        target: fn() -> &'static ModelDescriptor,
        foreign_key: &'static [&'static str],
    ) -> Self {
        Self::new(name, RelationshipKind::HasMany, target, foreign_key, &[])
    }

    /// The parent holds `foreign_key` pointing at the target's primary key.
    pub const fn belongs_to(
        name: &'static str,
        target: fn() -> &'static ModelDescriptor,
        foreign_key: &'static [&'static str],
    ) -> Self {
        Self::new(name, RelationshipKind::BelongsTo, target, &[], foreign_key)
    }

    /// The parent holds `foreign_key`; every matching target row is kept.
    pub const fn belongs_to_many(
        name: &'static str,
        target: fn() -> &'static ModelDescriptor,
        foreign_key: &'static [&'static str],
    ) -> Self {
        Self::new(name, RelationshipKind::BelongsToMany, target, &[], foreign_key)
    }

    /// Override the key referenced on the "primary key" side.
    pub const fn primary_key(self, columns: &'static [&'static str]) -> Self {
        if self.kind.is_owning_side() {
            Self {
                local_key: columns,
                ..self
            }
        } else {
            Self {
                remote_key: columns,
                ..self
            }
        }
    }

    /// Override the cardinality implied by the kind.
    pub const fn cardinality(self, cardinality: Cardinality) -> Self {
        Self {
            cardinality,
            ..self
        }
    }

    /// The target model's descriptor.
    pub fn target(&self) -> &'static ModelDescriptor {
        (self.target)()
    }

    /// Resolve `(local, remote)` key columns, filling defaults from primary keys.
    pub fn keys(
        &self,
        parent: &ModelDescriptor,
    ) -> (&'static [&'static str], &'static [&'static str]) {
        let local = if self.local_key.is_empty() {
            self.target().primary_key
        } else {
            self.local_key
        };
        let remote = if self.remote_key.is_empty() {
            parent.primary_key
        } else {
            self.remote_key
        };
        (local, remote)
    }
}

impl fmt::Debug for RelationshipInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationshipInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("cardinality", &self.cardinality)
            .field("target", &self.target().name)
            .field("local_key", &self.local_key)
            .field("remote_key", &self.remote_key)
            .finish()
    }
}

impl PartialEq for RelationshipInfo {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.kind == other.kind
            && self.cardinality == other.cardinality
            && std::ptr::eq(self.target(), other.target())
            && self.local_key == other.local_key
            && self.remote_key == other.remote_key
    }
}
