#![allow(dead_code)]

use sqlweave::prelude::*;
use sqlweave::FromValue;
use sqlweave_memory::MemoryDatabase;

pub fn unwrap_outcome<T>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected an error, got {other:?}"),
    }
}

pub static AUTHOR: ModelDescriptor = ModelDescriptor::new("Author")
    .without_timestamps()
    .relations(&[
        RelationshipInfo::has_many("posts", post, &["author_id"]),
        RelationshipInfo::belongs_to("publisher", publisher, &["publisher_id"]),
    ]);

pub static POST: ModelDescriptor = ModelDescriptor::new("Post")
    .soft_deletes()
    .relations(&[RelationshipInfo::belongs_to("author", author, &["author_id"])]);

pub static PUBLISHER: ModelDescriptor = ModelDescriptor::new("Publisher").without_timestamps();

pub static MEMBERSHIP: ModelDescriptor = ModelDescriptor::new("Membership")
    .primary_key(&["team_id", "user_id"])
    .without_timestamps();

fn author() -> &'static ModelDescriptor {
    &AUTHOR
}

fn post() -> &'static ModelDescriptor {
    &POST
}

fn publisher() -> &'static ModelDescriptor {
    &PUBLISHER
}

fn optional<T: FromValue>(row: &Row, column: &str) -> Result<Option<T>> {
    match row.get(column) {
        Some(value) => Option::<T>::from_value(value),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub publisher_id: Option<i64>,
    /// Filled when `posts` was hydrated.
    pub posts: Vec<Post>,
}

impl Model for Author {
    fn descriptor() -> &'static ModelDescriptor {
        &AUTHOR
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.get_named("id")?,
            name: row.get_named("name")?,
            publisher_id: optional(row, "publisher_id")?,
            posts: row
                .many("posts")
                .iter()
                .map(Post::from_row)
                .collect::<Result<_>>()?,
        })
    }

    fn to_row(&self) -> Row {
        row! {
            "id" => self.id,
            "name" => self.name.clone(),
            "publisher_id" => self.publisher_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub created_at: Value,
    pub updated_at: Value,
    pub deleted_at: Value,
}

impl Model for Post {
    fn descriptor() -> &'static ModelDescriptor {
        &POST
    }

    fn from_row(row: &Row) -> Result<Self> {
        let raw = |column: &str| row.get(column).cloned().unwrap_or(Value::Null);
        Ok(Self {
            id: row.get_named("id")?,
            author_id: row.get_named("author_id")?,
            title: row.get_named("title")?,
            created_at: raw("created_at"),
            updated_at: raw("updated_at"),
            deleted_at: raw("deleted_at"),
        })
    }

    fn to_row(&self) -> Row {
        row! {
            "id" => self.id,
            "author_id" => self.author_id,
            "title" => self.title.clone(),
            "created_at" => self.created_at.clone(),
            "updated_at" => self.updated_at.clone(),
            "deleted_at" => self.deleted_at.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub team_id: i64,
    pub user_id: i64,
    pub role: String,
}

impl Model for Membership {
    fn descriptor() -> &'static ModelDescriptor {
        &MEMBERSHIP
    }

    fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            team_id: row.get_named("team_id")?,
            user_id: row.get_named("user_id")?,
            role: row.get_named("role")?,
        })
    }

    fn to_row(&self) -> Row {
        row! {
            "team_id" => self.team_id,
            "user_id" => self.user_id,
            "role" => self.role.clone(),
        }
    }
}

/// Two publishers, two authors (the second without posts) and three posts,
/// the last of them trashed.
pub fn library() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.seed(
        "publishers",
        [
            row! {"id" => 1, "name" => "Northwind"},
            row! {"id" => 2, "name" => "Tailspin"},
        ],
    );
    db.seed(
        "authors",
        [
            row! {"id" => 1, "name" => "Ann", "publisher_id" => 2},
            row! {"id" => 2, "name" => "Bo", "publisher_id" => Value::Null},
        ],
    );
    db.seed(
        "posts",
        [
            row! {"id" => 1, "author_id" => 1, "title" => "First", "deleted_at" => Value::Null},
            row! {"id" => 2, "author_id" => 1, "title" => "Second", "deleted_at" => Value::Null},
            row! {"id" => 3, "author_id" => 1, "title" => "Gone", "deleted_at" => "2024-01-01"},
        ],
    );
    db
}

pub fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .map(|row| row.get("id").and_then(Value::as_i64).unwrap_or(-1))
        .collect()
}
