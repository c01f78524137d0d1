use asupersync::Cx;
use asupersync::runtime::RuntimeBuilder;
use sqlweave::prelude::*;
use sqlweave::TrashedMode;
use sqlweave_memory::MemoryDatabase;

mod common;
use common::{POST, Post, expect_err, ids, unwrap_outcome};

fn trash_can() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.seed(
        "posts",
        [
            row! {"id" => 1, "author_id" => 1, "title" => "kept", "deleted_at" => Value::Null},
            row! {"id" => 2, "author_id" => 1, "title" => "binned", "deleted_at" => "2024-01-01"},
        ],
    );
    db
}

#[test]
fn visibility_follows_trashed_mode() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = trash_can();
        let base = QuerySpec::for_model(&POST);

        let live = unwrap_outcome(base.get(&cx, &db).await);
        assert_eq!(ids(&live), vec![1]);

        let trashed = base.clone().only_trashed().expect("soft deletes enabled");
        assert_eq!(ids(&unwrap_outcome(trashed.get(&cx, &db).await)), vec![2]);

        let all = base.clone().with_trashed().expect("soft deletes enabled");
        assert_eq!(ids(&unwrap_outcome(all.get(&cx, &db).await)), vec![1, 2]);

        assert_eq!(unwrap_outcome(base.count(&cx, &db).await), 1);
        assert_eq!(unwrap_outcome(all.count(&cx, &db).await), 2);
        assert!(unwrap_outcome(trashed.exists(&cx, &db).await));
    });
}

#[test]
fn executing_does_not_mutate_the_stored_tree() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = trash_can();
        let spec = QuerySpec::for_model(&POST).filter("author_id", 1);
        let before = spec.clone();

        let first = unwrap_outcome(spec.get(&cx, &db).await);
        let second = unwrap_outcome(spec.get(&cx, &db).await);
        assert_eq!(first, second);
        assert_eq!(spec, before);
        assert_eq!(spec.wheres.len(), 1);
        assert_eq!(spec.trashed, TrashedMode::Exclude);
    });
}

#[test]
fn or_filters_stay_inside_the_visibility_guard() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = trash_can();
        // Without nesting, `id = 1 OR id = 2 AND deleted_at IS NULL` would
        // leak the trashed row.
        let spec = QuerySpec::for_model(&POST)
            .filter("id", 1)
            .or_filter("id", 2);
        assert_eq!(ids(&unwrap_outcome(spec.get(&cx, &db).await)), vec![1]);
    });
}

#[test]
fn trashed_modes_need_a_soft_delete_column() {
    let err = QuerySpec::table("tags").with_trashed().unwrap_err();
    assert!(matches!(err, Error::SoftDeleteUnsupported { ref model } if model == "tags"));

    let err = QuerySpec::table("tags").only_trashed().unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn soft_delete_and_restore_round_trip() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = trash_can();
        let repo = Repository::new(&db);

        assert_eq!(unwrap_outcome(repo.delete::<Post>(&cx, 1).await), 1);
        assert!(unwrap_outcome(repo.find::<Post>(&cx, 1).await).is_none());
        let stored = db.rows("posts");
        assert!(stored.iter().all(|row| !row.get("deleted_at").is_some_and(Value::is_null)));

        assert_eq!(unwrap_outcome(repo.restore_all::<Post>(&cx, &[1.into(), 2.into()]).await), 2);
        assert_eq!(unwrap_outcome(repo.count::<Post>(&cx).await), 2);

        // Restoring a live row is a no-op.
        assert_eq!(unwrap_outcome(repo.restore::<Post>(&cx, 1).await), 0);

        assert_eq!(unwrap_outcome(repo.force_delete::<Post>(&cx, 2).await), 1);
        assert_eq!(db.rows("posts").len(), 1);
    });
}

#[test]
fn restore_without_soft_deletes_fails() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = MemoryDatabase::new();
        let err = expect_err(QuerySpec::table("tags").restore(&cx, &db).await);
        assert!(matches!(err, Error::SoftDeleteUnsupported { .. }));

        let err = expect_err(QuerySpec::table("tags").delete(&cx, &db, true).await);
        assert!(matches!(err, Error::SoftDeleteUnsupported { .. }));
    });
}
