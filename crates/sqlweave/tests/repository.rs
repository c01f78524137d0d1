use std::sync::{Arc, Mutex};

use asupersync::Cx;
use asupersync::runtime::RuntimeBuilder;
use sqlweave::prelude::*;
use sqlweave::HookFn;
use sqlweave_memory::MemoryDatabase;

mod common;
use common::{
    AUTHOR, Author, MEMBERSHIP, Membership, POST, Post, expect_err, library, unwrap_outcome,
};

type Log = Arc<Mutex<Vec<(ModelHook, &'static str, usize)>>>;

fn recording(registry: &mut HookRegistry, model: &ModelDescriptor, hooks: &[ModelHook]) -> Log {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    for hook in hooks {
        let log = Arc::clone(&log);
        let callback: HookFn = Arc::new(move |event: &HookEvent<'_>| -> Result<()> {
            log.lock()
                .unwrap()
                .push((event.hook, event.method, event.rows.len() + event.ids.len()));
            Ok(())
        });
        registry.hook(model, *hook, callback);
    }
    log
}

#[test]
fn create_fires_hooks_and_reads_the_row_back() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = library();
        let mut hooks = HookRegistry::new();
        let log = recording(
            &mut hooks,
            &POST,
            &[ModelHook::BeforeCreate, ModelHook::AfterCreate],
        );
        let repo = Repository::new(&db).with_hooks(&hooks);

        let post: Post = unwrap_outcome(
            repo.create(&cx, row! {"author_id" => 2, "title" => "Hello"})
                .await,
        );
        // Ids continue after the highest stored one, trashed rows included.
        assert_eq!(post.id, 4);
        assert_eq!(post.title, "Hello");
        assert!(matches!(post.created_at, Value::Timestamp(_)));
        assert_eq!(post.created_at, post.updated_at);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (ModelHook::BeforeCreate, "create", 1),
                (ModelHook::AfterCreate, "create", 1),
            ]
        );
    });
}

#[test]
fn before_hook_error_aborts_the_write() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = library();
        let mut hooks = HookRegistry::new();
        hooks.hook(
            &POST,
            ModelHook::BeforeDelete,
            Arc::new(|_: &HookEvent<'_>| -> Result<()> {
                Err(Error::Hook("posts are forever".to_string()))
            }),
        );
        let repo = Repository::new(&db).with_hooks(&hooks);

        let err = expect_err(repo.delete::<Post>(&cx, 1).await);
        assert!(matches!(err, Error::Hook(_)));
        assert_eq!(unwrap_outcome(repo.count::<Post>(&cx).await), 2);

        // Other models are unaffected.
        assert_eq!(unwrap_outcome(repo.delete::<Author>(&cx, 2).await), 1);
    });
}

#[test]
fn after_hook_error_is_returned_once_the_write_is_applied() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = library();
        let mut hooks = HookRegistry::new();
        hooks.hook(
            &POST,
            ModelHook::AfterDelete,
            Arc::new(|_: &HookEvent<'_>| -> Result<()> {
                Err(Error::Hook("audit offline".to_string()))
            }),
        );
        let repo = Repository::new(&db).with_hooks(&hooks);

        let err = expect_err(repo.delete::<Post>(&cx, 1).await);
        assert!(matches!(err, Error::Hook(ref msg) if msg == "audit offline"));
        assert_eq!(unwrap_outcome(repo.count::<Post>(&cx).await), 1);
    });
}

#[test]
fn update_applies_changes_to_the_instance() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = library();
        let mut hooks = HookRegistry::new();
        let log = recording(
            &mut hooks,
            &AUTHOR,
            &[ModelHook::BeforeUpdate, ModelHook::AfterUpdate],
        );
        let repo = Repository::new(&db).with_hooks(&hooks);

        let mut ann: Author = unwrap_outcome(repo.find(&cx, 1).await).expect("author 1");
        let affected = unwrap_outcome(
            repo.update(&cx, &mut ann, row! {"name" => "Annie"}, false)
                .await,
        );
        assert_eq!(affected, 1);
        assert_eq!(ann.name, "Annie");

        ann.name = "Ann B.".to_string();
        assert_eq!(unwrap_outcome(repo.save(&cx, &mut ann, false).await), 1);
        let stored: Author = unwrap_outcome(repo.find(&cx, 1).await).expect("author 1");
        assert_eq!(stored.name, "Ann B.");

        let methods: Vec<_> = log.lock().unwrap().iter().map(|(h, m, _)| (*h, *m)).collect();
        assert_eq!(
            methods,
            vec![
                (ModelHook::BeforeUpdate, "update"),
                (ModelHook::AfterUpdate, "update"),
                (ModelHook::BeforeUpdate, "save"),
                (ModelHook::BeforeUpdate, "update"),
                (ModelHook::AfterUpdate, "update"),
                (ModelHook::AfterUpdate, "save"),
            ]
        );
    });
}

#[test]
fn silent_updates_leave_the_timestamp_alone() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = library();
        let repo = Repository::new(&db);

        let mut post: Post = unwrap_outcome(repo.find(&cx, 1).await).expect("post 1");
        assert!(post.updated_at.is_null());

        unwrap_outcome(repo.update(&cx, &mut post, row! {"title" => "Quiet"}, true).await);
        let quiet: Post = unwrap_outcome(repo.find(&cx, 1).await).expect("post 1");
        assert_eq!(quiet.title, "Quiet");
        assert!(quiet.updated_at.is_null());

        unwrap_outcome(repo.update(&cx, &mut post, row! {"title" => "Loud"}, false).await);
        let loud: Post = unwrap_outcome(repo.find(&cx, 1).await).expect("post 1");
        assert!(matches!(loud.updated_at, Value::Timestamp(_)));
    });
}

#[test]
fn fresh_and_refresh_reload_state() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = library();
        let repo = Repository::new(&db);

        let mut bo: Author = unwrap_outcome(repo.find(&cx, 2).await).expect("author 2");
        unwrap_outcome(
            QuerySpec::for_model(&AUTHOR)
                .filter("id", 2)
                .update(&cx, &db, row! {"name" => "Bob"}, false)
                .await,
        );
        let fresh = unwrap_outcome(repo.fresh(&cx, &bo).await).expect("still there");
        assert_eq!(fresh.name, "Bob");
        assert_eq!(bo.name, "Bo");

        unwrap_outcome(repo.refresh(&cx, &mut bo).await);
        assert_eq!(bo.name, "Bob");

        unwrap_outcome(repo.force_delete_instance(&cx, &bo).await);
        let err = expect_err(repo.refresh(&cx, &mut bo).await);
        assert!(matches!(err, Error::NotFound { ref model } if model == "Author"));
    });
}

#[test]
fn find_all_and_delete_all() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = library();
        let repo = Repository::new(&db);

        let posts: Vec<Post> =
            unwrap_outcome(repo.find_all(&cx, &[1.into(), 3.into(), 9.into()]).await);
        assert_eq!(posts.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1]);

        assert_eq!(unwrap_outcome(repo.delete_all::<Post>(&cx, &[1.into(), 2.into()]).await), 2);
        assert!(unwrap_outcome(repo.all::<Post>(&cx).await).is_empty());
        // Soft deleted rows are still stored.
        assert_eq!(db.rows("posts").len(), 3);

        assert_eq!(
            unwrap_outcome(
                repo.force_delete_all::<Post>(&cx, &[1.into(), 2.into(), 3.into()])
                    .await
            ),
            3
        );
        assert!(db.rows("posts").is_empty());
    });
}

#[test]
fn instance_deletes_respect_soft_delete_policy() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = library();
        let repo = Repository::new(&db);

        let post: Post = unwrap_outcome(repo.find(&cx, 2).await).expect("post 2");
        assert_eq!(unwrap_outcome(repo.delete_instance(&cx, &post).await), 1);
        assert_eq!(db.rows("posts").len(), 3);

        let author: Author = unwrap_outcome(repo.find(&cx, 2).await).expect("author 2");
        assert_eq!(unwrap_outcome(repo.delete_instance(&cx, &author).await), 1);
        assert_eq!(db.rows("authors").len(), 1);
    });
}

#[test]
fn composite_keys_find_and_create() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = MemoryDatabase::new();
        db.seed(
            "memberships",
            [
                row! {"team_id" => 1, "user_id" => 1, "role" => "owner"},
                row! {"team_id" => 1, "user_id" => 2, "role" => "member"},
                row! {"team_id" => 2, "user_id" => 1, "role" => "member"},
            ],
        );
        let repo = Repository::new(&db);

        let found: Option<Membership> =
            unwrap_outcome(repo.find(&cx, Value::from(vec![2, 1])).await);
        assert_eq!(found.map(|m| m.role), Some("member".to_string()));

        let both: Vec<Membership> = unwrap_outcome(
            repo.find_all(&cx, &[Value::from(vec![1, 1]), Value::from(vec![1, 2])])
                .await,
        );
        assert_eq!(both.len(), 2);

        let created: Membership = unwrap_outcome(
            repo.create(&cx, row! {"team_id" => 2, "user_id" => 2, "role" => "admin"})
                .await,
        );
        assert_eq!((created.team_id, created.user_id), (2, 2));

        let err = expect_err(repo.find::<Membership>(&cx, 1).await);
        assert!(matches!(err, Error::InvalidConditionShape(_)));
        assert_eq!(MEMBERSHIP.primary_key.len(), 2);
    });
}

#[test]
fn insert_and_bulk_update_through_the_repository() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = library();
        let mut hooks = HookRegistry::new();
        let log = recording(
            &mut hooks,
            &AUTHOR,
            &[ModelHook::AfterCreate, ModelHook::AfterUpdate],
        );
        let repo = Repository::new(&db).with_hooks(&hooks);

        let inserted = unwrap_outcome(
            repo.insert::<Author>(
                &cx,
                vec![
                    row! {"name" => "Cy"},
                    row! {"id" => 1, "name" => "duplicate"},
                ],
                true,
            )
            .await,
        );
        assert_eq!(inserted.affected, 1);
        assert_eq!(inserted.last_insert_id.as_i64(), Some(3));

        let updated = unwrap_outcome(
            repo.bulk_update::<Author>(
                &cx,
                vec![
                    row! {"id" => 2, "name" => "Bea"},
                    row! {"id" => 3, "name" => "Cyd"},
                ],
                &[],
                true,
            )
            .await,
        );
        assert_eq!(updated, 2);

        let names = unwrap_outcome(repo.pluck::<Author>(&cx, "id", "name").await);
        let names: Vec<_> = names.values().filter_map(Value::as_str).collect();
        assert_eq!(names, vec!["Ann", "Bea", "Cyd"]);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (ModelHook::AfterCreate, "insert", 2),
                (ModelHook::AfterUpdate, "bulk_update", 2),
            ]
        );
    });
}
