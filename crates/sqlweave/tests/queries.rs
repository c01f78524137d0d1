use asupersync::Cx;
use asupersync::runtime::RuntimeBuilder;
use sqlweave::prelude::*;
use sqlweave::{AggregateFn, JoinKey};
use sqlweave_memory::{MemoryConfig, MemoryDatabase};

mod common;
use common::{expect_err, ids, unwrap_outcome};

fn orders() -> MemoryDatabase {
    let db = MemoryDatabase::new();
    db.seed(
        "customers",
        [
            row! {"id" => 1, "name" => "Acme"},
            row! {"id" => 2, "name" => "Globex"},
            row! {"id" => 3, "name" => "Initech"},
        ],
    );
    db.seed(
        "orders",
        (1..=8).map(|id| {
            row! {
                "id" => id,
                "customer_id" => 1 + id % 2,
                "total" => id * 10,
                "placed_on" => format!("2024-0{}-1{}", 1 + id % 3, id),
            }
        }),
    );
    db
}

#[test]
fn malformed_clock_text_never_matches_time_filters() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = MemoryDatabase::new();
        db.seed(
            "events",
            [
                row! {"id" => 1, "at" => "2024-01-01 99999999"},
                row! {"id" => 2, "at" => "2024-01-01 00:00:00"},
            ],
        );
        let rows = unwrap_outcome(
            QuerySpec::table("events")
                .filter_time("at", Operator::Eq, "00:00:00")
                .get(&cx, &db)
                .await,
        );
        assert_eq!(ids(&rows), vec![2]);
    });
}

#[test]
fn seeded_shuffle_is_deterministic() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = orders();
        let spec = QuerySpec::table("orders").shuffle("seed-1");
        let first = ids(&unwrap_outcome(spec.get(&cx, &db).await));
        let second = ids(&unwrap_outcome(spec.get(&cx, &db).await));
        assert_eq!(first, second);

        let mut sorted = first.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (1..=8).collect::<Vec<i64>>());

        let reordered = spec.clone().reorder_by("id", Direction::Asc);
        assert_eq!(
            ids(&unwrap_outcome(reordered.get(&cx, &db).await)),
            sorted
        );
    });
}

#[test]
fn aggregates_ignore_paging() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = orders();
        let spec = QuerySpec::table("orders")
            .filter("customer_id", 1)
            .order_by_desc("total")
            .limit(1);

        assert_eq!(unwrap_outcome(spec.count(&cx, &db).await), 4);
        assert_eq!(unwrap_outcome(spec.sum(&cx, &db, "total").await).as_i64(), Some(200));
        assert_eq!(unwrap_outcome(spec.average(&cx, &db, "total").await).as_f64(), Some(50.0));
        assert_eq!(unwrap_outcome(spec.min(&cx, &db, "total").await).as_i64(), Some(20));
        assert_eq!(unwrap_outcome(spec.max(&cx, &db, "total").await).as_i64(), Some(80));

        // The paged read itself still honours the limit.
        assert_eq!(ids(&unwrap_outcome(spec.get(&cx, &db).await)), vec![8]);

        let empty = QuerySpec::table("orders").filter("total", 0);
        assert_eq!(unwrap_outcome(empty.count(&cx, &db).await), 0);
        assert!(unwrap_outcome(empty.sum(&cx, &db, "total").await).is_null());
    });
}

#[test]
fn grouped_counts_run_over_groups() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = orders();
        let per_customer = QuerySpec::table("orders")
            .select(["customer_id"])
            .select_sum("total", "spent")
            .group_by(["customer_id"])
            .having_op("spent", Operator::Gt, 180)
            .order_by_asc("customer_id");

        let rows = unwrap_outcome(per_customer.get(&cx, &db).await);
        let spent: Vec<_> = rows
            .iter()
            .map(|r| {
                (
                    r.get("customer_id").and_then(Value::as_i64),
                    r.get("spent").and_then(Value::as_i64),
                )
            })
            .collect();
        assert_eq!(spent, vec![(Some(1), Some(200))]);

        let groups = QuerySpec::table("orders").group_by(["customer_id"]);
        assert_eq!(unwrap_outcome(groups.count(&cx, &db).await), 2);
        let spec = groups.aggregate_spec(AggregateFn::Count, None);
        assert_eq!(spec.source.qualifier(), "aggregate_table");
    });
}

#[test]
fn pluck_keeps_first_position_and_last_value() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = orders();
        let spec = QuerySpec::table("orders").order_by_asc("id");

        let by_customer = unwrap_outcome(spec.pluck(&cx, &db, "customer_id", "id", false).await);
        let pairs: Vec<_> = by_customer
            .iter()
            .map(|(k, v)| (k.clone(), v.as_i64()))
            .collect();
        assert_eq!(
            pairs,
            vec![(JoinKey::Int(2), Some(7)), (JoinKey::Int(1), Some(8))]
        );

        let rows = unwrap_outcome(spec.pluck_rows(&cx, &db, "id", false).await);
        assert_eq!(rows.len(), 8);
        assert_eq!(
            rows.get(&JoinKey::Int(3)).and_then(|r| r.get("total")).and_then(Value::as_i64),
            Some(30)
        );
    });
}

#[test]
fn joins_and_unions() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = orders();
        let with_orders = QuerySpec::table("customers")
            .select(["customers.name"])
            .left_join("orders", "orders.customer_id", Operator::Eq, "customers.id")
            .filter_null("orders.id");
        let rows = unwrap_outcome(with_orders.get(&cx, &db).await);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("name"), Some(&Value::from("Initech")));

        let small = QuerySpec::table("orders").select(["id"]).filter_op("total", Operator::Le, 20);
        let large = QuerySpec::table("orders").select(["id"]).filter_op("total", Operator::Ge, 70);
        let both = small.clone().union(large).union_all(small).order_by_asc("id");
        assert_eq!(ids(&unwrap_outcome(both.get(&cx, &db).await)), vec![1, 1, 2, 2, 7, 8]);
    });
}

#[test]
fn sub_queries_as_sets_and_sources() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = orders();
        let big_spenders = QuerySpec::table("orders")
            .select(["customer_id"])
            .filter_op("total", Operator::Ge, 80);
        let customers = QuerySpec::table("customers")
            .filter_in("id", big_spenders)
            .expect("sub-query set");
        assert_eq!(ids(&unwrap_outcome(customers.get(&cx, &db).await)), vec![1]);

        let derived = QuerySpec::from_query(
            QuerySpec::table("orders").filter("customer_id", 2),
            "mine",
        )
        .filter_between("mine.total", [10, 30])
        .expect("two bounds");
        assert_eq!(ids(&unwrap_outcome(derived.get(&cx, &db).await)), vec![1, 3]);
    });
}

#[test]
fn date_parts_and_like() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = orders();
        let march = QuerySpec::table("orders")
            .filter_month("placed_on", Operator::Eq, 3)
            .filter_year("placed_on", Operator::Eq, 2024);
        assert_eq!(ids(&unwrap_outcome(march.get(&cx, &db).await)), vec![2, 5, 8]);

        let names = QuerySpec::table("customers")
            .filter_like("name", "%EX")
            .expect("text pattern");
        assert_eq!(ids(&unwrap_outcome(names.get(&cx, &db).await)), vec![2]);

        let strict = MemoryDatabase::with_config(MemoryConfig::new().case_insensitive_like(false));
        strict.seed("customers", db.rows("customers"));
        assert!(unwrap_outcome(names.get(&cx, &strict).await).is_empty());
    });
}

#[test]
fn malformed_conditions_fail_before_io() {
    let err = QuerySpec::table("orders")
        .filter_between("total", vec![1, 2, 3])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConditionShape(ref e) if e.condition == "between"));

    let err = QuerySpec::table("orders").filter_in("id", 5).unwrap_err();
    assert!(err.is_validation());

    let err = QuerySpec::table("orders").filter_like("name", 5).unwrap_err();
    assert!(matches!(err, Error::InvalidConditionShape(_)));
}

#[test]
fn raw_fragments_are_reported_by_the_driver() {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    let cx = Cx::for_testing();

    rt.block_on(async {
        let db = orders();
        let spec = QuerySpec::table("orders").filter_raw("total > ?", vec![Value::from(10)]);
        let err = expect_err(spec.get(&cx, &db).await);
        assert!(matches!(err, Error::Driver(_)));
    });
}
