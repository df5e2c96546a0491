mod common;

use common::{memory_coordinator, seed, sorted_uids, Folder, Item};
use graphkeep_core::query::native::attr;
use graphkeep_core::{
    BatchDeleteRequest, BatchDeleteResult, BatchDeleteResultType, Entity, FetchRequest,
    NativePredicate, NativeSort, QuerySpec, StoreError,
};
use rusqlite::types::Value;
use std::sync::Arc;

#[tokio::test]
async fn batch_delete_scenario_leaves_remaining_records() {
    let coordinator = memory_coordinator();
    let inserted = coordinator
        .insert_many(|context| {
            ["a", "b", "c"]
                .into_iter()
                .map(|uid| context.insert(Item::new(uid, uid, 0)))
                .collect()
        })
        .await
        .unwrap();
    assert_eq!(inserted.len(), 3);

    let items = coordinator.entities::<Item>();
    let all = items.get_all(&QuerySpec::none()).unwrap();
    assert_eq!(sorted_uids(&all), vec!["a", "b", "c"]);

    let result = items
        .batch_delete(&QuerySpec::filter(Item::UID.eq("b")))
        .await
        .unwrap();
    assert_eq!(result.deleted_ids().map(<[_]>::len), Some(1));

    let remaining = items.get_all(&QuerySpec::none()).unwrap();
    assert_eq!(sorted_uids(&remaining), vec!["a", "c"]);
    assert_eq!(items.count(&QuerySpec::none()).unwrap(), 2);
}

#[tokio::test]
async fn inserted_record_is_found_by_unique_id() {
    let coordinator = memory_coordinator();
    let inserted = coordinator
        .insert(|context| context.insert(Item::new("a", "alpha", 3)))
        .await
        .unwrap();

    let found = coordinator
        .entities::<Item>()
        .get_first(&QuerySpec::filter(Item::UID.eq("a")))
        .unwrap()
        .unwrap();
    assert_eq!(found.object_id(), inserted.object_id());
    assert_eq!(found.value(), inserted.value());
}

#[tokio::test]
async fn get_first_without_match_is_none() {
    let coordinator = memory_coordinator();
    seed(&coordinator, vec![Item::new("a", "alpha", 1)]);

    let found = coordinator
        .entities::<Item>()
        .get_first(&QuerySpec::filter(Item::UID.eq("missing")))
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_inserts_are_all_persisted() {
    let coordinator = Arc::new(memory_coordinator());
    let inserts = 24;

    let handles: Vec<_> = (0..inserts)
        .map(|index| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .insert(move |context| {
                        context.insert(Item::new(&format!("item-{index}"), "bulk", index))
                    })
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let count = coordinator
        .fetch_entities_count(QuerySpec::<Item>::none())
        .await
        .unwrap();
    assert_eq!(count, inserts as usize);
    assert_eq!(
        coordinator.entities::<Item>().count(&QuerySpec::none()).unwrap(),
        inserts as usize
    );
}

#[tokio::test]
async fn failed_construction_saves_nothing() {
    let coordinator = memory_coordinator();
    let err = coordinator
        .insert(|context| {
            context.insert(Item::new("a", "alpha", 1))?;
            Err::<graphkeep_core::Record<Item>, _>(StoreError::InvalidData("rejected".to_string()))
        })
        .await
        .unwrap_err();

    assert!(matches!(err.store_error(), StoreError::InvalidData(_)));
    assert_eq!(coordinator.store().write_count(), 0);
    assert_eq!(
        coordinator.entities::<Item>().count(&QuerySpec::none()).unwrap(),
        0
    );
}

#[tokio::test]
async fn typed_and_native_specs_select_the_same_rows() {
    let coordinator = memory_coordinator();
    seed(
        &coordinator,
        vec![
            Item::new("a", "delta", 1),
            Item::new("b", "bravo", 2),
            Item::new("c", "charlie", 3),
            Item::new("d", "alpha", 4),
        ],
    );
    let items = coordinator.entities::<Item>();

    let typed = QuerySpec::filter(Item::RANK.ge(2).and(Item::NAME.ne("charlie")))
        .order_by(Item::NAME.descending());
    let native = QuerySpec::native(
        Some(NativePredicate::new(
            format!("{} >= ? AND {} <> ?", attr("rank"), attr("name")),
            [Value::Integer(2), Value::Text("charlie".to_string())],
        )),
        [NativeSort::attr("name", false)],
        None,
    );

    let from_typed: Vec<String> = items
        .get_all(&typed)
        .unwrap()
        .iter()
        .map(|record| record.uid.clone())
        .collect();
    let from_native: Vec<String> = items
        .get_all(&native)
        .unwrap()
        .iter()
        .map(|record| record.uid.clone())
        .collect();
    assert_eq!(from_typed, vec!["b", "d"]);
    assert_eq!(from_typed, from_native);
}

#[tokio::test]
async fn native_override_takes_precedence_over_typed_filter() {
    let coordinator = memory_coordinator();
    seed(
        &coordinator,
        vec![Item::new("a", "alpha", 1), Item::new("b", "beta", 2)],
    );

    let spec = QuerySpec::filter(Item::UID.eq("a")).with_native(graphkeep_core::query::NativeSpec {
        predicate: Some(NativePredicate::new(
            "unique_id = ?",
            [Value::Text("b".to_string())],
        )),
        sort: Vec::new(),
    });
    let found = coordinator.entities::<Item>().get_all(&spec).unwrap();
    assert_eq!(sorted_uids(&found), vec!["b"]);
}

#[tokio::test]
async fn batch_delete_with_ids_evicts_main_context_objects() {
    let coordinator = memory_coordinator();
    seed(
        &coordinator,
        vec![Item::new("a", "alpha", 1), Item::new("b", "beta", 2)],
    );
    let b_id = {
        let mut main = coordinator.main_context();
        main.get_all(&QuerySpec::<Item>::none()).unwrap();
        assert_eq!(main.registered_count(), 2);
        main.get_first(&QuerySpec::filter(Item::UID.eq("b")))
            .unwrap()
            .unwrap()
            .object_id()
    };

    let result = coordinator
        .entities::<Item>()
        .batch_delete(&QuerySpec::filter(Item::UID.eq("b")))
        .await
        .unwrap();
    assert_eq!(result, BatchDeleteResult::ObjectIds(vec![b_id]));

    let main = coordinator.main_context();
    assert!(!main.is_registered(b_id));
    assert_eq!(main.registered_count(), 1);
}

#[tokio::test]
async fn batch_delete_without_ids_saves_and_resets_main_context() {
    let coordinator = memory_coordinator();
    seed(
        &coordinator,
        vec![Item::new("a", "alpha", 1), Item::new("b", "beta", 2)],
    );
    {
        let mut main = coordinator.main_context();
        let mut a = main
            .get_first(&QuerySpec::filter(Item::UID.eq("a")))
            .unwrap()
            .unwrap();
        a.rank = 99;
        main.update(&a).unwrap();
        assert!(main.has_changes());
    }

    let request = BatchDeleteRequest::from(Item::fetch_request(&QuerySpec::filter(
        Item::UID.eq("b"),
    )))
    .with_result_type(BatchDeleteResultType::Count);
    let result = coordinator.batch_delete(request).await.unwrap();
    assert_eq!(result, BatchDeleteResult::Count(1));

    {
        let main = coordinator.main_context();
        assert_eq!(main.registered_count(), 0);
        assert!(!main.has_changes());
    }
    let remaining = coordinator
        .entities::<Item>()
        .get_all(&QuerySpec::none())
        .unwrap();
    assert_eq!(sorted_uids(&remaining), vec!["a"]);
    assert_eq!(remaining[0].rank, 99);
}

#[tokio::test]
async fn batch_delete_ignores_fetch_limit() {
    let coordinator = memory_coordinator();
    seed(
        &coordinator,
        vec![
            Item::new("a", "alpha", 1),
            Item::new("b", "beta", 2),
            Item::new("c", "gamma", 3),
        ],
    );

    let limited = QuerySpec::<Item>::none().limit(1);
    assert_eq!(coordinator.entities::<Item>().get_all(&limited).unwrap().len(), 1);
    assert_eq!(coordinator.entities::<Item>().count(&limited).unwrap(), 1);

    let result = coordinator
        .batch_delete(
            BatchDeleteRequest::from(Item::fetch_request(&limited))
                .with_result_type(BatchDeleteResultType::Count),
        )
        .await
        .unwrap();
    assert_eq!(result, BatchDeleteResult::Count(3));
    assert_eq!(
        coordinator.entities::<Item>().count(&QuerySpec::none()).unwrap(),
        0
    );
}

#[tokio::test]
async fn delete_matching_runs_deletion_hooks() {
    let coordinator = memory_coordinator();
    coordinator
        .insert(|context| context.insert(Folder::new("f1", "inbox")))
        .await
        .unwrap();
    seed(
        &coordinator,
        vec![
            Item::new("a", "alpha", 1).in_folder("f1"),
            Item::new("b", "beta", 2).in_folder("f1"),
            Item::new("c", "gamma", 3),
        ],
    );

    let deleted = coordinator
        .delete_matching(QuerySpec::filter(Folder::UID.eq("f1")))
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let remaining = coordinator
        .entities::<Item>()
        .get_all(&QuerySpec::none())
        .unwrap();
    assert_eq!(sorted_uids(&remaining), vec!["c"]);
}

#[tokio::test]
async fn batch_delete_skips_deletion_hooks() {
    let coordinator = memory_coordinator();
    coordinator
        .insert(|context| context.insert(Folder::new("f1", "inbox")))
        .await
        .unwrap();
    seed(&coordinator, vec![Item::new("a", "alpha", 1).in_folder("f1")]);

    coordinator
        .entities::<Folder>()
        .batch_delete(&QuerySpec::none())
        .await
        .unwrap();

    assert_eq!(coordinator.entities::<Folder>().count(&QuerySpec::none()).unwrap(), 0);
    assert_eq!(coordinator.entities::<Item>().count(&QuerySpec::none()).unwrap(), 1);
}

#[tokio::test]
async fn delete_resolves_records_again_and_skips_missing_ones() {
    let coordinator = memory_coordinator();
    let records = seed(
        &coordinator,
        vec![Item::new("a", "alpha", 1), Item::new("b", "beta", 2)],
    );

    coordinator.delete(&records[0]).await.unwrap();
    coordinator.delete_many(&records).await.unwrap();

    assert_eq!(coordinator.entities::<Item>().count(&QuerySpec::none()).unwrap(), 0);
    assert!(coordinator
        .entities::<Item>()
        .refresh(&records[1])
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn delete_all_removes_one_entity_only() {
    let coordinator = memory_coordinator();
    coordinator
        .insert(|context| context.insert(Folder::new("f1", "inbox")))
        .await
        .unwrap();
    seed(
        &coordinator,
        vec![Item::new("a", "alpha", 1), Item::new("b", "beta", 2)],
    );

    assert_eq!(coordinator.delete_all::<Item>().await.unwrap(), 2);
    assert_eq!(coordinator.entities::<Item>().count(&QuerySpec::none()).unwrap(), 0);
    assert_eq!(coordinator.entities::<Folder>().count(&QuerySpec::none()).unwrap(), 1);
}

#[tokio::test]
async fn destroy_all_data_clears_every_entity_and_main_context() {
    let coordinator = memory_coordinator();
    coordinator
        .insert(|context| context.insert(Folder::new("f1", "inbox")))
        .await
        .unwrap();
    seed(&coordinator, vec![Item::new("a", "alpha", 1)]);
    coordinator
        .entities::<Item>()
        .get_all(&QuerySpec::none())
        .unwrap();

    coordinator.destroy_all_data().await.unwrap();

    assert_eq!(coordinator.main_context().registered_count(), 0);
    assert_eq!(coordinator.entities::<Item>().count(&QuerySpec::none()).unwrap(), 0);
    assert_eq!(coordinator.entities::<Folder>().count(&QuerySpec::none()).unwrap(), 0);
}

#[tokio::test]
async fn fetch_materializes_on_requested_context() {
    let coordinator = memory_coordinator();
    seed(
        &coordinator,
        vec![Item::new("a", "alpha", 1), Item::new("b", "beta", 2)],
    );
    let request: FetchRequest<Item> = QuerySpec::none().order_by(Item::RANK.descending()).compile();
    assert!(request.returns_objects_as_faults());

    let fetched = coordinator.fetch(request.clone(), None).await.unwrap();
    let uids: Vec<&str> = fetched.iter().map(|record| record.uid.as_str()).collect();
    assert_eq!(uids, vec!["b", "a"]);

    let mut context = coordinator.background_context();
    let owned = coordinator
        .fetch(request.clone(), Some(&mut context))
        .await
        .unwrap();
    assert_eq!(owned.len(), 2);
    assert!(owned.iter().all(|record| record.context_id() == context.id()));

    assert_eq!(coordinator.fetch_count(&request).unwrap(), 2);
}

#[tokio::test]
async fn refresh_reads_latest_values_into_main_context() {
    let coordinator = memory_coordinator();
    let records = seed(&coordinator, vec![Item::new("a", "alpha", 1)]);

    let mut background = coordinator.background_context();
    let mut a = background.object::<Item>(records[0].object_id()).unwrap().unwrap();
    a.name = "renamed".to_string();
    a.update(&mut background).unwrap();

    let refreshed = coordinator
        .entities::<Item>()
        .refresh(&records[0])
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.name, "renamed");
    assert_eq!(refreshed.object_id(), records[0].object_id());
}

#[tokio::test]
async fn unread_presentation_queue_stays_bounded() {
    let coordinator = memory_coordinator();
    for index in 0..1000 {
        coordinator
            .insert(move |context| context.insert(Item::new(&format!("item-{index}"), "bulk", index)))
            .await
            .unwrap();
    }
    assert!(coordinator.store().queued_presentation_events() <= 1);

    let items = coordinator.entities::<Item>();
    assert_eq!(items.count(&QuerySpec::none()).unwrap(), 1000);
    assert_eq!(coordinator.store().queued_presentation_events(), 0);
}

#[tokio::test]
async fn main_context_follows_commit_order_of_concurrent_saves() {
    let coordinator = Arc::new(memory_coordinator());
    let records = seed(&coordinator, vec![Item::new("a", "alpha", 0)]);
    let object_id = records[0].object_id();
    let items = coordinator.entities::<Item>();
    assert_eq!(items.get_first(&QuerySpec::filter(Item::UID.eq("a"))).unwrap().unwrap().rank, 0);

    let writers: Vec<_> = (1..=8)
        .map(|writer| {
            let coordinator = Arc::clone(&coordinator);
            std::thread::spawn(move || {
                for step in 0..25 {
                    let mut context = coordinator.background_context();
                    let mut record = context.object::<Item>(object_id).unwrap().unwrap();
                    record.rank = writer * 100 + step;
                    record.update(&mut context).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let stored = coordinator
        .background_context()
        .object::<Item>(object_id)
        .unwrap()
        .unwrap();
    let shown = coordinator
        .main_context()
        .object::<Item>(object_id)
        .unwrap()
        .unwrap();
    assert_eq!(shown.rank, stored.rank);
}

#[tokio::test]
async fn zero_limit_returns_every_match() {
    let coordinator = memory_coordinator();
    seed(
        &coordinator,
        vec![Item::new("a", "alpha", 1), Item::new("b", "beta", 2)],
    );

    let items = coordinator.entities::<Item>();
    let all = items.get_all(&QuerySpec::none().limit(0)).unwrap();
    assert_eq!(sorted_uids(&all), vec!["a", "b"]);
    assert_eq!(items.count(&QuerySpec::none().limit(0)).unwrap(), 2);
}
