// SPDX-License-Identifier: MIT OR Apache-2.0
//! Store → dispatcher wiring and the named-serializer contract.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use one_store::events::{DispatcherOptions, EventFilter, ObjectEventDispatcher};
use one_store::sync::NamedSerializer;
use one_store::versioned::StoreEventKind;
use one_store::{
    Hash, Obj, ObjectStore, Recipe, RecipeRegistry, RecipeRule, Storage, StorageInitOptions,
    ValueType,
};

fn registry() -> Arc<RecipeRegistry> {
    let mut reg = RecipeRegistry::new();
    reg.register(Recipe::new(
        "Message",
        vec![
            RecipeRule::new("channel", ValueType::string()).id(),
            RecipeRule::new("body", ValueType::string()),
        ],
    ))
    .unwrap();
    Arc::new(reg)
}

async fn open_store(dir: &tempfile::TempDir) -> ObjectStore {
    let storage = Storage::init(StorageInitOptions::new(dir.path(), Hash::digest(b"events")))
        .await
        .unwrap();
    ObjectStore::new(storage, registry())
}

fn message(channel: &str, body: &str) -> Obj {
    Obj::new("Message").with("channel", channel).with("body", body)
}

#[tokio::test]
async fn store_events_reach_registered_handlers() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let dispatcher = ObjectEventDispatcher::new(DispatcherOptions::default());
    dispatcher.connect(store.subscribe());

    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = Arc::clone(&seen);
        dispatcher.register(EventFilter::versioned("Message", None), move |event| {
            let seen = Arc::clone(&seen);
            async move {
                seen.lock().unwrap().push((event.kind, event.hash));
                Ok(())
            }
        });
    }

    let creation = store.store_versioned_object(&message("general", "hi"), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen, vec![(StoreEventKind::NewVersionedObject, creation.hash)]);
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn id_filter_narrows_to_one_identity() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    // Store once to learn the identity hash, then register for it only.
    let general = store.store_versioned_object(&message("general", "v1"), None).await.unwrap();

    let dispatcher = ObjectEventDispatcher::new(DispatcherOptions::default());
    dispatcher.connect(store.subscribe());
    let count = Arc::new(Mutex::new(0u32));
    {
        let count = Arc::clone(&count);
        dispatcher.register(
            EventFilter::versioned("Message", Some(general.id_hash)),
            move |_| {
                let count = Arc::clone(&count);
                async move {
                    *count.lock().unwrap() += 1;
                    Ok(())
                }
            },
        );
    }

    store.store_versioned_object(&message("general", "v2"), None).await.unwrap();
    store.store_versioned_object(&message("other", "v1"), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*count.lock().unwrap(), 1);
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn named_serializer_scenario() {
    // Two functions under one name: disjoint intervals, enqueue order,
    // and a failure does not stop the follower.
    let serializer = NamedSerializer::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let f1 = {
        let serializer = serializer.clone();
        let log = Arc::clone(&log);
        tokio::spawn(async move {
            serializer
                .run_serial("slot", async {
                    log.lock().unwrap().push("f1-start");
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    log.lock().unwrap().push("f1-end");
                    Err::<(), &str>("f1 failed")
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    let f2 = {
        let serializer = serializer.clone();
        let log = Arc::clone(&log);
        tokio::spawn(async move {
            serializer
                .run_serial("slot", async {
                    log.lock().unwrap().push("f2-start");
                    log.lock().unwrap().push("f2-end");
                    Ok::<(), &str>(())
                })
                .await
        })
    };

    assert!(f1.await.unwrap().is_err());
    assert!(f2.await.unwrap().is_ok());
    assert_eq!(
        *log.lock().unwrap(),
        vec!["f1-start", "f1-end", "f2-start", "f2-end"]
    );
    assert_eq!(serializer.chain_count(), 0);
}
