// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Multi-threaded behaviour of the blocking decorator.

use std::{
    sync::{
        Arc, Barrier,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
    thread,
    time::Duration,
};

use stowage::{BlockingCache, Cache, CacheId, LruCache, PerpetualCache};
use testing_aids::execute_or_abandon;

type Shared = Arc<BlockingCache<String, PerpetualCache<String, Option<String>>>>;

fn shared(id: &str) -> Shared {
    Arc::new(BlockingCache::new(PerpetualCache::new(CacheId::new(id).unwrap())))
}

#[test]
fn waiter_receives_result_of_holder() {
    let cache = shared("q42");

    let result = execute_or_abandon(move || {
        let key = "Q#42".to_string();
        assert_eq!(cache.get(&key), None);

        let (ready_tx, ready_rx) = mpsc::channel();
        let reader = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            thread::spawn(move || {
                ready_tx.send(()).unwrap();
                cache.get(&key)
            })
        };

        ready_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        cache.put(key, Some("RESULT".to_string()));

        reader.join().unwrap()
    });

    assert_eq!(result, Some(Some(Some("RESULT".to_string()))));
}

#[test]
fn waiter_becomes_populator_after_removal() {
    let cache = shared("q7");

    let result = execute_or_abandon(move || {
        let key = "Q#7".to_string();
        assert_eq!(cache.get(&key), None);

        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let reader = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            thread::spawn(move || {
                ready_tx.send(()).unwrap();
                let seen = cache.get(&key);
                done_tx.send(()).unwrap();
                // Still the holder here; release before leaving.
                cache.put(key, Some("B".to_string()));
                seen
            })
        };

        ready_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        assert!(done_rx.try_recv().is_err(), "reader must wait while the key is held");

        cache.remove(&key);
        let seen = reader.join().unwrap();
        (seen, cache.get(&key))
    });

    assert_eq!(result, Some((None, Some(Some("B".to_string())))));
}

#[test]
fn exactly_one_populator_among_many_callers() {
    const CALLERS: usize = 8;

    let cache = shared("single-flight");
    let populations = Arc::new(AtomicUsize::new(0));

    let results = execute_or_abandon({
        let populations = Arc::clone(&populations);
        move || {
            let barrier = Barrier::new(CALLERS);
            thread::scope(|scope| {
                let handles: Vec<_> = (0..CALLERS)
                    .map(|_| {
                        scope.spawn(|| {
                            barrier.wait();
                            cache
                                .get_or_populate(&"k".to_string(), || {
                                    populations.fetch_add(1, Ordering::SeqCst);
                                    thread::sleep(Duration::from_millis(20));
                                    Ok::<_, ()>(Some("v".to_string()))
                                })
                                .unwrap()
                        })
                    })
                    .collect();

                handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
            })
        }
    })
    .unwrap();

    assert_eq!(populations.load(Ordering::SeqCst), 1);
    assert!(results.iter().all(|r| r.as_deref() == Some("v")));
}

#[test]
fn absent_value_sentinel_counts_as_hit() {
    let cache = shared("sentinel");
    let key = "empty-result".to_string();

    assert_eq!(cache.get(&key), None);
    cache.put(key.clone(), None);

    assert_eq!(cache.get(&key), Some(None));
    assert_eq!(cache.locked_keys(), 0);
}

#[test]
fn unrelated_keys_do_not_block_each_other() {
    let cache = shared("independent");

    let result = execute_or_abandon(move || {
        assert_eq!(cache.get(&"a".to_string()), None);

        let other = Arc::clone(&cache);
        let seen = thread::spawn(move || {
            let seen = other.get(&"b".to_string());
            other.put("b".to_string(), Some("b".to_string()));
            seen
        })
        .join()
        .unwrap();

        cache.remove(&"a".to_string());
        seen
    });

    assert_eq!(result, Some(None));
}

#[test]
fn removal_reaches_innermost_store() {
    let inner = PerpetualCache::new(CacheId::new("layers").unwrap());
    let cache = BlockingCache::new(LruCache::new(inner));

    cache.put(1_u32, 1_u32);
    cache.remove(&1);

    assert_eq!(cache.inner().inner().size(), 0);
    assert_eq!(cache.id().as_str(), "layers");
}

#[test]
fn clear_empties_every_layer() {
    let cache = BlockingCache::new(LruCache::new(PerpetualCache::new(CacheId::new("clear").unwrap())));
    for i in 0..10_u32 {
        cache.put(i, i);
    }

    cache.clear();
    assert_eq!(cache.size(), 0);
    assert!(cache.is_empty());
}
