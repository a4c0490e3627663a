use std::{sync::Arc, thread};

use dashstore::DashStore;
use tagcache::{CacheBackend, ScopeStack, TagCache};

#[test]
fn concurrent_bumps_on_one_tag_lose_nothing() {
    const THREADS: usize = 8;
    const BUMPS_PER_THREAD: usize = 250;

    let cache = Arc::new(TagCache::new(DashStore::new()));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                // each thread is its own unit of work with its own scope stack
                let mut scopes = ScopeStack::new();
                for _ in 0..BUMPS_PER_THREAD {
                    scopes.begin();
                    cache.invalidate_tags(&mut scopes, ["hot"]).unwrap();
                    cache.finish(&mut scopes).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let version = cache.versions().get_version("hot").unwrap();
    assert_eq!(version as usize, THREADS * BUMPS_PER_THREAD);
}

#[test]
fn concurrent_counter_increments_lose_nothing() {
    const THREADS: usize = 8;
    const INCREMENTS_PER_THREAD: usize = 500;

    let store = Arc::new(DashStore::new());

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..INCREMENTS_PER_THREAD {
                    store.increment_or_create("shared", 1).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        store.increment_or_create("shared", 0).unwrap() as usize,
        THREADS * INCREMENTS_PER_THREAD
    );
}

#[test]
fn concurrent_readers_and_an_invalidating_writer() {
    let cache = Arc::new(TagCache::new(DashStore::new()));
    cache
        .set("page:home", &"v1".to_string(), ["modelX"], None)
        .unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                // a reader either sees the fresh value or a miss, never junk
                for _ in 0..200 {
                    match cache.get::<String>("page:home") {
                        Some(value) => assert_eq!(value, "v1"),
                        None => {}
                    }
                }
            })
        })
        .collect();

    {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            let mut scopes = ScopeStack::new();
            scopes.begin();
            cache.invalidate_tags(&mut scopes, ["modelX"]).unwrap();
            cache.finish(&mut scopes).unwrap();
        })
        .join()
        .unwrap();
    }

    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(cache.get::<String>("page:home"), None);
}
