use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ramdb::{Accumulate, Decimal, MemStore, RamDbError, RamEngine};

const HOUR: Duration = Duration::from_secs(3600);

fn dec(text: &str) -> Decimal {
    Decimal::from_str(text).unwrap()
}

// Should get previously stored value
#[test]
fn get_stored_value() {
    let store = MemStore::new();

    assert!(store.set("key1".to_owned(), "value1".to_owned(), HOUR));
    assert!(store.set("key2".to_owned(), "value2".to_owned(), HOUR));

    assert_eq!(store.get("key1"), Some("value1".to_owned()));
    assert_eq!(store.get("key2"), Some("value2".to_owned()));
}

// Should overwrite existent value and report it as an update
#[test]
fn overwrite_value() {
    let store = MemStore::new();

    assert!(store.set("key1".to_owned(), "value1".to_owned(), HOUR));
    assert!(!store.set("key1".to_owned(), "value2".to_owned(), HOUR));
    assert_eq!(store.get("key1"), Some("value2".to_owned()));
    assert_eq!(store.len(), 1);
}

// Should get `None` when getting a non-existent key
#[test]
fn get_non_existent_value() {
    let store = MemStore::new();

    store.set("key1".to_owned(), "value1".to_owned(), HOUR);
    assert_eq!(store.get("key2"), None);
}

#[test]
fn remove_key() {
    let store = MemStore::new();

    store.set("key1".to_owned(), "value1".to_owned(), HOUR);
    store.remove("key1");
    assert_eq!(store.get("key1"), None);
    assert!(store.is_empty());

    // removing an absent key is fine
    store.remove("key1");
}

#[test]
fn expired_value_is_not_returned() {
    let store = MemStore::new();

    store.set("short".to_owned(), "gone".to_owned(), Duration::from_millis(50));
    store.set("long".to_owned(), "kept".to_owned(), HOUR);
    thread::sleep(Duration::from_millis(150));

    assert_eq!(store.get("short"), None);
    assert_eq!(store.get("long"), Some("kept".to_owned()));
    // still physically present until purged
    assert_eq!(store.len(), 2);
}

#[test]
fn expired_entry_still_counts_as_existing_on_set() {
    let store = MemStore::new();

    store.set("key".to_owned(), "old".to_owned(), Duration::from_millis(20));
    thread::sleep(Duration::from_millis(60));

    assert!(!store.set("key".to_owned(), "new".to_owned(), HOUR));
    assert_eq!(store.get("key"), Some("new".to_owned()));
}

#[test]
fn set_if_vacant_only_takes_free_keys() {
    let store = MemStore::new();

    assert!(store.set_if_vacant("fresh".to_owned(), "first".to_owned(), HOUR));
    assert!(!store.set_if_vacant("fresh".to_owned(), "second".to_owned(), HOUR));
    assert_eq!(store.get("fresh"), Some("first".to_owned()));

    store.set("dead".to_owned(), "old".to_owned(), Duration::from_millis(20));
    thread::sleep(Duration::from_millis(60));
    assert!(store.set_if_vacant("dead".to_owned(), "new".to_owned(), HOUR));
    assert_eq!(store.get("dead"), Some("new".to_owned()));
}

#[test]
fn failed_set_if_vacant_keeps_the_live_deadline() {
    let store = MemStore::new();

    assert!(store.set_if_vacant("held".to_owned(), "L".to_owned(), Duration::from_millis(150)));
    // repeated attempts with a long ttl must not push the deadline back
    for _ in 0..10 {
        assert!(!store.set_if_vacant("held".to_owned(), "L".to_owned(), HOUR));
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(150));

    assert_eq!(store.get("held"), None);
    assert!(store.set_if_vacant("held".to_owned(), "L".to_owned(), HOUR));
}

#[test]
fn purge_expired_reclaims_memory() {
    let store = MemStore::new();

    for i in 0..3 {
        store.set(format!("short{}", i), "v".to_owned(), Duration::from_millis(20));
    }
    for i in 0..2 {
        store.set(format!("long{}", i), "v".to_owned(), HOUR);
    }
    thread::sleep(Duration::from_millis(60));

    assert_eq!(store.purge_expired(), 3);
    assert_eq!(store.len(), 2);
    assert_eq!(store.purge_expired(), 0);
}

#[test]
fn accumulate_is_exact() {
    let store = MemStore::new();

    let created = store.accumulate("sum", dec("34524542.547"), Accumulate::Increment).unwrap();
    assert_eq!(created, dec("34524542.547"));

    let added = store.accumulate("sum", dec("937569475.6589"), Accumulate::Increment).unwrap();
    assert_eq!(added, dec("972094018.2059"));

    let subtracted = store.accumulate("sum", dec("23698.5487833"), Accumulate::Decrement).unwrap();
    assert_eq!(subtracted, dec("972070319.6571167"));
    assert_eq!(store.get("sum"), Some("972070319.6571167".to_owned()));
}

#[test]
fn decrement_of_absent_key_starts_at_delta() {
    let store = MemStore::new();

    let value = store.accumulate("counter", dec("5"), Accumulate::Decrement).unwrap();
    assert_eq!(value, dec("5"));
    assert_eq!(store.accumulate("counter", dec("2"), Accumulate::Decrement).unwrap(), dec("3"));
}

#[test]
fn accumulate_keeps_existing_deadline() {
    let store = MemStore::new();

    store.set("counter".to_owned(), "5".to_owned(), Duration::from_millis(100));
    assert_eq!(store.accumulate("counter", dec("1"), Accumulate::Increment).unwrap(), dec("6"));
    thread::sleep(Duration::from_millis(200));
    assert_eq!(store.get("counter"), None);
}

#[test]
fn accumulate_rejects_non_numbers() {
    let store = MemStore::new();

    store.set("name".to_owned(), "bob".to_owned(), HOUR);
    match store.accumulate("name", dec("1"), Accumulate::Increment) {
        Err(RamDbError::NotANumber { key, value }) => {
            assert_eq!(key, "name");
            assert_eq!(value, "bob");
        }
        other => panic!("expected NotANumber, got {:?}", other),
    }
    assert_eq!(store.get("name"), Some("bob".to_owned()));
}

#[test]
fn accumulate_reports_overflow() {
    let store = MemStore::new();

    store.set("big".to_owned(), Decimal::MAX.to_string(), HOUR);
    assert!(matches!(
        store.accumulate("big", dec("1"), Accumulate::Increment),
        Err(RamDbError::Overflow { .. })
    ));
    assert_eq!(store.get("big"), Some(Decimal::MAX.to_string()));
}

#[test]
fn concurrent_increments_are_not_lost() {
    const THREADS: usize = 8;
    const INCREMENTS: usize = 1000;
    let store = Arc::new(MemStore::new());

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for _ in 0..INCREMENTS {
                    store.accumulate("hits", Decimal::ONE, Accumulate::Increment).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(store.get("hits"), Some((THREADS * INCREMENTS).to_string()));
}

#[test]
fn clones_share_entries() {
    let store = MemStore::new();
    let other = store.clone();

    store.set("key".to_owned(), "value".to_owned(), HOUR);
    assert_eq!(other.get("key"), Some("value".to_owned()));
}
