use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ramdb::{Decimal, RamDbClient, RamDbError, RayonThreadPool};

mod common;
use common::{connect, start_server, start_server_with, KEY_BITS, PASSWORD, USERNAME};

const HOUR: Duration = Duration::from_secs(3600);

fn dec(text: &str) -> Decimal {
    Decimal::from_str(text).unwrap()
}

#[test]
fn set_get_remove_round_trip() {
    let addr = start_server(2);
    let client = connect(addr);

    assert!(client.set("key1", "value1", HOUR).unwrap());
    assert_eq!(client.get("key1").unwrap(), Some("value1".to_owned()));

    assert!(!client.set("key1", "value2", HOUR).unwrap());
    assert_eq!(client.get("key1").unwrap(), Some("value2".to_owned()));

    client.remove("key1").unwrap();
    assert_eq!(client.get("key1").unwrap(), None);

    // removing twice is not an error
    client.remove("key1").unwrap();
    client.close().unwrap();
}

#[test]
fn values_are_opaque_text() {
    let addr = start_server(1);
    let client = connect(addr);

    let awkward = "multi word <value> with \"quotes\"\nand a second line";
    client.set("awkward", awkward, HOUR).unwrap();
    assert_eq!(client.get("awkward").unwrap(), Some(awkward.to_owned()));

    client.set("empty", "", HOUR).unwrap();
    assert_eq!(client.get("empty").unwrap(), Some(String::new()));

    // spans many encryption blocks
    let large: String = (0..20_000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    client.set("large", &large, HOUR).unwrap();
    assert_eq!(client.get("large").unwrap(), Some(large));
}

#[test]
fn values_expire_after_their_ttl() {
    let addr = start_server(1);
    let client = connect(addr);

    client.set("short", "value", Duration::from_millis(100)).unwrap();
    assert_eq!(client.get("short").unwrap(), Some("value".to_owned()));
    thread::sleep(Duration::from_millis(300));
    assert_eq!(client.get("short").unwrap(), None);
}

#[test]
fn increment_and_decrement() {
    let addr = start_server(1);
    let client = connect(addr);

    assert_eq!(client.increment("sum", dec("34524542.547")).unwrap(), dec("34524542.547"));
    assert_eq!(client.increment("sum", dec("937569475.6589")).unwrap(), dec("972094018.2059"));
    assert_eq!(client.decrement("sum", dec("23698.5487833")).unwrap(), dec("972070319.6571167"));
    assert_eq!(client.get("sum").unwrap(), Some("972070319.6571167".to_owned()));
}

#[test]
fn increment_of_text_is_a_server_error() {
    let addr = start_server(1);
    let client = connect(addr);

    client.set("name", "bob", HOUR).unwrap();
    match client.increment("name", Decimal::ONE) {
        Err(RamDbError::Server(reply)) => assert!(reply.starts_with("ERROR <CLIENT_INCREMENT_VALUE.SetValue>"), "{}", reply),
        other => panic!("expected a server error, got {:?}", other),
    }

    // the session is still usable
    assert_eq!(client.get("name").unwrap(), Some("bob".to_owned()));
}

#[test]
fn typed_values() {
    let addr = start_server(1);
    let client = connect(addr);

    client.set_as("int", &-42_i64, HOUR).unwrap();
    client.set_as("flag", &true, HOUR).unwrap();
    client.set_as("ratio", &0.25_f64, HOUR).unwrap();

    assert_eq!(client.get_as::<i64>("int").unwrap(), Some(-42));
    assert_eq!(client.get_as::<bool>("flag").unwrap(), Some(true));
    assert_eq!(client.get_as::<f64>("ratio").unwrap(), Some(0.25));
    assert_eq!(client.get_as::<i64>("missing").unwrap(), None);
    assert!(client.get_as::<i64>("flag").is_err());
}

#[test]
fn wrong_password_is_not_authorized() {
    let addr = start_server(1);

    let err = match RamDbClient::connect(addr, USERNAME, "wrong", KEY_BITS) {
        Err(err) => err,
        Ok(_) => panic!("connected with a wrong password"),
    };
    assert!(matches!(err, RamDbError::NotAuthorized));
    assert!(err.to_string().starts_with("NOT_AUTHORIZED"));

    // the worker is free again for a valid client
    let client = connect(addr);
    assert_eq!(client.get("anything").unwrap(), None);
}

#[test]
fn wrong_username_is_not_authorized() {
    let addr = start_server(1);

    let err = match RamDbClient::connect(addr, "intruder", PASSWORD, KEY_BITS) {
        Err(err) => err,
        Ok(_) => panic!("connected with a wrong username"),
    };
    assert!(matches!(err, RamDbError::NotAuthorized));
    assert!(err.to_string().starts_with("NOT_AUTHORIZED"));
}

#[test]
fn credentials_with_delimiters_are_rejected_before_connecting() {
    let addr = start_server(1);

    let result = RamDbClient::connect(addr, "ad<min", PASSWORD, KEY_BITS);
    assert!(matches!(result, Err(RamDbError::InvalidCredentials(_))));
}

#[test]
fn clients_see_each_others_writes() {
    let addr = start_server(2);
    let writer = connect(addr);
    let reader = connect(addr);

    writer.set("shared", "value", HOUR).unwrap();
    assert_eq!(reader.get("shared").unwrap(), Some("value".to_owned()));
}

#[test]
fn one_client_shared_between_threads() {
    const THREADS: usize = 4;
    const INCREMENTS: usize = 25;
    let addr = start_server(1);
    let client = Arc::new(connect(addr));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                for _ in 0..INCREMENTS {
                    client.increment("hits", Decimal::ONE).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(client.get("hits").unwrap(), Some((THREADS * INCREMENTS).to_string()));
}

#[test]
fn concurrent_clients_do_not_lose_updates() {
    const CLIENTS: usize = 4;
    const INCREMENTS: usize = 25;
    let addr = start_server(CLIENTS as u32);

    let handles: Vec<_> = (0..CLIENTS)
        .map(|_| {
            thread::spawn(move || {
                let client = connect(addr);
                for _ in 0..INCREMENTS {
                    client.increment("hits", Decimal::ONE).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let client = connect(addr);
    assert_eq!(client.get("hits").unwrap(), Some((CLIENTS * INCREMENTS).to_string()));
}

#[test]
fn sessions_beyond_worker_count_wait_for_a_free_worker() {
    let addr = start_server(1);
    let first = connect(addr);

    let admitted = Arc::new(AtomicBool::new(false));
    let waiting = {
        let admitted = Arc::clone(&admitted);
        thread::spawn(move || {
            let second = connect(addr);
            admitted.store(true, Ordering::SeqCst);
            second.get("key").unwrap()
        })
    };

    thread::sleep(Duration::from_millis(500));
    assert!(!admitted.load(Ordering::SeqCst));

    first.set("key", "value", HOUR).unwrap();
    first.close().unwrap();

    assert_eq!(waiting.join().unwrap(), Some("value".to_owned()));
    assert!(admitted.load(Ordering::SeqCst));
}

#[test]
fn works_on_a_rayon_pool() {
    let addr = start_server_with::<RayonThreadPool>(2);
    let client = connect(addr);

    assert!(client.set("key", "value", HOUR).unwrap());
    assert_eq!(client.get("key").unwrap(), Some("value".to_owned()));
}
