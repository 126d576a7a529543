use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dps_bridge::bridge::duration_from_secs;
use dps_bridge::encoding::{encode_done, encode_flag, encode_number, encode_reply, PAYLOAD_CEILING};
use dps_bridge::error::code;
use dps_bridge::text::{base64_decode, base64_encode};
use dps_bridge::{ArgList, Bridge, BridgeError, Command, CommandScope, HttpCommand, HttpVerb};

fn collect(bridge: &Bridge, store: u64) -> (Vec<(Vec<u8>, Vec<u8>)>, String) {
    let it = bridge.begin_iteration(store).unwrap();
    let mut entries = Vec::new();
    let exhausted = loop {
        match bridge.get_next(store, it) {
            Ok(Some((key, value))) => entries.push((key.into_vec(), value.into_vec())),
            other => break encode_flag(&other.map(|e| e.is_some())),
        }
    };
    bridge.end_iteration(store, it).unwrap();
    (entries, exhausted)
}

#[test]
fn test_create_or_get_store_is_idempotent() {
    let bridge = Bridge::in_memory();
    let first = bridge.create_or_get_store("orders", "rstring", "int64").unwrap();
    for _ in 0..3 {
        assert_eq!(bridge.create_or_get_store("orders", "rstring", "int64").unwrap(), first);
    }
    assert_eq!(bridge.find_store("orders").unwrap(), first);
    assert_eq!(
        encode_number(&bridge.create_store("orders", "rstring", "int64")),
        "0,109"
    );
}

#[test]
fn test_find_missing_store() {
    let bridge = Bridge::in_memory();
    let missing = bridge.find_store("ghost");
    assert_eq!(missing, Err(BridgeError::StoreNotFound("ghost".into())));
    assert_eq!(encode_number(&missing), "0,110");
    assert_eq!(bridge.last_store_error().code, code::STORE_DOES_NOT_EXIST);
}

#[test]
fn test_put_then_get_is_byte_exact() {
    let bridge = Bridge::in_memory();
    let store = bridge.create_store("blobs", "blob", "blob").unwrap();
    let cases: Vec<(&[u8], &[u8])> = vec![
        (&b"plain"[..], &b"value"[..]),
        (&b"with,comma"[..], &b"a,b,c"[..]),
        (&[0, 0, 1][..], &[0xff, 0, 0xfe, b'\n'][..]),
        (&b"empty"[..], &b""[..]),
    ];
    for (key, value) in &cases {
        bridge.put(store, key, value).unwrap();
        let got = bridge.get(store, key).unwrap().unwrap();
        assert_eq!(got.as_slice(), *value);
        got.release();

        bridge.put_safe(store, key, value).unwrap();
        assert_eq!(bridge.get_safe(store, key).unwrap().unwrap().into_vec(), value.to_vec());
    }
}

#[test]
fn test_absent_key_is_not_an_error() {
    let bridge = Bridge::in_memory();
    let store = bridge.create_store("s", "k", "v").unwrap();
    assert_eq!(bridge.get(store, b"never").unwrap(), None);

    bridge.put(store, b"gone", b"1").unwrap();
    assert!(bridge.remove(store, b"gone").unwrap());
    assert_eq!(bridge.get(store, b"gone").unwrap(), None);
    assert_eq!(encode_flag(&bridge.has(store, b"gone")), "false,0");
    assert_eq!(encode_flag(&bridge.remove(store, b"gone")), "false,0");
    assert_eq!(bridge.last_store_error().code, code::NO_ERROR);
}

#[test]
fn test_backend_fault_differs_from_not_found() {
    let bridge = Bridge::in_memory();
    let err = bridge.get(77, b"k").unwrap_err();
    assert_eq!(err.code(), code::INVALID_STORE_ID_ERROR);
    assert!(bridge.last_store_error().message.contains("77"));
}

#[test]
fn test_iteration_yields_every_entry_once() {
    let bridge = Bridge::in_memory();
    for n in [0usize, 1, 5] {
        let store = bridge
            .create_store(&format!("iter-{n}"), "rstring", "rstring")
            .unwrap();
        for i in 0..n {
            bridge
                .put(store, format!("k{i}").as_bytes(), format!("v{i}").as_bytes())
                .unwrap();
        }
        let (entries, exhausted) = collect(&bridge, store);
        assert_eq!(entries.len(), n);
        assert_eq!(exhausted, "false,0");
        for (key, value) in entries {
            assert_eq!(key[1..], value[1..]);
        }
    }
    assert_eq!(bridge.open_iterations(), 0);
}

#[test]
fn test_end_iteration_twice_is_benign() {
    let bridge = Bridge::in_memory();
    let store = bridge.create_store("s", "k", "v").unwrap();
    bridge.put(store, b"a", b"1").unwrap();

    let it = bridge.begin_iteration(store).unwrap();
    assert!(bridge.get_next(store, it).unwrap().is_some());
    assert_eq!(encode_done(&bridge.end_iteration(store, it)), "true,0");
    assert_eq!(encode_done(&bridge.end_iteration(store, it)), "false,131");
}

#[test]
fn test_size_tracks_puts_and_removes() {
    let bridge = Bridge::in_memory();
    let store = bridge.create_store("counted", "int32", "int32").unwrap();
    for i in 0..10u8 {
        bridge.put(store, &[i], &[i]).unwrap();
    }
    bridge.put(store, &[3], &[33]).unwrap();
    for i in 0..4u8 {
        assert!(bridge.remove(store, &[i]).unwrap());
    }
    assert_eq!(bridge.size(store).unwrap(), 6);
    assert_eq!(encode_number(&bridge.size(store)), "6,0");

    bridge.clear(store).unwrap();
    assert_eq!(bridge.size(store).unwrap(), 0);
}

#[test]
fn test_removed_store_handle_is_dead() {
    let bridge = Bridge::in_memory();
    let store = bridge.create_store("temp", "k", "v").unwrap();
    assert!(bridge.remove_store(store).unwrap());
    assert_eq!(encode_done(&bridge.put(store, b"k", b"v")), "false,143");
    assert_eq!(encode_flag(&bridge.remove_store(store)), "false,143");

    let again = bridge.create_store("temp", "k", "v").unwrap();
    assert_ne!(again, store);
}

#[test]
fn test_ttl_facade_keeps_its_own_slot() {
    let bridge = Bridge::in_memory();
    bridge.put_ttl(b"session", b"abc", 60).unwrap();
    assert_eq!(bridge.get_ttl(b"session").unwrap().unwrap().into_vec(), b"abc");
    assert!(bridge.has_ttl(b"session").unwrap());
    assert!(bridge.remove_ttl(b"session").unwrap());
    assert_eq!(bridge.get_ttl(b"session").unwrap(), None);

    let _ = bridge.find_store("nope");
    assert_eq!(bridge.last_ttl_error().code, code::NO_ERROR);
    assert_eq!(bridge.last_store_error().code, code::STORE_DOES_NOT_EXIST);
}

#[test]
fn test_base64_round_trip() {
    for input in ["", "a", "comma,separated", "äöü ß", "\u{1}\u{7f}"] {
        assert_eq!(base64_decode(&base64_encode(input.as_bytes())).unwrap(), input.as_bytes());
    }
}

#[test]
fn test_lock_wait_exhausted_then_acquired() {
    let bridge = Arc::new(Bridge::in_memory());
    let lock = bridge.create_or_get_lock("shared").unwrap();
    assert_eq!(bridge.create_or_get_lock("shared").unwrap(), lock);

    bridge
        .acquire_lock_within(lock, Duration::from_secs(5), Duration::from_secs(1))
        .unwrap();
    assert_eq!(bridge.get_owning_pid("shared").unwrap(), std::process::id());

    let contender = Arc::clone(&bridge);
    let started = Instant::now();
    let blocked = thread::spawn(move || {
        let lock = contender.create_or_get_lock("shared").unwrap();
        contender.acquire_lock_within(lock, Duration::from_secs(5), Duration::from_millis(100))
    })
    .join()
    .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(encode_done(&blocked), "false,513");

    bridge.release_lock(lock).unwrap();
    let contender = Arc::clone(&bridge);
    let acquired = thread::spawn(move || {
        contender.acquire_lock_within(lock, Duration::from_secs(5), Duration::from_millis(100))
    })
    .join()
    .unwrap();
    assert_eq!(encode_done(&acquired), "true,0");
    bridge.release_lock(lock).unwrap();
}

#[test]
fn test_empty_lease_does_not_take_the_lock() {
    let bridge = Bridge::in_memory();
    let lock = bridge.create_or_get_lock("no-lease").unwrap();
    for lease in [Duration::ZERO, duration_from_secs(-1.0), duration_from_secs(f64::NAN)] {
        let refused = bridge.acquire_lock_within(lock, lease, Duration::from_secs(1));
        assert_eq!(encode_done(&refused), "false,506");
        assert_eq!(bridge.get_owning_pid("no-lease").unwrap(), 0);
    }
    assert_eq!(bridge.last_lock_error().code, code::GET_DISTRIBUTED_LOCK_ERROR);

    bridge
        .acquire_lock_within(lock, Duration::from_secs(5), Duration::from_secs(1))
        .unwrap();
    let second = bridge.acquire_lock_within(lock, Duration::from_secs(5), Duration::from_millis(50));
    assert_eq!(encode_done(&second), "false,513");
    bridge.release_lock(lock).unwrap();
}

#[test]
fn test_lock_lifecycle_errors() {
    let bridge = Bridge::in_memory();
    let lock = bridge.create_or_get_lock("short-lived").unwrap();
    assert!(bridge.remove_lock(lock).unwrap());
    assert_eq!(encode_done(&bridge.acquire_lock(lock)), "false,512");
    assert_eq!(
        encode_number(&bridge.get_owning_pid("short-lived")),
        "0,514"
    );
    assert_eq!(bridge.last_lock_error().code, code::LOCK_NOT_FOUND_ERROR);
}

#[test]
fn test_command_forms() {
    let bridge = Bridge::in_memory();

    let text = bridge.run_command(&Command::Text("SET greeting hello EX 30".into()));
    assert_eq!(encode_done(&text.map(drop)), "true,0");
    assert_eq!(bridge.get_ttl(b"greeting").unwrap().unwrap().into_vec(), b"hello");

    let args = ArgList::encode(&["MGET", "greeting", "missing"]);
    let reply = bridge.run_command(&Command::Args(args));
    assert_eq!(
        encode_reply(&reply, PAYLOAD_CEILING),
        r#"true,0,["hello",null]"#
    );

    bridge.create_store("catalog", "rstring", "rstring").unwrap();
    let http = bridge.run_command(&Command::Http(HttpCommand {
        scope: CommandScope::Database,
        verb: HttpVerb::Get,
        base_url: String::new(),
        endpoint: "/stores".into(),
        query_params: String::new(),
        body: String::new(),
    }));
    let encoded = encode_reply(&http, PAYLOAD_CEILING);
    let json: serde_json::Value = serde_json::from_str(encoded.strip_prefix("true,0,").unwrap()).unwrap();
    assert_eq!(json[0]["name"], "catalog");

    let bad = bridge.run_command(&Command::Text("EVAL nope".into()));
    assert_eq!(encode_done(&bad.map(drop)), "false,99");
}

#[test]
fn test_reconnect_and_persist() {
    let bridge = Bridge::in_memory();
    assert!(bridge.is_connected());
    bridge.reconnect(&[]).unwrap();
    assert!(bridge.is_connected());
    bridge.persist().unwrap();
    assert_eq!(bridge.product_name(), "memory");
}
