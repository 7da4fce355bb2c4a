//! Integration tests for the `keyrel-db` live connection.
//!
//! These tests require a Redis-compatible store on `127.0.0.1:6379`.
//! Run with:
//!
//! ```bash
//! docker run --rm -d -p 6379:6379 redis:7
//! cargo test -p keyrel-db -- --ignored
//! ```
//!
//! All tests are marked `#[ignore]` so they are skipped during normal
//! `cargo test` runs. They work in database 15 under the `keyrel-test:`
//! prefix and clean up after themselves.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use std::time::Duration;

use keyrel_db::{CURSOR_START, Command, DbError, RedisConnection, Reply, Session, connect};
use keyrel_types::{CollectionKind, KeyOrganization, TableConfig};

const TEST_DATABASE: u32 = 15;

fn live_config() -> TableConfig {
    TableConfig::new(CollectionKind::Scalar, KeyOrganization::Unscoped)
        .with_database(TEST_DATABASE)
}

async fn live_session() -> Session<RedisConnection> {
    connect(&live_config()).await.expect("live store should accept connections")
}

#[tokio::test]
#[ignore = "requires live Redis instance"]
async fn live_set_get_del_roundtrip() {
    let mut session = live_session().await;
    let key = "keyrel-test:scalar".to_owned();

    session
        .run(
            &Command::Set {
                key: key.clone(),
                value: "42".to_owned(),
            },
            "set {}",
            Some(key.as_str()),
        )
        .await
        .expect("SET");
    let reply = session
        .run(&Command::Get { key: key.clone() }, "get {}", Some(key.as_str()))
        .await
        .expect("GET");
    assert_eq!(reply, Reply::string("42"));

    let reply = session
        .run(&Command::Del { key: key.clone() }, "del {}", Some(key.as_str()))
        .await
        .expect("DEL");
    assert_eq!(reply, Reply::Integer(1));
    session.close().await;
}

#[tokio::test]
#[ignore = "requires live Redis instance"]
async fn live_wrong_type_is_a_store_error() {
    let mut session = live_session().await;
    let key = "keyrel-test:wrongtype".to_owned();

    session
        .run(
            &Command::Set {
                key: key.clone(),
                value: "x".to_owned(),
            },
            "set {}",
            Some(key.as_str()),
        )
        .await
        .expect("SET");
    let err = session
        .run(&Command::HGetAll { key: key.clone() }, "read {}", Some(key.as_str()))
        .await
        .expect_err("HGETALL on a string");
    assert!(matches!(err, DbError::Store { .. }));
    assert!(!session.is_broken());

    session
        .run(&Command::Del { key: key.clone() }, "del {}", Some(key.as_str()))
        .await
        .expect("DEL");
    session.close().await;
}

#[tokio::test]
#[ignore = "requires live Redis instance"]
async fn live_scan_returns_cursor_and_keys() {
    let mut session = live_session().await;
    let key = "keyrel-test:scan".to_owned();
    session
        .run(
            &Command::Set {
                key: key.clone(),
                value: "1".to_owned(),
            },
            "set {}",
            Some(key.as_str()),
        )
        .await
        .expect("SET");

    let mut cursor = CURSOR_START.to_owned();
    let mut seen = false;
    loop {
        let reply = session
            .run(
                &Command::Scan {
                    cursor: cursor.clone(),
                    pattern: Some("keyrel-test:*".to_owned()),
                },
                "scan",
                None,
            )
            .await
            .expect("SCAN");
        let Reply::Array(parts) = reply else {
            panic!("SCAN must return an array");
        };
        let next = parts[0].text().expect("utf8").expect("cursor").to_owned();
        if let Reply::Array(keys) = &parts[1] {
            seen |= keys.contains(&Reply::string(key.clone()));
        }
        if next == CURSOR_START {
            break;
        }
        cursor = next;
    }
    assert!(seen);

    session
        .run(&Command::Del { key: key.clone() }, "del {}", Some(key.as_str()))
        .await
        .expect("DEL");
    session.close().await;
}

#[tokio::test]
#[ignore = "requires live Redis instance"]
async fn live_sorted_set_scores_come_back_as_strings() {
    let mut session = live_session().await;
    let key = "keyrel-test:zset".to_owned();
    session
        .run(
            &Command::ZAdd {
                key: key.clone(),
                score: "2".to_owned(),
                member: "m".to_owned(),
            },
            "zadd {}",
            Some(key.as_str()),
        )
        .await
        .expect("ZADD");

    let reply = session
        .run(&Command::ZRangeWithScores { key: key.clone() }, "zrange {}", Some(key.as_str()))
        .await
        .expect("ZRANGE");
    assert_eq!(reply, Reply::Array(vec![Reply::string("m"), Reply::string("2")]));

    session
        .run(&Command::Del { key: key.clone() }, "del {}", Some(key.as_str()))
        .await
        .expect("DEL");
    session.close().await;
}

#[tokio::test]
#[ignore = "requires live Redis instance"]
async fn live_select_out_of_range_fails_establishment() {
    let config = live_config().with_database(100_000);
    let err = connect(&config).await.expect_err("database index out of range");
    assert!(matches!(err, DbError::SelectDatabase { index: 100_000, .. }));
}

#[tokio::test]
async fn unreachable_store_is_a_connection_failure() {
    let err = RedisConnection::open("127.0.0.1", 1, Duration::from_millis(200))
        .await
        .expect_err("nothing listens on port 1");
    assert!(matches!(err, DbError::Connect { port: 1, .. }));
}
