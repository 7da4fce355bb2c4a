//! Scan engine tests against the in-memory store.
//!
//! Every test seeds a [`MemoryStore`], runs a scan through a real
//! [`Session`], and checks both the rows and the commands that reached the
//! store.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::missing_panics_doc
)]

use std::collections::{BTreeMap, BTreeSet};

use futures::TryStreamExt;
use keyrel_db::{DbError, Entry, MemoryConnection, MemoryStore, Session};
use keyrel_engine::{EngineError, Expr, Scan, ScanMode};
use keyrel_types::{
    CollectionKind, ErrorCode, KeyOrganization, Row, ScalarType, TableConfig, TableSchema,
};

fn table(kind: CollectionKind, organization: KeyOrganization) -> TableConfig {
    TableConfig::new(kind, organization)
}

async fn session(store: &MemoryStore) -> Session<MemoryConnection> {
    store.session(None, 0).await.expect("session should establish")
}

async fn begin(
    store: &MemoryStore,
    config: &TableConfig,
    schema: &TableSchema,
    clauses: &[Expr],
) -> Scan<MemoryConnection> {
    Scan::begin(session(store).await, config, schema, clauses)
        .await
        .expect("scan should begin")
}

async fn scan_all(
    store: &MemoryStore,
    config: &TableConfig,
    schema: &TableSchema,
    clauses: &[Expr],
) -> Vec<Row> {
    begin(store, config, schema, clauses)
        .await
        .into_rows()
        .await
        .expect("scan should complete")
}

fn string(value: &str) -> Entry {
    Entry::String(value.to_owned())
}

fn hash(pairs: &[(&str, &str)]) -> Entry {
    Entry::Hash(
        pairs
            .iter()
            .map(|(f, v)| ((*f).to_owned(), (*v).to_owned()))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn set(members: &[&str]) -> Entry {
    Entry::Set(members.iter().map(|m| (*m).to_owned()).collect::<BTreeSet<_>>())
}

fn count(log: &[String], prefix: &str) -> usize {
    log.iter().filter(|line| line.starts_with(prefix)).count()
}

#[tokio::test]
async fn full_scan_returns_every_scalar_key() {
    let store = MemoryStore::new();
    store.put(0, "a", string("1"));
    store.put(0, "b", string("2"));

    let config = table(CollectionKind::Scalar, KeyOrganization::Unscoped);
    let rows = scan_all(&store, &config, &TableSchema::key_value(), &[]).await;

    assert_eq!(rows, vec![Row::pair("a", "1"), Row::pair("b", "2")]);
}

#[tokio::test]
async fn cursor_enumeration_stops_when_cursor_returns_to_start() {
    let store = MemoryStore::new().with_page_limit(2);
    for i in 0..5 {
        store.put(0, format!("k{i}"), string(&i.to_string()));
    }
    store.clear_log();

    let config = table(CollectionKind::Scalar, KeyOrganization::Unscoped);
    let rows = scan_all(&store, &config, &TableSchema::key_value(), &[]).await;

    assert_eq!(rows.len(), 5);
    let log = store.command_log();
    assert_eq!(count(&log, "SCAN "), 3, "one SCAN per page: {log:?}");
    assert_eq!(log.iter().filter(|l| *l == "SCAN 0 COUNT 1000").count(), 1);
}

#[tokio::test]
async fn prefix_scan_matches_prefix_pattern() {
    let store = MemoryStore::new();
    store.put(0, "user:1", string("ann"));
    store.put(0, "user:2", string("bob"));
    store.put(0, "other", string("x"));
    store.clear_log();

    let config = table(
        CollectionKind::Scalar,
        KeyOrganization::KeyPrefix("user:".to_owned()),
    );
    let scan = begin(&store, &config, &TableSchema::key_value(), &[]).await;
    assert_eq!(scan.mode(), ScanMode::Prefix);
    let rows = scan.into_rows().await.expect("rows");

    assert_eq!(rows, vec![Row::pair("user:1", "ann"), Row::pair("user:2", "bob")]);
    assert!(
        store
            .command_log()
            .contains(&"SCAN 0 MATCH user:* COUNT 1000".to_owned())
    );
}

#[tokio::test]
async fn keyset_scan_enumerates_set_members_and_skips_missing_keys() {
    let store = MemoryStore::new();
    store.put(0, "idx", set(&["a", "gone"]));
    store.put(0, "a", string("1"));
    store.put(0, "b", string("2"));

    let config = table(CollectionKind::Scalar, KeyOrganization::KeySet("idx".to_owned()));
    let scan = begin(&store, &config, &TableSchema::key_value(), &[]).await;
    assert_eq!(scan.mode(), ScanMode::KeySet);

    assert_eq!(scan.into_rows().await.expect("rows"), vec![Row::pair("a", "1")]);
}

#[tokio::test]
async fn enumeration_skips_keys_of_another_kind() {
    let store = MemoryStore::new();
    store.put(0, "h", hash(&[("f", "v")]));
    store.put(0, "s", string("plain"));

    let config = table(CollectionKind::Hash, KeyOrganization::Unscoped);
    let rows = scan_all(&store, &config, &TableSchema::key_array(ScalarType::Text), &[]).await;

    assert_eq!(rows, vec![Row::pair("h", r#"{"f","v"}"#)]);
}

#[tokio::test]
async fn sorted_set_rows_include_scores() {
    let store = MemoryStore::new();
    store.put(
        0,
        "z",
        Entry::SortedSet(vec![(1.0, "a".to_owned()), (2.5, "b".to_owned())]),
    );

    let config = table(CollectionKind::SortedSet, KeyOrganization::Unscoped);
    let rows = scan_all(&store, &config, &TableSchema::key_array(ScalarType::Text), &[]).await;

    assert_eq!(rows, vec![Row::pair("z", r#"{"a","1","b","2.5"}"#)]);
}

#[tokio::test]
async fn singleton_hash_with_key_restriction_reads_one_field() {
    let store = MemoryStore::new();
    store.put(0, "config", hash(&[("f1", "v1"), ("f2", "v2")]));
    store.clear_log();

    let config = table(
        CollectionKind::Hash,
        KeyOrganization::Singleton("config".to_owned()),
    );
    let schema = TableSchema::key_value();
    let scan = begin(&store, &config, &schema, &[Expr::text_eq(0, "f1")]).await;
    assert_eq!(scan.mode(), ScanMode::Singleton);
    let rows = scan.into_rows().await.expect("rows");

    assert_eq!(rows, vec![Row::pair("f1", "v1")]);
    assert!(store.command_log().contains(&"HGET config f1".to_owned()));

    let rows = scan_all(&store, &config, &schema, &[]).await;
    assert_eq!(rows, vec![Row::pair("f1", "v1"), Row::pair("f2", "v2")]);
}

#[tokio::test]
async fn singleton_collections_yield_one_row_per_member() {
    let store = MemoryStore::new();
    store.put(0, "tags", set(&["blue", "red"]));
    store.put(0, "queue", Entry::List(vec!["x".to_owned(), "x".to_owned()]));
    store.put(0, "motd", string("hello"));

    let tags = table(CollectionKind::Set, KeyOrganization::Singleton("tags".to_owned()));
    let rows = scan_all(&store, &tags, &TableSchema::key_only(), &[]).await;
    assert_eq!(rows, vec![Row::single("blue"), Row::single("red")]);

    let queue = table(CollectionKind::List, KeyOrganization::Singleton("queue".to_owned()));
    let rows = scan_all(&store, &queue, &TableSchema::key_only(), &[]).await;
    assert_eq!(rows, vec![Row::single("x"), Row::single("x")]);

    let motd = table(CollectionKind::Scalar, KeyOrganization::Singleton("motd".to_owned()));
    let rows = scan_all(&store, &motd, &TableSchema::key_only(), &[]).await;
    assert_eq!(rows, vec![Row::single("hello")]);

    let absent = table(CollectionKind::Scalar, KeyOrganization::Singleton("none".to_owned()));
    assert!(scan_all(&store, &absent, &TableSchema::key_only(), &[]).await.is_empty());
}

#[tokio::test]
async fn singleton_sorted_set_pairs_members_with_scores() {
    let store = MemoryStore::new();
    store.put(
        0,
        "ranks",
        Entry::SortedSet(vec![(1.0, "low".to_owned()), (7.0, "high".to_owned())]),
    );

    let config = table(
        CollectionKind::SortedSet,
        KeyOrganization::Singleton("ranks".to_owned()),
    );
    let rows = scan_all(&store, &config, &TableSchema::key_value(), &[]).await;

    assert_eq!(rows, vec![Row::pair("low", "1"), Row::pair("high", "7")]);
}

#[tokio::test]
async fn key_restriction_becomes_direct_lookup() {
    let store = MemoryStore::new();
    store.put(0, "a", string("1"));
    store.put(0, "b", string("2"));
    store.clear_log();

    let config = table(CollectionKind::Scalar, KeyOrganization::Unscoped);
    let scan = begin(&store, &config, &TableSchema::key_value(), &[Expr::text_eq(0, "b")]).await;
    assert_eq!(scan.mode(), ScanMode::Lookup);
    let rows = scan.into_rows().await.expect("rows");

    assert_eq!(rows, vec![Row::pair("b", "2")]);
    let log = store.command_log();
    assert_eq!(count(&log, "SCAN"), 0);
    assert!(log.contains(&"EXISTS b".to_owned()));
    assert!(log.contains(&"GET b".to_owned()));
}

#[tokio::test]
async fn lookup_outside_key_set_returns_nothing_without_reading() {
    let store = MemoryStore::new();
    store.put(0, "idx", set(&["a"]));
    store.put(0, "a", string("1"));
    store.put(0, "b", string("2"));
    store.clear_log();

    let config = table(CollectionKind::Scalar, KeyOrganization::KeySet("idx".to_owned()));
    let rows = scan_all(&store, &config, &TableSchema::key_value(), &[Expr::text_eq(0, "b")]).await;

    assert!(rows.is_empty());
    let log = store.command_log();
    assert!(log.contains(&"SISMEMBER idx b".to_owned()));
    assert_eq!(count(&log, "EXISTS"), 0);
    assert_eq!(count(&log, "GET"), 0);
}

#[tokio::test]
async fn lookup_outside_prefix_issues_no_existence_check() {
    let store = MemoryStore::new();
    store.put(0, "other", string("x"));
    store.clear_log();

    let config = table(
        CollectionKind::Scalar,
        KeyOrganization::KeyPrefix("user:".to_owned()),
    );
    let rows = scan_all(
        &store,
        &config,
        &TableSchema::key_value(),
        &[Expr::text_eq(0, "other")],
    )
    .await;

    assert!(rows.is_empty());
    assert_eq!(count(&store.command_log(), "EXISTS"), 0);
}

#[tokio::test]
async fn lookup_of_missing_key_yields_no_rows() {
    let store = MemoryStore::new();
    let config = table(CollectionKind::Scalar, KeyOrganization::Unscoped);
    let rows = scan_all(&store, &config, &TableSchema::key_value(), &[Expr::text_eq(0, "nope")]).await;
    assert!(rows.is_empty());
}

#[tokio::test]
async fn lookup_of_wrong_kind_is_a_store_error() {
    let store = MemoryStore::new();
    store.put(0, "h", hash(&[("f", "v")]));

    let config = table(CollectionKind::Scalar, KeyOrganization::Unscoped);
    let mut scan = begin(&store, &config, &TableSchema::key_value(), &[Expr::text_eq(0, "h")]).await;
    let err = scan.next_row().await.expect_err("GET on a hash must fail");

    assert!(matches!(err, EngineError::Db(DbError::Store { .. })));
    assert_eq!(err.code(), ErrorCode::UnableToCreateExecution);
    scan.close().await;
}

#[tokio::test]
async fn rescan_replays_every_row() {
    let store = MemoryStore::new().with_page_limit(2);
    for key in ["a", "b", "c"] {
        store.put(0, key, string(key));
    }

    let config = table(CollectionKind::Scalar, KeyOrganization::Unscoped);
    let mut scan = begin(&store, &config, &TableSchema::key_value(), &[]).await;

    let mut first = Vec::new();
    while let Some(row) = scan.next_row().await.expect("row") {
        first.push(row);
    }
    scan.rescan();
    let second = scan.into_rows().await.expect("rows");

    assert_eq!(first.len(), 3);
    assert_eq!(first, second);
}

#[tokio::test]
async fn rescan_of_lookup_returns_the_row_again() {
    let store = MemoryStore::new();
    store.put(0, "a", string("1"));

    let config = table(CollectionKind::Scalar, KeyOrganization::Unscoped);
    let mut scan = begin(&store, &config, &TableSchema::key_value(), &[Expr::text_eq(0, "a")]).await;
    assert!(scan.next_row().await.expect("row").is_some());
    assert!(scan.next_row().await.expect("row").is_none());
    scan.rescan();
    assert_eq!(scan.next_row().await.expect("row"), Some(Row::pair("a", "1")));
    scan.close().await;
}

#[tokio::test]
async fn transport_failure_ends_the_scan() {
    let store = MemoryStore::new();
    store.put(0, "a", string("1"));
    store.put(0, "b", string("2"));

    let config = table(CollectionKind::Scalar, KeyOrganization::Unscoped);
    let mut scan = begin(&store, &config, &TableSchema::key_value(), &[]).await;
    store.fail_next("GET");

    let err = scan.next_row().await.expect_err("transport failure");
    assert!(matches!(err, EngineError::Db(DbError::Transport { .. })));
    assert_eq!(err.code(), ErrorCode::UnableToCreateExecution);

    // The session is poisoned: no further command reaches the store.
    store.clear_log();
    assert!(scan.next_row().await.is_err());
    assert!(store.command_log().is_empty());
    scan.close().await;
}

#[tokio::test]
async fn failed_first_page_fails_begin() {
    let store = MemoryStore::new();
    store.fail_next("SCAN");

    let config = table(CollectionKind::Scalar, KeyOrganization::Unscoped);
    let result = Scan::begin(session(&store).await, &config, &TableSchema::key_value(), &[]).await;

    let err = result.expect_err("begin must fail");
    assert!(matches!(err, EngineError::Db(DbError::Transport { .. })));
}

#[tokio::test]
async fn stream_yields_the_same_rows() {
    let store = MemoryStore::new();
    store.put(0, "l", Entry::List(vec!["x".to_owned(), r#"q"t"#.to_owned()]));

    let config = table(CollectionKind::List, KeyOrganization::Unscoped);
    let scan = begin(&store, &config, &TableSchema::key_array(ScalarType::Text), &[]).await;
    let rows: Vec<Row> = scan.into_stream().try_collect().await.expect("rows");

    assert_eq!(rows, vec![Row::pair("l", r#"{"x","q\"t"}"#)]);
}

#[tokio::test]
async fn stream_releases_the_session_after_an_error() {
    let store = MemoryStore::new();
    store.put(0, "a", string("1"));

    let config = table(CollectionKind::Scalar, KeyOrganization::Unscoped);
    let scan = begin(&store, &config, &TableSchema::key_value(), &[]).await;
    assert_eq!(store.open_connections(), 1);
    store.fail_next("GET");

    let result: Result<Vec<Row>, EngineError> = scan.into_stream().try_collect().await;

    assert!(matches!(result, Err(EngineError::Db(DbError::Transport { .. }))));
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn drained_scan_releases_the_session() {
    let store = MemoryStore::new();
    store.put(0, "a", string("1"));

    let config = table(CollectionKind::Scalar, KeyOrganization::Unscoped);
    let rows = scan_all(&store, &config, &TableSchema::key_value(), &[]).await;

    assert_eq!(rows.len(), 1);
    assert_eq!(store.open_connections(), 0);
}

#[tokio::test]
async fn one_column_singleton_sorted_set_yields_members_only() {
    let store = MemoryStore::new();
    store.put(
        0,
        "ranks",
        Entry::SortedSet(vec![(1.0, "a".to_owned()), (2.0, "b".to_owned())]),
    );

    let config = table(
        CollectionKind::SortedSet,
        KeyOrganization::Singleton("ranks".to_owned()),
    );
    let schema = TableSchema::key_only();
    let rows = scan_all(&store, &config, &schema, &[]).await;

    assert_eq!(rows, vec![Row::single("a"), Row::single("b")]);
    assert!(rows.iter().all(|row| row.len() == schema.len()));
}

#[tokio::test]
async fn one_column_singleton_hash_yields_fields_only() {
    let store = MemoryStore::new();
    store.put(0, "h", hash(&[("f", "1"), ("g", "2")]));

    let config = table(CollectionKind::Hash, KeyOrganization::Singleton("h".to_owned()));
    let rows = scan_all(&store, &config, &TableSchema::key_only(), &[]).await;

    assert_eq!(rows, vec![Row::single("f"), Row::single("g")]);
}

#[tokio::test]
async fn one_column_scoped_table_yields_keys_only() {
    let store = MemoryStore::new();
    store.put(0, "a", string("1"));
    store.put(0, "b", string("2"));

    let config = table(CollectionKind::Scalar, KeyOrganization::Unscoped);
    let schema = TableSchema::key_only();
    let rows = scan_all(&store, &config, &schema, &[]).await;
    assert_eq!(rows, vec![Row::single("a"), Row::single("b")]);

    let lookup = scan_all(&store, &config, &schema, &[Expr::text_eq(0, "b")]).await;
    assert_eq!(lookup, vec![Row::single("b")]);
}
