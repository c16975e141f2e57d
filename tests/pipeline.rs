use std::{sync::Arc, time::Duration};

use dynafka::{
    decoder::get_decoder,
    pool::{self, PoolConfig},
    settings::{BatchAck, WriteMode},
    testing::{Event, Journal, MemoryLog, MemoryStore},
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

fn payloads(n: usize) -> Vec<String> {
    (0..n).map(|i| format!(r#"{{"seq":{i},"ok":true}}"#)).collect()
}

fn seqs(rows: &[String]) -> Vec<u64> {
    let mut s: Vec<u64> = rows
        .iter()
        .map(|r| serde_json::from_str::<Value>(r).unwrap()["seq"].as_u64().unwrap())
        .collect();
    s.sort_unstable();
    s
}

#[tokio::test]
async fn example_scenario_single_worker() {
    let log = Arc::new(MemoryLog::new([
        r#"{"a":1}"#,
        "not-json",
        r#"{"b":2}"#,
        r#"{"c":3}"#,
    ]));
    let store = MemoryStore::new();
    let config = PoolConfig {
        worker_count: 1,
        batch_size: 2,
        ..Default::default()
    };
    let stats = pool::run(
        &config,
        log.clone(),
        Arc::new(store.clone()),
        get_decoder("json").unwrap(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(store.rows(), vec![r#"{"a":1}"#, r#"{"b":2}"#, r#"{"c":3}"#]);
    assert_eq!(store.transactions().len(), 2);
    assert_eq!(stats.skipped, 1);
    assert!(log.is_closed());
}

#[tokio::test]
async fn concurrent_batch_workers_persist_everything_once() {
    let input = payloads(257);
    let log = Arc::new(MemoryLog::new(&input));
    let store = MemoryStore::new();
    let config = PoolConfig {
        worker_count: 4,
        batch_size: 10,
        ..Default::default()
    };
    let stats = pool::run(
        &config,
        log.clone(),
        Arc::new(store.clone()),
        get_decoder("json").unwrap(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(seqs(&store.rows()), (0..257).collect::<Vec<u64>>());
    assert_eq!(stats.fetched, 257);
    assert_eq!(stats.persisted, 257);
    assert!(store.transactions().iter().all(|t| t.len() <= 10));
    assert!(log.commits().is_empty());
    assert!(log.is_closed());
}

#[tokio::test]
async fn poisoned_batches_are_all_or_nothing() {
    let mut input = payloads(40);
    input[13] = r#"{"seq":13,"poison":true}"#.to_string();
    input[27] = r#"{"seq":27,"poison":true}"#.to_string();
    let store = MemoryStore::new().reject_containing("poison");
    let config = PoolConfig {
        worker_count: 3,
        batch_size: 5,
        ..Default::default()
    };
    let stats = pool::run(
        &config,
        Arc::new(MemoryLog::new(&input)),
        Arc::new(store.clone()),
        get_decoder("json").unwrap(),
        CancellationToken::new(),
    )
    .await;

    assert!(!store.rows().iter().any(|r| r.contains("poison")));
    assert!((1..=2).contains(&store.rollbacks()));
    assert_eq!(stats.persisted + stats.failed_writes, 40);
    assert_eq!(stats.persisted, store.rows().len() as u64);
}

#[tokio::test]
async fn immediate_mode_acknowledges_only_persisted_messages() {
    let journal = Journal::new();
    let input = vec![
        r#"{"seq":0}"#.to_string(),
        "garbage".to_string(),
        r#"{"seq":2,"poison":1}"#.to_string(),
        r#"{"seq":3}"#.to_string(),
        r#"{"seq":4}"#.to_string(),
    ];
    let log = Arc::new(MemoryLog::new(&input).with_journal(journal.clone()));
    let store = MemoryStore::new()
        .reject_containing("poison")
        .with_journal(journal.clone());
    let config = PoolConfig {
        worker_count: 2,
        write_mode: WriteMode::Immediate,
        ..Default::default()
    };
    let stats = pool::run(
        &config,
        log.clone(),
        Arc::new(store.clone()),
        get_decoder("json").unwrap(),
        CancellationToken::new(),
    )
    .await;

    let mut committed: Vec<i64> = log.commits().iter().map(|p| p.offset).collect();
    committed.sort_unstable();
    assert_eq!(committed, vec![0, 3, 4]);
    assert_eq!(stats.commits, 3);

    // every commit follows the persist of the same row
    let events = journal.events();
    for (i, e) in events.iter().enumerate() {
        if let Event::Committed(p) = e {
            let row = &input[p[0].offset as usize];
            assert!(events[..i].contains(&Event::Persisted(vec![row.clone()])));
        }
    }
}

#[tokio::test]
async fn after_flush_acknowledges_every_fetched_offset() {
    let input = payloads(23);
    let log = Arc::new(MemoryLog::new(&input));
    let config = PoolConfig {
        worker_count: 1,
        batch_size: 5,
        batch_ack: BatchAck::AfterFlush,
        ..Default::default()
    };
    pool::run(
        &config,
        log.clone(),
        Arc::new(MemoryStore::new()),
        get_decoder("json").unwrap(),
        CancellationToken::new(),
    )
    .await;

    let offsets: Vec<i64> = log.commits().iter().map(|p| p.offset).collect();
    assert_eq!(offsets, vec![4, 9, 14, 19, 22]);
}

#[tokio::test]
async fn shutdown_drains_every_worker() {
    let log = Arc::new(MemoryLog::new(payloads(9)).hold_open());
    let store = MemoryStore::new();
    let shutdown = CancellationToken::new();
    let config = PoolConfig {
        worker_count: 3,
        batch_size: 100,
        ..Default::default()
    };
    let run = tokio::spawn({
        let log = log.clone();
        let store = store.clone();
        let shutdown = shutdown.clone();
        async move {
            pool::run(
                &config,
                log,
                Arc::new(store),
                get_decoder("json").unwrap(),
                shutdown,
            )
            .await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.rows().is_empty());
    shutdown.cancel();
    let stats = run.await.unwrap();

    assert_eq!(seqs(&store.rows()), (0..9).collect::<Vec<u64>>());
    assert_eq!(stats.persisted, 9);
    assert!(log.is_closed());
}

#[tokio::test]
async fn fetch_error_stops_only_one_worker() {
    let input = payloads(30);
    let log = Arc::new(MemoryLog::new(&input).fail_fetch(4));
    let store = MemoryStore::new();
    let config = PoolConfig {
        worker_count: 3,
        batch_size: 4,
        ..Default::default()
    };
    let stats = pool::run(
        &config,
        log.clone(),
        Arc::new(store.clone()),
        get_decoder("json").unwrap(),
        CancellationToken::new(),
    )
    .await;

    // the failed fetch consumed nothing; the surviving workers took the rest
    assert_eq!(seqs(&store.rows()), (0..30).collect::<Vec<u64>>());
    assert_eq!(stats.fetched, 30);
    assert_eq!(stats.persisted, 30);
    assert_eq!(log.remaining(), 0);
}

#[tokio::test]
async fn immediate_mode_survives_rejected_commits() {
    let log = Arc::new(MemoryLog::new(payloads(12)).reject_commits());
    let store = MemoryStore::new();
    let config = PoolConfig {
        worker_count: 3,
        write_mode: WriteMode::Immediate,
        ..Default::default()
    };
    let stats = pool::run(
        &config,
        log.clone(),
        Arc::new(store.clone()),
        get_decoder("json").unwrap(),
        CancellationToken::new(),
    )
    .await;

    assert_eq!(seqs(&store.rows()), (0..12).collect::<Vec<u64>>());
    assert_eq!(stats.failed_commits, 12);
    assert_eq!(stats.commits, 0);
}
