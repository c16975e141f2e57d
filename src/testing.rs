//! In-memory message log and row store, used to drive the pipeline in tests
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use async_trait::async_trait;

use crate::error::{CommitError, FetchError, StoreError};
use crate::source::{MessageLog, Position, RawMessage};
use crate::store::{RowStore, Transaction};

/// Something observable that happened to a collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Rows made durable by one committed transaction
    Persisted(Vec<String>),
    Committed(Vec<Position>),
}

/// Ordered record of events, shared by a log and a store
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Event>>>);

impl Journal {
    pub fn new() -> Journal {
        Journal::default()
    }

    pub fn events(&self) -> Vec<Event> {
        lock(&self.0).clone()
    }

    fn push(&self, event: Event) {
        lock(&self.0).push(event);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Queue of messages on topic `events`; offsets are assigned per partition in push order.
pub struct MemoryLog {
    queue: Mutex<VecDeque<RawMessage>>,
    commits: Mutex<Vec<Position>>,
    journal: Journal,
    hold_open: bool,
    closed: AtomicBool,
    reject_commits: bool,
    /// 1-based index of the fetch call that fails
    fail_fetch: Option<usize>,
    fetches: AtomicUsize,
}

impl MemoryLog {
    /// Log that fails with [FetchError::Closed] once drained.
    pub fn new<I, P>(payloads: I) -> MemoryLog
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        MemoryLog::partitioned(payloads.into_iter().map(|p| (0, p)))
    }

    /// Like [MemoryLog::new], with an explicit partition for every payload.
    pub fn partitioned<I, P>(payloads: I) -> MemoryLog
    where
        I: IntoIterator<Item = (i32, P)>,
        P: AsRef<[u8]>,
    {
        let mut next: Vec<(i32, i64)> = Vec::new();
        let mut queue = VecDeque::new();
        for (partition, payload) in payloads {
            let offset = match next.iter_mut().find(|(p, _)| *p == partition) {
                Some((_, o)) => {
                    *o += 1;
                    *o
                }
                None => {
                    next.push((partition, 0));
                    0
                }
            };
            queue.push_back(RawMessage {
                payload: payload.as_ref().to_vec(),
                position: Position {
                    topic: String::from("events"),
                    partition,
                    offset,
                },
            });
        }
        MemoryLog {
            queue: Mutex::new(queue),
            commits: Mutex::new(Vec::new()),
            journal: Journal::new(),
            hold_open: false,
            closed: AtomicBool::new(false),
            reject_commits: false,
            fail_fetch: None,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Once drained, fetch blocks forever instead of failing.
    pub fn hold_open(mut self) -> MemoryLog {
        self.hold_open = true;
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> MemoryLog {
        self.journal = journal;
        self
    }

    /// Every commit fails.
    pub fn reject_commits(mut self) -> MemoryLog {
        self.reject_commits = true;
        self
    }

    /// The `n`-th fetch call (counting from 1, across all callers) fails
    /// without consuming a message.
    pub fn fail_fetch(mut self, n: usize) -> MemoryLog {
        self.fail_fetch = Some(n);
        self
    }

    /// Messages not fetched yet.
    pub fn remaining(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn commits(&self) -> Vec<Position> {
        lock(&self.commits).clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageLog for MemoryLog {
    async fn fetch(&self) -> Result<RawMessage, FetchError> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_fetch == Some(n) {
            return Err(FetchError::Closed);
        }
        let next = lock(&self.queue).pop_front();
        match next {
            Some(m) => Ok(m),
            None if self.hold_open => std::future::pending().await,
            None => Err(FetchError::Closed),
        }
    }

    async fn commit(&self, positions: &[Position]) -> Result<(), CommitError> {
        if self.reject_commits {
            return Err(CommitError::Rejected(String::from("commits rejected")));
        }
        if self.is_closed() {
            return Err(CommitError::Rejected(String::from("log closed")));
        }
        lock(&self.commits).extend_from_slice(positions);
        self.journal.push(Event::Committed(positions.to_vec()));
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct StoreState {
    transactions: Vec<Vec<String>>,
    rollbacks: usize,
}

/// Row store keeping committed transactions in memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
    reject: Option<String>,
    journal: Journal,
    begun: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Fails any insert whose JSON text contains `needle`.
    pub fn reject_containing(mut self, needle: &str) -> MemoryStore {
        self.reject = Some(needle.to_string());
        self
    }

    pub fn with_journal(mut self, journal: Journal) -> MemoryStore {
        self.journal = journal;
        self
    }

    /// Rows of every committed transaction, in commit order.
    pub fn rows(&self) -> Vec<String> {
        lock(&self.state).transactions.concat()
    }

    pub fn transactions(&self) -> Vec<Vec<String>> {
        lock(&self.state).transactions.clone()
    }

    pub fn rollbacks(&self) -> usize {
        lock(&self.state).rollbacks
    }

    pub fn transactions_begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }
}

struct MemoryTransaction {
    store: MemoryStore,
    rows: Vec<String>,
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            rows: Vec::new(),
        }))
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn insert(&mut self, json: &str) -> Result<(), StoreError> {
        if let Some(needle) = &self.store.reject {
            if json.contains(needle.as_str()) {
                return Err(StoreError::Rejected(json.to_string()));
            }
        }
        self.rows.push(json.to_string());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { store, rows } = *self;
        lock(&store.state).transactions.push(rows.clone());
        store.journal.push(Event::Persisted(rows));
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        lock(&self.store.state).rollbacks += 1;
        Ok(())
    }
}
