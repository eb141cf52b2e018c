#![forbid(unsafe_code)]

use docrev_storage::{
    CurrentStore, DocumentId, HistoryStore, LineagePolicy, Payload, RetentionPolicy, RetryPolicy,
    RevisionEngine, RevisionError, SqliteCurrentStore, SqliteHistoryStore, SqliteStore, StoreError,
    VersionFilter, VersionOrder, VersionedRecord, VersioningConfig,
};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::sync::{Arc, Barrier};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("docrev_concurrency_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn open_engine(store: &SqliteStore) -> RevisionEngine<SqliteCurrentStore, SqliteHistoryStore> {
    RevisionEngine::new(
        store.current("test_documents").expect("current handle"),
        store.history_for("test_documents").expect("history handle"),
    )
}

fn named(id: &str, name: &str) -> VersionedRecord {
    let mut payload = Payload::new();
    payload.insert("name".to_string(), json!(name));
    VersionedRecord::new(DocumentId::try_new(id).expect("document id"), payload)
}

fn archived_names(history: &SqliteHistoryStore, id: &DocumentId) -> Vec<(u64, String)> {
    history
        .find_archived(id, VersionFilter::All, VersionOrder::Descending)
        .expect("find archived")
        .into_iter()
        .map(|row| {
            let name = row
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            (row.version.expect("archived version"), name)
        })
        .collect()
}

/// Lets a competing writer land right before the wrapped store's next guarded update.
struct RacingCurrent<'a> {
    inner: SqliteCurrentStore,
    competitor: RefCell<Option<Box<dyn FnOnce() + 'a>>>,
    cas_calls: Cell<u32>,
}

impl<'a> RacingCurrent<'a> {
    fn new(inner: SqliteCurrentStore, competitor: impl FnOnce() + 'a) -> Self {
        Self {
            inner,
            competitor: RefCell::new(Some(Box::new(competitor))),
            cas_calls: Cell::new(0),
        }
    }
}

impl CurrentStore for RacingCurrent<'_> {
    fn get(&self, id: &DocumentId) -> Result<Option<VersionedRecord>, StoreError> {
        self.inner.get(id)
    }

    fn compare_and_swap(
        &self,
        id: &DocumentId,
        expected_version: u64,
        record: &VersionedRecord,
    ) -> Result<usize, StoreError> {
        self.cas_calls.set(self.cas_calls.get() + 1);
        if let Some(competitor) = self.competitor.borrow_mut().take() {
            competitor();
        }
        self.inner.compare_and_swap(id, expected_version, record)
    }

    fn insert(&self, record: &VersionedRecord) -> Result<(), StoreError> {
        self.inner.insert(record)
    }
}

/// Lets a competing writer land between the wrapped store's first read and everything after it.
struct RacingAfterRead<'a> {
    inner: SqliteCurrentStore,
    competitor: RefCell<Option<Box<dyn FnOnce() + 'a>>>,
}

impl CurrentStore for RacingAfterRead<'_> {
    fn get(&self, id: &DocumentId) -> Result<Option<VersionedRecord>, StoreError> {
        let snapshot = self.inner.get(id)?;
        if let Some(competitor) = self.competitor.borrow_mut().take() {
            competitor();
        }
        Ok(snapshot)
    }

    fn compare_and_swap(
        &self,
        id: &DocumentId,
        expected_version: u64,
        record: &VersionedRecord,
    ) -> Result<usize, StoreError> {
        self.inner.compare_and_swap(id, expected_version, record)
    }

    fn insert(&self, record: &VersionedRecord) -> Result<(), StoreError> {
        self.inner.insert(record)
    }
}

/// Every guarded update loses.
struct AlwaysConflicting {
    inner: SqliteCurrentStore,
    cas_calls: Cell<u32>,
}

impl CurrentStore for AlwaysConflicting {
    fn get(&self, id: &DocumentId) -> Result<Option<VersionedRecord>, StoreError> {
        self.inner.get(id)
    }

    fn compare_and_swap(
        &self,
        _id: &DocumentId,
        _expected_version: u64,
        _record: &VersionedRecord,
    ) -> Result<usize, StoreError> {
        self.cas_calls.set(self.cas_calls.get() + 1);
        Ok(0)
    }

    fn insert(&self, record: &VersionedRecord) -> Result<(), StoreError> {
        self.inner.insert(record)
    }
}

/// Reads fail as if the backing store went away.
struct Unreachable {
    get_calls: Cell<u32>,
}

impl CurrentStore for Unreachable {
    fn get(&self, _id: &DocumentId) -> Result<Option<VersionedRecord>, StoreError> {
        self.get_calls.set(self.get_calls.get() + 1);
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "store offline",
        )))
    }

    fn compare_and_swap(
        &self,
        _id: &DocumentId,
        _expected_version: u64,
        _record: &VersionedRecord,
    ) -> Result<usize, StoreError> {
        Ok(0)
    }

    fn insert(&self, _record: &VersionedRecord) -> Result<(), StoreError> {
        Ok(())
    }
}

#[test]
fn stale_snapshot_becomes_next_version_with_original_lineage() {
    let store = SqliteStore::open(temp_dir("stale_original")).expect("open store");
    let engine = open_engine(&store);

    let mut doc = named("doc-race", "Doc");
    engine.revise(&mut doc).expect("create");

    let mut user1 = engine.history().latest_version(&doc.id).expect("user1 load");
    let mut user2 = engine.history().latest_version(&doc.id).expect("user2 load");
    user2.set("name", "Doc2");
    user1.set("name", "Doc1");

    engine.revise(&mut user2).expect("user2 revise");
    engine.revise(&mut user1).expect("user1 revise");

    assert_eq!(user2.version, Some(2));
    assert_eq!(user1.version, Some(3));
    assert_eq!(user1.based_on_version, Some(1));

    let current = engine.history().latest_version(&doc.id).expect("latest");
    assert_eq!(current.version, Some(3));
    assert_eq!(current.based_on_version, Some(1));
    assert_eq!(current.get("name"), Some(&json!("Doc1")));

    assert_eq!(
        archived_names(engine.history_store(), &doc.id),
        vec![(2, "Doc2".to_string()), (1, "Doc".to_string())]
    );
}

#[test]
fn last_observed_lineage_points_at_the_winning_version() {
    let store = SqliteStore::open(temp_dir("stale_last_observed")).expect("open store");
    let config = VersioningConfig {
        lineage: LineagePolicy::LastObserved,
        ..VersioningConfig::default()
    };
    let engine = open_engine(&store).with_config(config).expect("config");

    let mut doc = named("doc-race", "Doc");
    engine.revise(&mut doc).expect("create");
    let mut user1 = doc.clone();
    let mut user2 = doc.clone();
    user2.set("name", "Doc2");
    user1.set("name", "Doc1");

    engine.revise(&mut user2).expect("user2 revise");
    engine.revise(&mut user1).expect("user1 revise");

    assert_eq!(user1.version, Some(3));
    assert_eq!(user1.based_on_version, Some(2));
}

#[test]
fn losing_the_guarded_update_rereads_and_retries() {
    let store = SqliteStore::open(temp_dir("interleaved")).expect("open store");
    let setup = open_engine(&store);

    let mut doc = named("doc-interleaved", "Doc");
    setup.revise(&mut doc).expect("create");
    let mut user1 = doc.clone();
    user1.set("name", "Doc1");

    let competitor_store = store.clone();
    let competitor_doc = doc.clone();
    let racing = RacingCurrent::new(
        store.current("test_documents").expect("current handle"),
        move || {
            let competitor = open_engine(&competitor_store);
            let mut user2 = competitor_doc;
            user2.set("name", "Doc2");
            competitor.revise(&mut user2).expect("competitor revise");
            assert_eq!(user2.version, Some(2));
        },
    );
    let engine = RevisionEngine::new(
        &racing,
        store.history_for("test_documents").expect("history handle"),
    )
    .with_config(VersioningConfig {
        retry: RetryPolicy::no_backoff(4),
        ..VersioningConfig::default()
    })
    .expect("config");

    let outcome = engine.revise(&mut user1).expect("user1 revise");
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.version, 3);
    assert_eq!(outcome.based_on_version, Some(1));
    assert_eq!(racing.cas_calls.get(), 2);

    assert_eq!(
        archived_names(engine.history_store(), &doc.id),
        vec![(2, "Doc2".to_string()), (1, "Doc".to_string())]
    );
    let current = setup.history().latest_version(&doc.id).expect("latest");
    assert_eq!(current.version, Some(3));
    assert_eq!(current.get("name"), Some(&json!("Doc1")));
}

#[test]
fn sustained_contention_exhausts_the_retry_budget() {
    let store = SqliteStore::open(temp_dir("exhausted")).expect("open store");
    let setup = open_engine(&store);
    let mut doc = named("doc-contended", "Doc");
    setup.revise(&mut doc).expect("create");

    let conflicting = AlwaysConflicting {
        inner: store.current("test_documents").expect("current handle"),
        cas_calls: Cell::new(0),
    };
    let engine = RevisionEngine::new(
        &conflicting,
        store.history_for("test_documents").expect("history handle"),
    )
    .with_config(VersioningConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
        },
        ..VersioningConfig::default()
    })
    .expect("config");

    doc.set("name", "Never");
    let err = engine.revise(&mut doc).expect_err("must give up");
    match err {
        RevisionError::ConflictExhausted { id, attempts } => {
            assert_eq!(id, doc.id);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected ConflictExhausted error, got {other:?}"),
    }
    assert_eq!(conflicting.cas_calls.get(), 3);
    assert_eq!(doc.version, Some(1), "caller's record is left as it was");

    // The snapshot preserved by the discarded attempts is still the real version 1.
    assert_eq!(
        archived_names(engine.history_store(), &doc.id),
        vec![(1, "Doc".to_string())]
    );
}

#[test]
fn exhausted_revise_reprunes_a_snapshot_it_rearchived() {
    let store = SqliteStore::open(temp_dir("exhausted_retention")).expect("open store");
    let config = VersioningConfig {
        retry: RetryPolicy::no_backoff(1),
        retention: RetentionPolicy::max_versions(1),
        ..VersioningConfig::default()
    };
    let setup = open_engine(&store)
        .with_config(config.clone())
        .expect("config");

    let mut doc = named("doc-rearchived", "Doc");
    setup.revise(&mut doc).expect("create");
    doc.set("name", "Doc2");
    setup.revise(&mut doc).expect("revise to v2");
    assert!(archived_names(setup.history_store(), &doc.id).is_empty());

    // The competitor archives v2, wins the guarded update and prunes v2 again,
    // all after the slow writer has read v2 but before it archives it.
    let competitor_store = store.clone();
    let competitor_config = config.clone();
    let competitor_doc = doc.clone();
    let racing = RacingAfterRead {
        inner: store.current("test_documents").expect("current handle"),
        competitor: RefCell::new(Some(Box::new(move || {
            let competitor = open_engine(&competitor_store)
                .with_config(competitor_config)
                .expect("config");
            let mut rival = competitor_doc;
            rival.set("name", "Rival");
            let outcome = competitor.revise(&mut rival).expect("competitor revise");
            assert_eq!(outcome.version, 3);
            assert_eq!(outcome.pruned.deleted, vec![2]);
        }))),
    };
    let engine = RevisionEngine::new(
        &racing,
        store.history_for("test_documents").expect("history handle"),
    )
    .with_config(config)
    .expect("config");

    doc.set("name", "Slow");
    let err = engine.revise(&mut doc).expect_err("single attempt loses");
    assert!(
        matches!(err, RevisionError::ConflictExhausted { attempts: 1, .. }),
        "got {err:?}"
    );

    assert!(
        archived_names(engine.history_store(), &doc.id).is_empty(),
        "re-archived v2 exceeds max_versions"
    );
    let current = setup.history().latest_version(&doc.id).expect("latest");
    assert_eq!(current.version, Some(3));
    assert_eq!(current.get("name"), Some(&json!("Rival")));
}

#[test]
fn unavailable_store_is_not_retried() {
    let dir = temp_dir("unavailable");
    let store = SqliteStore::open(&dir).expect("open store");
    let unreachable = Unreachable {
        get_calls: Cell::new(0),
    };
    let engine = RevisionEngine::new(
        &unreachable,
        store.history_for("test_documents").expect("history handle"),
    );

    let mut doc = named("doc-offline", "Doc");
    doc.version = Some(1);
    let err = engine.revise(&mut doc).expect_err("store is offline");
    match err {
        RevisionError::Store(inner) => assert!(inner.is_unavailable(), "got {inner:?}"),
        other => panic!("expected Store error, got {other:?}"),
    }
    assert_eq!(unreachable.get_calls.get(), 1);
}

#[test]
fn concurrent_writers_each_land_exactly_once() {
    const WRITERS: usize = 6;

    let store = SqliteStore::open(temp_dir("threads")).expect("open store");
    let mut doc = named("doc-threads", "Doc");
    open_engine(&store).revise(&mut doc).expect("create");

    let barrier = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            let mut snapshot = doc.clone();
            std::thread::spawn(move || {
                let engine = open_engine(&store)
                    .with_config(VersioningConfig {
                        retry: RetryPolicy {
                            max_attempts: 64,
                            initial_backoff_ms: 1,
                            max_backoff_ms: 20,
                        },
                        ..VersioningConfig::default()
                    })
                    .expect("config");
                snapshot.set("name", format!("writer-{writer}"));
                barrier.wait();
                engine.revise(&mut snapshot).expect("concurrent revise");
                snapshot.version.expect("assigned version")
            })
        })
        .collect();

    let mut landed: Vec<u64> = handles
        .into_iter()
        .map(|handle| handle.join().expect("writer thread"))
        .collect();
    landed.sort_unstable();
    let expected: Vec<u64> = (2..=(WRITERS as u64 + 1)).collect();
    assert_eq!(landed, expected, "each writer gets a distinct version");

    let engine = open_engine(&store);
    let latest = engine.history().latest_version(&doc.id).expect("latest");
    assert_eq!(latest.version, Some(WRITERS as u64 + 1));

    let mut archived: Vec<u64> = engine
        .history_store()
        .find_archived(&doc.id, VersionFilter::All, VersionOrder::Ascending)
        .expect("find archived")
        .into_iter()
        .filter_map(|row| row.version)
        .collect();
    archived.dedup();
    let expected: Vec<u64> = (1..=WRITERS as u64).collect();
    assert_eq!(archived, expected, "every superseded version archived once");
    assert_eq!(
        engine
            .history_store()
            .count_archived(&doc.id)
            .expect("count"),
        WRITERS as u64
    );
}
