//! 内存事件存储（参考实现）
//!
//! `InMemoryDatabase` 持有已提交的集合，`InMemoryEventStore` 是其上的一个会话。
//! 事务外的写入在数据库写锁下原子生效；事务内的写入暂存在会话中，读操作看到
//! 已提交数据叠加本会话的暂存写入，提交时逐条重新校验并整体生效或整体放弃。
//!
use crate::{
    config::{SessionOptions, StoreConfig},
    error::{DomainError, DomainResult as Result},
    persist::{
        EventStore, PendingEvent, Snapshot, StoredEvent,
        event_store::{ensure_stream_name, snapshot_channel},
        session::{SessionState, StagedWrite, Transaction},
    },
    value_object::Version,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct StreamData {
    events: Vec<StoredEvent>,
    snapshots: BTreeMap<Version, Snapshot>,
}

impl StreamData {
    fn size(&self) -> u64 {
        self.events.len() as u64
    }
}

#[derive(Debug, Default)]
struct Collections {
    streams: BTreeMap<String, StreamData>,
}

impl Collections {
    /// 复制部分流作为暂存空间
    fn scratch<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Collections {
        let streams = names
            .into_iter()
            .filter_map(|name| {
                self.streams
                    .get(name)
                    .map(|data| (name.to_string(), data.clone()))
            })
            .collect();
        Collections { streams }
    }

    fn merge(&mut self, scratch: Collections) {
        self.streams.extend(scratch.streams);
    }

    fn apply(&mut self, write: &StagedWrite) -> Result<()> {
        match write {
            StagedWrite::CreateStream { stream } => {
                if self.streams.contains_key(stream) {
                    return Err(DomainError::StreamAlreadyExists {
                        stream: stream.clone(),
                    });
                }
                self.streams.insert(stream.clone(), StreamData::default());
            }
            StagedWrite::Append {
                stream,
                expected,
                events,
            } => {
                let data = self.stream_mut(stream)?;
                let actual = Version::from_value(data.size());
                if *expected != actual {
                    return Err(DomainError::OptimisticConcurrencyConflict {
                        stream: stream.clone(),
                        expected: *expected,
                        actual,
                    });
                }
                data.events.extend(events.iter().cloned());
            }
            StagedWrite::AddSnapshot { stream, snapshot } => {
                let data = self.stream_mut(stream)?;
                validate_snapshot(stream, data, snapshot)?;
                if data.snapshots.contains_key(&snapshot.version()) {
                    return Err(DomainError::SnapshotConflict {
                        stream: stream.clone(),
                        version: snapshot.version(),
                    });
                }
                data.snapshots.insert(snapshot.version(), snapshot.clone());
            }
        }
        Ok(())
    }

    fn stream_mut(&mut self, stream: &str) -> Result<&mut StreamData> {
        self.streams
            .get_mut(stream)
            .ok_or_else(|| DomainError::StreamNotFound {
                stream: stream.to_string(),
            })
    }

    fn names(&self) -> Vec<String> {
        self.streams
            .keys()
            .flat_map(|stream| [stream.clone(), snapshot_channel(stream)])
            .collect()
    }
}

fn validate_snapshot(stream: &str, data: &StreamData, snapshot: &Snapshot) -> Result<()> {
    let invalid = |reason: String| DomainError::InvalidSnapshot {
        stream: stream.to_string(),
        reason,
    };

    if snapshot.id().is_nil() {
        return Err(invalid("snapshot id must not be nil".to_string()));
    }
    let prefix = format!("{}-", snapshot.snapshot_type());
    if snapshot.snapshot_type().is_empty() || !stream.starts_with(&prefix) {
        return Err(invalid(format!(
            "snapshot type {:?} does not belong to this stream",
            snapshot.snapshot_type()
        )));
    }
    if snapshot.version().value() > data.size() {
        return Err(invalid(format!(
            "snapshot version {} is beyond stream size {}",
            snapshot.version(),
            data.size()
        )));
    }
    Ok(())
}

/// 事务内视图：已提交数据叠加本事务对该流的暂存写入
fn transaction_view(
    committed: &Collections,
    tx: &Transaction,
    stream: &str,
) -> Result<Option<StreamData>> {
    let mut scratch = committed.scratch([stream]);
    for write in tx.staged_for(stream) {
        scratch.apply(write)?;
    }
    Ok(scratch.streams.remove(stream))
}

/// 内存数据库（已提交数据，多会话共享）
#[derive(Debug, Clone)]
pub struct InMemoryDatabase {
    name: String,
    collections: Arc<RwLock<Collections>>,
}

impl InMemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: Arc::new(RwLock::new(Collections::default())),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.database_name.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 已提交的集合名（事件集合及其快照通道），按名称排序
    pub async fn collection_names(&self) -> Vec<String> {
        let mut names = self.collections.read().await.names();
        names.sort();
        names
    }

    /// 打开一个新会话
    pub fn session(&self, options: SessionOptions) -> InMemoryEventStore {
        tracing::debug!(database = %self.name, ?options, "opening store session");
        InMemoryEventStore {
            db: self.clone(),
            options,
            state: Mutex::new(SessionState::Idle),
        }
    }
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

/// 内存数据库上的一个存储会话
#[derive(Debug)]
pub struct InMemoryEventStore {
    db: InMemoryDatabase,
    options: SessionOptions,
    state: Mutex<SessionState>,
}

impl InMemoryEventStore {
    /// 打开独立数据库上的会话
    pub fn new() -> Self {
        InMemoryDatabase::default().session(SessionOptions::default())
    }

    pub fn database(&self) -> &InMemoryDatabase {
        &self.db
    }

    pub fn options(&self) -> SessionOptions {
        self.options
    }

    pub async fn in_transaction(&self) -> bool {
        self.state.lock().await.is_in_transaction()
    }

    async fn write(&self, write: StagedWrite) -> Result<()> {
        let mut state = self.state.lock().await;
        match &mut *state {
            SessionState::Idle => {
                let mut committed = self.db.collections.write().await;
                committed.apply(&write)
            }
            SessionState::InTransaction(tx) => {
                let committed = self.db.collections.read().await;
                let mut scratch = committed.scratch([write.stream()]);
                for staged in tx.staged_for(write.stream()) {
                    scratch.apply(staged)?;
                }
                scratch.apply(&write)?;
                tx.stage(write);
                Ok(())
            }
        }
    }

    async fn read<F, R>(&self, stream: &str, f: F) -> Result<R>
    where
        F: FnOnce(Option<&StreamData>) -> R + Send,
        R: Send,
    {
        let state = self.state.lock().await;
        let committed = self.db.collections.read().await;
        match &*state {
            SessionState::Idle => Ok(f(committed.streams.get(stream))),
            SessionState::InTransaction(tx) => {
                let view = transaction_view(&committed, tx, stream)?;
                Ok(f(view.as_ref()))
            }
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn create_stream(&self, stream: &str) -> Result<()> {
        ensure_stream_name(stream)?;
        self.write(StagedWrite::CreateStream {
            stream: stream.to_string(),
        })
        .await
    }

    async fn stream_exists(&self, stream: &str) -> Result<bool> {
        self.read(stream, |data| data.is_some()).await
    }

    async fn append_events(
        &self,
        stream: &str,
        events: Vec<PendingEvent>,
        expected: Version,
    ) -> Result<Version> {
        ensure_stream_name(stream)?;
        if events.is_empty() {
            return Err(DomainError::StreamEmpty {
                stream: stream.to_string(),
            });
        }

        let next = Version::from_value(expected.value() + events.len() as u64);
        let events = events
            .into_iter()
            .enumerate()
            .map(|(i, e)| {
                e.into_stored(
                    Uuid::new_v4(),
                    Version::from_value(expected.value() + i as u64),
                )
            })
            .collect();

        self.write(StagedWrite::Append {
            stream: stream.to_string(),
            expected,
            events,
        })
        .await?;
        Ok(next)
    }

    async fn get_stream_size(&self, stream: &str) -> Result<u64> {
        self.read(stream, |data| data.map(StreamData::size).unwrap_or(0))
            .await
    }

    async fn get_event_range(
        &self,
        stream: &str,
        from: Version,
        to: Version,
    ) -> Result<Vec<StoredEvent>> {
        self.read(stream, |data| {
            let Some(data) = data else {
                return Vec::new();
            };
            let len = data.events.len();
            let start = (from.value() as usize).min(len);
            let end = (to.value() as usize).min(len).max(start);
            data.events[start..end].to_vec()
        })
        .await
    }

    async fn get_version_at(&self, stream: &str, at: DateTime<Utc>) -> Result<Option<Version>> {
        self.read(stream, |data| {
            data.and_then(|data| {
                data.events
                    .iter()
                    .filter(|e| e.created() <= at)
                    .map(StoredEvent::version)
                    .max()
            })
        })
        .await
    }

    async fn get_latest_snapshot(&self, stream: &str) -> Result<Option<Snapshot>> {
        self.read(stream, |data| {
            data.and_then(|data| data.snapshots.values().next_back().cloned())
        })
        .await
    }

    async fn get_snapshot_at(&self, stream: &str, at: DateTime<Utc>) -> Result<Option<Snapshot>> {
        self.read(stream, |data| {
            data.and_then(|data| {
                data.snapshots
                    .values()
                    .rev()
                    .find(|s| s.created() <= at)
                    .cloned()
            })
        })
        .await
    }

    async fn add_snapshot(&self, stream: &str, snapshot: Snapshot) -> Result<()> {
        ensure_stream_name(stream)?;
        self.write(StagedWrite::AddSnapshot {
            stream: stream.to_string(),
            snapshot,
        })
        .await
    }

    async fn start_transaction(&self) -> Result<()> {
        self.state.lock().await.begin()?;
        tracing::debug!(database = %self.db.name, "transaction started");
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let tx = state.finish()?;

        let mut committed = self.db.collections.write().await;
        let mut scratch = committed.scratch(tx.streams());
        for write in tx.staged() {
            if let Err(err) = scratch.apply(write) {
                tracing::warn!(
                    database = %self.db.name,
                    stream = write.stream(),
                    error = %err,
                    "transaction discarded at commit"
                );
                return Err(err);
            }
        }
        committed.merge(scratch);

        tracing::debug!(
            database = %self.db.name,
            writes = tx.len(),
            "transaction committed"
        );
        Ok(())
    }

    async fn abort_transaction(&self) -> Result<()> {
        let tx = self.state.lock().await.finish()?;
        tracing::debug!(
            database = %self.db.name,
            discarded = tx.len(),
            "transaction aborted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending(n: usize) -> Vec<PendingEvent> {
        (0..n)
            .map(|i| {
                PendingEvent::builder()
                    .event_type("Counter.Incremented")
                    .data(json!({ "n": i }))
                    .build()
            })
            .collect()
    }

    fn snapshot(version: u64) -> Snapshot {
        Snapshot::builder()
            .snapshot_type("Counter")
            .version(Version::from_value(version))
            .data(json!({ "value": version }))
            .build()
    }

    #[tokio::test]
    async fn create_stream_creates_snapshot_channel() {
        let store = InMemoryEventStore::new();
        store.create_stream("Counter-1").await.unwrap();

        assert!(store.stream_exists("Counter-1").await.unwrap());
        assert_eq!(
            store.database().collection_names().await,
            vec!["Counter-1".to_string(), "Counter-1_snapshots".to_string()]
        );

        let err = store.create_stream("Counter-1").await.unwrap_err();
        assert!(matches!(err, DomainError::StreamAlreadyExists { .. }));

        let err = store.create_stream("").await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidStreamName { .. }));
    }

    #[tokio::test]
    async fn append_assigns_contiguous_positions() {
        let store = InMemoryEventStore::new();
        store.create_stream("Counter-1").await.unwrap();

        let next = store
            .append_events("Counter-1", pending(3), Version::new())
            .await
            .unwrap();
        assert_eq!(next, Version::from_value(3));

        let next = store
            .append_events("Counter-1", pending(2), next)
            .await
            .unwrap();
        assert_eq!(next, Version::from_value(5));

        let events = store
            .get_event_range("Counter-1", Version::new(), Version::from_value(100))
            .await
            .unwrap();
        let positions: Vec<u64> = events.iter().map(|e| e.version().value()).collect();
        assert_eq!(positions, vec![0, 1, 2, 3, 4]);
        assert_eq!(store.get_stream_size("Counter-1").await.unwrap(), 5);
    }

    #[tokio::test]
    async fn append_failures() {
        let store = InMemoryEventStore::new();

        let err = store
            .append_events("Counter-1", pending(1), Version::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::StreamNotFound { .. }));

        store.create_stream("Counter-1").await.unwrap();
        let err = store
            .append_events("Counter-1", Vec::new(), Version::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::StreamEmpty { .. }));

        store
            .append_events("Counter-1", pending(2), Version::new())
            .await
            .unwrap();
        let err = store
            .append_events("Counter-1", pending(1), Version::from_value(1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::OptimisticConcurrencyConflict { expected, actual, .. }
                if expected == Version::from_value(1) && actual == Version::from_value(2)
        ));
        assert_eq!(store.get_stream_size("Counter-1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn missing_stream_reads_are_empty() {
        let store = InMemoryEventStore::new();
        assert!(!store.stream_exists("Counter-9").await.unwrap());
        assert_eq!(store.get_stream_size("Counter-9").await.unwrap(), 0);
        assert!(
            store
                .get_event_range("Counter-9", Version::new(), Version::from_value(10))
                .await
                .unwrap()
                .is_empty()
        );
        assert!(store.get_latest_snapshot("Counter-9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshots_are_validated_and_unique_per_version() {
        let store = InMemoryEventStore::new();
        store.create_stream("Counter-1").await.unwrap();
        store
            .append_events("Counter-1", pending(3), Version::new())
            .await
            .unwrap();

        store.add_snapshot("Counter-1", snapshot(2)).await.unwrap();
        store.add_snapshot("Counter-1", snapshot(3)).await.unwrap();

        let err = store.add_snapshot("Counter-1", snapshot(3)).await.unwrap_err();
        assert!(matches!(err, DomainError::SnapshotConflict { .. }));

        let err = store.add_snapshot("Counter-1", snapshot(4)).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidSnapshot { .. }));

        let foreign = Snapshot::builder()
            .snapshot_type("Order")
            .version(Version::from_value(1))
            .data(json!({}))
            .build();
        let err = store.add_snapshot("Counter-1", foreign).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidSnapshot { .. }));

        let nil = Snapshot::builder()
            .id(Uuid::nil())
            .snapshot_type("Counter")
            .version(Version::from_value(1))
            .data(json!({}))
            .build();
        let err = store.add_snapshot("Counter-1", nil).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidSnapshot { .. }));

        let latest = store.get_latest_snapshot("Counter-1").await.unwrap().unwrap();
        assert_eq!(latest.version(), Version::from_value(3));
    }

    #[tokio::test]
    async fn point_in_time_lookups() {
        let store = InMemoryEventStore::new();
        store.create_stream("Counter-1").await.unwrap();

        let t0 = Utc::now();
        let events: Vec<PendingEvent> = (0..4)
            .map(|i| {
                PendingEvent::builder()
                    .event_type("Counter.Incremented")
                    .created(t0 + chrono::Duration::seconds(i * 10))
                    .data(json!({}))
                    .build()
            })
            .collect();
        store
            .append_events("Counter-1", events, Version::new())
            .await
            .unwrap();

        let at = t0 + chrono::Duration::seconds(15);
        assert_eq!(
            store.get_version_at("Counter-1", at).await.unwrap(),
            Some(Version::from_value(1))
        );
        let before = t0 - chrono::Duration::seconds(1);
        assert_eq!(store.get_version_at("Counter-1", before).await.unwrap(), None);

        let snap = Snapshot::builder()
            .snapshot_type("Counter")
            .version(Version::from_value(1))
            .created(t0 + chrono::Duration::seconds(5))
            .data(json!({}))
            .build();
        store.add_snapshot("Counter-1", snap).await.unwrap();
        assert!(store.get_snapshot_at("Counter-1", t0).await.unwrap().is_none());
        assert_eq!(
            store
                .get_snapshot_at("Counter-1", at)
                .await
                .unwrap()
                .map(|s| s.version()),
            Some(Version::from_value(1))
        );
    }

    #[tokio::test]
    async fn transaction_reads_own_writes_and_commits_atomically() {
        let db = InMemoryDatabase::new("test");
        let session = db.session(SessionOptions::default());
        let observer = db.session(SessionOptions::default());

        session.start_transaction().await.unwrap();
        session.create_stream("Counter-1").await.unwrap();
        session
            .append_events("Counter-1", pending(2), Version::new())
            .await
            .unwrap();

        assert_eq!(session.get_stream_size("Counter-1").await.unwrap(), 2);
        assert!(!observer.stream_exists("Counter-1").await.unwrap());

        session.commit_transaction().await.unwrap();
        assert!(!session.in_transaction().await);
        assert_eq!(observer.get_stream_size("Counter-1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn abort_discards_staged_writes() {
        let store = InMemoryEventStore::new();
        store.create_stream("Counter-1").await.unwrap();

        store.start_transaction().await.unwrap();
        store
            .append_events("Counter-1", pending(2), Version::new())
            .await
            .unwrap();
        store.abort_transaction().await.unwrap();

        assert_eq!(store.get_stream_size("Counter-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn commit_conflict_discards_whole_transaction() {
        let db = InMemoryDatabase::new("test");
        let a = db.session(SessionOptions::default());
        let b = db.session(SessionOptions::default());
        a.create_stream("Counter-1").await.unwrap();
        a.create_stream("Counter-2").await.unwrap();

        a.start_transaction().await.unwrap();
        a.append_events("Counter-1", pending(1), Version::new())
            .await
            .unwrap();
        a.append_events("Counter-2", pending(1), Version::new())
            .await
            .unwrap();

        // 另一会话抢先占用 Counter-2 的位置 0
        b.append_events("Counter-2", pending(1), Version::new())
            .await
            .unwrap();

        let err = a.commit_transaction().await.unwrap_err();
        assert!(err.is_concurrency_conflict());
        assert!(!a.in_transaction().await);
        assert_eq!(b.get_stream_size("Counter-1").await.unwrap(), 0);
        assert_eq!(b.get_stream_size("Counter-2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn transaction_state_is_explicit() {
        let store = InMemoryEventStore::new();

        let err = store.commit_transaction().await.unwrap_err();
        assert!(matches!(err, DomainError::TransactionState { .. }));
        let err = store.abort_transaction().await.unwrap_err();
        assert!(matches!(err, DomainError::TransactionState { .. }));

        store.start_transaction().await.unwrap();
        let err = store.start_transaction().await.unwrap_err();
        assert!(matches!(err, DomainError::TransactionState { .. }));
    }
}
