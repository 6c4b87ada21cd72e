//! 集成测试共用的聚合与存储替身
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use es_domain::aggregate::{Aggregate, EventSourced};
use es_domain::change_event;
use es_domain::config::RepositoryConfig;
use es_domain::error::{DomainError, DomainResult};
use es_domain::persist::{
    EventSourcedRepository, EventStore, InMemoryEventStore, PendingEvent, Snapshot, StoredEvent,
};
use es_domain::retry::RetryConfig;
use es_domain::value_object::{AggregateId, Version};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counter {
    pub value: i64,
}

#[derive(Debug)]
pub enum CounterCommand {
    Increment(i64),
    Decrement(i64),
}

#[change_event]
pub enum CounterEvent {
    #[event(event_type = "counter.incremented")]
    Incremented { by: i64 },
    #[event(event_type = "counter.decremented")]
    Decremented { by: i64 },
}

#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("counter would go below zero: value={value}, by={by}")]
    BelowZero { value: i64, by: i64 },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl EventSourced for Counter {
    const TYPE: &'static str = "Counter";
    type Event = CounterEvent;
    type Command = CounterCommand;
    type Error = CounterError;

    fn when(&mut self, event: &Self::Event) {
        match event {
            CounterEvent::Incremented { by, .. } => self.value += by,
            CounterEvent::Decremented { by, .. } => self.value -= by,
        }
    }

    fn execute(&self, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            CounterCommand::Increment(by) => Ok(vec![incremented(by)]),
            CounterCommand::Decrement(by) if by > self.value => Err(CounterError::BelowZero {
                value: self.value,
                by,
            }),
            CounterCommand::Decrement(by) => Ok(vec![CounterEvent::Decremented {
                id: Uuid::new_v4(),
                created: Utc::now(),
                by,
            }]),
        }
    }
}

pub fn incremented(by: i64) -> CounterEvent {
    incremented_at(by, Utc::now())
}

pub fn incremented_at(by: i64, created: DateTime<Utc>) -> CounterEvent {
    CounterEvent::Incremented {
        id: Uuid::new_v4(),
        created,
        by,
    }
}

/// 重试等待缩短到毫秒级
pub fn fast_config() -> RepositoryConfig {
    RepositoryConfig {
        commit_retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
        },
        ..RepositoryConfig::default()
    }
}

pub type CounterRepository<T> = EventSourcedRepository<Counter, T>;

pub fn repository<T: EventStore>(store: Arc<T>) -> CounterRepository<T> {
    EventSourcedRepository::new(store, fast_config())
}

/// 绕过仓储直接向流写入 `n` 个增量事件（不受批量上限约束）
pub async fn seed_events<T: EventStore>(store: &T, id: &AggregateId, n: u64) -> DomainResult<()> {
    let stream = format!("{}-{}", Counter::TYPE, id);
    if !store.stream_exists(&stream).await? {
        store.create_stream(&stream).await?;
    }
    let start = store.get_stream_size(&stream).await?;
    let events: Vec<CounterEvent> = (0..n).map(|_| incremented(1)).collect();
    store
        .append_events(
            &stream,
            PendingEvent::from_events(&events)?,
            Version::from_value(start),
        )
        .await?;
    Ok(())
}

/// 新建并创建流的聚合
pub async fn new_counter<T: EventStore>(repo: &CounterRepository<T>) -> DomainResult<Aggregate<Counter>> {
    let aggregate = Aggregate::<Counter>::new(AggregateId::new());
    repo.add(&aggregate).await?;
    Ok(aggregate)
}

/// 记录写入次数并可注入故障的存储包装
#[derive(Debug, Default)]
pub struct SpyStore {
    pub inner: InMemoryEventStore,
    pub appends: AtomicU32,
    pub snapshots_added: AtomicU32,
    pub commit_attempts: AtomicU32,
    /// 接下来的若干次提交返回瞬时故障
    pub transient_commit_failures: AtomicU32,
    /// 读取最新快照前的人为延迟（毫秒）
    pub read_delay_ms: AtomicU64,
    /// 写快照前由“另一个写入者”抢先写入同版本快照
    pub race_snapshots: AtomicBool,
}

impl SpyStore {
    pub fn new(inner: InMemoryEventStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn writes(&self) -> u32 {
        self.appends.load(Ordering::SeqCst) + self.snapshots_added.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for SpyStore {
    async fn create_stream(&self, stream: &str) -> DomainResult<()> {
        self.inner.create_stream(stream).await
    }

    async fn stream_exists(&self, stream: &str) -> DomainResult<bool> {
        self.inner.stream_exists(stream).await
    }

    async fn append_events(
        &self,
        stream: &str,
        events: Vec<PendingEvent>,
        expected: Version,
    ) -> DomainResult<Version> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        self.inner.append_events(stream, events, expected).await
    }

    async fn get_stream_size(&self, stream: &str) -> DomainResult<u64> {
        self.inner.get_stream_size(stream).await
    }

    async fn get_event_range(
        &self,
        stream: &str,
        from: Version,
        to: Version,
    ) -> DomainResult<Vec<StoredEvent>> {
        self.inner.get_event_range(stream, from, to).await
    }

    async fn get_version_at(
        &self,
        stream: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<Option<Version>> {
        self.inner.get_version_at(stream, at).await
    }

    async fn get_latest_snapshot(&self, stream: &str) -> DomainResult<Option<Snapshot>> {
        let delay = self.read_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.get_latest_snapshot(stream).await
    }

    async fn get_snapshot_at(
        &self,
        stream: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<Option<Snapshot>> {
        self.inner.get_snapshot_at(stream, at).await
    }

    async fn add_snapshot(&self, stream: &str, snapshot: Snapshot) -> DomainResult<()> {
        if self.race_snapshots.load(Ordering::SeqCst) {
            let rival = Snapshot::builder()
                .snapshot_type(snapshot.snapshot_type())
                .version(snapshot.version())
                .data(snapshot.data().clone())
                .build();
            self.inner.add_snapshot(stream, rival).await?;
        }
        self.snapshots_added.fetch_add(1, Ordering::SeqCst);
        self.inner.add_snapshot(stream, snapshot).await
    }

    async fn start_transaction(&self) -> DomainResult<()> {
        self.inner.start_transaction().await
    }

    async fn commit_transaction(&self) -> DomainResult<()> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.transient_commit_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_commit_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(DomainError::TransientStore {
                reason: "transient transaction error".to_string(),
            });
        }
        self.inner.commit_transaction().await
    }

    async fn abort_transaction(&self) -> DomainResult<()> {
        self.inner.abort_transaction().await
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
