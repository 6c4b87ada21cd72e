//! 事件溯源仓储
//!
//! 编排聚合的加载、保存、快照节奏与多聚合事务：
//! - 加载：最新快照 + 从快照版本起的事件重放；
//! - 保存：以已持久化版本为期望版本追加变更，必要时在流末尾生成快照；
//! - 事务：多个聚合的追加在同一事务中提交，失败时整体中止。
//!
//! 仓储发起的每次存储调用都受取消令牌与可选的单次超时约束。
//!
use crate::{
    aggregate::{Aggregate, EventSourced, stream_name},
    config::{ReplayWindow, RepositoryConfig},
    domain_event::EventRegistry,
    error::{DomainError, DomainResult},
    persist::{EventStore, EventStoreExt, PendingEvent},
    retry::retry_on_transient,
    value_object::{AggregateId, Version},
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct EventSourcedRepository<S, T>
where
    S: EventSourced,
    T: EventStore,
{
    store: Arc<T>,
    registry: EventRegistry<S::Event>,
    config: RepositoryConfig,
    cancellation: CancellationToken,
}

impl<S, T> EventSourcedRepository<S, T>
where
    S: EventSourced,
    T: EventStore,
{
    pub fn new(store: Arc<T>, config: RepositoryConfig) -> Self {
        Self {
            store,
            registry: EventRegistry::for_events(),
            config,
            cancellation: CancellationToken::new(),
        }
    }

    /// 替换事件注册表（例如追加旧版本事件的解码器）
    pub fn with_registry(mut self, registry: EventRegistry<S::Event>) -> Self {
        self.registry = registry;
        self
    }

    /// 绑定外部取消令牌
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn store(&self) -> &Arc<T> {
        &self.store
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn registry(&self) -> &EventRegistry<S::Event> {
        &self.registry
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// 加载聚合的当前状态
    #[tracing::instrument(skip_all, fields(aggregate = S::TYPE, id = %id))]
    pub async fn find_by_id(&self, id: &AggregateId) -> DomainResult<Option<Aggregate<S>>> {
        ensure_id(id)?;
        let stream = stream_name::<S>(id);

        let snapshot = self
            .guard("get_latest_snapshot", self.store.get_latest_snapshot(&stream))
            .await?;

        let mut aggregate = Aggregate::<S>::new(*id);
        if let Some(snapshot) = &snapshot {
            aggregate.load_from_snapshot(snapshot)?;
        }

        let window = self.config.effective_replay_window();
        let from = aggregate.version();
        let to = match window {
            ReplayWindow::Bounded(n) => Version::from_value(from.value().saturating_add(n)),
            _ => {
                let size = self
                    .guard("get_stream_size", self.store.get_stream_size(&stream))
                    .await?;
                Version::from_value(size.max(from.value()))
            }
        };

        let events = self
            .guard(
                "get_event_range",
                self.store.get_events(&stream, from, to, &self.registry),
            )
            .await?;

        if snapshot.is_none() && events.is_empty() {
            return Ok(None);
        }

        if let ReplayWindow::Bounded(n) = window {
            if events.len() as u64 >= n {
                let size = self
                    .guard("get_stream_size", self.store.get_stream_size(&stream))
                    .await?;
                if size > to.value() {
                    tracing::warn!(
                        stream = %stream,
                        replayed = events.len(),
                        stream_size = size,
                        "replay window truncated, aggregate is behind the stream end"
                    );
                }
            }
        }

        for event in &events {
            aggregate.apply(event);
        }

        tracing::debug!(
            version = %aggregate.version(),
            from_snapshot = snapshot.is_some(),
            replayed = events.len(),
            "aggregate loaded"
        );
        Ok(Some(aggregate))
    }

    /// 加载聚合在时间点 `at` 的状态
    #[tracing::instrument(skip_all, fields(aggregate = S::TYPE, id = %id, at = %at))]
    pub async fn find_by_id_and_time(
        &self,
        id: &AggregateId,
        at: DateTime<Utc>,
    ) -> DomainResult<Option<Aggregate<S>>> {
        ensure_id(id)?;
        let stream = stream_name::<S>(id);

        let snapshot = self
            .guard("get_snapshot_at", self.store.get_snapshot_at(&stream, at))
            .await?;
        let position = self
            .guard("get_version_at", self.store.get_version_at(&stream, at))
            .await?;

        if snapshot.is_none() && position.is_none() {
            return Ok(None);
        }

        let mut aggregate = Aggregate::<S>::new(*id);
        if let Some(snapshot) = &snapshot {
            aggregate.load_from_snapshot(snapshot)?;
        }

        // 含 `at` 之前的最后一个事件
        let from = aggregate.version();
        let to = position.map(|p| p.next()).unwrap_or(from);
        if to > from {
            let events = self
                .guard(
                    "get_event_range",
                    self.store.get_events(&stream, from, to, &self.registry),
                )
                .await?;
            for event in &events {
                aggregate.apply(event);
            }
        }

        Ok(Some(aggregate))
    }

    /// 为瞬态聚合创建流（不追加事件）
    #[tracing::instrument(skip_all, fields(aggregate = S::TYPE, id = %aggregate.id()))]
    pub async fn add(&self, aggregate: &Aggregate<S>) -> DomainResult<()> {
        ensure_id(aggregate.id())?;
        let stream = aggregate.stream_name();
        self.guard("create_stream", self.store.create_stream(&stream))
            .await?;
        tracing::debug!(stream = %stream, "stream created");
        Ok(())
    }

    /// 流是否已创建
    pub async fn exists(&self, id: &AggregateId) -> DomainResult<bool> {
        ensure_id(id)?;
        let stream = stream_name::<S>(id);
        self.guard("stream_exists", self.store.stream_exists(&stream))
            .await
    }

    /// 追加待持久化变更，并在达到阈值时生成快照
    #[tracing::instrument(
        skip_all,
        fields(aggregate = S::TYPE, id = %aggregate.id(), pending = aggregate.changes().len())
    )]
    pub async fn save(&self, aggregate: &mut Aggregate<S>) -> DomainResult<()> {
        if self.append_changes(aggregate).await?.is_none() {
            return Ok(());
        }
        aggregate.clear_changes();
        self.snapshot_if_due(aggregate.id()).await
    }

    pub async fn start_transaction(&self) -> DomainResult<()> {
        self.guard("start_transaction", self.store.start_transaction())
            .await
    }

    /// 提交当前事务，瞬时故障按配置重试
    pub async fn end_active_transaction_and_commit(&self) -> DomainResult<()> {
        retry_on_transient(&self.config.commit_retry, "commit_transaction", |_| {
            self.guard("commit_transaction", self.store.commit_transaction())
        })
        .await
    }

    pub async fn abort_active_transaction(&self) -> DomainResult<()> {
        self.guard("abort_transaction", self.store.abort_transaction())
            .await
    }

    /// 在单个事务中对多个聚合执行 `action` 并保存全部变更
    ///
    /// 任一环节失败都会中止事务并返回原始错误；变更仅在提交成功后清空，
    /// 因此调用方可以在失败后重试同一批聚合。
    #[tracing::instrument(skip_all, fields(aggregate = S::TYPE, count = aggregates.len()))]
    pub async fn do_multi_transactional_work<F>(
        &self,
        aggregates: &mut [Aggregate<S>],
        action: F,
    ) -> Result<(), S::Error>
    where
        F: FnOnce(&mut [Aggregate<S>]) -> Result<(), S::Error>,
        S::Error: From<DomainError>,
    {
        self.start_transaction().await?;

        let outcome = async {
            action(aggregates)?;
            for aggregate in aggregates.iter() {
                if self.append_changes(aggregate).await?.is_some() {
                    self.snapshot_if_due(aggregate.id()).await?;
                }
            }
            self.end_active_transaction_and_commit().await?;
            Ok::<(), S::Error>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                for aggregate in aggregates.iter_mut() {
                    aggregate.clear_changes();
                }
                tracing::debug!("multi-aggregate transaction committed");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "multi-aggregate work failed, aborting transaction");
                if let Err(abort_err) = self.abort_active_transaction().await {
                    tracing::warn!(error = %abort_err, "abort after failed work also failed");
                }
                Err(err)
            }
        }
    }

    /// 追加聚合的待持久化变更，返回追加后的流版本；无变更时返回 `None`
    async fn append_changes(&self, aggregate: &Aggregate<S>) -> DomainResult<Option<Version>> {
        ensure_id(aggregate.id())?;

        let pending = aggregate.changes().len();
        if pending == 0 {
            return Ok(None);
        }
        if pending >= self.config.batch_limit {
            return Err(DomainError::BatchLimitExceeded {
                pending,
                limit: self.config.batch_limit,
            });
        }

        let stream = aggregate.stream_name();
        let events = PendingEvent::from_events(aggregate.changes())?;
        let expected = aggregate.persisted_version();
        let next = self
            .guard(
                "append_events",
                self.store.append_events(&stream, events, expected),
            )
            .await?;

        tracing::debug!(stream = %stream, expected = %expected, next = %next, "changes appended");
        Ok(Some(next))
    }

    /// 自最新快照以来的事件数达到阈值时，完整重建聚合并在流末尾生成快照
    async fn snapshot_if_due(&self, id: &AggregateId) -> DomainResult<()> {
        let stream = stream_name::<S>(id);

        let size = self
            .guard("get_stream_size", self.store.get_stream_size(&stream))
            .await?;
        let latest = self
            .guard("get_latest_snapshot", self.store.get_latest_snapshot(&stream))
            .await?;

        if !self
            .config
            .snapshot_policy
            .should_snapshot(size, latest.as_ref().map(|s| s.version()))
        {
            return Ok(());
        }

        let mut full = Aggregate::<S>::new(*id);
        if let Some(snapshot) = &latest {
            full.load_from_snapshot(snapshot)?;
        }
        let events = self
            .guard(
                "get_event_range",
                self.store.get_events(
                    &stream,
                    full.version(),
                    Version::from_value(size),
                    &self.registry,
                ),
            )
            .await?;
        for event in &events {
            full.apply(event);
        }

        let snapshot = full.snapshot()?;
        let version = snapshot.version();
        match self
            .guard("add_snapshot", self.store.add_snapshot(&stream, snapshot))
            .await
        {
            Ok(()) => {
                tracing::info!(stream = %stream, version = %version, "snapshot created");
                Ok(())
            }
            Err(DomainError::SnapshotConflict { .. }) => {
                tracing::warn!(
                    stream = %stream,
                    version = %version,
                    "snapshot already taken by a concurrent writer, skipping"
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// 在取消令牌与单次超时约束下执行存储调用
    async fn guard<R, F>(&self, operation: &'static str, fut: F) -> DomainResult<R>
    where
        F: Future<Output = DomainResult<R>>,
    {
        let bounded = async {
            match self.config.operation_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(DomainError::DeadlineExceeded {
                        operation: operation.to_string(),
                    }),
                },
                None => fut.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(DomainError::Cancelled {
                operation: operation.to_string(),
            }),
            result = bounded => result,
        }
    }
}

fn ensure_id(id: &AggregateId) -> DomainResult<()> {
    if id.is_empty() {
        return Err(DomainError::InvalidIdentifier {
            reason: "aggregate id must not be nil".to_string(),
        });
    }
    Ok(())
}
