//! 事件存储协议
//!
//! 流是按位置严格有序、只追加的事件序列；位置唯一性是唯一的冲突机制。
//! 每条流伴随一个 `{stream}_snapshots` 快照通道。
//!
use crate::{
    domain_event::{ChangeEvent, EventRegistry},
    error::{DomainError, DomainResult as Result},
    persist::{PendingEvent, Snapshot, StoredEvent},
    value_object::Version,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// 快照通道名
pub fn snapshot_channel(stream: &str) -> String {
    format!("{stream}_snapshots")
}

pub(crate) fn ensure_stream_name(stream: &str) -> Result<()> {
    if stream.trim().is_empty() {
        return Err(DomainError::InvalidStreamName {
            reason: "stream name must not be empty".to_string(),
        });
    }
    Ok(())
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// 创建空流及其快照通道
    async fn create_stream(&self, stream: &str) -> Result<()>;

    async fn stream_exists(&self, stream: &str) -> Result<bool>;

    /// 从 `expected` 开始为事件分配连续位置，返回追加后的下一个版本
    async fn append_events(
        &self,
        stream: &str,
        events: Vec<PendingEvent>,
        expected: Version,
    ) -> Result<Version>;

    async fn get_stream_size(&self, stream: &str) -> Result<u64>;

    /// 读取 `[from, to)` 范围内的事件，按位置升序
    async fn get_event_range(&self, stream: &str, from: Version, to: Version)
    -> Result<Vec<StoredEvent>>;

    /// `created <= at` 的最大位置
    async fn get_version_at(&self, stream: &str, at: DateTime<Utc>) -> Result<Option<Version>>;

    async fn get_latest_snapshot(&self, stream: &str) -> Result<Option<Snapshot>>;

    /// `created <= at` 的最高版本快照
    async fn get_snapshot_at(&self, stream: &str, at: DateTime<Utc>) -> Result<Option<Snapshot>>;

    async fn add_snapshot(&self, stream: &str, snapshot: Snapshot) -> Result<()>;

    async fn start_transaction(&self) -> Result<()>;

    async fn commit_transaction(&self) -> Result<()>;

    async fn abort_transaction(&self) -> Result<()>;
}

#[async_trait]
pub trait EventStoreExt: EventStore {
    /// 读取 `[from, to)` 并通过注册表解码
    async fn get_events<E: ChangeEvent>(
        &self,
        stream: &str,
        from: Version,
        to: Version,
        registry: &EventRegistry<E>,
    ) -> Result<Vec<E>> {
        let stored = self.get_event_range(stream, from, to).await?;
        registry.decode_all(&stored)
    }
}

#[async_trait]
impl<T> EventStore for Arc<T>
where
    T: EventStore + ?Sized,
{
    async fn create_stream(&self, stream: &str) -> Result<()> {
        (**self).create_stream(stream).await
    }

    async fn stream_exists(&self, stream: &str) -> Result<bool> {
        (**self).stream_exists(stream).await
    }

    async fn append_events(
        &self,
        stream: &str,
        events: Vec<PendingEvent>,
        expected: Version,
    ) -> Result<Version> {
        (**self).append_events(stream, events, expected).await
    }

    async fn get_stream_size(&self, stream: &str) -> Result<u64> {
        (**self).get_stream_size(stream).await
    }

    async fn get_event_range(
        &self,
        stream: &str,
        from: Version,
        to: Version,
    ) -> Result<Vec<StoredEvent>> {
        (**self).get_event_range(stream, from, to).await
    }

    async fn get_version_at(&self, stream: &str, at: DateTime<Utc>) -> Result<Option<Version>> {
        (**self).get_version_at(stream, at).await
    }

    async fn get_latest_snapshot(&self, stream: &str) -> Result<Option<Snapshot>> {
        (**self).get_latest_snapshot(stream).await
    }

    async fn get_snapshot_at(&self, stream: &str, at: DateTime<Utc>) -> Result<Option<Snapshot>> {
        (**self).get_snapshot_at(stream, at).await
    }

    async fn add_snapshot(&self, stream: &str, snapshot: Snapshot) -> Result<()> {
        (**self).add_snapshot(stream, snapshot).await
    }

    async fn start_transaction(&self) -> Result<()> {
        (**self).start_transaction().await
    }

    async fn commit_transaction(&self) -> Result<()> {
        (**self).commit_transaction().await
    }

    async fn abort_transaction(&self) -> Result<()> {
        (**self).abort_transaction().await
    }
}

#[async_trait]
impl<T> EventStoreExt for T where T: EventStore + ?Sized {}
