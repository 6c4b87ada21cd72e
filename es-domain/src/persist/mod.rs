//! 持久化与事件溯源（persist）
//!
//! - 事件与快照的持久化模型（`PendingEvent`/`StoredEvent`/`Snapshot`）；
//! - 事件存储协议（`EventStore`）及其内存参考实现（`InMemoryEventStore`）；
//! - 快照节奏（`SnapshotPolicy`）与会话状态（`SessionState`）；
//! - 编排加载/保存/事务的仓储（`EventSourcedRepository`）。
//!
mod event_store;
mod inmemory_store;
mod repository;
mod session;
mod snapshot;
mod snapshot_policy;
mod stored_event;

pub use event_store::{EventStore, EventStoreExt, snapshot_channel};
pub use inmemory_store::{InMemoryDatabase, InMemoryEventStore};
pub use repository::EventSourcedRepository;
pub use session::{SessionState, Transaction};
pub use snapshot::Snapshot;
pub use snapshot_policy::SnapshotPolicy;
pub use stored_event::{PendingEvent, StoredEvent};
