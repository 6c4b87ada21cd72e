//! 事件溯源聚合持久化引擎（es-domain）
//!
//! 以只追加、严格有序的事件流保存聚合历史，并提供：
//! - 聚合（`aggregate`）：事件重放推导状态，记录待持久化变更；
//! - 变更事件（`domain_event`）与显式的版本化事件注册表；
//! - 事件存储协议、内存参考实现与仓储编排（`persist`）：
//!   乐观并发、快照节奏、时间点重建、多聚合事务；
//! - 配置（`config`）与瞬时故障重试（`retry`）。
//!
//! 典型用法：
//! 1. 为状态类型实现 `EventSourced`，用 `#[change_event]` 定义事件枚举；
//! 2. 选择 `EventStore` 实现（例如 `InMemoryEventStore`）构建 `EventSourcedRepository`；
//! 3. `find_by_id` 加载，`causes`/`handle` 变更，`save` 保存。
//!
pub mod aggregate;
pub mod config;
pub mod domain_event;
pub mod error;
pub mod persist;
pub mod retry;
pub mod value_object;

pub use chrono;
pub use es_macros::{change_event, value_object};
pub use uuid;

// 允许在本 crate 内部通过 ::es_domain 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::es_domain 路径。
extern crate self as es_domain;
