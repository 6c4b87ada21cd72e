//! 变更事件（Change Event）
//!
//! 定义事件载荷需要实现的最小接口（`ChangeEvent`），以及从存储判别符
//! `(event_type, event_version)` 到解码器的显式注册表（`EventRegistry`）。

mod change_event;
mod event_registry;

pub use change_event::ChangeEvent;
pub use event_registry::{EventDecoder, EventRegistry};
