use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use uuid::Uuid;

/// 变更事件需要满足的能力边界
///
/// 通常由 `#[change_event]` 宏生成实现；事件词汇表是封闭枚举，
/// 状态迁移处理按变体穷尽匹配。
pub trait ChangeEvent:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 该事件枚举能产生的全部 `(event_type, event_version)` 判别符
    const DISCRIMINATORS: &'static [(&'static str, u32)];

    /// 事件唯一标识
    fn event_id(&self) -> Uuid;

    /// 事件创建时间
    fn created(&self) -> DateTime<Utc>;

    /// 事件类型判别符（形如 `CounterEvent.Incremented` 或自定义类型名）
    fn event_type(&self) -> &'static str;

    /// 事件载荷版本
    fn event_version(&self) -> u32;
}
