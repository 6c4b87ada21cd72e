//! 事件持久化模型
//!
//! `PendingEvent` 是待追加的事件（尚无流位置），`StoredEvent` 是已落入流中的事件。
//!
use crate::{
    domain_event::ChangeEvent,
    error::DomainResult,
    value_object::Version,
};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 待追加事件：位置与存储 id 由事件存储在追加时分配
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct PendingEvent {
    #[builder(into)]
    event_type: String,
    #[builder(default = 1)]
    event_version: u32,
    #[builder(default = Utc::now())]
    created: DateTime<Utc>,
    data: Value,
}

impl PendingEvent {
    /// 从变更事件构造
    pub fn from_event<E: ChangeEvent>(event: &E) -> DomainResult<Self> {
        Ok(Self {
            event_type: event.event_type().to_string(),
            event_version: event.event_version(),
            created: event.created(),
            data: serde_json::to_value(event)?,
        })
    }

    /// 批量构造，保持顺序
    pub fn from_events<E: ChangeEvent>(events: &[E]) -> DomainResult<Vec<Self>> {
        events.iter().map(Self::from_event).collect()
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// 在指定流位置落盘
    pub(crate) fn into_stored(self, id: Uuid, version: Version) -> StoredEvent {
        StoredEvent {
            id,
            event_type: self.event_type,
            event_version: self.event_version,
            version,
            created: self.created,
            data: self.data,
        }
    }
}

/// 已存储事件
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct StoredEvent {
    /// 存储分配的唯一标识
    id: Uuid,
    /// 类型判别符
    event_type: String,
    /// 载荷版本
    event_version: u32,
    /// 流内位置（从 0 开始，唯一且连续）
    version: Version,
    /// 事件创建时间
    created: DateTime<Utc>,
    /// 事件载荷
    data: Value,
}

impl StoredEvent {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn data(&self) -> &Value {
        &self.data
    }
}
