//! 快照持久化模型
//!
use crate::value_object::Version;
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 聚合在某个流版本上的压缩状态
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct Snapshot {
    #[builder(default = Uuid::new_v4())]
    id: Uuid,
    /// 聚合类型判别符
    #[builder(into)]
    snapshot_type: String,
    /// 快照覆盖的事件数（不超过捕获时的流长度）
    version: Version,
    #[builder(default = Utc::now())]
    created: DateTime<Utc>,
    data: Value,
}

impl Snapshot {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot_type(&self) -> &str {
        &self.snapshot_type
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
