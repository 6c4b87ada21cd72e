//! 事件溯源聚合
//!
//! - `EventSourced` 描述用户状态类型：命令决策（`execute`）与状态迁移（`when`）；
//! - `Aggregate<S>` 是其内存实体：重放事件推导状态，并记录尚未持久化的变更。
//!
//! `causes` 是唯一的变更入口：事件先进入待持久化缓冲，再应用到状态，版本加一。
//!
use crate::domain_event::ChangeEvent;
use crate::error::{DomainError, DomainResult};
use crate::persist::Snapshot;
use crate::value_object::{AggregateId, Version};
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use std::error::Error;
use std::ops::Deref;

/// 事件溯源状态接口
pub trait EventSourced: Default + Serialize + DeserializeOwned + Send + Sync {
    /// 聚合类型名（流名前缀、快照类型）
    const TYPE: &'static str;

    /// 该聚合产生的变更事件
    type Event: ChangeEvent;
    /// 该聚合支持的命令
    type Command;
    /// 命令执行或持久化环节的错误类型
    type Error: Error + Send + Sync + 'static;

    /// 按标识构造初始状态
    fn create(_id: &AggregateId) -> Self {
        Self::default()
    }

    /// 状态迁移（纯函数式，不得失败）
    fn when(&mut self, event: &Self::Event);

    /// 执行命令，返回产生的事件（不改变状态）
    fn execute(&self, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

/// 聚合实例
#[derive(Debug, Clone)]
pub struct Aggregate<S: EventSourced> {
    id: AggregateId,
    version: Version,
    initial_version: Version,
    changes: Vec<S::Event>,
    state: S,
}

impl<S: EventSourced> Aggregate<S> {
    /// 新建瞬态聚合（版本 0，无变更）
    pub fn new(id: AggregateId) -> Self {
        Self {
            state: S::create(&id),
            id,
            version: Version::new(),
            initial_version: Version::new(),
            changes: Vec::new(),
        }
    }

    pub fn id(&self) -> &AggregateId {
        &self.id
    }

    /// 已应用的事件总数
    pub fn version(&self) -> Version {
        self.version
    }

    /// 最近一次加载快照时的版本
    pub fn initial_version(&self) -> Version {
        self.initial_version
    }

    /// 尚未持久化的事件
    pub fn changes(&self) -> &[S::Event] {
        &self.changes
    }

    /// 已持久化部分的版本，即追加时的期望版本
    pub fn persisted_version(&self) -> Version {
        Version::from_value(self.version.value() - self.changes.len() as u64)
    }

    pub fn is_transient(&self) -> bool {
        self.version.is_new() && self.changes.is_empty()
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// 流名：`{TYPE}-{id}`
    pub fn stream_name(&self) -> String {
        stream_name::<S>(&self.id)
    }

    /// 应用事件（重放或变更共用）
    pub fn apply(&mut self, event: &S::Event) {
        self.state.when(event);
        self.version = self.version.next();
    }

    /// 记录并应用一个新事件
    pub fn causes(&mut self, event: S::Event) {
        self.apply(&event);
        self.changes.push(event);
    }

    /// 执行命令并记录产生的全部事件
    pub fn handle(&mut self, command: S::Command) -> Result<(), S::Error> {
        for event in self.state.execute(command)? {
            self.causes(event);
        }
        Ok(())
    }

    /// 以当前版本生成快照
    pub fn snapshot(&self) -> DomainResult<Snapshot> {
        Ok(Snapshot::builder()
            .snapshot_type(S::TYPE)
            .version(self.version)
            .created(Utc::now())
            .data(serde_json::to_value(&self.state)?)
            .build())
    }

    /// 从快照恢复状态（不重放）
    pub fn load_from_snapshot(&mut self, snapshot: &Snapshot) -> DomainResult<()> {
        if snapshot.snapshot_type() != S::TYPE {
            return Err(DomainError::TypeMismatch {
                expected: S::TYPE.to_string(),
                found: snapshot.snapshot_type().to_string(),
            });
        }
        self.state = serde_json::from_value(snapshot.data().clone())?;
        self.version = snapshot.version();
        self.initial_version = snapshot.version();
        self.changes.clear();
        Ok(())
    }

    pub(crate) fn clear_changes(&mut self) {
        self.changes.clear();
    }
}

impl<S: EventSourced> Deref for Aggregate<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

/// 聚合流名：`{TYPE}-{id}`
pub fn stream_name<S: EventSourced>(id: &AggregateId) -> String {
    format!("{}-{}", S::TYPE, id)
}
