//! 事件溯源引擎统一错误定义
//!
//! 校验类错误在本地产生且不可重试；并发冲突可单独识别；
//! 仅 `TransientStore` 会被提交重试吸收。
//!
use crate::config::ConfigError;
use crate::value_object::Version;
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DomainError {
    // --- 校验 ---
    #[error("invalid aggregate identifier: {reason}")]
    InvalidIdentifier { reason: String },
    #[error("invalid stream name: {reason}")]
    InvalidStreamName { reason: String },
    #[error("no events to append to stream {stream}")]
    StreamEmpty { stream: String },
    #[error("stream not found: {stream}")]
    StreamNotFound { stream: String },
    #[error("stream already exists: {stream}")]
    StreamAlreadyExists { stream: String },
    #[error("batch limit exceeded: pending={pending}, limit={limit}")]
    BatchLimitExceeded { pending: usize, limit: usize },

    // --- 并发/存储 ---
    #[error(
        "optimistic concurrency conflict on {stream}: expected={expected}, actual={actual}"
    )]
    OptimisticConcurrencyConflict {
        stream: String,
        expected: Version,
        actual: Version,
    },
    #[error("transient store failure: {reason}")]
    TransientStore { reason: String },
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<DomainError>,
    },
    #[error("invalid transaction state: {reason}")]
    TransactionState { reason: String },

    // --- 快照 ---
    #[error("invalid snapshot for {stream}: {reason}")]
    InvalidSnapshot { stream: String, reason: String },
    #[error("snapshot already exists for {stream} at {version}")]
    SnapshotConflict { stream: String, version: Version },

    // --- 序列化/事件解析 ---
    #[error("unknown event type: type={event_type}, version={event_version}")]
    UnknownEventType {
        event_type: String,
        event_version: u32,
    },
    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch { expected: String, found: String },
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 取消/超时 ---
    #[error("operation cancelled: {operation}")]
    Cancelled { operation: String },
    #[error("deadline exceeded: {operation}")]
    DeadlineExceeded { operation: String },

    // --- 配置 ---
    #[error("configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },
}

impl DomainError {
    /// 是否为可重试的瞬时故障
    pub fn is_transient(&self) -> bool {
        matches!(self, DomainError::TransientStore { .. })
    }

    /// 是否为乐观并发冲突（含快照版本冲突）
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            DomainError::OptimisticConcurrencyConflict { .. }
                | DomainError::SnapshotConflict { .. }
        )
    }
}

/// 统一 Result 类型别名
pub type DomainResult<T> = Result<T, DomainError>;

impl From<uuid::Error> for DomainError {
    fn from(err: uuid::Error) -> Self {
        DomainError::InvalidIdentifier {
            reason: err.to_string(),
        }
    }
}
