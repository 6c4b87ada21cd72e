//! 配置
//!
//! 仓储与存储的配置均提供 `Default` 与基于环境变量的加载：
//!
//! | 变量 | 含义 | 默认 |
//! |---|---|---|
//! | `ES_SNAPSHOT_THRESHOLD` | 快照阈值，0 表示不生成快照 | 128 |
//! | `ES_BATCH_LIMIT` | 单次保存的事件上限 | 128 |
//! | `ES_REPLAY_WINDOW` | `threshold` / `full` / 正整数（有界窗口大小） | `threshold` |
//! | `ES_COMMIT_MAX_ATTEMPTS` | 提交最大尝试次数 | 5 |
//! | `ES_COMMIT_INITIAL_DELAY_MS` | 首次重试等待 | 50 |
//! | `ES_COMMIT_MAX_DELAY_MS` | 重试等待上限 | 2000 |
//! | `ES_OPERATION_TIMEOUT_MS` | 单次存储调用超时 | 无 |
//! | `ES_DB_NAME` | 数据库名 | `event_store` |
//! | `ES_ENDPOINT` | 存储地址 | 无 |
//! | `ES_CAUSAL_CONSISTENCY` | 会话因果一致性 | `true` |
//! | `ES_READ_CONCERN` | `local` / `majority` / `snapshot` | `majority` |
//! | `ES_WRITE_CONCERN` | `acknowledged` / `majority` | `majority` |
//!
use crate::persist::SnapshotPolicy;
use crate::retry::RetryConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for environment variable {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("incompatible settings: {reason}")]
    Incompatible { reason: String },
}

/// `find_by_id` 的重放窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayWindow {
    /// 窗口等于快照阈值；不生成快照时重放到流末尾
    #[default]
    Threshold,
    /// 从当前版本起最多重放 n 个事件
    Bounded(u64),
    /// 重放到流末尾
    Full,
}

impl ReplayWindow {
    /// 按快照策略求出实际窗口（只会是 `Bounded` 或 `Full`）
    pub fn resolve(self, policy: SnapshotPolicy) -> Self {
        match (self, policy) {
            (ReplayWindow::Threshold, SnapshotPolicy::Threshold(n)) => {
                ReplayWindow::Bounded(n.max(1))
            }
            (ReplayWindow::Threshold, SnapshotPolicy::Never) => ReplayWindow::Full,
            (window, _) => window,
        }
    }
}

/// 仓储配置
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryConfig {
    pub snapshot_policy: SnapshotPolicy,
    /// 单次保存的事件数必须小于该值
    pub batch_limit: usize,
    pub replay_window: ReplayWindow,
    pub commit_retry: RetryConfig,
    /// 单次存储调用的超时
    pub operation_timeout: Option<Duration>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            snapshot_policy: SnapshotPolicy::default(),
            batch_limit: 128,
            replay_window: ReplayWindow::default(),
            commit_retry: RetryConfig::default(),
            operation_timeout: None,
        }
    }
}

impl RepositoryConfig {
    /// `find_by_id` 实际使用的重放窗口
    pub fn effective_replay_window(&self) -> ReplayWindow {
        self.replay_window.resolve(self.snapshot_policy)
    }

    /// 从进程环境变量加载
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 从任意键值来源加载，未设置的项取默认值
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let snapshot_policy = match parse_var::<u64, _>(&lookup, "ES_SNAPSHOT_THRESHOLD")? {
            Some(0) => SnapshotPolicy::Never,
            Some(n) => SnapshotPolicy::Threshold(n),
            None => defaults.snapshot_policy,
        };

        let batch_limit =
            parse_var(&lookup, "ES_BATCH_LIMIT")?.unwrap_or(defaults.batch_limit);

        let replay_window = match lookup("ES_REPLAY_WINDOW") {
            None => defaults.replay_window,
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "threshold" | "bounded" => ReplayWindow::Threshold,
                "full" => ReplayWindow::Full,
                other => match other.parse::<u64>() {
                    Ok(n) if n > 0 => ReplayWindow::Bounded(n),
                    _ => return Err(invalid("ES_REPLAY_WINDOW", raw)),
                },
            },
        };

        let commit_retry = RetryConfig {
            max_attempts: parse_var(&lookup, "ES_COMMIT_MAX_ATTEMPTS")?
                .unwrap_or(defaults.commit_retry.max_attempts),
            initial_delay: parse_var(&lookup, "ES_COMMIT_INITIAL_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.commit_retry.initial_delay),
            max_delay: parse_var(&lookup, "ES_COMMIT_MAX_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.commit_retry.max_delay),
            multiplier: defaults.commit_retry.multiplier,
        };

        let operation_timeout =
            parse_var(&lookup, "ES_OPERATION_TIMEOUT_MS")?.map(Duration::from_millis);

        // 窗口短于两次快照的间隔时，长流上的聚合无法加载到末尾
        if let ReplayWindow::Bounded(window) = replay_window {
            match snapshot_policy {
                SnapshotPolicy::Never => {
                    return Err(ConfigError::Incompatible {
                        reason: format!(
                            "ES_REPLAY_WINDOW={window} requires snapshots, but ES_SNAPSHOT_THRESHOLD disables them"
                        ),
                    });
                }
                SnapshotPolicy::Threshold(threshold) if window < threshold => {
                    tracing::warn!(
                        window,
                        threshold,
                        "replay window is smaller than the snapshot threshold, long streams will load truncated"
                    );
                }
                SnapshotPolicy::Threshold(_) => {}
            }
        }

        Ok(Self {
            snapshot_policy,
            batch_limit,
            replay_window,
            commit_retry,
            operation_timeout,
        })
    }
}

/// 读关注级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadConcern {
    Local,
    #[default]
    Majority,
    Snapshot,
}

impl FromStr for ReadConcern {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(ReadConcern::Local),
            "majority" => Ok(ReadConcern::Majority),
            "snapshot" => Ok(ReadConcern::Snapshot),
            _ => Err(()),
        }
    }
}

/// 写关注级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteConcern {
    Acknowledged,
    #[default]
    Majority,
}

impl FromStr for WriteConcern {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acknowledged" => Ok(WriteConcern::Acknowledged),
            "majority" => Ok(WriteConcern::Majority),
            _ => Err(()),
        }
    }
}

/// 存储会话选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub causal_consistency: bool,
    pub read_concern: ReadConcern,
    pub write_concern: WriteConcern,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            causal_consistency: true,
            read_concern: ReadConcern::default(),
            write_concern: WriteConcern::default(),
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub database_name: String,
    pub endpoint: Option<String>,
    pub session: SessionOptions,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_name: "event_store".to_string(),
            endpoint: None,
            session: SessionOptions::default(),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let database_name = lookup("ES_DB_NAME")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.database_name);
        let endpoint = lookup("ES_ENDPOINT").filter(|s| !s.trim().is_empty());

        let session = SessionOptions {
            causal_consistency: parse_var(&lookup, "ES_CAUSAL_CONSISTENCY")?
                .unwrap_or(defaults.session.causal_consistency),
            read_concern: parse_var(&lookup, "ES_READ_CONCERN")?
                .unwrap_or(defaults.session.read_concern),
            write_concern: parse_var(&lookup, "ES_WRITE_CONCERN")?
                .unwrap_or(defaults.session.write_concern),
        };

        Ok(Self {
            database_name,
            endpoint,
            session,
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(name, raw)),
    }
}

fn invalid(name: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidValue { name, value }
}
