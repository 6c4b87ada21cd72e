use crate::value_object::Version;

/// 快照节奏
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    Never,
    /// 自最近快照以来累积的事件数达到阈值时落盘
    Threshold(u64),
}

impl SnapshotPolicy {
    /// 默认阈值
    pub const DEFAULT_THRESHOLD: u64 = 128;

    pub fn should_snapshot(&self, stream_size: u64, latest_snapshot: Option<Version>) -> bool {
        match self {
            SnapshotPolicy::Never => false,
            SnapshotPolicy::Threshold(threshold) => {
                let threshold = (*threshold).max(1);
                let latest = latest_snapshot.map(|v| v.value()).unwrap_or(0);
                stream_size.saturating_sub(latest) >= threshold
            }
        }
    }
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        SnapshotPolicy::Threshold(Self::DEFAULT_THRESHOLD)
    }
}
