//! 值对象（Value Object）
//!
//! 流位置/聚合版本号 `Version` 与聚合标识 `AggregateId`。
//!

use std::fmt;
use std::str::FromStr;

use es_macros::value_object;
use uuid::Uuid;

use crate::error::DomainError;

/// 版本号（流位置 / 聚合已应用事件数）
///
/// # 示例
///
/// ```
/// use es_domain::value_object::Version;
///
/// let v1 = Version::new();
/// assert_eq!(v1.value(), 0);
/// assert!(v1.is_new());
///
/// let v2 = v1.next();
/// assert_eq!(v2.value(), 1);
/// assert!(v2 > v1);
/// ```
#[value_object(ordered = true)]
pub struct Version(u64);

impl Version {
    /// 初始版本（0）
    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn from_value(value: u64) -> Self {
        Self(value)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub fn is_new(&self) -> bool {
        self.0 == 0
    }

    /// 是否已有事件（版本大于零）
    pub fn is_created(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self::from_value(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.value()
    }
}

/// 聚合标识（不透明 128 位标识，nil 视为空）
///
/// ```
/// use es_domain::value_object::AggregateId;
///
/// let id = AggregateId::new();
/// assert!(!id.is_empty());
/// assert!(AggregateId::default().is_empty());
/// ```
#[value_object(ordered = true)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// 生成新的随机标识
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AggregateId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse::<Uuid>()?))
    }
}

impl From<Uuid> for AggregateId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}
