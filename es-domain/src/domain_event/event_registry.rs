use super::ChangeEvent;
use crate::error::{DomainError, DomainResult};
use crate::persist::StoredEvent;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// 从存储载荷解码为事件的函数
pub type EventDecoder<E> = Arc<dyn Fn(Value) -> DomainResult<E> + Send + Sync>;

/// 事件注册表：`(event_type, event_version)` -> 解码器
///
/// 存储中的判别符必须在此显式注册才能被重放；旧版本载荷可注册自定义解码器，
/// 在解码时完成迁移。
pub struct EventRegistry<E> {
    decoders: HashMap<(String, u32), EventDecoder<E>>,
}

impl<E: ChangeEvent> EventRegistry<E> {
    /// 空注册表
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// 以事件枚举自身的判别符表构建注册表
    pub fn for_events() -> Self {
        let mut registry = Self::new();
        for (event_type, event_version) in E::DISCRIMINATORS {
            let expected_type = *event_type;
            let expected_version = *event_version;
            registry.decoders.insert(
                (expected_type.to_string(), expected_version),
                Arc::new(move |data: Value| -> DomainResult<E> {
                    let event: E = serde_json::from_value(data)?;
                    if event.event_type() != expected_type
                        || event.event_version() != expected_version
                    {
                        return Err(DomainError::TypeMismatch {
                            expected: format!("{expected_type}@{expected_version}"),
                            found: format!("{}@{}", event.event_type(), event.event_version()),
                        });
                    }
                    Ok(event)
                }),
            );
        }
        registry
    }

    /// 注册（或覆盖）一个判别符的解码器
    pub fn register<F>(&mut self, event_type: impl Into<String>, event_version: u32, decoder: F)
    where
        F: Fn(Value) -> DomainResult<E> + Send + Sync + 'static,
    {
        self.decoders
            .insert((event_type.into(), event_version), Arc::new(decoder));
    }

    /// 链式注册
    pub fn with<F>(mut self, event_type: impl Into<String>, event_version: u32, decoder: F) -> Self
    where
        F: Fn(Value) -> DomainResult<E> + Send + Sync + 'static,
    {
        self.register(event_type, event_version, decoder);
        self
    }

    pub fn resolves(&self, event_type: &str, event_version: u32) -> bool {
        self.decoders
            .contains_key(&(event_type.to_string(), event_version))
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// 解码单个存储事件
    pub fn decode(&self, stored: &StoredEvent) -> DomainResult<E> {
        let key = (stored.event_type().to_string(), stored.event_version());
        let decoder = self
            .decoders
            .get(&key)
            .ok_or_else(|| DomainError::UnknownEventType {
                event_type: key.0.clone(),
                event_version: key.1,
            })?;
        decoder(stored.data().clone())
    }

    /// 按顺序解码一批存储事件
    pub fn decode_all(&self, stored: &[StoredEvent]) -> DomainResult<Vec<E>> {
        stored.iter().map(|s| self.decode(s)).collect()
    }
}

impl<E: ChangeEvent> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::for_events()
    }
}

impl<E> Clone for EventRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            decoders: self.decoders.clone(),
        }
    }
}

impl<E> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.decoders.keys().collect();
        keys.sort();
        f.debug_struct("EventRegistry")
            .field("discriminators", &keys)
            .finish()
    }
}
