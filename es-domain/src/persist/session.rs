//! 存储会话状态
//!
//! 每个会话同一时刻至多一个活动事务；事务内的写入先暂存，提交时整体生效。
//!
use crate::{
    error::{DomainError, DomainResult as Result},
    persist::{Snapshot, StoredEvent},
    value_object::Version,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// 单个写操作
#[derive(Debug, Clone)]
pub(crate) enum StagedWrite {
    CreateStream {
        stream: String,
    },
    Append {
        stream: String,
        expected: Version,
        events: Vec<StoredEvent>,
    },
    AddSnapshot {
        stream: String,
        snapshot: Snapshot,
    },
}

impl StagedWrite {
    pub(crate) fn stream(&self) -> &str {
        match self {
            StagedWrite::CreateStream { stream }
            | StagedWrite::Append { stream, .. }
            | StagedWrite::AddSnapshot { stream, .. } => stream,
        }
    }
}

/// 进行中的事务
#[derive(Debug)]
pub struct Transaction {
    started: DateTime<Utc>,
    staged: Vec<StagedWrite>,
}

impl Transaction {
    fn new() -> Self {
        Self {
            started: Utc::now(),
            staged: Vec::new(),
        }
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// 已暂存的写操作数
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub(crate) fn stage(&mut self, write: StagedWrite) {
        self.staged.push(write);
    }

    pub(crate) fn staged(&self) -> &[StagedWrite] {
        &self.staged
    }

    pub(crate) fn staged_for<'a>(
        &'a self,
        stream: &'a str,
    ) -> impl Iterator<Item = &'a StagedWrite> + 'a {
        self.staged.iter().filter(move |w| w.stream() == stream)
    }

    /// 事务涉及的流
    pub(crate) fn streams(&self) -> BTreeSet<&str> {
        self.staged.iter().map(StagedWrite::stream).collect()
    }
}

/// 会话状态机：`Idle` <-> `InTransaction`
#[derive(Debug, Default)]
pub enum SessionState {
    #[default]
    Idle,
    InTransaction(Transaction),
}

impl SessionState {
    pub fn is_in_transaction(&self) -> bool {
        matches!(self, SessionState::InTransaction(_))
    }

    /// Idle -> InTransaction
    pub(crate) fn begin(&mut self) -> Result<()> {
        if self.is_in_transaction() {
            return Err(DomainError::TransactionState {
                reason: "a transaction is already active on this session".to_string(),
            });
        }
        *self = SessionState::InTransaction(Transaction::new());
        Ok(())
    }

    /// InTransaction -> Idle，交出事务以便提交或丢弃
    pub(crate) fn finish(&mut self) -> Result<Transaction> {
        match std::mem::take(self) {
            SessionState::InTransaction(tx) => Ok(tx),
            SessionState::Idle => Err(DomainError::TransactionState {
                reason: "no active transaction on this session".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_twice_is_rejected() {
        let mut state = SessionState::default();
        state.begin().unwrap();
        assert!(state.is_in_transaction());

        let err = state.begin().unwrap_err();
        assert!(matches!(err, DomainError::TransactionState { .. }));
        assert!(state.is_in_transaction());
    }

    #[test]
    fn finish_returns_to_idle() {
        let mut state = SessionState::default();
        state.begin().unwrap();
        if let SessionState::InTransaction(tx) = &mut state {
            tx.stage(StagedWrite::CreateStream {
                stream: "Counter-1".into(),
            });
        }

        let tx = state.finish().unwrap();
        assert_eq!(tx.len(), 1);
        assert_eq!(tx.streams().into_iter().collect::<Vec<_>>(), vec!["Counter-1"]);
        assert!(!state.is_in_transaction());
    }

    #[test]
    fn finish_without_transaction_is_rejected() {
        let mut state = SessionState::Idle;
        assert!(matches!(
            state.finish(),
            Err(DomainError::TransactionState { .. })
        ));
    }
}
