/// 银行账户示例
/// 演示聚合定义、命令处理、保存/加载、快照节奏与多聚合事务（转账）
/// 运行：RUST_LOG=debug cargo run --example bank_account
use anyhow::Result as AnyResult;
use chrono::Utc;
use es_domain::aggregate::{Aggregate, EventSourced};
use es_domain::change_event;
use es_domain::config::{RepositoryConfig, StoreConfig};
use es_domain::error::DomainError;
use es_domain::persist::{EventSourcedRepository, InMemoryDatabase};
use es_domain::value_object::AggregateId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ============================================================================
// 领域模型定义
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BankAccount {
    owner: String,
    balance: i64,
    open: bool,
}

#[derive(Debug)]
enum AccountCommand {
    Open { owner: String },
    Deposit { amount: i64 },
    Withdraw { amount: i64 },
}

#[change_event(version = 1)]
enum AccountEvent {
    #[event(event_type = "account.opened")]
    Opened { owner: String },
    #[event(event_type = "account.deposited")]
    Deposited { amount: i64 },
    #[event(event_type = "account.withdrawn")]
    Withdrawn { amount: i64 },
}

#[derive(Debug, thiserror::Error)]
enum AccountError {
    #[error("account is not open")]
    NotOpen,
    #[error("account already open")]
    AlreadyOpen,
    #[error("amount must be positive: {0}")]
    InvalidAmount(i64),
    #[error("insufficient funds: balance={balance}, requested={requested}")]
    InsufficientFunds { balance: i64, requested: i64 },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

fn stamp() -> (Uuid, chrono::DateTime<Utc>) {
    (Uuid::new_v4(), Utc::now())
}

impl EventSourced for BankAccount {
    const TYPE: &'static str = "BankAccount";
    type Event = AccountEvent;
    type Command = AccountCommand;
    type Error = AccountError;

    fn when(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::Opened { owner, .. } => {
                self.owner = owner.clone();
                self.open = true;
            }
            AccountEvent::Deposited { amount, .. } => self.balance += amount,
            AccountEvent::Withdrawn { amount, .. } => self.balance -= amount,
        }
    }

    fn execute(&self, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let (id, created) = stamp();
        match command {
            AccountCommand::Open { owner } => {
                if self.open {
                    return Err(AccountError::AlreadyOpen);
                }
                Ok(vec![AccountEvent::Opened { id, created, owner }])
            }
            AccountCommand::Deposit { amount } => {
                if !self.open {
                    return Err(AccountError::NotOpen);
                }
                if amount <= 0 {
                    return Err(AccountError::InvalidAmount(amount));
                }
                Ok(vec![AccountEvent::Deposited {
                    id,
                    created,
                    amount,
                }])
            }
            AccountCommand::Withdraw { amount } => {
                if !self.open {
                    return Err(AccountError::NotOpen);
                }
                if amount <= 0 {
                    return Err(AccountError::InvalidAmount(amount));
                }
                if amount > self.balance {
                    return Err(AccountError::InsufficientFunds {
                        balance: self.balance,
                        requested: amount,
                    });
                }
                Ok(vec![AccountEvent::Withdrawn {
                    id,
                    created,
                    amount,
                }])
            }
        }
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== 银行账户示例 ===\n");

    let store_config = StoreConfig::from_env()?;
    let repo_config = RepositoryConfig::from_env()?;
    let db = InMemoryDatabase::from_config(&store_config);
    let store = Arc::new(db.session(store_config.session));
    let repo: EventSourcedRepository<BankAccount, _> = EventSourcedRepository::new(store, repo_config);

    // 1. 开户并存入资金
    let mut alice = Aggregate::<BankAccount>::new(AggregateId::new());
    repo.add(&alice).await?;
    alice.handle(AccountCommand::Open {
        owner: "alice".to_string(),
    })?;
    alice.handle(AccountCommand::Deposit { amount: 1_000 })?;
    repo.save(&mut alice).await?;
    println!("alice 开户: balance={}, version={}", alice.balance, alice.version());

    let mut bob = Aggregate::<BankAccount>::new(AggregateId::new());
    repo.add(&bob).await?;
    bob.handle(AccountCommand::Open {
        owner: "bob".to_string(),
    })?;
    repo.save(&mut bob).await?;
    println!("bob 开户: balance={}, version={}", bob.balance, bob.version());

    // 2. 大量小额存款触发快照
    for _ in 0..3 {
        for _ in 0..60 {
            alice.handle(AccountCommand::Deposit { amount: 1 })?;
        }
        repo.save(&mut alice).await?;
    }
    let reloaded = repo
        .find_by_id(alice.id())
        .await?
        .ok_or_else(|| anyhow::anyhow!("alice not found"))?;
    println!(
        "alice 重新加载: balance={}, version={}, 快照版本={}",
        reloaded.balance,
        reloaded.version(),
        reloaded.initial_version()
    );

    // 3. 转账：两个账户在同一事务中提交
    let mut accounts = vec![reloaded, bob];
    repo.do_multi_transactional_work(&mut accounts, |accounts| {
        accounts[0].handle(AccountCommand::Withdraw { amount: 300 })?;
        accounts[1].handle(AccountCommand::Deposit { amount: 300 })?;
        Ok(())
    })
    .await?;
    println!(
        "转账后: alice={}, bob={}",
        accounts[0].balance, accounts[1].balance
    );

    // 4. 余额不足的转账整体回滚
    let result = repo
        .do_multi_transactional_work(&mut accounts, |accounts| {
            accounts[1].handle(AccountCommand::Deposit { amount: 10_000 })?;
            accounts[0].handle(AccountCommand::Withdraw { amount: 10_000 })?;
            Ok(())
        })
        .await;
    println!("超额转账: {:?}", result.err());

    let bob = repo
        .find_by_id(accounts[1].id())
        .await?
        .ok_or_else(|| anyhow::anyhow!("bob not found"))?;
    println!("bob 持久化余额未变: {}", bob.balance);

    println!("\n集合: {:?}", db.collection_names().await);
    Ok(())
}
