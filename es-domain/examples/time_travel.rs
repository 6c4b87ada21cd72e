/// 时间点重建示例
/// 演示 find_by_id_and_time：按任意历史时刻重建聚合状态
use anyhow::Result as AnyResult;
use chrono::{DateTime, Duration, Utc};
use es_domain::aggregate::{Aggregate, EventSourced};
use es_domain::change_event;
use es_domain::config::RepositoryConfig;
use es_domain::error::DomainError;
use es_domain::persist::{EventSourcedRepository, InMemoryEventStore, SnapshotPolicy};
use es_domain::value_object::AggregateId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Thermostat {
    target: f64,
    changes: u32,
}

#[change_event]
enum ThermostatEvent {
    #[event(event_type = "thermostat.target_set")]
    TargetSet { target: f64 },
}

impl EventSourced for Thermostat {
    const TYPE: &'static str = "Thermostat";
    type Event = ThermostatEvent;
    type Command = f64;
    type Error = DomainError;

    fn when(&mut self, event: &Self::Event) {
        match event {
            ThermostatEvent::TargetSet { target, .. } => {
                self.target = *target;
                self.changes += 1;
            }
        }
    }

    fn execute(&self, target: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        Ok(vec![set_at(target, Utc::now())])
    }
}

fn set_at(target: f64, created: DateTime<Utc>) -> ThermostatEvent {
    ThermostatEvent::TargetSet {
        id: Uuid::new_v4(),
        created,
        target,
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let repo: EventSourcedRepository<Thermostat, _> = EventSourcedRepository::new(
        Arc::new(InMemoryEventStore::new()),
        RepositoryConfig {
            snapshot_policy: SnapshotPolicy::Threshold(4),
            ..RepositoryConfig::default()
        },
    );

    let mut thermostat = Aggregate::<Thermostat>::new(AggregateId::new());
    repo.add(&thermostat).await?;

    // 过去 24 小时每 3 小时调整一次温度
    let start = Utc::now() - Duration::hours(24);
    for step in 0..8 {
        let target = 18.0 + step as f64 * 0.5;
        thermostat.causes(set_at(target, start + Duration::hours(3 * step)));
    }
    repo.save(&mut thermostat).await?;
    thermostat.handle(23.0)?;
    repo.save(&mut thermostat).await?;

    for hours_ago in [25, 20, 12, 4, 0] {
        let at = Utc::now() - Duration::hours(hours_ago);
        match repo.find_by_id_and_time(thermostat.id(), at).await? {
            Some(past) => println!(
                "{hours_ago:>2} 小时前: target={:.1}, version={}, 调整次数={}",
                past.target,
                past.version(),
                past.changes
            ),
            None => println!("{hours_ago:>2} 小时前: 尚无记录"),
        }
    }
    Ok(())
}
