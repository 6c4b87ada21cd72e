use es_domain::domain_event::ChangeEvent;
use es_macros::change_event;
use serde::{Deserialize, Serialize};

// 已手写字段与派生时保持原样，不重复追加
#[change_event(version = 3)]
#[derive(Debug, Clone, Serialize, Deserialize)]
enum LedgerEvent {
    Posted {
        amount: i64,
        id: es_domain::uuid::Uuid,
        created: es_domain::chrono::DateTime<es_domain::chrono::Utc>,
    },
}

fn main() {
    let e = LedgerEvent::Posted {
        amount: 10,
        id: uuid::Uuid::nil(),
        created: chrono::Utc::now(),
    };
    assert_eq!(e.event_version(), 3);
    assert_eq!(e.event_type(), "LedgerEvent.Posted");
}
