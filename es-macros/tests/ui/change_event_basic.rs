use es_domain::domain_event::ChangeEvent;
use es_macros::change_event;

#[change_event(version = 1)]
enum BankEvent {
    #[event(event_type = "bank.opened")]
    Opened { name: String },
    #[event(event_type = "bank.renamed", event_version = 2)]
    Renamed { to: String },
    Closed,
}

fn main() {
    let id = uuid::Uuid::new_v4();
    let created = chrono::Utc::now();
    let opened = BankEvent::Opened {
        id,
        created,
        name: "alice".to_string(),
    };
    assert_eq!(opened.event_id(), id);
    assert_eq!(opened.created(), created);
    assert_eq!(opened.event_type(), "bank.opened");
    assert_eq!(opened.event_version(), 1);

    let renamed = BankEvent::Renamed {
        id,
        created,
        to: "bob".to_string(),
    };
    assert_eq!(renamed.event_version(), 2);

    // 单元变体展开为具名变体，默认类型为 EnumName.Variant
    let closed = BankEvent::Closed { id, created };
    assert_eq!(closed.event_type(), "BankEvent.Closed");

    assert_eq!(
        BankEvent::DISCRIMINATORS,
        &[
            ("bank.opened", 1),
            ("bank.renamed", 2),
            ("BankEvent.Closed", 1)
        ]
    );

    // 默认派生 Clone + PartialEq + Serialize
    assert_eq!(opened.clone(), opened);
    let _ = serde_json::to_value(&opened);
}
