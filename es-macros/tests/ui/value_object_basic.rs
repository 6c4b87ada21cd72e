use es_macros::value_object;
use std::collections::BTreeSet;

#[value_object]
struct Amount {
    value: i64,
}

#[value_object(debug = false)]
struct Opaque(i32);

impl std::fmt::Debug for Opaque {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Opaque(..)")
    }
}

#[value_object(ordered = true)]
struct Position(u64);

#[value_object]
enum Level {
    #[default]
    Low,
    High,
}

fn main() {
    let _ = format!("{:?}", Amount { value: 0 });
    let a = Amount::default();
    assert_eq!(a.clone(), Amount { value: 0 });

    let _ = format!("{:?}", Opaque(1));

    // ordered：Copy + Ord + Hash
    let p = Position(2);
    let q = p;
    assert!(Position(1) < q);
    let set: BTreeSet<Position> = [Position(3), p].into_iter().collect();
    assert_eq!(set.len(), 2);

    let lv: Level = Default::default();
    assert_eq!(lv, Level::Low);
    assert_ne!(lv, Level::High);
}
