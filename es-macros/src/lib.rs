use proc_macro::TokenStream;

mod change_event;
mod utils;
mod value_object;

/// 变更事件宏
///
/// 仅作用于枚举，每个变体都是一种状态变迁：
/// ```ignore
/// #[change_event(version = 1)]
/// pub enum CounterEvent {
///     #[event(event_type = "counter.incremented")]
///     Incremented { by: i64 },
///     Reset,
/// }
/// ```
/// - 为每个变体补齐 `id: Uuid`, `created: DateTime<Utc>` 字段（单元变体展开为具名变体）
/// - 实现 `::es_domain::domain_event::ChangeEvent`，含 `(event_type, event_version)` 判别符表
/// - 默认事件类型为 `EnumName.Variant`，默认版本取枚举级 `version`（缺省 1）
/// - 同一判别符重复出现时编译失败
#[proc_macro_attribute]
pub fn change_event(attr: TokenStream, item: TokenStream) -> TokenStream {
    change_event::expand(attr, item)
}

/// 值对象宏
/// - 合并派生 Default, Clone, Debug, Serialize, Deserialize, PartialEq, Eq
/// - `#[value_object(ordered = true)]` 追加 Copy, PartialOrd, Ord, Hash
/// - `#[value_object(debug = false)]` 不派生 Debug，便于自定义实现
#[proc_macro_attribute]
pub fn value_object(attr: TokenStream, item: TokenStream) -> TokenStream {
    value_object::expand(attr, item)
}
