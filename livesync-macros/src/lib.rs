use proc_macro::TokenStream;

mod record;
mod utils;

/// 记录宏
/// - 合并派生：Debug, Clone, PartialEq, Serialize, Deserialize
/// - 为结构体实现 `::livesync_domain::record::Record`
/// - 结构体须包含 `id: String` 字段
///
/// 参数：
/// - `table = "events"`（必填）
/// - `columns = "*, home_team:teams!home_team_id(id, name)"`（默认 `*`）
/// - `parent = team_id`：父级外键字段，字段类型为 `String` 或 `Option<String>`
/// - `order_by(starts_at, ...)`（必填）：排序键字段，按顺序组成元组
/// - `required(title, starts_at)`：插入必填列
/// - `enriched(home_team = home_team_id, author)`：内嵌实体字段（`Option<_>`）；
///   `embed = fk` 表示外键有值时内嵌必须存在，单独的 `embed` 表示总是必须存在
#[proc_macro_attribute]
pub fn record(attr: TokenStream, item: TokenStream) -> TokenStream {
    record::expand(attr, item)
}
