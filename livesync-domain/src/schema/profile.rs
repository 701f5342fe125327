use serde::{Deserialize, Serialize};

/// 内嵌的用户资料摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}
