use super::ProfileSummary;
use chrono::{DateTime, Utc};
use livesync_macros::record;
use serde::{Deserialize, Serialize};

/// 内嵌在其他实体中的球队摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSummary {
    pub id: String,
    pub name: String,
    pub logo_url: Option<String>,
}

#[record(table = "teams", order_by(name), required(name, owner_id))]
pub struct Team {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
}

impl Team {
    pub fn summary(&self) -> TeamSummary {
        TeamSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            logo_url: self.logo_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
}

/// 球队成员，按球队划分
#[record(
    table = "team_members",
    columns = "*, profile:profiles!user_id(id, display_name, avatar_url)",
    parent = team_id,
    order_by(joined_at),
    required(team_id, user_id, role),
    enriched(profile = user_id)
)]
pub struct TeamMember {
    pub id: String,
    pub team_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    pub profile: Option<ProfileSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// 入队申请，按球队划分
#[record(
    table = "team_join_requests",
    columns = "*, profile:profiles!user_id(id, display_name, avatar_url)",
    parent = team_id,
    order_by(created_at),
    required(team_id, user_id),
    enriched(profile = user_id)
)]
pub struct JoinRequest {
    pub id: String,
    pub team_id: String,
    pub user_id: String,
    pub message: Option<String>,
    pub status: JoinRequestStatus,
    pub created_at: DateTime<Utc>,
    pub profile: Option<ProfileSummary>,
}
