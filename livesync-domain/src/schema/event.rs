use super::{ProfileSummary, TeamSummary};
use chrono::{DateTime, Utc};
use livesync_macros::record;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Scheduled,
    Live,
    Finished,
    Cancelled,
}

/// 赛事，内嵌主客队摘要
#[record(
    table = "events",
    columns = "*, home_team:teams!home_team_id(id, name, logo_url), away_team:teams!away_team_id(id, name, logo_url)",
    order_by(starts_at),
    required(title, starts_at, created_by),
    enriched(home_team = home_team_id, away_team = away_team_id)
)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub status: EventStatus,
    pub home_team_id: Option<String>,
    pub away_team_id: Option<String>,
    pub created_by: String,
    pub home_team: Option<TeamSummary>,
    pub away_team: Option<TeamSummary>,
}

impl Event {
    /// 是否与某支球队相关（主队或客队）
    pub fn involves(&self, team_id: &str) -> bool {
        self.home_team_id.as_deref() == Some(team_id) || self.away_team_id.as_deref() == Some(team_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Registered,
    Waitlisted,
    Cancelled,
}

/// 赛事报名，按赛事划分
#[record(
    table = "event_registrations",
    columns = "*, profile:profiles!user_id(id, display_name, avatar_url)",
    parent = event_id,
    order_by(registered_at),
    required(event_id, user_id),
    enriched(profile = user_id)
)]
pub struct Registration {
    pub id: String,
    pub event_id: String,
    pub user_id: String,
    pub status: RegistrationStatus,
    pub registered_at: DateTime<Utc>,
    pub profile: Option<ProfileSummary>,
}
