//! 实体行契约（schema）
//!
//! 各实体类型的行结构及其内嵌（富化）变体，例如携带主客队摘要的赛事。
//! 内嵌数据是拉取时的非规范化快照：关联实体在别处变更时不会自动刷新，
//! 只有拥有它的实体被重新拉取时才会更新。
//!
mod event;
mod news;
mod profile;
mod team;

pub use event::{Event, EventStatus, Registration, RegistrationStatus};
pub use news::{Comment, Like, MediaPost, NewsArticle};
pub use profile::ProfileSummary;
pub use team::{JoinRequest, JoinRequestStatus, MemberRole, Team, TeamMember, TeamSummary};
