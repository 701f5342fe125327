use super::{loaded, non_blank};
use crate::command::Command;
use crate::command_handler::CommandHandler;
use crate::context::AppContext;
use crate::error::AppError;
use crate::registry::StoreRegistry;
use async_trait::async_trait;
use chrono::Utc;
use livesync_domain::error::SyncError;
use livesync_domain::filter::Filter;
use livesync_domain::schema::{JoinRequest, JoinRequestStatus, MemberRole, TeamMember};
use serde_json::json;
use std::sync::Arc;

/// 申请加入球队
#[derive(Debug, Clone)]
pub struct RequestToJoinTeam {
    pub team_id: String,
    pub message: Option<String>,
}

impl Command for RequestToJoinTeam {
    const NAME: &'static str = "RequestToJoinTeam";
    type Output = JoinRequest;
}

/// 球队所有者审批入队申请；通过时写入成员
#[derive(Debug, Clone)]
pub struct ReviewJoinRequest {
    pub request_id: String,
    pub approve: bool,
}

impl Command for ReviewJoinRequest {
    const NAME: &'static str = "ReviewJoinRequest";
    type Output = JoinRequest;
}

pub struct TeamHandlers {
    registry: Arc<StoreRegistry>,
}

impl TeamHandlers {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry }
    }

    async fn is_member(&self, request: &JoinRequest) -> Result<bool, AppError> {
        let members = loaded(self.registry.team_members(), &Filter::parent(&request.team_id)).await?;
        Ok(members.items.iter().any(|m| m.user_id == request.user_id))
    }

    async fn add_member(&self, request: &JoinRequest) -> Result<TeamMember, SyncError> {
        self.registry
            .facade::<TeamMember>()
            .create(json!({
                "team_id": request.team_id,
                "user_id": request.user_id,
                "role": MemberRole::Member,
                "joined_at": Utc::now(),
            }))
            .await
    }
}

#[async_trait]
impl CommandHandler<RequestToJoinTeam> for TeamHandlers {
    async fn handle(&self, ctx: &AppContext, cmd: RequestToJoinTeam) -> Result<JoinRequest, AppError> {
        let user_id = ctx.require_user()?;
        let team_id = non_blank("team_id", &cmd.team_id)?;
        let filter = Filter::parent(team_id);

        let members = loaded(self.registry.team_members(), &filter).await?;
        if members.items.iter().any(|m| m.user_id == user_id) {
            return Err(AppError::Conflict(format!(
                "user {user_id} is already a member of team {team_id}"
            )));
        }

        let requests = loaded(self.registry.join_requests(), &filter).await?;
        if requests
            .items
            .iter()
            .any(|r| r.user_id == user_id && r.status == JoinRequestStatus::Pending)
        {
            return Err(AppError::Conflict(format!(
                "user {user_id} already has a pending request for team {team_id}"
            )));
        }

        let message = cmd
            .message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());
        let request = self
            .registry
            .facade::<JoinRequest>()
            .create(json!({
                "team_id": team_id,
                "user_id": user_id,
                "message": message,
                "status": JoinRequestStatus::Pending,
                "created_at": Utc::now(),
            }))
            .await?;
        log::info!("user {user_id} requested to join team {team_id}");
        Ok(request)
    }
}

#[async_trait]
impl CommandHandler<ReviewJoinRequest> for TeamHandlers {
    async fn handle(&self, ctx: &AppContext, cmd: ReviewJoinRequest) -> Result<JoinRequest, AppError> {
        let reviewer = ctx.require_user()?;
        let request_id = non_blank("request_id", &cmd.request_id)?;

        let requests = self.registry.join_requests();
        let request = match requests.get(request_id) {
            Some(request) => request,
            None => requests
                .fetch_one(request_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("join request {request_id}")))?,
        };

        let teams = loaded(self.registry.teams(), &Filter::all()).await?;
        match teams.items.get(&request.team_id) {
            Some(team) if team.owner_id != reviewer => {
                return Err(AppError::Forbidden(format!(
                    "only the owner of team {} can review requests",
                    team.id
                )));
            }
            Some(_) => {}
            None => return Err(AppError::NotFound(format!("team {}", request.team_id))),
        }

        // 上次审批通过但成员未写入：补写成员
        if request.status == JoinRequestStatus::Approved
            && cmd.approve
            && !self.is_member(&request).await?
        {
            self.add_member(&request).await?;
            log::info!("join request {request_id}: membership completed");
            return Ok(request);
        }
        if request.status != JoinRequestStatus::Pending {
            return Err(AppError::Conflict(format!(
                "join request {request_id} was already reviewed"
            )));
        }

        let status = if cmd.approve {
            JoinRequestStatus::Approved
        } else {
            JoinRequestStatus::Rejected
        };
        let reviewed = self
            .registry
            .facade::<JoinRequest>()
            .update(request_id, json!({ "status": status }))
            .await?;

        if cmd.approve {
            if let Err(err) = self.add_member(&reviewed).await {
                log::error!("join request {request_id} approved but membership failed: {err}");
                return Err(AppError::Incomplete {
                    step: "add team member",
                    source: err,
                });
            }
        }
        log::info!(
            "join request {request_id} for team {} {}",
            request.team_id,
            if cmd.approve { "approved" } else { "rejected" }
        );
        Ok(reviewed)
    }
}
