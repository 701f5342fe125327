use super::{loaded, non_blank};
use crate::command::Command;
use crate::command_handler::CommandHandler;
use crate::context::AppContext;
use crate::error::AppError;
use crate::registry::StoreRegistry;
use async_trait::async_trait;
use chrono::Utc;
use livesync_domain::filter::Filter;
use livesync_domain::schema::{Registration, RegistrationStatus};
use serde_json::json;
use std::sync::Arc;

/// 当前用户报名赛事
#[derive(Debug, Clone)]
pub struct RegisterForEvent {
    pub event_id: String,
}

impl Command for RegisterForEvent {
    const NAME: &'static str = "RegisterForEvent";
    type Output = Registration;
}

/// 取消当前用户的报名
#[derive(Debug, Clone)]
pub struct CancelRegistration {
    pub event_id: String,
}

impl Command for CancelRegistration {
    const NAME: &'static str = "CancelRegistration";
    type Output = ();
}

pub struct EventHandlers {
    registry: Arc<StoreRegistry>,
}

impl EventHandlers {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        Self { registry }
    }

    async fn active_registration(
        &self,
        event_id: &str,
        user_id: &str,
    ) -> Result<Option<Registration>, AppError> {
        let snapshot = loaded(self.registry.registrations(), &Filter::parent(event_id)).await?;
        Ok(snapshot
            .items
            .iter()
            .find(|r| r.user_id == user_id && r.status != RegistrationStatus::Cancelled)
            .cloned())
    }
}

#[async_trait]
impl CommandHandler<RegisterForEvent> for EventHandlers {
    async fn handle(
        &self,
        ctx: &AppContext,
        cmd: RegisterForEvent,
    ) -> Result<Registration, AppError> {
        let user_id = ctx.require_user()?;
        let event_id = non_blank("event_id", &cmd.event_id)?;

        if self.active_registration(event_id, user_id).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "user {user_id} already registered for event {event_id}"
            )));
        }

        let registration = self
            .registry
            .facade::<Registration>()
            .create(json!({
                "event_id": event_id,
                "user_id": user_id,
                "status": RegistrationStatus::Registered,
                "registered_at": Utc::now(),
            }))
            .await?;
        log::info!("user {user_id} registered for event {event_id}");
        Ok(registration)
    }
}

#[async_trait]
impl CommandHandler<CancelRegistration> for EventHandlers {
    async fn handle(&self, ctx: &AppContext, cmd: CancelRegistration) -> Result<(), AppError> {
        let user_id = ctx.require_user()?;
        let event_id = non_blank("event_id", &cmd.event_id)?;

        let Some(registration) = self.active_registration(event_id, user_id).await? else {
            return Err(AppError::NotFound(format!(
                "no registration of user {user_id} for event {event_id}"
            )));
        };

        self.registry
            .facade::<Registration>()
            .delete(&registration.id)
            .await?;
        log::info!("user {user_id} cancelled registration for event {event_id}");
        Ok(())
    }
}
