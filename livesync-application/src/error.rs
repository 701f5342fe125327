use livesync_domain::error::SyncError;

#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("sync: {0}")]
    Sync(#[from] SyncError),

    #[error("validation: {0}")]
    Validation(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// 前一步已生效、后一步失败；重试同一命令可补齐
    #[error("incomplete: {step} failed: {source}")]
    Incomplete {
        step: &'static str,
        source: SyncError,
    },

    #[error("handler not found: {0}")]
    HandlerNotFound(&'static str),

    #[error("handler already registered: command={command}")]
    AlreadyRegistered { command: &'static str },

    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}
