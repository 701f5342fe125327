//! 同步层统一错误定义
//!
//! 覆盖本地校验、远端调用（含超时）、订阅通道、载荷解码等最小必要集合。
//! 错误会被记录在集合状态中供视图读取，因此要求 `Clone + PartialEq`。
//!
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// 远端错误的细分类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// 后端返回的业务/存储错误
    Backend,
    /// 调用在配置的时限内未完成
    Timeout,
}

/// 协作方（查询/变更/订阅）返回的错误，消息原样保留
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    kind: RemoteErrorKind,
    message: String,
    code: Option<String>,
}

impl RemoteError {
    pub fn backend(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            kind: RemoteErrorKind::Backend,
            message: message.into(),
            code,
        }
    }

    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self {
            kind: RemoteErrorKind::Timeout,
            message: format!("{operation} timed out after {}ms", after.as_millis()),
            code: None,
        }
    }

    pub fn kind(&self) -> RemoteErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == RemoteErrorKind::Timeout
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (code={code})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    // --- 本地校验 ---
    #[error("validation failed: entity={entity}, reason={reason}")]
    Validation { entity: &'static str, reason: String },

    // --- 远端协作方 ---
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("subscription error: table={table}, reason={reason}")]
    Subscription { table: String, reason: String },

    // --- 内部条件（不对外呈现） ---
    #[error("stale result discarded: issued={issued}, current={current}")]
    StaleResultDiscarded { issued: u64, current: u64 },

    // --- 载荷 ---
    #[error("decode error: {reason}")]
    Decode { reason: String },
    #[error("not found: {reason}")]
    NotFound { reason: String },
}

impl SyncError {
    pub fn validation(entity: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            entity,
            reason: reason.into(),
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(RemoteError::backend(message, None))
    }

    pub fn subscription(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Subscription {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }

    /// 是否为仅供内部使用的条件（不应写入集合状态）
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::StaleResultDiscarded { .. })
    }
}

/// 统一 Result 类型别名
pub type SyncResult<T> = Result<T, SyncError>;

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode {
            reason: err.to_string(),
        }
    }
}
