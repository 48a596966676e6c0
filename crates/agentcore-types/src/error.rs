//! Aggregate error type for the agent execution core, plus the disposition
//! metadata spec.md §7 attaches to every error kind.

use thiserror::Error;

/// How an error should be surfaced to the end user / transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSurface {
    /// Returned as part of a normal `ToolResult` / `OrchestratorResponse`,
    /// never raised across a component boundary.
    UserFacing,
    /// Bubbles to a generic 500 handler with a trace id, body redacted.
    Internal,
}

#[derive(Error, Debug, Clone)]
pub enum AgentCoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("policy denied: {reason}")]
    PolicyDenied { reason: String },

    #[error("scope missing: {0}")]
    ScopeMissing(String),

    #[error("rate limited")]
    RateLimited,

    #[error("loop broken: too many consecutive failures")]
    LoopBroken,

    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("tool handler error: {0}")]
    ToolHandlerError(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(String),
}

impl AgentCoreError {
    /// The exact user-visible message prefix from spec.md §7's error table.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(_) => "I couldn't understand the parameters".to_string(),
            Self::PolicyDenied { reason } => format!("I cannot do that. {reason}"),
            Self::ScopeMissing(_) => "I cannot do that.".to_string(),
            Self::RateLimited | Self::LoopBroken => "Too many attempts, try later".to_string(),
            Self::EmbeddingUnavailable(_) => {
                "Something went wrong. embedding unavailable".to_string()
            }
            Self::ToolHandlerError(msg) => {
                format!("Something went wrong. {}", truncate(msg, 256))
            }
            Self::Timeout => "Something went wrong. DEADLINE_EXCEEDED".to_string(),
            Self::Internal(_) | Self::NotFound(_) | Self::Store(_) => {
                "Something went wrong.".to_string()
            }
        }
    }

    pub fn surface(&self) -> ErrorSurface {
        match self {
            Self::Internal(_) | Self::Store(_) => ErrorSurface::Internal,
            _ => ErrorSurface::UserFacing,
        }
    }

    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable(_) | Self::Timeout | Self::RateLimited | Self::LoopBroken
        )
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

pub type Result<T> = std::result::Result<T, AgentCoreError>;
