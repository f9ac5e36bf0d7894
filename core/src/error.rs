//! Structured error types for Swarmgate
//!
//! Covers provider failures, session lookup, policy/approval outcomes that
//! escalate to errors, and tool execution faults. Gate decisions themselves
//! are values (`GateDecision`), not errors; only loop-level failures land
//! here.

use std::time::Duration;
use thiserror::Error;

/// Primary error type for Swarmgate operations
#[derive(Error, Debug)]
pub enum SwarmError {
    // =========================================================================
    // Provider / API Errors
    // =========================================================================
    /// Authentication/authorization errors
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Rate limit exceeded at the provider (429)
    #[error("provider rate limit exceeded")]
    ProviderRateLimited { retry_after: Option<Duration> },

    /// Provider returned an error status
    #[error("provider error: {status} - {message}")]
    ProviderError { status: u16, message: String },

    /// Stream disconnected mid-turn (retryable)
    #[error("stream disconnected: {reason}")]
    StreamDisconnected { reason: String },

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Session not found in the registry
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// Agent profile not found for delegation
    #[error("profile not found: {profile_name}")]
    ProfileNotFound { profile_name: String },

    // =========================================================================
    // Policy / Approval Errors
    // =========================================================================
    /// A consent key failed to decode
    #[error("invalid consent key: {reason}")]
    InvalidConsentKey { reason: String },

    /// Code edit approval was declined
    #[error("approval denied for: {action}")]
    ApprovalDenied { action: String },

    // =========================================================================
    // Tool Execution Errors
    // =========================================================================
    /// Tool execution failed in the sandbox/service collaborator
    #[error("tool execution failed: {tool_name} - {error}")]
    ToolExecutionFailed { tool_name: String, error: String },

    /// Sandbox refused or could not service the request
    #[error("sandbox denied: {reason}")]
    SandboxDenied { reason: String },

    // =========================================================================
    // Orchestration Errors
    // =========================================================================
    /// The turn was cancelled by the user; not a failure
    #[error("turn interrupted")]
    Interrupted,

    /// Hard cap on model calls per turn was reached
    #[error("turn limit reached (max {max_calls} model calls)")]
    TurnLimitReached { max_calls: usize },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    // =========================================================================
    // External Error Wrappers
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    /// Internal system error
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SwarmError {
    /// Check if error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderRateLimited { .. } => true,
            Self::StreamDisconnected { .. } => true,
            Self::ProviderError { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Get suggested retry delay for retryable errors
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::ProviderRateLimited { retry_after } => {
                Some(retry_after.unwrap_or(Duration::from_secs(5)))
            }
            Self::StreamDisconnected { .. } => Some(Duration::from_secs(1)),
            Self::ProviderError { status: 503, .. } => Some(Duration::from_secs(10)),
            _ => None,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized { .. } => {
                "Authentication failed. Please check your API key.".to_string()
            }
            Self::Interrupted => "Generation stopped by user.".to_string(),
            Self::TurnLimitReached { .. } => {
                "The agent reached its step limit for this turn.".to_string()
            }
            Self::ApprovalDenied { action } => {
                format!("The user declined the requested action: {}.", action)
            }
            Self::ToolExecutionFailed { tool_name, .. } => {
                format!("Failed to execute tool '{}'.", tool_name)
            }
            _ => self.to_string(),
        }
    }
}

impl From<reqwest::Error> for SwarmError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

/// Result type alias using SwarmError
pub type Result<T> = std::result::Result<T, SwarmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SwarmError::ProviderRateLimited { retry_after: None }.is_retryable());
        assert!(SwarmError::StreamDisconnected {
            reason: "reset".to_string()
        }
        .is_retryable());
        assert!(SwarmError::ProviderError {
            status: 503,
            message: "maintenance".to_string()
        }
        .is_retryable());

        assert!(!SwarmError::Unauthorized {
            message: "bad token".to_string()
        }
        .is_retryable());
        assert!(!SwarmError::Interrupted.is_retryable());
    }

    #[test]
    fn test_retry_delay() {
        let err = SwarmError::ProviderRateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(err.retry_delay(), Some(Duration::from_secs(30)));
        assert_eq!(
            SwarmError::ProviderRateLimited { retry_after: None }.retry_delay(),
            Some(Duration::from_secs(5))
        );
        assert_eq!(SwarmError::Interrupted.retry_delay(), None);
    }

    #[test]
    fn test_user_messages() {
        let err = SwarmError::ToolExecutionFailed {
            tool_name: "run_bash".to_string(),
            error: "exit 1".to_string(),
        };
        assert!(err.user_message().contains("run_bash"));
        assert!(SwarmError::Interrupted.user_message().contains("stopped"));
    }
}
