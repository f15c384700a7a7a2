//! Error hierarchy for the storybox engine.
//!
//! Built on [`thiserror`]:
//!
//! - [`StoryboxError`]: top-level enum covering all error domains
//! - [`ServiceError`]: external collaborator failures (vision, image, text,
//!   speech) with retryability classification
//! - [`ToolError`]: tool registration and dispatch failures
//! - [`SettingsError`]: configuration and credential failures
//!
//! Transient service failures are recovered locally with fallback values and
//! never propagate fatally; these types exist so the recovery sites can log
//! and classify what they swallowed.

use thiserror::Error;

use crate::retry::RetryDecision;

// ─────────────────────────────────────────────────────────────────────────────
// StoryboxError — top-level error enum
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level error type for the storybox engine.
#[derive(Debug, Error)]
pub enum StoryboxError {
    /// External service error.
    #[error("{0}")]
    Service(#[from] ServiceError),

    /// Tool registration or dispatch error.
    #[error("{0}")]
    Tool(#[from] ToolError),

    /// Configuration error.
    #[error("{0}")]
    Settings(#[from] SettingsError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// ServiceError — external collaborator failures
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from external generation and description services.
#[derive(Clone, Debug, Error)]
pub enum ServiceError {
    /// Rate limited by the provider.
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds.
        retry_after_ms: u64,
        /// Error description.
        message: String,
    },

    /// Provider returned an API error.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description.
        message: String,
        /// Whether this error can be retried.
        retryable: bool,
    },

    /// Authentication failed (expired token, invalid key).
    #[error("auth error: {message}")]
    Auth {
        /// Error description.
        message: String,
    },

    /// The call was cancelled (stage teardown, barge-in).
    #[error("call cancelled")]
    Cancelled,

    /// The provider returned output the caller could not use.
    #[error("malformed response: {message}")]
    Malformed {
        /// Error description.
        message: String,
    },

    /// Anything else.
    #[error("{message}")]
    Other {
        /// Error description.
        message: String,
    },
}

impl ServiceError {
    /// Create an `Other` error from any displayable value.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// How a retry loop should treat this error.
    #[must_use]
    pub fn retry_decision(&self) -> RetryDecision {
        match self {
            Self::RateLimited { retry_after_ms, .. } => RetryDecision::After(*retry_after_ms),
            Self::Api { retryable: true, .. } => RetryDecision::Backoff,
            _ => RetryDecision::Stop,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ToolError — tool dispatch failures
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from tool registration and dispatch.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The requested tool is not in the live set.
    #[error("unknown tool: {name}")]
    UnknownTool {
        /// The tool name the agent asked for.
        name: String,
    },

    /// A call arrived tagged with a superseded tool-set generation.
    #[error("stale tool generation {requested} (live is {live})")]
    StaleGeneration {
        /// Generation the caller was bound to.
        requested: u64,
        /// Generation currently live.
        live: u64,
    },

    /// The arguments did not match the tool's parameter schema.
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments {
        /// Tool name.
        tool: String,
        /// What failed to parse.
        message: String,
    },

    /// The handler itself failed.
    #[error("tool {tool} failed: {message}")]
    Handler {
        /// Tool name.
        tool: String,
        /// Failure description.
        message: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// SettingsError — configuration failures
// ─────────────────────────────────────────────────────────────────────────────

/// Errors from configuration loading and credential lookup.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A required credential is unset.
    #[error("missing credential: {key}")]
    Missing {
        /// The credential key.
        key: String,
    },

    /// The settings sources could not be read.
    #[error("settings load failed: {0}")]
    Load(#[from] figment::Error),
}
