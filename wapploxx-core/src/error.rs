//! Error types shared by the session, dispatcher and facade layers

use std::time::Duration;

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Not authenticated: login first")]
    NotAuthenticated,

    /// The controller answered with a FAILURE envelope. The message is passed through untouched.
    #[error("Controller reported failure: {message}")]
    Protocol { message: String },

    #[error("Endpoint {0} is handled by login/logout, not by call()")]
    AuthEndpoint(&'static str),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid JSON in response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Lock with ID {0} does not exist")]
    UnknownLock(u32),
}

impl Error {
    /// Message of a FAILURE envelope, if this is one
    pub fn protocol_message(&self) -> Option<&str> {
        match self {
            Error::Protocol { message } => Some(message),
            _ => None,
        }
    }
}

/// Failures reported by the controller's login endpoint
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Login is blocked. The controller doubles the block on every further failed attempt.
    #[error("Login blocked{}", remaining(.block_time))]
    AccountLocked { block_time: Option<Duration> },

    #[error("This account is already logged in")]
    AlreadyLoggedIn,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("{description} ({code})")]
    Rejected { code: String, description: String },
}

impl AuthError {
    /// Map a login `ErrMsg` code to an error
    pub fn from_code(code: &str, block_time: Option<Duration>) -> Self {
        match code {
            "LOGIN_IP_BLOCKED" => AuthError::AccountLocked { block_time },
            "LOGIN_ACCOUNT_BLOCKED" => AuthError::AccountLocked { block_time: None },
            "ACCOUNT_LOGGED" => AuthError::AlreadyLoggedIn,
            "UNAUTH" => AuthError::InvalidCredentials,
            other => AuthError::Rejected {
                code: other.to_string(),
                description: describe_code(other).to_string(),
            },
        }
    }
}

fn remaining(block_time: &Option<Duration>) -> String {
    block_time
        .map(|d| format!(" for another {} seconds", d.as_secs()))
        .unwrap_or_default()
}

fn describe_code(code: &str) -> &'static str {
    match code {
        "UNAVAILABLE" => "This account is currently not available",
        "TOO_MANY_USERS" => "Too many users are connected",
        "UNAVAILABLE_BY_ADMIN" => "Administrator has been logged in",
        "FAIL_TIMEOUT" => "Server error",
        _ => "Unknown authentication error",
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {0}")]
    Status(u16),
}
