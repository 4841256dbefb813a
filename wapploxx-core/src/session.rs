//! Session lifecycle: login, logout and local session state
//!
//! The controller allows a single live session per account and drops it after
//! roughly 15 seconds without a request. Nothing here renews a session: once
//! it is gone the caller has to log in again.

use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::controller::Controller;
use crate::dispatch::build_request;
use crate::error::{AuthError, Error, Result, TransportError};
use crate::models::de::{value_as_number, value_as_text};
use crate::protocol::{ApiResponse, Endpoint};
use crate::transport::Transport;

/// An authenticated session
#[derive(Debug, Clone)]
pub struct Session {
    cookie: String,
    /// Username as echoed by the controller
    pub username: Option<String>,
    /// Permission level granted to the account
    pub permission: Option<String>,
    /// `BlockTime` reported alongside a successful login
    pub block_time: Option<u64>,
    pub logged_in_at: DateTime<Utc>,
    last_activity: Instant,
}

impl Session {
    fn from_login(cookie: String, reply: &ApiResponse) -> Self {
        Self {
            cookie,
            username: reply.payload.get("Username").and_then(value_as_text),
            permission: reply.payload.get("Permission").and_then(value_as_text),
            block_time: reply.payload.get("BlockTime").and_then(value_as_number),
            logged_in_at: Utc::now(),
            last_activity: Instant::now(),
        }
    }

    /// Opaque credential sent back as the `Cookie` header
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Local view of the session plus any login block the controller announced
#[derive(Debug)]
pub struct SessionManager {
    session: Option<Session>,
    idle_timeout: Duration,
    blocked_until: Option<Instant>,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            session: None,
            idle_timeout,
            blocked_until: None,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref().filter(|s| s.idle_for() < self.idle_timeout)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    /// Remaining login block, if one was reported and has not run out yet
    pub fn remaining_block(&self) -> Option<Duration> {
        self.blocked_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .filter(|d| !d.is_zero())
    }

    /// Cookie of the live session.
    ///
    /// A session idle past the timeout is refused but kept, so that logout can
    /// still release it on the controller.
    pub(crate) fn active_cookie(&self) -> Result<String> {
        if let Some(session) = self.session() {
            return Ok(session.cookie.clone());
        }
        if self.session.is_some() {
            info!(
                idle_timeout_secs = self.idle_timeout.as_secs(),
                "session idle past timeout, login required"
            );
        }
        Err(Error::NotAuthenticated)
    }

    pub(crate) fn touch(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.last_activity = Instant::now();
        }
    }

    pub(crate) fn invalidate(&mut self) -> Option<Session> {
        self.session.take()
    }

    fn start(&mut self, session: Session) {
        self.blocked_until = None;
        self.session = Some(session);
    }

    fn block_for(&mut self, duration: Duration) {
        self.blocked_until = Some(Instant::now() + duration);
    }
}

impl<T: Transport> Controller<T> {
    /// Log in to the controller.
    ///
    /// If the controller blocked this address earlier, the remembered block is
    /// honoured without contacting it unless `ignore_ip_block` is set. The
    /// controller doubles the block on every failed attempt, so blindly retrying
    /// only makes it longer.
    pub async fn login(&mut self, ignore_ip_block: bool) -> Result<Session> {
        if !ignore_ip_block {
            if let Some(remaining) = self.sessions.remaining_block() {
                warn!(remaining_secs = remaining.as_secs(), "login skipped, address still blocked");
                return Err(AuthError::AccountLocked {
                    block_time: Some(remaining),
                }
                .into());
            }
        }

        let engine = base64::engine::general_purpose::STANDARD;
        let params = [
            ("Username", engine.encode(&self.credentials().username)),
            ("Password", engine.encode(&self.credentials().password)),
        ];
        let request = build_request(Endpoint::Login, &params, None);

        let reply = self.transport().send(&request).await?;
        if !reply.is_success() {
            return Err(TransportError::Status(reply.status).into());
        }

        let response = ApiResponse::from_auth_body(&reply.body)?;
        if response.is_success() {
            let session = Session::from_login(reply.session_cookie(), &response);
            info!(
                username = %self.credentials().username,
                permission = session.permission.as_deref().unwrap_or("-"),
                "logged in"
            );
            self.sessions.start(session.clone());
            return Ok(session);
        }

        let block_time = response
            .payload
            .get("BlockTime")
            .and_then(value_as_number::<u64>)
            .map(Duration::from_secs);
        let err = AuthError::from_code(&response.error_message, block_time);

        match &err {
            AuthError::AccountLocked {
                block_time: Some(duration),
            } => self.sessions.block_for(*duration),
            AuthError::AlreadyLoggedIn => {
                self.sessions.invalidate();
            }
            _ => {}
        }

        warn!(
            username = %self.credentials().username,
            code = %response.error_message,
            "login rejected: {}",
            err
        );
        Err(err.into())
    }

    /// Log out. Without a session this is a no-op.
    ///
    /// The local session is dropped whatever the controller answers.
    pub async fn logout(&mut self) -> Result<()> {
        let Some(session) = self.sessions.invalidate() else {
            return Ok(());
        };

        let request = build_request(Endpoint::Logout, &[], Some(session.cookie));
        let reply = self.transport().send(&request).await?;

        // 401: the controller already dropped the session
        if !reply.is_success() && reply.status != 401 {
            return Err(TransportError::Status(reply.status).into());
        }

        info!(username = %self.credentials().username, "logged out");
        Ok(())
    }

    /// Local check only, the controller is not asked
    pub fn is_authenticated(&self) -> bool {
        self.sessions.is_authenticated()
    }

    pub fn session(&self) -> Option<&Session> {
        self.sessions.session()
    }
}
