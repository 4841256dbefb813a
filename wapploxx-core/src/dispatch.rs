//! Request dispatcher
//!
//! Builds each request (default parameters, session cookie), sends it once and
//! maps the outcome:
//! - transport failure or non-2xx status: `Error::Transport`, session kept
//! - HTTP 401: session dropped, `Error::NotAuthenticated`
//! - FAILURE envelope: `Error::Protocol` with the controller's message, session kept

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::controller::Controller;
use crate::error::{Error, Result, TransportError};
use crate::protocol::{parse_script_var, ApiResponse, Endpoint};
use crate::transport::{ApplianceRequest, HttpReply, Transport};

/// Prefix caller parameters with `ts` and `Source`
pub(crate) fn build_request(
    endpoint: Endpoint,
    params: &[(&str, String)],
    cookie: Option<String>,
) -> ApplianceRequest {
    let mut all = Vec::with_capacity(params.len() + 2);
    all.push(("ts".to_string(), Utc::now().timestamp_millis().to_string()));
    all.push(("Source".to_string(), crate::REQUEST_SOURCE.to_string()));
    all.extend(params.iter().map(|(k, v)| (k.to_string(), v.clone())));

    ApplianceRequest {
        endpoint,
        params: all,
        cookie,
    }
}

impl<T: Transport> Controller<T> {
    /// Send one request to a non-auth endpoint and parse the envelope.
    ///
    /// Fails with `NotAuthenticated` before touching the network when there is no live session.
    pub async fn call(&mut self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<ApiResponse> {
        let reply = self.exchange(endpoint, params).await?;
        ApiResponse::from_body(&reply.body)?.into_result()
    }

    /// Fetch an HTML page and decode the object assigned to `var_name`
    pub(crate) async fn fetch_page_var<R: DeserializeOwned>(
        &mut self,
        endpoint: Endpoint,
        var_name: &str,
    ) -> Result<R> {
        let reply = self.exchange(endpoint, &[]).await?;
        parse_script_var(&reply.body, var_name)
    }

    async fn exchange(&mut self, endpoint: Endpoint, params: &[(&str, String)]) -> Result<HttpReply> {
        if endpoint.is_auth() {
            return Err(Error::AuthEndpoint(endpoint.path()));
        }

        let cookie = self.sessions.active_cookie()?;
        let request = build_request(endpoint, params, Some(cookie));

        debug!(
            endpoint = %endpoint,
            params = ?params.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            "dispatching request"
        );

        let reply = self.transport().send(&request).await?;

        match reply.status {
            401 => {
                warn!(endpoint = %endpoint, "controller rejected session, login required");
                self.sessions.invalidate();
                Err(Error::NotAuthenticated)
            }
            _ if !reply.is_success() => Err(TransportError::Status(reply.status).into()),
            _ => {
                self.sessions.touch();
                Ok(reply)
            }
        }
    }
}
