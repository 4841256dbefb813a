//! HTTP transport for controller requests
//!
//! [`Transport`] is the seam between the session/dispatch logic and the wire.
//! [`HttpTransport`] talks to a real controller through reqwest; tests plug in
//! a recording fake.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::Client;

use crate::config::Credentials;
use crate::error::TransportError;
use crate::protocol::Endpoint;

/// A fully built request: endpoint, query parameters and session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplianceRequest {
    pub endpoint: Endpoint,
    pub params: Vec<(String, String)>,
    pub cookie: Option<String>,
}

impl ApplianceRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Raw HTTP reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    /// Raw `Set-Cookie` header values
    pub set_cookies: Vec<String>,
    pub body: String,
}

impl HttpReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            set_cookies: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_cookie(mut self, set_cookie: impl Into<String>) -> Self {
        self.set_cookies.push(set_cookie.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `name=value` pairs of every `Set-Cookie`, joined for a `Cookie` header
    pub fn session_cookie(&self) -> String {
        self.set_cookies
            .iter()
            .filter_map(|c| c.split(';').next())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Sends one request and returns the reply. Exactly one attempt, no retries.
pub trait Transport {
    fn send(
        &self,
        request: &ApplianceRequest,
    ) -> impl Future<Output = Result<HttpReply, TransportError>> + Send;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport for the given controller. `timeout` of `None` keeps reqwest's default.
    pub fn new(credentials: &Credentials, timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = Client::builder().danger_accept_invalid_certs(!credentials.verify_tls);

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: credentials.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &ApplianceRequest) -> Result<HttpReply, TransportError> {
        let mut req = self
            .client
            .get(self.url(request.endpoint))
            .query(&request.params);

        if let Some(cookie) = request.cookie.as_deref().filter(|c| !c.is_empty()) {
            req = req.header(COOKIE, cookie);
        }

        let resp = req.send().await?;

        let status = resp.status().as_u16();
        let set_cookies = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(String::from)
            .collect();
        let body = resp.text().await?;

        Ok(HttpReply {
            status,
            set_cookies,
            body,
        })
    }
}
