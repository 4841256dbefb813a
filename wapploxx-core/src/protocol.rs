//! Wire-level types for the controller's CGI API
//!
//! Every endpoint is a `GET <base>/<name>.cgi?...`. JSON endpoints answer with an
//! envelope `{"Status": "SUCCESS"|..., "ErrMsg": "...", ...payload}`; the user and
//! lock pages are HTML with the data assigned to a JavaScript variable.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Controller endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Login,
    Logout,
    UserHome,
    UserSmartloxx,
    GetPanelStatus,
    SetPanel,
    SetRemoteAccess,
    GetSystemStatus,
    GetEventLog,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Login => "login.cgi",
            Endpoint::Logout => "logout.cgi",
            Endpoint::UserHome => "user_home.cgi",
            Endpoint::UserSmartloxx => "user_smartloxx.cgi",
            Endpoint::GetPanelStatus => "getPanelStatus.cgi",
            Endpoint::SetPanel => "setPanel.cgi",
            Endpoint::SetRemoteAccess => "setRemoteAccess.cgi",
            Endpoint::GetSystemStatus => "getSystemStatus.cgi",
            Endpoint::GetEventLog => "getEventLog.cgi",
        }
    }

    /// Login and logout manage the session themselves
    pub fn is_auth(self) -> bool {
        matches!(self, Endpoint::Login | Endpoint::Logout)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Envelope status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Failure,
}

/// Generic response envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    pub status: Status,
    pub error_message: String,
    /// Every key except `Status` and `ErrMsg`
    pub payload: Map<String, Value>,
}

impl ApiResponse {
    /// Parse a response body. Bodies without a `Status` key (panel status, event log) count as success.
    pub fn from_body(body: &str) -> Result<Self> {
        Ok(Self::from_map(json_object(body)?))
    }

    /// Parse a login reply. Only an explicit `SUCCESS` status is a success here.
    pub fn from_auth_body(body: &str) -> Result<Self> {
        let map = json_object(body)?;
        let reported = map.get("Status").is_some_and(|s| !s.is_null());

        let mut response = Self::from_map(map);
        if !reported {
            response.status = Status::Failure;
        }
        Ok(response)
    }

    pub fn from_map(mut map: Map<String, Value>) -> Self {
        let raw_status = match map.remove("Status") {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        let error_message = match map.remove("ErrMsg") {
            Some(Value::String(s)) => s,
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        match raw_status {
            None => Self {
                status: Status::Success,
                error_message,
                payload: map,
            },
            Some(s) if s.eq_ignore_ascii_case("SUCCESS") => Self {
                status: Status::Success,
                error_message,
                payload: map,
            },
            Some(s) => Self {
                status: Status::Failure,
                // A failure always carries a message
                error_message: if error_message.is_empty() { s } else { error_message },
                payload: map,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Turn a FAILURE envelope into `Error::Protocol`
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            Status::Success => Ok(self),
            Status::Failure => Err(Error::Protocol {
                message: self.error_message,
            }),
        }
    }

    /// Decode the payload into a typed record
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.payload.clone()))?)
    }
}

fn json_object(body: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::UnexpectedResponse(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

/// Alarm panel control actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelAction {
    Arm,
    Disarm,
    ForceDisarm,
}

impl PanelAction {
    pub fn as_param(self) -> &'static str {
        match self {
            PanelAction::Arm => "Arm",
            PanelAction::Disarm => "Disarm",
            PanelAction::ForceDisarm => "ForcedDisarm",
        }
    }
}

/// Remote access (lock open/close) actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteAccessAction {
    Start,
    Stop,
}

impl RemoteAccessAction {
    pub fn as_param(self) -> &'static str {
        match self {
            RemoteAccessAction::Start => "Start",
            RemoteAccessAction::Stop => "Stop",
        }
    }
}

/// Event log categories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EventLogKind {
    #[default]
    All,
    Access,
    ArmDisarm,
    Record,
    System,
}

impl EventLogKind {
    pub fn as_param(self) -> &'static str {
        match self {
            EventLogKind::All => "All",
            EventLogKind::Access => "Access",
            EventLogKind::ArmDisarm => "ArmDisarm",
            EventLogKind::Record => "Record",
            EventLogKind::System => "System",
        }
    }
}

impl FromStr for EventLogKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "all" => Ok(EventLogKind::All),
            "access" => Ok(EventLogKind::Access),
            "armdisarm" => Ok(EventLogKind::ArmDisarm),
            "record" => Ok(EventLogKind::Record),
            "system" => Ok(EventLogKind::System),
            other => Err(format!("unknown event log type: {}", other)),
        }
    }
}

/// Event log page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLogQuery {
    pub index: u32,
    pub count: u32,
    pub kind: EventLogKind,
    /// Keep only records whose lock reference is this lock name (case-insensitive).
    /// Applied after the page is fetched.
    pub lock: Option<String>,
    /// Keep only records for the lock with this id. The id is resolved to the
    /// lock's name through the lock list, then filtered like `lock`.
    pub lock_id: Option<u32>,
}

impl Default for EventLogQuery {
    fn default() -> Self {
        Self {
            index: 0,
            count: 50,
            kind: EventLogKind::All,
            lock: None,
            lock_id: None,
        }
    }
}

impl EventLogQuery {
    pub fn kind(mut self, kind: EventLogKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn lock(mut self, lock: impl Into<String>) -> Self {
        self.lock = Some(lock.into());
        self
    }

    pub fn lock_id(mut self, id: u32) -> Self {
        self.lock_id = Some(id);
        self
    }

    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Index", self.index.to_string()),
            ("Count", self.count.to_string()),
            ("Type", self.kind.as_param().to_string()),
        ]
    }
}

/// Pull the object literal assigned to `var <name>=` out of an HTML page
pub fn extract_script_json(html: &str, var_name: &str) -> Result<Value> {
    let pattern = format!(r"var\s+{}\s*=\s*", regex::escape(var_name));
    let re = Regex::new(&pattern).map_err(|e| Error::UnexpectedResponse(e.to_string()))?;

    let start = re
        .find(html)
        .ok_or_else(|| Error::UnexpectedResponse(format!("no `{}` in page", var_name)))?
        .end();

    // The stream deserializer stops after the first value, ignoring the trailing `;` and markup
    serde_json::Deserializer::from_str(&html[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| Error::UnexpectedResponse(format!("`{}` has no value", var_name)))?
        .map_err(Error::from)
}

/// Parse a page variable into a typed record
pub fn parse_script_var<T: DeserializeOwned>(html: &str, var_name: &str) -> Result<T> {
    Ok(serde_json::from_value(extract_script_json(html, var_name)?)?)
}
