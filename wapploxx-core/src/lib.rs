//! wapploxx-core: client library for WAppLoxx access-control controllers
//!
//! This crate provides:
//! - Session lifecycle (login, logout, single-session and idle-timeout handling)
//! - The request/response envelope shared by every controller endpoint
//! - Typed operations for smartlocks, the alarm panel and the event log
//! - Lock/Locks/Panel convenience wrappers
//! - TOML configuration

pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod locks;
pub mod models;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::{Config, ControllerConfig, Credentials};
pub use controller::Controller;
pub use error::{AuthError, Error, Result, TransportError};
pub use locks::{FanOutError, Lock, Locks, Panel};
pub use models::{
    EventRecord, LockDescriptor, Page, PanelStatus, SystemStatus, Tristate, UserInfo,
};
pub use protocol::{ApiResponse, Endpoint, EventLogKind, EventLogQuery, PanelAction, RemoteAccessAction, Status};
pub use session::Session;
pub use transport::{ApplianceRequest, HttpReply, HttpTransport, Transport};

/// Idle period after which the controller drops a session
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 15;

/// Value of the `Source` parameter sent with every request
pub const REQUEST_SOURCE: &str = "Webpage";
