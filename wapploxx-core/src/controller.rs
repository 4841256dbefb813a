//! Controller client: one set of credentials, one session, one transport
//!
//! Session handling lives in [`crate::session`] and request dispatch in
//! [`crate::dispatch`]; this module holds the client itself and the typed
//! per-endpoint operations.

use std::time::Duration;

use tracing::warn;

use crate::config::{ControllerConfig, Credentials};
use crate::error::{Error, Result};
use crate::models::{EventRecord, LockDescriptor, Page, PanelStatus, SystemStatus, UserInfo};
use crate::protocol::{ApiResponse, Endpoint, EventLogQuery, PanelAction, RemoteAccessAction};
use crate::session::SessionManager;
use crate::transport::{HttpTransport, Transport};

/// Page variable holding the user profile
const USER_INFO_VAR: &str = "g_UserInfo";
/// Page variable holding the lock list
const LOCK_LIST_VAR: &str = "gSmartloxxList";

/// Client for a single controller
///
/// # Example
///
/// ```no_run
/// use wapploxx_core::{Controller, Credentials, PanelAction};
///
/// # async fn run() -> wapploxx_core::Result<()> {
/// let mut controller = Controller::new(Credentials::new("https://192.168.0.10", "admin", "secret").insecure())?;
///
/// let status = controller
///     .with_session(false, async |c: &mut Controller| {
///         c.set_panel(PanelAction::Arm).await?;
///         c.get_panel_status().await
///     })
///     .await?;
/// println!("armed: {:?}", status.armed);
/// # Ok(())
/// # }
/// ```
pub struct Controller<T = HttpTransport> {
    credentials: Credentials,
    transport: T,
    pub(crate) sessions: SessionManager,
}

impl Controller<HttpTransport> {
    /// Client over HTTP(S) with reqwest's default timeouts
    pub fn new(credentials: Credentials) -> Result<Self> {
        let transport = HttpTransport::new(&credentials, None)?;
        Ok(Self::with_transport(credentials, transport))
    }

    pub fn from_config(config: &ControllerConfig) -> Result<Self> {
        let credentials = config.credentials();
        let transport = HttpTransport::new(&credentials, config.timeout())?;
        Ok(Self::with_transport(credentials, transport).session_timeout(config.session_timeout()))
    }
}

impl<T: Transport> Controller<T> {
    pub fn with_transport(credentials: Credentials, transport: T) -> Self {
        Self {
            credentials,
            transport,
            sessions: SessionManager::new(Duration::from_secs(crate::DEFAULT_SESSION_TIMEOUT_SECS)),
        }
    }

    /// Override the idle period after which the session counts as gone
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.sessions = SessionManager::new(timeout);
        self
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run `body` inside a session: log in, run, always log out.
    ///
    /// The body's result is returned even when logout fails; that failure is
    /// only logged. If login fails the body does not run.
    pub async fn with_session<R, F>(&mut self, ignore_ip_block: bool, body: F) -> Result<R>
    where
        F: AsyncFnOnce(&mut Self) -> Result<R>,
    {
        self.login(ignore_ip_block).await?;

        let result = body(&mut *self).await;

        if let Err(e) = self.logout().await {
            warn!(error = %e, "logout failed, session may linger until the controller times it out");
        }

        result
    }

    /// Controller clock and auto-logout countdown.
    ///
    /// With `pause_auto_logout` the controller suspends its idle logout while polled.
    pub async fn get_system_status(&mut self, pause_auto_logout: bool) -> Result<SystemStatus> {
        let pause = if pause_auto_logout { "ON" } else { "OFF" };
        let params = [("LoxxState", "OFF".to_string()), ("PauseAutoLogout", pause.to_string())];

        self.call(Endpoint::GetSystemStatus, &params).await?.payload_as()
    }

    pub async fn get_user_info(&mut self) -> Result<UserInfo> {
        self.fetch_page_var(Endpoint::UserHome, USER_INFO_VAR).await
    }

    pub async fn get_user_smartloxx(&mut self) -> Result<Page<LockDescriptor>> {
        self.fetch_page_var(Endpoint::UserSmartloxx, LOCK_LIST_VAR).await
    }

    pub async fn get_panel_status(&mut self) -> Result<PanelStatus> {
        self.call(Endpoint::GetPanelStatus, &[]).await?.payload_as()
    }

    pub async fn set_panel(&mut self, action: PanelAction) -> Result<ApiResponse> {
        self.call(Endpoint::SetPanel, &[("Action", action.as_param().to_string())])
            .await
    }

    pub async fn set_remote_access(&mut self, lock_id: u32, action: RemoteAccessAction) -> Result<ApiResponse> {
        let params = [
            ("LoxxId", lock_id.to_string()),
            ("Action", action.as_param().to_string()),
        ];
        self.call(Endpoint::SetRemoteAccess, &params).await
    }

    /// One page of the event log.
    ///
    /// Lock filters are applied to the fetched page; `list_count` and
    /// `total_count` stay as the controller reported them.
    pub async fn get_event_log(&mut self, query: &EventLogQuery) -> Result<Page<EventRecord>> {
        let lock_name = match query.lock_id {
            Some(id) => Some(self.lock_name(id).await?),
            None => None,
        };

        let mut page: Page<EventRecord> = self
            .call(Endpoint::GetEventLog, &query.params())
            .await?
            .payload_as()?;

        for name in [query.lock.as_deref(), lock_name.as_deref()].into_iter().flatten() {
            page.items.retain(|record| record.lock_ref.eq_ignore_ascii_case(name));
        }

        Ok(page)
    }

    async fn lock_name(&mut self, id: u32) -> Result<String> {
        self.get_user_smartloxx()
            .await?
            .items
            .into_iter()
            .find(|lock| lock.id == id)
            .map(|lock| lock.name)
            .ok_or(Error::UnknownLock(id))
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::models::Tristate;
    use crate::protocol::EventLogKind;
    use crate::transport::testing::RecordingTransport;
    use crate::transport::HttpReply;

    const OK: &str = r#"{"Status":"SUCCESS","ErrMsg":""}"#;

    fn controller(transport: RecordingTransport) -> Controller<RecordingTransport> {
        Controller::with_transport(Credentials::new("http://192.0.2.10", "admin", "secret"), transport)
    }

    #[tokio::test]
    async fn test_remote_access_start_stop() {
        let mut ctl = controller(RecordingTransport::after_login().reply_json(OK).reply_json(OK));
        assert_ok!(ctl.login(false).await);

        let started = assert_ok!(ctl.set_remote_access(2, RemoteAccessAction::Start).await);
        assert!(started.is_success());
        assert!(started.error_message.is_empty());
        assert_ok!(ctl.set_remote_access(2, RemoteAccessAction::Stop).await);

        let requests = ctl.transport().requests();
        assert_eq!(
            ctl.transport().endpoints(),
            vec![Endpoint::Login, Endpoint::SetRemoteAccess, Endpoint::SetRemoteAccess]
        );
        assert_eq!(requests[1].param("LoxxId"), Some("2"));
        assert_eq!(requests[1].param("Action"), Some("Start"));
        assert_eq!(requests[2].param("LoxxId"), Some("2"));
        assert_eq!(requests[2].param("Action"), Some("Stop"));
    }

    #[tokio::test]
    async fn test_set_panel_failure_is_protocol_error() {
        let mut ctl = controller(
            RecordingTransport::after_login()
                .reply_json(r#"{"Status":"FAILURE","ErrMsg":"Invalid action"}"#),
        );
        assert_ok!(ctl.login(false).await);

        match ctl.set_panel(PanelAction::ForceDisarm).await {
            Err(Error::Protocol { message }) => assert_eq!(message, "Invalid action"),
            other => panic!("Wrong result: {:?}", other),
        }
        assert_eq!(ctl.transport().requests()[1].param("Action"), Some("ForcedDisarm"));
    }

    #[tokio::test]
    async fn test_lock_list_from_page() {
        let page = "<html><head><script>\n\
            var gSmartloxxList={\"List\":[{\"ID\":\"2\",\"Disabled\":\"OFF\",\"Name\":\"Front door\",\"HwId\":\"0A1B2C\",\"Cluster\":\"1\"},\
            {\"ID\":\"4\",\"Disabled\":\"OFF\",\"Name\":\"Garage\",\"HwId\":\"0A1B2D\",\"Cluster\":\"1\"}],\
            \"Index\":0,\"ListCount\":2,\"TotalCount\":2};\n</script></head></html>";
        let mut ctl = controller(RecordingTransport::after_login().reply(HttpReply::ok(page)));
        assert_ok!(ctl.login(false).await);

        let locks = assert_ok!(ctl.get_user_smartloxx().await);
        assert_eq!(locks.list_count, 2);
        assert_eq!(locks.total_count, 2);
        assert_eq!(locks.items.len(), 2);

        let front = LockDescriptor {
            id: 2,
            disabled: false,
            name: "Front door".to_string(),
            hardware_id: "0A1B2C".to_string(),
            cluster: 1,
        };
        assert!(locks.items.contains(&front));
        assert!(locks.items.iter().any(|l| l.id == 4 && l.name == "Garage"));
    }

    #[tokio::test]
    async fn test_user_info_from_page() {
        let page = "<script>\nvar g_UserInfo={\"Username\":\"admin\",\"Permission\":\"Admin\",\"Language\":\"en\"}\n</script>";
        let mut ctl = controller(RecordingTransport::after_login().reply(HttpReply::ok(page)));
        assert_ok!(ctl.login(false).await);

        let info = assert_ok!(ctl.get_user_info().await);
        assert_eq!(info.username.as_deref(), Some("admin"));
        assert_eq!(info.extra.get("Language"), Some(&serde_json::Value::from("en")));
    }

    #[tokio::test]
    async fn test_system_status_params() {
        let mut ctl = controller(
            RecordingTransport::after_login()
                .reply_json(r#"{"Status":"SUCCESS","ErrMsg":"","Time":"08:00","LogoutTime":15}"#),
        );
        assert_ok!(ctl.login(false).await);

        let status = assert_ok!(ctl.get_system_status(true).await);
        assert_eq!(status.logout_seconds, Some(15));

        let request = &ctl.transport().requests()[1];
        assert_eq!(request.param("LoxxState"), Some("OFF"));
        assert_eq!(request.param("PauseAutoLogout"), Some("ON"));
    }

    #[tokio::test]
    async fn test_event_log_filtering() {
        let body = r#"{"Index":0,"ListCount":3,"TotalCount":3,"List":[
            {"Date":"2024-03-01 08:00","Event":"Open","Smartloxx":"Front door","User":"admin","Camera":""},
            {"Date":"2024-03-01 08:05","Event":"Open","Smartloxx":"Garage","User":"admin","Camera":""},
            {"Date":"2024-03-01 08:10","Event":"Close","Smartloxx":"front door","User":"admin","Camera":""}]}"#;
        let mut ctl = controller(RecordingTransport::after_login().reply_json(body));
        assert_ok!(ctl.login(false).await);

        let query = EventLogQuery::default()
            .kind(EventLogKind::Access)
            .lock("Front door");
        let page = assert_ok!(ctl.get_event_log(&query).await);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total_count, 3);
        assert_eq!(ctl.transport().requests()[1].param("Type"), Some("Access"));
    }

    const LOCK_PAGE: &str = "<script>\nvar gSmartloxxList={\"List\":[{\"ID\":\"2\",\"Name\":\"Front door\"},\
        {\"ID\":\"4\",\"Name\":\"Garage\"}],\"Index\":0,\"ListCount\":2,\"TotalCount\":2};\n</script>";

    #[tokio::test]
    async fn test_event_log_by_lock_id() {
        let body = r#"{"Index":0,"ListCount":2,"TotalCount":2,"List":[
            {"Date":"2024-03-01 08:00","Event":"Open","Smartloxx":"Front door","User":"admin","Camera":""},
            {"Date":"2024-03-01 08:05","Event":"Open","Smartloxx":"Garage","User":"admin","Camera":""}]}"#;
        let mut ctl = controller(
            RecordingTransport::after_login()
                .reply(HttpReply::ok(LOCK_PAGE))
                .reply_json(body),
        );
        assert_ok!(ctl.login(false).await);

        let page = assert_ok!(ctl.get_event_log(&EventLogQuery::default().lock_id(4)).await);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].lock_ref, "Garage");
        assert_eq!(
            ctl.transport().endpoints(),
            vec![Endpoint::Login, Endpoint::UserSmartloxx, Endpoint::GetEventLog]
        );
    }

    #[tokio::test]
    async fn test_event_log_unknown_lock_id() {
        let mut ctl = controller(RecordingTransport::after_login().reply(HttpReply::ok(LOCK_PAGE)));
        assert_ok!(ctl.login(false).await);

        let err = assert_err!(ctl.get_event_log(&EventLogQuery::default().lock_id(9)).await);
        assert!(matches!(err, Error::UnknownLock(9)));
        assert_eq!(ctl.transport().requests().len(), 2);
    }

    #[tokio::test]
    async fn test_scoped_session_logs_out_on_error() {
        let transport = RecordingTransport::after_login()
            .reply_json(r#"{"Armed":"OFF","ReadyForSet":"OFF"}"#)
            .reply_json(r#"{"Status":"FAILURE","ErrMsg":"Not ready for arm"}"#)
            .reply_json(OK);
        let mut ctl = controller(transport);

        let result = ctl
            .with_session(false, async |c: &mut Controller<RecordingTransport>| {
                let status = c.get_panel_status().await?;
                assert_eq!(status.armed, Tristate::Off);
                c.set_panel(PanelAction::Arm).await
            })
            .await;

        assert_eq!(
            assert_err!(result).protocol_message(),
            Some("Not ready for arm")
        );
        assert_eq!(
            ctl.transport().endpoints(),
            vec![Endpoint::Login, Endpoint::GetPanelStatus, Endpoint::SetPanel, Endpoint::Logout]
        );
        assert!(!ctl.is_authenticated());
    }

    #[tokio::test]
    async fn test_scoped_session_keeps_result_when_logout_fails() {
        let transport = RecordingTransport::after_login().reply_json(OK).fail(503);
        let mut ctl = controller(transport);

        let result = ctl
            .with_session(false, async |c: &mut Controller<RecordingTransport>| {
                c.set_panel(PanelAction::Arm).await
            })
            .await;

        assert!(assert_ok!(result).is_success());
        assert_eq!(ctl.transport().endpoints().last(), Some(&Endpoint::Logout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoped_session_releases_idle_session() {
        let transport = RecordingTransport::after_login().reply_json(OK);
        let mut ctl = controller(transport);

        let result = ctl
            .with_session(false, async |c: &mut Controller<RecordingTransport>| {
                tokio::time::advance(std::time::Duration::from_secs(16)).await;
                c.get_panel_status().await
            })
            .await;

        assert!(matches!(assert_err!(result), Error::NotAuthenticated));
        // The refused call sent nothing, the logout still went out with the old cookie
        let requests = ctl.transport().requests();
        assert_eq!(ctl.transport().endpoints(), vec![Endpoint::Login, Endpoint::Logout]);
        assert_eq!(requests[1].cookie.as_deref(), Some("SESSID=abc"));
        assert!(!ctl.is_authenticated());
    }

    #[tokio::test]
    async fn test_scoped_session_skips_body_when_login_fails() {
        let transport =
            RecordingTransport::new().reply_json(r#"{"Status":"FAIL","ErrMsg":"ACCOUNT_LOGGED"}"#);
        let mut ctl = controller(transport);
        let mut ran = false;

        let result = ctl
            .with_session(false, async |_: &mut Controller<RecordingTransport>| {
                ran = true;
                Ok::<(), Error>(())
            })
            .await;

        assert!(matches!(result, Err(Error::Auth(crate::AuthError::AlreadyLoggedIn))));
        assert!(!ran);
        assert_eq!(ctl.transport().endpoints(), vec![Endpoint::Login]);
    }
}
