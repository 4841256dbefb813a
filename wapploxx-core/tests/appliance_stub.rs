//! End-to-end tests of the HTTP transport against a stub controller

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio_test::{assert_err, assert_ok};

use wapploxx_core::{AuthError, Controller, Credentials, Error, Locks, PanelAction, RemoteAccessAction};

const SESSION_COOKIE: &str = "SESSID=5f2b9c";

#[derive(Clone, Default)]
struct Stub {
    /// Paths hit, in order
    hits: Arc<Mutex<Vec<String>>>,
    /// The next login is answered with ACCOUNT_LOGGED
    occupied: Arc<Mutex<bool>>,
}

impl Stub {
    fn record(&self, path: &str) {
        self.hits.lock().unwrap().push(path.to_string());
    }

    fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get(COOKIE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|c| c.split("; ").any(|p| p == SESSION_COOKIE))
}

async fn login(State(stub): State<Stub>, Query(params): Query<HashMap<String, String>>) -> Response {
    stub.record("login.cgi");

    if *stub.occupied.lock().unwrap() {
        return r#"{"Status":"FAIL","ErrMsg":"ACCOUNT_LOGGED"}"#.into_response();
    }
    // "admin" / "secret", base64
    let valid = params.get("Username").map(String::as_str) == Some("YWRtaW4=")
        && params.get("Password").map(String::as_str) == Some("c2VjcmV0")
        && params.get("Source").map(String::as_str) == Some("Webpage")
        && params.contains_key("ts");
    if !valid {
        return r#"{"Status":"FAIL","ErrMsg":"UNAUTH"}"#.into_response();
    }

    (
        [(SET_COOKIE, format!("{}; Path=/; HttpOnly", SESSION_COOKIE))],
        r#"{"Status":"SUCCESS","ErrMsg":"","Username":"admin","Permission":"Admin","BlockTime":0}"#,
    )
        .into_response()
}

async fn logout(State(stub): State<Stub>, headers: HeaderMap) -> Response {
    stub.record("logout.cgi");
    if !has_session(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    r#"{"Status":"SUCCESS","ErrMsg":""}"#.into_response()
}

async fn user_smartloxx(State(stub): State<Stub>, headers: HeaderMap) -> Response {
    stub.record("user_smartloxx.cgi");
    if !has_session(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    "<html><head><script type=\"text/javascript\">\n\
     var gSmartloxxList = {\"List\":[{\"ID\":\"2\",\"Disabled\":\"OFF\",\"Name\":\"Front door\",\"HwId\":\"0A1B2C\",\"Cluster\":\"1\"},\
     {\"ID\":\"4\",\"Disabled\":\"OFF\",\"Name\":\"Garage\",\"HwId\":\"0A1B2D\",\"Cluster\":\"1\"}],\"Index\":0,\"ListCount\":2,\"TotalCount\":2};\n\
     </script></head><body></body></html>"
        .into_response()
}

async fn set_remote_access(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    stub.record("setRemoteAccess.cgi");
    if !has_session(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match (params.get("LoxxId").map(String::as_str), params.get("Action").map(String::as_str)) {
        (Some("2"), Some("Start" | "Stop")) => r#"{"Status":"SUCCESS","ErrMsg":""}"#.into_response(),
        (Some(_), Some("Start" | "Stop")) => r#"{"Status":"FAILURE","ErrMsg":"Lock offline"}"#.into_response(),
        _ => r#"{"Status":"FAILURE","ErrMsg":"Invalid action"}"#.into_response(),
    }
}

async fn set_panel(State(stub): State<Stub>) -> Response {
    // Answers 401 regardless, as if the controller timed the session out
    stub.record("setPanel.cgi");
    StatusCode::UNAUTHORIZED.into_response()
}

async fn spawn_stub(stub: Stub) -> SocketAddr {
    let app = Router::new()
        .route("/login.cgi", get(login))
        .route("/logout.cgi", get(logout))
        .route("/user_smartloxx.cgi", get(user_smartloxx))
        .route("/setRemoteAccess.cgi", get(set_remote_access))
        .route("/setPanel.cgi", get(set_panel))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn controller(addr: SocketAddr, password: &str) -> Controller {
    // Trailing slash on purpose
    Controller::new(Credentials::new(&format!("http://{}/", addr), "admin", password)).unwrap()
}

#[tokio::test]
async fn test_session_round_trip() {
    let stub = Stub::default();
    let addr = spawn_stub(stub.clone()).await;
    let mut ctl = controller(addr, "secret");

    let session = assert_ok!(ctl.login(false).await);
    assert_eq!(session.cookie(), SESSION_COOKIE);
    assert_eq!(session.permission.as_deref(), Some("Admin"));

    let resp = assert_ok!(ctl.set_remote_access(2, RemoteAccessAction::Start).await);
    assert!(resp.is_success());

    assert_ok!(ctl.logout().await);
    assert!(!ctl.is_authenticated());
    assert_eq!(stub.hits(), vec!["login.cgi", "setRemoteAccess.cgi", "logout.cgi"]);
}

#[tokio::test]
async fn test_fan_out_over_http() {
    let stub = Stub::default();
    let addr = spawn_stub(stub.clone()).await;
    let mut ctl = controller(addr, "secret");

    let outcome = ctl
        .with_session(false, async |c: &mut Controller| {
            let mut locks = Locks::fetch(c).await?;
            Ok::<_, Error>((locks.open_all(c).await, locks))
        })
        .await;

    let (fan_out, locks) = assert_ok!(outcome);
    let err = assert_err!(fan_out);
    assert_eq!(err.attempted, 2);
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].0, 4);
    assert_eq!(err.failures[0].1.protocol_message(), Some("Lock offline"));
    assert!(locks.get(2).is_some_and(|l| l.is_open()));

    assert_eq!(stub.hits().last().map(String::as_str), Some("logout.cgi"));
}

#[tokio::test]
async fn test_wrong_password() {
    let stub = Stub::default();
    let addr = spawn_stub(stub.clone()).await;
    let mut ctl = controller(addr, "hunter2");

    let err = assert_err!(ctl.login(false).await);
    assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials)));
    assert!(!ctl.is_authenticated());
}

#[tokio::test]
async fn test_account_in_use() {
    let stub = Stub::default();
    *stub.occupied.lock().unwrap() = true;
    let addr = spawn_stub(stub.clone()).await;
    let mut ctl = controller(addr, "secret");

    let err = assert_err!(ctl.login(false).await);
    assert!(matches!(err, Error::Auth(AuthError::AlreadyLoggedIn)));
}

#[tokio::test]
async fn test_expired_session_on_controller() {
    let stub = Stub::default();
    let addr = spawn_stub(stub.clone()).await;
    let mut ctl = controller(addr, "secret");

    let result = ctl
        .with_session(false, async |c: &mut Controller| c.set_panel(PanelAction::Arm).await)
        .await;

    assert!(matches!(assert_err!(result), Error::NotAuthenticated));
    // Session already gone locally: no logout request
    assert_eq!(stub.hits(), vec!["login.cgi", "setPanel.cgi"]);
}
