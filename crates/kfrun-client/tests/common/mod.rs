//! In-process fake login gateway and orchestrator.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use kfrun_client::{ClientConfig, Credentials};

pub const TOKEN: &str = "abc123";
pub const USERNAME: &str = "user@example.com";
pub const PASSWORD: &str = "12341234";
pub const NAMESPACE: &str = "kubeflow-user-example-com";

/// Knobs and recorded traffic of the fake.
#[derive(Default)]
pub struct FakeState {
    /// Embed the login token in the login page.
    pub omit_token: bool,
    /// Set the session cookie after a correct login.
    pub omit_cookie: bool,
    /// Delay before answering the landing page.
    pub landing_delay: Option<Duration>,
    /// Delay before answering run creation.
    pub run_delay: Option<Duration>,
    /// Reject this many run creations with 401, invalidating the session.
    pub expire_sessions: u32,
    /// Reject run creation with this status and body.
    pub reject_runs: Option<(u16, String)>,

    pub logins: u32,
    pub valid_cookies: HashSet<String>,
    pub experiments: Vec<(String, String)>,
    pub run_requests: Vec<Value>,
    pub run_cookies: Vec<String>,
}

pub type Shared = Arc<Mutex<FakeState>>;

pub struct Fake {
    pub endpoint: String,
    pub state: Shared,
}

impl Fake {
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.endpoint.clone(), NAMESPACE)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(USERNAME, PASSWORD)
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

pub async fn start(state: FakeState) -> Fake {
    let state: Shared = Arc::new(Mutex::new(state));
    let app = Router::new()
        .route("/", get(landing))
        .route("/dex/auth", get(dex_auth))
        .route("/dex/login", get(plain_login_page))
        .route("/dex/auth/local", get(login_form).post(login_submit))
        .route("/authservice/oidc/callback", get(oidc_callback))
        .route(
            "/pipeline/apis/v1beta1/experiments",
            get(list_experiments).post(create_experiment),
        )
        .route("/pipeline/apis/v1beta1/runs", axum::routing::post(create_run))
        .route("/pipeline/apis/v1beta1/runs/:id", get(get_run))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Fake {
        endpoint: format!("http://127.0.0.1:{port}"),
        state,
    }
}

fn redirect(location: &str) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, location.to_string())],
        format!("<a href=\"{location}\">Found</a>."),
    )
        .into_response()
}

fn session_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .filter_map(|p| p.trim().split_once('='))
        .find(|(k, _)| *k == "authservice_session")
        .map(|(_, v)| v.to_string())
}

fn authorized(state: &Shared, headers: &HeaderMap) -> Option<String> {
    let cookie = session_of(headers)?;
    state
        .lock()
        .unwrap()
        .valid_cookies
        .contains(&cookie)
        .then_some(cookie)
}

async fn landing(State(state): State<Shared>, headers: HeaderMap) -> Response {
    let delay = state.lock().unwrap().landing_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    if authorized(&state, &headers).is_some() {
        return (StatusCode::OK, "<html>Central dashboard</html>").into_response();
    }
    if state.lock().unwrap().omit_token {
        return redirect("/dex/login");
    }
    redirect("/dex/auth?client_id=kubeflow-oidc-authservice")
}

async fn dex_auth() -> Response {
    redirect(&format!("/dex/auth/local?req={TOKEN}"))
}

async fn plain_login_page() -> Response {
    (StatusCode::OK, "<html><form method=\"post\">Sign in</form></html>").into_response()
}

fn login_page() -> String {
    format!(
        "<html><form method=\"post\" action=\"/dex/auth/local?req={TOKEN}\">\
         <input name=\"login\"/><input name=\"password\" type=\"password\"/></form></html>"
    )
}

async fn login_form() -> Response {
    (StatusCode::OK, login_page()).into_response()
}

#[derive(Deserialize)]
struct LoginForm {
    login: String,
    password: String,
}

async fn login_submit(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    Form(form): Form<LoginForm>,
) -> Response {
    let ok = query.get("req").map(String::as_str) == Some(TOKEN)
        && form.login == USERNAME
        && form.password == PASSWORD;
    if !ok || state.lock().unwrap().omit_cookie {
        return (StatusCode::OK, login_page()).into_response();
    }
    redirect("/authservice/oidc/callback?code=xyz")
}

async fn oidc_callback(State(state): State<Shared>) -> Response {
    let cookie = {
        let mut s = state.lock().unwrap();
        s.logins += 1;
        let cookie = format!("session-{}", s.logins);
        s.valid_cookies.insert(cookie.clone());
        cookie
    };
    (
        StatusCode::FOUND,
        [
            (header::LOCATION, "/".to_string()),
            (
                header::SET_COOKIE,
                format!("authservice_session={cookie}; Path=/; HttpOnly"),
            ),
        ],
    )
        .into_response()
}

async fn list_experiments(
    State(state): State<Shared>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    if authorized(&state, &headers).is_none() {
        return redirect("/dex/auth");
    }
    if query.get("resource_reference_key.id").map(String::as_str) != Some(NAMESPACE) {
        return (StatusCode::BAD_REQUEST, "namespace required").into_response();
    }
    let experiments: Vec<Value> = state
        .lock()
        .unwrap()
        .experiments
        .iter()
        .map(|(id, name)| json!({"id": id, "name": name}))
        .collect();
    Json(json!({"experiments": experiments, "total_size": experiments.len()})).into_response()
}

async fn create_experiment(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if authorized(&state, &headers).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let name = body["name"].as_str().unwrap_or_default().to_string();
    let mut s = state.lock().unwrap();
    let id = format!("exp-{}", s.experiments.len() + 1);
    s.experiments.push((id.clone(), name.clone()));
    Json(json!({"id": id, "name": name})).into_response()
}

async fn create_run(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let delay = state.lock().unwrap().run_delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let Some(cookie) = authorized(&state, &headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let mut s = state.lock().unwrap();
    s.run_requests.push(body.clone());
    s.run_cookies.push(cookie.clone());

    if s.expire_sessions > 0 {
        s.expire_sessions -= 1;
        s.valid_cookies.remove(&cookie);
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some((status, message)) = s.reject_runs.clone() {
        let status = StatusCode::from_u16(status).unwrap();
        return (status, message).into_response();
    }

    let id = format!("run-{}", s.run_requests.len());
    Json(json!({
        "run": {
            "id": id,
            "name": body["name"],
            "status": "Pending",
            "created_at": "2024-01-15T12:00:00Z",
            "pipeline_spec": body["pipeline_spec"],
            "resource_references": body["resource_references"],
        }
    }))
    .into_response()
}

async fn get_run(
    State(state): State<Shared>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if authorized(&state, &headers).is_none() {
        return StatusCode::FORBIDDEN.into_response();
    }
    Json(json!({"run": {"id": id, "name": "training-run", "status": "Succeeded"}})).into_response()
}
