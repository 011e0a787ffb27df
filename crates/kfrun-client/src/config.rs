//! Client configuration and credentials.

use std::fmt;
use std::time::Duration;

/// Orchestrator and login-gateway configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway endpoint (e.g., "http://localhost:8080").
    pub endpoint: String,

    /// User namespace runs and experiments are scoped to.
    pub namespace: String,

    /// Timeout applied to every HTTP request.
    pub request_timeout: Duration,

    /// Query parameter carrying the one-time login token.
    pub login_token_param: String,

    /// Cookie holding the authenticated session.
    pub session_cookie_name: String,

    /// Path of the gateway's username/password login form.
    pub local_auth_path: String,

    /// Path prefix of the orchestrator API behind the gateway.
    pub pipeline_api_prefix: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            namespace: "kubeflow-user-example-com".to_string(),
            request_timeout: Duration::from_secs(30),
            login_token_param: "req".to_string(),
            session_cookie_name: "authservice_session".to_string(),
            local_auth_path: "/dex/auth/local".to_string(),
            pipeline_api_prefix: "/pipeline".to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a configuration for an endpoint and namespace.
    pub fn new(endpoint: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Builder method to set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Endpoint without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    /// Orchestrator API root (`<endpoint><pipeline_api_prefix>`).
    pub fn pipeline_host(&self) -> String {
        format!(
            "{}/{}",
            self.base_url(),
            self.pipeline_api_prefix.trim_matches('/')
        )
    }
}

/// Login credentials. Missing fields are filled in at login time.
#[derive(Clone, Default)]
pub struct Credentials {
    /// User id or email. Defaults to the OS user.
    pub username: Option<String>,
    /// Password. The CLI prompts for it when absent.
    pub password: Option<String>,
}

impl Credentials {
    /// Create credentials from a username and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Username to log in with: the configured one, else the OS user.
    pub fn resolve_username(&self) -> Option<String> {
        self.username
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(os_user)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Current OS user from `USER` or `USERNAME`.
pub fn os_user() -> Option<String> {
    ["USER", "USERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
}
