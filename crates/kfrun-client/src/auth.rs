//! Cookie-based login handshake against a gated orchestrator.
//!
//! The gateway has no API tokens; the handshake replays the browser flow:
//!
//! 1. `GET <endpoint>/` and follow the redirect chain to the login form
//! 2. scrape the one-time `req` token from the final page
//! 3. `POST <endpoint>/dex/auth/local?req=<token>` with `login`/`password`
//! 4. read the `authservice_session` cookie set along the way

use std::fmt;
use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, LOCATION};
use reqwest::{redirect, Client, RequestBuilder, Response, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument, Span};

use crate::config::{ClientConfig, Credentials};
use crate::error::ClientError;
use crate::token::extract_login_token;

/// Redirect hops followed per handshake step.
const MAX_REDIRECTS: usize = 10;

/// An authenticated session with the orchestrator.
///
/// Holds the session cookie for one submission lifetime. Never persisted;
/// renew it with [`AuthSession::login`] when the orchestrator rejects it.
#[derive(Clone)]
pub struct AuthSession {
    config: ClientConfig,
    cookie_value: String,
    span: Span,
}

impl AuthSession {
    /// Run the login handshake.
    pub async fn login(config: &ClientConfig, credentials: &Credentials) -> Result<Self, ClientError> {
        Self::login_with_cancel(config, credentials, &CancellationToken::new()).await
    }

    /// Run the login handshake, aborting when `cancel` fires.
    ///
    /// A cancelled handshake retains no session state.
    pub async fn login_with_cancel(
        config: &ClientConfig,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<Self, ClientError> {
        let span = tracing::info_span!(
            "auth_session",
            endpoint = %config.base_url(),
            namespace = %config.namespace
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(parent: &span, "Login cancelled");
                Err(ClientError::Cancelled)
            }
            result = handshake(config, credentials).instrument(span.clone()) => {
                let cookie_value = result?;
                info!(parent: &span, "Login succeeded");
                Ok(Self {
                    config: config.clone(),
                    cookie_value,
                    span,
                })
            }
        }
    }

    /// Wrap a session cookie obtained elsewhere.
    pub fn from_cookie(config: &ClientConfig, cookie_value: impl Into<String>) -> Self {
        Self {
            config: config.clone(),
            cookie_value: cookie_value.into(),
            span: tracing::info_span!("auth_session", endpoint = %config.base_url()),
        }
    }

    /// Configuration the session was created with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Gateway endpoint.
    pub fn endpoint(&self) -> &str {
        self.config.base_url()
    }

    /// Namespace the session is scoped to.
    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Session span.
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// `Cookie` header value carrying the session.
    pub fn cookie_header(&self) -> String {
        format!("{}={}", self.config.session_cookie_name, self.cookie_value)
    }

    /// HTTP client that sends the session cookie on every request.
    ///
    /// Redirects are not followed, so a bounce to the login page is visible
    /// to the caller as a 3xx.
    pub fn authenticated_client(&self) -> Result<Client, ClientError> {
        let mut cookie = HeaderValue::from_str(&self.cookie_header())
            .map_err(|_| ClientError::AuthProtocol("session cookie is not a valid header value".to_string()))?;
        cookie.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, cookie);

        Client::builder()
            .default_headers(headers)
            .redirect(redirect::Policy::none())
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| ClientError::from_reqwest(self.endpoint(), e))
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("endpoint", &self.endpoint())
            .field("namespace", &self.namespace())
            .field("cookie", &"<redacted>")
            .finish()
    }
}

/// Final state of a request after following its redirect chain.
struct Exchange {
    final_url: Url,
    final_body: String,
    last_redirect: Option<Hop>,
}

struct Hop {
    location: String,
    body: String,
}

impl Exchange {
    /// Texts to search for the login token, most specific first.
    fn token_sources(&self) -> Vec<&str> {
        let mut sources = vec![self.final_body.as_str()];
        if let Some(hop) = &self.last_redirect {
            sources.push(hop.body.as_str());
            sources.push(hop.location.as_str());
        }
        sources.push(self.final_url.as_str());
        sources
    }
}

/// Run steps 1-4 and return the session cookie value.
async fn handshake(config: &ClientConfig, credentials: &Credentials) -> Result<String, ClientError> {
    let endpoint = config.base_url();
    let endpoint_url =
        Url::parse(endpoint).map_err(|_| ClientError::InvalidEndpoint(config.endpoint.clone()))?;

    let username = credentials.resolve_username().ok_or_else(|| {
        ClientError::AuthProtocol("no username given and no OS user found".to_string())
    })?;
    let password = credentials
        .password
        .as_deref()
        .ok_or_else(|| ClientError::AuthProtocol("no password supplied".to_string()))?;

    let jar = Arc::new(Jar::default());
    let client = Client::builder()
        .cookie_provider(jar.clone())
        .redirect(redirect::Policy::none())
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| ClientError::from_reqwest(endpoint, e))?;

    debug!("Requesting login page");
    let landing = follow(&client, client.get(endpoint_url.clone()), endpoint).await?;
    let token = landing
        .token_sources()
        .into_iter()
        .find_map(|text| extract_login_token(text, &config.login_token_param))
        .ok_or_else(|| {
            ClientError::AuthProtocol(format!(
                "login page at {} has no '{}' token",
                landing.final_url, config.login_token_param
            ))
        })?;
    debug!(login_page = %landing.final_url, "Found login token");

    let login_url = format!(
        "{}/{}",
        endpoint,
        config.local_auth_path.trim_start_matches('/')
    );
    let form = [("login", username.as_str()), ("password", password)];
    let submit = client
        .post(&login_url)
        .query(&[(config.login_token_param.as_str(), token.as_str())])
        .form(&form);
    debug!(url = %login_url, user = %username, "Submitting credentials");
    follow(&client, submit, endpoint).await?;

    session_cookie(jar.as_ref(), &endpoint_url, &config.session_cookie_name).ok_or_else(|| {
        ClientError::AuthProtocol(format!(
            "gateway did not set the '{}' cookie (check credentials)",
            config.session_cookie_name
        ))
    })
}

/// Send `request` and follow redirects with GETs, sharing the cookie jar.
async fn follow(client: &Client, request: RequestBuilder, endpoint: &str) -> Result<Exchange, ClientError> {
    let mut response = request
        .send()
        .await
        .map_err(|e| ClientError::from_reqwest(endpoint, e))?;
    let mut last_redirect = None;
    let mut hops = 0;

    while let Some(location) = redirect_location(&response) {
        if hops == MAX_REDIRECTS {
            return Err(ClientError::AuthProtocol(format!(
                "more than {MAX_REDIRECTS} redirects, last to '{location}'"
            )));
        }
        hops += 1;
        let next = response.url().join(&location).map_err(|_| {
            ClientError::AuthProtocol(format!("invalid redirect location '{location}'"))
        })?;
        debug!(status = %response.status(), location = %location, "Following redirect");

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::from_reqwest(endpoint, e))?;
        last_redirect = Some(Hop { location, body });

        response = client
            .get(next)
            .send()
            .await
            .map_err(|e| ClientError::from_reqwest(endpoint, e))?;
    }

    let status = response.status();
    if status.is_server_error() {
        return Err(ClientError::GatewayUnavailable {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    let final_url = response.url().clone();
    let final_body = response
        .text()
        .await
        .map_err(|e| ClientError::from_reqwest(endpoint, e))?;

    Ok(Exchange {
        final_url,
        final_body,
        last_redirect,
    })
}

fn redirect_location(response: &Response) -> Option<String> {
    if !response.status().is_redirection() {
        return None;
    }
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Find `name` among the cookies the jar would send to `url`.
fn session_cookie(jar: &Jar, url: &Url, name: &str) -> Option<String> {
    let header = jar.cookies(url)?;
    let header = header.to_str().ok()?;
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}
