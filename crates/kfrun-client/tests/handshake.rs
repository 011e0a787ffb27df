// Login handshake against the fake gateway.

mod common;

use std::time::Duration;

use axum::{http::StatusCode, response::Redirect, routing::get, Router};
use kfrun_client::{AuthSession, CancellationToken, ClientConfig, ClientError, Credentials};

use common::FakeState;

#[tokio::test]
async fn test_login_extracts_token_and_cookie() {
    let fake = common::start(FakeState::default()).await;

    let session = AuthSession::login(&fake.config(), &fake.credentials())
        .await
        .unwrap();

    assert_eq!(session.cookie_header(), "authservice_session=session-1");
    assert_eq!(session.namespace(), common::NAMESPACE);
    assert_eq!(fake.with_state(|s| s.logins), 1);
}

#[tokio::test]
async fn test_missing_token_is_protocol_error() {
    let fake = common::start(FakeState {
        omit_token: true,
        ..Default::default()
    })
    .await;

    let err = AuthSession::login(&fake.config(), &fake.credentials())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::AuthProtocol(_)), "got {err}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_missing_cookie_is_protocol_error() {
    let fake = common::start(FakeState {
        omit_cookie: true,
        ..Default::default()
    })
    .await;

    let err = AuthSession::login(&fake.config(), &fake.credentials())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::AuthProtocol(_)), "got {err}");
}

#[tokio::test]
async fn test_wrong_password_is_protocol_error() {
    let fake = common::start(FakeState::default()).await;

    let err = AuthSession::login(&fake.config(), &Credentials::new(common::USERNAME, "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::AuthProtocol(_)));
    assert_eq!(fake.with_state(|s| s.logins), 0);
}

#[tokio::test]
async fn test_unreachable_gateway_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = ClientConfig::new(format!("http://127.0.0.1:{port}"), "ns");
    let err = AuthSession::login(&config, &Credentials::new("u", "p"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport { .. }), "got {err}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let fake = common::start(FakeState {
        landing_delay: Some(Duration::from_secs(5)),
        ..Default::default()
    })
    .await;
    let config = fake.config().with_timeout(Duration::from_millis(200));

    let err = AuthSession::login(&config, &fake.credentials())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout { .. }), "got {err}");
}

#[tokio::test]
async fn test_cancelled_login() {
    let fake = common::start(FakeState {
        landing_delay: Some(Duration::from_secs(5)),
        ..Default::default()
    })
    .await;
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = AuthSession::login_with_cancel(&fake.config(), &fake.credentials(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Cancelled));
    assert_eq!(fake.with_state(|s| s.logins), 0);
}

#[tokio::test]
async fn test_custom_cookie_name_not_found() {
    let fake = common::start(FakeState::default()).await;
    let mut config = fake.config();
    config.session_cookie_name = "oauth2_proxy".to_string();

    let err = AuthSession::login(&config, &fake.credentials())
        .await
        .unwrap_err();
    match err {
        ClientError::AuthProtocol(msg) => assert!(msg.contains("oauth2_proxy")),
        other => panic!("unexpected error: {other}"),
    }
}

/// Serve `app` on an ephemeral port and return a config pointing at it.
async fn serve(app: Router) -> ClientConfig {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    ClientConfig::new(format!("http://127.0.0.1:{port}"), "ns")
}

#[tokio::test]
async fn test_redirect_loop_is_protocol_error() {
    let config = serve(Router::new().route("/", get(|| async { Redirect::to("/") }))).await;

    let err = AuthSession::login(&config, &Credentials::new("u", "p"))
        .await
        .unwrap_err();
    match err {
        ClientError::AuthProtocol(message) => assert!(message.contains("redirects"), "got {message}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_gateway_server_error_is_retryable() {
    let config = serve(Router::new().route(
        "/",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "upstream connect error") }),
    ))
    .await;

    let err = AuthSession::login(&config, &Credentials::new("u", "p"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, ClientError::GatewayUnavailable { status: 503, .. }),
        "got {err}"
    );
    assert!(err.is_retryable());
}
