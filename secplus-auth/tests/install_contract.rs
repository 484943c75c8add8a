//! Exercises the HTTP backend against an in-process double that enforces
//! the install-code contract: codes are single use, expire after thirty
//! minutes, and redeem through a one-time login token.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::sync::mpsc;
use uuid::Uuid;

use secplus_api::endpoints::install::CreateInstall;
use secplus_api::Client;
use secplus_auth::auth_backend::{AuthBackend, HttpAuthBackend};
use secplus_auth::device::DeviceDescriptor;
use secplus_auth::recovery::{AuthState, Recovery, Trigger};
use secplus_auth::store::{KvStore, Platform};
use secplus_auth::AuthError;

const CODE_TTL_MINUTES: i64 = 30;

struct CodeRow {
    email: String,
    issued_at: DateTime<Utc>,
    used: bool,
}

#[derive(Default)]
struct ContractState {
    codes: DashMap<String, CodeRow>,
    otps: DashMap<String, String>,
    access_tokens: DashMap<String, String>,
    refresh_tokens: DashMap<String, String>,
}

impl ContractState {
    fn mint_session(&self, email: &str) -> Value {
        let access = format!("at-{}", Uuid::new_v4().simple());
        let refresh = format!("rt-{}", Uuid::new_v4().simple());
        self.access_tokens.insert(access.clone(), email.to_string());
        self.refresh_tokens.insert(refresh.clone(), email.to_string());
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "token_type": "bearer",
            "expires_in": 3600,
            "user": {"id": format!("u-{email}"), "email": email}
        })
    }
}

#[derive(Deserialize)]
struct LinkParams {
    flow: String,
    email: Option<String>,
    code: Option<String>,
}

#[derive(Deserialize)]
struct VerifyBody {
    email: String,
    token: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct TokenParams {
    grant_type: String,
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh_token: String,
}

fn bad(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message})))
}

async fn generate_link(
    State(state): State<Arc<ContractState>>,
    Query(params): Query<LinkParams>,
) -> (StatusCode, Json<Value>) {
    match params.flow.as_str() {
        "create-install" => {
            let Some(email) = params.email.filter(|e| e.contains('@')) else {
                return bad("email is required");
            };
            let code = format!("IC-{}", Uuid::new_v4().simple());
            state.codes.insert(
                code.clone(),
                CodeRow {
                    email: email.clone(),
                    issued_at: Utc::now(),
                    used: false,
                },
            );
            (
                StatusCode::OK,
                Json(json!({"ok": true, "code": code, "email": email})),
            )
        }
        "exchange-install" => {
            let Some(code) = params.code else {
                return bad("code is required");
            };
            let Some(mut row) = state.codes.get_mut(&code) else {
                return bad("Código inválido");
            };
            if row.used {
                return bad("Código já utilizado");
            }
            if Utc::now() - row.issued_at > Duration::minutes(CODE_TTL_MINUTES) {
                return bad("Código expirado");
            }
            row.used = true;
            let email = row.email.clone();
            drop(row);

            let otp = Uuid::new_v4().simple().to_string();
            state.otps.insert(otp.clone(), email.clone());
            (
                StatusCode::OK,
                Json(json!({"ok": true, "email": email, "email_otp": otp})),
            )
        }
        _ => bad("unknown flow"),
    }
}

async fn verify_otp(
    State(state): State<Arc<ContractState>>,
    Json(body): Json<VerifyBody>,
) -> (StatusCode, Json<Value>) {
    if body.kind != "magiclink" {
        return bad("unsupported type");
    }
    match state.otps.remove(&body.token) {
        Some((_, email)) if email == body.email => {
            (StatusCode::OK, Json(state.mint_session(&email)))
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error_description": "Token has expired or is invalid"})),
        ),
    }
}

async fn grant_token(
    State(state): State<Arc<ContractState>>,
    Query(params): Query<TokenParams>,
    Json(body): Json<RefreshBody>,
) -> (StatusCode, Json<Value>) {
    if params.grant_type != "refresh_token" {
        return bad("unsupported grant type");
    }
    match state.refresh_tokens.remove(&body.refresh_token) {
        Some((_, email)) => (StatusCode::OK, Json(state.mint_session(&email))),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error_description": "Invalid Refresh Token"})),
        ),
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

async fn get_user(
    State(state): State<Arc<ContractState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    match bearer(&headers).and_then(|t| state.access_tokens.get(&t).map(|e| e.value().clone())) {
        Some(email) => (
            StatusCode::OK,
            Json(json!({"id": format!("u-{email}"), "email": email})),
        ),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"msg": "invalid JWT"})),
        ),
    }
}

async fn logout(
    State(state): State<Arc<ContractState>>,
    headers: HeaderMap,
) -> StatusCode {
    if let Some(token) = bearer(&headers) {
        state.access_tokens.remove(&token);
    }
    StatusCode::NO_CONTENT
}

async fn spawn_double() -> (Arc<ContractState>, String) {
    let state = Arc::new(ContractState::default());
    let app = Router::new()
        .route("/functions/v1/generate-link", get(generate_link))
        .route("/auth/v1/verify", post(verify_otp))
        .route("/auth/v1/token", post(grant_token))
        .route("/auth/v1/user", get(get_user))
        .route("/auth/v1/logout", post(logout))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, format!("http://{addr}"))
}

#[tokio::test]
async fn install_codes_redeem_exactly_once() {
    let (_state, url) = spawn_double().await;
    let client = Client::new(&url, "anon-test").unwrap();

    let issued = client
        .create_install(&CreateInstall::new("doc@clinic.example").name("Dra. Ana"))
        .await
        .unwrap();
    assert_eq!(issued.email, "doc@clinic.example");

    let backend = HttpAuthBackend::new(client);
    let session = backend
        .exchange_code(&issued.code, "secplus-test")
        .await
        .unwrap();
    assert!(session.is_complete());
    assert_eq!(session.user_email(), Some("doc@clinic.example"));
    assert!(session.expires_at.is_some());

    // Replaying the same code is a definitive rejection, not a retryable
    // failure.
    let err = backend
        .exchange_code(&issued.code, "secplus-test")
        .await
        .unwrap_err();
    match &err {
        AuthError::Rejected { status, message } => {
            assert_eq!(*status, 400);
            assert!(message.contains("utilizado"), "message: {message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn codes_expire_after_their_window() {
    let (state, url) = spawn_double().await;
    let client = Client::new(&url, "anon-test").unwrap();

    let issued = client
        .create_install(&CreateInstall::new("doc@clinic.example"))
        .await
        .unwrap();
    state.codes.get_mut(&issued.code).unwrap().issued_at = Utc::now() - Duration::minutes(40);

    let backend = HttpAuthBackend::new(client);
    let err = backend
        .exchange_code(&issued.code, "secplus-test")
        .await
        .unwrap_err();
    match err {
        AuthError::Rejected { message, .. } => {
            assert!(message.contains("expirado"), "message: {message}")
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn refresh_rotates_credentials_and_kills_the_old_ones() {
    let (_state, url) = spawn_double().await;
    let client = Client::new(&url, "anon-test").unwrap();
    let issued = client
        .create_install(&CreateInstall::new("doc@clinic.example"))
        .await
        .unwrap();
    let backend = HttpAuthBackend::new(client);
    let first = backend.exchange_code(&issued.code, "t").await.unwrap();

    let second = backend.refresh(&first.refresh_token).await.unwrap();
    assert_ne!(second.access_token, first.access_token);
    assert_ne!(second.refresh_token, first.refresh_token);

    let err = backend.refresh(&first.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::Rejected { .. }));
}

#[tokio::test]
async fn validation_tracks_server_side_revocation() {
    let (_state, url) = spawn_double().await;
    let client = Client::new(&url, "anon-test").unwrap();
    let issued = client
        .create_install(&CreateInstall::new("doc@clinic.example"))
        .await
        .unwrap();
    let backend = HttpAuthBackend::new(client);
    let session = backend.exchange_code(&issued.code, "t").await.unwrap();

    backend.validate(&session.access_token).await.unwrap();
    backend.sign_out(&session.access_token).await.unwrap();

    let err = backend.validate(&session.access_token).await.unwrap_err();
    match err {
        AuthError::Rejected { status, .. } => assert_eq!(status, 401),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn recovery_picks_up_a_staged_code_end_to_end() {
    let (_state, url) = spawn_double().await;

    let issued = Client::new(&url, "anon-test")
        .unwrap()
        .create_install(&CreateInstall::new("doc@clinic.example"))
        .await
        .unwrap();

    let dir = tempdir().unwrap();
    let store = Arc::new(KvStore::open(dir.path(), Platform::Other).unwrap());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let backend = HttpAuthBackend::new(Client::new(&url, "anon-test").unwrap());
    let recovery = Recovery::new(
        backend,
        store,
        DeviceDescriptor::collect("dev-e2e".to_string()),
        true,
        tx,
    );

    recovery.bridge().stash(&issued.code).unwrap();
    recovery.trigger(Trigger::Start).await;

    assert_eq!(recovery.state(), AuthState::Authenticated);
    let session = recovery.vault().retrieve().unwrap();
    assert_eq!(session.user_email(), Some("doc@clinic.example"));

    // The periodic revalidation confirms the session against the backend.
    recovery.trigger(Trigger::Timer).await;
    assert_eq!(recovery.state(), AuthState::Authenticated);

    let mut saw_established = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, secplus_auth::AuthEvent::SessionEstablished(_)) {
            saw_established = true;
        }
    }
    assert!(saw_established);
}
