//! HTTP surface of the broker.

use crate::error::ApiError;
use crate::state::{session_token, SharedState};
use auth_broker::{AuthError, AuthMethod, PairingStatus, Session};
use axum::async_trait;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/auth/keychain/challenge", get(keychain_challenge))
        .route("/auth/keychain", post(keychain_login))
        .route("/auth/start", get(oauth_start))
        .route("/auth/callback", get(oauth_callback))
        .route("/auth/pair/start", post(pair_start))
        .route("/auth/pair/status", get(pair_status))
        .route("/auth/session", get(session_info))
        .route("/auth/logout", post(logout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Body accepted as JSON or as an urlencoded form.
pub struct JsonOrForm<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send + 'static,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(value))
        } else {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(value))
        }
    }
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ChallengeResponse {
    pub challenge: String,
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct KeychainLoginRequest {
    pub username: String,
    pub challenge: String,
    pub signature: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub username: String,
    pub method: AuthMethod,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            username: session.username.clone(),
            method: session.method,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Deserialize)]
pub struct StartQuery {
    pub username: Option<String>,
    pub next: Option<String>,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

#[derive(Deserialize)]
pub struct PairStartRequest {
    pub username: String,
}

#[derive(Serialize)]
pub struct PairStartResponse {
    pub uuid: String,
    pub pairing_payload: String,
    pub pairing_code: String,
    pub expires_at: DateTime<Utc>,
    /// Secret the browser presents to collect the session.
    pub handoff_token: String,
}

#[derive(Deserialize)]
pub struct PairStatusQuery {
    pub uuid: String,
    #[serde(default)]
    pub handoff: Option<String>,
}

#[derive(Serialize)]
pub struct PairStatusResponse {
    pub uuid: String,
    pub status: PairingStatus,
    pub expires_at: DateTime<Utc>,
    pub username: Option<String>,
    /// True on the one response that hands over the session cookie.
    pub logged_in: bool,
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

// ---------------------------------------------------------------------------
// Keychain
// ---------------------------------------------------------------------------

async fn keychain_challenge(
    State(state): State<SharedState>,
) -> Result<Json<ChallengeResponse>, ApiError> {
    let issued = state.broker.issue_challenge()?;
    Ok(Json(ChallengeResponse {
        challenge: issued.challenge,
        message: issued.message,
        expires_at: issued.expires_at,
    }))
}

async fn keychain_login(
    State(state): State<SharedState>,
    JsonOrForm(body): JsonOrForm<KeychainLoginRequest>,
) -> Result<Response, ApiError> {
    let session = state
        .broker
        .login_with_signature(&body.username, &body.challenge, &body.signature)
        .await?;
    Ok((
        state.session_cookie(&session),
        Json(SessionResponse::from(&session)),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// HiveSigner
// ---------------------------------------------------------------------------

async fn oauth_start(
    State(state): State<SharedState>,
    Query(query): Query<StartQuery>,
) -> Result<Response, ApiError> {
    let request = state
        .broker
        .start_oauth(query.username.as_deref(), query.next.as_deref())?;
    Ok(found(&request.url))
}

async fn oauth_callback(
    State(state): State<SharedState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, ApiError> {
    let (Some(code), Some(returned_state)) = (query.code, query.state) else {
        return Err(ApiError::BadRequest("missing code or state".to_string()));
    };

    match state.broker.complete_oauth(&code, &returned_state).await {
        Ok((session, return_to)) => {
            let target = state.app_link(return_to.as_deref().unwrap_or("/"));
            Ok((state.session_cookie(&session), found(&target)).into_response())
        }
        Err(err) => Ok(found(&state.app_link(&format!("/login?error={}", err.kind())))),
    }
}

// ---------------------------------------------------------------------------
// HiveAuth
// ---------------------------------------------------------------------------

async fn pair_start(
    State(state): State<SharedState>,
    JsonOrForm(body): JsonOrForm<PairStartRequest>,
) -> Result<Json<PairStartResponse>, ApiError> {
    state.handoffs.sweep();
    let request = state.broker.start_pairing(&body.username).await?;
    let window = request.expires_at - Utc::now() + state.handoff_ttl;
    let handoff_token = state
        .begin_handoff(&request.uuid, window)
        .map_err(AuthError::from)?;

    let background = state.clone();
    let uuid = request.uuid.clone();
    tokio::spawn(async move {
        let Ok(session) = background.broker.complete_pairing(&uuid, None).await else {
            return;
        };
        if let Err(e) = background.fill_handoff(&uuid, session) {
            warn!(uuid = %uuid, error = %e, "Could not hold pairing session for handoff");
        }
    });

    Ok(Json(PairStartResponse {
        uuid: request.uuid,
        pairing_payload: request.pairing_payload,
        pairing_code: request.pairing_code,
        expires_at: request.expires_at,
        handoff_token,
    }))
}

async fn pair_status(
    State(state): State<SharedState>,
    Query(query): Query<PairStatusQuery>,
) -> Result<Response, ApiError> {
    let request = state.broker.pairing_status(&query.uuid)?;

    let handoff = match (request.status, query.handoff.as_deref()) {
        (PairingStatus::Approved, Some(secret)) => state.take_handoff(&query.uuid, secret),
        _ => None,
    };
    let headers = match &handoff {
        Some(session) => {
            debug!(uuid = %query.uuid, username = %session.username, "Handing over pairing session");
            state.session_cookie(session)
        }
        None => HeaderMap::new(),
    };

    Ok((
        headers,
        Json(PairStatusResponse {
            uuid: request.uuid,
            status: request.status,
            expires_at: request.expires_at,
            username: request.authenticated_username,
            logged_in: handoff.is_some(),
        }),
    )
        .into_response())
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

async fn session_info(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<SessionResponse>, ApiError> {
    let token = session_token(&headers)
        .ok_or_else(|| AuthError::SessionInvalid("missing token".to_string()))?;
    let claims = state.broker.validate_session(&token)?;
    Ok(Json(SessionResponse {
        expires_at: claims.expires_at(),
        username: claims.username,
        method: claims.method,
    }))
}

async fn logout(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if let Some(token) = session_token(&headers) {
        match state.broker.logout(&token) {
            Ok(()) => {}
            Err(AuthError::SessionInvalid(reason)) => {
                debug!(reason = %reason, "Logout with an already invalid session");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok((state.cleared_cookie(), StatusCode::NO_CONTENT).into_response())
}
