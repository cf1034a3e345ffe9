//! HTTP error responses.

use auth_broker::AuthError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Error returned by every handler.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    BadRequest(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

pub(crate) fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::ChallengeInvalid
        | AuthError::AlreadyConsumed
        | AuthError::SignatureInvalid(_)
        | AuthError::StateMismatch
        | AuthError::SessionInvalid(_) => StatusCode::UNAUTHORIZED,
        AuthError::PairingRejected => StatusCode::FORBIDDEN,
        AuthError::AccountNotFound(_) | AuthError::UnknownPairing(_) => StatusCode::NOT_FOUND,
        AuthError::InvalidStateTransition(_) => StatusCode::CONFLICT,
        AuthError::TokenExchangeFailed(_)
        | AuthError::RelayUnavailable(_)
        | AuthError::AccountLookup(_) => StatusCode::BAD_GATEWAY,
        AuthError::PairingTimeout => StatusCode::GATEWAY_TIMEOUT,
        AuthError::Capacity => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::Auth(err) => (status_for(err), err.kind(), err.user_message().to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
        };
        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&AuthError::StateMismatch), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&AuthError::PairingTimeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            status_for(&AuthError::RelayUnavailable("down".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&AuthError::Config("bad".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_state_mismatch_body_stays_generic() {
        let response = ApiError::from(AuthError::StateMismatch).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
