use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tower_sessions::Session;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::Modify;

/// Session keys carried for a completed login.
pub const USER_ID_KEY: &str = "user_id";
pub const ROLE_KEY: &str = "role";
pub const ROLE_ID_KEY: &str = "role_id";
pub const LOGGED_IN_KEY: &str = "logged_in";
pub const LOGIN_TIME_KEY: &str = "login_time";

/// Transient keys used by the MFA and password-reset flows.
pub const MFA_PENDING_KEY: &str = "mfa_pending_employee";
pub const RESET_VERIFIED_KEY: &str = "reset_verified_employee";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Invalid email or password")]
    WrongCredentials,
    #[error("{0}")]
    OtpRejected(&'static str),
    #[error("Permission denied")]
    PermissionDenied,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("Database error")]
    Database,
    #[error("Failed to send email")]
    Email,
    #[error("Session error")]
    Session,
}

impl From<diesel::result::Error> for ApiError {
    fn from(e: diesel::result::Error) -> Self {
        tracing::debug!("database error: {}", e);
        ApiError::Database
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Unauthenticated | ApiError::WrongCredentials | ApiError::OtpRejected(_) => {
                StatusCode::UNAUTHORIZED
            }
            ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::Validation(_) | ApiError::Conflict(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Database | ApiError::Email | ApiError::Session => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

/// An authenticated staff member, read from the server-side session.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: i32,
    pub role: String,
    pub role_id: i32,
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::Session)?;

        let logged_in = session
            .get::<bool>(LOGGED_IN_KEY)
            .await
            .map_err(|_| ApiError::Session)?
            .unwrap_or(false);
        if !logged_in {
            return Err(ApiError::Unauthenticated);
        }

        let user_id = session
            .get::<i32>(USER_ID_KEY)
            .await
            .map_err(|_| ApiError::Session)?
            .ok_or(ApiError::Unauthenticated)?;
        let role = session
            .get::<String>(ROLE_KEY)
            .await
            .map_err(|_| ApiError::Session)?
            .ok_or(ApiError::Unauthenticated)?;
        let role_id = session
            .get::<i32>(ROLE_ID_KEY)
            .await
            .map_err(|_| ApiError::Session)?
            .ok_or(ApiError::Unauthenticated)?;

        Ok(SessionUser {
            user_id,
            role,
            role_id,
        })
    }
}

pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            tracing::debug!("hash_password: {}", e);
            ApiError::Database
        })
}

pub fn verify_password(plain: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .map(|parsed| {
            Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new("id"))),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_statuses_follow_the_envelope_contract() {
        assert_eq!(
            ApiError::Unauthenticated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::PermissionDenied.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Validation("bad".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("Room already exists".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::NotFound("Room not found").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Database.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn conflict_message_is_echoed() {
        let err = ApiError::Conflict("Room 101 already exists".into());
        assert_eq!(err.to_string(), "Room 101 already exists");
    }

    #[test]
    fn password_hash_round_trips() {
        let hash = hash_password("hunter2hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2hunter2", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn verify_password_rejects_garbage_hashes() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
