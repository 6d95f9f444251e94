use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use serde_json::json;
use tower_sessions::Session;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::auth::{
    hash_password, verify_password, ApiError, SessionUser, LOGGED_IN_KEY, LOGIN_TIME_KEY,
    MFA_PENDING_KEY, RESET_VERIFIED_KEY, ROLE_ID_KEY, ROLE_KEY, USER_ID_KEY,
};
use crate::model::{
    Employee, ForgotPasswordRequest, LoginRequest, OtpRequest, ResetPasswordRequest, Role,
    StatusResponse, VerifyResetRequest,
};
use crate::otp::{PURPOSE_LOGIN, PURPOSE_PASSWORD_RESET};
use crate::schema::employees::dsl::*;
use crate::schema::roles;
use crate::validate::ValidatedForm;
use crate::AUTH_TAG;

pub fn auth_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new()
        .routes(routes!(login))
        .routes(routes!(verify_otp))
        .routes(routes!(resend_otp))
        .routes(routes!(forgot_password))
        .routes(routes!(request_password_reset_otp))
        .routes(routes!(verify_password_reset_otp))
        .routes(routes!(reset_password_with_otp))
        .routes(routes!(logout))
}

/// Mounted separately: this route carries a fixed-origin CORS policy while
/// the rest of the API is wide open.
pub fn check_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new().routes(routes!(check))
}

#[derive(Debug, ToSchema, Serialize, Clone)]
pub struct SessionInfo {
    pub user_id: i32,
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub role_id: i32,
}

#[derive(Debug, ToSchema, Serialize)]
struct LoginResponse {
    success: bool,
    step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<SessionInfo>,
}

#[derive(Debug, ToSchema, Serialize)]
struct CheckResponse {
    success: bool,
    authenticated: bool,
    user: SessionInfo,
}

async fn employee_with_role(
    conn: &mut AsyncPgConnection,
    by_email: &str,
) -> Result<Option<(Employee, Role)>, ApiError> {
    employees
        .inner_join(roles::table)
        .filter(email.eq(by_email))
        .select((Employee::as_select(), Role::as_select()))
        .first::<(Employee, Role)>(conn)
        .await
        .optional()
        .map_err(|e| {
            tracing::debug!("employee_with_role: {}", e);
            ApiError::Database
        })
}

async fn establish_session(
    session: &Session,
    staff: &Employee,
    staff_role: &Role,
) -> Result<SessionInfo, ApiError> {
    session.cycle_id().await.map_err(|_| ApiError::Session)?;
    session
        .insert(USER_ID_KEY, staff.employee_id)
        .await
        .map_err(|_| ApiError::Session)?;
    session
        .insert(ROLE_KEY, staff_role.role_name.clone())
        .await
        .map_err(|_| ApiError::Session)?;
    session
        .insert(ROLE_ID_KEY, staff_role.role_id)
        .await
        .map_err(|_| ApiError::Session)?;
    session
        .insert(LOGGED_IN_KEY, true)
        .await
        .map_err(|_| ApiError::Session)?;
    session
        .insert(LOGIN_TIME_KEY, Local::now().timestamp())
        .await
        .map_err(|_| ApiError::Session)?;
    session
        .remove::<i32>(MFA_PENDING_KEY)
        .await
        .map_err(|_| ApiError::Session)?;

    Ok(SessionInfo {
        user_id: staff.employee_id,
        full_name: staff.full_name.clone(),
        email: staff.email.clone(),
        role: staff_role.role_name.clone(),
        role_id: staff_role.role_id,
    })
}

/// Email + password login; accounts with MFA enabled get an emailed code
/// instead of an immediate session.
#[utoipa::path(
    post,
    path = "/login",
    responses((status = OK, body = LoginResponse)),
    tag = AUTH_TAG
)]
async fn login(
    session: Session,
    State(crate::State {
        pool, mailer, otp, ..
    }): State<crate::State>,
    ValidatedForm(body): ValidatedForm<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let Some((staff, staff_role)) = employee_with_role(&mut conn, &body.email).await? else {
        return Err(ApiError::WrongCredentials);
    };
    if !staff.is_active.unwrap_or(false) {
        return Err(ApiError::WrongCredentials);
    }
    if !verify_password(&body.password, &staff.password_hash) {
        return Err(ApiError::WrongCredentials);
    }

    if staff.mfa_enabled {
        let code = otp.issue(&mut conn, staff.employee_id, PURPOSE_LOGIN).await?;
        mailer
            .send_otp(&staff.email, &code, "login verification", otp.ttl_minutes())
            .await?;
        session
            .insert(MFA_PENDING_KEY, staff.employee_id)
            .await
            .map_err(|_| ApiError::Session)?;
        return Ok(Json(LoginResponse {
            success: true,
            step: "mfa_required".to_string(),
            email: Some(mask_email(&staff.email)),
            user: None,
        }));
    }

    let user = establish_session(&session, &staff, &staff_role).await?;
    Ok(Json(LoginResponse {
        success: true,
        step: "complete".to_string(),
        email: None,
        user: Some(user),
    }))
}

/// Second login step for MFA accounts.
#[utoipa::path(
    post,
    path = "/verify-otp",
    responses((status = OK, body = LoginResponse)),
    tag = AUTH_TAG
)]
async fn verify_otp(
    session: Session,
    State(crate::State { pool, otp, .. }): State<crate::State>,
    ValidatedForm(body): ValidatedForm<OtpRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let pending: i32 = session
        .get(MFA_PENDING_KEY)
        .await
        .map_err(|_| ApiError::Session)?
        .ok_or(ApiError::Unauthenticated)?;

    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;
    otp.verify(&mut conn, pending, PURPOSE_LOGIN, &body.code, true)
        .await?;

    let (staff, staff_role) = employees
        .inner_join(roles::table)
        .filter(employee_id.eq(pending))
        .select((Employee::as_select(), Role::as_select()))
        .first::<(Employee, Role)>(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("verify_otp: {}", e);
            ApiError::Unauthenticated
        })?;

    let user = establish_session(&session, &staff, &staff_role).await?;
    Ok(Json(LoginResponse {
        success: true,
        step: "complete".to_string(),
        email: None,
        user: Some(user),
    }))
}

/// Invalidate the outstanding login code and email a fresh one.
#[utoipa::path(
    post,
    path = "/resend-otp",
    responses((status = OK, body = StatusResponse)),
    tag = AUTH_TAG
)]
async fn resend_otp(
    session: Session,
    State(crate::State {
        pool, mailer, otp, ..
    }): State<crate::State>,
) -> Result<Json<StatusResponse>, ApiError> {
    let pending: i32 = session
        .get(MFA_PENDING_KEY)
        .await
        .map_err(|_| ApiError::Session)?
        .ok_or(ApiError::Unauthenticated)?;

    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;
    let staff: Employee = employees
        .filter(employee_id.eq(pending))
        .select(Employee::as_select())
        .first::<Employee>(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("resend_otp: {}", e);
            ApiError::Unauthenticated
        })?;

    let code = otp.issue(&mut conn, staff.employee_id, PURPOSE_LOGIN).await?;
    mailer
        .send_otp(&staff.email, &code, "login verification", otp.ttl_minutes())
        .await?;
    Ok(Json(StatusResponse::ok("A new code has been sent")))
}

async fn start_password_reset(
    state: &crate::State,
    by_email: &str,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut conn = state.pool.get().await.map_err(|_| ApiError::Database)?;
    let found: Option<Employee> = employees
        .filter(email.eq(by_email))
        .select(Employee::as_select())
        .first::<Employee>(&mut conn)
        .await
        .optional()
        .map_err(|e| {
            tracing::debug!("start_password_reset: {}", e);
            ApiError::Database
        })?;

    if let Some(staff) = found {
        if staff.is_active.unwrap_or(false) {
            let code = state
                .otp
                .issue(&mut conn, staff.employee_id, PURPOSE_PASSWORD_RESET)
                .await?;
            // A mail failure must not reveal whether the address has an
            // account.
            if let Err(e) = state
                .mailer
                .send_otp(
                    &staff.email,
                    &code,
                    "password reset",
                    state.otp.ttl_minutes(),
                )
                .await
            {
                tracing::warn!("password reset mail failed: {}", e);
            }
        }
    }

    Ok(Json(StatusResponse::ok(
        "If the account exists, a reset code has been sent",
    )))
}

/// Request a password-reset code by email.
#[utoipa::path(
    post,
    path = "/forgot-password",
    responses((status = OK, body = StatusResponse)),
    tag = AUTH_TAG
)]
async fn forgot_password(
    State(state): State<crate::State>,
    ValidatedForm(body): ValidatedForm<ForgotPasswordRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    start_password_reset(&state, &body.email).await
}

/// Alias kept for older admin front-ends.
#[utoipa::path(
    post,
    path = "/request-password-reset-otp",
    responses((status = OK, body = StatusResponse)),
    tag = AUTH_TAG
)]
async fn request_password_reset_otp(
    State(state): State<crate::State>,
    ValidatedForm(body): ValidatedForm<ForgotPasswordRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    start_password_reset(&state, &body.email).await
}

/// Check a reset code without consuming it; marks the session as verified
/// for the final reset step.
#[utoipa::path(
    post,
    path = "/verify-password-reset-otp",
    responses((status = OK, body = StatusResponse)),
    tag = AUTH_TAG
)]
async fn verify_password_reset_otp(
    session: Session,
    State(crate::State { pool, otp, .. }): State<crate::State>,
    ValidatedForm(body): ValidatedForm<VerifyResetRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;
    let Some((staff, _)) = employee_with_role(&mut conn, &body.email).await? else {
        return Err(ApiError::OtpRejected("Code is invalid or already used"));
    };

    otp.verify(
        &mut conn,
        staff.employee_id,
        PURPOSE_PASSWORD_RESET,
        &body.code,
        false,
    )
    .await?;

    session
        .insert(RESET_VERIFIED_KEY, staff.employee_id)
        .await
        .map_err(|_| ApiError::Session)?;
    Ok(Json(StatusResponse::ok("Code verified")))
}

/// Final reset step: consumes the code and stores the new password hash.
#[utoipa::path(
    post,
    path = "/reset-password-with-otp",
    responses((status = OK, body = StatusResponse)),
    tag = AUTH_TAG
)]
async fn reset_password_with_otp(
    session: Session,
    State(crate::State { pool, otp, .. }): State<crate::State>,
    ValidatedForm(body): ValidatedForm<ResetPasswordRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;
    let Some((staff, _)) = employee_with_role(&mut conn, &body.email).await? else {
        return Err(ApiError::OtpRejected("Code is invalid or already used"));
    };

    let verified: Option<i32> = session
        .get(RESET_VERIFIED_KEY)
        .await
        .map_err(|_| ApiError::Session)?;
    if verified != Some(staff.employee_id) {
        return Err(ApiError::Unauthenticated);
    }

    otp.verify(
        &mut conn,
        staff.employee_id,
        PURPOSE_PASSWORD_RESET,
        &body.code,
        true,
    )
    .await?;

    let fresh_hash = hash_password(&body.new_password)?;
    diesel::update(employees.filter(employee_id.eq(staff.employee_id)))
        .set(password_hash.eq(fresh_hash))
        .execute(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("reset_password_with_otp: {}", e);
            ApiError::Database
        })?;

    session
        .remove::<i32>(RESET_VERIFIED_KEY)
        .await
        .map_err(|_| ApiError::Session)?;
    Ok(Json(StatusResponse::ok("Password has been reset")))
}

/// Session introspection for the admin front-end.
#[utoipa::path(
    get,
    path = "/check",
    responses((status = OK, body = CheckResponse)),
    tag = AUTH_TAG,
    security(("session_cookie" = []))
)]
async fn check(
    State(crate::State { pool, .. }): State<crate::State>,
    user: Option<SessionUser>,
) -> Response {
    let Some(user) = user else {
        return unauthenticated_check();
    };

    let Ok(mut conn) = pool.get().await else {
        return ApiError::Database.into_response();
    };
    let row = employees
        .inner_join(roles::table)
        .filter(employee_id.eq(user.user_id))
        .select((Employee::as_select(), Role::as_select()))
        .first::<(Employee, Role)>(&mut conn)
        .await
        .optional();

    match row {
        Ok(Some((staff, staff_role))) if staff.is_active.unwrap_or(false) => {
            Json(CheckResponse {
                success: true,
                authenticated: true,
                user: SessionInfo {
                    user_id: staff.employee_id,
                    full_name: staff.full_name,
                    email: staff.email,
                    role: staff_role.role_name,
                    role_id: staff_role.role_id,
                },
            })
            .into_response()
        }
        Ok(_) => unauthenticated_check(),
        Err(e) => {
            tracing::debug!("check: {}", e);
            ApiError::Database.into_response()
        }
    }
}

fn unauthenticated_check() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "authenticated": false})),
    )
        .into_response()
}

/// Tear down the server-side session.
#[utoipa::path(
    post,
    path = "/logout",
    responses((status = OK, body = StatusResponse)),
    tag = AUTH_TAG,
    security(("session_cookie" = []))
)]
async fn logout(session: Session) -> Result<Json<StatusResponse>, ApiError> {
    session.flush().await.map_err(|_| ApiError::Session)?;
    Ok(Json(StatusResponse::ok("Logged out")))
}

fn mask_email(address: &str) -> String {
    match address.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_email_keeps_first_letter_and_domain() {
        assert_eq!(mask_email("dana@example.com"), "d***@example.com");
        assert_eq!(mask_email("x@h.io"), "x***@h.io");
    }

    #[test]
    fn masking_tolerates_malformed_addresses() {
        assert_eq!(mask_email("not-an-email"), "***");
        assert_eq!(mask_email("@example.com"), "***@example.com");
    }
}
