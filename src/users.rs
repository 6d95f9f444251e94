use axum::extract::{Query, State};
use axum::Json;
use casbin::CoreApi;
use chrono::NaiveDateTime;
use diesel::dsl::insert_into;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::auth::{hash_password, ApiError, SessionUser};
use crate::model::{Employee, EmployeeInsert, EntityId, NewStaff, Role, StaffUpdate, StatusResponse};
use crate::schema::employees::dsl::*;
use crate::schema::{frontdesk_reports, otp_codes, report_notifications, roles, room_maintenance_log};
use crate::validate::ValidatedForm;
use crate::USER_TAG;

pub fn user_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new().routes(routes!(get_users, create_user, update_user, delete_user))
}

#[derive(Serialize, ToSchema, Debug)]
pub struct StaffView {
    pub employee_id: i32,
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub role_id: i32,
    pub mfa_enabled: bool,
    pub is_active: bool,
    pub created_at: Option<NaiveDateTime>,
}

#[derive(Serialize, ToSchema)]
struct StaffListResponse {
    success: bool,
    users: Vec<StaffView>,
}

async fn role_id_for(conn: &mut AsyncPgConnection, name: &str) -> Result<i32, ApiError> {
    roles::table
        .filter(roles::role_name.eq(name))
        .select(roles::role_id)
        .first::<i32>(conn)
        .await
        .map_err(|e| {
            tracing::debug!("role_id_for: {}", e);
            ApiError::NotFound("Role not found")
        })
}

/// Staff account listing. Password hashes are never serialized.
#[utoipa::path(get, path = "/users", responses((status = OK, body = StaffListResponse)), tag = USER_TAG, security(
    ("session_cookie" = [])
))]
async fn get_users(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
) -> Result<Json<StaffListResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "users".to_string(), "read".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let rows: Vec<(Employee, Role)> = employees
        .inner_join(roles::table)
        .order(full_name.asc())
        .select((Employee::as_select(), Role::as_select()))
        .load(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("get_users: {}", e);
            ApiError::Database
        })?;

    let listing = rows
        .into_iter()
        .map(|(staff, staff_role)| StaffView {
            employee_id: staff.employee_id,
            full_name: staff.full_name,
            email: staff.email,
            role: staff_role.role_name,
            role_id: staff_role.role_id,
            mfa_enabled: staff.mfa_enabled,
            is_active: staff.is_active.unwrap_or(false),
            created_at: staff.created_at,
        })
        .collect();

    Ok(Json(StaffListResponse {
        success: true,
        users: listing,
    }))
}

/// Create staff account.
#[utoipa::path(post, path = "/users", responses((status = OK, body = StatusResponse)), tag = USER_TAG, security(
    ("session_cookie" = [])
))]
async fn create_user(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    ValidatedForm(body): ValidatedForm<NewStaff>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "users".to_string(), "create".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let existing: i64 = employees
        .filter(email.eq(&body.email))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("create_user: {}", e);
            ApiError::Database
        })?;
    if existing > 0 {
        return Err(ApiError::Conflict(format!(
            "An account for {} already exists",
            body.email
        )));
    }

    let assigned_role = role_id_for(&mut conn, &body.role).await?;
    let hash = hash_password(&body.password)?;
    let record = EmployeeInsert {
        full_name: body.full_name,
        email: body.email,
        password_hash: hash,
        role_id: Some(assigned_role),
        mfa_enabled: body.mfa_enabled,
        is_active: Some(true),
    };
    insert_into(employees)
        .values(&record)
        .execute(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("create_user: {}", e);
            ApiError::Database
        })?;
    Ok(Json(StatusResponse::ok("Staff account created")))
}

/// Update staff account; the password only changes when one is supplied.
#[utoipa::path(put, path = "/users", responses((status = OK, body = StatusResponse)), tag = USER_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Employee database id"),
)
)]
async fn update_user(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(EntityId { id }): Query<EntityId>,
    ValidatedForm(body): ValidatedForm<StaffUpdate>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "users".to_string(), "update".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let clashing: i64 = employees
        .filter(email.eq(&body.email))
        .filter(employee_id.ne(id))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("update_user: {}", e);
            ApiError::Database
        })?;
    if clashing > 0 {
        return Err(ApiError::Conflict(format!(
            "An account for {} already exists",
            body.email
        )));
    }

    let assigned_role = role_id_for(&mut conn, &body.role).await?;

    let updated = match body.password {
        Some(plain) => {
            let hash = hash_password(&plain)?;
            diesel::update(employees.find(id))
                .set((
                    full_name.eq(body.full_name),
                    email.eq(body.email),
                    password_hash.eq(hash),
                    role_id.eq(Some(assigned_role)),
                    mfa_enabled.eq(body.mfa_enabled),
                    is_active.eq(Some(body.is_active)),
                ))
                .execute(&mut conn)
                .await
        }
        None => {
            diesel::update(employees.find(id))
                .set((
                    full_name.eq(body.full_name),
                    email.eq(body.email),
                    role_id.eq(Some(assigned_role)),
                    mfa_enabled.eq(body.mfa_enabled),
                    is_active.eq(Some(body.is_active)),
                ))
                .execute(&mut conn)
                .await
        }
    }
    .map_err(|e| {
        tracing::debug!("update_user: {}", e);
        ApiError::Database
    })?;

    if updated == 0 {
        Err(ApiError::NotFound("Staff account not found"))
    } else {
        Ok(Json(StatusResponse::ok("Staff account updated")))
    }
}

async fn has_history(conn: &mut AsyncPgConnection, staff: i32) -> Result<bool, ApiError> {
    let reported: i64 = room_maintenance_log::table
        .filter(room_maintenance_log::reported_by.eq(staff))
        .count()
        .get_result(conn)
        .await
        .map_err(|e| {
            tracing::debug!("has_history (maintenance): {}", e);
            ApiError::Database
        })?;
    let authored: i64 = frontdesk_reports::table
        .filter(frontdesk_reports::author_id.eq(staff))
        .count()
        .get_result(conn)
        .await
        .map_err(|e| {
            tracing::debug!("has_history (reports): {}", e);
            ApiError::Database
        })?;
    let notified: i64 = report_notifications::table
        .filter(report_notifications::recipient_id.eq(staff))
        .count()
        .get_result(conn)
        .await
        .map_err(|e| {
            tracing::debug!("has_history (notifications): {}", e);
            ApiError::Database
        })?;
    Ok(reported > 0 || authored > 0 || notified > 0)
}

/// Delete staff account; accounts with history are deactivated instead.
#[utoipa::path(delete, path = "/users", responses((status = OK, body = StatusResponse)), tag = USER_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Employee database id"),
)
)]
async fn delete_user(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(EntityId { id }): Query<EntityId>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "users".to_string(), "delete".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    if user.user_id == id {
        return Err(ApiError::Validation(
            "You cannot delete your own account".to_string(),
        ));
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let existing: Option<Employee> = employees
        .find(id)
        .select(Employee::as_select())
        .first::<Employee>(&mut conn)
        .await
        .optional()
        .map_err(|e| {
            tracing::debug!("delete_user: {}", e);
            ApiError::Database
        })?;
    if existing.is_none() {
        return Err(ApiError::NotFound("Staff account not found"));
    }

    if has_history(&mut conn, id).await? {
        diesel::update(employees.find(id))
            .set(is_active.eq(Some(false)))
            .execute(&mut conn)
            .await
            .map_err(|e| {
                tracing::debug!("delete_user: {}", e);
                ApiError::Database
            })?;
        return Ok(Json(StatusResponse::ok(
            "Account has activity history and was deactivated instead",
        )));
    }

    conn.transaction::<(), ApiError, _>(|conn| {
        async move {
            diesel::delete(otp_codes::table.filter(otp_codes::employee_id.eq(id)))
                .execute(conn)
                .await?;
            diesel::delete(employees.find(id)).execute(conn).await?;
            Ok(())
        }
        .scope_boxed()
    })
    .await?;

    Ok(Json(StatusResponse::ok("Staff account deleted")))
}
