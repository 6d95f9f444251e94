use axum::extract::{Query, State};
use axum::Json;
use casbin::CoreApi;
use chrono::{Local, NaiveDateTime};
use diesel::dsl::insert_into;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::auth::{ApiError, SessionUser};
use crate::model::{
    EntityId, MaintenanceLog, MaintenanceLogInsert, MaintenanceUpdate, NewMaintenance,
    StatusResponse,
};
use crate::schema::room_maintenance_log::dsl::*;
use crate::schema::{maintenance_status, rooms};
use crate::validate::ValidatedForm;
use crate::MAINTENANCE_TAG;

// Seeded status vocabularies. Every status transition in the API goes
// through `room_status_after`; the ids are defined nowhere else.
pub const ROOM_STATUS_AVAILABLE: i32 = 1;
pub const ROOM_STATUS_OCCUPIED: i32 = 2;
pub const ROOM_STATUS_RESERVED: i32 = 3;
pub const ROOM_STATUS_CLEANING: i32 = 4;
pub const ROOM_STATUS_MAINTENANCE: i32 = 5;

pub const MAINTENANCE_REPORTED: i32 = 1;
pub const MAINTENANCE_IN_PROGRESS: i32 = 2;
pub const MAINTENANCE_RESOLVED: i32 = 3;

/// The room status implied by a maintenance entry's status. `None` marks an
/// unknown maintenance status.
pub fn room_status_after(maintenance: i32) -> Option<i32> {
    match maintenance {
        MAINTENANCE_REPORTED | MAINTENANCE_IN_PROGRESS => Some(ROOM_STATUS_MAINTENANCE),
        MAINTENANCE_RESOLVED => Some(ROOM_STATUS_AVAILABLE),
        _ => None,
    }
}

pub fn maintenance_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new().routes(routes!(get_logs, create_log, update_log, delete_log))
}

#[derive(Deserialize, IntoParams, Debug, Default)]
pub struct MaintenanceListQuery {
    pub room: Option<i32>,
    pub status: Option<i32>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct LogView {
    pub log_id: i32,
    pub room_id: i32,
    pub room_number: String,
    pub reported_by: Option<i32>,
    pub issue: String,
    pub status_id: i32,
    pub status_name: String,
    pub reported_at: NaiveDateTime,
    pub resolved_at: Option<NaiveDateTime>,
}

#[derive(Serialize, ToSchema)]
struct LogListResponse {
    success: bool,
    logs: Vec<LogView>,
}

/// Maintenance log listing, optionally filtered by room or status.
#[utoipa::path(get, path = "/room-maintenance", responses((status = OK, body = LogListResponse)), tag = MAINTENANCE_TAG, security(
    ("session_cookie" = [])
),
params(MaintenanceListQuery)
)]
async fn get_logs(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(q): Query<MaintenanceListQuery>,
) -> Result<Json<LogListResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "maintenance".to_string(), "read".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let mut query = room_maintenance_log
        .inner_join(rooms::table)
        .inner_join(maintenance_status::table)
        .select((
            MaintenanceLog::as_select(),
            rooms::room_number,
            maintenance_status::status_name,
        ))
        .into_boxed();
    if let Some(wanted) = q.room {
        query = query.filter(room_id.eq(wanted));
    }
    if let Some(wanted) = q.status {
        query = query.filter(status_id.eq(wanted));
    }

    let rows: Vec<(MaintenanceLog, String, String)> = query
        .order(reported_at.desc())
        .load(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("get_logs: {}", e);
            ApiError::Database
        })?;

    let logs = rows
        .into_iter()
        .map(|(log, number, name)| LogView {
            log_id: log.log_id,
            room_id: log.room_id,
            room_number: number,
            reported_by: log.reported_by,
            issue: log.issue,
            status_id: log.status_id,
            status_name: name,
            reported_at: log.reported_at,
            resolved_at: log.resolved_at,
        })
        .collect();

    Ok(Json(LogListResponse {
        success: true,
        logs,
    }))
}

/// Report an issue; the room flips to maintenance in the same transaction.
#[utoipa::path(post, path = "/room-maintenance", responses((status = OK, body = StatusResponse)), tag = MAINTENANCE_TAG, security(
    ("session_cookie" = [])
))]
async fn create_log(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    ValidatedForm(body): ValidatedForm<NewMaintenance>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((
            user.role.clone(),
            "maintenance".to_string(),
            "create".to_string(),
        ))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let room_exists: i64 = rooms::table
        .filter(rooms::room_id.eq(body.room_id))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("create_log: {}", e);
            ApiError::Database
        })?;
    if room_exists == 0 {
        return Err(ApiError::NotFound("Room not found"));
    }

    let reporter = user.user_id;
    conn.transaction::<(), ApiError, _>(|conn| {
        async move {
            let record = MaintenanceLogInsert {
                room_id: body.room_id,
                reported_by: Some(reporter),
                issue: body.issue,
                status_id: MAINTENANCE_REPORTED,
            };
            insert_into(room_maintenance_log)
                .values(&record)
                .execute(conn)
                .await?;
            if let Some(next) = room_status_after(MAINTENANCE_REPORTED) {
                diesel::update(rooms::table.find(body.room_id))
                    .set(rooms::status_id.eq(next))
                    .execute(conn)
                    .await?;
            }
            Ok(())
        }
        .scope_boxed()
    })
    .await?;

    Ok(Json(StatusResponse::ok("Maintenance issue logged")))
}

/// Move a log to another status; resolving stamps `resolved_at` and frees
/// the room.
#[utoipa::path(put, path = "/room-maintenance", responses((status = OK, body = StatusResponse)), tag = MAINTENANCE_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Maintenance log database id"),
)
)]
async fn update_log(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(EntityId { id }): Query<EntityId>,
    Json(body): Json<MaintenanceUpdate>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((
            user.role,
            "maintenance".to_string(),
            "update".to_string(),
        ))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }

    let Some(next_room_status) = room_status_after(body.status_id) else {
        return Err(ApiError::Validation("Unknown maintenance status".to_string()));
    };

    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;
    let existing: Option<MaintenanceLog> = room_maintenance_log
        .find(id)
        .select(MaintenanceLog::as_select())
        .first::<MaintenanceLog>(&mut conn)
        .await
        .optional()
        .map_err(|e| {
            tracing::debug!("update_log: {}", e);
            ApiError::Database
        })?;
    let Some(existing) = existing else {
        return Err(ApiError::NotFound("Maintenance log not found"));
    };

    conn.transaction::<(), ApiError, _>(|conn| {
        async move {
            let resolved = body.status_id == MAINTENANCE_RESOLVED;
            diesel::update(room_maintenance_log.find(id))
                .set((
                    status_id.eq(body.status_id),
                    resolved_at.eq(resolved.then(|| Local::now().naive_utc())),
                ))
                .execute(conn)
                .await?;
            diesel::update(rooms::table.find(existing.room_id))
                .set(rooms::status_id.eq(next_room_status))
                .execute(conn)
                .await?;
            Ok(())
        }
        .scope_boxed()
    })
    .await?;

    Ok(Json(StatusResponse::ok("Maintenance log updated")))
}

/// Delete a log entry. Room status is left as-is.
#[utoipa::path(delete, path = "/room-maintenance", responses((status = OK, body = StatusResponse)), tag = MAINTENANCE_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Maintenance log database id"),
)
)]
async fn delete_log(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(EntityId { id }): Query<EntityId>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((
            user.role,
            "maintenance".to_string(),
            "delete".to_string(),
        ))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    if diesel::delete(room_maintenance_log.find(id))
        .execute(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("delete_log: {}", e);
            ApiError::Database
        })?
        == 0
    {
        Err(ApiError::NotFound("Maintenance log not found"))
    } else {
        Ok(Json(StatusResponse::ok("Maintenance log deleted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_maintenance_puts_the_room_out_of_service() {
        assert_eq!(
            room_status_after(MAINTENANCE_REPORTED),
            Some(ROOM_STATUS_MAINTENANCE)
        );
        assert_eq!(
            room_status_after(MAINTENANCE_IN_PROGRESS),
            Some(ROOM_STATUS_MAINTENANCE)
        );
    }

    #[test]
    fn resolving_returns_the_room_to_available() {
        assert_eq!(
            room_status_after(MAINTENANCE_RESOLVED),
            Some(ROOM_STATUS_AVAILABLE)
        );
    }

    #[test]
    fn unknown_statuses_map_to_none() {
        assert_eq!(room_status_after(0), None);
        assert_eq!(room_status_after(42), None);
    }
}
