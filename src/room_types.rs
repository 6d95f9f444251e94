use axum::extract::{Query, State};
use axum::Json;
use casbin::CoreApi;
use diesel::dsl::insert_into;
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::auth::{ApiError, SessionUser};
use crate::model::{EntityId, NewRoomType, RoomType, RoomTypeInsert, StatusResponse};
use crate::schema::room_types::dsl::*;
use crate::schema::rooms;
use crate::validate::ValidatedForm;
use crate::ROOM_TYPE_TAG;

pub fn room_type_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new().routes(routes!(
        get_room_types,
        create_room_type,
        update_room_type,
        delete_room_type
    ))
}

#[derive(Serialize, ToSchema)]
struct RoomTypeListResponse {
    success: bool,
    room_types: Vec<RoomType>,
}

/// Room type listing.
#[utoipa::path(get, path = "/room-types", responses((status = OK, body = RoomTypeListResponse)), tag = ROOM_TYPE_TAG, security(
    ("session_cookie" = [])
))]
async fn get_room_types(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
) -> Result<Json<RoomTypeListResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "room_types".to_string(), "read".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;
    let listing: Vec<RoomType> = room_types
        .order(type_name.asc())
        .select(RoomType::as_select())
        .load(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("get_room_types: {}", e);
            ApiError::Database
        })?;
    Ok(Json(RoomTypeListResponse {
        success: true,
        room_types: listing,
    }))
}

/// Create room type.
#[utoipa::path(post, path = "/room-types", responses((status = OK, body = StatusResponse)), tag = ROOM_TYPE_TAG, security(
    ("session_cookie" = [])
))]
async fn create_room_type(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    ValidatedForm(body): ValidatedForm<NewRoomType>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "room_types".to_string(), "create".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let existing: i64 = room_types
        .filter(type_name.eq(&body.type_name))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("create_room_type: {}", e);
            ApiError::Database
        })?;
    if existing > 0 {
        return Err(ApiError::Conflict(format!(
            "Room type {} already exists",
            body.type_name
        )));
    }

    let record = RoomTypeInsert {
        type_name: body.type_name,
        description: body.description,
        base_rate: body.base_rate,
    };
    insert_into(room_types)
        .values(&record)
        .execute(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("create_room_type: {}", e);
            ApiError::Database
        })?;
    Ok(Json(StatusResponse::ok("Room type created")))
}

/// Update room type.
#[utoipa::path(put, path = "/room-types", responses((status = OK, body = StatusResponse)), tag = ROOM_TYPE_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Room type database id"),
)
)]
async fn update_room_type(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(EntityId { id }): Query<EntityId>,
    ValidatedForm(body): ValidatedForm<NewRoomType>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "room_types".to_string(), "update".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let clashing: i64 = room_types
        .filter(type_name.eq(&body.type_name))
        .filter(room_type_id.ne(id))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("update_room_type: {}", e);
            ApiError::Database
        })?;
    if clashing > 0 {
        return Err(ApiError::Conflict(format!(
            "Room type {} already exists",
            body.type_name
        )));
    }

    if diesel::update(room_types.find(id))
        .set((
            type_name.eq(body.type_name),
            description.eq(body.description),
            base_rate.eq(body.base_rate),
        ))
        .execute(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("update_room_type: {}", e);
            ApiError::Database
        })?
        == 0
    {
        Err(ApiError::NotFound("Room type not found"))
    } else {
        Ok(Json(StatusResponse::ok("Room type updated")))
    }
}

/// Delete room type; refused while rooms still use it.
#[utoipa::path(delete, path = "/room-types", responses((status = OK, body = StatusResponse)), tag = ROOM_TYPE_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Room type database id"),
)
)]
async fn delete_room_type(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(EntityId { id }): Query<EntityId>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "room_types".to_string(), "delete".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let in_use: i64 = rooms::table
        .filter(rooms::room_type_id.eq(id))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("delete_room_type: {}", e);
            ApiError::Database
        })?;
    if in_use > 0 {
        return Err(ApiError::Conflict(
            "Room type is assigned to existing rooms".to_string(),
        ));
    }

    if diesel::delete(room_types.find(id))
        .execute(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("delete_room_type: {}", e);
            ApiError::Database
        })?
        == 0
    {
        Err(ApiError::NotFound("Room type not found"))
    } else {
        Ok(Json(StatusResponse::ok("Room type deleted")))
    }
}
