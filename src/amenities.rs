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
use crate::model::{Amenity, EntityId, NewAmenity, StatusResponse};
use crate::schema::room_amenities::dsl::*;
use crate::schema::room_amenities_mapping;
use crate::validate::ValidatedForm;
use crate::AMENITY_TAG;

pub fn amenity_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new().routes(routes!(
        get_amenities,
        create_amenity,
        update_amenity,
        delete_amenity
    ))
}

#[derive(Serialize, ToSchema)]
struct AmenityListResponse {
    success: bool,
    amenities: Vec<Amenity>,
}

/// Amenity listing, active entries first.
#[utoipa::path(get, path = "/amenities", responses((status = OK, body = AmenityListResponse)), tag = AMENITY_TAG, security(
    ("session_cookie" = [])
))]
async fn get_amenities(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
) -> Result<Json<AmenityListResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "amenities".to_string(), "read".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;
    let listing: Vec<Amenity> = room_amenities
        .order((is_active.desc(), amenity_name.asc()))
        .select(Amenity::as_select())
        .load(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("get_amenities: {}", e);
            ApiError::Database
        })?;
    Ok(Json(AmenityListResponse {
        success: true,
        amenities: listing,
    }))
}

/// Create amenity.
#[utoipa::path(post, path = "/amenities", responses((status = OK, body = StatusResponse)), tag = AMENITY_TAG, security(
    ("session_cookie" = [])
))]
async fn create_amenity(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    ValidatedForm(body): ValidatedForm<NewAmenity>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "amenities".to_string(), "create".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let existing: i64 = room_amenities
        .filter(amenity_name.eq(&body.amenity_name))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("create_amenity: {}", e);
            ApiError::Database
        })?;
    if existing > 0 {
        return Err(ApiError::Conflict(format!(
            "Amenity {} already exists",
            body.amenity_name
        )));
    }

    insert_into(room_amenities)
        .values((amenity_name.eq(body.amenity_name), is_active.eq(true)))
        .execute(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("create_amenity: {}", e);
            ApiError::Database
        })?;
    Ok(Json(StatusResponse::ok("Amenity created")))
}

/// Rename an amenity or flip it back to active.
#[utoipa::path(put, path = "/amenities", responses((status = OK, body = StatusResponse)), tag = AMENITY_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Amenity database id"),
)
)]
async fn update_amenity(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(EntityId { id }): Query<EntityId>,
    ValidatedForm(body): ValidatedForm<NewAmenity>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "amenities".to_string(), "update".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let clashing: i64 = room_amenities
        .filter(amenity_name.eq(&body.amenity_name))
        .filter(amenity_id.ne(id))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("update_amenity: {}", e);
            ApiError::Database
        })?;
    if clashing > 0 {
        return Err(ApiError::Conflict(format!(
            "Amenity {} already exists",
            body.amenity_name
        )));
    }

    if diesel::update(room_amenities.find(id))
        .set((amenity_name.eq(body.amenity_name), is_active.eq(true)))
        .execute(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("update_amenity: {}", e);
            ApiError::Database
        })?
        == 0
    {
        Err(ApiError::NotFound("Amenity not found"))
    } else {
        Ok(Json(StatusResponse::ok("Amenity updated")))
    }
}

/// Delete amenity; entries still mapped to rooms are deactivated instead.
#[utoipa::path(delete, path = "/amenities", responses((status = OK, body = StatusResponse)), tag = AMENITY_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Amenity database id"),
)
)]
async fn delete_amenity(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(EntityId { id }): Query<EntityId>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "amenities".to_string(), "delete".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let mapped: i64 = room_amenities_mapping::table
        .filter(room_amenities_mapping::amenity_id.eq(id))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("delete_amenity: {}", e);
            ApiError::Database
        })?;

    if mapped > 0 {
        if diesel::update(room_amenities.find(id))
            .set(is_active.eq(false))
            .execute(&mut conn)
            .await
            .map_err(|e| {
                tracing::debug!("delete_amenity: {}", e);
                ApiError::Database
            })?
            == 0
        {
            return Err(ApiError::NotFound("Amenity not found"));
        }
        return Ok(Json(StatusResponse::ok(
            "Amenity is in use and was deactivated instead",
        )));
    }

    if diesel::delete(room_amenities.find(id))
        .execute(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("delete_amenity: {}", e);
            ApiError::Database
        })?
        == 0
    {
        Err(ApiError::NotFound("Amenity not found"))
    } else {
        Ok(Json(StatusResponse::ok("Amenity deleted")))
    }
}
