use std::collections::{HashMap, HashSet};

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use casbin::CoreApi;
use diesel::dsl::insert_into;
use diesel::{
    ExpressionMethods, OptionalExtension, PgTextExpressionMethods, QueryDsl, SelectableHelper,
};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::auth::{ApiError, SessionUser};
use crate::maintenance::ROOM_STATUS_AVAILABLE;
use crate::model::{AmenityMapping, NewRoom, Room, RoomInsert, StatusResponse};
use crate::schema::rooms::dsl::*;
use crate::schema::{
    reservations, room_amenities_mapping, room_maintenance_log, room_status, room_types,
};
use crate::validate::ValidatedForm;
use crate::ROOM_TAG;

pub fn room_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new()
        .routes(routes!(get_rooms, create_room, update_room, delete_room))
        .routes(routes!(bulk_create_rooms))
}

#[derive(Deserialize, IntoParams, Debug, Default)]
pub struct RoomListQuery {
    /// When present, returns this single room instead of a listing.
    pub id: Option<i32>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub status: Option<i32>,
    #[serde(rename = "type")]
    pub room_type: Option<i32>,
    pub floor: Option<i32>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct RoomView {
    pub room_id: i32,
    pub room_number: String,
    pub room_type_id: i32,
    pub type_name: String,
    pub status_id: i32,
    pub status_name: String,
    pub floor: i32,
    pub notes: Option<String>,
    pub amenities: Vec<i32>,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Serialize, ToSchema)]
struct RoomListResponse {
    success: bool,
    rooms: Vec<RoomView>,
    pagination: Pagination,
}

#[derive(Serialize, ToSchema)]
struct RoomDetailResponse {
    success: bool,
    room: RoomView,
}

#[derive(Serialize, ToSchema)]
struct BulkError {
    room_number: String,
    error: String,
}

#[derive(Serialize, ToSchema)]
struct BulkCreateResponse {
    success: bool,
    created_count: usize,
    errors: Vec<BulkError>,
}

fn clamp_page(requested: Option<i64>) -> i64 {
    requested.unwrap_or(1).max(1)
}

fn clamp_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(20).clamp(1, 100)
}

fn paginate(total: i64, page: i64, limit: i64) -> Pagination {
    Pagination {
        page,
        limit,
        total,
        total_pages: if total == 0 { 0 } else { (total + limit - 1) / limit },
    }
}

async fn amenity_ids_for(
    conn: &mut AsyncPgConnection,
    room_ids: &[i32],
) -> Result<HashMap<i32, Vec<i32>>, ApiError> {
    let mappings: Vec<(i32, i32)> = room_amenities_mapping::table
        .filter(room_amenities_mapping::room_id.eq_any(room_ids))
        .select((
            room_amenities_mapping::room_id,
            room_amenities_mapping::amenity_id,
        ))
        .load(conn)
        .await
        .map_err(|e| {
            tracing::debug!("amenity_ids_for: {}", e);
            ApiError::Database
        })?;

    let mut by_room: HashMap<i32, Vec<i32>> = HashMap::new();
    for (room, amenity) in mappings {
        by_room.entry(room).or_default().push(amenity);
    }
    Ok(by_room)
}

fn room_view(row: (Room, String, String), amenities: Vec<i32>) -> RoomView {
    let (room, type_name, status_name) = row;
    RoomView {
        room_id: room.room_id,
        room_number: room.room_number,
        room_type_id: room.room_type_id,
        type_name,
        status_id: room.status_id,
        status_name,
        floor: room.floor,
        notes: room.notes,
        amenities,
    }
}

/// Room listing with pagination and filters, or a single room via `id`.
#[utoipa::path(get, path = "/rooms", responses((status = OK, body = RoomListResponse)), tag = ROOM_TAG, security(
    ("session_cookie" = [])
),
params(RoomListQuery)
)]
async fn get_rooms(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(q): Query<RoomListQuery>,
) -> Result<Response, ApiError> {
    if !enforcer
        .enforce((user.role, "rooms".to_string(), "read".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    if let Some(wanted) = q.id {
        let row: (Room, String, String) = rooms
            .inner_join(room_types::table)
            .inner_join(room_status::table)
            .filter(room_id.eq(wanted))
            .select((
                Room::as_select(),
                room_types::type_name,
                room_status::status_name,
            ))
            .first(&mut conn)
            .await
            .map_err(|e| {
                tracing::debug!("get_rooms: {}", e);
                ApiError::NotFound("Room not found")
            })?;
        let amenities = amenity_ids_for(&mut conn, &[wanted]).await?;
        let view = room_view(row, amenities.get(&wanted).cloned().unwrap_or_default());
        return Ok(Json(RoomDetailResponse {
            success: true,
            room: view,
        })
        .into_response());
    }

    let page = clamp_page(q.page);
    let limit = clamp_limit(q.limit);

    let mut count_query = rooms.count().into_boxed();
    let mut list_query = rooms
        .inner_join(room_types::table)
        .inner_join(room_status::table)
        .select((
            Room::as_select(),
            room_types::type_name,
            room_status::status_name,
        ))
        .into_boxed();
    if let Some(term) = &q.search {
        let pattern = format!("%{}%", term);
        count_query = count_query.filter(room_number.ilike(pattern.clone()));
        list_query = list_query.filter(room_number.ilike(pattern));
    }
    if let Some(wanted) = q.status {
        count_query = count_query.filter(status_id.eq(wanted));
        list_query = list_query.filter(status_id.eq(wanted));
    }
    if let Some(wanted) = q.room_type {
        count_query = count_query.filter(room_type_id.eq(wanted));
        list_query = list_query.filter(room_type_id.eq(wanted));
    }
    if let Some(wanted) = q.floor {
        count_query = count_query.filter(floor.eq(wanted));
        list_query = list_query.filter(floor.eq(wanted));
    }

    let total: i64 = count_query.get_result(&mut conn).await.map_err(|e| {
        tracing::debug!("get_rooms (count): {}", e);
        ApiError::Database
    })?;

    let rows: Vec<(Room, String, String)> = list_query
        .order(room_number.asc())
        .limit(limit)
        .offset((page - 1) * limit)
        .load(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("get_rooms (page): {}", e);
            ApiError::Database
        })?;

    let ids: Vec<i32> = rows.iter().map(|(room, ..)| room.room_id).collect();
    let mut amenities = amenity_ids_for(&mut conn, &ids).await?;
    let views = rows
        .into_iter()
        .map(|row| {
            let found = amenities.remove(&row.0.room_id).unwrap_or_default();
            room_view(row, found)
        })
        .collect();

    Ok(Json(RoomListResponse {
        success: true,
        rooms: views,
        pagination: paginate(total, page, limit),
    })
    .into_response())
}

async fn room_number_taken(
    conn: &mut AsyncPgConnection,
    number: &str,
    exclude: Option<i32>,
) -> Result<bool, ApiError> {
    let mut query = rooms
        .count()
        .into_boxed()
        .filter(room_number.eq(number.to_string()));
    if let Some(keep) = exclude {
        query = query.filter(room_id.ne(keep));
    }
    let existing: i64 = query.get_result(conn).await.map_err(|e| {
        tracing::debug!("room_number_taken: {}", e);
        ApiError::Database
    })?;
    Ok(existing > 0)
}

async fn insert_room_with_amenities(
    conn: &mut AsyncPgConnection,
    room: RoomInsert,
    amenities: Vec<i32>,
) -> Result<Room, ApiError> {
    conn.transaction::<Room, ApiError, _>(|conn| {
        async move {
            let created: Room = insert_into(rooms)
                .values(&room)
                .get_result::<Room>(conn)
                .await?;
            if !amenities.is_empty() {
                let mappings: Vec<AmenityMapping> = amenities
                    .into_iter()
                    .map(|amenity| AmenityMapping {
                        room_id: created.room_id,
                        amenity_id: amenity,
                    })
                    .collect();
                insert_into(room_amenities_mapping::table)
                    .values(&mappings)
                    .execute(conn)
                    .await?;
            }
            Ok(created)
        }
        .scope_boxed()
    })
    .await
}

/// Create room with its amenity mapping.
#[utoipa::path(post, path = "/rooms", responses((status = OK, body = StatusResponse)), tag = ROOM_TAG, security(
    ("session_cookie" = [])
))]
async fn create_room(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    ValidatedForm(body): ValidatedForm<NewRoom>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "rooms".to_string(), "create".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    if room_number_taken(&mut conn, &body.room_number, None).await? {
        return Err(ApiError::Conflict(format!(
            "Room {} already exists",
            body.room_number
        )));
    }

    let insert = RoomInsert {
        room_number: body.room_number,
        room_type_id: body.room_type_id,
        status_id: body.status_id.unwrap_or(ROOM_STATUS_AVAILABLE),
        floor: body.floor,
        notes: body.notes,
    };
    insert_room_with_amenities(&mut conn, insert, body.amenities).await?;
    Ok(Json(StatusResponse::ok("Room created")))
}

/// Bulk-create rooms; each row succeeds or fails on its own.
#[utoipa::path(post, path = "/rooms/bulk", responses((status = OK, body = BulkCreateResponse)), tag = ROOM_TAG, security(
    ("session_cookie" = [])
))]
async fn bulk_create_rooms(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    ValidatedForm(body): ValidatedForm<crate::model::BulkRooms>,
) -> Result<Json<BulkCreateResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "rooms".to_string(), "create".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let mut created_count = 0;
    let mut errors = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for row in body.rooms {
        if !seen.insert(row.room_number.clone()) {
            errors.push(BulkError {
                room_number: row.room_number,
                error: "Duplicated in request".to_string(),
            });
            continue;
        }
        if room_number_taken(&mut conn, &row.room_number, None).await? {
            errors.push(BulkError {
                room_number: row.room_number,
                error: "Room already exists".to_string(),
            });
            continue;
        }
        let number = row.room_number.clone();
        let insert = RoomInsert {
            room_number: row.room_number,
            room_type_id: row.room_type_id,
            status_id: row.status_id.unwrap_or(ROOM_STATUS_AVAILABLE),
            floor: row.floor,
            notes: row.notes,
        };
        match insert_room_with_amenities(&mut conn, insert, row.amenities).await {
            Ok(_) => created_count += 1,
            Err(e) => errors.push(BulkError {
                room_number: number,
                error: e.to_string(),
            }),
        }
    }

    Ok(Json(BulkCreateResponse {
        success: true,
        created_count,
        errors,
    }))
}

/// Update room fields and replace its amenity mapping.
#[utoipa::path(put, path = "/rooms", responses((status = OK, body = StatusResponse)), tag = ROOM_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Room database id"),
)
)]
async fn update_room(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(crate::model::EntityId { id }): Query<crate::model::EntityId>,
    ValidatedForm(body): ValidatedForm<NewRoom>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "rooms".to_string(), "update".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let existing: Option<Room> = rooms
        .find(id)
        .select(Room::as_select())
        .first::<Room>(&mut conn)
        .await
        .optional()
        .map_err(|e| {
            tracing::debug!("update_room: {}", e);
            ApiError::Database
        })?;
    let Some(existing) = existing else {
        return Err(ApiError::NotFound("Room not found"));
    };

    if room_number_taken(&mut conn, &body.room_number, Some(existing.room_id)).await? {
        return Err(ApiError::Conflict(format!(
            "Room {} already exists",
            body.room_number
        )));
    }

    conn.transaction::<(), ApiError, _>(|conn| {
        async move {
            diesel::update(rooms.find(id))
                .set((
                    room_number.eq(body.room_number),
                    room_type_id.eq(body.room_type_id),
                    status_id.eq(body.status_id.unwrap_or(existing.status_id)),
                    floor.eq(body.floor),
                    notes.eq(body.notes),
                ))
                .execute(conn)
                .await?;
            diesel::delete(
                room_amenities_mapping::table.filter(room_amenities_mapping::room_id.eq(id)),
            )
            .execute(conn)
            .await?;
            if !body.amenities.is_empty() {
                let mappings: Vec<AmenityMapping> = body
                    .amenities
                    .into_iter()
                    .map(|amenity| AmenityMapping {
                        room_id: id,
                        amenity_id: amenity,
                    })
                    .collect();
                insert_into(room_amenities_mapping::table)
                    .values(&mappings)
                    .execute(conn)
                    .await?;
            }
            Ok(())
        }
        .scope_boxed()
    })
    .await?;

    Ok(Json(StatusResponse::ok("Room updated")))
}

/// Delete room unless reservations or maintenance history reference it.
#[utoipa::path(delete, path = "/rooms", responses((status = OK, body = StatusResponse)), tag = ROOM_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Room database id"),
)
)]
async fn delete_room(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(crate::model::EntityId { id }): Query<crate::model::EntityId>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "rooms".to_string(), "delete".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let reserved: i64 = reservations::table
        .filter(reservations::room_id.eq(id))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("delete_room (reservations): {}", e);
            ApiError::Database
        })?;
    let logged: i64 = room_maintenance_log::table
        .filter(room_maintenance_log::room_id.eq(id))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("delete_room (maintenance): {}", e);
            ApiError::Database
        })?;
    if reserved > 0 || logged > 0 {
        return Err(ApiError::Conflict(
            "Room is referenced by reservations or maintenance history".to_string(),
        ));
    }

    let deleted = conn
        .transaction::<usize, ApiError, _>(|conn| {
            async move {
                diesel::delete(
                    room_amenities_mapping::table.filter(room_amenities_mapping::room_id.eq(id)),
                )
                .execute(conn)
                .await?;
                Ok(diesel::delete(rooms.find(id)).execute(conn).await?)
            }
            .scope_boxed()
        })
        .await?;

    if deleted == 0 {
        Err(ApiError::NotFound("Room not found"))
    } else {
        Ok(Json(StatusResponse::ok("Room deleted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_and_limit_are_clamped() {
        assert_eq!(clamp_page(None), 1);
        assert_eq!(clamp_page(Some(0)), 1);
        assert_eq!(clamp_page(Some(-3)), 1);
        assert_eq!(clamp_page(Some(7)), 7);

        assert_eq!(clamp_limit(None), 20);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(500)), 100);
        assert_eq!(clamp_limit(Some(25)), 25);
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(paginate(0, 1, 20).total_pages, 0);
        assert_eq!(paginate(1, 1, 20).total_pages, 1);
        assert_eq!(paginate(20, 1, 20).total_pages, 1);
        assert_eq!(paginate(21, 1, 20).total_pages, 2);
    }
}
