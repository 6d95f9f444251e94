use axum::extract::{Query, State};
use axum::Json;
use casbin::CoreApi;
use diesel::dsl::insert_into;
use diesel::{ExpressionMethods, PgTextExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::auth::{ApiError, SessionUser};
use crate::model::{EntityId, MenuItem, MenuItemInsert, NewMenuItem, StatusResponse};
use crate::schema::menu_items::dsl::*;
use crate::validate::ValidatedForm;
use crate::MENU_TAG;

pub fn menu_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new().routes(routes!(get_items, create_item, update_item, delete_item))
}

#[derive(Deserialize, IntoParams, Debug, Default)]
pub struct MenuListQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub available: Option<bool>,
}

#[derive(Serialize, ToSchema)]
struct MenuListResponse {
    success: bool,
    items: Vec<MenuItem>,
}

/// Menu listing with category / search / availability filters.
#[utoipa::path(get, path = "/menu-items", responses((status = OK, body = MenuListResponse)), tag = MENU_TAG, security(
    ("session_cookie" = [])
),
params(MenuListQuery)
)]
async fn get_items(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(q): Query<MenuListQuery>,
) -> Result<Json<MenuListResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "menu_items".to_string(), "read".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let mut query = menu_items.select(MenuItem::as_select()).into_boxed();
    if let Some(wanted) = &q.category {
        query = query.filter(category.eq(wanted.clone()));
    }
    if let Some(term) = &q.search {
        query = query.filter(item_name.ilike(format!("%{}%", term)));
    }
    if let Some(wanted) = q.available {
        query = query.filter(is_available.eq(wanted));
    }

    let listing: Vec<MenuItem> = query
        .order((category.asc(), item_name.asc()))
        .load(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("get_items: {}", e);
            ApiError::Database
        })?;
    Ok(Json(MenuListResponse {
        success: true,
        items: listing,
    }))
}

/// Create menu item.
#[utoipa::path(post, path = "/menu-items", responses((status = OK, body = StatusResponse)), tag = MENU_TAG, security(
    ("session_cookie" = [])
))]
async fn create_item(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    ValidatedForm(body): ValidatedForm<NewMenuItem>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "menu_items".to_string(), "create".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let existing: i64 = menu_items
        .filter(item_name.eq(&body.item_name))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("create_item: {}", e);
            ApiError::Database
        })?;
    if existing > 0 {
        return Err(ApiError::Conflict(format!(
            "Menu item {} already exists",
            body.item_name
        )));
    }

    let record = MenuItemInsert {
        item_name: body.item_name,
        category: body.category,
        price: body.price,
        is_available: body.is_available,
    };
    insert_into(menu_items)
        .values(&record)
        .execute(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("create_item: {}", e);
            ApiError::Database
        })?;
    Ok(Json(StatusResponse::ok("Menu item created")))
}

/// Update menu item, including its availability flag.
#[utoipa::path(put, path = "/menu-items", responses((status = OK, body = StatusResponse)), tag = MENU_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Menu item database id"),
)
)]
async fn update_item(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(EntityId { id }): Query<EntityId>,
    ValidatedForm(body): ValidatedForm<NewMenuItem>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "menu_items".to_string(), "update".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let clashing: i64 = menu_items
        .filter(item_name.eq(&body.item_name))
        .filter(item_id.ne(id))
        .count()
        .get_result(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("update_item: {}", e);
            ApiError::Database
        })?;
    if clashing > 0 {
        return Err(ApiError::Conflict(format!(
            "Menu item {} already exists",
            body.item_name
        )));
    }

    if diesel::update(menu_items.find(id))
        .set((
            item_name.eq(body.item_name),
            category.eq(body.category),
            price.eq(body.price),
            is_available.eq(body.is_available),
        ))
        .execute(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("update_item: {}", e);
            ApiError::Database
        })?
        == 0
    {
        Err(ApiError::NotFound("Menu item not found"))
    } else {
        Ok(Json(StatusResponse::ok("Menu item updated")))
    }
}

/// Delete menu item.
#[utoipa::path(delete, path = "/menu-items", responses((status = OK, body = StatusResponse)), tag = MENU_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Menu item database id"),
)
)]
async fn delete_item(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(EntityId { id }): Query<EntityId>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((user.role, "menu_items".to_string(), "delete".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    if diesel::delete(menu_items.find(id))
        .execute(&mut conn)
        .await
        .map_err(|e| {
            tracing::debug!("delete_item: {}", e);
            ApiError::Database
        })?
        == 0
    {
        Err(ApiError::NotFound("Menu item not found"))
    } else {
        Ok(Json(StatusResponse::ok("Menu item deleted")))
    }
}
