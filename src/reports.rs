use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use casbin::CoreApi;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use diesel::sql_types::{Date, Text};
use diesel::{
    sql_query, ExpressionMethods, NullableExpressionMethods, QueryDsl, QueryableByName,
    SelectableHelper,
};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::auth::{ApiError, SessionUser};
use crate::model::{
    FrontdeskReport, FrontdeskReportInsert, NewReport, NotificationInsert, StatusResponse,
};
use crate::schema::{employees, frontdesk_reports, report_notifications};
use crate::validate::ValidatedForm;
use crate::REPORT_TAG;

/// Tables the report rollups read from; `action=debug` probes these.
const REPORT_TABLES: [&str; 4] = [
    "reservations",
    "frontdesk_reports",
    "report_notifications",
    "rooms",
];

pub fn report_router() -> OpenApiRouter<crate::State> {
    OpenApiRouter::new().routes(routes!(get_reports, create_report, mark_notification_read))
}

#[derive(Deserialize, IntoParams, Debug, Default)]
pub struct ReportQuery {
    /// One of `revenue`, `frontdesk`, `unread_count`, `debug`.
    pub action: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(QueryableByName, Serialize, ToSchema, Debug)]
pub struct RevenueDay {
    #[diesel(sql_type = Date)]
    pub day: NaiveDate,
    #[diesel(sql_type = diesel::sql_types::Double)]
    pub revenue: f64,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    pub reservations: i64,
}

#[derive(Serialize, ToSchema)]
struct RevenueResponse {
    success: bool,
    from: NaiveDate,
    to: NaiveDate,
    days: Vec<RevenueDay>,
    total_revenue: f64,
    total_reservations: i64,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct ReportView {
    pub report_id: i32,
    pub author_id: Option<i32>,
    pub author_name: Option<String>,
    pub shift: String,
    pub summary: String,
    pub created_at: NaiveDateTime,
}

#[derive(Serialize, ToSchema)]
struct ReportListResponse {
    success: bool,
    reports: Vec<ReportView>,
}

#[derive(Serialize, ToSchema)]
struct UnreadCountResponse {
    success: bool,
    unread_count: i64,
}

#[derive(Serialize, ToSchema)]
struct DebugResponse {
    success: bool,
    tables: HashMap<String, bool>,
}

#[derive(QueryableByName)]
struct Probe {
    #[diesel(sql_type = diesel::sql_types::Bool)]
    present: bool,
}

async fn table_present(conn: &mut AsyncPgConnection, name: &str) -> Result<bool, ApiError> {
    let probe: Probe = sql_query(
        "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_name = $1) AS present",
    )
    .bind::<Text, _>(name)
    .get_result(conn)
    .await
    .map_err(|e| {
        tracing::debug!("table_present: {}", e);
        ApiError::Database
    })?;
    Ok(probe.present)
}

fn revenue_window(from: Option<NaiveDate>, to: Option<NaiveDate>, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let to = to.unwrap_or(today);
    let from = from.unwrap_or(to - Duration::days(30));
    (from, to)
}

async fn revenue_report(
    conn: &mut AsyncPgConnection,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<RevenueResponse, ApiError> {
    // Probe before aggregating; a missing table degrades to an empty rollup.
    let days: Vec<RevenueDay> = if table_present(conn, "reservations").await? {
        sql_query(
            "SELECT check_in AS day, \
                    COALESCE(SUM(total_amount), 0) AS revenue, \
                    COUNT(*) AS reservations \
             FROM reservations \
             WHERE check_in BETWEEN $1 AND $2 \
             GROUP BY check_in \
             ORDER BY check_in",
        )
        .bind::<Date, _>(from)
        .bind::<Date, _>(to)
        .load(conn)
        .await
        .map_err(|e| {
            tracing::debug!("revenue_report: {}", e);
            ApiError::Database
        })?
    } else {
        tracing::warn!("reservations table missing, returning empty revenue rollup");
        Vec::new()
    };

    let total_revenue = days.iter().map(|d| d.revenue).sum();
    let total_reservations = days.iter().map(|d| d.reservations).sum();
    Ok(RevenueResponse {
        success: true,
        from,
        to,
        days,
        total_revenue,
        total_reservations,
    })
}

async fn frontdesk_listing(conn: &mut AsyncPgConnection) -> Result<ReportListResponse, ApiError> {
    let rows: Vec<(FrontdeskReport, Option<String>)> = frontdesk_reports::table
        .left_join(employees::table)
        .order(frontdesk_reports::created_at.desc())
        .select((
            FrontdeskReport::as_select(),
            employees::full_name.nullable(),
        ))
        .load(conn)
        .await
        .map_err(|e| {
            tracing::debug!("frontdesk_listing: {}", e);
            ApiError::Database
        })?;

    let reports = rows
        .into_iter()
        .map(|(report, author_name)| ReportView {
            report_id: report.report_id,
            author_id: report.author_id,
            author_name,
            shift: report.shift,
            summary: report.summary,
            created_at: report.created_at,
        })
        .collect();
    Ok(ReportListResponse {
        success: true,
        reports,
    })
}

/// Report dispatch: revenue rollup, front-desk listing, unread counter or
/// the table-presence debug view, selected by `action`.
#[utoipa::path(get, path = "/reports", responses((status = OK, body = RevenueResponse)), tag = REPORT_TAG, security(
    ("session_cookie" = [])
),
params(ReportQuery)
)]
async fn get_reports(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(q): Query<ReportQuery>,
) -> Result<Response, ApiError> {
    if !enforcer
        .enforce((user.role.clone(), "reports".to_string(), "read".to_string()))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    match q.action.as_deref().unwrap_or("revenue") {
        "revenue" => {
            let (from, to) = revenue_window(q.from, q.to, Local::now().date_naive());
            if from > to {
                return Err(ApiError::Validation("Invalid date range".to_string()));
            }
            Ok(Json(revenue_report(&mut conn, from, to).await?).into_response())
        }
        "frontdesk" => Ok(Json(frontdesk_listing(&mut conn).await?).into_response()),
        "unread_count" => {
            let unread: i64 = report_notifications::table
                .filter(report_notifications::recipient_id.eq(user.user_id))
                .filter(report_notifications::is_read.eq(false))
                .count()
                .get_result(&mut conn)
                .await
                .map_err(|e| {
                    tracing::debug!("get_reports (unread): {}", e);
                    ApiError::Database
                })?;
            Ok(Json(UnreadCountResponse {
                success: true,
                unread_count: unread,
            })
            .into_response())
        }
        "debug" => {
            let mut tables = HashMap::new();
            for name in REPORT_TABLES {
                tables.insert(name.to_string(), table_present(&mut conn, name).await?);
            }
            Ok(Json(DebugResponse {
                success: true,
                tables,
            })
            .into_response())
        }
        other => Err(ApiError::Validation(format!("Unknown action {}", other))),
    }
}

/// File a front-desk report; every other active staff member gets an unread
/// notification in the same transaction.
#[utoipa::path(post, path = "/reports", responses((status = OK, body = StatusResponse)), tag = REPORT_TAG, security(
    ("session_cookie" = [])
))]
async fn create_report(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    ValidatedForm(body): ValidatedForm<NewReport>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((
            user.role.clone(),
            "reports".to_string(),
            "create".to_string(),
        ))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let author = user.user_id;
    conn.transaction::<(), ApiError, _>(|conn| {
        async move {
            let record = FrontdeskReportInsert {
                author_id: Some(author),
                shift: body.shift,
                summary: body.summary,
            };
            let created: FrontdeskReport = diesel::insert_into(frontdesk_reports::table)
                .values(&record)
                .get_result::<FrontdeskReport>(conn)
                .await?;

            let recipients: Vec<i32> = employees::table
                .filter(employees::is_active.eq(Some(true)))
                .filter(employees::employee_id.ne(author))
                .select(employees::employee_id)
                .load::<i32>(conn)
                .await?;
            if !recipients.is_empty() {
                let notifications: Vec<NotificationInsert> = recipients
                    .into_iter()
                    .map(|recipient| NotificationInsert {
                        report_id: created.report_id,
                        recipient_id: recipient,
                    })
                    .collect();
                diesel::insert_into(report_notifications::table)
                    .values(&notifications)
                    .execute(conn)
                    .await?;
            }
            Ok(())
        }
        .scope_boxed()
    })
    .await?;

    Ok(Json(StatusResponse::ok("Report filed")))
}

/// Mark one of the caller's notifications as read.
#[utoipa::path(put, path = "/reports", responses((status = OK, body = StatusResponse)), tag = REPORT_TAG, security(
    ("session_cookie" = [])
),
params(
    ("id" = i32, Query, description = "Notification database id"),
)
)]
async fn mark_notification_read(
    user: SessionUser,
    State(crate::State { pool, enforcer, .. }): State<crate::State>,
    Query(crate::model::EntityId { id }): Query<crate::model::EntityId>,
) -> Result<Json<StatusResponse>, ApiError> {
    if !enforcer
        .enforce((
            user.role.clone(),
            "reports".to_string(),
            "update".to_string(),
        ))
        .unwrap_or_default()
    {
        return Err(ApiError::PermissionDenied);
    }
    let mut conn = pool.get().await.map_err(|_| ApiError::Database)?;

    let updated = diesel::update(
        report_notifications::table
            .filter(report_notifications::notification_id.eq(id))
            .filter(report_notifications::recipient_id.eq(user.user_id)),
    )
    .set(report_notifications::is_read.eq(true))
    .execute(&mut conn)
    .await
    .map_err(|e| {
        tracing::debug!("mark_notification_read: {}", e);
        ApiError::Database
    })?;

    if updated == 0 {
        Err(ApiError::NotFound("Notification not found"))
    } else {
        Ok(Json(StatusResponse::ok("Notification marked as read")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_defaults_to_trailing_thirty_days() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let (from, to) = revenue_window(None, None, today);
        assert_eq!(to, today);
        assert_eq!(from, today - Duration::days(30));
    }

    #[test]
    fn explicit_bounds_are_kept() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let from = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        assert_eq!(revenue_window(Some(from), Some(to), today), (from, to));
    }

    #[test]
    fn open_ended_from_anchors_to_the_given_end() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let (from, resolved_to) = revenue_window(None, Some(to), today);
        assert_eq!(resolved_to, to);
        assert_eq!(from, to - Duration::days(30));
    }
}
