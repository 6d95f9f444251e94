pub mod account;
pub mod amenities;
pub mod auth;
pub mod maintenance;
pub mod mailer;
pub mod menu;
mod model;
pub mod otp;
pub mod reports;
pub mod room_types;
pub mod rooms;
mod schema;
pub mod users;
pub mod validate;

use std::net::Ipv4Addr;
use std::sync::Arc;

use auth::SecurityAddon;
use axum::http::{request::Parts, HeaderValue};
use casbin::{CoreApi, Enforcer};
use diesel::{pg::Pg, Connection, PgConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use mailer::EmailService;
use otp::OtpService;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

const AUTH_TAG: &str = "auth";
const ROOM_TAG: &str = "rooms";
const ROOM_TYPE_TAG: &str = "room-types";
const AMENITY_TAG: &str = "amenities";
const MENU_TAG: &str = "menu-items";
const MAINTENANCE_TAG: &str = "room-maintenance";
const USER_TAG: &str = "users";
const REPORT_TAG: &str = "reports";

type Pool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

#[derive(Clone)]
pub struct State {
    pool: Pool,
    enforcer: Arc<Enforcer>,
    mailer: Arc<EmailService>,
    otp: OtpService,
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    tags(
        (name = AUTH_TAG, description = "Login, MFA and password reset endpoints"),
        (name = ROOM_TAG, description = "Room management endpoints"),
        (name = ROOM_TYPE_TAG, description = "Room type endpoints"),
        (name = AMENITY_TAG, description = "Room amenity endpoints"),
        (name = MENU_TAG, description = "Menu item endpoints"),
        (name = MAINTENANCE_TAG, description = "Room maintenance endpoints"),
        (name = USER_TAG, description = "Staff account endpoints"),
        (name = REPORT_TAG, description = "Revenue and front-desk report endpoints")
    )
)]
struct ApiDoc;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

fn run_migrations(
    connection: &mut impl MigrationHarness<Pg>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    connection.run_pending_migrations(MIGRATIONS)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let db_url = std::env::var("DATABASE_URL").unwrap();
    let acl_model = std::env::var("ACL_MODEL").unwrap().leak();
    let acl_policy = std::env::var("ACL_POLICY").unwrap().leak();
    let admin_origin = std::env::var("ADMIN_ORIGIN")
        .unwrap_or_else(|_| "http://localhost:5173".to_string());

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::DEBUG.into())
        .from_env()?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_filter(filter),
        )
        .init();

    let mut migration_connection = PgConnection::establish(&db_url).unwrap();
    run_migrations(&mut migration_connection).unwrap();
    drop(migration_connection);
    // set up connection pool
    let config = AsyncDieselConnectionManager::<diesel_async::AsyncPgConnection>::new(db_url);
    let pool = bb8::Pool::builder().build(config).await.unwrap();

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/api/auth", account::auth_router())
        .nest("/api/auth", account::check_router())
        .nest("/api/admin", rooms::room_router())
        .nest("/api/admin", room_types::room_type_router())
        .nest("/api/admin", amenities::amenity_router())
        .nest("/api/admin", menu::menu_router())
        .nest("/api/admin", maintenance::maintenance_router())
        .nest("/api/admin", users::user_router())
        .nest("/api/admin", reports::report_router())
        .with_state(State {
            pool,
            enforcer: Arc::new(Enforcer::new(&*acl_model, &*acl_policy).await.unwrap()),
            mailer: Arc::new(EmailService::from_env()),
            otp: OtpService::from_env(),
        })
        .split_for_parts();

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_expiry(Expiry::OnInactivity(Duration::hours(8)));

    // Wide-open CORS everywhere except the session check endpoint, which
    // only admits the configured admin origin.
    let check_origin = HeaderValue::from_str(&admin_origin)?;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, parts: &Parts| {
                if parts.uri.path() == "/api/auth/check" {
                    origin == check_origin
                } else {
                    true
                }
            },
        ))
        .allow_methods(Any)
        .allow_headers(Any);

    let router = router
        .merge(SwaggerUi::new("/swagger-ui").url("/apidoc/openapi.json", api))
        .layer(session_layer)
        .layer(cors);

    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, 8080)).await?;
    info!("Listening on 0.0.0.0:8080");
    Ok(axum::serve(listener, router).await?)
}
