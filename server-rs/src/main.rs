use axum::{
    http::HeaderValue,
    middleware as axum_mw,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

mod cache;
mod config;
mod db;
mod error;
mod middleware;
mod models;
mod routes;
mod services;

use cache::Cache;
use config::Config;
use middleware::rate_limit::RateLimiter;
use services::admission::BookingEngine;
use services::booking_store::PgBookingStore;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub cache: Cache,
    pub config: Arc<Config>,
    pub engine: BookingEngine,
    pub rate_limiter: RateLimiter,
    pub booking_rate_limiter: RateLimiter,
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

fn build_router(state: AppState) -> Router {
    // --- Auth routes ---
    let auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route(
            "/me",
            get(routes::auth::me).layer(axum_mw::from_fn_with_state(
                state.clone(),
                middleware::auth::authenticate,
            )),
        );

    // --- Public catalog ---
    let catalog_routes = Router::new()
        .route("/sports", get(routes::catalog::list_sports))
        .route("/facilities", get(routes::catalog::list_facilities))
        .route("/facilities/:id", get(routes::catalog::get_facility))
        .route(
            "/courts/:id/availability",
            get(routes::catalog::court_availability),
        );

    // --- Bookings (authenticated) ---
    let booking_routes = Router::new()
        .route(
            "/",
            post(routes::bookings::create_booking)
                .layer(axum_mw::from_fn_with_state(
                    state.clone(),
                    middleware::rate_limit::booking_rate_limit,
                ))
                .get(routes::bookings::list_my_bookings),
        )
        .route("/:id", get(routes::bookings::get_booking))
        .route("/:id/cancel", post(routes::bookings::cancel_booking))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::roles::require_active,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    // --- Facility owner tools ---
    let owner_routes = Router::new()
        .route(
            "/facilities",
            get(routes::owner::list_my_facilities).post(routes::owner::create_facility),
        )
        .route("/facilities/:id", put(routes::owner::update_facility))
        .route(
            "/facilities/:id/courts",
            get(routes::owner::list_courts).post(routes::owner::create_court),
        )
        .route(
            "/facilities/:id/bookings",
            get(routes::owner::list_owner_bookings),
        )
        .route("/courts/:id", put(routes::owner::update_court))
        .route("/courts/:id/hours", put(routes::owner::set_hours))
        .route(
            "/courts/:id/blocks",
            get(routes::owner::list_blocks).post(routes::owner::create_block),
        )
        .route(
            "/courts/:id/blocks/:block_id",
            axum::routing::delete(routes::owner::delete_block),
        )
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::roles::require_owner,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    // --- Admin ---
    let admin_routes = Router::new()
        .route("/stats", get(routes::admin::stats))
        .route("/facilities", get(routes::admin::list_facilities))
        .route(
            "/facilities/:id/approve",
            post(routes::admin::approve_facility),
        )
        .route(
            "/facilities/:id/reject",
            post(routes::admin::reject_facility),
        )
        .route("/users", get(routes::admin::search_users))
        .route("/users/:id/ban", post(routes::admin::ban_user))
        .route("/users/:id/unban", post(routes::admin::unban_user))
        .route("/users/:id/role", put(routes::admin::set_role))
        .route("/moderation-log", get(routes::admin::moderation_log))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::roles::require_admin,
        ))
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::auth::authenticate,
        ));

    // --- Compose full API ---
    let api = Router::new()
        .nest("/auth", auth_routes)
        .merge(catalog_routes)
        .nest("/bookings", booking_routes)
        .nest("/owner", owner_routes)
        .nest("/admin", admin_routes);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(routes::health::health))
        // Global middleware
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit,
        ))
        .layer(CompressionLayer::new())
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .json()
        .init();

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;
    let cache = Cache::new(&config).await?;

    let engine = BookingEngine::new(Arc::new(PgBookingStore::new(pool.clone())));
    let rate_limiter =
        RateLimiter::new(config.rate_limit.max_requests, config.rate_limit.window_secs);
    let booking_rate_limiter =
        RateLimiter::new(config.rate_limit.booking_max, config.rate_limit.window_secs);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    if config.is_production() && config.cors_origins.is_empty() {
        tracing::warn!("CORS_ORIGINS unset in production; allowing any origin");
    }
    tracing::info!(%addr, env = %config.app_env, "Courtside API starting");

    let state = AppState {
        db: pool,
        cache,
        config: Arc::new(config),
        engine,
        rate_limiter,
        booking_rate_limiter,
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
