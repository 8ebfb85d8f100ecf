use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use redis::Client as RedisClient;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use murattal_api::{
    config::Config,
    db,
    middleware::auth::JwtSecret,
    routes,
    services::{email::EmailService, metrics},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let config = Arc::new(config);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let redis_conn = RedisClient::open(config.redis_url.as_str())?
        .get_multiplexed_async_connection()
        .await?;
    info!("Redis connected");

    let email = EmailService::new(&config).map(Arc::new);
    if email.is_some() {
        info!("SMTP email service configured");
    } else {
        info!("SMTP not configured — email features disabled");
    }

    metrics::start(pool.clone());

    let state = AppState {
        db: pool,
        redis: redis_conn,
        config: config.clone(),
        email,
    };

    // CORS: allow the public app origin; localhost is always allowed for
    // local development.
    let base_url = config.app_base_url.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let o = match origin.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };
        if o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") {
            return true;
        }
        o == base_url
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::HeaderName::from_static("x-ops-key"),
        ]))
        .allow_origin(cors_origin);

    let jwt_secret = JwtSecret(config.jwt_secret.clone());

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics))
        // Auth
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh_token))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/forgot-password", post(routes::auth::forgot_password))
        .route("/auth/reset-password", post(routes::auth::reset_password))
        .route("/auth/signup", post(routes::auth::signup))
        .route("/auth/invite", post(routes::auth::invite_user))
        .route("/auth/invitations", get(routes::auth::list_pending_invitations))
        .route("/auth/invitations/{id}", delete(routes::auth::delete_invitation))
        .route("/auth/register", post(routes::auth::register_from_invite))
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/change-password", post(routes::auth::change_password))
        // KYS applications
        .route(
            "/applications",
            get(routes::applications::list_applications)
                .post(routes::applications::create_application),
        )
        .route(
            "/applications/{id}",
            get(routes::applications::get_application)
                .put(routes::applications::update_application),
        )
        .route("/applications/{id}/submit", post(routes::applications::submit_application))
        .route("/applications/{id}/approve", post(routes::applications::approve_application))
        .route("/applications/{id}/reject", post(routes::applications::reject_application))
        .route("/applications/stats", get(routes::applications::application_stats))
        // Application documents
        .route(
            "/applications/{id}/documents",
            get(routes::documents::list_documents).post(routes::documents::upload_document),
        )
        .route(
            "/applications/{id}/documents/{doc_id}",
            get(routes::documents::download_document).delete(routes::documents::delete_document),
        )
        // Public directory of approved schools
        .route("/schools", get(routes::schools::list_schools))
        // Administration
        .route("/users", get(routes::users::list_users))
        .route("/users/{id}", delete(routes::users::deactivate_user))
        .route("/users/{id}/reactivate", put(routes::users::reactivate_user))
        .route("/audit-log", get(routes::audit_log::list_audit_log))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Global body size limit of 25 MB (covers document uploads)
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024))
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Al-Murattal KYS API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
