//! # backctl: Access Control & Credential Verification Engine
//!
//! `backctl` is the authentication and authorization control plane for a
//! multi-tenant back-office application (businesses, branches, products,
//! orders, stock, suppliers). It owns four concerns:
//!
//! - **Permission catalog and roles**: permissions are `resource:action`
//!   codes attached to roles; a user holds exactly one role.
//! - **Sessions**: login issues a signed JWT cookie carrying the user's
//!   identity and flattened permission codes, so navigation checks never
//!   need a database round trip.
//! - **Navigation gating**: a route table maps path patterns like
//!   `/businesses/{business_id}/dashboard` to required permissions. A
//!   middleware decides per request whether to pass, demand login, or deny.
//!   Handlers additionally call [`auth::guard::require`] so the check holds
//!   even for paths the table does not cover.
//! - **Verification credentials**: email verification tokens, one-time
//!   passcodes, and password reset tokens, all single-use with server-side
//!   expiry and deliberately generic rejection messages.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum); persistence is
//! PostgreSQL behind the [`store::AuthStore`] trait, with an in-memory
//! implementation for tests. Emails go out through
//! [lettre](https://lettre.rs), either over SMTP or to files during
//! development.
//!
//! ## Quick start
//!
//! ```no_run
//! use clap::Parser;
//! use backctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = backctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     backctl::telemetry::init_telemetry()?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
mod email;
pub mod errors;
pub mod models;
mod openapi;
pub mod store;
pub mod telemetry;
pub mod types;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{debug, info, instrument, Level};
use utoipa::OpenApi;

use crate::auth::middleware::navigation_gate_middleware;
use crate::auth::password;
use crate::auth::routes::RouteTable;
use crate::models::{UserCreateRequest, UserStatus};
use crate::store::{AuthStore, PgStore};
pub use crate::types::{BranchId, BusinessId, RoleId, TokenId, UserId};

/// Application state shared across all request handlers.
#[derive(Clone, Builder)]
pub struct AppState {
    pub store: Arc<dyn AuthStore>,
    pub config: Config,
    pub routes: Arc<RouteTable>,
}

/// Get the backctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Create the initial owner account if it doesn't exist.
///
/// Idempotent: called on every startup so a fresh deployment always has a
/// usable owner login. The account is created directly in `active` status,
/// skipping email verification.
#[instrument(skip_all)]
pub async fn create_initial_owner(store: &dyn AuthStore, config: &Config) -> anyhow::Result<UserId> {
    if let Some(existing) = store.get_user_by_email(&config.owner_email).await? {
        return Ok(existing.id);
    }

    let role = store
        .get_role_by_title("owner")
        .await?
        .ok_or_else(|| anyhow::anyhow!("owner role missing; migrations have not run"))?;

    let password_hash = config.owner_password.as_deref().map(password::hash_string).transpose()?;

    let business_id = config.owner_business_id.unwrap_or_else(uuid::Uuid::new_v4);
    let user = store
        .create_user(&UserCreateRequest {
            username: config.owner_username.clone(),
            email: config.owner_email.clone(),
            password_hash,
            role_id: role.id,
            business_id,
            branch_id: None,
        })
        .await?;
    store.update_user_status(user.id, UserStatus::Active).await?;

    info!(email = %config.owner_email, business = %business_id, "created initial owner account");
    Ok(user.id)
}

/// Build the application router: public authentication surface, guarded
/// management endpoints, the navigation gate, and tracing.
pub fn build_router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/authentication/register", post(api::handlers::auth::register))
        .route("/authentication/login", post(api::handlers::auth::login))
        .route("/authentication/logout", post(api::handlers::auth::logout))
        .route("/authentication/otp", post(api::handlers::auth::request_otp))
        .route("/authentication/otp/verify", post(api::handlers::auth::verify_otp))
        .route("/authentication/password-resets", post(api::handlers::auth::request_password_reset))
        .route(
            "/authentication/password-resets/{token_id}/confirm",
            post(api::handlers::auth::confirm_password_reset),
        )
        .route("/verify-email", get(api::handlers::auth::verify_email));

    let management_routes = Router::new()
        .route("/me", get(api::handlers::access::me))
        .route("/roles", get(api::handlers::access::list_roles))
        .route("/permissions", get(api::handlers::access::list_permissions))
        .route("/roles/{role_id}/permissions", get(api::handlers::access::list_role_permissions))
        .route(
            "/roles/{role_id}/permissions/{code}",
            post(api::handlers::access::assign_permission).delete(api::handlers::access::unassign_permission),
        )
        .route("/users", get(api::handlers::access::list_users));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(openapi::ApiDoc::openapi()) }))
        .merge(auth_routes)
        .merge(management_routes)
        // The gate runs before routing, so it also covers paths with no handler
        .layer(from_fn_with_state(state.clone(), navigation_gate_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

/// Main application struct that owns all resources and lifecycle.
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Connect to the database, run migrations, bootstrap the owner account,
    /// and build the router.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting backctl with configuration: {:#?}", config);

        let database_url = config
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("database_url is required (set DATABASE_URL or database_url in config)"))?;

        let pool = PgPool::connect(database_url).await?;
        migrator().run(&pool).await?;

        let store: Arc<dyn AuthStore> = Arc::new(PgStore::new(pool.clone()));
        create_initial_owner(store.as_ref(), &config).await?;

        let routes = Arc::new(RouteTable::from_config(&config.routes)?);
        let state = AppState::builder().store(store).config(config.clone()).routes(routes).build();
        let router = build_router(state);

        Ok(Self { router, config, pool })
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "backctl listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Closing database connections...");
        self.pool.close().await;

        Ok(())
    }
}
