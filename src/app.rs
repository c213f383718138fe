use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{api, auth, categories, health, project_users, projects, stores};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, event_bus: EventBus) -> Self {
        Self {
            pool,
            jwt: Arc::new(jwt),
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let (event_bus, event_rx) = init_event_bus();
    tokio::spawn(start_activity_listener(event_rx, pool.clone()));

    let state = AppState::new(pool, jwt_config, event_bus);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout));

    let project_routes = Router::new()
        .route("/", get(projects::list_projects))
        .route("/", post(projects::create_project))
        .route("/:project_id", get(projects::get_project))
        .route("/:project_id", put(projects::update_project))
        .route("/:project_id", delete(projects::delete_project))
        .route("/:project_id/share", post(projects::share_project))
        .route("/:project_id/api-key", get(projects::get_api_key));

    // Console resources are scoped to a project: /projects/:project_id/...
    let store_routes = Router::new()
        .route("/", get(stores::list_stores))
        .route("/", post(stores::create_store))
        .route("/:store_id", get(stores::get_store))
        .route("/:store_id", put(stores::update_store))
        .route("/:store_id", delete(stores::delete_store))
        .route("/:store_id/settings", get(stores::get_store_settings))
        .route("/:store_id/settings", put(stores::update_store_settings));

    let category_routes = Router::new()
        .route("/", get(categories::list_categories))
        .route("/", post(categories::create_category))
        .route("/:category_id", get(categories::get_category))
        .route("/:category_id", put(categories::update_category))
        .route("/:category_id", delete(categories::delete_category));

    let project_user_routes = Router::new()
        .route("/", get(project_users::list_project_users))
        .route("/", post(project_users::create_project_user))
        .route("/:user_id", get(project_users::get_project_user))
        .route("/:user_id", put(project_users::update_project_user))
        .route("/:user_id", delete(project_users::delete_project_user));

    // Keyed REST surface per project; category GETs are public.
    let public_api_routes = Router::new()
        .route("/:project_id/categories", get(api::categories::list_categories))
        .route("/:project_id/categories/:category_id", get(api::categories::get_category))
        .route("/:project_id/stores", get(api::stores::list_stores))
        .route("/:project_id/stores", post(api::stores::create_store))
        .route("/:project_id/stores/:store_id", get(api::stores::get_store))
        .route("/:project_id/stores/:store_id", put(api::stores::update_store))
        .route("/:project_id/stores/:store_id", delete(api::stores::delete_store))
        .route("/:project_id/users", get(api::users::list_users))
        .route("/:project_id/users", post(api::users::create_user))
        .route("/:project_id/users/:user_id", get(api::users::get_user))
        .route("/:project_id/users/:user_id", put(api::users::update_user))
        .route("/:project_id/users/:user_id", delete(api::users::delete_user));

    let router = Router::new()
        .route("/api/health", get(health::health))
        .route("/users", get(auth::list_accounts))
        .nest("/auth", auth_routes)
        .nest("/projects", project_routes)
        .nest("/projects/:project_id/stores", store_routes)
        .nest("/projects/:project_id/categories", category_routes)
        .nest("/projects/:project_id/users", project_user_routes)
        .nest("/api", public_api_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(router)
}
