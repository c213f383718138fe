use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::json;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes;

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::auth::register,
		routes::auth::login,
		routes::auth::me,
		routes::auth::logout,
		routes::auth::list_accounts,
		routes::projects::list_projects,
		routes::projects::create_project,
		routes::projects::get_project,
		routes::projects::update_project,
		routes::projects::delete_project,
		routes::projects::share_project,
		routes::projects::get_api_key,
		routes::stores::list_stores,
		routes::stores::get_store,
		routes::stores::create_store,
		routes::stores::update_store,
		routes::stores::delete_store,
		routes::stores::get_store_settings,
		routes::stores::update_store_settings,
		routes::categories::list_categories,
		routes::categories::get_category,
		routes::categories::create_category,
		routes::categories::update_category,
		routes::categories::delete_category,
		routes::project_users::list_project_users,
		routes::project_users::get_project_user,
		routes::project_users::create_project_user,
		routes::project_users::update_project_user,
		routes::project_users::delete_project_user,
		routes::api::categories::list_categories,
		routes::api::categories::get_category,
		routes::api::stores::list_stores,
		routes::api::stores::create_store,
		routes::api::stores::get_store,
		routes::api::stores::update_store,
		routes::api::stores::delete_store,
		routes::api::users::list_users,
		routes::api::users::create_user,
		routes::api::users::get_user,
		routes::api::users::update_user,
		routes::api::users::delete_user
	),
	components(
		schemas(
			models::account::Account,
			models::account::AuthResponse,
			models::account::LoginRequest,
			models::account::RegisterRequest,
			models::action::ActionResponse,
			models::project::Project,
			models::project::ProjectWithMembers,
			models::project::ProjectCreateRequest,
			models::project::ProjectUpdateRequest,
			models::project::ShareRequest,
			models::project::ApiKeyResponse,
			models::membership::Membership,
			models::membership::ShareItem,
			models::store::Store,
			models::store::StoreCreateRequest,
			models::store::StoreUpdateRequest,
			models::store::StoreSummary,
			models::store::StoreDetail,
			models::store::StoreSettingsView,
			models::store::StoreSettingsUpdateRequest,
			models::category::Category,
			models::category::CategoryCreateRequest,
			models::category::CategoryUpdateRequest,
			models::category::CategorySummary,
			models::category::ParentCategory,
			models::project_user::ProjectUser,
			models::project_user::ProjectUserSummary,
			models::project_user::ProjectUserCreateRequest,
			models::project_user::ProjectUserUpdateRequest,
			crate::authz::Permission,
			crate::routes::projects::ProjectActionResponse,
			crate::routes::health::HealthResponse
		)
	),
	tags(
		(name = "Auth", description = "Console authentication"),
		(name = "Projects", description = "Project management and sharing"),
		(name = "Stores", description = "Console store management"),
		(name = "Categories", description = "Console category management"),
		(name = "ProjectUsers", description = "Console end-user management"),
		(name = "Public API", description = "Per-project keyed REST surface"),
		(name = "Health", description = "Service health")
	)
)]
pub struct ApiDoc;

/// Generated doc plus the bearer security scheme and a servers entry, so
/// Swagger UI's Authorize dialog and Try-it-out work against the running
/// backend.
pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(&ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	ensure_global_security(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> Router {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc).expect("OpenAPI serialization must succeed"));

	let json_route = {
		let doc_json = Arc::clone(&doc_json);
		get(move || {
			let doc_json = Arc::clone(&doc_json);
			async move { Json((*doc_json).clone()) }
		})
	};

	Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config))
}

fn ensure_security_components(doc: &mut serde_json::Value) {
	let components = doc
		.as_object_mut()
		.expect("OpenAPI document must be an object")
		.entry("components")
		.or_insert_with(|| json!({}));

	if let Some(components) = components.as_object_mut() {
		let schemes = components.entry("securitySchemes").or_insert_with(|| json!({}));
		if let Some(schemes) = schemes.as_object_mut() {
			schemes.insert(
				"bearerAuth".to_string(),
				json!({
					"type": "http",
					"scheme": "bearer",
					"bearerFormat": "JWT"
				}),
			);
		}
	}
}

fn ensure_global_security(doc: &mut serde_json::Value) {
	if doc.get("security").is_none() {
		doc["security"] = json!([{ "bearerAuth": [] }]);
	}
}

fn ensure_servers(doc: &mut serde_json::Value, port: u16) {
	if doc.get("servers").is_none() {
		doc["servers"] = json!([{ "url": format!("http://localhost:{}", port) }]);
	}
}
