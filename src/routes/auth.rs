use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::Identity;
use crate::errors::{AppError, AppResult};
use crate::events::log_activity;
use crate::extract::ValidatedJson;
use crate::models::account::{Account, AuthResponse, DbAccount, LoginRequest, RegisterRequest};
use crate::utils::{hash_password, utc_now, verify_password};

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    message: String,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account registered", body = AuthResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    ensure_email_available(&state.pool, &payload.email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();
    let account_id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO accounts (id, name, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(account_id)
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind("USER")
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let db_account = fetch_account_by_id(&state.pool, account_id).await?;
    let account: Account = db_account.try_into()?;
    let token = state.jwt.encode(account.id)?;

    log_activity(&state.event_bus, "registered", Some(account.id), &account);

    Ok((StatusCode::CREATED, Json(AuthResponse { token, account })))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let db_account = sqlx::query_as::<_, DbAccount>(
        "SELECT id, name, email, password_hash, role, created_at, updated_at FROM accounts WHERE email = ?",
    )
    .bind(&payload.email)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let password_ok = verify_password(&payload.password, &db_account.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(db_account.id)?;
    let account: Account = db_account.try_into()?;

    Ok(Json(AuthResponse { token, account }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current account", body = Account))
)]
pub async fn me(State(state): State<AppState>, identity: Identity) -> AppResult<Json<Account>> {
    let db_account = fetch_account_by_id(&state.pool, identity.id).await?;
    let account: Account = db_account.try_into()?;
    Ok(Json(account))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    responses((status = 200, description = "Logout acknowledged"))
)]
pub async fn logout(_identity: Identity) -> AppResult<Json<MessageResponse>> {
    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// Console account listing, used by the share dialog to pick grantees.
#[utoipa::path(
    get,
    path = "/users",
    tag = "Auth",
    responses((status = 200, description = "List console accounts", body = [Account]))
)]
pub async fn list_accounts(State(state): State<AppState>, _identity: Identity) -> AppResult<Json<Vec<Account>>> {
    let accounts = sqlx::query_as::<_, DbAccount>(
        "SELECT id, name, email, password_hash, role, created_at, updated_at FROM accounts ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    let accounts: Vec<Account> = accounts
        .into_iter()
        .map(Account::try_from)
        .collect::<Result<_, _>>()?;

    Ok(Json(accounts))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM accounts WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

async fn fetch_account_by_id(pool: &SqlitePool, account_id: Uuid) -> AppResult<DbAccount> {
    sqlx::query_as::<_, DbAccount>(
        "SELECT id, name, email, password_hash, role, created_at, updated_at FROM accounts WHERE id = ?",
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("account not found"))
}
