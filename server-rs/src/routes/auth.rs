use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{generate_tokens, verify_token, AuthUser};
use crate::models::user::*;
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;
const BCRYPT_COST: u32 = 12;

fn validate_registration(body: &RegisterRequest) -> AppResult<Role> {
    let email = body.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest("A valid email is required".into()));
    }
    if body.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if body.full_name.trim().is_empty() {
        return Err(AppError::BadRequest("Full name required".into()));
    }
    match body.role.unwrap_or(Role::User) {
        Role::Admin => Err(AppError::BadRequest(
            "Admin accounts cannot be self-registered".into(),
        )),
        role => Ok(role),
    }
}

fn token_response(state: &AppState, user: &User) -> AppResult<Value> {
    let (token, refresh_token) = generate_tokens(
        user.id,
        user.role(),
        &state.config.jwt.secret,
        state.config.jwt.access_expiry_secs,
        state.config.jwt.refresh_expiry_secs,
    )?;

    Ok(json!({
        "token": token,
        "refreshToken": refresh_token,
        "user": UserPublic::from(user),
    }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let role = validate_registration(&body)?;
    let email = body.email.trim().to_lowercase();

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&state.db)
        .await?;

    if exists {
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = bcrypt::hash(&body.password, BCRYPT_COST)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let user: User = sqlx::query_as(
        r#"INSERT INTO users (id, email, password_hash, full_name, role, is_banned, created_at)
        VALUES ($1, $2, $3, $4, $5, false, NOW())
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(&password_hash)
    .bind(body.full_name.trim())
    .bind(role.as_str())
    .fetch_one(&state.db)
    .await
    // a concurrent registration can win between the check and the insert
    .map_err(|e| AppError::conflict_on_unique(e, "Email already registered"))?;

    tracing::info!(user_id = %user.id, role = %role, "user registered");

    Ok((StatusCode::CREATED, Json(token_response(&state, &user)?)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<Value>> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(body.email.trim().to_lowercase())
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".into()))?;

    let valid = bcrypt::verify(&body.password, &user.password_hash)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    if !valid {
        return Err(AppError::Unauthorized("Invalid email or password".into()));
    }

    if user.is_banned {
        return Err(AppError::Forbidden("Account is banned".into()));
    }

    sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(&state.db)
        .await?;

    Ok(Json(token_response(&state, &user)?))
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<Value>> {
    let claims = verify_token(&body.refresh_token, &state.config.jwt.secret)?;
    if claims.token_type != "refresh" {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid token".into()))?;

    // role may have changed since the token was issued
    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unknown user".into()))?;

    if user.is_banned {
        return Err(AppError::Forbidden("Account is banned".into()));
    }

    Ok(Json(token_response(&state, &user)?))
}

pub async fn me(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Json(json!({ "user": UserPublic::from(&user) })))
}
