use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::Role;
use crate::AppState;

/// Re-reads the role from the database so demotions and bans take effect
/// before the token expires.
async fn check_role(state: &AppState, user_id: Uuid, min_role: Role) -> Result<Role, AppError> {
    let row: Option<(String, bool)> =
        sqlx::query_as("SELECT role, is_banned FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&state.db)
            .await?;

    let (role, banned) = row.ok_or_else(|| AppError::Unauthorized("Unknown user".into()))?;
    resolve_role(&role, banned, min_role)
}

/// Current role from the stored row, or why the caller is turned away.
fn resolve_role(stored: &str, banned: bool, min_role: Role) -> Result<Role, AppError> {
    if banned {
        return Err(AppError::Forbidden("Account is banned".into()));
    }

    let actual: Role = stored.parse().unwrap_or(Role::User);
    if actual.level() < min_role.level() {
        return Err(AppError::Forbidden(format!(
            "Requires {} role or higher",
            min_role
        )));
    }
    Ok(actual)
}

async fn require_role(
    state: AppState,
    mut req: Request,
    next: Next,
    min_role: Role,
) -> Result<Response, AppError> {
    let user = req
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".into()))?;

    let role = check_role(&state, user.id, min_role).await?;
    req.extensions_mut().insert(AuthUser { id: user.id, role });

    Ok(next.run(req).await)
}

/// Middleware: any signed-in account that is not banned. Replaces the token's
/// role with the stored one.
pub async fn require_active(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_role(state, req, next, Role::User).await
}

/// Middleware: facility owners and admins.
/// Use via `axum::middleware::from_fn_with_state(state, require_owner)`.
pub async fn require_owner(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_role(state, req, next, Role::FacilityOwner).await
}

pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    require_role(state, req, next, Role::Admin).await
}
