use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::models::*;
use crate::routes::catalog::FACILITY_LIST_CACHE_KEY;
use crate::routes::PaginationQuery;
use crate::AppState;

#[derive(Deserialize)]
pub struct AdminQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<FacilityStatus>,
    pub search: Option<String>,
}

impl AdminQuery {
    fn bounds(&self) -> (i64, i64) {
        let limit = self.limit.unwrap_or(50).clamp(1, 100);
        (limit, self.page.unwrap_or(0).max(0) * limit)
    }
}

/// Appends to `moderation_log` on the caller's transaction so the entry
/// commits together with the change it describes.
async fn log_action(
    conn: &mut PgConnection,
    admin_id: Uuid,
    action: &str,
    target_type: &str,
    target_id: Uuid,
    note: Option<&str>,
) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO moderation_log (admin_id, action, target_type, target_id, note, created_at) VALUES ($1, $2, $3, $4, $5, NOW())",
    )
    .bind(admin_id)
    .bind(action)
    .bind(target_type)
    .bind(target_id)
    .bind(note)
    .execute(conn)
    .await?;

    tracing::info!(admin_id = %admin_id, action, target_type, target_id = %target_id, "moderation action");
    Ok(())
}

pub async fn stats(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let users: i64 = sqlx::query_scalar("SELECT COUNT(*)::bigint FROM users").fetch_one(&state.db).await?;
    let owners: i64 = sqlx::query_scalar("SELECT COUNT(*)::bigint FROM users WHERE role = 'facility_owner'").fetch_one(&state.db).await?;
    let by_status: Vec<(String, i64)> = sqlx::query_as("SELECT status, COUNT(*)::bigint FROM facilities GROUP BY status").fetch_all(&state.db).await?;
    let bookings: i64 = sqlx::query_scalar("SELECT COUNT(*)::bigint FROM bookings WHERE status = 'confirmed'").fetch_one(&state.db).await?;
    let revenue: rust_decimal::Decimal = sqlx::query_scalar("SELECT COALESCE(SUM(total_price), 0) FROM bookings WHERE status = 'confirmed'").fetch_one(&state.db).await?;

    let facilities: serde_json::Map<String, Value> = by_status
        .into_iter()
        .map(|(status, count)| (status, json!(count)))
        .collect();

    Ok(Json(json!({
        "users": users, "facilityOwners": owners, "facilities": facilities,
        "confirmedBookings": bookings, "confirmedRevenue": revenue,
        "currency": state.config.catalog.currency,
    })))
}

pub async fn list_facilities(
    State(state): State<AppState>,
    Query(q): Query<AdminQuery>,
) -> AppResult<Json<Value>> {
    let (limit, offset) = q.bounds();
    let status = q.status.unwrap_or(FacilityStatus::Pending);

    let rows: Vec<Facility> = sqlx::query_as(
        "SELECT * FROM facilities WHERE status = $1 ORDER BY created_at ASC LIMIT $2 OFFSET $3",
    )
    .bind(status.as_str())
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({ "facilities": rows })))
}

fn moderation_action(status: FacilityStatus) -> &'static str {
    match status {
        FacilityStatus::Approved => "approve_facility",
        FacilityStatus::Rejected => "reject_facility",
        FacilityStatus::Pending => "reopen_facility",
    }
}

async fn moderate_facility(
    state: &AppState,
    admin_id: Uuid,
    facility_id: Uuid,
    status: FacilityStatus,
    note: Option<String>,
) -> AppResult<Facility> {
    let mut tx = state.db.begin().await?;
    let facility: Facility = sqlx::query_as(
        "UPDATE facilities SET status = $1, moderation_note = $2, updated_at = NOW() WHERE id = $3 RETURNING *",
    )
    .bind(status.as_str())
    .bind(&note)
    .bind(facility_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::NotFound("Facility not found".into()))?;

    log_action(
        &mut tx,
        admin_id,
        moderation_action(status),
        "facility",
        facility_id,
        note.as_deref(),
    )
    .await?;
    tx.commit().await?;
    state.cache.del(FACILITY_LIST_CACHE_KEY).await;

    Ok(facility)
}

pub async fn approve_facility(
    State(state): State<AppState>,
    admin: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
    body: Option<Json<ModerationRequest>>,
) -> AppResult<Json<Value>> {
    let note = body.and_then(|Json(b)| b.note);
    let facility = moderate_facility(&state, admin.id, id, FacilityStatus::Approved, note).await?;
    Ok(Json(json!({ "facility": facility })))
}

pub async fn reject_facility(
    State(state): State<AppState>,
    admin: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<ModerationRequest>,
) -> AppResult<Json<Value>> {
    let note = body
        .note
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("A rejection note is required".into()))?;
    let facility =
        moderate_facility(&state, admin.id, id, FacilityStatus::Rejected, Some(note)).await?;
    Ok(Json(json!({ "facility": facility })))
}

pub async fn search_users(
    State(state): State<AppState>,
    Query(q): Query<AdminQuery>,
) -> AppResult<Json<Value>> {
    let (limit, offset) = q.bounds();
    let search = format!("%{}%", q.search.as_deref().unwrap_or(""));

    let rows: Vec<User> = sqlx::query_as(
        r#"SELECT * FROM users WHERE full_name ILIKE $1 OR email ILIKE $1
        ORDER BY created_at DESC LIMIT $2 OFFSET $3"#,
    )
    .bind(&search)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let users: Vec<Value> = rows
        .iter()
        .map(|u| json!({"user": UserPublic::from(u), "isBanned": u.is_banned, "lastLoginAt": u.last_login_at}))
        .collect();

    Ok(Json(json!({ "users": users })))
}

async fn set_banned(state: &AppState, admin: &AuthUser, user_id: Uuid, banned: bool) -> AppResult<()> {
    if admin.id == user_id {
        return Err(AppError::BadRequest("Cannot change your own ban status".into()));
    }

    let mut tx = state.db.begin().await?;
    let res = sqlx::query("UPDATE users SET is_banned = $1 WHERE id = $2")
        .bind(banned)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }

    let action = if banned { "ban_user" } else { "unban_user" };
    log_action(&mut tx, admin.id, action, "user", user_id, None).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn ban_user(
    State(state): State<AppState>,
    admin: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    set_banned(&state, &admin, id, true).await?;
    Ok(Json(json!({"success": true})))
}

pub async fn unban_user(
    State(state): State<AppState>,
    admin: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    set_banned(&state, &admin, id, false).await?;
    Ok(Json(json!({"success": true})))
}

pub async fn set_role(
    State(state): State<AppState>,
    admin: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetRoleRequest>,
) -> AppResult<Json<Value>> {
    if admin.id == id {
        return Err(AppError::BadRequest("Cannot change your own role".into()));
    }

    let mut tx = state.db.begin().await?;
    let res = sqlx::query("UPDATE users SET role = $1 WHERE id = $2")
        .bind(body.role.as_str())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }

    log_action(&mut tx, admin.id, "set_role", "user", id, Some(body.role.as_str())).await?;
    tx.commit().await?;
    Ok(Json(json!({"success": true, "role": body.role})))
}

pub async fn moderation_log(
    State(state): State<AppState>,
    Query(q): Query<PaginationQuery>,
) -> AppResult<Json<Value>> {
    let (limit, offset) = q.bounds(50, 100);

    let rows: Vec<(i64, Uuid, String, String, String, Uuid, Option<String>, chrono::DateTime<chrono::Utc>)> = sqlx::query_as(
        r#"SELECT ml.id, ml.admin_id, u.full_name, ml.action, ml.target_type, ml.target_id, ml.note, ml.created_at
        FROM moderation_log ml JOIN users u ON u.id = ml.admin_id
        ORDER BY ml.created_at DESC LIMIT $1 OFFSET $2"#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db)
    .await?;

    let entries: Vec<Value> = rows.iter().map(|(id, aid, name, action, tt, tid, note, created)| {
        json!({"id": id, "adminId": aid, "adminName": name, "action": action, "targetType": tt, "targetId": tid, "note": note, "createdAt": created})
    }).collect();

    Ok(Json(json!({ "log": entries })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_facility_status_logs_its_own_action() {
        let actions: Vec<_> = [
            FacilityStatus::Approved,
            FacilityStatus::Rejected,
            FacilityStatus::Pending,
        ]
        .into_iter()
        .map(moderation_action)
        .collect();
        assert_eq!(actions, ["approve_facility", "reject_facility", "reopen_facility"]);
    }

    #[test]
    fn queue_defaults_to_first_page_of_fifty() {
        let q = AdminQuery {
            page: None,
            limit: None,
            status: None,
            search: None,
        };
        assert_eq!(q.bounds(), (50, 0));

        let q = AdminQuery {
            page: Some(2),
            limit: Some(500),
            status: Some(FacilityStatus::Pending),
            search: None,
        };
        assert_eq!(q.bounds(), (100, 200));
    }
}
