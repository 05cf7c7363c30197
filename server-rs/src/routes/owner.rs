use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::models::*;
use crate::routes::catalog::FACILITY_LIST_CACHE_KEY;
use crate::routes::PaginationQuery;
use crate::AppState;

/// Loads a facility the caller may manage. Admins manage every facility;
/// anyone else sees foreign facilities as missing.
async fn owned_facility(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<Facility> {
    let facility: Facility = sqlx::query_as("SELECT * FROM facilities WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Facility not found".into()))?;

    if facility.owner_id != user.id && user.role != Role::Admin {
        return Err(AppError::NotFound("Facility not found".into()));
    }
    Ok(facility)
}

async fn owned_court(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<Court> {
    let owner_id: Option<Uuid> = sqlx::query_scalar(
        "SELECT f.owner_id FROM courts c JOIN facilities f ON f.id = c.facility_id WHERE c.id = $1",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?;

    match owner_id {
        Some(owner_id) if owner_id == user.id || user.role == Role::Admin => {}
        _ => return Err(AppError::NotFound("Court not found".into())),
    }

    let court: Court = sqlx::query_as("SELECT * FROM courts WHERE id = $1")
        .bind(id)
        .fetch_one(&state.db)
        .await?;
    Ok(court)
}

fn require_text(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} required")));
    }
    Ok(())
}

fn validate_rate(rate: Decimal) -> AppResult<Decimal> {
    if rate <= Decimal::ZERO {
        return Err(AppError::BadRequest("Hourly rate must be positive".into()));
    }
    if rate.normalize().scale() > 2 {
        return Err(AppError::BadRequest(
            "Hourly rate has at most two decimal places".into(),
        ));
    }
    Ok(rate)
}

/// A weekly timetable: weekdays 0..=6 (Sunday = 0), each at most once, and
/// every window opening strictly before it closes.
fn validate_hours(hours: &[HoursEntry]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for h in hours {
        if !(0..=6).contains(&h.weekday) {
            return Err(AppError::BadRequest(format!(
                "Weekday {} out of range 0-6",
                h.weekday
            )));
        }
        if h.open >= h.close {
            return Err(AppError::BadRequest(format!(
                "Weekday {}: opening must be before closing",
                h.weekday
            )));
        }
        if !seen.insert(h.weekday) {
            return Err(AppError::BadRequest(format!(
                "Weekday {} listed twice",
                h.weekday
            )));
        }
    }
    Ok(())
}

pub async fn list_my_facilities(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
) -> AppResult<Json<Value>> {
    let rows: Vec<Facility> =
        sqlx::query_as("SELECT * FROM facilities WHERE owner_id = $1 ORDER BY created_at DESC")
            .bind(user.id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(json!({ "facilities": rows })))
}

pub async fn create_facility(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Json(body): Json<CreateFacilityRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    require_text(&body.name, "Name")?;
    require_text(&body.address, "Address")?;
    require_text(&body.city, "City")?;

    let facility: Facility = sqlx::query_as(
        r#"INSERT INTO facilities (id, owner_id, name, description, address, city, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', NOW(), NOW())
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(body.name.trim())
    .bind(&body.description)
    .bind(body.address.trim())
    .bind(body.city.trim())
    .fetch_one(&state.db)
    .await?;

    tracing::info!(facility_id = %facility.id, owner_id = %user.id, "facility submitted for review");

    Ok((StatusCode::CREATED, Json(json!({ "facility": facility }))))
}

pub async fn update_facility(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateFacilityRequest>,
) -> AppResult<Json<Value>> {
    owned_facility(&state, &user, id).await?;
    for (value, field) in [(&body.name, "Name"), (&body.address, "Address"), (&body.city, "City")] {
        if let Some(v) = value {
            require_text(v, field)?;
        }
    }

    // edits go back through review
    let facility: Facility = sqlx::query_as(
        r#"UPDATE facilities SET
            name = COALESCE($1, name),
            description = COALESCE($2, description),
            address = COALESCE($3, address),
            city = COALESCE($4, city),
            status = 'pending',
            moderation_note = NULL,
            updated_at = NOW()
        WHERE id = $5
        RETURNING *"#,
    )
    .bind(body.name.as_deref().map(str::trim))
    .bind(&body.description)
    .bind(body.address.as_deref().map(str::trim))
    .bind(body.city.as_deref().map(str::trim))
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    state.cache.del(FACILITY_LIST_CACHE_KEY).await;

    Ok(Json(json!({ "facility": facility })))
}

pub async fn list_courts(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(facility_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    owned_facility(&state, &user, facility_id).await?;

    let courts: Vec<Court> =
        sqlx::query_as("SELECT * FROM courts WHERE facility_id = $1 ORDER BY name")
            .bind(facility_id)
            .fetch_all(&state.db)
            .await?;

    Ok(Json(json!({ "courts": courts })))
}

pub async fn create_court(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(facility_id): Path<Uuid>,
    Json(body): Json<CreateCourtRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    owned_facility(&state, &user, facility_id).await?;
    require_text(&body.name, "Name")?;
    let rate = validate_rate(body.hourly_rate)?;

    let sport_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sports WHERE id = $1)")
        .bind(body.sport_id)
        .fetch_one(&state.db)
        .await?;
    if !sport_exists {
        return Err(AppError::BadRequest("Unknown sport".into()));
    }

    let court: Court = sqlx::query_as(
        r#"INSERT INTO courts (id, facility_id, sport_id, name, hourly_rate, is_active, created_at)
        VALUES ($1, $2, $3, $4, $5, true, NOW())
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(facility_id)
    .bind(body.sport_id)
    .bind(body.name.trim())
    .bind(rate)
    .fetch_one(&state.db)
    .await?;

    state.cache.del(FACILITY_LIST_CACHE_KEY).await;

    Ok((StatusCode::CREATED, Json(json!({ "court": court }))))
}

pub async fn update_court(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateCourtRequest>,
) -> AppResult<Json<Value>> {
    owned_court(&state, &user, id).await?;
    if let Some(name) = &body.name {
        require_text(name, "Name")?;
    }
    let rate = body.hourly_rate.map(validate_rate).transpose()?;

    // existing bookings keep the price they were admitted at
    let court: Court = sqlx::query_as(
        r#"UPDATE courts SET
            name = COALESCE($1, name),
            hourly_rate = COALESCE($2, hourly_rate),
            is_active = COALESCE($3, is_active)
        WHERE id = $4
        RETURNING *"#,
    )
    .bind(body.name.as_deref().map(str::trim))
    .bind(rate)
    .bind(body.is_active)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    state.cache.del(FACILITY_LIST_CACHE_KEY).await;

    Ok(Json(json!({ "court": court })))
}

/// Replaces the court's whole weekly timetable.
pub async fn set_hours(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(court_id): Path<Uuid>,
    Json(body): Json<SetHoursRequest>,
) -> AppResult<Json<Value>> {
    owned_court(&state, &user, court_id).await?;
    validate_hours(&body.hours)?;

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM operating_hours WHERE court_id = $1")
        .bind(court_id)
        .execute(&mut *tx)
        .await?;
    for h in &body.hours {
        sqlx::query(
            "INSERT INTO operating_hours (court_id, weekday, open_time, close_time) VALUES ($1, $2, $3, $4)",
        )
        .bind(court_id)
        .bind(h.weekday)
        .bind(h.open)
        .bind(h.close)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let hours: Vec<OperatingHours> = sqlx::query_as(
        "SELECT court_id, weekday, open_time, close_time FROM operating_hours WHERE court_id = $1 ORDER BY weekday",
    )
    .bind(court_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({ "operatingHours": hours })))
}

pub async fn list_blocks(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(court_id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    owned_court(&state, &user, court_id).await?;

    let blocks: Vec<BlockedSlot> = sqlx::query_as(
        "SELECT * FROM blocked_slots WHERE court_id = $1 AND end_time > NOW() ORDER BY start_time",
    )
    .bind(court_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(json!({ "blockedSlots": blocks })))
}

/// Blocks never displace confirmed bookings; they only stop new admissions.
pub async fn create_block(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(court_id): Path<Uuid>,
    Json(body): Json<CreateBlockRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    owned_court(&state, &user, court_id).await?;
    if TimeRange::new(body.start, body.end).is_empty() {
        return Err(AppError::BadRequest("Block must start before it ends".into()));
    }

    let block: BlockedSlot = sqlx::query_as(
        r#"INSERT INTO blocked_slots (id, court_id, start_time, end_time, reason, created_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW())
        RETURNING *"#,
    )
    .bind(Uuid::new_v4())
    .bind(court_id)
    .bind(body.start)
    .bind(body.end)
    .bind(&body.reason)
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(court_id = %court_id, block_id = %block.id, "court time blocked");

    Ok((StatusCode::CREATED, Json(json!({ "blockedSlot": block }))))
}

pub async fn delete_block(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path((court_id, block_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    owned_court(&state, &user, court_id).await?;

    let res = sqlx::query("DELETE FROM blocked_slots WHERE id = $1 AND court_id = $2")
        .bind(block_id)
        .bind(court_id)
        .execute(&state.db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("Blocked slot not found".into()));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_owner_bookings(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(facility_id): Path<Uuid>,
    Query(q): Query<PaginationQuery>,
) -> AppResult<Json<Value>> {
    owned_facility(&state, &user, facility_id).await?;
    let (limit, offset) = q.bounds(50, 200);

    let rows: Vec<(Uuid, Uuid, String, String, chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>, String, Decimal, String)> =
        sqlx::query_as(
            r#"SELECT b.id, b.court_id, c.name, u.full_name, b.start_time, b.end_time,
                b.status, b.total_price, b.payment_status
            FROM bookings b
            JOIN courts c ON c.id = b.court_id
            JOIN users u ON u.id = b.requester_id
            WHERE c.facility_id = $1
            ORDER BY b.start_time DESC LIMIT $2 OFFSET $3"#,
        )
        .bind(facility_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await?;

    let bookings: Vec<Value> = rows
        .iter()
        .map(|(id, court_id, court, player, start, end, status, price, payment)| {
            json!({
                "id": id, "courtId": court_id, "courtName": court, "requesterName": player,
                "start": start, "end": end, "status": status,
                "totalPrice": price, "paymentStatus": payment,
            })
        })
        .collect();

    Ok(Json(json!({ "bookings": bookings })))
}
