use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::models::*;
use crate::services::admission::BookingRequest;
use crate::AppState;

const LIST_COLUMNS: &str = r#"b.id, b.court_id, b.requester_id, b.start_time, b.end_time, b.status,
    b.total_price, b.payment_method, b.payment_status, b.payment_reference,
    c.name AS court_name, f.name AS facility_name, s.name AS sport_name"#;

pub async fn create_booking(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Json(body): Json<CreateBookingRequest>,
) -> AppResult<(StatusCode, Json<BookingView>)> {
    let view = state
        .engine
        .try_book(BookingRequest {
            court_id: body.court_id,
            range: TimeRange::new(body.start, body.end),
            requester_id: user.id,
            payment_method: body.payment_method,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(view)))
}

#[derive(Debug, Deserialize)]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_my_bookings(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Query(q): Query<BookingListQuery>,
) -> AppResult<Json<Value>> {
    let limit = q.limit.unwrap_or(20).clamp(1, 100);
    let offset = q.offset.unwrap_or(0).max(0);

    let sql = format!(
        r#"SELECT {LIST_COLUMNS}
        FROM bookings b
        JOIN courts c ON c.id = b.court_id
        JOIN facilities f ON f.id = c.facility_id
        JOIN sports s ON s.id = c.sport_id
        WHERE b.requester_id = $1 AND ($2::text IS NULL OR b.status = $2)
        ORDER BY b.start_time DESC LIMIT $3 OFFSET $4"#
    );
    let rows: Vec<BookingListItem> = sqlx::query_as(&sql)
        .bind(user.id)
        .bind(q.status.map(|s| s.as_str()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(json!({ "bookings": rows })))
}

pub async fn get_booking(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let sql = format!(
        r#"SELECT {LIST_COLUMNS}
        FROM bookings b
        JOIN courts c ON c.id = b.court_id
        JOIN facilities f ON f.id = c.facility_id
        JOIN sports s ON s.id = c.sport_id
        WHERE b.id = $1"#
    );
    let booking: BookingListItem = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Booking not found".into()))?;

    let owner_id: Uuid = sqlx::query_scalar(
        "SELECT f.owner_id FROM courts c JOIN facilities f ON f.id = c.facility_id WHERE c.id = $1",
    )
    .bind(booking.court_id)
    .fetch_one(&state.db)
    .await?;

    let visible = booking.requester_id == user.id || owner_id == user.id || user.role == Role::Admin;
    if !visible {
        // do not reveal that the id exists
        return Err(AppError::NotFound("Booking not found".into()));
    }

    Ok(Json(json!({ "booking": booking })))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    user: axum::Extension<AuthUser>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelBookingRequest>>,
) -> AppResult<Json<Value>> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    let booking = state.engine.cancel(id, user.actor(), reason).await?;

    Ok(Json(json!({ "booking": booking })))
}
