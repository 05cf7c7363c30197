use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::services::availability::AvailabilityResponse;
use crate::AppState;

pub const FACILITY_LIST_CACHE_KEY: &str = "facilities:approved";

pub async fn list_sports(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let sports: Vec<Sport> = sqlx::query_as("SELECT id, name FROM sports ORDER BY name")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(json!({ "sports": sports })))
}

#[derive(Debug, Deserialize)]
pub struct FacilityQuery {
    pub city: Option<String>,
    pub sport: Option<String>,
}

pub async fn list_facilities(
    State(state): State<AppState>,
    Query(q): Query<FacilityQuery>,
) -> AppResult<Json<Value>> {
    let unfiltered = q.city.is_none() && q.sport.is_none();
    if unfiltered {
        if let Some(cached) = state
            .cache
            .get_json::<Vec<FacilitySummary>>(FACILITY_LIST_CACHE_KEY)
            .await
        {
            return Ok(Json(json!({ "facilities": cached })));
        }
    }

    let rows: Vec<FacilitySummary> = sqlx::query_as(
        r#"SELECT f.id, f.name, f.description, f.address, f.city,
            COALESCE(array_agg(DISTINCT s.name) FILTER (WHERE s.name IS NOT NULL), '{}') AS sports,
            MIN(c.hourly_rate) AS min_rate,
            COUNT(DISTINCT c.id)::bigint AS court_count
        FROM facilities f
        LEFT JOIN courts c ON c.facility_id = f.id AND c.is_active = true
        LEFT JOIN sports s ON s.id = c.sport_id
        WHERE f.status = 'approved'
          AND ($1::text IS NULL OR f.city ILIKE $1)
          AND ($2::text IS NULL OR EXISTS (
              SELECT 1 FROM courts c2 JOIN sports s2 ON s2.id = c2.sport_id
              WHERE c2.facility_id = f.id AND c2.is_active = true AND s2.name ILIKE $2))
        GROUP BY f.id
        ORDER BY f.name"#,
    )
    .bind(&q.city)
    .bind(&q.sport)
    .fetch_all(&state.db)
    .await?;

    if unfiltered {
        state
            .cache
            .set_json(FACILITY_LIST_CACHE_KEY, &rows, state.config.catalog.cache_seconds)
            .await;
    }

    Ok(Json(json!({ "facilities": rows })))
}

pub async fn get_facility(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Value>> {
    let facility: Facility =
        sqlx::query_as("SELECT * FROM facilities WHERE id = $1 AND status = 'approved'")
            .bind(id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Facility not found".into()))?;

    let courts: Vec<(Uuid, String, rust_decimal::Decimal, String)> = sqlx::query_as(
        r#"SELECT c.id, c.name, c.hourly_rate, s.name
        FROM courts c JOIN sports s ON s.id = c.sport_id
        WHERE c.facility_id = $1 AND c.is_active = true
        ORDER BY c.name"#,
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    let court_ids: Vec<Uuid> = courts.iter().map(|c| c.0).collect();
    let hours: Vec<OperatingHours> = sqlx::query_as(
        "SELECT court_id, weekday, open_time, close_time FROM operating_hours WHERE court_id = ANY($1) ORDER BY weekday",
    )
    .bind(&court_ids)
    .fetch_all(&state.db)
    .await?;

    let mut hours_by_court: HashMap<Uuid, Vec<Value>> = HashMap::new();
    for h in hours {
        hours_by_court.entry(h.court_id).or_default().push(json!({
            "weekday": h.weekday, "open": h.open_time, "close": h.close_time,
        }));
    }

    let courts: Vec<Value> = courts
        .iter()
        .map(|(cid, name, rate, sport)| {
            json!({
                "id": cid, "name": name, "hourlyRate": rate, "sportName": sport,
                "operatingHours": hours_by_court.remove(cid).unwrap_or_default(),
            })
        })
        .collect();

    Ok(Json(json!({
        "facility": facility,
        "courts": courts,
        "currency": state.config.catalog.currency,
    })))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

pub async fn court_availability(
    State(state): State<AppState>,
    Path(court_id): Path<Uuid>,
    Query(q): Query<AvailabilityQuery>,
) -> AppResult<Json<AvailabilityResponse>> {
    let availability = state.engine.list_available_slots(court_id, q.date).await?;
    Ok(Json(AvailabilityResponse::from(&availability)))
}
