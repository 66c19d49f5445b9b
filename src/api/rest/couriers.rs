use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::courier::{Courier, DeliveryStats, GeoPoint, RatingAggregate};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", post(register_courier).get(list_couriers))
        .route("/couriers/:id/location", patch(report_location))
}

#[derive(Deserialize)]
pub struct RegisterCourierRequest {
    pub name: String,
    pub mobile: String,
    pub email: String,
    pub location: GeoPoint,
}

#[derive(Deserialize)]
pub struct ReportLocationRequest {
    pub location: GeoPoint,
}

async fn register_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    if payload.mobile.trim().is_empty() {
        return Err(AppError::BadRequest("mobile cannot be empty".to_string()));
    }

    let now = Utc::now();
    let courier = Courier {
        id: Uuid::new_v4(),
        name: payload.name,
        mobile: payload.mobile,
        email: payload.email,
        location: payload.location,
        stats: DeliveryStats::new(now),
        rating: RatingAggregate::default(),
        updated_at: now,
    };

    state.geo.track(courier.id, courier.location);
    state.couriers.insert(courier.id, courier.clone());
    Ok(Json(courier))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<Courier>> {
    let couriers = state
        .couriers
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    Json(couriers)
}

async fn report_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportLocationRequest>,
) -> Result<Json<Courier>, AppError> {
    let mut courier = state
        .couriers
        .get_mut(&id)
        .ok_or_else(|| AppError::NotFound(format!("courier {} not found", id)))?;

    courier.location = payload.location;
    courier.updated_at = Utc::now();
    state.geo.track(id, payload.location);

    Ok(Json(courier.clone()))
}
