use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::dispatch;
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assignments", get(list_assignments))
        .route("/assignments/:id/accept", post(accept_assignment))
        .route("/deliveries/current", get(current_delivery))
}

async fn list_assignments(
    State(state): State<Arc<AppState>>,
    Actor(courier_id): Actor,
) -> Json<Vec<dispatch::OpenAssignment>> {
    Json(dispatch::list_open_assignments(&state, courier_id))
}

async fn accept_assignment(
    State(state): State<Arc<AppState>>,
    Actor(courier_id): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let assignment = dispatch::accept_assignment(&state, courier_id, id).await?;
    Ok(Json(json!({
        "message": "order accepted",
        "assignmentId": assignment.id,
        "orderId": assignment.order_id,
        "shopOrderId": assignment.shop_order_id,
    })))
}

async fn current_delivery(
    State(state): State<Arc<AppState>>,
    Actor(courier_id): Actor,
) -> Result<Json<dispatch::CurrentDelivery>, AppError> {
    let current = dispatch::current_delivery(&state, courier_id)?;
    Ok(Json(current))
}
