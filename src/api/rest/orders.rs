use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::auth::Actor;
use crate::engine::dispatch;
use crate::error::AppError;
use crate::models::order::{CartLine, DeliveryAddress, Order, ShopOrderStatus};
use crate::notify::Audience;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(place_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:order_id/shops/:shop_id/status", post(change_status))
        .route(
            "/orders/:order_id/shop-orders/:shop_order_id/otp",
            post(issue_otp),
        )
        .route(
            "/orders/:order_id/shop-orders/:shop_order_id/verify-otp",
            post(verify_otp),
        )
}

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub customer_email: String,
    pub delivery_address: DeliveryAddress,
    pub items: Vec<CartLine>,
}

#[derive(Deserialize)]
pub struct ChangeStatusRequest {
    pub status: ShopOrderStatus,
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    pub otp: String,
}

async fn place_order(
    State(state): State<Arc<AppState>>,
    Actor(customer_id): Actor,
    Json(payload): Json<PlaceOrderRequest>,
) -> Result<Json<Order>, AppError> {
    if payload.items.is_empty() {
        return Err(AppError::BadRequest("cart is empty".to_string()));
    }

    let address = &payload.delivery_address;
    if address.text.trim().is_empty()
        || !address.latitude.is_finite()
        || !address.longitude.is_finite()
    {
        return Err(AppError::BadRequest(
            "send a complete delivery address".to_string(),
        ));
    }

    if payload.items.iter().any(|line| line.quantity == 0) {
        return Err(AppError::BadRequest(
            "item quantity must be at least 1".to_string(),
        ));
    }

    let order = Order::from_cart(
        customer_id,
        payload.customer_email,
        payload.delivery_address,
        payload.items,
    );
    state.orders.insert(order.id, order.clone());

    for shop_order in &order.shop_orders {
        state.fanout.notify(
            Audience::Owner(shop_order.owner_id),
            "new-order",
            json!({
                "orderId": order.id,
                "shopId": shop_order.shop_id,
                "subtotal": shop_order.subtotal,
                "itemCount": shop_order.items.len(),
                "deliveryAddress": order.delivery_address.text,
            }),
        );
    }

    Ok(Json(order))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", id)))?;

    Ok(Json(order.value().clone()))
}

async fn change_status(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path((order_id, shop_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<ChangeStatusRequest>,
) -> Result<Json<dispatch::StatusChangeOutcome>, AppError> {
    let outcome = dispatch::change_status(&state, actor, order_id, shop_id, payload.status).await?;
    Ok(Json(outcome))
}

async fn issue_otp(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path((order_id, shop_order_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, AppError> {
    let otp = dispatch::issue_delivery_otp(&state, actor, order_id, shop_order_id).await?;
    Ok(Json(json!({
        "message": "delivery otp sent",
        "otp": otp,
    })))
}

async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path((order_id, shop_order_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Result<Json<Value>, AppError> {
    dispatch::confirm_delivery(&state, actor, order_id, shop_order_id, &payload.otp).await?;
    Ok(Json(json!({
        "message": "order delivered",
    })))
}
