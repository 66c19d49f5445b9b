use chrono::{Duration, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::status;
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::courier::{CourierSummary, GeoPoint};
use crate::models::order::{DeliveryAddress, OrderLine, ShopOrder, ShopOrderStatus};
use crate::notify::Audience;
use crate::state::AppState;

const BROADCAST_RADIUS_M: f64 = 10_000.0;
const OTP_TTL_MINUTES: i64 = 5;
const DEFAULT_DELIVERY_EARNINGS: i64 = 50;

#[derive(Debug, Serialize)]
pub struct StatusChangeOutcome {
    pub status: ShopOrderStatus,
    pub assignment: Option<Uuid>,
    pub assigned_courier: Option<Uuid>,
    pub candidates: Vec<CourierSummary>,
    pub message: Option<&'static str>,
}

enum DispatchOutcome {
    Broadcasted {
        assignment: Assignment,
        couriers: Vec<CourierSummary>,
    },
    NoCouriers,
}

/// Owner-driven status change, coupled to dispatch: entering
/// out-for-delivery opens a broadcast, stepping away from it recalls an
/// unaccepted one.
pub async fn change_status(
    state: &AppState,
    actor: Uuid,
    order_id: Uuid,
    shop_id: Uuid,
    new_status: ShopOrderStatus,
) -> Result<StatusChangeOutcome, AppError> {
    let (snapshot, customer_id, address) = {
        let order = state
            .orders
            .get(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let shop_order = order
            .shop_order_for_shop(shop_id)
            .ok_or_else(|| AppError::NotFound(format!("no shop order for shop {shop_id}")))?
            .clone();
        (shop_order, order.customer_id, order.delivery_address.clone())
    };

    if snapshot.owner_id != actor {
        return Err(AppError::Forbidden(
            "only the shop owner can change this order's status".to_string(),
        ));
    }

    status::validate_transition(snapshot.status, new_status)?;

    // Step away from the delivery flow: take back an unaccepted
    // broadcast. An accepted job stays with its courier.
    let mut recalled = false;
    if let Some(assignment_id) = snapshot.assignment {
        if new_status != ShopOrderStatus::OutForDelivery {
            match state.assignments.recall(assignment_id).await {
                Ok(()) => {
                    state.metrics.recalls_total.inc();
                    info!(order_id = %order_id, assignment_id = %assignment_id, "broadcast recalled");
                    recalled = true;
                }
                Err(AppError::CannotRecall) => {}
                // dangling link, clear it
                Err(AppError::NotFound(_)) => recalled = true,
                Err(err) => return Err(err),
            }
        }
    }

    let has_live_assignment = snapshot.assignment.is_some() && !recalled;
    let mut created: Option<Assignment> = None;
    let mut candidates = Vec::new();
    let mut message = None;

    if new_status == ShopOrderStatus::OutForDelivery && !has_live_assignment {
        match start_dispatch(state, order_id, &snapshot, &address).await? {
            DispatchOutcome::Broadcasted {
                assignment,
                couriers,
            } => {
                candidates = couriers;
                created = Some(assignment);
            }
            DispatchOutcome::NoCouriers => {
                message = Some("order status updated but no couriers are available right now");
            }
        }
    }

    {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let shop_order = order
            .shop_order_for_shop_mut(shop_id)
            .ok_or_else(|| AppError::NotFound(format!("no shop order for shop {shop_id}")))?;

        shop_order.status = new_status;
        if recalled {
            shop_order.assignment = None;
            shop_order.assigned_courier = None;
        }
        if let Some(assignment) = &created {
            shop_order.assignment = Some(assignment.id);
        }
    }

    let status_payload = json!({
        "orderId": order_id,
        "shopOrderId": snapshot.id,
        "status": new_status,
    });
    state.fanout.notify(
        Audience::Customer(customer_id),
        "order-status-updated",
        status_payload.clone(),
    );
    state
        .fanout
        .notify(Audience::Order(order_id), "order-status-updated", status_payload);

    if let Some(assignment) = &created {
        state.fanout.notify_candidates(
            &assignment.broadcasted_to,
            "new-delivery-assignment",
            json!({
                "assignmentId": assignment.id,
                "orderId": order_id,
                "shopOrderId": snapshot.id,
                "shopId": shop_id,
            }),
        );
    }

    Ok(StatusChangeOutcome {
        status: new_status,
        assignment: created
            .as_ref()
            .map(|assignment| assignment.id)
            .or(if recalled { None } else { snapshot.assignment }),
        assigned_courier: if recalled {
            None
        } else {
            snapshot.assigned_courier
        },
        candidates,
        message,
    })
}

/// Candidate selection and broadcast creation. An empty candidate set is
/// not an error; the shop order stays out-for-delivery without an
/// assignment and dispatch happens on a later status re-issue.
async fn start_dispatch(
    state: &AppState,
    order_id: Uuid,
    shop_order: &ShopOrder,
    address: &DeliveryAddress,
) -> Result<DispatchOutcome, AppError> {
    let dropoff = GeoPoint {
        lat: address.latitude,
        lng: address.longitude,
    };

    let mut nearby: Vec<Uuid> = state
        .geo
        .find_nearby(&dropoff, BROADCAST_RADIUS_M)
        .into_iter()
        .map(|(id, _)| id)
        .collect();

    // An available but distant courier beats no courier.
    if nearby.is_empty() {
        nearby = state.geo.all_tracked();
    }

    let available = state.availability.available_subset(nearby);
    if available.is_empty() {
        warn!(
            order_id = %order_id,
            shop_order_id = %shop_order.id,
            "no couriers available, dispatch deferred"
        );
        return Ok(DispatchOutcome::NoCouriers);
    }

    let assignment = state
        .assignments
        .create(order_id, shop_order.id, shop_order.shop_id, available)
        .await?;

    state.metrics.broadcasts_total.inc();
    state
        .metrics
        .broadcast_candidates
        .observe(assignment.broadcasted_to.len() as f64);

    let couriers = assignment
        .broadcasted_to
        .iter()
        .filter_map(|id| {
            state
                .couriers
                .get(id)
                .map(|entry| CourierSummary::from(entry.value()))
        })
        .collect();

    info!(
        order_id = %order_id,
        assignment_id = %assignment.id,
        candidates = assignment.broadcasted_to.len(),
        "delivery broadcasted"
    );

    Ok(DispatchOutcome::Broadcasted {
        assignment,
        couriers,
    })
}

/// Resolves the acceptance race through the store's atomic claim and
/// links the winner onto the shop order.
pub async fn accept_assignment(
    state: &AppState,
    courier_id: Uuid,
    assignment_id: Uuid,
) -> Result<Assignment, AppError> {
    let assignment = match state.assignments.claim(assignment_id, courier_id).await {
        Ok(assignment) => {
            state
                .metrics
                .claims_total
                .with_label_values(&["won"])
                .inc();
            assignment
        }
        Err(err) => {
            let outcome = match &err {
                AppError::AlreadyClaimed => "already_claimed",
                AppError::CourierBusy => "courier_busy",
                _ => "rejected",
            };
            state
                .metrics
                .claims_total
                .with_label_values(&[outcome])
                .inc();
            return Err(err);
        }
    };

    let customer_id = {
        let mut order = state
            .orders
            .get_mut(&assignment.order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {} not found", assignment.order_id)))?;
        let customer_id = order.customer_id;
        let shop_order = order
            .shop_order_mut(assignment.shop_order_id)
            .ok_or_else(|| {
                AppError::NotFound(format!("shop order {} not found", assignment.shop_order_id))
            })?;
        shop_order.assigned_courier = Some(courier_id);
        customer_id
    };

    info!(
        assignment_id = %assignment.id,
        courier_id = %courier_id,
        "delivery accepted"
    );

    state.fanout.notify(
        Audience::Customer(customer_id),
        "delivery-accepted",
        json!({
            "orderId": assignment.order_id,
            "shopOrderId": assignment.shop_order_id,
            "courierId": courier_id,
        }),
    );

    Ok(assignment)
}

/// Issues a fresh 4-digit code with a 5-minute validity window and hands
/// it to the messaging collaborator.
pub async fn issue_delivery_otp(
    state: &AppState,
    actor: Uuid,
    order_id: Uuid,
    shop_order_id: Uuid,
) -> Result<String, AppError> {
    let code = rand::rng().random_range(1000..10000).to_string();
    let expires = Utc::now() + Duration::minutes(OTP_TTL_MINUTES);

    let customer_email = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let email = order.customer_email.clone();
        let shop_order = order
            .shop_order_mut(shop_order_id)
            .ok_or_else(|| AppError::NotFound(format!("shop order {shop_order_id} not found")))?;

        if shop_order.assigned_courier != Some(actor) {
            return Err(AppError::Forbidden(
                "only the assigned courier can issue the delivery otp".to_string(),
            ));
        }
        if shop_order.status != ShopOrderStatus::OutForDelivery {
            return Err(AppError::Conflict(
                "shop order is not out for delivery".to_string(),
            ));
        }

        shop_order.delivery_otp = Some(code.clone());
        shop_order.otp_expires = Some(expires);
        email
    };

    state.otp_channel.deliver(&customer_email, &code);
    Ok(code)
}

/// OTP-gated delivery confirmation: flips the shop order to delivered,
/// credits the courier and closes the assignment.
///
/// The status check plus the cleared OTP make this exactly-once: a retry
/// with the same (or any) code fails before touching stats, and
/// `complete` is idempotent, so nothing can double-credit the courier.
pub async fn confirm_delivery(
    state: &AppState,
    actor: Uuid,
    order_id: Uuid,
    shop_order_id: Uuid,
    supplied_otp: &str,
) -> Result<(), AppError> {
    let now = Utc::now();

    let (customer_id, assignment_id, earnings) = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let customer_id = order.customer_id;
        let shop_order = order
            .shop_order_mut(shop_order_id)
            .ok_or_else(|| AppError::NotFound(format!("shop order {shop_order_id} not found")))?;

        if shop_order.assigned_courier != Some(actor) {
            return Err(AppError::Forbidden(
                "only the assigned courier can confirm delivery".to_string(),
            ));
        }
        if shop_order.status != ShopOrderStatus::OutForDelivery {
            return Err(AppError::Conflict(
                "shop order is not awaiting delivery confirmation".to_string(),
            ));
        }
        shop_order.otp_valid(supplied_otp, now)?;

        let assignment_id = shop_order.assignment.ok_or_else(|| {
            AppError::Internal("out-for-delivery shop order lost its assignment".to_string())
        })?;
        let earnings = shop_order.earnings.unwrap_or(DEFAULT_DELIVERY_EARNINGS);

        shop_order.status = ShopOrderStatus::Delivered;
        shop_order.delivered_at = Some(now);
        // a code is good for exactly one confirmation
        shop_order.delivery_otp = None;
        shop_order.otp_expires = None;

        (customer_id, assignment_id, earnings)
    };

    if let Some(mut courier) = state.couriers.get_mut(&actor) {
        courier.stats.credit_delivery(earnings, now);
        courier.updated_at = now;
    }

    state.assignments.complete(assignment_id).await?;
    state.metrics.deliveries_total.inc();

    info!(
        order_id = %order_id,
        shop_order_id = %shop_order_id,
        courier_id = %actor,
        earnings,
        "delivery confirmed"
    );

    state.fanout.notify(
        Audience::Customer(customer_id),
        "order-delivered",
        json!({
            "orderId": order_id,
            "shopOrderId": shop_order_id,
        }),
    );
    state.fanout.notify(
        Audience::Courier(actor),
        "delivery-completed",
        json!({
            "orderId": order_id,
            "shopOrderId": shop_order_id,
            "earnings": earnings,
        }),
    );

    Ok(())
}

/// An open broadcast as presented to a candidate courier.
#[derive(Debug, Serialize)]
pub struct OpenAssignment {
    pub assignment_id: Uuid,
    pub order_id: Uuid,
    pub shop_order_id: Uuid,
    pub shop_id: Uuid,
    pub delivery_address: DeliveryAddress,
    pub items: Vec<OrderLine>,
    pub subtotal: i64,
}

pub fn list_open_assignments(state: &AppState, courier_id: Uuid) -> Vec<OpenAssignment> {
    state
        .assignments
        .broadcasted_for(courier_id)
        .into_iter()
        .filter_map(|assignment| {
            let order = state.orders.get(&assignment.order_id)?;
            let shop_order = order.shop_order(assignment.shop_order_id)?;
            Some(OpenAssignment {
                assignment_id: assignment.id,
                order_id: order.id,
                shop_order_id: shop_order.id,
                shop_id: assignment.shop_id,
                delivery_address: order.delivery_address.clone(),
                items: shop_order.items.clone(),
                subtotal: shop_order.subtotal,
            })
        })
        .collect()
}

/// The delivery a courier is currently out on, with both ends'
/// coordinates for live tracking.
#[derive(Debug, Serialize)]
pub struct CurrentDelivery {
    pub order_id: Uuid,
    pub customer_id: Uuid,
    pub shop_order: ShopOrder,
    pub delivery_address: DeliveryAddress,
    pub courier_location: Option<GeoPoint>,
    pub customer_location: GeoPoint,
}

pub fn current_delivery(state: &AppState, courier_id: Uuid) -> Result<CurrentDelivery, AppError> {
    let assignment = state
        .assignments
        .current_for(courier_id)
        .ok_or_else(|| AppError::NotFound("no delivery in progress".to_string()))?;

    let order = state
        .orders
        .get(&assignment.order_id)
        .ok_or_else(|| AppError::NotFound(format!("order {} not found", assignment.order_id)))?;
    let shop_order = order
        .shop_order(assignment.shop_order_id)
        .ok_or_else(|| {
            AppError::NotFound(format!("shop order {} not found", assignment.shop_order_id))
        })?
        .clone();

    Ok(CurrentDelivery {
        order_id: order.id,
        customer_id: order.customer_id,
        delivery_address: order.delivery_address.clone(),
        customer_location: GeoPoint {
            lat: order.delivery_address.latitude,
            lng: order.delivery_address.longitude,
        },
        courier_location: state.geo.position_of(courier_id),
        shop_order,
    })
}
