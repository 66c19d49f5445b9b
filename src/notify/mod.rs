use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Who an event is addressed to. Mirrors the realtime rooms a subject
/// can join: their own id (as customer, owner or courier) or an order
/// they are tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "id")]
pub enum Audience {
    Customer(Uuid),
    Owner(Uuid),
    Courier(Uuid),
    Order(Uuid),
}

impl Audience {
    pub fn addressed_to(&self, subject: Uuid) -> bool {
        match self {
            Audience::Customer(id) | Audience::Owner(id) | Audience::Courier(id) => *id == subject,
            Audience::Order(_) => false,
        }
    }

    pub fn order_room(&self) -> Option<Uuid> {
        match self {
            Audience::Order(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationEvent {
    pub audience: Audience,
    pub event: &'static str,
    pub payload: Value,
    pub at: DateTime<Utc>,
}

/// Addressed, fire-and-forget event fan-out.
///
/// Callers commit their state mutation first and notify after, so no
/// subscriber ever hears about a state that did not land. A send with no
/// live subscriber is dropped silently; delivery failures never surface
/// to the triggering operation.
#[derive(Clone)]
pub struct NotificationFanout {
    events_tx: broadcast::Sender<NotificationEvent>,
}

impl NotificationFanout {
    pub fn new(buffer: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(buffer);
        Self { events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.events_tx.subscribe()
    }

    pub fn notify(&self, audience: Audience, event: &'static str, payload: Value) {
        let delivered = self.events_tx.send(NotificationEvent {
            audience,
            event,
            payload,
            at: Utc::now(),
        });

        if delivered.is_err() {
            tracing::debug!(event, "no live subscribers, notification dropped");
        }
    }

    pub fn notify_candidates(&self, candidates: &[Uuid], event: &'static str, payload: Value) {
        for courier_id in candidates {
            self.notify(Audience::Courier(*courier_id), event, payload.clone());
        }
    }
}

/// Out-of-band channel carrying delivery OTP codes to the customer.
/// The engine only constructs the code; getting it to the customer is
/// this collaborator's job.
pub trait OtpChannel: Send + Sync {
    fn deliver(&self, email: &str, code: &str);
}

/// Stand-in used when no mail/SMS integration is attached.
pub struct LogOtpChannel;

impl OtpChannel for LogOtpChannel {
    fn deliver(&self, email: &str, code: &str) {
        tracing::info!(to = %email, code, "delivery otp issued");
    }
}
