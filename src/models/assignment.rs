use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentState {
    Broadcasted,
    Assigned,
    Completed,
}

/// Record of offering one shop order's delivery to a set of candidate
/// couriers and tracking which one claimed it. Deleted only while still
/// broadcasted; once claimed it survives until completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub shop_order_id: Uuid,
    pub shop_id: Uuid,
    pub broadcasted_to: Vec<Uuid>,
    pub assigned_to: Option<Uuid>,
    pub state: AssignmentState,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}
