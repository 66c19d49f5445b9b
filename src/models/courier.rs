use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Cumulative and per-day delivery counters. The "today" pair resets
/// lazily on the first credit of a new calendar day.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub total_deliveries: u32,
    pub total_earnings: i64,
    pub today_deliveries: u32,
    pub today_earnings: i64,
    pub last_reset_date: DateTime<Utc>,
}

impl DeliveryStats {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            total_deliveries: 0,
            total_earnings: 0,
            today_deliveries: 0,
            today_earnings: 0,
            last_reset_date: now,
        }
    }

    pub fn credit_delivery(&mut self, earnings: i64, now: DateTime<Utc>) {
        if now.date_naive() != self.last_reset_date.date_naive() {
            self.today_deliveries = 0;
            self.today_earnings = 0;
            self.last_reset_date = now;
        }

        self.total_deliveries += 1;
        self.total_earnings += earnings;
        self.today_deliveries += 1;
        self.today_earnings += earnings;
    }
}

/// Running `{average, count}` pair, updated incrementally so the rated
/// entity never needs a full rescan of its ratings.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RatingAggregate {
    pub average: f64,
    pub count: u32,
}

impl RatingAggregate {
    pub fn add(&mut self, value: f64) {
        let total = self.average * self.count as f64 + value;
        self.count += 1;
        self.average = total / self.count as f64;
    }

    /// Re-rates a previously counted value; the count stays unchanged.
    pub fn replace(&mut self, old_value: f64, new_value: f64) {
        if self.count == 0 {
            return;
        }
        let total = self.average * self.count as f64 - old_value + new_value;
        self.average = total / self.count as f64;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Courier {
    pub id: Uuid,
    pub name: String,
    pub mobile: String,
    pub email: String,
    pub location: GeoPoint,
    pub stats: DeliveryStats,
    pub rating: RatingAggregate,
    pub updated_at: DateTime<Utc>,
}

/// Compact shape broadcast to owners alongside a new assignment.
#[derive(Debug, Clone, Serialize)]
pub struct CourierSummary {
    pub id: Uuid,
    pub name: String,
    pub mobile: String,
}

impl From<&Courier> for CourierSummary {
    fn from(courier: &Courier) -> Self {
        Self {
            id: courier.id,
            name: courier.name.clone(),
            mobile: courier.mobile.clone(),
        }
    }
}
