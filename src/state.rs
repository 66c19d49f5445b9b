use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use crate::geo::GeoIndex;
use crate::models::courier::Courier;
use crate::models::order::Order;
use crate::notify::{LogOtpChannel, NotificationFanout, OtpChannel};
use crate::observability::metrics::Metrics;
use crate::store::availability::AvailabilityTracker;
use crate::store::AssignmentStore;

pub struct AppState {
    pub couriers: DashMap<Uuid, Courier>,
    pub orders: DashMap<Uuid, Order>,
    pub assignments: Arc<AssignmentStore>,
    pub availability: AvailabilityTracker,
    pub geo: GeoIndex,
    pub fanout: NotificationFanout,
    pub otp_channel: Box<dyn OtpChannel>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize) -> Self {
        let assignments = Arc::new(AssignmentStore::new());

        Self {
            couriers: DashMap::new(),
            orders: DashMap::new(),
            availability: AvailabilityTracker::new(assignments.clone()),
            assignments,
            geo: GeoIndex::new(),
            fanout: NotificationFanout::new(event_buffer_size),
            otp_channel: Box::new(LogOtpChannel),
            metrics: Metrics::new(),
        }
    }

    pub fn with_otp_channel(mut self, channel: Box<dyn OtpChannel>) -> Self {
        self.otp_channel = channel;
        self
    }
}
