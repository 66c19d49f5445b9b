use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use crate::models::assignment::AssignmentState;

use super::AssignmentStore;

/// Read model over the assignment store: who is mid-delivery right now.
///
/// Busyness is derived from live assignments rather than denormalized
/// onto the courier record, so it cannot drift. A broadcasted-but-
/// unaccepted offer does not count; the same courier may sit in several
/// concurrent broadcasts.
#[derive(Clone)]
pub struct AvailabilityTracker {
    store: Arc<AssignmentStore>,
}

impl AvailabilityTracker {
    pub fn new(store: Arc<AssignmentStore>) -> Self {
        Self { store }
    }

    /// Subset of `candidates` currently holding an assignment in
    /// assigned state.
    pub fn busy_set(&self, candidates: &[Uuid]) -> HashSet<Uuid> {
        self.store
            .assignments
            .iter()
            .filter(|entry| entry.state == AssignmentState::Assigned)
            .filter_map(|entry| entry.assigned_to)
            .filter(|id| candidates.contains(id))
            .collect()
    }

    /// Candidates minus busy couriers, preserving the incoming order.
    pub fn available_subset(&self, candidates: Vec<Uuid>) -> Vec<Uuid> {
        let busy = self.busy_set(&candidates);
        candidates
            .into_iter()
            .filter(|id| !busy.contains(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::super::AssignmentStore;
    use super::AvailabilityTracker;

    #[tokio::test]
    async fn assigned_courier_is_busy_broadcasted_is_not() {
        let store = Arc::new(AssignmentStore::new());
        let tracker = AvailabilityTracker::new(store.clone());

        let assigned = Uuid::new_v4();
        let offered = Uuid::new_v4();
        let idle = Uuid::new_v4();

        let claimed = store
            .create(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                vec![assigned],
            )
            .await
            .unwrap();
        store.claim(claimed.id, assigned).await.unwrap();

        // open offer only, never claimed
        store
            .create(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                vec![offered],
            )
            .await
            .unwrap();

        let candidates = vec![assigned, offered, idle];
        let busy = tracker.busy_set(&candidates);
        assert!(busy.contains(&assigned));
        assert!(!busy.contains(&offered));
        assert!(!busy.contains(&idle));

        assert_eq!(tracker.available_subset(candidates), vec![offered, idle]);
    }

    #[tokio::test]
    async fn completed_assignment_frees_the_courier() {
        let store = Arc::new(AssignmentStore::new());
        let tracker = AvailabilityTracker::new(store.clone());
        let courier = Uuid::new_v4();

        let assignment = store
            .create(
                Uuid::new_v4(),
                Uuid::new_v4(),
                Uuid::new_v4(),
                vec![courier],
            )
            .await
            .unwrap();
        store.claim(assignment.id, courier).await.unwrap();
        store.complete(assignment.id).await.unwrap();

        assert!(tracker.busy_set(&[courier]).is_empty());
    }
}
