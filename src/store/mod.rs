pub mod availability;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::assignment::{Assignment, AssignmentState};

/// Durable record of delivery assignments and the mutual-exclusion
/// guarantee of the whole dispatch flow.
///
/// Every state transition (and the duplicate-broadcast guard in `create`)
/// runs under `transitions`, so a claim observes the broadcast state and
/// the claiming courier's busyness in one critical section. Whichever of
/// two racing calls takes the lock first decides the outcome for the
/// other.
pub struct AssignmentStore {
    assignments: DashMap<Uuid, Assignment>,
    transitions: Mutex<()>,
}

impl Default for AssignmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self {
            assignments: DashMap::new(),
            transitions: Mutex::new(()),
        }
    }

    /// Opens a broadcast for one shop order. At most one non-completed
    /// assignment may exist per shop order at a time.
    pub async fn create(
        &self,
        order_id: Uuid,
        shop_order_id: Uuid,
        shop_id: Uuid,
        candidates: Vec<Uuid>,
    ) -> Result<Assignment, AppError> {
        if candidates.is_empty() {
            return Err(AppError::BadRequest(
                "broadcast needs at least one candidate courier".to_string(),
            ));
        }

        let _guard = self.transitions.lock().await;

        let duplicate = self
            .assignments
            .iter()
            .any(|entry| {
                entry.shop_order_id == shop_order_id && entry.state != AssignmentState::Completed
            });
        if duplicate {
            return Err(AppError::Conflict(
                "shop order already has a live assignment".to_string(),
            ));
        }

        let assignment = Assignment {
            id: Uuid::new_v4(),
            order_id,
            shop_order_id,
            shop_id,
            broadcasted_to: candidates,
            assigned_to: None,
            state: AssignmentState::Broadcasted,
            created_at: Utc::now(),
            accepted_at: None,
        };

        self.assignments.insert(assignment.id, assignment.clone());
        Ok(assignment)
    }

    pub fn get(&self, assignment_id: Uuid) -> Option<Assignment> {
        self.assignments
            .get(&assignment_id)
            .map(|entry| entry.value().clone())
    }

    /// Atomically moves broadcasted -> assigned for `courier_id`. The
    /// first caller to take the transition lock wins; everyone else
    /// observes the post-transition state and fails.
    pub async fn claim(
        &self,
        assignment_id: Uuid,
        courier_id: Uuid,
    ) -> Result<Assignment, AppError> {
        let _guard = self.transitions.lock().await;

        let state = self
            .assignments
            .get(&assignment_id)
            .map(|entry| entry.state)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;

        match state {
            AssignmentState::Broadcasted => {}
            AssignmentState::Assigned => return Err(AppError::AlreadyClaimed),
            AssignmentState::Completed => return Err(AppError::NotEligible),
        }

        // Busyness must be decided under the same lock as the transition,
        // or two claims on different broadcasts could both book this
        // courier.
        if self.holds_assigned(courier_id) {
            return Err(AppError::CourierBusy);
        }

        let mut entry = self
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;

        entry.state = AssignmentState::Assigned;
        entry.assigned_to = Some(courier_id);
        entry.accepted_at = Some(Utc::now());

        Ok(entry.clone())
    }

    /// Deletes an unaccepted broadcast. An accepted assignment is never
    /// recalled.
    pub async fn recall(&self, assignment_id: Uuid) -> Result<(), AppError> {
        let _guard = self.transitions.lock().await;

        let state = self
            .assignments
            .get(&assignment_id)
            .map(|entry| entry.state)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;

        if state != AssignmentState::Broadcasted {
            return Err(AppError::CannotRecall);
        }

        self.assignments.remove(&assignment_id);
        Ok(())
    }

    /// Moves assigned -> completed. Completing an already completed
    /// assignment is a no-op, so retries of a delivery confirmation are
    /// safe.
    pub async fn complete(&self, assignment_id: Uuid) -> Result<Assignment, AppError> {
        let _guard = self.transitions.lock().await;

        let mut entry = self
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;

        match entry.state {
            AssignmentState::Completed => Ok(entry.clone()),
            AssignmentState::Assigned => {
                entry.state = AssignmentState::Completed;
                Ok(entry.clone())
            }
            AssignmentState::Broadcasted => Err(AppError::NotEligible),
        }
    }

    /// Open broadcasts addressed to this courier.
    pub fn broadcasted_for(&self, courier_id: Uuid) -> Vec<Assignment> {
        self.assignments
            .iter()
            .filter(|entry| {
                entry.state == AssignmentState::Broadcasted
                    && entry.broadcasted_to.contains(&courier_id)
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// The one assignment this courier currently holds in assigned state,
    /// if any.
    pub fn current_for(&self, courier_id: Uuid) -> Option<Assignment> {
        self.assignments
            .iter()
            .find(|entry| {
                entry.state == AssignmentState::Assigned && entry.assigned_to == Some(courier_id)
            })
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    fn holds_assigned(&self, courier_id: Uuid) -> bool {
        self.assignments.iter().any(|entry| {
            entry.state == AssignmentState::Assigned && entry.assigned_to == Some(courier_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::error::AppError;
    use crate::models::assignment::AssignmentState;

    use super::AssignmentStore;

    async fn broadcast(store: &AssignmentStore, candidates: Vec<Uuid>) -> Uuid {
        store
            .create(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), candidates)
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn first_claim_wins_second_conflicts() {
        let store = AssignmentStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let id = broadcast(&store, vec![a, b]).await;

        let won = store.claim(id, a).await.unwrap();
        assert_eq!(won.state, AssignmentState::Assigned);
        assert_eq!(won.assigned_to, Some(a));
        assert!(won.accepted_at.is_some());

        assert!(matches!(
            store.claim(id, b).await,
            Err(AppError::AlreadyClaimed)
        ));
    }

    #[tokio::test]
    async fn busy_courier_cannot_claim_a_second_broadcast() {
        let store = AssignmentStore::new();
        let courier = Uuid::new_v4();

        let first = broadcast(&store, vec![courier]).await;
        let second = broadcast(&store, vec![courier]).await;

        store.claim(first, courier).await.unwrap();
        assert!(matches!(
            store.claim(second, courier).await,
            Err(AppError::CourierBusy)
        ));
    }

    #[tokio::test]
    async fn completing_frees_the_courier_for_the_next_claim() {
        let store = AssignmentStore::new();
        let courier = Uuid::new_v4();

        let first = broadcast(&store, vec![courier]).await;
        let second = broadcast(&store, vec![courier]).await;

        store.claim(first, courier).await.unwrap();
        store.complete(first).await.unwrap();

        assert!(store.claim(second, courier).await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_claims_have_exactly_one_winner() {
        let store = Arc::new(AssignmentStore::new());
        let couriers: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
        let id = broadcast(&store, couriers.clone()).await;

        let mut handles = Vec::new();
        for courier in couriers {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.claim(id, courier).await },
            ));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(AppError::AlreadyClaimed) | Err(AppError::CourierBusy) => conflicts += 1,
                Err(other) => panic!("unexpected claim error: {other}"),
            }
        }

        assert_eq!(wins, 1);
        assert_eq!(conflicts, 7);
    }

    #[tokio::test]
    async fn recall_deletes_only_unaccepted_broadcasts() {
        let store = AssignmentStore::new();
        let courier = Uuid::new_v4();

        let open = broadcast(&store, vec![courier]).await;
        store.recall(open).await.unwrap();
        assert!(store.get(open).is_none());

        let claimed = broadcast(&store, vec![courier]).await;
        store.claim(claimed, courier).await.unwrap();
        assert!(matches!(
            store.recall(claimed).await,
            Err(AppError::CannotRecall)
        ));
        assert!(store.get(claimed).is_some());
    }

    #[tokio::test]
    async fn complete_is_idempotent() {
        let store = AssignmentStore::new();
        let courier = Uuid::new_v4();
        let id = broadcast(&store, vec![courier]).await;

        store.claim(id, courier).await.unwrap();
        let first = store.complete(id).await.unwrap();
        let again = store.complete(id).await.unwrap();

        assert_eq!(first.state, AssignmentState::Completed);
        assert_eq!(again.state, AssignmentState::Completed);
    }

    #[tokio::test]
    async fn complete_rejects_an_unclaimed_broadcast() {
        let store = AssignmentStore::new();
        let id = broadcast(&store, vec![Uuid::new_v4()]).await;

        assert!(matches!(
            store.complete(id).await,
            Err(AppError::NotEligible)
        ));
    }

    #[tokio::test]
    async fn create_rejects_empty_candidate_set() {
        let store = AssignmentStore::new();
        let result = store
            .create(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Vec::new())
            .await;

        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn create_rejects_second_live_broadcast_for_same_shop_order() {
        let store = AssignmentStore::new();
        let shop_order_id = Uuid::new_v4();
        let courier = Uuid::new_v4();

        store
            .create(Uuid::new_v4(), shop_order_id, Uuid::new_v4(), vec![courier])
            .await
            .unwrap();

        let duplicate = store
            .create(Uuid::new_v4(), shop_order_id, Uuid::new_v4(), vec![courier])
            .await;
        assert!(matches!(duplicate, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn broadcasted_for_only_lists_open_offers_addressed_to_the_courier() {
        let store = AssignmentStore::new();
        let mine = Uuid::new_v4();
        let other = Uuid::new_v4();

        let offered = broadcast(&store, vec![mine, other]).await;
        let foreign = broadcast(&store, vec![other]).await;
        let taken = broadcast(&store, vec![mine]).await;
        store.claim(taken, mine).await.unwrap();

        let open = store.broadcasted_for(mine);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, offered);

        assert!(store.broadcasted_for(mine).iter().all(|a| a.id != foreign));
        assert_eq!(store.current_for(mine).unwrap().id, taken);
    }
}
