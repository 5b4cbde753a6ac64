//! [`InMemoryRepository`]: a `RwLock`-guarded pair of maps providing the
//! same atomicity semantics as the SQL-backed implementation, used by the
//! test suite and as a zero-external-dependency fallback (§4.8
//! "supplemented").

use std::{collections::HashMap, sync::RwLock};

use uuid::Uuid;

use super::{Repository, RepositoryError};
use crate::{
    context::RequestContext,
    domain::{Decision, Plan},
    prelude::*,
};

#[derive(Default)]
struct Store {
    decisions: HashMap<Uuid, Decision>,
    plans_by_id: HashMap<Uuid, Plan>,
    plan_id_by_decision_id: HashMap<Uuid, Uuid>,
}

/// An in-process repository backed by a single exclusive writer lock; reads
/// take a shared lock. No lock is held across an external call, because
/// there are none here (§5's shared-resource policy).
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    /// Build an empty repository.
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store::default()),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save_artifacts(
        &self,
        _ctx: &RequestContext,
        mut decision: Decision,
        mut plan: Plan,
    ) -> Result<(Decision, Plan), RepositoryError> {
        let mut store = self.store.write().expect("in-memory repository lock poisoned");

        if store.decisions.contains_key(&decision.id) {
            // Regenerate once and retry (§9 design notes, resolved open
            // question), then give up.
            let regenerated = Uuid::new_v4();
            decision.id = regenerated;
            plan.id = regenerated;
            plan.decision_id = regenerated;
            if store.decisions.contains_key(&decision.id) {
                return Err(RepositoryError::Conflict);
            }
        }

        plan.decision_id = decision.id;

        store.decisions.insert(decision.id, decision.clone());
        store.plan_id_by_decision_id.insert(plan.decision_id, plan.id);
        store.plans_by_id.insert(plan.id, plan.clone());

        Ok((decision, plan))
    }

    async fn get_decision(&self, _ctx: &RequestContext, id: Uuid) -> Result<Decision, RepositoryError> {
        let store = self.store.read().expect("in-memory repository lock poisoned");
        store.decisions.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn get_plan(&self, _ctx: &RequestContext, id: Uuid) -> Result<Plan, RepositoryError> {
        let store = self.store.read().expect("in-memory repository lock poisoned");
        store.plans_by_id.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn get_plan_by_decision(
        &self,
        _ctx: &RequestContext,
        decision_id: Uuid,
    ) -> Result<Plan, RepositoryError> {
        let store = self.store.read().expect("in-memory repository lock poisoned");
        let plan_id = store
            .plan_id_by_decision_id
            .get(&decision_id)
            .ok_or(RepositoryError::NotFound)?;
        store.plans_by_id.get(plan_id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn ping(&self, _ctx: &RequestContext) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::VerdictPayload;

    fn decision_and_plan() -> (Decision, Plan) {
        let id = Uuid::new_v4();
        let created_at = chrono::Utc::now();
        let decision = Decision {
            id,
            created_at,
            input: "Go or Python?".to_owned(),
            verdict: VerdictPayload {
                ruling: "Use Go".to_owned(),
                rationale: "concurrency".to_owned(),
                rejected: vec![],
                ranking: None,
            },
            is_final: true,
        };
        let plan = Plan {
            id,
            decision_id: id,
            created_at,
            content: "# plan".to_owned(),
        };
        (decision, plan)
    }

    #[tokio::test]
    async fn saves_and_reads_back_by_both_ids() {
        let repo = InMemoryRepository::new();
        let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
        let (decision, plan) = decision_and_plan();
        let id = decision.id;

        repo.save_artifacts(&ctx, decision, plan).await.unwrap();

        let found_decision = repo.get_decision(&ctx, id).await.unwrap();
        assert_eq!(found_decision.id, id);

        let found_plan = repo.get_plan(&ctx, id).await.unwrap();
        assert_eq!(found_plan.decision_id, id);

        let found_by_decision = repo.get_plan_by_decision(&ctx, id).await.unwrap();
        assert_eq!(found_by_decision.id, found_plan.id);
    }

    #[tokio::test]
    async fn missing_id_is_not_found() {
        let repo = InMemoryRepository::new();
        let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
        let result = repo.get_decision(&ctx, Uuid::new_v4()).await;
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }

    #[tokio::test]
    async fn duplicate_id_is_regenerated_once_then_succeeds() {
        let repo = InMemoryRepository::new();
        let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
        let (decision, plan) = decision_and_plan();
        let original_id = decision.id;
        repo.save_artifacts(&ctx, decision.clone(), plan.clone()).await.unwrap();

        // Second save reuses the same id; it should be regenerated and
        // still succeed, under a fresh id.
        let (saved_decision, saved_plan) = repo.save_artifacts(&ctx, decision, plan).await.unwrap();
        assert_ne!(saved_decision.id, original_id);
        assert_eq!(saved_decision.id, saved_plan.decision_id);
    }

    #[tokio::test]
    async fn concurrent_saves_all_succeed_with_unique_ids() {
        use std::sync::Arc;
        let repo = Arc::new(InMemoryRepository::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
                let (decision, plan) = decision_and_plan();
                let (saved, _) = repo.save_artifacts(&ctx, decision, plan).await.unwrap();
                saved.id
            }));
        }
        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let id = handle.await.unwrap();
            assert!(ids.insert(id), "duplicate id produced under concurrency");
        }
        assert_eq!(ids.len(), 16);
    }
}
