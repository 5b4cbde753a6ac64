//! The Repository Port (§4.8): transactional persistence of both artifacts,
//! lookup by identifier, and a health probe. A provider-agnostic interface
//! with two implementations, matching the teacher's `Driver`/`SearchProvider`
//! split between "what's shared" and "what varies per backend":
//!
//! - [`sql::SqlRepository`] — the reference backing store, `sqlx` against
//!   SQLite.
//! - [`memory::InMemoryRepository`] — a `RwLock`-guarded map pair, used by
//!   the test suite and as a zero-external-dependency fallback.

pub mod memory;
pub mod sql;

use uuid::Uuid;

use crate::{
    context::RequestContext,
    domain::{Decision, Plan},
    prelude::*,
};

/// Failure modes surfaced by the Repository Port (the persistence subset of
/// §7's taxonomy).
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// No row exists for the requested identifier.
    #[error("not found")]
    NotFound,
    /// Saving failed because the identifier was already taken, even after
    /// the one-time regenerate-and-retry (§9 design notes' resolved open
    /// question).
    #[error("identifier conflict")]
    Conflict,
    /// Any other storage-layer failure (connection, transaction, I/O).
    #[error("repository error: {0}")]
    Storage(#[source] anyhow::Error),
}

/// The Repository Port: atomic persistence of decision/plan pairs, lookup,
/// and a health probe.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Persist both artifacts atomically: either both are committed, or
    /// neither is (§4.8, invariant 1). `plan.decision_id` is stamped to
    /// `decision.id` before commit, overriding whatever the caller passed.
    ///
    /// On a duplicate `decision.id`, the implementation regenerates the id
    /// once and retries; if the regenerated id also conflicts, this returns
    /// [`RepositoryError::Conflict`] (§9 design notes, resolved open
    /// question — the source's behavior here was undocumented, so we chose
    /// the conservative option rather than guessing silently).
    async fn save_artifacts(
        &self,
        ctx: &RequestContext,
        decision: Decision,
        plan: Plan,
    ) -> Result<(Decision, Plan), RepositoryError>;

    /// Look up a decision by id.
    async fn get_decision(&self, ctx: &RequestContext, id: Uuid) -> Result<Decision, RepositoryError>;

    /// Look up a plan by its own id.
    async fn get_plan(&self, ctx: &RequestContext, id: Uuid) -> Result<Plan, RepositoryError>;

    /// Look up a plan by its owning decision's id.
    async fn get_plan_by_decision(
        &self,
        ctx: &RequestContext,
        decision_id: Uuid,
    ) -> Result<Plan, RepositoryError>;

    /// Health probe: any failure means "degraded."
    async fn ping(&self, ctx: &RequestContext) -> Result<(), RepositoryError>;

    /// Release any resources held by this repository (connection pools,
    /// etc). Called once at shutdown.
    async fn close(&self);
}
