//! Pattern learner use case
//!
//! Folds a [`PatternSeed`] into the best matching live pattern, or creates a
//! new experimental one. Pattern rows are the only table several tasks write
//! concurrently, so every update is a versioned compare-and-swap retried a
//! bounded number of times.

use crate::error::EngineError;
use crate::ports::repository::{PatternRepository, RepositoryError};
use crate::use_cases::provenance::ProvenanceRecorder;
use semantra_domain::learning::{StatusChange, select_best};
use semantra_domain::{
    ActivityKind, AgentId, ContextSignature, EntityId, EntityKind, LearningPattern,
    LearningPolicy, PatternSeed, ProvenanceLink,
};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of one learning pass.
#[derive(Debug, Clone)]
pub struct LearningOutcome {
    pub pattern: LearningPattern,
    pub created: bool,
    pub status_change: Option<StatusChange>,
    /// Compare-and-swap attempts used (1 when uncontended).
    pub attempts: u32,
}

/// Handle to a learning pass running in the background.
#[derive(Debug)]
pub struct LearningHandle {
    inner: JoinHandle<Result<LearningOutcome, EngineError>>,
}

impl LearningHandle {
    /// Wait for the pass to finish.
    pub async fn wait(self) -> Result<LearningOutcome, EngineError> {
        self.inner
            .await
            .map_err(|e| EngineError::Internal(format!("learning task failed: {e}")))?
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

pub struct PatternLearner {
    patterns: Arc<dyn PatternRepository>,
    provenance: ProvenanceRecorder,
    policy: LearningPolicy,
    max_conflict_retries: u32,
    actor: AgentId,
}

impl PatternLearner {
    pub fn new(
        patterns: Arc<dyn PatternRepository>,
        provenance: ProvenanceRecorder,
        policy: LearningPolicy,
        actor: AgentId,
    ) -> Self {
        Self {
            patterns,
            provenance,
            policy,
            max_conflict_retries: 5,
            actor,
        }
    }

    pub fn with_max_conflict_retries(mut self, max: u32) -> Self {
        self.max_conflict_retries = max;
        self
    }

    pub fn policy(&self) -> &LearningPolicy {
        &self.policy
    }

    /// Run [`Self::derive_or_update`] on a background task.
    pub fn spawn(self: &Arc<Self>, seed: PatternSeed, derived_from: Vec<EntityId>) -> LearningHandle {
        let learner = Arc::clone(self);
        let inner = tokio::spawn(async move {
            let result = learner.derive_or_update(&seed, &derived_from).await;
            if let Err(e) = &result {
                warn!("Learning from decision {} failed: {}", seed.decision_id, e);
            }
            result
        });
        LearningHandle { inner }
    }

    /// Fold `seed` into a pattern.
    ///
    /// `derived_from` lists the ledger entities the seed came from (the
    /// feedback or override row).
    pub async fn derive_or_update(
        &self,
        seed: &PatternSeed,
        derived_from: &[EntityId],
    ) -> Result<LearningOutcome, EngineError> {
        let max_attempts = self.max_conflict_retries.saturating_add(1);
        for attempt in 1..=max_attempts {
            let Some(current) = self.find_target(seed).await? else {
                match self.create(seed, derived_from).await? {
                    Some(pattern) => {
                        return Ok(LearningOutcome {
                            pattern,
                            created: true,
                            status_change: None,
                            attempts: attempt,
                        });
                    }
                    // Another pass created a pattern for this signature first
                    None => continue,
                }
            };

            let expected = current.version;
            let mut next = current.clone();
            let status_change = next.apply_seed(seed, &self.policy);

            let mut sources = derived_from.to_vec();
            sources.push(current.provenance.entity.clone());
            let activity = self
                .provenance
                .begin(
                    ActivityKind::PatternLearning,
                    &self.actor,
                    json!({
                        "pattern": current.id,
                        "decision": seed.decision_id,
                        "success": seed.success,
                        "attempt": attempt,
                    }),
                )
                .await?;
            next.provenance = self
                .provenance
                .generated(&activity, EntityKind::LearningPattern, &next, &sources)
                .await?;

            match self.patterns.compare_and_swap(&next, expected).await {
                Ok(stored) => {
                    if let Some(change) = &status_change {
                        info!(
                            "Pattern {} moved {} -> {}",
                            stored.id,
                            change.from.as_str(),
                            change.to.as_str()
                        );
                    }
                    debug!(
                        "Pattern {} updated: {}/{} successes, rate {}",
                        stored.id, stored.successes, stored.times_applied, stored.success_rate
                    );
                    return Ok(LearningOutcome {
                        pattern: stored,
                        created: false,
                        status_change,
                        attempts: attempt,
                    });
                }
                Err(RepositoryError::VersionConflict { actual, .. }) => {
                    debug!(
                        "Pattern {} changed underneath (v{} -> v{}), retrying",
                        current.id, expected, actual
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(EngineError::ConcurrencyConflict {
            entity: format!("learning pattern for {}", seed.signature),
            attempts: max_attempts,
        })
    }

    /// The applied pattern if still live, else the best live match.
    async fn find_target(&self, seed: &PatternSeed) -> Result<Option<LearningPattern>, EngineError> {
        if let Some(id) = &seed.applied_pattern
            && let Some(pattern) = self.patterns.get(id).await?
            && pattern.status.is_live()
        {
            return Ok(Some(pattern));
        }
        let patterns = self.patterns.list().await?;
        Ok(select_best(&patterns, &seed.signature).cloned())
    }

    /// Insert a new pattern for the seed's signature.
    ///
    /// Returns `None` when a live pattern covering the signature appeared
    /// since [`Self::find_target`] looked.
    async fn create(
        &self,
        seed: &PatternSeed,
        derived_from: &[EntityId],
    ) -> Result<Option<LearningPattern>, EngineError> {
        let activity = self
            .provenance
            .begin(
                ActivityKind::PatternLearning,
                &self.actor,
                json!({
                    "decision": seed.decision_id,
                    "signature": seed.signature.key(),
                    "success": seed.success,
                }),
            )
            .await?;
        let mut pattern = LearningPattern::from_seed(seed, ProvenanceLink::pending(activity.clone()));
        pattern.provenance = self
            .provenance
            .generated(&activity, EntityKind::LearningPattern, &pattern, derived_from)
            .await?;
        match self.patterns.insert_if_absent(&pattern).await {
            Ok(stored) => {
                info!("Created experimental pattern {} ({})", stored.id, stored.name);
                Ok(Some(stored))
            }
            Err(RepositoryError::VersionConflict { id, .. }) => {
                debug!(
                    "Pattern {} already covers {}, folding into it",
                    id, seed.signature
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Patterns covering `signature` (or all), best first.
    pub async fn list_patterns(
        &self,
        signature: Option<&ContextSignature>,
    ) -> Result<Vec<LearningPattern>, EngineError> {
        let mut patterns: Vec<_> = self
            .patterns
            .list()
            .await?
            .into_iter()
            .filter(|p| signature.is_none_or(|s| p.signature.covers(s)))
            .collect();
        patterns.sort_by(|a, b| {
            b.score()
                .value()
                .total_cmp(&a.score().value())
                .then(b.last_applied.cmp(&a.last_applied))
        });
        Ok(patterns)
    }

    pub async fn best_match(
        &self,
        signature: &ContextSignature,
    ) -> Result<Option<LearningPattern>, EngineError> {
        let patterns = self.patterns.list().await?;
        Ok(select_best(&patterns, signature).cloned())
    }
}
