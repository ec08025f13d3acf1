//! Claim manager
//!
//! Raises formal numbered claims from a consolidation's verification
//! discrepancies and tracks them through submission and resolution.
//! Claim numbers follow `REC-{consolidation_id}-{YYYYMMDDhhmmss}`;
//! issuance is serialised per consolidation and a sequence suffix
//! resolves same-second collisions, with the UNIQUE column as the final
//! arbiter.

use crate::db::{audit, claims, consolidations};
use crate::models::{Claim, ClaimStatus, VerificationStatus};
use crate::services::lock_map::LockMap;
use escrutinio_common::events::{EventBus, ScrutinyEvent};
use escrutinio_common::{time, Error, Result};
use sqlx::SqlitePool;

/// Default recipient authority for claims
const DEFAULT_RECIPIENT: &str = "Registraduría Nacional del Estado Civil";

#[derive(Clone)]
pub struct ClaimManager {
    db: SqlitePool,
    event_bus: EventBus,
    issuance_locks: LockMap<i64>,
}

impl ClaimManager {
    pub fn new(db: SqlitePool, event_bus: EventBus) -> Self {
        Self {
            db,
            event_bus,
            issuance_locks: LockMap::new(),
        }
    }

    /// Generate a claim against a consolidation with discrepancies.
    ///
    /// `issued_to` defaults to the national registrar authority when not
    /// given. Returns the claim number.
    pub async fn generate_claim(
        &self,
        consolidation_id: i64,
        kind: &str,
        description: &str,
        issued_to: Option<&str>,
        issuing_user: i64,
    ) -> Result<String> {
        let consolidation = consolidations::load(&self.db, consolidation_id)
            .await?
            .ok_or(Error::UnknownConsolidation(consolidation_id))?;

        if consolidation.verification_status != VerificationStatus::Discrepancies {
            return Err(Error::NoDiscrepanciesToClaim(consolidation_id));
        }

        let _guard = self.issuance_locks.acquire(consolidation_id).await;

        let now = time::now();
        let base_number = format!("REC-{}-{}", consolidation_id, time::compact_stamp(now));
        let mut claim_number = base_number.clone();
        let mut sequence = 1;
        while claims::number_exists(&self.db, &claim_number).await? {
            claim_number = format!("{}-{}", base_number, sequence);
            sequence += 1;
        }

        let claim_id = claims::insert(
            &self.db,
            consolidation_id,
            &claim_number,
            kind,
            description,
            issued_to.unwrap_or(DEFAULT_RECIPIENT),
            issuing_user,
            &now.to_rfc3339(),
        )
        .await?;

        tracing::info!(claim_id, claim_number = %claim_number, consolidation_id, "claim generated");

        audit::record_lossy(
            &self.db,
            issuing_user,
            "generate_claim",
            "claim",
            claim_id,
            &claim_number,
        )
        .await;

        self.event_bus.emit_lossy(ScrutinyEvent::ClaimGenerated {
            claim_id,
            consolidation_id,
            claim_number: claim_number.clone(),
            timestamp: now,
        });

        Ok(claim_number)
    }

    /// Move a claim through its lifecycle, stamping timestamp and actor.
    pub async fn transition(&self, claim_id: i64, new_status: ClaimStatus, actor: i64) -> Result<()> {
        let claim = claims::load(&self.db, claim_id)
            .await?
            .ok_or(Error::UnknownClaim(claim_id))?;

        if !claim.status.can_transition_to(new_status) {
            return Err(Error::IllegalClaimTransition {
                from: claim.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        claims::write_transition(&self.db, claim_id, new_status, actor, &time::now_iso()).await?;

        tracing::info!(
            claim_id,
            from = claim.status.as_str(),
            to = new_status.as_str(),
            "claim transitioned"
        );

        audit::record_lossy(
            &self.db,
            actor,
            "transition_claim",
            "claim",
            claim_id,
            &format!("{} -> {}", claim.status.as_str(), new_status.as_str()),
        )
        .await;

        self.event_bus.emit_lossy(ScrutinyEvent::ClaimStatusChanged {
            claim_id,
            old_status: claim.status.as_str().to_string(),
            new_status: new_status.as_str().to_string(),
            timestamp: time::now(),
        });

        Ok(())
    }

    pub async fn claim(&self, claim_id: i64) -> Result<Option<Claim>> {
        claims::load(&self.db, claim_id).await
    }

    pub async fn claims_for_consolidation(&self, consolidation_id: i64) -> Result<Vec<Claim>> {
        claims::list_for_consolidation(&self.db, consolidation_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{discrepancies, reference};
    use crate::models::{DiscrepancyKind, Severity};
    use escrutinio_common::db::init_schema;
    use once_cell::sync::Lazy;
    use regex::Regex;

    static CLAIM_NUMBER: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"^REC-\d+-\d{14}(-\d+)?$").unwrap());

    async fn setup(with_discrepancies: bool) -> (ClaimManager, SqlitePool, i64) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        let mun = reference::insert_municipality(&pool, "Florencia", None).await.unwrap();
        let etype = reference::insert_election_type(&pool, "Senado", "senate").await.unwrap();
        let process = reference::insert_electoral_process(&pool, "Elecciones 2026", None)
            .await
            .unwrap();
        let consolidation_id =
            crate::db::consolidations::insert(&pool, mun, etype, process, 3, 1, "t")
                .await
                .unwrap();

        if with_discrepancies {
            discrepancies::insert(
                &pool,
                &discrepancies::NewDiscrepancy {
                    consolidation_id,
                    kind: DiscrepancyKind::VoteTotal,
                    field_name: "total_valid_votes",
                    generated_value: 60,
                    official_value: 59,
                    delta: 1,
                    severity: Severity::Low,
                    description: "delta 1",
                },
            )
            .await
            .unwrap();
            crate::db::consolidations::write_verification(
                &pool,
                consolidation_id,
                VerificationStatus::Discrepancies,
                1,
                "t",
            )
            .await
            .unwrap();
        }

        let manager = ClaimManager::new(pool.clone(), EventBus::new(16));
        (manager, pool, consolidation_id)
    }

    #[tokio::test]
    async fn test_claim_number_format_and_default_recipient() {
        let (manager, _pool, consolidation_id) = setup(true).await;
        let number = manager
            .generate_claim(consolidation_id, "vote_total", "difference in valid votes", None, 9)
            .await
            .unwrap();
        assert!(CLAIM_NUMBER.is_match(&number), "unexpected claim number: {}", number);
        assert!(number.starts_with(&format!("REC-{}-", consolidation_id)));

        let claims = manager.claims_for_consolidation(consolidation_id).await.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].issued_to, DEFAULT_RECIPIENT);
        assert_eq!(claims[0].status, ClaimStatus::Generated);
    }

    #[tokio::test]
    async fn test_requires_discrepancies() {
        let (manager, _pool, consolidation_id) = setup(false).await;
        let err = manager
            .generate_claim(consolidation_id, "vote_total", "desc", None, 9)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NO_DISCREPANCIES_TO_CLAIM");
    }

    #[tokio::test]
    async fn test_same_second_collision_gets_suffix() {
        let (manager, _pool, consolidation_id) = setup(true).await;
        // Issued back-to-back; at least two land in the same second and
        // must diverge via the sequence suffix.
        let mut numbers = std::collections::HashSet::new();
        for _ in 0..3 {
            let number = manager
                .generate_claim(consolidation_id, "vote_total", "desc", None, 9)
                .await
                .unwrap();
            assert!(CLAIM_NUMBER.is_match(&number));
            assert!(numbers.insert(number), "claim numbers must be unique");
        }
    }

    #[tokio::test]
    async fn test_lifecycle_happy_path_then_illegal() {
        let (manager, _pool, consolidation_id) = setup(true).await;
        manager
            .generate_claim(consolidation_id, "vote_total", "desc", Some("Comisión Escrutadora"), 9)
            .await
            .unwrap();
        let claim = &manager.claims_for_consolidation(consolidation_id).await.unwrap()[0];
        assert_eq!(claim.issued_to, "Comisión Escrutadora");
        let id = claim.id;

        manager.transition(id, ClaimStatus::Sent, 9).await.unwrap();
        manager.transition(id, ClaimStatus::UnderReview, 9).await.unwrap();
        manager.transition(id, ClaimStatus::Resolved, 9).await.unwrap();

        let err = manager.transition(id, ClaimStatus::Sent, 9).await.unwrap_err();
        assert_eq!(err.kind(), "ILLEGAL_CLAIM_TRANSITION");

        let claim = manager.claim(id).await.unwrap().unwrap();
        assert_eq!(claim.status, ClaimStatus::Resolved);
        assert!(claim.sent_at.is_some());
        assert!(claim.reviewed_at.is_some());
        assert!(claim.closed_at.is_some());
    }

    #[tokio::test]
    async fn test_double_send_is_illegal() {
        let (manager, _pool, consolidation_id) = setup(true).await;
        manager
            .generate_claim(consolidation_id, "vote_total", "desc", None, 9)
            .await
            .unwrap();
        let id = manager.claims_for_consolidation(consolidation_id).await.unwrap()[0].id;

        manager.transition(id, ClaimStatus::Sent, 9).await.unwrap();
        let err = manager.transition(id, ClaimStatus::Sent, 9).await.unwrap_err();
        assert_eq!(err.kind(), "ILLEGAL_CLAIM_TRANSITION");
    }

    #[tokio::test]
    async fn test_resubmission_from_review() {
        let (manager, _pool, consolidation_id) = setup(true).await;
        manager
            .generate_claim(consolidation_id, "vote_total", "desc", None, 9)
            .await
            .unwrap();
        let id = manager.claims_for_consolidation(consolidation_id).await.unwrap()[0].id;

        manager.transition(id, ClaimStatus::Sent, 9).await.unwrap();
        manager.transition(id, ClaimStatus::UnderReview, 9).await.unwrap();
        // Re-submission is the one legal backward step
        manager.transition(id, ClaimStatus::Sent, 9).await.unwrap();
        manager.transition(id, ClaimStatus::UnderReview, 9).await.unwrap();
        manager.transition(id, ClaimStatus::Rejected, 9).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_claim() {
        let (manager, _pool, _consolidation_id) = setup(true).await;
        let err = manager.transition(404, ClaimStatus::Sent, 9).await.unwrap_err();
        assert_eq!(err.kind(), "UNKNOWN_CLAIM");
    }
}
