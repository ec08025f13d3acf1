//! escrutinio-engine: electoral data-collection core
//!
//! The pipeline: an E-14 tally-sheet image is OCR'd into an editable
//! capture, a witness confirms it, the consolidation engine aggregates
//! all confirmed captures of a municipality into an E-24 record, the
//! verification engine diffs that record against the officially issued
//! E-24, and the claim manager raises formal claims from discrepancies.
//! Witness assignment runs alongside as an orthogonal subsystem.
//!
//! HTTP handlers, dashboards and importers live outside this crate and
//! consume the services exposed here.

pub mod db;
pub mod models;
pub mod services;

use escrutinio_common::config::Config;
use escrutinio_common::events::EventBus;
use sqlx::SqlitePool;

use services::capture_manager::CaptureManager;
use services::claim_manager::ClaimManager;
use services::consolidation_engine::ConsolidationEngine;
use services::ocr_extractor::OcrExtractor;
use services::verification_engine::VerificationEngine;
use services::witness_assigner::WitnessAssigner;

/// Engine state shared across callers: one pool, one event bus, one
/// config, and the service set built over them. The stateful services
/// (those carrying per-entity locks) are constructed once here so every
/// caller contends on the same locks.
#[derive(Clone)]
pub struct Engine {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub config: Config,
    consolidation: ConsolidationEngine,
    claims: ClaimManager,
    witnesses: WitnessAssigner,
}

impl Engine {
    pub fn new(db: SqlitePool, event_bus: EventBus, config: Config) -> Self {
        let consolidation = ConsolidationEngine::new(
            db.clone(),
            event_bus.clone(),
            config.artifacts_dir.clone(),
        );
        let claims = ClaimManager::new(db.clone(), event_bus.clone());
        let witnesses = WitnessAssigner::new(db.clone(), event_bus.clone());
        Self {
            db,
            event_bus,
            config,
            consolidation,
            claims,
            witnesses,
        }
    }

    /// OCR extraction front-end (component B)
    pub fn ocr_extractor(&self) -> OcrExtractor {
        OcrExtractor::new(self.db.clone(), self.config.ocr.clone())
    }

    /// E-14 record manager (component C)
    pub fn capture_manager(&self) -> CaptureManager {
        CaptureManager::new(self.db.clone(), self.event_bus.clone())
    }

    /// Consolidation engine (component D)
    pub fn consolidation_engine(&self) -> &ConsolidationEngine {
        &self.consolidation
    }

    /// E-24 verification engine (component E)
    pub fn verification_engine(&self) -> VerificationEngine {
        VerificationEngine::new(self.db.clone(), self.event_bus.clone(), self.config.ocr.clone())
    }

    /// Claim manager (component F)
    pub fn claim_manager(&self) -> &ClaimManager {
        &self.claims
    }

    /// Witness assignment (component G)
    pub fn witness_assigner(&self) -> &WitnessAssigner {
        &self.witnesses
    }
}
