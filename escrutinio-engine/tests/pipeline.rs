//! End-to-end pipeline tests: capture, confirm, consolidate, verify,
//! claim, over an in-memory database.

use escrutinio_common::config::{Config, OcrConfig};
use escrutinio_common::db::init_schema;
use escrutinio_common::events::EventBus;
use escrutinio_engine::db::reference;
use escrutinio_engine::models::{
    CaptureEdits, ClaimStatus, OcrResult, RecognizedCandidate, Severity, SpecialVotes,
    VerificationStatus,
};
use escrutinio_engine::Engine;
use sqlx::SqlitePool;
use std::path::Path;

struct World {
    engine: Engine,
    municipality: i64,
    election_type: i64,
    process: i64,
    tables: Vec<i64>,
    _artifacts: tempfile::TempDir,
}

/// One municipality, three 300-voter tables, OCR tier disabled so the
/// pipeline exercises the deterministic paths.
async fn world() -> World {
    let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
    init_schema(&pool).await.unwrap();

    let municipality = reference::insert_municipality(&pool, "Florencia", Some("18001"))
        .await
        .unwrap();
    let place = reference::insert_polling_place(&pool, municipality, "Colegio Central", None)
        .await
        .unwrap();
    let mut tables = Vec::new();
    for n in 1..=3 {
        tables.push(
            reference::insert_polling_table(&pool, place, n, 300)
                .await
                .unwrap(),
        );
    }
    let election_type = reference::insert_election_type(&pool, "Senado", "senate")
        .await
        .unwrap();
    let process = reference::insert_electoral_process(&pool, "Elecciones 2026", Some("2026-03-08"))
        .await
        .unwrap();

    let artifacts = tempfile::tempdir().unwrap();
    let config = Config {
        database_path: ":memory:".into(),
        artifacts_dir: artifacts.path().into(),
        log_filter: "warn".into(),
        ocr: OcrConfig {
            enabled: false,
            ..OcrConfig::default()
        },
    };

    World {
        engine: Engine::new(pool, EventBus::new(256), config),
        municipality,
        election_type,
        process,
        tables,
        _artifacts: artifacts,
    }
}

fn ocr(votes: i64, blank: i64, null: i64) -> OcrResult {
    OcrResult {
        candidates: vec![RecognizedCandidate {
            candidate_identifier: "CANDIDATO UNICO".into(),
            party_label: Some("Partido Liberal".into()),
            ballot_number: Some(1),
            votes,
            confidence: Some(0.8),
        }],
        specials: SpecialVotes {
            blank,
            null,
            unmarked: 0,
        },
        confidence: 0.9,
        needs_manual_entry: false,
    }
}

async fn confirm_table(world: &World, table: i64, votes: i64, blank: i64, null: i64) -> i64 {
    let captures = world.engine.capture_manager();
    let id = captures
        .create_capture(table, world.election_type, "uploads/e14/img.jpg", &ocr(votes, blank, null), 1)
        .await
        .unwrap();
    captures.confirm_capture(id, 1).await.unwrap();
    id
}

/// Confirm all three tables (valid 10/20/30, blank 1/0/2, null 0/1/0) and run
async fn consolidate_all(world: &World) -> i64 {
    confirm_table(world, world.tables[0], 10, 1, 0).await;
    confirm_table(world, world.tables[1], 20, 0, 1).await;
    confirm_table(world, world.tables[2], 30, 2, 0).await;

    let consolidation = world.engine.consolidation_engine();
    let id = consolidation
        .begin(world.municipality, world.election_type, world.process, 5)
        .await
        .unwrap();
    consolidation.run(id).await.unwrap();
    id
}

fn write_official(dir: &Path, valid: i64, blank: i64, null: i64, ballots: i64, tables: i64) -> String {
    let path = dir.join("official_e24.txt");
    std::fs::write(
        &path,
        format!(
            "FORMULARIO E-24\nVotos válidos: {}\nVotos en blanco: {}\nVotos nulos: {}\n\
             Total tarjetones: {}\nMesas procesadas: {}\n",
            valid, blank, null, ballots, tables
        ),
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn basic_consolidation_totals() {
    let world = world().await;
    let id = consolidate_all(&world).await;

    let summary = world.engine.consolidation_engine().run(id).await.unwrap();
    assert_eq!(summary.tables_processed, 3);
    assert!(summary.completed);
    assert_eq!(summary.total_valid_votes, 60);
    assert_eq!(summary.total_blank_votes, 3);
    assert_eq!(summary.total_null_votes, 1);
    assert_eq!(summary.total_ballots, 64);
    // total_ballots is always the sum of its parts
    assert_eq!(
        summary.total_ballots,
        summary.total_valid_votes + summary.total_blank_votes + summary.total_null_votes
    );
}

#[tokio::test]
async fn partial_then_full_consolidation() {
    let world = world().await;
    confirm_table(&world, world.tables[0], 10, 1, 0).await;
    confirm_table(&world, world.tables[1], 20, 0, 1).await;

    let consolidation = world.engine.consolidation_engine();
    let id = consolidation
        .begin(world.municipality, world.election_type, world.process, 5)
        .await
        .unwrap();
    let summary = consolidation.run(id).await.unwrap();
    assert_eq!(summary.tables_processed, 2);
    assert!(!summary.completed);

    confirm_table(&world, world.tables[2], 30, 2, 0).await;
    let summary = consolidation.run(id).await.unwrap();
    assert_eq!(summary.tables_processed, 3);
    assert!(summary.completed);
    assert_eq!(summary.total_valid_votes, 60);
    assert_eq!(summary.total_ballots, 64);
}

#[tokio::test]
async fn totals_grow_by_exactly_the_new_table() {
    let world = world().await;
    confirm_table(&world, world.tables[0], 10, 1, 0).await;

    let consolidation = world.engine.consolidation_engine();
    let id = consolidation
        .begin(world.municipality, world.election_type, world.process, 5)
        .await
        .unwrap();
    let before = consolidation.run(id).await.unwrap();

    confirm_table(&world, world.tables[1], 20, 0, 1).await;
    let after = consolidation.run(id).await.unwrap();

    assert_eq!(after.tables_processed, before.tables_processed + 1);
    assert_eq!(after.total_valid_votes, before.total_valid_votes + 20);
    assert_eq!(after.total_null_votes, before.total_null_votes + 1);
    assert_eq!(after.total_ballots, before.total_ballots + 21);
}

#[tokio::test]
async fn duplicate_confirm_rejected_until_supersede() {
    let world = world().await;
    let captures = world.engine.capture_manager();

    let first = captures
        .create_capture(world.tables[0], world.election_type, "a.jpg", &ocr(10, 0, 0), 1)
        .await
        .unwrap();
    captures.confirm_capture(first, 1).await.unwrap();

    let second = captures
        .create_capture(world.tables[0], world.election_type, "b.jpg", &ocr(12, 0, 0), 1)
        .await
        .unwrap();
    let err = captures.confirm_capture(second, 1).await.unwrap_err();
    assert_eq!(err.kind(), "TABLE_ALREADY_HAS_CONFIRMED_CAPTURE");

    captures
        .supersede_capture(first, "photo retake requested by coordinator", 9)
        .await
        .unwrap();
    captures.confirm_capture(second, 1).await.unwrap();

    // Aggregation sees only the replacement
    let consolidation = world.engine.consolidation_engine();
    let id = consolidation
        .begin(world.municipality, world.election_type, world.process, 5)
        .await
        .unwrap();
    let summary = consolidation.run(id).await.unwrap();
    assert_eq!(summary.tables_processed, 1);
    assert_eq!(summary.total_valid_votes, 12);
}

#[tokio::test]
async fn verification_with_identical_official() {
    let world = world().await;
    let id = consolidate_all(&world).await;
    world.engine.consolidation_engine().generate_e24(id, 5).await.unwrap();

    let verification = world.engine.verification_engine();
    let official = write_official(world._artifacts.path(), 60, 3, 1, 64, 3);
    verification.attach_official_e24(id, &official, 5).await.unwrap();

    let outcome = verification.verify(id, 5).await.unwrap();
    assert_eq!(outcome.verification_status, VerificationStatus::Verified);
    assert!(outcome.discrepancies.is_empty());
}

#[tokio::test]
async fn verification_low_severity_discrepancy() {
    let world = world().await;
    let id = consolidate_all(&world).await;

    let verification = world.engine.verification_engine();
    let official = write_official(world._artifacts.path(), 59, 3, 1, 64, 3);
    verification.attach_official_e24(id, &official, 5).await.unwrap();

    let outcome = verification.verify(id, 5).await.unwrap();
    assert_eq!(outcome.verification_status, VerificationStatus::Discrepancies);
    assert_eq!(outcome.discrepancies.len(), 1);
    assert_eq!(outcome.discrepancies[0].severity, Severity::Low);
    assert_eq!(outcome.discrepancies[0].delta, 1);
}

#[tokio::test]
async fn claim_lifecycle_from_discrepancy() {
    let world = world().await;
    let id = consolidate_all(&world).await;

    let verification = world.engine.verification_engine();
    let official = write_official(world._artifacts.path(), 59, 3, 1, 64, 3);
    verification.attach_official_e24(id, &official, 5).await.unwrap();
    verification.verify(id, 5).await.unwrap();

    let claims = world.engine.claim_manager();
    let number = claims
        .generate_claim(id, "vote_total", "one-vote difference in valid votes", None, 9)
        .await
        .unwrap();
    assert!(number.starts_with(&format!("REC-{}-", id)));

    let claim_id = claims.claims_for_consolidation(id).await.unwrap()[0].id;
    claims.transition(claim_id, ClaimStatus::Sent, 9).await.unwrap();
    claims.transition(claim_id, ClaimStatus::UnderReview, 9).await.unwrap();
    claims.transition(claim_id, ClaimStatus::Resolved, 9).await.unwrap();

    let err = claims
        .transition(claim_id, ClaimStatus::Sent, 9)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "ILLEGAL_CLAIM_TRANSITION");
}

#[tokio::test]
async fn claims_require_discrepancies() {
    let world = world().await;
    let id = consolidate_all(&world).await;

    let verification = world.engine.verification_engine();
    let official = write_official(world._artifacts.path(), 60, 3, 1, 64, 3);
    verification.attach_official_e24(id, &official, 5).await.unwrap();
    verification.verify(id, 5).await.unwrap();

    let err = world
        .engine
        .claim_manager()
        .generate_claim(id, "vote_total", "no grounds", None, 9)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "NO_DISCREPANCIES_TO_CLAIM");
}

#[tokio::test]
async fn edited_values_are_authoritative_over_ocr() {
    let world = world().await;
    let captures = world.engine.capture_manager();

    let capture_id = captures
        .create_capture(world.tables[0], world.election_type, "img.jpg", &ocr(99, 9, 9), 1)
        .await
        .unwrap();

    // Witness corrects the OCR reading before confirming
    let votes = escrutinio_engine::db::captures::candidate_votes(&world.engine.db, capture_id)
        .await
        .unwrap();
    captures
        .edit_capture(
            capture_id,
            &CaptureEdits {
                candidate_votes: vec![(votes[0].id, 10)],
                blank_votes: Some(1),
                null_votes: Some(0),
                observations: Some("OCR leyó mal la casilla".into()),
                ..CaptureEdits::default()
            },
        )
        .await
        .unwrap();
    captures.confirm_capture(capture_id, 2).await.unwrap();

    let consolidation = world.engine.consolidation_engine();
    let id = consolidation
        .begin(world.municipality, world.election_type, world.process, 5)
        .await
        .unwrap();
    let summary = consolidation.run(id).await.unwrap();
    assert_eq!(summary.total_valid_votes, 10);
    assert_eq!(summary.total_blank_votes, 1);
    assert_eq!(summary.total_null_votes, 0);
}

#[tokio::test]
async fn manual_entry_capture_flows_through() {
    let world = world().await;
    let captures = world.engine.capture_manager();

    // OCR tier is disabled in this world: extraction falls back
    let extractor = world.engine.ocr_extractor();
    let fallback = extractor
        .extract(Path::new("/nonexistent/e14.jpg"), world.election_type)
        .await
        .unwrap();
    assert!(fallback.needs_manual_entry);

    let capture_id = captures
        .create_capture(world.tables[0], world.election_type, "img.jpg", &fallback, 1)
        .await
        .unwrap();
    captures
        .edit_capture(
            capture_id,
            &CaptureEdits {
                blank_votes: Some(2),
                null_votes: Some(1),
                ..CaptureEdits::default()
            },
        )
        .await
        .unwrap();
    captures.confirm_capture(capture_id, 2).await.unwrap();

    let consolidation = world.engine.consolidation_engine();
    let id = consolidation
        .begin(world.municipality, world.election_type, world.process, 5)
        .await
        .unwrap();
    let summary = consolidation.run(id).await.unwrap();
    assert_eq!(summary.tables_processed, 1);
    assert_eq!(summary.total_valid_votes, 0);
    assert_eq!(summary.total_ballots, 3);
}

#[tokio::test]
async fn municipal_status_rollup_reflects_pipeline() {
    let world = world().await;
    let id = consolidate_all(&world).await;

    let verification = world.engine.verification_engine();
    let official = write_official(world._artifacts.path(), 59, 3, 1, 64, 3);
    verification.attach_official_e24(id, &official, 5).await.unwrap();
    verification.verify(id, 5).await.unwrap();
    world
        .engine
        .claim_manager()
        .generate_claim(id, "vote_total", "difference", None, 9)
        .await
        .unwrap();

    let status = world
        .engine
        .consolidation_engine()
        .municipal_status(world.municipality)
        .await
        .unwrap();
    assert_eq!(status.total_consolidations, 1);
    assert_eq!(status.completed, 1);
    assert_eq!(status.tables_processed, 3);
    assert_eq!(status.pending_discrepancies, 1);
    assert_eq!(status.active_claims, 1);
    assert_eq!(status.overall_progress_percent(), 100.0);
}
