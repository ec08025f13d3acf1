//! Database pool and schema initialisation
//!
//! The schema is created idempotently at startup. Two partial unique
//! indexes carry the core invariants: at most one confirmed E-14 per
//! (polling table, election type), and at most one active principal
//! witness per (polling table, electoral process).

use crate::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Open (creating if needed) the SQLite database and initialise the schema.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes if they do not exist.
///
/// Safe to call on every startup and on fresh in-memory pools in tests.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS municipalities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            divipola_code TEXT UNIQUE,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS polling_places (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            municipality_id INTEGER NOT NULL REFERENCES municipalities(id),
            name TEXT NOT NULL,
            address TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS polling_tables (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            polling_place_id INTEGER NOT NULL REFERENCES polling_places(id),
            table_number INTEGER NOT NULL,
            enrolled_voters INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (polling_place_id, table_number)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS election_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            code TEXT NOT NULL UNIQUE,
            active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS electoral_processes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            held_on TEXT,
            status TEXT NOT NULL DEFAULT 'planned',
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS parties (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            abbreviation TEXT,
            active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS candidates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            national_id TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            affiliation TEXT NOT NULL
                CHECK (affiliation IN ('party', 'coalition', 'independent')),
            party_id INTEGER REFERENCES parties(id),
            coalition_name TEXT,
            election_type_id INTEGER NOT NULL REFERENCES election_types(id),
            ballot_number INTEGER NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ux_candidates_ballot
        ON candidates(election_type_id, ballot_number)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS witnesses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            national_id TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            coordinator_id INTEGER,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS e14_captures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            polling_table_id INTEGER NOT NULL REFERENCES polling_tables(id),
            election_type_id INTEGER NOT NULL REFERENCES election_types(id),
            image_ref TEXT NOT NULL,
            blank_votes INTEGER NOT NULL DEFAULT 0,
            null_votes INTEGER NOT NULL DEFAULT 0,
            unmarked_ballots INTEGER NOT NULL DEFAULT 0,
            observations TEXT,
            status TEXT NOT NULL DEFAULT 'captured'
                CHECK (status IN ('captured', 'confirmed', 'superseded')),
            needs_manual_entry INTEGER NOT NULL DEFAULT 0,
            ocr_confidence REAL NOT NULL DEFAULT 0.0,
            captured_by INTEGER NOT NULL,
            captured_at TEXT NOT NULL,
            confirmed_by INTEGER,
            confirmed_at TEXT,
            superseded_at TEXT,
            supersede_reason TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one confirmed E-14 per (polling table, election type)
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ux_e14_confirmed
        ON e14_captures(polling_table_id, election_type_id)
        WHERE status = 'confirmed'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS e14_candidate_votes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            capture_id INTEGER NOT NULL REFERENCES e14_captures(id) ON DELETE CASCADE,
            candidate_label TEXT NOT NULL,
            party_label TEXT,
            ballot_number INTEGER,
            votes INTEGER NOT NULL DEFAULT 0,
            ocr_confidence REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS consolidations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            municipality_id INTEGER NOT NULL REFERENCES municipalities(id),
            election_type_id INTEGER NOT NULL REFERENCES election_types(id),
            electoral_process_id INTEGER NOT NULL REFERENCES electoral_processes(id),
            total_tables_expected INTEGER NOT NULL DEFAULT 0,
            tables_processed INTEGER NOT NULL DEFAULT 0,
            total_valid_votes INTEGER NOT NULL DEFAULT 0,
            total_blank_votes INTEGER NOT NULL DEFAULT 0,
            total_null_votes INTEGER NOT NULL DEFAULT 0,
            total_unmarked INTEGER NOT NULL DEFAULT 0,
            total_ballots INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'consolidating', 'completed')),
            verification_status TEXT NOT NULL DEFAULT 'not_verified'
                CHECK (verification_status IN ('not_verified', 'verified', 'discrepancies')),
            generated_e24_ref TEXT,
            official_e24_ref TEXT,
            started_by INTEGER,
            verified_by INTEGER,
            started_at TEXT,
            last_consolidated_at TEXT,
            verified_at TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ux_consolidation_scope
        ON consolidations(municipality_id, election_type_id, electoral_process_id)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS discrepancies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            consolidation_id INTEGER NOT NULL
                REFERENCES consolidations(id) ON DELETE CASCADE,
            kind TEXT NOT NULL
                CHECK (kind IN ('vote_total', 'candidate_vote', 'blank', 'null',
                                'unmarked', 'table_count')),
            field_name TEXT NOT NULL,
            generated_value INTEGER NOT NULL,
            official_value INTEGER NOT NULL,
            delta INTEGER NOT NULL,
            severity TEXT NOT NULL CHECK (severity IN ('low', 'medium', 'high')),
            description TEXT NOT NULL,
            review_status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS claims (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            consolidation_id INTEGER NOT NULL
                REFERENCES consolidations(id) ON DELETE CASCADE,
            claim_number TEXT NOT NULL UNIQUE,
            kind TEXT NOT NULL,
            description TEXT NOT NULL,
            issued_to TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'generated'
                CHECK (status IN ('generated', 'sent', 'under_review',
                                  'resolved', 'rejected')),
            created_by INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            sent_at TEXT,
            reviewed_at TEXT,
            closed_at TEXT,
            last_transition_by INTEGER,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS witness_assignments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            witness_id INTEGER NOT NULL REFERENCES witnesses(id),
            polling_table_id INTEGER NOT NULL REFERENCES polling_tables(id),
            electoral_process_id INTEGER NOT NULL REFERENCES electoral_processes(id),
            role TEXT NOT NULL DEFAULT 'principal'
                CHECK (role IN ('principal', 'alternate')),
            status TEXT NOT NULL DEFAULT 'assigned'
                CHECK (status IN ('assigned', 'confirmed', 'present',
                                  'absent', 'reassigned')),
            assigned_at TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one active principal witness per (polling table, process)
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS ux_witness_principal
        ON witness_assignments(polling_table_id, electoral_process_id)
        WHERE role = 'principal' AND status != 'reassigned'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            actor_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            entity_kind TEXT,
            entity_id INTEGER,
            description TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database schema initialized");

    Ok(())
}
