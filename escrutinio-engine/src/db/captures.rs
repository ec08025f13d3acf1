//! E-14 capture persistence

use crate::models::{CandidateVote, CaptureStatus, E14Capture, OcrResult};
use escrutinio_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Insert a new capture in `captured` state together with its
/// per-candidate vote rows from the OCR result.
pub async fn insert_capture(
    pool: &SqlitePool,
    polling_table_id: i64,
    election_type_id: i64,
    image_ref: &str,
    ocr: &OcrResult,
    captured_by: i64,
    captured_at: &str,
) -> Result<i64> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "INSERT INTO e14_captures \
         (polling_table_id, election_type_id, image_ref, blank_votes, null_votes, \
          unmarked_ballots, status, needs_manual_entry, ocr_confidence, \
          captured_by, captured_at) \
         VALUES (?, ?, ?, ?, ?, ?, 'captured', ?, ?, ?, ?)",
    )
    .bind(polling_table_id)
    .bind(election_type_id)
    .bind(image_ref)
    .bind(ocr.specials.blank)
    .bind(ocr.specials.null)
    .bind(ocr.specials.unmarked)
    .bind(ocr.needs_manual_entry as i64)
    .bind(ocr.confidence)
    .bind(captured_by)
    .bind(captured_at)
    .execute(&mut *tx)
    .await?;

    let capture_id = result.last_insert_rowid();

    for candidate in &ocr.candidates {
        sqlx::query(
            "INSERT INTO e14_candidate_votes \
             (capture_id, candidate_label, party_label, ballot_number, votes, ocr_confidence) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(capture_id)
        .bind(&candidate.candidate_identifier)
        .bind(&candidate.party_label)
        .bind(candidate.ballot_number)
        .bind(candidate.votes)
        .bind(candidate.confidence)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(capture_id)
}

pub async fn load_capture(pool: &SqlitePool, id: i64) -> Result<Option<E14Capture>> {
    let row = sqlx::query(
        "SELECT id, polling_table_id, election_type_id, image_ref, blank_votes, \
                null_votes, unmarked_ballots, observations, status, needs_manual_entry, \
                ocr_confidence, captured_by, captured_at, confirmed_by, confirmed_at, \
                superseded_at, supersede_reason \
         FROM e14_captures WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(capture_from_row).transpose()
}

/// The unique confirmed capture for (table, election type), if any
pub async fn load_confirmed_capture(
    pool: &SqlitePool,
    polling_table_id: i64,
    election_type_id: i64,
) -> Result<Option<E14Capture>> {
    let row = sqlx::query(
        "SELECT id, polling_table_id, election_type_id, image_ref, blank_votes, \
                null_votes, unmarked_ballots, observations, status, needs_manual_entry, \
                ocr_confidence, captured_by, captured_at, confirmed_by, confirmed_at, \
                superseded_at, supersede_reason \
         FROM e14_captures \
         WHERE polling_table_id = ? AND election_type_id = ? AND status = 'confirmed'",
    )
    .bind(polling_table_id)
    .bind(election_type_id)
    .fetch_optional(pool)
    .await?;

    row.map(capture_from_row).transpose()
}

pub async fn candidate_votes(pool: &SqlitePool, capture_id: i64) -> Result<Vec<CandidateVote>> {
    let rows = sqlx::query(
        "SELECT id, capture_id, candidate_label, party_label, ballot_number, votes, ocr_confidence \
         FROM e14_candidate_votes WHERE capture_id = ? ORDER BY id",
    )
    .bind(capture_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| CandidateVote {
            id: row.get("id"),
            capture_id: row.get("capture_id"),
            candidate_label: row.get("candidate_label"),
            party_label: row.get("party_label"),
            ballot_number: row.get("ballot_number"),
            votes: row.get("votes"),
            ocr_confidence: row.get("ocr_confidence"),
        })
        .collect())
}

/// Sum of the capture's per-candidate votes
pub async fn candidate_vote_sum(pool: &SqlitePool, capture_id: i64) -> Result<i64> {
    let row = sqlx::query(
        "SELECT COALESCE(SUM(votes), 0) AS total FROM e14_candidate_votes WHERE capture_id = ?",
    )
    .bind(capture_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get("total"))
}

pub async fn update_special_votes(
    pool: &SqlitePool,
    capture_id: i64,
    blank: Option<i64>,
    null: Option<i64>,
    unmarked: Option<i64>,
    observations: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "UPDATE e14_captures SET \
             blank_votes = COALESCE(?, blank_votes), \
             null_votes = COALESCE(?, null_votes), \
             unmarked_ballots = COALESCE(?, unmarked_ballots), \
             observations = COALESCE(?, observations) \
         WHERE id = ?",
    )
    .bind(blank)
    .bind(null)
    .bind(unmarked)
    .bind(observations)
    .bind(capture_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_candidate_vote(
    pool: &SqlitePool,
    capture_id: i64,
    vote_row_id: i64,
    votes: i64,
) -> Result<()> {
    let result = sqlx::query("UPDATE e14_candidate_votes SET votes = ? WHERE id = ? AND capture_id = ?")
        .bind(votes)
        .bind(vote_row_id)
        .bind(capture_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::InvalidInput(format!(
            "capture {} has no candidate vote row {}",
            capture_id, vote_row_id
        )));
    }
    Ok(())
}

/// Transition a capture to `confirmed`. The partial unique index is the
/// final arbiter under concurrent confirms.
pub async fn mark_confirmed(
    pool: &SqlitePool,
    capture: &E14Capture,
    confirmed_by: i64,
    confirmed_at: &str,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE e14_captures SET status = 'confirmed', confirmed_by = ?, confirmed_at = ? \
         WHERE id = ? AND status = 'captured'",
    )
    .bind(confirmed_by)
    .bind(confirmed_at)
    .bind(capture.id)
    .execute(pool)
    .await;

    match result {
        Ok(done) if done.rows_affected() == 1 => Ok(()),
        Ok(_) => Err(Error::AlreadyConfirmed(capture.id)),
        Err(e) if super::reference::is_unique_violation(&e, "ux_e14_confirmed") => {
            Err(Error::DuplicateConfirmedCapture {
                table_id: capture.polling_table_id,
                election_type_id: capture.election_type_id,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Mark a confirmed capture superseded, freeing the confirmed slot
pub async fn mark_superseded(
    pool: &SqlitePool,
    capture_id: i64,
    reason: &str,
    superseded_at: &str,
) -> Result<()> {
    sqlx::query(
        "UPDATE e14_captures SET status = 'superseded', supersede_reason = ?, superseded_at = ? \
         WHERE id = ?",
    )
    .bind(reason)
    .bind(superseded_at)
    .bind(capture_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Confirmed captures whose polling table no longer exists. Should be
/// empty under foreign keys; a non-empty result is an integrity fault.
pub async fn orphaned_confirmed_captures(
    pool: &SqlitePool,
    election_type_id: i64,
) -> Result<Vec<i64>> {
    let rows = sqlx::query(
        "SELECT c.id FROM e14_captures c \
         LEFT JOIN polling_tables pt ON c.polling_table_id = pt.id \
         WHERE c.election_type_id = ? AND c.status = 'confirmed' AND pt.id IS NULL",
    )
    .bind(election_type_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|row| row.get("id")).collect())
}

fn capture_from_row(row: sqlx::sqlite::SqliteRow) -> Result<E14Capture> {
    let status_str: String = row.get("status");
    let status = CaptureStatus::parse(&status_str).ok_or_else(|| {
        Error::DataIntegrityViolation(format!(
            "capture {} has unknown status '{}'",
            row.get::<i64, _>("id"),
            status_str
        ))
    })?;
    Ok(E14Capture {
        id: row.get("id"),
        polling_table_id: row.get("polling_table_id"),
        election_type_id: row.get("election_type_id"),
        image_ref: row.get("image_ref"),
        blank_votes: row.get("blank_votes"),
        null_votes: row.get("null_votes"),
        unmarked_ballots: row.get("unmarked_ballots"),
        observations: row.get("observations"),
        status,
        needs_manual_entry: row.get::<i64, _>("needs_manual_entry") != 0,
        ocr_confidence: row.get("ocr_confidence"),
        captured_by: row.get("captured_by"),
        captured_at: row.get("captured_at"),
        confirmed_by: row.get("confirmed_by"),
        confirmed_at: row.get("confirmed_at"),
        superseded_at: row.get("superseded_at"),
        supersede_reason: row.get("supersede_reason"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::reference;
    use crate::models::{RecognizedCandidate, SpecialVotes};
    use escrutinio_common::db::init_schema;

    async fn setup() -> (SqlitePool, i64, i64) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        let mun = reference::insert_municipality(&pool, "Florencia", None).await.unwrap();
        let place = reference::insert_polling_place(&pool, mun, "Colegio Central", None)
            .await
            .unwrap();
        let table = reference::insert_polling_table(&pool, place, 1, 300).await.unwrap();
        let etype = reference::insert_election_type(&pool, "Senado", "senate").await.unwrap();
        (pool, table, etype)
    }

    fn ocr_with_votes(votes: &[i64]) -> OcrResult {
        OcrResult {
            candidates: votes
                .iter()
                .enumerate()
                .map(|(i, &v)| RecognizedCandidate {
                    candidate_identifier: format!("CANDIDATO {}", i + 1),
                    party_label: None,
                    ballot_number: Some(i as i64 + 1),
                    votes: v,
                    confidence: None,
                })
                .collect(),
            specials: SpecialVotes {
                blank: 1,
                null: 2,
                unmarked: 0,
            },
            confidence: 0.6,
            needs_manual_entry: false,
        }
    }

    #[tokio::test]
    async fn test_insert_and_load_capture_with_votes() {
        let (pool, table, etype) = setup().await;
        let id = insert_capture(
            &pool,
            table,
            etype,
            "uploads/e14/mesa1.jpg",
            &ocr_with_votes(&[10, 20]),
            7,
            "2026-03-08T09:00:00Z",
        )
        .await
        .unwrap();

        let capture = load_capture(&pool, id).await.unwrap().unwrap();
        assert_eq!(capture.status, CaptureStatus::Captured);
        assert_eq!(capture.blank_votes, 1);
        assert_eq!(capture.null_votes, 2);

        let votes = candidate_votes(&pool, id).await.unwrap();
        assert_eq!(votes.len(), 2);
        assert_eq!(candidate_vote_sum(&pool, id).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_confirm_then_duplicate_confirm_hits_index() {
        let (pool, table, etype) = setup().await;
        let first = insert_capture(&pool, table, etype, "a.jpg", &ocr_with_votes(&[5]), 1, "t")
            .await
            .unwrap();
        let second = insert_capture(&pool, table, etype, "b.jpg", &ocr_with_votes(&[6]), 1, "t")
            .await
            .unwrap();

        let capture1 = load_capture(&pool, first).await.unwrap().unwrap();
        mark_confirmed(&pool, &capture1, 1, "t1").await.unwrap();

        let capture2 = load_capture(&pool, second).await.unwrap().unwrap();
        let err = mark_confirmed(&pool, &capture2, 1, "t2").await.unwrap_err();
        assert_eq!(err.kind(), "DUPLICATE_CONFIRMED_CAPTURE");

        // Superseding the first frees the slot
        mark_superseded(&pool, first, "re-capture after photo retake", "t3")
            .await
            .unwrap();
        mark_confirmed(&pool, &capture2, 1, "t4").await.unwrap();

        let confirmed = load_confirmed_capture(&pool, table, etype).await.unwrap().unwrap();
        assert_eq!(confirmed.id, second);
    }

    #[tokio::test]
    async fn test_confirming_twice_reports_already_confirmed() {
        let (pool, table, etype) = setup().await;
        let id = insert_capture(&pool, table, etype, "a.jpg", &ocr_with_votes(&[5]), 1, "t")
            .await
            .unwrap();
        let capture = load_capture(&pool, id).await.unwrap().unwrap();
        mark_confirmed(&pool, &capture, 1, "t1").await.unwrap();
        let err = mark_confirmed(&pool, &capture, 1, "t2").await.unwrap_err();
        assert_eq!(err.kind(), "ALREADY_CONFIRMED");
    }

    #[tokio::test]
    async fn test_update_candidate_vote_requires_matching_row() {
        let (pool, table, etype) = setup().await;
        let id = insert_capture(&pool, table, etype, "a.jpg", &ocr_with_votes(&[5]), 1, "t")
            .await
            .unwrap();
        let votes = candidate_votes(&pool, id).await.unwrap();
        update_candidate_vote(&pool, id, votes[0].id, 9).await.unwrap();
        assert_eq!(candidate_vote_sum(&pool, id).await.unwrap(), 9);

        let err = update_candidate_vote(&pool, id, 9999, 1).await.unwrap_err();
        assert_eq!(err.kind(), "INVALID_INPUT");
    }
}
