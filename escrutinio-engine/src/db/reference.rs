//! Reference data operations
//!
//! Setup-time inserts and the lookups the pipeline needs. Reference
//! rows are read-only to the pipeline once loaded.

use crate::models::{
    Affiliation, Candidate, ElectionType, ElectoralProcess, Municipality, Party, PollingPlace,
    PollingTable, Witness,
};
use escrutinio_common::{Error, Result};
use sqlx::{Row, SqlitePool};

pub async fn insert_municipality(
    pool: &SqlitePool,
    name: &str,
    divipola_code: Option<&str>,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO municipalities (name, divipola_code) VALUES (?, ?)")
        .bind(name)
        .bind(divipola_code)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_polling_place(
    pool: &SqlitePool,
    municipality_id: i64,
    name: &str,
    address: Option<&str>,
) -> Result<i64> {
    let result =
        sqlx::query("INSERT INTO polling_places (municipality_id, name, address) VALUES (?, ?, ?)")
            .bind(municipality_id)
            .bind(name)
            .bind(address)
            .execute(pool)
            .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_polling_table(
    pool: &SqlitePool,
    polling_place_id: i64,
    table_number: i64,
    enrolled_voters: i64,
) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO polling_tables (polling_place_id, table_number, enrolled_voters) \
         VALUES (?, ?, ?)",
    )
    .bind(polling_place_id)
    .bind(table_number)
    .bind(enrolled_voters)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_election_type(pool: &SqlitePool, name: &str, code: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO election_types (name, code) VALUES (?, ?)")
        .bind(name)
        .bind(code)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_electoral_process(
    pool: &SqlitePool,
    name: &str,
    held_on: Option<&str>,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO electoral_processes (name, held_on) VALUES (?, ?)")
        .bind(name)
        .bind(held_on)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_party(
    pool: &SqlitePool,
    name: &str,
    abbreviation: Option<&str>,
) -> Result<i64> {
    let result = sqlx::query("INSERT INTO parties (name, abbreviation) VALUES (?, ?)")
        .bind(name)
        .bind(abbreviation)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Insert a candidate. A ballot-number collision within the election
/// type is rejected by the unique index and surfaced as a typed error.
pub async fn insert_candidate(pool: &SqlitePool, candidate: &NewCandidate<'_>) -> Result<i64> {
    let result = sqlx::query(
        "INSERT INTO candidates \
         (national_id, full_name, affiliation, party_id, coalition_name, \
          election_type_id, ballot_number) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(candidate.national_id)
    .bind(candidate.full_name)
    .bind(candidate.affiliation.as_str())
    .bind(candidate.party_id)
    .bind(candidate.coalition_name)
    .bind(candidate.election_type_id)
    .bind(candidate.ballot_number)
    .execute(pool)
    .await;

    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(e) if is_unique_violation(&e, "ux_candidates_ballot") => Err(Error::BallotNumberTaken {
            election_type_id: candidate.election_type_id,
            ballot_number: candidate.ballot_number,
        }),
        Err(e) => Err(e.into()),
    }
}

/// Candidate fields at insertion time
#[derive(Debug, Clone)]
pub struct NewCandidate<'a> {
    pub national_id: &'a str,
    pub full_name: &'a str,
    pub affiliation: Affiliation,
    pub party_id: Option<i64>,
    pub coalition_name: Option<&'a str>,
    pub election_type_id: i64,
    pub ballot_number: i64,
}

pub async fn insert_witness(
    pool: &SqlitePool,
    national_id: &str,
    full_name: &str,
    coordinator_id: Option<i64>,
) -> Result<i64> {
    let result =
        sqlx::query("INSERT INTO witnesses (national_id, full_name, coordinator_id) VALUES (?, ?, ?)")
            .bind(national_id)
            .bind(full_name)
            .bind(coordinator_id)
            .execute(pool)
            .await?;
    Ok(result.last_insert_rowid())
}

pub async fn load_municipality(pool: &SqlitePool, id: i64) -> Result<Option<Municipality>> {
    let row = sqlx::query("SELECT id, name, divipola_code, active FROM municipalities WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| Municipality {
        id: row.get("id"),
        name: row.get("name"),
        divipola_code: row.get("divipola_code"),
        active: row.get::<i64, _>("active") != 0,
    }))
}

pub async fn load_polling_table(pool: &SqlitePool, id: i64) -> Result<Option<PollingTable>> {
    let row = sqlx::query(
        "SELECT id, polling_place_id, table_number, enrolled_voters, active \
         FROM polling_tables WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(polling_table_from_row))
}

/// All active polling tables in a municipality, place by place
pub async fn polling_tables_in_municipality(
    pool: &SqlitePool,
    municipality_id: i64,
) -> Result<Vec<PollingTable>> {
    let rows = sqlx::query(
        "SELECT pt.id, pt.polling_place_id, pt.table_number, pt.enrolled_voters, pt.active \
         FROM polling_tables pt \
         JOIN polling_places pp ON pt.polling_place_id = pp.id \
         WHERE pp.municipality_id = ? AND pt.active = 1 \
         ORDER BY pp.name, pt.table_number",
    )
    .bind(municipality_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(polling_table_from_row).collect())
}

pub async fn count_active_tables(pool: &SqlitePool, municipality_id: i64) -> Result<i64> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS n FROM polling_tables pt \
         JOIN polling_places pp ON pt.polling_place_id = pp.id \
         WHERE pp.municipality_id = ? AND pt.active = 1",
    )
    .bind(municipality_id)
    .fetch_one(pool)
    .await?;
    Ok(row.get("n"))
}

pub async fn load_polling_place(pool: &SqlitePool, id: i64) -> Result<Option<PollingPlace>> {
    let row = sqlx::query(
        "SELECT id, municipality_id, name, address, active FROM polling_places WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| PollingPlace {
        id: row.get("id"),
        municipality_id: row.get("municipality_id"),
        name: row.get("name"),
        address: row.get("address"),
        active: row.get::<i64, _>("active") != 0,
    }))
}

pub async fn load_election_type(pool: &SqlitePool, id: i64) -> Result<Option<ElectionType>> {
    let row = sqlx::query("SELECT id, name, code, active FROM election_types WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| ElectionType {
        id: row.get("id"),
        name: row.get("name"),
        code: row.get("code"),
        active: row.get::<i64, _>("active") != 0,
    }))
}

pub async fn load_electoral_process(
    pool: &SqlitePool,
    id: i64,
) -> Result<Option<ElectoralProcess>> {
    let row =
        sqlx::query("SELECT id, name, held_on, status, active FROM electoral_processes WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|row| ElectoralProcess {
        id: row.get("id"),
        name: row.get("name"),
        held_on: row.get("held_on"),
        status: row.get("status"),
        active: row.get::<i64, _>("active") != 0,
    }))
}

pub async fn load_party(pool: &SqlitePool, id: i64) -> Result<Option<Party>> {
    let row = sqlx::query("SELECT id, name, abbreviation, active FROM parties WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|row| Party {
        id: row.get("id"),
        name: row.get("name"),
        abbreviation: row.get("abbreviation"),
        active: row.get::<i64, _>("active") != 0,
    }))
}

/// Active candidates for an election type in ballot order
pub async fn candidates_for_election_type(
    pool: &SqlitePool,
    election_type_id: i64,
) -> Result<Vec<Candidate>> {
    let rows = sqlx::query(
        "SELECT id, national_id, full_name, affiliation, party_id, coalition_name, \
                election_type_id, ballot_number, active \
         FROM candidates \
         WHERE election_type_id = ? AND active = 1 \
         ORDER BY ballot_number",
    )
    .bind(election_type_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let affiliation_str: String = row.get("affiliation");
            let affiliation = Affiliation::parse(&affiliation_str).ok_or_else(|| {
                Error::DataIntegrityViolation(format!(
                    "candidate {} has unknown affiliation '{}'",
                    row.get::<i64, _>("id"),
                    affiliation_str
                ))
            })?;
            Ok(Candidate {
                id: row.get("id"),
                national_id: row.get("national_id"),
                full_name: row.get("full_name"),
                affiliation,
                party_id: row.get("party_id"),
                coalition_name: row.get("coalition_name"),
                election_type_id: row.get("election_type_id"),
                ballot_number: row.get("ballot_number"),
                active: row.get::<i64, _>("active") != 0,
            })
        })
        .collect()
}

pub async fn load_witness(pool: &SqlitePool, id: i64) -> Result<Option<Witness>> {
    let row = sqlx::query(
        "SELECT id, national_id, full_name, coordinator_id, active FROM witnesses WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| Witness {
        id: row.get("id"),
        national_id: row.get("national_id"),
        full_name: row.get("full_name"),
        coordinator_id: row.get("coordinator_id"),
        active: row.get::<i64, _>("active") != 0,
    }))
}

fn polling_table_from_row(row: sqlx::sqlite::SqliteRow) -> PollingTable {
    PollingTable {
        id: row.get("id"),
        polling_place_id: row.get("polling_place_id"),
        table_number: row.get("table_number"),
        enrolled_voters: row.get("enrolled_voters"),
        active: row.get::<i64, _>("active") != 0,
    }
}

/// True when the sqlx error is a UNIQUE violation on the named index.
/// SQLite reports the column list rather than the index name, so fall
/// back to matching the generic unique-constraint message.
pub(crate) fn is_unique_violation(error: &sqlx::Error, index_hint: &str) -> bool {
    match error {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            message.contains("UNIQUE constraint failed") || message.contains(index_hint)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrutinio_common::db::init_schema;

    async fn pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_geography_inserts_and_lookups() {
        let pool = pool().await;
        let mun = insert_municipality(&pool, "Florencia", Some("18001")).await.unwrap();
        let place = insert_polling_place(&pool, mun, "Colegio Central", None).await.unwrap();
        let t1 = insert_polling_table(&pool, place, 1, 350).await.unwrap();
        insert_polling_table(&pool, place, 2, 400).await.unwrap();

        let table = load_polling_table(&pool, t1).await.unwrap().unwrap();
        assert_eq!(table.table_number, 1);
        assert_eq!(table.enrolled_voters, 350);

        let tables = polling_tables_in_municipality(&pool, mun).await.unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(count_active_tables(&pool, mun).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ballot_number_collision_is_rejected() {
        let pool = pool().await;
        let etype = insert_election_type(&pool, "Senado", "senate").await.unwrap();
        let party = insert_party(&pool, "Partido Liberal", Some("PL")).await.unwrap();

        insert_candidate(
            &pool,
            &NewCandidate {
                national_id: "111",
                full_name: "Juan Pérez",
                affiliation: Affiliation::Party,
                party_id: Some(party),
                coalition_name: None,
                election_type_id: etype,
                ballot_number: 1,
            },
        )
        .await
        .unwrap();

        let err = insert_candidate(
            &pool,
            &NewCandidate {
                national_id: "222",
                full_name: "María López",
                affiliation: Affiliation::Independent,
                party_id: None,
                coalition_name: None,
                election_type_id: etype,
                ballot_number: 1,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "BALLOT_NUMBER_TAKEN");

        // Same ballot number under a different election type is fine
        let other = insert_election_type(&pool, "Cámara", "house").await.unwrap();
        insert_candidate(
            &pool,
            &NewCandidate {
                national_id: "333",
                full_name: "Carlos Ramírez",
                affiliation: Affiliation::Party,
                party_id: Some(party),
                coalition_name: None,
                election_type_id: other,
                ballot_number: 1,
            },
        )
        .await
        .unwrap();

        let senate = candidates_for_election_type(&pool, etype).await.unwrap();
        assert_eq!(senate.len(), 1);
        assert_eq!(senate[0].full_name, "Juan Pérez");
    }
}
