//! Append-only audit log
//!
//! Every mutating coordination operation leaves a row here. Failures
//! are logged and swallowed; the audit trail must never abort the
//! operation it describes.

use escrutinio_common::Result;
use sqlx::SqlitePool;

pub async fn record(
    pool: &SqlitePool,
    actor_id: i64,
    action: &str,
    entity_kind: Option<&str>,
    entity_id: Option<i64>,
    description: Option<&str>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO audit_log (actor_id, action, entity_kind, entity_id, description) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(actor_id)
    .bind(action)
    .bind(entity_kind)
    .bind(entity_id)
    .bind(description)
    .execute(pool)
    .await?;
    Ok(())
}

/// Best-effort variant used from service code paths
pub async fn record_lossy(
    pool: &SqlitePool,
    actor_id: i64,
    action: &str,
    entity_kind: &str,
    entity_id: i64,
    description: &str,
) {
    if let Err(e) = record(
        pool,
        actor_id,
        action,
        Some(entity_kind),
        Some(entity_id),
        Some(description),
    )
    .await
    {
        tracing::warn!("audit log write failed for action '{}': {}", action, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escrutinio_common::db::init_schema;
    use sqlx::Row;

    #[tokio::test]
    async fn test_record_appends_rows() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();

        record(&pool, 7, "start_consolidation", Some("consolidation"), Some(3), None)
            .await
            .unwrap();
        record_lossy(&pool, 7, "generate_e24", "consolidation", 3, "artifact rendered").await;

        let row = sqlx::query("SELECT COUNT(*) AS n FROM audit_log")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("n"), 2);
    }
}
