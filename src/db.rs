//! Database module
//!
//! Database connection and schema utilities.

use sqlx::PgPool;

/// Tables created by `migrations/0001_unit_ledger.sql`
pub const REQUIRED_TABLES: [&str; 5] = [
    "fee_catalog",
    "service_records",
    "cash_movements",
    "treasury_entries",
    "posting_outbox",
];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in REQUIRED_TABLES {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    tracing::info!(tables = REQUIRED_TABLES.len(), "Ledger schema verified");
    Ok(true)
}
