use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Creates the document table and its recency index if they do not exist.
/// Ids use the C collation so `(created_at, id)` order is byte order.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            id         TEXT COLLATE "C" NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            data       JSONB NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS documents_recency_idx
            ON documents (collection, created_at DESC, id DESC)
        "#,
    )
    .execute(pool)
    .await?;

    info!("Document schema ready");
    Ok(())
}
