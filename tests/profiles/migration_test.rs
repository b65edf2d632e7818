//! Tests for `migrations/001_learners.sql` applying cleanly.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

async fn fresh_pool() -> SqlitePool {
    let opts = SqliteConnectOptions::new()
        .filename(":memory:")
        .create_if_missing(true);
    // In-memory databases are per-connection.
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await
        .expect("in-memory pool should connect")
}

async fn apply_schema(pool: &SqlitePool) {
    let schema = include_str!("../../migrations/001_learners.sql");
    sqlx::raw_sql(schema)
        .execute(pool)
        .await
        .expect("001 should apply");
}

#[tokio::test]
async fn migration_is_idempotent() {
    let pool = fresh_pool().await;
    apply_schema(&pool).await;
    apply_schema(&pool).await;
}

#[tokio::test]
async fn history_defaults_to_empty_array() {
    let pool = fresh_pool().await;
    apply_schema(&pool).await;

    sqlx::query("INSERT INTO learners (phone, created_at) VALUES ('+1555', '2024-01-01T00:00:00Z')")
        .execute(&pool)
        .await
        .expect("insert should succeed");

    let row: (String,) = sqlx::query_as("SELECT history FROM learners WHERE phone = '+1555'")
        .fetch_one(&pool)
        .await
        .expect("select should succeed");
    assert_eq!(row.0, "[]");
}

#[tokio::test]
async fn phone_is_unique() {
    let pool = fresh_pool().await;
    apply_schema(&pool).await;

    let insert = "INSERT INTO learners (phone, created_at) VALUES ('+1555', '2024-01-01T00:00:00Z')";
    sqlx::query(insert)
        .execute(&pool)
        .await
        .expect("first insert should succeed");
    let dup = sqlx::query(insert).execute(&pool).await;
    assert!(dup.is_err(), "duplicate phone must be rejected");
}
