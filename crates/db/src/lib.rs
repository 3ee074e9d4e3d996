//! Postgres persistence for channels and scheduled posts.

pub mod models;
pub mod queries;
mod store;

pub use store::PgStore;

/// Applies the bundled migrations.
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
