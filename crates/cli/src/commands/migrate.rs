//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! atelier-cli migrate
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)
//!
//! # Migration Files
//!
//! Storefront migrations live in `crates/storefront/migrations/`:
//! ```text
//! migrations/
//! └── 20261014000001_create_orders.sql
//! ```

use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;

/// Errors from running migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Resolve the storefront database URL from a variable lookup.
fn database_url(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, MigrationError> {
    lookup("STOREFRONT_DATABASE_URL")
        .or_else(|| lookup("DATABASE_URL"))
        .filter(|url| !url.trim().is_empty())
        .map(SecretString::from)
        .ok_or(MigrationError::MissingEnvVar("STOREFRONT_DATABASE_URL"))
}

/// Run storefront database migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing, the connection fails, or
/// a migration fails to apply.
pub async fn storefront() -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = database_url(|key| std::env::var(key).ok())?;

    tracing::info!("Connecting to storefront database...");
    let pool = PgPool::connect(database_url.expose_secret()).await?;

    tracing::info!("Running storefront migrations...");
    sqlx::migrate!("../storefront/migrations").run(&pool).await?;

    tracing::info!("Storefront migrations complete!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url_fallback() {
        let url = database_url(|key| (key == "DATABASE_URL").then(|| "postgres://x".to_string()));
        assert!(url.is_ok_and(|url| url.expose_secret() == "postgres://x"));

        let missing = database_url(|key| (key == "STOREFRONT_DATABASE_URL").then(String::new));
        assert!(matches!(
            missing,
            Err(MigrationError::MissingEnvVar("STOREFRONT_DATABASE_URL"))
        ));
    }
}
