use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use orcabot_core::config::DatabaseConfig;

pub type DbPool = sqlx::SqlitePool;

/// How long a connection waits on a locked database before giving up. Webhook
/// turns for different leads share the file, so contention is expected.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Opens the conversation-store pool with the settings from `[database]`.
pub async fn connect(settings: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&settings.url, settings.max_connections, settings.timeout_secs).await
}

/// WAL so concurrent turns read while one writes; foreign keys on so message
/// and quote rows cannot outlive their lead.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(BUSY_TIMEOUT);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .connect_with(options)
        .await
}

#[cfg(test)]
mod tests {
    use orcabot_core::config::DatabaseConfig;

    use super::connect;

    #[tokio::test]
    async fn pool_enforces_foreign_keys() {
        let settings = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_secs: 5,
        };
        let pool = connect(&settings).await.expect("pool should connect");

        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .expect("pragma query");
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn zero_connection_settings_are_clamped_to_a_working_pool() {
        let settings = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 0,
            timeout_secs: 0,
        };
        let pool = connect(&settings).await.expect("pool should connect");

        let one: i64 =
            sqlx::query_scalar("SELECT 1").fetch_one(&pool).await.expect("probe query");
        assert_eq!(one, 1);
    }
}
