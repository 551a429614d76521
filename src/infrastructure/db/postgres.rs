use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, warn};

const CONNECT_ATTEMPTS: u32 = 6;
const FIRST_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Connects to Postgres, retrying with doubling delays while the server is
/// unreachable. A malformed URL fails on the first attempt.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let options = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5));
    let mut delay = FIRST_RETRY_DELAY;
    let mut attempt = 1;

    loop {
        match options.clone().connect(database_url).await {
            Ok(pool) => {
                info!(attempt, max_connections, "Picture store connected");
                return Ok(pool);
            }
            Err(e @ sqlx::Error::Configuration(_)) => return Err(e),
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!(attempt, retry_in = ?delay, "Picture store unreachable: {}", e);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Applies the embedded migrations in `./migrations`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied.");
    Ok(())
}
