use config::PgDatabaseConfig;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod, Transaction};
use tokio_postgres::{Client, Config, NoTls, Row};

/// Chunk size used when batching multi-row inserts into a single SQL statement. Sized so that
/// rows * columns stays well under the postgres limit of 65536 bound parameters per statement.
pub const BATCH_QUERY_CHUNK_SIZE: usize = 500;

/// SQL predicate reused by every supply aggregation: balances and operation amounts are stored as
/// canonical decimal strings, and only integer-shaped values may be cast to NUMERIC when summing.
pub const CANONICAL_AMOUNT_PREDICATE: &str = "~ '^[0-9]+$'";

fn pg_config_from(config: &PgDatabaseConfig) -> Config {
    let mut pg_config = Config::new();
    pg_config
        .dbname(&config.dbname)
        .host(&config.host)
        .port(config.port)
        .user(&config.user)
        .options(format!(
            "-csearch_path={}",
            config.search_path.as_deref().unwrap_or("public")
        ));
    if let Some(password) = &config.password {
        pg_config.password(password);
    }
    pg_config
}

/// Creates a Postgres connection pool for a single database config. Clients and transactions for
/// the indexer are then drawn from this pool.
pub fn pg_pool(config: &PgDatabaseConfig) -> Result<Pool, String> {
    let manager = Manager::from_config(
        pg_config_from(config),
        NoTls,
        ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        },
    );
    let mut pool_builder = Pool::builder(manager);
    if let Some(size) = config.pool_max_size {
        pool_builder = pool_builder.max_size(size);
    }
    pool_builder
        .build()
        .map_err(|e| format!("unable to build pg connection pool: {e}"))
}

/// Returns a new pg connection client taken from a pool.
pub async fn pg_pool_client(pool: &Pool) -> Result<Object, String> {
    pool.get()
        .await
        .map_err(|e| format!("unable to get pg client: {e}"))
}

/// Returns a new pg transaction on an existing pooled connection.
pub async fn pg_begin(client: &mut Object) -> Result<Transaction<'_>, String> {
    client
        .transaction()
        .await
        .map_err(|e| format!("unable to begin pg transaction: {e}"))
}

/// Connects to postgres directly (without a pool) and returns an open client.
pub async fn pg_connect(config: &PgDatabaseConfig) -> Result<Client, String> {
    match pg_config_from(config).connect(NoTls).await {
        Ok((client, connection)) => {
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    println!("postgres connection error: {e}");
                }
            });
            Ok(client)
        }
        Err(e) => Err(format!("error connecting to postgres: {e}")),
    }
}

/// Connects to postgres, retrying forever. Used at startup paths where the database may still be
/// coming up.
pub async fn pg_connect_with_retry(config: &PgDatabaseConfig) -> Client {
    loop {
        match pg_connect(config).await {
            Ok(client) => return client,
            Err(e) => {
                println!("error connecting to postgres: {e}");
                std::thread::sleep(std::time::Duration::from_secs(1));
            }
        }
    }
}

/// Transforms a Postgres row into a model struct.
pub trait FromPgRow {
    fn from_pg_row(row: &Row) -> Self;
}

#[cfg(test)]
mod test {
    use config::PgDatabaseConfig;

    use crate::{pg_begin, pg_pool, pg_pool_client};

    fn local_pg_config() -> PgDatabaseConfig {
        PgDatabaseConfig {
            dbname: "postgres".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: Some("postgres".to_string()),
            search_path: None,
            pool_max_size: None,
        }
    }

    #[tokio::test]
    async fn opens_pooled_connections_and_transactions() -> Result<(), String> {
        let pool = pg_pool(&local_pg_config())?;
        let mut client = pg_pool_client(&pool).await?;
        let transaction = pg_begin(&mut client).await?;
        let row = transaction
            .query_opt("SELECT 1 AS result", &[])
            .await
            .unwrap()
            .unwrap();
        let count: i32 = row.get("result");
        assert_eq!(1, count);
        transaction.commit().await.map_err(|e| e.to_string())?;
        Ok(())
    }
}
