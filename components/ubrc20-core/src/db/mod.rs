pub mod index_pg;
pub mod models;

use config::Config;
use ubrc20_postgres::pg_connect_with_retry;

use crate::try_info;
use crate::utils::Context;

pub async fn migrate_db(config: &Config, ctx: &Context) -> Result<(), String> {
    try_info!(ctx, "Running indexer DB migrations");
    let mut pg_client = pg_connect_with_retry(&config.db).await;
    index_pg::migrate(&mut pg_client).await?;
    Ok(())
}

#[cfg(test)]
pub fn pg_test_config() -> config::PgDatabaseConfig {
    config::PgDatabaseConfig {
        dbname: "postgres".to_string(),
        host: "localhost".to_string(),
        port: 5432,
        user: "postgres".to_string(),
        password: Some("postgres".to_string()),
        search_path: None,
        pool_max_size: None,
    }
}

#[cfg(test)]
pub fn pg_test_connection_pool() -> deadpool_postgres::Pool {
    ubrc20_postgres::pg_pool(&pg_test_config()).unwrap()
}

#[cfg(test)]
pub async fn pg_test_connection() -> tokio_postgres::Client {
    ubrc20_postgres::pg_connect(&pg_test_config()).await.unwrap()
}

#[cfg(test)]
pub async fn pg_test_clear_db(pg_client: &mut tokio_postgres::Client) {
    if let Err(e) = pg_client
        .batch_execute(
            "
            DO $$ DECLARE
                r RECORD;
            BEGIN
                FOR r IN (SELECT tablename FROM pg_tables WHERE schemaname = current_schema()) LOOP
                    EXECUTE 'DROP TABLE IF EXISTS ' || quote_ident(r.tablename) || ' CASCADE';
                END LOOP;
            END $$;",
        )
        .await
    {
        println!("error clearing test db: {e}");
        std::process::exit(1);
    };
}
