use tokio_postgres::Row;
use ubrc20_postgres::FromPgRow;

/// Cached verdict from the legacy token oracle for a ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct DbLegacyToken {
    pub ticker: String,
    pub max_supply: Option<String>,
    pub decimals: i64,
    pub limit_per_mint: Option<String>,
    pub deploy_inscription_id: Option<String>,
    pub block_height: i64,
    pub deployer_address: Option<String>,
    pub is_active: bool,
}

impl FromPgRow for DbLegacyToken {
    fn from_pg_row(row: &Row) -> Self {
        DbLegacyToken {
            ticker: row.get("ticker"),
            max_supply: row.get("max_supply"),
            decimals: row.get("decimals"),
            limit_per_mint: row.get("limit_per_mint"),
            deploy_inscription_id: row.get("deploy_inscription_id"),
            block_height: row.get("block_height"),
            deployer_address: row.get("deployer_address"),
            is_active: row.get("is_active"),
        }
    }
}
