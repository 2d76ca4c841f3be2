use tokio_postgres::Row;
use ubrc20_postgres::FromPgRow;

/// A token deploy record. `remaining_supply` equals `max_supply` for
/// standard tokens and is adjusted by extensions that lock supply.
#[derive(Debug, Clone, PartialEq)]
pub struct DbDeploy {
    pub ticker: String,
    pub max_supply: String,
    pub remaining_supply: String,
    pub limit_per_op: Option<String>,
    pub deploy_txid: String,
    pub deploy_height: i64,
    pub deploy_timestamp: i64,
    pub deployer_address: Option<String>,
}

impl FromPgRow for DbDeploy {
    fn from_pg_row(row: &Row) -> Self {
        DbDeploy {
            ticker: row.get("ticker"),
            max_supply: row.get("max_supply"),
            remaining_supply: row.get("remaining_supply"),
            limit_per_op: row.get("limit_per_op"),
            deploy_txid: row.get("deploy_txid"),
            deploy_height: row.get("deploy_height"),
            deploy_timestamp: row.get("deploy_timestamp"),
            deployer_address: row.get("deployer_address"),
        }
    }
}
