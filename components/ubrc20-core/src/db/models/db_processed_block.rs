use tokio_postgres::Row;
use ubrc20_postgres::FromPgRow;

/// Marker row inserted atomically with a block's operations. The `height`
/// primary key doubles as the concurrency guard between writers.
#[derive(Debug, Clone, PartialEq)]
pub struct DbProcessedBlock {
    pub height: i64,
    pub block_hash: String,
    pub timestamp: i64,
    pub tx_count: i64,
    pub operations_found: i64,
    pub operations_valid: i64,
}

impl FromPgRow for DbProcessedBlock {
    fn from_pg_row(row: &Row) -> Self {
        DbProcessedBlock {
            height: row.get("height"),
            block_hash: row.get("block_hash"),
            timestamp: row.get("timestamp"),
            tx_count: row.get("tx_count"),
            operations_found: row.get("operations_found"),
            operations_valid: row.get("operations_valid"),
        }
    }
}
