use tokio_postgres::Row;
use ubrc20_postgres::FromPgRow;

/// One entry of the operation log. Every recognized data-output payload
/// produces exactly one row, valid or invalid; `ticker` and `amount` stay
/// null when the payload failed to parse.
#[derive(Debug, Clone, PartialEq)]
pub struct DbOperation {
    pub txid: String,
    pub vout_index: i64,
    pub operation: String,
    pub ticker: Option<String>,
    pub amount: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub block_height: i64,
    pub block_hash: String,
    pub tx_index: i64,
    pub timestamp: i64,
    pub is_valid: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub raw_op_return: String,
    pub parsed_json: Option<String>,
    pub is_marketplace: bool,
}

impl FromPgRow for DbOperation {
    fn from_pg_row(row: &Row) -> Self {
        DbOperation {
            txid: row.get("txid"),
            vout_index: row.get("vout_index"),
            operation: row.get("operation"),
            ticker: row.get("ticker"),
            amount: row.get("amount"),
            from_address: row.get("from_address"),
            to_address: row.get("to_address"),
            block_height: row.get("block_height"),
            block_hash: row.get("block_hash"),
            tx_index: row.get("tx_index"),
            timestamp: row.get("timestamp"),
            is_valid: row.get("is_valid"),
            error_code: row.get("error_code"),
            error_message: row.get("error_message"),
            raw_op_return: row.get("raw_op_return"),
            parsed_json: row.get("parsed_json"),
            is_marketplace: row.get("is_marketplace"),
        }
    }
}
