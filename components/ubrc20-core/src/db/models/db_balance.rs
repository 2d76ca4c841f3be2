use tokio_postgres::Row;
use ubrc20_postgres::FromPgRow;

/// A `(address, ticker)` balance row. Absent rows mean a zero balance; rows
/// are created lazily on first credit and never deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct DbBalance {
    pub address: String,
    pub ticker: String,
    pub balance: String,
}

impl FromPgRow for DbBalance {
    fn from_pg_row(row: &Row) -> Self {
        DbBalance {
            address: row.get("address"),
            ticker: row.get("ticker"),
            balance: row.get("balance"),
        }
    }
}
