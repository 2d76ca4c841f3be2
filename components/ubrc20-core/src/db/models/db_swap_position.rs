use tokio_postgres::Row;
use ubrc20_postgres::FromPgRow;

pub const SWAP_STATUS_ACTIVE: &str = "active";
pub const SWAP_STATUS_EXPIRED: &str = "expired";
pub const SWAP_STATUS_CLOSED: &str = "closed";

/// A timelocked swap position created by a valid `swap.init`.
#[derive(Debug, Clone, PartialEq)]
pub struct DbSwapPosition {
    pub owner_address: String,
    /// Canonical pair id (alphabetical), e.g. `LOL-WTF`.
    pub pool_id: String,
    pub src_ticker: String,
    pub dst_ticker: String,
    pub amount_locked: String,
    pub lock_duration_blocks: i64,
    pub lock_start_height: i64,
    pub unlock_height: i64,
    pub status: String,
    pub init_txid: String,
    pub init_vout: i64,
}

impl FromPgRow for DbSwapPosition {
    fn from_pg_row(row: &Row) -> Self {
        DbSwapPosition {
            owner_address: row.get("owner_address"),
            pool_id: row.get("pool_id"),
            src_ticker: row.get("src_ticker"),
            dst_ticker: row.get("dst_ticker"),
            amount_locked: row.get("amount_locked"),
            lock_duration_blocks: row.get("lock_duration_blocks"),
            lock_start_height: row.get("lock_start_height"),
            unlock_height: row.get("unlock_height"),
            status: row.get("status"),
            init_txid: row.get("init_txid"),
            init_vout: row.get("init_vout"),
        }
    }
}
