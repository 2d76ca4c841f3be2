use tokio_postgres::Row;
use ubrc20_postgres::FromPgRow;

pub const CONTRACT_STATUS_ACTIVE: &str = "active";
pub const CONTRACT_STATUS_CLOSED: &str = "closed";
pub const CONTRACT_STATUS_EXPIRED: &str = "expired";

/// Base record for Taproot-based contract extensions. Immutable once active
/// except for status and closure metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct DbExtendedContract {
    pub script_address: String,
    pub initiator_address: String,
    pub status: String,
    pub timelock_delay: i64,
    pub initial_amount: Option<String>,
    pub creation_txid: String,
    pub creation_height: i64,
    pub creation_timestamp: i64,
    pub closure_txid: Option<String>,
    pub closure_height: Option<i64>,
    pub closure_timestamp: Option<i64>,
    /// JSON blob for extension-specific data.
    pub extension_data: Option<String>,
}

impl FromPgRow for DbExtendedContract {
    fn from_pg_row(row: &Row) -> Self {
        DbExtendedContract {
            script_address: row.get("script_address"),
            initiator_address: row.get("initiator_address"),
            status: row.get("status"),
            timelock_delay: row.get("timelock_delay"),
            initial_amount: row.get("initial_amount"),
            creation_txid: row.get("creation_txid"),
            creation_height: row.get("creation_height"),
            creation_timestamp: row.get("creation_timestamp"),
            closure_txid: row.get("closure_txid"),
            closure_height: row.get("closure_height"),
            closure_timestamp: row.get("closure_timestamp"),
            extension_data: row.get("extension_data"),
        }
    }
}
