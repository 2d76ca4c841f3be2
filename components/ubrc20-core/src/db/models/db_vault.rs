use tokio_postgres::Row;
use ubrc20_postgres::FromPgRow;

pub const VAULT_STATUS_ACTIVE: &str = "active";
pub const VAULT_STATUS_ABANDONED: &str = "abandoned";
pub const VAULT_STATUS_RECYCLED: &str = "recycled";
pub const VAULT_STATUS_SOVEREIGN_RECOVERY: &str = "sovereign_recovery";
pub const VAULT_STATUS_CLOSED: &str = "closed";

/// On-chain state of a sovereign vault. Each row is a cryptographic
/// contract: the vault cannot exist without its proof commitment, and the
/// indexer decrements `remaining_blocks` on every new block until closure
/// or abandonment.
#[derive(Debug, Clone, PartialEq)]
pub struct DbVault {
    /// Taproot address encoding the contract's spend paths.
    pub p2tr_address: String,
    pub owner_address: String,
    pub collateral_sats: i64,
    /// Total liquidation timelock, in blocks, fixed at reveal.
    pub timelock_blocks: i64,
    /// Liquidation countdown. Reaching 0 flips the status to abandoned.
    pub remaining_blocks: Option<i64>,
    /// Hash of the proof from the reveal witness.
    pub w_proof_commitment: String,
    pub status: String,
    pub reveal_txid: String,
    pub reveal_height: i64,
    pub reveal_timestamp: i64,
    pub closing_txid: Option<String>,
    pub closing_height: Option<i64>,
    pub closing_timestamp: Option<i64>,
}

impl FromPgRow for DbVault {
    fn from_pg_row(row: &Row) -> Self {
        DbVault {
            p2tr_address: row.get("p2tr_address"),
            owner_address: row.get("owner_address"),
            collateral_sats: row.get("collateral_sats"),
            timelock_blocks: row.get("timelock_blocks"),
            remaining_blocks: row.get("remaining_blocks"),
            w_proof_commitment: row.get("w_proof_commitment"),
            status: row.get("status"),
            reveal_txid: row.get("reveal_txid"),
            reveal_height: row.get("reveal_height"),
            reveal_timestamp: row.get("reveal_timestamp"),
            closing_txid: row.get("closing_txid"),
            closing_height: row.get("closing_height"),
            closing_timestamp: row.get("closing_timestamp"),
        }
    }
}
