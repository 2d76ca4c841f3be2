//! Postgres reads and writes for the indexer.
//!
//! All amount columns hold canonical decimal strings; aggregates cast them
//! through NUMERIC behind the integer-shape predicate so a corrupted value
//! can never poison a supply sum. Multi-row writes are chunked to respect
//! the statement parameter limit.

use deadpool_postgres::GenericClient;
use refinery::embed_migrations;
use tokio_postgres::types::ToSql;
use tokio_postgres::Client;
use ubrc20_postgres::{FromPgRow, BATCH_QUERY_CHUNK_SIZE, CANONICAL_AMOUNT_PREDICATE};

use crate::core::fold_ticker;

use super::models::{
    DbDeploy, DbExtendedContract, DbLegacyToken, DbOperation, DbProcessedBlock, DbSwapPosition,
    DbVault,
};

embed_migrations!("../../migrations/ubrc20");

pub async fn migrate(pg_client: &mut Client) -> Result<(), String> {
    match migrations::runner()
        .set_migration_table_name("pgmigrations")
        .run_async(pg_client)
        .await
    {
        Ok(_) => Ok(()),
        Err(e) => Err(format!("Error running pg migrations: {e}")),
    }
}

fn values_params_str(rows: usize, columns: usize) -> String {
    let mut arg_num = 1;
    let mut arg_str = String::new();
    for _ in 0..rows {
        arg_str.push('(');
        for i in 0..columns {
            arg_str.push_str(format!("${},", arg_num + i).as_str());
        }
        arg_str.pop();
        arg_str.push_str("),");
        arg_num += columns;
    }
    arg_str.pop();
    arg_str
}

pub async fn get_deploy<T: GenericClient>(
    tick: &str,
    client: &T,
) -> Result<Option<DbDeploy>, String> {
    let row = client
        .query_opt(
            "SELECT * FROM deploys WHERE ticker = $1",
            &[&fold_ticker(tick)],
        )
        .await
        .map_err(|e| format!("get_deploy: {e}"))?;
    Ok(row.as_ref().map(DbDeploy::from_pg_row))
}

pub async fn get_balance<T: GenericClient>(
    address: &str,
    tick: &str,
    client: &T,
) -> Result<Option<String>, String> {
    let row = client
        .query_opt(
            "SELECT balance FROM balances WHERE address = $1 AND ticker = $2",
            &[&address, &fold_ticker(tick)],
        )
        .await
        .map_err(|e| format!("get_balance: {e}"))?;
    Ok(row.map(|row| row.get("balance")))
}

/// Sum of all valid mint amounts for a ticker. Only counts rows whose
/// amount passes the canonical integer predicate.
pub async fn get_total_minted<T: GenericClient>(
    tick: &str,
    client: &T,
) -> Result<Option<String>, String> {
    let row = client
        .query_one(
            &format!(
                "SELECT COALESCE(SUM(CAST(amount AS NUMERIC)), 0)::TEXT AS total
                FROM operations
                WHERE ticker = $1 AND operation = 'mint' AND is_valid = TRUE
                AND amount {CANONICAL_AMOUNT_PREDICATE}"
            ),
            &[&fold_ticker(tick)],
        )
        .await
        .map_err(|e| format!("get_total_minted: {e}"))?;
    Ok(Some(row.get("total")))
}

/// Sum of all balances held for a ticker.
pub async fn get_current_supply<T: GenericClient>(
    tick: &str,
    client: &T,
) -> Result<String, String> {
    let row = client
        .query_one(
            &format!(
                "SELECT COALESCE(SUM(CAST(balance AS NUMERIC)), 0)::TEXT AS total
                FROM balances
                WHERE ticker = $1 AND balance {CANONICAL_AMOUNT_PREDICATE}"
            ),
            &[&fold_ticker(tick)],
        )
        .await
        .map_err(|e| format!("get_current_supply: {e}"))?;
    Ok(row.get("total"))
}

pub async fn get_processed_block<T: GenericClient>(
    height: u64,
    client: &T,
) -> Result<Option<DbProcessedBlock>, String> {
    let row = client
        .query_opt(
            "SELECT * FROM processed_blocks WHERE height = $1",
            &[&(height as i64)],
        )
        .await
        .map_err(|e| format!("get_processed_block: {e}"))?;
    Ok(row.as_ref().map(DbProcessedBlock::from_pg_row))
}

pub async fn get_chain_tip_block_height<T: GenericClient>(
    client: &T,
) -> Result<Option<u64>, String> {
    let row = client
        .query_one("SELECT MAX(height) AS tip FROM processed_blocks", &[])
        .await
        .map_err(|e| format!("get_chain_tip_block_height: {e}"))?;
    let tip: Option<i64> = row.get("tip");
    Ok(tip.map(|tip| tip as u64))
}

#[derive(Debug, PartialEq, Eq)]
pub enum ProcessedBlockInsert {
    Inserted,
    /// A row already exists at this height. The reorg controller decides
    /// between a duplicate commit and a chain reorganization. Signaled
    /// through the primary key so that concurrent writers cannot both land
    /// the same height; `ON CONFLICT DO NOTHING` keeps the surrounding
    /// transaction usable for the follow-up hash comparison.
    UniqueViolation,
}

pub async fn insert_processed_block<T: GenericClient>(
    block: &DbProcessedBlock,
    client: &T,
) -> Result<ProcessedBlockInsert, String> {
    let inserted = client
        .execute(
            "INSERT INTO processed_blocks
            (height, block_hash, timestamp, tx_count, operations_found, operations_valid)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (height) DO NOTHING",
            &[
                &block.height,
                &block.block_hash,
                &block.timestamp,
                &block.tx_count,
                &block.operations_found,
                &block.operations_valid,
            ],
        )
        .await
        .map_err(|e| format!("insert_processed_block: {e}"))?;
    if inserted == 0 {
        return Ok(ProcessedBlockInsert::UniqueViolation);
    }
    Ok(ProcessedBlockInsert::Inserted)
}

pub async fn insert_operations<T: GenericClient>(
    operations: &[DbOperation],
    client: &T,
) -> Result<(), String> {
    for chunk in operations.chunks(BATCH_QUERY_CHUNK_SIZE) {
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![];
        for row in chunk.iter() {
            params.push(&row.txid);
            params.push(&row.vout_index);
            params.push(&row.operation);
            params.push(&row.ticker);
            params.push(&row.amount);
            params.push(&row.from_address);
            params.push(&row.to_address);
            params.push(&row.block_height);
            params.push(&row.block_hash);
            params.push(&row.tx_index);
            params.push(&row.timestamp);
            params.push(&row.is_valid);
            params.push(&row.error_code);
            params.push(&row.error_message);
            params.push(&row.raw_op_return);
            params.push(&row.parsed_json);
            params.push(&row.is_marketplace);
        }
        client
            .query(
                &format!(
                    "INSERT INTO operations
                    (txid, vout_index, operation, ticker, amount, from_address, to_address,
                    block_height, block_hash, tx_index, timestamp, is_valid, error_code,
                    error_message, raw_op_return, parsed_json, is_marketplace)
                    VALUES {}
                    ON CONFLICT (txid, vout_index) DO NOTHING",
                    values_params_str(chunk.len(), 17)
                ),
                &params,
            )
            .await
            .map_err(|e| format!("insert_operations: {e}"))?;
    }
    Ok(())
}

pub async fn get_operations_at_height<T: GenericClient>(
    height: u64,
    client: &T,
) -> Result<Vec<DbOperation>, String> {
    let rows = client
        .query(
            "SELECT * FROM operations WHERE block_height = $1 ORDER BY tx_index ASC, vout_index ASC",
            &[&(height as i64)],
        )
        .await
        .map_err(|e| format!("get_operations_at_height: {e}"))?;
    Ok(rows.iter().map(DbOperation::from_pg_row).collect())
}

pub async fn insert_deploys<T: GenericClient>(
    deploys: &[DbDeploy],
    client: &T,
) -> Result<(), String> {
    for chunk in deploys.chunks(BATCH_QUERY_CHUNK_SIZE) {
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![];
        for row in chunk.iter() {
            params.push(&row.ticker);
            params.push(&row.max_supply);
            params.push(&row.remaining_supply);
            params.push(&row.limit_per_op);
            params.push(&row.deploy_txid);
            params.push(&row.deploy_height);
            params.push(&row.deploy_timestamp);
            params.push(&row.deployer_address);
        }
        client
            .query(
                &format!(
                    "INSERT INTO deploys
                    (ticker, max_supply, remaining_supply, limit_per_op, deploy_txid,
                    deploy_height, deploy_timestamp, deployer_address)
                    VALUES {}
                    ON CONFLICT (ticker) DO NOTHING",
                    values_params_str(chunk.len(), 8)
                ),
                &params,
            )
            .await
            .map_err(|e| format!("insert_deploys: {e}"))?;
    }
    Ok(())
}

pub async fn update_deploy_remaining_supply<T: GenericClient>(
    tick: &str,
    remaining_supply: &str,
    client: &T,
) -> Result<(), String> {
    client
        .execute(
            "UPDATE deploys SET remaining_supply = $2 WHERE ticker = $1",
            &[&fold_ticker(tick), &remaining_supply],
        )
        .await
        .map_err(|e| format!("update_deploy_remaining_supply: {e}"))?;
    Ok(())
}

/// Upserts the block's touched balances with their final working values.
pub async fn upsert_balances<T: GenericClient>(
    balances: &[(String, String, String)],
    client: &T,
) -> Result<(), String> {
    for chunk in balances.chunks(BATCH_QUERY_CHUNK_SIZE) {
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![];
        for (address, ticker, balance) in chunk.iter() {
            params.push(address);
            params.push(ticker);
            params.push(balance);
        }
        client
            .query(
                &format!(
                    "INSERT INTO balances (address, ticker, balance)
                    VALUES {}
                    ON CONFLICT (address, ticker) DO UPDATE SET balance = EXCLUDED.balance",
                    values_params_str(chunk.len(), 3)
                ),
                &params,
            )
            .await
            .map_err(|e| format!("upsert_balances: {e}"))?;
    }
    Ok(())
}

pub async fn insert_swap_positions<T: GenericClient>(
    positions: &[DbSwapPosition],
    client: &T,
) -> Result<(), String> {
    for chunk in positions.chunks(BATCH_QUERY_CHUNK_SIZE) {
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![];
        for row in chunk.iter() {
            params.push(&row.owner_address);
            params.push(&row.pool_id);
            params.push(&row.src_ticker);
            params.push(&row.dst_ticker);
            params.push(&row.amount_locked);
            params.push(&row.lock_duration_blocks);
            params.push(&row.lock_start_height);
            params.push(&row.unlock_height);
            params.push(&row.status);
            params.push(&row.init_txid);
            params.push(&row.init_vout);
        }
        client
            .query(
                &format!(
                    "INSERT INTO swap_positions
                    (owner_address, pool_id, src_ticker, dst_ticker, amount_locked,
                    lock_duration_blocks, lock_start_height, unlock_height, status,
                    init_txid, init_vout)
                    VALUES {}
                    ON CONFLICT (init_txid, init_vout) DO NOTHING",
                    values_params_str(chunk.len(), 11)
                ),
                &params,
            )
            .await
            .map_err(|e| format!("insert_swap_positions: {e}"))?;
    }
    Ok(())
}

pub async fn insert_vaults<T: GenericClient>(
    vaults: &[DbVault],
    client: &T,
) -> Result<(), String> {
    for chunk in vaults.chunks(BATCH_QUERY_CHUNK_SIZE) {
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![];
        for row in chunk.iter() {
            params.push(&row.p2tr_address);
            params.push(&row.owner_address);
            params.push(&row.collateral_sats);
            params.push(&row.timelock_blocks);
            params.push(&row.remaining_blocks);
            params.push(&row.w_proof_commitment);
            params.push(&row.status);
            params.push(&row.reveal_txid);
            params.push(&row.reveal_height);
            params.push(&row.reveal_timestamp);
            params.push(&row.closing_txid);
            params.push(&row.closing_height);
            params.push(&row.closing_timestamp);
        }
        client
            .query(
                &format!(
                    "INSERT INTO vaults
                    (p2tr_address, owner_address, collateral_sats, timelock_blocks,
                    remaining_blocks, w_proof_commitment, status, reveal_txid, reveal_height,
                    reveal_timestamp, closing_txid, closing_height, closing_timestamp)
                    VALUES {}
                    ON CONFLICT (p2tr_address) DO NOTHING",
                    values_params_str(chunk.len(), 13)
                ),
                &params,
            )
            .await
            .map_err(|e| format!("insert_vaults: {e}"))?;
    }
    Ok(())
}

pub async fn insert_extended_contracts<T: GenericClient>(
    contracts: &[DbExtendedContract],
    client: &T,
) -> Result<(), String> {
    for chunk in contracts.chunks(BATCH_QUERY_CHUNK_SIZE) {
        let mut params: Vec<&(dyn ToSql + Sync)> = vec![];
        for row in chunk.iter() {
            params.push(&row.script_address);
            params.push(&row.initiator_address);
            params.push(&row.status);
            params.push(&row.timelock_delay);
            params.push(&row.initial_amount);
            params.push(&row.creation_txid);
            params.push(&row.creation_height);
            params.push(&row.creation_timestamp);
            params.push(&row.closure_txid);
            params.push(&row.closure_height);
            params.push(&row.closure_timestamp);
            params.push(&row.extension_data);
        }
        client
            .query(
                &format!(
                    "INSERT INTO extended_contracts
                    (script_address, initiator_address, status, timelock_delay, initial_amount,
                    creation_txid, creation_height, creation_timestamp, closure_txid,
                    closure_height, closure_timestamp, extension_data)
                    VALUES {}
                    ON CONFLICT (script_address) DO NOTHING",
                    values_params_str(chunk.len(), 12)
                ),
                &params,
            )
            .await
            .map_err(|e| format!("insert_extended_contracts: {e}"))?;
    }
    Ok(())
}

pub async fn insert_legacy_token<T: GenericClient>(
    token: &DbLegacyToken,
    client: &T,
) -> Result<(), String> {
    client
        .execute(
            "INSERT INTO legacy_tokens
            (ticker, max_supply, decimals, limit_per_mint, deploy_inscription_id,
            block_height, deployer_address, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (ticker) DO UPDATE SET last_verified_at = now()",
            &[
                &token.ticker,
                &token.max_supply,
                &token.decimals,
                &token.limit_per_mint,
                &token.deploy_inscription_id,
                &token.block_height,
                &token.deployer_address,
                &token.is_active,
            ],
        )
        .await
        .map_err(|e| format!("insert_legacy_token: {e}"))?;
    Ok(())
}

/// Flips active swap positions past their unlock height to expired.
pub async fn expire_swap_positions<T: GenericClient>(
    height: u64,
    client: &T,
) -> Result<u64, String> {
    client
        .execute(
            "UPDATE swap_positions SET status = 'expired', updated_at = now()
            WHERE status = 'active' AND unlock_height <= $1",
            &[&(height as i64)],
        )
        .await
        .map_err(|e| format!("expire_swap_positions: {e}"))
}

/// Advances every active vault's liquidation countdown by one block and
/// flips exhausted countdowns to abandoned.
pub async fn decrement_vault_countdowns<T: GenericClient>(client: &T) -> Result<u64, String> {
    client
        .execute(
            "UPDATE vaults SET remaining_blocks = remaining_blocks - 1, updated_at = now()
            WHERE status = 'active' AND remaining_blocks IS NOT NULL AND remaining_blocks > 0",
            &[],
        )
        .await
        .map_err(|e| format!("decrement_vault_countdowns: {e}"))?;
    client
        .execute(
            "UPDATE vaults SET status = 'abandoned', updated_at = now()
            WHERE status = 'active' AND remaining_blocks = 0",
            &[],
        )
        .await
        .map_err(|e| format!("abandon_vaults: {e}"))
}

/// Flips active contracts whose timelock has elapsed to expired.
pub async fn expire_extended_contracts<T: GenericClient>(
    height: u64,
    client: &T,
) -> Result<u64, String> {
    client
        .execute(
            "UPDATE extended_contracts SET status = 'expired', updated_at = now()
            WHERE status = 'active' AND creation_height + timelock_delay <= $1",
            &[&(height as i64)],
        )
        .await
        .map_err(|e| format!("expire_extended_contracts: {e}"))
}

/// Rolls the index back to `ancestor_height`: deletes everything derived
/// from later blocks, restores extension statuses, and recomputes balances
/// and remaining supplies from the surviving operation log.
pub async fn roll_back_to_height<T: GenericClient>(
    ancestor_height: u64,
    client: &T,
) -> Result<(), String> {
    let height = ancestor_height as i64;
    client
        .execute("DELETE FROM operations WHERE block_height > $1", &[&height])
        .await
        .map_err(|e| format!("roll_back operations: {e}"))?;
    client
        .execute("DELETE FROM processed_blocks WHERE height > $1", &[&height])
        .await
        .map_err(|e| format!("roll_back processed_blocks: {e}"))?;
    client
        .execute(
            "DELETE FROM swap_positions WHERE lock_start_height > $1",
            &[&height],
        )
        .await
        .map_err(|e| format!("roll_back swap_positions: {e}"))?;
    client
        .execute(
            "UPDATE swap_positions SET status = 'active', updated_at = now()
            WHERE status = 'expired' AND unlock_height > $1",
            &[&height],
        )
        .await
        .map_err(|e| format!("roll_back swap statuses: {e}"))?;
    client
        .execute("DELETE FROM vaults WHERE reveal_height > $1", &[&height])
        .await
        .map_err(|e| format!("roll_back vaults: {e}"))?;
    client
        .execute(
            "UPDATE vaults
            SET remaining_blocks = GREATEST(timelock_blocks - ($1 - reveal_height), 0),
                status = CASE
                    WHEN timelock_blocks - ($1 - reveal_height) <= 0 THEN 'abandoned'
                    ELSE 'active'
                END,
                updated_at = now()
            WHERE status IN ('active', 'abandoned')",
            &[&height],
        )
        .await
        .map_err(|e| format!("roll_back vault countdowns: {e}"))?;
    client
        .execute(
            "DELETE FROM extended_contracts WHERE creation_height > $1",
            &[&height],
        )
        .await
        .map_err(|e| format!("roll_back extended_contracts: {e}"))?;
    client
        .execute(
            "UPDATE extended_contracts SET status = 'active', updated_at = now()
            WHERE status = 'expired' AND creation_height + timelock_delay > $1",
            &[&height],
        )
        .await
        .map_err(|e| format!("roll_back contract statuses: {e}"))?;
    client
        .execute("DELETE FROM deploys WHERE deploy_height > $1", &[&height])
        .await
        .map_err(|e| format!("roll_back deploys: {e}"))?;
    recompute_balances(client).await?;
    recompute_remaining_supplies(client).await?;
    Ok(())
}

/// Rebuilds the balances table from the valid operation log. Balances are a
/// derived view; the log is the source of truth after a reorg.
pub async fn recompute_balances<T: GenericClient>(client: &T) -> Result<(), String> {
    client
        .execute("DELETE FROM balances", &[])
        .await
        .map_err(|e| format!("recompute_balances delete: {e}"))?;
    client
        .execute(
            &format!(
                "INSERT INTO balances (address, ticker, balance)
                SELECT address, ticker, SUM(delta)::TEXT
                FROM (
                    SELECT to_address AS address, ticker, CAST(amount AS NUMERIC) AS delta
                    FROM operations
                    WHERE is_valid = TRUE AND to_address IS NOT NULL AND ticker IS NOT NULL
                    AND operation IN ('mint', 'transfer', 'poisson_mint')
                    AND amount {CANONICAL_AMOUNT_PREDICATE}
                    UNION ALL
                    SELECT from_address AS address, ticker, -CAST(amount AS NUMERIC) AS delta
                    FROM operations
                    WHERE is_valid = TRUE AND from_address IS NOT NULL AND ticker IS NOT NULL
                    AND operation IN ('transfer', 'swap_init', 'test')
                    AND amount {CANONICAL_AMOUNT_PREDICATE}
                ) AS deltas
                GROUP BY address, ticker"
            ),
            &[],
        )
        .await
        .map_err(|e| format!("recompute_balances insert: {e}"))?;
    Ok(())
}

/// Restores every deploy's remaining supply from the surviving log: max
/// supply minus valid mints, plus the amounts still locked in active swap
/// positions.
pub async fn recompute_remaining_supplies<T: GenericClient>(client: &T) -> Result<(), String> {
    client
        .execute(
            &format!(
                "UPDATE deploys d
                SET remaining_supply = (
                    CAST(d.max_supply AS NUMERIC)
                    - COALESCE((
                        SELECT SUM(CAST(o.amount AS NUMERIC))
                        FROM operations o
                        WHERE o.ticker = d.ticker AND o.operation = 'mint' AND o.is_valid = TRUE
                        AND o.amount {CANONICAL_AMOUNT_PREDICATE}
                    ), 0)
                    + COALESCE((
                        SELECT SUM(CAST(sp.amount_locked AS NUMERIC))
                        FROM swap_positions sp
                        WHERE sp.src_ticker = d.ticker AND sp.status = 'active'
                    ), 0)
                )::TEXT",
            ),
            &[],
        )
        .await
        .map_err(|e| format!("recompute_remaining_supplies: {e}"))?;
    Ok(())
}
