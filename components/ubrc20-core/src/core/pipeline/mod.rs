//! The block processing pipeline.
//!
//! One block at a time: every transaction is scanned for a data-output
//! payload, parsed, classified, validated and dispatched to its processor;
//! mutations stage into the intermediate state; and everything the block
//! produced (operation log rows, new entities, balance deltas and the
//! processed-block marker) lands in a single Postgres transaction. The
//! caller owns that transaction and commits it only on
//! [BlockCommitOutcome::Committed].

use std::cell::RefCell;
use std::time::{SystemTime, UNIX_EPOCH};

use bitcoin::Network;
use deadpool_postgres::Transaction;
use ubrc20_types::{
    BitcoinBlockData, BitcoinTransactionData, TokenBalanceData, TokenDeployData,
    TokenExtensionData, TokenOperation, TokenTransferData,
};

use crate::core::processors::{OperationContext, ProcessingResult, Registry};
use crate::core::protocol::classify::{classify_transfer, TransferType};
use crate::core::protocol::parser::{parse_token_operation, ParsedOperation};
use crate::core::protocol::payload::extract_op_return_payload;
use crate::core::state::changes::{NewRow, StateChange};
use crate::core::state::view::{PgStateStore, StateStore, StateView};
use crate::core::state::IntermediateState;
use crate::core::validation::legacy::LegacyTokenOracle;
use crate::core::validation::ErrorCode;
use crate::db::index_pg::{self, ProcessedBlockInsert};
use crate::db::models::{DbOperation, DbProcessedBlock};
use crate::utils::cache::HotCache;
use crate::utils::Context;
use crate::{try_debug, try_info};

/// Allowed clock drift for block header timestamps, matching the consensus
/// two-hour rule.
const MAX_FUTURE_DRIFT_SECS: u64 = 7_200;

#[derive(Debug, PartialEq, Eq)]
pub enum BlockCommitOutcome {
    Committed {
        operations_found: u64,
        operations_valid: u64,
    },
    /// This height is already committed with the same hash; a concurrent
    /// writer got there first. The caller rolls back and moves on.
    DuplicateNoop,
    /// This height is committed with a different hash. The caller rolls
    /// back and hands control to the reorg controller.
    ReorgDetected,
}

/// Strict block timestamp validation: an integral, positive count of UTC
/// seconds, not before the chain genesis, not beyond the future drift
/// allowance.
pub fn validate_block_timestamp(timestamp: u32, genesis_timestamp: u32) -> Result<(), String> {
    if timestamp == 0 {
        return Err("Block timestamp must be positive".to_string());
    }
    if timestamp < genesis_timestamp {
        return Err(format!(
            "Block timestamp {timestamp} is before Bitcoin genesis {genesis_timestamp}"
        ));
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("system clock error: {e}"))?
        .as_secs();
    if (timestamp as u64) > now + MAX_FUTURE_DRIFT_SECS {
        return Err(format!("Block timestamp {timestamp} is too far in future"));
    }
    Ok(())
}

struct BlockStaging {
    operations: Vec<DbOperation>,
    new_rows: Vec<NewRow>,
    operations_found: u64,
    operations_valid: u64,
}

impl BlockStaging {
    fn new() -> Self {
        BlockStaging {
            operations: vec![],
            new_rows: vec![],
            operations_found: 0,
            operations_valid: 0,
        }
    }

    fn log_operation(&mut self, row: DbOperation) {
        self.operations_found += 1;
        if row.is_valid {
            self.operations_valid += 1;
        }
        self.operations.push(row);
    }
}

fn operation_row(result: &ProcessingResult, ctx: &OperationContext) -> DbOperation {
    DbOperation {
        txid: ctx.txid(),
        vout_index: ctx.vout_index as i64,
        operation: result.operation_type.clone(),
        ticker: result.ticker.clone(),
        amount: result.amount.clone(),
        from_address: result.from_address.clone(),
        to_address: result.to_address.clone(),
        block_height: ctx.block_height() as i64,
        block_hash: ctx.block_identifier.get_hash_bytes_str().to_string(),
        tx_index: ctx.tx_index as i64,
        timestamp: ctx.timestamp as i64,
        is_valid: result.is_valid,
        error_code: result.error_code.map(|code| code.as_str().to_string()),
        error_message: result.error_message.clone(),
        raw_op_return: ctx.raw_payload_hex.clone(),
        parsed_json: ctx.parsed_json.clone(),
        is_marketplace: result.is_marketplace,
    }
}

fn token_operation_metadata(
    result: &ProcessingResult,
    op: &ParsedOperation,
) -> Option<TokenOperation> {
    if !result.is_valid {
        return None;
    }
    let tick = result.ticker.clone()?;
    Some(match result.operation_type.as_str() {
        "deploy" => {
            let ParsedOperation::Deploy(deploy) = op else {
                return None;
            };
            TokenOperation::Deploy(TokenDeployData {
                tick,
                max: deploy.max_supply.clone(),
                lim: deploy.limit_per_op.clone(),
                address: result.from_address.clone().unwrap_or_default(),
            })
        }
        "mint" => TokenOperation::Mint(TokenBalanceData {
            tick,
            amt: result.amount.clone().unwrap_or_default(),
            address: result.to_address.clone().unwrap_or_default(),
        }),
        "transfer" => TokenOperation::Transfer(TokenTransferData {
            tick,
            amt: result.amount.clone().unwrap_or_default(),
            sender_address: result.from_address.clone().unwrap_or_default(),
            receiver_address: result.to_address.clone().unwrap_or_default(),
            marketplace: result.is_marketplace,
        }),
        other => TokenOperation::Extension(TokenExtensionData {
            op_name: other.to_string(),
            tick: result.ticker.clone(),
            amt: result.amount.clone(),
            address: result.from_address.clone(),
        }),
    })
}

/// Hydrates every key a mutation touches, then applies it. Reads go through
/// the same read-through path processors use, so application order can
/// never observe a partially loaded working set.
async fn apply_mutations<S: StateStore>(
    mutations: &[StateChange],
    state: &mut IntermediateState,
    store: &S,
) -> Result<(), String> {
    for change in mutations.iter() {
        {
            let mut view = StateView::new(state, store);
            match change {
                StateChange::CreditBalance { address, tick, .. }
                | StateChange::DebitBalance { address, tick, .. } => {
                    view.get_balance(address, tick).await?;
                }
                StateChange::IncrementMinted { tick, .. } => {
                    view.get_total_minted(tick).await?;
                }
                StateChange::AdjustRemainingSupply { tick, .. } => {
                    view.get_deploy_record(tick).await?;
                }
                StateChange::CreateDeploy(_) | StateChange::WriteScratch { .. } => {}
            }
        }
        state.apply(change)?;
    }
    Ok(())
}

fn first_input_address(tx: &BitcoinTransactionData) -> Option<String> {
    tx.metadata
        .inputs
        .first()
        .and_then(|input| input.previous_output.address.clone())
}

/// The position rule: at or above the activation height, simple transfers
/// and mints must carry their payload at output index 0. Marketplace
/// transfers are exempt at every height.
fn position_rule_violated(
    op: &ParsedOperation,
    transfer_type: TransferType,
    payload_index: usize,
    block_height: u64,
    threshold: u64,
) -> bool {
    if block_height < threshold || payload_index == 0 {
        return false;
    }
    match op {
        ParsedOperation::Mint(_) => true,
        ParsedOperation::Transfer(_) => transfer_type == TransferType::Simple,
        _ => false,
    }
}

/// Processes one block against the given Postgres transaction. Nothing is
/// committed here; the caller inspects the outcome and commits or rolls
/// back the transaction accordingly.
pub async fn process_block(
    block: &mut BitcoinBlockData,
    registry: &Registry,
    config: &config::Config,
    hot_cache: &RefCell<HotCache>,
    legacy_oracle: Option<&LegacyTokenOracle>,
    db_tx: &Transaction<'_>,
    ctx: &Context,
) -> Result<BlockCommitOutcome, String> {
    let block_height = block.block_identifier.index;
    validate_block_timestamp(block.timestamp, config.indexer.bitcoin_genesis_timestamp)?;

    let network = match block.metadata.network {
        ubrc20_types::BitcoinNetwork::Mainnet => Network::Bitcoin,
        ubrc20_types::BitcoinNetwork::Testnet => Network::Testnet,
        ubrc20_types::BitcoinNetwork::Signet => Network::Signet,
        ubrc20_types::BitcoinNetwork::Regtest => Network::Regtest,
    };
    let store = PgStateStore::new(db_tx, hot_cache);
    let mut state = IntermediateState::new(block_height);
    let mut staging = BlockStaging::new();

    for tx in block.transactions.iter_mut() {
        let outputs = &tx.metadata.outputs;
        let Some((payload, payload_index)) = extract_op_return_payload(outputs) else {
            continue;
        };
        let raw_payload_hex = hex::encode(&payload);

        let mut op_ctx = OperationContext {
            tx,
            block_identifier: block.block_identifier.clone(),
            timestamp: block.timestamp,
            tx_index: tx.metadata.index as u64,
            vout_index: payload_index as u64,
            raw_payload_hex,
            parsed_json: None,
            sender_address: first_input_address(tx),
            transfer_type: TransferType::Simple,
            network,
        };

        let op = match parse_token_operation(&payload) {
            Ok(Some(op)) => op,
            Ok(None) => continue,
            Err(parse_error) => {
                let result = ProcessingResult::invalid(
                    "unknown",
                    parse_error.error_code,
                    parse_error.error_message,
                );
                staging.log_operation(operation_row(&result, &op_ctx));
                continue;
            }
        };
        op_ctx.parsed_json = serde_json::from_slice::<serde_json::Value>(&payload)
            .ok()
            .and_then(|value| serde_json::to_string(&value).ok());

        if let ParsedOperation::Transfer(_) = &op {
            op_ctx.transfer_type = classify_transfer(tx);
            // Transactions carrying the marketplace sighash without the
            // full pattern short-circuit before any state work.
            if op_ctx.transfer_type == TransferType::InvalidMarketplace {
                let mut result = ProcessingResult::invalid(
                    "transfer",
                    ErrorCode::InvalidMarketplace,
                    "Marketplace transaction does not match the expected template".to_string(),
                );
                result.ticker = op.ticker().map(str::to_string);
                result.amount = op.amount().map(str::to_string);
                staging.log_operation(operation_row(&result, &op_ctx));
                continue;
            }
        }

        if position_rule_violated(
            &op,
            op_ctx.transfer_type,
            payload_index,
            block_height,
            config.indexer.op_return_position_threshold,
        ) {
            let mut result = ProcessingResult::invalid(
                op.op_name(),
                ErrorCode::OpReturnNotFirst,
                format!(
                    "OP_RETURN must be in first position after block {}",
                    config.indexer.op_return_position_threshold
                ),
            );
            result.ticker = op.ticker().map(str::to_string);
            result.amount = op.amount().map(str::to_string);
            staging.log_operation(operation_row(&result, &op_ctx));
            continue;
        }

        let Some(processor) = registry.get(op.op_name()) else {
            let result = ProcessingResult::invalid(
                op.op_name(),
                ErrorCode::UnknownOp,
                format!("No processor registered for op: {}", op.op_name()),
            );
            staging.log_operation(operation_row(&result, &op_ctx));
            continue;
        };

        let (result, staged) = {
            let mut view = StateView::new(&mut state, &store);
            processor
                .process_op(&op, &op_ctx, &mut view, legacy_oracle)
                .await?
        };
        if !result.operation_found {
            continue;
        }
        staging.new_rows.extend(staged.new_rows);
        if result.is_valid {
            apply_mutations(&staged.mutations, &mut state, &store).await?;
            try_info!(
                ctx,
                "Token {} {} {} at block {}",
                result.operation_type,
                result.ticker.as_deref().unwrap_or("-"),
                result.amount.as_deref().unwrap_or("-"),
                block_height
            );
        } else {
            try_debug!(
                ctx,
                "Token {} rejected ({}) at block {}",
                result.operation_type,
                result
                    .error_code
                    .map(|code| code.as_str())
                    .unwrap_or("UNKNOWN"),
                block_height
            );
        }
        let metadata = token_operation_metadata(&result, &op);
        staging.log_operation(operation_row(&result, &op_ctx));
        tx.metadata.token_operation = metadata;
    }

    // Block-end hooks: extensions settle work that needs the whole block.
    for processor in registry.processors() {
        let block_end = {
            let mut view = StateView::new(&mut state, &store);
            processor.on_block_end(block, &mut view).await?
        };
        apply_mutations(&block_end.mutations, &mut state, &store).await?;
        for update in block_end.operation_amount_updates.iter() {
            for row in staging.operations.iter_mut() {
                if row.txid == update.txid && row.vout_index == update.vout_index as i64 {
                    row.amount = Some(update.amount.clone());
                }
            }
        }
    }

    // Commit staging. The processed-block marker goes first: its primary
    // key arbitrates between concurrent writers and exposes reorgs.
    let marker = DbProcessedBlock {
        height: block_height as i64,
        block_hash: block.block_identifier.get_hash_bytes_str().to_string(),
        timestamp: block.timestamp as i64,
        tx_count: block.transactions.len() as i64,
        operations_found: staging.operations_found as i64,
        operations_valid: staging.operations_valid as i64,
    };
    match index_pg::insert_processed_block(&marker, db_tx).await? {
        ProcessedBlockInsert::Inserted => {}
        ProcessedBlockInsert::UniqueViolation => {
            let existing = index_pg::get_processed_block(block_height, db_tx)
                .await?
                .ok_or("processed block vanished during conflict check".to_string())?;
            if existing.block_hash == marker.block_hash {
                return Ok(BlockCommitOutcome::DuplicateNoop);
            }
            return Ok(BlockCommitOutcome::ReorgDetected);
        }
    }

    index_pg::insert_operations(&staging.operations, db_tx).await?;
    index_pg::upsert_balances(&state.balances_to_commit(), db_tx).await?;
    let new_deploys = state.deploys_to_insert();
    index_pg::insert_deploys(&new_deploys, db_tx).await?;
    let updated_deploys = state.deploys_to_update();
    for deploy in updated_deploys.iter() {
        index_pg::update_deploy_remaining_supply(&deploy.ticker, &deploy.remaining_supply, db_tx)
            .await?;
    }

    let mut swap_positions = vec![];
    let mut vaults = vec![];
    let mut contracts = vec![];
    let mut legacy_tokens = vec![];
    for row in staging.new_rows.into_iter() {
        match row {
            NewRow::SwapPosition(position) => swap_positions.push(position),
            NewRow::Vault(vault) => vaults.push(vault),
            NewRow::ExtendedContract(contract) => contracts.push(contract),
            NewRow::LegacyToken(token) => legacy_tokens.push(token),
        }
    }
    index_pg::insert_swap_positions(&swap_positions, db_tx).await?;
    index_pg::insert_vaults(&vaults, db_tx).await?;
    index_pg::insert_extended_contracts(&contracts, db_tx).await?;
    for token in legacy_tokens.iter() {
        index_pg::insert_legacy_token(token, db_tx).await?;
    }

    // Timelock maintenance runs once per block, after all operations.
    index_pg::expire_swap_positions(block_height, db_tx).await?;
    index_pg::decrement_vault_countdowns(db_tx).await?;
    index_pg::expire_extended_contracts(block_height, db_tx).await?;

    // Keep the cross-block cache coherent with what this block changed.
    {
        let mut cache = hot_cache.borrow_mut();
        for deploy in new_deploys.into_iter().chain(updated_deploys.into_iter()) {
            cache.insert_deploy(deploy);
        }
    }

    Ok(BlockCommitOutcome::Committed {
        operations_found: staging.operations_found,
        operations_valid: staging.operations_valid,
    })
}
