//! `poisson`: a participative mint. Addresses enter by carrying the fish
//! pattern in a data output; every block's entries share a fixed reward,
//! settled once the whole block has been seen.
//!
//! Rewards are carried in scale-8 base units so that the fractional block
//! reward stays on integer arithmetic: 3.125 tokens = 312500000 units.
//! Blocks mined by the Ocean pool (its tag appears in a coinbase output's
//! script asm) pay every participation the full block reward instead of a
//! proportional share.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use ubrc20_types::BitcoinBlockData;

use crate::core::protocol::parser::PARTICIPATION_PATTERN;
use crate::core::state::changes::{StagedState, StateChange};
use crate::core::state::view::{StateStore, StateView};
use crate::core::validation::ErrorCode;

use super::{BlockEndResult, OperationAmountUpdate, OperationContext, ProcessingResult};

pub const OPERATION_TYPE: &str = "poisson_mint";
pub const TICKER: &str = "FLOODFISH";
pub const REWARD_PER_BLOCK: u128 = 312_500_000;
pub const OCEAN_POOL_IDENTIFIER: &str = "ocean";

fn participations_key(block_height: u64) -> String {
    format!("poisson_participations_{block_height}")
}

/// Phase 1: register a participation. The operation row is staged with a
/// zero amount; the final reward is patched in at block end. The same
/// address may participate several times per block.
pub async fn process_op<S: StateStore>(
    ctx: &OperationContext<'_>,
    view: &mut StateView<'_, S>,
) -> Result<(ProcessingResult, StagedState), String> {
    let payload = hex::decode(&ctx.raw_payload_hex).unwrap_or_default();
    let is_participation = std::str::from_utf8(&payload)
        .map(|text| text.contains(PARTICIPATION_PATTERN))
        .unwrap_or(false);
    if !is_participation {
        return Ok((
            ProcessingResult::invalid(
                OPERATION_TYPE,
                ErrorCode::InvalidOperation,
                format!("OP_RETURN must contain '{PARTICIPATION_PATTERN}'"),
            )
            .with_ticker(TICKER),
            StagedState::empty(),
        ));
    }
    let Some(sender) = ctx.sender_address.clone() else {
        return Ok((
            ProcessingResult::invalid(
                OPERATION_TYPE,
                ErrorCode::NoStandardOutput,
                "Cannot determine sender address".to_string(),
            )
            .with_ticker(TICKER),
            StagedState::empty(),
        ));
    };
    if view.get_deploy_record(TICKER).await?.is_none() {
        return Ok((
            ProcessingResult::invalid(
                OPERATION_TYPE,
                ErrorCode::TickerNotDeployed,
                format!("Ticker {TICKER} not deployed"),
            )
            .with_ticker(TICKER),
            StagedState::empty(),
        ));
    }

    let key = participations_key(ctx.block_height());
    let mut participations = view
        .get_scratch(&key)
        .and_then(|value| value.as_array().cloned())
        .unwrap_or_default();
    participations.push(json!({
        "address": sender,
        "txid": ctx.txid(),
        "vout_index": ctx.vout_index,
        "tx_index": ctx.tx_index,
    }));

    let staged = StagedState {
        new_rows: vec![],
        mutations: vec![StateChange::WriteScratch {
            key,
            value: Value::Array(participations),
        }],
    };
    let result = ProcessingResult::valid(OPERATION_TYPE)
        .with_ticker(TICKER)
        .with_amount("0")
        .with_addresses(Some(sender.clone()), Some(sender));
    Ok((result, staged))
}

fn is_ocean_block(block: &BitcoinBlockData) -> bool {
    // The coinbase transaction always comes first.
    let Some(coinbase) = block.transactions.first() else {
        return false;
    };
    coinbase.metadata.outputs.iter().any(|output| {
        output
            .script_asm
            .as_ref()
            .map(|asm| asm.to_lowercase().contains(OCEAN_POOL_IDENTIFIER))
            .unwrap_or(false)
    })
}

/// Phase 2: settle the block's rewards. Proportional split on normal
/// blocks, full reward per participation on Ocean blocks; divisions floor.
pub async fn on_block_end<S: StateStore>(
    block: &BitcoinBlockData,
    view: &mut StateView<'_, S>,
) -> Result<BlockEndResult, String> {
    let key = participations_key(block.block_identifier.index);
    let Some(participations) = view.get_scratch(&key).and_then(|v| v.as_array().cloned()) else {
        return Ok(BlockEndResult::default());
    };
    if participations.is_empty() {
        return Ok(BlockEndResult::default());
    }

    let total_participations = participations.len() as u128;
    let reward_per_participation = if is_ocean_block(block) {
        REWARD_PER_BLOCK
    } else {
        REWARD_PER_BLOCK / total_participations
    };

    let mut per_address: BTreeMap<String, u128> = BTreeMap::new();
    let mut updates = vec![];
    for participation in participations.iter() {
        let Some(address) = participation["address"].as_str() else {
            return Err("participation scratch entry without address".to_string());
        };
        *per_address.entry(address.to_string()).or_insert(0) += reward_per_participation;
        updates.push(OperationAmountUpdate {
            txid: participation["txid"].as_str().unwrap_or_default().to_string(),
            vout_index: participation["vout_index"].as_u64().unwrap_or_default(),
            amount: reward_per_participation.to_string(),
        });
    }

    let mut mutations = vec![];
    for (address, reward) in per_address.into_iter() {
        if reward == 0 {
            continue;
        }
        mutations.push(StateChange::CreditBalance {
            address,
            tick: TICKER.to_string(),
            amount: reward.to_string(),
        });
    }
    // Clear the entry so a later hook never double-settles.
    mutations.push(StateChange::WriteScratch {
        key,
        value: Value::Array(vec![]),
    });
    Ok(BlockEndResult {
        mutations,
        operation_amount_updates: updates,
    })
}

#[cfg(test)]
mod test {
    use crate::core::processors::Processor;
    use crate::core::protocol::parser::{ParsedExtensionOp, ParsedOperation, PARTICIPATION_PATTERN};
    use crate::core::state::changes::StateChange;
    use crate::core::state::view::memory::MemoryStateStore;
    use crate::core::state::view::StateView;
    use crate::core::state::IntermediateState;
    use crate::core::test_builders::{
        test_deploy, TestBlockBuilder, TestOperationContextBuilder, TestTransactionBuilder,
        TestTxOutBuilder,
    };

    use super::*;

    fn poisson_op() -> ParsedOperation {
        ParsedOperation::Extension(ParsedExtensionOp {
            op_name: "poisson".to_string(),
            payload: serde_json::Value::Null,
        })
    }

    fn participation_hex() -> String {
        hex::encode(PARTICIPATION_PATTERN.as_bytes())
    }

    async fn register(
        state: &mut IntermediateState,
        store: &MemoryStateStore,
        sender: &str,
        txid_fill: u8,
    ) {
        let tx = TestTransactionBuilder::new().txid_fill(txid_fill).build();
        let ctx = TestOperationContextBuilder::new()
            .tx(&tx)
            .sender(sender)
            .raw_payload_hex(&participation_hex())
            .build();
        let staged = {
            let mut view = StateView::new(state, store);
            let (result, staged) = Processor::Poisson
                .process_op(&poisson_op(), &ctx, &mut view, None)
                .await
                .unwrap();
            assert!(result.is_valid);
            assert_eq!(result.amount.as_deref(), Some("0"));
            staged
        };
        for mutation in staged.mutations.iter() {
            state.apply(mutation).unwrap();
        }
    }

    fn block(height: u64, coinbase_tag: Option<&str>) -> ubrc20_types::BitcoinBlockData {
        let mut coinbase_out = TestTxOutBuilder::new().p2pkh(0);
        if let Some(tag) = coinbase_tag {
            coinbase_out = coinbase_out.asm(tag);
        }
        TestBlockBuilder::new()
            .height(height)
            .add_transaction(
                TestTransactionBuilder::new()
                    .add_output(coinbase_out.build())
                    .build(),
            )
            .build()
    }

    #[tokio::test]
    async fn rewards_split_proportionally_on_normal_blocks() {
        let store = MemoryStateStore::new().with_deploy(test_deploy(TICKER, "21000000000000000"));
        let mut state = IntermediateState::new(800_000);
        // Alice participates three times, Bob twice.
        for (sender, fill) in [
            ("bc1qalice", 1),
            ("bc1qalice", 2),
            ("bc1qalice", 3),
            ("bc1qbob", 4),
            ("bc1qbob", 5),
        ] {
            register(&mut state, &store, sender, fill).await;
        }

        let block = block(800_000, None);
        let result = {
            let mut view = StateView::new(&mut state, &store);
            on_block_end(&block, &mut view).await.unwrap()
        };
        // 312500000 / 5 = 62500000 per participation.
        assert_eq!(result.operation_amount_updates.len(), 5);
        assert!(result
            .operation_amount_updates
            .iter()
            .all(|update| update.amount == "62500000"));

        let credits: Vec<_> = result
            .mutations
            .iter()
            .filter_map(|mutation| match mutation {
                StateChange::CreditBalance { address, amount, .. } => {
                    Some((address.clone(), amount.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            credits,
            vec![
                ("bc1qalice".to_string(), "187500000".to_string()),
                ("bc1qbob".to_string(), "125000000".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn ocean_blocks_pay_every_participation_in_full() {
        let store = MemoryStateStore::new().with_deploy(test_deploy(TICKER, "21000000000000000"));
        let mut state = IntermediateState::new(800_000);
        register(&mut state, &store, "bc1qalice", 1).await;
        register(&mut state, &store, "bc1qbob", 2).await;

        let block = block(800_000, Some("OP_RETURN 4f6365616e Ocean.xyz"));
        let result = {
            let mut view = StateView::new(&mut state, &store);
            on_block_end(&block, &mut view).await.unwrap()
        };
        assert!(result
            .operation_amount_updates
            .iter()
            .all(|update| update.amount == REWARD_PER_BLOCK.to_string()));
    }

    #[tokio::test]
    async fn participations_without_the_deploy_are_rejected() {
        let store = MemoryStateStore::new();
        let mut state = IntermediateState::new(800_000);
        let tx = TestTransactionBuilder::new().build();
        let ctx = TestOperationContextBuilder::new()
            .tx(&tx)
            .sender("bc1qalice")
            .raw_payload_hex(&participation_hex())
            .build();
        let mut view = StateView::new(&mut state, &store);
        let (result, _) = Processor::Poisson
            .process_op(&poisson_op(), &ctx, &mut view, None)
            .await
            .unwrap();
        assert_eq!(
            result.error_code,
            Some(crate::core::validation::ErrorCode::TickerNotDeployed)
        );
    }

    #[tokio::test]
    async fn blocks_without_participations_settle_to_nothing() {
        let store = MemoryStateStore::new();
        let mut state = IntermediateState::new(800_000);
        let block = block(800_000, None);
        let mut view = StateView::new(&mut state, &store);
        let result = on_block_end(&block, &mut view).await.unwrap();
        assert!(result.mutations.is_empty());
        assert!(result.operation_amount_updates.is_empty());
    }
}
