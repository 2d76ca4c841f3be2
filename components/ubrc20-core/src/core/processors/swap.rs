//! `swap.init`: locks an amount of the source token for a fixed number of
//! blocks, creating a timelocked position against the destination token.

use crate::core::amounts;
use crate::core::pool_id;
use crate::core::protocol::parser::ParsedSwapInit;
use crate::core::state::changes::{NewRow, StagedState, StateChange};
use crate::core::state::view::{StateStore, StateView};
use crate::core::validation::ErrorCode;
use crate::db::models::db_swap_position::SWAP_STATUS_ACTIVE;
use crate::db::models::DbSwapPosition;

use super::{OperationContext, ProcessingResult};

pub const OPERATION_TYPE: &str = "swap_init";

pub async fn process_op<S: StateStore>(
    op: &ParsedSwapInit,
    ctx: &OperationContext<'_>,
    view: &mut StateView<'_, S>,
) -> Result<(ProcessingResult, StagedState), String> {
    let invalid = |error_code: ErrorCode, message: String| {
        Ok((
            ProcessingResult::invalid(OPERATION_TYPE, error_code, message)
                .with_ticker(&op.src)
                .with_amount(&op.amount),
            StagedState::empty(),
        ))
    };

    if !amounts::is_valid_amount(&op.amount) {
        return invalid(
            ErrorCode::InvalidAmount,
            format!("Invalid swap amount: {}", op.amount),
        );
    }
    let Some(sender) = ctx.sender_address.clone() else {
        return invalid(
            ErrorCode::NoStandardOutput,
            "Cannot determine swap initiator address".to_string(),
        );
    };
    if view.get_deploy_record(&op.src).await?.is_none() {
        return invalid(
            ErrorCode::TickerNotDeployed,
            format!("Ticker {} not deployed", op.src),
        );
    }
    if view.get_deploy_record(&op.dst).await?.is_none() {
        return invalid(
            ErrorCode::TickerNotDeployed,
            format!("Ticker {} not deployed", op.dst),
        );
    }
    let balance = view.get_balance(&sender, &op.src).await?;
    if !amounts::is_amount_greater_equal(&balance, &op.amount)? {
        return invalid(
            ErrorCode::InsufficientBalance,
            format!("Insufficient balance: {balance} < {}", op.amount),
        );
    }

    let lock_start_height = ctx.block_height();
    let position = DbSwapPosition {
        owner_address: sender.clone(),
        pool_id: pool_id(&op.src, &op.dst),
        src_ticker: op.src.clone(),
        dst_ticker: op.dst.clone(),
        amount_locked: op.amount.clone(),
        lock_duration_blocks: op.lock_blocks as i64,
        lock_start_height: lock_start_height as i64,
        unlock_height: (lock_start_height + op.lock_blocks) as i64,
        status: SWAP_STATUS_ACTIVE.to_string(),
        init_txid: ctx.txid(),
        init_vout: ctx.vout_index as i64,
    };
    let staged = StagedState {
        new_rows: vec![NewRow::SwapPosition(position)],
        mutations: vec![
            // The locked amount leaves the owner's balance and is parked on
            // the source deploy's remaining supply until unlock.
            StateChange::DebitBalance {
                address: sender.clone(),
                tick: op.src.clone(),
                amount: op.amount.clone(),
            },
            StateChange::AdjustRemainingSupply {
                tick: op.src.clone(),
                amount: op.amount.clone(),
                credit: true,
            },
        ],
    };
    let result = ProcessingResult::valid(OPERATION_TYPE)
        .with_ticker(&op.src)
        .with_amount(&op.amount)
        .with_addresses(Some(sender), None);
    Ok((result, staged))
}

#[cfg(test)]
mod test {
    use crate::core::processors::Processor;
    use crate::core::protocol::parser::{ParsedOperation, ParsedSwapInit};
    use crate::core::state::changes::NewRow;
    use crate::core::state::view::memory::MemoryStateStore;
    use crate::core::state::view::StateView;
    use crate::core::state::IntermediateState;
    use crate::core::test_builders::{test_deploy, TestOperationContextBuilder};
    use crate::core::validation::ErrorCode;

    fn swap_op(src: &str, dst: &str, amount: &str, lock_blocks: u64) -> ParsedOperation {
        ParsedOperation::SwapInit(ParsedSwapInit {
            src: src.to_string(),
            dst: dst.to_string(),
            amount: amount.to_string(),
            lock_blocks,
        })
    }

    #[tokio::test]
    async fn a_valid_init_locks_balance_into_a_position() {
        let store = MemoryStateStore::new()
            .with_deploy(test_deploy("WTF", "1000000"))
            .with_deploy(test_deploy("LOL", "1000000"))
            .with_balance("bc1qowner", "WTF", "100");
        let mut state = IntermediateState::new(850_000);
        let ctx = TestOperationContextBuilder::new().sender("bc1qowner").build();
        let staged = {
            let mut view = StateView::new(&mut state, &store);
            let (result, staged) = Processor::Swap
                .process_op(&swap_op("WTF", "LOL", "25", 144), &ctx, &mut view, None)
                .await
                .unwrap();
            assert!(result.is_valid);
            assert_eq!(result.operation_type, "swap_init");
            staged
        };

        let NewRow::SwapPosition(position) = &staged.new_rows[0] else {
            panic!();
        };
        assert_eq!(position.pool_id, "LOL-WTF");
        assert_eq!(position.unlock_height, 850_144);
        assert_eq!(position.status, "active");

        for mutation in staged.mutations.iter() {
            state.apply(mutation).unwrap();
        }
        assert_eq!(state.balance("bc1qowner", "WTF").unwrap(), "75");
        assert_eq!(state.deploy("WTF").unwrap().remaining_supply, "1000025");
    }

    #[tokio::test]
    async fn both_legs_of_the_pair_must_be_deployed() {
        let store = MemoryStateStore::new()
            .with_deploy(test_deploy("WTF", "1000000"))
            .with_balance("bc1qowner", "WTF", "100");
        let mut state = IntermediateState::new(850_000);
        let ctx = TestOperationContextBuilder::new().sender("bc1qowner").build();
        let mut view = StateView::new(&mut state, &store);
        let (result, _) = Processor::Swap
            .process_op(&swap_op("WTF", "LOL", "25", 144), &ctx, &mut view, None)
            .await
            .unwrap();
        assert_eq!(result.error_code, Some(ErrorCode::TickerNotDeployed));
    }

    #[tokio::test]
    async fn locking_more_than_the_balance_is_rejected() {
        let store = MemoryStateStore::new()
            .with_deploy(test_deploy("WTF", "1000000"))
            .with_deploy(test_deploy("LOL", "1000000"))
            .with_balance("bc1qowner", "WTF", "10");
        let mut state = IntermediateState::new(850_000);
        let ctx = TestOperationContextBuilder::new().sender("bc1qowner").build();
        let mut view = StateView::new(&mut state, &store);
        let (result, staged) = Processor::Swap
            .process_op(&swap_op("WTF", "LOL", "25", 144), &ctx, &mut view, None)
            .await
            .unwrap();
        assert_eq!(result.error_code, Some(ErrorCode::InsufficientBalance));
        assert!(staged.new_rows.is_empty());
    }
}
