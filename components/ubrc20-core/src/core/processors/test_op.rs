//! `test`: a minimal extension that burns tokens from the sender's balance.
//! Kept registered on non-mainnet deployments to exercise the extension
//! runtime end to end.

use crate::core::amounts;
use crate::core::fold_ticker;
use crate::core::protocol::parser::ParsedExtensionOp;
use crate::core::state::changes::{StagedState, StateChange};
use crate::core::state::view::{StateStore, StateView};
use crate::core::validation::ErrorCode;

use super::{OperationContext, ProcessingResult};

pub const OPERATION_TYPE: &str = "test";

pub async fn process_op<S: StateStore>(
    op: &ParsedExtensionOp,
    ctx: &OperationContext<'_>,
    view: &mut StateView<'_, S>,
) -> Result<(ProcessingResult, StagedState), String> {
    let tick = op.payload["tick"].as_str().map(fold_ticker);
    let amount = op.payload["amt"].as_str().map(str::to_string);
    let (Some(tick), Some(amount)) = (tick, amount) else {
        return Ok((
            ProcessingResult::invalid(
                OPERATION_TYPE,
                ErrorCode::MissingField,
                "Missing required fields".to_string(),
            ),
            StagedState::empty(),
        ));
    };
    let invalid = |error_code: ErrorCode, message: String| {
        Ok((
            ProcessingResult::invalid(OPERATION_TYPE, error_code, message)
                .with_ticker(&tick)
                .with_amount(&amount),
            StagedState::empty(),
        ))
    };

    let Some(sender) = ctx.sender_address.clone() else {
        return invalid(
            ErrorCode::NoStandardOutput,
            "Cannot determine sender address".to_string(),
        );
    };
    if !amounts::is_valid_amount(&amount) {
        return invalid(
            ErrorCode::InvalidAmount,
            format!("Invalid burn amount: {amount}"),
        );
    }
    if view.get_deploy_record(&tick).await?.is_none() {
        return invalid(
            ErrorCode::TickerNotDeployed,
            format!("Ticker {tick} not deployed"),
        );
    }
    let balance = view.get_balance(&sender, &tick).await?;
    if !amounts::is_amount_greater_equal(&balance, &amount)? {
        return invalid(
            ErrorCode::InsufficientBalance,
            format!("Insufficient balance for {tick}"),
        );
    }

    let staged = StagedState {
        new_rows: vec![],
        mutations: vec![StateChange::DebitBalance {
            address: sender.clone(),
            tick: tick.clone(),
            amount: amount.clone(),
        }],
    };
    let result = ProcessingResult::valid(OPERATION_TYPE)
        .with_ticker(&tick)
        .with_amount(&amount)
        .with_addresses(Some(sender), None);
    Ok((result, staged))
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use crate::core::processors::Processor;
    use crate::core::protocol::parser::{ParsedExtensionOp, ParsedOperation};
    use crate::core::state::view::memory::MemoryStateStore;
    use crate::core::state::view::StateView;
    use crate::core::state::IntermediateState;
    use crate::core::test_builders::{test_deploy, TestOperationContextBuilder};
    use crate::core::validation::ErrorCode;

    fn burn_op(tick: &str, amt: &str) -> ParsedOperation {
        ParsedOperation::Extension(ParsedExtensionOp {
            op_name: "test".to_string(),
            payload: json!({ "p": "brc-20", "op": "test", "tick": tick, "amt": amt }),
        })
    }

    #[tokio::test]
    async fn burns_debit_the_sender() {
        let store = MemoryStateStore::new()
            .with_deploy(test_deploy("TEST", "1000000"))
            .with_balance("bc1qburner", "TEST", "1000");
        let mut state = IntermediateState::new(800_000);
        let ctx = TestOperationContextBuilder::new().sender("bc1qburner").build();
        let staged = {
            let mut view = StateView::new(&mut state, &store);
            let (result, staged) = Processor::TestBurn
                .process_op(&burn_op("test", "100"), &ctx, &mut view, None)
                .await
                .unwrap();
            assert!(result.is_valid);
            assert_eq!(result.ticker.as_deref(), Some("TEST"));
            staged
        };
        for mutation in staged.mutations.iter() {
            state.apply(mutation).unwrap();
        }
        assert_eq!(state.balance("bc1qburner", "TEST").unwrap(), "900");
    }

    #[tokio::test]
    async fn burns_beyond_the_balance_are_rejected() {
        let store = MemoryStateStore::new()
            .with_deploy(test_deploy("TEST", "1000000"))
            .with_balance("bc1qburner", "TEST", "50");
        let mut state = IntermediateState::new(800_000);
        let ctx = TestOperationContextBuilder::new().sender("bc1qburner").build();
        let mut view = StateView::new(&mut state, &store);
        let (result, _) = Processor::TestBurn
            .process_op(&burn_op("TEST", "100"), &ctx, &mut view, None)
            .await
            .unwrap();
        assert_eq!(result.error_code, Some(ErrorCode::InsufficientBalance));
    }

    #[tokio::test]
    async fn missing_fields_are_reported() {
        let store = MemoryStateStore::new();
        let mut state = IntermediateState::new(800_000);
        let ctx = TestOperationContextBuilder::new().sender("bc1qburner").build();
        let op = ParsedOperation::Extension(ParsedExtensionOp {
            op_name: "test".to_string(),
            payload: json!({ "p": "brc-20", "op": "test" }),
        });
        let mut view = StateView::new(&mut state, &store);
        let (result, _) = Processor::TestBurn
            .process_op(&op, &ctx, &mut view, None)
            .await
            .unwrap();
        assert_eq!(result.error_code, Some(ErrorCode::MissingField));
    }
}
