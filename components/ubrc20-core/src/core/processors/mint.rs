use crate::core::protocol::parser::ParsedTokenAmount;
use crate::core::protocol::payload;
use crate::core::state::changes::{StagedState, StateChange};
use crate::core::state::view::{StateStore, StateView};
use crate::core::validation::{validate_mint, validate_outputs, ErrorCode};

use super::{OperationContext, ProcessingResult};

pub async fn process_op<S: StateStore>(
    op: &ParsedTokenAmount,
    ctx: &OperationContext<'_>,
    view: &mut StateView<'_, S>,
) -> Result<(ProcessingResult, StagedState), String> {
    let outputs = &ctx.tx.metadata.outputs;
    let output_validation = validate_outputs(outputs, "mint");
    if !output_validation.is_valid {
        return Ok((
            ProcessingResult::rejected("mint", output_validation).with_ticker(&op.tick),
            StagedState::empty(),
        ));
    }
    // Minted tokens go to the output following the data output.
    let Some(recipient) = payload::output_after_op_return_address(outputs, ctx.network) else {
        return Ok((
            ProcessingResult::invalid(
                "mint",
                ErrorCode::NoStandardOutput,
                "No valid recipient found after OP_RETURN for mint operation".to_string(),
            )
            .with_ticker(&op.tick),
            StagedState::empty(),
        ));
    };
    let validation = validate_mint(op, view).await?;
    if !validation.is_valid {
        return Ok((
            ProcessingResult::rejected("mint", validation)
                .with_ticker(&op.tick)
                .with_amount(&op.amount),
            StagedState::empty(),
        ));
    }

    let staged = StagedState {
        new_rows: vec![],
        mutations: vec![
            StateChange::IncrementMinted {
                tick: op.tick.clone(),
                amount: op.amount.clone(),
            },
            StateChange::CreditBalance {
                address: recipient.clone(),
                tick: op.tick.clone(),
                amount: op.amount.clone(),
            },
            // Minted tokens come out of the deploy's remaining supply.
            StateChange::AdjustRemainingSupply {
                tick: op.tick.clone(),
                amount: op.amount.clone(),
                credit: false,
            },
        ],
    };
    let result = ProcessingResult::valid("mint")
        .with_ticker(&op.tick)
        .with_amount(&op.amount)
        .with_addresses(ctx.sender_address.clone(), Some(recipient));
    Ok((result, staged))
}
