use crate::core::protocol::classify::TransferType;
use crate::core::protocol::parser::ParsedTokenAmount;
use crate::core::protocol::payload;
use crate::core::state::changes::{StagedState, StateChange};
use crate::core::state::view::{StateStore, StateView};
use crate::core::validation::{validate_outputs, validate_transfer, ErrorCode};

use super::{OperationContext, ProcessingResult};

/// Processes both transfer shapes. Simple and marketplace transfers resolve
/// sender and recipient the same way; the classification has already been
/// computed by the pipeline and invalid marketplace shapes never reach this
/// processor.
pub async fn process_op<S: StateStore>(
    op: &ParsedTokenAmount,
    ctx: &OperationContext<'_>,
    view: &mut StateView<'_, S>,
) -> Result<(ProcessingResult, StagedState), String> {
    let is_marketplace = ctx.transfer_type == TransferType::Marketplace;
    let invalid = |result: ProcessingResult| {
        let mut result = result.with_ticker(&op.tick).with_amount(&op.amount);
        result.is_marketplace = is_marketplace;
        Ok((result, StagedState::empty()))
    };

    let outputs = &ctx.tx.metadata.outputs;
    let output_validation = validate_outputs(outputs, "transfer");
    if !output_validation.is_valid {
        return invalid(ProcessingResult::rejected("transfer", output_validation));
    }
    let Some(sender) = ctx.sender_address.clone() else {
        return invalid(ProcessingResult::invalid(
            "transfer",
            ErrorCode::NoStandardOutput,
            "Sender address required for transfer validation".to_string(),
        ));
    };
    let Some(recipient) = payload::output_after_op_return_address(outputs, ctx.network) else {
        return invalid(ProcessingResult::invalid(
            "transfer",
            ErrorCode::NoStandardOutput,
            "No valid recipient found after OP_RETURN for transfer operation".to_string(),
        ));
    };
    let validation = validate_transfer(op, &sender, view).await?;
    if !validation.is_valid {
        return invalid(ProcessingResult::rejected("transfer", validation));
    }

    let staged = StagedState {
        new_rows: vec![],
        mutations: vec![
            StateChange::DebitBalance {
                address: sender.clone(),
                tick: op.tick.clone(),
                amount: op.amount.clone(),
            },
            StateChange::CreditBalance {
                address: recipient.clone(),
                tick: op.tick.clone(),
                amount: op.amount.clone(),
            },
        ],
    };
    let mut result = ProcessingResult::valid("transfer")
        .with_ticker(&op.tick)
        .with_amount(&op.amount)
        .with_addresses(Some(sender), Some(recipient));
    result.is_marketplace = is_marketplace;
    Ok((result, staged))
}
