use crate::core::protocol::parser::ParsedDeploy;
use crate::core::state::changes::{NewRow, StagedState, StateChange};
use crate::core::state::view::{StateStore, StateView};
use crate::core::validation::legacy::LegacyTokenOracle;
use crate::core::validation::{validate_deploy, ErrorCode};
use crate::db::models::{DbDeploy, DbLegacyToken};

use super::{OperationContext, ProcessingResult};

pub async fn process_op<S: StateStore>(
    op: &ParsedDeploy,
    ctx: &OperationContext<'_>,
    view: &mut StateView<'_, S>,
    legacy_oracle: Option<&LegacyTokenOracle>,
) -> Result<(ProcessingResult, StagedState), String> {
    let validation = validate_deploy(op, ctx.block_height(), view, legacy_oracle).await?;
    if !validation.is_valid {
        let mut staged = StagedState::empty();
        // Conflicting oracle verdicts are cached so future deploys of the
        // same ticker resolve without a round trip.
        if validation.error_code == Some(ErrorCode::LegacyTokenExists) {
            if let Some(oracle) = legacy_oracle {
                if let Some(legacy) = oracle.check_token_exists(&op.tick).await {
                    staged.new_rows.push(NewRow::LegacyToken(DbLegacyToken {
                        ticker: op.tick.clone(),
                        max_supply: legacy.max_supply,
                        decimals: legacy.decimals.unwrap_or(18),
                        limit_per_mint: None,
                        deploy_inscription_id: legacy.deploy_inscription_id,
                        block_height: legacy.block_height.unwrap_or_default() as i64,
                        deployer_address: legacy.deployer_address,
                        is_active: true,
                    }));
                }
            }
        }
        return Ok((
            ProcessingResult::rejected("deploy", validation).with_ticker(&op.tick),
            staged,
        ));
    }

    let deploy = DbDeploy {
        ticker: op.tick.clone(),
        max_supply: op.max_supply.clone(),
        // Standard tokens start with the full supply available.
        remaining_supply: op.max_supply.clone(),
        limit_per_op: op.limit_per_op.clone(),
        deploy_txid: ctx.txid(),
        deploy_height: ctx.block_height() as i64,
        deploy_timestamp: ctx.timestamp as i64,
        deployer_address: ctx.sender_address.clone(),
    };
    let staged = StagedState {
        new_rows: vec![],
        mutations: vec![StateChange::CreateDeploy(deploy)],
    };
    let result = ProcessingResult::valid("deploy")
        .with_ticker(&op.tick)
        .with_addresses(ctx.sender_address.clone(), None);
    Ok((result, staged))
}

#[cfg(test)]
mod test {
    use crate::core::processors::Processor;
    use crate::core::protocol::parser::ParsedOperation;
    use crate::core::state::view::memory::MemoryStateStore;
    use crate::core::state::view::StateView;
    use crate::core::state::IntermediateState;
    use crate::core::test_builders::{parsed_deploy, TestOperationContextBuilder};
    use crate::core::validation::ErrorCode;

    #[tokio::test]
    async fn valid_deploys_stage_a_deploy_record() {
        let store = MemoryStateStore::new();
        let mut state = IntermediateState::new(800_000);
        let mut view = StateView::new(&mut state, &store);
        let ctx_builder = TestOperationContextBuilder::new().sender("bc1qdeployer");
        let op = ParsedOperation::Deploy(parsed_deploy("TEST", "1000000", Some("1000")));
        let (result, staged) = Processor::Deploy
            .process_op(&op, &ctx_builder.build(), &mut view, None)
            .await
            .unwrap();

        assert!(result.is_valid);
        assert_eq!(result.ticker.as_deref(), Some("TEST"));
        assert_eq!(result.from_address.as_deref(), Some("bc1qdeployer"));
        assert_eq!(staged.mutations.len(), 1);

        for mutation in staged.mutations.iter() {
            state.apply(mutation).unwrap();
        }
        let deploy = state.deploy("test").unwrap();
        assert_eq!(deploy.max_supply, "1000000");
        assert_eq!(deploy.remaining_supply, "1000000");
        assert_eq!(deploy.limit_per_op.as_deref(), Some("1000"));
    }

    #[tokio::test]
    async fn redeploys_are_rejected_within_the_same_block() {
        let store = MemoryStateStore::new();
        let mut state = IntermediateState::new(800_000);
        let op = ParsedOperation::Deploy(parsed_deploy("TEST", "1000000", None));
        let ctx_builder = TestOperationContextBuilder::new();

        let staged = {
            let mut view = StateView::new(&mut state, &store);
            let (result, staged) = Processor::Deploy
                .process_op(&op, &ctx_builder.build(), &mut view, None)
                .await
                .unwrap();
            assert!(result.is_valid);
            staged
        };
        for mutation in staged.mutations.iter() {
            state.apply(mutation).unwrap();
        }

        let mut view = StateView::new(&mut state, &store);
        let (result, staged) = Processor::Deploy
            .process_op(&op, &ctx_builder.build(), &mut view, None)
            .await
            .unwrap();
        assert_eq!(result.error_code, Some(ErrorCode::TickerAlreadyExists));
        assert!(staged.mutations.is_empty());
    }
}
