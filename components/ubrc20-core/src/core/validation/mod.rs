//! Consensus rule validation.
//!
//! Validators read the combined view of committed and in-block state
//! through [StateView] and return a [ValidationResult]: invalid operations
//! are data (logged with their reason), not errors. `Err` is reserved for
//! infrastructure failures, which abort the block.

pub mod legacy;

use ubrc20_types::TxOut;

use crate::core::amounts;
use crate::core::protocol::parser::{ParsedDeploy, ParsedTokenAmount};
use crate::core::protocol::payload;
use crate::core::state::view::{StateStore, StateView};

use self::legacy::LegacyTokenOracle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    TickerAlreadyExists,
    TickerNotDeployed,
    InvalidAmount,
    InvalidOperation,
    ExceedsMintLimit,
    ExceedsMaxSupply,
    InsufficientBalance,
    NoStandardOutput,
    OpReturnNotFirst,
    LegacyTokenExists,
    InvalidMarketplace,
    InvalidJson,
    UnknownOp,
    MissingField,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TickerAlreadyExists => "TICKER_ALREADY_EXISTS",
            ErrorCode::TickerNotDeployed => "TICKER_NOT_DEPLOYED",
            ErrorCode::InvalidAmount => "INVALID_AMOUNT",
            ErrorCode::InvalidOperation => "INVALID_OPERATION",
            ErrorCode::ExceedsMintLimit => "EXCEEDS_MINT_LIMIT",
            ErrorCode::ExceedsMaxSupply => "EXCEEDS_MAX_SUPPLY",
            ErrorCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ErrorCode::NoStandardOutput => "NO_STANDARD_OUTPUT",
            ErrorCode::OpReturnNotFirst => "OP_RETURN_NOT_FIRST",
            ErrorCode::LegacyTokenExists => "LEGACY_TOKEN_EXISTS",
            ErrorCode::InvalidMarketplace => "INVALID_MARKETPLACE",
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::UnknownOp => "UNKNOWN_OP",
            ErrorCode::MissingField => "MISSING_FIELD",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        ValidationResult {
            is_valid: true,
            error_code: None,
            error_message: None,
        }
    }

    pub fn invalid(error_code: ErrorCode, error_message: String) -> Self {
        ValidationResult {
            is_valid: false,
            error_code: Some(error_code),
            error_message: Some(error_message),
        }
    }
}

/// Deploy rules: the ticker must not already exist (case-insensitive), the
/// supply fields must be valid amounts, and a configured legacy oracle must
/// not report a conflicting deploy at or before the current height.
pub async fn validate_deploy<S: StateStore>(
    op: &ParsedDeploy,
    block_height: u64,
    view: &mut StateView<'_, S>,
    legacy_oracle: Option<&LegacyTokenOracle>,
) -> Result<ValidationResult, String> {
    if view.get_deploy_record(&op.tick).await?.is_some() {
        return Ok(ValidationResult::invalid(
            ErrorCode::TickerAlreadyExists,
            format!("Ticker '{}' already deployed", op.tick),
        ));
    }
    if !amounts::is_valid_amount(&op.max_supply) {
        return Ok(ValidationResult::invalid(
            ErrorCode::InvalidAmount,
            format!("Invalid max supply: {}", op.max_supply),
        ));
    }
    if let Some(limit_per_op) = &op.limit_per_op {
        if !amounts::is_valid_amount(limit_per_op) {
            return Ok(ValidationResult::invalid(
                ErrorCode::InvalidAmount,
                format!("Invalid limit per operation: {limit_per_op}"),
            ));
        }
        if amounts::is_amount_greater_than(limit_per_op, &op.max_supply)? {
            return Ok(ValidationResult::invalid(
                ErrorCode::InvalidAmount,
                format!(
                    "Limit per operation {limit_per_op} exceeds max supply {}",
                    op.max_supply
                ),
            ));
        }
    }
    if let Some(oracle) = legacy_oracle {
        let legacy_validation = oracle.validate_deploy(&op.tick, block_height).await;
        if !legacy_validation.is_valid {
            return Ok(legacy_validation);
        }
    }
    Ok(ValidationResult::valid())
}

/// Mint rules: deployed ticker, valid amount, per-op limit, and the supply
/// cap. The cap compares against the live in-block minted counter so that
/// several mints in one block compose.
pub async fn validate_mint<S: StateStore>(
    op: &ParsedTokenAmount,
    view: &mut StateView<'_, S>,
) -> Result<ValidationResult, String> {
    let Some(deploy) = view.get_deploy_record(&op.tick).await? else {
        return Ok(ValidationResult::invalid(
            ErrorCode::TickerNotDeployed,
            format!("Ticker '{}' not deployed", op.tick),
        ));
    };
    if !amounts::is_valid_amount(&op.amount) {
        return Ok(ValidationResult::invalid(
            ErrorCode::InvalidAmount,
            format!("Invalid mint amount: {}", op.amount),
        ));
    }
    if let Some(limit_per_op) = &deploy.limit_per_op {
        if amounts::is_amount_greater_than(&op.amount, limit_per_op)? {
            return Ok(ValidationResult::invalid(
                ErrorCode::ExceedsMintLimit,
                format!("Mint amount {} exceeds limit {limit_per_op}", op.amount),
            ));
        }
    }
    let current_total_minted = view.get_total_minted(&op.tick).await?;
    let proposed_total = amounts::add_amounts(&current_total_minted, &op.amount)?;
    if amounts::is_amount_greater_than(&proposed_total, &deploy.max_supply)? {
        let excess = amounts::subtract_amounts(&proposed_total, &deploy.max_supply)?;
        return Ok(ValidationResult::invalid(
            ErrorCode::ExceedsMaxSupply,
            format!(
                "Mint would exceed max supply. Current: {current_total_minted}, Mint: {}, \
                 Proposed: {proposed_total}, Max: {}, Excess: {excess}",
                op.amount, deploy.max_supply
            ),
        ));
    }
    Ok(ValidationResult::valid())
}

/// Transfer rules: deployed ticker, valid amount, sufficient sender
/// balance. The per-op limit never applies to transfers.
pub async fn validate_transfer<S: StateStore>(
    op: &ParsedTokenAmount,
    sender_address: &str,
    view: &mut StateView<'_, S>,
) -> Result<ValidationResult, String> {
    if view.get_deploy_record(&op.tick).await?.is_none() {
        return Ok(ValidationResult::invalid(
            ErrorCode::TickerNotDeployed,
            format!("Ticker '{}' not deployed", op.tick),
        ));
    }
    if !amounts::is_valid_amount(&op.amount) {
        return Ok(ValidationResult::invalid(
            ErrorCode::InvalidAmount,
            format!("Invalid transfer amount: {}", op.amount),
        ));
    }
    let sender_balance = view.get_balance(sender_address, &op.tick).await?;
    if !amounts::is_amount_greater_equal(&sender_balance, &op.amount)? {
        return Ok(ValidationResult::invalid(
            ErrorCode::InsufficientBalance,
            format!("Insufficient balance: {sender_balance} < {}", op.amount),
        ));
    }
    Ok(ValidationResult::valid())
}

/// Output-shape rule: deploys carry no output requirement; every other
/// operation needs at least one non-data output.
pub fn validate_outputs(outputs: &[TxOut], op_name: &str) -> ValidationResult {
    if op_name == "deploy" {
        return ValidationResult::valid();
    }
    if outputs.is_empty() || !payload::has_standard_output(outputs) {
        return ValidationResult::invalid(
            ErrorCode::NoStandardOutput,
            "No standard outputs found in transaction".to_string(),
        );
    }
    ValidationResult::valid()
}

#[cfg(test)]
mod test {
    use crate::core::protocol::parser::{ParsedDeploy, ParsedTokenAmount};
    use crate::core::state::view::memory::MemoryStateStore;
    use crate::core::state::view::StateView;
    use crate::core::state::IntermediateState;
    use crate::core::test_builders::test_deploy_with_limit;

    use super::*;

    fn mint(tick: &str, amount: &str) -> ParsedTokenAmount {
        ParsedTokenAmount {
            tick: tick.to_string(),
            amount: amount.to_string(),
        }
    }

    #[tokio::test]
    async fn deploys_of_existing_tickers_are_rejected_case_insensitively() {
        let store =
            MemoryStateStore::new().with_deploy(test_deploy_with_limit("TEST", "1000000", None));
        let mut state = IntermediateState::new(800_000);
        let mut view = StateView::new(&mut state, &store);
        let op = ParsedDeploy {
            tick: "TEST".to_string(),
            max_supply: "1000".to_string(),
            limit_per_op: None,
        };
        let result = validate_deploy(&op, 800_000, &mut view, None).await.unwrap();
        assert_eq!(result.error_code, Some(ErrorCode::TickerAlreadyExists));
    }

    #[tokio::test]
    async fn deploy_limit_cannot_exceed_max_supply() {
        let store = MemoryStateStore::new();
        let mut state = IntermediateState::new(800_000);
        let mut view = StateView::new(&mut state, &store);
        let op = ParsedDeploy {
            tick: "TEST".to_string(),
            max_supply: "1000".to_string(),
            limit_per_op: Some("2000".to_string()),
        };
        let result = validate_deploy(&op, 800_000, &mut view, None).await.unwrap();
        assert_eq!(result.error_code, Some(ErrorCode::InvalidAmount));
    }

    #[tokio::test]
    async fn mints_respect_the_per_op_limit() {
        let store = MemoryStateStore::new().with_deploy(test_deploy_with_limit(
            "TEST",
            "1000000",
            Some("1000"),
        ));
        let mut state = IntermediateState::new(800_000);
        let mut view = StateView::new(&mut state, &store);
        let result = validate_mint(&mint("TEST", "1001"), &mut view).await.unwrap();
        assert_eq!(result.error_code, Some(ErrorCode::ExceedsMintLimit));
    }

    #[tokio::test]
    async fn mint_overflow_reports_the_excess() {
        let store = MemoryStateStore::new()
            .with_deploy(test_deploy_with_limit("OPQT", "21000000", None))
            .with_total_minted("OPQT", "20999624");
        let mut state = IntermediateState::new(800_000);
        let mut view = StateView::new(&mut state, &store);
        let result = validate_mint(&mint("OPQT", "1000"), &mut view).await.unwrap();
        assert_eq!(result.error_code, Some(ErrorCode::ExceedsMaxSupply));
        assert!(result.error_message.unwrap().contains("Excess: 624"));
    }

    #[tokio::test]
    async fn mint_overflow_composes_with_in_block_mints() {
        let store = MemoryStateStore::new().with_deploy(test_deploy_with_limit(
            "X",
            "100",
            Some("100"),
        ));
        let mut state = IntermediateState::new(800_000);
        {
            let mut view = StateView::new(&mut state, &store);
            let first = validate_mint(&mint("X", "60"), &mut view).await.unwrap();
            assert!(first.is_valid);
        }
        // The first mint only exists in the intermediate state.
        state.cache_total_minted("X", "60".to_string());
        let mut view = StateView::new(&mut state, &store);
        let second = validate_mint(&mint("X", "60"), &mut view).await.unwrap();
        assert_eq!(second.error_code, Some(ErrorCode::ExceedsMaxSupply));
    }

    #[tokio::test]
    async fn transfers_check_the_sender_balance_not_the_limit() {
        let store = MemoryStateStore::new()
            .with_deploy(test_deploy_with_limit("TEST", "1000000", Some("1000")))
            .with_balance("bc1qalice", "TEST", "5000");
        let mut state = IntermediateState::new(800_000);
        let mut view = StateView::new(&mut state, &store);
        let over_limit = validate_transfer(&mint("TEST", "5000"), "bc1qalice", &mut view)
            .await
            .unwrap();
        assert!(over_limit.is_valid);
        let over_balance = validate_transfer(&mint("TEST", "5001"), "bc1qalice", &mut view)
            .await
            .unwrap();
        assert_eq!(
            over_balance.error_code,
            Some(ErrorCode::InsufficientBalance)
        );
    }

    #[tokio::test]
    async fn transfers_of_unknown_tickers_are_rejected() {
        let store = MemoryStateStore::new();
        let mut state = IntermediateState::new(800_000);
        let mut view = StateView::new(&mut state, &store);
        let result = validate_transfer(&mint("NOPE", "1"), "bc1qalice", &mut view)
            .await
            .unwrap();
        assert_eq!(result.error_code, Some(ErrorCode::TickerNotDeployed));
    }
}
