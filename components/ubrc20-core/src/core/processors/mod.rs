//! Pluggable operation processors.
//!
//! A registry maps operation names to processors. Built-in processors
//! (deploy, mint, transfer) are modeled exactly like registered extensions;
//! the pipeline does not special-case them beyond ordering. The registry is
//! populated at build time from configuration, with [Registry::register]
//! available for dynamic additions before the service starts.

pub mod deploy;
pub mod mint;
pub mod poisson;
pub mod swap;
pub mod test_op;
pub mod transfer;

use bitcoin::Network;
use ubrc20_types::{BitcoinBlockData, BitcoinTransactionData, BlockIdentifier};

use crate::core::protocol::classify::TransferType;
use crate::core::protocol::parser::ParsedOperation;
use crate::core::state::changes::{StagedState, StateChange};
use crate::core::state::view::{StateStore, StateView};
use crate::core::validation::legacy::LegacyTokenOracle;
use crate::core::validation::{ErrorCode, ValidationResult};

/// Per-operation transaction context handed to processors alongside the
/// read-only state view.
pub struct OperationContext<'a> {
    pub tx: &'a BitcoinTransactionData,
    pub block_identifier: BlockIdentifier,
    pub timestamp: u32,
    pub tx_index: u64,
    /// Index of the data output carrying the payload.
    pub vout_index: u64,
    /// Raw payload bytes, hex encoded, as stored in the operation log.
    pub raw_payload_hex: String,
    pub parsed_json: Option<String>,
    /// Address of the first input's prevout, when resolvable.
    pub sender_address: Option<String>,
    pub transfer_type: TransferType,
    pub network: Network,
}

impl<'a> OperationContext<'a> {
    pub fn txid(&self) -> String {
        self.tx
            .transaction_identifier
            .get_hash_bytes_str()
            .to_string()
    }

    pub fn block_height(&self) -> u64 {
        self.block_identifier.index
    }
}

/// What a processor concluded about one operation. The pipeline turns this
/// into the operation-log row.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    pub operation_found: bool,
    pub is_valid: bool,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub operation_type: String,
    pub ticker: Option<String>,
    pub amount: Option<String>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub is_marketplace: bool,
}

impl ProcessingResult {
    pub fn valid(operation_type: &str) -> Self {
        ProcessingResult {
            operation_found: true,
            is_valid: true,
            error_code: None,
            error_message: None,
            operation_type: operation_type.to_string(),
            ticker: None,
            amount: None,
            from_address: None,
            to_address: None,
            is_marketplace: false,
        }
    }

    pub fn invalid(operation_type: &str, error_code: ErrorCode, error_message: String) -> Self {
        ProcessingResult {
            operation_found: true,
            is_valid: false,
            error_code: Some(error_code),
            error_message: Some(error_message),
            operation_type: operation_type.to_string(),
            ticker: None,
            amount: None,
            from_address: None,
            to_address: None,
            is_marketplace: false,
        }
    }

    pub fn rejected(operation_type: &str, validation: ValidationResult) -> Self {
        ProcessingResult {
            operation_found: true,
            is_valid: false,
            error_code: validation.error_code,
            error_message: validation.error_message,
            operation_type: operation_type.to_string(),
            ticker: None,
            amount: None,
            from_address: None,
            to_address: None,
            is_marketplace: false,
        }
    }

    pub fn with_ticker(mut self, ticker: &str) -> Self {
        self.ticker = Some(ticker.to_string());
        self
    }

    pub fn with_amount(mut self, amount: &str) -> Self {
        self.amount = Some(amount.to_string());
        self
    }

    pub fn with_addresses(mut self, from: Option<String>, to: Option<String>) -> Self {
        self.from_address = from;
        self.to_address = to;
        self
    }
}

/// Patch applied to an already-staged operation-log row at block end, used
/// by processors that only know final amounts once the whole block has been
/// seen.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationAmountUpdate {
    pub txid: String,
    pub vout_index: u64,
    pub amount: String,
}

#[derive(Debug, Clone, Default)]
pub struct BlockEndResult {
    pub mutations: Vec<StateChange>,
    pub operation_amount_updates: Vec<OperationAmountUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processor {
    Deploy,
    Mint,
    Transfer,
    Swap,
    TestBurn,
    Poisson,
}

impl Processor {
    fn for_extension(op_name: &str) -> Option<Processor> {
        match op_name {
            "swap" => Some(Processor::Swap),
            "test" => Some(Processor::TestBurn),
            "poisson" => Some(Processor::Poisson),
            _ => None,
        }
    }

    pub async fn process_op<S: StateStore>(
        &self,
        op: &ParsedOperation,
        ctx: &OperationContext<'_>,
        view: &mut StateView<'_, S>,
        legacy_oracle: Option<&LegacyTokenOracle>,
    ) -> Result<(ProcessingResult, StagedState), String> {
        match (self, op) {
            (Processor::Deploy, ParsedOperation::Deploy(op)) => {
                deploy::process_op(op, ctx, view, legacy_oracle).await
            }
            (Processor::Mint, ParsedOperation::Mint(op)) => mint::process_op(op, ctx, view).await,
            (Processor::Transfer, ParsedOperation::Transfer(op)) => {
                transfer::process_op(op, ctx, view).await
            }
            (Processor::Swap, ParsedOperation::SwapInit(op)) => {
                swap::process_op(op, ctx, view).await
            }
            (Processor::TestBurn, ParsedOperation::Extension(op)) => {
                test_op::process_op(op, ctx, view).await
            }
            (Processor::Poisson, ParsedOperation::Extension(_)) => {
                poisson::process_op(ctx, view).await
            }
            _ => unreachable!("registry dispatched a mismatched operation"),
        }
    }

    /// Block-end hook; only some extensions do block-scoped work.
    pub async fn on_block_end<S: StateStore>(
        &self,
        block: &BitcoinBlockData,
        view: &mut StateView<'_, S>,
    ) -> Result<BlockEndResult, String> {
        match self {
            Processor::Poisson => poisson::on_block_end(block, view).await,
            _ => Ok(BlockEndResult::default()),
        }
    }
}

pub struct Registry {
    processors: Vec<(String, Processor)>,
}

impl Registry {
    /// Builds the registry from configuration: the three built-in
    /// processors plus every enabled extension. Unknown extension names are
    /// a startup error.
    pub fn standard(config: &config::Config) -> Result<Registry, String> {
        let mut registry = Registry { processors: vec![] };
        registry.register("deploy", Processor::Deploy);
        registry.register("mint", Processor::Mint);
        registry.register("transfer", Processor::Transfer);
        if config.extensions.enabled {
            for op_name in config.extensions.enabled_ops.iter() {
                let processor = Processor::for_extension(op_name)
                    .ok_or(format!("unknown extension processor: {op_name}"))?;
                registry.register(op_name, processor);
            }
        }
        Ok(registry)
    }

    pub fn register(&mut self, op_name: &str, processor: Processor) {
        if self.get(op_name).is_none() {
            self.processors.push((op_name.to_string(), processor));
        }
    }

    pub fn get(&self, op_name: &str) -> Option<&Processor> {
        self.processors
            .iter()
            .find(|(name, _)| name == op_name)
            .map(|(_, processor)| processor)
    }

    /// Registered processors in registration order, for block-end hooks.
    pub fn processors(&self) -> impl Iterator<Item = &Processor> {
        self.processors.iter().map(|(_, processor)| processor)
    }
}

#[cfg(test)]
mod test {
    use super::{Processor, Registry};

    #[test]
    fn standard_registry_includes_built_ins_and_enabled_extensions() {
        let config = config::Config::test_default();
        let registry = Registry::standard(&config).unwrap();
        assert!(matches!(registry.get("deploy"), Some(Processor::Deploy)));
        assert!(matches!(registry.get("mint"), Some(Processor::Mint)));
        assert!(matches!(registry.get("transfer"), Some(Processor::Transfer)));
        assert!(matches!(registry.get("swap"), Some(Processor::Swap)));
        assert!(matches!(registry.get("poisson"), Some(Processor::Poisson)));
        assert!(registry.get("wrap").is_none());
    }

    #[test]
    fn extensions_are_off_without_the_toggle() {
        let mut config = config::Config::test_default();
        config.extensions.enabled = false;
        let registry = Registry::standard(&config).unwrap();
        assert!(registry.get("swap").is_none());
    }

    #[test]
    fn unknown_extension_names_fail_at_startup() {
        let mut config = config::Config::test_default();
        config.extensions.enabled_ops.push("warp".to_string());
        assert!(Registry::standard(&config).is_err());
    }
}
