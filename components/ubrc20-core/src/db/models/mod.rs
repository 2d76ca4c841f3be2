pub mod db_balance;
pub mod db_deploy;
pub mod db_extended_contract;
pub mod db_legacy_token;
pub mod db_operation;
pub mod db_processed_block;
pub mod db_swap_position;
pub mod db_vault;

pub use db_balance::DbBalance;
pub use db_deploy::DbDeploy;
pub use db_extended_contract::DbExtendedContract;
pub use db_legacy_token::DbLegacyToken;
pub use db_operation::DbOperation;
pub use db_processed_block::DbProcessedBlock;
pub use db_swap_position::DbSwapPosition;
pub use db_vault::DbVault;
