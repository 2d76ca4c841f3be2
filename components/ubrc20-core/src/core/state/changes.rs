//! Tagged state mutations and the staging container processors return.
//!
//! Processors never touch the intermediate state directly: every effect is
//! a value in this module, applied in order by the pipeline. This keeps a
//! processor from observing partial effects of a later operation and makes
//! the mutation stream replayable.

use serde_json::Value;

use crate::db::models::{DbDeploy, DbExtendedContract, DbLegacyToken, DbSwapPosition, DbVault};

#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    CreditBalance {
        address: String,
        tick: String,
        amount: String,
    },
    DebitBalance {
        address: String,
        tick: String,
        amount: String,
    },
    IncrementMinted {
        tick: String,
        amount: String,
    },
    CreateDeploy(DbDeploy),
    /// Adjusts a deploy's remaining supply; used by extensions that lock or
    /// release supply.
    AdjustRemainingSupply {
        tick: String,
        amount: String,
        credit: bool,
    },
    /// Opaque per-block scratch write, keyed by extension convention.
    WriteScratch {
        key: String,
        value: Value,
    },
}

/// New rows a processor wants persisted alongside the block. The operation
/// log row itself is always built by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum NewRow {
    SwapPosition(DbSwapPosition),
    Vault(DbVault),
    ExtendedContract(DbExtendedContract),
    /// Cached oracle verdict persisted alongside the deploy that triggered
    /// the lookup.
    LegacyToken(DbLegacyToken),
}

/// The staging directive a processor returns: rows to persist and mutations
/// to fold into the intermediate state, both applied by the pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedState {
    pub new_rows: Vec<NewRow>,
    pub mutations: Vec<StateChange>,
}

impl StagedState {
    pub fn empty() -> Self {
        StagedState::default()
    }
}
