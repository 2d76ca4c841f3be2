//! Read-only context handed to processors.
//!
//! [StateView] wraps the intermediate state and a [StateStore]; its three
//! lookups consult the in-block maps first and fall back to persistent
//! state on a miss, caching whatever they load. There is no mutation
//! surface here: processors emit [super::changes::StateChange] values
//! instead.

use std::cell::RefCell;

use deadpool_postgres::Transaction;
use serde_json::Value;

use crate::db::index_pg;
use crate::db::models::DbDeploy;
use crate::utils::cache::HotCache;

use super::IntermediateState;

/// Persistent-state lookups backing the per-block read-through cache.
pub trait StateStore {
    async fn load_balance(&self, address: &str, tick: &str) -> Result<Option<String>, String>;
    async fn load_total_minted(&self, tick: &str) -> Result<Option<String>, String>;
    async fn load_deploy(&self, tick: &str) -> Result<Option<DbDeploy>, String>;
}

/// Postgres-backed [StateStore], layered over the cross-block hot cache for
/// deploy lookups.
pub struct PgStateStore<'a, 'b> {
    db_tx: &'b Transaction<'a>,
    hot_cache: &'b RefCell<HotCache>,
}

impl<'a, 'b> PgStateStore<'a, 'b> {
    pub fn new(db_tx: &'b Transaction<'a>, hot_cache: &'b RefCell<HotCache>) -> Self {
        PgStateStore { db_tx, hot_cache }
    }
}

impl<'a, 'b> StateStore for PgStateStore<'a, 'b> {
    async fn load_balance(&self, address: &str, tick: &str) -> Result<Option<String>, String> {
        index_pg::get_balance(address, tick, self.db_tx).await
    }

    async fn load_total_minted(&self, tick: &str) -> Result<Option<String>, String> {
        index_pg::get_total_minted(tick, self.db_tx).await
    }

    async fn load_deploy(&self, tick: &str) -> Result<Option<DbDeploy>, String> {
        if let Some(cached) = self.hot_cache.borrow_mut().get_deploy(tick) {
            return Ok(Some(cached));
        }
        let deploy = index_pg::get_deploy(tick, self.db_tx).await?;
        if let Some(deploy) = &deploy {
            self.hot_cache.borrow_mut().insert_deploy(deploy.clone());
        }
        Ok(deploy)
    }
}

pub struct StateView<'a, S: StateStore> {
    state: &'a mut IntermediateState,
    store: &'a S,
}

impl<'a, S: StateStore> StateView<'a, S> {
    pub fn new(state: &'a mut IntermediateState, store: &'a S) -> Self {
        StateView { state, store }
    }

    pub fn block_height(&self) -> u64 {
        self.state.block_height()
    }

    /// Working balance for `(address, tick)`; absent rows read as `"0"`.
    pub async fn get_balance(&mut self, address: &str, tick: &str) -> Result<String, String> {
        if let Some(balance) = self.state.balance(address, tick) {
            return Ok(balance.clone());
        }
        let loaded = self
            .store
            .load_balance(address, tick)
            .await?
            .unwrap_or_else(|| "0".to_string());
        self.state.cache_balance(address, tick, loaded.clone());
        Ok(loaded)
    }

    /// Cumulative minted amount for `tick`, including mints staged earlier
    /// in this block.
    pub async fn get_total_minted(&mut self, tick: &str) -> Result<String, String> {
        if let Some(total) = self.state.total_minted(tick) {
            return Ok(total.clone());
        }
        let loaded = self
            .store
            .load_total_minted(tick)
            .await?
            .unwrap_or_else(|| "0".to_string());
        self.state.cache_total_minted(tick, loaded.clone());
        Ok(loaded)
    }

    pub async fn get_deploy_record(&mut self, tick: &str) -> Result<Option<DbDeploy>, String> {
        if let Some(deploy) = self.state.deploy(tick) {
            return Ok(Some(deploy.clone()));
        }
        let Some(loaded) = self.store.load_deploy(tick).await? else {
            return Ok(None);
        };
        self.state.cache_deploy(loaded.clone());
        Ok(Some(loaded))
    }

    pub fn get_scratch(&self, key: &str) -> Option<Value> {
        self.state.scratch(key).cloned()
    }
}

/// In-memory [StateStore] double for processor and validator tests.
#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;

    use crate::core::fold_ticker;
    use crate::db::models::DbDeploy;

    use super::StateStore;

    #[derive(Default)]
    pub struct MemoryStateStore {
        pub balances: HashMap<(String, String), String>,
        pub total_minted: HashMap<String, String>,
        pub deploys: HashMap<String, DbDeploy>,
    }

    impl MemoryStateStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_deploy(mut self, deploy: DbDeploy) -> Self {
            self.deploys.insert(fold_ticker(&deploy.ticker), deploy);
            self
        }

        pub fn with_balance(mut self, address: &str, tick: &str, balance: &str) -> Self {
            self.balances.insert(
                (address.to_string(), fold_ticker(tick)),
                balance.to_string(),
            );
            self
        }

        pub fn with_total_minted(mut self, tick: &str, total: &str) -> Self {
            self.total_minted
                .insert(fold_ticker(tick), total.to_string());
            self
        }
    }

    impl StateStore for MemoryStateStore {
        async fn load_balance(
            &self,
            address: &str,
            tick: &str,
        ) -> Result<Option<String>, String> {
            Ok(self
                .balances
                .get(&(address.to_string(), fold_ticker(tick)))
                .cloned())
        }

        async fn load_total_minted(&self, tick: &str) -> Result<Option<String>, String> {
            Ok(self.total_minted.get(&fold_ticker(tick)).cloned())
        }

        async fn load_deploy(&self, tick: &str) -> Result<Option<DbDeploy>, String> {
            Ok(self.deploys.get(&fold_ticker(tick)).cloned())
        }
    }
}
