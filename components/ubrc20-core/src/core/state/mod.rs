//! Per-block staging of consensus state.
//!
//! The [IntermediateState] is the authoritative working copy of balances,
//! minted counters and deploy records while a block is in flight. It is
//! owned exclusively by the pipeline, mutated only through tagged
//! [changes::StateChange] values, and discarded once the block commits.
//! Processors observe it through the read-only [view::StateView].

pub mod changes;
pub mod view;

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use crate::core::amounts;
use crate::core::fold_ticker;
use crate::db::models::DbDeploy;

use self::changes::StateChange;

#[derive(Debug)]
pub struct IntermediateState {
    block_height: u64,
    /// `(address, TICK)` -> working balance. Keys are hydrated from
    /// persistent state on first read and authoritative afterwards.
    balances: BTreeMap<(String, String), String>,
    /// `TICK` -> cumulative minted amount, including mints staged in this
    /// block. Mint overflow checks compose through this map.
    total_minted: HashMap<String, String>,
    /// `TICK` -> deploy record, loaded or created this block.
    deploys: HashMap<String, DbDeploy>,
    /// Opaque per-block scratch used by extension processors.
    scratch: HashMap<String, Value>,
    touched_balances: BTreeSet<(String, String)>,
    created_deploys: Vec<String>,
    adjusted_deploys: BTreeSet<String>,
}

impl IntermediateState {
    pub fn new(block_height: u64) -> Self {
        IntermediateState {
            block_height,
            balances: BTreeMap::new(),
            total_minted: HashMap::new(),
            deploys: HashMap::new(),
            scratch: HashMap::new(),
            touched_balances: BTreeSet::new(),
            created_deploys: vec![],
            adjusted_deploys: BTreeSet::new(),
        }
    }

    pub fn block_height(&self) -> u64 {
        self.block_height
    }

    pub fn balance(&self, address: &str, tick: &str) -> Option<&String> {
        self.balances
            .get(&(address.to_string(), fold_ticker(tick)))
    }

    pub fn total_minted(&self, tick: &str) -> Option<&String> {
        self.total_minted.get(&fold_ticker(tick))
    }

    pub fn deploy(&self, tick: &str) -> Option<&DbDeploy> {
        self.deploys.get(&fold_ticker(tick))
    }

    pub fn scratch(&self, key: &str) -> Option<&Value> {
        self.scratch.get(key)
    }

    pub(crate) fn cache_balance(&mut self, address: &str, tick: &str, balance: String) {
        self.balances
            .insert((address.to_string(), fold_ticker(tick)), balance);
    }

    pub(crate) fn cache_total_minted(&mut self, tick: &str, total: String) {
        self.total_minted.insert(fold_ticker(tick), total);
    }

    pub(crate) fn cache_deploy(&mut self, deploy: DbDeploy) {
        self.deploys.insert(fold_ticker(&deploy.ticker), deploy);
    }

    /// Applies one tagged mutation. All keys a mutation touches must already
    /// be hydrated; a miss here means a processor staged a write it never
    /// read through the context, which is an invariant violation and aborts
    /// the block.
    pub fn apply(&mut self, change: &StateChange) -> Result<(), String> {
        match change {
            StateChange::CreditBalance {
                address,
                tick,
                amount,
            } => {
                let key = (address.clone(), fold_ticker(tick));
                let Some(balance) = self.balances.get(&key) else {
                    return Err(format!(
                        "balance not hydrated before credit: {address} {tick}"
                    ));
                };
                let credited = amounts::add_amounts(balance, amount)?;
                self.balances.insert(key.clone(), credited);
                self.touched_balances.insert(key);
            }
            StateChange::DebitBalance {
                address,
                tick,
                amount,
            } => {
                let key = (address.clone(), fold_ticker(tick));
                let Some(balance) = self.balances.get(&key) else {
                    return Err(format!(
                        "balance not hydrated before debit: {address} {tick}"
                    ));
                };
                let debited = amounts::subtract_amounts(balance, amount)?;
                self.balances.insert(key.clone(), debited);
                self.touched_balances.insert(key);
            }
            StateChange::IncrementMinted { tick, amount } => {
                let folded = fold_ticker(tick);
                let Some(total) = self.total_minted.get(&folded) else {
                    return Err(format!("minted counter not hydrated: {tick}"));
                };
                let incremented = amounts::add_amounts(total, amount)?;
                self.total_minted.insert(folded, incremented);
            }
            StateChange::CreateDeploy(deploy) => {
                let folded = fold_ticker(&deploy.ticker);
                if self.deploys.contains_key(&folded) {
                    return Err(format!("deploy staged twice for ticker {folded}"));
                }
                self.total_minted.entry(folded.clone()).or_insert_with(|| "0".to_string());
                self.deploys.insert(folded.clone(), deploy.clone());
                self.created_deploys.push(folded);
            }
            StateChange::AdjustRemainingSupply {
                tick,
                amount,
                credit,
            } => {
                let folded = fold_ticker(tick);
                let Some(deploy) = self.deploys.get_mut(&folded) else {
                    return Err(format!("deploy not hydrated before adjust: {tick}"));
                };
                deploy.remaining_supply = if *credit {
                    amounts::add_amounts(&deploy.remaining_supply, amount)?
                } else {
                    amounts::subtract_amounts(&deploy.remaining_supply, amount)?
                };
                if !self.created_deploys.contains(&folded) {
                    self.adjusted_deploys.insert(folded);
                }
            }
            StateChange::WriteScratch { key, value } => {
                self.scratch.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }

    /// Balances mutated in this block, in deterministic key order, ready to
    /// be upserted at commit.
    pub fn balances_to_commit(&self) -> Vec<(String, String, String)> {
        self.touched_balances
            .iter()
            .map(|key| {
                let balance = self
                    .balances
                    .get(key)
                    .expect("touched balance missing from working set");
                (key.0.clone(), key.1.clone(), balance.clone())
            })
            .collect()
    }

    /// Deploy rows created in this block, in creation order.
    pub fn deploys_to_insert(&self) -> Vec<DbDeploy> {
        self.created_deploys
            .iter()
            .map(|tick| {
                self.deploys
                    .get(tick)
                    .expect("created deploy missing from working set")
                    .clone()
            })
            .collect()
    }

    /// Pre-existing deploy rows whose remaining supply changed this block.
    pub fn deploys_to_update(&self) -> Vec<DbDeploy> {
        self.adjusted_deploys
            .iter()
            .map(|tick| {
                self.deploys
                    .get(tick)
                    .expect("adjusted deploy missing from working set")
                    .clone()
            })
            .collect()
    }
}
