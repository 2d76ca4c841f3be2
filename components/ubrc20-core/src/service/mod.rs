//! Service runloop: the single writer.
//!
//! Blocks are fetched from bitcoind in batches, standardized, and handed to
//! the pipeline one at a time in strict ascending height order. Commits,
//! duplicate no-ops and reorg unwinding all resolve here; cancellation is
//! honored between blocks, never inside one.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use config::Config;
use deadpool_postgres::Pool;
use ubrc20_postgres::{pg_begin, pg_pool, pg_pool_client};
use ubrc20_types::BitcoinBlockData;

use crate::core::pipeline::{process_block, BlockCommitOutcome};
use crate::core::processors::Registry;
use crate::core::validation::legacy::LegacyTokenOracle;
use crate::db::index_pg;
use crate::utils::bitcoind::{
    bitcoind_get_block_height, build_http_client, download_and_parse_block_with_retry,
    retrieve_block_hash_with_retry, standardize_bitcoin_block,
};
use crate::utils::cache::HotCache;
use crate::utils::monitoring::{start_serving_prometheus_metrics, PrometheusMonitoring};
use crate::utils::Context;
use crate::{try_info, try_warn};

const IDLE_POLL_SECS: u64 = 10;

pub struct Service {
    pub config: Config,
    pub ctx: Context,
    pub prometheus: PrometheusMonitoring,
    pg_pool: Pool,
    registry: Registry,
    hot_cache: RefCell<HotCache>,
    legacy_oracle: Option<LegacyTokenOracle>,
    http_client: reqwest::Client,
    stop_signal: Arc<AtomicBool>,
}

impl Service {
    pub fn new(config: &Config, ctx: &Context) -> Result<Self, String> {
        let legacy_oracle = match &config.indexer.legacy_oracle_url {
            Some(url) => Some(LegacyTokenOracle::new(url)?),
            None => None,
        };
        Ok(Service {
            config: config.clone(),
            ctx: ctx.clone(),
            prometheus: PrometheusMonitoring::new(),
            pg_pool: pg_pool(&config.db)?,
            registry: Registry::standard(config)?,
            hot_cache: RefCell::new(HotCache::new(config.indexer.lru_cache_size)),
            legacy_oracle,
            http_client: build_http_client(config.resources.bitcoind_rpc_timeout),
            stop_signal: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Handle used by the CLI to request a stop; checked between blocks.
    pub fn stop_signal(&self) -> Arc<AtomicBool> {
        self.stop_signal.clone()
    }

    fn should_stop(&self) -> bool {
        self.stop_signal.load(Ordering::SeqCst)
    }

    /// Highest committed block height, if any.
    pub async fn get_index_chain_tip(&self) -> Result<Option<u64>, String> {
        let client = pg_pool_client(&self.pg_pool).await?;
        index_pg::get_chain_tip_block_height(&client).await
    }

    /// Starts the service: metrics endpoint plus the catch-up/stream loop.
    pub async fn run(&self) -> Result<(), String> {
        if let Some(metrics) = &self.config.metrics {
            if metrics.enabled {
                let port = metrics.prometheus_port;
                let registry = self.prometheus.registry.clone();
                let ctx = self.ctx.clone();
                let _ = std::thread::spawn(move || {
                    let _ = hiro_system_kit::nestable_block_on(start_serving_prometheus_metrics(
                        port, registry, ctx,
                    ));
                });
            }
        }
        let index_tip = self.get_index_chain_tip().await?.unwrap_or(0);
        self.prometheus.initialize(index_tip);

        loop {
            self.catch_up_to_bitcoin_chain_tip().await?;
            if self.should_stop() {
                try_info!(self.ctx, "Service: Stop requested, shutting down");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_secs(IDLE_POLL_SECS)).await;
        }
    }

    /// Processes every block between the index tip and the node tip, in
    /// order. Returns once the index has caught up (or a stop was
    /// requested); reorgs rewind the cursor and reprocessing continues
    /// forward from the common ancestor.
    pub async fn catch_up_to_bitcoin_chain_tip(&self) -> Result<(), String> {
        let node_tip =
            bitcoind_get_block_height(&self.http_client, &self.config.bitcoind, &self.ctx).await;
        self.prometheus.bitcoind_chain_tip.set(node_tip);
        let mut cursor = match self.get_index_chain_tip().await? {
            Some(index_tip) => index_tip + 1,
            None => self.config.indexer.start_block_height,
        };
        if cursor <= node_tip {
            try_info!(
                self.ctx,
                "Service: Indexing blocks #{cursor} through #{node_tip}"
            );
        }

        'catch_up: while cursor <= node_tip {
            if self.should_stop() {
                return Ok(());
            }
            let batch_end =
                (cursor + self.config.indexer.batch_size.max(1) as u64 - 1).min(node_tip);
            let mut blocks = vec![];
            for block_height in cursor..=batch_end {
                let block_hash = retrieve_block_hash_with_retry(
                    &self.http_client,
                    block_height,
                    &self.config.bitcoind,
                    &self.ctx,
                )
                .await?;
                let raw_block = download_and_parse_block_with_retry(
                    &self.http_client,
                    &block_hash,
                    &self.config.bitcoind,
                    &self.ctx,
                )
                .await?;
                blocks.push(standardize_bitcoin_block(
                    raw_block,
                    &self.config.bitcoind.network,
                )?);
            }

            for mut block in blocks.into_iter() {
                if self.should_stop() {
                    return Ok(());
                }
                let block_height = block.block_identifier.index;
                match self.process_one_block(&mut block).await? {
                    BlockCommitOutcome::Committed {
                        operations_found,
                        operations_valid,
                    } => {
                        self.prometheus.block_indexed(
                            block_height,
                            operations_found,
                            operations_valid,
                        );
                        cursor = block_height + 1;
                    }
                    BlockCommitOutcome::DuplicateNoop => {
                        cursor = block_height + 1;
                    }
                    BlockCommitOutcome::ReorgDetected => {
                        let ancestor = self.handle_reorg(block_height).await?;
                        cursor = ancestor + 1;
                        continue 'catch_up;
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs one block through the pipeline inside its own transaction,
    /// committing only on success.
    async fn process_one_block(
        &self,
        block: &mut BitcoinBlockData,
    ) -> Result<BlockCommitOutcome, String> {
        let mut pg_client = pg_pool_client(&self.pg_pool).await?;
        let db_tx = pg_begin(&mut pg_client).await?;
        let outcome = process_block(
            block,
            &self.registry,
            &self.config,
            &self.hot_cache,
            self.legacy_oracle.as_ref(),
            &db_tx,
            &self.ctx,
        )
        .await?;
        match outcome {
            BlockCommitOutcome::Committed { .. } => {
                db_tx
                    .commit()
                    .await
                    .map_err(|e| format!("unable to commit block transaction: {e}"))?;
            }
            BlockCommitOutcome::DuplicateNoop | BlockCommitOutcome::ReorgDetected => {
                db_tx
                    .rollback()
                    .await
                    .map_err(|e| format!("unable to roll back block transaction: {e}"))?;
            }
        }
        Ok(outcome)
    }

    /// Reorg controller: walks `(height, block_hash)` pairs backward until
    /// the index and the node agree, then unwinds the index to that common
    /// ancestor. Reorgs deeper than `max_reorg_depth` are fatal.
    pub async fn handle_reorg(&self, reorg_height: u64) -> Result<u64, String> {
        try_warn!(
            self.ctx,
            "Service: Chain reorganization detected at block #{reorg_height}"
        );
        let mut common_ancestor = None;
        for depth in 1..=self.config.indexer.max_reorg_depth {
            let Some(height) = reorg_height.checked_sub(depth) else {
                common_ancestor = Some(0);
                break;
            };
            let client = pg_pool_client(&self.pg_pool).await?;
            let Some(stored) = index_pg::get_processed_block(height, &client).await? else {
                // Nothing committed at this height; everything above it is
                // being replaced anyway.
                common_ancestor = Some(height);
                break;
            };
            let node_hash = retrieve_block_hash_with_retry(
                &self.http_client,
                height,
                &self.config.bitcoind,
                &self.ctx,
            )
            .await?;
            if stored.block_hash == node_hash {
                common_ancestor = Some(height);
                break;
            }
        }
        let Some(common_ancestor) = common_ancestor else {
            return Err(format!(
                "reorg at block #{reorg_height} exceeds max depth {}",
                self.config.indexer.max_reorg_depth
            ));
        };

        let mut pg_client = pg_pool_client(&self.pg_pool).await?;
        let db_tx = pg_begin(&mut pg_client).await?;
        index_pg::roll_back_to_height(common_ancestor, &db_tx).await?;
        db_tx
            .commit()
            .await
            .map_err(|e| format!("unable to commit reorg rollback: {e}"))?;

        self.hot_cache.borrow_mut().clear();
        self.prometheus.reorgs_handled.inc();
        try_info!(
            self.ctx,
            "Service: Rolled back to common ancestor #{common_ancestor}"
        );
        Ok(common_ancestor)
    }

    /// Drops every block above `height` from the index. Exposed for the
    /// CLI's manual rollback command; uses the same unwinding as the reorg
    /// controller.
    pub async fn rollback_to(&self, height: u64) -> Result<(), String> {
        let mut pg_client = pg_pool_client(&self.pg_pool).await?;
        let db_tx = pg_begin(&mut pg_client).await?;
        index_pg::roll_back_to_height(height, &db_tx).await?;
        db_tx
            .commit()
            .await
            .map_err(|e| format!("unable to commit rollback: {e}"))?;
        self.hot_cache.borrow_mut().clear();
        Ok(())
    }
}
