use bitcoin::Network;

use crate::toml::ConfigToml;

pub const DEFAULT_ULIMIT: usize = 2048;
pub const DEFAULT_MEMORY_AVAILABLE: usize = 8;
pub const DEFAULT_BITCOIND_RPC_THREADS: usize = 4;
pub const DEFAULT_BITCOIND_RPC_TIMEOUT: u32 = 15;
pub const DEFAULT_LRU_CACHE_SIZE: usize = 50_000;
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_REORG_DEPTH: u64 = 100;

/// Height at which the OP_RETURN-first position rule activates for simple
/// transfers and mints. Marketplace transfers are exempt at all heights.
pub const DEFAULT_OP_RETURN_POSITION_THRESHOLD: u64 = 984_444;

/// Timestamp of the Bitcoin genesis block, used as the lower bound when
/// validating block header timestamps.
pub const BITCOIN_GENESIS_TIMESTAMP: u32 = 1_231_006_505;

#[derive(Clone, Debug)]
pub struct Config {
    pub bitcoind: BitcoindConfig,
    pub db: PgDatabaseConfig,
    pub indexer: IndexerConfig,
    pub extensions: ExtensionsConfig,
    pub resources: ResourcesConfig,
    pub metrics: Option<MetricsConfig>,
}

#[derive(Clone, Debug)]
pub struct BitcoindConfig {
    pub network: Network,
    pub rpc_url: String,
    pub rpc_username: String,
    pub rpc_password: String,
}

/// A Postgres configuration for a single database.
#[derive(Clone, Debug)]
pub struct PgDatabaseConfig {
    pub dbname: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub search_path: Option<String>,
    pub pool_max_size: Option<usize>,
}

/// Knobs consumed by the block pipeline and validator. No other options
/// affect consensus behavior.
#[derive(Clone, Debug)]
pub struct IndexerConfig {
    /// First block height to index when the database is empty.
    pub start_block_height: u64,
    /// Number of blocks requested from bitcoind per fetch round.
    pub batch_size: usize,
    /// Reorganizations deeper than this are fatal.
    pub max_reorg_depth: u64,
    /// Activation height for the OP_RETURN-first position rule.
    pub op_return_position_threshold: u64,
    /// Lower bound for block header timestamps.
    pub bitcoin_genesis_timestamp: u32,
    /// Base URL of the legacy token oracle. When unset, deploys skip the
    /// legacy conflict check.
    pub legacy_oracle_url: Option<String>,
    pub lru_cache_size: usize,
}

/// Extension processor toggles. Operation names map to processors shipped
/// with the indexer; unknown names are rejected at startup.
#[derive(Clone, Debug)]
pub struct ExtensionsConfig {
    pub enabled: bool,
    pub enabled_ops: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub prometheus_port: u16,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ResourcesConfig {
    pub ulimit: usize,
    pub cpu_core_available: usize,
    pub memory_available: usize,
    pub bitcoind_rpc_threads: usize,
    pub bitcoind_rpc_timeout: u32,
}

impl ResourcesConfig {
    pub fn get_optimal_thread_pool_capacity(&self) -> usize {
        // One thread feeds the pool, another handles the reduce step.
        self.cpu_core_available.saturating_sub(2).max(1)
    }
}

impl Config {
    pub fn from_file_path(file_path: &str) -> Result<Config, String> {
        ConfigToml::config_from_file_path(file_path)
    }

    pub fn devnet_default() -> Config {
        Config {
            bitcoind: BitcoindConfig {
                rpc_url: "http://0.0.0.0:18443".into(),
                rpc_username: "devnet".into(),
                rpc_password: "devnet".into(),
                network: Network::Regtest,
            },
            db: PgDatabaseConfig {
                dbname: "ubrc20".to_string(),
                host: "localhost".to_string(),
                port: 5432,
                user: "postgres".to_string(),
                password: Some("postgres".to_string()),
                search_path: None,
                pool_max_size: None,
            },
            indexer: IndexerConfig {
                start_block_height: 0,
                batch_size: DEFAULT_BATCH_SIZE,
                max_reorg_depth: DEFAULT_MAX_REORG_DEPTH,
                op_return_position_threshold: DEFAULT_OP_RETURN_POSITION_THRESHOLD,
                bitcoin_genesis_timestamp: BITCOIN_GENESIS_TIMESTAMP,
                legacy_oracle_url: None,
                lru_cache_size: DEFAULT_LRU_CACHE_SIZE,
            },
            extensions: ExtensionsConfig {
                enabled: false,
                enabled_ops: vec![],
            },
            resources: ResourcesConfig {
                cpu_core_available: num_cpus::get(),
                memory_available: DEFAULT_MEMORY_AVAILABLE,
                ulimit: DEFAULT_ULIMIT,
                bitcoind_rpc_threads: DEFAULT_BITCOIND_RPC_THREADS,
                bitcoind_rpc_timeout: DEFAULT_BITCOIND_RPC_TIMEOUT,
            },
            metrics: Some(MetricsConfig {
                enabled: true,
                prometheus_port: 9153,
            }),
        }
    }

    pub fn testnet_default() -> Config {
        let mut default = Config::devnet_default();
        default.bitcoind.network = Network::Testnet;
        default
    }

    pub fn mainnet_default() -> Config {
        let mut default = Config::devnet_default();
        default.bitcoind.rpc_url = "http://localhost:8332".into();
        default.bitcoind.network = Network::Bitcoin;
        default
    }

    // TODO: Move this to a shared test utils component
    pub fn test_default() -> Config {
        let mut config = Self::mainnet_default();
        config.resources.bitcoind_rpc_threads = 1;
        config.resources.cpu_core_available = 1;
        config.extensions.enabled = true;
        config.extensions.enabled_ops =
            vec!["swap".to_string(), "test".to_string(), "poisson".to_string()];
        config
    }
}
