use std::fs::File;
use std::io::{BufReader, Read};

use bitcoin::Network;

use crate::{
    BitcoindConfig, Config, ExtensionsConfig, IndexerConfig, MetricsConfig, PgDatabaseConfig,
    ResourcesConfig, BITCOIN_GENESIS_TIMESTAMP, DEFAULT_BATCH_SIZE, DEFAULT_BITCOIND_RPC_THREADS,
    DEFAULT_BITCOIND_RPC_TIMEOUT, DEFAULT_LRU_CACHE_SIZE, DEFAULT_MAX_REORG_DEPTH,
    DEFAULT_MEMORY_AVAILABLE, DEFAULT_OP_RETURN_POSITION_THRESHOLD, DEFAULT_ULIMIT,
};

#[derive(Deserialize, Clone, Debug)]
pub struct PgDatabaseConfigToml {
    pub database: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Option<String>,
    pub search_path: Option<String>,
    pub pool_max_size: Option<usize>,
}

impl PgDatabaseConfigToml {
    fn to_config(self) -> PgDatabaseConfig {
        PgDatabaseConfig {
            dbname: self.database,
            host: self.host,
            port: self.port,
            user: self.username,
            password: self.password,
            search_path: self.search_path,
            pool_max_size: self.pool_max_size,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
pub struct IndexerConfigToml {
    pub start_block_height: u64,
    pub batch_size: Option<usize>,
    pub max_reorg_depth: Option<u64>,
    pub op_return_position_threshold: Option<u64>,
    pub bitcoin_genesis_timestamp: Option<u32>,
    pub legacy_oracle_url: Option<String>,
    pub lru_cache_size: Option<usize>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ExtensionsConfigToml {
    pub enabled: bool,
    pub enabled_ops: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ResourcesConfigToml {
    pub ulimit: Option<usize>,
    pub cpu_core_available: Option<usize>,
    pub memory_available: Option<usize>,
    pub bitcoind_rpc_threads: Option<usize>,
    pub bitcoind_rpc_timeout: Option<u32>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BitcoindConfigToml {
    pub network: String,
    pub rpc_url: String,
    pub rpc_username: String,
    pub rpc_password: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MetricsConfigToml {
    pub enabled: bool,
    pub prometheus_port: u16,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ConfigToml {
    pub bitcoind: BitcoindConfigToml,
    pub db: PgDatabaseConfigToml,
    pub indexer: IndexerConfigToml,
    pub extensions: Option<ExtensionsConfigToml>,
    pub resources: Option<ResourcesConfigToml>,
    pub metrics: Option<MetricsConfigToml>,
}

impl ConfigToml {
    pub fn config_from_file_path(file_path: &str) -> Result<Config, String> {
        let file = File::open(file_path)
            .map_err(|e| format!("unable to read file {}\n{:?}", file_path, e))?;
        let mut file_reader = BufReader::new(file);
        let mut file_buffer = vec![];
        file_reader
            .read_to_end(&mut file_buffer)
            .map_err(|e| format!("unable to read file {}\n{:?}", file_path, e))?;

        let config_file: ConfigToml = match toml::from_slice(&file_buffer) {
            Ok(s) => s,
            Err(e) => {
                return Err(format!("Config file malformatted {}", e));
            }
        };
        ConfigToml::config_from_toml(config_file)
    }

    fn config_from_toml(toml: ConfigToml) -> Result<Config, String> {
        let bitcoin_network = match toml.bitcoind.network.as_str() {
            "devnet" => Network::Regtest,
            "testnet" => Network::Testnet,
            "mainnet" => Network::Bitcoin,
            "signet" => Network::Signet,
            _ => return Err("bitcoind.network not supported".to_string()),
        };
        let indexer = IndexerConfig {
            start_block_height: toml.indexer.start_block_height,
            batch_size: toml.indexer.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            max_reorg_depth: toml
                .indexer
                .max_reorg_depth
                .unwrap_or(DEFAULT_MAX_REORG_DEPTH),
            op_return_position_threshold: toml
                .indexer
                .op_return_position_threshold
                .unwrap_or(DEFAULT_OP_RETURN_POSITION_THRESHOLD),
            bitcoin_genesis_timestamp: toml
                .indexer
                .bitcoin_genesis_timestamp
                .unwrap_or(BITCOIN_GENESIS_TIMESTAMP),
            legacy_oracle_url: toml.indexer.legacy_oracle_url,
            lru_cache_size: toml
                .indexer
                .lru_cache_size
                .unwrap_or(DEFAULT_LRU_CACHE_SIZE),
        };
        let extensions = match toml.extensions {
            Some(extensions) => ExtensionsConfig {
                enabled: extensions.enabled,
                enabled_ops: extensions.enabled_ops.unwrap_or_default(),
            },
            None => ExtensionsConfig {
                enabled: false,
                enabled_ops: vec![],
            },
        };
        let resources = match toml.resources {
            Some(resources) => ResourcesConfig {
                ulimit: resources.ulimit.unwrap_or(DEFAULT_ULIMIT),
                cpu_core_available: resources.cpu_core_available.unwrap_or(num_cpus::get()),
                memory_available: resources
                    .memory_available
                    .unwrap_or(DEFAULT_MEMORY_AVAILABLE),
                bitcoind_rpc_threads: resources
                    .bitcoind_rpc_threads
                    .unwrap_or(DEFAULT_BITCOIND_RPC_THREADS),
                bitcoind_rpc_timeout: resources
                    .bitcoind_rpc_timeout
                    .unwrap_or(DEFAULT_BITCOIND_RPC_TIMEOUT),
            },
            None => ResourcesConfig {
                ulimit: DEFAULT_ULIMIT,
                cpu_core_available: num_cpus::get(),
                memory_available: DEFAULT_MEMORY_AVAILABLE,
                bitcoind_rpc_threads: DEFAULT_BITCOIND_RPC_THREADS,
                bitcoind_rpc_timeout: DEFAULT_BITCOIND_RPC_TIMEOUT,
            },
        };
        let metrics = toml.metrics.map(|metrics| MetricsConfig {
            enabled: metrics.enabled,
            prometheus_port: metrics.prometheus_port,
        });
        let config = Config {
            bitcoind: BitcoindConfig {
                rpc_url: toml.bitcoind.rpc_url.to_string(),
                rpc_username: toml.bitcoind.rpc_username.to_string(),
                rpc_password: toml.bitcoind.rpc_password.to_string(),
                network: bitcoin_network,
            },
            db: toml.db.to_config(),
            indexer,
            extensions,
            resources,
            metrics,
        };
        Ok(config)
    }
}
