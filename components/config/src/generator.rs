pub fn generate_toml_config(network: &str) -> String {
    let conf = format!(
        r#"[bitcoind]
network = "{network}"
rpc_url = "http://localhost:8332"
rpc_username = "devnet"
rpc_password = "devnet"

[db]
database = "ubrc20"
host = "localhost"
port = 5432
username = "postgres"
password = "postgres"

[indexer]
start_block_height = 0
batch_size = 10
max_reorg_depth = 100
op_return_position_threshold = 984444
# legacy_oracle_url = "http://localhost:3003"
lru_cache_size = 10000

[extensions]
enabled = true
enabled_ops = ["swap", "test", "poisson"]

[metrics]
enabled = true
prometheus_port = 9153

[resources]
ulimit = 2048
cpu_core_available = 6
memory_available = 16
bitcoind_rpc_threads = 2
bitcoind_rpc_timeout = 15
"#,
        network = network.to_lowercase(),
    );
    conf
}
