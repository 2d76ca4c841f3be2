//! Minimal bitcoind JSON-RPC client.
//!
//! The pipeline only ever asks for the chain height, a block hash at a
//! height, and a verbose block payload (verbosity 3, so inputs carry their
//! prevout data). Transport errors retry with a capped backoff; the writer
//! would rather wait on bitcoind than skip a block.

use std::time::Duration;

use bitcoin::Network;
use config::BitcoindConfig;
use serde_json::{json, Value};
use ubrc20_types::{
    BitcoinBlockData, BitcoinBlockMetadata, BitcoinNetwork, BitcoinTransactionData,
    BitcoinTransactionMetadata, BlockIdentifier, OutPoint, TransactionIdentifier, TxIn, TxOut,
};

use crate::try_warn;
use crate::utils::Context;

#[derive(Deserialize, Debug, Clone)]
pub struct BitcoindBlock {
    pub hash: String,
    pub height: u64,
    pub time: u32,
    pub previousblockhash: Option<String>,
    pub tx: Vec<BitcoindTransaction>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BitcoindTransaction {
    pub txid: String,
    pub vin: Vec<BitcoindVin>,
    pub vout: Vec<BitcoindVout>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BitcoindVin {
    pub coinbase: Option<String>,
    pub txid: Option<String>,
    pub vout: Option<u32>,
    #[serde(rename = "scriptSig")]
    pub script_sig: Option<BitcoindScriptSig>,
    pub txinwitness: Option<Vec<String>>,
    pub sequence: Option<u32>,
    pub prevout: Option<BitcoindPrevout>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BitcoindScriptSig {
    pub hex: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BitcoindPrevout {
    pub value: f64,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: BitcoindScriptPubKey,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BitcoindVout {
    pub value: f64,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: BitcoindScriptPubKey,
}

#[derive(Deserialize, Debug, Clone)]
pub struct BitcoindScriptPubKey {
    pub asm: Option<String>,
    pub hex: String,
    #[serde(rename = "type")]
    pub script_type: Option<String>,
    pub address: Option<String>,
    pub addresses: Option<Vec<String>>,
}

impl BitcoindScriptPubKey {
    fn any_address(&self) -> Option<String> {
        if let Some(address) = &self.address {
            return Some(address.clone());
        }
        self.addresses
            .as_ref()
            .and_then(|addresses| addresses.first().cloned())
    }
}

pub fn build_http_client(timeout_secs: u32) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs as u64))
        .build()
        .expect("unable to build http client")
}

async fn bitcoind_rpc_call(
    http_client: &reqwest::Client,
    config: &BitcoindConfig,
    method: &str,
    params: Value,
) -> Result<Value, String> {
    let body = json!({
        "jsonrpc": "1.0",
        "id": "ubrc20",
        "method": method,
        "params": params,
    });
    let response = http_client
        .post(&config.rpc_url)
        .basic_auth(&config.rpc_username, Some(&config.rpc_password))
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("bitcoind rpc transport error: {e}"))?;
    let response: Value = response
        .json()
        .await
        .map_err(|e| format!("bitcoind rpc malformed response: {e}"))?;
    if !response["error"].is_null() {
        return Err(format!("bitcoind rpc error: {}", response["error"]));
    }
    Ok(response["result"].clone())
}

const MAX_BACKOFF_SECS: u64 = 60;

async fn backoff(operation_name: &str, backoff_secs: &mut u64, error: String, ctx: &Context) {
    try_warn!(
        ctx,
        "bitcoind: {operation_name} failed, retrying in {backoff_secs}s: {error}"
    );
    tokio::time::sleep(Duration::from_secs(*backoff_secs)).await;
    *backoff_secs = (*backoff_secs * 2).min(MAX_BACKOFF_SECS);
}

/// Current block count of the node, retried until it answers.
pub async fn bitcoind_get_block_height(
    http_client: &reqwest::Client,
    config: &BitcoindConfig,
    ctx: &Context,
) -> u64 {
    let mut backoff_secs = 1;
    loop {
        let result = bitcoind_rpc_call(http_client, config, "getblockcount", json!([])).await;
        match result {
            Ok(result) => match result.as_u64() {
                Some(height) => return height,
                None => {
                    backoff(
                        "getblockcount",
                        &mut backoff_secs,
                        "non-integer response".to_string(),
                        ctx,
                    )
                    .await
                }
            },
            Err(e) => backoff("getblockcount", &mut backoff_secs, e, ctx).await,
        }
    }
}

pub async fn retrieve_block_hash_with_retry(
    http_client: &reqwest::Client,
    block_height: u64,
    config: &BitcoindConfig,
    ctx: &Context,
) -> Result<String, String> {
    let mut backoff_secs = 1;
    loop {
        let result =
            bitcoind_rpc_call(http_client, config, "getblockhash", json!([block_height])).await;
        match result {
            Ok(result) => match result.as_str() {
                Some(hash) => return Ok(hash.to_string()),
                None => {
                    backoff(
                        "getblockhash",
                        &mut backoff_secs,
                        "non-string response".to_string(),
                        ctx,
                    )
                    .await
                }
            },
            Err(e) => backoff("getblockhash", &mut backoff_secs, e, ctx).await,
        }
    }
}

pub async fn download_and_parse_block_with_retry(
    http_client: &reqwest::Client,
    block_hash: &str,
    config: &BitcoindConfig,
    ctx: &Context,
) -> Result<BitcoindBlock, String> {
    let mut backoff_secs = 1;
    loop {
        let result =
            bitcoind_rpc_call(http_client, config, "getblock", json!([block_hash, 3])).await;
        match result {
            Ok(result) => match serde_json::from_value::<BitcoindBlock>(result) {
                Ok(block) => return Ok(block),
                Err(e) => {
                    backoff(
                        "getblock",
                        &mut backoff_secs,
                        format!("unable to parse verbose block: {e}"),
                        ctx,
                    )
                    .await
                }
            },
            Err(e) => backoff("getblock", &mut backoff_secs, e, ctx).await,
        }
    }
}

fn sats(value: f64) -> u64 {
    (value * 100_000_000.0).round() as u64
}

fn standardize_vin(vin: &BitcoindVin) -> TxIn {
    let witness = vin
        .txinwitness
        .as_ref()
        .map(|items| items.iter().map(|w| format!("0x{w}")).collect())
        .unwrap_or_default();
    TxIn {
        previous_output: OutPoint {
            txid: TransactionIdentifier::new(vin.txid.as_deref().unwrap_or_default()),
            vout: vin.vout.unwrap_or(0),
            value: vin.prevout.as_ref().map(|p| sats(p.value)).unwrap_or(0),
            address: vin
                .prevout
                .as_ref()
                .and_then(|p| p.script_pub_key.any_address()),
        },
        script_sig: vin
            .script_sig
            .as_ref()
            .map(|s| format!("0x{}", s.hex))
            .unwrap_or_default(),
        sequence: vin.sequence.unwrap_or(0),
        witness,
    }
}

fn standardize_vout(vout: &BitcoindVout) -> TxOut {
    TxOut {
        value: sats(vout.value),
        script_pubkey: format!("0x{}", vout.script_pub_key.hex),
        script_type: vout.script_pub_key.script_type.clone(),
        address: vout.script_pub_key.any_address(),
        script_asm: vout.script_pub_key.asm.clone(),
    }
}

fn standardize_network(network: &Network) -> BitcoinNetwork {
    match network {
        Network::Bitcoin => BitcoinNetwork::Mainnet,
        Network::Testnet => BitcoinNetwork::Testnet,
        Network::Signet => BitcoinNetwork::Signet,
        _ => BitcoinNetwork::Regtest,
    }
}

/// Converts a verbose bitcoind block into the standardized shape the
/// pipeline consumes. The coinbase transaction keeps its position and its
/// outputs (the participative-mint extension scans their asm), with a
/// synthetic empty input.
pub fn standardize_bitcoin_block(
    raw_block: BitcoindBlock,
    network: &Network,
) -> Result<BitcoinBlockData, String> {
    let mut transactions = vec![];
    for (index, tx) in raw_block.tx.iter().enumerate() {
        let inputs: Vec<TxIn> = tx
            .vin
            .iter()
            .filter(|vin| vin.coinbase.is_none())
            .map(standardize_vin)
            .collect();
        let outputs: Vec<TxOut> = tx.vout.iter().map(standardize_vout).collect();
        let input_value: u64 = inputs.iter().map(|input| input.previous_output.value).sum();
        let output_value: u64 = outputs.iter().map(|output| output.value).sum();
        transactions.push(BitcoinTransactionData {
            transaction_identifier: TransactionIdentifier::new(&tx.txid),
            metadata: BitcoinTransactionMetadata {
                inputs,
                outputs,
                fee: input_value.saturating_sub(output_value),
                index: index as u32,
                token_operation: None,
            },
        });
    }
    Ok(BitcoinBlockData {
        block_identifier: BlockIdentifier {
            index: raw_block.height,
            hash: format!("0x{}", raw_block.hash),
        },
        parent_block_identifier: BlockIdentifier {
            index: raw_block.height.saturating_sub(1),
            hash: format!("0x{}", raw_block.previousblockhash.unwrap_or_default()),
        },
        timestamp: raw_block.time,
        transactions,
        metadata: BitcoinBlockMetadata {
            network: standardize_network(network),
        },
    })
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn standardizes_a_verbose_block() {
        let raw: BitcoindBlock = serde_json::from_value(json!({
            "hash": "00000000000000000002b1c0a82f1c7f19a4e22f2c1e68b8e8c29a4e6e5a2c11",
            "height": 840000,
            "time": 1713571767,
            "previousblockhash": "00000000000000000000aa0b2c1e68b8e8c29a4e6e5a2c11b1c0a82f1c7f19a4",
            "tx": [
                {
                    "txid": "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16",
                    "vin": [{ "coinbase": "03a0cd0c" }],
                    "vout": [{
                        "value": 3.125,
                        "n": 0,
                        "scriptPubKey": { "hex": "76a914000000000000000000000000000000000000000088ac", "asm": "OP_DUP OP_HASH160", "type": "pubkeyhash", "address": "1MinerAddress" }
                    }]
                },
                {
                    "txid": "a3e1f5a2c11b1c0a82f1c7f19a4e22f2c1e68b8e8c29a4e6e5a2c11b1c0a82f1",
                    "vin": [{
                        "txid": "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16",
                        "vout": 0,
                        "txinwitness": ["3044022083"],
                        "sequence": 4294967293u32,
                        "prevout": {
                            "value": 0.5,
                            "scriptPubKey": { "hex": "0014000000000000000000000000000000000000", "address": "bc1qsender" }
                        }
                    }],
                    "vout": [{
                        "value": 0.4999,
                        "n": 0,
                        "scriptPubKey": { "hex": "6a0474657374", "type": "nulldata" }
                    }]
                }
            ]
        }))
        .unwrap();

        let block = standardize_bitcoin_block(raw, &bitcoin::Network::Bitcoin).unwrap();
        assert_eq!(block.block_identifier.index, 840000);
        assert_eq!(block.timestamp, 1713571767);
        assert_eq!(block.transactions.len(), 2);
        // Coinbase keeps its outputs but carries no inputs.
        assert!(block.transactions[0].metadata.inputs.is_empty());
        assert_eq!(
            block.transactions[0].metadata.outputs[0].address.as_deref(),
            Some("1MinerAddress")
        );
        let spend = &block.transactions[1].metadata;
        assert_eq!(spend.index, 1);
        assert_eq!(
            spend.inputs[0].previous_output.address.as_deref(),
            Some("bc1qsender")
        );
        assert_eq!(spend.inputs[0].previous_output.value, 50_000_000);
        assert_eq!(spend.inputs[0].witness[0], "0x3044022083");
        assert_eq!(spend.outputs[0].value, 49_990_000);
        assert_eq!(spend.fee, 10_000);
    }
}
