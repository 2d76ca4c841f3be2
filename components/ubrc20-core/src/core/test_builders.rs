//! Builders for the Bitcoin data structures exercised by unit tests.

use std::sync::OnceLock;

use bitcoin::Network;
use ubrc20_types::{
    BitcoinBlockData, BitcoinBlockMetadata, BitcoinNetwork, BitcoinTransactionData,
    BitcoinTransactionMetadata, BlockIdentifier, OutPoint, TransactionIdentifier, TxIn, TxOut,
};

use crate::core::processors::OperationContext;
use crate::core::protocol::classify::TransferType;
use crate::core::protocol::parser::ParsedDeploy;
use crate::db::models::DbDeploy;

pub fn test_deploy(ticker: &str, max_supply: &str) -> DbDeploy {
    test_deploy_with_limit(ticker, max_supply, None)
}

pub fn test_deploy_with_limit(
    ticker: &str,
    max_supply: &str,
    limit_per_op: Option<&str>,
) -> DbDeploy {
    DbDeploy {
        ticker: ticker.to_uppercase(),
        max_supply: max_supply.to_string(),
        remaining_supply: max_supply.to_string(),
        limit_per_op: limit_per_op.map(str::to_string),
        deploy_txid: hex::encode([0xddu8; 32]),
        deploy_height: 790_000,
        deploy_timestamp: 1_677_649_200,
        deployer_address: Some("bc1qdeployer".to_string()),
    }
}

pub fn parsed_deploy(tick: &str, max_supply: &str, limit_per_op: Option<&str>) -> ParsedDeploy {
    ParsedDeploy {
        tick: tick.to_uppercase(),
        max_supply: max_supply.to_string(),
        limit_per_op: limit_per_op.map(str::to_string),
    }
}

pub struct TestTxOutBuilder {
    value: u64,
    script_pubkey: String,
    script_type: Option<String>,
    address: Option<String>,
    script_asm: Option<String>,
}

impl TestTxOutBuilder {
    pub fn new() -> Self {
        TestTxOutBuilder {
            value: 10_000,
            script_pubkey: "0x51".to_string(),
            script_type: None,
            address: None,
            script_asm: None,
        }
    }

    pub fn value(mut self, value: u64) -> Self {
        self.value = value;
        self
    }

    pub fn script(mut self, script_hex: &str) -> Self {
        self.script_pubkey = format!("0x{script_hex}");
        self
    }

    pub fn p2pkh(self, fill: u8) -> Self {
        let script = format!("76a914{}88ac", hex::encode([fill; 20]));
        self.script(&script)
    }

    pub fn op_return(self, payload: &[u8]) -> Self {
        let script = if payload.len() <= 75 {
            format!("6a{:02x}{}", payload.len(), hex::encode(payload))
        } else {
            format!("6a4c{:02x}{}", payload.len(), hex::encode(payload))
        };
        self.script(&script)
    }

    pub fn address(mut self, address: &str) -> Self {
        self.address = Some(address.to_string());
        self
    }

    pub fn asm(mut self, asm: &str) -> Self {
        self.script_asm = Some(asm.to_string());
        self
    }

    pub fn build(self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.script_pubkey,
            script_type: self.script_type,
            address: self.address,
            script_asm: self.script_asm,
        }
    }
}

pub struct TestTxInBuilder {
    witness: Vec<String>,
    prevout_address: Option<String>,
}

impl TestTxInBuilder {
    pub fn new() -> Self {
        TestTxInBuilder {
            witness: vec![],
            prevout_address: None,
        }
    }

    pub fn witness(mut self, witness: Vec<String>) -> Self {
        self.witness = witness;
        self
    }

    pub fn prevout_address(mut self, address: &str) -> Self {
        self.prevout_address = Some(address.to_string());
        self
    }

    pub fn build(self) -> TxIn {
        TxIn {
            previous_output: OutPoint {
                txid: TransactionIdentifier::new(&hex::encode([0xcc; 32])),
                vout: 0,
                value: 20_000,
                address: self.prevout_address,
            },
            script_sig: String::new(),
            sequence: 0xffffffff,
            witness: self.witness,
        }
    }
}

pub struct TestTransactionBuilder {
    txid: String,
    index: u32,
    inputs: Vec<TxIn>,
    outputs: Vec<TxOut>,
}

impl TestTransactionBuilder {
    pub fn new() -> Self {
        TestTransactionBuilder {
            txid: hex::encode([0xaa; 32]),
            index: 0,
            inputs: vec![],
            outputs: vec![],
        }
    }

    pub fn txid_fill(mut self, fill: u8) -> Self {
        self.txid = hex::encode([fill; 32]);
        self
    }

    pub fn index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    pub fn add_input(mut self, input: TxIn) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn add_output(mut self, output: TxOut) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn build(self) -> BitcoinTransactionData {
        BitcoinTransactionData {
            transaction_identifier: TransactionIdentifier::new(&self.txid),
            metadata: BitcoinTransactionMetadata {
                inputs: self.inputs,
                outputs: self.outputs,
                fee: 0,
                index: self.index,
                token_operation: None,
            },
        }
    }
}

pub struct TestBlockBuilder {
    height: u64,
    hash: String,
    parent_hash: String,
    timestamp: u32,
    transactions: Vec<BitcoinTransactionData>,
}

impl TestBlockBuilder {
    pub fn new() -> Self {
        TestBlockBuilder {
            height: 800_000,
            hash: format!("0x{}", hex::encode([0x11; 32])),
            parent_hash: format!("0x{}", hex::encode([0x10; 32])),
            timestamp: 1_677_649_200,
            transactions: vec![],
        }
    }

    pub fn height(mut self, height: u64) -> Self {
        self.height = height;
        self
    }

    pub fn hash(mut self, hash: &str) -> Self {
        self.hash = hash.to_string();
        self
    }

    pub fn timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn add_transaction(mut self, transaction: BitcoinTransactionData) -> Self {
        self.transactions.push(transaction);
        self
    }

    pub fn build(self) -> BitcoinBlockData {
        BitcoinBlockData {
            block_identifier: BlockIdentifier {
                index: self.height,
                hash: self.hash,
            },
            parent_block_identifier: BlockIdentifier {
                index: self.height.saturating_sub(1),
                hash: self.parent_hash,
            },
            timestamp: self.timestamp,
            transactions: self.transactions,
            metadata: BitcoinBlockMetadata {
                network: BitcoinNetwork::Mainnet,
            },
        }
    }
}

fn default_context_tx() -> &'static BitcoinTransactionData {
    static DEFAULT: OnceLock<BitcoinTransactionData> = OnceLock::new();
    DEFAULT.get_or_init(|| {
        TestTransactionBuilder::new()
            .add_output(TestTxOutBuilder::new().op_return(b"payload").build())
            .add_output(
                TestTxOutBuilder::new()
                    .p2pkh(0x0f)
                    .address("1RecipientAddress")
                    .build(),
            )
            .build()
    })
}

pub struct TestOperationContextBuilder<'a> {
    tx: Option<&'a BitcoinTransactionData>,
    block_height: u64,
    timestamp: u32,
    sender_address: Option<String>,
    transfer_type: TransferType,
    raw_payload_hex: String,
}

impl<'a> TestOperationContextBuilder<'a> {
    pub fn new() -> Self {
        TestOperationContextBuilder {
            tx: None,
            block_height: 800_000,
            timestamp: 1_677_649_200,
            sender_address: None,
            transfer_type: TransferType::Simple,
            raw_payload_hex: hex::encode(b"payload"),
        }
    }

    pub fn tx(mut self, tx: &'a BitcoinTransactionData) -> Self {
        self.tx = Some(tx);
        self
    }

    pub fn block_height(mut self, block_height: u64) -> Self {
        self.block_height = block_height;
        self
    }

    pub fn sender(mut self, sender: &str) -> Self {
        self.sender_address = Some(sender.to_string());
        self
    }

    pub fn transfer_type(mut self, transfer_type: TransferType) -> Self {
        self.transfer_type = transfer_type;
        self
    }

    pub fn raw_payload_hex(mut self, raw_payload_hex: &str) -> Self {
        self.raw_payload_hex = raw_payload_hex.to_string();
        self
    }

    pub fn build(&self) -> OperationContext<'a> {
        let tx = self.tx.unwrap_or_else(|| default_context_tx());
        OperationContext {
            tx,
            block_identifier: BlockIdentifier {
                index: self.block_height,
                hash: format!("0x{}", hex::encode([0x11; 32])),
            },
            timestamp: self.timestamp,
            tx_index: tx.metadata.index as u64,
            vout_index: 0,
            raw_payload_hex: self.raw_payload_hex.clone(),
            parsed_json: None,
            sender_address: self.sender_address.clone(),
            transfer_type: self.transfer_type,
            network: Network::Bitcoin,
        }
    }
}
