use crate::rosetta::TransactionIdentifier;

/// A transaction input, as standardized from a verbose bitcoind block.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: String,
    pub sequence: u32,
    /// Witness stack items, 0x-prefixed hex.
    pub witness: Vec<String>,
}

impl TxIn {
    /// Last witness item interpreted as a signature, without the 0x prefix.
    /// Empty witnesses yield `None`.
    pub fn witness_signature_hex(&self) -> Option<&str> {
        self.witness.first().map(|w| {
            if w.starts_with("0x") {
                &w[2..]
            } else {
                w.as_str()
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutPoint {
    pub txid: TransactionIdentifier,
    pub vout: u32,
    pub value: u64,
    /// Address of the spent output, when the node provided prevout data.
    pub address: Option<String>,
}

/// A transaction output. `script_pubkey` carries the raw script bytes;
/// `script_type`, `address` and `script_asm` are the node's pre-decoded
/// views when available. The indexer never depends on more than these.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TxOut {
    pub value: u64,
    /// 0x-prefixed hex script bytes.
    pub script_pubkey: String,
    pub script_type: Option<String>,
    pub address: Option<String>,
    pub script_asm: Option<String>,
}

impl TxOut {
    pub fn get_script_pubkey_bytes(&self) -> Vec<u8> {
        hex::decode(self.get_script_pubkey_hex()).expect("invalid script hex")
    }

    pub fn get_script_pubkey_hex(&self) -> &str {
        if self.script_pubkey.starts_with("0x") {
            &self.script_pubkey[2..]
        } else {
            &self.script_pubkey
        }
    }
}
