//! Script decoding for the unspendable data-carrier outputs the protocol
//! rides in, and address recognition for the standard output shapes tokens
//! can be allocated to.

use bitcoin::{Address, Network, Script};
use ubrc20_types::TxOut;

const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;

pub fn is_op_return_output(output: &TxOut) -> bool {
    if let Some(script_type) = &output.script_type {
        if script_type == "nulldata" {
            return true;
        }
    }
    output
        .get_script_pubkey_bytes()
        .first()
        .map(|b| *b == OP_RETURN)
        .unwrap_or(false)
}

/// Returns the bytes of the first data push following OP_RETURN, or `None`
/// when the script is not a data carrier or carries nothing.
pub fn op_return_payload(script_bytes: &[u8]) -> Option<Vec<u8>> {
    let (&first, mut rest) = script_bytes.split_first()?;
    if first != OP_RETURN {
        return None;
    }
    let length = match *rest.first()? {
        len @ 0x01..=0x4b => {
            rest = &rest[1..];
            len as usize
        }
        OP_PUSHDATA1 => {
            let len = *rest.get(1)? as usize;
            rest = &rest[2..];
            len
        }
        OP_PUSHDATA2 => {
            let len = u16::from_le_bytes([*rest.get(1)?, *rest.get(2)?]) as usize;
            rest = &rest[3..];
            len
        }
        OP_PUSHDATA4 => {
            let len = u32::from_le_bytes([
                *rest.get(1)?,
                *rest.get(2)?,
                *rest.get(3)?,
                *rest.get(4)?,
            ]) as usize;
            rest = &rest[5..];
            len
        }
        _ => return None,
    };
    if rest.len() < length {
        return None;
    }
    Some(rest[..length].to_vec())
}

/// Finds the first unspendable-data output and returns its payload and
/// output index.
pub fn extract_op_return_payload(outputs: &[TxOut]) -> Option<(Vec<u8>, usize)> {
    for (index, output) in outputs.iter().enumerate() {
        if !is_op_return_output(output) {
            continue;
        }
        if let Some(payload) = op_return_payload(&output.get_script_pubkey_bytes()) {
            return Some((payload, index));
        }
        return None;
    }
    None
}

/// Same as [extract_op_return_payload], but only accepts a data output
/// sitting at index 0. Applied to simple transfers and mints once the
/// position rule is active.
pub fn extract_op_return_payload_first_position(outputs: &[TxOut]) -> Option<(Vec<u8>, usize)> {
    match extract_op_return_payload(outputs) {
        Some((payload, 0)) => Some((payload, 0)),
        _ => None,
    }
}

/// Address of the token-allocation output: the output following the data
/// output, skipping any further data outputs.
pub fn output_after_op_return_address(outputs: &[TxOut], network: Network) -> Option<String> {
    let mut past_op_return = false;
    for output in outputs.iter() {
        if is_op_return_output(output) {
            past_op_return = true;
            continue;
        }
        if past_op_return {
            return decode_standard_address(output, network);
        }
    }
    None
}

/// True for the five standard output shapes tokens can be allocated to.
pub fn is_standard_output(script_bytes: &[u8]) -> bool {
    let script = Script::from_bytes(script_bytes);
    script.is_p2pkh()
        || script.is_p2sh()
        || script.is_p2wpkh()
        || script.is_p2wsh()
        || script.is_p2tr()
}

/// Decodes a standard output into a canonical address string, preferring the
/// node's pre-decoded address when present.
pub fn decode_standard_address(output: &TxOut, network: Network) -> Option<String> {
    if let Some(address) = &output.address {
        if !address.is_empty() {
            return Some(address.clone());
        }
    }
    let script_bytes = output.get_script_pubkey_bytes();
    if !is_standard_output(&script_bytes) {
        return None;
    }
    Address::from_script(Script::from_bytes(&script_bytes), network)
        .ok()
        .map(|address| address.to_string())
}

/// True when the transaction has at least one non-data output, a
/// precondition for mint and transfer operations.
pub fn has_standard_output(outputs: &[TxOut]) -> bool {
    outputs.iter().any(|output| !is_op_return_output(output))
}

#[cfg(test)]
mod test {
    use bitcoin::Network;
    use test_case::test_case;

    use crate::core::test_builders::TestTxOutBuilder;

    use super::*;

    fn p2pkh_script(fill: u8) -> String {
        format!("76a914{}88ac", hex::encode([fill; 20]))
    }

    fn op_return_script(payload: &[u8]) -> String {
        format!("6a{:02x}{}", payload.len(), hex::encode(payload))
    }

    #[test]
    fn extracts_payload_and_index() {
        let outputs = vec![
            TestTxOutBuilder::new().script(&p2pkh_script(0)).build(),
            TestTxOutBuilder::new()
                .script(&op_return_script(b"{\"p\":\"brc-20\"}"))
                .build(),
        ];
        let (payload, index) = extract_op_return_payload(&outputs).unwrap();
        assert_eq!(payload, b"{\"p\":\"brc-20\"}");
        assert_eq!(index, 1);
        assert!(extract_op_return_payload_first_position(&outputs).is_none());
    }

    #[test]
    fn accepts_first_position_payloads() {
        let outputs = vec![
            TestTxOutBuilder::new()
                .script(&op_return_script(b"data"))
                .build(),
            TestTxOutBuilder::new().script(&p2pkh_script(1)).build(),
        ];
        let (payload, index) = extract_op_return_payload_first_position(&outputs).unwrap();
        assert_eq!(payload, b"data");
        assert_eq!(index, 0);
    }

    #[test]
    fn bare_op_return_yields_nothing() {
        let outputs = vec![TestTxOutBuilder::new().script("6a").build()];
        assert!(extract_op_return_payload(&outputs).is_none());
    }

    #[test]
    fn parses_pushdata1_payloads() {
        let payload = vec![0x42; 0x54];
        let script = format!("6a4c54{}", hex::encode(&payload));
        assert_eq!(
            op_return_payload(&hex::decode(&script).unwrap()).unwrap(),
            payload
        );
    }

    #[test]
    fn allocation_output_follows_the_data_output() {
        let outputs = vec![
            TestTxOutBuilder::new()
                .script(&op_return_script(b"data"))
                .build(),
            TestTxOutBuilder::new()
                .script(&p2pkh_script(2))
                .address("1RecipientAddress")
                .build(),
        ];
        assert_eq!(
            output_after_op_return_address(&outputs, Network::Bitcoin),
            Some("1RecipientAddress".to_string())
        );
    }

    #[test]
    fn allocation_output_skips_consecutive_data_outputs() {
        let outputs = vec![
            TestTxOutBuilder::new()
                .script(&op_return_script(b"data"))
                .build(),
            TestTxOutBuilder::new()
                .script(&op_return_script(b"more"))
                .build(),
            TestTxOutBuilder::new()
                .script(&p2pkh_script(3))
                .address("1RecipientAddress")
                .build(),
        ];
        assert_eq!(
            output_after_op_return_address(&outputs, Network::Bitcoin),
            Some("1RecipientAddress".to_string())
        );
    }

    #[test]
    fn allocation_output_missing_when_data_output_is_last() {
        let outputs = vec![
            TestTxOutBuilder::new().script(&p2pkh_script(4)).build(),
            TestTxOutBuilder::new()
                .script(&op_return_script(b"data"))
                .build(),
        ];
        assert_eq!(output_after_op_return_address(&outputs, Network::Bitcoin), None);
    }

    #[test_case("76a914000000000000000000000000000000000000000088ac" => true; "p2pkh")]
    #[test_case("a914000000000000000000000000000000000000000087" => true; "p2sh")]
    #[test_case("00140000000000000000000000000000000000000000" => true; "p2wpkh")]
    #[test_case("00200000000000000000000000000000000000000000000000000000000000000000" => true; "p2wsh")]
    #[test_case("51200000000000000000000000000000000000000000000000000000000000000000" => true; "p2tr")]
    #[test_case("6a04deadbeef" => false; "op return")]
    #[test_case("6e" => false; "nonstandard")]
    fn recognizes_standard_outputs(script_hex: &str) -> bool {
        is_standard_output(&hex::decode(script_hex).unwrap())
    }

    #[test]
    fn decodes_addresses_from_script_bytes() {
        let output = TestTxOutBuilder::new().script(&p2pkh_script(5)).build();
        let address = decode_standard_address(&output, Network::Bitcoin).unwrap();
        assert!(address.starts_with('1'));
    }
}
