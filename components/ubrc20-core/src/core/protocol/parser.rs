//! Decodes the embedded byte payload into a normalized token operation.
//!
//! The parser is deliberately shallow: it establishes shape (required fields
//! present, tick normalized to its canonical fold) and leaves amount and
//! consensus checks to the validator. Unknown `op` values are passed through
//! for the processor registry to resolve.

use serde_json::Value;

use crate::core::validation::ErrorCode;
use crate::core::{fold_ticker, MAX_LOCK_BLOCKS, PROTOCOL_TAG};

/// Exact byte pattern recognized as a participative-mint entry. These
/// payloads are plain text, not JSON.
pub const PARTICIPATION_PATTERN: &str = "<o()))><";

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDeploy {
    pub tick: String,
    pub max_supply: String,
    pub limit_per_op: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTokenAmount {
    pub tick: String,
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSwapInit {
    pub src: String,
    pub dst: String,
    pub amount: String,
    pub lock_blocks: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExtensionOp {
    pub op_name: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOperation {
    Deploy(ParsedDeploy),
    Mint(ParsedTokenAmount),
    Transfer(ParsedTokenAmount),
    SwapInit(ParsedSwapInit),
    Extension(ParsedExtensionOp),
}

impl ParsedOperation {
    pub fn op_name(&self) -> &str {
        match self {
            ParsedOperation::Deploy(_) => "deploy",
            ParsedOperation::Mint(_) => "mint",
            ParsedOperation::Transfer(_) => "transfer",
            ParsedOperation::SwapInit(_) => "swap",
            ParsedOperation::Extension(op) => &op.op_name,
        }
    }

    pub fn ticker(&self) -> Option<&str> {
        match self {
            ParsedOperation::Deploy(op) => Some(&op.tick),
            ParsedOperation::Mint(op) | ParsedOperation::Transfer(op) => Some(&op.tick),
            ParsedOperation::SwapInit(op) => Some(&op.src),
            ParsedOperation::Extension(_) => None,
        }
    }

    pub fn amount(&self) -> Option<&str> {
        match self {
            ParsedOperation::Deploy(_) => None,
            ParsedOperation::Mint(op) | ParsedOperation::Transfer(op) => Some(&op.amount),
            ParsedOperation::SwapInit(op) => Some(&op.amount),
            ParsedOperation::Extension(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub error_code: ErrorCode,
    pub error_message: String,
}

impl ParseError {
    fn new(error_code: ErrorCode, error_message: String) -> Self {
        ParseError {
            error_code,
            error_message,
        }
    }

    fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("missing required field: {field}"),
        )
    }
}

/// Parses a data-output payload.
///
/// - `Ok(Some(op))`: a recognized operation shape.
/// - `Ok(None)`: not a payload of this protocol; the transaction is skipped
///   without an operation log entry.
/// - `Err(e)`: a protocol payload that fails to decode; logged invalid with
///   a null ticker and amount.
pub fn parse_token_operation(payload: &[u8]) -> Result<Option<ParsedOperation>, ParseError> {
    if let Ok(text) = std::str::from_utf8(payload) {
        if text.contains(PARTICIPATION_PATTERN) {
            return Ok(Some(ParsedOperation::Extension(ParsedExtensionOp {
                op_name: "poisson".to_string(),
                payload: Value::Null,
            })));
        }
    }

    let value: Value = serde_json::from_slice(payload).map_err(|e| {
        ParseError::new(ErrorCode::InvalidJson, format!("payload is not JSON: {e}"))
    })?;
    let Some(object) = value.as_object() else {
        return Err(ParseError::new(
            ErrorCode::InvalidJson,
            "payload is not a JSON object".to_string(),
        ));
    };
    match object.get("p").and_then(|p| p.as_str()) {
        Some(protocol) if protocol.eq_ignore_ascii_case(PROTOCOL_TAG) => {}
        _ => return Ok(None),
    }
    let Some(op) = object.get("op").and_then(|op| op.as_str()) else {
        return Err(ParseError::missing_field("op"));
    };

    match op {
        "deploy" => {
            let tick = required_string(object, "tick")?;
            // Two accepted spellings for the supply fields.
            let (max_supply, limit_per_op) = if object.contains_key("m") {
                (required_string(object, "m")?, optional_string(object, "l"))
            } else if object.contains_key("max") {
                (
                    required_string(object, "max")?,
                    optional_string(object, "lim"),
                )
            } else {
                return Err(ParseError::missing_field("m|max"));
            };
            Ok(Some(ParsedOperation::Deploy(ParsedDeploy {
                tick: fold_ticker(&tick),
                max_supply,
                limit_per_op,
            })))
        }
        "mint" | "transfer" => {
            let tick = required_string(object, "tick")?;
            let amount = required_string(object, "amt")?;
            let parsed = ParsedTokenAmount {
                tick: fold_ticker(&tick),
                amount,
            };
            Ok(Some(match op {
                "mint" => ParsedOperation::Mint(parsed),
                _ => ParsedOperation::Transfer(parsed),
            }))
        }
        "swap" => {
            let init = required_string(object, "init")?;
            let amount = required_string(object, "amt")?;
            let lock = required_string(object, "lock")?;
            let Some((src, dst)) = init.split_once(',') else {
                return Err(ParseError::new(
                    ErrorCode::InvalidOperation,
                    format!("swap init must name a SRC,DST pair: {init}"),
                ));
            };
            let lock_blocks = lock.trim().parse::<u64>().map_err(|_| {
                ParseError::new(
                    ErrorCode::InvalidOperation,
                    format!("swap lock is not an integer: {lock}"),
                )
            })?;
            if lock_blocks < 1 || lock_blocks > MAX_LOCK_BLOCKS {
                return Err(ParseError::new(
                    ErrorCode::InvalidOperation,
                    format!("swap lock out of range: {lock_blocks}"),
                ));
            }
            Ok(Some(ParsedOperation::SwapInit(ParsedSwapInit {
                src: fold_ticker(src.trim()),
                dst: fold_ticker(dst.trim()),
                amount,
                lock_blocks,
            })))
        }
        other => Ok(Some(ParsedOperation::Extension(ParsedExtensionOp {
            op_name: other.to_string(),
            payload: value.clone(),
        }))),
    }
}

fn required_string(
    object: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<String, ParseError> {
    match object.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(ParseError::new(
            ErrorCode::MissingField,
            format!("field is not a string: {field}"),
        )),
        None => Err(ParseError::missing_field(field)),
    }
}

fn optional_string(object: &serde_json::Map<String, Value>, field: &str) -> Option<String> {
    match object.get(field) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use test_case::test_case;

    use crate::core::validation::ErrorCode;

    use super::*;

    fn parse(payload: &str) -> Result<Option<ParsedOperation>, ParseError> {
        parse_token_operation(payload.as_bytes())
    }

    #[test]
    fn parses_deploy_with_short_field_names() {
        let op = parse(r#"{"p":"brc-20","op":"deploy","tick":"test","m":"1000000","l":"1000"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            op,
            ParsedOperation::Deploy(ParsedDeploy {
                tick: "TEST".to_string(),
                max_supply: "1000000".to_string(),
                limit_per_op: Some("1000".to_string()),
            })
        );
    }

    #[test]
    fn parses_deploy_with_long_field_names() {
        let op = parse(r#"{"p":"brc-20","op":"deploy","tick":"ordi","max":"21000000","lim":"1000"}"#)
            .unwrap()
            .unwrap();
        let ParsedOperation::Deploy(deploy) = op else {
            panic!();
        };
        assert_eq!(deploy.tick, "ORDI");
        assert_eq!(deploy.max_supply, "21000000");
    }

    #[test]
    fn deploy_without_max_supply_is_a_parse_error() {
        let err = parse(r#"{"p":"brc-20","op":"deploy","tick":"test"}"#).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::MissingField);
    }

    #[test_case(r#"{"p":"brc-20","op":"mint","tick":"Test","amt":"500"}"#, "TEST", "500"; "mint")]
    #[test_case(r#"{"p":"brc-20","op":"transfer","tick":"zero","amt":"1"}"#, "ZERO", "1"; "transfer")]
    fn parses_balance_operations(payload: &str, tick: &str, amt: &str) {
        let op = parse(payload).unwrap().unwrap();
        assert_eq!(op.ticker(), Some(tick));
        assert_eq!(op.amount(), Some(amt));
    }

    #[test]
    fn the_literal_zero_ticker_is_valid() {
        let op = parse(r#"{"p":"brc-20","op":"mint","tick":"0","amt":"10"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(op.ticker(), Some("0"));
    }

    #[test]
    fn parses_swap_init() {
        let op = parse(r#"{"p":"brc-20","op":"swap","init":"lol,WTF","amt":"25","lock":"144"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            op,
            ParsedOperation::SwapInit(ParsedSwapInit {
                src: "LOL".to_string(),
                dst: "WTF".to_string(),
                amount: "25".to_string(),
                lock_blocks: 144,
            })
        );
    }

    #[test_case(r#"{"p":"brc-20","op":"swap","init":"LOLWTF","amt":"25","lock":"144"}"#; "init without pair")]
    #[test_case(r#"{"p":"brc-20","op":"swap","init":"LOL,WTF","amt":"25","lock":"0"}"#; "zero lock")]
    #[test_case(r#"{"p":"brc-20","op":"swap","init":"LOL,WTF","amt":"25","lock":"1000000000000001"}"#; "lock above cap")]
    fn rejects_malformed_swaps(payload: &str) {
        let err = parse(payload).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::InvalidOperation);
    }

    #[test]
    fn unknown_ops_pass_through_to_the_registry() {
        let op = parse(r#"{"p":"brc-20","op":"test","tick":"TEST","amt":"5"}"#)
            .unwrap()
            .unwrap();
        let ParsedOperation::Extension(extension) = op else {
            panic!();
        };
        assert_eq!(extension.op_name, "test");
        assert_eq!(extension.payload["amt"], "5");
    }

    #[test]
    fn participation_pattern_is_recognized_before_json() {
        let op = parse("join the pool <o()))>< thanks").unwrap().unwrap();
        assert_eq!(op.op_name(), "poisson");
    }

    #[test]
    fn foreign_payloads_are_skipped_silently() {
        assert_eq!(parse(r#"{"p":"sns","op":"reg","name":"x"}"#).unwrap(), None);
        assert_eq!(parse(r#"{"op":"mint","tick":"TEST","amt":"1"}"#).unwrap(), None);
    }

    #[test]
    fn garbage_payloads_are_invalid_json() {
        let err = parse("charley loves heidi").unwrap_err();
        assert_eq!(err.error_code, ErrorCode::InvalidJson);
        let err = parse(r#"["brc-20"]"#).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::InvalidJson);
    }

    #[test]
    fn numeric_fields_are_not_accepted() {
        let err = parse(r#"{"p":"brc-20","op":"mint","tick":"TEST","amt":500}"#).unwrap_err();
        assert_eq!(err.error_code, ErrorCode::MissingField);
    }
}
