//! Client for the legacy token oracle.
//!
//! Deploys are checked against the pre-existing inscription-based token
//! index. The oracle is advisory infrastructure: transport errors and
//! malformed responses fail open so that oracle downtime can never stall
//! the writer.

use std::time::Duration;

use serde_json::Value;

use super::{ErrorCode, ValidationResult};

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyTokenInfo {
    pub ticker: String,
    pub block_height: Option<u64>,
    pub max_supply: Option<String>,
    pub decimals: Option<i64>,
    pub deploy_inscription_id: Option<String>,
    pub deployer_address: Option<String>,
}

pub struct LegacyTokenOracle {
    base_url: String,
    client: reqwest::Client,
}

impl LegacyTokenOracle {
    pub fn new(base_url: &str) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| format!("unable to build legacy oracle client: {e}"))?;
        Ok(LegacyTokenOracle {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Queries the oracle for a ticker. `None` covers both "not found" and
    /// every failure mode.
    pub async fn check_token_exists(&self, ticker: &str) -> Option<LegacyTokenInfo> {
        let url = format!("{}/v1/brc20/ticker/{ticker}", self.base_url);
        let response = self.client.get(&url).send().await.ok()?;
        if !response.status().is_success() {
            return None;
        }
        let body: Value = response.json().await.ok()?;
        if !body["error"].is_null() {
            return None;
        }
        let result = body.get("result")?;
        if result.is_null() {
            return None;
        }
        Some(LegacyTokenInfo {
            ticker: ticker.to_string(),
            block_height: value_as_u64(&result["block_height"]),
            max_supply: value_as_string(&result["max_supply"]),
            decimals: result["decimals"].as_i64(),
            deploy_inscription_id: value_as_string(&result["deploy_inscription_id"]),
            deployer_address: value_as_string(&result["deployer_address"]),
        })
    }

    /// A deploy is blocked only when the oracle reports a prior deploy at or
    /// before the current block height; a strictly later legacy deploy, or
    /// no verdict at all, lets the deploy proceed.
    pub async fn validate_deploy(&self, ticker: &str, block_height: u64) -> ValidationResult {
        let Some(legacy) = self.check_token_exists(ticker).await else {
            return ValidationResult::valid();
        };
        legacy_deploy_verdict(legacy.block_height, block_height)
    }
}

pub fn legacy_deploy_verdict(
    legacy_height: Option<u64>,
    block_height: u64,
) -> ValidationResult {
    let Some(legacy_height) = legacy_height else {
        return ValidationResult::valid();
    };
    if legacy_height <= block_height {
        return ValidationResult::invalid(
            ErrorCode::LegacyTokenExists,
            format!("Token already deployed on Ordinals at block {legacy_height}"),
        );
    }
    ValidationResult::valid()
}

/// The oracle serializes heights inconsistently (numbers or strings).
fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
