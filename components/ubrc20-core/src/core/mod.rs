pub mod amounts;
pub mod pipeline;
pub mod processors;
pub mod protocol;
pub mod state;
pub mod validation;

#[cfg(test)]
pub mod test_builders;

/// Protocol tag expected in every JSON payload (`"p"` field).
pub const PROTOCOL_TAG: &str = "brc-20";

/// Upper bound for the `lock` field of timelocked swap positions.
pub const MAX_LOCK_BLOCKS: u64 = 1_000_000_000_000_000;

/// Ticker identity is case-insensitive; the upper-case form is canonical and
/// is the only form that crosses module boundaries past this fold. The
/// literal ticker `"0"` is valid and distinct from an absent ticker.
pub fn fold_ticker(tick: &str) -> String {
    tick.to_uppercase()
}

/// Canonical pool id for a swap pair: both tickers folded, joined
/// alphabetically with a dash, e.g. `LOL-WTF`.
pub fn pool_id(a: &str, b: &str) -> String {
    let mut pair = [fold_ticker(a), fold_ticker(b)];
    pair.sort();
    pair.join("-")
}
