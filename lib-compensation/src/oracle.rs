//! Native-currency price feeds
//!
//! Consumed when a participant pays in, or is paid out in, the native
//! currency. Prices are USD per whole native unit with 8 decimals. The
//! ledger aggregates every admin-approved feed: each quote must be fresh and
//! inside the configured bounds, at least `min_oracles` of them must pass,
//! and the median of the passing prices is used. Accounting stays in
//! stable-token units either way.

use std::collections::{BTreeMap, BTreeSet};

use lib_types::{Address, Amount, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::{LedgerError, LedgerResult};
use crate::math::{mul_div, mul_div_ceil, pow10};

/// Fixed-point scale for USD prices (8 decimals)
pub const ORACLE_PRICE_SCALE: u128 = 100_000_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OracleConfig {
    /// Maximum accepted quote age in seconds
    pub max_age_secs: u64,
    /// Lowest accepted price (8 decimals)
    pub min_price: u64,
    /// Highest accepted price (8 decimals)
    pub max_price: u64,
    /// Decimals of the native currency
    pub native_decimals: u8,
    /// Valid quotes required before a price is accepted (set at genesis)
    pub min_oracles: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 1_800,
            min_price: 100 * ORACLE_PRICE_SCALE as u64,
            max_price: 2_000 * ORACLE_PRICE_SCALE as u64,
            native_decimals: 18,
            min_oracles: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// USD per whole native unit, 8 decimals
    pub price: u128,
    pub updated_at: Timestamp,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error("Price feed unavailable: {0}")]
    Unavailable(String),

    #[error("Price is stale: {age}s old, max {max_age}s")]
    StalePrice { age: u64, max_age: u64 },

    #[error("Price {price} outside accepted range [{min}, {max}]")]
    PriceOutOfBounds { price: u128, min: u128, max: u128 },

    #[error("Only {valid} of {required} required price feeds returned a valid quote")]
    InsufficientOracles { valid: u32, required: u32 },
}

pub trait PriceOracle: Send {
    fn current_price(&self) -> Result<PriceQuote, OracleError>;
}

/// Oracle returning a preset quote
#[derive(Debug, Clone)]
pub struct FixedPriceOracle {
    quote: Result<PriceQuote, OracleError>,
}

impl FixedPriceOracle {
    pub fn new(price: u128, updated_at: Timestamp) -> Self {
        Self {
            quote: Ok(PriceQuote { price, updated_at }),
        }
    }

    /// An oracle whose every read fails
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            quote: Err(OracleError::Unavailable(reason.into())),
        }
    }

    pub fn set_quote(&mut self, price: u128, updated_at: Timestamp) {
        self.quote = Ok(PriceQuote { price, updated_at });
    }
}

impl PriceOracle for FixedPriceOracle {
    fn current_price(&self) -> Result<PriceQuote, OracleError> {
        self.quote.clone()
    }
}

/// Price feeds attached to a ledger, keyed by feed address
///
/// Attaching a feed does not make it count: only addresses the admins have
/// approved take part in [`OracleSet::aggregate`].
#[derive(Default)]
pub struct OracleSet {
    feeds: BTreeMap<Address, Box<dyn PriceOracle>>,
}

impl OracleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach or replace the feed behind `id`
    pub fn attach(&mut self, id: Address, feed: Box<dyn PriceOracle>) {
        self.feeds.insert(id, feed);
    }

    pub fn detach(&mut self, id: &Address) -> Option<Box<dyn PriceOracle>> {
        self.feeds.remove(id)
    }

    pub fn is_attached(&self, id: &Address) -> bool {
        self.feeds.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Median price over the approved feeds. Feeds that fail, are stale or
    /// out of bounds are skipped; fewer than `min_oracles` survivors is an
    /// error. The quote carries the oldest timestamp that went into it.
    pub fn aggregate(
        &self,
        approved: &BTreeSet<Address>,
        min_oracles: u32,
        config: &OracleConfig,
        now: Timestamp,
    ) -> Result<PriceQuote, OracleError> {
        let mut quotes = Vec::with_capacity(approved.len());
        let mut last_error = None;
        for id in approved {
            let Some(feed) = self.feeds.get(id) else {
                debug!("approved price feed {} is not attached", id);
                continue;
            };
            match validated_quote(feed.as_ref(), config, now) {
                Ok(quote) => quotes.push(quote),
                Err(e) => {
                    warn!("price feed {} skipped: {}", id, e);
                    last_error = Some(e);
                }
            }
        }

        let valid = quotes.len() as u32;
        let required = min_oracles.max(1);
        if valid < required {
            // A single configured feed reports its own failure
            return Err(match (required, last_error) {
                (1, Some(e)) => e,
                _ => OracleError::InsufficientOracles { valid, required },
            });
        }

        quotes.sort_by_key(|q| q.price);
        let mid = quotes.len() / 2;
        let price = if quotes.len() % 2 == 1 {
            quotes[mid].price
        } else {
            (quotes[mid - 1].price + quotes[mid].price) / 2
        };
        let updated_at = quotes.iter().map(|q| q.updated_at).min().unwrap_or(now);
        Ok(PriceQuote { price, updated_at })
    }
}

impl std::fmt::Debug for OracleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.feeds.keys()).finish()
    }
}

/// Read a quote and apply the staleness and bounds checks
pub fn validated_quote(
    oracle: &dyn PriceOracle,
    config: &OracleConfig,
    now: Timestamp,
) -> Result<PriceQuote, OracleError> {
    let quote = oracle.current_price()?;

    let age = now.saturating_sub(quote.updated_at);
    if age > config.max_age_secs {
        return Err(OracleError::StalePrice {
            age,
            max_age: config.max_age_secs,
        });
    }

    let (min, max) = (u128::from(config.min_price), u128::from(config.max_price));
    if quote.price < min || quote.price > max {
        return Err(OracleError::PriceOutOfBounds {
            price: quote.price,
            min,
            max,
        });
    }

    Ok(quote)
}

/// Native amount worth at least `stable_amount`, rounded up in the ledger's
/// favour. Assumes the stable token is pegged to one USD.
pub fn stable_to_native(
    stable_amount: Amount,
    stable_decimals: u8,
    quote: &PriceQuote,
    config: &OracleConfig,
) -> LedgerResult<Amount> {
    convert(stable_amount, stable_decimals, quote, config, Rounding::Up)
}

/// Native amount worth at most `stable_amount`, for payouts
pub fn stable_to_native_floor(
    stable_amount: Amount,
    stable_decimals: u8,
    quote: &PriceQuote,
    config: &OracleConfig,
) -> LedgerResult<Amount> {
    convert(stable_amount, stable_decimals, quote, config, Rounding::Down)
}

#[derive(Clone, Copy)]
enum Rounding {
    Up,
    Down,
}

fn convert(
    stable_amount: Amount,
    stable_decimals: u8,
    quote: &PriceQuote,
    config: &OracleConfig,
    rounding: Rounding,
) -> LedgerResult<Amount> {
    if quote.price == 0 {
        return Err(LedgerError::PriceFeed(OracleError::PriceOutOfBounds {
            price: 0,
            min: u128::from(config.min_price),
            max: u128::from(config.max_price),
        }));
    }
    let div = |a: Amount, b: Amount, c: Amount| match rounding {
        Rounding::Up => mul_div_ceil(a, b, c),
        Rounding::Down => mul_div(a, b, c),
    };
    // Native units at the stable token's precision
    let scaled = div(stable_amount, ORACLE_PRICE_SCALE, quote.price)?;

    let (from, to) = (u32::from(stable_decimals), u32::from(config.native_decimals));
    if to >= from {
        scaled
            .checked_mul(pow10(to - from)?)
            .ok_or(LedgerError::Overflow("native conversion"))
    } else {
        div(scaled, 1, pow10(from - to)?)
    }
}
