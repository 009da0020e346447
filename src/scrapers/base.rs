use crate::errors::Result;
use crate::models::option::{ChainData, Profile};
use async_trait::async_trait;

/// Base trait for options data scrapers
#[async_trait]
pub trait OptionsScraper {
    /// Get the provider code this scraper is for
    fn provider_code(&self) -> &'static str;

    /// Fetch the available expiration timestamps for a symbol
    /// Returns SymbolNotFound when the provider has no data for it
    async fn fetch_expirations(&self, symbol: &str) -> Result<Vec<i64>>;

    /// Fetch the industry/sector profile for a symbol
    /// Missing keys are valid and yield empty strings
    async fn fetch_profile(&self, symbol: &str) -> Result<Profile>;

    /// Fetch the full option chain for (symbol, expiration)
    /// Timeouts surface to the caller, which decides whether to retry
    async fn fetch_chain(&self, symbol: &str, expiration: i64) -> Result<ChainData>;
}
