use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::errors::AppError;
use crate::models::{MarketDepth, MarketQuote};

/// Per-symbol market data consumed by the liquidity calculator.
///
/// Implementations return the degenerate values of [`MarketQuote::unknown`]
/// for symbols they know nothing about rather than failing.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn average_daily_volume(&self, symbol: &str) -> Result<f64, AppError>;

    /// Relative spread (0.001 for 0.1%)
    async fn bid_ask_spread(&self, symbol: &str) -> Result<f64, AppError>;

    async fn market_depth(&self, symbol: &str) -> Result<Option<MarketDepth>, AppError>;

    async fn market_cap(&self, symbol: &str) -> Result<f64, AppError>;

    /// All four values at once. Providers backed by a single row override this.
    async fn quote(&self, symbol: &str) -> Result<MarketQuote, AppError> {
        Ok(MarketQuote {
            symbol: symbol.to_string(),
            average_daily_volume: self.average_daily_volume(symbol).await?,
            bid_ask_spread: self.bid_ask_spread(symbol).await?,
            market_cap: self.market_cap(symbol).await?,
            depth: self.market_depth(symbol).await?,
        })
    }
}

/// In-memory quote table.
#[derive(Clone, Default)]
pub struct StaticMarketData {
    quotes: Arc<DashMap<String, MarketQuote>>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, quote: MarketQuote) {
        self.quotes.insert(quote.symbol.clone(), quote);
    }

    pub fn with_quotes(quotes: impl IntoIterator<Item = MarketQuote>) -> Self {
        let table = Self::new();
        for quote in quotes {
            table.insert(quote);
        }
        table
    }

    fn lookup(&self, symbol: &str) -> MarketQuote {
        self.quotes
            .get(symbol)
            .map(|entry| entry.value().clone())
            .unwrap_or_else(|| MarketQuote::unknown(symbol))
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarketData {
    async fn average_daily_volume(&self, symbol: &str) -> Result<f64, AppError> {
        Ok(self.lookup(symbol).average_daily_volume)
    }

    async fn bid_ask_spread(&self, symbol: &str) -> Result<f64, AppError> {
        Ok(self.lookup(symbol).bid_ask_spread)
    }

    async fn market_depth(&self, symbol: &str) -> Result<Option<MarketDepth>, AppError> {
        Ok(self.lookup(symbol).depth)
    }

    async fn market_cap(&self, symbol: &str) -> Result<f64, AppError> {
        Ok(self.lookup(symbol).market_cap)
    }

    async fn quote(&self, symbol: &str) -> Result<MarketQuote, AppError> {
        Ok(self.lookup(symbol))
    }
}
