use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Asset class of a holding. Drives the liquidity classification overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Stock,
    Bond,
    Reit,
    Crypto,
    Private,
    GovernmentBond,
    Cash,
    CorporateBond,
    MoneyMarket,
    Commodity,
    Etf,
    #[serde(other)]
    Other,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Stock => "STOCK",
            AssetType::Bond => "BOND",
            AssetType::Reit => "REIT",
            AssetType::Crypto => "CRYPTO",
            AssetType::Private => "PRIVATE",
            AssetType::GovernmentBond => "GOVERNMENT_BOND",
            AssetType::Cash => "CASH",
            AssetType::CorporateBond => "CORPORATE_BOND",
            AssetType::MoneyMarket => "MONEY_MARKET",
            AssetType::Commodity => "COMMODITY",
            AssetType::Etf => "ETF",
            AssetType::Other => "OTHER",
        }
    }
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_uppercase().as_str() {
            "STOCK" | "EQUITY" => AssetType::Stock,
            "BOND" => AssetType::Bond,
            "REIT" => AssetType::Reit,
            "CRYPTO" => AssetType::Crypto,
            "PRIVATE" => AssetType::Private,
            "GOVERNMENT_BOND" => AssetType::GovernmentBond,
            "CASH" => AssetType::Cash,
            "CORPORATE_BOND" => AssetType::CorporateBond,
            "MONEY_MARKET" => AssetType::MoneyMarket,
            "COMMODITY" => AssetType::Commodity,
            "ETF" => AssetType::Etf,
            _ => AssetType::Other,
        })
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse liquidity tag carried on the position record, set externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LiquidityTag {
    #[default]
    High,
    Medium,
    Low,
}

impl LiquidityTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiquidityTag::High => "HIGH",
            LiquidityTag::Medium => "MEDIUM",
            LiquidityTag::Low => "LOW",
        }
    }
}

impl FromStr for LiquidityTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HIGH" => Ok(LiquidityTag::High),
            "MEDIUM" => Ok(LiquidityTag::Medium),
            "LOW" => Ok(LiquidityTag::Low),
            other => Err(format!("unknown liquidity tag: {}", other)),
        }
    }
}

// A holding inside exactly one portfolio. Each evaluation works on a fresh copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub quantity: f64,
    pub average_price: f64,
    pub current_price: f64,
    pub market_value: f64,
    pub asset_type: AssetType,
    pub liquidity: LiquidityTag,
}

impl Position {
    pub fn new(
        portfolio_id: Uuid,
        symbol: impl Into<String>,
        quantity: f64,
        average_price: f64,
        current_price: f64,
        asset_type: AssetType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            portfolio_id,
            symbol: symbol.into(),
            quantity,
            average_price,
            current_price,
            market_value: quantity * current_price,
            asset_type,
            liquidity: LiquidityTag::default(),
        }
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.average_price
    }

    /// Unrealized profit and loss in currency.
    pub fn pnl(&self) -> f64 {
        self.market_value - self.cost_basis()
    }

    /// Unrealized profit and loss as a percentage of cost basis (3.33 for 3.33%).
    pub fn pnl_percent(&self) -> f64 {
        let cost = self.cost_basis();
        if cost == 0.0 {
            return 0.0;
        }
        self.pnl() / cost * 100.0
    }

    /// Share of the portfolio held in this position, 0 when the portfolio is empty.
    pub fn weight(&self, total_value: f64) -> f64 {
        if total_value <= 0.0 {
            return 0.0;
        }
        self.market_value / total_value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_value_and_pnl() {
        let position = Position::new(Uuid::new_v4(), "AAPL", 100.0, 150.0, 155.0, AssetType::Stock);
        assert_eq!(position.market_value, 15_500.0);
        assert_eq!(position.pnl(), 500.0);
        assert!((position.pnl_percent() - 3.333).abs() < 0.01);
        assert!((position.weight(100_000.0) - 0.155).abs() < 1e-12);
    }

    #[test]
    fn test_weight_of_empty_portfolio_is_zero() {
        let position = Position::new(Uuid::new_v4(), "AAPL", 1.0, 1.0, 1.0, AssetType::Stock);
        assert_eq!(position.weight(0.0), 0.0);
    }

    #[test]
    fn test_asset_type_parsing() {
        assert_eq!("government_bond".parse::<AssetType>().unwrap(), AssetType::GovernmentBond);
        assert_eq!("SOMETHING".parse::<AssetType>().unwrap(), AssetType::Other);
        let json = serde_json::to_string(&AssetType::CorporateBond).unwrap();
        assert_eq!(json, "\"CORPORATE_BOND\"");
    }
}
