use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::position::Position;

// A set of positions evaluated together. `total_value` is maintained externally
// and may lag the positions between trades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: Uuid,
    pub name: String,
    pub total_value: f64,
    pub currency: String,
    pub positions: Vec<Position>,
}

impl Portfolio {
    pub fn new(name: impl Into<String>, positions: Vec<Position>) -> Self {
        let mut portfolio = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            total_value: 0.0,
            currency: "USD".to_string(),
            positions: Vec::new(),
        };
        portfolio.positions = positions
            .into_iter()
            .map(|mut p| {
                p.portfolio_id = portfolio.id;
                p
            })
            .collect();
        portfolio.recompute_total();
        portfolio
    }

    /// Sum of the positions' market values, floored at zero.
    pub fn recompute_total(&mut self) -> f64 {
        let total: f64 = self.positions.iter().map(|p| p.market_value).sum();
        self.total_value = total.max(0.0);
        self.total_value
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Herfindahl-Hirschman index of the current weights. Zero for an empty portfolio.
    pub fn herfindahl_index(&self) -> f64 {
        if self.total_value <= 0.0 {
            return 0.0;
        }
        self.positions
            .iter()
            .map(|p| {
                let w = p.market_value / self.total_value;
                w * w
            })
            .sum()
    }
}
