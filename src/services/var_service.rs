use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::AppError;
use crate::models::Position;
use crate::services::statistics::{
    max_drawdown, mean, normal_random, percentile_loss, returns_from_prices, sort_ascending,
    std_dev, tail_mean,
};

pub const CONFIDENCE_95: f64 = 0.95;
pub const CONFIDENCE_99: f64 = 0.99;
pub const DEFAULT_SIMULATIONS: usize = 10_000;

/// One-sided z-score for the supported confidence levels.
pub fn z_score(confidence: f64) -> f64 {
    if confidence >= 0.99 {
        2.326
    } else if confidence >= 0.95 {
        1.645
    } else if confidence >= 0.90 {
        1.282
    } else {
        1.645
    }
}

/// VaR pair produced by a single method, in currency.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodVar {
    pub var_95: f64,
    pub var_99: f64,
}

impl MethodVar {
    fn scaled(self, factor: f64) -> Self {
        Self {
            var_95: self.var_95 * factor,
            var_99: self.var_99 * factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarResult {
    /// Blended: mean of the three methods
    pub var_95: f64,
    pub var_99: f64,
    pub expected_shortfall_95: f64,
    pub expected_shortfall_99: f64,
    pub max_drawdown: f64,
    pub historical: MethodVar,
    pub parametric: MethodVar,
    pub monte_carlo: MethodVar,
    pub portfolio_value: f64,
    pub time_horizon_days: u32,
    /// Number of portfolio returns the figures were built from
    pub observations: usize,
}

impl VarResult {
    pub fn var_95_percent(&self) -> f64 {
        if self.portfolio_value > 0.0 {
            self.var_95 / self.portfolio_value * 100.0
        } else {
            0.0
        }
    }
}

/// Return series of one symbol inside the aligned window.
#[derive(Debug, Clone)]
pub struct AssetReturns {
    pub symbol: String,
    pub weight: f64,
    pub returns: Vec<f64>,
}

fn loss_at(sorted: &[f64], confidence: f64, portfolio_value: f64) -> f64 {
    (-percentile_loss(sorted, confidence) * portfolio_value).max(0.0)
}

/// Historical simulation on a (not necessarily sorted) return series. 1-day figures.
pub fn historical_var(returns: &[f64], portfolio_value: f64) -> MethodVar {
    let mut sorted = returns.to_vec();
    sort_ascending(&mut sorted);
    MethodVar {
        var_95: loss_at(&sorted, CONFIDENCE_95, portfolio_value),
        var_99: loss_at(&sorted, CONFIDENCE_99, portfolio_value),
    }
}

/// Closed-form normal VaR. 1-day figures.
pub fn parametric_var(returns: &[f64], portfolio_value: f64) -> MethodVar {
    if returns.is_empty() {
        return MethodVar::default();
    }
    let m = mean(returns);
    let s = std_dev(returns, m);
    let at = |confidence: f64| (-(m - z_score(confidence) * s) * portfolio_value).max(0.0);
    MethodVar {
        var_95: at(CONFIDENCE_95),
        var_99: at(CONFIDENCE_99),
    }
}

/// Simulates weighted portfolio returns from independent normal draws per asset. 1-day figures.
pub fn monte_carlo_var<R: Rng + ?Sized>(
    assets: &[AssetReturns],
    portfolio_value: f64,
    simulations: usize,
    rng: &mut R,
) -> MethodVar {
    if assets.is_empty() || simulations == 0 {
        return MethodVar::default();
    }

    let params: Vec<(f64, f64, f64)> = assets
        .iter()
        .map(|a| {
            let m = mean(&a.returns);
            (a.weight, m, std_dev(&a.returns, m))
        })
        .collect();

    let mut simulated: Vec<f64> = (0..simulations)
        .map(|_| {
            params
                .iter()
                .map(|(w, m, s)| w * normal_random(&mut *rng, *m, *s))
                .sum()
        })
        .collect();
    sort_ascending(&mut simulated);

    MethodVar {
        var_95: loss_at(&simulated, CONFIDENCE_95, portfolio_value),
        var_99: loss_at(&simulated, CONFIDENCE_99, portfolio_value),
    }
}

/// Aligns each held symbol's history to the shortest common length (most
/// recent prices) and weights it by market value.
pub fn align_asset_returns(
    positions: &[Position],
    price_history: &HashMap<String, Vec<f64>>,
) -> Result<Vec<AssetReturns>, AppError> {
    if positions.is_empty() {
        return Err(AppError::InsufficientData(
            "no positions to evaluate".to_string(),
        ));
    }

    // BTreeMap keeps the asset order stable so seeded runs are reproducible
    let mut exposure: BTreeMap<&str, f64> = BTreeMap::new();
    for position in positions {
        if price_history
            .get(&position.symbol)
            .is_some_and(|prices| !prices.is_empty())
        {
            *exposure.entry(position.symbol.as_str()).or_insert(0.0) += position.market_value;
        }
    }

    let common_len = exposure
        .keys()
        .filter_map(|symbol| price_history.get(*symbol).map(Vec::len))
        .min()
        .unwrap_or(0);

    if common_len < 2 {
        return Err(AppError::InsufficientData(format!(
            "need at least 2 aligned prices, have {}",
            common_len
        )));
    }

    let total: f64 = exposure.values().sum();
    let equal_weight = 1.0 / exposure.len() as f64;

    let assets = exposure
        .into_iter()
        .filter_map(|(symbol, value)| {
            let prices = price_history.get(symbol)?;
            let window = &prices[prices.len() - common_len..];
            Some(AssetReturns {
                symbol: symbol.to_string(),
                weight: if total > 0.0 { value / total } else { equal_weight },
                returns: returns_from_prices(window),
            })
        })
        .collect();

    Ok(assets)
}

/// Weighted sum of aligned asset returns.
pub fn portfolio_returns(assets: &[AssetReturns]) -> Vec<f64> {
    let len = assets.iter().map(|a| a.returns.len()).min().unwrap_or(0);
    (0..len)
        .map(|t| assets.iter().map(|a| a.weight * a.returns[t]).sum())
        .collect()
}

/// Blends historical, parametric and Monte Carlo VaR for a set of positions.
#[derive(Debug, Clone)]
pub struct VarCalculator {
    simulations: usize,
    seed: Option<u64>,
}

impl Default for VarCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_SIMULATIONS)
    }
}

impl VarCalculator {
    pub fn new(simulations: usize) -> Self {
        Self {
            simulations,
            seed: None,
        }
    }

    /// Fixes the Monte Carlo RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fails with `InsufficientData` when positions are empty or fewer than 2
    /// aligned prices exist.
    pub fn calculate(
        &self,
        positions: &[Position],
        price_history: &HashMap<String, Vec<f64>>,
        time_horizon_days: u32,
    ) -> Result<VarResult, AppError> {
        let assets = align_asset_returns(positions, price_history)?;
        let returns = portfolio_returns(&assets);
        let portfolio_value = positions
            .iter()
            .map(|p| p.market_value)
            .sum::<f64>()
            .max(0.0);

        let horizon = time_horizon_days.max(1);
        let scale = (horizon as f64).sqrt();

        let historical = historical_var(&returns, portfolio_value).scaled(scale);
        let parametric = parametric_var(&returns, portfolio_value).scaled(scale);
        let monte_carlo = match self.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                monte_carlo_var(&assets, portfolio_value, self.simulations, &mut rng)
            }
            None => {
                let mut rng = rand::rng();
                monte_carlo_var(&assets, portfolio_value, self.simulations, &mut rng)
            }
        }
        .scaled(scale);

        let mut sorted = returns.clone();
        sort_ascending(&mut sorted);
        let shortfall = |confidence: f64| (-tail_mean(&sorted, confidence) * portfolio_value * scale).max(0.0);

        let result = VarResult {
            var_95: (historical.var_95 + parametric.var_95 + monte_carlo.var_95) / 3.0,
            var_99: (historical.var_99 + parametric.var_99 + monte_carlo.var_99) / 3.0,
            expected_shortfall_95: shortfall(CONFIDENCE_95),
            expected_shortfall_99: shortfall(CONFIDENCE_99),
            max_drawdown: max_drawdown(&returns) * portfolio_value,
            historical,
            parametric,
            monte_carlo,
            portfolio_value,
            time_horizon_days: horizon,
            observations: returns.len(),
        };

        debug!(
            assets = assets.len(),
            observations = result.observations,
            var_95 = result.var_95,
            var_99 = result.var_99,
            "VaR calculated"
        );

        Ok(result)
    }
}
