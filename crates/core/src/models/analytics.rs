use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::asset::Asset;
use super::transaction::TransactionKind;

/// Risk and return statistics over a sampled history.
///
/// Percent fields are already multiplied by 100. With fewer than two
/// returns every figure is 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    /// Sample standard deviation of period returns, percent
    pub volatility_percent: f64,
    /// `volatility × √365`, percent
    pub annualized_volatility_percent: f64,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough decline, percent (positive number)
    pub max_drawdown_percent: f64,
    /// 5th-percentile period return, percent (0 with fewer than 20 returns)
    pub value_at_risk_95_percent: f64,
    /// VaR applied to the latest portfolio value, USD
    pub value_at_risk_95_usd: f64,
    /// Mean period return, percent
    pub average_return_percent: f64,
    /// `mean × 365`, percent
    pub annualized_return_percent: f64,
    /// `1 − Σ wᵢ²` over the invested weights
    pub diversification_score: f64,
    /// Number of history points the figures were computed from
    pub data_points: usize,
}

/// Return of one benchmark and how the portfolio did against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReturn {
    pub description: String,
    pub return_percent: f64,
    /// Portfolio return minus benchmark return, in percentage points
    pub outperformance_percent: f64,
    pub start_price: Option<f64>,
    pub end_price: Option<f64>,
}

/// Portfolio return against BTC-only, ETH-only and a 50/50 blend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub portfolio_return_percent: f64,
    pub start_value: f64,
    pub end_value: f64,
    pub btc: BenchmarkReturn,
    pub eth: BenchmarkReturn,
    pub balanced: BenchmarkReturn,
}

/// One ledger row with its USD value and, for sells, realized P/L.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedTransaction {
    pub id: uuid::Uuid,
    pub date: NaiveDate,
    pub kind: TransactionKind,
    pub quantity: f64,
    pub unit_price_usd: f64,
    pub value_usd: f64,
    /// Average cost per unit right before this sell
    pub average_buy_price_usd: Option<f64>,
    pub realized_profit_loss_usd: Option<f64>,
    pub realized_profit_loss_percent: Option<f64>,
}

/// Per-asset trading summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetTransactionAnalysis {
    pub asset: Asset,
    pub total_bought: f64,
    pub total_sold: f64,
    pub net_quantity: f64,
    /// Gross USD spent on buys
    pub total_invested_usd: f64,
    /// Gross USD received from sells
    pub total_received_usd: f64,
    /// Cost basis still attached to the held quantity
    pub remaining_cost_basis_usd: f64,
    pub realized_profit_loss_usd: f64,
    pub unrealized_profit_loss_usd: f64,
    pub transactions: Vec<AnalyzedTransaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAnalysis {
    pub btc: AssetTransactionAnalysis,
    pub eth: AssetTransactionAnalysis,
}

impl TransactionAnalysis {
    pub fn asset(&self, asset: Asset) -> &AssetTransactionAnalysis {
        match asset {
            Asset::Btc => &self.btc,
            Asset::Eth => &self.eth,
        }
    }
}

/// Value change between the previous day and `date`, at constant holdings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyChange {
    pub date: NaiveDate,
    pub previous_date: NaiveDate,
    pub btc_change_usd: f64,
    pub eth_change_usd: f64,
    pub total_change_usd: f64,
    pub total_change_percent: f64,
}
