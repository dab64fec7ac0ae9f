// ═══════════════════════════════════════════════════════════════════
// Service Tests: HoldingsCalculator, LedgerService, ValuationService,
// PerformanceService, AnalyticsService, DcaService, PriceService
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crypto_tracker_core::errors::CoreError;
use crypto_tracker_core::models::asset::Asset;
use crypto_tracker_core::models::dca::{DcaFrequency, DcaLeg, DcaPlan};
use crypto_tracker_core::models::history::{HistoryPoint, PortfolioHistory};
use crypto_tracker_core::models::holding::Holding;
use crypto_tracker_core::models::ledger::Ledger;
use crypto_tracker_core::models::performance::ValuePoint;
use crypto_tracker_core::models::price::{
    PriceCache, PriceFreshness, PriceHistory, PricePoint, Quote,
};
use crypto_tracker_core::models::transaction::{Transaction, TransactionKind};
use crypto_tracker_core::providers::registry::PriceProviderRegistry;
use crypto_tracker_core::providers::traits::PriceProvider;
use crypto_tracker_core::services::analytics_service::{AnalyticsService, MAX_HISTORY_POINTS};
use crypto_tracker_core::services::dca_service::{DcaService, DCA_NOTE};
use crypto_tracker_core::services::holdings_service::HoldingsCalculator;
use crypto_tracker_core::services::ledger_service::LedgerService;
use crypto_tracker_core::services::performance_service::{
    scan_weekly_periods, PerformanceService,
};
use crypto_tracker_core::services::price_service::{PriceService, PriceSource};
use crypto_tracker_core::services::valuation_service::ValuationService;

// ═══════════════════════════════════════════════════════════════════
// Mock Provider
// ═══════════════════════════════════════════════════════════════════

/// Shared switches so a test can flip a provider into failure mode after
/// handing it to the registry.
#[derive(Clone, Default)]
struct MockState {
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MockState {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

struct MockPriceProvider {
    name: String,
    current: HashMap<Asset, f64>,
    history: HashMap<(Asset, NaiveDate), f64>,
    state: MockState,
}

impl MockPriceProvider {
    fn new(state: MockState) -> Self {
        let mut current = HashMap::new();
        current.insert(Asset::Btc, 44_000.0);
        current.insert(Asset::Eth, 3_000.0);

        let mut history = HashMap::new();
        history.insert((Asset::Btc, make_date(2024, 1, 15)), 42_000.0);
        history.insert((Asset::Btc, make_date(2024, 1, 16)), 43_500.0);
        history.insert((Asset::Btc, make_date(2024, 1, 17)), 41_000.0);
        history.insert((Asset::Eth, make_date(2024, 1, 15)), 2_500.0);
        history.insert((Asset::Eth, make_date(2024, 1, 16)), 2_600.0);

        Self {
            name: "MockProvider".into(),
            current,
            history,
            state,
        }
    }

    fn named(mut self, name: &str) -> Self {
        self.name = name.into();
        self
    }

    fn with_current(mut self, asset: Asset, price: f64) -> Self {
        self.current.insert(asset, price);
        self
    }

    fn check(&self) -> Result<(), CoreError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        if self.state.failing.load(Ordering::SeqCst) {
            return Err(CoreError::Api {
                provider: self.name.clone(),
                message: "Simulated failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PriceProvider for MockPriceProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_current_price(&self, asset: Asset) -> Result<f64, CoreError> {
        self.check()?;
        self.current
            .get(&asset)
            .copied()
            .ok_or_else(|| CoreError::PriceNotAvailable {
                symbol: asset.symbol().into(),
                date: "current".into(),
            })
    }

    async fn get_historical_price(&self, asset: Asset, date: NaiveDate) -> Result<f64, CoreError> {
        self.check()?;
        self.history
            .get(&(asset, date))
            .copied()
            .ok_or_else(|| CoreError::PriceNotAvailable {
                symbol: asset.symbol().into(),
                date: date.to_string(),
            })
    }

    async fn get_price_range(
        &self,
        asset: Asset,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<PricePoint>, CoreError> {
        self.check()?;
        let mut points: Vec<PricePoint> = self
            .history
            .iter()
            .filter(|((a, d), _)| *a == asset && *d >= from && *d <= to)
            .map(|((_, d), p)| PricePoint { date: *d, price: *p })
            .collect();
        points.sort_by_key(|p| p.date);
        Ok(points)
    }
}

fn make_registry(provider: MockPriceProvider) -> PriceProviderRegistry {
    let mut registry = PriceProviderRegistry::new();
    registry.register(Box::new(provider));
    registry
}

fn make_price_service(state: &MockState) -> PriceService {
    PriceService::new(
        make_registry(MockPriceProvider::new(state.clone())),
        PriceCache::default(),
        7,
    )
}

fn make_date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

fn prices(btc: Option<f64>, eth: Option<f64>) -> HashMap<Asset, f64> {
    let mut map = HashMap::new();
    if let Some(p) = btc {
        map.insert(Asset::Btc, p);
    }
    if let Some(p) = eth {
        map.insert(Asset::Eth, p);
    }
    map
}

fn point(date: NaiveDate, total_value: f64, btc_price: f64, eth_price: f64) -> HistoryPoint {
    HistoryPoint {
        date,
        total_value,
        total_invested: 0.0,
        profit_loss: 0.0,
        roi_percent: 0.0,
        btc_value: total_value,
        eth_value: 0.0,
        btc_price,
        eth_price,
        trades: Vec::new(),
    }
}

fn series(values: &[f64]) -> PortfolioHistory {
    let start = make_date(2024, 1, 1);
    PortfolioHistory {
        interval_days: 1,
        start: Some(start),
        end: Some(start + Duration::days(values.len() as i64 - 1)),
        points: values
            .iter()
            .enumerate()
            .map(|(i, v)| point(start + Duration::days(i as i64), *v, 0.0, 0.0))
            .collect(),
    }
}

// ═══════════════════════════════════════════════════════════════════
// HoldingsCalculator
// ═══════════════════════════════════════════════════════════════════

mod holdings {
    use super::*;

    #[test]
    fn simple_buy() {
        let txs = vec![Transaction::buy(Asset::Btc, 0.01, 40_000.0, make_date(2024, 1, 1))];
        let holdings = HoldingsCalculator::default()
            .compute_holdings(&txs, make_date(2024, 2, 1))
            .unwrap();

        let btc = &holdings[&Asset::Btc];
        assert_eq!(btc.quantity_held, 0.01);
        assert!(approx(btc.total_invested_usd, 400.0));
        assert!(approx(btc.avg_purchase_price_usd(), 40_000.0));
        assert!(!holdings.contains_key(&Asset::Eth));
    }

    #[test]
    fn partial_sell_keeps_average_price() {
        let txs = vec![
            Transaction::buy(Asset::Eth, 1.0, 2000.0, make_date(2024, 1, 1)),
            Transaction::sell(Asset::Eth, 0.5, 2500.0, make_date(2024, 2, 1)),
        ];
        let holdings = HoldingsCalculator::default()
            .compute_holdings(&txs, make_date(2024, 3, 1))
            .unwrap();

        let eth = &holdings[&Asset::Eth];
        assert_eq!(eth.quantity_held, 0.5);
        assert!(approx(eth.total_invested_usd, 1000.0));
        assert!(approx(eth.avg_purchase_price_usd(), 2000.0));
        assert!(approx(eth.realized_profit_loss_usd, 250.0));
        assert!(approx(eth.total_received_usd, 1250.0));
    }

    #[test]
    fn weighted_average_over_two_buys() {
        let txs = vec![
            Transaction::buy(Asset::Btc, 1.0, 30_000.0, make_date(2024, 1, 1)),
            Transaction::buy(Asset::Btc, 1.0, 50_000.0, make_date(2024, 1, 8)),
            Transaction::sell(Asset::Btc, 0.5, 60_000.0, make_date(2024, 1, 15)),
        ];
        let holdings = HoldingsCalculator::default()
            .compute_holdings(&txs, make_date(2024, 2, 1))
            .unwrap();

        let btc = &holdings[&Asset::Btc];
        assert!(approx(btc.quantity_held, 1.5));
        assert!(approx(btc.total_invested_usd, 60_000.0));
        assert!(approx(btc.avg_purchase_price_usd(), 40_000.0));
    }

    #[test]
    fn cutoff_excludes_later_transactions() {
        let txs = vec![
            Transaction::buy(Asset::Btc, 1.0, 100.0, make_date(2024, 1, 1)),
            Transaction::buy(Asset::Btc, 2.0, 100.0, make_date(2024, 3, 1)),
        ];
        let holdings = HoldingsCalculator::default()
            .compute_holdings(&txs, make_date(2024, 2, 1))
            .unwrap();
        assert_eq!(holdings[&Asset::Btc].quantity_held, 1.0);
    }

    #[test]
    fn input_order_does_not_matter() {
        let txs = vec![
            Transaction::sell(Asset::Eth, 0.5, 2500.0, make_date(2024, 2, 1)),
            Transaction::buy(Asset::Eth, 1.0, 2000.0, make_date(2024, 1, 1)),
        ];
        let holdings = HoldingsCalculator::default()
            .compute_holdings(&txs, make_date(2024, 3, 1))
            .unwrap();
        assert_eq!(holdings[&Asset::Eth].quantity_held, 0.5);
    }

    #[test]
    fn full_sell_keeps_closed_position() {
        let txs = vec![
            Transaction::buy(Asset::Eth, 1.0, 2000.0, make_date(2024, 1, 1)),
            Transaction::sell(Asset::Eth, 1.0, 1500.0, make_date(2024, 2, 1)),
        ];
        let holdings = HoldingsCalculator::default()
            .compute_holdings(&txs, make_date(2024, 3, 1))
            .unwrap();
        let eth = &holdings[&Asset::Eth];
        assert_eq!(eth.quantity_held, 0.0);
        assert_eq!(eth.total_invested_usd, 0.0);
        assert_eq!(eth.avg_purchase_price_usd(), 0.0);
        assert!(approx(eth.realized_profit_loss_usd, -500.0));
    }

    #[test]
    fn overdraft_rejected() {
        let txs = vec![
            Transaction::buy(Asset::Btc, 1.0, 100.0, make_date(2024, 1, 1)),
            Transaction::sell(Asset::Btc, 1.5, 100.0, make_date(2024, 1, 2)),
        ];
        let err = HoldingsCalculator::default()
            .compute_holdings(&txs, make_date(2024, 2, 1))
            .unwrap_err();
        match err {
            CoreError::Overdraft {
                asset,
                requested,
                available,
                ..
            } => {
                assert_eq!(asset, "BTC");
                assert_eq!(requested, 1.5);
                assert_eq!(available, 1.0);
            }
            other => panic!("Expected Overdraft, got {other:?}"),
        }
    }

    #[test]
    fn sell_before_any_buy_is_overdraft() {
        let txs = vec![Transaction::sell(Asset::Eth, 0.1, 100.0, make_date(2024, 1, 1))];
        assert!(matches!(
            HoldingsCalculator::default().compute_holdings(&txs, make_date(2024, 2, 1)),
            Err(CoreError::Overdraft { .. })
        ));
    }

    #[test]
    fn malformed_record_is_validation_error() {
        let txs = vec![Transaction::buy(Asset::Btc, -1.0, 100.0, make_date(2024, 1, 1))];
        assert!(matches!(
            HoldingsCalculator::default().compute_holdings(&txs, make_date(2024, 2, 1)),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn float_dust_sell_is_allowed() {
        let txs = vec![
            Transaction::buy(Asset::Btc, 0.1, 100.0, make_date(2024, 1, 1)),
            Transaction::buy(Asset::Btc, 0.2, 100.0, make_date(2024, 1, 1)),
            Transaction::sell(Asset::Btc, 0.3, 100.0, make_date(2024, 1, 2)),
        ];
        let holdings = HoldingsCalculator::default()
            .compute_holdings(&txs, make_date(2024, 2, 1))
            .unwrap();
        assert_eq!(holdings[&Asset::Btc].quantity_held, 0.0);
    }
}

// ═══════════════════════════════════════════════════════════════════
// LedgerService
// ═══════════════════════════════════════════════════════════════════

mod ledger_service {
    use super::*;

    #[test]
    fn add_keeps_date_order() {
        let svc = LedgerService::default();
        let mut ledger = Ledger::default();
        svc.add_transaction(&mut ledger, Transaction::buy(Asset::Btc, 1.0, 1.0, make_date(2024, 3, 1)))
            .unwrap();
        svc.add_transaction(&mut ledger, Transaction::buy(Asset::Btc, 1.0, 1.0, make_date(2024, 1, 1)))
            .unwrap();

        assert_eq!(ledger.transactions[0].date, make_date(2024, 1, 1));
        assert_eq!(ledger.transactions[1].date, make_date(2024, 3, 1));
    }

    #[test]
    fn same_day_keeps_arrival_order() {
        let svc = LedgerService::default();
        let mut ledger = Ledger::default();
        let date = make_date(2024, 1, 1);
        let first = Transaction::buy(Asset::Btc, 1.0, 1.0, date);
        let second = Transaction::buy(Asset::Eth, 1.0, 1.0, date);
        let (id1, id2) = (first.id, second.id);
        svc.add_transaction(&mut ledger, first).unwrap();
        svc.add_transaction(&mut ledger, second).unwrap();

        assert_eq!(ledger.transactions[0].id, id1);
        assert_eq!(ledger.transactions[1].id, id2);
    }

    #[test]
    fn overdraft_rejected_at_write() {
        let svc = LedgerService::default();
        let mut ledger = Ledger::default();
        svc.add_transaction(&mut ledger, Transaction::buy(Asset::Btc, 1.0, 100.0, make_date(2024, 1, 1)))
            .unwrap();

        let err = svc
            .add_transaction(&mut ledger, Transaction::sell(Asset::Btc, 2.0, 100.0, make_date(2024, 1, 2)))
            .unwrap_err();
        assert!(matches!(err, CoreError::Overdraft { .. }));
        assert_eq!(ledger.transactions.len(), 1);
    }

    #[test]
    fn backdated_sell_that_breaks_later_sell_rejected() {
        let svc = LedgerService::default();
        let mut ledger = Ledger::default();
        svc.add_transactions(
            &mut ledger,
            vec![
                Transaction::buy(Asset::Eth, 1.0, 100.0, make_date(2024, 1, 1)),
                Transaction::sell(Asset::Eth, 1.0, 100.0, make_date(2024, 3, 1)),
            ],
        )
        .unwrap();

        // Valid on its own date, but leaves nothing for the March sell.
        let err = svc
            .add_transaction(&mut ledger, Transaction::sell(Asset::Eth, 0.5, 100.0, make_date(2024, 2, 1)))
            .unwrap_err();
        assert!(matches!(err, CoreError::Overdraft { .. }));
        assert_eq!(ledger.transactions.len(), 2);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let svc = LedgerService::default();
        let mut ledger = Ledger::default();
        let result = svc.add_transactions(
            &mut ledger,
            vec![
                Transaction::buy(Asset::Btc, 1.0, 100.0, make_date(2024, 1, 1)),
                Transaction::buy(Asset::Btc, 0.0, 100.0, make_date(2024, 1, 2)),
            ],
        );
        assert!(result.is_err());
        assert!(ledger.transactions.is_empty());
    }

    #[test]
    fn future_date_rejected() {
        let svc = LedgerService::default();
        let mut ledger = Ledger::default();
        let future = today() + Duration::days(10);
        let err = svc
            .add_transaction(&mut ledger, Transaction::buy(Asset::Btc, 1.0, 1.0, future))
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[test]
    fn duplicate_id_rejected() {
        let svc = LedgerService::default();
        let mut ledger = Ledger::default();
        let tx = Transaction::buy(Asset::Btc, 1.0, 1.0, make_date(2024, 1, 1));
        svc.add_transaction(&mut ledger, tx.clone()).unwrap();
        assert!(matches!(
            svc.add_transaction(&mut ledger, tx),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn queries_are_newest_first() {
        let svc = LedgerService::default();
        let mut ledger = Ledger::default();
        svc.add_transactions(
            &mut ledger,
            vec![
                Transaction::buy(Asset::Btc, 1.0, 1.0, make_date(2024, 1, 1)),
                Transaction::buy(Asset::Eth, 1.0, 1.0, make_date(2024, 2, 1)),
                Transaction::sell(Asset::Btc, 0.5, 1.0, make_date(2024, 3, 1)),
            ],
        )
        .unwrap();

        let all = svc.get_transactions(&ledger);
        assert_eq!(all[0].date, make_date(2024, 3, 1));
        assert_eq!(svc.get_transactions_for_asset(&ledger, Asset::Btc).len(), 2);
        assert_eq!(svc.get_transactions_by_kind(&ledger, TransactionKind::Sell).len(), 1);
        assert_eq!(
            svc.get_transactions_in_range(&ledger, make_date(2024, 1, 15), make_date(2024, 2, 15))
                .len(),
            1
        );
    }

    #[test]
    fn find_unknown_id() {
        let svc = LedgerService::default();
        let ledger = Ledger::default();
        assert!(matches!(
            svc.find(&ledger, uuid::Uuid::new_v4()),
            Err(CoreError::TransactionNotFound(_))
        ));
    }
}

// ═══════════════════════════════════════════════════════════════════
// ValuationService
// ═══════════════════════════════════════════════════════════════════

mod valuation {
    use super::*;

    fn holdings_for(txs: &[Transaction]) -> HashMap<Asset, Holding> {
        HoldingsCalculator::default()
            .compute_holdings(txs, make_date(2024, 12, 31))
            .unwrap()
    }

    #[test]
    fn simple_buy_scenario() {
        let holdings = holdings_for(&[Transaction::buy(Asset::Btc, 0.01, 40_000.0, make_date(2024, 1, 1))]);
        let snapshot = ValuationService::new()
            .value_portfolio(&holdings, &prices(Some(44_000.0), None), make_date(2024, 6, 1))
            .unwrap();

        let btc = snapshot.asset(Asset::Btc).unwrap();
        assert!(approx(btc.total_invested_usd, 400.0));
        assert!(approx(btc.current_value_usd, 440.0));
        assert!(approx(btc.profit_loss_usd, 40.0));
        assert!(approx(btc.roi_percent, 10.0));
        assert!(approx(snapshot.roi_percent, 10.0));
        assert_eq!(snapshot.price_freshness, PriceFreshness::Live);
    }

    #[test]
    fn profit_loss_is_value_minus_invested() {
        let holdings = holdings_for(&[
            Transaction::buy(Asset::Btc, 0.3, 31_234.56, make_date(2024, 1, 1)),
            Transaction::buy(Asset::Eth, 2.7, 1_987.65, make_date(2024, 1, 3)),
            Transaction::sell(Asset::Eth, 0.9, 2_400.0, make_date(2024, 2, 3)),
        ]);
        let snapshot = ValuationService::new()
            .value_portfolio(&holdings, &prices(Some(51_000.0), Some(2_222.0)), make_date(2024, 6, 1))
            .unwrap();

        for row in &snapshot.assets {
            assert_eq!(row.profit_loss_usd, row.current_value_usd - row.total_invested_usd);
        }
        assert_eq!(
            snapshot.profit_loss_usd,
            snapshot.current_value_usd - snapshot.total_invested_usd
        );
    }

    #[test]
    fn aggregate_roi_is_not_averaged() {
        let holdings = holdings_for(&[
            Transaction::buy(Asset::Btc, 1.0, 900.0, make_date(2024, 1, 1)),
            Transaction::buy(Asset::Eth, 1.0, 100.0, make_date(2024, 1, 1)),
        ]);
        // BTC +0%, ETH +100% → aggregate +10%, not +50%
        let snapshot = ValuationService::new()
            .value_portfolio(&holdings, &prices(Some(900.0), Some(200.0)), make_date(2024, 6, 1))
            .unwrap();
        assert!(approx(snapshot.roi_percent, 10.0));
    }

    #[test]
    fn missing_price_for_held_asset() {
        let holdings = holdings_for(&[Transaction::buy(Asset::Eth, 1.0, 100.0, make_date(2024, 1, 1))]);
        let err = ValuationService::new()
            .value_portfolio(&holdings, &prices(Some(1.0), None), make_date(2024, 6, 1))
            .unwrap_err();
        assert!(matches!(err, CoreError::PriceNotAvailable { .. }));
    }

    #[test]
    fn closed_positions_are_not_listed() {
        let holdings = holdings_for(&[
            Transaction::buy(Asset::Eth, 1.0, 100.0, make_date(2024, 1, 1)),
            Transaction::sell(Asset::Eth, 1.0, 150.0, make_date(2024, 1, 2)),
        ]);
        let snapshot = ValuationService::new()
            .value_portfolio(&holdings, &HashMap::new(), make_date(2024, 6, 1))
            .unwrap();
        assert!(snapshot.assets.is_empty());
        assert_eq!(snapshot.roi_percent, 0.0);
    }

    #[test]
    fn stale_quote_marks_snapshot() {
        let holdings = holdings_for(&[Transaction::buy(Asset::Btc, 1.0, 100.0, make_date(2024, 1, 1))]);
        let mut quotes = HashMap::new();
        quotes.insert(
            Asset::Btc,
            Quote {
                asset: Asset::Btc,
                price: 120.0,
                fetched_on: make_date(2024, 5, 30),
                freshness: PriceFreshness::Stale,
            },
        );
        let snapshot = ValuationService::new()
            .value_with_quotes(&holdings, &quotes, make_date(2024, 6, 1))
            .unwrap();
        assert_eq!(snapshot.price_freshness, PriceFreshness::Stale);
        assert!(approx(snapshot.current_value_usd, 120.0));
    }

    /// A fixed-price source, to value through the trait seam.
    struct FixedSource(f64);

    #[async_trait]
    impl PriceSource for FixedSource {
        async fn current_price(&self, asset: Asset) -> Result<Quote, CoreError> {
            Ok(Quote {
                asset,
                price: self.0,
                fetched_on: make_date(2024, 6, 1),
                freshness: PriceFreshness::Live,
            })
        }

        async fn price_on_date(&self, _asset: Asset, _date: NaiveDate) -> Result<f64, CoreError> {
            Ok(self.0)
        }

        async fn price_history(
            &self,
            _asset: Asset,
            _from: NaiveDate,
            _to: NaiveDate,
        ) -> Result<Vec<PricePoint>, CoreError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn value_live_through_price_source() {
        let holdings = holdings_for(&[Transaction::buy(Asset::Eth, 2.0, 100.0, make_date(2024, 1, 1))]);
        let snapshot = ValuationService::new()
            .value_live(&holdings, &FixedSource(150.0), make_date(2024, 6, 1))
            .await
            .unwrap();
        assert!(approx(snapshot.current_value_usd, 300.0));
        assert!(approx(snapshot.profit_loss_usd, 100.0));
    }
}

// ═══════════════════════════════════════════════════════════════════
// PerformanceService
// ═══════════════════════════════════════════════════════════════════

mod performance {
    use super::*;

    #[test]
    fn empty_ledger_is_all_zero() {
        let m = PerformanceService::default()
            .compute_performance_metrics(&[], &PriceHistory::new(), &HashMap::new(), make_date(2024, 6, 1))
            .unwrap();

        assert_eq!(m.total_metrics.roi_percent, 0.0);
        assert_eq!(m.total_metrics.annualized_return_percent, 0.0);
        assert_eq!(m.total_metrics.days_invested, 0);
        assert_eq!(m.btc_metrics.allocation_percent, 0.0);
        assert_eq!(m.eth_metrics.allocation_percent, 0.0);
        assert!(m.performance_periods.best_week.date.is_none());
        assert!(m.performance_periods.worst_week.date.is_none());
        assert_eq!(m.dca_analysis.total_weeks_invested, 0);
    }

    #[test]
    fn simple_buy_scenario() {
        let txs = vec![Transaction::buy(Asset::Btc, 0.01, 40_000.0, make_date(2024, 1, 1))];
        let m = PerformanceService::default()
            .compute_performance_metrics(
                &txs,
                &PriceHistory::new(),
                &prices(Some(44_000.0), None),
                make_date(2024, 1, 11),
            )
            .unwrap();

        assert!(approx(m.total_metrics.total_invested_usd, 400.0));
        assert!(approx(m.total_metrics.current_value_usd, 440.0));
        assert!(approx(m.total_metrics.profit_loss_usd, 40.0));
        assert!(approx(m.total_metrics.roi_percent, 10.0));
        assert_eq!(m.total_metrics.days_invested, 10);
        assert!(m.total_metrics.annualized_return_percent > 10.0);
        assert!(approx(m.btc_metrics.allocation_percent, 100.0));
        assert_eq!(m.dca_analysis.total_weeks_invested, 2);
        assert!(approx(m.dca_analysis.weekly_avg_investment, 200.0));
    }

    #[test]
    fn single_transaction_dca_equals_lump_sum() {
        let txs = vec![Transaction::buy(Asset::Eth, 3.0, 1_800.0, make_date(2024, 1, 1))];
        let m = PerformanceService::default()
            .compute_performance_metrics(
                &txs,
                &PriceHistory::new(),
                &prices(None, Some(2_400.0)),
                make_date(2024, 4, 1),
            )
            .unwrap();
        assert!(approx(m.dca_analysis.dca_vs_lump_sum_percent, 0.0));
        assert!(approx(m.dca_analysis.lump_sum_value_usd, m.total_metrics.current_value_usd));
    }

    #[test]
    fn dca_beats_lump_sum_in_falling_market() {
        let mut history = PriceHistory::new();
        history.set_price(Asset::Btc, make_date(2024, 1, 1), 100.0);
        let txs = vec![
            Transaction::buy(Asset::Btc, 1.0, 100.0, make_date(2024, 1, 1)),
            Transaction::buy(Asset::Btc, 2.0, 50.0, make_date(2024, 2, 1)),
        ];
        // invested 200, 3 units at 80 = 240 → +20%. Lump: 2 units at 80 = 160 → −20%.
        let m = PerformanceService::default()
            .compute_performance_metrics(&txs, &history, &prices(Some(80.0), None), make_date(2024, 3, 1))
            .unwrap();
        assert!(approx(m.total_metrics.roi_percent, 20.0));
        assert!(approx(m.dca_analysis.lump_sum_roi_percent, -20.0));
        assert!(approx(m.dca_analysis.dca_vs_lump_sum_percent, 40.0));
    }

    #[test]
    fn allocations_sum_to_hundred() {
        let txs = vec![
            Transaction::buy(Asset::Btc, 1.0, 100.0, make_date(2024, 1, 1)),
            Transaction::buy(Asset::Eth, 2.0, 50.0, make_date(2024, 1, 1)),
        ];
        let m = PerformanceService::default()
            .compute_performance_metrics(
                &txs,
                &PriceHistory::new(),
                &prices(Some(200.0), Some(60.0)),
                make_date(2024, 2, 1),
            )
            .unwrap();
        assert!(approx(m.btc_metrics.allocation_percent, 62.5));
        assert!(approx(m.eth_metrics.allocation_percent, 37.5));
        let sum = m.btc_metrics.allocation_percent + m.eth_metrics.allocation_percent;
        assert!((sum - 100.0).abs() < 0.01);
    }

    #[test]
    fn falls_back_to_history_price() {
        let mut history = PriceHistory::new();
        history.set_price(Asset::Eth, make_date(2024, 1, 30), 150.0);
        let txs = vec![Transaction::buy(Asset::Eth, 1.0, 100.0, make_date(2024, 1, 1))];
        let m = PerformanceService::default()
            .compute_performance_metrics(&txs, &history, &HashMap::new(), make_date(2024, 2, 1))
            .unwrap();
        assert!(approx(m.eth_metrics.current_price_usd, 150.0));
        assert!(approx(m.total_metrics.roi_percent, 50.0));
    }

    #[test]
    fn held_asset_without_price_is_error() {
        let txs = vec![Transaction::buy(Asset::Eth, 1.0, 100.0, make_date(2024, 1, 1))];
        let err = PerformanceService::default()
            .compute_performance_metrics(&txs, &PriceHistory::new(), &HashMap::new(), make_date(2024, 2, 1))
            .unwrap_err();
        assert!(matches!(err, CoreError::PriceNotAvailable { .. }));
    }

    #[test]
    fn two_weekly_samples_best_equals_worst() {
        let d0 = make_date(2024, 1, 1);
        let d1 = d0 + Duration::days(7);
        let mut history = PriceHistory::new();
        history.set_price(Asset::Btc, d0, 1000.0);
        history.set_price(Asset::Btc, d1, 1100.0);
        let txs = vec![Transaction::buy(Asset::Btc, 1.0, 1000.0, d0)];

        let m = PerformanceService::default()
            .compute_performance_metrics(&txs, &history, &HashMap::new(), d1)
            .unwrap();

        let periods = m.performance_periods;
        assert_eq!(periods.best_week.date, Some(d1));
        assert_eq!(periods.worst_week.date, Some(d1));
        assert!(approx(periods.best_week.return_percent, 10.0));
        assert!(approx(periods.worst_week.return_percent, 10.0));
    }

    #[test]
    fn scan_picks_extremes_and_earliest_tie() {
        let d = |i: i64| make_date(2024, 1, 1) + Duration::days(7 * i);
        let points = vec![
            ValuePoint { date: d(0), value: 100.0 },
            ValuePoint { date: d(1), value: 110.0 },
            ValuePoint { date: d(2), value: 99.0 },
            ValuePoint { date: d(3), value: 108.9 },
        ];
        let periods = scan_weekly_periods(&points);
        assert_eq!(periods.best_week.date, Some(d(1)));
        assert!(approx(periods.best_week.return_percent, 10.0));
        assert_eq!(periods.worst_week.date, Some(d(2)));
        assert!(approx(periods.worst_week.return_percent, -10.0));
    }

    #[test]
    fn scan_skips_zero_previous_value() {
        let d0 = make_date(2024, 1, 1);
        let points = vec![
            ValuePoint { date: d0, value: 0.0 },
            ValuePoint { date: d0 + Duration::days(7), value: 500.0 },
        ];
        let periods = scan_weekly_periods(&points);
        assert!(periods.best_week.date.is_none());
        assert_eq!(periods.best_week.return_percent, 0.0);
    }

    #[test]
    fn scan_single_sample_is_null() {
        let periods = scan_weekly_periods(&[ValuePoint {
            date: make_date(2024, 1, 1),
            value: 10.0,
        }]);
        assert!(periods.best_week.date.is_none());
        assert!(periods.worst_week.date.is_none());
    }

    #[test]
    fn payload_keys() {
        let txs = vec![Transaction::buy(Asset::Btc, 1.0, 100.0, make_date(2024, 1, 1))];
        let m = PerformanceService::default()
            .compute_performance_metrics(&txs, &PriceHistory::new(), &prices(Some(100.0), None), make_date(2024, 1, 2))
            .unwrap();
        let json = serde_json::to_value(&m).unwrap();
        for key in [
            "total_metrics",
            "btc_metrics",
            "eth_metrics",
            "dca_analysis",
            "performance_periods",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// AnalyticsService
// ═══════════════════════════════════════════════════════════════════

mod analytics {
    use super::*;

    fn rising_history(start: NaiveDate, days: i64) -> PriceHistory {
        let mut history = PriceHistory::new();
        for i in 0..days {
            let date = start + Duration::days(i);
            history.set_price(Asset::Btc, date, 100.0 + 10.0 * i as f64);
            history.set_price(Asset::Eth, date, 10.0);
        }
        history
    }

    #[test]
    fn history_daily_points_and_markers() {
        let d0 = make_date(2024, 1, 1);
        let history = rising_history(d0, 5);
        let txs = vec![Transaction::buy(Asset::Btc, 1.0, 100.0, d0)];

        let series = AnalyticsService::default()
            .portfolio_history(&txs, &history, d0, d0 + Duration::days(4), 1)
            .unwrap();

        assert_eq!(series.data_points(), 5);
        assert_eq!(series.points[0].trades.len(), 1);
        assert!(series.points[1].trades.is_empty());
        let last = series.points.last().unwrap();
        assert!(approx(last.total_value, 140.0));
        assert!(approx(last.total_invested, 100.0));
        assert!(approx(last.roi_percent, 40.0));
        assert!(approx(last.btc_price, 140.0));
    }

    #[test]
    fn history_skips_unpriced_dates() {
        let d0 = make_date(2024, 1, 1);
        let mut history = PriceHistory::new();
        history.set_price(Asset::Btc, d0 + Duration::days(2), 100.0);
        let txs = vec![Transaction::buy(Asset::Btc, 1.0, 100.0, d0)];

        let series = AnalyticsService::default()
            .portfolio_history(&txs, &history, d0, d0 + Duration::days(3), 1)
            .unwrap();

        assert_eq!(series.data_points(), 2);
        assert_eq!(series.start, Some(d0 + Duration::days(2)));
        // The buy marker moves onto the first point that could be priced.
        assert_eq!(series.points[0].trades.len(), 1);
    }

    #[test]
    fn history_is_capped() {
        let d0 = make_date(2023, 1, 1);
        let mut history = PriceHistory::new();
        history.set_price(Asset::Btc, d0, 100.0);
        let txs = vec![Transaction::buy(Asset::Btc, 1.0, 100.0, d0)];

        let series = AnalyticsService::default()
            .portfolio_history(&txs, &history, d0, d0 + Duration::days(400), 1)
            .unwrap();
        assert!(series.data_points() as i64 <= MAX_HISTORY_POINTS);
        assert!(series.interval_days > 1);
    }

    #[test]
    fn history_rejects_inverted_range() {
        let result = AnalyticsService::default().portfolio_history(
            &[],
            &PriceHistory::new(),
            make_date(2024, 2, 1),
            make_date(2024, 1, 1),
            1,
        );
        assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }

    #[test]
    fn risk_metrics_drawdown_and_volatility() {
        let mut holdings = HashMap::new();
        holdings.insert(
            Asset::Btc,
            Holding {
                quantity_held: 1.0,
                total_invested_usd: 500.0,
                ..Holding::empty(Asset::Btc)
            },
        );
        holdings.insert(
            Asset::Eth,
            Holding {
                quantity_held: 1.0,
                total_invested_usd: 500.0,
                ..Holding::empty(Asset::Eth)
            },
        );

        let risk = AnalyticsService::default().risk_metrics(
            &series(&[100.0, 110.0, 99.0, 120.0]),
            &holdings,
            0.02,
        );

        assert!(approx(risk.max_drawdown_percent, 10.0));
        assert!(risk.volatility_percent > 0.0);
        assert!(approx(
            risk.annualized_volatility_percent,
            risk.volatility_percent * 365.0_f64.sqrt()
        ));
        assert!(approx(risk.diversification_score, 0.5));
        // Too few returns for VaR.
        assert_eq!(risk.value_at_risk_95_percent, 0.0);
        assert_eq!(risk.data_points, 4);
    }

    #[test]
    fn risk_metrics_need_two_returns() {
        let risk = AnalyticsService::default().risk_metrics(&series(&[100.0, 105.0]), &HashMap::new(), 0.02);
        assert_eq!(risk.volatility_percent, 0.0);
        assert_eq!(risk.sharpe_ratio, 0.0);
        assert_eq!(risk.diversification_score, 0.0);
    }

    #[test]
    fn var_with_enough_returns() {
        // 21 points → 20 returns: alternating +10% and −10%-ish moves.
        let mut values = vec![100.0];
        for i in 0..20 {
            let last = *values.last().unwrap();
            values.push(if i % 2 == 0 { last * 1.1 } else { last * 0.9 });
        }
        let risk = AnalyticsService::default().risk_metrics(&series(&values), &HashMap::new(), 0.0);
        assert!(approx(risk.value_at_risk_95_percent, -10.0));
        assert!(risk.value_at_risk_95_usd < 0.0);
    }

    #[test]
    fn benchmark_comparison() {
        let start = make_date(2024, 1, 1);
        let end = make_date(2024, 1, 31);
        let history = PortfolioHistory {
            interval_days: 1,
            start: Some(start),
            end: Some(end),
            points: vec![point(start, 1000.0, 100.0, 10.0), point(end, 1100.0, 120.0, 9.0)],
        };

        let cmp = AnalyticsService::default().benchmark_comparison(&history);
        assert!(approx(cmp.portfolio_return_percent, 10.0));
        assert!(approx(cmp.btc.return_percent, 20.0));
        assert!(approx(cmp.eth.return_percent, -10.0));
        assert!(approx(cmp.balanced.return_percent, 5.0));
        assert!(approx(cmp.btc.outperformance_percent, -10.0));
        assert!(approx(cmp.eth.outperformance_percent, 20.0));
        assert!(approx(cmp.balanced.outperformance_percent, 5.0));
        assert_eq!(cmp.btc.start_price, Some(100.0));
    }

    #[test]
    fn benchmark_on_empty_history() {
        let cmp = AnalyticsService::default().benchmark_comparison(&series(&[]));
        assert!(cmp.start.is_none());
        assert_eq!(cmp.portfolio_return_percent, 0.0);
    }

    #[test]
    fn transaction_analysis_realized_and_unrealized() {
        let txs = vec![
            Transaction::buy(Asset::Eth, 1.0, 2000.0, make_date(2024, 1, 1)),
            Transaction::sell(Asset::Eth, 0.5, 2500.0, make_date(2024, 2, 1)),
        ];
        let analysis = AnalyticsService::default()
            .transaction_analysis(&txs, &prices(None, Some(3000.0)), make_date(2024, 3, 1))
            .unwrap();

        let eth = analysis.asset(Asset::Eth);
        assert!(approx(eth.total_bought, 1.0));
        assert!(approx(eth.total_sold, 0.5));
        assert!(approx(eth.net_quantity, 0.5));
        assert!(approx(eth.total_invested_usd, 2000.0));
        assert!(approx(eth.total_received_usd, 1250.0));
        assert!(approx(eth.realized_profit_loss_usd, 250.0));
        assert!(approx(eth.unrealized_profit_loss_usd, 500.0));

        let sell = &eth.transactions[1];
        assert_eq!(sell.kind, TransactionKind::Sell);
        assert_eq!(sell.average_buy_price_usd, Some(2000.0));
        assert!(approx(sell.realized_profit_loss_usd.unwrap(), 250.0));
        assert!(approx(sell.realized_profit_loss_percent.unwrap(), 25.0));
        assert!(eth.transactions[0].realized_profit_loss_usd.is_none());

        assert!(analysis.btc.transactions.is_empty());
    }

    #[test]
    fn transaction_analysis_needs_price_for_open_position() {
        let txs = vec![Transaction::buy(Asset::Btc, 1.0, 100.0, make_date(2024, 1, 1))];
        let result = AnalyticsService::default().transaction_analysis(&txs, &HashMap::new(), make_date(2024, 3, 1));
        assert!(matches!(result, Err(CoreError::PriceNotAvailable { .. })));
    }

    #[test]
    fn daily_change() {
        let date = make_date(2024, 1, 10);
        let mut history = PriceHistory::new();
        history.set_price(Asset::Btc, date - Duration::days(1), 100.0);
        history.set_price(Asset::Btc, date, 110.0);
        let txs = vec![Transaction::buy(Asset::Btc, 2.0, 90.0, make_date(2024, 1, 1))];

        let change = AnalyticsService::default()
            .daily_change(&txs, &history, date)
            .unwrap();
        assert!(approx(change.btc_change_usd, 20.0));
        assert_eq!(change.eth_change_usd, 0.0);
        assert!(approx(change.total_change_usd, 20.0));
        assert!(approx(change.total_change_percent, 10.0));
        assert_eq!(change.previous_date, date - Duration::days(1));
    }
}

// ═══════════════════════════════════════════════════════════════════
// DcaService
// ═══════════════════════════════════════════════════════════════════

mod dca {
    use super::*;

    fn flat_history(start: NaiveDate, days: i64) -> PriceHistory {
        let mut history = PriceHistory::new();
        for i in 0..days {
            let date = start + Duration::days(i);
            history.set_price(Asset::Btc, date, 50_000.0);
            history.set_price(Asset::Eth, date, 2_500.0);
        }
        history
    }

    #[test]
    fn weekly_btc_biweekly_eth() {
        let start = make_date(2024, 1, 1);
        let plan = DcaPlan::weekly_btc_biweekly_eth(start);
        let txs = DcaService::new()
            .simulate(&plan, &flat_history(start, 28), start + Duration::days(27))
            .unwrap();

        let btc: Vec<&Transaction> = txs.iter().filter(|t| t.asset == Asset::Btc).collect();
        let eth: Vec<&Transaction> = txs.iter().filter(|t| t.asset == Asset::Eth).collect();
        assert_eq!(btc.len(), 4);
        assert_eq!(eth.len(), 2);
        assert_eq!(eth[1].date, start + Duration::days(14));

        // Fee lands in the cost basis.
        assert!(approx(btc[0].value_usd(), 102.0));
        assert!(approx(btc[0].quantity, 100.0 / 50_000.0));
        assert!(approx(eth[0].value_usd(), 51.8));
        assert!(txs.iter().all(|t| t.kind == TransactionKind::Buy));
        assert!(txs.iter().all(|t| t.notes.as_deref() == Some(DCA_NOTE)));
    }

    #[test]
    fn missing_price_skips_but_keeps_schedule() {
        let start = make_date(2024, 1, 1);
        let history = flat_history(start, 28);
        let mut sparse = PriceHistory::new();
        for p in history.range(Asset::Btc, start, start + Duration::days(27)) {
            if p.date != start + Duration::days(7) {
                sparse.set_price(Asset::Btc, p.date, p.price);
            }
        }

        let plan = DcaPlan {
            start,
            frequency: DcaFrequency::Weekly,
            legs: vec![DcaLeg {
                asset: Asset::Btc,
                usd_amount: 100.0,
                fee_usd: 0.0,
                every_n_periods: 1,
            }],
        };
        let txs = DcaService::new()
            .simulate(&plan, &sparse, start + Duration::days(27))
            .unwrap();
        let dates: Vec<NaiveDate> = txs.iter().map(|t| t.date).collect();
        assert_eq!(
            dates,
            vec![start, start + Duration::days(14), start + Duration::days(21)]
        );
    }

    #[test]
    fn invalid_leg_rejected() {
        let start = make_date(2024, 1, 1);
        let mut plan = DcaPlan::weekly_btc_biweekly_eth(start);
        plan.legs[0].usd_amount = 0.0;
        let err = DcaService::new()
            .simulate(&plan, &PriceHistory::new(), start)
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        let mut plan = DcaPlan::weekly_btc_biweekly_eth(start);
        plan.legs[1].every_n_periods = 0;
        assert!(DcaService::new().simulate(&plan, &PriceHistory::new(), start).is_err());
    }

    #[test]
    fn plan_without_legs_rejected() {
        let plan = DcaPlan {
            start: make_date(2024, 1, 1),
            frequency: DcaFrequency::Monthly,
            legs: Vec::new(),
        };
        assert!(DcaService::new()
            .simulate(&plan, &PriceHistory::new(), make_date(2024, 6, 1))
            .is_err());
    }

    #[test]
    fn simulated_plan_is_valid_ledger_input() {
        let start = make_date(2024, 1, 1);
        let plan = DcaPlan::weekly_btc_biweekly_eth(start);
        let txs = DcaService::new()
            .simulate(&plan, &flat_history(start, 60), start + Duration::days(59))
            .unwrap();

        let mut ledger = Ledger::default();
        LedgerService::default()
            .add_transactions(&mut ledger, txs.clone())
            .unwrap();
        assert_eq!(ledger.transactions.len(), txs.len());
    }
}

// ═══════════════════════════════════════════════════════════════════
// PriceService
// ═══════════════════════════════════════════════════════════════════

mod price_service {
    use super::*;

    #[tokio::test]
    async fn price_on_date_cache_miss_then_hit() {
        let state = MockState::default();
        let svc = make_price_service(&state);
        let date = make_date(2024, 1, 15);

        assert_eq!(svc.price_on_date(Asset::Btc, date).await.unwrap(), 42_000.0);
        assert_eq!(state.calls(), 1);

        assert_eq!(svc.price_on_date(Asset::Btc, date).await.unwrap(), 42_000.0);
        assert_eq!(state.calls(), 1, "second lookup must come from the cache");
    }

    #[tokio::test]
    async fn cached_historical_price_wins() {
        let state = MockState::default();
        let svc = make_price_service(&state);
        let date = make_date(2024, 1, 15);
        svc.update_cache(|c| c.history.set_price(Asset::Btc, date, 99_999.0));

        assert_eq!(svc.price_on_date(Asset::Btc, date).await.unwrap(), 99_999.0);
        assert_eq!(state.calls(), 0);
    }

    #[tokio::test]
    async fn no_provider_fails() {
        let svc = PriceService::new(PriceProviderRegistry::new(), PriceCache::default(), 7);
        let err = svc
            .price_on_date(Asset::Eth, make_date(2024, 1, 15))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoProvider(_)));
    }

    #[tokio::test]
    async fn future_date_not_available() {
        let state = MockState::default();
        let svc = make_price_service(&state);
        let err = svc
            .price_on_date(Asset::Btc, today() + Duration::days(3))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PriceNotAvailable { .. }));
        assert_eq!(state.calls(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_next_provider() {
        let failing = MockState::default();
        failing.fail();
        let healthy = MockState::default();

        let mut registry = PriceProviderRegistry::new();
        registry.register(Box::new(MockPriceProvider::new(failing.clone()).named("down")));
        registry.register(Box::new(
            MockPriceProvider::new(healthy.clone())
                .named("up")
                .with_current(Asset::Eth, 3_100.0),
        ));
        let svc = PriceService::new(registry, PriceCache::default(), 7);

        let quote = svc.current_price(Asset::Eth).await.unwrap();
        assert_eq!(quote.price, 3_100.0);
        assert_eq!(quote.freshness, PriceFreshness::Live);
        assert_eq!(failing.calls(), 1);
        assert_eq!(healthy.calls(), 1);
    }

    #[tokio::test]
    async fn invalid_price_is_rejected() {
        let state = MockState::default();
        let provider = MockPriceProvider::new(state.clone()).with_current(Asset::Btc, 0.0);
        let svc = PriceService::new(make_registry(provider), PriceCache::default(), 7);
        let err = svc.current_price(Asset::Btc).await.unwrap_err();
        assert!(matches!(err, CoreError::Api { .. }));
    }

    #[tokio::test]
    async fn current_price_bypasses_todays_cache() {
        let state = MockState::default();
        let svc = make_price_service(&state);
        let today = today();
        svc.update_cache(|c| {
            c.history.set_price(Asset::Btc, today, 1.0);
            c.mark_updated_today(Asset::Btc, today);
        });

        let quote = svc.current_price(Asset::Btc).await.unwrap();
        assert_eq!(quote.price, 44_000.0);
        assert_eq!(quote.freshness, PriceFreshness::Live);
        assert_eq!(state.calls(), 1);
        // The fresh quote replaces the cached one.
        assert_eq!(svc.with_cache(|c| c.history.get_price(Asset::Btc, today)), Some(44_000.0));
    }

    #[tokio::test]
    async fn stale_fallback_when_providers_fail() {
        let state = MockState::default();
        let svc = make_price_service(&state);

        let live = svc.current_price(Asset::Eth).await.unwrap();
        assert_eq!(live.freshness, PriceFreshness::Live);

        state.fail();
        let stale = svc.current_price(Asset::Eth).await.unwrap();
        assert_eq!(stale.freshness, PriceFreshness::Stale);
        assert_eq!(stale.price, live.price);
    }

    #[tokio::test]
    async fn stale_fallback_uses_recent_history() {
        let state = MockState::default();
        state.fail();
        let svc = make_price_service(&state);
        let recent = today() - Duration::days(2);
        svc.update_cache(|c| c.history.set_price(Asset::Btc, recent, 60_000.0));

        let quote = svc.current_price(Asset::Btc).await.unwrap();
        assert_eq!(quote.freshness, PriceFreshness::Stale);
        assert_eq!(quote.price, 60_000.0);
        assert_eq!(quote.fetched_on, recent);
    }

    #[tokio::test]
    async fn too_old_quote_is_not_served() {
        let state = MockState::default();
        state.fail();
        let svc = make_price_service(&state);
        let old = today() - Duration::days(30);
        svc.update_cache(|c| {
            c.record_quote(Quote {
                asset: Asset::Btc,
                price: 30_000.0,
                fetched_on: old,
                freshness: PriceFreshness::Live,
            })
        });

        let err = svc.current_price(Asset::Btc).await.unwrap_err();
        assert!(matches!(err, CoreError::Api { .. }));
    }

    #[tokio::test]
    async fn price_history_fetches_then_serves_from_cache() {
        let state = MockState::default();
        let svc = make_price_service(&state);
        let (from, to) = (make_date(2024, 1, 15), make_date(2024, 1, 17));

        let points = svc.price_history(Asset::Btc, from, to).await.unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(state.calls(), 1);

        let again = svc.price_history(Asset::Btc, from, to).await.unwrap();
        assert_eq!(again, points);
        assert_eq!(state.calls(), 1);
    }

    #[tokio::test]
    async fn price_history_serves_partial_cache_when_offline() {
        let state = MockState::default();
        state.fail();
        let svc = make_price_service(&state);
        svc.update_cache(|c| c.history.set_price(Asset::Eth, make_date(2024, 1, 15), 2_500.0));

        let points = svc
            .price_history(Asset::Eth, make_date(2024, 1, 1), make_date(2024, 3, 1))
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
    }

    #[tokio::test]
    async fn price_history_rejects_inverted_range() {
        let svc = make_price_service(&MockState::default());
        let err = svc
            .price_history(Asset::Eth, make_date(2024, 2, 1), make_date(2024, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[tokio::test]
    async fn history_for_collects_assets() {
        let svc = make_price_service(&MockState::default());
        let history = svc
            .history_for(&[Asset::Btc, Asset::Eth], make_date(2024, 1, 15), make_date(2024, 1, 17))
            .await
            .unwrap();
        assert_eq!(history.get_price(Asset::Eth, make_date(2024, 1, 16)), Some(2_600.0));
        assert_eq!(history.asset_count(), 2);
    }

    #[tokio::test]
    async fn concurrent_lookups_share_the_cache() {
        let state = MockState::default();
        let svc = Arc::new(make_price_service(&state));
        let date = make_date(2024, 1, 16);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.price_on_date(Asset::Btc, date).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 43_500.0);
        }
        assert_eq!(svc.with_cache(|c| c.history.get_price(Asset::Btc, date)), Some(43_500.0));
    }
}
