//! Symbol Runtime (C6, spec.md §4.6): the lifecycle owner for one traded
//! symbol. Wires Price Monitor, Order Executor, Slot Grid, Position Manager,
//! and the Safety subsystem together, and owns the task handles for the
//! four reader loops described in spec.md §5 (T1 price, T2 order events, T3
//! reconciler ticks, T4 safety candles). The Position Manager's adjust loop
//! is deliberately not its own task — it runs synchronously inside whichever
//! of T1/T2/T3 invoked it, serialized by its own manager mutex.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::SymbolConfig;
use crate::core::{ClientOid, Side};
use crate::exchange::{Exchange, PlaceRequest};
use crate::executor::{OrderExecutor, RateLimiter, RateLimiterConfig};
use crate::grid::{Grid, GridParams};
use crate::monitoring::MetricsRegistry;
use crate::persistence::TradeStorage;
use crate::position_manager::PositionManager;
use crate::price_monitor::PriceMonitor;
use crate::safety::circuit_breaker::CircuitBreaker;
use crate::safety::{reconcile_once, run_pre_trade_checks, PreTradeInputs};

/// How far below the current price a close-all-on-exit sell is placed to
/// guarantee it crosses the book (spec.md §4.5.4 "limit at current or mark
/// price ± slippage allowance").
const CLOSE_ALL_SLIPPAGE: Decimal = dec!(0.01);

/// How long to wait for the close-all-on-exit order to fill before giving
/// up and logging the residual (spec.md §4.5.4 "wait up to 30s").
const CLOSE_ALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Cadence of the safety candle reader (T4): one 1-minute candle at a time,
/// matching the circuit breaker's volume window (spec.md §4.5.2).
const CANDLE_POLL_INTERVAL: Duration = Duration::from_secs(60);

fn grid_params(config: &SymbolConfig, price_decimals: u32, quantity_decimals: u32) -> GridParams {
    GridParams {
        price_interval: config.price_interval,
        order_quantity: config.order_quantity,
        buy_window_size: config.buy_window_size,
        sell_window_size: config.sell_window_size,
        price_decimals,
        quantity_decimals,
    }
}

/// One symbol's worth of running state (C6). Built once per symbol by
/// whatever binary owns the top-level `Config`; `Start`/`Stop` bracket the
/// symbol's trading lifetime.
pub struct SymbolRuntime {
    symbol: String,
    exchange: Arc<dyn Exchange>,
    storage: Arc<dyn TradeStorage>,
    metrics: Arc<MetricsRegistry>,
    grid: Arc<Grid>,
    executor: Arc<OrderExecutor>,
    position_manager: Arc<PositionManager>,
    price_monitor: Arc<PriceMonitor>,
    circuit_breaker: AsyncMutex<CircuitBreaker>,
    price_decimals: u32,
    quantity_decimals: u32,
    config: watch::Sender<SymbolConfig>,
    tasks: AsyncMutex<Vec<JoinHandle<()>>>,
}

impl SymbolRuntime {
    /// Builds every C1-C5 component for `config.symbol`. Fetches
    /// `symbol_metadata` from the exchange up front since price/quantity
    /// rounding is needed to construct the grid.
    pub async fn build(
        config: SymbolConfig,
        exchange: Arc<dyn Exchange>,
        storage: Arc<dyn TradeStorage>,
        metrics: Arc<MetricsRegistry>,
    ) -> crate::Result<Arc<Self>> {
        Self::build_with_strategy(config, exchange, storage, metrics, None).await
    }

    /// Same as [`Self::build`], additionally attaching the optional
    /// strategy-driven-entry capability (spec.md §9) to the Position
    /// Manager it constructs.
    pub async fn build_with_strategy(
        config: SymbolConfig,
        exchange: Arc<dyn Exchange>,
        storage: Arc<dyn TradeStorage>,
        metrics: Arc<MetricsRegistry>,
        strategy: Option<Arc<dyn crate::strategy::Strategy>>,
    ) -> crate::Result<Arc<Self>> {
        let metadata = exchange
            .symbol_metadata(&config.symbol)
            .await
            .map_err(|e| anyhow::anyhow!("symbol_metadata failed for {}: {e}", config.symbol))?;

        let grid = Arc::new(Grid::new(grid_params(
            &config,
            metadata.price_decimals,
            metadata.quantity_decimals,
        )));
        let rate_limiter = RateLimiter::new(RateLimiterConfig {
            max_orders_per_second: config.order_executor.rate_limit as u64,
            burst_capacity: (config.order_executor.rate_limit as u64).max(1) * 2,
            refill_rate: config.order_executor.rate_limit as f64,
            refill_interval: Duration::from_secs(1),
        });
        let executor = Arc::new(
            OrderExecutor::new(exchange.clone(), rate_limiter, metrics.clone())
                .with_max_retries(config.order_executor.max_retries),
        );
        let mut position_manager = PositionManager::new(
            config.symbol.clone(),
            grid.clone(),
            executor.clone(),
            storage.clone(),
            metrics.clone(),
        );
        if let Some(strategy) = strategy {
            position_manager = position_manager.with_strategy(strategy);
        }
        let position_manager = Arc::new(position_manager);
        let price_monitor = Arc::new(PriceMonitor::new(config.symbol.clone(), metrics.clone()));
        let circuit_breaker = AsyncMutex::new(CircuitBreaker::new(config.risk));

        let (config_tx, _) = watch::channel(config.clone());

        Ok(Arc::new(Self {
            symbol: config.symbol.clone(),
            exchange,
            storage,
            metrics,
            grid,
            executor,
            position_manager,
            price_monitor,
            circuit_breaker,
            price_decimals: metadata.price_decimals,
            quantity_decimals: metadata.quantity_decimals,
            config: config_tx,
            tasks: AsyncMutex::new(Vec::new()),
        }))
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn grid(&self) -> &Arc<Grid> {
        &self.grid
    }

    pub fn position_manager(&self) -> &Arc<PositionManager> {
        &self.position_manager
    }

    fn current_config(&self) -> SymbolConfig {
        self.config.borrow().clone()
    }

    /// `Start()` (spec.md §4.6): run the pre-trade gate, recover state from
    /// the exchange, then spawn T1-T4.
    pub async fn start(self: &Arc<Self>) -> crate::Result<()> {
        let config = self.current_config();

        let position = self
            .exchange
            .get_position(&self.symbol)
            .await
            .map_err(|e| anyhow::anyhow!("start: get_position failed: {e}"))?;
        let balance = self
            .exchange
            .get_balance("USDT")
            .await
            .map_err(|e| anyhow::anyhow!("start: get_balance failed: {e}"))?;

        let round_trip_fee = config.order_quantity * dec!(0.001);
        let report = run_pre_trade_checks(&PreTradeInputs {
            available_balance: balance,
            min_balance: config.order_quantity,
            current_leverage: position.leverage,
            max_leverage: config.max_leverage,
            has_unrelated_position: false,
            order_quantity: config.order_quantity,
            price_interval: config.price_interval,
            round_trip_fee,
        });
        for warning in &report.warnings {
            warn!(symbol = %self.symbol, warning, "pre-trade check warning");
        }
        if let Some(reason) = report.fatal {
            return Err(anyhow::anyhow!("pre-trade check failed for {}: {reason}", self.symbol));
        }

        self.position_manager.initialize(self.exchange.as_ref()).await?;

        let mut tasks = self.tasks.lock().await;
        tasks.push(self.spawn_price_task());
        tasks.push(self.spawn_order_event_task());
        tasks.push(self.spawn_reconciler_task());
        tasks.push(self.spawn_candle_task());

        info!(symbol = %self.symbol, "symbol runtime started");
        Ok(())
    }

    /// T1: the price-stream reader (spec.md §5). `PriceMonitor::run` owns
    /// reconnection; this task is the subscriber that turns every emitted
    /// `PriceState` into one `AdjustOrders` pass.
    fn spawn_price_task(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let monitor = this.price_monitor.clone();
            let exchange = this.exchange.clone();
            let runner = tokio::spawn(monitor.clone().run(exchange));

            let mut rx = this.price_monitor.subscribe();
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                let state = *rx.borrow();
                if state.ok {
                    this.position_manager.adjust_orders(state.price).await;
                }
            }
            runner.abort();
        })
    }

    /// T2: the order-event reader (spec.md §5).
    fn spawn_order_event_task(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let (tx, mut rx) = tokio::sync::mpsc::channel(256);
            if let Err(e) = this.exchange.subscribe_order_stream(tx).await {
                error!(symbol = %this.symbol, %e, "could not subscribe to order stream");
                return;
            }
            while let Some(event) = rx.recv().await {
                let price = this.price_monitor.latest().price;
                this.position_manager.on_order_update(event, price).await;
            }
        })
    }

    /// T3: the reconciler ticker (spec.md §5 / §4.5.3).
    fn spawn_reconciler_task(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let interval_secs = this.current_config().reconcile_interval_seconds.max(1);
                tokio::time::sleep(Duration::from_secs(interval_secs)).await;
                let now = crate::position_manager::now_millis();
                match reconcile_once(
                    &this.symbol,
                    &this.grid,
                    &this.executor,
                    this.exchange.as_ref(),
                    &this.position_manager,
                    this.storage.as_ref(),
                    now,
                )
                .await
                {
                    Ok(record) => {
                        this.metrics.reconciliation_runs_total.inc();
                        if record.divergences_found > 0 {
                            this.metrics
                                .reconciliation_divergences_total
                                .inc_by(record.divergences_found as u64);
                        }
                    }
                    Err(e) => error!(symbol = %this.symbol, %e, "reconciliation pass failed"),
                }
            }
        })
    }

    /// T4: the safety candle reader (spec.md §5 / §4.5.2).
    fn spawn_candle_task(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut last_open_ts: Option<i64> = None;
            loop {
                tokio::time::sleep(CANDLE_POLL_INTERVAL).await;
                let candles = match this
                    .exchange
                    .get_historical_candles(&this.symbol, "1m", 21)
                    .await
                {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(symbol = %this.symbol, %e, "candle fetch failed, skipping this tick");
                        continue;
                    }
                };
                let Some(latest) = candles.last() else { continue };
                if last_open_ts == Some(latest.open_ts_millis) {
                    continue; // no new closed candle yet
                }
                last_open_ts = Some(latest.open_ts_millis);

                this.position_manager.on_strategy_candle(latest);

                let mut breaker = this.circuit_breaker.lock().await;
                if let Some(event) = breaker.on_candle(latest) {
                    drop(breaker);
                    this.metrics.risk_event_triggered.set(event.triggered as i64);
                    this.metrics
                        .risk_events_total
                        .with_label_values(&[if event.triggered { "trip" } else { "clear" }])
                        .inc();
                    this.position_manager.set_risk_paused(event.triggered);
                    if event.triggered {
                        warn!(
                            symbol = %this.symbol,
                            vol_ratio = event.vol_ratio,
                            price_move = event.price_move,
                            "circuit breaker tripped, pausing new buys"
                        );
                    } else {
                        info!(symbol = %this.symbol, "circuit breaker cleared, resuming buys");
                    }
                }
            }
        })
    }

    /// `Stop()` (spec.md §4.4.5 / §4.6): stop every reader task, cancel
    /// everything resting on the book, and optionally close out any
    /// remaining position before returning.
    pub async fn stop(&self) -> crate::Result<()> {
        {
            let mut tasks = self.tasks.lock().await;
            for task in tasks.drain(..) {
                task.abort();
            }
        }

        self.position_manager.cancel_everything().await?;

        let config = self.current_config();
        if config.close_positions_on_exit {
            self.close_all_on_exit().await;
        }

        info!(symbol = %self.symbol, "symbol runtime stopped");
        Ok(())
    }

    /// Close-all-on-exit (spec.md §4.5.4): after cancel-all, if the account
    /// still holds a nonzero position, submit one reduce-only order priced
    /// to cross the book immediately and wait for it to clear.
    async fn close_all_on_exit(&self) {
        let position = match self.exchange.get_position(&self.symbol).await {
            Ok(p) => p,
            Err(e) => {
                error!(symbol = %self.symbol, %e, "close-all-on-exit: get_position failed, skipping");
                return;
            }
        };
        if position.net_qty <= Decimal::ZERO {
            return;
        }

        let current_price = match self.exchange.get_latest_price(&self.symbol).await {
            Ok(p) => p,
            Err(_) => position.entry_price,
        };
        // Long-only grid: the only residual to close is a long, so the exit
        // is always a sell priced below market to guarantee a cross.
        let price = (current_price * (Decimal::ONE - CLOSE_ALL_SLIPPAGE)).round_dp(self.price_decimals);
        let quantity = position.net_qty.round_dp(self.quantity_decimals);
        let client_oid = ClientOid::new(Side::Sell, price, self.price_decimals).to_string();

        info!(symbol = %self.symbol, %price, %quantity, "close-all-on-exit: submitting reduce-only exit order");
        let result = self
            .executor
            .batch_place(vec![PlaceRequest {
                symbol: self.symbol.clone(),
                client_oid,
                side: Side::Sell,
                price,
                quantity,
                reduce_only: true,
            }])
            .await;
        if result.placed.is_empty() {
            warn!(symbol = %self.symbol, "close-all-on-exit: exit order was not accepted, residual position remains");
            return;
        }

        let deadline = tokio::time::Instant::now() + CLOSE_ALL_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            match self.exchange.get_position(&self.symbol).await {
                Ok(p) if p.net_qty <= Decimal::ZERO => {
                    info!(symbol = %self.symbol, "close-all-on-exit: position fully closed");
                    return;
                }
                Ok(_) => tokio::time::sleep(Duration::from_millis(500)).await,
                Err(_) => tokio::time::sleep(Duration::from_millis(500)).await,
            }
        }
        warn!(symbol = %self.symbol, "close-all-on-exit: timed out waiting for exit fill, residual position may remain");
    }

    /// `ApplyConfigUpdate(newCfg)` (spec.md §4.6): hot-update window sizes,
    /// `order_quantity`, and risk thresholds in place; a change to
    /// `price_interval`, `exchange`, or `symbol` instead triggers a full
    /// cancel-all and re-initialize.
    pub async fn apply_config_update(&self, new_config: SymbolConfig) -> crate::Result<()> {
        let old_config = self.current_config();
        if old_config.requires_reinit(&new_config) {
            info!(symbol = %self.symbol, "config change requires re-init, canceling all orders");
            self.position_manager.cancel_everything().await?;
            self.grid
                .set_params(grid_params(&new_config, self.price_decimals, self.quantity_decimals));
            self.circuit_breaker.lock().await.set_config(new_config.risk);
            let _ = self.config.send(new_config);
            self.position_manager.initialize(self.exchange.as_ref()).await?;
        } else {
            self.grid
                .set_params(grid_params(&new_config, self.price_decimals, self.quantity_decimals));
            self.circuit_breaker.lock().await.set_config(new_config.risk);
            let _ = self.config.send(new_config);
            info!(symbol = %self.symbol, "config hot-updated");
        }
        Ok(())
    }
}
