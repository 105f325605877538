//! Main application orchestration.
//!
//! One polling loop drives every component in order:
//! quotes, sampler, decision engine, execution, ledger settlement, trade
//! log, metrics. Only this loop writes the ledger; the status server reads
//! it through [`StatusReporter`].

use std::future::Future;
use std::sync::Arc;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use xarb_core::{DynExchangeClient, InstrumentTag, MarketQuote, QuotePair};
use xarb_detector::{DetectorError, SpreadSampler, StableOpportunity};
use xarb_engine::{Decision, DecisionEngine, EngineError, Tick};
use xarb_executor::{
    ExecutionCoordinator, ExecutionReport, HardStopLatch, PaperExchange, Settlement,
};
use xarb_feed::InfoClient;
use xarb_persistence::{TradeLogRecord, TradeLogWriter};
use xarb_position::PositionLedger;
use xarb_telemetry::Metrics;

use crate::config::{AppConfig, OperatingMode};
use crate::error::AppResult;
use crate::server;
use crate::status::{MarketView, StatusReporter};

/// Wall-clock epoch millis.
pub fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Why a cycle produced no decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A leg could not be fetched within the retry bound.
    QuoteFetch,
    /// Crossed, one-sided or stale quotes.
    InvalidQuote,
}

/// What one cycle did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub skipped: Option<SkipReason>,
    pub opportunity: Option<StableOpportunity>,
    pub decisions: Vec<Decision>,
    pub executions: Vec<ExecutionReport>,
}

impl CycleReport {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

/// Main application.
pub struct Application {
    config: AppConfig,
    exchange: DynExchangeClient,
    sampler: SpreadSampler,
    engine: DecisionEngine,
    coordinator: ExecutionCoordinator,
    ledger: Arc<RwLock<PositionLedger>>,
    hard_stop: Arc<HardStopLatch>,
    market: Arc<RwLock<MarketView>>,
    writer: Option<TradeLogWriter>,
    cycles: u64,
}

impl Application {
    /// Application wired to the info endpoint. Paper mode wraps it in the
    /// simulated venue; observation mode only ever reads quotes.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let info: DynExchangeClient = Arc::new(InfoClient::with_timeout(
            config.info_url.clone(),
            config.monitor.request_timeout(),
        )?);
        let exchange: DynExchangeClient = match config.mode {
            OperatingMode::Observation => info,
            OperatingMode::Paper => Arc::new(PaperExchange::with_market_data(info)),
        };
        Self::with_exchange(config, exchange)
    }

    /// Application over an arbitrary venue.
    pub fn with_exchange(config: AppConfig, exchange: DynExchangeClient) -> AppResult<Self> {
        config.validate()?;

        let hard_stop = Arc::new(HardStopLatch::new());
        let coordinator = ExecutionCoordinator::new(
            Arc::clone(&exchange),
            config.execution.clone(),
            config.detector.calculator(),
            Arc::clone(&hard_stop),
        );
        let writer = (config.persistence.enabled && !config.is_observation_mode())
            .then(|| TradeLogWriter::from_config(&config.persistence));

        Ok(Self {
            sampler: SpreadSampler::new(&config.detector),
            engine: DecisionEngine::new(config.strategy.clone(), &config.detector),
            ledger: Arc::new(RwLock::new(PositionLedger::new(config.limits.clone()))),
            market: Arc::new(RwLock::new(MarketView::default())),
            coordinator,
            hard_stop,
            exchange,
            writer,
            cycles: 0,
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn ledger(&self) -> Arc<RwLock<PositionLedger>> {
        Arc::clone(&self.ledger)
    }

    pub fn hard_stop(&self) -> Arc<HardStopLatch> {
        Arc::clone(&self.hard_stop)
    }

    pub fn status_reporter(&self) -> StatusReporter {
        StatusReporter::new(
            self.config.mode,
            Arc::clone(&self.ledger),
            Arc::clone(&self.hard_stop),
            Arc::clone(&self.market),
            self.config.detector.calculator(),
        )
    }

    /// Run until ctrl-c.
    pub async fn run(self) -> AppResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(?e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `shutdown` resolves. The signal is only seen between
    /// cycles, so an in-flight execution and its rollback always finish.
    pub async fn run_until<F>(mut self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        info!(
            mode = self.config.mode.as_str(),
            leg_a = %self.config.legs.a,
            leg_b = %self.config.legs.b,
            interval_ms = self.config.monitor.interval_ms,
            "Starting application"
        );

        let server_handle = if self.config.status_server.enabled {
            let addr = self.config.status_server.socket_addr()?;
            let reporter = self.status_reporter();
            Some(tokio::spawn(async move {
                if let Err(e) = server::serve(addr, reporter).await {
                    error!(error = %e, "Status server stopped");
                }
            }))
        } else {
            None
        };

        let mut ticker = interval(self.config.monitor.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                _ = ticker.tick() => {
                    self.run_cycle(now_ms()).await;
                }
            }
        }

        let result = self.shutdown();
        if let Some(handle) = server_handle {
            handle.abort();
        }
        result
    }

    /// One full cycle starting at `now_ms`.
    pub async fn run_cycle(&mut self, now_ms: u64) -> CycleReport {
        let started = Instant::now();
        self.cycles += 1;

        let report = self.cycle(now_ms, started).await;

        self.market.write().cycles = self.cycles;
        self.update_ledger_metrics();
        Metrics::cycle_duration(started.elapsed().as_secs_f64() * 1000.0);

        let every = self.config.monitor.status_interval_cycles;
        if every > 0 && self.cycles % every == 0 {
            self.log_status(now_ms);
        }
        report
    }

    async fn cycle(&mut self, started_ms: u64, started: Instant) -> CycleReport {
        let quotes = match self.fetch_quotes().await {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(error = %e, "Quote fetch failed, deferring to next poll");
                return CycleReport::skipped(SkipReason::QuoteFetch);
            }
        };
        // Quote age is judged when the fetch returns, retries included.
        let now_ms = started_ms + started.elapsed().as_millis() as u64;

        let observed = self.sampler.observe(&quotes, now_ms);
        {
            let mut market = self.market.write();
            market.quotes = Some(quotes.clone());
            market.observation = self.sampler.last_observation().cloned();
            market.opportunity = observed.as_ref().ok().cloned().flatten();
        }
        let opportunity = match observed {
            Ok(opportunity) => opportunity,
            Err(e) => {
                record_invalid_quote(&e);
                return CycleReport::skipped(SkipReason::InvalidQuote);
            }
        };

        let evaluated = {
            let ledger = self.ledger.read();
            self.engine.evaluate(
                &ledger,
                Tick {
                    quotes: &quotes,
                    opportunity: opportunity.as_ref(),
                    now_ms,
                    allow_new_exposure: !self.hard_stop.is_triggered(),
                },
            )
        };
        let decisions = match evaluated {
            Ok(decisions) => decisions,
            Err(EngineError::Detector(e)) => {
                record_invalid_quote(&e);
                return CycleReport::skipped(SkipReason::InvalidQuote);
            }
        };

        let mut report = CycleReport {
            skipped: None,
            opportunity,
            decisions: decisions.clone(),
            executions: Vec::new(),
        };

        if self.config.is_observation_mode() {
            for decision in &decisions {
                info!(
                    decision = decision.kind(),
                    direction = %decision.direction(),
                    position_id = ?decision.position_id(),
                    "Observation: decision not executed"
                );
            }
            return report;
        }

        for decision in decisions {
            // A rollback failure earlier in this cycle latches the stop.
            if decision.adds_exposure() && self.hard_stop.is_triggered() {
                warn!(
                    decision = decision.kind(),
                    "Hard stop active, dropping new exposure"
                );
                continue;
            }
            let execution = self.execute(&decision, &quotes, now_ms).await;
            report.executions.push(execution);
        }
        report
    }

    async fn execute(
        &mut self,
        decision: &Decision,
        quotes: &QuotePair,
        now_ms: u64,
    ) -> ExecutionReport {
        let target = decision
            .position_id()
            .and_then(|id| self.ledger.read().get(id).cloned());

        let report = self
            .coordinator
            .execute(decision, quotes, target.as_ref())
            .await;

        let settled_at = now_ms + report.latency_ms;
        let settled = {
            let mut ledger = self.ledger.write();
            self.coordinator.settle(&report, &mut ledger, settled_at)
        };
        match settled {
            Ok(settlement) => self.persist(settlement),
            Err(e) => error!(
                error = %e,
                decision = decision.kind(),
                position_id = ?decision.position_id(),
                legs = ?report.legs,
                "Settlement rejected, ledger unchanged"
            ),
        }
        report
    }

    fn persist(&mut self, settlement: Settlement) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let records = settlement
            .trade_events
            .into_iter()
            .map(TradeLogRecord::from)
            .chain(settlement.incident.map(TradeLogRecord::from));
        for record in records {
            if let Err(e) = writer.append(record) {
                error!(error = %e, "Failed to write trade log record");
            }
        }
    }

    async fn fetch_quotes(&self) -> AppResult<QuotePair> {
        let (a, b) = tokio::join!(
            self.fetch_quote(&self.config.legs.a),
            self.fetch_quote(&self.config.legs.b)
        );
        Ok(QuotePair::new(a?, b?))
    }

    async fn fetch_quote(&self, instrument: &InstrumentTag) -> AppResult<MarketQuote> {
        let max_attempts = self.config.monitor.quote_fetch_retries.max(1);
        let mut attempt = 1;
        loop {
            match self.exchange.get_quote(instrument).await {
                Ok(quote) => return Ok(quote),
                Err(e) => {
                    Metrics::quote_error(instrument.as_str(), "fetch");
                    if !e.is_retryable() || attempt >= max_attempts {
                        return Err(e.into());
                    }
                    debug!(
                        instrument = %instrument,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Quote fetch failed, retrying"
                    );
                    sleep(self.config.monitor.quote_retry_delay()).await;
                    attempt += 1;
                }
            }
        }
    }

    fn update_ledger_metrics(&self) {
        let ledger = self.ledger.read();
        let stats = ledger.statistics();
        Metrics::ledger(
            ledger.active_count(),
            ledger.aggregate_exposure().to_f64().unwrap_or(0.0),
            stats.total_realized_pnl.to_f64().unwrap_or(0.0),
        );
    }

    fn log_status(&self, now_ms: u64) {
        let snapshot = self.status_reporter().snapshot(now_ms);
        info!(
            cycles = snapshot.cycles,
            mode = snapshot.mode.as_str(),
            opportunity = ?snapshot.opportunity.as_ref().map(|o| o.direction),
            net_profit = ?snapshot.last_observation.as_ref().map(|o| o.net_profit),
            positions = snapshot.positions.len(),
            exposure = %snapshot.portfolio.total_notional,
            unrealized_pnl = %snapshot.portfolio.total_unrealized_pnl,
            total_trades = snapshot.statistics.total_trades,
            realized_pnl = %snapshot.statistics.total_realized_pnl,
            win_rate = %snapshot.statistics.win_rate,
            hard_stop = snapshot.hard_stop.triggered,
            "Status"
        );
    }

    fn shutdown(&mut self) -> AppResult<()> {
        let ledger = self.ledger.read();
        let stats = ledger.statistics();
        info!(
            cycles = self.cycles,
            total_trades = stats.total_trades,
            realized_pnl = %stats.total_realized_pnl,
            avg_holding_secs = stats.avg_holding_secs,
            "Shutting down"
        );
        if ledger.active_count() > 0 {
            warn!(
                positions = ledger.active_count(),
                exposure = %ledger.aggregate_exposure(),
                "Positions left open at shutdown"
            );
        }
        drop(ledger);

        if let Some(writer) = self.writer.as_mut() {
            writer.close()?;
        }
        Ok(())
    }
}

fn record_invalid_quote(e: &DetectorError) {
    if let DetectorError::InvalidQuote { instrument, reason } = e {
        Metrics::quote_error(instrument.as_str(), reason.label());
    }
    warn!(error = %e, "Invalid quotes, skipping cycle");
}
