use super::render::{render_data, render_signal};
use super::{SessionContext, SessionEvent};
use crate::application::market_data::snapshot_cache::MarketDataCache;
use crate::application::ml::classifier_store::ClassifierStore;
use crate::application::ml::retrain_controller::schedule_retrain;
use crate::application::monitoring::alerts::detect_alerts;
use crate::application::strategies::{aggregate, average_price_signal, ml_signal};
use crate::domain::errors::SignalError;
use crate::domain::market::symbol::normalize_user_symbol;
use crate::domain::market::{AnnotatedBar, Timeframe};
use crate::domain::ports::{BarSource, ChatTransport};
use crate::domain::trading::{SignalInfo, SignalLevels};
use crate::infrastructure::persistence::signal_log::SignalLog;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub timeframe: Timeframe,
    pub limit: usize,
    pub avg_period: usize,
    pub levels: SignalLevels,
    pub aggregate_threshold: usize,
    pub max_tracked_symbols: usize,
    pub quote_asset: String,
    pub accuracy_alpha: f64,
    pub retrain_threshold: f64,
    pub volatility_factor: f64,
    pub volume_factor: f64,
    pub data_rows: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeframe: Timeframe::OneDay,
            limit: 500,
            avg_period: 5,
            levels: SignalLevels::default(),
            aggregate_threshold: 1,
            max_tracked_symbols: 5,
            quote_asset: "USDT".to_string(),
            accuracy_alpha: 0.1,
            retrain_threshold: 0.7,
            volatility_factor: 1.5,
            volume_factor: 1.5,
            data_rows: 10,
        }
    }
}

/// What a signal request produced, for callers that need more than the replies.
#[derive(Default)]
pub struct SignalOutcome {
    pub delivered: Option<SignalInfo>,
    pub retrain: Option<JoinHandle<()>>,
}

/// Shared collaborators behind every session. Holds no per-chat state.
pub struct SignalService {
    cache: Arc<MarketDataCache>,
    store: Arc<ClassifierStore>,
    signal_log: Arc<SignalLog>,
    transport: Arc<dyn ChatTransport>,
    training_symbols: Vec<String>,
    settings: SessionSettings,
}

impl SignalService {
    pub fn new(
        cache: Arc<MarketDataCache>,
        store: Arc<ClassifierStore>,
        signal_log: Arc<SignalLog>,
        transport: Arc<dyn ChatTransport>,
        training_symbols: Vec<String>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            cache,
            store,
            signal_log,
            transport,
            training_symbols,
            settings,
        }
    }

    pub fn new_context(&self, chat_id: i64) -> SessionContext {
        SessionContext::new(
            chat_id,
            self.settings.accuracy_alpha,
            self.settings.retrain_threshold,
        )
    }

    pub async fn handle(&self, ctx: &mut SessionContext, event: SessionEvent) {
        match event {
            SessionEvent::Start => {
                self.reply(ctx, "Hi! Send a token symbol (e.g. BTC) to start tracking it.")
                    .await;
            }
            SessionEvent::Track(text) => self.handle_track(ctx, &text).await,
            SessionEvent::Signal(text) => {
                self.handle_signal(ctx, &text).await;
            }
            SessionEvent::Data(text) => self.handle_data(ctx, &text).await,
            SessionEvent::Clear => {
                ctx.tracked.clear();
                self.reply(ctx, "All tokens cleared.").await;
                self.menu(ctx).await;
            }
        }
    }

    async fn handle_track(&self, ctx: &mut SessionContext, text: &str) {
        let Some(symbol) = normalize_user_symbol(text, &self.settings.quote_asset) else {
            self.reply(ctx, &format!("Could not read a token symbol from '{}'.", text))
                .await;
            return;
        };
        info!("Chat {}: track request for {}", ctx.chat_id, symbol);

        let markets = match self.cache.markets().await {
            Ok(markets) => markets,
            Err(e) => {
                error!("Chat {}: market list unavailable: {}", ctx.chat_id, e);
                self.reply(ctx, "Could not reach the exchange. Please try again later.")
                    .await;
                return;
            }
        };

        if !markets.contains(&symbol) {
            self.reply(ctx, &format!("Token {} is not available on the exchange.", symbol))
                .await;
            return;
        }
        if ctx.tracked.contains(&symbol) {
            self.reply(ctx, &format!("{} is already tracked.", symbol)).await;
            return;
        }
        if ctx.tracked.len() >= self.settings.max_tracked_symbols {
            self.reply(
                ctx,
                &format!(
                    "You have reached the maximum number of tracked tokens ({}).",
                    self.settings.max_tracked_symbols
                ),
            )
            .await;
            return;
        }

        ctx.tracked.push(symbol.clone());
        self.reply(ctx, &format!("Token {} added.", symbol)).await;
        self.menu(ctx).await;
    }

    async fn handle_data(&self, ctx: &SessionContext, text: &str) {
        let Some(symbol) = normalize_user_symbol(text, &self.settings.quote_asset) else {
            self.reply(ctx, "Usage: /data <token>").await;
            return;
        };

        match self
            .cache
            .get_bars(&symbol, self.settings.timeframe, self.settings.limit)
            .await
        {
            Ok(bars) => {
                self.reply(ctx, &render_data(&symbol, &bars, self.settings.data_rows))
                    .await;
                self.menu(ctx).await;
            }
            Err(e) => self.reply_error(ctx, &symbol, &e).await,
        }
    }

    /// Full signal pipeline for one symbol. Every failure ends in a reply.
    pub async fn handle_signal(&self, ctx: &mut SessionContext, text: &str) -> SignalOutcome {
        let mut outcome = SignalOutcome::default();
        let Some(symbol) = normalize_user_symbol(text, &self.settings.quote_asset) else {
            self.reply(ctx, "Usage: /signal <token>").await;
            return outcome;
        };
        info!("Chat {}: signal request for {}", ctx.chat_id, symbol);

        match self.cache.markets().await {
            Ok(markets) if !markets.contains(&symbol) => {
                warn!("Chat {}: {} is not listed", ctx.chat_id, symbol);
                self.reply(ctx, &format!("Token {} is not available on the exchange.", symbol))
                    .await;
                return outcome;
            }
            Ok(_) => {}
            Err(e) => {
                self.reply_error(ctx, &symbol, &e).await;
                return outcome;
            }
        }

        let bars = match self
            .cache
            .refresh(&symbol, self.settings.timeframe, self.settings.limit)
            .await
        {
            Ok(bars) => bars,
            Err(e) => {
                self.reply_error(ctx, &symbol, &e).await;
                return outcome;
            }
        };

        let retrain_due = ctx.retrain.resolve(&symbol, &bars);

        let ml = self.ml_signal(ctx, &symbol, &bars).await;
        let average = average_price_signal(
            &bars,
            &symbol,
            self.settings.avg_period,
            self.settings.levels,
        );

        match aggregate(&[ml.clone(), average], self.settings.aggregate_threshold) {
            Some(signal) => {
                self.reply(ctx, &render_signal(&signal)).await;
                if let Err(e) = self.signal_log.append(&signal).await {
                    error!("Failed to log signal for {}: {:#}", symbol, e);
                    self.reply(ctx, "Warning: the signal could not be written to the log.")
                        .await;
                }
                outcome.delivered = Some(signal);
            }
            None => {
                warn!("No signal generated for {}", symbol);
                self.reply(ctx, &format!("No signal for {} right now.", symbol))
                    .await;
            }
        }

        self.send_market_context(ctx, &symbol, &bars).await;

        if let (Some(ml), Some(last)) = (&ml, bars.last()) {
            ctx.retrain.record_prediction(&symbol, &last.bar, ml.signal);
        }

        if retrain_due {
            let mut symbols = self.training_symbols.clone();
            for s in &ctx.tracked {
                if !symbols.contains(s) {
                    symbols.push(s.clone());
                }
            }
            let source: Arc<dyn BarSource> = self.cache.clone();
            outcome.retrain = schedule_retrain(self.store.clone(), source, symbols);
        }

        outcome
    }

    async fn ml_signal(
        &self,
        ctx: &SessionContext,
        symbol: &str,
        bars: &[AnnotatedBar],
    ) -> Option<SignalInfo> {
        let bundle = match self
            .store
            .load_or_train(&self.training_symbols, self.cache.as_ref())
            .await
        {
            Ok(bundle) => bundle,
            Err(e) => {
                error!("Model not available for {}: {}", symbol, e);
                self.reply(ctx, "The prediction model is unavailable; using price averages only.")
                    .await;
                return None;
            }
        };

        let min_bars = self.cache.engine().config().min_bars();
        match ml_signal::generate(&bundle, bars, symbol, self.settings.levels, min_bars) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!("No model signal for {}: {}", symbol, e);
                None
            }
        }
    }

    async fn send_market_context(&self, ctx: &SessionContext, symbol: &str, bars: &[AnnotatedBar]) {
        let trend = bars
            .last()
            .and_then(|b| b.indicators.trend)
            .map(|t| t.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        self.reply(ctx, &format!("Current trend for {}: {}", symbol, trend))
            .await;

        for alert in detect_alerts(
            bars,
            self.settings.volatility_factor,
            self.settings.volume_factor,
        ) {
            self.reply(ctx, &alert.to_string()).await;
        }
    }

    async fn reply_error(&self, ctx: &SessionContext, symbol: &str, err: &SignalError) {
        if err.is_absence() {
            warn!("Chat {}: {}", ctx.chat_id, err);
        } else {
            error!("Chat {}: {}", ctx.chat_id, err);
        }

        let text = match err {
            SignalError::DataUnavailable { .. } => {
                format!("Could not get market data for {}. Please try again later.", symbol)
            }
            SignalError::InsufficientHistory { required, available } => format!(
                "Not enough history for {} ({} of {} bars).",
                symbol, available, required
            ),
            SignalError::NoTrainingData { .. } | SignalError::ModelUnavailable { .. } => {
                "The prediction model is unavailable right now.".to_string()
            }
            SignalError::SignalUnavailable { .. } => format!("No signal for {} right now.", symbol),
        };
        self.reply(ctx, &text).await;
    }

    /// Tells a chat whose queue is full that its message was dropped.
    pub async fn notify_busy(&self, chat_id: i64) {
        self.send(chat_id, "Still working on your previous requests. Please try again shortly.")
            .await;
    }

    async fn reply(&self, ctx: &SessionContext, text: &str) {
        self.send(ctx.chat_id, text).await;
    }

    async fn menu(&self, ctx: &SessionContext) {
        if let Err(e) = self.transport.send_menu(ctx.chat_id, &ctx.tracked).await {
            error!("Chat {}: failed to send menu: {:#}", ctx.chat_id, e);
        }
    }

    async fn send(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.transport.send_text(chat_id, text).await {
            error!("Chat {}: failed to send reply: {:#}", chat_id, e);
        }
    }
}
