//! Notifier service
//!
//! Owns the catalog cache, the dispatcher, the recipient directory and the
//! recurring check, and exposes the operator controls on top of them.
//! Chat-command parsing and permission checks live outside this crate; the
//! caller decides who may invoke what.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::broadcast::{
    BroadcastEvent, BroadcastPayload, BroadcastStats, DeliveryTransport, Dispatcher,
    DispatcherStatus, TelegramTransport,
};
use crate::catalog::{CacheStatus, CatalogProvider, CatalogSource, PromotionCache};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::directory::{JsonFileDirectory, RecipientDirectory};
use crate::models::{CatalogSnapshot, PromotionRecord};
use crate::scheduler::{CheckOutcome, CheckScheduler, SchedulerStatus};
use crate::utils::error::BroadcastError;

/// Aggregated status of every component
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub cache: CacheStatus,
    pub dispatcher: DispatcherStatus,
    pub scheduler: SchedulerStatus,
}

impl ServiceStatus {
    pub fn display(&self) -> String {
        format!(
            "{}\n{}\n{}",
            self.cache.display(),
            self.dispatcher.display(),
            self.scheduler.display()
        )
    }
}

/// Explicitly owned context wiring the notifier together
pub struct NotifierService {
    cache: Arc<PromotionCache>,
    dispatcher: Arc<Dispatcher>,
    directory: Arc<dyn RecipientDirectory>,
    scheduler: CheckScheduler,
}

impl NotifierService {
    /// Wire already-built components together
    pub fn new(
        cache: Arc<PromotionCache>,
        dispatcher: Arc<Dispatcher>,
        directory: Arc<dyn RecipientDirectory>,
    ) -> Self {
        let scheduler = CheckScheduler::new(
            Arc::clone(&cache),
            Arc::clone(&dispatcher),
            Arc::clone(&directory),
        );

        Self {
            cache,
            dispatcher,
            directory,
            scheduler,
        }
    }

    /// Build the service from configuration with the reference adapters
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no bot token is configured, and the
    /// adapter's own error when an HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.telegram.bot_token.is_none() {
            return Err(Error::config("Telegram bot token is not configured"));
        }

        let source: Arc<dyn CatalogProvider> = Arc::new(CatalogSource::from_config(&config.catalog)?);
        let transport: Arc<dyn DeliveryTransport> =
            Arc::new(TelegramTransport::from_config(&config.telegram)?);
        let directory: Arc<dyn RecipientDirectory> =
            Arc::new(JsonFileDirectory::from_config(&config.directory));

        Ok(Self::with_components(config, source, transport, directory))
    }

    /// Build the service from configuration with caller-supplied adapters
    pub fn with_components(
        config: &Config,
        source: Arc<dyn CatalogProvider>,
        transport: Arc<dyn DeliveryTransport>,
        directory: Arc<dyn RecipientDirectory>,
    ) -> Self {
        let cache = Arc::new(PromotionCache::from_config(source, &config.cache));
        let dispatcher = Arc::new(Dispatcher::from_config(transport, &config.broadcast));
        Self::new(cache, dispatcher, directory)
    }

    /// Apply the scheduler section of the configuration
    pub async fn start(&self, config: &Config) -> Result<()> {
        Ok(self.scheduler.apply_config(&config.scheduler).await?)
    }

    /// Turn the recurring check on or off
    pub async fn set_auto_check(&self, enabled: bool, interval_hours: u32) -> Result<()> {
        Ok(self.scheduler.configure(enabled, interval_hours).await?)
    }

    /// Drop the cached snapshot and fetch a new one
    pub async fn force_refresh(&self) -> Arc<CatalogSnapshot> {
        self.cache.invalidate();
        self.cache.get().await
    }

    /// Broadcast a text message to every live recipient
    pub async fn broadcast_text(&self, text: impl Into<String>) -> Result<BroadcastStats, BroadcastError> {
        self.dispatcher
            .broadcast(BroadcastPayload::text(text), self.directory.as_ref())
            .await
    }

    /// Broadcast an image with a caption to every live recipient
    pub async fn broadcast_image(
        &self,
        image: impl Into<String>,
        caption: impl Into<String>,
    ) -> Result<BroadcastStats, BroadcastError> {
        self.dispatcher
            .broadcast(BroadcastPayload::image(image, caption), self.directory.as_ref())
            .await
    }

    /// Broadcast an arbitrary payload
    pub async fn broadcast(&self, payload: BroadcastPayload) -> Result<BroadcastStats, BroadcastError> {
        self.dispatcher.broadcast(payload, self.directory.as_ref()).await
    }

    pub async fn broadcast_status(&self) -> DispatcherStatus {
        self.dispatcher.status().await
    }

    /// Subscribe to dispatcher progress events
    pub fn subscribe_broadcasts(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.dispatcher.subscribe()
    }

    /// Games that are free right now
    pub async fn current_games(&self) -> Vec<PromotionRecord> {
        self.cache.get().await.current_games.clone()
    }

    /// Games that will be free once their window opens
    pub async fn upcoming_games(&self) -> Vec<PromotionRecord> {
        self.cache.get().await.upcoming_games.clone()
    }

    /// Upcoming game by its position in the cached upcoming list
    ///
    /// Reads the cache only; `None` until a snapshot has been fetched.
    pub async fn upcoming_game(&self, index: usize) -> Option<PromotionRecord> {
        self.cache.upcoming_by_index(index).await
    }

    /// Current snapshot, including the degraded flag
    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.cache.get().await
    }

    /// Run the recurring check once, now
    pub async fn run_check(&self) -> CheckOutcome {
        self.scheduler.run_check().await
    }

    pub fn scheduler(&self) -> &CheckScheduler {
        &self.scheduler
    }

    pub async fn status(&self) -> ServiceStatus {
        ServiceStatus {
            cache: self.cache.status().await,
            dispatcher: self.dispatcher.status().await,
            scheduler: self.scheduler.status().await,
        }
    }

    /// Stop the recurring check
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
