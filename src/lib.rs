//! epicfree - Epic Games Store free-game notifier
//!
//! Tracks the storefront's time-boxed free-game promotions and pushes them to
//! a registered audience, with an operator-driven mass-delivery dispatcher.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`catalog`] - Catalog fetch with endpoint failover, classification and caching
//! - [`broadcast`] - Throttled one-to-many dispatcher and delivery transports
//! - [`directory`] - Recipient directory trait and adapters
//! - [`scheduler`] - Hour-aligned recurring check and digests
//! - [`service`] - Owned context wiring everything together
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`error`] - Unified error type
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use epicfree::config::Config;
//! use epicfree::service::NotifierService;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     config.validate()?;
//!     let service = NotifierService::from_config(&config)?;
//!     for game in service.current_games().await {
//!         println!("{}", game.title);
//!     }
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod scheduler;
pub mod service;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::broadcast::{BroadcastPayload, BroadcastStats, DeliveryTransport, Dispatcher};
    pub use crate::catalog::{CatalogProvider, CatalogSource, PromotionCache};
    pub use crate::config::Config;
    pub use crate::directory::{JsonFileDirectory, MemoryDirectory, RecipientDirectory};
    pub use crate::error::{EpicfreeErrorTrait, Error, ErrorCategory, Result};
    pub use crate::models::{CatalogSnapshot, PromotionRecord, Recipient};
    pub use crate::scheduler::CheckScheduler;
    pub use crate::service::NotifierService;
}

// Direct re-exports for convenience
pub use models::{CatalogSnapshot, ClassifiedOffer, PromotionRecord, Recipient};
