// Core data structures for the epicfree notifier

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One normalized free-game offer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionRecord {
    pub title: String,
    pub description: Option<String>,
    pub seller: String,
    pub display_price: String,
    pub image_url: Option<String>,
    pub store_url: Option<String>,
    pub window_start: DateTime<Utc>,
    pub window_end: Option<DateTime<Utc>>,
    pub source_effective_date: Option<DateTime<Utc>>,
}

impl PromotionRecord {
    /// True when `now` falls inside `[window_start, window_end]`
    pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
        match self.window_end {
            Some(end) => self.window_start <= now && now <= end,
            None => false,
        }
    }

    /// True when the window has not opened yet
    pub fn is_upcoming_at(&self, now: DateTime<Utc>) -> bool {
        now < self.window_start
    }

    /// Check `window_start <= window_end` when both are present
    pub fn has_valid_window(&self) -> bool {
        self.window_end.map_or(true, |end| self.window_start <= end)
    }
}

/// Classification of a single offer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedOffer {
    /// Free right now
    Current(PromotionRecord),
    /// Will be free once its window opens
    Upcoming(PromotionRecord),
}

impl ClassifiedOffer {
    /// Borrow the underlying record
    pub fn record(&self) -> &PromotionRecord {
        match self {
            Self::Current(record) | Self::Upcoming(record) => record,
        }
    }
}

/// Classified result of one aggregation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub current_games: Vec<PromotionRecord>,
    pub upcoming_games: Vec<PromotionRecord>,
    /// `None` until the first successful fetch
    pub fetched_at: Option<DateTime<Utc>>,
    /// Set on the empty fallback served when no fetch has ever succeeded
    #[serde(default)]
    pub degraded: bool,
}

impl CatalogSnapshot {
    /// Empty snapshot served when the catalog is unreachable and nothing is cached
    pub fn degraded_empty() -> Self {
        Self {
            degraded: true,
            ..Default::default()
        }
    }

    /// Build a snapshot from classified offers, preserving their order
    pub fn from_offers(
        offers: impl IntoIterator<Item = ClassifiedOffer>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let mut snapshot = Self {
            fetched_at: Some(fetched_at),
            ..Default::default()
        };
        for offer in offers {
            match offer {
                ClassifiedOffer::Current(record) => snapshot.current_games.push(record),
                ClassifiedOffer::Upcoming(record) => snapshot.upcoming_games.push(record),
            }
        }
        snapshot
    }

    pub fn is_empty(&self) -> bool {
        self.current_games.is_empty() && self.upcoming_games.is_empty()
    }
}

/// Directory entry for one audience member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    pub delivery_address: String,
    pub is_live: bool,
}

impl Recipient {
    pub fn new(id: impl Into<String>, delivery_address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            delivery_address: delivery_address.into(),
            is_live: true,
        }
    }
}
