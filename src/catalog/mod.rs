//! Promotion aggregation engine
//!
//! Fetches the storefront's free-games catalog, classifies its offers into
//! current and upcoming free games, and caches the result.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   RawCatalog   ┌──────────────┐  CatalogSnapshot  ┌────────────────┐
//! │ CatalogSource│ ─────────────▶ │  classifier  │ ────────────────▶ │ PromotionCache │
//! │  (failover)  │                │              │                   │ (TTL + stale)  │
//! └──────────────┘                └──────────────┘                   └────────────────┘
//! ```
//!
//! - [`source`] - multi-endpoint HTTP fetch with failover
//! - [`headers`] - browser-like request headers
//! - [`classifier`] - offer classification and normalization
//! - [`cache`] - TTL cache with stale-data fallback

pub mod cache;
pub mod classifier;
pub mod headers;
pub mod source;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::utils::error::FetchError;

pub use cache::{CacheState, CacheStatus, PromotionCache};
pub use classifier::{classify, classify_element};
pub use source::{CatalogSource, EndpointProbe};

/// Default storefront endpoints, tried in order
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "https://store-site-backend-static-ipv4.ak.epicgames.com/freeGamesPromotions",
    "https://store-site-backend-static.ak.epicgames.com/freeGamesPromotions",
];

/// Anything that can produce a raw catalog
///
/// [`CatalogSource`] is the HTTP implementation; tests plug in scripted ones.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Fetch the raw catalog
    async fn fetch(&self) -> Result<RawCatalog, FetchError>;
}

/// Unclassified catalog elements as returned by one endpoint
///
/// Elements are kept as JSON values so that one malformed element cannot
/// fail the whole batch.
#[derive(Debug, Clone, Default)]
pub struct RawCatalog {
    pub endpoint: String,
    pub elements: Vec<serde_json::Value>,
}

impl RawCatalog {
    /// Extract the element list from a `freeGamesPromotions` response body
    pub fn from_body(endpoint: impl Into<String>, body: &str) -> Result<Self, FetchError> {
        let response: CatalogResponse = serde_json::from_str(body)
            .map_err(|e| FetchError::InvalidPayload(e.to_string()))?;

        let elements = response
            .data
            .and_then(|data| data.catalog)
            .and_then(|catalog| catalog.search_store)
            .and_then(|store| store.elements)
            .ok_or_else(|| {
                FetchError::InvalidPayload("missing data.Catalog.searchStore.elements".to_string())
            })?;

        Ok(Self {
            endpoint: endpoint.into(),
            elements,
        })
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct CatalogResponse {
    data: Option<CatalogData>,
}

#[derive(Debug, Deserialize)]
struct CatalogData {
    #[serde(rename = "Catalog")]
    catalog: Option<CatalogBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogBody {
    search_store: Option<SearchStore>,
}

#[derive(Debug, Deserialize)]
struct SearchStore {
    elements: Option<Vec<serde_json::Value>>,
}

/// One catalog element (a product with its promotions)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogElement {
    pub title: String,
    pub description: Option<String>,
    pub seller: Option<Seller>,
    pub price: Option<Price>,
    pub key_images: Option<Vec<KeyImage>>,
    pub catalog_ns: Option<CatalogNamespace>,
    pub product_slug: Option<String>,
    pub url_slug: Option<String>,
    pub effective_date: Option<DateTime<Utc>>,
    pub promotions: Option<Promotions>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Seller {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Price {
    pub total_price: Option<TotalPrice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalPrice {
    pub fmt_price: Option<FormattedPrice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedPrice {
    pub original_price: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeyImage {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogNamespace {
    pub mappings: Option<Vec<PageMapping>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMapping {
    pub page_slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Promotions {
    pub promotional_offers: Option<Vec<OfferGroup>>,
    pub upcoming_promotional_offers: Option<Vec<OfferGroup>>,
}

impl Promotions {
    /// Offers attached to the active promotion groups
    pub fn active_offers(&self) -> impl Iterator<Item = &RawOffer> {
        Self::flatten(&self.promotional_offers)
    }

    /// Offers attached to the upcoming promotion groups
    pub fn upcoming_offers(&self) -> impl Iterator<Item = &RawOffer> {
        Self::flatten(&self.upcoming_promotional_offers)
    }

    fn flatten(groups: &Option<Vec<OfferGroup>>) -> impl Iterator<Item = &RawOffer> {
        groups
            .iter()
            .flatten()
            .flat_map(|group| group.promotional_offers.iter())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferGroup {
    /// Offers that fail to deserialize are dropped one by one
    #[serde(default, deserialize_with = "lenient_offers")]
    pub promotional_offers: Vec<RawOffer>,
}

fn lenient_offers<'de, D>(deserializer: D) -> Result<Vec<RawOffer>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Option<Vec<serde_json::Value>> = Option::deserialize(deserializer)?;

    Ok(values
        .unwrap_or_default()
        .iter()
        .filter_map(|value| match RawOffer::deserialize(value) {
            Ok(offer) => Some(offer),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed promotional offer");
                None
            }
        })
        .collect())
}

/// One time-boxed promotional offer
///
/// Announced offers sometimes come without an end date.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOffer {
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    pub discount_setting: Option<DiscountSetting>,
}

impl RawOffer {
    /// A zero discount percentage means the game is given away
    pub fn is_free(&self) -> bool {
        self.discount_setting
            .as_ref()
            .and_then(|setting| setting.discount_percentage)
            == Some(0)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountSetting {
    pub discount_type: Option<String>,
    pub discount_percentage: Option<u32>,
}
