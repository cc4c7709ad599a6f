//! Offer classification and normalization
//!
//! Turns raw catalog elements into display-ready [`PromotionRecord`]s and
//! splits them into current and upcoming free games. An element may
//! contribute to both sets; a single offer never does.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{CatalogElement, KeyImage, RawCatalog, RawOffer};
use crate::models::{CatalogSnapshot, ClassifiedOffer, PromotionRecord};

/// Product page prefix for store links
pub const STORE_PRODUCT_URL: &str = "https://store.epicgames.com/en-US/p/";

/// Image types in order of preference
const IMAGE_PREFERENCE: &[&str] = &["Thumbnail", "DieselStoreFrontWide", "OfferImageWide"];

const DEFAULT_SELLER: &str = "Epic Games";
const DEFAULT_PRICE: &str = "Free";

/// Classify a raw catalog at `now`
///
/// Malformed elements are skipped with a warning.
pub fn classify(raw: &RawCatalog, now: DateTime<Utc>) -> CatalogSnapshot {
    let offers = raw
        .elements
        .iter()
        .enumerate()
        .flat_map(|(index, value)| classify_value(index, value, now));

    let snapshot = CatalogSnapshot::from_offers(offers, now);

    tracing::debug!(
        elements = raw.elements.len(),
        current = snapshot.current_games.len(),
        upcoming = snapshot.upcoming_games.len(),
        "Classified catalog"
    );

    snapshot
}

fn classify_value(index: usize, value: &serde_json::Value, now: DateTime<Utc>) -> Vec<ClassifiedOffer> {
    match CatalogElement::deserialize(value) {
        Ok(element) => classify_element(&element, now),
        Err(e) => {
            tracing::warn!(
                index,
                title = ?value.get("title").and_then(|t| t.as_str()),
                error = %e,
                "Skipping malformed catalog element"
            );
            Vec::new()
        }
    }
}

/// Classify every offer of one element
pub fn classify_element(element: &CatalogElement, now: DateTime<Utc>) -> Vec<ClassifiedOffer> {
    let Some(promotions) = &element.promotions else {
        return Vec::new();
    };

    if element.title.trim().is_empty() {
        tracing::warn!("Skipping catalog element without title");
        return Vec::new();
    }

    let mut offers = Vec::new();

    for offer in promotions.active_offers() {
        if !has_ordered_window(element, offer) {
            continue;
        }
        let open_now = offer.start_date <= now && offer.end_date.is_some_and(|end| now <= end);
        if offer.is_free() && open_now {
            offers.push(ClassifiedOffer::Current(to_record(element, offer)));
        }
    }

    for offer in promotions.upcoming_offers() {
        if !has_ordered_window(element, offer) {
            continue;
        }
        if offer.is_free() && now < offer.start_date {
            offers.push(ClassifiedOffer::Upcoming(to_record(element, offer)));
        }
    }

    offers
}

fn has_ordered_window(element: &CatalogElement, offer: &RawOffer) -> bool {
    if offer.end_date.is_some_and(|end| offer.start_date > end) {
        tracing::warn!(
            title = %element.title,
            start = %offer.start_date,
            end = ?offer.end_date,
            "Skipping offer with inverted window"
        );
        return false;
    }
    true
}

fn to_record(element: &CatalogElement, offer: &RawOffer) -> PromotionRecord {
    PromotionRecord {
        title: element.title.trim().to_string(),
        description: non_empty(element.description.as_deref()),
        seller: element
            .seller
            .as_ref()
            .and_then(|s| non_empty(s.name.as_deref()))
            .unwrap_or_else(|| DEFAULT_SELLER.to_string()),
        display_price: element
            .price
            .as_ref()
            .and_then(|p| p.total_price.as_ref())
            .and_then(|t| t.fmt_price.as_ref())
            .and_then(|f| non_empty(f.original_price.as_deref()))
            .unwrap_or_else(|| DEFAULT_PRICE.to_string()),
        image_url: select_image(element.key_images.as_deref().unwrap_or_default()),
        store_url: store_url(element),
        window_start: offer.start_date,
        window_end: offer.end_date,
        source_effective_date: element.effective_date,
    }
}

/// Pick the preferred image: thumbnail, then wide promotional art, then any
pub fn select_image(images: &[KeyImage]) -> Option<String> {
    IMAGE_PREFERENCE
        .iter()
        .find_map(|kind| images.iter().find(|img| img.kind == *kind))
        .or_else(|| images.first())
        .and_then(|img| non_empty(Some(&img.url)))
}

/// Build the product page URL from the first usable slug
///
/// The catalog namespace mapping is canonical; product and URL slugs are fallbacks.
pub fn store_url(element: &CatalogElement) -> Option<String> {
    let mapped = element
        .catalog_ns
        .as_ref()
        .and_then(|ns| ns.mappings.as_ref())
        .and_then(|mappings| mappings.first())
        .and_then(|m| m.page_slug.as_deref());

    [
        mapped,
        element.product_slug.as_deref(),
        element.url_slug.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|slug| !slug.is_empty())
    .map(|slug| format!("{STORE_PRODUCT_URL}{slug}"))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
