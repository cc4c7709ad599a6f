//! Common test utilities
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Semaphore;

use epicfree::broadcast::{DeliveryTransport, FormatDirectives};
use epicfree::catalog::{CatalogProvider, RawCatalog};
use epicfree::models::Recipient;
use epicfree::utils::error::{DeliveryError, FetchError};

/// One promotional offer as the storefront serializes it
pub fn offer_json(start: DateTime<Utc>, end: DateTime<Utc>, discount: u32) -> Value {
    json!({
        "startDate": start.to_rfc3339(),
        "endDate": end.to_rfc3339(),
        "discountSetting": {
            "discountType": "PERCENTAGE",
            "discountPercentage": discount
        }
    })
}

/// Catalog element with the given active and upcoming offers
pub fn element_json(title: &str, active: Vec<Value>, upcoming: Vec<Value>) -> Value {
    let slug = title.to_lowercase().replace(' ', "-");
    json!({
        "title": title,
        "description": format!("{title} description"),
        "effectiveDate": "2024-05-02T15:00:00.000Z",
        "seller": { "name": "Test Studio" },
        "price": { "totalPrice": { "fmtPrice": { "originalPrice": "$29.99" } } },
        "keyImages": [
            { "type": "OfferImageWide", "url": format!("https://cdn.test/{slug}-wide.jpg") },
            { "type": "Thumbnail", "url": format!("https://cdn.test/{slug}-thumb.jpg") }
        ],
        "catalogNs": { "mappings": [ { "pageSlug": slug } ] },
        "promotions": {
            "promotionalOffers": [ { "promotionalOffers": active } ],
            "upcomingPromotionalOffers": [ { "promotionalOffers": upcoming } ]
        }
    })
}

/// Full `freeGamesPromotions` response body
pub fn catalog_body(elements: Vec<Value>) -> String {
    json!({
        "data": { "Catalog": { "searchStore": { "elements": elements } } },
        "extensions": {}
    })
    .to_string()
}

/// `n` live recipients with ids `"1"..="n"` and addresses `chat-<id>`
pub fn recipients(n: usize) -> Vec<Recipient> {
    (1..=n)
        .map(|i| Recipient::new(i.to_string(), format!("chat-{i}")))
        .collect()
}

/// Provider returning a fixed element list, counting calls
pub struct StaticProvider {
    pub elements: Vec<Value>,
    pub calls: AtomicUsize,
}

impl StaticProvider {
    pub fn new(elements: Vec<Value>) -> Self {
        Self {
            elements,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogProvider for StaticProvider {
    async fn fetch(&self) -> Result<RawCatalog, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RawCatalog {
            endpoint: "static".to_string(),
            elements: self.elements.clone(),
        })
    }
}

/// Provider that always fails
pub struct FailingProvider;

#[async_trait]
impl CatalogProvider for FailingProvider {
    async fn fetch(&self) -> Result<RawCatalog, FetchError> {
        Err(FetchError::NoEndpoints)
    }
}

/// Transport with scripted per-address failures
///
/// When a gate is installed every send first waits for a permit, which lets
/// tests hold a broadcast in flight.
#[derive(Default)]
pub struct ScriptedTransport {
    pub unreachable: HashSet<String>,
    pub transient: HashSet<String>,
    pub delivered: Mutex<Vec<String>>,
    pub gate: Option<Semaphore>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unreachable(mut self, addresses: &[&str]) -> Self {
        self.unreachable = addresses.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_transient(mut self, addresses: &[&str]) -> Self {
        self.transient = addresses.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn gated(mut self) -> Self {
        self.gate = Some(Semaphore::new(0));
        self
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }

    async fn attempt(&self, address: &str) -> Result<(), DeliveryError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if self.unreachable.contains(address) {
            return Err(DeliveryError::Unreachable(
                "Forbidden: bot was blocked by the user".to_string(),
            ));
        }
        if self.transient.contains(address) {
            return Err(DeliveryError::RateLimited {
                retry_after_secs: Some(1),
            });
        }

        self.delivered.lock().unwrap().push(address.to_string());
        Ok(())
    }
}

#[async_trait]
impl DeliveryTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send_text(
        &self,
        address: &str,
        _text: &str,
        _format: &FormatDirectives,
    ) -> Result<(), DeliveryError> {
        self.attempt(address).await
    }

    async fn send_image(
        &self,
        address: &str,
        _image: &str,
        _caption: &str,
        _format: &FormatDirectives,
    ) -> Result<(), DeliveryError> {
        self.attempt(address).await
    }
}
