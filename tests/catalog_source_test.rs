//! Integration tests for CatalogSource using wiremock
//!
//! These tests validate endpoint failover and payload validation against
//! mock storefront servers.

mod common;

use chrono::{Duration, Utc};
use epicfree::catalog::CatalogSource;
use epicfree::utils::error::FetchError;
use std::time::Duration as StdDuration;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{catalog_body, element_json, offer_json};

const FEED_PATH: &str = "/freeGamesPromotions";

fn source_for(servers: &[&MockServer]) -> CatalogSource {
    let endpoints = servers
        .iter()
        .map(|s| format!("{}{FEED_PATH}", s.uri()))
        .collect();
    CatalogSource::with_endpoints(endpoints, StdDuration::from_secs(2)).unwrap()
}

fn sample_body() -> String {
    let now = Utc::now();
    catalog_body(vec![element_json(
        "Mock Game",
        vec![offer_json(now - Duration::hours(1), now + Duration::hours(1), 0)],
        vec![],
    )])
}

/// Test successful fetch from the first endpoint
#[tokio::test]
async fn test_fetch_first_endpoint() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .and(header("accept", "application/json"))
        .and(header("cache-control", "no-cache"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sample_body()))
        .expect(1)
        .mount(&primary)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sample_body()))
        .expect(0)
        .mount(&secondary)
        .await;

    let source = source_for(&[&primary, &secondary]);
    let raw = source.fetch_catalog().await.unwrap();

    assert_eq!(raw.elements.len(), 1);
    assert!(raw.endpoint.starts_with(&primary.uri()));
}

/// Test that a server error fails over without retrying the same endpoint
#[tokio::test]
async fn test_failover_on_server_error() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&primary)
        .await;

    Mock::given(method("GET"))
        .and(path(FEED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(sample_body()))
        .expect(1)
        .mount(&secondary)
        .await;

    let source = source_for(&[&primary, &secondary]);
    let raw = source.fetch_catalog().await.unwrap();

    assert!(raw.endpoint.starts_with(&secondary.uri()));
}

/// Test failover on empty body and on a body without the elements array
#[tokio::test]
async fn test_failover_on_unusable_bodies() {
    let empty = MockServer::start().await;
    let wrong_shape = MockServer::start().await;
    let good = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("   "))
        .mount(&empty)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":{"Catalog":{}}}"#))
        .mount(&wrong_shape)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sample_body()))
        .mount(&good)
        .await;

    let source = source_for(&[&empty, &wrong_shape, &good]);
    let raw = source.fetch_catalog().await.unwrap();

    assert!(raw.endpoint.starts_with(&good.uri()));
}

/// Test that a slow endpoint times out and the next one is used
#[tokio::test]
async fn test_failover_on_timeout() {
    let slow = MockServer::start().await;
    let fast = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(sample_body())
                .set_delay(StdDuration::from_secs(5)),
        )
        .mount(&slow)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sample_body()))
        .mount(&fast)
        .await;

    let endpoints = vec![
        format!("{}{FEED_PATH}", slow.uri()),
        format!("{}{FEED_PATH}", fast.uri()),
    ];
    let source = CatalogSource::with_endpoints(endpoints, StdDuration::from_millis(300)).unwrap();

    let raw = source.fetch_catalog().await.unwrap();
    assert!(raw.endpoint.starts_with(&fast.uri()));
}

/// Test that exhausting every endpoint reports the last cause
#[tokio::test]
async fn test_all_endpoints_failed() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&first)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&second)
        .await;

    let source = source_for(&[&first, &second]);
    let err = source.fetch_catalog().await.unwrap_err();

    match err {
        FetchError::AllEndpointsFailed {
            attempts,
            last_cause,
        } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last_cause, FetchError::Status(404)));
        }
        other => panic!("Unexpected error: {other:?}"),
    }
}

/// Test the diagnostic probe reports every endpoint
#[tokio::test]
async fn test_probe_reports_each_endpoint() {
    let broken = MockServer::start().await;
    let good = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&broken)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sample_body()))
        .mount(&good)
        .await;

    let source = source_for(&[&broken, &good]);
    let probes = source.probe().await;

    assert_eq!(probes.len(), 2);
    assert!(!probes[0].ok);
    assert!(probes[0].error.as_deref().unwrap().contains("502"));
    assert!(probes[1].ok);
    assert_eq!(probes[1].element_count, Some(1));
}
