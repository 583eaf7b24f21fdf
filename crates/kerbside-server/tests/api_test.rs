//! Live server API tests.
//!
//! Start a server first, then run with: cargo test --test api_test -- --ignored

use reqwest::Client;
use serde_json::Value;

fn base_url() -> String {
    std::env::var("KERBSIDE_TEST_URL").unwrap_or_else(|_| "http://localhost:3000".to_string())
}

/// Health reports the published snapshot.
#[tokio::test]
#[ignore]
async fn test_health() {
    let resp = Client::new()
        .get(format!("{}/health", base_url()))
        .send()
        .await
        .expect("Failed to reach server");

    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["snapshot_version"].as_u64().is_some());
}

/// Nearby results in the CBD come back ordered by distance.
#[tokio::test]
#[ignore]
async fn test_nearby_is_ordered() {
    let resp = Client::new()
        .get(format!("{}/v1/parking/nearby", base_url()))
        .query(&[("lat", "-37.8136"), ("lng", "144.9631"), ("radius", "800")])
        .send()
        .await
        .expect("Failed to query nearby bays");

    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    let distances: Vec<f64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|bay| bay["distance_m"].as_f64().unwrap())
        .collect();
    assert!(distances.windows(2).all(|pair| pair[0] <= pair[1]));
    assert!(distances.iter().all(|d| *d <= 800.0));
}

/// Missing coordinates are rejected.
#[tokio::test]
#[ignore]
async fn test_nearby_requires_coordinates() {
    let resp = Client::new()
        .get(format!("{}/v1/parking/nearby?lat=-37.81", base_url()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

/// A second trigger while a refresh is running does not start another.
#[tokio::test]
#[ignore]
async fn test_refresh_trigger() {
    let client = Client::new();
    let base = base_url();

    let resp = client
        .post(format!("{}/v1/refresh", base))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert!(body["started"].is_boolean());

    let resp = client
        .get(format!("{}/v1/refresh/status", base))
        .send()
        .await
        .unwrap();
    let status: Value = resp.json().await.unwrap();
    assert!(status["cycles_run"].as_u64().unwrap() >= 1);
}

/// Group statistics stay internally consistent.
#[tokio::test]
#[ignore]
async fn test_group_statistics() {
    let resp = Client::new()
        .get(format!("{}/v1/stats/groups?by=zone", base_url()))
        .send()
        .await
        .unwrap();
    let groups: Vec<Value> = resp.json().await.unwrap();
    for group in groups {
        let total = group["total"].as_u64().unwrap();
        let occupied = group["occupied"].as_u64().unwrap();
        let available = group["available"].as_u64().unwrap();
        let rate = group["occupancy_rate"].as_f64().unwrap();
        assert!(occupied + available <= total);
        assert!((0.0..=100.0).contains(&rate));
    }
}
