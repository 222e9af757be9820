// hydro_exporter - Prometheus metrics exporter for IMGW hydrological station status
//
// Copyright 2024 hydro_exporter contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! Tests for the fetch cycle against a local stand-in for the IMGW API.

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use hydro_exporter::client::HydroClient;
use hydro_exporter::metrics::StationMetrics;
use hydro_exporter::poll::Poller;
use prometheus::Registry;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Serve the router on an ephemeral local port and return the bound address.
fn spawn_station_api(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind test listener");
    listener
        .set_nonblocking(true)
        .expect("failed to set test listener non-blocking");
    let addr = listener.local_addr().expect("failed to read local address");

    tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .expect("failed to build test server")
            .serve(app.into_make_service())
            .await
            .expect("test server failed");
    });

    addr
}

fn poller(addr: SocketAddr, stations: &[&str], registry: &Registry) -> Poller {
    let endpoint = Url::parse(&format!("http://{}/station/hydro/status", addr)).unwrap();
    let client = HydroClient::new(Client::new(), endpoint);
    let metrics = StationMetrics::new(registry);
    Poller::new(client, stations.iter().map(|s| s.to_string()).collect(), metrics)
}

fn station_payload(id: &str, value: f64) -> Value {
    json!({
        "id": id,
        "status": {
            "description": format!("Station {}", id),
            "currentState": {"value": value},
            "trend": -1,
            "status": 1,
            "alarmValue": 500,
            "warningValue": 450
        },
        "stateCode": "1"
    })
}

fn requested_id(params: &HashMap<String, String>) -> String {
    params.get("id").cloned().unwrap_or_default()
}

/// Value of the gauge `name` for the series labeled with `station_id`, if any.
fn series_value(registry: &Registry, name: &str, station_id: &str) -> Option<f64> {
    registry
        .gather()
        .iter()
        .find(|mf| mf.get_name() == name)
        .and_then(|mf| {
            mf.get_metric()
                .iter()
                .find(|m| {
                    m.get_label()
                        .iter()
                        .any(|l| l.get_name() == "station_id" && l.get_value() == station_id)
                })
                .map(|m| m.get_gauge().get_value())
        })
}

fn scalar_value(registry: &Registry, name: &str) -> Option<f64> {
    registry
        .gather()
        .iter()
        .find(|mf| mf.get_name() == name)
        .and_then(|mf| mf.get_metric().first().map(|m| m.get_gauge().get_value()))
}

#[tokio::test]
async fn test_fetch_cycle_updates_every_configured_station() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = {
        let hits = Arc::clone(&hits);
        Router::new().route(
            "/station/hydro/status",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let hits = Arc::clone(&hits);
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let id = requested_id(&params);
                    let value = if id == "100" { 123.0 } else { 321.0 };
                    Json(station_payload(&id, value))
                }
            }),
        )
    };

    let addr = spawn_station_api(app);
    let registry = Registry::new();
    let poller = poller(addr, &["100", "200"], &registry);

    poller.fetch_cycle().await;

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(series_value(&registry, "current_state_value", "100"), Some(123.0));
    assert_eq!(series_value(&registry, "current_state_value", "200"), Some(321.0));
    assert_eq!(series_value(&registry, "trend", "100"), Some(-1.0));
    assert_eq!(series_value(&registry, "alarm_value", "200"), Some(500.0));
    assert!(scalar_value(&registry, "last_update_timestamp_seconds").unwrap() > 0.0);
}

#[tokio::test]
async fn test_failure_for_one_station_does_not_block_others() {
    let app = Router::new().route(
        "/station/hydro/status",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            let id = requested_id(&params);
            if id == "bad" {
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            } else {
                Json(station_payload(&id, 42.0)).into_response()
            }
        }),
    );

    let addr = spawn_station_api(app);
    let registry = Registry::new();
    let poller = poller(addr, &["bad", "good"], &registry);

    poller.fetch_cycle().await;

    assert_eq!(series_value(&registry, "current_state_value", "good"), Some(42.0));
    assert_eq!(series_value(&registry, "current_state_value", "bad"), None);
    // the timestamp still advances even though a station failed
    assert!(scalar_value(&registry, "last_update_timestamp_seconds").unwrap() > 0.0);
}

#[tokio::test]
async fn test_empty_status_block_skips_the_station() {
    let app = Router::new().route(
        "/station/hydro/status",
        get(|Query(params): Query<HashMap<String, String>>| async move {
            let id = requested_id(&params);
            if id == "hollow" {
                Json(json!({"id": id, "status": {}, "stateCode": "1"})).into_response()
            } else {
                Json(station_payload(&id, 7.0)).into_response()
            }
        }),
    );

    let addr = spawn_station_api(app);
    let registry = Registry::new();
    let poller = poller(addr, &["hollow", "full"], &registry);

    poller.fetch_cycle().await;

    assert_eq!(series_value(&registry, "current_state_value", "hollow"), None);
    assert_eq!(series_value(&registry, "status", "hollow"), None);
    assert_eq!(series_value(&registry, "current_state_value", "full"), Some(7.0));
}

#[tokio::test]
async fn test_series_retained_when_station_starts_failing() {
    let failing = Arc::new(AtomicBool::new(false));
    let app = {
        let failing = Arc::clone(&failing);
        Router::new().route(
            "/station/hydro/status",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let failing = Arc::clone(&failing);
                async move {
                    if failing.load(Ordering::SeqCst) {
                        StatusCode::BAD_GATEWAY.into_response()
                    } else {
                        Json(station_payload(&requested_id(&params), 123.0)).into_response()
                    }
                }
            }),
        )
    };

    let addr = spawn_station_api(app);
    let registry = Registry::new();
    let poller = poller(addr, &["100"], &registry);

    poller.fetch_cycle().await;
    assert_eq!(series_value(&registry, "current_state_value", "100"), Some(123.0));

    failing.store(true, Ordering::SeqCst);
    poller.fetch_cycle().await;

    // stale-but-present: the last good observation survives the failure
    assert_eq!(series_value(&registry, "current_state_value", "100"), Some(123.0));
}

#[tokio::test]
async fn test_stations_are_fetched_concurrently() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let app = {
        let in_flight = Arc::clone(&in_flight);
        let max_in_flight = Arc::clone(&max_in_flight);
        Router::new().route(
            "/station/hydro/status",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let in_flight = Arc::clone(&in_flight);
                let max_in_flight = Arc::clone(&max_in_flight);
                async move {
                    let n = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(n, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Json(station_payload(&requested_id(&params), 1.0))
                }
            }),
        )
    };

    let addr = spawn_station_api(app);
    let registry = Registry::new();
    let poller = poller(addr, &["1", "2", "3"], &registry);

    poller.fetch_cycle().await;

    assert!(
        max_in_flight.load(Ordering::SeqCst) >= 2,
        "requests within one cycle should overlap, max in flight was {}",
        max_in_flight.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_cycles_never_overlap() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let app = {
        let in_flight = Arc::clone(&in_flight);
        let max_in_flight = Arc::clone(&max_in_flight);
        Router::new().route(
            "/station/hydro/status",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let in_flight = Arc::clone(&in_flight);
                let max_in_flight = Arc::clone(&max_in_flight);
                async move {
                    let n = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(n, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Json(station_payload(&requested_id(&params), 1.0))
                }
            }),
        )
    };

    let addr = spawn_station_api(app);
    let registry = Registry::new();
    let poller = Arc::new(poller(addr, &["1"], &registry));

    // With a single configured station, overlapping requests can only come
    // from overlapping cycles.
    let a = Arc::clone(&poller);
    let b = Arc::clone(&poller);
    tokio::join!(a.fetch_cycle(), b.fetch_cycle());

    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
}
