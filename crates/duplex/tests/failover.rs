//! End-to-end failover scenario across the health monitor, DNS controller
//! and edge failover group, with two mock regional endpoints.

use std::sync::Arc;
use std::time::Duration;

use duplex_core::{Region, RegionPair, RegionRole};
use duplex_dns::{
    spawn_health_bridge, DnsFailoverController, FailoverRecord, FailoverRecordSet, RecordPriority,
};
use duplex_edge::{EdgeRouter, HttpOrigin, OriginGroup, OriginRequest};
use duplex_health::{HealthMonitor, HttpProber, MonitorConfig};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn healthy_region(server: &MockServer, body: &str) {
    Mock::given(method("GET"))
        .and(path("/livez"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

async fn failing_region(server: &MockServer) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/livez"))
        .respond_with(ResponseTemplate::new(503))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/index.html"))
        .respond_with(ResponseTemplate::new(503))
        .mount(server)
        .await;
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn test_regional_outage_is_absorbed_by_dns_and_edge() {
    let east_server = MockServer::start().await;
    let west_server = MockServer::start().await;
    healthy_region(&east_server, "east content").await;
    healthy_region(&west_server, "west content").await;

    let east = Region::new("us-east-1", RegionRole::Primary, east_server.uri());
    let west = Region::new("us-west-2", RegionRole::Secondary, west_server.uri());
    let regions = RegionPair::new(east.clone(), west.clone()).unwrap();

    // Health monitoring with a tight schedule for the test
    let monitor_config = MonitorConfig::new()
        .interval(Duration::from_millis(20))
        .failure_threshold(2)
        .probe_timeout(Duration::from_millis(200));
    let prober = Arc::new(HttpProber::new("/livez"));
    let mut monitor = HealthMonitor::new(monitor_config, prober).unwrap();

    // DNS failover bound to the primary's health
    let records = FailoverRecordSet::new(
        "www.example.com.",
        60,
        FailoverRecord::primary("www-primary", east.endpoint.clone(), east.id.clone()),
        FailoverRecord::secondary("www-secondary", west.endpoint.clone()),
    )
    .unwrap();
    let dns = Arc::new(DnsFailoverController::new(records));
    let _bridge = spawn_health_bridge(dns.clone(), &monitor);

    monitor.watch(regions.primary().clone());
    monitor.watch(regions.secondary().clone());

    // Edge failover group over the same two endpoints
    let edge = EdgeRouter::new(
        OriginGroup::new("us-east-1", "us-west-2", [500, 502, 503, 504]),
        Arc::new(
            HttpOrigin::new("us-east-1", east.endpoint.clone(), Duration::from_secs(1)).unwrap(),
        ),
        Arc::new(
            HttpOrigin::new("us-west-2", west.endpoint.clone(), Duration::from_secs(1)).unwrap(),
        ),
    )
    .unwrap();

    // Phase 1: everything healthy. DNS answers primary, edge serves east.
    assert_eq!(dns.resolve().priority, RecordPriority::Primary);
    assert_eq!(dns.resolve().target, east.endpoint);

    let response = edge.route(&OriginRequest::get("/index.html")).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, bytes::Bytes::from("east content"));

    // Phase 2: the primary region goes dark.
    failing_region(&east_server).await;

    // Edge failover is immediate, per request, ahead of any health verdict
    let response = edge.route(&OriginRequest::get("/index.html")).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, bytes::Bytes::from("west content"));

    // DNS follows once the debounce threshold is crossed
    let dns_check = dns.clone();
    wait_until(move || dns_check.resolve().priority == RecordPriority::Secondary).await;
    assert_eq!(dns.resolve().target, west.endpoint);

    // Phase 3: the primary recovers; one good probe restores it.
    east_server.reset().await;
    healthy_region(&east_server, "east content").await;

    let dns_check = dns.clone();
    wait_until(move || dns_check.resolve().priority == RecordPriority::Primary).await;

    let response = edge.route(&OriginRequest::get("/index.html")).await.unwrap();
    assert_eq!(response.body, bytes::Bytes::from("east content"));

    monitor.stop_all().await;
}
