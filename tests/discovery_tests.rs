// tests/discovery_tests.rs
use mockito::{Matcher, Server, ServerGuard};
use std::sync::Arc;
use std::time::Duration;
use ubq_health_monitor::config::DiscoveryConfig;
use ubq_health_monitor::metrics::MetricsRegistry;
use ubq_health_monitor::{TargetDiscovery, TargetKind, TargetSource};
use url::Url;

const SITEMAP: &str = r#"{"urls":[
    {"url":"https://ubq.fi/"},
    {"url":"https://pay.ubq.fi/"},
    {"url":"https://os-daemon-pricing.ubq.fi/"}
]}"#;

const PLUGIN_MAP: &str = r#"{"plugins":[
    {"pluginName":"command-ask","url":"https://command-ask.deno.dev","displayName":"Ask","description":"Ask the assistant"}
]}"#;

fn discovery_config(server: &ServerGuard, cache_ttl_secs: u64) -> DiscoveryConfig {
    DiscoveryConfig {
        sitemap_url: Url::parse(&format!("{}/sitemap.json", server.url())).unwrap(),
        plugin_map_url: Url::parse(&format!("{}/plugin-map.json", server.url())).unwrap(),
        fetch_timeout_secs: 1,
        cache_ttl_secs,
        ..DiscoveryConfig::default()
    }
}

fn keys(targets: &[ubq_health_monitor::Target]) -> Vec<&str> {
    targets.iter().map(|t| t.key.as_str()).collect()
}

#[tokio::test]
async fn classifies_sitemap_into_apps_and_system_plugins() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/sitemap.json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(SITEMAP)
        .create_async()
        .await;
    server
        .mock("GET", "/plugin-map.json")
        .with_status(200)
        .with_body(r#"{"plugins":[]}"#)
        .create_async()
        .await;

    let discovery = TargetDiscovery::new(discovery_config(&server, 300), None).unwrap();
    let targets = discovery.discover().await;

    assert_eq!(keys(&targets.apps), vec!["", "pay"]);
    assert_eq!(targets.apps[0].routing_domain, "ubq.fi");
    assert_eq!(targets.apps[1].routing_domain, "pay.ubq.fi");

    assert_eq!(targets.plugins.len(), 1);
    let plugin = &targets.plugins[0];
    assert_eq!(plugin.key, "os-daemon-pricing");
    assert_eq!(plugin.kind, TargetKind::Plugin);
    assert_eq!(plugin.display_name.as_deref(), Some("daemon pricing"));
    assert_eq!(plugin.description.as_deref(), Some("Operating System Plugin"));
    assert!(targets.others.is_empty());
}

#[tokio::test]
async fn merges_plugin_map_entries() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/sitemap.json")
        .with_body(SITEMAP)
        .create_async()
        .await;
    server
        .mock("GET", "/plugin-map.json")
        .with_body(PLUGIN_MAP)
        .create_async()
        .await;

    let discovery = TargetDiscovery::new(discovery_config(&server, 300), None).unwrap();
    let targets = discovery.discover().await;

    let plugin_keys = keys(&targets.plugins);
    assert!(plugin_keys.contains(&"command-ask"));
    assert!(plugin_keys.contains(&"os-daemon-pricing"));

    let ask = targets
        .plugins
        .iter()
        .find(|t| t.key == "command-ask")
        .unwrap();
    assert_eq!(ask.display_name.as_deref(), Some("Ask"));
    assert_eq!(ask.variants, vec!["main".to_string()]);
}

#[tokio::test]
async fn serves_from_cache_within_ttl() {
    let mut server = Server::new_async().await;
    let sitemap = server
        .mock("GET", "/sitemap.json")
        .with_body(SITEMAP)
        .expect(1)
        .create_async()
        .await;
    let plugin_map = server
        .mock("GET", "/plugin-map.json")
        .with_body(PLUGIN_MAP)
        .expect(1)
        .create_async()
        .await;

    let registry = MetricsRegistry::new().unwrap();
    let discovery =
        TargetDiscovery::new(discovery_config(&server, 300), Some(registry.collector())).unwrap();

    let first = discovery.discover().await;
    let second = discovery.discover().await;

    assert!(Arc::ptr_eq(&first, &second));
    sitemap.assert_async().await;
    plugin_map.assert_async().await;
    assert_eq!(registry.collector().discovery_cache_hits.get(), 1);
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let mut server = Server::new_async().await;
    let sitemap = server
        .mock("GET", "/sitemap.json")
        .with_body(SITEMAP)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/plugin-map.json")
        .with_body(PLUGIN_MAP)
        .create_async()
        .await;

    let discovery = Arc::new(TargetDiscovery::new(discovery_config(&server, 300), None).unwrap());
    let calls = (0..5).map(|_| {
        let discovery = discovery.clone();
        async move { discovery.discover().await }
    });
    let results = futures::future::join_all(calls).await;

    assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    sitemap.assert_async().await;
}

#[tokio::test]
async fn zero_ttl_refetches_every_call() {
    let mut server = Server::new_async().await;
    let sitemap = server
        .mock("GET", "/sitemap.json")
        .with_body(SITEMAP)
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", "/plugin-map.json")
        .with_body(PLUGIN_MAP)
        .create_async()
        .await;

    let discovery = TargetDiscovery::new(discovery_config(&server, 0), None).unwrap();
    discovery.discover().await;
    discovery.discover().await;

    sitemap.assert_async().await;
}

#[tokio::test]
async fn invalidate_forces_refetch() {
    let mut server = Server::new_async().await;
    let sitemap = server
        .mock("GET", "/sitemap.json")
        .with_body(SITEMAP)
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", "/plugin-map.json")
        .with_body(PLUGIN_MAP)
        .create_async()
        .await;

    let discovery = TargetDiscovery::new(discovery_config(&server, 300), None).unwrap();
    discovery.discover().await;
    discovery.invalidate();
    discovery.discover().await;

    sitemap.assert_async().await;
}

#[tokio::test]
async fn failed_sitemap_degrades_to_empty_apps() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/sitemap.json")
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("GET", "/plugin-map.json")
        .with_body(PLUGIN_MAP)
        .create_async()
        .await;

    let registry = MetricsRegistry::new().unwrap();
    let discovery =
        TargetDiscovery::new(discovery_config(&server, 300), Some(registry.collector())).unwrap();
    let targets = discovery.discover().await;

    assert!(targets.apps.is_empty());
    assert_eq!(keys(&targets.plugins), vec!["command-ask"]);
    assert_eq!(
        registry
            .collector()
            .discovery_fetches_total
            .with_label_values(&["sitemap", "http_error"])
            .get(),
        1
    );
}

#[tokio::test]
async fn malformed_plugin_map_degrades_to_empty_plugins() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/sitemap.json")
        .with_body(r#"{"urls":["https://ubq.fi/","https://pay.ubq.fi/"]}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/plugin-map.json")
        .with_body("{not json")
        .create_async()
        .await;

    let discovery = TargetDiscovery::new(discovery_config(&server, 300), None).unwrap();
    let targets = discovery.discover().await;

    assert_eq!(keys(&targets.apps), vec!["", "pay"]);
    assert!(targets.plugins.is_empty());
}

#[tokio::test]
async fn unreachable_upstreams_yield_an_empty_set() {
    let config = DiscoveryConfig {
        sitemap_url: Url::parse("http://127.0.0.1:9/sitemap.json").unwrap(),
        plugin_map_url: Url::parse("http://127.0.0.1:9/plugin-map.json").unwrap(),
        fetch_timeout_secs: 1,
        ..DiscoveryConfig::default()
    };

    let discovery = TargetDiscovery::new(config, None).unwrap();
    let targets = discovery.discover().await;

    assert!(targets.is_empty());
}

#[tokio::test]
async fn slow_upstream_is_cut_off_by_fetch_timeout() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let config = DiscoveryConfig {
        sitemap_url: Url::parse(&format!("http://{}/sitemap.json", addr)).unwrap(),
        plugin_map_url: Url::parse(&format!("http://{}/plugin-map.json", addr)).unwrap(),
        fetch_timeout_secs: 1,
        ..DiscoveryConfig::default()
    };

    let discovery = TargetDiscovery::new(config, None).unwrap();
    let start = std::time::Instant::now();
    let targets = discovery.discover().await;

    assert!(targets.is_empty());
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn stale_partition_is_kept_when_enabled() {
    let mut server = Server::new_async().await;
    let good_sitemap = server
        .mock("GET", "/sitemap.json")
        .with_body(SITEMAP)
        .create_async()
        .await;
    server
        .mock("GET", "/plugin-map.json")
        .with_body(PLUGIN_MAP)
        .create_async()
        .await;

    let config = DiscoveryConfig {
        fallback_to_stale: true,
        ..discovery_config(&server, 0)
    };
    let discovery = TargetDiscovery::new(config, None).unwrap();
    let first = discovery.discover().await;
    assert_eq!(keys(&first.apps), vec!["", "pay"]);

    good_sitemap.remove_async().await;
    server
        .mock("GET", "/sitemap.json")
        .with_status(503)
        .create_async()
        .await;

    let second = discovery.discover().await;
    assert_eq!(keys(&second.apps), vec!["", "pay"]);
    assert!(keys(&second.plugins).contains(&"command-ask"));
}

#[tokio::test]
async fn stale_partition_is_dropped_by_default() {
    let mut server = Server::new_async().await;
    let good_sitemap = server
        .mock("GET", "/sitemap.json")
        .with_body(SITEMAP)
        .create_async()
        .await;
    server
        .mock("GET", "/plugin-map.json")
        .with_body(PLUGIN_MAP)
        .create_async()
        .await;

    let discovery = TargetDiscovery::new(discovery_config(&server, 0), None).unwrap();
    assert_eq!(discovery.discover().await.apps.len(), 2);

    good_sitemap.remove_async().await;
    server
        .mock("GET", "/sitemap.json")
        .with_status(503)
        .create_async()
        .await;

    assert!(discovery.discover().await.apps.is_empty());
}

#[tokio::test]
async fn foreign_hosts_land_in_others() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/sitemap.json")
        .with_body(r#"["https://pay.ubq.fi/","https://partner.example.com/","not a url"]"#)
        .create_async()
        .await;
    server
        .mock("GET", Matcher::Regex("^/plugin-map".to_string()))
        .with_body("[]")
        .create_async()
        .await;

    let discovery = TargetDiscovery::new(discovery_config(&server, 300), None).unwrap();
    let targets = discovery.discover().await;

    assert_eq!(keys(&targets.apps), vec!["pay"]);
    assert_eq!(keys(&targets.others), vec!["partner.example.com"]);
    assert_eq!(targets.others[0].routing_domain, "partner.example.com");
}
