//! End-to-end ingestion against a mock HTTP server: config → fetch → merge →
//! selection → report.

use feedsift::config::Config;
use feedsift::feed::{
    build_http_client, AggregateLimits, Aggregator, HttpTransport, Source, SourceFetcher,
};
use feedsift::selection::{DigestGenerator, Mode, Orchestrator, SelectionError, ValidationError};
use pretty_assertions::assert_eq;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RSS_A: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel>
  <title>Alpha</title>
  <item>
    <title>Ransomware hits port operator</title>
    <link>https://news.example/port</link>
    <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
    <description><![CDATA[<p>Operations <b>halted</b>.</p>]]></description>
  </item>
  <item>
    <title>Patch Tuesday roundup</title>
    <link>https://news.example/patch</link>
    <pubDate>Mon, 01 Jan 2024 09:00:00 GMT</pubDate>
  </item>
</channel></rss>"#;

const ATOM_C: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Gamma</title>
  <entry>
    <title>Zero-day in VPN appliance</title>
    <link rel="alternate" href="https://news.example/vpn"/>
    <id>urn:gamma:1</id>
    <updated>2024-01-03T08:00:00Z</updated>
    <summary>Actively exploited.</summary>
  </entry>
  <entry>
    <title>Port operator follow-up</title>
    <link href="https://news.example/port"/>
    <id>urn:gamma:2</id>
    <updated>2024-01-02T12:00:00Z</updated>
  </entry>
</feed>"#;

async fn serve(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn three_sources() -> (MockServer, Vec<Source>) {
    let server = MockServer::start().await;
    serve(&server, "/a", ResponseTemplate::new(200).set_body_string(RSS_A)).await;
    serve(&server, "/b", ResponseTemplate::new(500)).await;
    serve(&server, "/c", ResponseTemplate::new(200).set_body_string(ATOM_C)).await;

    let sources = ["a", "b", "c"]
        .iter()
        .map(|name| Source::new(*name, format!("{}/{}", server.uri(), name)))
        .collect();
    (server, sources)
}

fn fetcher() -> SourceFetcher<HttpTransport> {
    let client = build_http_client(Duration::from_secs(5)).unwrap();
    SourceFetcher::new(HttpTransport::new(client))
}

#[tokio::test]
async fn test_one_failing_source_is_summarized_and_others_merge() {
    let (_server, sources) = three_sources().await;
    let aggregator = Aggregator::new(fetcher(), AggregateLimits::default());

    let aggregation = aggregator.aggregate_all(&sources).await;
    let titles: Vec<_> = aggregation
        .articles
        .iter()
        .map(|a| a.title.as_str())
        .collect();
    assert_eq!(
        titles,
        vec![
            "Zero-day in VPN appliance",
            "Ransomware hits port operator",
            "Patch Tuesday roundup",
        ]
    );
    assert_eq!(aggregation.summary(), "2 of 3 sources returned data");
    assert_eq!(aggregation.failures.len(), 1);
    assert_eq!(aggregation.failures[0].source.name, "b");
    assert!(aggregation.failures[0].message.contains("500"));
}

#[tokio::test]
async fn test_all_sources_cap_applies() {
    let (_server, sources) = three_sources().await;
    let limits = AggregateLimits {
        all_sources_cap: 2,
        concurrency: 2,
    };
    let aggregator = Aggregator::new(fetcher(), limits);

    assert_eq!(aggregator.aggregate_all(&sources).await.articles.len(), 2);
    assert_eq!(aggregator.aggregate_subset(&sources).await.articles.len(), 3);
}

#[tokio::test]
async fn test_config_sources_drive_orchestrator() {
    let (server, _) = three_sources().await;
    let toml = format!(
        r#"
allow_private_hosts = true
min_report_articles = 3
report_window = 2

[[sources]]
name = "Alpha"
url = "{uri}/a"

[[sources]]
name = "Broken"
url = "{uri}/b"

[[sources]]
name = "Gamma"
url = "{uri}/c"
"#,
        uri = server.uri()
    );
    let config = Config::from_toml(&toml).unwrap();

    let (mut orch, mut events) = Orchestrator::new(
        config.sources.clone(),
        fetcher(),
        config.aggregate_limits(),
        DigestGenerator,
        config.selection_settings(),
    );

    orch.select_source(config.find_source("All Sources").unwrap());
    let event = events.recv().await.unwrap();
    assert!(orch.handle_event(event));
    assert_eq!(orch.state().mode(), &Mode::All);
    assert_eq!(orch.state().articles().len(), 3);

    let report = orch.executive_report().await.unwrap();
    assert_eq!(report.title, "Executive Intelligence Briefing");
    assert_eq!(report.sources.len(), 2);
    assert!(report.text.contains("Article 1: Zero-day in VPN appliance"));
    assert!(report.text.contains("Article 2: Ransomware hits port operator\nOperations halted."));

    orch.select_source(config.find_source("Alpha").unwrap());
    let event = events.recv().await.unwrap();
    assert!(orch.handle_event(event));
    assert_eq!(orch.state().articles().len(), 2);
    match orch.executive_report().await {
        Err(SelectionError::Validation(ValidationError::TooFewArticles {
            required: 3,
            found: 2,
        })) => {}
        other => panic!("Expected TooFewArticles, got {:?}", other),
    }

    orch.select_source(config.find_source("Broken").unwrap());
    let event = events.recv().await.unwrap();
    assert!(orch.handle_event(event));
    let error = orch.state().error().unwrap();
    assert!(error.starts_with("Failed to load feed from Broken:"));
    assert!(error.contains("500"));
}
