//! End-to-end harvest runs against mock HTTP servers.

use getpapers::harvest::{HarvestError, HarvestOutcome, Harvester, PaginatorSettings};
use getpapers::models::{AssetKind, HarvestQuery, ResultSet};
use getpapers::sources::{CrossRefSource, EuropePmcSource, IeeeSource, SourceError};
use getpapers::utils::{HttpClient, RetryConfig};
use mockito::Matcher;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn fast_paging() -> PaginatorSettings {
    PaginatorSettings {
        page_timeout: Duration::from_secs(5),
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            max_total_time: Duration::from_secs(1),
        },
        malformed_retry_delay: Duration::from_millis(1),
        max_malformed_attempts: 2,
    }
}

fn eupmc_record(pmcid: &str) -> serde_json::Value {
    json!({
        "pmcid": pmcid,
        "title": format!("Article {}", pmcid),
        "fullTextUrlList": {"fullTextUrl": [
            {"availabilityCode": "OA", "documentStyle": "html",
             "url": format!("https://europepmc.org/articles/{}", pmcid)}
        ]}
    })
}

#[tokio::test]
async fn test_eupmc_search_and_xml_download() {
    let mut server = mockito::Server::new_async().await;
    let search = server
        .mock("GET", "/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("query".into(), "malaria OPEN_ACCESS:y".into()),
            Matcher::UrlEncoded("cursorMark".into(), "*".into()),
        ]))
        .with_status(200)
        .with_body(
            json!({
                "version": "6.9",
                "hitCount": 2,
                "nextCursorMark": "AoE",
                "resultList": {"result": [eupmc_record("PMC1"), eupmc_record("PMC2")]}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/PMC1/fullTextXML")
        .with_status(200)
        .with_body("<article/>")
        .create_async()
        .await;
    server
        .mock("GET", "/PMC2/fullTextXML")
        .with_status(404)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = HttpClient::new().unwrap();
    let source = Arc::new(EuropePmcSource::with_client(client.clone()).with_base_url(server.url()));
    let harvester = Harvester::new(source, Arc::new(client), dir.path())
        .with_paginator_settings(fast_paging())
        .with_workers(2);

    let query = HarvestQuery::new("malaria").asset(AssetKind::Xml);
    let outcome = harvester.run(&query).await.unwrap();

    search.assert_async().await;
    assert_eq!(
        outcome,
        HarvestOutcome::Completed {
            results: 2,
            partial: false
        }
    );

    let saved: ResultSet =
        serde_json::from_slice(&std::fs::read(dir.path().join("eupmc_results.json")).unwrap())
            .unwrap();
    assert_eq!(saved.len(), 2);
    assert!(dir.path().join("PMC2").join("eupmc_result.json").is_file());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("PMC1").join("fulltext.xml")).unwrap(),
        "<article/>"
    );
    assert!(!dir.path().join("PMC2").join("fulltext.xml").exists());

    let html = std::fs::read_to_string(dir.path().join("eupmc_fulltext_html_urls.txt")).unwrap();
    assert_eq!(html.lines().count(), 2);
}

#[tokio::test]
async fn test_eupmc_restart_skips_search() {
    let mut server = mockito::Server::new_async().await;
    let search = server
        .mock("GET", "/search")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;
    server
        .mock("GET", "/PMC9/fullTextXML")
        .with_status(200)
        .with_body("<article id=\"9\"/>")
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("eupmc_results.json"),
        serde_json::to_vec_pretty(&vec![eupmc_record("PMC9")]).unwrap(),
    )
    .unwrap();

    let client = HttpClient::new().unwrap();
    let source = Arc::new(EuropePmcSource::with_client(client.clone()).with_base_url(server.url()));
    let harvester = Harvester::new(source, Arc::new(client), dir.path());

    let query = HarvestQuery::new("ignored").restart(true).asset(AssetKind::Xml);
    harvester.run(&query).await.unwrap();

    search.assert_async().await;
    assert!(dir.path().join("PMC9").join("fulltext.xml").is_file());
}

#[tokio::test]
async fn test_crossref_follows_cursor_until_total() {
    let first: Vec<_> = (0..1000)
        .map(|n| json!({"DOI": format!("10.1000/{}", n)}))
        .collect();
    let second: Vec<_> = (1000..1500)
        .map(|n| json!({"DOI": format!("10.1000/{}", n)}))
        .collect();

    let mut server = mockito::Server::new_async().await;
    let page_one = server
        .mock("GET", "/works")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("cursor".into(), "*".into()),
            Matcher::UrlEncoded("filter".into(), "type:journal-article".into()),
        ]))
        .with_status(200)
        .with_body(
            json!({"message": {"total-results": 1500, "next-cursor": "c2", "items": first}})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let page_two = server
        .mock("GET", "/works")
        .match_query(Matcher::UrlEncoded("cursor".into(), "c2".into()))
        .with_status(200)
        .with_body(
            json!({"message": {"total-results": 1500, "next-cursor": "c3", "items": second}})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = HttpClient::new().unwrap();
    let source = Arc::new(
        CrossRefSource::with_client(client.clone()).with_base_url(format!("{}/works", server.url())),
    );
    let harvester = Harvester::new(source, Arc::new(client), dir.path())
        .with_paginator_settings(fast_paging());

    let query = HarvestQuery::new("").filters_from_str("type:journal-article");
    let outcome = harvester.run(&query).await.unwrap();

    page_one.assert_async().await;
    page_two.assert_async().await;
    assert_eq!(
        outcome,
        HarvestOutcome::Completed {
            results: 1500,
            partial: false
        }
    );
    assert!(dir
        .path()
        .join("10.1000_1499")
        .join("crossref_result.json")
        .is_file());
}

#[tokio::test]
async fn test_count_only_writes_nothing() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/search")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({"hitCount": 1234, "resultList": {"result": [eupmc_record("PMC1")]}})
                .to_string(),
        )
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = HttpClient::new().unwrap();
    let source = Arc::new(EuropePmcSource::with_client(client.clone()).with_base_url(server.url()));
    let harvester = Harvester::new(source, Arc::new(client), dir.path())
        .with_paginator_settings(fast_paging());

    let outcome = harvester
        .run(&HarvestQuery::new("q").no_execute(true))
        .await
        .unwrap();

    assert_eq!(outcome, HarvestOutcome::CountOnly(1234));
    assert!(!dir.path().join("eupmc_results.json").exists());
}

#[tokio::test]
async fn test_ieee_without_key_makes_no_request() {
    let mut server = mockito::Server::new_async().await;
    let any = server
        .mock("GET", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = HttpClient::new().unwrap();
    let source = Arc::new(IeeeSource::with_client(client.clone(), None).with_base_url(server.url()));
    let harvester = Harvester::new(source, Arc::new(client), dir.path());

    let result = harvester.run(&HarvestQuery::new("antenna")).await;

    any.assert_async().await;
    assert!(matches!(
        result,
        Err(HarvestError::Source(SourceError::InvalidRequest(_)))
    ));
}
