//! Integration tests for the crawler
//!
//! These tests use wiremock to stand in for the policy service and exercise
//! the API client, pager and coordinator end-to-end.

use policy_crawler::config::{Config, FilterMode};
use policy_crawler::crawler::{
    ApiClient, Coordinator, HttpProxyProvider, Pager, PolicyApi, ProxyProvider, ProxySource,
    DETAIL_PATH, DOWNLOAD_PATH, SEARCH_PATH, TOKEN_HEADER,
};
use policy_crawler::model::Category;
use policy_crawler::state::{CrawlState, StopHandle};
use policy_crawler::ApiError;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server, with short delays
fn create_test_config(base_url: &str, output_dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.api.base_url = base_url.to_string();
    config.api.timeout_secs = 5;
    config.request.request_delay_ms = 0;
    config.request.retry_delay_ms = 10;
    config.request.rate_limit_delay_ms = 10;
    config.request.attachment_delay_ms = 0;
    config.crawl.categories = vec![Category::LocalRegulation];
    config.output.output_dir = output_dir.to_path_buf();
    config
}

fn client(config: &Config) -> ApiClient {
    ApiClient::with_proxy_source(config, ProxySource::disabled()).expect("Failed to build client")
}

fn rows(range: std::ops::Range<usize>) -> Vec<Value> {
    range
        .map(|n| {
            json!({
                "id": format!("p-{}", n),
                "title": format!("Policy {}", n),
                "officeVo": { "groupName": "Provincial Office" },
                "passDate": "2024-01-01 00:00:00",
                "lawRuleType": 1,
            })
        })
        .collect()
}

fn search_response(token: &str, rows: Vec<Value>, total: usize) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": 200,
        "msg": token,
        "data": { "rows": rows, "total": total },
    }))
}

#[tokio::test]
async fn test_search_updates_and_echoes_token() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path());

    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(body_partial_json(json!({
            "pageNum": 1,
            "pageSize": 2,
            "lawRuleType": 1,
            "orderByColumn": "passDate",
        })))
        .respond_with(search_response("tok-1", rows(0..2), 4))
        .expect(1)
        .mount(&mock_server)
        .await;

    // Second page is only served to a caller echoing the first token
    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .and(header(TOKEN_HEADER, "tok-1"))
        .and(body_partial_json(json!({ "pageNum": 2 })))
        .respond_with(search_response("tok-2", rows(2..4), 4))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut api = client(&config);

    let first = api.search(Category::LocalRegulation, 1, 2).await.unwrap();
    assert_eq!(first.rows.len(), 2);
    assert_eq!(first.total, 4);
    assert_eq!(api.transport().continuation_token(), "tok-1");

    let second = api.search(Category::LocalRegulation, 2, 2).await.unwrap();
    assert_eq!(second.rows[0]["id"], "p-2");
    assert_eq!(api.transport().continuation_token(), "tok-2");
}

#[tokio::test]
async fn test_pager_lists_45_records_in_three_pages() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path());

    for (page, range) in [(1, 0..20), (2, 20..40), (3, 40..45)] {
        Mock::given(method("POST"))
            .and(path(SEARCH_PATH))
            .and(body_partial_json(json!({ "pageNum": page, "pageSize": 20 })))
            .respond_with(search_response("tok", rows(range), 45))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let mut api = client(&config);
    let pager = Pager::new(20, Duration::ZERO, StopHandle::new());
    let policies = pager.fetch_all(&mut api, Category::LocalRegulation).await;

    assert_eq!(policies.len(), 45);
    assert_eq!(policies[0].id, "p-0");
    assert_eq!(policies[44].id, "p-44");
    assert_eq!(policies[0].office, "Provincial Office");
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path());

    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(search_response("tok", rows(0..1), 1))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut api = client(&config);
    let page = api.search(Category::LocalRegulation, 1, 20).await.unwrap();
    assert_eq!(page.rows.len(), 1);
}

#[tokio::test]
async fn test_rejection_is_not_retried() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path());

    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 403, "msg": "forbidden" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut api = client(&config);
    let err = api.search(Category::GovernmentRule, 1, 20).await.unwrap_err();
    assert!(matches!(err, ApiError::Rejected(ref msg) if msg == "forbidden"));
}

#[tokio::test]
async fn test_rate_limit_exhausts_budget() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path());

    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 500,
            "msg": "Too many requests, please try later",
        })))
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut api = client(&config);
    let err = api.search(Category::LocalRegulation, 1, 20).await.unwrap_err();
    match err {
        ApiError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(last.is_rate_limited());
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
}

#[tokio::test]
async fn test_detail_posts_form_id() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path());

    Mock::given(method("POST"))
        .and(path(DETAIL_PATH))
        .and(body_string_contains("id=p-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lawRule": { "keywords": "water,city", "effectiveDate": "2024-02-01" },
            "list": [{ "id": "f1", "fileName": "body.txt", "filePath": "/f/body.txt", "fileExt": "txt" }],
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut api = client(&config);
    let payload = api.detail("p-7").await.unwrap();
    assert_eq!(payload["lawRule"]["keywords"], "water,city");
    assert_eq!(payload["list"][0]["fileName"], "body.txt");
}

#[tokio::test]
async fn test_detail_without_payload_is_retried() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path());

    Mock::given(method("POST"))
        .and(path(DETAIL_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 500, "msg": "system busy" })),
        )
        .expect(3)
        .mount(&mock_server)
        .await;

    let mut api = client(&config);
    let err = api.detail("p-9").await.unwrap_err();
    match err {
        ApiError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, ApiError::Malformed(ref msg) if msg.contains("system busy")));
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
}

#[tokio::test]
async fn test_detail_recovers_after_payload_less_response() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path());

    Mock::given(method("POST"))
        .and(path(DETAIL_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 401, "msg": "token expired" })),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path(DETAIL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lawRule": { "keywords": "air" },
            "list": [],
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut api = client(&config);
    let payload = api.detail("p-10").await.unwrap();
    assert_eq!(payload["lawRule"]["keywords"], "air");
}

#[tokio::test]
async fn test_download_writes_file() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path());

    Mock::given(method("GET"))
        .and(path(DOWNLOAD_PATH))
        .and(query_param("fileFolder", "/f/noticeleft1right.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"Article 1.".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut api = client(&config);
    let dest = dir.path().join("notice.txt");
    let bytes = api.download("/f/notice(1).txt", &dest).await.unwrap();

    assert_eq!(bytes, 10);
    assert_eq!(std::fs::read_to_string(&dest).unwrap(), "Article 1.");
}

#[tokio::test]
async fn test_empty_download_is_not_retried() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&mock_server.uri(), dir.path());

    Mock::given(method("GET"))
        .and(path(DOWNLOAD_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut api = client(&config);
    let err = api
        .download("/f/empty.txt", &dir.path().join("empty.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::EmptyDownload));
}

#[tokio::test]
async fn test_proxy_provider_returns_first_address() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/proxies"))
        .and(query_param("num", "1"))
        .and(query_param("key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string("10.1.2.3:3128\n10.1.2.4:3128\n"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let provider = HttpProxyProvider::new(
        format!("{}/proxies", mock_server.uri()),
        Some("secret".to_string()),
    )
    .unwrap();
    let proxy = provider.fetch().await.unwrap();
    assert_eq!(proxy.url(), "http://10.1.2.3:3128");
}

#[tokio::test]
async fn test_full_crawl_writes_output() {
    let mock_server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&mock_server.uri(), dir.path());
    config.download = FilterMode::All;

    Mock::given(method("POST"))
        .and(path(SEARCH_PATH))
        .respond_with(search_response("tok", rows(0..2), 2))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(DETAIL_PATH))
        .and(body_string_contains("id=p-1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path(DETAIL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lawRule": { "keywords": "water", "effectiveDate": "2024-02-01 00:00:00" },
            "list": [{ "id": "f1", "fileName": "body.txt", "filePath": "/f/body.txt", "fileExt": "txt" }],
        })))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(DOWNLOAD_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("Article 1. Water is managed."))
        .mount(&mock_server)
        .await;

    let mut coordinator = Coordinator::new(config).expect("Failed to create coordinator");
    let progress = coordinator.run().await.expect("Crawl failed");

    assert_eq!(progress.state, CrawlState::Completed);
    assert_eq!(progress.total, 2);
    assert_eq!(progress.completed, 1);
    assert_eq!(progress.failed, 1);
    assert_eq!(progress.failures[0].id, "p-1");
    assert_eq!(progress.failures[0].reason, "fetch failed");

    let json_path = dir.path().join("json").join("policy_p-0.json");
    let saved: Value = serde_json::from_slice(&std::fs::read(json_path).unwrap()).unwrap();
    assert_eq!(saved["policy"]["title"], "Policy 0");

    let attachment = dir.path().join("files").join("p-0_body.txt");
    assert!(attachment.exists());

    let markdown = std::fs::read_to_string(dir.path().join("markdown").join("0001_Policy 0.md"))
        .expect("Markdown document missing");
    assert!(markdown.contains("policy_id: \"p-0\""));
    assert!(markdown.contains("## body.txt\n\nArticle 1. Water is managed."));

    assert!(dir.path().join("progress.json").exists());
}
