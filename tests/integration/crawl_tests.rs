//! Integration tests for the crawlers
//!
//! These tests use wiremock to create mock API servers and run the list,
//! detail and search passes end-to-end against a temporary output directory.

use pcc_harvest::config::{ApiConfig, Config, CrawlerConfig};
use pcc_harvest::crawler::{
    crawl_dates, crawl_search, DetailCrawler, FetchClient, ListCrawler, SearchKind,
    DETAIL_KEY_FIELD, SOURCE_DATE_FIELD,
};
use pcc_harvest::state::DateRange;
use pcc_harvest::storage::{CheckpointStore, OutputLayout, RunLock, StorageError};
use pcc_harvest::{ConfigError, HarvestError};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Creates a test configuration pointed at the mock server with no waits
fn create_test_config(server: &MockServer) -> Config {
    Config {
        api: ApiConfig {
            base_url: server.uri(),
            request_timeout: 2000,
            ..ApiConfig::default()
        },
        crawler: CrawlerConfig {
            request_delay: 0,
            max_attempts: 2,
            rate_limit_backoff: 1,
            timeout_retry_delay: 1,
            rate_limit_cooldown: 0,
            failure_pause: 0,
            ..CrawlerConfig::default()
        },
        ..Config::default()
    }
}

fn create_test_client(config: &Config) -> FetchClient {
    FetchClient::new(&config.api, &config.crawler).unwrap()
}

fn range(start: &str, end: &str) -> DateRange {
    let parse = |s: &str| chrono::NaiveDate::parse_from_str(s, "%Y%m%d").unwrap();
    DateRange::new(parse(start), parse(end))
}

fn read_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

async fn mount_date(server: &MockServer, date: &str, body: Value, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/listbydate"))
        .and(query_param("date", date))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(expected)
        .mount(server)
        .await;
}

async fn run_list(config: &Config, layout: &OutputLayout, dates: DateRange) -> pcc_harvest::output::RunSummary {
    let mut crawler = ListCrawler::open(
        create_test_client(config),
        layout,
        config.crawler.clone(),
        CancellationToken::new(),
    )
    .unwrap();
    crawler.run(dates).await.unwrap()
}

async fn run_details(config: &Config, layout: &OutputLayout) -> pcc_harvest::output::RunSummary {
    let mut crawler = DetailCrawler::open(
        create_test_client(config),
        layout,
        config.crawler.clone(),
        CancellationToken::new(),
    )
    .unwrap();
    crawler.run(&layout.list_records()).await.unwrap()
}

/// Answers with `body` and cancels the run, as Ctrl-C during that request would
struct CancelDuringRequest {
    cancel: CancellationToken,
    body: Value,
}

impl Respond for CancelDuringRequest {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.cancel.cancel();
        ResponseTemplate::new(200).set_body_json(self.body.clone())
    }
}

fn write_list_records(layout: &OutputLayout, records: &[Value]) {
    let body: String = records.iter().map(|r| format!("{}\n", r)).collect();
    fs::write(layout.list_records(), body).unwrap();
}

#[tokio::test]
async fn test_list_pass_writes_and_checkpoints_every_date() {
    let server = MockServer::start().await;
    mount_date(
        &server,
        "20240101",
        json!({"records": [{"title": "a"}, {"title": "b"}]}),
        1,
    )
    .await;
    // A day with no notices is still complete
    mount_date(&server, "20240102", json!({}), 1).await;
    mount_date(&server, "20240103", json!({"records": [{"title": "c"}]}), 1).await;

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);

    let summary = run_list(&config, &layout, range("20240101", "20240103")).await;

    assert_eq!(summary.tally.completed, 3);
    assert_eq!(summary.tally.records, 3);
    assert!(!summary.interrupted);

    let lines = read_lines(&layout.list_records());
    let stamps: Vec<&str> = lines
        .iter()
        .map(|r| r[SOURCE_DATE_FIELD].as_str().unwrap())
        .collect();
    assert_eq!(stamps, vec!["20240101", "20240101", "20240103"]);
    assert_eq!(lines[1]["title"], "b");

    let checkpoint = CheckpointStore::load(layout.list_checkpoint()).unwrap();
    assert!(checkpoint.contains("20240102"));
    assert_eq!(checkpoint.len(), 3);
    assert_eq!(checkpoint.records_fetched(), 3);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let server = MockServer::start().await;
    mount_date(&server, "20240101", json!({"records": [{"title": "a"}]}), 1).await;
    mount_date(&server, "20240102", json!({"records": [{"title": "b"}]}), 1).await;

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);
    let dates = range("20240101", "20240102");

    run_list(&config, &layout, dates).await;
    let first = fs::read(layout.list_records()).unwrap();

    let summary = run_list(&config, &layout, dates).await;
    assert_eq!(summary.tally.completed, 0);
    assert_eq!(summary.tally.skipped, 2);
    assert_eq!(fs::read(layout.list_records()).unwrap(), first);
}

#[tokio::test]
async fn test_resume_skips_checkpointed_dates() {
    let server = MockServer::start().await;
    mount_date(&server, "20240101", json!({"records": [{"title": "old"}]}), 0).await;
    mount_date(&server, "20240102", json!({"records": [{"title": "new"}]}), 1).await;

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);

    // A checkpoint left by the earlier downloader
    fs::write(
        layout.list_checkpoint(),
        r#"{"downloaded_dates": ["20240101"], "total_tenders": 5, "last_update": "2024-01-02T00:00:00"}"#,
    )
    .unwrap();

    let summary = run_list(&config, &layout, range("20240101", "20240102")).await;
    assert_eq!(summary.tally.skipped, 1);
    assert_eq!(summary.tally.completed, 1);
    assert_eq!(summary.checkpointed_records, 6);

    let lines = read_lines(&layout.list_records());
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["title"], "new");
}

#[tokio::test]
async fn test_failed_date_is_retried_next_run() {
    let server = MockServer::start().await;
    mount_date(&server, "20240101", json!({"records": [{"title": "a"}]}), 1).await;

    Mock::given(method("GET"))
        .and(path("/listbydate"))
        .and(query_param("date", "20240102"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_date(&server, "20240102", json!({"records": [{"title": "b"}]}), 1).await;

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);
    let dates = range("20240101", "20240102");

    let first = run_list(&config, &layout, dates).await;
    assert_eq!(first.tally.completed, 1);
    assert_eq!(first.tally.failed, 1);

    let checkpoint = CheckpointStore::load(layout.list_checkpoint()).unwrap();
    assert!(!checkpoint.contains("20240102"));
    assert_eq!(checkpoint.failure_count("20240102"), 1);

    let second = run_list(&config, &layout, dates).await;
    assert_eq!(second.tally.completed, 1);
    assert_eq!(second.tally.skipped, 1);

    let checkpoint = CheckpointStore::load(layout.list_checkpoint()).unwrap();
    assert!(checkpoint.contains("20240102"));
    assert_eq!(checkpoint.failure_count("20240102"), 0);
    assert_eq!(read_lines(&layout.list_records()).len(), 2);
}

#[tokio::test]
async fn test_abandoned_date_is_skipped_until_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listbydate"))
        .and(query_param("date", "20240101"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let mut config = create_test_config(&server);
    config.crawler.max_unit_failures = 2;
    let dates = range("20240101", "20240101");

    let first = run_list(&config, &layout, dates).await;
    assert_eq!(first.tally.failed, 1);

    let second = run_list(&config, &layout, dates).await;
    assert_eq!(second.tally.abandoned, 1);

    let third = run_list(&config, &layout, dates).await;
    assert_eq!(third.tally.skipped, 1);

    let mut crawler = ListCrawler::open(
        create_test_client(&config),
        &layout,
        config.crawler.clone(),
        CancellationToken::new(),
    )
    .unwrap();
    assert_eq!(crawler.retry_abandoned(), 1);
    let retried = crawler.run(dates).await.unwrap();
    assert_eq!(retried.tally.failed, 1);
}

#[tokio::test]
async fn test_cancelled_run_makes_no_requests() {
    let server = MockServer::start().await;
    mount_date(&server, "20240101", json!({"records": [{"title": "a"}]}), 0).await;

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut crawler = ListCrawler::open(
        create_test_client(&config),
        &layout,
        config.crawler.clone(),
        cancel,
    )
    .unwrap();
    let summary = crawler.run(range("20240101", "20240105")).await.unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.tally.completed, 0);
    assert!(layout.list_checkpoint().exists());
}

#[tokio::test]
async fn test_locked_directory_is_refused() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);

    let _held = RunLock::acquire(dir.path()).unwrap();
    let result = crawl_dates(
        &config,
        &create_test_client(&config),
        &layout,
        range("20240101", "20240101"),
        false,
        CancellationToken::new(),
    )
    .await;

    assert!(matches!(
        result,
        Err(HarvestError::Storage(StorageError::Locked { .. }))
    ));
}

#[tokio::test]
async fn test_detail_pass_fetches_each_pair_once() {
    let server = MockServer::start().await;
    for (unit, job) in [("A", "J1"), ("B", "J2")] {
        Mock::given(method("GET"))
            .and(path("/tender"))
            .and(query_param("unit_id", unit))
            .and(query_param("job_number", job))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"unit_id": unit, "job_number": job, "detail": true})),
            )
            .expect(1)
            .mount(&server)
            .await;
    }
    // Never listed, so never requested
    Mock::given(method("GET"))
        .and(path("/tender"))
        .and(query_param("unit_id", "X"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unit_id": "X"})))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);
    write_list_records(
        &layout,
        &[
            json!({"unit_id": "A", "job_number": "J1"}),
            json!({"unit_id": "A", "job_number": "J1", "_download_date": "20240102"}),
            json!({"unit_id": "B", "job_number": "J2"}),
            json!({"unit_id": "C"}),
        ],
    );

    let summary = run_details(&config, &layout).await;
    assert_eq!(summary.planned, 2);
    assert_eq!(summary.tally.completed, 2);
    assert_eq!(summary.tally.skipped, 1);

    let lines = read_lines(&layout.detail_records());
    let keys: Vec<&str> = lines
        .iter()
        .map(|r| r[DETAIL_KEY_FIELD].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["A_J1", "B_J2"]);

    let checkpoint = CheckpointStore::load(layout.detail_checkpoint()).unwrap();
    assert!(checkpoint.contains("A_J1"));
    assert!(checkpoint.contains("B_J2"));

    // Everything is checkpointed now
    let again = run_details(&config, &layout).await;
    assert_eq!(again.tally.completed, 0);
    assert_eq!(again.tally.skipped, 3);
}

#[tokio::test]
async fn test_detail_pass_skips_pairs_already_in_output() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tender"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"detail": true})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);
    write_list_records(
        &layout,
        &[
            json!({"unit_id": "A", "job_number": "J1"}),
            json!({"unit_id": "B", "job_number": "J2"}),
        ],
    );
    // Written before a crash that lost the checkpoint update
    fs::write(
        layout.detail_records(),
        format!("{}\n", json!({"_detail_key": "A_J1", "detail": true})),
    )
    .unwrap();

    let summary = run_details(&config, &layout).await;
    assert_eq!(summary.tally.completed, 1);
    assert_eq!(summary.tally.skipped, 1);
    assert_eq!(read_lines(&layout.detail_records()).len(), 2);
}

#[tokio::test]
async fn test_empty_detail_document_stays_pending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/tender"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);
    write_list_records(&layout, &[json!({"unit_id": "A", "job_number": "J1"})]);

    let summary = run_details(&config, &layout).await;
    assert_eq!(summary.tally.failed, 1);
    assert!(read_lines(&layout.detail_records()).is_empty());

    let checkpoint = CheckpointStore::load(layout.detail_checkpoint()).unwrap();
    assert!(!checkpoint.contains("A_J1"));
}

#[tokio::test]
async fn test_detail_pass_requires_list_output() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);

    let mut crawler = DetailCrawler::open(
        create_test_client(&config),
        &layout,
        config.crawler.clone(),
        CancellationToken::new(),
    )
    .unwrap();
    let result = crawler.run(&layout.list_records()).await;

    assert!(matches!(
        result,
        Err(HarvestError::Config(ConfigError::MissingInput(_)))
    ));
}

#[tokio::test]
async fn test_search_stops_at_first_empty_page() {
    let server = MockServer::start().await;
    for page in ["1", "2"] {
        Mock::given(method("GET"))
            .and(path("/searchbytitle"))
            .and(query_param("query", "bridge"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"records": [{"page": page, "n": 1}, {"page": page, "n": 2}]}),
            ))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/searchbytitle"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"records": []})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);

    let summary = crawl_search(
        &create_test_client(&config),
        &layout,
        SearchKind::Title,
        "bridge",
        10,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(summary.tally.completed, 2);
    assert_eq!(summary.tally.records, 4);
    assert_eq!(read_lines(&layout.search_records("bridge")).len(), 4);
}

#[tokio::test]
async fn test_list_cancelled_mid_run_checkpoints_what_was_written() {
    let server = MockServer::start().await;
    let cancel = CancellationToken::new();

    for date in ["20240101", "20240102"] {
        mount_date(&server, date, json!({"records": [{"title": date}]}), 1).await;
    }
    Mock::given(method("GET"))
        .and(path("/listbydate"))
        .and(query_param("date", "20240103"))
        .respond_with(CancelDuringRequest {
            cancel: cancel.clone(),
            body: json!({"records": [{"title": "20240103"}]}),
        })
        .expect(1)
        .mount(&server)
        .await;
    for date in ["20240104", "20240105", "20240106"] {
        mount_date(&server, date, json!({"records": [{"title": date}]}), 0).await;
    }

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);
    assert!(config.crawler.checkpoint_interval > 3);

    let mut crawler = ListCrawler::open(
        create_test_client(&config),
        &layout,
        config.crawler.clone(),
        cancel,
    )
    .unwrap();
    let summary = crawler.run(range("20240101", "20240106")).await.unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.tally.completed, 3);

    let checkpoint = CheckpointStore::load(layout.list_checkpoint()).unwrap();
    let written: BTreeSet<String> = read_lines(&layout.list_records())
        .iter()
        .map(|r| r[SOURCE_DATE_FIELD].as_str().unwrap().to_string())
        .collect();
    assert_eq!(checkpoint.completed_keys(), &written);
    assert_eq!(written.len(), 3);
}

#[tokio::test]
async fn test_detail_cancelled_mid_run_checkpoints_what_was_written() {
    let server = MockServer::start().await;
    let cancel = CancellationToken::new();

    for unit in ["A", "B"] {
        Mock::given(method("GET"))
            .and(path("/tender"))
            .and(query_param("unit_id", unit))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unit": unit})))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/tender"))
        .and(query_param("unit_id", "C"))
        .respond_with(CancelDuringRequest {
            cancel: cancel.clone(),
            body: json!({"unit": "C"}),
        })
        .expect(1)
        .mount(&server)
        .await;
    for unit in ["D", "E"] {
        Mock::given(method("GET"))
            .and(path("/tender"))
            .and(query_param("unit_id", unit))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unit": unit})))
            .expect(0)
            .mount(&server)
            .await;
    }

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);
    assert!(config.crawler.detail_batch_size > 3);
    let listed: Vec<Value> = ["A", "B", "C", "D", "E"]
        .iter()
        .map(|unit| json!({"unit_id": unit, "job_number": "J"}))
        .collect();
    write_list_records(&layout, &listed);

    let mut crawler = DetailCrawler::open(
        create_test_client(&config),
        &layout,
        config.crawler.clone(),
        cancel,
    )
    .unwrap();
    let summary = crawler.run(&layout.list_records()).await.unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.tally.completed, 3);

    let checkpoint = CheckpointStore::load(layout.detail_checkpoint()).unwrap();
    let written: BTreeSet<String> = read_lines(&layout.detail_records())
        .iter()
        .map(|r| r[DETAIL_KEY_FIELD].as_str().unwrap().to_string())
        .collect();
    assert_eq!(checkpoint.completed_keys(), &written);
    assert_eq!(
        written,
        ["A_J", "B_J", "C_J"].iter().map(|k| k.to_string()).collect()
    );
}

#[tokio::test]
async fn test_repeated_search_replaces_previous_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/searchbycompanyname"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"records": [{"n": 1}, {"n": 2}]})),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/searchbycompanyname"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let layout = OutputLayout::new(dir.path());
    let config = create_test_config(&server);
    let client = create_test_client(&config);

    for _ in 0..2 {
        let summary = crawl_search(
            &client,
            &layout,
            SearchKind::Company,
            "acme",
            5,
            CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(summary.tally.records, 2);
    }

    assert_eq!(read_lines(&layout.search_records("acme")).len(), 2);
}
