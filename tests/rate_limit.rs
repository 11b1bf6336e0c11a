mod common;

use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use common::*;
use twmarket_datahub::config::RetryPolicy;
use twmarket_datahub::scrapers::base::Transport;
use twmarket_datahub::services::data_service::DataService;

fn fixed_delay(max_retries: u32, secs: u64) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        min_delay: Duration::from_secs(secs),
        max_delay: Duration::from_secs(secs),
    }
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[tokio::test(start_paused = true)]
async fn waits_between_attempts_but_not_after_the_last() {
    let client = Arc::new(ScriptedClient::new().route(FUND_URL, vec![status(503)]));
    let transport = Transport::new(client.clone(), fixed_delay(3, 4));

    let start = Instant::now();
    assert!(transport.fetch_text(FUND_URL).await.is_none());
    let elapsed = start.elapsed();

    assert_eq!(client.calls(FUND_URL), 3);
    assert!(elapsed >= Duration::from_secs(8), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(12), "{:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn first_attempt_success_does_not_wait() {
    let client = Arc::new(ScriptedClient::new().route(FUND_URL, vec![ok("{}")]));
    let transport = Transport::new(client, fixed_delay(3, 4));

    let start = Instant::now();
    assert!(transport.fetch_text(FUND_URL).await.is_some());
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn backfill_paces_every_request() {
    let dir = tempfile::tempdir().unwrap();
    let policy = fixed_delay(3, 2);
    let config = test_config(dir.path()).with_retry(policy.clone());
    let client = Arc::new(healthy_client());
    let service = DataService::new(config, Transport::new(client.clone(), policy));

    let start = Instant::now();
    service
        .run_backfill(day(2024, 9, 30), day(2024, 10, 2))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    // 三天 fund 两次间隔，两个数据源之间一次，两个月 index 一次
    assert_eq!(client.calls(FUND_URL), 3);
    assert_eq!(client.calls(INDEX_URL), 2);
    assert!(elapsed >= Duration::from_secs(8), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(10), "{:?}", elapsed);
}
