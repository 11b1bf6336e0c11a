#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use twmarket_datahub::config::{Config, Endpoints, RetryPolicy};
use twmarket_datahub::errors::{DataHubError, Result};
use twmarket_datahub::scrapers::base::{HttpClient, HttpResponse, Transport};
use twmarket_datahub::services::data_service::DataService;

pub const FUND_URL: &str = "http://twse.test/rwd/zh/fund/BFI82U";
pub const INDEX_URL: &str = "http://twse.test/rwd/zh/afterTrading/FMTQIK";
pub const FUTURES_URL: &str = "http://taifex.test/cht/3/futContractsDate";
pub const OPTIONS_URL: &str = "http://taifex.test/cht/3/optContractsDate";

pub fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
    std::fs::read_to_string(path).unwrap()
}

/// One scripted reply; `None` simulates a connection error.
pub type Reply = Option<HttpResponse>;

pub fn ok(body: impl Into<String>) -> Reply {
    Some(HttpResponse { status: 200, body: body.into() })
}

pub fn status(code: u16) -> Reply {
    Some(HttpResponse { status: code, body: String::new() })
}

pub fn connection_error() -> Reply {
    None
}

/// Replies are matched by URL prefix. The last reply of a queue is repeated
/// once the queue is drained; an unknown URL behaves like a refused connection.
#[derive(Default)]
pub struct ScriptedClient {
    routes: Mutex<Vec<(String, VecDeque<Reply>)>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, prefix: &str, replies: Vec<Reply>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .push((prefix.to_string(), replies.into_iter().collect()));
        self
    }

    /// 以前缀统计请求次数
    pub fn calls(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(url, _)| url.starts_with(prefix))
            .map(|(_, n)| *n)
            .sum()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.calls.lock().unwrap().keys().cloned().collect();
        urls.sort();
        urls
    }
}

#[async_trait]
impl HttpClient for ScriptedClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;

        let mut routes = self.routes.lock().unwrap();
        let reply = routes
            .iter_mut()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .and_then(|(_, queue)| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            })
            .flatten();

        reply.ok_or_else(|| DataHubError::DataError(format!("connection refused: {}", url)))
    }
}

pub fn test_config(data_dir: &Path) -> Config {
    Config::new()
        .with_data_dir(data_dir)
        .with_retry(RetryPolicy::immediate(3))
        .with_endpoints(Endpoints {
            fund_url: FUND_URL.to_string(),
            index_url: INDEX_URL.to_string(),
            futures_url: FUTURES_URL.to_string(),
            options_url: OPTIONS_URL.to_string(),
        })
}

pub fn service(data_dir: &Path, client: Arc<ScriptedClient>) -> DataService {
    let config = test_config(data_dir);
    let transport = Transport::new(client, config.retry.clone());
    DataService::new(config, transport)
}

/// Client answering every endpoint with the bundled fixtures.
pub fn healthy_client() -> ScriptedClient {
    ScriptedClient::new()
        .route(FUND_URL, vec![ok(fixture("BFI82U.json"))])
        .route(INDEX_URL, vec![ok(fixture("FMTQIK.json"))])
        .route(FUTURES_URL, vec![ok(fixture("futContractsDate.html"))])
        .route(OPTIONS_URL, vec![ok(fixture("optContractsDate.html"))])
}
