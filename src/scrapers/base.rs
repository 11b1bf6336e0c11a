use async_trait::async_trait;
use log::{error, info, warn};
use rand::Rng;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, RetryPolicy};
use crate::errors::{DataHubError, Result};

/// 一次 HTTP 请求的结果
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Seam between the retry logic and the network.
#[async_trait]
pub trait HttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
}

/// reqwest 实现
pub struct ReqwestClient {
    client: Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(DataHubError::RequestError)?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        // 交易所页面均为 UTF-8
        let bytes = response.bytes().await?;
        Ok(HttpResponse { status, body: decode_body(url, &bytes) })
    }
}

/// Decodes a response body as UTF-8, replacing invalid sequences with a warning.
fn decode_body(url: &str, bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(e) => {
            warn!("Response from {} is not valid UTF-8 ({}), invalid bytes replaced", url, e);
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Retrying fetcher shared by every source.
///
/// Exhausted retries are reported as `None`: callers skip that unit of work
/// rather than abort the run.
pub struct Transport {
    client: Arc<dyn HttpClient + Send + Sync>,
    policy: RetryPolicy,
}

impl Transport {
    pub fn new(client: Arc<dyn HttpClient + Send + Sync>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// 根据配置创建基于 reqwest 的传输层
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = ReqwestClient::new(config.request_timeout)?;
        Ok(Self::new(Arc::new(client), config.retry.clone()))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 获取页面文本
    pub async fn fetch_text(&self, url: &str) -> Option<String> {
        self.fetch_with(url, |body| Ok(body)).await
    }

    /// 获取并解析 JSON，解析失败同样触发重试
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Option<T> {
        self.fetch_with(url, |body| serde_json::from_str::<T>(&body).map_err(DataHubError::from))
            .await
    }

    async fn fetch_with<T, F>(&self, url: &str, decode: F) -> Option<T>
    where
        F: Fn(String) -> Result<T>,
    {
        let max = self.policy.max_retries;
        for attempt in 1..=max {
            match self.client.get(url).await {
                Ok(response) if response.is_success() => match decode(response.body) {
                    Ok(value) => {
                        info!("Fetched {} (attempt {}/{})", url, attempt, max);
                        return Some(value);
                    }
                    Err(e) => {
                        warn!("Failed to decode response from {} (attempt {}/{}): {}", url, attempt, max, e);
                    }
                },
                Ok(response) => {
                    let e = DataHubError::HttpStatus { status: response.status, url: url.to_string() };
                    warn!("Request failed (attempt {}/{}): {}", attempt, max, e);
                }
                Err(e) => {
                    warn!("Request to {} failed (attempt {}/{}): {}", url, attempt, max, e);
                }
            }

            if attempt < max {
                self.pause().await;
            }
        }

        error!("Giving up on {} after {} attempts", url, max);
        None
    }

    /// 随机等待 [min_delay, max_delay]，也用于回补时每个请求之间的限速
    pub async fn pause(&self) {
        let delay = jittered_delay(&self.policy);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Uniform draw from the policy's delay window.
pub fn jittered_delay(policy: &RetryPolicy) -> Duration {
    let min = u64::try_from(policy.min_delay.as_nanos()).unwrap_or(u64::MAX);
    let max = u64::try_from(policy.max_delay.as_nanos()).unwrap_or(u64::MAX);
    if max <= min {
        return policy.min_delay;
    }
    Duration::from_nanos(rand::thread_rng().gen_range(min..=max))
}
