use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{DataHubError, Result};
use crate::models::market::Dataset;

/// 重试与限速策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts, used by tests and dry runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(DataHubError::ConfigError("max_retries must be at least 1".to_string()));
        }
        if self.min_delay > self.max_delay {
            return Err(DataHubError::ConfigError(format!(
                "min_delay {:?} is greater than max_delay {:?}",
                self.min_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

/// 数据源地址
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub fund_url: String,
    pub index_url: String,
    pub futures_url: String,
    pub options_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            fund_url: "https://www.twse.com.tw/rwd/zh/fund/BFI82U".to_string(),
            index_url: "https://www.twse.com.tw/rwd/zh/afterTrading/FMTQIK".to_string(),
            futures_url: "https://www.taifex.com.tw/cht/3/futContractsDate".to_string(),
            options_url: "https://www.taifex.com.tw/cht/3/optContractsDate".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub endpoints: Endpoints,
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            endpoints: Endpoints::default(),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 数据集文件路径
    pub fn dataset_path(&self, dataset: Dataset) -> PathBuf {
        self.data_dir.join(dataset.file_name())
    }

    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        if self.request_timeout.is_zero() {
            return Err(DataHubError::ConfigError("request_timeout must be positive".to_string()));
        }
        Ok(())
    }
}
