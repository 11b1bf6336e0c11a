use chrono::NaiveDate;
use log::{error, info, warn};
use std::fmt;

use crate::config::Config;
use crate::data_provider::{DatasetStore, WriterLock};
use crate::errors::{DataHubError, Result};
use crate::models::market::{
    Dataset, FuturesOpenInterest, IndexDaily, InstitutionalTrade, OpenInterest, OptionsOpenInterest,
    Record, FUTURES_PRODUCT, OPTIONS_PRODUCT,
};
use crate::scrapers::base::Transport;
use crate::scrapers::taifex::{self, TableSchema};
use crate::scrapers::twse::{self, TwseResponse};
use crate::util;

/// 单个数据源在一次运行中的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Updated { inserted: usize, replaced: usize },
    /// 抓到了数据，但与现有文件一致
    Unchanged,
    /// No data this run: retries exhausted or nothing extracted.
    Skipped(String),
    /// The dataset could not be merged; the file was left as it was.
    Failed(String),
}

impl fmt::Display for SourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceOutcome::Updated { inserted, replaced } => {
                write!(f, "updated ({} inserted, {} replaced)", inserted, replaced)
            }
            SourceOutcome::Unchanged => f.write_str("unchanged"),
            SourceOutcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            SourceOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Per-source outcomes of one engine invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub outcomes: Vec<(Dataset, SourceOutcome)>,
}

impl RunSummary {
    pub fn record(&mut self, dataset: Dataset, outcome: SourceOutcome) {
        info!("{}: {}", dataset, outcome);
        self.outcomes.push((dataset, outcome));
    }

    pub fn get(&self, dataset: Dataset) -> Option<&SourceOutcome> {
        self.outcomes
            .iter()
            .find(|(d, _)| *d == dataset)
            .map(|(_, outcome)| outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|(_, outcome)| matches!(outcome, SourceOutcome::Failed(_)))
    }

    pub fn total_inserted(&self) -> usize {
        self.outcomes
            .iter()
            .map(|(_, outcome)| match outcome {
                SourceOutcome::Updated { inserted, .. } => *inserted,
                _ => 0,
            })
            .sum()
    }
}

/// 数据服务：抓取、解析、合并并写入四个数据集
pub struct DataService {
    config: Config,
    transport: Transport,
    table_schema: TableSchema,
}

impl DataService {
    pub fn new(config: Config, transport: Transport) -> Self {
        Self {
            config,
            transport,
            table_schema: TableSchema::default(),
        }
    }

    pub fn with_table_schema(mut self, schema: TableSchema) -> Self {
        self.table_schema = schema;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 每日增量更新：当日三大法人、当月大盘、最新期货与选择权
    pub async fn run_incremental(&self, today: NaiveDate) -> Result<RunSummary> {
        let _lock = WriterLock::acquire(&self.config.data_dir)?;
        info!("Start update {}", today);

        let mut summary = RunSummary::default();
        summary.record(Dataset::Fund, self.update_fund(&[today]).await);
        summary.record(Dataset::Index, self.update_index(&[util::first_of_month(today)]).await);
        summary.record(Dataset::Futures, self.update_futures().await);
        summary.record(Dataset::Options, self.update_options().await);

        info!("End update {}", today);
        Ok(summary)
    }

    /// Fetches institutional data day by day and index data month by month
    /// for `start..=end`, then merges each dataset once.
    pub async fn run_backfill(&self, start: NaiveDate, end: NaiveDate) -> Result<RunSummary> {
        if start > end {
            return Err(DataHubError::ConfigError(format!(
                "backfill start {} is after end {}",
                start, end
            )));
        }
        let _lock = WriterLock::acquire(&self.config.data_dir)?;
        info!("Start backfill {} ~ {}", start, end);

        let mut summary = RunSummary::default();
        let days = util::days_between(start, end);
        summary.record(Dataset::Fund, self.update_fund(&days).await);
        // 两个数据源之间同样限速
        self.transport.pause().await;
        let months = util::months_between(start, end);
        summary.record(Dataset::Index, self.update_index(&months).await);

        info!("End backfill {} ~ {}", start, end);
        Ok(summary)
    }

    /// 三大法人买卖金额，每个日期一次请求
    pub async fn update_fund(&self, dates: &[NaiveDate]) -> SourceOutcome {
        let mut records = Vec::new();
        for (i, date) in dates.iter().enumerate() {
            if i > 0 {
                self.transport.pause().await;
            }
            let url = twse::fund_url(&self.config.endpoints.fund_url, date);
            match self.transport.fetch_json::<TwseResponse>(&url).await {
                Some(response) => records.extend(twse::extract_institutional(&response, *date)),
                None => warn!("Skipping institutional data for {}", date),
            }
        }

        self.store_records::<InstitutionalTrade>(records)
    }

    /// 大盘成交，每个月份一次请求
    pub async fn update_index(&self, months: &[NaiveDate]) -> SourceOutcome {
        let mut records = Vec::new();
        for (i, month) in months.iter().enumerate() {
            if i > 0 {
                self.transport.pause().await;
            }
            let url = twse::index_url(&self.config.endpoints.index_url, month);
            match self.transport.fetch_json::<TwseResponse>(&url).await {
                Some(response) => records.extend(twse::extract_index(&response)),
                None => warn!("Skipping index data for {}", month.format("%Y-%m")),
            }
        }

        self.store_records::<IndexDaily>(records)
    }

    pub async fn update_futures(&self) -> SourceOutcome {
        let records = self
            .fetch_open_interest(&self.config.endpoints.futures_url, FUTURES_PRODUCT)
            .await
            .into_iter()
            .map(FuturesOpenInterest)
            .collect();
        self.store_records::<FuturesOpenInterest>(records)
    }

    pub async fn update_options(&self) -> SourceOutcome {
        let records = self
            .fetch_open_interest(&self.config.endpoints.options_url, OPTIONS_PRODUCT)
            .await
            .into_iter()
            .map(OptionsOpenInterest)
            .collect();
        self.store_records::<OptionsOpenInterest>(records)
    }

    async fn fetch_open_interest(&self, url: &str, product_name: &str) -> Vec<OpenInterest> {
        match self.transport.fetch_text(url).await {
            Some(html) => taifex::extract(&html, &self.table_schema, product_name),
            None => {
                warn!("Skipping {} page", product_name);
                Vec::new()
            }
        }
    }

    fn store_records<R: Record>(&self, records: Vec<R>) -> SourceOutcome {
        if records.is_empty() {
            return SourceOutcome::Skipped("no data fetched".to_string());
        }

        let store = DatasetStore::<R>::open(&self.config);
        match store.upsert(records) {
            Ok(stats) if stats.is_unchanged() => SourceOutcome::Unchanged,
            Ok(stats) => SourceOutcome::Updated {
                inserted: stats.inserted,
                replaced: stats.replaced,
            },
            Err(e) => {
                error!("Failed to update {}: {}", R::DATASET, e);
                SourceOutcome::Failed(e.to_string())
            }
        }
    }
}
