// 公开导出的模块，供外部使用
pub mod models;
pub mod data_provider;
pub mod errors;
pub mod config;
pub mod scrapers;
pub mod services;
pub mod util;

// 重新导出常用类型，方便使用
pub use config::{Config, RetryPolicy};
pub use data_provider::{DatasetStore, WriterLock};
pub use errors::{DataHubError, Result};
pub use models::market::{Dataset, Record};
pub use services::data_service::{DataService, RunSummary, SourceOutcome};
