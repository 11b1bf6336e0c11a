use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::hash::Hash;

use crate::util::{serde_date, serde_decimal};

/// 四个数据集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    /// 三大法人买卖金额
    Fund,
    /// 大盘成交与加权指数
    Index,
    /// 台指期货未平仓
    Futures,
    /// 选择权未平仓
    Options,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [Dataset::Fund, Dataset::Index, Dataset::Futures, Dataset::Options];

    pub fn file_name(&self) -> &'static str {
        match self {
            Dataset::Fund => "tx_fund_data.csv",
            Dataset::Index => "tx_closed_data.csv",
            Dataset::Futures => "txf_data.csv",
            Dataset::Options => "txop_data.csv",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Dataset::Fund => "fund",
            Dataset::Index => "twse",
            Dataset::Futures => "txf",
            Dataset::Options => "txop",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A row of one of the persisted datasets.
///
/// `key` identifies the row for upserts; `sort_key` gives the stored order,
/// which always starts with the date so that one date's rows are contiguous.
pub trait Record: Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug {
    type Key: Eq + Hash + Clone + fmt::Debug;
    type SortKey: Ord;

    const DATASET: Dataset;

    fn date(&self) -> NaiveDate;
    fn key(&self) -> Self::Key;
    fn sort_key(&self) -> Self::SortKey;
}

/// 三大法人单位名称，按交易所公布顺序
pub const UNIT_ORDER: [&str; 6] = [
    "自營商(自行買賣)",
    "自營商(避險)",
    "投信",
    "外資及陸資(不含外資自營商)",
    "外資自營商",
    "合計",
];

pub const UNIT_TOTAL: &str = "合計";

/// 期货/选择权身份别
pub const IDENTITY_ORDER: [&str; 3] = ["自營商", "投信", "外資"];

pub const FUTURES_PRODUCT: &str = "臺股期貨";
pub const OPTIONS_PRODUCT: &str = "選擇權";

fn rank_of(order: &[&str], name: &str) -> usize {
    order.iter().position(|n| *n == name).unwrap_or(order.len())
}

/// Older pages labelled foreign investors "外資及陸資"; the datasets use "外資".
pub fn normalize_identity(identity: &str) -> String {
    match identity.trim() {
        "外資及陸資" => "外資".to_string(),
        other => other.to_string(),
    }
}

fn deserialize_identity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let text = String::deserialize(deserializer)?;
    Ok(normalize_identity(&text))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionalTrade {
    #[serde(rename = "日期", with = "serde_date")]
    pub date: NaiveDate,
    #[serde(rename = "單位名稱")]
    pub unit_name: String,
    #[serde(rename = "買進金額", with = "serde_decimal")]
    pub buy_amount: Decimal,
    #[serde(rename = "賣出金額", with = "serde_decimal")]
    pub sell_amount: Decimal,
    #[serde(rename = "買賣差額", with = "serde_decimal")]
    pub net_amount: Decimal,
}

impl Record for InstitutionalTrade {
    type Key = (NaiveDate, String);
    type SortKey = (NaiveDate, usize, String);

    const DATASET: Dataset = Dataset::Fund;

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn key(&self) -> Self::Key {
        (self.date, self.unit_name.clone())
    }

    fn sort_key(&self) -> Self::SortKey {
        (self.date, rank_of(&UNIT_ORDER, &self.unit_name), self.unit_name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDaily {
    #[serde(rename = "日期", with = "serde_date")]
    pub date: NaiveDate,
    #[serde(rename = "成交金額", with = "serde_decimal")]
    pub traded_value: Decimal,
    #[serde(rename = "加權指數", with = "serde_decimal")]
    pub weighted_index: Decimal,
    #[serde(rename = "漲跌點數", with = "serde_decimal")]
    pub index_change: Decimal,
}

impl Record for IndexDaily {
    type Key = NaiveDate;
    type SortKey = NaiveDate;

    const DATASET: Dataset = Dataset::Index;

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn key(&self) -> Self::Key {
        self.date
    }

    fn sort_key(&self) -> Self::SortKey {
        self.date
    }
}

/// 期货与选择权三大法人未平仓，两个数据集共用同一结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenInterest {
    #[serde(rename = "日期", with = "serde_date")]
    pub date: NaiveDate,
    #[serde(rename = "商品名稱")]
    pub product_name: String,
    #[serde(rename = "身份別", deserialize_with = "deserialize_identity")]
    pub identity: String,
    #[serde(rename = "多方交易口數", with = "serde_decimal")]
    pub long_volume: Decimal,
    #[serde(rename = "多方交易契約金額(千元)", with = "serde_decimal")]
    pub long_value: Decimal,
    #[serde(rename = "空方交易口數", with = "serde_decimal")]
    pub short_volume: Decimal,
    #[serde(rename = "空方交易契約金額(千元)", with = "serde_decimal")]
    pub short_value: Decimal,
    #[serde(rename = "多空交易口數淨額", with = "serde_decimal")]
    pub net_volume: Decimal,
    #[serde(rename = "多空交易契約金額淨額(千元)", with = "serde_decimal")]
    pub net_value: Decimal,
    #[serde(rename = "多方未平倉口數", with = "serde_decimal")]
    pub long_oi: Decimal,
    #[serde(rename = "多方未平倉契約金額(千元)", with = "serde_decimal")]
    pub long_oi_value: Decimal,
    #[serde(rename = "空方未平倉口數", with = "serde_decimal")]
    pub short_oi: Decimal,
    #[serde(rename = "空方未平倉契約金額(千元)", with = "serde_decimal")]
    pub short_oi_value: Decimal,
    #[serde(rename = "多空未平倉口數淨額", with = "serde_decimal")]
    pub net_oi: Decimal,
    #[serde(rename = "多空未平倉契約金額淨額(千元)", with = "serde_decimal")]
    pub net_oi_value: Decimal,
}

/// Number of numeric columns following the identity cell on the TAIFEX pages.
pub const OPEN_INTEREST_VALUES: usize = 12;

impl OpenInterest {
    /// Builds a row from the twelve numeric cells in page order.
    pub fn from_values(
        date: NaiveDate,
        product_name: &str,
        identity: &str,
        values: [Decimal; OPEN_INTEREST_VALUES],
    ) -> Self {
        let [long_volume, long_value, short_volume, short_value, net_volume, net_value, long_oi, long_oi_value, short_oi, short_oi_value, net_oi, net_oi_value] =
            values;
        Self {
            date,
            product_name: product_name.to_string(),
            identity: normalize_identity(identity),
            long_volume,
            long_value,
            short_volume,
            short_value,
            net_volume,
            net_value,
            long_oi,
            long_oi_value,
            short_oi,
            short_oi_value,
            net_oi,
            net_oi_value,
        }
    }
}

/// Futures rows live in their own file; the wrapper gives them a distinct `Record` impl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FuturesOpenInterest(pub OpenInterest);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionsOpenInterest(pub OpenInterest);

macro_rules! open_interest_record {
    ($ty:ty, $dataset:expr) => {
        impl Record for $ty {
            type Key = (NaiveDate, String, String);
            type SortKey = (NaiveDate, String, usize, String);

            const DATASET: Dataset = $dataset;

            fn date(&self) -> NaiveDate {
                self.0.date
            }

            fn key(&self) -> Self::Key {
                (self.0.date, self.0.product_name.clone(), self.0.identity.clone())
            }

            fn sort_key(&self) -> Self::SortKey {
                (
                    self.0.date,
                    self.0.product_name.clone(),
                    rank_of(&IDENTITY_ORDER, &self.0.identity),
                    self.0.identity.clone(),
                )
            }
        }
    };
}

open_interest_record!(FuturesOpenInterest, Dataset::Futures);
open_interest_record!(OptionsOpenInterest, Dataset::Options);

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(unit: &str) -> InstitutionalTrade {
        InstitutionalTrade {
            date: NaiveDate::from_ymd_opt(2024, 10, 25).unwrap(),
            unit_name: unit.to_string(),
            buy_amount: Decimal::ZERO,
            sell_amount: Decimal::ZERO,
            net_amount: Decimal::ZERO,
        }
    }

    #[test]
    fn units_sort_in_exchange_order_with_total_last() {
        let mut rows: Vec<_> = ["合計", "投信", "未知單位", "自營商(自行買賣)"]
            .iter()
            .map(|u| trade(u))
            .collect();
        rows.sort_by_key(|r| r.sort_key());
        let names: Vec<_> = rows.iter().map(|r| r.unit_name.as_str()).collect();
        assert_eq!(names, vec!["自營商(自行買賣)", "投信", "合計", "未知單位"]);
    }

    #[test]
    fn legacy_foreign_identity_is_normalized() {
        assert_eq!(normalize_identity(" 外資及陸資 "), "外資");
        assert_eq!(normalize_identity("投信"), "投信");
    }
}
