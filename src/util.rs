use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::errors::{DataHubError, Result};

/// 民国年与西元年的差值
pub const ROC_YEAR_OFFSET: i32 = 1911;

pub fn to_gregorian_year(roc_year: i32) -> i32 {
    roc_year + ROC_YEAR_OFFSET
}

/// 解析民国日期，如 `113/09/30` -> 2024-09-30
pub fn parse_roc_date(date_str: &str) -> Result<NaiveDate> {
    let parts: Vec<&str> = date_str.trim().split(['/', '-']).collect();
    if parts.len() != 3 {
        return Err(DataHubError::DateError(format!("Invalid ROC date: {}", date_str)));
    }

    let parse_part = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|e| DataHubError::DateError(format!("Invalid ROC date {}: {}", date_str, e)))
    };
    let year = to_gregorian_year(parse_part(parts[0])? as i32);
    let month = parse_part(parts[1])?;
    let day = parse_part(parts[2])?;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| DataHubError::DateError(format!("Invalid ROC date: {}", date_str)))
}

/// Parses the date encodings seen across the exchanges and older dataset files:
/// `2024-10-25`, `2024/10/25`, `20241025`, `2024-10-25 00:00:00` and ROC `113/10/25`.
pub fn parse_market_date(date_str: &str) -> Result<NaiveDate> {
    let text = date_str.trim();
    // 丢弃时间部分
    let text = text.split_whitespace().next().unwrap_or_default();
    if text.is_empty() {
        return Err(DataHubError::DateError("Empty date".to_string()));
    }

    // 民国年最多三位数，需在西元格式之前判断
    let year_part = text.split(['/', '-']).next().unwrap_or_default();
    if (1..=3).contains(&year_part.len()) {
        return parse_roc_date(text);
    }

    for format in ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Ok(date);
        }
    }

    Err(DataHubError::DateError(format!("Unrecognized date: {}", date_str)))
}

/// 解析带千分位的数字，如 `-1,234,567.89`、`+12.5`
pub fn parse_decimal(value: &str) -> Result<Decimal> {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if cleaned.is_empty() || cleaned == "-" || cleaned == "--" {
        return Err(DataHubError::NumberError(format!("Not a number: {:?}", value)));
    }

    Decimal::from_str(cleaned)
        .map_err(|e| DataHubError::NumberError(format!("Not a number {:?}: {}", value, e)))
}

/// `YYYYMMDD`，交易所查询参数使用的格式
pub fn format_query_date(date: &NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// 起止日期之间（含两端）的每一天
pub fn days_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|d| *d <= end).collect()
}

/// 起止日期覆盖的每个月的首日
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let mut current = first_of_month(start);
    while current <= end {
        months.push(current);
        current = match current.checked_add_months(chrono::Months::new(1)) {
            Some(next) => next,
            None => break,
        };
    }
    months
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// serde helpers for the canonical `YYYY-MM-DD` dataset column
pub mod serde_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_market_date(&text).map_err(serde::de::Error::custom)
    }
}

/// serde helpers for amounts written without thousands separators
pub mod serde_decimal {
    use rust_decimal::Decimal;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_decimal(&text).map_err(serde::de::Error::custom)
    }
}
