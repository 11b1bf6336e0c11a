//! 台湾证券交易所 (TWSE) JSON 接口：三大法人买卖金额 (BFI82U) 与大盘成交 (FMTQIK)

use chrono::NaiveDate;
use log::{debug, warn};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::models::market::{IndexDaily, InstitutionalTrade};
use crate::util;

/// TWSE rwd 接口的通用回应
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwseResponse {
    pub stat: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default)]
    pub data: Option<Vec<Vec<Value>>>,
}

impl TwseResponse {
    pub fn is_ok(&self) -> bool {
        self.stat.trim().eq_ignore_ascii_case("OK")
    }
}

pub fn fund_url(base: &str, date: &NaiveDate) -> String {
    format!("{}?type=day&dayDate={}&response=json", base, util::format_query_date(date))
}

pub fn index_url(base: &str, month: &NaiveDate) -> String {
    let first = util::first_of_month(*month);
    format!("{}?date={}&response=json", base, util::format_query_date(&first))
}

fn cell_text(cell: &Value) -> Option<String> {
    match cell {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn cell_decimal(row: &[Value], position: usize) -> Option<Decimal> {
    row.get(position)
        .and_then(cell_text)
        .and_then(|text| util::parse_decimal(&text).ok())
}

/// Maps a BFI82U payload to institutional rows, tagged with the requested date.
pub fn extract_institutional(response: &TwseResponse, date: NaiveDate) -> Vec<InstitutionalTrade> {
    if !response.is_ok() {
        warn!("No institutional data for {}: {}", date, response.stat);
        return Vec::new();
    }

    let Some(rows) = response.data.as_ref() else {
        warn!("Institutional payload for {} has no data array", date);
        return Vec::new();
    };

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let unit_name = row.first().and_then(cell_text);
        let amounts = (cell_decimal(row, 1), cell_decimal(row, 2), cell_decimal(row, 3));
        match (unit_name, amounts) {
            (Some(unit_name), (Some(buy_amount), Some(sell_amount), Some(net_amount))) if !unit_name.is_empty() => {
                records.push(InstitutionalTrade {
                    date,
                    unit_name,
                    buy_amount,
                    sell_amount,
                    net_amount,
                });
            }
            _ => warn!("Skipping malformed institutional row for {}: {:?}", date, row),
        }
    }

    debug!("Extracted {} institutional rows for {}", records.len(), date);
    records
}

/// 大盘成交的栏位位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexColumns {
    pub date: usize,
    pub traded_value: usize,
    pub weighted_index: usize,
    pub index_change: usize,
}

impl Default for IndexColumns {
    /// FMTQIK: 日期, 成交股數, 成交金額, 成交筆數, 發行量加權股價指數, 漲跌點數
    fn default() -> Self {
        Self {
            date: 0,
            traded_value: 2,
            weighted_index: 4,
            index_change: 5,
        }
    }
}

impl IndexColumns {
    /// Looks each column up by its header label, keeping the fixed position
    /// when the payload carries no `fields` or the label is missing.
    pub fn resolve(fields: Option<&[String]>) -> Self {
        let defaults = Self::default();
        let Some(fields) = fields else {
            return defaults;
        };
        let find = |label: &str, fallback: usize| {
            fields
                .iter()
                .position(|f| f.trim() == label)
                .unwrap_or(fallback)
        };

        Self {
            date: find("日期", defaults.date),
            traded_value: find("成交金額", defaults.traded_value),
            weighted_index: find("發行量加權股價指數", defaults.weighted_index),
            index_change: find("漲跌點數", defaults.index_change),
        }
    }
}

/// Maps an FMTQIK payload (one month) to daily index rows.
pub fn extract_index(response: &TwseResponse) -> Vec<IndexDaily> {
    if !response.is_ok() {
        warn!("No index data: {}", response.stat);
        return Vec::new();
    }

    let Some(rows) = response.data.as_ref() else {
        warn!("Index payload has no data array");
        return Vec::new();
    };

    let columns = IndexColumns::resolve(response.fields.as_deref());
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let date = row
            .get(columns.date)
            .and_then(cell_text)
            .and_then(|text| util::parse_roc_date(&text).ok());
        let values = (
            cell_decimal(row, columns.traded_value),
            cell_decimal(row, columns.weighted_index),
            cell_decimal(row, columns.index_change),
        );
        match (date, values) {
            (Some(date), (Some(traded_value), Some(weighted_index), Some(index_change))) => {
                records.push(IndexDaily {
                    date,
                    traded_value,
                    weighted_index,
                    index_change,
                });
            }
            _ => warn!("Skipping malformed index row: {:?}", row),
        }
    }

    debug!("Extracted {} index rows", records.len());
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn response(value: Value) -> TwseResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn urls_use_query_formats() {
        let date = ymd(2024, 10, 25);
        assert_eq!(
            fund_url("https://example.test/BFI82U", &date),
            "https://example.test/BFI82U?type=day&dayDate=20241025&response=json"
        );
        assert_eq!(
            index_url("https://example.test/FMTQIK", &date),
            "https://example.test/FMTQIK?date=20241001&response=json"
        );
    }

    #[test]
    fn institutional_rows_carry_requested_date() {
        let payload = response(json!({
            "stat": "OK",
            "date": "20241024",
            "fields": ["單位名稱", "買進金額", "賣出金額", "買賣差額"],
            "data": [
                ["自營商(自行買賣)", "1,000", "400", "600"],
                ["投信", "2,500,000", "3,000,000", "-500,000"],
                ["合計", "2,501,000", "3,000,400", "-499,400"]
            ]
        }));

        let rows = extract_institutional(&payload, ymd(2024, 10, 25));
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.date == ymd(2024, 10, 25)));
        assert_eq!(rows[1].unit_name, "投信");
        assert_eq!(rows[1].net_amount, Decimal::from(-500_000));
    }

    #[test]
    fn institutional_non_ok_status_yields_nothing() {
        let payload = response(json!({ "stat": "很抱歉，沒有符合條件的資料!" }));
        assert!(extract_institutional(&payload, ymd(2024, 10, 26)).is_empty());
    }

    #[test]
    fn index_rows_convert_roc_dates_and_use_traded_value_column() {
        let payload = response(json!({
            "stat": "OK",
            "fields": ["日期", "成交股數", "成交金額", "成交筆數", "發行量加權股價指數", "漲跌點數"],
            "data": [
                ["113/09/30", "7,015,389,254", "414,386,493,584", "3,043,558", "22,224.53", "-278.80"],
                ["113/09/27", "5,979,002,109", "325,778,043,410", "2,518,052", "22,503.33", "+114.24"]
            ]
        }));

        let rows = extract_index(&payload);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, ymd(2024, 9, 30));
        assert_eq!(rows[0].traded_value, Decimal::from(414_386_493_584_i64));
        assert_eq!(rows[0].weighted_index.to_string(), "22224.53");
        assert_eq!(rows[1].index_change.to_string(), "114.24");
    }

    #[test]
    fn index_columns_follow_reordered_headers() {
        let fields: Vec<String> = ["日期", "成交金額", "成交股數", "漲跌點數", "發行量加權股價指數"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let columns = IndexColumns::resolve(Some(&fields));
        assert_eq!(columns.traded_value, 1);
        assert_eq!(columns.index_change, 3);
        assert_eq!(columns.weighted_index, 4);
        assert_eq!(IndexColumns::resolve(None), IndexColumns::default());
    }

    #[test]
    fn malformed_index_rows_are_skipped() {
        let payload = response(json!({
            "stat": "OK",
            "data": [
                ["not-a-date", "1", "2", "3", "4", "5"],
                ["113/10/01", "1", "2"],
                ["113/10/02", "1", "200", "3", "22,000.00", "0.00"]
            ]
        }));
        let rows = extract_index(&payload);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, ymd(2024, 10, 2));
    }
}
