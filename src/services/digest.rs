//! 每日市场摘要，读取各数据集最新日期的资料并生成文字报告

use log::{error, info, warn};
use rust_decimal::Decimal;
use std::fmt::Write;

use crate::config::Config;
use crate::data_provider::DatasetStore;
use crate::errors::Result;
use crate::models::market::{
    FuturesOpenInterest, IndexDaily, InstitutionalTrade, OpenInterest, OptionsOpenInterest, Record,
    FUTURES_PRODUCT, OPTIONS_PRODUCT, UNIT_ORDER, UNIT_TOTAL,
};

pub const EMPTY_REPORT: &str = "無可用的最新數據。";

/// 报告中列出的身份别及顺序
const REPORT_IDENTITIES: [&str; 3] = ["投信", "自營商", "外資"];

/// 元 -> 亿元，保留两位小数
fn to_yi(amount: Decimal) -> String {
    let yi = (amount / Decimal::from(100_000_000)).round_dp(2);
    format!("{:.2}", yi)
}

fn signed(value: Decimal) -> String {
    if value.is_sign_negative() && !value.is_zero() {
        value.to_string()
    } else {
        format!("+{}", value)
    }
}

fn buy_or_sell(net: Decimal) -> &'static str {
    if net.is_sign_negative() && !net.is_zero() {
        "賣超"
    } else {
        "買超"
    }
}

/// Latest-date rows of a dataset, or `None` (logged) when the file is absent or unreadable.
fn latest<R: Record>(config: &Config, report: &mut String) -> Option<Vec<R>> {
    let store = DatasetStore::<R>::open(config);
    if !store.exists() {
        warn!("{} not found, skipping {} section", store.path().display(), R::DATASET);
        return None;
    }

    let rows: Result<Vec<R>> = store.latest_slice();
    match rows {
        Ok(rows) if rows.is_empty() => None,
        Ok(rows) => Some(rows),
        Err(e) => {
            error!("Failed to read {}: {}", store.path().display(), e);
            let _ = writeln!(report, "讀取資料時發生錯誤: {}\n", e);
            None
        }
    }
}

pub fn render_index(rows: &[IndexDaily]) -> String {
    let mut out = String::new();
    if let Some(row) = rows.last() {
        let _ = writeln!(out, "日期: {}", row.date.format("%Y-%m-%d"));
        let _ = writeln!(out, "加權指數: {}", row.weighted_index);
        let _ = writeln!(out, "漲跌點數: {}", row.index_change);
        let _ = writeln!(out, "成交金額: {} 億元", to_yi(row.traded_value));
        out.push('\n');
    }
    out
}

/// Expects the rows of one date; uses the last six (one per unit).
pub fn render_fund(rows: &[InstitutionalTrade]) -> String {
    let mut out = String::new();
    let Some(first) = rows.first() else {
        return out;
    };

    let _ = writeln!(out, "日期: {}", first.date.format("%Y-%m-%d"));
    let start = rows.len().saturating_sub(UNIT_ORDER.len());
    for row in &rows[start..] {
        let _ = writeln!(
            out,
            "{}: {} 億元 ({})",
            row.unit_name,
            to_yi(row.net_amount),
            buy_or_sell(row.net_amount)
        );
    }

    if let Some(total) = rows.iter().find(|r| r.unit_name == UNIT_TOTAL) {
        let _ = writeln!(
            out,
            "總合計: {} 億元 ({})",
            to_yi(total.net_amount),
            buy_or_sell(total.net_amount)
        );
    }
    out.push('\n');
    out
}

pub fn render_open_interest(title: &str, product_name: &str, rows: &[OpenInterest]) -> String {
    let mut out = String::new();
    let Some(first) = rows.first() else {
        return out;
    };

    let _ = writeln!(out, "{}多空未平倉口數淨額 (日期: {})", title, first.date.format("%Y-%m-%d"));
    for identity in REPORT_IDENTITIES {
        if let Some(row) = rows
            .iter()
            .find(|r| r.product_name == product_name && r.identity == identity)
        {
            let _ = writeln!(out, "{}: {} ({})口", identity, row.net_oi, signed(row.net_volume));
        }
    }
    out.push('\n');
    out
}

/// Builds the daily digest from whatever datasets exist under the data directory.
pub fn compile_report(config: &Config) -> String {
    let mut report = String::new();

    if let Some(rows) = latest::<IndexDaily>(config, &mut report) {
        report.push_str(&render_index(&rows));
    }

    if let Some(rows) = latest::<InstitutionalTrade>(config, &mut report) {
        report.push_str(&render_fund(&rows));
    }

    if let Some(rows) = latest::<FuturesOpenInterest>(config, &mut report) {
        let rows: Vec<OpenInterest> = rows.into_iter().map(|r| r.0).collect();
        report.push_str(&render_open_interest("期貨", FUTURES_PRODUCT, &rows));
    }

    if let Some(rows) = latest::<OptionsOpenInterest>(config, &mut report) {
        let rows: Vec<OpenInterest> = rows.into_iter().map(|r| r.0).collect();
        report.push_str(&render_open_interest("選擇權", OPTIONS_PRODUCT, &rows));
    }

    info!("Report compiled ({} chars)", report.chars().count());
    if report.trim().is_empty() {
        EMPTY_REPORT.to_string()
    } else {
        report
    }
}
