//! 台湾期货交易所 (TAIFEX) 三大法人期货/选择权未平仓页面

use chrono::NaiveDate;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};

use crate::models::market::{OpenInterest, OPEN_INTEREST_VALUES};
use crate::util;

/// Where the figures sit on the page. Layout changes on the exchange side
/// should only need a different schema, not different code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// 日期所在的元素
    pub date_selector: String,
    /// 日期文字前的标签，如 "日期2024/10/25"
    pub date_label: String,
    pub section_selector: String,
    /// 第几个 section（从 0 开始）
    pub section_index: usize,
    pub table_selector: String,
    pub row_selector: String,
    pub cell_selector: String,
    /// 最多读取的行数
    pub max_rows: usize,
    /// 第一行身份别在第 3 栏 (index 2)：前面多出序号与商品名称两栏，
    /// 这两栏以 rowspan 跨越同一商品的其余身份列
    pub first_row_identity_column: usize,
    pub row_identity_column: usize,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self {
            date_selector: "span.right".to_string(),
            date_label: "日期".to_string(),
            section_selector: "div.section".to_string(),
            section_index: 2,
            table_selector: "table.table_f.table-sticky-3.w-1000".to_string(),
            row_selector: "tbody tr".to_string(),
            cell_selector: "td".to_string(),
            max_rows: 3,
            first_row_identity_column: 2,
            row_identity_column: 0,
        }
    }
}

impl TableSchema {
    fn identity_column(&self, row_index: usize) -> usize {
        if row_index == 0 {
            self.first_row_identity_column
        } else {
            self.row_identity_column
        }
    }
}

fn selector(css: &str) -> Option<Selector> {
    match Selector::parse(css) {
        Ok(s) => Some(s),
        Err(e) => {
            warn!("Invalid selector {:?}: {:?}", css, e);
            None
        }
    }
}

fn element_text(element: &ElementRef) -> String {
    element.text().map(str::trim).collect::<String>()
}

/// Reads the trading date shown on the page.
pub fn extract_date(document: &Html, schema: &TableSchema) -> Option<NaiveDate> {
    let date_selector = selector(&schema.date_selector)?;
    let Some(element) = document.select(&date_selector).next() else {
        warn!("Date element {} not found, page layout may have changed", schema.date_selector);
        return None;
    };

    let text = element_text(&element);
    let text = text.replace(schema.date_label.as_str(), "");
    match util::parse_market_date(text.trim()) {
        Ok(date) => Some(date),
        Err(e) => {
            warn!("Unable to read page date {:?}: {}", text, e);
            None
        }
    }
}

/// Parses a futures/options page into one record per identity row.
///
/// Any missing piece of the expected structure is logged and produces an
/// empty result.
pub fn extract(html: &str, schema: &TableSchema, product_name: &str) -> Vec<OpenInterest> {
    let document = Html::parse_document(html);

    let Some(date) = extract_date(&document, schema) else {
        return Vec::new();
    };

    let (Some(section_sel), Some(table_sel), Some(row_sel), Some(cell_sel)) = (
        selector(&schema.section_selector),
        selector(&schema.table_selector),
        selector(&schema.row_selector),
        selector(&schema.cell_selector),
    ) else {
        return Vec::new();
    };

    let Some(section) = document.select(&section_sel).nth(schema.section_index) else {
        warn!(
            "Section #{} ({}) not found for {}, page layout may have changed",
            schema.section_index + 1,
            schema.section_selector,
            product_name
        );
        return Vec::new();
    };

    let Some(table) = section.select(&table_sel).next() else {
        warn!("Target table not found for {}, page layout may have changed", product_name);
        return Vec::new();
    };

    let mut records = Vec::new();
    for (row_index, row) in table.select(&row_sel).take(schema.max_rows).enumerate() {
        let cells: Vec<String> = row.select(&cell_sel).map(|c| element_text(&c)).collect();
        if cells.len() <= 2 {
            continue;
        }

        let identity_column = schema.identity_column(row_index);
        match parse_row(&cells, identity_column) {
            Some((identity, values)) => {
                records.push(OpenInterest::from_values(date, product_name, &identity, values));
            }
            None => warn!("Skipping malformed {} row #{}: {:?}", product_name, row_index, cells),
        }
    }

    info!("Extracted {} {} rows for {}", records.len(), product_name, date);
    records
}

fn parse_row(cells: &[String], identity_column: usize) -> Option<(String, [Decimal; OPEN_INTEREST_VALUES])> {
    let identity = cells.get(identity_column)?.clone();
    if identity.is_empty() {
        return None;
    }

    let data = cells.get(identity_column + 1..)?;
    if data.len() < OPEN_INTEREST_VALUES {
        debug!("Row has {} numeric cells, expected {}", data.len(), OPEN_INTEREST_VALUES);
        return None;
    }

    let mut values = [Decimal::ZERO; OPEN_INTEREST_VALUES];
    for (slot, text) in values.iter_mut().zip(data) {
        *slot = util::parse_decimal(text).ok()?;
    }
    Some((identity, values))
}
