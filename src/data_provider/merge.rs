use std::collections::{HashMap, HashSet};

use crate::models::market::Record;

/// 合并结果
#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult<R> {
    pub rows: Vec<R>,
    /// 新增的键数量
    pub inserted: usize,
    /// 值被更新的既有键数量
    pub replaced: usize,
}

impl<R> MergeResult<R> {
    pub fn is_unchanged(&self) -> bool {
        self.inserted == 0 && self.replaced == 0
    }
}

/// Upserts `new` into `existing` by record key.
///
/// A key seen again keeps the last value supplied, whether the earlier copy
/// came from `existing` or from earlier in `new`. The result is sorted by
/// `Record::sort_key`, so each date's rows are contiguous.
pub fn merge_upsert<R: Record>(existing: Vec<R>, new: Vec<R>) -> MergeResult<R> {
    let mut rows: Vec<R> = Vec::with_capacity(existing.len() + new.len());
    let mut index: HashMap<R::Key, usize> = HashMap::with_capacity(existing.len() + new.len());

    // 旧文件中的重复键也只保留最后一笔
    for row in existing {
        match index.get(&row.key()) {
            Some(&i) => rows[i] = row,
            None => {
                index.insert(row.key(), rows.len());
                rows.push(row);
            }
        }
    }

    let mut inserted: HashSet<R::Key> = HashSet::new();
    let mut replaced: HashSet<R::Key> = HashSet::new();
    for row in new {
        let key = row.key();
        match index.get(&key) {
            Some(&i) => {
                if rows[i] != row {
                    rows[i] = row;
                    if !inserted.contains(&key) {
                        replaced.insert(key);
                    }
                }
            }
            None => {
                index.insert(key.clone(), rows.len());
                rows.push(row);
                inserted.insert(key);
            }
        }
    }

    rows.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    MergeResult {
        rows,
        inserted: inserted.len(),
        replaced: replaced.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::{IndexDaily, InstitutionalTrade, Record};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, d).unwrap()
    }

    fn index(d: u32, value: i64) -> IndexDaily {
        IndexDaily {
            date: day(d),
            traded_value: Decimal::from(value),
            weighted_index: Decimal::from(22_000),
            index_change: Decimal::ZERO,
        }
    }

    fn trade(d: u32, unit: &str, net: i64) -> InstitutionalTrade {
        InstitutionalTrade {
            date: day(d),
            unit_name: unit.to_string(),
            buy_amount: Decimal::ZERO,
            sell_amount: Decimal::ZERO,
            net_amount: Decimal::from(net),
        }
    }

    #[test]
    fn bootstrap_from_empty_store() {
        let result = merge_upsert(Vec::new(), vec![index(2, 1)]);
        assert_eq!(result.rows, vec![index(2, 1)]);
        assert_eq!(result.inserted, 1);
        assert_eq!(result.replaced, 0);
    }

    #[test]
    fn empty_new_is_a_noop() {
        let existing = vec![index(1, 1), index(2, 2)];
        let result = merge_upsert(existing.clone(), Vec::new());
        assert_eq!(result.rows, existing);
        assert!(result.is_unchanged());
    }

    #[test]
    fn applying_twice_equals_applying_once() {
        let existing = vec![index(1, 1), index(3, 3)];
        let new = vec![index(2, 2), index(3, 30)];
        let once = merge_upsert(existing, new.clone());
        let twice = merge_upsert(once.rows.clone(), new);
        assert_eq!(once.rows, twice.rows);
        assert!(twice.is_unchanged());
    }

    #[test]
    fn latest_value_wins_for_duplicate_keys() {
        let existing = vec![trade(1, "投信", 1), trade(1, "合計", 1)];
        let new = vec![trade(1, "投信", 5), trade(2, "投信", 7), trade(2, "投信", 8)];
        let result = merge_upsert(existing, new);

        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.inserted, 1);
        assert_eq!(result.replaced, 1);
        let day2: Vec<_> = result.rows.iter().filter(|r| r.date == day(2)).collect();
        assert_eq!(day2.len(), 1);
        assert_eq!(day2[0].net_amount, Decimal::from(8));
        let keys: HashSet<_> = result.rows.iter().map(|r| r.key()).collect();
        assert_eq!(keys.len(), result.rows.len());
    }

    #[test]
    fn rows_sorted_by_date_then_unit_order() {
        let existing = vec![trade(3, "合計", 0), trade(1, "投信", 0)];
        let new = vec![trade(2, "合計", 0), trade(2, "自營商(避險)", 0), trade(1, "自營商(自行買賣)", 0)];
        let result = merge_upsert(existing, new);
        let order: Vec<_> = result
            .rows
            .iter()
            .map(|r| (r.date, r.unit_name.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (day(1), "自營商(自行買賣)"),
                (day(1), "投信"),
                (day(2), "自營商(避險)"),
                (day(2), "合計"),
                (day(3), "合計"),
            ]
        );
        assert!(result.rows.windows(2).all(|w| w[0].sort_key() <= w[1].sort_key()));
    }

    #[test]
    fn duplicate_keys_in_existing_collapse() {
        let existing = vec![index(1, 1), index(1, 2)];
        let result = merge_upsert(existing, vec![index(1, 2)]);
        assert_eq!(result.rows, vec![index(1, 2)]);
        assert!(result.is_unchanged());
    }
}
