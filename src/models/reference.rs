use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;

/// 用户提供的每只股票的静态参考数据
///
/// 全部按文本保存，缺失时为空字符串。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceRecord {
    pub ex_dividend_date: String,
    pub quarterly_dividend: String,
    pub capitalization: String,
    pub rating: String,
    pub next_earnings_date: String,
}

/// 参考数据表：保持原始顺序的股票列表 + 按股票代码索引的参考记录
#[derive(Debug, Clone, Default)]
pub struct ReferenceSheet {
    pub symbols: Vec<String>,
    pub records: HashMap<String, ReferenceRecord>,
}

impl ReferenceSheet {
    /// 查找参考记录，缺失时返回全空白记录（不报错）
    pub fn record_or_blank(&self, symbol: &str) -> ReferenceRecord {
        self.records.get(symbol).cloned().unwrap_or_default()
    }
}

/// ISO日历周 (年, 周序号)，用于筛选到期日
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetWeek {
    pub year: i32,
    pub week: u32,
}

impl TargetWeek {
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// 按UTC日历把epoch时间戳归入ISO周，超出chrono范围的时间戳返回None
    pub fn from_timestamp(ts: i64) -> Option<Self> {
        chrono::DateTime::from_timestamp(ts, 0).map(|dt| Self::from_date(dt.date_naive()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn week_from_date_follows_iso_numbering() {
        // 2017-01-01 是周日，属于2016年第52周
        let week = TargetWeek::from_date(NaiveDate::from_ymd_opt(2017, 1, 1).unwrap());
        assert_eq!(week, TargetWeek { year: 2016, week: 52 });

        let week = TargetWeek::from_date(NaiveDate::from_ymd_opt(2017, 1, 2).unwrap());
        assert_eq!(week, TargetWeek { year: 2017, week: 1 });
    }

    #[test]
    fn week_from_timestamp_matches_utc_date() {
        // 2017-01-20 00:00:00 UTC
        let week = TargetWeek::from_timestamp(1484870400).unwrap();
        assert_eq!(week, TargetWeek { year: 2017, week: 3 });
    }

    #[test]
    fn record_or_blank_defaults_to_empty_strings() {
        let sheet = ReferenceSheet::default();
        let record = sheet.record_or_blank("MSFT");
        assert_eq!(record, ReferenceRecord::default());
        assert_eq!(record.rating, "");
    }
}
