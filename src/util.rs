use crate::models::reference::TargetWeek;
use chrono::DateTime;
use std::collections::HashSet;

// 时间戳转换工具，统一按UTC日历解释
pub fn timestamp_to_date_string(ts: i64) -> String {
    match DateTime::from_timestamp(ts, 0) {
        Some(dt) => dt.format("%m/%d/%Y").to_string(),
        None => ts.to_string(),
    }
}

pub fn timestamp_to_datetime_string(ts: i64) -> String {
    match DateTime::from_timestamp(ts, 0) {
        Some(dt) => dt.format("%m/%d/%Y %H:%M").to_string(),
        None => ts.to_string(),
    }
}

/// 按ISO周筛选到期日时间戳
///
/// 只保留其UTC日期的(ISO年, ISO周)落在目标周集合里的时间戳，
/// 保持原有顺序。纯函数，结果始终是输入的子集。
pub fn filter_expirations(discovered: &[i64], targets: &HashSet<TargetWeek>) -> Vec<i64> {
    discovered
        .iter()
        .copied()
        .filter(|&ts| {
            TargetWeek::from_timestamp(ts)
                .map(|week| targets.contains(&week))
                .unwrap_or(false)
        })
        .collect()
}
