use crate::errors::{OptionsHubError, Result};
use crate::models::reference::{ReferenceRecord, ReferenceSheet, TargetWeek};
use calamine::{open_workbook_auto, Reader};
use chrono::NaiveDate;
use log::{info, warn};
use std::collections::HashSet;
use std::path::Path;

// 参考数据表的列布局（与历史表格保持一致）：
// 第0列是注释标记，第1列是股票代码，第5-9列是五个参考字段，
// 其余列留给用户自己的备注。
const COL_MARKER: usize = 0;
const COL_SYMBOL: usize = 1;
const COL_EX_DIVIDEND: usize = 5;
const COL_NEXT_EARNINGS: usize = 9;

const COL_DATE: usize = 1;

/// 加载股票列表和参考数据
///
/// 文件不存在时生成模板并返回None，由调用方正常退出。
pub fn load_reference_sheet(path: &str) -> Result<Option<ReferenceSheet>> {
    if !Path::new(path).exists() {
        create_symbols_stub(path)?;
        return Ok(None);
    }

    let mut sheet = ReferenceSheet::default();
    for row in read_rows(Path::new(path))? {
        if is_commented(&row) {
            continue;
        }

        let symbol = match row.get(COL_SYMBOL) {
            Some(cell) if !cell.trim().is_empty() => cell.trim().to_uppercase(),
            _ => continue,
        };
        if symbol == "SYMBOL" {
            // 未加注释标记的表头行
            continue;
        }

        let field = |i: usize| row.get(i).map(|s| s.trim().to_string()).unwrap_or_default();
        sheet.records.insert(
            symbol.clone(),
            ReferenceRecord {
                ex_dividend_date: field(COL_EX_DIVIDEND),
                quarterly_dividend: field(COL_EX_DIVIDEND + 1),
                capitalization: field(COL_EX_DIVIDEND + 2),
                rating: field(COL_EX_DIVIDEND + 3),
                next_earnings_date: field(COL_NEXT_EARNINGS),
            },
        );
        sheet.symbols.push(symbol);
    }

    info!("加载了 {} 只股票的参考数据", sheet.symbols.len());
    Ok(Some(sheet))
}

/// 加载目标日期并归并为ISO周集合
///
/// 重复的周自动合并，顺序无关。文件不存在时生成模板并返回None。
pub fn load_target_weeks(path: &str) -> Result<Option<HashSet<TargetWeek>>> {
    if !Path::new(path).exists() {
        create_dates_stub(path)?;
        return Ok(None);
    }

    let mut weeks = HashSet::new();
    for row in read_rows(Path::new(path))? {
        if is_commented(&row) {
            continue;
        }

        let cell = match row.get(COL_DATE) {
            Some(cell) if !cell.trim().is_empty() => cell.trim().to_string(),
            _ => continue,
        };
        if cell.to_uppercase() == "DATE" {
            continue;
        }

        match parse_date_cell(&cell) {
            Some(date) => {
                weeks.insert(TargetWeek::from_date(date));
            }
            None => warn!("无法解析目标日期: {}", cell),
        }
    }

    info!("加载了 {} 个目标周", weeks.len());
    Ok(Some(weeks))
}

fn is_commented(row: &[String]) -> bool {
    row.get(COL_MARKER)
        .map(|cell| cell.contains('#'))
        .unwrap_or(false)
}

/// 按扩展名选择读取方式：xlsx/xls/ods走calamine，其余按CSV处理
fn read_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    match extension.as_str() {
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_excel_rows(path),
        _ => read_csv_rows(path),
    }
}

fn read_excel_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path).map_err(OptionsHubError::ExcelError)?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| OptionsHubError::DataError("工作簿中没有工作表".to_string()))?
        .map_err(OptionsHubError::ExcelError)?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect())
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    Ok(rows)
}

/// 解析单元格里的日期，支持Excel序列号和常见文本格式
fn parse_date_cell(cell: &str) -> Option<NaiveDate> {
    if let Ok(serial) = cell.parse::<f64>() {
        // Excel序列号从1899-12-30起算。只接受落在1970-01-01到9999-12-31
        // 之间的序列号，裸年份（如"2017"）和负数不当作日期
        if !(25569.0..=2_958_465.0).contains(&serial) {
            return None;
        }
        let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
        return base.checked_add_days(chrono::Days::new(serial as u64));
    }

    for format in ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(date) = NaiveDate::parse_from_str(cell, format) {
            return Some(date);
        }
    }

    None
}

fn create_symbols_stub(path: &str) -> Result<()> {
    let stub_path = stub_path_for(path);
    let mut writer = csv::Writer::from_path(&stub_path)?;
    writer.write_record([
        "#",
        "Symbol",
        "Name",
        "Price",
        "Shares",
        "Ex dividend date",
        "Quarterly dividend",
        "Capitalization",
        "Rating",
        "Next earnings date",
    ])?;
    writer.flush()?;

    println!(
        "Please put the stock symbols you want into {}. \
         Put a hash mark in the first cell of the rows you don't want.",
        stub_path
    );
    Ok(())
}

fn create_dates_stub(path: &str) -> Result<()> {
    let stub_path = stub_path_for(path);
    let mut writer = csv::Writer::from_path(&stub_path)?;
    writer.write_record(["#", "Date"])?;
    writer.flush()?;

    println!(
        "Please put the expiration dates you want into {}. \
         Put a hash mark in the first cell of the rows you don't want.",
        stub_path
    );
    Ok(())
}

// 模板只能生成CSV，用户给的xlsx路径换成.csv后缀
fn stub_path_for(path: &str) -> String {
    Path::new(path)
        .with_extension("csv")
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> String {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn reference_sheet_skips_comments_and_uppercases() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "symbols.csv",
            "#,Symbol,Name,Price,Shares,Ex dividend date,Quarterly dividend,Capitalization,Rating,Next earnings date\n\
             ,msft,Microsoft,57.3,100,02/14/2017,0.39,483B,A,01/26/2017\n\
             #,aapl,Apple,119.0,,,,,,\n\
             ,ko,Coca-Cola,41.5,,,,,B,\n",
        );

        let sheet = load_reference_sheet(&path).unwrap().unwrap();
        assert_eq!(sheet.symbols, vec!["MSFT", "KO"]);

        let msft = &sheet.records["MSFT"];
        assert_eq!(msft.ex_dividend_date, "02/14/2017");
        assert_eq!(msft.quarterly_dividend, "0.39");
        assert_eq!(msft.capitalization, "483B");
        assert_eq!(msft.rating, "A");
        assert_eq!(msft.next_earnings_date, "01/26/2017");

        let ko = &sheet.records["KO"];
        assert_eq!(ko.ex_dividend_date, "");
        assert_eq!(ko.rating, "B");
    }

    #[test]
    fn target_weeks_collapse_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        // 1月18日和1月20日属于同一个ISO周
        let path = write_file(
            &dir,
            "dates.csv",
            "#,Date\n,2017-01-18\n,2017-01-20\n,02/17/2017\n",
        );

        let weeks = load_target_weeks(&path).unwrap().unwrap();
        assert_eq!(weeks.len(), 2);
        assert!(weeks.contains(&TargetWeek { year: 2017, week: 3 }));
        assert!(weeks.contains(&TargetWeek { year: 2017, week: 7 }));
    }

    #[test]
    fn unparsable_dates_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        // 裸年份"2017"不是日期，不能混进目标周集合
        let path = write_file(&dir, "dates.csv", ",not-a-date\n,2017\n,2017-01-18\n");

        let weeks = load_target_weeks(&path).unwrap().unwrap();
        assert_eq!(weeks.len(), 1);
        assert!(weeks.contains(&TargetWeek { year: 2017, week: 3 }));
    }

    #[test]
    fn excel_serial_numbers_parse_as_dates() {
        // 42753 = 2017-01-18
        assert_eq!(
            parse_date_cell("42753"),
            NaiveDate::from_ymd_opt(2017, 1, 18)
        );
    }

    #[test]
    fn out_of_range_serial_numbers_are_rejected() {
        // 1970之前和Excel上限之外的序列号都不接受
        assert_eq!(parse_date_cell("2017"), None);
        assert_eq!(parse_date_cell("-42753"), None);
        assert_eq!(parse_date_cell("3000000"), None);
    }

    #[test]
    fn missing_inputs_create_stub_templates() {
        let dir = tempfile::tempdir().unwrap();
        let symbols_path = dir.path().join("stock_symbols.csv");
        let dates_path = dir.path().join("target_dates.xlsx");

        let sheet = load_reference_sheet(symbols_path.to_str().unwrap()).unwrap();
        assert!(sheet.is_none());
        assert!(symbols_path.exists());

        let weeks = load_target_weeks(dates_path.to_str().unwrap()).unwrap();
        assert!(weeks.is_none());
        // xlsx模板退化为csv
        assert!(dir.path().join("target_dates.csv").exists());
    }
}
