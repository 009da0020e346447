use crate::errors::{OptionsHubError, Result};
use crate::models::option::{OptionRow, RunContext};
use crate::models::reference::{ReferenceRecord, ReferenceSheet};
use crate::util;
use chrono::NaiveDate;
use log::{info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// 表格顶部的空白行数，公式中的行号引用依赖这个偏移
pub const V_OFFSET: usize = 5;
/// 表格左侧的空白列数
pub const H_OFFSET: usize = 4;
/// 数据列(16) + 公式列(11)
pub const COLUMN_COUNT: usize = 27;

/// 报表数据列的取值顺序，键名对应FieldMap
const OUTPUT_COLUMNS: [&str; 16] = [
    "Stock",
    "Company",
    "Industry",
    "Sector",
    "Ex dividend date",
    "Quarterly dividend",
    "Capitalization",
    "Rating",
    "Next earnings date",
    "Stock Last",
    "Expiration",
    "Strike",
    "Bid",
    "Ask",
    "Volume",
    "Last Price",
];

// 十一个公式列，{n}在生成时替换为该行在表格中的1-based行号。
// 列字母和$6常量单元格都假定V_OFFSET=5、H_OFFSET=4的表格布局。
// 依次为：调整后的合约价、距到期天数、目标合约数、占用资金、
// 权利金、权利金收益率、年化权利金收益率、最大收益、最大收益率、
// 年化最大收益率、近价合约标记。
const FORMULAS: [&str; 11] = [
    "=IF(K{n}<I{n},(K{n}-I{n})+O{n},O{n})",
    "=J{n}-P$6",
    "=ROUND(R$6/((I{n}-0)*100),0)",
    "=100*R{n}*(I{n}-0)",
    "=100*P{n}*R{n}",
    "=T{n}/S{n}",
    "=(365/Q{n})*U{n}",
    "=IF(K{n}>I{n},(100*R{n}*(K{n}-I{n}))+T{n},T{n})",
    "=W{n}/S{n}",
    "=(365/Q{n})*X{n}",
    "=IF((ABS(K{n}-I{n})/K{n})<Z$6,\"NTM\",\"\")",
];

/// 列名到取值的映射，查不到的键一律返回空白而不报错
pub struct FieldMap(HashMap<&'static str, String>);

impl FieldMap {
    /// 从展平的期权行和参考记录构建映射，时间戳在这里统一转成日期文本
    pub fn from_row(row: &OptionRow, reference: &ReferenceRecord) -> Self {
        let mut map = HashMap::new();
        map.insert("Stock", row.symbol.clone());
        map.insert("Timestamp", util::timestamp_to_datetime_string(row.fetch_time));
        map.insert("Contract Symbol", row.contract_symbol.clone());
        map.insert("Strike", row.strike.to_string());
        map.insert("Currency", row.currency.clone());
        map.insert("Last Price", row.last_price.to_string());
        map.insert("Change", row.change.to_string());
        map.insert("% Change", row.percent_change.to_string());
        map.insert("Volume", row.volume.to_string());
        map.insert("Open Interest", row.open_interest.to_string());
        map.insert("Bid", row.bid.to_string());
        map.insert("Ask", row.ask.to_string());
        map.insert("Contract Size", row.contract_size.clone());
        map.insert("Expiration", util::timestamp_to_date_string(row.expiration));
        map.insert(
            "Last Trade Date",
            util::timestamp_to_date_string(row.last_trade_date),
        );
        map.insert("Implied Volatility", row.implied_volatility.to_string());
        map.insert("In The Money", row.in_the_money.to_string());
        map.insert("Stock Last", row.stock_last.to_string());
        map.insert("Industry", row.industry.clone());
        map.insert("Sector", row.sector.clone());
        map.insert("Company", row.company.clone());

        map.insert("Ex dividend date", reference.ex_dividend_date.clone());
        map.insert("Quarterly dividend", reference.quarterly_dividend.clone());
        map.insert("Capitalization", reference.capitalization.clone());
        map.insert("Rating", reference.rating.clone());
        map.insert("Next earnings date", reference.next_earnings_date.clone());

        Self(map)
    }

    pub fn get_or_blank(&self, key: &str) -> String {
        self.0.get(key).cloned().unwrap_or_default()
    }
}

/// 报表头行，其中部分单元格是用户在表格里调整的常量（70,000和10%）
fn report_headers(run_date: NaiveDate) -> Vec<String> {
    let mut headers: Vec<String> = [
        "Symbol",
        "Company",
        "Industry",
        "Sector",
        "Ex dividend date",
        "Quarterly dividend",
        "Capitalization",
        "Rating",
        "Next earnings date",
        "Price",
        "Expiration",
        "Strike",
        "Bid",
        "Ask",
        "Volume",
        "Last Call",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    headers.push(run_date.to_string());
    for tail in ["days", "70,000", " $invested", "$prem", "prem%", "annPrem%", "MaxRet", "Max%", "annMax%", "10%"] {
        headers.push(tail.to_string());
    }

    headers
}

/// 组装最终的二维报表
///
/// 头行 + 每条期权行的16个数据列和11个公式列，
/// 左侧补H_OFFSET个空白列、顶部补V_OFFSET个空白行，
/// 保证公式中的单元格引用在表格软件里对齐。
pub fn build_grid(
    rows: &[OptionRow],
    sheet: &ReferenceSheet,
    ctx: &RunContext,
) -> Vec<Vec<String>> {
    let mut table = vec![report_headers(ctx.run_date)];

    for (i, row) in rows.iter().enumerate() {
        let fields = FieldMap::from_row(row, &sheet.record_or_blank(&row.symbol));
        let mut out: Vec<String> = OUTPUT_COLUMNS
            .iter()
            .map(|key| fields.get_or_blank(key))
            .collect();

        // 表格行号从1开始，头行占据V_OFFSET+1行
        let n = i + V_OFFSET + 2;
        out.extend(FORMULAS.iter().map(|f| f.replace("{n}", &n.to_string())));
        table.push(out);
    }

    let mut grid: Vec<Vec<String>> = vec![Vec::new(); V_OFFSET];
    for row in table {
        let mut padded = vec![String::new(); H_OFFSET];
        padded.extend(row);
        grid.push(padded);
    }

    grid
}

/// 报表文件名，按运行日期命名
pub fn report_file_name(run_date: NaiveDate) -> String {
    format!("options_report_{}.csv", run_date.format("%d-%m-%Y"))
}

fn write_grid(grid: &[Vec<String>], path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);

    for row in grid {
        if row.is_empty() {
            // 空白填充行只写记录结束符，输出为空行
            writer.write_record(None::<&[u8]>)?;
        } else {
            writer.write_record(row)?;
        }
    }

    writer.flush().map_err(OptionsHubError::IoError)
}

fn is_permission_denied(e: &OptionsHubError) -> bool {
    match e {
        OptionsHubError::IoError(io) => io.kind() == std::io::ErrorKind::PermissionDenied,
        OptionsHubError::CsvError(csv) => matches!(
            csv.kind(),
            csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::PermissionDenied
        ),
        _ => false,
    }
}

/// 决定报表的写入路径，输出目录不存在时回落到当前目录下的相对路径
fn resolve_output_path(output_dir: &str, run_date: NaiveDate) -> PathBuf {
    let dir = Path::new(output_dir);
    if dir.is_dir() {
        dir.join(report_file_name(run_date))
    } else {
        warn!("输出目录 {} 不存在，回落到当前目录", output_dir);
        PathBuf::from(report_file_name(run_date))
    }
}

/// 把报表写到输出目录
///
/// 输出目录不存在时回落到当前目录；文件被其他程序占用时
/// 提示用户关闭后原样重写一次，第二次失败才算致命错误。
pub fn write_report(grid: &[Vec<String>], output_dir: &str, run_date: NaiveDate) -> Result<PathBuf> {
    let path = resolve_output_path(output_dir, run_date);

    info!("Writing report to {}", path.display());
    match write_grid(grid, &path) {
        Ok(()) => Ok(path),
        Err(e) if is_permission_denied(&e) => {
            println!("Please close {} and press enter to retry", path.display());
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;

            write_grid(grid, &path)?;
            Ok(path)
        }
        Err(e) => Err(e),
    }
}
