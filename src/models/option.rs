use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 运行上下文，保存本次运行的抓取时间戳
///
/// 所有行共享同一个抓取时间，显式传递而不是隐式全局状态。
#[derive(Debug, Clone, Copy)]
pub struct RunContext {
    pub fetch_time: i64,
    pub run_date: NaiveDate,
}

impl RunContext {
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self {
            fetch_time: now.timestamp(),
            run_date: now.date_naive(),
        }
    }
}

/// 个股画像数据（行业、板块）
///
/// 部分股票没有行业/板块数据，缺失时为空字符串，不视为错误。
#[derive(Debug, Clone, Default, Serialize)]
pub struct Profile {
    pub industry: String,
    pub sector: String,
}

/// 单个到期日的期权链数据
#[derive(Debug, Clone)]
pub struct ChainData {
    pub stock_last: f64,
    pub company: String,
    pub calls: Vec<CallContract>,
}

/// 数据源返回的单条看涨合约记录
///
/// 所有字段都是可选的，转换为OptionRow时逐一校验，
/// 任何字段缺失只丢弃这一行。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallContract {
    pub contract_symbol: Option<String>,
    pub strike: Option<f64>,
    pub currency: Option<String>,
    pub last_price: Option<f64>,
    pub change: Option<f64>,
    pub percent_change: Option<f64>,
    pub volume: Option<i64>,
    pub open_interest: Option<i64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub contract_size: Option<String>,
    pub expiration: Option<i64>,
    pub last_trade_date: Option<i64>,
    pub implied_volatility: Option<f64>,
    pub in_the_money: Option<bool>,
}

impl CallContract {
    /// 合并个股报价和画像数据，展平为一条完整的OptionRow
    ///
    /// 任何必需字段缺失时返回该字段在数据源中的键名。
    pub fn into_row(
        self,
        symbol: &str,
        ctx: &RunContext,
        stock_last: f64,
        company: &str,
        profile: &Profile,
    ) -> std::result::Result<OptionRow, &'static str> {
        Ok(OptionRow {
            symbol: symbol.to_string(),
            fetch_time: ctx.fetch_time,
            contract_symbol: self.contract_symbol.ok_or("contractSymbol")?,
            strike: self.strike.ok_or("strike")?,
            currency: self.currency.ok_or("currency")?,
            last_price: self.last_price.ok_or("lastPrice")?,
            change: self.change.ok_or("change")?,
            percent_change: self.percent_change.ok_or("percentChange")?,
            volume: self.volume.ok_or("volume")?,
            open_interest: self.open_interest.ok_or("openInterest")?,
            bid: self.bid.ok_or("bid")?,
            ask: self.ask.ok_or("ask")?,
            contract_size: self.contract_size.ok_or("contractSize")?,
            expiration: self.expiration.ok_or("expiration")?,
            last_trade_date: self.last_trade_date.ok_or("lastTradeDate")?,
            implied_volatility: self.implied_volatility.ok_or("impliedVolatility")?,
            in_the_money: self.in_the_money.ok_or("inTheMoney")?,
            stock_last,
            industry: profile.industry.clone(),
            sector: profile.sector.clone(),
            company: company.to_string(),
        })
    }
}

/// 展平后的期权行数据，字段齐全且不可变
#[derive(Debug, Clone, Serialize)]
pub struct OptionRow {
    pub symbol: String,
    pub fetch_time: i64,
    pub contract_symbol: String,
    pub strike: f64,
    pub currency: String,
    pub last_price: f64,
    pub change: f64,
    pub percent_change: f64,
    pub volume: i64,
    pub open_interest: i64,
    pub bid: f64,
    pub ask: f64,
    pub contract_size: String,
    pub expiration: i64,
    pub last_trade_date: i64,
    pub implied_volatility: f64,
    pub in_the_money: bool,
    pub stock_last: f64,
    pub industry: String,
    pub sector: String,
    pub company: String,
}
