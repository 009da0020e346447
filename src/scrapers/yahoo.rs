use crate::errors::{OptionsHubError, Result};
use crate::models::option::{CallContract, ChainData, Profile};
use crate::scrapers::base::OptionsScraper;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const OPTIONS_URL: &str = "https://query1.finance.yahoo.com/v7/finance/options";
const QUOTE_SUMMARY_URL: &str = "https://query1.finance.yahoo.com/v10/finance/quoteSummary";

// Yahoo拒绝默认的reqwest UA，需要伪装成浏览器
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";

/// Yahoo Finance期权数据抓取器
pub struct YahooScraper {
    client: Client,
    last_request: Mutex<Option<Instant>>,
}

impl YahooScraper {
    /// 创建新的Yahoo数据抓取器
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(OptionsHubError::RequestError)?;

        Ok(Self {
            client,
            last_request: Mutex::new(None),
        })
    }

    /// 等待请求频率限制
    async fn wait_for_rate_limit(&self) {
        const MIN_INTERVAL: Duration = Duration::from_millis(500);

        let now = Instant::now();
        let should_wait = {
            let mut last = self.last_request.lock().unwrap();
            let should_wait = if let Some(instant) = *last {
                let elapsed = instant.elapsed();
                if elapsed < MIN_INTERVAL {
                    Some(MIN_INTERVAL - elapsed)
                } else {
                    None
                }
            } else {
                None
            };
            *last = Some(now);
            should_wait
        };

        if let Some(wait_time) = should_wait {
            debug!("等待 {:?} 以遵守频率限制", wait_time);
            tokio::time::sleep(wait_time).await;
        }
    }

    /// 请求某个到期日的期权链原始响应
    async fn request_chain(&self, symbol: &str, expiration: i64) -> Result<String> {
        self.wait_for_rate_limit().await;

        let response = self
            .client
            .get(format!("{}/{}", OPTIONS_URL, symbol))
            .query(&[("date", expiration.to_string())])
            .send()
            .await
            .map_err(OptionsHubError::RequestError)?;

        Ok(response.text().await?)
    }
}

#[async_trait]
impl OptionsScraper for YahooScraper {
    fn provider_code(&self) -> &'static str {
        "YAHOO"
    }

    async fn fetch_expirations(&self, symbol: &str) -> Result<Vec<i64>> {
        debug!("获取 {} 的到期日列表", symbol);
        self.wait_for_rate_limit().await;

        let response = self
            .client
            .get(format!("{}/{}", OPTIONS_URL, symbol))
            .send()
            .await
            .map_err(OptionsHubError::RequestError)?;

        let text = response.text().await?;
        parse_expirations(symbol, &text)
    }

    async fn fetch_profile(&self, symbol: &str) -> Result<Profile> {
        debug!("获取 {} 的行业/板块数据", symbol);
        self.wait_for_rate_limit().await;

        let response = self
            .client
            .get(format!("{}/{}", QUOTE_SUMMARY_URL, symbol))
            .query(&[("modules", "assetProfile")])
            .send()
            .await
            .map_err(OptionsHubError::RequestError)?;

        let text = response.text().await?;
        Ok(parse_profile(&text))
    }

    async fn fetch_chain(&self, symbol: &str, expiration: i64) -> Result<ChainData> {
        debug!("获取 {} 在 {} 的期权链", symbol, expiration);
        let text = self.request_chain(symbol, expiration).await?;
        parse_chain(symbol, expiration, &text)
    }
}

// 各接口的解析结构，必需/可选字段显式标注

#[derive(Debug, Deserialize)]
struct OptionChainResponse {
    #[serde(rename = "optionChain")]
    option_chain: OptionChainEnvelope,
}

#[derive(Debug, Deserialize)]
struct OptionChainEnvelope {
    result: Option<Vec<ChainResult>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainResult {
    #[serde(default)]
    expiration_dates: Vec<i64>,
    quote: Option<Quote>,
    #[serde(default)]
    options: Vec<OptionsBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Quote {
    regular_market_price: Option<f64>,
    long_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OptionsBlock {
    #[serde(default)]
    calls: Vec<CallContract>,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryEnvelope,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    result: Option<Vec<QuoteSummaryResult>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    asset_profile: Option<AssetProfile>,
}

#[derive(Debug, Deserialize)]
struct AssetProfile {
    industry: Option<String>,
    sector: Option<String>,
}

/// 解析到期日列表
///
/// 响应格式错误或结果数组为空都视为该股票不存在，
/// 整只股票跳过，后续阶段不再处理。
fn parse_expirations(symbol: &str, body: &str) -> Result<Vec<i64>> {
    let parsed: OptionChainResponse = serde_json::from_str(body)
        .map_err(|_| OptionsHubError::SymbolNotFound(symbol.to_string()))?;

    parsed
        .option_chain
        .result
        .and_then(|mut results| {
            if results.is_empty() {
                None
            } else {
                Some(results.remove(0).expiration_dates)
            }
        })
        .ok_or_else(|| OptionsHubError::SymbolNotFound(symbol.to_string()))
}

/// 解析行业/板块画像，任何缺失都回落为空字符串
fn parse_profile(body: &str) -> Profile {
    let parsed: QuoteSummaryResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(_) => return Profile::default(),
    };

    let profile = parsed
        .quote_summary
        .result
        .and_then(|mut results| {
            if results.is_empty() {
                None
            } else {
                results.remove(0).asset_profile
            }
        })
        .unwrap_or(AssetProfile {
            industry: None,
            sector: None,
        });

    Profile {
        industry: profile.industry.unwrap_or_default(),
        sector: profile.sector.unwrap_or_default(),
    }
}

/// 解析单个到期日的期权链
fn parse_chain(symbol: &str, expiration: i64, body: &str) -> Result<ChainData> {
    let context = || format!("{} @ {}", symbol, expiration);

    let parsed: OptionChainResponse = serde_json::from_str(body)
        .map_err(|e| OptionsHubError::MalformedResponse(format!("{}: {}", context(), e)))?;

    let mut result = parsed
        .option_chain
        .result
        .and_then(|mut results| {
            if results.is_empty() {
                None
            } else {
                Some(results.remove(0))
            }
        })
        .ok_or_else(|| {
            OptionsHubError::MalformedResponse(format!("{}: empty result", context()))
        })?;

    let quote = result.quote.take().ok_or_else(|| {
        OptionsHubError::MalformedResponse(format!("{}: missing quote", context()))
    })?;
    let stock_last = quote.regular_market_price.ok_or_else(|| {
        OptionsHubError::MalformedResponse(format!("{}: missing regularMarketPrice", context()))
    })?;
    let company = quote.long_name.ok_or_else(|| {
        OptionsHubError::MalformedResponse(format!("{}: missing longName", context()))
    })?;

    if result.options.is_empty() {
        return Err(OptionsHubError::MalformedResponse(format!(
            "{}: missing options block",
            context()
        )));
    }

    Ok(ChainData {
        stock_last,
        company,
        calls: result.options.remove(0).calls,
    })
}
