use crate::config::Config;
use crate::errors::{OptionsHubError, Result};
use crate::models::option::{ChainData, OptionRow, Profile, RunContext};
use crate::models::reference::{ReferenceSheet, TargetWeek};
use crate::report;
use crate::scrapers::base::OptionsScraper;
use crate::util;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// 报表服务，串联到期日发现、周筛选、期权链抓取和报表生成
pub struct ReportService {
    config: Config,
    scraper: Arc<dyn OptionsScraper + Send + Sync>,
}

/// 一次运行的统计结果
#[derive(Debug)]
pub struct RunSummary {
    pub symbols_processed: usize,
    pub symbols_skipped: usize,
    pub row_count: usize,
    pub diagnostic_count: usize,
    pub output_path: PathBuf,
}

impl ReportService {
    /// 创建新的报表服务实例
    pub fn new(config: Config, scraper: Arc<dyn OptionsScraper + Send + Sync>) -> Self {
        Self { config, scraper }
    }

    /// 完整执行一次报表生成
    ///
    /// 逐只股票顺序处理，单只股票的失败不会中断整个运行，
    /// 最终把所有成功抓到的行写入CSV。
    pub async fn generate(
        &self,
        sheet: &ReferenceSheet,
        weeks: &HashSet<TargetWeek>,
        ctx: &RunContext,
    ) -> Result<RunSummary> {
        info!("数据源: {}", self.scraper.provider_code());
        let mut symbols: Vec<String> = sheet.symbols.clone();

        // 调试模式：只处理前N只股票
        if self.config.debug_mode && symbols.len() > self.config.debug_symbol_limit {
            let original_count = symbols.len();
            symbols.truncate(self.config.debug_symbol_limit);
            info!(
                "DEBUG MODE: Processing only {} out of {} symbols",
                symbols.len(),
                original_count
            );
        }

        let mut all_rows = Vec::new();
        let mut skipped = 0;
        let mut diagnostic_count = 0;

        for (i, symbol) in symbols.iter().enumerate() {
            info!("处理 {} ({} / {})", symbol, i + 1, symbols.len());

            match self.process_symbol(symbol, weeks, ctx).await {
                Ok((rows, diagnostics)) => {
                    debug!("{} 产出 {} 行", symbol, rows.len());
                    all_rows.extend(rows);

                    // 单只股票的诊断信息在它处理完后一次性输出
                    if !diagnostics.is_empty() {
                        info!("{}: {}", symbol, diagnostics.join(", "));
                        diagnostic_count += diagnostics.len();
                    }
                }
                Err(OptionsHubError::SymbolNotFound(_)) => {
                    info!("{} 在数据源中不存在，跳过", symbol);
                    skipped += 1;
                    diagnostic_count += 1;
                }
                Err(e) => {
                    // 其他失败也只跳过当前股票，尽量保留部分输出
                    warn!("处理 {} 失败: {}", symbol, e);
                    skipped += 1;
                    diagnostic_count += 1;
                }
            }
        }

        let grid = report::build_grid(&all_rows, sheet, ctx);
        let output_path = report::write_report(&grid, &self.config.output_dir, ctx.run_date)?;

        Ok(RunSummary {
            symbols_processed: symbols.len() - skipped,
            symbols_skipped: skipped,
            row_count: all_rows.len(),
            diagnostic_count,
            output_path,
        })
    }

    /// 处理单只股票：发现到期日 → 周筛选 → 画像 → 逐个到期日抓链并展平
    ///
    /// 返回展平的行和按到期日/行累计的诊断信息。
    /// 股票不存在时返回SymbolNotFound，由调用方整体跳过。
    pub async fn process_symbol(
        &self,
        symbol: &str,
        weeks: &HashSet<TargetWeek>,
        ctx: &RunContext,
    ) -> Result<(Vec<OptionRow>, Vec<String>)> {
        let discovered = self.scraper.fetch_expirations(symbol).await?;
        let retained = util::filter_expirations(&discovered, weeks);
        debug!(
            "{} 发现 {} 个到期日，保留 {} 个",
            symbol,
            discovered.len(),
            retained.len()
        );

        if retained.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        // 画像失败是软失败，不影响该股票的后续处理
        let profile = match self.scraper.fetch_profile(symbol).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("获取 {} 的画像失败: {}", symbol, e);
                Profile::default()
            }
        };

        let mut rows = Vec::new();
        let mut diagnostics = Vec::new();

        for ts in retained {
            let date_str = util::timestamp_to_date_string(ts);

            // 超时原样重试一次，第二次失败才放弃这个到期日
            let fetched = match self.scraper.fetch_chain(symbol, ts).await {
                Err(e) if e.is_timeout() => {
                    debug!("{} 在 {} 的请求超时，重试一次", symbol, date_str);
                    self.scraper.fetch_chain(symbol, ts).await
                }
                other => other,
            };

            let chain = match fetched {
                Ok(chain) => chain,
                Err(e) if e.is_timeout() => {
                    diagnostics.push(format!("{} timed out", date_str));
                    continue;
                }
                Err(OptionsHubError::MalformedResponse(msg)) => {
                    diagnostics.push(format!("can't decode chain: {}", msg));
                    continue;
                }
                Err(e) => {
                    diagnostics.push(format!("{} fetch failed: {}", date_str, e));
                    continue;
                }
            };

            let ChainData {
                stock_last,
                company,
                calls,
            } = chain;

            for call in calls {
                match call.into_row(symbol, ctx, stock_last, &company, &profile) {
                    Ok(row) => rows.push(row),
                    Err(field) => {
                        // 失败只影响这一行，同链的其他合约照常保留
                        diagnostics.push(format!(
                            "missing {} for {} ({})",
                            field, date_str, ts
                        ));
                    }
                }
            }
        }

        Ok((rows, diagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::option::CallContract;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const JAN_20: i64 = 1484870400;
    const JAN_27: i64 = 1485475200;

    fn ctx() -> RunContext {
        RunContext {
            fetch_time: 1484000000,
            run_date: NaiveDate::from_ymd_opt(2017, 1, 9).unwrap(),
        }
    }

    fn target_weeks() -> HashSet<TargetWeek> {
        [
            TargetWeek::from_timestamp(JAN_20).unwrap(),
            TargetWeek::from_timestamp(JAN_27).unwrap(),
        ]
        .into()
    }

    fn full_call(suffix: &str) -> CallContract {
        CallContract {
            contract_symbol: Some(format!("TEST{}", suffix)),
            strike: Some(30.0),
            currency: Some("USD".to_string()),
            last_price: Some(27.2),
            change: Some(-0.3),
            percent_change: Some(-1.09),
            volume: Some(12),
            open_interest: Some(118),
            bid: Some(27.0),
            ask: Some(27.6),
            contract_size: Some("REGULAR".to_string()),
            expiration: Some(JAN_20),
            last_trade_date: Some(1484239917),
            implied_volatility: Some(0.5625),
            in_the_money: Some(true),
        }
    }

    #[derive(Default)]
    struct MockScraper {
        expirations: HashMap<String, Vec<i64>>,
        profiles: HashMap<String, Profile>,
        chains: HashMap<(String, i64), ChainData>,
        timeouts: HashSet<(String, i64)>,
        // 只在第一次请求时超时，之后按chains正常返回
        fail_once: Mutex<HashSet<(String, i64)>>,
        chain_requests: Mutex<Vec<(String, i64)>>,
    }

    #[async_trait]
    impl OptionsScraper for MockScraper {
        fn provider_code(&self) -> &'static str {
            "MOCK"
        }

        async fn fetch_expirations(&self, symbol: &str) -> Result<Vec<i64>> {
            self.expirations
                .get(symbol)
                .cloned()
                .ok_or_else(|| OptionsHubError::SymbolNotFound(symbol.to_string()))
        }

        async fn fetch_profile(&self, symbol: &str) -> Result<Profile> {
            Ok(self.profiles.get(symbol).cloned().unwrap_or_default())
        }

        async fn fetch_chain(&self, symbol: &str, expiration: i64) -> Result<ChainData> {
            let key = (symbol.to_string(), expiration);
            self.chain_requests.lock().unwrap().push(key.clone());

            if self.timeouts.contains(&key) || self.fail_once.lock().unwrap().remove(&key) {
                return Err(OptionsHubError::Timeout(format!(
                    "{} @ {}",
                    symbol, expiration
                )));
            }
            self.chains
                .get(&key)
                .cloned()
                .ok_or_else(|| OptionsHubError::MalformedResponse("no chain".to_string()))
        }
    }

    fn chain_with(calls: Vec<CallContract>) -> ChainData {
        ChainData {
            stock_last: 57.3,
            company: "Test Company".to_string(),
            calls,
        }
    }

    fn service_with(scraper: Arc<MockScraper>, output_dir: &str) -> ReportService {
        let config = Config::new().with_output_dir(output_dir);
        ReportService::new(config, scraper)
    }

    #[tokio::test]
    async fn unknown_symbol_is_skipped_and_run_completes() {
        let mut scraper = MockScraper::default();
        scraper
            .expirations
            .insert("MSFT".to_string(), vec![JAN_20]);
        scraper
            .chains
            .insert(("MSFT".to_string(), JAN_20), chain_with(vec![full_call("1")]));

        let mut sheet = ReferenceSheet::default();
        sheet.symbols = vec!["ZZZ".to_string(), "MSFT".to_string()];

        let dir = tempfile::tempdir().unwrap();
        let service = service_with(Arc::new(scraper), dir.path().to_str().unwrap());
        let summary = service
            .generate(&sheet, &target_weeks(), &ctx())
            .await
            .unwrap();

        assert_eq!(summary.symbols_skipped, 1);
        assert_eq!(summary.symbols_processed, 1);
        assert_eq!(summary.row_count, 1);
        assert_eq!(summary.diagnostic_count, 1);
        assert!(summary.output_path.exists());

        // ZZZ不出现在任何输出行里
        let contents = std::fs::read_to_string(&summary.output_path).unwrap();
        assert!(!contents.contains("ZZZ"));
        assert!(contents.contains("MSFT"));
    }

    #[tokio::test]
    async fn persistent_timeout_skips_one_expiration_after_a_single_retry() {
        let mut scraper = MockScraper::default();
        scraper
            .expirations
            .insert("MSFT".to_string(), vec![JAN_20, JAN_27]);
        scraper.timeouts.insert(("MSFT".to_string(), JAN_20));
        scraper
            .chains
            .insert(("MSFT".to_string(), JAN_27), chain_with(vec![full_call("1")]));

        let dir = tempfile::tempdir().unwrap();
        let scraper = Arc::new(scraper);
        let service = service_with(Arc::clone(&scraper), dir.path().to_str().unwrap());
        let (rows, diagnostics) = service
            .process_symbol("MSFT", &target_weeks(), &ctx())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(diagnostics, vec!["01/20/2017 timed out".to_string()]);

        // 超时的到期日恰好请求两次，另一个到期日只请求一次
        let requests = scraper.chain_requests.lock().unwrap();
        assert_eq!(
            *requests,
            vec![
                ("MSFT".to_string(), JAN_20),
                ("MSFT".to_string(), JAN_20),
                ("MSFT".to_string(), JAN_27),
            ]
        );
    }

    #[tokio::test]
    async fn timeout_then_success_retries_once_and_keeps_the_rows() {
        let mut scraper = MockScraper::default();
        scraper
            .expirations
            .insert("MSFT".to_string(), vec![JAN_20]);
        scraper
            .fail_once
            .lock()
            .unwrap()
            .insert(("MSFT".to_string(), JAN_20));
        scraper
            .chains
            .insert(("MSFT".to_string(), JAN_20), chain_with(vec![full_call("1")]));

        let dir = tempfile::tempdir().unwrap();
        let scraper = Arc::new(scraper);
        let service = service_with(Arc::clone(&scraper), dir.path().to_str().unwrap());
        let (rows, diagnostics) = service
            .process_symbol("MSFT", &target_weeks(), &ctx())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert!(diagnostics.is_empty());
        assert_eq!(scraper.chain_requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_field_drops_only_the_offending_row() {
        let mut broken = full_call("2");
        broken.bid = None;

        let mut scraper = MockScraper::default();
        scraper
            .expirations
            .insert("MSFT".to_string(), vec![JAN_20]);
        scraper.chains.insert(
            ("MSFT".to_string(), JAN_20),
            chain_with(vec![full_call("1"), broken, full_call("3")]),
        );

        let dir = tempfile::tempdir().unwrap();
        let service = service_with(Arc::new(scraper), dir.path().to_str().unwrap());
        let (rows, diagnostics) = service
            .process_symbol("MSFT", &target_weeks(), &ctx())
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].contains("bid"));
        assert!(diagnostics[0].contains("01/20/2017"));
        assert!(diagnostics[0].contains(&JAN_20.to_string()));
    }

    #[tokio::test]
    async fn no_matching_weeks_means_no_chain_requests() {
        let mut scraper = MockScraper::default();
        scraper
            .expirations
            .insert("MSFT".to_string(), vec![JAN_20]);

        let far_away: HashSet<TargetWeek> = [TargetWeek { year: 2030, week: 1 }].into();

        let dir = tempfile::tempdir().unwrap();
        let scraper = Arc::new(scraper);
        let service = service_with(Arc::clone(&scraper), dir.path().to_str().unwrap());
        let (rows, diagnostics) = service
            .process_symbol("MSFT", &far_away, &ctx())
            .await
            .unwrap();

        assert!(rows.is_empty());
        assert!(diagnostics.is_empty());
        assert!(scraper.chain_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn absent_profile_yields_empty_industry_and_sector() {
        let mut scraper = MockScraper::default();
        scraper
            .expirations
            .insert("QQQ".to_string(), vec![JAN_20]);
        scraper
            .chains
            .insert(("QQQ".to_string(), JAN_20), chain_with(vec![full_call("1")]));
        // profiles表中没有QQQ，fetch_profile返回默认画像

        let dir = tempfile::tempdir().unwrap();
        let service = service_with(Arc::new(scraper), dir.path().to_str().unwrap());
        let (rows, diagnostics) = service
            .process_symbol("QQQ", &target_weeks(), &ctx())
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert!(diagnostics.is_empty());
        assert_eq!(rows[0].industry, "");
        assert_eq!(rows[0].sector, "");
    }
}
