use optionshub::config::Config;
use optionshub::models::option::RunContext;
use optionshub::scrapers::yahoo::YahooScraper;
use optionshub::services::report_service::ReportService;
use optionshub::sheets;
use optionshub::updater;

use clap::{App, Arg, SubCommand};
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    // 创建基本的命令行应用
    let app = App::new("OptionsHub")
        .version(env!("CARGO_PKG_VERSION"))
        .author("OptionsHub Team")
        .about("Options chain downloader and report generator");

    // 在开发模式下添加调试参数
    #[cfg(debug_assertions)]
    let app = app
        .arg(
            Arg::with_name("debug")
                .long("debug")
                .help("Enable debug mode")
                .takes_value(false),
        )
        .arg(
            Arg::with_name("debug-limit")
                .long("debug-limit")
                .help("Limit the number of symbols to process in debug mode")
                .takes_value(true)
                .default_value("2"),
        );

    // 添加子命令
    let app = app.subcommand(
        SubCommand::with_name("report")
            .about("Download option chains and build the CSV report")
            .arg(
                Arg::with_name("symbols")
                    .short('s')
                    .long("symbols")
                    .value_name("FILE")
                    .help("Symbols and reference data sheet (csv or xlsx)")
                    .takes_value(true)
                    .default_value("stock_symbols.csv"),
            )
            .arg(
                Arg::with_name("dates")
                    .short('d')
                    .long("dates")
                    .value_name("FILE")
                    .help("Target expiration dates sheet (csv or xlsx)")
                    .takes_value(true)
                    .default_value("target_dates.csv"),
            )
            .arg(
                Arg::with_name("output-dir")
                    .short('o')
                    .long("output-dir")
                    .value_name("DIR")
                    .help("Directory to write the report into")
                    .takes_value(true)
                    .default_value("."),
            )
            .arg(
                Arg::with_name("skip-update-check")
                    .long("skip-update-check")
                    .help("Do not check for a newer release on startup")
                    .takes_value(false),
            ),
    );

    let matches = app.get_matches();

    // 获取调试模式设置
    #[cfg(debug_assertions)]
    let debug_mode = matches.is_present("debug");
    #[cfg(not(debug_assertions))]
    let debug_mode = false;

    #[cfg(debug_assertions)]
    let debug_symbol_limit = matches
        .value_of("debug-limit")
        .unwrap_or("2")
        .parse::<usize>()
        .unwrap_or(2);
    #[cfg(not(debug_assertions))]
    let debug_symbol_limit = usize::MAX;

    if let Some(matches) = matches.subcommand_matches("report") {
        if !matches.is_present("skip-update-check") {
            updater::check_for_updates().await;
        }

        let config = Config::new()
            .with_symbols_path(matches.value_of("symbols").unwrap())
            .with_dates_path(matches.value_of("dates").unwrap())
            .with_output_dir(matches.value_of("output-dir").unwrap())
            .with_debug_mode(debug_mode)
            .with_debug_symbol_limit(debug_symbol_limit);

        // 任一参考数据表缺失时已生成模板，正常退出等用户填写
        let sheet = match sheets::load_reference_sheet(&config.symbols_path)? {
            Some(sheet) => sheet,
            None => return Ok(()),
        };
        let weeks = match sheets::load_target_weeks(&config.dates_path)? {
            Some(weeks) => weeks,
            None => return Ok(()),
        };

        if sheet.symbols.is_empty() {
            error!("{} 中没有可用的股票代码", config.symbols_path);
            anyhow::bail!("no symbols to process");
        }
        if weeks.is_empty() {
            error!("{} 中没有可用的目标日期", config.dates_path);
            anyhow::bail!("no target dates to process");
        }

        info!("{} symbols, {} target weeks", sheet.symbols.len(), weeks.len());

        let ctx = RunContext::now();
        let scraper = Arc::new(YahooScraper::new()?);
        let service = ReportService::new(config, scraper);

        let summary = service.generate(&sheet, &weeks, &ctx).await?;

        info!(
            "处理 {} 只股票（跳过 {}），输出 {} 行，{} 条诊断信息",
            summary.symbols_processed,
            summary.symbols_skipped,
            summary.row_count,
            summary.diagnostic_count
        );
        info!("Report written to {}", summary.output_path.display());
    } else {
        info!("No command specified. Use --help for usage information.");
    }

    Ok(())
}
