//! ROE Screener - multi-period ROE reconciliation and value ranking for A-shares.

use anyhow::{Context, Result};
use clap::Parser;
use roe_common::config::Config;
use roe_common::logging::init_logging_with_exclusions;
use roe_screener::{EastmoneyAdapter, ReportBuilder, Screener, ScreenerReport, XueqiuAdapter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Rank A-share stocks by multi-period ROE and valuation.
#[derive(Parser, Debug)]
#[command(name = "roe-screener")]
#[command(version)]
#[command(about = "Multi-period ROE screening and value ranking for A-shares.", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.roe-screener/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated report dates, oldest first (e.g. 20231231,20241231,20250630)
    #[arg(long, value_delimiter = ',')]
    periods: Option<Vec<String>>,

    /// Maximum number of ranked instruments
    #[arg(long)]
    limit: Option<usize>,

    /// Report output path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Number of ranked instruments to print
    #[arg(long)]
    top: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(periods) = &self.periods {
            config.screener.periods = periods.clone();
        }
        if let Some(limit) = self.limit {
            config.screener.scoring.max_report_len = limit;
        }
        if let Some(output) = &self.output {
            config.screener.output.report_path = output.display().to_string();
            config.screener.output.write_report = true;
        }
        if let Some(top) = self.top {
            config.screener.output.console_top = top;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_with_env(cli.config.as_deref())?;
    cli.apply(&mut config);

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    info!("ROE Screener v{}", env!("CARGO_PKG_VERSION"));

    let sources = &config.screener.sources;
    let eastmoney = Arc::new(EastmoneyAdapter::new(sources));
    let xueqiu = Arc::new(XueqiuAdapter::new(sources));

    let screener = Screener::new(config.screener.clone(), eastmoney.clone(), xueqiu)
        .context("Invalid screener configuration")?;
    let result = screener.run().await;
    info!("{}", result.summary());

    for stage in &result.filter_results {
        info!(
            stage = %stage.stage,
            passed = stage.passed,
            eliminated = stage.eliminated,
            rate = format!("{:.1}%", stage.elimination_rate),
            "Funnel"
        );
    }

    let output = &config.screener.output;
    let builder = if output.include_sector {
        ReportBuilder::with_profiles(eastmoney)
    } else {
        ReportBuilder::new()
    };
    let rows = builder.build(&result.report).await;

    for row in rows.iter().take(output.console_top) {
        info!(
            rank = row.rank,
            code = %row.instrument,
            name = %row.display_name,
            sector = row.sector.as_deref().unwrap_or("-"),
            avg_roe = format!("{:.2}", row.average_roe),
            pe = format!("{:.2}", row.pe_ratio),
            dy = format!("{:.2}", row.dividend_yield),
            pb = format!("{:.2}", row.pb_ratio),
            score = format!("{:.4}", row.value_score),
            "Ranked"
        );
    }

    if output.write_report {
        let report = ScreenerReport::new(&result, rows);
        report.save_json(&output.resolved_report_path())?;
    }

    Ok(())
}
