//! OpenKBP 队列评估.
//!
//! 由环境变量驱动: `$KBP_REFERENCE_DIR`, `$KBP_PREDICTION_DIR`, `$KBP_CONFIG`, `$KBP_REPORT`.
//! 日志级别由 `$RUST_LOG` 决定, 默认 `info`.

mod result;
mod runner;

use anyhow::Context;
use log::LevelFilter;
use simple_logger::SimpleLogger;

fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .context("installing logger")?;

    let summary = runner::run()?;
    summary.analyze()?;

    if let Some(p) = utils::loader::report_path_from_env() {
        summary
            .save(&p)
            .with_context(|| format!("writing report {p:?}"))?;
        log::info!("report written to {p:?}");
    }
    Ok(())
}
