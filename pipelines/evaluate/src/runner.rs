//! 程序运行函数.

use crate::result::EvaluationSummary;
use anyhow::{ensure, Context};
use dose_berry::dataset::LoadMode;
use dose_berry::{DoseEvaluator, EvalConfig, Predictions};
use utils::loader;

/// 读取配置. 未设置 `$KBP_CONFIG` 时使用 OpenKBP 默认配置.
fn load_config() -> anyhow::Result<EvalConfig> {
    match loader::config_path_from_env() {
        Some(p) => {
            log::info!("reading config from {p:?}");
            EvalConfig::from_json_file(&p).with_context(|| format!("loading config {p:?}"))
        }
        None => Ok(EvalConfig::default()),
    }
}

/// 实际运行.
pub fn run() -> anyhow::Result<EvaluationSummary> {
    let evaluator = DoseEvaluator::new(load_config()?)?;

    let reference_dir = loader::reference_dir_from_env_or_home();
    ensure!(
        reference_dir.is_dir(),
        "reference cohort {reference_dir:?} is not a directory"
    );
    let paths = loader::reference_cohort(&reference_dir)
        .with_context(|| format!("listing {reference_dir:?}"))?;

    let prediction_dir = loader::prediction_dir_from_env_or_home();
    let predictions = if prediction_dir.is_dir() {
        Predictions::Directory(prediction_dir)
    } else {
        log::info!("{prediction_dir:?} not found, building reference metrics only");
        Predictions::None
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(utils::cpus())
        .build()
        .context("building thread pool")?;

    println!("Evaluating {} patients...", paths.len());
    let report =
        pool.install(|| evaluator.evaluate_dir(&paths, LoadMode::Evaluation, &predictions))?;
    Ok(EvaluationSummary::new(report))
}
