//! 对 `dose-berry::dataset` 的更一层封装. 提供由环境变量决定的数据集路径.

use dose_berry::dataset;
use std::env;
use std::path::PathBuf;

/// 读取非空环境变量.
fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// 若环境变量 `key` 非空则返回其值, 否则返回 `$HOME/dataset/open-kbp/{tail}`.
fn dir_from_env_or_home(key: &str, tail: &str) -> PathBuf {
    match non_empty_var(key) {
        Some(d) => PathBuf::from(d),
        None => dataset::home_dataset_dir_with(["open-kbp", tail])
            .unwrap_or_else(|| PathBuf::from("dataset").join("open-kbp").join(tail)),
    }
}

/// 获取参考队列基本路径.
///
/// 1. 若环境变量 `$KBP_REFERENCE_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/open-kbp/reference`.
pub fn reference_dir_from_env_or_home() -> PathBuf {
    dir_from_env_or_home("KBP_REFERENCE_DIR", "reference")
}

/// 获取预测剂量目录.
///
/// 1. 若环境变量 `$KBP_PREDICTION_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/open-kbp/prediction`.
pub fn prediction_dir_from_env_or_home() -> PathBuf {
    dir_from_env_or_home("KBP_PREDICTION_DIR", "prediction")
}

/// `$KBP_CONFIG`: 可选的 JSON 配置文件路径.
#[inline]
pub fn config_path_from_env() -> Option<PathBuf> {
    non_empty_var("KBP_CONFIG").map(PathBuf::from)
}

/// `$KBP_REPORT`: 可选的 TSV 报告输出路径.
#[inline]
pub fn report_path_from_env() -> Option<PathBuf> {
    non_empty_var("KBP_REPORT").map(PathBuf::from)
}

/// 列出参考队列中的全部患者目录, 按名称排序.
#[inline]
pub fn reference_cohort<P: AsRef<std::path::Path>>(root: P) -> std::io::Result<Vec<PathBuf>> {
    dataset::cohort_paths(root)
}
