//! 队列级剂量评估.
//!
//! 对每个患者, 在参考剂量和预测剂量上用同一组结构掩膜计算指标, 构建两张指标表,
//! 再汇总为 DVH 分数和剂量分数.

mod evaluator;
mod report;
mod score;
mod table;

pub use evaluator::{DoseEvaluator, PatientFailure, Predictions, Stage};
pub use report::EvaluationReport;
pub use score::{dose_error, dose_score, dvh_score, NoScore, Score};
pub use table::{MetricKey, MetricTable};
