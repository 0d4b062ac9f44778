//! 队列级不可变配置.
//!
//! 网格、结构词表、指标表都作为不可变值显式传入各组件, 不存在全局可变状态.

mod grid;
mod metric_table;
mod structure;

pub use grid::VoxelGrid;
pub use metric_table::MetricSpecTable;
pub use structure::{Structure, StructureCategory, StructureVocabulary};

use crate::dvh::PercentileConvention;
use crate::error::ConfigError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// batch 组装配置.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BatchConfig {
    /// 每个 batch 的患者数.
    pub batch_size: usize,

    /// 是否丢弃末尾不足 `batch_size` 的 batch.
    pub drop_remainder: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            drop_remainder: true,
        }
    }
}

/// 一次评估/预测运行的全部配置.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Clone, Debug, PartialEq, Default)]
pub struct EvalConfig {
    /// 体素网格.
    pub grid: VoxelGrid,

    /// 结构词表.
    pub vocabulary: StructureVocabulary,

    /// 指标表.
    pub metrics: MetricSpecTable,

    /// Dx 百分位约定.
    pub convention: PercentileConvention,

    /// batch 配置.
    pub batch: BatchConfig,
}

impl EvalConfig {
    /// 检查所有子配置. 任一非法即返回 `Err`, 此时整个运行应当中止.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.validate()?;
        self.vocabulary.validate()?;
        self.metrics.validate(&self.vocabulary)?;
        if self.batch.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl EvalConfig {
    /// 从 JSON 文本读取并校验配置. 缺省字段取 OpenKBP 默认值.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let ans: Self = serde_json::from_str(s)?;
        ans.validate()?;
        Ok(ans)
    }

    /// 从 JSON 文件读取并校验配置.
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}
