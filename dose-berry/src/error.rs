//! 运行时错误.

use crate::Idx3d;
use std::path::PathBuf;
use thiserror::Error;

/// 稀疏编码与稠密体数据互转时的错误.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// 线性索引超出体素网格范围. `len` 为网格体素总数.
    #[error("voxel index {index} out of range (grid has {len} voxels)")]
    IndexOutOfRange {
        /// 越界的线性索引.
        index: usize,
        /// 网格体素总数.
        len: usize,
    },

    /// 数据形状与期望网格不一致.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        /// 网格形状.
        expected: Idx3d,
        /// 实际形状.
        found: Idx3d,
    },

    /// 原始数据长度与形状不符.
    #[error("buffer of {len} voxels cannot fill shape {shape:?}")]
    LengthMismatch {
        /// 原始数据长度.
        len: usize,
        /// 目标形状.
        shape: Idx3d,
    },
}

/// 读写稀疏 CSV 文件时的错误.
#[derive(Debug, Error)]
pub enum SparseFileError {
    /// 底层 I/O 错误.
    #[error("I/O error on {path:?}: {source}")]
    Io {
        /// 文件路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },

    /// 内容格式错误. `line` 从 1 开始计数.
    #[error("{path:?}:{line}: {reason}")]
    Parse {
        /// 文件路径.
        path: PathBuf,
        /// 出错的行.
        line: usize,
        /// 原因.
        reason: String,
    },
}

/// 加载单个患者记录时的错误.
///
/// 缺失必需文件的情况通常以 [`crate::dataset::LoadOutcome::Missing`] 返回,
/// 仅在调用者显式要求时才转换为 [`LoadError::MissingRequiredVolume`].
#[derive(Debug, Error)]
pub enum LoadError {
    /// 当前模式要求的体数据不存在.
    #[error("patient `{patient}` lacks required volume `{kind}` ({path:?})")]
    MissingRequiredVolume {
        /// 患者标识.
        patient: String,
        /// 体数据名.
        kind: &'static str,
        /// 期望的文件路径.
        path: PathBuf,
    },

    /// 稀疏索引越界.
    #[error("patient `{patient}`, file {path:?}: {source}")]
    Codec {
        /// 患者标识.
        patient: String,
        /// 出错的文件.
        path: PathBuf,
        /// 编解码错误.
        #[source]
        source: CodecError,
    },

    /// 文件读取或解析失败.
    #[error(transparent)]
    File(#[from] SparseFileError),

    /// 患者目录中出现词表之外的结构文件.
    #[error("patient `{patient}` has structure `{name}` outside the vocabulary")]
    UnknownStructure {
        /// 患者标识.
        patient: String,
        /// 结构文件名.
        name: String,
    },

    /// 患者路径本身不可用 (不是目录, 或无法列出).
    #[error("cannot read patient path {path:?}: {source}")]
    Io {
        /// 患者路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// 错误是否源于体数据与网格不符 (越界索引或形状不一致)?
    #[inline]
    pub fn is_grid_error(&self) -> bool {
        matches!(self, Self::Codec { .. })
    }
}

/// 组装 batch 时的错误.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// 记录的网格形状与配置不一致.
    #[error("patient `{patient}`: grid {found:?} differs from configured {expected:?}")]
    ShapeMismatch {
        /// 患者标识.
        patient: String,
        /// 配置的网格形状.
        expected: Idx3d,
        /// 记录的网格形状.
        found: Idx3d,
    },

    /// 记录没有 CT 通道.
    #[error("patient `{0}` has no CT volume")]
    MissingCt(String),

    /// 记录含词表之外的结构.
    #[error("patient `{patient}` has structure `{name}` outside the vocabulary")]
    UnknownStructure {
        /// 患者标识.
        patient: String,
        /// 结构名.
        name: String,
    },

    /// 同一 batch 内部分记录有剂量, 部分没有.
    #[error("batch mixes patients with and without dose")]
    InconsistentDose,

    /// 空 batch.
    #[error("empty batch")]
    Empty,

    /// 导出 npz 失败.
    #[error("npz export failed: {0}")]
    Npz(String),
}

/// 配置错误. 此类错误对整个队列都是致命的.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 结构词表为空.
    #[error("structure vocabulary is empty")]
    EmptyVocabulary,

    /// 词表中存在重名结构.
    #[error("structure `{0}` appears twice in the vocabulary")]
    DuplicateStructure(String),

    /// 网格形状含零维, 或体素尺寸非正.
    #[error("invalid voxel grid: {0}")]
    InvalidGrid(String),

    /// 指标表引用了词表之外的结构.
    #[error("metric table references unknown structure `{0}`")]
    UnknownStructure(String),

    /// 无法解析的指标名.
    #[error("invalid metric `{0}`")]
    InvalidMetric(String),

    /// batch 大小为 0.
    #[error("batch size must be positive")]
    ZeroBatchSize,

    /// 读取配置文件失败.
    #[error("cannot read config {path:?}: {source}")]
    Io {
        /// 配置文件路径.
        path: PathBuf,
        /// 底层错误.
        #[source]
        source: std::io::Error,
    },

    /// 配置文件格式错误.
    #[cfg(feature = "serde")]
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
}

/// 队列级评估错误.
#[derive(Debug, Error)]
pub enum EvalError {
    /// 配置非法.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// 所有患者都因体数据与网格不符而失败, 说明网格配置本身有误.
    #[error("every patient failed to fit grid {0:?}; the grid is likely misconfigured")]
    GridMisconfigured(Idx3d),
}

/// 调用外部预测模型时的错误.
#[derive(Debug, Error)]
pub enum PredictError {
    /// 组装 batch 失败.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// 模型自身报告的错误.
    #[error("prediction model failed: {0}")]
    Model(String),

    /// 模型返回的剂量个数与 batch 内患者数不一致.
    #[error("model returned {found} dose volumes for a batch of {expected}")]
    CountMismatch {
        /// batch 内患者数.
        expected: usize,
        /// 模型返回的剂量个数.
        found: usize,
    },

    /// 预测剂量形状与网格不符.
    #[error("patient `{patient}`: {source}")]
    Codec {
        /// 患者标识.
        patient: String,
        /// 编解码错误.
        #[source]
        source: CodecError,
    },

    /// 保存预测结果失败.
    #[error(transparent)]
    File(#[from] SparseFileError),
}
