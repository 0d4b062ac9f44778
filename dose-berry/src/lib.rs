#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 提供 OpenKBP 稀疏格式放疗计划数据的加载、模型输入组装, 以及基于剂量体积直方图
//! (DVH) 的预测剂量评估.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 所有体数据共享同一个体素网格 (默认 128 × 128 × 128), 线性索引按行主序
//!   `i = (x * Y + y) * Z + z` 计算.
//! 2. 网格、结构词表、指标表均为不可变配置, 显式传入各组件.
//! 3. 无定义的指标 (如空结构上的 Dx) 以 `None` 表示, 从不被当作 0.
//!
//! # 开发计划
//!
//! ### 稀疏体数据编解码 ✅
//!
//! 稀疏 `(index, value)` 与稠密 3D 体数据互转, 越界索引直接报错.
//!
//! 实现位于 `dose-berry/src/volume`.
//!
//! ### 患者记录加载 ✅
//!
//! 训练、推理、评估、预测剂量四种模式, 各自只读取所需文件.
//! 缺失必需文件以 `LoadOutcome::Missing` 返回, 由调用者决定跳过还是中止.
//!
//! 实现位于 `dose-berry/src/dataset/loader.rs`.
//!
//! ### batch 组装与 npz 导出 ✅
//!
//! 通道顺序: CT, 各结构, (可选) 剂量.
//!
//! 实现位于 `dose-berry/src/dataset/batch.rs`.
//!
//! ### DVH 指标 ✅
//!
//! 1. Dx / D_cc / Vx / Vx_cc / mean. ✅
//! 2. 百分位约定可配置 (nearest-rank / linear), 两种边界都有测试. ✅
//!
//! 实现位于 `dose-berry/src/dvh`.
//!
//! ### 队列评估 ✅
//!
//! DVH 分数 & 剂量分数. 单个患者失败只排除该患者; 网格配置错误则整体中止.
//!
//! 实现位于 `dose-berry/src/eval`.
//!
//! ### 外部预测模型接入 ✅
//!
//! 实现位于 `dose-berry/src/predict.rs`.

/// 三维索引 / 形状.
pub type Idx3d = (usize, usize, usize);

pub mod config;
pub mod consts;
pub mod dataset;
pub mod dvh;
pub mod error;
pub mod eval;
pub mod predict;
pub mod prelude;
pub mod volume;

pub use config::{
    BatchConfig, EvalConfig, MetricSpecTable, Structure, StructureCategory, StructureVocabulary,
    VoxelGrid,
};
pub use dvh::{DvhEngine, MetricKind, PercentileConvention};
pub use eval::{DoseEvaluator, EvaluationReport, Predictions, Score};
pub use volume::{CtVolume, DoseVolume, Mask, Volume};
