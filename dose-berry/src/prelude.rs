//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx3d;

pub use crate::config::{
    BatchConfig, EvalConfig, MetricSpecTable, Structure, StructureCategory, StructureVocabulary,
    VoxelGrid,
};
pub use crate::volume::{decode, decode_mask, encode, encode_mask, CtVolume, DoseVolume, Mask};

pub use crate::dataset::{
    self, cohort_paths, home_dataset_dir_with, prediction_paths, Batch, BatchAssembler, LoadMode,
    LoadOutcome, PatientLoader, PatientRecord,
};

pub use crate::dvh::{DvhEngine, MetricKind, PercentileConvention, StructureDose};
pub use crate::eval::{
    DoseEvaluator, EvaluationReport, MetricKey, MetricTable, NoScore, PatientFailure, Predictions,
    Score,
};
pub use crate::predict::{predict_cohort, DosePredictor};

pub use crate::consts::{roi, MM3_PER_CC, OPENKBP_SHAPE};
pub use crate::error::{
    BatchError, CodecError, ConfigError, EvalError, LoadError, PredictError, SparseFileError,
};
