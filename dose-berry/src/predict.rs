//! 外部剂量预测模型的接入.
//!
//! 模型本身不在本 crate 内. 调用者实现 [`DosePredictor`], 由 [`predict_cohort`]
//! 逐 batch 驱动, 并将结果写为 `PredictedDose` 模式可读回的 `{patient_id}.csv`.

use crate::consts::file::SPARSE_EXT;
use crate::dataset::{write_sparse_csv, Batch, BatchAssembler, PatientRecord};
use crate::error::PredictError;
use crate::volume::{encode, DoseVolume};
use std::path::{Path, PathBuf};

/// 剂量预测模型.
pub trait DosePredictor {
    /// 对 batch 内每个患者给出一个预测剂量, 顺序与 [`Batch::ids`] 一致.
    fn predict(&mut self, batch: &Batch) -> Result<Vec<DoseVolume>, PredictError>;
}

impl<F> DosePredictor for F
where
    F: FnMut(&Batch) -> Result<Vec<DoseVolume>, PredictError>,
{
    #[inline]
    fn predict(&mut self, batch: &Batch) -> Result<Vec<DoseVolume>, PredictError> {
        self(batch)
    }
}

/// 将模型输出修正为可保存的剂量: 负值置 0, 可能受照区域之外置 0.
fn finalize(record: &PatientRecord, mut dose: DoseVolume) -> Result<DoseVolume, PredictError> {
    dose.check_shape(record.grid().shape)
        .map_err(|source| PredictError::Codec {
            patient: record.id().to_string(),
            source,
        })?;
    let mask = record.possible_dose_mask().map(|m| m.as_slice());
    for (i, v) in dose.as_slice_mut().iter_mut().enumerate() {
        let inside = mask.map_or(true, |m| m[i]);
        *v = if inside { v.max(0.0) } else { 0.0 };
    }
    Ok(dose)
}

/// 对整个队列运行预测, 并将每个患者的结果写入 `out_dir/{patient_id}.csv`.
///
/// 末尾不足一个 batch 的患者同样会被预测. 返回写出的文件路径, 顺序与 `records` 一致.
pub fn predict_cohort<P, D>(
    records: &[PatientRecord],
    assembler: &BatchAssembler<'_>,
    predictor: &mut D,
    out_dir: P,
) -> Result<Vec<PathBuf>, PredictError>
where
    P: AsRef<Path>,
    D: DosePredictor + ?Sized,
{
    let out_dir = out_dir.as_ref();
    let records_by_batch = records.chunks(assembler.batch_size());
    let total = records_by_batch.len();
    let mut written = Vec::with_capacity(records.len());

    for (no, (batch, chunk)) in assembler
        .all_batches(records)
        .zip(records_by_batch)
        .enumerate()
    {
        let batch = batch?;
        let doses = predictor.predict(&batch)?;
        if doses.len() != chunk.len() {
            return Err(PredictError::CountMismatch {
                expected: chunk.len(),
                found: doses.len(),
            });
        }
        for (record, dose) in chunk.iter().zip(doses) {
            let dose = finalize(record, dose)?;
            let path = out_dir.join(format!("{}.{SPARSE_EXT}", record.id()));
            write_sparse_csv(&path, encode(&dose))?;
            written.push(path);
        }
        log::info!("predicted batch {}/{total} ({} patients)", no + 1, chunk.len());
    }
    Ok(written)
}
