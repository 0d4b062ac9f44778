//! 将患者记录组装为模型输入张量.
//!
//! 通道顺序固定: CT, 词表中每个结构各一个通道 (患者缺失该结构时全零),
//! 随后是可选的剂量通道.

use super::record::PatientRecord;
use crate::config::{BatchConfig, EvalConfig, StructureVocabulary, VoxelGrid};
use crate::error::BatchError;
use ndarray::{s, Array5, ArrayView5, Axis};
use ndarray_npy::NpzWriter;
use std::fs::File;
use std::path::Path;

/// 一个 batch. 张量形状为 `(患者, 通道, x, y, z)`.
#[derive(Clone, Debug)]
pub struct Batch {
    ids: Vec<String>,
    data: Array5<f32>,
    has_dose: bool,
}

impl Batch {
    /// batch 内的患者标识, 与张量第 0 维一一对应.
    #[inline]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// 患者数.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// 通道总数.
    #[inline]
    pub fn channels(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    /// 是否带剂量通道.
    #[inline]
    pub fn has_dose(&self) -> bool {
        self.has_dose
    }

    /// 全部通道.
    #[inline]
    pub fn data(&self) -> ArrayView5<'_, f32> {
        self.data.view()
    }

    /// 模型输入通道 (CT + 结构).
    pub fn inputs(&self) -> ArrayView5<'_, f32> {
        let end = self.channels() - usize::from(self.has_dose);
        self.data.slice(s![.., ..end, .., .., ..])
    }

    /// 剂量通道, 形状 `(患者, 1, x, y, z)`.
    pub fn dose(&self) -> Option<ArrayView5<'_, f32>> {
        let c = self.channels();
        self.has_dose
            .then(|| self.data.slice(s![.., c - 1.., .., .., ..]))
    }

    /// 导出为 `.npz`, 供进程外的模型读取. 数组依次为 `inputs` 和 (可选的) `dose`.
    pub fn write_npz<P: AsRef<Path>>(&self, path: P) -> Result<(), BatchError> {
        let file = File::create(path.as_ref()).map_err(npz_err)?;
        let mut npz = NpzWriter::new(file);
        npz.add_array("inputs.npy", &self.inputs()).map_err(npz_err)?;
        if let Some(dose) = self.dose() {
            npz.add_array("dose.npy", &dose).map_err(npz_err)?;
        }
        npz.finish().map_err(npz_err)?;
        Ok(())
    }
}

#[inline]
fn npz_err(e: impl std::fmt::Display) -> BatchError {
    BatchError::Npz(e.to_string())
}

/// batch 组装器.
#[derive(Copy, Clone, Debug)]
pub struct BatchAssembler<'a> {
    grid: &'a VoxelGrid,
    vocabulary: &'a StructureVocabulary,
    config: BatchConfig,
}

impl<'a> BatchAssembler<'a> {
    /// 初始化.
    #[inline]
    pub fn new(
        grid: &'a VoxelGrid,
        vocabulary: &'a StructureVocabulary,
        config: BatchConfig,
    ) -> Self {
        Self {
            grid,
            vocabulary,
            config,
        }
    }

    /// 从完整配置初始化.
    #[inline]
    pub fn from_config(config: &'a EvalConfig) -> Self {
        Self::new(&config.grid, &config.vocabulary, config.batch)
    }

    /// 每个 batch 的患者数.
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.config.batch_size.max(1)
    }

    /// 输入通道数 (CT + 结构).
    #[inline]
    pub fn input_channels(&self) -> usize {
        1 + self.vocabulary.len()
    }

    /// `n` 个患者能组成的 batch 数.
    pub fn batch_count(&self, n: usize) -> usize {
        let size = self.batch_size();
        if self.config.drop_remainder {
            n / size
        } else {
            n.div_ceil(size)
        }
    }

    /// 将 `records` 整体组装为一个 batch, 保持患者顺序.
    pub fn assemble(&self, records: &[PatientRecord]) -> Result<Batch, BatchError> {
        if records.is_empty() {
            return Err(BatchError::Empty);
        }
        let with_dose = records.iter().filter(|r| r.dose().is_some()).count();
        let has_dose = match with_dose {
            0 => false,
            n if n == records.len() => true,
            _ => return Err(BatchError::InconsistentDose),
        };

        let (x, y, z) = self.grid.shape;
        let channels = self.input_channels() + usize::from(has_dose);
        let mut data = Array5::<f32>::zeros((records.len(), channels, x, y, z));

        for (i, record) in records.iter().enumerate() {
            let found = record.grid().shape;
            if found != self.grid.shape {
                return Err(BatchError::ShapeMismatch {
                    patient: record.id().to_string(),
                    expected: self.grid.shape,
                    found,
                });
            }
            let ct = record
                .ct()
                .ok_or_else(|| BatchError::MissingCt(record.id().to_string()))?;
            data.slice_mut(s![i, 0, .., .., ..]).assign(&ct.view());

            for sm in record.structures() {
                let c = self.vocabulary.position(sm.structure.name()).ok_or_else(|| {
                    BatchError::UnknownStructure {
                        patient: record.id().to_string(),
                        name: sm.structure.name().to_string(),
                    }
                })?;
                data.slice_mut(s![i, 1 + c, .., .., ..])
                    .assign(&sm.mask.view().mapv(f32::from));
            }

            if let Some(dose) = record.dose() {
                data.slice_mut(s![i, channels - 1, .., .., ..])
                    .assign(&dose.view());
            }
        }

        Ok(Batch {
            ids: records.iter().map(|r| r.id().to_string()).collect(),
            data,
            has_dose,
        })
    }

    /// 按配置的 batch 大小依次组装. 是否保留末尾不足的 batch 由配置决定.
    pub fn batches<'r>(
        &self,
        records: &'r [PatientRecord],
    ) -> impl ExactSizeIterator<Item = Result<Batch, BatchError>> + 'r
    where
        'a: 'r,
    {
        let size = self.batch_size();
        let limit = self.batch_count(records.len()) * size;
        let this: BatchAssembler<'r> = *self;
        records[..limit.min(records.len())]
            .chunks(size)
            .map(move |chunk| this.assemble(chunk))
    }

    /// 同 `batches`, 但总是保留末尾不足的 batch. 用于推理, 保证每个患者都被处理.
    pub fn all_batches<'r>(
        &self,
        records: &'r [PatientRecord],
    ) -> impl ExactSizeIterator<Item = Result<Batch, BatchError>> + 'r
    where
        'a: 'r,
    {
        let this: BatchAssembler<'r> = *self;
        records
            .chunks(self.batch_size())
            .map(move |chunk| this.assemble(chunk))
    }
}
