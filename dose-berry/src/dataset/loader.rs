//! 患者记录加载器.
//!
//! 提供单患者加载和迭代器风格的队列加载两种模式.

use super::record::PatientRecord;
use super::sparse_file::{read_dose_csv, read_sparse_csv, read_voxel_dimensions, SparseFile};
use crate::config::{EvalConfig, StructureVocabulary, VoxelGrid};
use crate::consts::file;
use crate::error::{CodecError, LoadError, SparseFileError};
use crate::volume::{self, DoseVolume, Mask};
use std::fs;
use std::path::{Path, PathBuf};

/// 加载模式. 决定需要读取哪些文件.
///
/// | 模式             | 必需                  | 可选                          |
/// |------------------|-----------------------|-------------------------------|
/// | `Training`       | ct, dose              | 结构, 受照掩膜, 体素尺寸      |
/// | `DosePrediction` | ct, 受照掩膜          | 结构, 体素尺寸                |
/// | `Evaluation`     | dose, 受照掩膜        | 结构, 体素尺寸                |
/// | `PredictedDose`  | 预测剂量文件本身      | -                             |
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LoadMode {
    /// 模型训练: 需要输入和真值剂量.
    Training,

    /// 剂量预测 (推理): 不需要真值剂量.
    DosePrediction,

    /// 评估: 需要参考剂量和受照掩膜.
    Evaluation,

    /// 读取单个预测剂量文件 `{patient_id}.csv`.
    PredictedDose,
}

/// 文件的使用方式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Usage {
    Required,
    Optional,
    Unused,
}

/// 患者目录中的非结构体数据.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VolumeKind {
    /// CT 扫描.
    Ct,

    /// 参考剂量.
    Dose,

    /// 可能受照区域掩膜.
    PossibleDoseMask,

    /// 预测剂量.
    PredictedDose,
}

impl VolumeKind {
    /// 文件名 (不含扩展名). 预测剂量以患者标识命名, 此处返回其类别名.
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            VolumeKind::Ct => file::CT,
            VolumeKind::Dose => file::DOSE,
            VolumeKind::PossibleDoseMask => file::POSSIBLE_DOSE_MASK,
            VolumeKind::PredictedDose => "predicted_dose",
        }
    }
}

impl LoadMode {
    fn usage(&self, kind: VolumeKind) -> Usage {
        use LoadMode::*;
        use VolumeKind::*;
        match (self, kind) {
            (Training, Ct | Dose) => Usage::Required,
            (Training, PossibleDoseMask) => Usage::Optional,
            (DosePrediction, Ct | PossibleDoseMask) => Usage::Required,
            (Evaluation, Dose | PossibleDoseMask) => Usage::Required,
            (LoadMode::PredictedDose, VolumeKind::PredictedDose) => Usage::Required,
            _ => Usage::Unused,
        }
    }

    /// 当前模式必需的体数据.
    pub fn required(&self) -> Vec<VolumeKind> {
        use VolumeKind::*;
        [Ct, Dose, PossibleDoseMask, PredictedDose]
            .into_iter()
            .filter(|k| self.usage(*k) == Usage::Required)
            .collect()
    }

    /// 是否读取结构掩膜.
    #[inline]
    pub fn reads_structures(&self) -> bool {
        !matches!(self, LoadMode::PredictedDose)
    }
}

/// 缺失必需体数据的原因.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MissingVolume {
    /// 患者标识.
    pub patient: String,

    /// 缺失的体数据.
    pub kind: VolumeKind,

    /// 期望的文件路径.
    pub path: PathBuf,
}

impl MissingVolume {
    /// 转换为错误, 供选择中止运行的调用者使用.
    pub fn into_error(self) -> LoadError {
        LoadError::MissingRequiredVolume {
            patient: self.patient,
            kind: self.kind.name(),
            path: self.path,
        }
    }
}

/// 加载结果. 调用者需要显式决定 `Missing` 时跳过还是中止.
#[derive(Debug)]
pub enum LoadOutcome {
    /// 加载成功.
    Loaded(PatientRecord),

    /// 缺失当前模式必需的体数据.
    Missing(MissingVolume),
}

impl LoadOutcome {
    /// 将 `Missing` 视为错误.
    pub fn into_result(self) -> Result<PatientRecord, LoadError> {
        match self {
            LoadOutcome::Loaded(r) => Ok(r),
            LoadOutcome::Missing(m) => Err(m.into_error()),
        }
    }

    /// 将 `Missing` 视为跳过.
    pub fn loaded(self) -> Option<PatientRecord> {
        match self {
            LoadOutcome::Loaded(r) => Some(r),
            LoadOutcome::Missing(_) => None,
        }
    }
}

/// 患者记录加载器. 持有网格与词表的只读引用.
#[derive(Copy, Clone, Debug)]
pub struct PatientLoader<'a> {
    grid: &'a VoxelGrid,
    vocabulary: &'a StructureVocabulary,
    mode: LoadMode,
}

#[inline]
fn sparse_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}.{}", file::SPARSE_EXT))
}

#[inline]
fn patient_id(path: &Path, use_stem: bool) -> String {
    let part = if use_stem {
        path.file_stem()
    } else {
        path.file_name()
    };
    part.map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

impl<'a> PatientLoader<'a> {
    /// 初始化.
    #[inline]
    pub fn new(grid: &'a VoxelGrid, vocabulary: &'a StructureVocabulary, mode: LoadMode) -> Self {
        Self {
            grid,
            vocabulary,
            mode,
        }
    }

    /// 从完整配置初始化.
    #[inline]
    pub fn from_config(config: &'a EvalConfig, mode: LoadMode) -> Self {
        Self::new(&config.grid, &config.vocabulary, mode)
    }

    /// 加载模式.
    #[inline]
    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    /// 加载一个患者.
    ///
    /// `path` 在 `PredictedDose` 模式下为预测剂量文件, 其余模式下为患者目录.
    /// 患者标识分别取文件名主干和目录名.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<LoadOutcome, LoadError> {
        let path = path.as_ref();
        match self.mode {
            LoadMode::PredictedDose => self.load_predicted(path),
            _ => self.load_patient_dir(path),
        }
    }

    /// 迭代加载队列中的每个患者.
    pub fn cohort<I: IntoIterator<Item = PathBuf>>(&self, paths: I) -> CohortLoader<'a> {
        let mut data: Vec<PathBuf> = paths.into_iter().collect();
        data.reverse();
        CohortLoader {
            loader: *self,
            data_rev: data,
        }
    }

    fn load_predicted(&self, path: &Path) -> Result<LoadOutcome, LoadError> {
        let id = patient_id(path, true);
        if !path.is_file() {
            return Ok(LoadOutcome::Missing(MissingVolume {
                patient: id,
                kind: VolumeKind::PredictedDose,
                path: path.to_owned(),
            }));
        }
        let dose = self.decode_values(&id, path, true)?;
        let record = PatientRecord::new(id.as_str(), *self.grid)
            .with_dose(dose)
            .map_err(|source| LoadError::Codec {
                patient: id.clone(),
                path: path.to_owned(),
                source,
            })?;
        log::debug!("loaded predicted dose of `{id}`");
        Ok(LoadOutcome::Loaded(record))
    }

    fn load_patient_dir(&self, dir: &Path) -> Result<LoadOutcome, LoadError> {
        let id = patient_id(dir, false);
        self.check_structure_names(&id, dir)?;

        for kind in self.mode.required() {
            let path = sparse_path(dir, kind.name());
            if !path.is_file() {
                return Ok(LoadOutcome::Missing(MissingVolume {
                    patient: id,
                    kind,
                    path,
                }));
            }
        }

        let codec_err = |path: &Path| {
            let (patient, path) = (id.clone(), path.to_owned());
            move |source: CodecError| LoadError::Codec {
                patient,
                path,
                source,
            }
        };

        let mut record = PatientRecord::new(id.as_str(), *self.grid);

        let dims_path = sparse_path(dir, file::VOXEL_DIMENSIONS);
        if dims_path.is_file() {
            record = record.with_voxel_dimensions(read_voxel_dimensions(&dims_path)?);
        }

        if let Some(path) = self.present(dir, VolumeKind::Ct) {
            let ct = self.decode_values(&id, &path, false)?;
            record = record.with_ct(ct).map_err(codec_err(&path))?;
        }
        if let Some(path) = self.present(dir, VolumeKind::Dose) {
            let dose = self.decode_values(&id, &path, true)?;
            record = record.with_dose(dose).map_err(codec_err(&path))?;
        }
        if let Some(path) = self.present(dir, VolumeKind::PossibleDoseMask) {
            let mask = self.decode_mask(&id, &path)?;
            record = record
                .with_possible_dose_mask(mask)
                .map_err(codec_err(&path))?;
        }

        if self.mode.reads_structures() {
            for structure in self.vocabulary.iter() {
                let path = sparse_path(dir, structure.name());
                // 缺失结构是合法的: 该患者没有这个结构.
                if !path.is_file() {
                    continue;
                }
                let mask = self.decode_mask(&id, &path)?;
                record = record
                    .with_structure(structure.clone(), mask)
                    .map_err(codec_err(&path))?;
            }
        }

        log::debug!(
            "loaded `{id}` ({:?}): {} structures",
            self.mode,
            record.structures().len()
        );
        Ok(LoadOutcome::Loaded(record))
    }

    /// 当前模式会读取且文件存在时返回其路径.
    fn present(&self, dir: &Path, kind: VolumeKind) -> Option<PathBuf> {
        if self.mode.usage(kind) == Usage::Unused {
            return None;
        }
        Some(sparse_path(dir, kind.name())).filter(|p| p.is_file())
    }

    /// 目录中的稀疏文件必须是保留文件或词表中的结构.
    fn check_structure_names(&self, id: &str, dir: &Path) -> Result<(), LoadError> {
        let io_err = |source| LoadError::Io {
            path: dir.to_owned(),
            source,
        };
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().map_or(true, |e| e != file::SPARSE_EXT) {
                continue;
            }
            let stem = patient_id(&path, true);
            if !file::is_reserved(&stem) && self.vocabulary.get(&stem).is_none() {
                return Err(LoadError::UnknownStructure {
                    patient: id.to_string(),
                    name: stem,
                });
            }
        }
        Ok(())
    }

    /// 读取带数值列的体数据. `dose` 为真时数值必须非负.
    fn decode_values(&self, id: &str, path: &Path, dose: bool) -> Result<DoseVolume, LoadError> {
        let f = if dose {
            read_dose_csv(path)?
        } else {
            read_sparse_csv(path)?
        };
        if f.is_mask() && !f.indices.is_empty() {
            return Err(SparseFileError::Parse {
                path: path.to_owned(),
                line: 1,
                reason: "value column is missing".to_string(),
            }
            .into());
        }
        volume::decode(f.pairs(), self.grid.shape).map_err(|source| LoadError::Codec {
            patient: id.to_string(),
            path: path.to_owned(),
            source,
        })
    }

    fn decode_mask(&self, id: &str, path: &Path) -> Result<Mask, LoadError> {
        let f: SparseFile = read_sparse_csv(path)?;
        // 带数值列的掩膜文件: 非零即选中.
        let indices = f.pairs().filter(|(_, v)| *v != 0.0).map(|(i, _)| i);
        volume::decode_mask(indices, self.grid.shape).map_err(|source| LoadError::Codec {
            patient: id.to_string(),
            path: path.to_owned(),
            source,
        })
    }
}

/// 队列加载器. 按输入顺序逐个加载患者.
#[derive(Debug)]
pub struct CohortLoader<'a> {
    loader: PatientLoader<'a>,
    data_rev: Vec<PathBuf>,
}

impl Iterator for CohortLoader<'_> {
    type Item = (PathBuf, Result<LoadOutcome, LoadError>);

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.data_rev.pop()?;
        let data = self.loader.load(&path);
        Some((path, data))
    }
}

impl ExactSizeIterator for CohortLoader<'_> {
    #[inline]
    fn len(&self) -> usize {
        self.data_rev.len()
    }
}
