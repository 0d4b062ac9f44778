use crate::config::{Structure, VoxelGrid};
use crate::error::CodecError;
use crate::volume::{CtVolume, DoseVolume, Mask};

/// 一个结构及其掩膜.
#[derive(Clone, Debug)]
pub struct StructureMask {
    /// 词表中的结构.
    pub structure: Structure,

    /// 结构掩膜, 形状与网格一致.
    pub mask: Mask,
}

/// 单个患者的全部稠密体数据. 构造完成后不再修改.
///
/// 哪些体数据存在取决于加载模式 (见 [`super::LoadMode`]);
/// `structures` 只包含患者实际具有的结构, 并按词表顺序排列.
#[derive(Clone, Debug)]
pub struct PatientRecord {
    id: String,
    grid: VoxelGrid,
    voxel_dims: [f64; 3],
    ct: Option<CtVolume>,
    dose: Option<DoseVolume>,
    structures: Vec<StructureMask>,
    possible_dose_mask: Option<Mask>,
}

impl PatientRecord {
    /// 创建空记录. 体素尺寸取网格默认值.
    pub fn new(id: impl Into<String>, grid: VoxelGrid) -> Self {
        Self {
            id: id.into(),
            voxel_dims: grid.spacing_mm,
            grid,
            ct: None,
            dose: None,
            structures: Vec::new(),
            possible_dose_mask: None,
        }
    }

    /// 设置 CT. 形状与网格不一致时返回 `Err`.
    pub fn with_ct(mut self, ct: CtVolume) -> Result<Self, CodecError> {
        ct.check_shape(self.grid.shape)?;
        self.ct = Some(ct);
        Ok(self)
    }

    /// 设置剂量. 形状与网格不一致时返回 `Err`.
    pub fn with_dose(mut self, dose: DoseVolume) -> Result<Self, CodecError> {
        dose.check_shape(self.grid.shape)?;
        self.dose = Some(dose);
        Ok(self)
    }

    /// 设置可能受照区域掩膜. 形状与网格不一致时返回 `Err`.
    pub fn with_possible_dose_mask(mut self, mask: Mask) -> Result<Self, CodecError> {
        mask.check_shape(self.grid.shape)?;
        self.possible_dose_mask = Some(mask);
        Ok(self)
    }

    /// 追加一个结构掩膜. 调用者负责按词表顺序追加.
    pub fn with_structure(mut self, structure: Structure, mask: Mask) -> Result<Self, CodecError> {
        mask.check_shape(self.grid.shape)?;
        self.structures.push(StructureMask { structure, mask });
        Ok(self)
    }

    /// 设置体素物理尺寸 (毫米).
    #[inline]
    pub fn with_voxel_dimensions(mut self, dims: [f64; 3]) -> Self {
        self.voxel_dims = dims;
        self
    }

    /// 患者标识.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 体素网格.
    #[inline]
    pub fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    /// 体素物理尺寸 (毫米).
    #[inline]
    pub fn voxel_dimensions(&self) -> [f64; 3] {
        self.voxel_dims
    }

    /// 单个体素的体积 (立方毫米).
    #[inline]
    pub fn voxel_mm3(&self) -> f64 {
        self.voxel_dims.iter().product()
    }

    /// CT 扫描.
    #[inline]
    pub fn ct(&self) -> Option<&CtVolume> {
        self.ct.as_ref()
    }

    /// 剂量. 在 `PredictedDose` 模式下为预测剂量.
    #[inline]
    pub fn dose(&self) -> Option<&DoseVolume> {
        self.dose.as_ref()
    }

    /// 取出剂量, 消费自我.
    #[inline]
    pub fn into_dose(self) -> Option<DoseVolume> {
        self.dose
    }

    /// 可能受照区域掩膜.
    #[inline]
    pub fn possible_dose_mask(&self) -> Option<&Mask> {
        self.possible_dose_mask.as_ref()
    }

    /// 患者具有的结构, 按词表顺序排列.
    #[inline]
    pub fn structures(&self) -> &[StructureMask] {
        &self.structures
    }

    /// 按名称获取结构掩膜.
    pub fn structure(&self, name: &str) -> Option<&Mask> {
        self.structures
            .iter()
            .find(|s| s.structure.name() == name)
            .map(|s| &s.mask)
    }
}
