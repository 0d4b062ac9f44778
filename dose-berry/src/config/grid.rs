use crate::consts::OPENKBP_SHAPE;
use crate::error::ConfigError;
use crate::Idx3d;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 体素网格: 整个队列共享的体数据形状和默认体素尺寸.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VoxelGrid {
    /// `(x, y, z)` 体素个数.
    pub shape: Idx3d,

    /// 默认体素尺寸 (毫米). 患者目录提供 `voxel_dimensions.csv` 时以文件为准.
    pub spacing_mm: [f64; 3],
}

impl VoxelGrid {
    /// 初始化. 形状含零维或尺寸非正时返回 `Err`.
    pub fn new(shape: Idx3d, spacing_mm: [f64; 3]) -> Result<Self, ConfigError> {
        let ans = Self { shape, spacing_mm };
        ans.validate()?;
        Ok(ans)
    }

    /// 检查网格合法性.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (x, y, z) = self.shape;
        if x == 0 || y == 0 || z == 0 {
            return Err(ConfigError::InvalidGrid(format!(
                "shape {:?} has a zero axis",
                self.shape
            )));
        }
        if x.checked_mul(y).and_then(|v| v.checked_mul(z)).is_none() {
            return Err(ConfigError::InvalidGrid(format!(
                "shape {:?} overflows",
                self.shape
            )));
        }
        if !self.spacing_mm.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(ConfigError::InvalidGrid(format!(
                "spacing {:?} must be positive",
                self.spacing_mm
            )));
        }
        Ok(())
    }

    /// 体素总数.
    #[inline]
    pub fn len(&self) -> usize {
        let (x, y, z) = self.shape;
        x * y * z
    }

    /// 是否不含体素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 默认单体素体积, 以立方毫米为单位.
    #[inline]
    pub fn voxel_mm3(&self) -> f64 {
        self.spacing_mm.iter().product()
    }
}

impl Default for VoxelGrid {
    fn default() -> Self {
        Self {
            shape: OPENKBP_SHAPE,
            spacing_mm: [1.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::VoxelGrid;

    #[test]
    fn test_grid_validate() {
        assert!(VoxelGrid::new((2, 2, 2), [1.0, 1.0, 2.5]).is_ok());
        assert!(VoxelGrid::new((0, 2, 2), [1.0; 3]).is_err());
        assert!(VoxelGrid::new((2, 2, 2), [1.0, 0.0, 1.0]).is_err());
        assert!(VoxelGrid::new((2, 2, 2), [1.0, f64::NAN, 1.0]).is_err());
        assert!(VoxelGrid::new((usize::MAX, 2, 2), [1.0; 3]).is_err());
    }

    #[test]
    fn test_grid_volume() {
        let g = VoxelGrid::new((4, 3, 2), [1.0, 2.0, 2.5]).unwrap();
        assert_eq!(g.len(), 24);
        assert_eq!(g.voxel_mm3(), 5.0);
        assert_eq!(VoxelGrid::default().len(), 128 * 128 * 128);
    }
}
