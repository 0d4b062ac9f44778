//! 剂量体积直方图 (DVH) 指标计算.
//!
//! 所有指标都从某个结构内的降序剂量样本 ([`StructureDose`]) 求值.
//! 体积类指标 (Vx) 在空结构上为 0, 剂量类指标 (Dx, mean) 在空结构上无定义,
//! 以 `None` 表示.

mod curve;
mod metric;

pub use curve::StructureDose;
pub use metric::MetricKind;

use crate::config::{MetricSpecTable, Structure};
use crate::error::CodecError;
use crate::volume::{DoseVolume, Mask};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dx 的百分位约定.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PercentileConvention {
    /// 从高剂量端计数, 取最热 x% 体素中的最低剂量 (含边界). 默认约定.
    #[default]
    NearestRank,

    /// 在升序样本的第 `100 - x` 百分位做线性插值.
    Linear,
}

/// Dx: 结构 `mask` 内最热 `percent`% 体积接受的剂量. 空结构返回 `Ok(None)`.
pub fn dose_at_volume(
    dose: &DoseVolume,
    mask: &Mask,
    percent: f64,
    convention: PercentileConvention,
) -> Result<Option<f64>, CodecError> {
    Ok(StructureDose::new(dose, mask)?.dose_at_volume(percent, convention))
}

/// Vx: 结构 `mask` 内剂量 `>= gy` 的体积分数. 空结构返回 `Ok(0.0)`.
pub fn volume_at_dose(dose: &DoseVolume, mask: &Mask, gy: f64) -> Result<f64, CodecError> {
    Ok(StructureDose::new(dose, mask)?.volume_at_dose(gy))
}

/// 结构 `mask` 内的平均剂量. 空结构返回 `Ok(None)`.
pub fn mean_dose(dose: &DoseVolume, mask: &Mask) -> Result<Option<f64>, CodecError> {
    Ok(StructureDose::new(dose, mask)?.mean())
}

/// 按指标表为结构计算指标的引擎.
#[derive(Copy, Clone, Debug)]
pub struct DvhEngine<'a> {
    table: &'a MetricSpecTable,
    convention: PercentileConvention,
}

impl<'a> DvhEngine<'a> {
    /// 初始化.
    #[inline]
    pub fn new(table: &'a MetricSpecTable, convention: PercentileConvention) -> Self {
        Self { table, convention }
    }

    /// 计算 `structure` 的全部配置指标, 按指标表顺序返回.
    ///
    /// `voxel_mm3` 为单个体素体积, 用于绝对体积指标.
    pub fn structure_metrics(
        &self,
        structure: &Structure,
        dose: &DoseVolume,
        mask: &Mask,
        voxel_mm3: f64,
    ) -> Result<Vec<(MetricKind, Option<f64>)>, CodecError> {
        let sample = StructureDose::new(dose, mask)?;
        Ok(self
            .table
            .metrics_for(structure)
            .iter()
            .map(|kind| (*kind, sample.evaluate(*kind, voxel_mm3, self.convention)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Structure, StructureCategory};
    use crate::volume::decode_mask;

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn ramp() -> DoseVolume {
        DoseVolume::from_vec((2, 2, 2), (1..=8).map(|v| v as f32).collect()).unwrap()
    }

    #[test]
    fn test_full_mask_scenario() {
        let dose = ramp();
        let mask = Mask::filled((2, 2, 2), true);
        assert!(f64_eq(mean_dose(&dose, &mask).unwrap().unwrap(), 4.5));
        let d50 = dose_at_volume(&dose, &mask, 50.0, PercentileConvention::NearestRank);
        assert_eq!(d50.unwrap(), Some(5.0));
        let d50 = dose_at_volume(&dose, &mask, 50.0, PercentileConvention::Linear);
        assert!(f64_eq(d50.unwrap().unwrap(), 4.5));
    }

    #[test]
    fn test_partial_mask() {
        let dose = ramp();
        let mask = decode_mask([0, 1, 7], (2, 2, 2)).unwrap();
        let mean = mean_dose(&dose, &mask).unwrap().unwrap();
        assert!(f64_eq(mean, (1.0 + 2.0 + 8.0) / 3.0));
        assert_eq!(volume_at_dose(&dose, &mask, 2.0).unwrap(), 2.0 / 3.0);
    }

    #[test]
    fn test_empty_mask_is_undefined_not_zero() {
        let dose = ramp();
        let mask = Mask::empty((2, 2, 2));
        for convention in [PercentileConvention::NearestRank, PercentileConvention::Linear] {
            assert_eq!(dose_at_volume(&dose, &mask, 95.0, convention).unwrap(), None);
        }
        assert_eq!(mean_dose(&dose, &mask).unwrap(), None);
        assert_eq!(volume_at_dose(&dose, &mask, 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_v0_is_one() {
        let dose = ramp();
        let mask = decode_mask([2, 3, 4], (2, 2, 2)).unwrap();
        assert_eq!(volume_at_dose(&dose, &mask, 0.0).unwrap(), 1.0);
    }

    #[test]
    fn test_shape_mismatch() {
        let dose = ramp();
        let mask = Mask::filled((2, 2, 1), true);
        assert!(mean_dose(&dose, &mask).is_err());
    }

    #[test]
    fn test_engine_follows_table() {
        let table = MetricSpecTable::openkbp();
        let engine = DvhEngine::new(&table, PercentileConvention::NearestRank);
        let dose = ramp();
        let mask = Mask::filled((2, 2, 2), true);

        let ptv = Structure::new("PTV70", StructureCategory::Target);
        let names: Vec<_> = engine
            .structure_metrics(&ptv, &dose, &mask, 1.0)
            .unwrap()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(
            names,
            vec![
                ("D_99".to_string(), Some(1.0)),
                ("D_95".to_string(), Some(1.0)),
                ("D_1".to_string(), Some(8.0)),
            ]
        );

        let oar = Structure::new("Larynx", StructureCategory::OrganAtRisk);
        let metrics = engine.structure_metrics(&oar, &dose, &mask, 8.0).unwrap();
        // 0.1 cc / 8 mm^3 = 12.5 -> 13 个体素, 夹到整个结构.
        assert_eq!(metrics[0], (MetricKind::DoseAtAbsoluteVolume { cc: 0.1 }, Some(1.0)));
        assert_eq!(metrics[1].1, Some(4.5));
    }
}
