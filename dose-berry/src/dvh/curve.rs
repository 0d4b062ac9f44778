//! 结构内剂量样本. DVH 曲线不显式存储, 而是由降序剂量样本按需求值.

use super::{MetricKind, PercentileConvention};
use crate::consts::MM3_PER_CC;
use crate::error::CodecError;
use crate::volume::{DoseVolume, Mask};
use itertools::izip;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;

/// 计算 `ceil` 时扣除的容差, 避免 `95 * 20 / 100` 之类的浮点误差多进一位.
const RANK_EPS: f64 = 1e-9;

/// 某个结构内所有体素的剂量, 按从高到低排序.
#[derive(Clone, Debug)]
pub struct StructureDose {
    desc: Vec<f64>,
}

impl StructureDose {
    /// 收集 `dose` 在 `mask` 为真处的体素值. 形状不一致时返回 `Err`.
    pub fn new(dose: &DoseVolume, mask: &Mask) -> Result<Self, CodecError> {
        mask.check_shape(dose.shape())?;
        let desc = izip!(dose.iter(), mask.iter())
            .filter_map(|(d, m)| m.then_some(*d as f64))
            .collect();
        Ok(Self::from_unsorted(desc))
    }

    /// 从任意顺序的剂量样本创建.
    pub fn from_unsorted(mut desc: Vec<f64>) -> Self {
        desc.sort_unstable_by_key(|d| Reverse(OrderedFloat(*d)));
        Self { desc }
    }

    /// 结构体素数.
    #[inline]
    pub fn len(&self) -> usize {
        self.desc.len()
    }

    /// 结构是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.desc.is_empty()
    }

    /// 降序剂量.
    #[inline]
    pub fn as_descending(&self) -> &[f64] {
        &self.desc
    }

    /// Dx: 最热 `percent`% 体积所接受的剂量. 空结构返回 `None`.
    ///
    /// - [`PercentileConvention::NearestRank`]: 取降序序列第 `ceil(percent / 100 * n)`
    ///   个值 (从 1 计数, 夹到 `[1, n]`), 即最热 `percent`% 体素中的最低剂量.
    ///   `D_0` 为最大剂量, `D_100` 为最小剂量.
    /// - [`PercentileConvention::Linear`]: 升序序列上第 `100 - percent` 百分位的线性插值.
    pub fn dose_at_volume(&self, percent: f64, convention: PercentileConvention) -> Option<f64> {
        let n = self.len();
        if n == 0 {
            return None;
        }
        let percent = percent.clamp(0.0, 100.0);
        match convention {
            PercentileConvention::NearestRank => {
                let rank = (percent * n as f64 / 100.0 - RANK_EPS).ceil();
                let rank = (rank.max(1.0) as usize).min(n);
                Some(self.desc[rank - 1])
            }
            PercentileConvention::Linear => {
                // 升序第 i 个元素为 desc[n - 1 - i].
                let pos = (100.0 - percent) / 100.0 * (n - 1) as f64;
                let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
                let (a, b) = (self.desc[n - 1 - lo], self.desc[n - 1 - hi]);
                Some(a + (b - a) * (pos - lo as f64))
            }
        }
    }

    /// 最热 `voxels` 个体素所接受的剂量. 体素数不足时取整个结构.
    pub fn dose_at_voxels(&self, voxels: usize, convention: PercentileConvention) -> Option<f64> {
        let n = self.len();
        if n == 0 {
            return None;
        }
        let voxels = voxels.clamp(1, n);
        match convention {
            PercentileConvention::NearestRank => Some(self.desc[voxels - 1]),
            PercentileConvention::Linear => {
                self.dose_at_volume(voxels as f64 / n as f64 * 100.0, convention)
            }
        }
    }

    /// 剂量 `>= gy` 的体素个数.
    #[inline]
    pub fn count_at_least(&self, gy: f64) -> usize {
        self.desc.partition_point(|d| *d >= gy)
    }

    /// Vx: 剂量 `>= gy` 的体积分数. 空结构返回 0.
    pub fn volume_at_dose(&self, gy: f64) -> f64 {
        match self.len() {
            0 => 0.0,
            n => self.count_at_least(gy) as f64 / n as f64,
        }
    }

    /// 剂量 `>= gy` 的绝对体积 (cc).
    #[inline]
    pub fn absolute_volume_at_dose(&self, gy: f64, voxel_mm3: f64) -> f64 {
        self.count_at_least(gy) as f64 * voxel_mm3 / MM3_PER_CC
    }

    /// 平均剂量. 空结构返回 `None`.
    pub fn mean(&self) -> Option<f64> {
        match self.len() {
            0 => None,
            n => Some(self.desc.iter().sum::<f64>() / n as f64),
        }
    }

    /// 求值单个指标. `voxel_mm3` 为单个体素的体积 (立方毫米).
    ///
    /// 返回 `None` 表示该指标无定义.
    pub fn evaluate(
        &self,
        kind: MetricKind,
        voxel_mm3: f64,
        convention: PercentileConvention,
    ) -> Option<f64> {
        if self.is_empty() && kind.undefined_when_empty() {
            return None;
        }
        match kind {
            MetricKind::DoseAtVolume { percent } => self.dose_at_volume(percent, convention),
            MetricKind::DoseAtAbsoluteVolume { cc } => {
                let voxels = (cc * MM3_PER_CC / voxel_mm3).round().max(1.0) as usize;
                self.dose_at_voxels(voxels, convention)
            }
            MetricKind::VolumeAtDose { gy } => Some(self.volume_at_dose(gy)),
            MetricKind::AbsoluteVolumeAtDose { gy } => {
                Some(self.absolute_volume_at_dose(gy, voxel_mm3))
            }
            MetricKind::MeanDose => self.mean(),
        }
    }
}
