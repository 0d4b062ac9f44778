use super::table::MetricTable;
use crate::error::CodecError;
use crate::volume::{DoseVolume, Mask};
use itertools::izip;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 未能计算分数的原因.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NoScore {
    /// 没有任何患者成功加载.
    EmptyCohort,

    /// 没有任何患者带参考剂量 (如验证集).
    NoReferenceDose,

    /// 没有任何患者带预测剂量.
    NoPredictions,

    /// 参考表和预测表没有共同的已定义指标.
    NoCommonMetrics,

    /// 没有可比较的体素 (可能受照区域全部为空).
    NoComparableVoxels,
}

impl fmt::Display for NoScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EmptyCohort => "empty cohort",
            Self::NoReferenceDose => "no reference dose",
            Self::NoPredictions => "no predictions",
            Self::NoCommonMetrics => "no metric defined on both sides",
            Self::NoComparableVoxels => "no comparable voxels",
        })
    }
}

/// 分数. "没有数据" 与 "分数为 0" 总是可区分的.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Score {
    /// 已计算.
    Computed(f64),

    /// 未计算.
    NotComputed(NoScore),
}

impl Score {
    /// 分数值.
    #[inline]
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Computed(v) => Some(*v),
            Self::NotComputed(_) => None,
        }
    }

    /// 是否已计算?
    #[inline]
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }

    /// 对一组误差求均值; 为空时返回 `NotComputed(reason)`.
    pub fn mean_of<I: IntoIterator<Item = f64>>(errors: I, reason: NoScore) -> Self {
        let (sum, n) = errors
            .into_iter()
            .fold((0.0, 0usize), |(s, n), e| (s + e, n + 1));
        if n == 0 {
            Self::NotComputed(reason)
        } else {
            Self::Computed(sum / n as f64)
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Computed(v) => write!(f, "{v:.3}"),
            Self::NotComputed(why) => write!(f, "no score computed ({why})"),
        }
    }
}

/// DVH 分数: 两表中都存在且都有定义的键上, 指标绝对差的均值.
pub fn dvh_score(reference: &MetricTable, predicted: &MetricTable) -> Score {
    let diffs = reference.iter().filter_map(|(key, r)| {
        let r = (*r)?;
        let p = predicted.defined(key)?;
        Some((r - p).abs())
    });
    Score::mean_of(diffs, NoScore::NoCommonMetrics)
}

/// 单个患者的剂量误差: `mask` 内体素的平均绝对剂量差. `mask` 为空时返回 `Ok(None)`.
pub fn dose_error(
    reference: &DoseVolume,
    predicted: &DoseVolume,
    mask: &Mask,
) -> Result<Option<f64>, CodecError> {
    predicted.check_shape(reference.shape())?;
    mask.check_shape(reference.shape())?;
    let (sum, n) = izip!(reference.iter(), predicted.iter(), mask.iter())
        .filter(|(_, _, m)| **m)
        .fold((0.0, 0usize), |(s, n), (r, p, _)| {
            (s + (f64::from(*r) - f64::from(*p)).abs(), n + 1)
        });
    Ok((n > 0).then(|| sum / n as f64))
}

/// 剂量分数: 各患者剂量误差的均值.
#[inline]
pub fn dose_score<I: IntoIterator<Item = f64>>(errors: I) -> Score {
    Score::mean_of(errors, NoScore::NoComparableVoxels)
}
