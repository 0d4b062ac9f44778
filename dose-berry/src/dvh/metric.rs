//! 指标种类及其文本名.

use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 单个 DVH 指标.
///
/// 文本名 (用于配置文件与指标表的键):
///
/// | 名称       | 含义                                     |
/// |------------|------------------------------------------|
/// | `D_95`     | 最热 95% 体积接受的剂量 (Gy)             |
/// | `D_0.1_cc` | 最热 0.1 cc 体积接受的剂量 (Gy)          |
/// | `V_20`     | 剂量 >= 20 Gy 的体积分数 (0 ~ 1)         |
/// | `V_20_cc`  | 剂量 >= 20 Gy 的绝对体积 (cc)            |
/// | `mean`     | 平均剂量 (Gy)                            |
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "String", into = "String")
)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MetricKind {
    /// Dx, `percent` 为百分比, 取值 `[0, 100]`.
    DoseAtVolume {
        /// 体积百分比.
        percent: f64,
    },

    /// D_{cc}_cc.
    DoseAtAbsoluteVolume {
        /// 绝对体积 (cc).
        cc: f64,
    },

    /// Vx, 体积分数.
    VolumeAtDose {
        /// 剂量阈值 (Gy).
        gy: f64,
    },

    /// Vx_cc, 绝对体积.
    AbsoluteVolumeAtDose {
        /// 剂量阈值 (Gy).
        gy: f64,
    },

    /// 平均剂量.
    MeanDose,
}

impl MetricKind {
    /// 空结构上该指标是否无定义?
    ///
    /// 体积类指标在空结构上有定义 (恒为 0), 剂量类指标则无定义.
    #[inline]
    pub fn undefined_when_empty(&self) -> bool {
        !matches!(
            self,
            Self::VolumeAtDose { .. } | Self::AbsoluteVolumeAtDose { .. }
        )
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoseAtVolume { percent } => write!(f, "D_{percent}"),
            Self::DoseAtAbsoluteVolume { cc } => write!(f, "D_{cc}_cc"),
            Self::VolumeAtDose { gy } => write!(f, "V_{gy}"),
            Self::AbsoluteVolumeAtDose { gy } => write!(f, "V_{gy}_cc"),
            Self::MeanDose => f.write_str("mean"),
        }
    }
}

impl FromStr for MetricKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidMetric(s.to_string());
        let number = |t: &str| {
            t.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(invalid)
        };

        if s == "mean" {
            return Ok(Self::MeanDose);
        }
        if let Some(rest) = s.strip_prefix("D_") {
            return match rest.strip_suffix("_cc") {
                Some(cc) => match number(cc)? {
                    cc if cc > 0.0 => Ok(Self::DoseAtAbsoluteVolume { cc }),
                    _ => Err(invalid()),
                },
                None => match number(rest)? {
                    percent if percent <= 100.0 => Ok(Self::DoseAtVolume { percent }),
                    _ => Err(invalid()),
                },
            };
        }
        if let Some(rest) = s.strip_prefix("V_") {
            return match rest.strip_suffix("_cc") {
                Some(gy) => Ok(Self::AbsoluteVolumeAtDose { gy: number(gy)? }),
                None => Ok(Self::VolumeAtDose { gy: number(rest)? }),
            };
        }
        Err(invalid())
    }
}

impl TryFrom<String> for MetricKind {
    type Error = ConfigError;

    #[inline]
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MetricKind> for String {
    #[inline]
    fn from(value: MetricKind) -> Self {
        value.to_string()
    }
}
