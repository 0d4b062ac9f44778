//! 指标规格表: 结构 (或结构类别) -> 需计算的指标列表.

use super::{Structure, StructureCategory, StructureVocabulary};
use crate::dvh::MetricKind;
use crate::error::ConfigError;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// OpenKBP 评估使用的指标表, 版本 `openkbp-2020`.
static OPENKBP_METRICS: Lazy<MetricSpecTable> = Lazy::new(|| {
    let mut by_category = BTreeMap::new();
    by_category.insert(
        StructureCategory::Target,
        vec![
            MetricKind::DoseAtVolume { percent: 99.0 },
            MetricKind::DoseAtVolume { percent: 95.0 },
            MetricKind::DoseAtVolume { percent: 1.0 },
        ],
    );
    by_category.insert(
        StructureCategory::OrganAtRisk,
        vec![
            MetricKind::DoseAtAbsoluteVolume { cc: 0.1 },
            MetricKind::MeanDose,
        ],
    );
    MetricSpecTable {
        version: "openkbp-2020".to_string(),
        by_category,
        by_structure: BTreeMap::new(),
    }
});

/// 版本化的指标规格表.
///
/// 查找顺序: 先按结构名 (`by_structure`), 找不到再按结构类别 (`by_category`).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct MetricSpecTable {
    /// 表版本. 仅用于记录, 不参与计算.
    pub version: String,

    /// 类别默认指标.
    #[cfg_attr(feature = "serde", serde(default))]
    pub by_category: BTreeMap<StructureCategory, Vec<MetricKind>>,

    /// 单个结构的覆盖指标.
    #[cfg_attr(feature = "serde", serde(default))]
    pub by_structure: BTreeMap<String, Vec<MetricKind>>,
}

impl MetricSpecTable {
    /// OpenKBP 默认表: 靶区取 `D_99, D_95, D_1`, 危及器官取 `D_0.1_cc, mean`.
    #[inline]
    pub fn openkbp() -> Self {
        OPENKBP_METRICS.clone()
    }

    /// 获取 `structure` 应计算的指标.
    pub fn metrics_for(&self, structure: &Structure) -> &[MetricKind] {
        self.by_structure
            .get(structure.name())
            .or_else(|| self.by_category.get(&structure.category()))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// 覆盖某个结构的指标列表.
    pub fn with_structure(mut self, name: impl Into<String>, metrics: Vec<MetricKind>) -> Self {
        self.by_structure.insert(name.into(), metrics);
        self
    }

    /// 检查表中引用的结构都在 `vocabulary` 中.
    pub fn validate(&self, vocabulary: &StructureVocabulary) -> Result<(), ConfigError> {
        match self
            .by_structure
            .keys()
            .find(|name| vocabulary.get(name).is_none())
        {
            Some(name) => Err(ConfigError::UnknownStructure(name.clone())),
            None => Ok(()),
        }
    }
}

impl Default for MetricSpecTable {
    fn default() -> Self {
        Self::openkbp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_order() {
        let table = MetricSpecTable::openkbp().with_structure(
            "SpinalCord",
            vec![MetricKind::DoseAtAbsoluteVolume { cc: 0.03 }],
        );
        let cord = Structure::new("SpinalCord", StructureCategory::OrganAtRisk);
        let larynx = Structure::new("Larynx", StructureCategory::OrganAtRisk);
        let ptv = Structure::new("PTV63", StructureCategory::Target);

        assert_eq!(
            table.metrics_for(&cord),
            &[MetricKind::DoseAtAbsoluteVolume { cc: 0.03 }]
        );
        assert_eq!(table.metrics_for(&larynx).len(), 2);
        assert_eq!(
            table.metrics_for(&ptv)[1],
            MetricKind::DoseAtVolume { percent: 95.0 }
        );
    }

    #[test]
    fn test_missing_category_is_empty() {
        let mut table = MetricSpecTable::openkbp();
        table.by_category.remove(&StructureCategory::Target);
        let ptv = Structure::new("PTV63", StructureCategory::Target);
        assert!(table.metrics_for(&ptv).is_empty());
    }

    #[test]
    fn test_validate_unknown_structure() {
        let vocab = StructureVocabulary::openkbp();
        assert!(MetricSpecTable::openkbp().validate(&vocab).is_ok());
        let table = MetricSpecTable::openkbp().with_structure("Heart", vec![MetricKind::MeanDose]);
        assert!(matches!(
            table.validate(&vocab),
            Err(ConfigError::UnknownStructure(n)) if n == "Heart"
        ));
    }
}
