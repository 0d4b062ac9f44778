use crate::dvh::MetricKind;
use std::collections::btree_map::{self, BTreeMap};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 指标表的键. 按 (患者, 结构, 指标名) 排序.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MetricKey {
    /// 患者标识.
    pub patient: String,

    /// 结构名.
    pub structure: String,

    /// 指标名, 如 `D_95`.
    pub metric: String,
}

impl MetricKey {
    /// 初始化.
    pub fn new(patient: impl Into<String>, structure: impl Into<String>, metric: MetricKind) -> Self {
        Self {
            patient: patient.into(),
            structure: structure.into(),
            metric: metric.to_string(),
        }
    }
}

/// 指标表: `(患者, 结构, 指标) -> 值`.
///
/// 值为 `None` 表示该指标无定义 (如空结构上的 Dx). 无定义值不参与任何聚合,
/// 也从不被当作 0.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricTable {
    entries: BTreeMap<MetricKey, Option<f64>>,
}

impl MetricTable {
    /// 空表.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一项, 返回旧值.
    #[inline]
    pub fn insert(&mut self, key: MetricKey, value: Option<f64>) -> Option<Option<f64>> {
        self.entries.insert(key, value)
    }

    /// 查询. 外层 `None` 表示键不存在, 内层 `None` 表示指标无定义.
    #[inline]
    pub fn get(&self, key: &MetricKey) -> Option<Option<f64>> {
        self.entries.get(key).copied()
    }

    /// 已定义的值.
    #[inline]
    pub fn defined(&self, key: &MetricKey) -> Option<f64> {
        self.get(key).flatten()
    }

    /// 键数量 (含无定义项).
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按键序迭代.
    #[inline]
    pub fn iter(&self) -> btree_map::Iter<'_, MetricKey, Option<f64>> {
        self.entries.iter()
    }

    /// 表中出现的患者, 有序且去重.
    pub fn patients(&self) -> Vec<&str> {
        let mut ans: Vec<&str> = self.entries.keys().map(|k| k.patient.as_str()).collect();
        ans.dedup();
        ans
    }
}

impl Extend<(MetricKey, Option<f64>)> for MetricTable {
    fn extend<T: IntoIterator<Item = (MetricKey, Option<f64>)>>(&mut self, iter: T) {
        self.entries.extend(iter)
    }
}

impl FromIterator<(MetricKey, Option<f64>)> for MetricTable {
    fn from_iter<T: IntoIterator<Item = (MetricKey, Option<f64>)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a MetricTable {
    type Item = (&'a MetricKey, &'a Option<f64>);
    type IntoIter = btree_map::Iter<'a, MetricKey, Option<f64>>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
