//! 解剖结构词表.

use crate::consts::roi;
use crate::error::ConfigError;
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 结构类别.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum StructureCategory {
    /// 靶区.
    Target,

    /// 危及器官.
    OrganAtRisk,
}

/// 词表中的一个结构.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Structure {
    name: String,
    category: StructureCategory,
}

impl Structure {
    /// 初始化.
    #[inline]
    pub fn new(name: impl Into<String>, category: StructureCategory) -> Self {
        Self {
            name: name.into(),
            category,
        }
    }

    /// 结构名, 同时也是其稀疏文件名 (不含扩展名).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 结构类别.
    #[inline]
    pub fn category(&self) -> StructureCategory {
        self.category
    }
}

/// 有序结构词表. 词表顺序决定 batch 的通道顺序.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StructureVocabulary {
    items: Vec<Structure>,
}

impl StructureVocabulary {
    /// 创建词表. 词表为空或含重名结构时返回 `Err`.
    pub fn new(items: Vec<Structure>) -> Result<Self, ConfigError> {
        let ans = Self { items };
        ans.validate()?;
        Ok(ans)
    }

    /// OpenKBP 默认词表: 7 个危及器官, 然后 3 个靶区.
    pub fn openkbp() -> Self {
        let oars = roi::OARS
            .iter()
            .map(|n| Structure::new(*n, StructureCategory::OrganAtRisk));
        let targets = roi::TARGETS
            .iter()
            .map(|n| Structure::new(*n, StructureCategory::Target));
        Self {
            items: oars.chain(targets).collect(),
        }
    }

    /// 检查词表合法性.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.items.is_empty() {
            return Err(ConfigError::EmptyVocabulary);
        }
        let mut seen = HashSet::with_capacity(self.items.len());
        for s in self.items.iter() {
            if !seen.insert(s.name()) {
                return Err(ConfigError::DuplicateStructure(s.name.clone()));
            }
        }
        Ok(())
    }

    /// 结构个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// 词表是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 查找结构在词表中的位置.
    #[inline]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|s| s.name == name)
    }

    /// 按名称查找结构.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Structure> {
        self.items.iter().find(|s| s.name == name)
    }

    /// 按词表顺序迭代结构.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Structure> {
        self.items.iter()
    }
}

impl Default for StructureVocabulary {
    fn default() -> Self {
        Self::openkbp()
    }
}
