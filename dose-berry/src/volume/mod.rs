//! 稠密 3D 体数据, 以及稀疏编码互转.

mod codec;

pub use codec::{decode, decode_mask, encode, encode_mask};

use crate::error::CodecError;
use crate::Idx3d;
use ndarray::{Array3, ArrayView3};
use std::ops::Index;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 固定形状的稠密 3D 体数据.
///
/// 底层为行优先 (C order) 的连续体素数组加上形状描述, 线性索引 `i`
/// 与三维索引 `(x, y, z)` 满足 `i = (x * Y + y) * Z + z`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    data: Array3<T>,
}

/// CT 扫描体数据 (HU).
pub type CtVolume = Volume<f32>;

/// 剂量体数据 (Gy).
pub type DoseVolume = Volume<f32>;

/// 布尔掩膜. 结构掩膜与可能受照区域掩膜均用此类型表示.
pub type Mask = Volume<bool>;

impl<T: Clone> Volume<T> {
    /// 用 `value` 填充给定形状.
    #[inline]
    pub fn filled(shape: Idx3d, value: T) -> Self {
        Self {
            data: Array3::from_elem(shape, value),
        }
    }

    /// 从行优先排列的原始体素创建. 长度与形状不符时返回 `Err`.
    pub fn from_vec(shape: Idx3d, raw: Vec<T>) -> Result<Self, CodecError> {
        let len = raw.len();
        let data = Array3::from_shape_vec(shape, raw)
            .map_err(|_| CodecError::LengthMismatch { len, shape })?;
        Ok(Self { data })
    }

    /// 从任意内存布局的 `ndarray` 数组创建. 内部总会转换为标准布局.
    pub fn from_array(data: Array3<T>) -> Self {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        debug_assert!(data.is_standard_layout());
        Self { data }
    }
}

impl<T> Volume<T> {
    /// 形状.
    #[inline]
    pub fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 体素总数.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 是否不含任何体素.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 按线性索引排列的连续体素.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        // 构造时保证标准布局, 可直接 unwrap.
        self.data.as_slice().unwrap()
    }

    /// 按线性索引排列的可变连续体素.
    #[inline]
    pub(crate) fn as_slice_mut(&mut self) -> &mut [T] {
        self.data.as_slice_mut().unwrap()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn view(&self) -> ArrayView3<'_, T> {
        self.data.view()
    }

    /// 按行优先序迭代所有体素.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// 线性索引 -> 三维索引. 不检查越界.
    #[inline]
    pub fn unravel(&self, index: usize) -> Idx3d {
        let (_, y, z) = self.shape();
        (index / (y * z), (index / z) % y, index % z)
    }

    /// 检查形状是否与 `expected` 一致.
    #[inline]
    pub fn check_shape(&self, expected: Idx3d) -> Result<(), CodecError> {
        match self.shape() {
            found if found == expected => Ok(()),
            found => Err(CodecError::ShapeMismatch { expected, found }),
        }
    }
}

impl<T> Index<usize> for Volume<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.as_slice()[index]
    }
}

impl<T> Index<Idx3d> for Volume<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl Mask {
    /// 全 `false` 掩膜.
    #[inline]
    pub fn empty(shape: Idx3d) -> Self {
        Self::filled(shape, false)
    }

    /// 被选中的体素个数.
    #[inline]
    pub fn count(&self) -> usize {
        self.iter().filter(|p| **p).count()
    }

    /// 是否没有任何体素被选中.
    #[inline]
    pub fn is_blank(&self) -> bool {
        !self.iter().any(|p| *p)
    }
}

impl Volume<f32> {
    /// 全零体数据.
    #[inline]
    pub fn zeros(shape: Idx3d) -> Self {
        Self::filled(shape, 0.0)
    }
}
