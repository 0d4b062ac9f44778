//! 稀疏 `(线性索引, 值)` 编码与稠密体数据的相互转换.
//!
//! 纯函数, 无 I/O.

use super::{Mask, Volume};
use crate::error::CodecError;
use crate::Idx3d;
use num::Zero;

#[inline]
fn voxel_count((x, y, z): Idx3d) -> usize {
    x * y * z
}

/// 将稀疏编码解码为 `shape` 形状的稠密体数据, 未列出的体素为零.
///
/// 索引不要求有序. 重复索引以最后一次写入为准 (不会累加).
/// 任一索引 `>= x * y * z` 时返回 [`CodecError::IndexOutOfRange`].
pub fn decode<T, I>(pairs: I, shape: Idx3d) -> Result<Volume<T>, CodecError>
where
    T: Zero + Clone,
    I: IntoIterator<Item = (usize, T)>,
{
    let len = voxel_count(shape);
    let mut raw = vec![T::zero(); len];
    for (index, value) in pairs {
        *raw
            .get_mut(index)
            .ok_or(CodecError::IndexOutOfRange { index, len })? = value;
    }
    Volume::from_vec(shape, raw)
}

/// 将索引列表解码为布尔掩膜, 列出的体素为 `true`.
pub fn decode_mask<I: IntoIterator<Item = usize>>(
    indices: I,
    shape: Idx3d,
) -> Result<Mask, CodecError> {
    let len = voxel_count(shape);
    let mut raw = vec![false; len];
    for index in indices {
        *raw
            .get_mut(index)
            .ok_or(CodecError::IndexOutOfRange { index, len })? = true;
    }
    Volume::from_vec(shape, raw)
}

/// 将稠密体数据编码为稀疏形式. 仅输出非零体素, 按索引升序排列.
pub fn encode<T: Zero + Copy>(volume: &Volume<T>) -> Vec<(usize, T)> {
    volume
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| !v.is_zero())
        .collect()
}

/// 将布尔掩膜编码为升序索引列表.
pub fn encode_mask(mask: &Mask) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, p)| p.then_some(i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::DoseVolume;

    #[test]
    fn test_decode_fills_zero() {
        let v = decode([(0, 1.5f32), (7, 2.0)], (2, 2, 2)).unwrap();
        assert_eq!(v.as_slice(), &[1.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0]);
        assert_eq!(v[(1, 1, 1)], 2.0);
    }

    #[test]
    fn test_decode_unsorted_and_duplicate() {
        // 重复索引: 后写覆盖先写, 而不是累加.
        let v = decode([(5, 1.0f32), (2, 3.0), (5, 4.0)], (1, 2, 3)).unwrap();
        assert_eq!(v.as_slice(), &[0.0, 0.0, 3.0, 0.0, 0.0, 4.0]);
    }

    #[test]
    fn test_decode_out_of_range() {
        let e = decode([(3, 1.0f32), (8, 1.0)], (2, 2, 2)).unwrap_err();
        assert_eq!(e, CodecError::IndexOutOfRange { index: 8, len: 8 });

        let e = decode_mask([0, 1, 100], (2, 2, 2)).unwrap_err();
        assert_eq!(e, CodecError::IndexOutOfRange { index: 100, len: 8 });
    }

    #[test]
    fn test_encode_ascending_nonzero() {
        let v = DoseVolume::from_vec((1, 2, 3), vec![0.0, 2.0, 0.0, 0.5, 0.0, 1.0]).unwrap();
        assert_eq!(encode(&v), vec![(1, 2.0), (3, 0.5), (5, 1.0)]);
    }

    #[test]
    fn test_round_trip() {
        let raw: Vec<f32> = (0..60)
            .map(|i| if i % 7 == 0 { 0.0 } else { i as f32 * 0.25 })
            .collect();
        let v = DoseVolume::from_vec((3, 4, 5), raw).unwrap();
        let sparse = encode(&v);
        assert_eq!(decode(sparse.iter().copied(), v.shape()).unwrap(), v);

        // 重新编码结果不变.
        let again = encode(&decode(sparse.iter().copied(), v.shape()).unwrap());
        assert_eq!(again, sparse);
    }

    #[test]
    fn test_mask_round_trip() {
        let m = decode_mask([6, 1, 3], (2, 2, 2)).unwrap();
        assert_eq!(m.count(), 3);
        assert_eq!(encode_mask(&m), vec![1, 3, 6]);
        assert_eq!(decode_mask(encode_mask(&m), (2, 2, 2)).unwrap(), m);
    }

    #[test]
    fn test_empty_encoding() {
        let v: DoseVolume = decode(std::iter::empty(), (2, 3, 1)).unwrap();
        assert_eq!(v, DoseVolume::zeros((2, 3, 1)));
        assert!(encode(&v).is_empty());
    }
}
