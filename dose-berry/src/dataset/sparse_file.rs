//! OpenKBP 稀疏 CSV 文件读写.
//!
//! 文件格式: 首行为表头 (如 `,data`), 其后每行 `index,value` 对应一个非零体素.
//! 掩膜文件只有索引列, 数值列为空或不存在 (`index,` / `index`).

use crate::error::SparseFileError;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// 稀疏文件的原始内容.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseFile {
    /// 线性体素索引.
    pub indices: Vec<usize>,

    /// 与 `indices` 一一对应的数值. 掩膜文件为 `None`.
    pub values: Option<Vec<f32>>,
}

impl SparseFile {
    /// 是否为掩膜文件 (无数值列).
    #[inline]
    pub fn is_mask(&self) -> bool {
        self.values.is_none()
    }

    /// 以 `(index, value)` 迭代. 掩膜文件的数值视为 1.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.indices.iter().enumerate().map(|(i, idx)| {
            let v = self.values.as_ref().map_or(1.0, |v| v[i]);
            (*idx, v)
        })
    }
}

#[inline]
fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> SparseFileError + '_ {
    move |source| SparseFileError::Io {
        path: path.to_owned(),
        source,
    }
}

/// 首行是否为表头: 首字段为空 (`,data`) 或以字母开头 (`index,...`).
#[inline]
fn is_header(first: &str) -> bool {
    first.is_empty() || first.starts_with(|c: char| c.is_alphabetic())
}

/// 读取稀疏 CSV 文件.
///
/// 首行为表头时跳过, 其余无法解析的行都是错误. 空行被忽略.
/// 同一文件中不允许部分行有数值、部分行没有. 数值必须有限.
pub fn read_sparse_csv<P: AsRef<Path>>(path: P) -> Result<SparseFile, SparseFileError> {
    read_with(path.as_ref(), |v| v.is_finite())
}

/// 读取剂量文件. 在 [`read_sparse_csv`] 的基础上要求数值非负.
pub fn read_dose_csv<P: AsRef<Path>>(path: P) -> Result<SparseFile, SparseFileError> {
    read_with(path.as_ref(), |v| v.is_finite() && v >= 0.0)
}

fn read_with(path: &Path, accept: fn(f32) -> bool) -> Result<SparseFile, SparseFileError> {
    let reader = BufReader::new(File::open(path).map_err(io_err(path))?);

    let mut indices = Vec::new();
    let mut values = Vec::new();
    let mut has_values: Option<bool> = None;

    let parse_err = |line: usize, reason: String| SparseFileError::Parse {
        path: path.to_owned(),
        line,
        reason,
    };

    for (no, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err(path))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',').map(str::trim);
        let first = fields.next().unwrap_or_default();
        if no == 0 && is_header(first) {
            continue;
        }
        let index = first
            .parse::<usize>()
            .map_err(|e| parse_err(no + 1, format!("bad index `{first}`: {e}")))?;
        let value = match fields.next().filter(|f| !f.is_empty()) {
            Some(f) => {
                let v = f
                    .parse::<f32>()
                    .map_err(|e| parse_err(no + 1, format!("bad value `{f}`: {e}")))?;
                if !accept(v) {
                    return Err(parse_err(no + 1, format!("value `{f}` out of range")));
                }
                Some(v)
            }
            None => None,
        };
        match (*has_values.get_or_insert(value.is_some()), value) {
            (true, Some(v)) => values.push(v),
            (false, None) => {}
            _ => {
                return Err(parse_err(
                    no + 1,
                    "rows mix present and missing values".to_string(),
                ))
            }
        }
        indices.push(index);
    }

    Ok(SparseFile {
        indices,
        values: has_values.unwrap_or(false).then_some(values),
    })
}

/// 将 `(index, value)` 写为稀疏 CSV 文件 (带 `,data` 表头).
///
/// 数值以最短可往返的十进制形式写出, 读回后逐位相等.
pub fn write_sparse_csv<P, I>(path: P, pairs: I) -> Result<(), SparseFileError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = (usize, f32)>,
{
    let path = path.as_ref();
    let mut w = BufWriter::new(File::create(path).map_err(io_err(path))?);
    writeln!(w, ",data").map_err(io_err(path))?;
    for (index, value) in pairs {
        writeln!(w, "{index},{value}").map_err(io_err(path))?;
    }
    w.flush().map_err(io_err(path))
}

/// 将索引列表写为掩膜 CSV 文件.
pub fn write_mask_csv<P, I>(path: P, indices: I) -> Result<(), SparseFileError>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = usize>,
{
    let path = path.as_ref();
    let mut w = BufWriter::new(File::create(path).map_err(io_err(path))?);
    writeln!(w, ",data").map_err(io_err(path))?;
    for index in indices {
        writeln!(w, "{index},").map_err(io_err(path))?;
    }
    w.flush().map_err(io_err(path))
}

/// 读取 `voxel_dimensions.csv`: 三个以空白或逗号分隔的正数 (毫米).
pub fn read_voxel_dimensions<P: AsRef<Path>>(path: P) -> Result<[f64; 3], SparseFileError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(io_err(path))?;
    let parse_err = |reason: String| SparseFileError::Parse {
        path: path.to_owned(),
        line: 1,
        reason,
    };

    let dims = text
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
                .ok_or_else(|| parse_err(format!("bad voxel dimension `{t}`")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    <[f64; 3]>::try_from(dims)
        .map_err(|v| parse_err(format!("expected 3 voxel dimensions, found {}", v.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_read_dose_csv() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("dose.csv");
        fs::write(&p, ",data\n3,1.5\n0,2.25\n\n7,70\n").unwrap();
        let f = read_sparse_csv(&p).unwrap();
        assert_eq!(f.indices, vec![3, 0, 7]);
        assert_eq!(f.values, Some(vec![1.5, 2.25, 70.0]));
        assert!(!f.is_mask());
    }

    #[test]
    fn test_read_mask_csv() {
        let dir = TempDir::new().unwrap();
        for (name, body) in [
            ("a.csv", ",data\n1,\n4,\n"),
            ("b.csv", "\n1\n4\n"),
            ("c.csv", "1,\n4,\n"),
        ] {
            let p = dir.path().join(name);
            fs::write(&p, body).unwrap();
            let f = read_sparse_csv(&p).unwrap();
            assert_eq!(f.indices, vec![1, 4], "{name}");
            assert!(f.is_mask(), "{name}");
            assert_eq!(f.pairs().collect::<Vec<_>>(), vec![(1, 1.0), (4, 1.0)]);
        }
    }

    #[test]
    fn test_read_errors() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("bad.csv");

        fs::write(&p, ",data\n1,2\nx,3\n").unwrap();
        assert!(matches!(
            read_sparse_csv(&p),
            Err(SparseFileError::Parse { line: 3, .. })
        ));

        fs::write(&p, ",data\n1,2\n2,\n").unwrap();
        assert!(matches!(
            read_sparse_csv(&p),
            Err(SparseFileError::Parse { line: 3, .. })
        ));

        fs::write(&p, ",data\n1,abc\n").unwrap();
        assert!(read_sparse_csv(&p).is_err());

        // 无表头文件的首行损坏时报错, 不被当作表头吞掉.
        fs::write(&p, "12x,3\n1,2\n").unwrap();
        assert!(matches!(
            read_sparse_csv(&p),
            Err(SparseFileError::Parse { line: 1, .. })
        ));
        fs::write(&p, "index,value\n1,2\n").unwrap();
        assert_eq!(read_sparse_csv(&p).unwrap().indices, vec![1]);

        fs::write(&p, ",data\n0,nan\n").unwrap();
        assert!(read_sparse_csv(&p).is_err());
        fs::write(&p, ",data\n0,inf\n").unwrap();
        assert!(read_sparse_csv(&p).is_err());

        assert!(matches!(
            read_sparse_csv(dir.path().join("missing.csv")),
            Err(SparseFileError::Io { .. })
        ));
    }

    #[test]
    fn test_read_dose_rejects_negative() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("dose.csv");
        fs::write(&p, ",data\n0,1.5\n1,-5\n").unwrap();
        assert!(matches!(
            read_dose_csv(&p),
            Err(SparseFileError::Parse { line: 3, .. })
        ));
        // CT 值可以为负.
        assert_eq!(read_sparse_csv(&p).unwrap().values, Some(vec![1.5, -5.0]));

        fs::write(&p, ",data\n0,0\n1,70\n").unwrap();
        assert_eq!(read_dose_csv(&p).unwrap().values, Some(vec![0.0, 70.0]));
    }

    #[test]
    fn test_write_then_read_exact() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("pred.csv");
        let pairs = vec![(2, 0.1f32), (9, 1.0 / 3.0), (11, 65.432_1)];
        write_sparse_csv(&p, pairs.iter().copied()).unwrap();
        let f = read_sparse_csv(&p).unwrap();
        assert_eq!(f.pairs().collect::<Vec<_>>(), pairs);

        let m = dir.path().join("mask.csv");
        write_mask_csv(&m, [5, 6]).unwrap();
        let f = read_sparse_csv(&m).unwrap();
        assert!(f.is_mask());
        assert_eq!(f.indices, vec![5, 6]);
    }

    #[test]
    fn test_voxel_dimensions() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("voxel_dimensions.csv");
        fs::write(&p, "3.906250000000000000e+00\n3.906250000000000000e+00\n2.5\n").unwrap();
        assert_eq!(read_voxel_dimensions(&p).unwrap(), [3.90625, 3.90625, 2.5]);

        fs::write(&p, "1.0 2.0").unwrap();
        assert!(read_voxel_dimensions(&p).is_err());
        fs::write(&p, "1.0,-2.0,1.0").unwrap();
        assert!(read_voxel_dimensions(&p).is_err());
    }
}
