//! 数据集操作.

use std::fs;
use std::path::{Path, PathBuf};

mod batch;
mod loader;
mod record;
mod sparse_file;

pub use batch::{Batch, BatchAssembler};
pub use loader::{
    CohortLoader, LoadMode, LoadOutcome, MissingVolume, PatientLoader, VolumeKind,
};
pub use record::{PatientRecord, StructureMask};
pub use sparse_file::{
    read_dose_csv, read_sparse_csv, read_voxel_dimensions, write_mask_csv, write_sparse_csv,
    SparseFile,
};

/// 获取 `{用户主目录}/dataset` 目录下给定继续项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.extend(it);
    Some(ans)
}

/// 列出队列目录下的全部患者目录, 按名称排序.
pub fn cohort_paths<P: AsRef<Path>>(root: P) -> std::io::Result<Vec<PathBuf>> {
    let mut ans = fs::read_dir(root)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect::<Vec<_>>();
    ans.sort();
    Ok(ans)
}

/// 列出预测目录下的全部 `.csv` 预测剂量文件, 按名称排序.
pub fn prediction_paths<P: AsRef<Path>>(root: P) -> std::io::Result<Vec<PathBuf>> {
    let mut ans = fs::read_dir(root)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|e| e == crate::consts::file::SPARSE_EXT)
        })
        .collect::<Vec<_>>();
    ans.sort();
    Ok(ans)
}
