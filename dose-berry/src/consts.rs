//! 通用常量.

/// OpenKBP 数据集的默认体素网格形状.
pub const OPENKBP_SHAPE: (usize, usize, usize) = (128, 128, 128);

/// 1 cc (立方厘米) 对应的立方毫米数.
pub const MM3_PER_CC: f64 = 1000.0;

/// 患者目录中的固定文件名 (不含扩展名).
pub mod file {
    /// CT 扫描.
    pub const CT: &str = "ct";

    /// 参考剂量.
    pub const DOSE: &str = "dose";

    /// 可能受照区域掩膜.
    pub const POSSIBLE_DOSE_MASK: &str = "possible_dose_mask";

    /// 体素物理尺寸 (毫米).
    pub const VOXEL_DIMENSIONS: &str = "voxel_dimensions";

    /// 稀疏文件扩展名.
    pub const SPARSE_EXT: &str = "csv";

    /// 是否是保留的 (非结构) 文件名?
    #[inline]
    pub fn is_reserved(stem: &str) -> bool {
        matches!(stem, CT | DOSE | POSSIBLE_DOSE_MASK | VOXEL_DIMENSIONS)
    }
}

/// OpenKBP 默认结构词表.
pub mod roi {
    /// 危及器官 (organs-at-risk), 按词表顺序排列.
    pub const OARS: [&str; 7] = [
        "Brainstem",
        "SpinalCord",
        "RightParotid",
        "LeftParotid",
        "Esophagus",
        "Larynx",
        "Mandible",
    ];

    /// 靶区 (planning target volumes), 按词表顺序排列.
    pub const TARGETS: [&str; 3] = ["PTV56", "PTV63", "PTV70"];
}
