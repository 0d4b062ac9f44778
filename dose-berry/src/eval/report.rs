use super::evaluator::PatientFailure;
use super::score::Score;
use super::table::{MetricKey, MetricTable};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// 队列评估报告.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationReport {
    /// 参考剂量上的指标.
    pub reference: MetricTable,

    /// 预测剂量上的指标, 与参考侧使用同一组掩膜.
    pub predicted: MetricTable,

    /// DVH 分数.
    pub dvh_score: Score,

    /// 剂量分数.
    pub dose_score: Score,

    /// 各患者的剂量误差.
    pub dose_errors: BTreeMap<String, f64>,

    /// 成功评估的患者, 有序.
    pub patients: Vec<String>,

    /// 被排除的患者, 按患者标识排序.
    pub failures: Vec<PatientFailure>,
}

#[inline]
fn f64_to_display(f: Option<f64>) -> String {
    match f {
        Some(f) => format!("{f:.6}"),
        None => "/".to_string(),
    }
}

impl EvaluationReport {
    /// 两侧指标表中出现过的全部键, 有序.
    pub fn keys(&self) -> BTreeSet<&MetricKey> {
        self.reference
            .iter()
            .chain(self.predicted.iter())
            .map(|(k, _)| k)
            .collect()
    }

    /// 以 TSV 写出两侧指标: `patient structure metric reference predicted`.
    /// 缺失或无定义的值写为 `/`.
    pub fn write_tsv<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "patient\tstructure\tmetric\treference\tpredicted")?;
        for key in self.keys() {
            writeln!(
                w,
                "{}\t{}\t{}\t{}\t{}",
                key.patient,
                key.structure,
                key.metric,
                f64_to_display(self.reference.defined(key)),
                f64_to_display(self.predicted.defined(key)),
            )?;
        }
        Ok(())
    }

    /// 将 TSV 写入文件.
    pub fn save_tsv<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write_tsv(&mut w)?;
        w.flush()
    }
}

#[cfg(feature = "serde")]
impl EvaluationReport {
    /// 保存为 zlib 压缩的 `bincode` 快照.
    pub fn save_compact<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;

        let w = BufWriter::new(File::create(path)?);
        let mut e = ZlibEncoder::new(w, Compression::best());
        bincode::serialize_into(&mut e, self)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        e.finish()?.flush()
    }

    /// 读取 [`Self::save_compact`] 写出的快照.
    pub fn load_compact<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        use flate2::read::ZlibDecoder;

        let d = ZlibDecoder::new(io::BufReader::new(File::open(path)?));
        bincode::deserialize_from(d).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
