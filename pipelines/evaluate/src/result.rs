//! 评估结果.

use dose_berry::EvaluationReport;
use std::io::{self, Write};
use std::path::Path;

/// 将分数与失败概要写进 `w` 中.
fn describe_into<W: Write>(r: &EvaluationReport, w: &mut W) -> io::Result<()> {
    const S4: &str = "    ";

    writeln!(w, "Patients evaluated: {}", r.patients.len())?;
    writeln!(w, "DVH score: {}", r.dvh_score)?;
    writeln!(w, "Dose score: {}", r.dose_score)?;
    writeln!(w, "Metrics: {} reference, {} predicted", r.reference.len(), r.predicted.len())?;
    if r.failures.is_empty() {
        write!(w, "No patient excluded")?;
    } else {
        write!(w, "Excluded {} patients:", r.failures.len())?;
        for f in r.failures.iter() {
            write!(w, "\n{S4}{f}")?;
        }
    }
    Ok(())
}

/// 一次评估运行的最终结果.
pub struct EvaluationSummary {
    report: EvaluationReport,
}

impl EvaluationSummary {
    pub fn new(report: EvaluationReport) -> Self {
        Self { report }
    }

    /// 打印运行结果.
    pub fn analyze(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        utils::sep_to(&mut out)?;
        describe_into(&self.report, &mut out)?;
        writeln!(out)?;
        utils::sep_to(&mut out)
    }

    /// 将两侧指标表写为 TSV.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        self.report.save_tsv(path)
    }
}
