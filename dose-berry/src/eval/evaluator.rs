use super::report::EvaluationReport;
use super::score::{dose_error, dose_score, dvh_score, NoScore, Score};
use super::table::{MetricKey, MetricTable};
use crate::config::EvalConfig;
use crate::consts::file::SPARSE_EXT;
use crate::dataset::{LoadMode, LoadOutcome, PatientLoader, PatientRecord};
use crate::dvh::DvhEngine;
use crate::error::{CodecError, EvalError, LoadError};
use crate::volume::{DoseVolume, Mask};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    }
}

/// 预测剂量的来源.
#[derive(Clone, Debug, Default)]
pub enum Predictions {
    /// 没有预测, 只构建参考指标表.
    #[default]
    None,

    /// 目录下的 `{patient_id}.csv`. 缺失某患者的文件表示该患者没有预测.
    Directory(PathBuf),

    /// 内存中的预测剂量, 以患者标识为键.
    InMemory(BTreeMap<String, DoseVolume>),
}

/// 患者失败时所处的阶段.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(rename_all = "snake_case")
)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum Stage {
    /// 加载参考记录.
    Reference,

    /// 加载预测剂量.
    Prediction,

    /// 计算指标或剂量误差.
    Metrics,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reference => "reference",
            Self::Prediction => "prediction",
            Self::Metrics => "metrics",
        })
    }
}

/// 被排除的患者及原因.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PatientFailure {
    /// 患者标识.
    pub patient: String,

    /// 失败阶段.
    pub stage: Stage,

    /// 原因.
    pub reason: String,
}

impl fmt::Display for PatientFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` ({}): {}", self.patient, self.stage, self.reason)
    }
}

/// 单个患者的评估结果.
#[derive(Debug)]
struct PatientResult {
    id: String,
    reference: Vec<(MetricKey, Option<f64>)>,
    predicted: Option<Vec<(MetricKey, Option<f64>)>>,
    has_reference_dose: bool,
    dose_error: Option<f64>,
}

#[derive(Debug)]
enum Outcome {
    Done(PatientResult),
    Failed {
        failure: PatientFailure,

        /// 失败是否源于体数据与网格不符.
        grid: bool,
    },
}

impl Outcome {
    fn failed(patient: impl Into<String>, stage: Stage, reason: impl fmt::Display, grid: bool) -> Self {
        let failure = PatientFailure {
            patient: patient.into(),
            stage,
            reason: reason.to_string(),
        };
        log::warn!("excluding patient {failure}");
        Self::Failed { failure, grid }
    }

    fn from_load_error(patient: impl Into<String>, stage: Stage, e: LoadError) -> Self {
        let grid = e.is_grid_error();
        Self::failed(patient, stage, e, grid)
    }
}

#[inline]
fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// 队列评估器.
///
/// 持有经过校验的配置. 每个患者独立处理, 结果按患者标识合并,
/// 因此输出与处理顺序无关.
#[derive(Clone, Debug)]
pub struct DoseEvaluator {
    config: EvalConfig,
}

impl DoseEvaluator {
    /// 校验配置并初始化. 配置非法时整个运行应当中止.
    pub fn new(config: EvalConfig) -> Result<Self, EvalError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 配置.
    #[inline]
    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// 评估磁盘上的队列. `paths` 为患者目录, 以 `reference_mode` 加载.
    ///
    /// 通常 `reference_mode` 为 `Evaluation`; 对没有参考剂量的验证集可使用
    /// `DosePrediction`, 此时只构建指标表, 两个分数都不计算.
    pub fn evaluate_dir(
        &self,
        paths: &[PathBuf],
        reference_mode: LoadMode,
        predictions: &Predictions,
    ) -> Result<EvaluationReport, EvalError> {
        let loader = PatientLoader::from_config(&self.config, reference_mode);
        let outcomes = run_all(paths, |path| match loader.load(path) {
            Ok(LoadOutcome::Loaded(record)) => self.evaluate_one(&record, predictions),
            Ok(LoadOutcome::Missing(m)) => {
                let patient = m.patient.clone();
                Outcome::failed(patient, Stage::Reference, m.into_error(), false)
            }
            Err(e) => Outcome::from_load_error(dir_name(path), Stage::Reference, e),
        });
        self.merge(outcomes)
    }

    /// 评估内存中的参考记录.
    pub fn evaluate_records(
        &self,
        records: &[PatientRecord],
        predictions: &Predictions,
    ) -> Result<EvaluationReport, EvalError> {
        let outcomes = run_all(records, |record| self.evaluate_one(record, predictions));
        self.merge(outcomes)
    }

    fn predicted_dose<'p>(
        &self,
        record: &PatientRecord,
        predictions: &'p Predictions,
    ) -> Result<Option<Cow<'p, DoseVolume>>, LoadError> {
        match predictions {
            Predictions::None => Ok(None),
            Predictions::InMemory(m) => Ok(m.get(record.id()).map(Cow::Borrowed)),
            Predictions::Directory(dir) => {
                let path = dir.join(format!("{}.{SPARSE_EXT}", record.id()));
                let loader = PatientLoader::from_config(&self.config, LoadMode::PredictedDose);
                match loader.load(&path)? {
                    LoadOutcome::Loaded(p) => Ok(p.into_dose().map(Cow::Owned)),
                    LoadOutcome::Missing(_) => {
                        log::info!("no prediction for `{}`", record.id());
                        Ok(None)
                    }
                }
            }
        }
    }

    fn evaluate_one(&self, record: &PatientRecord, predictions: &Predictions) -> Outcome {
        let predicted = match self.predicted_dose(record, predictions) {
            Ok(p) => p,
            Err(e) => return Outcome::from_load_error(record.id(), Stage::Prediction, e),
        };
        match self.compute(record, predicted.as_deref()) {
            Ok(result) => Outcome::Done(result),
            Err(e) => Outcome::failed(record.id(), Stage::Metrics, e, true),
        }
    }

    /// 在参考剂量和预测剂量上用同一组掩膜计算指标.
    fn compute(
        &self,
        record: &PatientRecord,
        predicted: Option<&DoseVolume>,
    ) -> Result<PatientResult, CodecError> {
        let engine = DvhEngine::new(&self.config.metrics, self.config.convention);
        let voxel_mm3 = record.voxel_mm3();
        let id = record.id();

        let mut reference = Vec::new();
        let mut pred = predicted.map(|_| Vec::new());
        for sm in record.structures() {
            let name = sm.structure.name();
            if let Some(dose) = record.dose() {
                let metrics = engine.structure_metrics(&sm.structure, dose, &sm.mask, voxel_mm3)?;
                reference.extend(
                    metrics
                        .into_iter()
                        .map(|(kind, v)| (MetricKey::new(id, name, kind), v)),
                );
            }
            if let (Some(dose), Some(out)) = (predicted, pred.as_mut()) {
                let metrics = engine.structure_metrics(&sm.structure, dose, &sm.mask, voxel_mm3)?;
                out.extend(
                    metrics
                        .into_iter()
                        .map(|(kind, v)| (MetricKey::new(id, name, kind), v)),
                );
            }
        }

        let dose_err = match (record.dose(), predicted) {
            (Some(r), Some(p)) => {
                let full;
                let mask = match record.possible_dose_mask() {
                    Some(m) => m,
                    None => {
                        full = Mask::filled(r.shape(), true);
                        &full
                    }
                };
                dose_error(r, p, mask)?
            }
            _ => None,
        };

        Ok(PatientResult {
            id: id.to_string(),
            reference,
            predicted: pred,
            has_reference_dose: record.dose().is_some(),
            dose_error: dose_err,
        })
    }

    fn merge(&self, outcomes: Vec<Outcome>) -> Result<EvaluationReport, EvalError> {
        let total = outcomes.len();
        let mut results = BTreeMap::new();
        let mut failures = Vec::new();
        let mut grid_failures = 0usize;

        for outcome in outcomes {
            match outcome {
                Outcome::Done(r) => {
                    if let Some(old) = results.insert(r.id.clone(), r) {
                        log::warn!("patient `{}` appears more than once", old.id);
                    }
                }
                Outcome::Failed { failure, grid } => {
                    grid_failures += usize::from(grid);
                    failures.push(failure);
                }
            }
        }
        if total > 0 && grid_failures == total {
            return Err(EvalError::GridMisconfigured(self.config.grid.shape));
        }
        failures.sort_by(|a, b| (&a.patient, a.stage).cmp(&(&b.patient, b.stage)));

        let mut reference = MetricTable::new();
        let mut predicted = MetricTable::new();
        let mut dose_errors = BTreeMap::new();
        let (mut with_reference, mut with_prediction) = (0usize, 0usize);
        for r in results.values() {
            reference.extend(r.reference.iter().cloned());
            if let Some(p) = r.predicted.as_ref() {
                predicted.extend(p.iter().cloned());
                with_prediction += 1;
            }
            with_reference += usize::from(r.has_reference_dose);
            if let Some(e) = r.dose_error {
                dose_errors.insert(r.id.clone(), e);
            }
        }

        let missing = if results.is_empty() {
            Some(NoScore::EmptyCohort)
        } else if with_reference == 0 {
            Some(NoScore::NoReferenceDose)
        } else if with_prediction == 0 {
            Some(NoScore::NoPredictions)
        } else {
            None
        };
        let (dvh, dose) = match missing {
            Some(why) => (Score::NotComputed(why), Score::NotComputed(why)),
            None => (
                dvh_score(&reference, &predicted),
                dose_score(dose_errors.values().copied()),
            ),
        };

        log::info!(
            "evaluated {} of {total} patients ({} excluded): dvh score {dvh}, dose score {dose}",
            results.len(),
            failures.len(),
        );

        Ok(EvaluationReport {
            patients: results.into_keys().collect(),
            reference,
            predicted,
            dvh_score: dvh,
            dose_score: dose,
            dose_errors,
            failures,
        })
    }
}

#[cfg(feature = "rayon")]
fn run_all<T, F>(items: &[T], f: F) -> Vec<Outcome>
where
    T: Sync,
    F: Fn(&T) -> Outcome + Sync + Send,
{
    items.par_iter().map(f).collect()
}

#[cfg(not(feature = "rayon"))]
fn run_all<T, F>(items: &[T], f: F) -> Vec<Outcome>
where
    F: Fn(&T) -> Outcome,
{
    items.iter().map(f).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MetricSpecTable, Structure, StructureCategory, StructureVocabulary, VoxelGrid};
    use crate::dataset::{write_mask_csv, write_sparse_csv};
    use crate::dvh::MetricKind;
    use crate::volume::{decode_mask, encode, encode_mask};
    use std::fs;
    use tempfile::TempDir;

    const SHAPE: (usize, usize, usize) = (2, 2, 1);

    fn f64_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// 打开日志, 便于查看被排除患者的原因. 多次调用时只有第一次生效.
    fn init_logger() {
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Debug)
            .init();
    }

    fn config() -> EvalConfig {
        let vocabulary = StructureVocabulary::new(vec![
            Structure::new("Larynx", StructureCategory::OrganAtRisk),
            Structure::new("PTV70", StructureCategory::Target),
        ])
        .unwrap();
        let metrics = MetricSpecTable::openkbp()
            .with_structure("Larynx", vec![MetricKind::MeanDose])
            .with_structure("PTV70", vec![MetricKind::MeanDose]);
        EvalConfig {
            grid: VoxelGrid::new(SHAPE, [1.0; 3]).unwrap(),
            vocabulary,
            metrics,
            ..Default::default()
        }
    }

    fn record(cfg: &EvalConfig, id: &str, dose: f32, structures: &[(&str, &[usize])]) -> PatientRecord {
        let mut r = PatientRecord::new(id, cfg.grid)
            .with_dose(DoseVolume::filled(SHAPE, dose))
            .unwrap()
            .with_possible_dose_mask(Mask::filled(SHAPE, true))
            .unwrap();
        for (name, idx) in structures {
            let s = cfg.vocabulary.get(name).unwrap().clone();
            r = r
                .with_structure(s, decode_mask(idx.iter().copied(), SHAPE).unwrap())
                .unwrap();
        }
        r
    }

    fn in_memory(items: &[(&str, f32)]) -> Predictions {
        Predictions::InMemory(
            items
                .iter()
                .map(|(id, v)| (id.to_string(), DoseVolume::filled(SHAPE, *v)))
                .collect(),
        )
    }

    #[test]
    fn test_zero_reference_unit_prediction() {
        let ev = DoseEvaluator::new(config()).unwrap();
        let records = [record(ev.config(), "pt_1", 0.0, &[("PTV70", &[0, 1, 2, 3])])];
        let report = ev
            .evaluate_records(&records, &in_memory(&[("pt_1", 1.0)]))
            .unwrap();
        assert_eq!(report.dose_score, Score::Computed(1.0));
        assert_eq!(report.dvh_score, Score::Computed(1.0));
        assert_eq!(report.dose_errors.get("pt_1"), Some(&1.0));
        assert!(report.failures.is_empty());
    }

    #[test]
    fn test_structure_missing_on_one_side() {
        let ev = DoseEvaluator::new(config()).unwrap();
        let records = [
            record(ev.config(), "pt_1", 2.0, &[("Larynx", &[0]), ("PTV70", &[1, 2])]),
            record(ev.config(), "pt_2", 4.0, &[("PTV70", &[3])]),
        ];
        // pt_2 没有预测, 其参考指标没有对应项.
        let report = ev
            .evaluate_records(&records, &in_memory(&[("pt_1", 5.0)]))
            .unwrap();
        assert_eq!(report.reference.len(), 3);
        assert_eq!(report.predicted.len(), 2);
        assert!(report
            .predicted
            .get(&MetricKey::new("pt_2", "PTV70", MetricKind::MeanDose))
            .is_none());
        assert!(f64_eq(report.dvh_score.value().unwrap(), 3.0));
        assert_eq!(report.dose_score, Score::Computed(3.0));
        assert_eq!(report.patients, vec!["pt_1", "pt_2"]);

        // 患者缺少某结构时, 该结构不出现在任何一侧.
        assert!(report
            .reference
            .get(&MetricKey::new("pt_2", "Larynx", MetricKind::MeanDose))
            .is_none());
    }

    #[test]
    fn test_empty_cohort() {
        let ev = DoseEvaluator::new(config()).unwrap();
        let report = ev.evaluate_records(&[], &Predictions::None).unwrap();
        assert_eq!(report.dvh_score, Score::NotComputed(NoScore::EmptyCohort));
        assert_eq!(report.dose_score, Score::NotComputed(NoScore::EmptyCohort));
        assert!(report.patients.is_empty());

        let report = ev
            .evaluate_dir(&[], LoadMode::Evaluation, &Predictions::None)
            .unwrap();
        assert_eq!(report.dose_score, Score::NotComputed(NoScore::EmptyCohort));
    }

    #[test]
    fn test_reference_only_and_no_reference_dose() {
        let ev = DoseEvaluator::new(config()).unwrap();
        let records = [record(ev.config(), "pt_1", 3.0, &[("PTV70", &[0])])];
        let report = ev.evaluate_records(&records, &Predictions::None).unwrap();
        assert_eq!(report.reference.len(), 1);
        assert!(report.predicted.is_empty());
        assert_eq!(report.dvh_score, Score::NotComputed(NoScore::NoPredictions));

        let no_dose = PatientRecord::new("val_1", ev.config().grid)
            .with_structure(
                ev.config().vocabulary.get("PTV70").unwrap().clone(),
                decode_mask([0, 1], SHAPE).unwrap(),
            )
            .unwrap();
        let report = ev
            .evaluate_records(&[no_dose], &in_memory(&[("val_1", 7.0)]))
            .unwrap();
        assert!(report.reference.is_empty());
        assert_eq!(
            report
                .predicted
                .defined(&MetricKey::new("val_1", "PTV70", MetricKind::MeanDose)),
            Some(7.0)
        );
        assert_eq!(report.dose_score, Score::NotComputed(NoScore::NoReferenceDose));
    }

    #[test]
    fn test_order_independent() {
        let ev = DoseEvaluator::new(config()).unwrap();
        let mut records: Vec<_> = (0..6)
            .map(|i| {
                record(
                    ev.config(),
                    &format!("pt_{i}"),
                    i as f32,
                    &[("Larynx", &[0, 1]), ("PTV70", &[2, 3])],
                )
            })
            .collect();
        let preds = Predictions::InMemory(
            (0..6)
                .map(|i| (format!("pt_{i}"), DoseVolume::filled(SHAPE, (i * i) as f32)))
                .collect(),
        );
        let a = ev.evaluate_records(&records, &preds).unwrap();
        records.reverse();
        let b = ev.evaluate_records(&records, &preds).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.patients.first().map(String::as_str), Some("pt_0"));
    }

    fn write_patient(root: &Path, id: &str, dose: f32) -> PathBuf {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        write_sparse_csv(dir.join("dose.csv"), encode(&DoseVolume::filled(SHAPE, dose))).unwrap();
        write_mask_csv(dir.join("possible_dose_mask.csv"), 0..4).unwrap();
        write_mask_csv(dir.join("PTV70.csv"), encode_mask(&Mask::filled(SHAPE, true))).unwrap();
        dir
    }

    #[test]
    fn test_evaluate_dir_with_failures() {
        init_logger();
        let ev = DoseEvaluator::new(config()).unwrap();
        let tmp = TempDir::new().unwrap();
        let (refs, preds) = (tmp.path().join("reference"), tmp.path().join("prediction"));
        fs::create_dir_all(&preds).unwrap();

        let good = write_patient(&refs, "pt_1", 10.0);
        let no_pred = write_patient(&refs, "pt_2", 20.0);
        let broken = write_patient(&refs, "pt_3", 30.0);
        write_mask_csv(broken.join("Larynx.csv"), [9]).unwrap();
        let missing = write_patient(&refs, "pt_4", 40.0);
        fs::remove_file(missing.join("dose.csv")).unwrap();

        write_sparse_csv(
            preds.join("pt_1.csv"),
            encode(&DoseVolume::filled(SHAPE, 12.0)),
        )
        .unwrap();

        let paths = vec![good, no_pred, broken, missing];
        let report = ev
            .evaluate_dir(&paths, LoadMode::Evaluation, &Predictions::Directory(preds))
            .unwrap();

        assert_eq!(report.patients, vec!["pt_1", "pt_2"]);
        assert_eq!(report.dose_score, Score::Computed(2.0));
        assert_eq!(report.dvh_score, Score::Computed(2.0));
        let failed: Vec<_> = report
            .failures
            .iter()
            .map(|f| (f.patient.as_str(), f.stage))
            .collect();
        assert_eq!(failed, vec![("pt_3", Stage::Reference), ("pt_4", Stage::Reference)]);
    }

    #[test]
    fn test_invalid_dose_values_exclude_patient() {
        init_logger();
        let ev = DoseEvaluator::new(config()).unwrap();
        let tmp = TempDir::new().unwrap();
        let (refs, preds) = (tmp.path().join("reference"), tmp.path().join("prediction"));
        fs::create_dir_all(&preds).unwrap();

        let good = write_patient(&refs, "pt_1", 10.0);
        let corrupt = write_patient(&refs, "pt_2", 20.0);
        fs::write(corrupt.join("dose.csv"), ",data\n0,nan\n1,-5\n").unwrap();
        let bad_pred = write_patient(&refs, "pt_3", 30.0);
        for id in ["pt_1", "pt_2"] {
            write_sparse_csv(preds.join(format!("{id}.csv")), [(0, 1.0)]).unwrap();
        }
        fs::write(preds.join("pt_3.csv"), ",data\n0,-1\n").unwrap();

        let report = ev
            .evaluate_dir(
                &[good, corrupt, bad_pred],
                LoadMode::Evaluation,
                &Predictions::Directory(preds),
            )
            .unwrap();
        assert_eq!(report.patients, vec!["pt_1"]);
        assert!(report.dvh_score.value().is_some_and(f64::is_finite));
        assert!(report.dose_score.value().is_some_and(f64::is_finite));
        let failed: Vec<_> = report
            .failures
            .iter()
            .map(|f| (f.patient.as_str(), f.stage))
            .collect();
        assert_eq!(failed, vec![("pt_2", Stage::Reference), ("pt_3", Stage::Prediction)]);
    }

    #[test]
    fn test_validation_cohort_from_dir() {
        init_logger();
        let ev = DoseEvaluator::new(config()).unwrap();
        let tmp = TempDir::new().unwrap();
        let (refs, preds) = (tmp.path().join("validation"), tmp.path().join("prediction"));
        fs::create_dir_all(&preds).unwrap();

        let paths: Vec<_> = ["val_1", "val_2"]
            .iter()
            .map(|id| {
                let dir = refs.join(id);
                fs::create_dir_all(&dir).unwrap();
                write_sparse_csv(dir.join("ct.csv"), [(0, -1000.0), (3, 40.0)]).unwrap();
                write_mask_csv(dir.join("possible_dose_mask.csv"), 0..4).unwrap();
                write_mask_csv(dir.join("PTV70.csv"), [1, 2]).unwrap();
                dir
            })
            .collect();
        write_sparse_csv(preds.join("val_1.csv"), encode(&DoseVolume::filled(SHAPE, 6.0))).unwrap();

        let report = ev
            .evaluate_dir(&paths, LoadMode::DosePrediction, &Predictions::Directory(preds))
            .unwrap();
        assert_eq!(report.patients, vec!["val_1", "val_2"]);
        assert!(report.failures.is_empty());
        assert!(report.reference.is_empty());
        assert_eq!(report.predicted.len(), 1);
        assert_eq!(
            report
                .predicted
                .defined(&MetricKey::new("val_1", "PTV70", MetricKind::MeanDose)),
            Some(6.0)
        );
        assert_eq!(report.dvh_score, Score::NotComputed(NoScore::NoReferenceDose));
        assert_eq!(report.dose_score, Score::NotComputed(NoScore::NoReferenceDose));
        assert!(report.dose_errors.is_empty());
    }

    #[test]
    fn test_grid_misconfigured() {
        let tmp = TempDir::new().unwrap();
        let paths: Vec<_> = ["pt_1", "pt_2"]
            .iter()
            .map(|id| write_patient(tmp.path(), id, 1.0))
            .collect();
        let cfg = EvalConfig {
            grid: VoxelGrid::new((1, 1, 1), [1.0; 3]).unwrap(),
            ..config()
        };
        let ev = DoseEvaluator::new(cfg).unwrap();
        assert!(matches!(
            ev.evaluate_dir(&paths, LoadMode::Evaluation, &Predictions::None),
            Err(EvalError::GridMisconfigured((1, 1, 1)))
        ));
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let cfg = EvalConfig {
            metrics: MetricSpecTable::openkbp().with_structure("Heart", vec![MetricKind::MeanDose]),
            ..config()
        };
        assert!(matches!(DoseEvaluator::new(cfg), Err(EvalError::Config(_))));
    }
}
