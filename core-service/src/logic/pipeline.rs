//! Pipeline Orchestrator
//!
//! One job: extract → for each flow table (in name order): load → reconcile →
//! classify → build alerts → append. The first failing stage aborts the job;
//! alerts appended for earlier tables stay in the log and are deduplicated by
//! identity on a later retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::logic::alerts::{build_alerts, Alert, AlertStore};
use crate::logic::artifact::{CaptureArtifact, JobKey};
use crate::logic::config::PipelineConfig;
use crate::logic::error::{PipelineError, PipelineResult};
use crate::logic::extraction::table::write_predictions;
use crate::logic::extraction::{ExtractorSettings, FlowExtractor, FlowTable, SystemRunner};
use crate::logic::features::reconcile;
use crate::logic::model::{build_classifier, Classifier, Prediction};

/// Result of a successful job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Flow table names, processing order
    pub flow_tables: Vec<String>,
    pub flows_scored: usize,
    /// Every alert the job built, including ones already in the log
    pub alerts: Vec<Alert>,
    /// Alerts actually written by this run
    pub alerts_appended: usize,
}

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    extractor: FlowExtractor,
    classifier: Arc<dyn Classifier>,
    store: Arc<AlertStore>,
}

impl Pipeline {
    pub fn new(
        config: Arc<PipelineConfig>,
        extractor: FlowExtractor,
        classifier: Arc<dyn Classifier>,
        store: Arc<AlertStore>,
    ) -> Self {
        Self { config, extractor, classifier, store }
    }

    /// Production wiring: real processes, configured classifier and alert log
    pub fn from_config(config: Arc<PipelineConfig>, store: Arc<AlertStore>) -> Self {
        let extractor = FlowExtractor::new(Arc::new(SystemRunner), ExtractorSettings::from_config(&config));
        let classifier = build_classifier(&config);
        Self::new(config, extractor, classifier, store)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<AlertStore> {
        &self.store
    }

    pub fn extractor(&self) -> &FlowExtractor {
        &self.extractor
    }

    pub async fn run(&self, artifact: &CaptureArtifact, key: &JobKey, output_dir: &Path) -> PipelineResult<JobOutcome> {
        log::info!(
            "Job {} started: {} ({} bytes) via {}",
            key.short(),
            artifact.name,
            artifact.size_bytes,
            self.classifier.name()
        );

        let tables = self.extractor.extract(&artifact.path, output_dir).await?;

        let mut outcome = JobOutcome::default();
        for table_ref in tables {
            let classifier = self.classifier.clone();
            let path = table_ref.path.clone();
            let predictions_file = self
                .config
                .save_predictions
                .then(|| predictions_path(output_dir, &table_ref.name));

            let (table, predictions) = tokio::task::spawn_blocking(move || {
                score_table(&path, classifier.as_ref(), predictions_file.as_deref())
            })
            .await
            .map_err(|e| PipelineError::Internal(format!("scoring task failed: {}", e)))??;

            let alerts = build_alerts(artifact, key, &table, &predictions);
            let appended = self.persist(alerts.clone()).await?;

            log::info!(
                "Job {}: {} flows in {}, {} malicious, {} new alert(s)",
                key.short(),
                table.len(),
                table.name,
                alerts.len(),
                appended
            );

            outcome.flow_tables.push(table.name);
            outcome.flows_scored += predictions.len();
            outcome.alerts_appended += appended;
            outcome.alerts.extend(alerts);
        }

        Ok(outcome)
    }

    async fn persist(&self, alerts: Vec<Alert>) -> PipelineResult<usize> {
        if alerts.is_empty() {
            return Ok(0);
        }
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.append(&alerts))
            .await
            .map_err(|e| PipelineError::Internal(format!("alert append task failed: {}", e)))?
    }
}

/// One flow table of an offline extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableReport {
    pub table: PathBuf,
    pub flows: usize,
    /// Rows labelled malicious; `None` without a classifier
    pub malicious: Option<usize>,
    pub predictions: Option<PathBuf>,
}

/// Extract `input` into `output_dir` without a job or the alert log
///
/// With a classifier, each non-empty flow table gets a
/// `<table>_predictions.csv` next to it.
pub async fn extract_offline(
    extractor: &FlowExtractor,
    classifier: Option<Arc<dyn Classifier>>,
    input: &Path,
    output_dir: &Path,
) -> PipelineResult<Vec<TableReport>> {
    let tables = extractor.extract(input, output_dir).await?;

    let mut reports = Vec::with_capacity(tables.len());
    for table_ref in tables {
        let classifier = classifier.clone();
        let predictions_file = predictions_path(output_dir, &table_ref.name);
        let path = table_ref.path.clone();

        let report = tokio::task::spawn_blocking(move || match classifier {
            Some(classifier) => {
                let (table, predictions) = score_table(&path, classifier.as_ref(), Some(&predictions_file))?;
                Ok(TableReport {
                    table: path,
                    flows: table.len(),
                    malicious: Some(predictions.iter().filter(|p| p.label.is_malicious()).count()),
                    predictions: (!predictions.is_empty()).then_some(predictions_file),
                })
            }
            None => Ok(TableReport {
                flows: FlowTable::load(&path)?.len(),
                table: path,
                malicious: None,
                predictions: None,
            }),
        })
        .await
        .map_err(|e| PipelineError::Internal(format!("scoring task failed: {}", e)))??;

        reports.push(report);
    }
    Ok(reports)
}

/// Load one table and label every row. Empty tables are not classified.
fn score_table(
    path: &Path,
    classifier: &dyn Classifier,
    predictions_file: Option<&Path>,
) -> PipelineResult<(FlowTable, Vec<Prediction>)> {
    let table = FlowTable::load(path)?;
    if table.is_empty() {
        log::info!("{} has no flows, skipping classification", table.name);
        return Ok((table, Vec::new()));
    }

    let columns = classifier.required_columns()?;
    let rows = reconcile(&table, columns);
    let predictions = classifier.classify(&rows)?;

    if predictions.len() != rows.len() {
        return Err(PipelineError::ClassificationFailed(format!(
            "{} predictions for {} rows in {}",
            predictions.len(),
            rows.len(),
            table.name
        )));
    }

    if let Some(file) = predictions_file {
        write_predictions(file, columns, &rows, &predictions)?;
    }

    Ok((table, predictions))
}

/// `a.pcap_Flow.csv` → `<dir>/a.pcap_Flow_predictions.csv`
fn predictions_path(output_dir: &Path, table_name: &str) -> PathBuf {
    let stem = table_name.strip_suffix(".csv").unwrap_or(table_name);
    output_dir.join(format!("{}_predictions.csv", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::artifact::ArtifactOrigin;
    use crate::logic::error::ErrorKind;
    use crate::logic::testing::{fake_extractor, FakeRunner, FixedClassifier, SAMPLE_FLOW_CSV};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        artifact: CaptureArtifact,
        store: Arc<AlertStore>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("input");
        std::fs::create_dir_all(&input).unwrap();
        let path = input.join("a.pcap");
        std::fs::write(&path, b"pcap-bytes").unwrap();

        let artifact = CaptureArtifact::from_path(&path, ArtifactOrigin::Upload).unwrap();
        let store = Arc::new(AlertStore::new(dir.path().join("alerts.jsonl")));
        Fixture { dir, artifact, store }
    }

    fn pipeline(fx: &Fixture, runner: FakeRunner, classifier: FixedClassifier, save: bool) -> Pipeline {
        let config = PipelineConfig {
            save_predictions: save,
            ..PipelineConfig::default()
        };
        Pipeline::new(
            Arc::new(config),
            fake_extractor(Arc::new(runner)),
            Arc::new(classifier),
            fx.store.clone(),
        )
    }

    #[tokio::test]
    async fn test_one_malicious_row_one_alert() {
        let fx = fixture();
        let runner = FakeRunner::with_table("a.pcap_Flow.csv", SAMPLE_FLOW_CSV);
        let classifier = FixedClassifier::new(&["Flow Duration", "Tot Fwd Pkts"], &[0, 1, 0]);
        let pipeline = pipeline(&fx, runner, classifier, false);
        let key = fx.artifact.job_key();

        let outcome = pipeline.run(&fx.artifact, &key, &fx.dir.path().join("out")).await.unwrap();

        assert_eq!(outcome.flow_tables, vec!["a.pcap_Flow.csv"]);
        assert_eq!(outcome.flows_scored, 3);
        assert_eq!(outcome.alerts.len(), 1);
        assert_eq!(outcome.alerts[0].row, 1);
        assert_eq!(outcome.alerts_appended, 1);
        assert_eq!(fx.store.len(), 1);
    }

    #[tokio::test]
    async fn test_rerun_appends_nothing_new() {
        let fx = fixture();
        let runner = FakeRunner::with_table("a.pcap_Flow.csv", SAMPLE_FLOW_CSV);
        let classifier = FixedClassifier::new(&["Flow Duration"], &[1]);
        let pipeline = pipeline(&fx, runner, classifier, false);
        let key = fx.artifact.job_key();

        let first = pipeline.run(&fx.artifact, &key, &fx.dir.path().join("out1")).await.unwrap();
        let second = pipeline.run(&fx.artifact, &key, &fx.dir.path().join("out2")).await.unwrap();

        assert_eq!(first.alerts_appended, 3);
        assert_eq!(second.alerts.len(), 3);
        assert_eq!(second.alerts_appended, 0);
        assert_eq!(fx.store.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_required_column_is_zero_filled() {
        let fx = fixture();
        let runner = FakeRunner::with_table("a.pcap_Flow.csv", SAMPLE_FLOW_CSV);
        let classifier = FixedClassifier::new(&["Flow Duration", "Bwd IAT Max"], &[0, 0, 1]);
        let pipeline = pipeline(&fx, runner, classifier, true);
        let key = fx.artifact.job_key();
        let out = fx.dir.path().join("out");

        let outcome = pipeline.run(&fx.artifact, &key, &out).await.unwrap();
        assert_eq!(outcome.alerts.len(), 1);

        let saved = std::fs::read_to_string(out.join("a.pcap_Flow_predictions.csv")).unwrap();
        let lines: Vec<&str> = saved.lines().collect();
        assert_eq!(lines[0], "Flow Duration,Bwd IAT Max,Prediction");
        assert_eq!(lines[1], "100,0,0");
        assert_eq!(lines[3], "7,0,1");
    }

    #[tokio::test]
    async fn test_extraction_failure_leaves_store_unchanged() {
        let fx = fixture();
        let mut runner = FakeRunner::with_table("a.pcap_Flow.csv", SAMPLE_FLOW_CSV);
        runner.run_code = 1;
        let classifier = FixedClassifier::new(&["Flow Duration"], &[1]);
        let pipeline = pipeline(&fx, runner, classifier, false);
        let key = fx.artifact.job_key();

        let err = pipeline.run(&fx.artifact, &key, &fx.dir.path().join("out")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
        assert_eq!(fx.store.len(), 0);
    }

    #[tokio::test]
    async fn test_empty_table_skips_classifier() {
        let fx = fixture();
        let runner = FakeRunner::with_table("a.pcap_Flow.csv", "Flow ID,Flow Duration\n");
        // No scripted labels: classifying anything would panic
        let classifier = FixedClassifier::new(&["Flow Duration"], &[]);
        let pipeline = pipeline(&fx, runner, classifier, false);
        let key = fx.artifact.job_key();

        let outcome = pipeline.run(&fx.artifact, &key, &fx.dir.path().join("out")).await.unwrap();
        assert_eq!(outcome.flow_tables.len(), 1);
        assert_eq!(outcome.flows_scored, 0);
        assert!(outcome.alerts.is_empty());
    }

    #[tokio::test]
    async fn test_failing_table_stops_the_job() {
        let fx = fixture();
        let runner = FakeRunner::with_tables(&[
            ("a.pcap_Flow.csv", SAMPLE_FLOW_CSV),
            ("b.pcap_Flow.csv", SAMPLE_FLOW_CSV),
            ("c.pcap_Flow.csv", SAMPLE_FLOW_CSV),
        ]);
        let classifier = Arc::new(FixedClassifier::new(&["Flow Duration"], &[1]).failing_on_call(2));
        let pipeline = Pipeline::new(
            Arc::new(PipelineConfig::default()),
            fake_extractor(Arc::new(runner)),
            classifier.clone(),
            fx.store.clone(),
        );
        let key = fx.artifact.job_key();

        let err = pipeline.run(&fx.artifact, &key, &fx.dir.path().join("out")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClassificationFailed);

        // Table c is never classified
        assert_eq!(classifier.calls(), 2);

        // Table a's alerts were already committed
        let stored = fx.store.read_recent(10);
        assert_eq!(stored.len(), 3);
        assert!(stored.iter().all(|a| a.flow_file == "a.pcap_Flow.csv"));
    }

    #[tokio::test]
    async fn test_offline_extraction_writes_predictions_only() {
        let fx = fixture();
        let runner = Arc::new(FakeRunner::with_table("a.pcap_Flow.csv", SAMPLE_FLOW_CSV));
        let extractor = fake_extractor(runner);
        let out = fx.dir.path().join("flows");
        let classifier: Arc<dyn Classifier> = Arc::new(FixedClassifier::new(&["Flow Duration"], &[0, 1, 1]));

        let reports = extract_offline(&extractor, Some(classifier), &fx.artifact.path, &out).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].flows, 3);
        assert_eq!(reports[0].malicious, Some(2));
        let predictions = reports[0].predictions.clone().unwrap();
        assert_eq!(predictions, out.join("a.pcap_Flow_predictions.csv"));
        assert!(predictions.exists());

        let reports = extract_offline(&extractor, None, &fx.artifact.path, &out).await.unwrap();
        assert_eq!(reports[0].flows, 3);
        assert_eq!(reports[0].malicious, None);

        assert!(fx.store.is_empty());
    }

    #[test]
    fn test_predictions_path() {
        let path = predictions_path(Path::new("/out"), "a.pcap_Flow.csv");
        assert_eq!(path, PathBuf::from("/out/a.pcap_Flow_predictions.csv"));
    }
}
