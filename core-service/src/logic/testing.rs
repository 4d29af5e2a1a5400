//! Test doubles shared across module tests

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::constants::CONTAINER_OUTPUT_DIR;
use crate::logic::error::{PipelineError, PipelineResult};
use crate::logic::extraction::{ExtractorSettings, FlowExtractor, ProcessOutput, ProcessRunner};
use crate::logic::features::FeatureRow;
use crate::logic::model::{Classifier, Label, Prediction};

/// Three-row table: 5-tuple identity plus two features
pub const SAMPLE_FLOW_CSV: &str = "\
Flow ID,Src IP,Src Port,Dst IP,Dst Port,Protocol,Flow Duration,Tot Fwd Pkts
f0,10.0.0.1,5000,10.0.0.2,80,6,100,3
f1,10.0.0.1,5001,10.0.0.3,443,6,250,12
f2,10.0.0.4,5002,10.0.0.2,53,17,7,1
";

/// Scripted container engine
///
/// `image inspect` answers with `inspect_code`; `run` answers with `run_code`
/// and, on success, writes `tables` into the host side of the `/out` mount.
/// `rm` always succeeds.
pub struct FakeRunner {
    pub inspect_code: i32,
    pub run_code: i32,
    pub engine_missing: bool,
    pub tables: Vec<(String, String)>,
    pub run_delay: Duration,
    pub calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRunner {
    pub fn with_table(name: &str, content: &str) -> Self {
        Self::with_tables(&[(name, content)])
    }

    pub fn with_tables(tables: &[(&str, &str)]) -> Self {
        Self {
            inspect_code: 0,
            run_code: 0,
            engine_missing: false,
            tables: tables
                .iter()
                .map(|(name, content)| (name.to_string(), content.to_string()))
                .collect(),
            run_delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of `run` invocations (extractions), excluding inspects
    pub fn extractions(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|args| args.first().map(String::as_str) == Some("run"))
            .count()
    }

    pub fn last_run_args(&self) -> Option<Vec<String>> {
        self.calls
            .lock()
            .iter()
            .rev()
            .find(|args| args.first().map(String::as_str) == Some("run"))
            .cloned()
    }

    /// Containers removed with `rm -f`
    pub fn removed_containers(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|args| args.first().map(String::as_str) == Some("rm"))
            .filter_map(|args| args.last().cloned())
            .collect()
    }

    fn output_mount(args: &[String]) -> Option<PathBuf> {
        let suffix = format!(":{}", CONTAINER_OUTPUT_DIR);
        args.iter()
            .find_map(|a| a.strip_suffix(&suffix))
            .map(PathBuf::from)
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, _program: &str, args: &[String]) -> io::Result<ProcessOutput> {
        if self.engine_missing {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }
        self.calls.lock().push(args.to_vec());

        match args.first().map(String::as_str) {
            Some("image") => return Ok(ProcessOutput { code: Some(self.inspect_code), ..Default::default() }),
            Some("rm") => return Ok(ProcessOutput { code: Some(0), ..Default::default() }),
            _ => {}
        }

        if !self.run_delay.is_zero() {
            tokio::time::sleep(self.run_delay).await;
        }

        if self.run_code != 0 {
            return Ok(ProcessOutput {
                code: Some(self.run_code),
                stderr: "pcap parse error\n".to_string(),
                ..Default::default()
            });
        }

        if let Some(out) = Self::output_mount(args) {
            for (name, content) in &self.tables {
                std::fs::write(out.join(name), content)?;
            }
        }
        Ok(ProcessOutput { code: Some(0), ..Default::default() })
    }
}

pub fn fake_extractor(runner: Arc<FakeRunner>) -> FlowExtractor {
    FlowExtractor::new(
        runner,
        ExtractorSettings {
            program: "docker".to_string(),
            image: "cicflowmeter:offline".to_string(),
            settle_delay: Duration::from_millis(1),
            settle_polls: 2,
            user: Some("1000:1000".to_string()),
        },
    )
}

/// Returns the scripted labels, cycling if there are more rows
pub struct FixedClassifier {
    pub columns: Vec<String>,
    pub labels: Vec<u8>,
    /// 1-based `classify` call that fails
    pub fail_on_call: Option<usize>,
    calls: AtomicUsize,
}

impl FixedClassifier {
    pub fn new(columns: &[&str], labels: &[u8]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            labels: labels.to_vec(),
            fail_on_call: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for FixedClassifier {
    fn name(&self) -> &str {
        "fixed"
    }

    fn required_columns(&self) -> PipelineResult<&[String]> {
        Ok(&self.columns)
    }

    fn classify(&self, rows: &[FeatureRow]) -> PipelineResult<Vec<Prediction>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(PipelineError::ClassificationFailed(format!("scripted failure on call {}", call)));
        }
        Ok((0..rows.len())
            .map(|i| Prediction {
                label: Label::from_raw(self.labels[i % self.labels.len()] as i64),
                confidence: None,
            })
            .collect())
    }
}
