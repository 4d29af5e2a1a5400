//! Stub classifier - deterministic stand-in for a trained model
//!
//! Each row's label is drawn from an RNG seeded with the classifier seed and
//! the row's content, so the same flow always gets the same label.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Classifier, Label, Prediction};
use crate::logic::error::PipelineResult;
use crate::logic::features::layout::default_columns;
use crate::logic::features::FeatureRow;

pub struct StubClassifier {
    seed: u64,
    malicious_rate: f64,
    columns: Vec<String>,
}

impl StubClassifier {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            malicious_rate: 0.5,
            columns: default_columns(),
        }
    }

    /// Probability in [0, 1] that a row is labelled malicious
    pub fn with_malicious_rate(mut self, rate: f64) -> Self {
        self.malicious_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    fn label_row(&self, row: &FeatureRow) -> Prediction {
        let mut rng = StdRng::seed_from_u64(self.seed ^ ((row.fingerprint() as u64) << 17));
        let malicious = rng.gen_bool(self.malicious_rate);
        Prediction {
            label: if malicious { Label::Malicious } else { Label::Benign },
            confidence: None,
        }
    }
}

impl Classifier for StubClassifier {
    fn name(&self) -> &str {
        "stub"
    }

    fn required_columns(&self) -> PipelineResult<&[String]> {
        Ok(&self.columns)
    }

    fn classify(&self, rows: &[FeatureRow]) -> PipelineResult<Vec<Prediction>> {
        Ok(rows.iter().map(|row| self.label_row(row)).collect())
    }
}
