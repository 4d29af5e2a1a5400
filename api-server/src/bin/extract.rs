//! FlowGuard offline extractor
//!
//! Runs the flow extractor on one capture (or a directory of captures) and
//! optionally scores the flows with the configured classifier. No job is
//! created and nothing is written to the alert log.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowguard_core::logic::extraction::{ExtractorSettings, FlowExtractor, SystemRunner};
use flowguard_core::logic::model::build_classifier;
use flowguard_core::{extract_offline, ClassifierKind, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "flowguard-extract", version, about = "Extract flow features from a capture")]
struct Args {
    /// Capture file or directory of captures
    #[arg(long)]
    pcap: PathBuf,

    /// Output directory for flow tables
    #[arg(long, default_value = "data/flows")]
    outdir: PathBuf,

    /// Score flows and write a predictions table per flow table
    #[arg(long)]
    predict: bool,

    /// ONNX model to score with; implies --predict
    #[arg(long)]
    model: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "flowguard_core=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    if let Some(model) = &args.model {
        config.model_path = model.clone();
        config.classifier = ClassifierKind::Onnx;
    }

    let extractor = FlowExtractor::new(Arc::new(SystemRunner), ExtractorSettings::from_config(&config));
    let classifier = (args.predict || args.model.is_some()).then(|| build_classifier(&config));

    let reports = tokio::select! {
        result = extract_offline(&extractor, classifier, &args.pcap, &args.outdir) => {
            result.with_context(|| format!("extraction of {} failed", args.pcap.display()))?
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, removing extractor container");
            extractor.wait_for_cleanup().await;
            anyhow::bail!("interrupted");
        }
    };

    println!("Features extracted to {} table(s):", reports.len());
    for report in &reports {
        match (&report.malicious, &report.predictions) {
            (Some(malicious), Some(predictions)) => println!(
                "  {} ({} flows, {} malicious) -> {}",
                report.table.display(),
                report.flows,
                malicious,
                predictions.display()
            ),
            _ => println!("  {} ({} flows)", report.table.display(), report.flows),
        }
    }
    Ok(())
}
