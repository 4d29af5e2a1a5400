use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use super::table::{write_predictions, FlowTable};
use crate::logic::error::ErrorKind;
use crate::logic::features::FeatureRow;
use crate::logic::model::{Label, Prediction};
use crate::logic::testing::{fake_extractor, FakeRunner, SAMPLE_FLOW_CSV};

fn capture(dir: &TempDir) -> std::path::PathBuf {
    let input = dir.path().join("input");
    std::fs::create_dir_all(&input).unwrap();
    let path = input.join("a.pcap");
    std::fs::write(&path, b"pcap-bytes").unwrap();
    path
}

#[tokio::test]
async fn test_extract_single_file() {
    let dir = TempDir::new().unwrap();
    let pcap = capture(&dir);
    let out = dir.path().join("out");

    let runner = Arc::new(FakeRunner::with_table("a.pcap_Flow.csv", SAMPLE_FLOW_CSV));
    let extractor = fake_extractor(runner.clone());

    let tables = extractor.extract(&pcap, &out).await.unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "a.pcap_Flow.csv");
    assert!(tables[0].path.exists());

    let args = runner.last_run_args().unwrap();
    assert_eq!(&args[..6], &["run", "--rm", "--name", "flowguard-out", "-u", "1000:1000"]);
    assert!(args.iter().any(|a| a.ends_with(":/data:ro")));
    assert!(args.contains(&"cicflowmeter:offline".to_string()));
    assert_eq!(args[args.len() - 2], "/data/a.pcap");
    assert_eq!(args[args.len() - 1], "/out");
}

#[tokio::test]
async fn test_extract_directory_input() {
    let dir = TempDir::new().unwrap();
    let pcap = capture(&dir);
    let out = dir.path().join("out");

    let runner = Arc::new(FakeRunner::with_table("a.pcap_Flow.csv", SAMPLE_FLOW_CSV));
    let extractor = fake_extractor(runner.clone());

    extractor.extract(pcap.parent().unwrap(), &out).await.unwrap();
    let args = runner.last_run_args().unwrap();
    assert_eq!(args[args.len() - 2], "/data");
}

#[tokio::test]
async fn test_non_zero_exit_is_extraction_failed() {
    let dir = TempDir::new().unwrap();
    let pcap = capture(&dir);

    let mut runner = FakeRunner::with_table("a.pcap_Flow.csv", SAMPLE_FLOW_CSV);
    runner.run_code = 2;
    let extractor = fake_extractor(Arc::new(runner));

    let err = extractor.extract(&pcap, &dir.path().join("out")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
    assert!(err.to_string().contains("exit code 2"));
    assert!(err.to_string().contains("pcap parse error"));
}

#[tokio::test]
async fn test_missing_image_is_environment_unavailable() {
    let dir = TempDir::new().unwrap();
    let pcap = capture(&dir);

    let mut runner = FakeRunner::with_table("a.pcap_Flow.csv", SAMPLE_FLOW_CSV);
    runner.inspect_code = 1;
    let runner = Arc::new(runner);
    let extractor = fake_extractor(runner.clone());

    let err = extractor.extract(&pcap, &dir.path().join("out")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EnvironmentUnavailable);
    assert_eq!(runner.extractions(), 0);
}

#[tokio::test]
async fn test_missing_engine_is_environment_unavailable() {
    let dir = TempDir::new().unwrap();
    let pcap = capture(&dir);

    let mut runner = FakeRunner::with_table("a.pcap_Flow.csv", SAMPLE_FLOW_CSV);
    runner.engine_missing = true;
    let extractor = fake_extractor(Arc::new(runner));

    let err = extractor.extract(&pcap, &dir.path().join("out")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EnvironmentUnavailable);
    assert!(err.to_string().contains("not found"));
}

#[tokio::test]
async fn test_container_name_follows_output_dir() {
    let dir = TempDir::new().unwrap();
    let pcap = capture(&dir);
    let out = dir.path().join("my capture_0a1b2c3d4e5f_2");

    let runner = Arc::new(FakeRunner::with_table("a.pcap_Flow.csv", SAMPLE_FLOW_CSV));
    let extractor = fake_extractor(runner.clone());

    extractor.extract(&pcap, &out).await.unwrap();
    let args = runner.last_run_args().unwrap();
    assert_eq!(args[3], "flowguard-my-capture_0a1b2c3d4e5f_2");
    assert!(runner.removed_containers().is_empty());
}

#[tokio::test]
async fn test_interrupted_extraction_removes_container() {
    let dir = TempDir::new().unwrap();
    let pcap = capture(&dir);
    let out = dir.path().join("job_1");

    let mut runner = FakeRunner::with_table("a.pcap_Flow.csv", SAMPLE_FLOW_CSV);
    runner.run_delay = Duration::from_secs(30);
    let runner = Arc::new(runner);
    let extractor = Arc::new(fake_extractor(runner.clone()));

    let task = {
        let extractor = extractor.clone();
        tokio::spawn(async move { extractor.extract(&pcap, &out).await })
    };
    for _ in 0..100 {
        if runner.extractions() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(runner.extractions(), 1);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    extractor.wait_for_cleanup().await;

    assert_eq!(runner.removed_containers(), vec!["flowguard-job_1"]);
}

#[tokio::test]
async fn test_no_matching_output() {
    let dir = TempDir::new().unwrap();
    let pcap = capture(&dir);

    // Output exists but does not follow the naming convention
    let runner = FakeRunner::with_table("a.pcap.csv", SAMPLE_FLOW_CSV);
    let extractor = fake_extractor(Arc::new(runner));

    let err = extractor.extract(&pcap, &dir.path().join("out")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoOutputProduced);
}

#[test]
fn test_load_flow_table() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.pcap_Flow.csv");
    std::fs::write(&path, SAMPLE_FLOW_CSV).unwrap();

    let table = FlowTable::load(&path).unwrap();
    assert_eq!(table.name, "a.pcap_Flow.csv");
    assert_eq!(table.len(), 3);
    assert_eq!(table.columns[1], "Src IP");

    let summary = table.summary(1);
    assert_eq!(summary.get("Flow ID").map(String::as_str), Some("f1"));
    assert_eq!(summary.get("Dst Port").map(String::as_str), Some("443"));
    assert!(!summary.contains_key("Timestamp"));
}

#[test]
fn test_load_trims_headers_and_tolerates_ragged_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("x_Flow.csv");
    std::fs::write(&path, " Src IP , Flow Duration\n10.0.0.1,5\n10.0.0.2\n").unwrap();

    let table = FlowTable::load(&path).unwrap();
    assert_eq!(table.columns, vec!["Src IP", "Flow Duration"]);
    assert_eq!(table.rows[1].len(), 1);
}

#[test]
fn test_write_predictions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a_predictions.csv");
    let columns = vec!["Flow Duration".to_string(), "Tot Fwd Pkts".to_string()];
    let rows = vec![FeatureRow::new(vec![100.0, 3.0]), FeatureRow::new(vec![7.0, 1.0])];
    let predictions = vec![
        Prediction { label: Label::Benign, confidence: None },
        Prediction { label: Label::Malicious, confidence: Some(0.9) },
    ];

    write_predictions(&path, &columns, &rows, &predictions).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines[0], "Flow Duration,Tot Fwd Pkts,Prediction");
    assert_eq!(lines[1], "100,3,0");
    assert_eq!(lines[2], "7,1,1");
}
