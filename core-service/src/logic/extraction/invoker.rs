//! Flow Extractor - containerised flow-feature tool
//!
//! Runs `<engine> run --rm --name <name> -v <input>:/data:ro -v <out>:/out
//! <image> <in> /out` and collects the `*_Flow.csv` tables it leaves behind.
//!
//! The container belongs to the engine daemon, not to the client process. If
//! an extraction is dropped mid-run the named container is removed with
//! `<engine> rm -f`; `wait_for_cleanup` awaits those removals.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::runner::ProcessRunner;
use crate::constants::{CONTAINER_INPUT_DIR, CONTAINER_OUTPUT_DIR, FLOW_TABLE_SUFFIX, SETTLE_POLLS};
use crate::logic::config::PipelineConfig;
use crate::logic::error::{PipelineError, PipelineResult};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    /// Container engine executable
    pub program: String,
    /// Extractor image
    pub image: String,
    /// Sleep before each output poll
    pub settle_delay: Duration,
    pub settle_polls: u32,
    /// `uid:gid` passed to the container so output isn't root-owned
    pub user: Option<String>,
}

impl ExtractorSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            program: config.extractor_program.clone(),
            image: config.extractor_image.clone(),
            settle_delay: config.settle_delay,
            settle_polls: SETTLE_POLLS,
            user: invoking_user(),
        }
    }
}

/// A produced flow table on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowTableRef {
    /// Output file name, e.g. `a.pcap_Flow.csv`
    pub name: String,
    pub path: PathBuf,
}

#[cfg(unix)]
fn invoking_user() -> Option<String> {
    Some(format!("{}:{}", nix::unistd::getuid(), nix::unistd::getgid()))
}

#[cfg(not(unix))]
fn invoking_user() -> Option<String> {
    None
}

// ============================================================================
// EXTRACTOR
// ============================================================================

type Cleanups = Arc<Mutex<Vec<JoinHandle<()>>>>;

pub struct FlowExtractor {
    runner: Arc<dyn ProcessRunner>,
    settings: ExtractorSettings,
    /// Container removals started by interrupted extractions
    cleanups: Cleanups,
}

impl FlowExtractor {
    pub fn new(runner: Arc<dyn ProcessRunner>, settings: ExtractorSettings) -> Self {
        Self {
            runner,
            settings,
            cleanups: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// Extract flow tables from a capture file or a directory of captures
    pub async fn extract(&self, artifact_path: &Path, output_dir: &Path) -> PipelineResult<Vec<FlowTableRef>> {
        self.ensure_environment().await?;

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| PipelineError::Internal(format!("cannot create {}: {}", output_dir.display(), e)))?;

        let input = artifact_path
            .canonicalize()
            .map_err(|e| PipelineError::extraction(format!("capture {} unreadable: {}", artifact_path.display(), e)))?;
        let output = output_dir
            .canonicalize()
            .map_err(|e| PipelineError::Internal(format!("cannot resolve {}: {}", output_dir.display(), e)))?;

        let name = container_name(&output);
        let args = self.build_args(&input, &output, &name)?;
        log::info!("Running flow extractor: {} {}", self.settings.program, args.join(" "));

        let guard = ContainerGuard {
            runner: self.runner.clone(),
            program: self.settings.program.clone(),
            name,
            cleanups: self.cleanups.clone(),
            armed: true,
        };
        let result = self.runner.run(&self.settings.program, &args).await;
        guard.disarm();
        let result = result.map_err(|e| self.spawn_error(e))?;

        if !result.success() {
            return Err(PipelineError::ExtractionFailed {
                code: result.code,
                detail: match result.stderr_tail(5) {
                    tail if tail.is_empty() => "extractor exited abnormally".to_string(),
                    tail => tail,
                },
            });
        }

        let tables = self.collect_output(&output).await?;
        log::info!(
            "Extractor produced {} flow table(s) in {}",
            tables.len(),
            output.display()
        );
        Ok(tables)
    }

    /// Wait for containers of interrupted extractions to be removed
    pub async fn wait_for_cleanup(&self) {
        let pending: Vec<JoinHandle<()>> = self.cleanups.lock().drain(..).collect();
        for task in pending {
            let _ = task.await;
        }
    }

    /// Container engine present and extractor image available locally
    async fn ensure_environment(&self) -> PipelineResult<()> {
        let args = vec!["image".to_string(), "inspect".to_string(), self.settings.image.clone()];
        let result = self
            .runner
            .run(&self.settings.program, &args)
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !result.success() {
            return Err(PipelineError::EnvironmentUnavailable(format!(
                "image '{}' not found, build or pull it first",
                self.settings.image
            )));
        }
        Ok(())
    }

    fn spawn_error(&self, err: io::Error) -> PipelineError {
        if err.kind() == io::ErrorKind::NotFound {
            PipelineError::EnvironmentUnavailable(format!(
                "'{}' executable not found in PATH",
                self.settings.program
            ))
        } else {
            PipelineError::EnvironmentUnavailable(format!("cannot run '{}': {}", self.settings.program, err))
        }
    }

    /// Mount the capture's directory read-only; a single file is addressed by
    /// name inside the mount, a directory is passed as the mount itself.
    fn build_args(&self, input: &Path, output: &Path, name: &str) -> PipelineResult<Vec<String>> {
        let (mount_dir, inside) = if input.is_dir() {
            (input.to_path_buf(), CONTAINER_INPUT_DIR.to_string())
        } else {
            let parent = input
                .parent()
                .ok_or_else(|| PipelineError::extraction(format!("{} has no parent directory", input.display())))?;
            let file_name = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| PipelineError::extraction(format!("{} has no file name", input.display())))?;
            (parent.to_path_buf(), format!("{}/{}", CONTAINER_INPUT_DIR, file_name))
        };

        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            name.to_string(),
        ];
        if let Some(user) = &self.settings.user {
            args.push("-u".to_string());
            args.push(user.clone());
        }
        args.extend([
            "-v".to_string(),
            format!("{}:{}:ro", mount_dir.display(), CONTAINER_INPUT_DIR),
            "-v".to_string(),
            format!("{}:{}", output.display(), CONTAINER_OUTPUT_DIR),
            self.settings.image.clone(),
            inside,
            CONTAINER_OUTPUT_DIR.to_string(),
        ]);
        Ok(args)
    }

    /// Poll for output tables; the tool may still be flushing on exit
    async fn collect_output(&self, output: &Path) -> PipelineResult<Vec<FlowTableRef>> {
        for _ in 0..self.settings.settle_polls.max(1) {
            tokio::time::sleep(self.settings.settle_delay).await;

            let tables = list_flow_tables(output)
                .map_err(|e| PipelineError::Internal(format!("cannot list {}: {}", output.display(), e)))?;
            if !tables.is_empty() {
                return Ok(tables);
            }
        }
        Err(PipelineError::NoOutputProduced(output.display().to_string()))
    }
}

/// `flowguard-<output dir name>`, restricted to characters engines accept
fn container_name(output: &Path) -> String {
    let dir = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let safe: String = dir
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') { c } else { '-' })
        .collect();
    format!("flowguard-{}", safe)
}

/// Removes the named container unless disarmed after the run returned
struct ContainerGuard {
    runner: Arc<dyn ProcessRunner>,
    program: String,
    name: String,
    cleanups: Cleanups,
    armed: bool,
}

impl ContainerGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::warn!("No runtime to remove container {}", self.name);
            return;
        };

        log::warn!("Extraction interrupted, removing container {}", self.name);
        let runner = self.runner.clone();
        let program = self.program.clone();
        let name = self.name.clone();
        let task = handle.spawn(async move {
            let args = vec!["rm".to_string(), "-f".to_string(), name.clone()];
            match runner.run(&program, &args).await {
                Ok(out) if out.success() => log::info!("Removed container {}", name),
                Ok(out) => log::warn!("Cannot remove container {}: {}", name, out.stderr_tail(2)),
                Err(e) => log::warn!("Cannot remove container {}: {}", name, e),
            }
        });
        self.cleanups.lock().push(task);
    }
}

/// `*_Flow.csv` files in `dir`, sorted by name
pub fn list_flow_tables(dir: &Path) -> io::Result<Vec<FlowTableRef>> {
    let mut tables: Vec<FlowTableRef> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?.to_string();
            name.ends_with(FLOW_TABLE_SUFFIX).then_some(FlowTableRef { name, path })
        })
        .collect();
    tables.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(tables)
}
