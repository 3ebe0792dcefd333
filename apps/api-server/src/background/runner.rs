//! Scan runner - drives the external scanner process for one job.

use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::Arc;

use tokio::process::Command;
use tokio::task::JoinHandle;

use vigil_core::domain::{JobId, JobStatus};
use vigil_core::ports::JobStatusStore;
use vigil_shared::dto::SubmitScanRequest;

/// Scanner process configuration.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Scanner executable.
    pub program: String,
    /// Arguments placed before the per-job ones.
    pub args: Vec<String>,
    /// Directory the scanner writes reports into.
    pub report_dir: PathBuf,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            program: "garak".to_string(),
            args: Vec::new(),
            report_dir: PathBuf::from("./reports"),
        }
    }
}

impl ScanConfig {
    pub fn from_env() -> Self {
        Self {
            program: std::env::var("SCAN_PROGRAM").unwrap_or_else(|_| "garak".to_string()),
            args: std::env::var("SCAN_ARGS")
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            report_dir: PathBuf::from(
                std::env::var("REPORT_DIR").unwrap_or_else(|_| "./reports".to_string()),
            ),
        }
    }
}

/// Runs scans in the background and records their progress in the job store.
pub struct ScanRunner {
    config: ScanConfig,
    jobs: Arc<dyn JobStatusStore>,
}

impl ScanRunner {
    pub fn new(config: ScanConfig, jobs: Arc<dyn JobStatusStore>) -> Self {
        Self { config, jobs }
    }

    /// Path prefix handed to the scanner for this job's artifacts.
    pub fn report_prefix(&self, job_id: &JobId) -> PathBuf {
        self.config.report_dir.join(job_id.as_str())
    }

    /// Report artifact the scanner produces on success.
    pub fn report_path(&self, job_id: &JobId) -> PathBuf {
        self.config
            .report_dir
            .join(format!("{}.report.jsonl", job_id))
    }

    pub fn report_available(&self, job_id: &JobId) -> bool {
        self.report_path(job_id).is_file()
    }

    fn command(&self, job_id: &JobId, request: &SubmitScanRequest) -> Command {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .arg("--report_prefix")
            .arg(self.report_prefix(job_id))
            .arg("--target_name")
            .arg(&request.target);

        if let Some(probes) = request.probes.as_ref().filter(|p| !p.is_empty()) {
            cmd.arg("--probes").arg(probes.join(","));
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    /// Run the scan on a background task.
    ///
    /// A panic inside the scan task is caught here and recorded as a failure,
    /// so the job never stays `running` because its task died.
    pub fn spawn(self: &Arc<Self>, job_id: JobId, request: SubmitScanRequest) -> JoinHandle<()> {
        let runner = Arc::clone(self);

        tokio::spawn(async move {
            let inner = {
                let runner = Arc::clone(&runner);
                let job_id = job_id.clone();
                tokio::spawn(async move { runner.run(&job_id, &request).await })
            };

            if let Err(e) = inner.await {
                tracing::error!(job_id = %job_id, error = %e, "Scan task aborted");
                let message = format!("scan task aborted: {}", e);
                runner
                    .jobs
                    .update(job_id.as_str(), JobStatus::Failed, &message)
                    .await;
            }
        })
    }

    /// Run the scan to completion on the current task.
    pub async fn run(&self, job_id: &JobId, request: &SubmitScanRequest) {
        let id = job_id.as_str();

        if let Err(e) = tokio::fs::create_dir_all(&self.config.report_dir).await {
            tracing::error!(job_id = %job_id, error = %e, "Cannot create report directory");
            self.jobs
                .update(id, JobStatus::Failed, &format!("cannot create report directory: {}", e))
                .await;
            return;
        }

        self.jobs.update(id, JobStatus::Running, "started").await;
        tracing::info!(job_id = %job_id, target = %request.target, "Scan started");

        match self.command(job_id, request).output().await {
            Ok(output) if output.status.success() => {
                // Cleared message means "report processing" until the report shows up.
                self.jobs.update(id, JobStatus::Running, "").await;
                tracing::info!(job_id = %job_id, "Scan finished, waiting for report");
            }
            Ok(output) => {
                let diagnostics = diagnostics(&output);
                tracing::warn!(
                    job_id = %job_id,
                    status = %output.status,
                    "Scan exited with failure"
                );
                self.jobs.update(id, JobStatus::Failed, &diagnostics).await;
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job_id,
                    program = %self.config.program,
                    error = %e,
                    "Failed to launch scanner"
                );
                self.jobs
                    .update(id, JobStatus::Failed, &format!("failed to launch scanner: {}", e))
                    .await;
            }
        }
    }
}

/// Summary of a failed run: exit status plus stderr, or stdout if stderr is empty.
fn diagnostics(output: &Output) -> String {
    let stream = if output.stderr.iter().any(|b| !b.is_ascii_whitespace()) {
        &output.stderr
    } else {
        &output.stdout
    };
    let text = String::from_utf8_lossy(stream);

    format!("scanner {}: {}", output.status, text.trim())
}
