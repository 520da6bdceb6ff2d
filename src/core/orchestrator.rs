use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use crate::auth::{AuthError, CredentialSource};
use super::traits::UploadService;
use super::types::{Outcome, UploadEvent, UploadJob};
use super::uploader::ChunkedUploader;

/// Pause between consecutive uploads.
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(10);

/// Outcome of one job
#[derive(Debug)]
pub struct ReportEntry {
    pub job: UploadJob,
    pub outcome: Outcome,
}

/// Per-job outcomes of one run, in manifest order.
#[derive(Debug, Default)]
pub struct RunReport {
    entries: Vec<ReportEntry>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: UploadJob, outcome: Outcome) {
        self.entries.push(ReportEntry { job, outcome });
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Jobs that produced a video id.
    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            match &entry.outcome {
                Outcome::Succeeded(id) => writeln!(
                    f,
                    "  OK    {} -> https://youtu.be/{}",
                    entry.job.title, id
                )?,
                Outcome::Failed(err) => writeln!(f, "  FAIL  {}: {}", entry.job.title, err)?,
            }
        }
        write!(
            f,
            "{} uploaded, {} failed, {} total",
            self.succeeded(),
            self.failed(),
            self.len()
        )
    }
}

/// Runs a manifest's jobs one after another with a fixed pause in between.
pub struct BatchOrchestrator<S, C> {
    uploader: ChunkedUploader<S>,
    credentials: C,
    pause: Duration,
}

impl<S: UploadService, C: CredentialSource> BatchOrchestrator<S, C> {
    pub fn new(uploader: ChunkedUploader<S>, credentials: C, pause: Duration) -> Self {
        Self {
            uploader,
            credentials,
            pause,
        }
    }

    pub fn uploader(&self) -> &ChunkedUploader<S> {
        &self.uploader
    }

    pub fn credentials(&self) -> &C {
        &self.credentials
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.uploader.subscribe()
    }

    /// Upload every job in order.
    ///
    /// Fails only if no credential can be obtained up front; individual job
    /// failures are recorded in the report. There is no pause after the last job.
    pub async fn run_all(&self, jobs: Vec<UploadJob>) -> Result<RunReport, AuthError> {
        let mut credential = self.credentials.obtain().await?;
        let mut report = RunReport::new();
        let total = jobs.len();

        for (index, job) in jobs.into_iter().enumerate() {
            tracing::info!(
                job = %job.id,
                index = index + 1,
                total,
                title = %job.title,
                file = %job.file_path.display(),
                "uploading"
            );

            let outcome = self.uploader.run(&job, &mut credential, &self.credentials).await;
            match &outcome {
                Outcome::Succeeded(video_id) => {
                    tracing::info!(job = %job.id, url = %format!("https://youtu.be/{video_id}"), "upload succeeded");
                }
                Outcome::Failed(err) => {
                    tracing::error!(job = %job.id, error = %err, "upload failed");
                }
            }
            report.push(job, outcome);

            if index + 1 < total {
                tracing::info!(pause_secs = self.pause.as_secs_f64(), "pausing before next upload");
                sleep(self.pause).await;
            }
        }

        Ok(report)
    }
}
