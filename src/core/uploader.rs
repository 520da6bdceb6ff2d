use std::io::SeekFrom;
use std::path::Path;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::broadcast;
use tokio::time::sleep;
use crate::auth::{Credential, CredentialSource};
use crate::utils::{RetryFailure, RetryPolicy, retry_with_policy};
use super::errors::{ServiceError, UploadError};
use super::session::{SessionState, UploadSession};
use super::traits::UploadService;
use super::types::{ChunkAck, Outcome, SessionHandle, UploadEvent, UploadJob};

/// 8 MiB, a multiple of the 256 KiB granularity resumable uploads require.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;

const EVENT_CAPACITY: usize = 256;

/// Chunking and retry settings for [`ChunkedUploader`]
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Nominal chunk size; only the final chunk is shorter
    pub chunk_size: usize,
    /// Budget per chunk, also used for session creation
    pub retry: RetryPolicy,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-job mutable context: the credential in use and whether it was
/// already replaced once during this job.
struct JobContext<'a> {
    credential: &'a mut Credential,
    auth: &'a dyn CredentialSource,
    reauthorized: bool,
}

impl JobContext<'_> {
    async fn reauthorize(&mut self, reason: String) -> Result<(), UploadError> {
        if self.reauthorized {
            return Err(UploadError::Unauthorized(reason));
        }
        self.reauthorized = true;

        tracing::warn!(reason = %reason, "service rejected credential, refreshing");
        match self.auth.refresh(self.credential).await {
            Ok(fresh) => {
                *self.credential = fresh;
                Ok(())
            }
            Err(err) => Err(UploadError::Unauthorized(format!(
                "{reason}; refresh failed: {err}"
            ))),
        }
    }
}

/// Drives one file through the resumable protocol.
pub struct ChunkedUploader<S> {
    service: S,
    config: UploaderConfig,
    event_tx: broadcast::Sender<UploadEvent>,
}

impl<S: UploadService> ChunkedUploader<S> {
    pub fn new(service: S, config: UploaderConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            service,
            config: UploaderConfig {
                chunk_size: config.chunk_size.max(1),
                ..config
            },
            event_tx,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Progress events for every job this uploader runs.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.event_tx.subscribe()
    }

    fn emit(&self, event: UploadEvent) {
        // nobody listening is fine
        let _ = self.event_tx.send(event);
    }

    fn emit_transition(&self, session: &UploadSession, old_state: SessionState) {
        self.emit(UploadEvent::StateChanged {
            job_id: session.job_id,
            old_state,
            new_state: session.state(),
        });
    }

    fn emit_progress(&self, session: &UploadSession) {
        self.emit(UploadEvent::Progress {
            job_id: session.job_id,
            bytes_sent: session.bytes_sent(),
            total_bytes: session.total_bytes(),
        });
    }

    /// Upload one job. Never panics or returns early on failure; every
    /// problem ends up in `Outcome::Failed`.
    ///
    /// If the service rejects `credential` mid-job it is refreshed through
    /// `auth` once and replaced in place.
    pub async fn run(
        &self,
        job: &UploadJob,
        credential: &mut Credential,
        auth: &dyn CredentialSource,
    ) -> Outcome {
        self.emit(UploadEvent::Started {
            job_id: job.id,
            title: job.title.clone(),
        });

        let mut ctx = JobContext {
            credential,
            auth,
            reauthorized: false,
        };

        match self.transfer(job, &mut ctx).await {
            Ok(video_id) => {
                self.emit(UploadEvent::Completed {
                    job_id: job.id,
                    video_id: video_id.clone(),
                });
                Outcome::Succeeded(video_id)
            }
            Err(err) => {
                self.emit(UploadEvent::Failed {
                    job_id: job.id,
                    error: err.to_string(),
                });
                Outcome::Failed(err)
            }
        }
    }

    async fn transfer(&self, job: &UploadJob, ctx: &mut JobContext<'_>) -> Result<String, UploadError> {
        let total_bytes = match preflight(&job.file_path).await {
            Ok(size) => size,
            Err(err) => {
                self.emit(UploadEvent::StateChanged {
                    job_id: job.id,
                    old_state: SessionState::Initiating,
                    new_state: SessionState::Failed,
                });
                return Err(err);
            }
        };

        let mut session = UploadSession::new(job.id, total_bytes);

        let handle = match self.create_session(job, ctx, total_bytes).await {
            Ok(handle) => handle,
            Err(err) => return Err(self.fail(&mut session, err)),
        };
        tracing::debug!(job = %job.id, total_bytes, "upload session created");

        let old_state = session.begin(handle.clone());
        self.emit_transition(&session, old_state);
        self.emit_progress(&session);

        let mut file = match File::open(&job.file_path).await {
            Ok(file) => file,
            Err(err) => return Err(self.fail(&mut session, UploadError::io(&job.file_path, err))),
        };

        match self.send_all(job, ctx, &mut session, &handle, &mut file).await {
            Ok(video_id) => {
                let old_state = session.complete();
                self.emit_progress(&session);
                self.emit_transition(&session, old_state);
                Ok(video_id)
            }
            Err(err) => Err(self.fail(&mut session, err)),
        }
    }

    fn fail(&self, session: &mut UploadSession, err: UploadError) -> UploadError {
        if let Some(handle) = session.handle() {
            tracing::debug!(
                job = %session.job_id,
                session = %handle,
                bytes_sent = session.bytes_sent(),
                "abandoning upload session"
            );
        }
        let old_state = session.fail();
        self.emit_transition(session, old_state);
        err
    }

    async fn create_session(
        &self,
        job: &UploadJob,
        ctx: &mut JobContext<'_>,
        total_bytes: u64,
    ) -> Result<SessionHandle, UploadError> {
        loop {
            let credential: &Credential = ctx.credential;
            let result = retry_with_policy(&self.config.retry, ServiceError::is_retryable, || {
                self.service.create_session(credential, job, total_bytes)
            })
            .await;

            match result {
                Ok(handle) => return Ok(handle),
                Err(RetryFailure { error: ServiceError::Unauthorized(reason), .. }) => {
                    ctx.reauthorize(reason).await?;
                }
                Err(RetryFailure { error: ServiceError::UnexpectedResponse(message), .. }) => {
                    return Err(UploadError::UnexpectedResponse(message));
                }
                Err(RetryFailure { error, .. }) => return Err(UploadError::SessionRejected(error)),
            }
        }
    }

    /// Record a server-confirmed offset. Returns whether it moved forward.
    fn advance(&self, session: &mut UploadSession, offset: u64) -> Result<bool, UploadError> {
        let before = session.bytes_sent();
        session.acknowledge(offset)?;
        let moved = session.bytes_sent() > before;
        if moved {
            self.emit_progress(session);
        }
        Ok(moved)
    }

    async fn send_all(
        &self,
        job: &UploadJob,
        ctx: &mut JobContext<'_>,
        session: &mut UploadSession,
        handle: &SessionHandle,
        file: &mut File,
    ) -> Result<String, UploadError> {
        let policy = &self.config.retry;
        let total_bytes = session.total_bytes();
        // failed attempts at the current offset
        let mut attempts = 0u32;

        while session.bytes_sent() < total_bytes {
            let offset = session.bytes_sent();
            let len = (self.config.chunk_size as u64).min(session.remaining()) as usize;
            let data = read_chunk(file, offset, len)
                .await
                .map_err(|err| UploadError::io(&job.file_path, err))?;

            let result = self
                .service
                .send_chunk(ctx.credential, handle, offset, data, total_bytes)
                .await;

            let error = match result {
                Ok(ChunkAck::Complete { resource_id }) => return Ok(resource_id),
                Ok(ChunkAck::Partial { acknowledged_offset }) => {
                    if self.advance(session, acknowledged_offset)? {
                        attempts = 0;
                        continue;
                    }
                    ServiceError::unexpected("server accepted no bytes of the chunk")
                }
                Err(ServiceError::Unauthorized(reason)) => {
                    ctx.reauthorize(reason).await?;
                    continue;
                }
                Err(ServiceError::UnexpectedResponse(message)) => {
                    return Err(UploadError::UnexpectedResponse(message));
                }
                Err(error) if error.is_retryable() => error,
                Err(error) => {
                    return Err(UploadError::ChunkTransfer {
                        offset,
                        attempts: attempts + 1,
                        source: error,
                    });
                }
            };

            attempts += 1;
            if !policy.has_attempts_left(attempts) {
                return Err(UploadError::ChunkTransfer {
                    offset,
                    attempts,
                    source: error,
                });
            }

            let delay = policy.delay_after(attempts);
            tracing::warn!(
                job = %job.id,
                offset,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "chunk failed, retrying"
            );
            self.emit(UploadEvent::Retrying {
                job_id: job.id,
                offset,
                attempt: attempts,
                error: error.to_string(),
            });
            sleep(delay).await;

            // the chunk may have landed even though its acknowledgment did not
            match self.service.query_offset(ctx.credential, handle, total_bytes).await {
                Ok(ChunkAck::Complete { resource_id }) => return Ok(resource_id),
                Ok(ChunkAck::Partial { acknowledged_offset }) => {
                    if self.advance(session, acknowledged_offset)? {
                        attempts = 0;
                    }
                }
                Err(err) => {
                    tracing::debug!(job = %job.id, error = %err, "status query failed, resending from last confirmed offset");
                }
            }
        }

        // every byte confirmed but no id yet: one last status check
        match self.service.query_offset(ctx.credential, handle, total_bytes).await {
            Ok(ChunkAck::Complete { resource_id }) => Ok(resource_id),
            Ok(ChunkAck::Partial { .. }) => Err(UploadError::UnexpectedResponse(
                "service confirmed all bytes without returning a video id".to_string(),
            )),
            Err(err) => Err(UploadError::UnexpectedResponse(format!(
                "service confirmed all bytes without returning a video id: {err}"
            ))),
        }
    }
}

/// Size of the file to upload; rejects missing and empty files.
async fn preflight(path: &Path) -> Result<u64, UploadError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(UploadError::FileNotFound(path.to_path_buf()));
        }
        Err(err) => return Err(UploadError::io(path, err)),
    };

    if !metadata.is_file() {
        return Err(UploadError::FileNotFound(path.to_path_buf()));
    }
    if metadata.len() == 0 {
        return Err(UploadError::EmptyFile(path.to_path_buf()));
    }

    Ok(metadata.len())
}

async fn read_chunk(file: &mut File, offset: u64, len: usize) -> std::io::Result<Bytes> {
    file.seek(SeekFrom::Start(offset)).await?;
    let mut buffer = vec![0; len];
    file.read_exact(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}
